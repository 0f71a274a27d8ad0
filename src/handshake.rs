//! Vendor enable/disable handshake
//!
//! The game enables or disables MIDI reporting with a 40-byte SET_REPORT,
//! then reads a canned 40-byte answer back through successive GET_REPORTs.
//! Each read continues where the previous one stopped.

use tracing::{debug, info, warn};

use crate::usb::{SetupPacket, TransferOutcome};

/// Size of the configuration packet and of both canned answers
pub const HANDSHAKE_LEN: usize = 40;

/// SET_REPORT payload offset that selects enable or disable
pub const SELECTOR_OFFSET: usize = 2;

/// Selector byte that enables MIDI reporting
pub const SELECTOR_ENABLE: u8 = 0x89;

/// Selector byte that disables MIDI reporting
pub const SELECTOR_DISABLE: u8 = 0x81;

/// wLength of the LED/vendor SET_REPORT, which is acknowledged and ignored
pub const LED_REPORT_LEN: u16 = 8;

/// The pair of canned answers a variant serves
#[derive(Debug, Clone, Copy)]
pub struct HandshakeTables {
    pub enabled: &'static [u8; HANDSHAKE_LEN],
    pub disabled: &'static [u8; HANDSHAKE_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Disabled,
    Enabled,
}

/// Two-state handshake with a read cursor into the selected answer
#[derive(Debug, Clone)]
pub struct ControlHandshake {
    tables: HandshakeTables,
    state: HandshakeState,
    cursor: usize,
}

impl ControlHandshake {
    pub fn new(tables: HandshakeTables) -> Self {
        Self {
            tables,
            state: HandshakeState::Disabled,
            cursor: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == HandshakeState::Enabled
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Answer currently served by GET_REPORT
    pub fn response(&self) -> &'static [u8; HANDSHAKE_LEN] {
        match self.state {
            HandshakeState::Enabled => self.tables.enabled,
            HandshakeState::Disabled => self.tables.disabled,
        }
    }

    /// Handle the control requests this handshake owns.
    ///
    /// Returns `None` for anything else, which the caller forwards to the
    /// generic control handling.
    pub fn handle(&mut self, setup: &SetupPacket, data: &mut [u8]) -> Option<TransferOutcome> {
        if setup.is_set_report() && usize::from(setup.length) == HANDSHAKE_LEN {
            self.configure(data);
            Some(TransferOutcome::synthetic(usize::from(setup.length)))
        } else if setup.is_get_report() {
            let len = self.read_chunk(data);
            Some(TransferOutcome::synthetic(len))
        } else if setup.is_set_report() && setup.length == LED_REPORT_LEN {
            // LED and other vendor output; there is nothing to drive
            debug!("Ignoring vendor SET_REPORT: {}", crate::midi::format_hex(data));
            Some(TransferOutcome::synthetic(usize::from(setup.length)))
        } else {
            None
        }
    }

    /// Apply a configuration packet. Unknown selectors change nothing.
    pub fn configure(&mut self, payload: &[u8]) {
        match payload.get(SELECTOR_OFFSET).copied() {
            Some(SELECTOR_ENABLE) => {
                info!("MIDI data enabled.");
                self.transition(HandshakeState::Enabled);
            }
            Some(SELECTOR_DISABLE) => {
                info!("MIDI data disabled.");
                self.transition(HandshakeState::Disabled);
            }
            Some(other) => {
                warn!("Unhandled SET_REPORT request: 0x{:02X}", other);
            }
            None => {
                warn!(
                    "Unhandled SET_REPORT request: payload too short ({} bytes)",
                    payload.len()
                );
            }
        }
    }

    fn transition(&mut self, state: HandshakeState) {
        self.state = state;
        self.cursor = 0;
    }

    /// Copy the next `buf.len()` bytes of the current answer into `buf`.
    ///
    /// Reads past the end of the 40-byte answer are clamped: the missing
    /// tail is zero-filled and the cursor stops at the end. The whole
    /// buffer length is always reported as transferred.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        let response = self.response();
        let start = self.cursor.min(HANDSHAKE_LEN);
        let available = HANDSHAKE_LEN - start;
        let copied = buf.len().min(available);

        buf[..copied].copy_from_slice(&response[start..start + copied]);
        buf[copied..].fill(0);

        if copied < buf.len() {
            debug!(
                "GET_REPORT past end of handshake answer (cursor {}, requested {}), zero-filled {} bytes",
                self.cursor,
                buf.len(),
                buf.len() - copied
            );
        }

        self.cursor = start + copied;
        buf.len()
    }
}
