//! MIDI transport inbox
//!
//! midir delivers complete, framed messages on its own thread. They are
//! pushed onto an unbounded queue which the poller drains with `try_recv`,
//! so a poll never waits on the transport.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use tracing::{debug, info, warn};

use super::{describe, format_hex};
use crate::error::AdapterError;

/// Client name registered with the MIDI backend
const CLIENT_NAME: &str = "MIDI-Pro-Adapter";

/// Producer side of an inbox, for in-process feeds and tests
pub type MidiSender = Sender<Vec<u8>>;

/// Queue of framed MIDI messages waiting for the next poll.
///
/// Owns the transport connection, so dropping the inbox closes the port.
pub struct MidiInbox {
    rx: Receiver<Vec<u8>>,
    connection: Option<MidiInputConnection<()>>,
    port_name: Option<String>,
}

impl MidiInbox {
    /// Inbox fed by the returned sender instead of a MIDI port
    pub fn channel() -> (MidiSender, Self) {
        let (tx, rx) = channel::unbounded();
        (
            tx,
            Self {
                rx,
                connection: None,
                port_name: None,
            },
        )
    }

    /// Inbox that never yields a message
    pub fn inert() -> Self {
        let (_, inbox) = Self::channel();
        inbox
    }

    /// Open a MIDI input for `port`.
    ///
    /// With `virtual_port` a new port of that name is published (Unix only;
    /// elsewhere this falls back to connecting). Otherwise the first input
    /// whose name contains `port` is used. Timing clock and active sensing
    /// are always dropped; SysEx only when `keep_sysex` is false.
    pub fn open(port: &str, virtual_port: bool, keep_sysex: bool) -> Result<Self, AdapterError> {
        let mut midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| AdapterError::Transport(e.to_string()))?;
        midi_in.ignore(if keep_sysex {
            Ignore::TimeAndActiveSense
        } else {
            Ignore::All
        });

        let (tx, rx) = channel::unbounded();
        let label = port.to_string();
        let on_message = move |_timestamp: u64, data: &[u8], _: &mut ()| {
            debug!("MIDI in [{}] {}: {}", label, describe(data), format_hex(data));
            // Receiver gone means the device is being torn down
            let _ = tx.send(data.to_vec());
        };

        let (connection, port_name) = if virtual_port {
            Self::create_virtual(midi_in, port, on_message)?
        } else {
            Self::connect_by_name(midi_in, port, on_message)?
        };

        info!("MIDI input open: {}", port_name);
        Ok(Self {
            rx,
            connection: Some(connection),
            port_name: Some(port_name),
        })
    }

    /// Like [`MidiInbox::open`], but a failure leaves an inert inbox behind.
    ///
    /// The device keeps answering polls with its rest report.
    pub fn open_or_inert(port: &str, virtual_port: bool, keep_sysex: bool) -> Self {
        match Self::open(port, virtual_port, keep_sysex) {
            Ok(inbox) => inbox,
            Err(e) => {
                warn!("MIDI input '{}' unavailable, reporting idle state: {}", port, e);
                Self::inert()
            }
        }
    }

    #[cfg(unix)]
    fn create_virtual<F>(
        midi_in: MidiInput,
        port: &str,
        on_message: F,
    ) -> Result<(MidiInputConnection<()>, String), AdapterError>
    where
        F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
    {
        use midir::os::unix::VirtualInput;

        let connection = midi_in
            .create_virtual(port, on_message, ())
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok((connection, format!("{} (virtual)", port)))
    }

    #[cfg(not(unix))]
    fn create_virtual<F>(
        midi_in: MidiInput,
        port: &str,
        on_message: F,
    ) -> Result<(MidiInputConnection<()>, String), AdapterError>
    where
        F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
    {
        warn!("Virtual MIDI ports are not supported here, connecting to '{}' instead", port);
        Self::connect_by_name(midi_in, port, on_message)
    }

    fn connect_by_name<F>(
        midi_in: MidiInput,
        port: &str,
        on_message: F,
    ) -> Result<(MidiInputConnection<()>, String), AdapterError>
    where
        F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
    {
        let (in_port, port_name) = find_input_port(&midi_in, port)
            .ok_or_else(|| AdapterError::PortNotFound(port.to_string()))?;

        let connection = midi_in
            .connect(&in_port, CLIENT_NAME, on_message, ())
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok((connection, port_name))
    }

    /// Next queued message, if one is already waiting
    pub fn try_next(&self) -> Option<Vec<u8>> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of messages currently waiting
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }
}

impl Drop for MidiInbox {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            drop(connection);
            info!(
                "MIDI input closed: {}",
                self.port_name.as_deref().unwrap_or("<unnamed>")
            );
        }
    }
}

/// Find an input port by case-insensitive substring match
fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, String)> {
    let needle = pattern.to_lowercase();
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            if name.to_lowercase().contains(&needle) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>, AdapterError> {
    let midi_in =
        MidiInput::new(CLIENT_NAME).map_err(|e| AdapterError::Transport(e.to_string()))?;

    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}
