//! Emulated MIDI Pro Adapter devices
//!
//! One generic device serves both modes. It owns the instrument state, the
//! control handshake and the MIDI inbox, and is driven entirely by the
//! host's transfer calls.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{info, trace};

use crate::config::DeviceConfig;
use crate::handshake::ControlHandshake;
use crate::instrument::{encode, DeviceKind, GuitarState, Instrument, KeyboardState};
use crate::midi::MidiInbox;
use crate::report::Report;
use crate::usb::{
    ControlFallback, DeviceIdentity, SetupPacket, StallingFallback, TransferOutcome, UsbDevice,
};

#[cfg(test)]
mod tests;

/// An emulated adapter in one instrument mode
pub struct MidiProAdapter<I: Instrument> {
    state: I,
    handshake: ControlHandshake,
    inbox: MidiInbox,
    fallback: Box<dyn ControlFallback>,
}

pub type GuitarAdapter = MidiProAdapter<GuitarState>;
pub type KeyboardAdapter = MidiProAdapter<KeyboardState>;

impl<I: Instrument> MidiProAdapter<I> {
    pub fn new(inbox: MidiInbox, fallback: Box<dyn ControlFallback>) -> Self {
        let identity = I::IDENTITY;
        info!(
            "Emulating {} ({:04x}:{:04x}) on {}",
            identity.product,
            identity.vendor_id,
            identity.product_id,
            inbox.port_name().unwrap_or("no MIDI input")
        );

        Self {
            state: I::default(),
            handshake: ControlHandshake::new(I::HANDSHAKE),
            inbox,
            fallback,
        }
    }

    /// Device whose unhandled control requests stall
    pub fn with_inbox(inbox: MidiInbox) -> Self {
        Self::new(inbox, Box::new(StallingFallback))
    }

    pub fn kind(&self) -> DeviceKind {
        I::KIND
    }

    pub fn state(&self) -> &I {
        &self.state
    }

    pub fn handshake(&self) -> &ControlHandshake {
        &self.handshake
    }

    pub fn inbox(&self) -> &MidiInbox {
        &self.inbox
    }

    /// Decode everything already queued, in arrival order
    fn drain(&mut self) -> usize {
        let mut drained = 0;
        while let Some(msg) = self.inbox.try_next() {
            self.state.decode(&msg);
            drained += 1;
        }
        drained
    }
}

impl<I: Instrument> UsbDevice for MidiProAdapter<I> {
    fn identity(&self) -> &'static DeviceIdentity {
        I::IDENTITY
    }

    fn handle_control(&mut self, setup: &SetupPacket, data: &mut [u8]) -> TransferOutcome {
        match self.handshake.handle(setup, data) {
            Some(outcome) => outcome,
            None => self.fallback.control_transfer(setup, data),
        }
    }

    fn poll(&mut self) -> Report {
        let drained = self.drain();
        if drained > 0 {
            trace!(
                "{} decoded {} message(s), {} total",
                I::KIND,
                drained,
                self.state.event_count()
            );
        }
        encode(&self.state)
    }
}

/// Build the device for `kind` around an already opened inbox
pub fn build_device(
    kind: DeviceKind,
    inbox: MidiInbox,
    fallback: Box<dyn ControlFallback>,
) -> Box<dyn UsbDevice> {
    match kind {
        DeviceKind::Guitar => Box::new(GuitarAdapter::new(inbox, fallback)),
        DeviceKind::Keyboard => Box::new(KeyboardAdapter::new(inbox, fallback)),
    }
}

/// Open the MIDI input a config entry names and build its device.
///
/// A port that can't be opened leaves the device idle rather than failing.
pub fn open_device(config: &DeviceConfig, fallback: Box<dyn ControlFallback>) -> Box<dyn UsbDevice> {
    let inbox = MidiInbox::open_or_inert(
        config.port_name(),
        config.virtual_port,
        config.kind.needs_sysex(),
    );
    build_device(config.kind, inbox, fallback)
}

/// Device handle for hosts that dispatch transfers from several threads.
///
/// One lock covers both the control and the interrupt path, so the
/// handshake and the input state are never seen half-updated.
pub struct SharedDevice<D> {
    inner: Arc<Mutex<D>>,
}

impl<D> SharedDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, D> {
        self.inner.lock()
    }
}

impl<D> Clone for SharedDevice<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: UsbDevice> UsbDevice for SharedDevice<D> {
    fn identity(&self) -> &'static DeviceIdentity {
        self.lock().identity()
    }

    fn handle_control(&mut self, setup: &SetupPacket, data: &mut [u8]) -> TransferOutcome {
        self.lock().handle_control(setup, data)
    }

    fn poll(&mut self) -> Report {
        self.lock().poll()
    }

    fn interrupt_transfer(&mut self, buf: &mut [u8]) -> TransferOutcome {
        self.lock().interrupt_transfer(buf)
    }
}
