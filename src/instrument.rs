//! Instrument variants of the MIDI Pro Adapter
//!
//! Each variant owns its tables (canned handshake answers, rest report,
//! field layout), its button state, and the decoder that feeds that state
//! from MIDI. Encoding is shared: start from the rest report and apply the
//! variant's layout table field by field.

pub mod guitar;
pub mod keyboard;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::handshake::HandshakeTables;
use crate::report::{Field, Report};
use crate::usb::DeviceIdentity;

pub use guitar::GuitarState;
pub use keyboard::KeyboardState;

/// Which adapter mode to emulate
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Guitar,
    Keyboard,
}

impl DeviceKind {
    /// Virtual port name published when none is configured
    pub fn default_port_name(&self) -> &'static str {
        match self {
            DeviceKind::Guitar => "RPCS3 Guitar Midi In",
            DeviceKind::Keyboard => "RPCS3 Midi In",
        }
    }

    /// Whether the transport must pass SysEx through
    pub fn needs_sysex(&self) -> bool {
        matches!(self, DeviceKind::Guitar)
    }

    pub fn identity(&self) -> &'static DeviceIdentity {
        match self {
            DeviceKind::Guitar => GuitarState::IDENTITY,
            DeviceKind::Keyboard => KeyboardState::IDENTITY,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Guitar => f.write_str("guitar"),
            DeviceKind::Keyboard => f.write_str("keyboard"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "guitar" => Ok(DeviceKind::Guitar),
            "keyboard" | "keys" => Ok(DeviceKind::Keyboard),
            _ => Err(AdapterError::UnknownDeviceType(s.to_string())),
        }
    }
}

/// Button state of one adapter variant, plus the constant data that
/// describes how it is decoded and reported.
pub trait Instrument: Default + Send {
    /// Selector naming the state value a layout field reads
    type Source: Copy + fmt::Debug + 'static;

    const KIND: DeviceKind;
    const IDENTITY: &'static DeviceIdentity;
    const HANDSHAKE: HandshakeTables;

    /// Report sent when nothing is pressed
    const BASELINE: Report;

    /// Fields applied on top of the baseline, in order
    const LAYOUT: &'static [Field<Self::Source>];

    /// Apply one framed MIDI message. Shapes the variant doesn't know are
    /// ignored.
    fn decode(&mut self, msg: &[u8]);

    /// Value for a layout field, or `None` to leave the report untouched
    fn field_value(&self, source: Self::Source) -> Option<u32>;

    /// Messages decoded so far (diagnostic only)
    fn event_count(&self) -> u64;
}

/// Encode the current state into a report
pub fn encode<I: Instrument>(state: &I) -> Report {
    let mut report = I::BASELINE;
    for field in I::LAYOUT {
        if let Some(value) = state.field_value(field.source) {
            report.apply(field, value);
        }
    }
    report
}
