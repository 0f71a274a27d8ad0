//! MIDI Pro Adapter emulation
//!
//! Emulates the Rock Band 3 MIDI Pro Adapter in guitar or keyboard mode:
//! MIDI from a real instrument is decoded into button state and served to
//! the host as 27-byte HID input reports, and the vendor enable/disable
//! handshake is answered with the adapter's canned responses.

pub mod config;
pub mod device;
pub mod error;
pub mod handshake;
pub mod instrument;
pub mod midi;
pub mod report;
pub mod usb;

pub use config::{AppConfig, DeviceConfig};
pub use device::{build_device, open_device, MidiProAdapter, SharedDevice};
pub use error::AdapterError;
pub use instrument::{DeviceKind, Instrument};
pub use report::Report;
pub use usb::{ControlFallback, SetupPacket, TransferOutcome, UsbDevice};
