//! Library error type
//!
//! The transfer paths never fail; errors only come from configuration and
//! from opening the MIDI transport.

use thiserror::Error;

/// Errors raised while configuring or wiring up an emulated adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown device type '{0}' (expected 'guitar' or 'keyboard')")]
    UnknownDeviceType(String),

    #[error("invalid device spec '{0}' (expected '<type>:<port>')")]
    InvalidDeviceSpec(String),

    #[error("too many devices configured: {count} (at most {max} are supported)")]
    TooManyDevices { count: usize, max: usize },

    #[error("MIDI input port '{0}' not found")]
    PortNotFound(String),

    #[error("MIDI transport error: {0}")]
    Transport(String),
}
