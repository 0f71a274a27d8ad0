//! MIDI utilities
//!
//! Status bytes the adapters react to, hex formatting for logs, and the
//! inbox that carries framed messages from the transport to the poller.

pub mod inbox;

pub use inbox::{list_input_ports, MidiInbox, MidiSender};

/// Note Off, channel 1
pub const STATUS_NOTE_OFF: u8 = 0x80;

/// Note On, channel 1
pub const STATUS_NOTE_ON: u8 = 0x90;

/// Control Change, channel 1
pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;

/// Pitch Wheel, channel 1
pub const STATUS_PITCH_WHEEL: u8 = 0xE0;

/// Start of System Exclusive
pub const STATUS_SYSEX: u8 = 0xF0;

/// Status bit that tells Note On from Note Off
pub const NOTE_ON_BIT: u8 = 0x10;

/// Sustain pedal controller
pub const CC_SUSTAIN: u8 = 0x40;

/// Modulation wheel controller
pub const CC_MODULATION: u8 = 0x01;

/// Strip the status bit from a data byte (0-127)
pub fn data_byte(byte: u8) -> u8 {
    byte & 0x7F
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Short human label for a framed message, for trace output
pub fn describe(data: &[u8]) -> &'static str {
    match data.first() {
        None => "empty",
        Some(&STATUS_SYSEX) => "sysex",
        Some(&status) if status < 0x80 => "data",
        Some(&status) => match status & 0xF0 {
            0x80 => "note-off",
            0x90 => "note-on",
            0xA0 => "poly-pressure",
            0xB0 => "control-change",
            0xC0 => "program-change",
            0xD0 => "channel-pressure",
            0xE0 => "pitch-wheel",
            _ => "system",
        },
    }
}
