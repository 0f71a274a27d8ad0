//! Keyboard mode
//!
//! The Pro keyboard sends plain channel-1 notes. Notes 36-47 are the
//! console buttons, 48-72 are the 25 keys. The overdrive pedal arrives as
//! modulation or sustain, and the touch strip as the pitch wheel.

use super::{DeviceKind, Instrument};
use crate::handshake::{HandshakeTables, HANDSHAKE_LEN};
use crate::midi::{
    data_byte, CC_MODULATION, CC_SUSTAIN, NOTE_ON_BIT, STATUS_CONTROL_CHANGE, STATUS_NOTE_OFF,
    STATUS_NOTE_ON, STATUS_PITCH_WHEEL,
};
use crate::report::{BitSlice, Field, Merge, Report};
use crate::usb::DeviceIdentity;

pub const KEY_COUNT: usize = 25;

/// Held keys that can report a velocity at once
pub const VELOCITY_SLOTS: usize = 5;

pub const NOTE_SQUARE: u8 = 36;
pub const NOTE_TRIANGLE: u8 = 37;
pub const NOTE_DPAD_LEFT: u8 = 39;
pub const NOTE_DPAD_RIGHT: u8 = 40;
pub const NOTE_DPAD_UP: u8 = 41;
pub const NOTE_SELECT: u8 = 42;
pub const NOTE_DPAD_DOWN: u8 = 43;
pub const NOTE_START: u8 = 44;
pub const NOTE_CROSS: u8 = 45;
pub const NOTE_CIRCLE: u8 = 46;
pub const NOTE_OVERDRIVE: u8 = 47;

/// First and last note of the key range
pub const NOTE_FIRST_KEY: u8 = 48;
pub const NOTE_LAST_KEY: u8 = 72;

/// Controller values above this hold overdrive
const OVERDRIVE_THRESHOLD: u8 = 40;

/// Pitch wheel at rest (14-bit center)
pub const PITCH_CENTER: u16 = 0x2000;

/// Smallest touch-strip deflection that is reported
const PITCH_DEADZONE: u16 = 5;
const PITCH_MAX: u16 = 0x75;

const DPAD_UP: u32 = 0;
const DPAD_RIGHT: u32 = 2;
const DPAD_DOWN: u32 = 4;
const DPAD_LEFT: u32 = 6;

pub const IDENTITY: DeviceIdentity = DeviceIdentity {
    vendor_id: 0x12BA,
    product_id: 0x2338,
    manufacturer: "Licensed by Sony Computer Entertainment America",
    product: "Harmonix RB3 MIDI Keyboard Interface for PlayStation®3",
    interrupt_in_endpoint: 0x81,
    interrupt_out_endpoint: 0x02,
    max_packet_size: 64,
    interval_ms: 10,
};

pub const DISABLED_RESPONSE: [u8; HANDSHAKE_LEN] = [
    0xe9, 0x00, 0x00, 0x00, 0x00, 0x02, 0x0d, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x82,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x21, 0x26, 0x02, 0x06, 0x00, 0x00, 0x00, 0x00,
];

pub const ENABLED_RESPONSE: [u8; HANDSHAKE_LEN] = [
    0xe9, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x8a,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x21, 0x26, 0x02, 0x06, 0x00, 0x00, 0x00, 0x00,
];

pub const BASELINE: Report = Report::from_bytes([
    0x00, 0x00, 0x08, 0x80, 0x80, 0x80, 0x80, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02, 0x00,
    0x02, 0x00, 0x02,
]);

/// Values a keyboard layout field can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardSource {
    /// All 25 keys, key 0 in bit 24
    KeyMask,
    /// Velocity of the n-th held key
    Velocity(usize),
    Square,
    Cross,
    Circle,
    Triangle,
    Select,
    Start,
    Dpad,
    Overdrive,
    PitchWheel,
}

/// Report layout.
///
/// The key mask fills bytes 5-7 and the top bit of byte 8, so the low
/// seven bits of byte 8 are free for the first velocity slot.
pub const LAYOUT: &[Field<KeyboardSource>] = &[
    Field {
        source: KeyboardSource::Square,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 0)],
    },
    Field {
        source: KeyboardSource::Cross,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 1)],
    },
    Field {
        source: KeyboardSource::Circle,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 2)],
    },
    Field {
        source: KeyboardSource::Triangle,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 3)],
    },
    Field {
        source: KeyboardSource::Select,
        merge: Merge::Or,
        slices: &[BitSlice::flag(1, 0)],
    },
    Field {
        source: KeyboardSource::Start,
        merge: Merge::Or,
        slices: &[BitSlice::flag(1, 1)],
    },
    Field {
        source: KeyboardSource::Dpad,
        merge: Merge::Assign,
        slices: &[BitSlice::byte(2)],
    },
    Field {
        source: KeyboardSource::KeyMask,
        merge: Merge::Assign,
        slices: &[
            BitSlice::new(17, 8, 5, 0),
            BitSlice::new(9, 8, 6, 0),
            BitSlice::new(1, 8, 7, 0),
            BitSlice::new(0, 1, 8, 7),
        ],
    },
    Field {
        source: KeyboardSource::Velocity(0),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 7, 8, 0)],
    },
    Field {
        source: KeyboardSource::Velocity(1),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 7, 9, 0)],
    },
    Field {
        source: KeyboardSource::Velocity(2),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 7, 10, 0)],
    },
    Field {
        source: KeyboardSource::Velocity(3),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 7, 11, 0)],
    },
    Field {
        source: KeyboardSource::Velocity(4),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 7, 12, 0)],
    },
    Field {
        source: KeyboardSource::Overdrive,
        merge: Merge::Or,
        slices: &[BitSlice::flag(13, 7)],
    },
    Field {
        source: KeyboardSource::PitchWheel,
        merge: Merge::Assign,
        slices: &[BitSlice::byte(15)],
    },
];

/// Input state of the keyboard, held between polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardState {
    pub cross: bool,
    pub circle: bool,
    pub square: bool,
    pub triangle: bool,

    pub start: bool,
    pub select: bool,
    pub overdrive: bool,

    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,

    pub keys: [bool; KEY_COUNT],
    pub velocities: [u8; KEY_COUNT],

    /// 14-bit touch strip value
    pub pitch_wheel: u16,

    pub events: u64,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self {
            cross: false,
            circle: false,
            square: false,
            triangle: false,
            start: false,
            select: false,
            overdrive: false,
            dpad_up: false,
            dpad_down: false,
            dpad_left: false,
            dpad_right: false,
            keys: [false; KEY_COUNT],
            velocities: [0; KEY_COUNT],
            pitch_wheel: PITCH_CENTER,
            events: 0,
        }
    }
}

impl KeyboardState {
    fn apply_note(&mut self, note: u8, velocity: u8, on: bool) {
        match note {
            NOTE_SQUARE => self.square = on,
            NOTE_TRIANGLE => self.triangle = on,
            NOTE_DPAD_LEFT => self.dpad_left = on,
            NOTE_DPAD_RIGHT => self.dpad_right = on,
            NOTE_DPAD_UP => self.dpad_up = on,
            NOTE_SELECT => self.select = on,
            NOTE_DPAD_DOWN => self.dpad_down = on,
            NOTE_START => self.start = on,
            NOTE_CROSS => self.cross = on,
            NOTE_CIRCLE => self.circle = on,
            NOTE_OVERDRIVE => self.overdrive = on,
            NOTE_FIRST_KEY..=NOTE_LAST_KEY => {
                let key = usize::from(note - NOTE_FIRST_KEY);
                self.keys[key] = on;
                self.velocities[key] = velocity;
            }
            _ => {}
        }
    }

    /// Keys currently down as a 25-bit mask, key 0 most significant
    pub fn key_mask(&self) -> u32 {
        self.keys
            .iter()
            .fold(0u32, |mask, &down| (mask << 1) | u32::from(down))
    }

    /// Velocity of the `slot`-th held key, lowest key first
    pub fn held_velocity(&self, slot: usize) -> Option<u8> {
        self.keys
            .iter()
            .zip(self.velocities.iter())
            .filter(|&(&down, _)| down)
            .map(|(_, &velocity)| velocity)
            .nth(slot)
    }

    /// Hat value for the pressed direction; `None` leaves the rest value
    fn dpad_code(&self) -> Option<u32> {
        if self.dpad_up {
            Some(DPAD_UP)
        } else if self.dpad_down {
            Some(DPAD_DOWN)
        } else if self.dpad_left {
            Some(DPAD_LEFT)
        } else if self.dpad_right {
            Some(DPAD_RIGHT)
        } else {
            None
        }
    }

    /// Touch strip deflection for byte 15, or `None` inside the deadzone
    fn pitch_deflection(&self) -> Option<u32> {
        let deflection = (self.pitch_wheel >> 6).abs_diff(0x80);
        (deflection >= PITCH_DEADZONE)
            .then(|| u32::from(deflection.clamp(PITCH_DEADZONE, PITCH_MAX)))
    }
}

/// Apply one framed MIDI message to the keyboard state
pub fn decode(state: &mut KeyboardState, msg: &[u8]) {
    state.events = state.events.wrapping_add(1);

    match *msg {
        [status @ (STATUS_NOTE_OFF | STATUS_NOTE_ON), note, velocity] => {
            let on = status & NOTE_ON_BIT == NOTE_ON_BIT;
            state.apply_note(data_byte(note), data_byte(velocity), on);
        }
        [STATUS_CONTROL_CHANGE, CC_MODULATION | CC_SUSTAIN, value] => {
            state.overdrive = data_byte(value) > OVERDRIVE_THRESHOLD;
        }
        [STATUS_PITCH_WHEEL, lsb, msb] => {
            state.pitch_wheel = (u16::from(data_byte(msb)) << 7) | u16::from(data_byte(lsb));
        }
        _ => {}
    }
}

impl Instrument for KeyboardState {
    type Source = KeyboardSource;

    const KIND: DeviceKind = DeviceKind::Keyboard;
    const IDENTITY: &'static DeviceIdentity = &IDENTITY;
    const HANDSHAKE: HandshakeTables = HandshakeTables {
        enabled: &ENABLED_RESPONSE,
        disabled: &DISABLED_RESPONSE,
    };
    const BASELINE: Report = BASELINE;
    const LAYOUT: &'static [Field<KeyboardSource>] = LAYOUT;

    fn decode(&mut self, msg: &[u8]) {
        decode(self, msg);
    }

    fn field_value(&self, source: KeyboardSource) -> Option<u32> {
        let flag = |on: bool| Some(u32::from(on));
        match source {
            KeyboardSource::KeyMask => Some(self.key_mask()),
            KeyboardSource::Velocity(slot) if slot < VELOCITY_SLOTS => {
                self.held_velocity(slot).map(u32::from)
            }
            KeyboardSource::Velocity(_) => None,
            KeyboardSource::Square => flag(self.square),
            KeyboardSource::Cross => flag(self.cross),
            KeyboardSource::Circle => flag(self.circle),
            KeyboardSource::Triangle => flag(self.triangle),
            KeyboardSource::Select => flag(self.select),
            KeyboardSource::Start => flag(self.start),
            KeyboardSource::Dpad => self.dpad_code(),
            KeyboardSource::Overdrive => flag(self.overdrive),
            KeyboardSource::PitchWheel => self.pitch_deflection(),
        }
    }

    fn event_count(&self) -> u64 {
        self.events
    }
}
