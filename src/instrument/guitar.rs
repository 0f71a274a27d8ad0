//! Guitar mode
//!
//! The Pro guitars send fret positions and string hits as short SysEx
//! frames, buttons as a longer SysEx frame, and the overdrive pedal as the
//! sustain controller.
//!
//! Frame shapes (byte 4 selects the kind):
//!
//! | len | byte 4 | payload                                            |
//! |-----|--------|----------------------------------------------------|
//! | 8   | 0x01   | byte 5 string (1-6), byte 6 note held on that string |
//! | 8   | 0x05   | byte 5 string (1-6), byte 6 velocity               |
//! | 10  | 0x08   | byte 5 face buttons, byte 6 select/start, byte 7 tilt + dpad |

use tracing::trace;

use super::{DeviceKind, Instrument};
use crate::handshake::{HandshakeTables, HANDSHAKE_LEN};
use crate::midi::{data_byte, CC_SUSTAIN, STATUS_CONTROL_CHANGE, STATUS_SYSEX};
use crate::report::{BitSlice, Field, Merge, Report};
use crate::usb::DeviceIdentity;

pub const STRING_COUNT: usize = 6;

/// Note each string plays open; the fret is the distance from it
pub const FRET_OPEN_NOTES: [u8; STRING_COUNT] = [0x40, 0x3B, 0x37, 0x32, 0x2D, 0x28];

/// Hat value for "no direction"
pub const DPAD_NEUTRAL: u8 = 0x08;

const SELECTOR_FRET: u8 = 0x01;
const SELECTOR_STRING: u8 = 0x05;
const SELECTOR_BUTTONS: u8 = 0x08;

/// Sustain values at or above this hold overdrive
const SUSTAIN_THRESHOLD: u8 = 40;

const TILT_BIT: u8 = 0b0100_0000;

/// Axis value forced while tilted
const TILT_AXIS_VALUE: u32 = 0x7F;

pub const IDENTITY: DeviceIdentity = DeviceIdentity {
    vendor_id: 0x12BA,
    product_id: 0x2438,
    manufacturer: "Licensed by Sony Computer Entertainment America",
    product: "Harmonix RB3 MIDI Guitar Interface for PlayStation®3",
    interrupt_in_endpoint: 0x81,
    interrupt_out_endpoint: 0x02,
    max_packet_size: 64,
    interval_ms: 10,
};

pub const DISABLED_RESPONSE: [u8; HANDSHAKE_LEN] = [
    0xe9, 0x00, 0x00, 0x00, 0x00, 0x02, 0x0f, 0x01,
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
    0x00, 0x00, 0x08, 0x80, 0x80, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40,
    0x40, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00,
]);

/// Values a guitar layout field can read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuitarSource {
    Fret(usize),
    StringVelocity(usize),
    Square,
    Cross,
    Circle,
    Triangle,
    Select,
    Start,
    Dpad,
    TiltAxis,
}

/// Report layout.
///
/// Frets are 5-bit values packed back to back from byte 8 bit 6 downwards:
/// strings 1-3 fill bytes 8/7, strings 4-6 bytes 6/5. Strings 2 and 5
/// straddle a byte boundary. String velocities go to bytes 14..9 in
/// reverse string order.
pub const LAYOUT: &[Field<GuitarSource>] = &[
    Field {
        source: GuitarSource::Fret(0),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 5, 8, 2)],
    },
    Field {
        source: GuitarSource::Fret(1),
        merge: Merge::Or,
        slices: &[BitSlice::new(3, 2, 8, 0), BitSlice::new(0, 3, 7, 5)],
    },
    Field {
        source: GuitarSource::Fret(2),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 5, 7, 0)],
    },
    Field {
        source: GuitarSource::Fret(3),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 5, 6, 2)],
    },
    Field {
        source: GuitarSource::Fret(4),
        merge: Merge::Or,
        slices: &[BitSlice::new(3, 2, 6, 0), BitSlice::new(0, 3, 5, 5)],
    },
    Field {
        source: GuitarSource::Fret(5),
        merge: Merge::Or,
        slices: &[BitSlice::new(0, 5, 5, 0)],
    },
    Field {
        source: GuitarSource::StringVelocity(0),
        merge: Merge::Assign,
        slices: &[BitSlice::byte(14)],
    },
    Field {
        source: GuitarSource::StringVelocity(1),
        merge: Merge::Assign,
        slices: &[BitSlice::byte(13)],
    },
    Field {
        source: GuitarSource::StringVelocity(2),
        merge: Merge::Assign,
        slices: &[BitSlice::byte(12)],
    },
    Field {
        source: GuitarSource::StringVelocity(3),
        merge: Merge::Assign,
        slices: &[BitSlice::byte(11)],
    },
    Field {
        source: GuitarSource::StringVelocity(4),
        merge: Merge::Assign,
        slices: &[BitSlice::byte(10)],
    },
    Field {
        source: GuitarSource::StringVelocity(5),
        merge: Merge::Assign,
        slices: &[BitSlice::byte(9)],
    },
    Field {
        source: GuitarSource::TiltAxis,
        merge: Merge::Or,
        slices: &[
            BitSlice::new(0, 7, 15, 0),
            BitSlice::new(0, 7, 16, 0),
            BitSlice::new(0, 7, 17, 0),
        ],
    },
    Field {
        source: GuitarSource::Select,
        merge: Merge::Or,
        slices: &[BitSlice::flag(1, 0)],
    },
    Field {
        source: GuitarSource::Start,
        merge: Merge::Or,
        slices: &[BitSlice::flag(1, 1)],
    },
    Field {
        source: GuitarSource::Square,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 0)],
    },
    Field {
        source: GuitarSource::Cross,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 1)],
    },
    Field {
        source: GuitarSource::Circle,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 2)],
    },
    Field {
        source: GuitarSource::Triangle,
        merge: Merge::Or,
        slices: &[BitSlice::flag(0, 3)],
    },
    Field {
        source: GuitarSource::Dpad,
        merge: Merge::Assign,
        slices: &[BitSlice::byte(2)],
    },
];

/// Input state of the guitar, held between polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuitarState {
    pub cross: bool,
    pub circle: bool,
    pub square: bool,
    pub triangle: bool,

    pub start: bool,
    pub select: bool,
    pub tilt_sensor: bool,
    /// Sustain pedal, used for overdrive
    pub sustain_pedal: bool,

    /// Hat switch code, low nibble of the button frame
    pub dpad: u8,

    pub frets: [u8; STRING_COUNT],
    pub string_velocities: [u8; STRING_COUNT],

    pub events: u64,
}

impl Default for GuitarState {
    fn default() -> Self {
        Self {
            cross: false,
            circle: false,
            square: false,
            triangle: false,
            start: false,
            select: false,
            tilt_sensor: false,
            sustain_pedal: false,
            dpad: DPAD_NEUTRAL,
            frets: [0; STRING_COUNT],
            string_velocities: [0; STRING_COUNT],
            events: 0,
        }
    }
}

/// Map a 1-based string number from a frame to an array slot
fn string_slot(number: u8) -> Option<usize> {
    (1..=STRING_COUNT as u8)
        .contains(&number)
        .then(|| usize::from(number) - 1)
}

/// Apply one framed MIDI message to the guitar state
pub fn decode(state: &mut GuitarState, msg: &[u8]) {
    state.events = state.events.wrapping_add(1);

    match *msg {
        [STATUS_SYSEX, _, _, _, SELECTOR_FRET, string, note, _] => {
            if let Some(slot) = string_slot(string) {
                state.frets[slot] = data_byte(note).saturating_sub(FRET_OPEN_NOTES[slot]);
                trace!("string {} fret {}", string, state.frets[slot]);
            }
        }
        [STATUS_SYSEX, _, _, _, SELECTOR_STRING, string, velocity, _] => {
            if let Some(slot) = string_slot(string) {
                state.string_velocities[slot] = data_byte(velocity);
                trace!("string {} velocity {}", string, state.string_velocities[slot]);
            }
        }
        [STATUS_SYSEX, _, _, _, SELECTOR_BUTTONS, face, system, extra, _, _] => {
            state.square = face & 0b0000_0001 != 0;
            state.cross = face & 0b0000_0010 != 0;
            state.circle = face & 0b0000_0100 != 0;
            state.triangle = face & 0b0000_1000 != 0;

            state.select = system & 0b0000_0001 != 0;
            state.start = system & 0b0000_0010 != 0;

            state.tilt_sensor = extra & TILT_BIT != 0;
            state.dpad = extra & 0x0F;
        }
        [STATUS_CONTROL_CHANGE, CC_SUSTAIN, value] => {
            state.sustain_pedal = value >= SUSTAIN_THRESHOLD;
        }
        _ => {}
    }
}

impl Instrument for GuitarState {
    type Source = GuitarSource;

    const KIND: DeviceKind = DeviceKind::Guitar;
    const IDENTITY: &'static DeviceIdentity = &IDENTITY;
    const HANDSHAKE: HandshakeTables = HandshakeTables {
        enabled: &ENABLED_RESPONSE,
        disabled: &DISABLED_RESPONSE,
    };
    const BASELINE: Report = BASELINE;
    const LAYOUT: &'static [Field<GuitarSource>] = LAYOUT;

    fn decode(&mut self, msg: &[u8]) {
        decode(self, msg);
    }

    fn field_value(&self, source: GuitarSource) -> Option<u32> {
        let flag = |on: bool| Some(u32::from(on));
        match source {
            GuitarSource::Fret(i) => self.frets.get(i).map(|&fret| u32::from(fret)),
            GuitarSource::StringVelocity(i) => {
                self.string_velocities.get(i).map(|&v| u32::from(v))
            }
            GuitarSource::Square => flag(self.square),
            GuitarSource::Cross => flag(self.cross),
            GuitarSource::Circle => flag(self.circle),
            GuitarSource::Triangle => flag(self.triangle),
            GuitarSource::Select => flag(self.select),
            GuitarSource::Start => flag(self.start),
            GuitarSource::Dpad => Some(u32::from(self.dpad)),
            GuitarSource::TiltAxis => {
                (self.tilt_sensor || self.sustain_pedal).then_some(TILT_AXIS_VALUE)
            }
        }
    }

    fn event_count(&self) -> u64 {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::encode;

    fn fret_frame(string: u8, note: u8) -> [u8; 8] {
        [0xF0, 0x08, 0x40, 0x0A, SELECTOR_FRET, string, note, 0xF7]
    }

    fn string_frame(string: u8, velocity: u8) -> [u8; 8] {
        [0xF0, 0x08, 0x40, 0x0A, SELECTOR_STRING, string, velocity, 0xF7]
    }

    fn button_frame(face: u8, system: u8, extra: u8) -> [u8; 10] {
        [0xF0, 0x08, 0x40, 0x0A, SELECTOR_BUTTONS, face, system, extra, 0x00, 0xF7]
    }

    fn decoded(frames: &[&[u8]]) -> GuitarState {
        let mut state = GuitarState::default();
        for frame in frames {
            decode(&mut state, frame);
        }
        state
    }

    /// Fret packing written out as plain shifts, for cross-checking the table
    fn packed_frets(frets: [u8; 6]) -> [u8; 4] {
        let f = frets.map(|v| v & 0b11111);
        [
            (f[4] & 0b00111) << 5 | f[5],
            f[3] << 2 | (f[4] & 0b11000) >> 3,
            (f[1] & 0b00111) << 5 | f[2],
            f[0] << 2 | (f[1] & 0b11000) >> 3,
        ]
    }

    #[test]
    fn test_fret_frame_subtracts_open_note() {
        let state = decoded(&[&fret_frame(3, 0x57)]);
        assert_eq!(state.frets[2], 0x20);

        let state = decoded(&[&fret_frame(1, 0x45), &fret_frame(6, 0x28)]);
        assert_eq!(state.frets, [5, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_fret_below_open_note_saturates() {
        let state = decoded(&[&fret_frame(1, 0x30)]);
        assert_eq!(state.frets[0], 0);
    }

    #[test]
    fn test_string_out_of_range_ignored() {
        let state = decoded(&[&fret_frame(0, 0x50), &fret_frame(7, 0x50), &string_frame(9, 100)]);

        assert_eq!(state.frets, [0; 6]);
        assert_eq!(state.string_velocities, [0; 6]);
        assert_eq!(state.events, 3);
    }

    #[test]
    fn test_string_velocities_reported_in_reverse() {
        let state = decoded(&[&string_frame(1, 11), &string_frame(2, 22), &string_frame(6, 66)]);
        let report = encode(&state);

        assert_eq!(report.byte(14), 11);
        assert_eq!(report.byte(13), 22);
        assert_eq!(report.byte(9), 66);
        assert_eq!(report.byte(10), 0);
    }

    #[test]
    fn test_button_frame() {
        let state = decoded(&[&button_frame(0b1010, 0b10, 0b0100_0011)]);

        assert!(!state.square);
        assert!(state.cross);
        assert!(!state.circle);
        assert!(state.triangle);
        assert!(!state.select);
        assert!(state.start);
        assert!(state.tilt_sensor);
        assert_eq!(state.dpad, 3);

        let report = encode(&state);
        assert_eq!(report.byte(0), 0b1010);
        assert_eq!(report.byte(1), 0b10);
        assert_eq!(report.byte(2), 3);
    }

    #[test]
    fn test_dpad_is_assigned_not_ored() {
        // Up (0) must clear the neutral 0x08 of the rest report
        let state = decoded(&[&button_frame(0, 0, 0x00)]);
        assert_eq!(encode(&state).byte(2), 0x00);
    }

    #[test]
    fn test_sustain_threshold() {
        let state = decoded(&[&[0xB0, 0x40, 39]]);
        assert!(!state.sustain_pedal);

        let state = decoded(&[&[0xB0, 0x40, 40]]);
        assert!(state.sustain_pedal);

        // Other controllers and channels do nothing
        let state = decoded(&[&[0xB0, 0x01, 127], &[0xB1, 0x40, 127]]);
        assert!(!state.sustain_pedal);
    }

    #[test]
    fn test_tilt_or_sustain_forces_axes() {
        let rest = encode(&GuitarState::default());
        assert_eq!(&rest.as_bytes()[15..18], &[0x40, 0x40, 0x40]);

        let pedal = encode(&decoded(&[&[0xB0, 0x40, 127]]));
        assert_eq!(&pedal.as_bytes()[15..18], &[0x7F, 0x7F, 0x7F]);

        let tilted = encode(&decoded(&[&button_frame(0, 0, TILT_BIT | 0x08)]));
        assert_eq!(&tilted.as_bytes()[15..18], &[0x7F, 0x7F, 0x7F]);
    }

    #[test]
    fn test_fret_packing_matches_shift_table() {
        let cases: [[u8; 6]; 4] = [
            [1, 2, 3, 4, 5, 6],
            [31, 31, 31, 31, 31, 31],
            [0b10101, 0b01010, 0b11001, 0b00110, 0b10011, 0b01100],
            [0x20, 0, 22, 0, 9, 17],
        ];

        for frets in cases {
            let state = GuitarState {
                frets,
                ..GuitarState::default()
            };
            let report = encode(&state);
            assert_eq!(&report.as_bytes()[5..9], &packed_frets(frets), "frets {:?}", frets);
        }
    }

    #[test]
    fn test_third_string_fret_touches_only_byte_seven() {
        let state = decoded(&[&fret_frame(3, 0x37 + 0x15)]);
        let report = encode(&state);

        assert_eq!(report.diff(&BASELINE), vec![7]);
        assert_eq!(report.byte(7), 0x15);

        // 0x20 has no bits inside the 5-bit field
        let state = decoded(&[&fret_frame(3, 0x57)]);
        assert_eq!(encode(&state), BASELINE);
    }

    #[test]
    fn test_straddling_fret_extracts_back() {
        let state = decoded(&[&fret_frame(2, 0x3B + 0b11011), &fret_frame(5, 0x2D + 0b10110)]);
        let report = encode(&state);

        let fret = |i: usize| report.extract(LAYOUT[i].slices);
        assert_eq!(fret(1), 0b11011);
        assert_eq!(fret(4), 0b10110);
        assert_eq!(fret(0), 0);
    }

    #[test]
    fn test_unrecognized_shapes_ignored() {
        let state = decoded(&[
            &[0x90, 60, 100],
            &[0xF0, 0x08, 0x40, 0x0A, SELECTOR_FRET, 1, 0x50],
            &[0xF0, 0x08, 0x40, 0x0A, 0x03, 1, 0x50, 0xF7],
            &[0xF0, 0x08, 0x40, 0x0A, SELECTOR_BUTTONS, 0x0F, 0x03, 0x4F, 0x00],
            &[],
        ]);

        assert_eq!(
            state,
            GuitarState {
                events: 5,
                ..GuitarState::default()
            }
        );
    }

    #[test]
    fn test_state_is_level_held() {
        let mut state = decoded(&[&button_frame(0b0001, 0, 0x08)]);
        assert_eq!(encode(&state).byte(0), 0b0001);
        assert_eq!(encode(&state).byte(0), 0b0001);

        decode(&mut state, &button_frame(0, 0, 0x08));
        assert_eq!(encode(&state).byte(0), 0);
    }
}
