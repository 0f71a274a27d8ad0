//! Tests for the emulated devices

use super::*;
use crate::handshake::{HandshakeState, HANDSHAKE_LEN, SELECTOR_DISABLE, SELECTOR_ENABLE};
use crate::instrument::{guitar, keyboard};
use crate::midi::MidiSender;
use crate::report::REPORT_LEN;
use crate::usb::TransferStatus;

fn guitar_device() -> (MidiSender, GuitarAdapter) {
    let (tx, inbox) = MidiInbox::channel();
    (tx, GuitarAdapter::with_inbox(inbox))
}

fn keyboard_device() -> (MidiSender, KeyboardAdapter) {
    let (tx, inbox) = MidiInbox::channel();
    (tx, KeyboardAdapter::with_inbox(inbox))
}

fn configure<D: UsbDevice>(device: &mut D, selector: u8) -> TransferOutcome {
    let mut payload = [0u8; HANDSHAKE_LEN];
    payload[2] = selector;
    device.handle_control(&SetupPacket::set_report(HANDSHAKE_LEN as u16), &mut payload)
}

fn read_handshake<D: UsbDevice>(device: &mut D, chunk: u16) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < HANDSHAKE_LEN {
        let mut buf = vec![0u8; usize::from(chunk)];
        let outcome = device.handle_control(&SetupPacket::get_report(chunk), &mut buf);
        assert!(outcome.is_completed());
        out.extend_from_slice(&buf[..outcome.actual_length]);
    }
    out.truncate(HANDSHAKE_LEN);
    out
}

/// Records every request that reaches it and answers with a fixed length
struct RecordingFallback {
    seen: Arc<Mutex<Vec<SetupPacket>>>,
}

impl ControlFallback for RecordingFallback {
    fn control_transfer(&mut self, setup: &SetupPacket, data: &mut [u8]) -> TransferOutcome {
        self.seen.lock().push(*setup);
        data.fill(0x12);
        TransferOutcome::synthetic(data.len())
    }
}

#[test]
fn test_poll_applies_queued_messages_in_order() {
    let (tx, mut device) = keyboard_device();
    tx.send(vec![0x90, 60, 100]).unwrap();
    tx.send(vec![0x80, 60, 0]).unwrap();

    let report = device.poll();

    assert!(!device.state().keys[12]);
    assert_eq!(device.state().velocities[12], 0);
    assert_eq!(device.state().events, 2);
    assert_eq!(report.byte(6), 0);
}

#[test]
fn test_poll_applies_both_guitar_frames_before_encoding() {
    let (tx, mut device) = guitar_device();
    tx.send(vec![0xF0, 0x08, 0x40, 0x0A, 0x01, 3, 0x37 + 9, 0xF7]).unwrap();
    tx.send(vec![0xF0, 0x08, 0x40, 0x0A, 0x05, 1, 90, 0xF7]).unwrap();

    let report = device.poll();

    assert_eq!(report.byte(7), 9);
    assert_eq!(report.byte(14), 90);
    assert_eq!(device.inbox().pending(), 0);
}

#[test]
fn test_empty_poll_is_idempotent() {
    let (tx, mut device) = keyboard_device();
    tx.send(vec![0x90, 50, 64]).unwrap();
    tx.send(vec![0xE0, 0x00, 0x00]).unwrap();

    let first = device.poll();
    let second = device.poll();
    let third = device.poll();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(device.state().events, 2);
}

#[test]
fn test_inert_inbox_reports_baseline() {
    let mut device = GuitarAdapter::with_inbox(MidiInbox::inert());

    for _ in 0..3 {
        assert_eq!(device.poll(), guitar::BASELINE);
    }
    assert!(!device.inbox().is_connected());
}

#[test]
fn test_reporting_is_not_gated_by_handshake() {
    let (tx, mut device) = keyboard_device();
    tx.send(vec![0x90, keyboard::NOTE_OVERDRIVE, 1]).unwrap();

    assert_eq!(device.handshake().state(), HandshakeState::Disabled);
    assert_eq!(device.poll().byte(13), 0x80);
}

#[test]
fn test_handshake_enable_then_read_back() {
    let (_tx, mut device) = guitar_device();

    let outcome = configure(&mut device, SELECTOR_ENABLE);
    assert!(outcome.is_completed());
    assert_eq!(outcome.actual_length, HANDSHAKE_LEN);
    assert!(device.handshake().is_enabled());

    assert_eq!(read_handshake(&mut device, 8), guitar::ENABLED_RESPONSE.to_vec());
}

#[test]
fn test_handshake_tables_are_per_variant() {
    let (_tx, mut device) = keyboard_device();

    configure(&mut device, SELECTOR_DISABLE);
    assert_eq!(read_handshake(&mut device, 40), keyboard::DISABLED_RESPONSE.to_vec());

    let (_tx, mut device) = guitar_device();
    configure(&mut device, SELECTOR_DISABLE);
    assert_eq!(read_handshake(&mut device, 16), guitar::DISABLED_RESPONSE.to_vec());
}

#[test]
fn test_unknown_selector_changes_nothing() {
    let (_tx, mut device) = guitar_device();
    configure(&mut device, SELECTOR_ENABLE);
    device.handle_control(&SetupPacket::get_report(8), &mut [0u8; 8]);

    let outcome = configure(&mut device, 0x55);

    assert!(outcome.is_completed());
    assert!(device.handshake().is_enabled());
    assert_eq!(device.handshake().cursor(), 8);
}

#[test]
fn test_led_report_is_not_forwarded() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let fallback = RecordingFallback { seen: seen.clone() };
    let mut device = GuitarAdapter::new(MidiInbox::inert(), Box::new(fallback));

    let outcome = device.handle_control(&SetupPacket::set_report(8), &mut [0xFFu8; 8]);

    assert!(outcome.is_completed());
    assert!(seen.lock().is_empty());
    assert_eq!(device.handshake().state(), HandshakeState::Disabled);
}

#[test]
fn test_other_requests_reach_fallback() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let fallback = RecordingFallback { seen: seen.clone() };
    let mut device = KeyboardAdapter::new(MidiInbox::inert(), Box::new(fallback));

    let get_descriptor = SetupPacket::new(0x80, 0x06, 0x0100, 0, 18);
    let mut buf = [0u8; 18];
    let outcome = device.handle_control(&get_descriptor, &mut buf);

    assert_eq!(outcome.actual_length, 18);
    assert_eq!(buf, [0x12; 18]);
    assert_eq!(seen.lock().as_slice(), &[get_descriptor]);
}

#[test]
fn test_default_fallback_stalls() {
    let mut device = GuitarAdapter::with_inbox(MidiInbox::inert());
    let outcome = device.handle_control(&SetupPacket::new(0x00, 0x09, 1, 0, 0), &mut []);

    assert_eq!(outcome.status, TransferStatus::Stalled);
}

#[test]
fn test_interrupt_transfer_zero_fills() {
    let mut device = GuitarAdapter::with_inbox(MidiInbox::inert());

    let mut buf = [0xFFu8; 64];
    let outcome = device.interrupt_transfer(&mut buf);

    assert!(outcome.synthetic);
    assert_eq!(outcome.actual_length, 64);
    assert_eq!(&buf[..REPORT_LEN], guitar::BASELINE.as_bytes());
    assert!(buf[REPORT_LEN..].iter().all(|&b| b == 0));

    let mut short = [0xFFu8; 4];
    device.interrupt_transfer(&mut short);
    assert_eq!(short, [0x00, 0x00, 0x08, 0x80]);
}

#[test]
fn test_build_device_selects_variant() {
    let guitar = build_device(DeviceKind::Guitar, MidiInbox::inert(), Box::new(StallingFallback));
    let keyboard = build_device(DeviceKind::Keyboard, MidiInbox::inert(), Box::new(StallingFallback));

    assert_eq!(guitar.identity().product_id, 0x2438);
    assert_eq!(keyboard.identity().product_id, 0x2338);

    let mut keyboard = keyboard;
    assert_eq!(keyboard.poll(), encode(&KeyboardState::default()));
}

fn assert_send<T: Send>() {}

#[test]
fn test_devices_can_move_between_threads() {
    assert_send::<MidiInbox>();
    assert_send::<GuitarAdapter>();
    assert_send::<KeyboardAdapter>();
    assert_send::<Box<dyn UsbDevice>>();
    assert_send::<SharedDevice<KeyboardAdapter>>();
    assert_send::<SharedDevice<Box<dyn UsbDevice>>>();
}

#[test]
fn test_shared_device_polled_from_another_thread() {
    let (tx, device) = keyboard_device();
    let mut control = SharedDevice::new(device);
    let mut interrupt = control.clone();

    tx.send(vec![0x90, keyboard::NOTE_CROSS, 1]).unwrap();

    let poller = std::thread::spawn(move || {
        let mut buf = [0u8; REPORT_LEN];
        interrupt.interrupt_transfer(&mut buf);
        (buf, interrupt.identity().product_id)
    });

    let outcome = configure(&mut control, SELECTOR_ENABLE);
    let (buf, product_id) = poller.join().unwrap();

    assert!(outcome.is_completed());
    assert_eq!(buf[0], 0b10);
    assert_eq!(product_id, 0x2338);
    assert!(control.lock().handshake().is_enabled());
    assert!(control.lock().state().cross);
    assert_eq!(control.lock().inbox().pending(), 0);
}

#[test]
fn test_shared_device_handshake_seen_by_other_thread() {
    let (_tx, device) = guitar_device();
    let mut control = SharedDevice::new(build_boxed(device));
    let mut reader = control.clone();

    configure(&mut control, SELECTOR_ENABLE);

    let answer = std::thread::spawn(move || read_handshake(&mut reader, 8))
        .join()
        .unwrap();

    assert_eq!(answer, guitar::ENABLED_RESPONSE.to_vec());
}

fn build_boxed<D: UsbDevice + 'static>(device: D) -> Box<dyn UsbDevice> {
    Box::new(device)
}
