//! USB transfer plumbing shared by the emulated adapters
//!
//! The host's dispatcher owns the bus model, the descriptor tree and the
//! standard requests. This module only describes what crosses the seam:
//! the setup packet of a control transfer, the synthetic completion we hand
//! back, and the capability interface every emulated device implements.

use std::time::Duration;

use tracing::debug;

use crate::report::{Report, REPORT_LEN};

/// bmRequestType for class requests to the interface, host to device
pub const REQUEST_TYPE_CLASS_OUT: u8 = 0x21;

/// bmRequestType for class requests to the interface, device to host
pub const REQUEST_TYPE_CLASS_IN: u8 = 0xA1;

/// HID GET_REPORT request code
pub const HID_REQUEST_GET_REPORT: u8 = 0x01;

/// HID SET_REPORT request code
pub const HID_REQUEST_SET_REPORT: u8 = 0x09;

/// Completion time reported for every transfer we answer ourselves.
///
/// The real adapter takes about 8ms per interrupt transfer; nothing on the
/// host side depends on that, so we answer faster.
pub const SYNTHETIC_LATENCY: Duration = Duration::from_millis(1);

/// Setup stage of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// Class SET_REPORT (output report 0) carrying `length` payload bytes
    pub fn set_report(length: u16) -> Self {
        Self::new(REQUEST_TYPE_CLASS_OUT, HID_REQUEST_SET_REPORT, 0x0200, 0, length)
    }

    /// Class GET_REPORT (feature report 0) reading up to `length` bytes
    pub fn get_report(length: u16) -> Self {
        Self::new(REQUEST_TYPE_CLASS_IN, HID_REQUEST_GET_REPORT, 0x0300, 0, length)
    }

    pub fn is_set_report(&self) -> bool {
        self.request_type == REQUEST_TYPE_CLASS_OUT && self.request == HID_REQUEST_SET_REPORT
    }

    pub fn is_get_report(&self) -> bool {
        self.request_type == REQUEST_TYPE_CLASS_IN && self.request == HID_REQUEST_GET_REPORT
    }
}

/// Final state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Stalled,
}

/// What the device hands back to the dispatcher for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub status: TransferStatus,
    /// Bytes the host should consider transferred
    pub actual_length: usize,
    /// Time until the dispatcher should report completion
    pub latency: Duration,
    /// True when the outcome was produced without touching a real bus
    pub synthetic: bool,
}

impl TransferOutcome {
    /// Immediate successful completion with the nominal latency
    pub fn synthetic(actual_length: usize) -> Self {
        Self {
            status: TransferStatus::Completed,
            actual_length,
            latency: SYNTHETIC_LATENCY,
            synthetic: true,
        }
    }

    pub fn stalled() -> Self {
        Self {
            status: TransferStatus::Stalled,
            actual_length: 0,
            latency: SYNTHETIC_LATENCY,
            synthetic: true,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

/// Static identity of an emulated adapter, as its descriptors advertise it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub interrupt_in_endpoint: u8,
    pub interrupt_out_endpoint: u8,
    pub max_packet_size: u16,
    /// Interrupt endpoint polling interval in milliseconds
    pub interval_ms: u8,
}

/// Generic control-transfer handling provided by the host's device model.
///
/// Standard requests (descriptors, configuration, interface selection) are
/// answered here. Emulated adapters forward every request they don't own.
/// Fallbacks travel with their device to the host's dispatch thread.
pub trait ControlFallback: Send {
    fn control_transfer(&mut self, setup: &SetupPacket, data: &mut [u8]) -> TransferOutcome;
}

/// Fallback for hosts that have no generic device model: stalls everything
#[derive(Debug, Default, Clone, Copy)]
pub struct StallingFallback;

impl ControlFallback for StallingFallback {
    fn control_transfer(&mut self, setup: &SetupPacket, _data: &mut [u8]) -> TransferOutcome {
        debug!(
            "Stalling unhandled control request type=0x{:02X} req=0x{:02X} len={}",
            setup.request_type, setup.request, setup.length
        );
        TransferOutcome::stalled()
    }
}

/// Capability interface of an emulated USB peripheral.
///
/// The dispatcher never calls these concurrently for one device, but it may
/// call them from a thread other than the one that built it.
pub trait UsbDevice: Send {
    fn identity(&self) -> &'static DeviceIdentity;

    /// Answer one control transfer. `data` holds the OUT payload, or is the
    /// buffer to fill for IN requests.
    fn handle_control(&mut self, setup: &SetupPacket, data: &mut [u8]) -> TransferOutcome;

    /// Drain pending input and produce the current input report
    fn poll(&mut self) -> Report;

    /// Answer one interrupt IN transfer with the current report.
    ///
    /// The buffer is zero-filled first; at most one report's worth is copied.
    fn interrupt_transfer(&mut self, buf: &mut [u8]) -> TransferOutcome {
        buf.fill(0);
        let report = self.poll();
        let len = buf.len().min(REPORT_LEN);
        buf[..len].copy_from_slice(&report.as_bytes()[..len]);
        TransferOutcome::synthetic(buf.len())
    }
}

impl<D: UsbDevice + ?Sized> UsbDevice for Box<D> {
    fn identity(&self) -> &'static DeviceIdentity {
        (**self).identity()
    }

    fn handle_control(&mut self, setup: &SetupPacket, data: &mut [u8]) -> TransferOutcome {
        (**self).handle_control(setup, data)
    }

    fn poll(&mut self) -> Report {
        (**self).poll()
    }

    fn interrupt_transfer(&mut self, buf: &mut [u8]) -> TransferOutcome {
        (**self).interrupt_transfer(buf)
    }
}
