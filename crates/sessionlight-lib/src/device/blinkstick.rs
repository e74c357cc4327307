//! BlinkStick USB LED strips (WS2812, GRB wire order).
//!
//! Colors go out as a single HID SET_REPORT feature report:
//!
//! ```text
//! [report_id, channel=0, g0, r0, b0, g1, r1, b1, ...]
//! ```
//!
//! The report id selects the payload size; LEDs beyond the lit count are sent
//! black. The opened USB interface is cached between calls and dropped after a
//! failed transfer.

use std::time::Duration;

use super::{AdapterKind, DeviceAdapter, DeviceError, Result, RetryPolicy};
use crate::led::{RenderOptions, Rgb};

pub const BLINKSTICK_VID: u16 = 0x20A0;
pub const BLINKSTICK_PID: u16 = 0x41E5;

/// HID class request SET_REPORT.
pub const HID_SET_REPORT: u8 = 0x09;

pub const DEFAULT_TOTAL_LEDS: u8 = 8;
pub const MAX_LEDS: u8 = 64;

/// Wait after opening before the first transfer.
pub const CONNECT_SETTLE: Duration = Duration::from_millis(200);
/// Wait after a transfer so the controller latches the frame.
pub const SEND_SETTLE: Duration = Duration::from_millis(10);

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const USB_TIMEOUT: Duration = Duration::from_millis(1000);

/// Feature report id and LED capacity for a strip of `total` LEDs.
pub fn report_for(total: u8) -> (u8, usize) {
    match total {
        0..=8 => (6, 8),
        9..=16 => (7, 16),
        17..=32 => (8, 32),
        _ => (9, 64),
    }
}

/// Build the LED-data feature report: `lit` LEDs in `color`, the rest off,
/// padded to the report's capacity.
pub fn build_led_report(color: Rgb, lit: u8, total: u8) -> Vec<u8> {
    let total = total.clamp(1, MAX_LEDS);
    let lit = lit.min(total);
    let (report_id, capacity) = report_for(total);

    let mut report = Vec::with_capacity(2 + capacity * 3);
    report.push(report_id);
    report.push(0); // channel
    for i in 0..capacity {
        if i < usize::from(lit) {
            report.extend_from_slice(&color.grb());
        } else {
            report.extend_from_slice(&[0, 0, 0]);
        }
    }
    report
}

pub struct BlinkStickAdapter {
    name: String,
    total_leds: u8,
    retry: RetryPolicy,
    handle: Option<usb::Handle>,
}

impl BlinkStickAdapter {
    pub fn new(name: &str, total_leds: Option<u8>, retry: RetryPolicy) -> Self {
        BlinkStickAdapter {
            name: name.to_string(),
            total_leds: total_leds.unwrap_or(DEFAULT_TOTAL_LEDS).clamp(1, MAX_LEDS),
            retry,
            handle: None,
        }
    }

    pub fn total_leds(&self) -> u8 {
        self.total_leds
    }

    fn handle(&mut self) -> Result<&usb::Handle> {
        if self.handle.is_none() {
            let handle = usb::open()?;
            std::thread::sleep(CONNECT_SETTLE);
            log::debug!("{}: connected", self.name);
            self.handle = Some(handle);
        }
        self.handle.as_ref().ok_or(DeviceError::NotFound)
    }

    fn send(&mut self, report: &[u8]) -> Result<()> {
        let result = self.handle().and_then(|h| h.send_feature_report(report));
        match result {
            Ok(()) => {
                std::thread::sleep(SEND_SETTLE);
                Ok(())
            }
            Err(e) => {
                self.handle = None;
                Err(e)
            }
        }
    }
}

impl DeviceAdapter for BlinkStickAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::BlinkStick
    }

    fn probe(&mut self) -> bool {
        self.handle.is_some() || usb::is_present()
    }

    fn apply(&mut self, color: Rgb, render: &RenderOptions) -> bool {
        let lit = render.led_count.unwrap_or(self.total_leds);
        let report = build_led_report(color, lit, self.total_leds);
        let label = format!("{}: set {color}", self.name);
        let retry = self.retry;
        retry.run(&label, |_| self.send(&report)).is_ok()
    }

    fn release(&mut self) {
        if self.handle.take().is_some() {
            log::debug!("{}: released", self.name);
        }
    }
}

#[cfg(target_os = "linux")]
mod usb {
    use nusb::transfer::{Control, ControlType, Recipient};

    use super::*;

    pub struct Handle {
        interface: nusb::Interface,
    }

    fn find() -> Result<nusb::DeviceInfo> {
        nusb::list_devices()
            .map_err(|e| DeviceError::OpenFailed(format!("USB enumeration: {e}")))?
            .find(|dev| dev.vendor_id() == BLINKSTICK_VID && dev.product_id() == BLINKSTICK_PID)
            .ok_or(DeviceError::NotFound)
    }

    pub fn is_present() -> bool {
        find().is_ok()
    }

    pub fn open() -> Result<Handle> {
        let info = find()?;
        let device = info
            .open()
            .map_err(|e| DeviceError::OpenFailed(format!("USB open: {e}")))?;
        // nusb detaches the usbhid driver on claim
        let interface = device
            .claim_interface(0)
            .map_err(|e| DeviceError::OpenFailed(format!("claim interface 0: {e}")))?;
        Ok(Handle { interface })
    }

    impl Handle {
        pub fn send_feature_report(&self, report: &[u8]) -> Result<()> {
            let report_id = report.first().copied().unwrap_or(0);
            let control = Control {
                control_type: ControlType::Class,
                recipient: Recipient::Device,
                request: HID_SET_REPORT,
                value: u16::from(report_id),
                index: 0,
            };
            self.interface
                .control_out_blocking(control, report, USB_TIMEOUT)
                .map_err(|e| DeviceError::WriteFailed(format!("SET_REPORT({report_id}): {e}")))?;
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod usb {
    use super::*;

    pub struct Handle;

    pub fn is_present() -> bool {
        false
    }

    pub fn open() -> Result<Handle> {
        Err(DeviceError::NotFound)
    }

    impl Handle {
        pub fn send_feature_report(&self, _report: &[u8]) -> Result<()> {
            Err(DeviceError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_id_by_strip_size() {
        assert_eq!(report_for(1), (6, 8));
        assert_eq!(report_for(8), (6, 8));
        assert_eq!(report_for(9), (7, 16));
        assert_eq!(report_for(16), (7, 16));
        assert_eq!(report_for(32), (8, 32));
        assert_eq!(report_for(64), (9, 64));
    }

    #[test]
    fn report_header_and_length() {
        let report = build_led_report(Rgb::new(0xFF, 0, 0), 8, 8);
        assert_eq!(report[0], 6);
        assert_eq!(report[1], 0);
        assert_eq!(report.len(), 2 + 8 * 3);
    }

    #[test]
    fn report_is_grb_ordered() {
        let report = build_led_report(Rgb::new(0x11, 0x22, 0x33), 1, 8);
        assert_eq!(&report[2..5], &[0x22, 0x11, 0x33]);
    }

    #[test]
    fn unlit_leds_are_black() {
        let report = build_led_report(Rgb::new(0xFF, 0xFF, 0xFF), 2, 8);
        assert!(report[2..8].iter().all(|&b| b == 0xFF));
        assert!(report[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn lit_count_capped_at_total() {
        let report = build_led_report(Rgb::new(0, 0xFF, 0), 20, 8);
        assert_eq!(report.len(), 2 + 8 * 3);
        assert!(report[2..].chunks(3).all(|c| c == [0xFF, 0, 0]));
    }

    #[test]
    fn off_report_is_all_zero() {
        let report = build_led_report(Rgb::OFF, 8, 16);
        assert_eq!(report[0], 7);
        assert!(report[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn partial_strip_pads_to_capacity() {
        // 12 LEDs use the 16-LED report; LEDs 12..16 stay black
        let report = build_led_report(Rgb::new(1, 2, 3), 12, 12);
        assert_eq!(report.len(), 2 + 16 * 3);
        assert_eq!(&report[2 + 11 * 3..2 + 12 * 3], &[2, 1, 3]);
        assert!(report[2 + 12 * 3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn adapter_defaults_and_clamps() {
        let a = BlinkStickAdapter::new("strip", None, RetryPolicy::once());
        assert_eq!(a.total_leds(), DEFAULT_TOTAL_LEDS);
        assert_eq!(a.kind(), AdapterKind::BlinkStick);
        let big = BlinkStickAdapter::new("strip", Some(200), RetryPolicy::once());
        assert_eq!(big.total_leds(), MAX_LEDS);
    }

    #[test]
    fn release_is_idempotent() {
        let mut a = BlinkStickAdapter::new("strip", None, RetryPolicy::once());
        a.release();
        a.release();
        assert!(a.handle.is_none());
    }
}
