//! HID frame codecs for Winwing cockpit hardware.
//!
//! Every builder in this crate is a pure function over byte buffers; the only
//! side effect anywhere is a single [`ReportSink::write_report`] call per
//! `send_*` helper. Rate limiting, coalescing and retries belong to the
//! plugin's I/O worker, not here.
//!
//! All supported hardware shares one USB vendor id; the product id selects
//! the device family:
//! ```text
//! 0x4098:0xBF0F          PAP3 MCP (LCD + LEDs + A/T solenoid)
//! 0x4098:0xBB10/BC1E/…   FCU with optional EFIS panels
//! 0x4098:0xBB35..=BB40   CDU / MCDU (captain, first officer, observer)
//! ```

pub mod cdu;
pub mod fcu;
pub mod input;
pub mod pap3;
pub mod pap3_lcd;
pub mod seven_segment;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use thiserror::Error;

/// Vendor id shared by every Winwing product.
pub const WINWING_VENDOR_ID: u16 = 0x4098;

// ── DeviceFamily ──────────────────────────────────────────────────────────────

/// Hardware family selected from the USB product id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    Pap3,
    FcuEfis,
    Cdu(cdu::CduHardware, cdu::CduVariant),
}

impl DeviceFamily {
    pub fn from_product_id(pid: u16) -> Option<Self> {
        if pid == pap3::PRODUCT_ID {
            return Some(Self::Pap3);
        }
        if fcu::PRODUCT_IDS.contains(&pid) {
            return Some(Self::FcuEfis);
        }
        cdu::identify(pid).map(|(hw, variant)| Self::Cdu(hw, variant))
    }

    /// Short human-readable family name, used in logs and by the probe CLI.
    pub fn name(&self) -> String {
        match self {
            Self::Pap3 => "PAP3 MCP".to_string(),
            Self::FcuEfis => "FCU-EFIS".to_string(),
            Self::Cdu(hw, variant) => format!("{} ({})", hw.name(), variant.name()),
        }
    }
}

// ── TransportError ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("device is not connected")]
    NotConnected,
    #[error("failed to open HID device {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("HID write failed: {0}")]
    Write(String),
    #[error("HID read failed: {0}")]
    Read(String),
    #[error("short HID write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

// ── ReportSink ────────────────────────────────────────────────────────────────

/// Anything that accepts one outbound HID report per call.
///
/// `Send + Sync` so a sink can be shared between the I/O worker thread and the
/// startup sequence on the main thread.
pub trait ReportSink: Send + Sync {
    /// Write one report. Returns the number of bytes the device accepted.
    fn write_report(&self, data: &[u8]) -> Result<usize, TransportError>;
}

/// Write `data` to `sink`, treating a missing sink or any error as failure.
pub(crate) fn write_to(sink: Option<&dyn ReportSink>, data: &[u8]) -> bool {
    match sink {
        Some(s) => matches!(s.write_report(data), Ok(n) if n == data.len()),
        None => false,
    }
}

// ── RecordingSink ─────────────────────────────────────────────────────────────

/// Test sink: records every report and can be told to fail writes.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Vec<u8>>>,
    fail:    AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every report written so far.
    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut r) = self.reports.lock() {
            r.clear();
        }
    }

    /// Make every subsequent write fail with [`TransportError::NotConnected`].
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ReportSink for RecordingSink {
    fn write_report(&self, data: &[u8]) -> Result<usize, TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut r = self.reports.lock().map_err(|e| TransportError::Write(e.to_string()))?;
        r.push(data.to_vec());
        Ok(data.len())
    }
}
