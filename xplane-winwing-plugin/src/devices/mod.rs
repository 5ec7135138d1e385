//! Device drivers, one per hardware family.
//!
//! A driver owns its HID session: the reader thread feeding input reports to
//! the flight loop, the I/O worker draining outbound commands, and the aircraft
//! profile that maps both onto the simulator. Everything except the two
//! threads runs on the X-Plane main thread.

pub mod cdu;
pub mod fcu;
pub mod pap3;

pub use cdu::CduDevice;
pub use fcu::FcuEfisDevice;
pub use pap3::Pap3Device;

use std::time::{Duration, Instant};

use tracing::{debug, warn};
use winwing_protocol::{ReportSink, TransportError};

use crate::datarefs::DatarefStore;
use crate::hid::{DeviceIo, ReaderEvent, ReaderThread};
use crate::io_worker::{IoSender, IoWorker, OutputState, WireFormat};
use crate::xplm_shim::CommandPhase;

/// How long `connect` waits for the first input report.
pub const FIRST_REPORT_TIMEOUT: Duration = Duration::from_secs(1);

pub trait Device: Send {
    /// Stable name used in logs, e.g. `"Product-PAP3"`.
    fn class_identifier(&self) -> &'static str;

    /// Run the startup sequence, start the I/O threads and pick a profile.
    /// Returns `false` if the device could not be brought up.
    fn connect(&mut self, store: &DatarefStore) -> bool;

    /// One flight-loop tick: replay input, re-poll the profile, queue output.
    fn update(&mut self, store: &DatarefStore, now: Instant);

    /// Stop the threads, put outputs in a safe state and release the handle.
    fn disconnect(&mut self, store: &DatarefStore);

    fn is_connected(&self) -> bool;

    /// `true` once the driver no longer needs to look for an aircraft profile.
    fn profile_ready(&self) -> bool;
}

/// Command phase for a key given its previous and current pressed state.
pub(crate) fn button_phase(was: bool, now: bool) -> Option<CommandPhase> {
    match (was, now) {
        (false, true) => Some(CommandPhase::Begin),
        (true, true) => Some(CommandPhase::Continue),
        (true, false) => Some(CommandPhase::End),
        (false, false) => None,
    }
}

// ── DeviceLink ────────────────────────────────────────────────────────────────

/// Input gathered since the last tick.
#[derive(Debug, Default)]
pub(crate) struct Inbound {
    pub reports: Vec<Vec<u8>>,
    /// Set when the reader hit a transport error, or the I/O worker gave up
    /// on writes. Either way that thread has exited.
    pub failure: Option<TransportError>,
}

/// The HID half every driver shares: handle, reader thread and I/O worker.
pub(crate) struct DeviceLink {
    name:   &'static str,
    io:     DeviceIo,
    worker: Option<IoWorker>,
    tx:     Option<IoSender>,
    reader: Option<ReaderThread>,
}

impl DeviceLink {
    pub fn new(name: &'static str, io: DeviceIo) -> Self {
        Self { name, io, worker: None, tx: None, reader: None }
    }

    /// Direct, blocking access to the device. Only for startup and shutdown
    /// sequences that run before the worker exists or after it stopped.
    pub fn sink(&self) -> &dyn ReportSink {
        self.io.sink.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn start(&mut self, wire: Box<dyn WireFormat>, output: OutputState) -> bool {
        let worker = match IoWorker::spawn(self.name, self.io.sink.clone(), wire, output) {
            Ok(w) => w,
            Err(e) => {
                warn!(device = self.name, error = %e, "could not start I/O worker");
                return false;
            }
        };
        let reader = match ReaderThread::spawn(self.name, self.io.source.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!(device = self.name, error = %e, "could not start HID reader");
                return false;
            }
        };
        self.tx = Some(worker.sender());
        self.worker = Some(worker);
        self.reader = Some(reader);
        debug!(device = self.name, "I/O threads started");
        true
    }

    /// Queue handle for the I/O worker; `None` while stopped.
    pub fn sender(&self) -> Option<&IoSender> {
        self.tx.as_ref()
    }

    /// Block up to `timeout` for the first input report.
    pub fn wait_report(&self, timeout: Duration) -> Option<Vec<u8>> {
        let reader = self.reader.as_ref()?;
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match reader.recv_timeout(left)? {
                ReaderEvent::Report(r) if !r.is_empty() => return Some(r),
                ReaderEvent::Report(_) => {}
                ReaderEvent::Failed(e) => {
                    warn!(device = self.name, error = %e, "no initial input report");
                    return None;
                }
            }
        }
    }

    /// Everything the reader produced since the last call, in arrival order.
    pub fn poll(&self) -> Inbound {
        let mut inbound = Inbound::default();
        if let Some(reader) = self.reader.as_ref() {
            for ev in reader.try_iter() {
                match ev {
                    ReaderEvent::Report(r) => inbound.reports.push(r),
                    ReaderEvent::Failed(e) => {
                        warn!(device = self.name, error = %e, "HID read failed, device lost");
                        inbound.failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = self.worker.as_ref().and_then(IoWorker::failure) {
            warn!(device = self.name, error = %e, "HID write failed, device lost");
            inbound.failure.get_or_insert(e);
        }
        inbound
    }

    /// Stop both threads, each waiting a bounded time. Commands still queued
    /// are dropped.
    pub fn stop(&mut self) {
        self.tx = None;
        if let Some(mut r) = self.reader.take() {
            r.stop();
        }
        if let Some(mut w) = self.worker.take() {
            w.stop();
        }
    }

    pub fn close(&self) {
        self.io.source.close();
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::thread;

    use winwing_protocol::RecordingSink;

    use crate::hid::testing::ScriptedSource;
    use crate::hid::DeviceIo;

    pub fn make_io() -> (DeviceIo, Arc<RecordingSink>, Arc<ScriptedSource>) {
        let sink = Arc::new(RecordingSink::new());
        let source = Arc::new(ScriptedSource::new());
        let io = DeviceIo { sink: sink.clone(), source: source.clone() };
        (io, sink, source)
    }

    /// Wait until `pred` holds for the recorded reports, or two seconds pass.
    pub fn wait_for(sink: &RecordingSink, pred: impl Fn(&[Vec<u8>]) -> bool) -> bool {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            if pred(&sink.reports()) {
                return true;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::io_worker::{Pap3Wire, WRITE_FAILURE_LIMIT};

    #[test]
    fn button_edges_become_phases() {
        assert_eq!(button_phase(false, true), Some(CommandPhase::Begin));
        assert_eq!(button_phase(true, true), Some(CommandPhase::Continue));
        assert_eq!(button_phase(true, false), Some(CommandPhase::End));
        assert_eq!(button_phase(false, false), None);
    }

    #[test]
    fn link_waits_for_first_report_and_polls_the_rest() {
        let (io, _sink, source) = make_io();
        source.push(vec![0x01, 0xAA]);
        let mut link = DeviceLink::new("test", io);
        assert!(link.start(Box::new(Pap3Wire::new()), OutputState::new()));
        assert_eq!(link.wait_report(FIRST_REPORT_TIMEOUT), Some(vec![0x01, 0xAA]));

        source.push(vec![0x01, 0xBB]);
        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        while got.is_empty() && Instant::now() < deadline {
            got = link.poll().reports;
        }
        assert_eq!(got, vec![vec![0x01, 0xBB]]);
        link.stop();
        assert!(link.sender().is_none());
    }

    #[test]
    fn read_failure_is_reported_once() {
        let (io, _sink, source) = make_io();
        source.set_failing(true);
        let mut link = DeviceLink::new("test", io);
        assert!(link.start(Box::new(Pap3Wire::new()), OutputState::new()));
        assert_eq!(link.wait_report(Duration::from_millis(200)), None);
        link.stop();
    }

    #[test]
    fn rejected_writes_end_up_as_a_lost_device() {
        let (io, sink, _source) = make_io();
        sink.set_failing(true);
        let mut link = DeviceLink::new("test", io);
        assert!(link.start(Box::new(Pap3Wire::new()), OutputState::new()));
        assert!(link.sender().is_some_and(|tx| tx.set_solenoid(false)));

        let deadline = Instant::now() + WRITE_FAILURE_LIMIT + Duration::from_secs(2);
        let mut failure = None;
        while failure.is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
            failure = link.poll().failure;
        }
        assert!(matches!(failure, Some(TransportError::Write(_))), "got {failure:?}");
        link.stop();
    }
}
