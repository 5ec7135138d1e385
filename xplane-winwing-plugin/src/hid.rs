//! HID transport: one shared handle per attached device, a report sink for
//! the I/O worker and a reader thread that feeds input reports back to the
//! flight loop.
//!
//! macOS opens HID devices exclusively, so reads and writes go through the
//! same handle behind a mutex. A write waits for at most one read timeout,
//! which is why [`READ_TIMEOUT_MS`] is kept to a couple of milliseconds.

use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryIter};
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use winwing_protocol::{ReportSink, TransportError};

use crate::io_worker::{join_within, STOP_TIMEOUT};

/// Upper bound for one blocking read. It is also how long a queued write can
/// wait for the handle, and how late the reader notices `stop`.
pub const READ_TIMEOUT_MS: i32 = 2;

/// Largest input report any supported device sends (report id included).
pub const INPUT_REPORT_LEN: usize = 65;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Where input reports come from. `Ok(0)` means the timeout elapsed.
pub trait ReportSource: Send + Sync {
    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError>;

    fn close(&self) {}
}

// ── HidLink ───────────────────────────────────────────────────────────────────

pub struct HidLink {
    device: Mutex<Option<HidDevice>>,
    path:   CString,
}

impl HidLink {
    pub fn open(api: &HidApi, path: &CStr) -> Result<Self, TransportError> {
        let device = api.open_path(path).map_err(|e| TransportError::Open {
            path:   path.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self { device: Mutex::new(Some(device)), path: path.to_owned() })
    }

    pub fn path(&self) -> &CStr {
        &self.path
    }

    /// Drop the handle. Later reads and writes fail with `NotConnected`.
    pub fn shutdown(&self) {
        if self.device.lock().take().is_some() {
            debug!(path = %self.path.to_string_lossy(), "HID handle closed");
        }
    }
}

impl ReportSink for HidLink {
    fn write_report(&self, report: &[u8]) -> Result<usize, TransportError> {
        let guard = self.device.lock();
        let dev = guard.as_ref().ok_or(TransportError::NotConnected)?;
        dev.write(report).map_err(|e| TransportError::Write(e.to_string()))
    }
}

impl ReportSource for HidLink {
    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let guard = self.device.lock();
        let dev = guard.as_ref().ok_or(TransportError::NotConnected)?;
        dev.read_timeout(buf, timeout_ms).map_err(|e| TransportError::Read(e.to_string()))
    }

    fn close(&self) {
        self.shutdown();
    }
}

/// Both halves of one device handle.
#[derive(Clone)]
pub struct DeviceIo {
    pub sink:   Arc<dyn ReportSink>,
    pub source: Arc<dyn ReportSource>,
}

impl DeviceIo {
    pub fn from_link(link: HidLink) -> Self {
        let link = Arc::new(link);
        Self { sink: link.clone(), source: link }
    }
}

// ── Reader thread ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    Report(Vec<u8>),
    /// The read failed; the thread has exited.
    Failed(TransportError),
}

/// Blocking reads on a background thread. Reports are replayed on the flight
/// loop in arrival order.
pub struct ReaderThread {
    rx:     Receiver<ReaderEvent>,
    stop:   Arc<AtomicBool>,
    done:   Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderThread {
    pub fn spawn(name: &str, source: Arc<dyn ReportSource>) -> std::io::Result<Self> {
        let (tx, rx) = unbounded();
        let (done_tx, done) = bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("winwing-rx-{name}"))
            .spawn(move || {
                let _done = done_tx;
                read_loop(source.as_ref(), &tx, &stop_flag);
            })?;
        Ok(Self { rx, stop, done, thread: Some(thread) })
    }

    pub fn try_iter(&self) -> TryIter<'_, ReaderEvent> {
        self.rx.try_iter()
    }

    /// Wait for the next event; `None` on timeout or after the thread exited.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ReaderEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop the thread, waiting at most [`STOP_TIMEOUT`].
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            join_within("HID reader", t, &self.done, STOP_TIMEOUT);
        }
    }
}

impl Drop for ReaderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(source: &dyn ReportSource, tx: &Sender<ReaderEvent>, stop: &AtomicBool) {
    let mut buf = [0u8; INPUT_REPORT_LEN];
    while !stop.load(Ordering::SeqCst) {
        match source.read_report(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => {}
            Ok(n) => {
                if tx.send(ReaderEvent::Report(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(ReaderEvent::Failed(e));
                break;
            }
        }
    }
}

// ── Test doubles ──────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;

    #[test]
    fn reader_forwards_reports_in_order() {
        let src = Arc::new(ScriptedSource::new());
        src.push(vec![1, 2, 3]);
        src.push(vec![4]);
        let mut reader = ReaderThread::spawn("test", src.clone()).unwrap();

        let first = reader.recv_timeout(Duration::from_secs(1));
        let second = reader.recv_timeout(Duration::from_secs(1));
        assert_eq!(first, Some(ReaderEvent::Report(vec![1, 2, 3])));
        assert_eq!(second, Some(ReaderEvent::Report(vec![4])));
        reader.stop();
    }

    #[test]
    fn read_failure_ends_the_thread() {
        let src = Arc::new(ScriptedSource::new());
        src.set_failing(true);
        let reader = ReaderThread::spawn("test", src).unwrap();
        match reader.recv_timeout(Duration::from_secs(1)) {
            Some(ReaderEvent::Failed(TransportError::Read(_))) => {}
            other => panic!("expected read failure, got {other:?}"),
        }
        assert!(reader.recv_timeout(Duration::from_millis(50)).is_none(), "thread exited");
    }

    #[test]
    fn idle_reader_stops_within_a_few_read_timeouts() {
        let src = Arc::new(ScriptedSource::new());
        let mut reader = ReaderThread::spawn("idle", src).unwrap();
        thread::sleep(Duration::from_millis(20));
        let started = std::time::Instant::now();
        reader.stop();
        assert!(started.elapsed() < Duration::from_millis(100), "took {:?}", started.elapsed());
    }

    /// Blocks every read until `gate` is dropped.
    struct StuckSource {
        entered: Sender<()>,
        gate:    Receiver<()>,
    }

    impl ReportSource for StuckSource {
        fn read_report(&self, _buf: &mut [u8], _timeout_ms: i32) -> Result<usize, TransportError> {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
            Ok(0)
        }
    }

    #[test]
    fn stop_does_not_wait_for_a_stuck_read() {
        let (entered_tx, entered) = unbounded();
        let (gate_tx, gate) = unbounded::<()>();
        let mut reader =
            ReaderThread::spawn("stuck", Arc::new(StuckSource { entered: entered_tx, gate })).unwrap();
        entered.recv_timeout(Duration::from_secs(2)).expect("read started");

        let started = std::time::Instant::now();
        reader.stop();
        assert!(started.elapsed() < STOP_TIMEOUT + Duration::from_secs(1));
        drop(gate_tx);
    }

    #[test]
    fn empty_source_times_out() {
        let src = Arc::new(ScriptedSource::new());
        let mut reader = ReaderThread::spawn("idle", src).unwrap();
        assert!(reader.recv_timeout(Duration::from_millis(30)).is_none());
        assert_eq!(reader.try_iter().count(), 0);
        reader.stop();
    }
}
