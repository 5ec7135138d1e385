//! Background HID writer.
//!
//! Device drivers never write to the HID handle from the flight loop. They
//! queue [`IoCommand`]s on an [`IoSender`]; one worker thread per device
//! drains the queue, coalesces commands per output channel (last value wins)
//! and writes only what differs from what the device last accepted.
//! Displays are additionally rate limited per device family.
//!
//! A write the device rejects stays pending and is retried on the next pass.
//! If writes keep failing for [`WRITE_FAILURE_LIMIT`] the worker exits and
//! reports the error, which the driver treats like a lost device.
//!
//! ```text
//! flight loop ──IoCommand──▶ channel ──▶ worker: apply… ─▶ flush ─▶ HID
//!                                         (every ≤ 5 ms)
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use winwing_protocol::cdu::{self, CduHardware};
use winwing_protocol::{fcu, pap3, ReportSink, TransportError};

/// How long the worker waits for a command before re-checking displays held
/// back by the rate limit.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(5);

pub const PAP3_LCD_INTERVAL: Duration   = Duration::from_millis(40);
pub const FCU_DISPLAY_INTERVAL: Duration = Duration::from_millis(33);
pub const CDU_PAGE_INTERVAL: Duration   = Duration::from_millis(50);

/// Writes failing for this long without one success end the worker.
pub const WRITE_FAILURE_LIMIT: Duration = Duration::from_secs(1);

/// Longest `stop` waits for a thread before leaving it behind.
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Gap between the four frames of one PAP3 LCD update.
const PAP3_FRAME_GAP: Duration = Duration::from_millis(2);

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoCommand {
    SetLed { id: u16, value: u8 },
    SetDimming { channel: u8, value: u8 },
    SetSolenoid(bool),
    /// Full display content for one display target. What the bytes mean is up
    /// to the device's [`WireFormat`].
    SetDisplay { target: u8, payload: Vec<u8> },
    /// Written before anything else in the next flush, never coalesced.
    WriteRaw(Vec<u8>),
}

// ── Wire formats ──────────────────────────────────────────────────────────────

/// Turns coalesced outputs into reports for one device family.
///
/// The write methods return `false` only when the device rejected a report.
/// Outputs the family has no frame for are skipped and count as written.
pub trait WireFormat: Send {
    fn display_interval(&self) -> Duration;
    fn write_led(&mut self, sink: &dyn ReportSink, id: u16, value: u8) -> bool;
    fn write_dimming(&mut self, sink: &dyn ReportSink, channel: u8, value: u8) -> bool;
    fn write_solenoid(&mut self, _sink: &dyn ReportSink, _on: bool) -> bool {
        true
    }
    fn write_display(&mut self, sink: &dyn ReportSink, target: u8, payload: &[u8]) -> bool;
}

/// PAP3: 14-byte short commands; the LCD takes payload, two empty payload
/// frames and a commit, all sharing one rolling sequence.
pub struct Pap3Wire {
    seq:       u8,
    frame_gap: Duration,
}

impl Pap3Wire {
    pub fn new() -> Self {
        Self::with_sequence(pap3::INITIAL_SEQUENCE)
    }

    /// Continue a sequence already used by frames written before the worker
    /// started.
    pub fn with_sequence(seq: u8) -> Self {
        Self { seq, frame_gap: PAP3_FRAME_GAP }
    }

    pub fn sequence(&self) -> u8 {
        self.seq
    }
}

impl Default for Pap3Wire {
    fn default() -> Self {
        Self::new()
    }
}

impl WireFormat for Pap3Wire {
    fn display_interval(&self) -> Duration {
        PAP3_LCD_INTERVAL
    }

    fn write_led(&mut self, sink: &dyn ReportSink, id: u16, value: u8) -> bool {
        let Ok(id) = u8::try_from(id) else { return true };
        pap3::send_led(Some(sink), id, value != 0)
    }

    fn write_dimming(&mut self, sink: &dyn ReportSink, channel: u8, value: u8) -> bool {
        pap3::send_dimming(Some(sink), channel, value)
    }

    fn write_solenoid(&mut self, sink: &dyn ReportSink, on: bool) -> bool {
        pap3::send_solenoid(Some(sink), on)
    }

    fn write_display(&mut self, sink: &dyn ReportSink, _target: u8, payload: &[u8]) -> bool {
        let sink = Some(sink);
        if !pap3::send_lcd_payload(sink, &mut self.seq, payload) {
            return false;
        }
        thread::sleep(self.frame_gap);
        let ok = pap3::send_lcd_empty(sink, &mut self.seq) && {
            thread::sleep(self.frame_gap);
            pap3::send_lcd_empty(sink, &mut self.seq)
        };
        thread::sleep(self.frame_gap);
        ok && pap3::send_lcd_commit(sink, &mut self.seq)
    }
}

/// FCU/EFIS: display payloads are whole 64-byte frames; the packet number is
/// stamped here so frames queued at different times still count up.
pub struct FcuWire {
    packet: u8,
}

impl FcuWire {
    pub fn new() -> Self {
        Self { packet: 1 }
    }
}

impl Default for FcuWire {
    fn default() -> Self {
        Self::new()
    }
}

impl WireFormat for FcuWire {
    fn display_interval(&self) -> Duration {
        FCU_DISPLAY_INTERVAL
    }

    fn write_led(&mut self, sink: &dyn ReportSink, id: u16, value: u8) -> bool {
        match fcu::led_frame(id, value) {
            Some(frame) => matches!(sink.write_report(&frame), Ok(n) if n == frame.len()),
            None => true,
        }
    }

    /// FCU brightness channels are LED ids.
    fn write_dimming(&mut self, sink: &dyn ReportSink, channel: u8, value: u8) -> bool {
        self.write_led(sink, u16::from(channel), value)
    }

    fn write_display(&mut self, sink: &dyn ReportSink, _target: u8, payload: &[u8]) -> bool {
        let mut frames = payload.to_vec();
        fcu::stamp_packet(&mut frames, self.packet);
        fcu::bump_packet(&mut self.packet);
        frames
            .chunks(fcu::REPORT_LEN)
            .all(|f| matches!(sink.write_report(f), Ok(n) if n == f.len()))
    }
}

/// CDU: payload is an encoded page stream, cut into F2 frames here.
pub struct CduWire {
    hw: CduHardware,
}

impl CduWire {
    pub fn new(hw: CduHardware) -> Self {
        Self { hw }
    }
}

impl WireFormat for CduWire {
    fn display_interval(&self) -> Duration {
        CDU_PAGE_INTERVAL
    }

    fn write_led(&mut self, sink: &dyn ReportSink, id: u16, value: u8) -> bool {
        let Ok(id) = u8::try_from(id) else { return true };
        let frame = cdu::led_frame(self.hw, id, value);
        matches!(sink.write_report(&frame), Ok(n) if n == frame.len())
    }

    fn write_dimming(&mut self, sink: &dyn ReportSink, channel: u8, value: u8) -> bool {
        self.write_led(sink, u16::from(channel), value)
    }

    fn write_display(&mut self, sink: &dyn ReportSink, _target: u8, payload: &[u8]) -> bool {
        cdu::send_page(Some(sink), payload)
    }
}

// ── Coalescing state ──────────────────────────────────────────────────────────

/// Last requested and last accepted value per channel.
#[derive(Debug, Clone)]
struct Channels<K: Ord, V> {
    pending: BTreeMap<K, V>,
    sent:    BTreeMap<K, V>,
}

impl<K: Ord, V> Default for Channels<K, V> {
    fn default() -> Self {
        Self { pending: BTreeMap::new(), sent: BTreeMap::new() }
    }
}

impl<K: Ord + Copy, V: PartialEq + Copy> Channels<K, V> {
    /// Write every pending value that differs from the last accepted one.
    /// A channel never written is always sent. Rejected values stay pending.
    fn flush(&mut self, failed: &mut usize, mut write: impl FnMut(K, V) -> bool) -> usize {
        let mut written = 0;
        for (k, v) in std::mem::take(&mut self.pending) {
            if self.sent.get(&k) == Some(&v) {
                continue;
            }
            if write(k, v) {
                self.sent.insert(k, v);
                written += 1;
            } else {
                self.sent.remove(&k);
                self.pending.insert(k, v);
                *failed += 1;
            }
        }
        written
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct DisplaySlot {
    pending:      Option<Vec<u8>>,
    sent:         Option<Vec<u8>>,
    last_sent_at: Option<Instant>,
}

/// Everything the worker owns between flushes.
#[derive(Debug, Clone, Default)]
pub struct OutputState {
    leds:     Channels<u16, u8>,
    dimming:  Channels<u8, u8>,
    solenoid: Channels<(), bool>,
    displays: BTreeMap<u8, DisplaySlot>,
    raw:      VecDeque<Vec<u8>>,
    /// Outputs rejected by the last flush.
    failed:   usize,
}

impl OutputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record LED values the device is known to show already, e.g. after a
    /// startup sequence wrote them directly.
    pub fn with_sent_leds(mut self, leds: impl IntoIterator<Item = (u16, u8)>) -> Self {
        self.leds.sent.extend(leds);
        self
    }

    pub fn apply(&mut self, cmd: IoCommand) {
        match cmd {
            IoCommand::SetLed { id, value } => {
                self.leds.pending.insert(id, value);
            }
            IoCommand::SetDimming { channel, value } => {
                self.dimming.pending.insert(channel, value);
            }
            IoCommand::SetSolenoid(on) => {
                self.solenoid.pending.insert((), on);
            }
            IoCommand::SetDisplay { target, payload } => {
                self.displays.entry(target).or_default().pending = Some(payload);
            }
            IoCommand::WriteRaw(bytes) => self.raw.push_back(bytes),
        }
    }

    /// `true` while a display update is held back by the rate limit.
    pub fn has_pending_display(&self) -> bool {
        self.displays.values().any(|d| d.pending.is_some())
    }

    /// `true` while anything waits for a write, including retries.
    pub fn has_pending(&self) -> bool {
        !self.raw.is_empty()
            || self.dimming.has_pending()
            || self.leds.has_pending()
            || self.solenoid.has_pending()
            || self.has_pending_display()
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Write everything that changed. Returns the number of logical outputs
    /// written (a display update counts once regardless of frame count).
    pub fn flush(&mut self, wire: &mut dyn WireFormat, sink: &dyn ReportSink, now: Instant) -> usize {
        let mut written = 0;
        let mut failed = 0;

        while let Some(bytes) = self.raw.pop_front() {
            if matches!(sink.write_report(&bytes), Ok(n) if n == bytes.len()) {
                written += 1;
            } else {
                // Raw writes keep their order, so nothing behind it goes first.
                self.raw.push_front(bytes);
                failed += 1;
                break;
            }
        }

        written += self.dimming.flush(&mut failed, |ch, v| wire.write_dimming(sink, ch, v));
        written += self.leds.flush(&mut failed, |id, v| wire.write_led(sink, id, v));
        written += self.solenoid.flush(&mut failed, |(), on| wire.write_solenoid(sink, on));

        let interval = wire.display_interval();
        for (&target, slot) in self.displays.iter_mut() {
            let Some(payload) = slot.pending.take() else { continue };
            if slot.sent.as_deref() == Some(payload.as_slice()) {
                continue;
            }
            if slot.last_sent_at.is_some_and(|t| now.saturating_duration_since(t) < interval) {
                slot.pending = Some(payload);
                continue;
            }
            if wire.write_display(sink, target, &payload) {
                slot.sent = Some(payload);
                written += 1;
            } else {
                slot.sent = None;
                slot.pending = Some(payload);
                failed += 1;
            }
            slot.last_sent_at = Some(now);
        }

        self.failed = failed;
        written
    }
}

// ── Worker thread ─────────────────────────────────────────────────────────────

/// Cloneable handle for queueing output. Sends after the worker stopped are
/// dropped.
#[derive(Clone)]
pub struct IoSender {
    tx:     Sender<IoCommand>,
    queued: Arc<AtomicU64>,
}

impl IoSender {
    pub fn send(&self, cmd: IoCommand) -> bool {
        let ok = self.tx.send(cmd).is_ok();
        if ok {
            self.queued.fetch_add(1, Ordering::Relaxed);
        }
        ok
    }

    /// Commands accepted through this sender and its clones.
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn set_led(&self, id: u16, value: u8) -> bool {
        self.send(IoCommand::SetLed { id, value })
    }

    pub fn set_dimming(&self, channel: u8, value: u8) -> bool {
        self.send(IoCommand::SetDimming { channel, value })
    }

    pub fn set_solenoid(&self, on: bool) -> bool {
        self.send(IoCommand::SetSolenoid(on))
    }

    pub fn set_display(&self, target: u8, payload: Vec<u8>) -> bool {
        self.send(IoCommand::SetDisplay { target, payload })
    }

    pub fn write_raw(&self, bytes: Vec<u8>) -> bool {
        self.send(IoCommand::WriteRaw(bytes))
    }
}

pub struct IoWorker {
    sender: IoSender,
    status: Receiver<TransportError>,
    stop:   Arc<AtomicBool>,
    done:   Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl IoWorker {
    pub fn spawn(
        name: &str,
        sink: Arc<dyn ReportSink>,
        mut wire: Box<dyn WireFormat>,
        mut state: OutputState,
    ) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<IoCommand>();
        let (status_tx, status) = bounded::<TransportError>(1);
        let (done_tx, done) = bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("winwing-io-{name}"))
            .spawn(move || {
                let _done = done_tx;
                if let Some(e) = run(rx, &stop_flag, sink.as_ref(), wire.as_mut(), &mut state) {
                    let _ = status_tx.send(e);
                }
            })?;
        let sender = IoSender { tx, queued: Arc::new(AtomicU64::new(0)) };
        Ok(Self { sender, status, stop, done, thread: Some(thread) })
    }

    pub fn sender(&self) -> IoSender {
        self.sender.clone()
    }

    /// The error the worker gave up on, once. The thread has exited by then.
    pub fn failure(&self) -> Option<TransportError> {
        self.status.try_recv().ok()
    }

    /// Stop the thread, waiting at most [`STOP_TIMEOUT`]. Queued commands are
    /// discarded.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(t) = self.thread.take() {
            join_within("I/O worker", t, &self.done, STOP_TIMEOUT);
        }
    }
}

/// Join `thread` once it drops its end of `done`. A thread still busy after
/// `timeout`, e.g. blocked inside a HID call, is detached.
pub(crate) fn join_within(what: &str, thread: JoinHandle<()>, done: &Receiver<()>, timeout: Duration) {
    match done.recv_timeout(timeout) {
        Err(RecvTimeoutError::Disconnected) | Ok(()) => {
            if thread.join().is_err() {
                warn!("{what} panicked");
            }
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(?timeout, "{what} did not stop in time, detaching");
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain, coalesce and flush until stopped. Returns the error that made it
/// give up, if any.
fn run(
    rx: Receiver<IoCommand>,
    stop: &AtomicBool,
    sink: &dyn ReportSink,
    wire: &mut dyn WireFormat,
    state: &mut OutputState,
) -> Option<TransportError> {
    debug!("I/O worker started");
    let mut failing_since: Option<Instant> = None;
    while !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(cmd) => state.apply(cmd),
            Err(RecvTimeoutError::Timeout) => {
                if !state.has_pending() {
                    continue;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        for cmd in rx.try_iter() {
            state.apply(cmd);
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let now = Instant::now();
        let written = state.flush(wire, sink, now);
        if state.failed() == 0 {
            if written > 0 || !state.has_pending() {
                failing_since = None;
            }
            continue;
        }
        let since = *failing_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= WRITE_FAILURE_LIMIT {
            warn!(failed = state.failed(), "HID writes keep failing, giving up");
            return Some(TransportError::Write(format!(
                "{} outputs rejected for {:?}",
                state.failed(),
                WRITE_FAILURE_LIMIT
            )));
        }
    }
    debug!("I/O worker stopped");
    None
}
