//! `tracing` output routed into X-Plane's Log.txt.
//!
//! Each formatted event becomes one `XPLMDebugString` call prefixed
//! `[Winwing]`. The level filter sits behind a reload handle so the plugin
//! menu can switch between INFO and DEBUG at runtime.

use std::io;
use std::sync::Arc;

use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Registry};

use crate::xplm_shim::XplmApi;

pub const LOG_PREFIX: &str = "[Winwing]";

// ── Writer ────────────────────────────────────────────────────────────────────

/// Buffers one formatted event and hands it to X-Plane on drop.
pub struct XplmWriter {
    xplm: Arc<dyn XplmApi>,
    buf:  Vec<u8>,
}

impl io::Write for XplmWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end_matches('\n');
        self.xplm.log(&format!("{LOG_PREFIX} {line}\n"));
        self.buf.clear();
        Ok(())
    }
}

impl Drop for XplmWriter {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}

#[derive(Clone)]
pub struct XplmMakeWriter {
    xplm: Arc<dyn XplmApi>,
}

impl<'a> MakeWriter<'a> for XplmMakeWriter {
    type Writer = XplmWriter;

    fn make_writer(&'a self) -> Self::Writer {
        XplmWriter { xplm: Arc::clone(&self.xplm), buf: Vec::with_capacity(128) }
    }
}

// ── Level control ─────────────────────────────────────────────────────────────

/// Runtime switch between the default and the debug level.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<LevelFilter, Registry>,
}

impl LogHandle {
    pub fn set_debug(&self, enabled: bool) {
        let level = if enabled { LevelFilter::DEBUG } else { LevelFilter::INFO };
        if let Err(e) = self.handle.modify(|f| *f = level) {
            tracing::warn!(error = %e, "could not change log level");
        }
    }

    pub fn is_debug(&self) -> bool {
        self.handle
            .with_current(|f| *f >= LevelFilter::DEBUG)
            .unwrap_or(false)
    }
}

/// Build the subscriber without installing it.
pub fn subscriber(xplm: Arc<dyn XplmApi>) -> (impl Subscriber + Send + Sync + 'static, LogHandle) {
    let (filter, handle) = reload::Layer::new(LevelFilter::INFO);
    let layer = fmt::layer()
        .with_writer(XplmMakeWriter { xplm })
        .with_ansi(false)
        .with_target(false)
        .without_time();
    let subscriber = tracing_subscriber::registry().with(filter).with(layer);
    (subscriber, LogHandle { handle })
}

/// Install the X-Plane log subscriber as the global default. Returns `None`
/// if a subscriber is already installed (plugin reloaded in-process).
pub fn init(xplm: Arc<dyn XplmApi>) -> Option<LogHandle> {
    let (subscriber, handle) = subscriber(xplm);
    subscriber.try_init().ok().map(|_| handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xplm_shim::MockXplm;

    #[test]
    fn events_reach_xplane_log_with_prefix() {
        let mock = Arc::new(MockXplm::new());
        let (sub, _handle) = subscriber(mock.clone());
        tracing::subscriber::with_default(sub, || {
            tracing::info!(device = "PAP3", "connected");
        });
        let logs = mock.log_messages();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].starts_with("[Winwing] "), "got {:?}", logs[0]);
        assert!(logs[0].contains("connected") && logs[0].contains("PAP3"));
        assert!(logs[0].ends_with('\n'));
    }

    #[test]
    fn debug_level_toggles_at_runtime() {
        let mock = Arc::new(MockXplm::new());
        let (sub, handle) = subscriber(mock.clone());
        tracing::subscriber::with_default(sub, || {
            assert!(!handle.is_debug());
            tracing::debug!("hidden");
            handle.set_debug(true);
            assert!(handle.is_debug());
            tracing::debug!("shown");
        });
        let logs = mock.log_messages();
        assert!(!logs.iter().any(|l| l.contains("hidden")));
        assert!(logs.iter().any(|l| l.contains("shown")));
    }
}
