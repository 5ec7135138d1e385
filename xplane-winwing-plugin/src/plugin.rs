//! WinwingPlugin: the plugin's state behind the XPLM entry points.
//!
//! Free of XPLM types so it can be driven from tests through `MockXplm`.
//! The entry points in `lib.rs` translate X-Plane callbacks (flight loop,
//! messages, menu clicks) into calls on this type.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Settings;
use crate::controller::DeviceController;
use crate::datarefs::DatarefStore;
use crate::logging::LogHandle;
use crate::xplm_shim::XplmApi;

// ── Constants ─────────────────────────────────────────────────────────────────

pub const PLUGIN_NAME: &str        = "Winwing";
pub const PLUGIN_SIGNATURE: &str   = "com.winwing.xplane.bridge";
pub const PLUGIN_DESCRIPTION: &str = "Winwing PAP3, FCU/EFIS and MCDU hardware for X-Plane";

/// Flight loop interval once every device has a profile: every frame.
pub const FAST_INTERVAL: f32 = -1.0;
/// Flight loop interval while some device still waits for its aircraft.
pub const SLOW_INTERVAL: f32 = 5.0;

pub const MSG_PLANE_LOADED: i32   = 102;
pub const MSG_PLANE_UNLOADED: i32 = 106;
/// Message parameter naming the user's aircraft.
pub const USER_AIRCRAFT: isize = 0;

// ── Menu ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ReloadDevices,
    DebugLogging,
    LcdLabels,
}

impl MenuAction {
    /// Menu order.
    pub const ALL: [MenuAction; 3] = [Self::ReloadDevices, Self::DebugLogging, Self::LcdLabels];

    pub fn title(&self) -> &'static str {
        match self {
            Self::ReloadDevices => "Reload devices",
            Self::DebugLogging  => "Enable debug logging",
            Self::LcdLabels     => "Display LCD Labels",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_toggle(&self) -> bool {
        !matches!(self, Self::ReloadDevices)
    }
}

// ── WinwingPlugin ─────────────────────────────────────────────────────────────

pub struct WinwingPlugin {
    store:         DatarefStore,
    controller:    DeviceController,
    settings:      Settings,
    settings_path: Option<PathBuf>,
    show_labels:   Arc<AtomicBool>,
    log:           Option<LogHandle>,
    debug:         bool,
}

impl WinwingPlugin {
    pub fn new(xplm: Arc<dyn XplmApi>, settings_path: Option<PathBuf>, log: Option<LogHandle>) -> Self {
        let settings = settings_path.as_deref().map(Settings::load).unwrap_or_default();
        let show_labels = Arc::new(AtomicBool::new(settings.show_labels));
        let controller = DeviceController::new(Arc::clone(&show_labels));
        Self::assemble(xplm, controller, settings, settings_path, show_labels, log)
    }

    fn assemble(
        xplm: Arc<dyn XplmApi>,
        controller: DeviceController,
        settings: Settings,
        settings_path: Option<PathBuf>,
        show_labels: Arc<AtomicBool>,
        log: Option<LogHandle>,
    ) -> Self {
        let debug = log.as_ref().is_some_and(LogHandle::is_debug);
        Self {
            store: DatarefStore::new(xplm),
            controller,
            settings,
            settings_path,
            show_labels,
            log,
            debug,
        }
    }

    pub fn store(&self) -> &DatarefStore {
        &self.store
    }

    pub fn controller(&self) -> &DeviceController {
        &self.controller
    }

    /// Enumerate hardware and connect it for the aircraft already loaded.
    pub fn enable(&mut self) {
        self.controller.scan(&self.store);
        self.receive_message(MSG_PLANE_LOADED, USER_AIRCRAFT);
    }

    pub fn disable(&mut self) {
        self.controller.disconnect_all(&self.store);
        self.store.clear();
    }

    /// Messages about AI aircraft are ignored.
    pub fn receive_message(&mut self, msg: i32, param: isize) {
        if param != USER_AIRCRAFT {
            return;
        }
        match msg {
            MSG_PLANE_LOADED => {
                info!(devices = self.controller.len(), "aircraft loaded");
                self.controller.scan(&self.store);
                self.controller.connect_all(&self.store);
            }
            MSG_PLANE_UNLOADED => {
                info!("aircraft unloaded");
                self.controller.disconnect_all(&self.store);
                self.store.clear();
            }
            _ => {}
        }
    }

    /// One flight loop pass. Returns the delay until the next one.
    pub fn flight_loop_tick(&mut self, now: Instant) -> f32 {
        self.store.update();
        self.controller.update(&self.store, now);
        if self.controller.all_profiles_ready() {
            FAST_INTERVAL
        } else {
            SLOW_INTERVAL
        }
    }

    /// Run a menu item. Returns the item's new checked state.
    pub fn menu_action(&mut self, action: MenuAction) -> bool {
        match action {
            MenuAction::ReloadDevices => {
                info!("reloading devices");
                self.controller.reload(&self.store);
            }
            MenuAction::DebugLogging => {
                self.debug = !self.debug;
                if let Some(log) = &self.log {
                    log.set_debug(self.debug);
                }
                info!(enabled = self.debug, "debug logging");
            }
            MenuAction::LcdLabels => {
                self.settings.show_labels = !self.settings.show_labels;
                self.show_labels.store(self.settings.show_labels, Ordering::Relaxed);
                self.save_settings();
            }
        }
        self.is_checked(action)
    }

    pub fn is_checked(&self, action: MenuAction) -> bool {
        match action {
            MenuAction::ReloadDevices => false,
            MenuAction::DebugLogging => self.debug,
            MenuAction::LcdLabels => self.settings.show_labels,
        }
    }

    fn save_settings(&self) {
        let Some(path) = &self.settings_path else { return };
        if let Err(e) = self.settings.save(path) {
            warn!(error = %e, "could not save settings");
        }
    }
}
