//! X-Plane 12 plugin driving Winwing cockpit hardware.
//!
//! Compiles to a `.xpl` shared library loaded by X-Plane. The `XPLM*` entry
//! points below are only present in non-test builds; unit tests use `MockXplm`
//! and call `WinwingPlugin` methods directly.

pub mod config;
pub mod controller;
pub mod datarefs;
pub mod debounce;
pub mod devices;
pub mod hid;
pub mod illumination;
pub mod io_worker;
pub mod logging;
pub mod plugin;
pub mod profiles;
pub mod xplm_shim;

// Raw X-Plane SDK extern declarations, only needed for production builds.
// Symbols are resolved at runtime by X-Plane when the .xpl is loaded.
#[cfg(not(test))]
pub(crate) mod xplm_sys {
    use std::ffi::{c_char, c_float, c_int, c_void};

    pub type XPLMDataRef = *mut c_void;
    pub type XPLMCommandRef = *mut c_void;
    pub type XPLMMenuID = *mut c_void;

    pub type FlightLoopFn = unsafe extern "C" fn(f32, f32, c_int, *mut c_void) -> f32;
    pub type MenuHandlerFn = unsafe extern "C" fn(*mut c_void, *mut c_void);

    pub const MENU_UNCHECKED: c_int = 1;
    pub const MENU_CHECKED: c_int   = 2;

    extern "C" {
        pub fn XPLMFindDataRef(inDataRefName: *const c_char) -> XPLMDataRef;
        pub fn XPLMGetDataRefTypes(inDataRef: XPLMDataRef) -> c_int;
        pub fn XPLMGetDataf(inDataRef: XPLMDataRef) -> c_float;
        pub fn XPLMGetDatad(inDataRef: XPLMDataRef) -> f64;
        pub fn XPLMGetDatai(inDataRef: XPLMDataRef) -> c_int;
        pub fn XPLMGetDatavf(
            inDataRef:  XPLMDataRef,
            outValues:  *mut c_float,
            inOffset:   c_int,
            inMax:      c_int,
        ) -> c_int;
        pub fn XPLMGetDatavi(
            inDataRef:  XPLMDataRef,
            outValues:  *mut c_int,
            inOffset:   c_int,
            inMax:      c_int,
        ) -> c_int;
        pub fn XPLMGetDatab(
            inDataRef:  XPLMDataRef,
            outValue:   *mut c_void,
            inOffset:   c_int,
            inMaxBytes: c_int,
        ) -> c_int;
        pub fn XPLMSetDataf(inDataRef: XPLMDataRef, inValue: c_float);
        pub fn XPLMSetDatad(inDataRef: XPLMDataRef, inValue: f64);
        pub fn XPLMSetDatai(inDataRef: XPLMDataRef, inValue: c_int);
        pub fn XPLMSetDatavf(inDataRef: XPLMDataRef, inValues: *const c_float, inOffset: c_int, inCount: c_int);
        pub fn XPLMSetDatavi(inDataRef: XPLMDataRef, inValues: *const c_int, inOffset: c_int, inCount: c_int);
        pub fn XPLMSetDatab(inDataRef: XPLMDataRef, inValue: *const c_void, inOffset: c_int, inLength: c_int);

        pub fn XPLMFindCommand(inName: *const c_char) -> XPLMCommandRef;
        pub fn XPLMCommandBegin(inCommand: XPLMCommandRef);
        pub fn XPLMCommandEnd(inCommand: XPLMCommandRef);
        pub fn XPLMCommandOnce(inCommand: XPLMCommandRef);

        pub fn XPLMDebugString(inString: *const c_char);
        pub fn XPLMGetSystemPath(outSystemPath: *mut c_char);
        pub fn XPLMEnableFeature(inFeature: *const c_char, inEnable: c_int);

        pub fn XPLMRegisterFlightLoopCallback(inFlightLoop: Option<FlightLoopFn>, inInterval: c_float, inRefcon: *mut c_void);
        pub fn XPLMUnregisterFlightLoopCallback(inFlightLoop: Option<FlightLoopFn>, inRefcon: *mut c_void);

        pub fn XPLMFindPluginsMenu() -> XPLMMenuID;
        pub fn XPLMCreateMenu(
            inName:         *const c_char,
            inParentMenu:   XPLMMenuID,
            inParentItem:   c_int,
            inHandler:      Option<MenuHandlerFn>,
            inMenuRef:      *mut c_void,
        ) -> XPLMMenuID;
        pub fn XPLMAppendMenuItem(
            inMenu:             XPLMMenuID,
            inItemName:         *const c_char,
            inItemRef:          *mut c_void,
            inDeprecatedAndIgnored: c_int,
        ) -> c_int;
        pub fn XPLMCheckMenuItem(inMenu: XPLMMenuID, index: c_int, inCheck: c_int);
        pub fn XPLMDestroyMenu(inMenuID: XPLMMenuID);
    }
}

// ── XPLM entry points (production only) ──────────────────────────────────────

#[cfg(not(test))]
mod entry {
    use super::config::settings_path;
    use super::plugin::{
        MenuAction, WinwingPlugin, FAST_INTERVAL, PLUGIN_DESCRIPTION, PLUGIN_NAME, PLUGIN_SIGNATURE,
    };
    use super::xplm_shim::{RealXplm, XplmApi};
    use super::xplm_sys as sys;
    use parking_lot::Mutex;
    use std::ffi::{c_char, c_int, c_void, CStr, CString};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock};
    use std::time::Instant;

    static PLUGIN: OnceLock<Mutex<WinwingPlugin>> = OnceLock::new();
    /// The "Winwing" submenu, stored as an address.
    static MENU: AtomicUsize = AtomicUsize::new(0);

    #[no_mangle]
    pub unsafe extern "C" fn XPluginStart(
        out_name: *mut c_char,
        out_sig:  *mut c_char,
        out_desc: *mut c_char,
    ) -> c_int {
        write_cstr(out_name, PLUGIN_NAME);
        write_cstr(out_sig,  PLUGIN_SIGNATURE);
        write_cstr(out_desc, PLUGIN_DESCRIPTION);
        enable_feature("XPLM_USE_NATIVE_PATHS");

        let xplm: Arc<dyn XplmApi> = Arc::new(RealXplm);
        let log = super::logging::init(Arc::clone(&xplm));
        let plugin = WinwingPlugin::new(xplm, xplane_root().map(|r| settings_path(&r)), log);
        let checked = MenuAction::ALL.map(|a| plugin.is_checked(a));
        if PLUGIN.set(Mutex::new(plugin)).is_err() {
            debug_string("[Winwing] plugin already initialized\n");
            return 0;
        }
        create_menu(&checked);
        tracing::info!("plugin started");
        1
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginStop() {
        let menu = MENU.swap(0, Ordering::SeqCst);
        if menu != 0 {
            sys::XPLMDestroyMenu(menu as sys::XPLMMenuID);
        }
        tracing::info!("plugin stopped");
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginEnable() -> c_int {
        let Some(plugin) = PLUGIN.get() else { return 0 };
        plugin.lock().enable();
        sys::XPLMRegisterFlightLoopCallback(Some(flight_loop_cb), FAST_INTERVAL, std::ptr::null_mut());
        1
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginDisable() {
        sys::XPLMUnregisterFlightLoopCallback(Some(flight_loop_cb), std::ptr::null_mut());
        if let Some(plugin) = PLUGIN.get() {
            plugin.lock().disable();
        }
    }

    #[no_mangle]
    pub unsafe extern "C" fn XPluginReceiveMessage(_from: c_int, msg: c_int, param: *mut c_void) {
        if let Some(plugin) = PLUGIN.get() {
            plugin.lock().receive_message(msg, param as isize);
        }
    }

    unsafe extern "C" fn flight_loop_cb(
        _since_last_call:  f32,
        _since_last_floop: f32,
        _counter:          c_int,
        _refcon:           *mut c_void,
    ) -> f32 {
        match PLUGIN.get() {
            Some(plugin) => plugin.lock().flight_loop_tick(Instant::now()),
            None => 0.0,
        }
    }

    unsafe extern "C" fn menu_cb(_menu_ref: *mut c_void, item_ref: *mut c_void) {
        let (Some(plugin), Some(action)) = (PLUGIN.get(), MenuAction::from_index(item_ref as usize)) else {
            return;
        };
        let checked = plugin.lock().menu_action(action);
        if action.is_toggle() {
            check_item(item_ref as usize, checked);
        }
    }

    unsafe fn create_menu(checked: &[bool]) {
        let Ok(name) = CString::new(PLUGIN_NAME) else { return };
        let plugins = sys::XPLMFindPluginsMenu();
        let parent_item = sys::XPLMAppendMenuItem(plugins, name.as_ptr(), std::ptr::null_mut(), 0);
        let menu = sys::XPLMCreateMenu(name.as_ptr(), plugins, parent_item, Some(menu_cb), std::ptr::null_mut());
        if menu.is_null() {
            return;
        }
        MENU.store(menu as usize, Ordering::SeqCst);
        for (index, action) in MenuAction::ALL.iter().enumerate() {
            let Ok(title) = CString::new(action.title()) else { continue };
            sys::XPLMAppendMenuItem(menu, title.as_ptr(), index as *mut c_void, 0);
            if action.is_toggle() {
                check_item(index, checked.get(index).copied().unwrap_or(false));
            }
        }
    }

    unsafe fn check_item(index: usize, checked: bool) {
        let menu = MENU.load(Ordering::SeqCst);
        if menu == 0 {
            return;
        }
        let state = if checked { sys::MENU_CHECKED } else { sys::MENU_UNCHECKED };
        sys::XPLMCheckMenuItem(menu as sys::XPLMMenuID, index as c_int, state);
    }

    unsafe fn xplane_root() -> Option<PathBuf> {
        let mut buf = [0 as c_char; 1024];
        sys::XPLMGetSystemPath(buf.as_mut_ptr());
        let path = CStr::from_ptr(buf.as_ptr()).to_str().ok()?;
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    unsafe fn enable_feature(name: &str) {
        if let Ok(c) = CString::new(name) {
            sys::XPLMEnableFeature(c.as_ptr(), 1);
        }
    }

    fn debug_string(msg: &str) {
        if let Ok(c) = CString::new(msg) {
            unsafe { sys::XPLMDebugString(c.as_ptr()) }
        }
    }

    unsafe fn write_cstr(dst: *mut c_char, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len().min(255);
        std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, dst, len);
        *dst.add(len) = 0;
    }
}

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use controller::DeviceController;
pub use plugin::{MenuAction, WinwingPlugin, FAST_INTERVAL, SLOW_INTERVAL};
