//! Attached hardware: HID discovery, driver construction by product id and
//! the per-tick fan-out to every driver.
//!
//! While an aircraft is loaded the controller re-enumerates every
//! [`RESCAN_INTERVAL`], so a device plugged in (or back in) mid-flight is
//! picked up without a reload.

use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidapi::HidApi;
use tracing::{debug, info, warn};
use winwing_protocol::{DeviceFamily, WINWING_VENDOR_ID};

use crate::datarefs::DatarefStore;
use crate::devices::{CduDevice, Device, FcuEfisDevice, Pap3Device};
use crate::hid::{DeviceIo, HidLink};

/// Time between enumerations while devices are active.
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(3);

// ── Enumeration ───────────────────────────────────────────────────────────────

/// A supported device, opened and ready for its driver.
pub struct Discovered {
    pub path:   CString,
    pub family: DeviceFamily,
    pub io:     DeviceIo,
}

pub trait DeviceEnumerator: Send {
    /// Open every supported device whose path is not in `known`.
    fn discover(&mut self, known: &[&CStr]) -> Vec<Discovered>;
}

/// Enumeration through hidapi.
pub struct HidEnumerator {
    api:    HidApi,
    /// Paths that failed to open; retried quietly.
    failed: HashSet<CString>,
}

impl HidEnumerator {
    pub fn new() -> Option<Self> {
        match HidApi::new() {
            Ok(api) => Some(Self { api, failed: HashSet::new() }),
            Err(e) => {
                warn!(error = %e, "HID subsystem unavailable");
                None
            }
        }
    }
}

impl DeviceEnumerator for HidEnumerator {
    fn discover(&mut self, known: &[&CStr]) -> Vec<Discovered> {
        if let Err(e) = self.api.refresh_devices() {
            warn!(error = %e, "HID enumeration failed");
            return Vec::new();
        }

        let mut found = Vec::new();
        for info in self.api.device_list() {
            if info.vendor_id() != WINWING_VENDOR_ID {
                continue;
            }
            let pid = info.product_id();
            let Some(family) = DeviceFamily::from_product_id(pid) else {
                debug!(pid = %format!("{pid:#06x}"), "unsupported Winwing product");
                continue;
            };
            if known.contains(&info.path()) {
                continue;
            }
            match HidLink::open(&self.api, info.path()) {
                Ok(link) => {
                    self.failed.remove(info.path());
                    found.push(Discovered {
                        path: info.path().to_owned(),
                        family,
                        io: DeviceIo::from_link(link),
                    });
                }
                Err(e) if self.failed.insert(info.path().to_owned()) => {
                    warn!(pid = %format!("{pid:#06x}"), error = %e, "could not open device");
                }
                Err(e) => debug!(pid = %format!("{pid:#06x}"), error = %e, "still cannot open device"),
            }
        }
        found
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

/// Driver for a product family.
pub fn build_device(family: DeviceFamily, io: DeviceIo, show_labels: &Arc<AtomicBool>) -> Box<dyn Device> {
    match family {
        DeviceFamily::Pap3 => Box::new(Pap3Device::new(io, Arc::clone(show_labels))),
        DeviceFamily::FcuEfis => Box::new(FcuEfisDevice::new(io)),
        DeviceFamily::Cdu(hw, variant) => Box::new(CduDevice::new(io, hw, variant)),
    }
}

struct Attached {
    path:   CString,
    family: DeviceFamily,
    device: Box<dyn Device>,
}

pub struct DeviceController {
    enumerator:  Option<Box<dyn DeviceEnumerator>>,
    devices:     Vec<Attached>,
    show_labels: Arc<AtomicBool>,
    /// Set between `connect_all` and `disconnect_all`; new arrivals connect
    /// straight away while it holds.
    active:      bool,
    last_scan:   Option<Instant>,
}

impl DeviceController {
    pub fn new(show_labels: Arc<AtomicBool>) -> Self {
        let enumerator = HidEnumerator::new().map(|e| Box::new(e) as Box<dyn DeviceEnumerator>);
        Self::with_enumerator(show_labels, enumerator)
    }

    pub(crate) fn with_enumerator(
        show_labels: Arc<AtomicBool>,
        enumerator: Option<Box<dyn DeviceEnumerator>>,
    ) -> Self {
        Self { enumerator, devices: Vec::new(), show_labels, active: false, last_scan: None }
    }

    /// A controller with no HID access; devices are attached by hand.
    #[cfg(test)]
    pub(crate) fn detached(show_labels: Arc<AtomicBool>) -> Self {
        Self::with_enumerator(show_labels, None)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// `(family name, profile ready)` for every attached device.
    pub fn summary(&self) -> Vec<(String, bool)> {
        self.devices.iter().map(|a| (a.family.name(), a.device.profile_ready())).collect()
    }

    /// Open every Winwing device not attached yet.
    pub fn scan(&mut self, store: &DatarefStore) {
        self.scan_at(store, Instant::now());
    }

    fn scan_at(&mut self, store: &DatarefStore, now: Instant) {
        self.last_scan = Some(now);
        let Some(enumerator) = self.enumerator.as_mut() else { return };
        let known: Vec<&CStr> = self.devices.iter().map(|a| a.path.as_c_str()).collect();
        let found = enumerator.discover(&known);
        for d in found {
            self.attach(store, d.path, d.family, d.io);
        }
    }

    pub(crate) fn attach(&mut self, store: &DatarefStore, path: CString, family: DeviceFamily, io: DeviceIo) {
        let mut device = build_device(family, io, &self.show_labels);
        info!(device = %family.name(), path = %path.to_string_lossy(), "attached");
        if self.active && !device.connect(store) {
            warn!(device = %family.name(), "connect failed");
        }
        self.devices.push(Attached { path, family, device });
    }

    pub fn connect_all(&mut self, store: &DatarefStore) {
        self.active = true;
        for a in &mut self.devices {
            if !a.device.is_connected() && !a.device.connect(store) {
                warn!(device = %a.family.name(), "connect failed");
            }
        }
    }

    pub fn disconnect_all(&mut self, store: &DatarefStore) {
        self.active = false;
        for a in &mut self.devices {
            if a.device.is_connected() {
                a.device.disconnect(store);
            }
        }
    }

    /// Disconnect and forget every device, then enumerate again.
    pub fn reload(&mut self, store: &DatarefStore) {
        let active = self.active;
        self.disconnect_all(store);
        self.devices.clear();
        self.scan(store);
        if active {
            self.connect_all(store);
        }
    }

    /// Tick every driver. A device that dropped out while active lost its
    /// transport; it is forgotten so the next rescan attaches it afresh.
    pub fn update(&mut self, store: &DatarefStore, now: Instant) {
        for a in &mut self.devices {
            a.device.update(store, now);
        }
        if !self.active {
            return;
        }
        self.devices.retain(|a| {
            let keep = a.device.is_connected();
            if !keep {
                info!(device = %a.family.name(), "detached");
            }
            keep
        });
        if self.last_scan.map_or(true, |t| now.saturating_duration_since(t) >= RESCAN_INTERVAL) {
            self.scan_at(store, now);
        }
    }

    /// `true` when every connected device has an aircraft profile. Nothing
    /// attached counts as ready.
    pub fn all_profiles_ready(&self) -> bool {
        self.devices.iter().filter(|a| a.device.is_connected()).all(|a| a.device.profile_ready())
    }

    pub fn path_of(&self, index: usize) -> Option<&CStr> {
        self.devices.get(index).map(|a| a.path.as_c_str())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::devices::testing::make_io;
    use crate::profiles::pap3::testing::{make_mock, set_int};
    use winwing_protocol::cdu::{CduHardware, CduVariant};

    fn path(name: &str) -> CString {
        CString::new(name).unwrap_or_default()
    }

    type Plugged = Arc<Mutex<Vec<(CString, DeviceFamily, DeviceIo)>>>;

    /// Reports whatever is in `plugged` right now.
    struct MockEnumerator {
        plugged: Plugged,
    }

    impl DeviceEnumerator for MockEnumerator {
        fn discover(&mut self, known: &[&CStr]) -> Vec<Discovered> {
            self.plugged
                .lock()
                .iter()
                .filter(|(p, _, _)| !known.contains(&p.as_c_str()))
                .map(|(p, family, io)| Discovered { path: p.clone(), family: *family, io: io.clone() })
                .collect()
        }
    }

    fn with_mock_enumerator() -> (DeviceController, Plugged) {
        let plugged = Plugged::default();
        let e = MockEnumerator { plugged: Arc::clone(&plugged) };
        (DeviceController::with_enumerator(Arc::new(AtomicBool::new(false)), Some(Box::new(e))), plugged)
    }

    const MCDU: DeviceFamily = DeviceFamily::Cdu(CduHardware::Mcdu, CduVariant::Captain);

    #[test]
    fn families_get_their_drivers() {
        let flag = Arc::new(AtomicBool::new(false));
        let cases = [
            (DeviceFamily::Pap3, "Product-PAP3"),
            (DeviceFamily::FcuEfis, "Product-FCU-EFIS"),
            (DeviceFamily::Cdu(CduHardware::Pfp7, CduVariant::Observer), "Product-FMC"),
        ];
        for (family, class) in cases {
            let (io, _sink, _source) = make_io();
            assert_eq!(build_device(family, io, &flag).class_identifier(), class);
        }
    }

    #[test]
    fn late_arrivals_connect_while_active() {
        let (_mock, store) = make_mock();
        let mut c = DeviceController::detached(Arc::new(AtomicBool::new(false)));
        let (io, _sink, _source) = make_io();
        c.attach(&store, path("/dev/a"), DeviceFamily::FcuEfis, io);
        assert_eq!(c.summary(), vec![("FCU-EFIS".to_string(), false)]);
        assert!(c.all_profiles_ready(), "nothing connected yet");

        c.connect_all(&store);
        assert!(!c.all_profiles_ready(), "FCU without a profile");

        let (io, sink, _source) = make_io();
        c.attach(&store, path("/dev/b"), DeviceFamily::Cdu(CduHardware::Mcdu, CduVariant::Captain), io);
        assert!(!sink.reports().is_empty(), "connected on attach");
        assert_eq!(c.path_of(1), Some(path("/dev/b").as_c_str()));

        c.disconnect_all(&store);
        assert!(c.all_profiles_ready());
        assert_eq!(c.len(), 2, "devices stay attached");
    }

    #[test]
    fn ready_once_every_profile_is_found() {
        let (mock, store) = make_mock();
        let mut c = DeviceController::detached(Arc::new(AtomicBool::new(false)));
        let (io, _sink, _source) = make_io();
        c.attach(&store, path("/dev/fcu"), DeviceFamily::FcuEfis, io);
        c.connect_all(&store);
        assert!(!c.all_profiles_ready());

        set_int(&mock, "AirbusFBW/FCUAvail", 1);
        c.update(&store, Instant::now() + Duration::from_secs(2));
        assert!(c.all_profiles_ready());
        c.disconnect_all(&store);
    }

    #[test]
    fn failed_device_is_forgotten() {
        let (_mock, store) = make_mock();
        let mut c = DeviceController::detached(Arc::new(AtomicBool::new(false)));
        let (io, _sink, source) = make_io();
        c.attach(&store, path("/dev/fcu"), DeviceFamily::FcuEfis, io);
        c.connect_all(&store);

        source.set_failing(true);
        let deadline = Instant::now() + Duration::from_secs(1);
        while !c.is_empty() && Instant::now() < deadline {
            c.update(&store, Instant::now());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(c.is_empty(), "unplugged device dropped");
    }

    #[test]
    fn device_plugged_in_later_is_picked_up_by_the_rescan() {
        let (_mock, store) = make_mock();
        let (mut c, plugged) = with_mock_enumerator();
        c.scan(&store);
        c.connect_all(&store);
        assert!(c.is_empty());
        let t0 = Instant::now();

        let (io, sink, _source) = make_io();
        plugged.lock().push((path("/dev/mcdu"), MCDU, io));
        c.update(&store, t0);
        assert!(c.is_empty(), "not before the interval");

        c.update(&store, t0 + RESCAN_INTERVAL);
        assert_eq!(c.len(), 1);
        assert!(!sink.reports().is_empty(), "connected on arrival");

        c.update(&store, t0 + RESCAN_INTERVAL * 2);
        assert_eq!(c.len(), 1, "a known path is not attached twice");
        c.disconnect_all(&store);
    }

    #[test]
    fn replugged_device_is_attached_again() {
        let (_mock, store) = make_mock();
        let (mut c, plugged) = with_mock_enumerator();
        let (io, _sink, source) = make_io();
        plugged.lock().push((path("/dev/mcdu"), MCDU, io));
        c.scan(&store);
        c.connect_all(&store);
        assert_eq!(c.len(), 1);

        plugged.lock().clear();
        source.set_failing(true);
        let mut now = Instant::now();
        let deadline = now + Duration::from_secs(1);
        while !c.is_empty() && Instant::now() < deadline {
            now = Instant::now();
            c.update(&store, now);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(c.is_empty(), "unplugged device dropped");

        let (io, sink, _source) = make_io();
        plugged.lock().push((path("/dev/mcdu"), MCDU, io));
        c.update(&store, now + RESCAN_INTERVAL);
        assert_eq!(c.len(), 1);
        assert_eq!(c.path_of(0), Some(path("/dev/mcdu").as_c_str()));
        assert!(!sink.reports().is_empty(), "reconnected");
        c.disconnect_all(&store);
    }

    #[test]
    fn no_rescan_while_inactive() {
        let (_mock, store) = make_mock();
        let (mut c, plugged) = with_mock_enumerator();
        let (io, _sink, _source) = make_io();
        plugged.lock().push((path("/dev/mcdu"), MCDU, io));
        c.update(&store, Instant::now() + RESCAN_INTERVAL);
        assert!(c.is_empty());
    }
}
