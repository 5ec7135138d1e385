//! FCU driver, with or without the left/right EFIS panels.
//!
//! Buttons arrive as one flat bitmap; edges are turned into command phases
//! for the aircraft profile. Displays and LEDs are rebuilt only after one of
//! the profile's monitored datarefs changed, and each panel or LED is queued
//! only when its content differs.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use winwing_protocol::fcu::{self, FcuEfisLed};
use winwing_protocol::input::ButtonField;
use winwing_state::{EfisDisplayValue, FcuDisplayData, FcuWindows};

use super::{button_phase, Device, DeviceLink};
use crate::datarefs::DatarefStore;
use crate::debounce::Debounce;
use crate::hid::DeviceIo;
use crate::io_worker::{FcuWire, OutputState};
use crate::profiles::fcu::{find_button, registry, FcuEfisProfile};
use crate::profiles::{detect, Watch};
use crate::xplm_shim::CommandPhase;

/// How often a device without a profile looks for one again.
pub const PROFILE_RETRY: Duration = Duration::from_secs(1);

/// Startup brightness for the backlights before a profile takes over.
const STARTUP_BACKLIGHT: u8 = 180;

const FCU_TARGET: u8        = 0;
const EFIS_LEFT_TARGET: u8  = 1;
const EFIS_RIGHT_TARGET: u8 = 2;

/// Brightness written directly on connect, in order.
fn startup_leds() -> [(FcuEfisLed, u8); 8] {
    [
        (FcuEfisLed::Backlight, STARTUP_BACKLIGHT),
        (FcuEfisLed::ScreenBacklight, STARTUP_BACKLIGHT),
        (FcuEfisLed::EfislBacklight, STARTUP_BACKLIGHT),
        (FcuEfisLed::EfislScreenBacklight, STARTUP_BACKLIGHT),
        (FcuEfisLed::EfisrBacklight, STARTUP_BACKLIGHT),
        (FcuEfisLed::EfisrScreenBacklight, STARTUP_BACKLIGHT),
        (FcuEfisLed::ExpedGreen, 0),
        (FcuEfisLed::ExpedBacklight, 255),
    ]
}

fn fcu_payload(w: &FcuWindows) -> Vec<u8> {
    fcu::build_fcu_frames(w, 0).concat()
}

fn efis_payload(v: &EfisDisplayValue, right: bool) -> Vec<u8> {
    fcu::build_efis_frame(v, right, 0).to_vec()
}

/// Blank content for every window.
fn blank_display() -> FcuDisplayData {
    let off = EfisDisplayValue { display_enabled: false, ..Default::default() };
    FcuDisplayData {
        fcu:        FcuWindows { display_enabled: false, ..Default::default() },
        efis_left:  off.clone(),
        efis_right: off,
    }
}

pub struct FcuEfisDevice {
    link:    DeviceLink,
    buttons: ButtonField,
    pressed: BTreeSet<u16>,
    profile: Option<Box<dyn FcuEfisProfile>>,
    retry:   Debounce,

    watch:   Watch,
    display: FcuDisplayData,
    leds:    Vec<(FcuEfisLed, u8)>,
    /// Cleared when the panels need a full redraw.
    drawn:   bool,

    connected: bool,
}

impl FcuEfisDevice {
    pub fn new(io: DeviceIo) -> Self {
        Self {
            link: DeviceLink::new("fcu-efis", io),
            buttons: ButtonField::new(),
            pressed: BTreeSet::new(),
            profile: None,
            retry: Debounce::new(PROFILE_RETRY),
            watch: Watch::new(),
            display: FcuDisplayData::default(),
            leds: Vec::new(),
            drawn: false,
            connected: false,
        }
    }

    pub fn profile_name(&self) -> Option<&'static str> {
        self.profile.as_ref().map(|p| p.name())
    }

    fn write_startup(&self) -> bool {
        let sink = self.link.sink();
        let init = fcu::init_frame();
        if !matches!(sink.write_report(&init), Ok(n) if n == init.len()) {
            return false;
        }
        for (led, level) in startup_leds() {
            fcu::send_led(Some(sink), led, level);
        }
        true
    }

    fn select_profile(&mut self, store: &DatarefStore) {
        self.profile = detect(&registry(), store, ());
        self.watch.clear(store);
        self.drawn = false;
        self.leds.clear();
        self.pressed.clear();
        match self.profile.as_ref() {
            Some(p) => {
                p.watch(store, &mut self.watch);
                info!(device = self.class_identifier(), profile = p.name(), "profile selected");
            }
            None => {
                debug!(device = self.class_identifier(), "no aircraft profile yet");
                self.display = blank_display();
                self.queue_display(&blank_display(), true);
            }
        }
    }

    fn handle_report(&mut self, store: &DatarefStore, report: &[u8]) {
        let Some(states) = self.buttons.decode(report) else { return };
        let Some(profile) = self.profile.as_mut() else { return };
        let table = profile.buttons();
        for (id, now) in states {
            let was = self.pressed.contains(&id);
            if now {
                self.pressed.insert(id);
            } else {
                self.pressed.remove(&id);
            }
            let Some(phase) = button_phase(was, now) else { continue };
            if let Some(button) = find_button(table, id) {
                if phase == CommandPhase::Begin {
                    debug!(button = button.name, "pressed");
                }
                profile.button_pressed(store, button, phase);
            }
        }
    }

    /// Rebuild windows and LEDs after a monitored dataref moved.
    fn refresh(&mut self, store: &DatarefStore) {
        if self.profile.is_none() {
            return;
        }
        self.watch.refresh(store);
        if !self.watch.take() {
            return;
        }
        self.refresh_display(store);
        self.queue_leds(store);
        self.drawn = true;
    }

    fn refresh_display(&mut self, store: &DatarefStore) {
        let Some(profile) = self.profile.as_ref() else { return };
        let mut next = FcuDisplayData::default();
        profile.update_display_data(store, &mut next);
        if !profile.has_efis_left() {
            next.efis_left.display_enabled = false;
        }
        if !profile.has_efis_right() {
            next.efis_right.display_enabled = false;
        }
        self.queue_display(&next, !self.drawn);
        self.display = next;
    }

    fn queue_display(&self, next: &FcuDisplayData, force: bool) {
        let Some(tx) = self.link.sender() else { return };
        if force || next.fcu != self.display.fcu {
            tx.set_display(FCU_TARGET, fcu_payload(&next.fcu));
        }
        if force || next.efis_left != self.display.efis_left {
            tx.set_display(EFIS_LEFT_TARGET, efis_payload(&next.efis_left, false));
        }
        if force || next.efis_right != self.display.efis_right {
            tx.set_display(EFIS_RIGHT_TARGET, efis_payload(&next.efis_right, true));
        }
    }

    fn queue_leds(&mut self, store: &DatarefStore) {
        let (Some(profile), Some(tx)) = (self.profile.as_ref(), self.link.sender()) else { return };
        let next = profile.leds(store);
        for &(led, level) in &next {
            if self.drawn && self.leds.contains(&(led, level)) {
                continue;
            }
            tx.set_led(led.id(), level);
        }
        self.leds = next;
    }

    /// LEDs off and every window blanked, written directly.
    fn write_shutdown(&self) {
        let sink = self.link.sink();
        for led in FcuEfisLed::ALL {
            fcu::send_led(Some(sink), led, 0);
        }
        let blank = blank_display();
        let mut pkt = 1;
        let frames = fcu::build_fcu_frames(&blank.fcu, pkt);
        fcu::bump_packet(&mut pkt);
        let left = fcu::build_efis_frame(&blank.efis_left, false, pkt);
        fcu::bump_packet(&mut pkt);
        let right = fcu::build_efis_frame(&blank.efis_right, true, pkt);
        for frame in frames.iter().chain([&left, &right]) {
            if sink.write_report(frame).is_err() {
                break;
            }
        }
    }
}

impl Device for FcuEfisDevice {
    fn class_identifier(&self) -> &'static str {
        "Product-FCU-EFIS"
    }

    fn connect(&mut self, store: &DatarefStore) -> bool {
        if self.connected {
            return true;
        }
        if !self.write_startup() {
            warn!(device = self.class_identifier(), "startup sequence failed");
            return false;
        }
        let known = startup_leds().map(|(led, level)| (led.id(), level));
        if !self.link.start(Box::new(FcuWire::new()), OutputState::new().with_sent_leds(known)) {
            return false;
        }
        self.connected = true;
        self.buttons.reset();
        self.display = FcuDisplayData::default();
        self.select_profile(store);
        self.retry.arm(Instant::now());
        true
    }

    fn update(&mut self, store: &DatarefStore, now: Instant) {
        if !self.connected {
            return;
        }
        let inbound = self.link.poll();
        if self.profile.is_none() {
            if inbound.failure.is_some() {
                self.disconnect(store);
                return;
            }
            if self.retry.ready(now) {
                self.select_profile(store);
            }
            if self.profile.is_none() {
                return;
            }
        }

        for report in &inbound.reports {
            self.handle_report(store, report);
        }
        if inbound.failure.is_some() {
            self.disconnect(store);
            return;
        }
        self.refresh(store);
    }

    fn disconnect(&mut self, store: &DatarefStore) {
        self.profile = None;
        let was_running = self.link.is_running();
        self.link.stop();
        if was_running {
            self.write_shutdown();
        }
        self.link.close();

        self.connected = false;
        self.pressed.clear();
        self.buttons.reset();
        self.watch.clear(store);
        self.drawn = false;
        self.leds.clear();
        self.retry.reset();
        debug!(device = self.class_identifier(), "disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn profile_ready(&self) -> bool {
        self.profile.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::devices::testing::{make_io, wait_for};
    use crate::profiles::pap3::testing::{count_calls, make_mock, set_float, set_int};
    use crate::xplm_shim::MockXplm;

    fn button_report(pressed: &[u16]) -> Vec<u8> {
        let mut r = vec![0u8; 13];
        r[0] = 1;
        for &id in pressed {
            r[1 + usize::from(id / 8)] |= 1 << (id % 8);
        }
        r
    }

    fn toliss() -> (Arc<MockXplm>, DatarefStore) {
        let (mock, store) = make_mock();
        set_int(&mock, "AirbusFBW/FCUAvail", 1);
        set_float(&mock, "sim/cockpit2/autopilot/airspeed_dial_kts_mach", 250.0);
        set_float(&mock, "sim/cockpit/autopilot/altitude", 5000.0);
        mock.add_command("toliss_airbus/ias_mach_button_push");
        (mock, store)
    }

    /// Tick until `done` holds or a second passes.
    fn tick_until(dev: &mut FcuEfisDevice, store: &DatarefStore, done: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            dev.update(store, Instant::now());
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn is_fcu_data(frame: &[u8]) -> bool {
        frame.len() == fcu::REPORT_LEN && frame[0] == 0xF0 && frame[3] == 0x31
    }

    #[test]
    fn connect_writes_init_then_backlights() {
        let (io, sink, _source) = make_io();
        let (_mock, store) = make_mock();
        let mut dev = FcuEfisDevice::new(io);

        assert!(dev.connect(&store));
        assert!(dev.is_connected());
        assert!(!dev.profile_ready(), "keeps looking for a profile");

        let r = sink.reports();
        assert_eq!(r[0], fcu::init_frame().to_vec());
        assert_eq!(Some(r[1].clone()), fcu::led_frame(FcuEfisLed::Backlight.id(), 180).map(|f| f.to_vec()));
        assert_eq!(Some(r[8].clone()), fcu::led_frame(FcuEfisLed::ExpedBacklight.id(), 255).map(|f| f.to_vec()));
        dev.disconnect(&store);
    }

    #[test]
    fn profile_found_later_is_picked_up() {
        let (io, _sink, _source) = make_io();
        let (mock, store) = make_mock();
        let mut dev = FcuEfisDevice::new(io);
        assert!(dev.connect(&store));
        assert_eq!(dev.profile_name(), None);

        set_int(&mock, "AirbusFBW/FCUAvail", 1);
        dev.update(&store, Instant::now());
        assert_eq!(dev.profile_name(), None, "retry waits");
        dev.update(&store, Instant::now() + PROFILE_RETRY);
        assert_eq!(dev.profile_name(), Some("ToLiss A3xx"));
        assert!(dev.profile_ready());
        dev.disconnect(&store);
    }

    #[test]
    fn press_runs_command_once() {
        let (io, _sink, source) = make_io();
        let (mock, store) = toliss();
        let mut dev = FcuEfisDevice::new(io);
        assert!(dev.connect(&store));

        source.push(button_report(&[0]));
        source.push(button_report(&[]));
        let cmd = "toliss_airbus/ias_mach_button_push";
        assert!(tick_until(&mut dev, &store, || count_calls(&mock, cmd) > 0));
        for _ in 0..10 {
            dev.update(&store, Instant::now());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(count_calls(&mock, cmd), 1, "release and repeats run nothing");
        dev.disconnect(&store);
    }

    #[test]
    fn display_follows_dataref_changes() {
        let (io, sink, _source) = make_io();
        let (mock, store) = toliss();
        let mut dev = FcuEfisDevice::new(io);
        assert!(dev.connect(&store));

        dev.update(&store, Instant::now());
        assert!(wait_for(&sink, |r| r.iter().filter(|f| is_fcu_data(f)).count() == 1));

        store.update();
        dev.update(&store, Instant::now());
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.reports().iter().filter(|f| is_fcu_data(f)).count(), 1, "nothing changed");

        set_float(&mock, "sim/cockpit2/autopilot/airspeed_dial_kts_mach", 260.0);
        store.update();
        dev.update(&store, Instant::now());
        assert!(wait_for(&sink, |r| r.iter().filter(|f| is_fcu_data(f)).count() == 2));
        dev.disconnect(&store);
    }

    #[test]
    fn unchanged_sim_queues_nothing() {
        let (io, _sink, _source) = make_io();
        let (mock, store) = toliss();
        set_int(&mock, "AirbusFBW/AP1Engage", 1);
        let mut dev = FcuEfisDevice::new(io);
        assert!(dev.connect(&store));
        let queued = |dev: &FcuEfisDevice| dev.link.sender().map_or(0, |tx| tx.queued());

        store.update();
        dev.update(&store, Instant::now());
        let settled = queued(&dev);
        assert!(settled > 0, "first refresh draws everything");
        for _ in 0..5 {
            store.update();
            dev.update(&store, Instant::now());
        }
        assert_eq!(queued(&dev), settled);

        set_int(&mock, "AirbusFBW/AP1Engage", 0);
        store.update();
        dev.update(&store, Instant::now());
        let after = queued(&dev);
        assert!(after > settled, "AP1 lamp and window redraw");
        store.update();
        dev.update(&store, Instant::now());
        assert_eq!(queued(&dev), after);
        dev.disconnect(&store);
    }

    #[test]
    fn disconnect_blanks_and_darkens() {
        let (io, sink, _source) = make_io();
        let (_mock, store) = toliss();
        let mut dev = FcuEfisDevice::new(io);
        assert!(dev.connect(&store));
        dev.disconnect(&store);
        assert!(!dev.is_connected());
        assert!(!dev.profile_ready());

        let r = sink.reports();
        let off = fcu::led_frame(FcuEfisLed::Backlight.id(), 0).map(|f| f.to_vec());
        assert!(r.iter().any(|f| Some(f) == off.as_ref()));
        let last = r.last().cloned().unwrap_or_default();
        assert_eq!(last[4], 0x0E, "right EFIS frame last");
    }
}
