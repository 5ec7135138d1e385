//! CDU driver for the MCDU and the PFP-3N/4/7 families.
//!
//! The page is re-rendered when any display dataref moved since the last
//! refresh and queued to the worker only when the rendered cells differ.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info, warn};
use winwing_protocol::cdu::{self, CduHardware, CduLed, CduVariant};
use winwing_protocol::input::ButtonField;
use winwing_state::CduPage;

use super::fcu::PROFILE_RETRY;
use super::{button_phase, Device, DeviceLink};
use crate::datarefs::DatarefStore;
use crate::debounce::Debounce;
use crate::hid::DeviceIo;
use crate::io_worker::{CduWire, OutputState};
use crate::profiles::cdu::{find_button, registry, CduProfile, CduUnit};
use crate::profiles::detect;
use crate::xplm_shim::CommandPhase;

const PAGE_TARGET: u8 = 0;

/// Levels written directly on connect, after the annunciators are cleared.
const STARTUP_LEDS: [(CduLed, u8); 3] = [
    (CduLed::Overall, 255),
    (CduLed::Backlight, 128),
    (CduLed::ScreenBacklight, 128),
];

fn encode(profile: &dyn CduProfile, page: &CduPage) -> Vec<u8> {
    cdu::encode_page(page, |c| profile.color(c), |ch, small, out| profile.glyph(ch, small, out))
}

/// A blank page drawn without any profile.
fn blank_stream() -> Vec<u8> {
    cdu::encode_page(&CduPage::new(), |_| cdu::color::WHITE, |ch, _, out| out.push(ch))
}

pub struct CduDevice {
    link:    DeviceLink,
    unit:    CduUnit,
    buttons: ButtonField,
    pressed: BTreeSet<u16>,
    profile: Option<Box<dyn CduProfile>>,
    retry:   Debounce,

    page:          CduPage,
    refresh_cycle: Option<u64>,

    connected: bool,
}

impl CduDevice {
    pub fn new(io: DeviceIo, hardware: CduHardware, variant: CduVariant) -> Self {
        Self {
            link: DeviceLink::new("cdu", io),
            unit: CduUnit { hardware, variant },
            buttons: ButtonField::new(),
            pressed: BTreeSet::new(),
            profile: None,
            retry: Debounce::new(PROFILE_RETRY),
            page: CduPage::new(),
            refresh_cycle: None,
            connected: false,
        }
    }

    pub fn profile_name(&self) -> Option<&'static str> {
        self.profile.as_ref().map(|p| p.name())
    }

    fn startup_leds() -> impl Iterator<Item = (CduLed, u8)> {
        CduLed::ANNUNCIATORS.into_iter().map(|led| (led, 0)).chain(STARTUP_LEDS)
    }

    fn write_startup(&self) -> bool {
        let sink = self.link.sink();
        Self::startup_leds().all(|(led, level)| cdu::send_led(Some(sink), self.unit.hardware, led, level))
    }

    fn select_profile(&mut self, store: &DatarefStore) {
        self.profile = detect(&registry(), store, self.unit);
        self.refresh_cycle = None;
        self.pressed.clear();
        let device = self.class_identifier();
        if let Some(p) = self.profile.as_mut() {
            info!(
                device,
                hardware = self.unit.hardware.name(),
                seat = self.unit.variant.name(),
                profile = p.name(),
                "profile selected"
            );
            p.start(store);
            return;
        }
        debug!(device, "no aircraft profile yet");
        self.page = CduPage::new();
        if let Some(tx) = self.link.sender() {
            tx.set_display(PAGE_TARGET, blank_stream());
        }
    }

    fn handle_report(&mut self, store: &DatarefStore, report: &[u8]) {
        let Some(states) = self.buttons.decode(report) else { return };
        let Some(profile) = self.profile.as_mut() else { return };
        for (id, now) in states {
            let was = self.pressed.contains(&id);
            if now {
                self.pressed.insert(id);
            } else {
                self.pressed.remove(&id);
            }
            let Some(phase) = button_phase(was, now) else { continue };
            let Some(key) = self.unit.hardware.key_for_index(usize::from(id)) else { continue };
            let Some(button) = find_button(profile.buttons(), key).cloned() else { continue };
            if phase == CommandPhase::Begin {
                debug!(?key, command = %button.command, "pressed");
            }
            profile.button_pressed(store, &button, phase);
        }
    }

    fn refresh_page(&mut self, store: &DatarefStore) {
        let Some(profile) = self.profile.as_ref() else { return };
        let stale = match self.refresh_cycle {
            None => true,
            Some(cycle) => profile
                .display_datarefs()
                .iter()
                .any(|name| store.last_update(name).is_some_and(|u| u > cycle)),
        };
        if !stale {
            return;
        }

        let mut next = CduPage::new();
        profile.update_page(store, &mut next);
        if self.refresh_cycle.is_none() || next != self.page {
            if let Some(tx) = self.link.sender() {
                tx.set_display(PAGE_TARGET, encode(profile.as_ref(), &next));
            }
            self.page = next;
        }
        self.refresh_cycle = Some(store.cycle());
    }

    fn queue_leds(&mut self, store: &DatarefStore) {
        let Some(profile) = self.profile.as_mut() else { return };
        let Some(leds) = profile.take_leds(store) else { return };
        if let Some(tx) = self.link.sender() {
            for (led, level) in leds {
                tx.set_led(led as u16, level);
            }
        }
    }

    /// Every light off and a blank page, written directly.
    fn write_shutdown(&self) {
        let sink = self.link.sink();
        let leds = [CduLed::Backlight, CduLed::ScreenBacklight, CduLed::Overall];
        for led in leds.into_iter().chain(CduLed::ANNUNCIATORS) {
            cdu::send_led(Some(sink), self.unit.hardware, led, 0);
        }
        cdu::send_page(Some(sink), &blank_stream());
    }
}

impl Device for CduDevice {
    fn class_identifier(&self) -> &'static str {
        "Product-FMC"
    }

    fn connect(&mut self, store: &DatarefStore) -> bool {
        if self.connected {
            return true;
        }
        if !self.write_startup() {
            warn!(device = self.class_identifier(), "startup sequence failed");
            return false;
        }
        let known = Self::startup_leds().map(|(led, level)| (led as u16, level));
        let wire = CduWire::new(self.unit.hardware);
        if !self.link.start(Box::new(wire), OutputState::new().with_sent_leds(known)) {
            return false;
        }
        self.connected = true;
        self.buttons.reset();
        self.select_profile(store);
        self.retry.arm(Instant::now());
        true
    }

    fn update(&mut self, store: &DatarefStore, now: Instant) {
        if !self.connected {
            return;
        }
        let inbound = self.link.poll();
        if self.profile.is_none() && inbound.failure.is_none() && self.retry.ready(now) {
            self.select_profile(store);
        }

        for report in &inbound.reports {
            self.handle_report(store, report);
        }
        if inbound.failure.is_some() {
            self.disconnect(store);
            return;
        }
        self.refresh_page(store);
        self.queue_leds(store);
    }

    fn disconnect(&mut self, store: &DatarefStore) {
        if let Some(mut profile) = self.profile.take() {
            profile.stop(store);
        }
        let was_running = self.link.is_running();
        self.link.stop();
        if was_running {
            self.write_shutdown();
        }
        self.link.close();

        self.connected = false;
        self.pressed.clear();
        self.buttons.reset();
        self.page = CduPage::new();
        self.refresh_cycle = None;
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
