//! PAP3 MCP aircraft profiles.

mod ff777;
mod md11;
mod zibo;

pub use ff777::Ff777Profile;
pub use md11::RotateMd11Profile;
pub use zibo::ZiboProfile;

use std::time::{Duration, Instant};

use winwing_state::{LcdDisplayConfig, Pap3State};

use crate::datarefs::DatarefStore;
use crate::debounce::Debounce;
use crate::profiles::{position, ProfileEntry};
use crate::xplm_shim::CommandPhase;

/// Power bits reported by [`Pap3Profile::power_mask`].
pub mod power {
    /// Autopilot has power: panel lighting is on.
    pub const MCP: u8      = 0x01;
    pub const DC_BUS_1: u8 = 0x02;
    pub const DC_BUS_2: u8 = 0x04;
    /// Either DC bus powers the A/T arm solenoid.
    pub const SOLENOID: u8 = DC_BUS_1 | DC_BUS_2;
}

/// Repeat guard for maintained-switch toggles the sim has not followed yet.
pub const TOGGLE_GUARD: Duration = Duration::from_millis(200);

/// Minimum spacing of A/T arm and A/P disconnect toggles.
pub const SWITCH_DEBOUNCE: Duration = Duration::from_millis(150);

// ── Context ───────────────────────────────────────────────────────────────────

/// What a profile may touch while handling one call from the device.
pub struct Pap3Ctx<'a> {
    pub store: &'a DatarefStore,
    pub now:   Instant,
    at_intent: Option<bool>,
}

impl<'a> Pap3Ctx<'a> {
    pub fn new(store: &'a DatarefStore, now: Instant) -> Self {
        Self { store, now, at_intent: None }
    }

    /// Tell the device which way the physical A/T arm switch was put.
    pub fn set_at_hardware_intent(&mut self, armed: bool) {
        self.at_intent = Some(armed);
    }

    pub fn take_at_intent(&mut self) -> Option<bool> {
        self.at_intent.take()
    }
}

// ── Profile trait ─────────────────────────────────────────────────────────────

pub trait Pap3Profile: Send {
    fn name(&self) -> &'static str;

    /// Register monitors on every dataref `current()` is built from.
    fn start(&mut self, store: &DatarefStore);

    fn stop(&mut self, store: &DatarefStore);

    fn current(&self) -> &Pap3State;

    /// Reconcile pending switch intent and, if a watched dataref changed,
    /// re-read the sim. Returns `true` only when `current()` changed.
    fn tick(&mut self, ctx: &mut Pap3Ctx<'_>) -> bool;

    fn on_button(&mut self, _ctx: &mut Pap3Ctx<'_>, _offset: u8, _mask: u8, _pressed: bool) {}

    fn on_encoder_delta(&mut self, _ctx: &mut Pap3Ctx<'_>, _offset: u8, _delta: i8) {}

    fn power_mask(&self, _store: &DatarefStore) -> u8 {
        power::MCP
    }

    fn has_power(&self, store: &DatarefStore) -> bool {
        self.power_mask(store) & power::MCP != 0
    }

    /// Seed switch intent from the sim and push it back.
    fn sync_sim_to_hardware(&mut self, _ctx: &mut Pap3Ctx<'_>) {}

    /// Seed switch intent from a raw input report.
    fn sync_sim_to_hardware_from_raw(&mut self, ctx: &mut Pap3Ctx<'_>, _report: &[u8]) {
        self.sync_sim_to_hardware(ctx);
    }

    fn lcd_config(&self) -> LcdDisplayConfig {
        LcdDisplayConfig::default()
    }
}

/// Priority order: FF777 first, Zibo last.
pub fn registry() -> [ProfileEntry<dyn Pap3Profile>; 3] {
    [
        ProfileEntry { name: "FlightFactor 777", eligible: Ff777Profile::is_eligible, create: Ff777Profile::boxed },
        ProfileEntry { name: "Rotate MD-11", eligible: RotateMd11Profile::is_eligible, create: RotateMd11Profile::boxed },
        ProfileEntry { name: "Zibo 737", eligible: ZiboProfile::is_eligible, create: ZiboProfile::boxed },
    ]
}

// ── Input tables ──────────────────────────────────────────────────────────────

/// Momentary push button bound to commands.
pub(crate) struct Button {
    pub offset:  u8,
    pub mask:    u8,
    pub press:   &'static str,
    pub release: Option<&'static str>,
}

impl Button {
    pub const fn press(offset: u8, mask: u8, press: &'static str) -> Self {
        Self { offset, mask, press, release: None }
    }
}

/// Run the bound command of the first matching button. Returns whether a
/// button matched.
pub(crate) fn fire_button(store: &DatarefStore, table: &[Button], offset: u8, mask: u8, pressed: bool) -> bool {
    let Some(b) = table.iter().find(|b| b.offset == offset && b.mask == mask) else {
        return false;
    };
    let cmd = if pressed { Some(b.press) } else { b.release };
    if let Some(cmd) = cmd {
        store.execute_command(cmd, CommandPhase::Once);
    }
    true
}

pub(crate) struct Encoder {
    pub offset: u8,
    pub inc:    &'static str,
    pub dec:    &'static str,
}

impl Encoder {
    pub const fn new(offset: u8, inc: &'static str, dec: &'static str) -> Self {
        Self { offset, inc, dec }
    }
}

/// One command per detent, in the direction of travel.
pub(crate) fn turn_encoder(store: &DatarefStore, table: &[Encoder], offset: u8, delta: i8) -> bool {
    let Some(e) = table.iter().find(|e| e.offset == offset) else {
        return false;
    };
    repeat_command(store, e.inc, e.dec, delta);
    true
}

pub(crate) fn repeat_command(store: &DatarefStore, inc: &str, dec: &str, delta: i8) {
    if delta == 0 {
        return;
    }
    let cmd = if delta > 0 { inc } else { dec };
    for _ in 0..delta.unsigned_abs() {
        if !store.execute_command(cmd, CommandPhase::Once) {
            break;
        }
    }
}

/// Bit of a raw input report; out-of-range offsets read as clear.
pub(crate) fn bit(report: &[u8], offset: u8, mask: u8) -> bool {
    report.get(usize::from(offset)).is_some_and(|b| b & mask != 0)
}

// ── Maintained switches ───────────────────────────────────────────────────────

/// A two-position cockpit switch the sim only exposes as a position dataref
/// and a toggle command. `drive_to` toggles until the position matches.
pub(crate) struct MaintainedSwitch {
    position:       &'static str,
    toggle:         &'static str,
    guard:          Debounce,
    last_commanded: Option<i32>,
}

impl MaintainedSwitch {
    pub fn new(position: &'static str, toggle: &'static str) -> Self {
        Self { position, toggle, guard: Debounce::new(TOGGLE_GUARD), last_commanded: None }
    }

    pub fn sim_position(&self, store: &DatarefStore) -> Option<i32> {
        position(store, self.position)
    }

    pub fn at(&self, store: &DatarefStore, pos: i32) -> bool {
        self.sim_position(store) == Some(pos)
    }

    pub fn last_commanded(&self) -> Option<i32> {
        self.last_commanded
    }

    /// Take the sim's current position as the last commanded one.
    pub fn seed(&mut self, store: &DatarefStore) {
        self.last_commanded = self.sim_position(store);
        self.guard.reset();
    }

    pub fn drive_to(&mut self, store: &DatarefStore, desired: i32, now: Instant) {
        let Some(sim) = self.sim_position(store) else { return };
        if !store.command_exists(self.toggle) {
            return;
        }
        if sim == desired {
            self.guard.reset();
            self.last_commanded = Some(desired);
            return;
        }
        if self.last_commanded != Some(desired) {
            self.guard.reset();
        }
        if !self.guard.ready(now) {
            return;
        }
        self.last_commanded = Some(desired);
        store.execute_command(self.toggle, CommandPhase::Once);
    }
}

/// Hardware-side target positions of the four maintained MCP switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Intent {
    pub fd_capt_on: bool,
    pub fd_fo_on:   bool,
    pub at_arm_on:  bool,
    pub ap_engaged: bool,
}

/// `Some(true)` if the "on" bit is set, `Some(false)` if the "off" bit is,
/// `None` if the report shows neither.
pub(crate) fn two_way(report: &[u8], on: (u8, u8), off: (u8, u8)) -> Option<bool> {
    if bit(report, on.0, on.1) {
        Some(true)
    } else if bit(report, off.0, off.1) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::xplm_shim::{DataRefValue, MockXplm};
    use std::sync::Arc;

    pub fn make_mock() -> (Arc<MockXplm>, DatarefStore) {
        let mock = Arc::new(MockXplm::new());
        let store = DatarefStore::new(mock.clone());
        (mock, store)
    }

    pub fn set_int(mock: &MockXplm, name: &str, v: i32) {
        mock.set_dataref(name, DataRefValue::Int(v));
    }

    pub fn set_float(mock: &MockXplm, name: &str, v: f32) {
        mock.set_dataref(name, DataRefValue::Float(v));
    }

    pub fn count_calls(mock: &MockXplm, name: &str) -> usize {
        mock.command_calls().iter().filter(|(n, _)| n == name).count()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn switch_toggles_once_until_guard_expires() {
        let (mock, store) = make_mock();
        set_int(&mock, "sw/pos", 0);
        mock.add_command("sw/toggle");
        let mut sw = MaintainedSwitch::new("sw/pos", "sw/toggle");
        let t0 = Instant::now();

        sw.drive_to(&store, 1, t0);
        sw.drive_to(&store, 1, t0 + Duration::from_millis(50));
        assert_eq!(count_calls(&mock, "sw/toggle"), 1, "guarded while sim catches up");

        sw.drive_to(&store, 1, t0 + TOGGLE_GUARD);
        assert_eq!(count_calls(&mock, "sw/toggle"), 2, "retried after the guard");

        set_int(&mock, "sw/pos", 1);
        sw.drive_to(&store, 1, t0 + TOGGLE_GUARD * 2);
        assert_eq!(count_calls(&mock, "sw/toggle"), 2, "in position");
        assert_eq!(sw.last_commanded(), Some(1));
    }

    #[test]
    fn new_target_bypasses_guard() {
        let (mock, store) = make_mock();
        set_int(&mock, "sw/pos", 0);
        mock.add_command("sw/toggle");
        let mut sw = MaintainedSwitch::new("sw/pos", "sw/toggle");
        let t0 = Instant::now();
        sw.drive_to(&store, 1, t0);
        set_int(&mock, "sw/pos", 1);
        sw.drive_to(&store, 0, t0 + Duration::from_millis(10));
        assert_eq!(count_calls(&mock, "sw/toggle"), 2);
    }

    #[test]
    fn missing_switch_is_ignored() {
        let (mock, store) = make_mock();
        mock.add_command("sw/toggle");
        let mut sw = MaintainedSwitch::new("sw/pos", "sw/toggle");
        sw.drive_to(&store, 1, Instant::now());
        assert!(mock.command_calls().is_empty());
    }

    #[test]
    fn encoder_repeats_per_detent() {
        let (mock, store) = make_mock();
        mock.add_command("up");
        mock.add_command("dn");
        let table = [Encoder::new(0x17, "up", "dn")];
        assert!(turn_encoder(&store, &table, 0x17, 3));
        assert!(turn_encoder(&store, &table, 0x17, -2));
        assert!(!turn_encoder(&store, &table, 0x19, 1));
        assert_eq!(count_calls(&mock, "up"), 3);
        assert_eq!(count_calls(&mock, "dn"), 2);
    }

    #[test]
    fn raw_bits() {
        let report = [0u8, 0x00, 0x00, 0x00, 0x18, 0x01];
        assert!(bit(&report, 0x04, 0x08));
        assert!(!bit(&report, 0x04, 0x20));
        assert!(!bit(&report, 0x30, 0x01), "past the end");
        assert_eq!(two_way(&report, (0x04, 0x08), (0x04, 0x10)), Some(true));
        assert_eq!(two_way(&report, (0x04, 0x20), (0x04, 0x40)), None);
        assert_eq!(two_way(&report, (0x06, 0x01), (0x05, 0x01)), Some(false));
    }
}
