//! FCU / EFIS aircraft profiles.
//!
//! A profile owns no hardware. It fills an [`FcuDisplayData`] from cached
//! datarefs, reports LED levels, and maps the 96 logical buttons onto
//! simulator actions through a static [`FcuButton`] table.

mod laminar;
mod toliss;

pub use laminar::LaminarA333Profile;
pub use toliss::TolissFcuProfile;

use winwing_protocol::fcu::FcuEfisLed;
use winwing_state::{EfisDisplayValue, FcuDisplayData, FcuWindows, HPA_PER_INHG};

use crate::datarefs::DatarefStore;
pub(crate) use crate::profiles::{array_at, level, num, on};
pub(crate) use crate::profiles::Watch;
use crate::profiles::ProfileEntry;
use crate::xplm_shim::CommandPhase;

// ── Button table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfisSide {
    Captain,
    FirstOfficer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FcuAction {
    /// Run a command once per press.
    Command(&'static str),
    /// Write a fixed value.
    Set(&'static str, f32),
    /// Flip an int dataref between 0 and 1.
    Toggle(&'static str),
    /// Walk a rotary selector to `target` with its left/right commands.
    StepTo { position: &'static str, left: &'static str, right: &'static str, target: i32 },
    /// Baro knob: one hPa or 0.01 inHg per press.
    Baro { side: EfisSide, up: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FcuButton {
    pub id:     u16,
    pub name:   &'static str,
    pub action: FcuAction,
}

impl FcuButton {
    pub const fn cmd(id: u16, name: &'static str, command: &'static str) -> Self {
        Self { id, name, action: FcuAction::Command(command) }
    }

    pub const fn set(id: u16, name: &'static str, dataref: &'static str, value: f32) -> Self {
        Self { id, name, action: FcuAction::Set(dataref, value) }
    }

    pub const fn toggle(id: u16, name: &'static str, dataref: &'static str) -> Self {
        Self { id, name, action: FcuAction::Toggle(dataref) }
    }

    pub const fn step(
        id: u16,
        name: &'static str,
        (position, left, right): (&'static str, &'static str, &'static str),
        target: i32,
    ) -> Self {
        Self { id, name, action: FcuAction::StepTo { position, left, right, target } }
    }

    pub const fn baro(id: u16, name: &'static str, side: EfisSide, up: bool) -> Self {
        Self { id, name, action: FcuAction::Baro { side, up } }
    }
}

/// Where one side's barometer lives.
#[derive(Debug, Clone, Copy)]
pub struct BaroRefs {
    pub is_std: &'static str,
    /// Non-zero when the unit selector is on hPa.
    pub unit_hpa: &'static str,
    pub in_hg:    &'static str,
}

// ── Profile trait ─────────────────────────────────────────────────────────────

pub trait FcuEfisProfile: Send {
    fn name(&self) -> &'static str;

    /// Datarefs the windows are built from.
    fn display_datarefs(&self) -> &'static [&'static str];

    /// Monitor everything the windows and LEDs are built from. A change in
    /// any of them triggers a refresh.
    fn watch(&self, store: &DatarefStore, watch: &mut Watch) {
        watch.add_all::<f32>(store, self.display_datarefs());
    }

    fn buttons(&self) -> &'static [FcuButton];

    fn baro_refs(&self, side: EfisSide) -> BaroRefs;

    fn update_display_data(&self, store: &DatarefStore, data: &mut FcuDisplayData);

    /// Current level of every LED and backlight the profile drives.
    fn leds(&self, store: &DatarefStore) -> Vec<(FcuEfisLed, u8)>;

    fn has_efis_left(&self) -> bool {
        true
    }

    fn has_efis_right(&self) -> bool {
        true
    }

    fn button_pressed(&mut self, store: &DatarefStore, button: &FcuButton, phase: CommandPhase) {
        run_action(store, button, phase, |side| self.baro_refs(side));
    }
}

/// ToLiss first: the Laminar A330 marker is never present in a ToLiss cockpit.
pub fn registry() -> [ProfileEntry<dyn FcuEfisProfile>; 2] {
    [
        ProfileEntry { name: "ToLiss A3xx", eligible: TolissFcuProfile::is_eligible, create: TolissFcuProfile::boxed },
        ProfileEntry { name: "Laminar A330", eligible: LaminarA333Profile::is_eligible, create: LaminarA333Profile::boxed },
    ]
}

pub fn find_button(table: &'static [FcuButton], id: u16) -> Option<&'static FcuButton> {
    table.iter().find(|b| b.id == id)
}

// ── Actions ───────────────────────────────────────────────────────────────────

/// Shared button semantics. Everything fires on `Begin`; the rest is ignored.
pub(crate) fn run_action(
    store: &DatarefStore,
    button: &FcuButton,
    phase: CommandPhase,
    baro_refs: impl Fn(EfisSide) -> BaroRefs,
) {
    if phase != CommandPhase::Begin {
        return;
    }
    match button.action {
        FcuAction::Command(cmd) => {
            store.execute_command(cmd, CommandPhase::Once);
        }
        FcuAction::Set(dataref, value) => store.set::<f32>(dataref, value),
        FcuAction::Toggle(dataref) => {
            let current = store.get::<i32>(dataref).unwrap_or(0);
            store.set::<i32>(dataref, i32::from(current == 0));
        }
        FcuAction::StepTo { position, left, right, target } => {
            let Some(current) = crate::profiles::position(store, position) else { return };
            let (cmd, steps) = if current < target { (right, target - current) } else { (left, current - target) };
            for _ in 0..steps {
                store.execute_command(cmd, CommandPhase::Once);
            }
        }
        FcuAction::Baro { side, up } => adjust_baro(store, baro_refs(side), up),
    }
}

fn adjust_baro(store: &DatarefStore, refs: BaroRefs, up: bool) {
    if on(store, refs.is_std) {
        return;
    }
    let Some(in_hg) = store.get_cached::<f32>(refs.in_hg) else { return };
    let step = if up { 1.0 } else { -1.0 };
    let next = if on(store, refs.unit_hpa) {
        (in_hg * HPA_PER_INHG + step) / HPA_PER_INHG
    } else {
        in_hg + step * 0.01
    };
    store.set::<f32>(refs.in_hg, next);
}

// ── Window formatting ─────────────────────────────────────────────────────────

/// What the speed/heading/altitude/vertical windows show, before formatting.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WindowInputs {
    pub speed:        f32,
    pub speed_dashed: bool,
    pub heading:      f32,
    pub hdg_dashed:   bool,
    pub altitude:     f32,
    pub vs:           f32,
    pub vs_dashed:    bool,
}

/// Fill the window strings and the annunciators derived from them. `spd_mach`
/// and `hdg_trk` must already be set.
pub(crate) fn fill_windows(w: &mut FcuWindows, i: WindowInputs) {
    w.speed = if i.speed > 0.0 && !i.speed_dashed {
        if w.spd_mach {
            format!("{:03}", (i.speed * 100.0).round() as i32)
        } else {
            format!("{:03}", i.speed as i32)
        }
    } else {
        "---".to_string()
    };

    w.heading = if i.heading >= 0.0 && !i.hdg_dashed {
        format!("{:03}", (i.heading as i32) % 360)
    } else {
        "---".to_string()
    };

    w.altitude = if i.altitude >= 0.0 {
        format!("{:05}", i.altitude as i32)
    } else {
        "-----".to_string()
    };

    w.vs_mode = !w.hdg_trk;
    w.fpa_mode = w.hdg_trk;
    if i.vs_dashed {
        w.vertical_speed = "-----".to_string();
        w.vs_sign = false;
        w.fpa_comma = w.fpa_mode;
    } else if w.fpa_mode {
        // 600 fpm on the dataref is an FPA of 0.6°.
        let fpa = i.vs / 1000.0;
        let tenths = (fpa.abs() * 10.0).round() as i32;
        w.vertical_speed = format!("{tenths:02}  ");
        w.fpa_comma = true;
        w.vs_sign = fpa >= 0.0;
    } else {
        let abs = (i.vs.round() as i32).abs();
        w.vertical_speed = if abs % 100 == 0 { format!("{:02}##", abs / 100) } else { format!("{abs:04}") };
        w.vs_sign = i.vs >= 0.0;
        w.fpa_comma = false;
    }

    w.vs_indication = w.vs_mode;
    w.fpa_indication = w.fpa_mode;
    w.vs_vertical_line = w.vs_mode && w.vertical_speed != "-----";
    w.lat_mode = true;
}

/// One EFIS baro window. STD hides the value.
pub(crate) fn efis_value(store: &DatarefStore, refs: BaroRefs, enabled: bool, test: bool) -> EfisDisplayValue {
    let is_std = on(store, refs.is_std);
    let mut v = EfisDisplayValue { display_enabled: enabled, display_test: test, is_std, ..Default::default() };
    let in_hg = num(store, refs.in_hg);
    if !is_std && in_hg > 0.0 {
        v.set_baro(in_hg, !on(store, refs.unit_hpa));
    }
    v
}

#[cfg(test)]
pub(crate) mod testing {
    pub use crate::profiles::pap3::testing::{count_calls, make_mock, set_float, set_int};

    /// Level set for `led` in a profile's LED list.
    pub fn led_level(
        leds: &[(winwing_protocol::fcu::FcuEfisLed, u8)],
        led: winwing_protocol::fcu::FcuEfisLed,
    ) -> Option<u8> {
        leds.iter().find(|(l, _)| *l == led).map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::xplm_shim::DataRefValue;

    fn windows(mach: bool, trk: bool, i: WindowInputs) -> FcuWindows {
        let mut w = FcuWindows { spd_mach: mach, hdg_trk: trk, ..Default::default() };
        fill_windows(&mut w, i);
        w
    }

    #[test]
    fn speed_and_heading_windows() {
        let w = windows(false, false, WindowInputs { speed: 250.4, heading: 360.0, altitude: 12000.0, ..Default::default() });
        assert_eq!(w.speed, "250");
        assert_eq!(w.heading, "000", "360 shows as 000");
        assert_eq!(w.altitude, "12000");

        let w = windows(true, false, WindowInputs { speed: 0.786, ..Default::default() });
        assert_eq!(w.speed, "079");

        let w = windows(false, false, WindowInputs { speed: 250.0, speed_dashed: true, hdg_dashed: true, ..Default::default() });
        assert_eq!(w.speed, "---");
        assert_eq!(w.heading, "---");
    }

    #[test]
    fn vertical_window_modes() {
        let w = windows(false, false, WindowInputs { vs: -1500.0, ..Default::default() });
        assert_eq!(w.vertical_speed, "15##");
        assert!(!w.vs_sign);
        assert!(w.vs_vertical_line);

        let w = windows(false, false, WindowInputs { vs: 1250.0, ..Default::default() });
        assert_eq!(w.vertical_speed, "1250");
        assert!(w.vs_sign);

        let w = windows(false, true, WindowInputs { vs: -600.0, ..Default::default() });
        assert_eq!(w.vertical_speed, "06  ");
        assert!(w.fpa_comma && w.fpa_indication && !w.vs_sign);

        let w = windows(false, false, WindowInputs { vs_dashed: true, ..Default::default() });
        assert_eq!(w.vertical_speed, "-----");
        assert!(!w.vs_vertical_line);
    }

    const REFS: BaroRefs = BaroRefs { is_std: "t/std", unit_hpa: "t/hpa", in_hg: "t/inhg" };

    #[test]
    fn baro_steps_per_unit() {
        let (mock, store) = make_mock();
        set_int(&mock, "t/std", 0);
        set_int(&mock, "t/hpa", 1);
        set_float(&mock, "t/inhg", 29.92);
        let up = FcuButton::baro(42, "PRESS INC", EfisSide::Captain, true);

        run_action(&store, &up, CommandPhase::Begin, |_| REFS);
        let Some(DataRefValue::Float(v)) = mock.dataref("t/inhg") else { panic!("baro not written") };
        assert!(((v * HPA_PER_INHG) - (29.92 * HPA_PER_INHG + 1.0)).abs() < 0.01, "one hPa up, got {v}");

        set_int(&mock, "t/hpa", 0);
        set_float(&mock, "t/inhg", 29.92);
        let fresh = crate::datarefs::DatarefStore::new(mock.clone());
        run_action(&fresh, &up, CommandPhase::Continue, |_| REFS);
        run_action(&fresh, &up, CommandPhase::Begin, |_| REFS);
        let Some(DataRefValue::Float(v)) = mock.dataref("t/inhg") else { panic!("baro not written") };
        assert!((v - 29.93).abs() < 1e-4, "0.01 inHg up, got {v}");

        set_int(&mock, "t/std", 1);
        let std = crate::datarefs::DatarefStore::new(mock.clone());
        run_action(&std, &up, CommandPhase::Begin, |_| REFS);
        assert_eq!(mock.dataref("t/inhg"), Some(DataRefValue::Float(v)), "STD ignores the knob");
    }

    #[test]
    fn selector_steps_with_commands() {
        let (mock, store) = make_mock();
        set_int(&mock, "t/mode", 3);
        mock.add_command("t/left");
        mock.add_command("t/right");
        let b = FcuButton::step(45, "MODE LS", ("t/mode", "t/left", "t/right"), 0);
        run_action(&store, &b, CommandPhase::Begin, |_| REFS);
        let calls = mock.command_calls();
        assert_eq!(calls.iter().filter(|(n, _)| n == "t/left").count(), 3);
        assert!(calls.iter().all(|(n, _)| n != "t/right"));
    }

    #[test]
    fn toggle_and_set() {
        let (mock, store) = make_mock();
        set_int(&mock, "t/ap", 0);
        set_int(&mock, "t/range", 0);
        run_action(&store, &FcuButton::toggle(3, "AP1", "t/ap"), CommandPhase::Begin, |_| REFS);
        assert_eq!(mock.dataref("t/ap"), Some(DataRefValue::Int(1)));
        run_action(&store, &FcuButton::set(53, "RANGE 80", "t/range", 3.0), CommandPhase::Begin, |_| REFS);
        assert_eq!(mock.dataref("t/range"), Some(DataRefValue::Int(3)));
        run_action(&store, &FcuButton::toggle(3, "AP1", "t/ap"), CommandPhase::End, |_| REFS);
        assert_eq!(mock.dataref("t/ap"), Some(DataRefValue::Int(1)), "release does nothing");
    }
}
