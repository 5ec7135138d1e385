//! Laminar Research A330-300 (default X-Plane 12 aircraft).

use winwing_protocol::fcu::FcuEfisLed;
use winwing_state::FcuDisplayData;

use super::{
    array_at, efis_value, fill_windows, level, num, on, BaroRefs, EfisSide, FcuButton, FcuEfisProfile,
    Watch, WindowInputs,
};
use crate::datarefs::DatarefStore;

const MARKER: &str = "laminar/A333/ckpt_temp";

mod dr {
    pub const BATTERY_ON: &str  = "sim/cockpit/electrical/battery_on";
    pub const BRIGHTNESS: &str  = "sim/cockpit2/electrical/instrument_brightness_ratio";

    pub const SPD: &str         = "sim/cockpit2/autopilot/airspeed_dial_kts_mach";
    pub const SPD_WINDOW: &str  = "sim/cockpit2/autopilot/vnav_speed_window_open";
    pub const HDG: &str         = "sim/cockpit/autopilot/heading_mag";
    pub const HDG_WINDOW: &str  = "laminar/A333/autopilot/hdg_window_open";
    pub const ALT: &str         = "sim/cockpit/autopilot/altitude";
    pub const FMS_VNAV: &str    = "sim/cockpit2/autopilot/fms_vnav";
    pub const VS: &str          = "sim/cockpit/autopilot/vertical_velocity";
    pub const VS_WINDOW: &str   = "laminar/A333/autopilot/vvi_fpa_window_open";
    pub const IS_MACH: &str     = "sim/cockpit/autopilot/airspeed_is_mach";
    pub const TRK_FPA: &str     = "sim/cockpit2/autopilot/trk_fpa";
    pub const SPEED_STATUS: &str = "sim/cockpit2/autopilot/speed_status";

    pub const AP1: &str = "laminar/A333/annun/autopilot/ap1_mode";
    pub const AP2: &str = "laminar/A333/annun/autopilot/ap2_mode";

    pub const BARO_STD_CAPT: &str = "sim/cockpit2/gauges/actuators/barometer_setting_is_std_pilot";
    pub const BARO_STD_FO: &str   = "sim/cockpit2/gauges/actuators/barometer_setting_is_std_copilot";
    pub const BARO_UNIT_CAPT: &str = "laminar/A333/barometer/capt_inHg_hPa_pos";
    pub const BARO_UNIT_FO: &str   = "laminar/A333/barometer/fo_inHg_hPa_pos";
    pub const BARO_CAPT: &str      = "sim/cockpit2/gauges/actuators/barometer_setting_in_hg_pilot";
    pub const BARO_FO: &str        = "sim/cockpit2/gauges/actuators/barometer_setting_in_hg_copilot";
}

/// Indices into the instrument brightness array.
const PANEL_RHEOSTAT: usize  = 14;
const SCREEN_RHEOSTAT: usize = 10;

const DISPLAY_DATAREFS: &[&str] = &[
    dr::AP1,
    dr::AP2,
    dr::SPD_WINDOW,
    dr::HDG_WINDOW,
    dr::VS_WINDOW,
    dr::IS_MACH,
    dr::TRK_FPA,
    dr::SPD,
    dr::HDG,
    dr::ALT,
    dr::VS,
    dr::SPEED_STATUS,
    dr::FMS_VNAV,
    dr::BARO_STD_CAPT,
    dr::BARO_STD_FO,
    dr::BARO_UNIT_CAPT,
    dr::BARO_UNIT_FO,
    dr::BARO_CAPT,
    dr::BARO_FO,
];

const INDICATORS: &[(FcuEfisLed, &str)] = &[
    (FcuEfisLed::Ap1Green, dr::AP1),
    (FcuEfisLed::Ap2Green, dr::AP2),
    (FcuEfisLed::AthrGreen, "laminar/A333/annun/autopilot/a_thr_mode"),
    (FcuEfisLed::LocGreen, "laminar/A333/annun/autopilot/loc_mode"),
    (FcuEfisLed::ApprGreen, "laminar/A333/annun/autopilot/appr_mode"),
    (FcuEfisLed::ExpedGreen, "laminar/A333/annun/autopilot/alt_mode"),
    (FcuEfisLed::EfisrFdGreen, "laminar/A333/annun/fo_flight_director_on"),
    (FcuEfisLed::EfisrLsGreen, "laminar/A333/annun/fo_ls_bars_on"),
    (FcuEfisLed::EfisrCstrGreen, "laminar/A333/annun/EFIS_fo_cstr"),
    (FcuEfisLed::EfisrWptGreen, "laminar/A333/annun/EFIS_fo_fix"),
    (FcuEfisLed::EfisrVordGreen, "laminar/A333/annun/EFIS_fo_vor"),
    (FcuEfisLed::EfisrNdbGreen, "laminar/A333/annun/EFIS_fo_ndb"),
    (FcuEfisLed::EfisrArptGreen, "laminar/A333/annun/EFIS_fo_arpt"),
    (FcuEfisLed::EfislFdGreen, "laminar/A333/annun/capt_flight_director_on"),
    (FcuEfisLed::EfislLsGreen, "laminar/A333/annun/captain_ls_bars_on"),
    (FcuEfisLed::EfislCstrGreen, "laminar/A333/annun/EFIS_capt_cstr"),
    (FcuEfisLed::EfislWptGreen, "laminar/A333/annun/EFIS_capt_fix"),
    (FcuEfisLed::EfislVordGreen, "laminar/A333/annun/EFIS_capt_vor"),
    (FcuEfisLed::EfislNdbGreen, "laminar/A333/annun/EFIS_capt_ndb"),
    (FcuEfisLed::EfislArptGreen, "laminar/A333/annun/EFIS_capt_arpt"),
];

const MODE_CAPT: (&str, &str, &str) = (
    "laminar/A333/knobs/EFIS_mode_pos_capt",
    "laminar/A333/knobs/capt_EFIS_knob_left",
    "laminar/A333/knobs/capt_EFIS_knob_right",
);
const MODE_FO: (&str, &str, &str) = (
    "laminar/A333/knobs/EFIS_mode_pos_fo",
    "laminar/A333/knobs/fo_EFIS_knob_left",
    "laminar/A333/knobs/fo_EFIS_knob_right",
);
const RANGE_CAPT: &str = "sim/cockpit2/EFIS/map_range";
const RANGE_FO: &str   = "sim/cockpit2/EFIS/map_range_copilot";
const EFIS1_CAPT: &str = "sim/cockpit2/EFIS/EFIS_1_selection_pilot";
const EFIS2_CAPT: &str = "sim/cockpit2/EFIS/EFIS_2_selection_pilot";
const EFIS1_FO: &str   = "sim/cockpit2/EFIS/EFIS_1_selection_copilot";
const EFIS2_FO: &str   = "sim/cockpit2/EFIS/EFIS_2_selection_copilot";

const BUTTONS: &[FcuButton] = &[
    FcuButton::cmd(0, "MACH", "sim/autopilot/knots_mach_toggle"),
    FcuButton::cmd(1, "LOC", "sim/autopilot/NAV"),
    FcuButton::cmd(2, "TRK", "sim/autopilot/trkfpa"),
    FcuButton::cmd(3, "AP1", "sim/autopilot/servos_toggle"),
    FcuButton::cmd(4, "AP2", "sim/autopilot/servos2_toggle"),
    FcuButton::cmd(5, "A/THR", "laminar/A333/autopilot/a_thr_toggle"),
    FcuButton::cmd(6, "EXPED", "sim/autopilot/altitude_hold"),
    FcuButton::cmd(7, "METRIC", "laminar/A333/autopilot/metric_alt_push"),
    FcuButton::cmd(8, "APPR", "sim/autopilot/approach"),
    FcuButton::cmd(9, "SPD DEC", "sim/autopilot/airspeed_down"),
    FcuButton::cmd(10, "SPD INC", "sim/autopilot/airspeed_up"),
    FcuButton::cmd(11, "SPD PUSH", "laminar/A333/autopilot/speed_knob_push"),
    FcuButton::cmd(12, "SPD PULL", "laminar/A333/autopilot/speed_knob_pull"),
    FcuButton::cmd(13, "HDG DEC", "sim/autopilot/heading_down"),
    FcuButton::cmd(14, "HDG INC", "sim/autopilot/heading_up"),
    FcuButton::cmd(15, "HDG PUSH", "laminar/A333/autopilot/heading_knob_push"),
    FcuButton::cmd(16, "HDG PULL", "laminar/A333/autopilot/heading_knob_pull"),
    FcuButton::cmd(17, "ALT DEC", "sim/autopilot/altitude_down"),
    FcuButton::cmd(18, "ALT INC", "sim/autopilot/altitude_up"),
    FcuButton::cmd(19, "ALT PUSH", "laminar/A333/autopilot/altitude_knob_push"),
    FcuButton::cmd(20, "ALT PULL", "laminar/A333/autopilot/altitude_knob_pull"),
    FcuButton::cmd(21, "VS DEC", "sim/autopilot/vertical_speed_down"),
    FcuButton::cmd(22, "VS INC", "sim/autopilot/vertical_speed_up"),
    FcuButton::cmd(23, "VS PUSH", "laminar/A333/autopilot/vertical_knob_push"),
    FcuButton::cmd(24, "VS PULL", "laminar/A333/autopilot/vertical_knob_pull"),
    FcuButton::cmd(25, "ALT 100", "laminar/A333/autopilot/alt_step_left"),
    FcuButton::cmd(26, "ALT 1000", "laminar/A333/autopilot/alt_step_right"),
    // EFIS left
    FcuButton::cmd(32, "L_FD", "sim/autopilot/fdir_command_bars_toggle"),
    FcuButton::cmd(33, "L_LS", "laminar/A333/buttons/capt_ils_bars_push"),
    FcuButton::cmd(34, "L_CSTR", "laminar/A333/buttons/capt_EFIS_CSTR"),
    FcuButton::cmd(35, "L_WPT", "sim/instruments/EFIS_fix"),
    FcuButton::cmd(36, "L_VOR.D", "sim/instruments/EFIS_vor"),
    FcuButton::cmd(37, "L_NDB", "sim/instruments/EFIS_ndb"),
    FcuButton::cmd(38, "L_ARPT", "sim/instruments/EFIS_apt"),
    FcuButton::cmd(39, "L_STD PUSH", "laminar/A333/push/baro/capt_std"),
    FcuButton::cmd(40, "L_STD PULL", "laminar/A333/pull/baro/capt_std"),
    FcuButton::baro(41, "L_PRESS DEC", EfisSide::Captain, false),
    FcuButton::baro(42, "L_PRESS INC", EfisSide::Captain, true),
    FcuButton::cmd(43, "L_inHg", "laminar/A333/knob/baro/capt_inHg"),
    FcuButton::cmd(44, "L_hPa", "laminar/A333/knob/baro/capt_hPa"),
    FcuButton::step(45, "L_MODE LS", MODE_CAPT, 0),
    FcuButton::step(46, "L_MODE VOR", MODE_CAPT, 1),
    FcuButton::step(47, "L_MODE NAV", MODE_CAPT, 2),
    FcuButton::step(48, "L_MODE ARC", MODE_CAPT, 3),
    FcuButton::step(49, "L_MODE PLAN", MODE_CAPT, 4),
    FcuButton::set(50, "L_RANGE 10", RANGE_CAPT, 0.0),
    FcuButton::set(51, "L_RANGE 20", RANGE_CAPT, 1.0),
    FcuButton::set(52, "L_RANGE 40", RANGE_CAPT, 2.0),
    FcuButton::set(53, "L_RANGE 80", RANGE_CAPT, 3.0),
    FcuButton::set(54, "L_RANGE 160", RANGE_CAPT, 4.0),
    FcuButton::set(55, "L_RANGE 320", RANGE_CAPT, 5.0),
    FcuButton::set(56, "L_1 ADF", EFIS1_CAPT, 0.0),
    FcuButton::set(57, "L_1 OFF", EFIS1_CAPT, 1.0),
    FcuButton::set(58, "L_1 VOR", EFIS1_CAPT, 2.0),
    FcuButton::set(59, "L_2 ADF", EFIS2_CAPT, 0.0),
    FcuButton::set(60, "L_2 OFF", EFIS2_CAPT, 1.0),
    FcuButton::set(61, "L_2 VOR", EFIS2_CAPT, 2.0),
    // EFIS right
    FcuButton::cmd(64, "R_FD", "sim/autopilot/fdir2_command_bars_toggle"),
    FcuButton::cmd(65, "R_LS", "laminar/A333/buttons/fo_ils_bars_push"),
    FcuButton::cmd(66, "R_CSTR", "laminar/A333/buttons/fo_EFIS_CSTR"),
    FcuButton::cmd(67, "R_WPT", "sim/instruments/EFIS_copilot_fix"),
    FcuButton::cmd(68, "R_VOR.D", "sim/instruments/EFIS_copilot_vor"),
    FcuButton::cmd(69, "R_NDB", "sim/instruments/EFIS_copilot_ndb"),
    FcuButton::cmd(70, "R_ARPT", "sim/instruments/EFIS_copilot_apt"),
    FcuButton::cmd(71, "R_STD PUSH", "laminar/A333/push/baro/fo_std"),
    FcuButton::cmd(72, "R_STD PULL", "laminar/A333/pull/baro/fo_std"),
    FcuButton::baro(73, "R_PRESS DEC", EfisSide::FirstOfficer, false),
    FcuButton::baro(74, "R_PRESS INC", EfisSide::FirstOfficer, true),
    FcuButton::cmd(75, "R_inHg", "laminar/A333/knob/baro/fo_inHg"),
    FcuButton::cmd(76, "R_hPa", "laminar/A333/knob/baro/fo_hPa"),
    FcuButton::step(77, "R_MODE LS", MODE_FO, 0),
    FcuButton::step(78, "R_MODE VOR", MODE_FO, 1),
    FcuButton::step(79, "R_MODE NAV", MODE_FO, 2),
    FcuButton::step(80, "R_MODE ARC", MODE_FO, 3),
    FcuButton::step(81, "R_MODE PLAN", MODE_FO, 4),
    FcuButton::set(82, "R_RANGE 10", RANGE_FO, 0.0),
    FcuButton::set(83, "R_RANGE 20", RANGE_FO, 1.0),
    FcuButton::set(84, "R_RANGE 40", RANGE_FO, 2.0),
    FcuButton::set(85, "R_RANGE 80", RANGE_FO, 3.0),
    FcuButton::set(86, "R_RANGE 160", RANGE_FO, 4.0),
    FcuButton::set(87, "R_RANGE 320", RANGE_FO, 5.0),
    FcuButton::set(88, "R_1 VOR", EFIS1_FO, 2.0),
    FcuButton::set(89, "R_1 OFF", EFIS1_FO, 1.0),
    FcuButton::set(90, "R_1 ADF", EFIS1_FO, 0.0),
    FcuButton::set(91, "R_2 VOR", EFIS2_FO, 2.0),
    FcuButton::set(92, "R_2 OFF", EFIS2_FO, 1.0),
    FcuButton::set(93, "R_2 ADF", EFIS2_FO, 0.0),
];

pub struct LaminarA333Profile;

impl LaminarA333Profile {
    pub fn is_eligible(store: &DatarefStore) -> bool {
        store.exists(MARKER)
    }

    pub fn boxed(_: ()) -> Box<dyn FcuEfisProfile> {
        Box::new(Self)
    }
}

impl FcuEfisProfile for LaminarA333Profile {
    fn name(&self) -> &'static str {
        "Laminar A330"
    }

    fn display_datarefs(&self) -> &'static [&'static str] {
        DISPLAY_DATAREFS
    }

    fn watch(&self, store: &DatarefStore, watch: &mut Watch) {
        watch.add_all::<f32>(store, DISPLAY_DATAREFS);
        for &(_, name) in INDICATORS {
            watch.add::<f32>(store, name);
        }
        watch.add::<f32>(store, dr::BATTERY_ON);
        watch.add::<Vec<f32>>(store, dr::BRIGHTNESS);
    }

    fn buttons(&self) -> &'static [FcuButton] {
        BUTTONS
    }

    fn baro_refs(&self, side: EfisSide) -> BaroRefs {
        match side {
            EfisSide::Captain => BaroRefs { is_std: dr::BARO_STD_CAPT, unit_hpa: dr::BARO_UNIT_CAPT, in_hg: dr::BARO_CAPT },
            EfisSide::FirstOfficer => BaroRefs { is_std: dr::BARO_STD_FO, unit_hpa: dr::BARO_UNIT_FO, in_hg: dr::BARO_FO },
        }
    }

    /// Windows closed means managed. The panel has no test mode.
    fn update_display_data(&self, store: &DatarefStore, data: &mut FcuDisplayData) {
        let speed_open = on(store, dr::SPD_WINDOW);
        let w = &mut data.fcu;
        w.spd_managed = !speed_open;
        w.hdg_managed = !on(store, dr::HDG_WINDOW);
        w.alt_managed = on(store, dr::FMS_VNAV);
        w.spd_mach = on(store, dr::IS_MACH);
        w.hdg_trk = on(store, dr::TRK_FPA);
        fill_windows(w, WindowInputs {
            speed:        num(store, dr::SPD),
            speed_dashed: !speed_open,
            heading:      num(store, dr::HDG),
            hdg_dashed:   false,
            altitude:     num(store, dr::ALT),
            vs:           num(store, dr::VS),
            vs_dashed:    !on(store, dr::VS_WINDOW),
        });

        data.efis_left = efis_value(store, self.baro_refs(EfisSide::Captain), true, false);
        data.efis_right = efis_value(store, self.baro_refs(EfisSide::FirstOfficer), true, false);
    }

    fn leds(&self, store: &DatarefStore) -> Vec<(FcuEfisLed, u8)> {
        let mut out: Vec<(FcuEfisLed, u8)> =
            INDICATORS.iter().map(|&(led, name)| (led, u8::from(on(store, name)))).collect();

        let powered = on(store, dr::BATTERY_ON);
        let panel = array_at(store, dr::BRIGHTNESS, PANEL_RHEOSTAT);
        let screen = array_at(store, dr::BRIGHTNESS, SCREEN_RHEOSTAT);
        if let (Some(panel), Some(screen)) = (panel, screen) {
            let backlight = if powered { level(panel) } else { 0 };
            let screen = if powered { level(screen) } else { 0 };
            let green = if powered { 255 } else { 0 };
            for led in [FcuEfisLed::Backlight, FcuEfisLed::EfisrBacklight, FcuEfisLed::EfislBacklight, FcuEfisLed::ExpedBacklight] {
                out.push((led, backlight));
            }
            for led in [FcuEfisLed::OverallGreen, FcuEfisLed::EfisrOverallGreen, FcuEfisLed::EfislOverallGreen] {
                out.push((led, green));
            }
            for led in [FcuEfisLed::ScreenBacklight, FcuEfisLed::EfisrScreenBacklight, FcuEfisLed::EfislScreenBacklight] {
                out.push((led, screen));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{find_button, registry};
    use super::*;
    use crate::profiles::detect;
    use crate::xplm_shim::{CommandPhase, DataRefValue};

    #[test]
    fn eligible_only_in_the_a330() {
        let (mock, store) = make_mock();
        assert!(detect(&registry(), &store, ()).is_none());
        set_float(&mock, MARKER, 21.0);
        assert_eq!(detect(&registry(), &store, ()).map(|p| p.name()), Some("Laminar A330"));
    }

    #[test]
    fn closed_windows_show_managed_dashes() {
        let (mock, store) = make_mock();
        set_float(&mock, dr::SPD, 280.0);
        set_int(&mock, dr::SPD_WINDOW, 0);
        set_int(&mock, dr::HDG_WINDOW, 1);
        set_float(&mock, dr::HDG, 275.0);
        set_int(&mock, dr::VS_WINDOW, 1);
        set_float(&mock, dr::VS, -700.0);
        set_float(&mock, dr::BARO_CAPT, 29.92);
        set_int(&mock, dr::BARO_UNIT_CAPT, 0);

        let mut data = FcuDisplayData::default();
        LaminarA333Profile.update_display_data(&store, &mut data);
        assert_eq!(data.fcu.speed, "---");
        assert!(data.fcu.spd_managed && !data.fcu.hdg_managed);
        assert_eq!(data.fcu.heading, "275");
        assert_eq!(data.fcu.vertical_speed, "07##");
        assert!(!data.fcu.vs_sign);
        assert_eq!(data.efis_left.baro, "2992");
        assert!(data.efis_left.unit_is_in_hg);
    }

    #[test]
    fn brightness_needs_battery() {
        let (mock, store) = make_mock();
        let mut levels = vec![0.0; 16];
        levels[PANEL_RHEOSTAT] = 1.0;
        levels[SCREEN_RHEOSTAT] = 0.2;
        mock.set_dataref(dr::BRIGHTNESS, DataRefValue::FloatArray(levels));
        set_int(&mock, dr::BATTERY_ON, 0);
        let leds = LaminarA333Profile.leds(&store);
        assert_eq!(led_level(&leds, FcuEfisLed::Backlight), Some(0), "dark without battery");
        assert_eq!(led_level(&leds, FcuEfisLed::OverallGreen), Some(0));

        set_int(&mock, dr::BATTERY_ON, 1);
        set_int(&mock, dr::AP1, 1);
        store.update();
        let leds = LaminarA333Profile.leds(&store);
        assert_eq!(led_level(&leds, FcuEfisLed::Backlight), Some(255));
        assert_eq!(led_level(&leds, FcuEfisLed::EfislScreenBacklight), Some(51));
        assert_eq!(led_level(&leds, FcuEfisLed::OverallGreen), Some(255));
        assert_eq!(led_level(&leds, FcuEfisLed::Ap1Green), Some(1));
    }

    #[test]
    fn mode_selector_walks_right() {
        let (mock, store) = make_mock();
        set_int(&mock, MODE_FO.0, 1);
        mock.add_command(MODE_FO.2);
        let Some(plan) = find_button(BUTTONS, 81) else { panic!("R_MODE PLAN missing") };
        LaminarA333Profile.button_pressed(&store, plan, CommandPhase::Begin);
        assert_eq!(count_calls(&mock, MODE_FO.2), 3, "VOR to PLAN is three clicks right");
    }
}
