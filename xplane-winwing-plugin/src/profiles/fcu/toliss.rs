//! ToLiss A319/A320/A321/A340 FCU and EFIS panels.

use winwing_protocol::fcu::FcuEfisLed;
use winwing_state::FcuDisplayData;

use super::{
    array_at, efis_value, fill_windows, level, num, on, BaroRefs, EfisSide, FcuButton, FcuEfisProfile,
    Watch, WindowInputs,
};
use crate::datarefs::DatarefStore;

const MARKER: &str = "AirbusFBW/FCUAvail";

mod dr {
    pub const FCU_AVAIL: &str   = "AirbusFBW/FCUAvail";
    pub const ANNUN_MODE: &str  = "AirbusFBW/AnnunMode";
    pub const REHOSTATS: &str   = "AirbusFBW/SupplLightLevelRehostats";

    pub const SPD: &str         = "sim/cockpit2/autopilot/airspeed_dial_kts_mach";
    pub const SPD_MANAGED: &str = "AirbusFBW/SPDmanaged";
    pub const SPD_DASHED: &str  = "AirbusFBW/SPDdashed";
    pub const HDG: &str         = "sim/cockpit/autopilot/heading_mag";
    pub const HDG_MANAGED: &str = "AirbusFBW/HDGmanaged";
    pub const HDG_DASHED: &str  = "AirbusFBW/HDGdashed";
    pub const ALT: &str         = "sim/cockpit/autopilot/altitude";
    pub const ALT_MANAGED: &str = "AirbusFBW/ALTmanaged";
    pub const VS: &str          = "sim/cockpit/autopilot/vertical_velocity";
    pub const VS_DASHED: &str   = "AirbusFBW/VSdashed";
    pub const IS_MACH: &str     = "sim/cockpit/autopilot/airspeed_is_mach";
    pub const HDG_TRK: &str     = "AirbusFBW/HDGTRKmode";

    pub const AP1: &str         = "AirbusFBW/AP1Engage";
    pub const AP2: &str         = "AirbusFBW/AP2Engage";
    pub const ATHR_MODE: &str   = "AirbusFBW/ATHRmode";
    pub const LOC: &str         = "AirbusFBW/LOCilluminated";
    pub const APPR: &str        = "AirbusFBW/APPRilluminated";
    pub const VERT_MODE: &str   = "AirbusFBW/APVerticalMode";

    pub const BARO_STD_CAPT: &str  = "AirbusFBW/BaroStdCapt";
    pub const BARO_UNIT_CAPT: &str = "AirbusFBW/BaroUnitCapt";
    pub const BARO_STD_FO: &str    = "AirbusFBW/BaroStdFO";
    pub const BARO_UNIT_FO: &str   = "AirbusFBW/BaroUnitFO";
    pub const BARO_CAPT: &str      = "sim/cockpit2/gauges/actuators/barometer_setting_in_hg_pilot";
    pub const BARO_FO: &str        = "sim/cockpit2/gauges/actuators/barometer_setting_in_hg_copilot";
}

/// AnnunMode: 0 dim, 1 bright, 2 test.
const ANNUN_DIM: i32  = 0;
const ANNUN_TEST: i32 = 2;
const GREEN_DIM: u8   = 60;
const GREEN_BRIGHT: u8 = 255;
/// Bit of APVerticalMode set while EXPED is active.
const EXPED_BIT: i32 = 0b0001_0000;

const DISPLAY_DATAREFS: &[&str] = &[
    dr::FCU_AVAIL,
    dr::ANNUN_MODE,
    dr::SPD,
    dr::SPD_MANAGED,
    dr::SPD_DASHED,
    dr::HDG,
    dr::HDG_MANAGED,
    dr::HDG_DASHED,
    dr::ALT,
    dr::ALT_MANAGED,
    dr::VS,
    dr::VS_DASHED,
    dr::IS_MACH,
    dr::HDG_TRK,
    dr::AP1,
    dr::AP2,
    dr::BARO_STD_CAPT,
    dr::BARO_UNIT_CAPT,
    dr::BARO_STD_FO,
    dr::BARO_UNIT_FO,
    dr::BARO_CAPT,
    dr::BARO_FO,
];

/// Indicator LEDs that simply follow one dataref.
const INDICATORS: &[(FcuEfisLed, &str)] = &[
    (FcuEfisLed::Ap1Green, dr::AP1),
    (FcuEfisLed::Ap2Green, dr::AP2),
    (FcuEfisLed::LocGreen, dr::LOC),
    (FcuEfisLed::ApprGreen, dr::APPR),
    (FcuEfisLed::EfisrFdGreen, "AirbusFBW/FD2Engage"),
    (FcuEfisLed::EfisrLsGreen, "AirbusFBW/ILSonFO"),
    (FcuEfisLed::EfisrCstrGreen, "AirbusFBW/NDShowCSTRFO"),
    (FcuEfisLed::EfisrWptGreen, "AirbusFBW/NDShowWPTFO"),
    (FcuEfisLed::EfisrVordGreen, "AirbusFBW/NDShowVORDFO"),
    (FcuEfisLed::EfisrNdbGreen, "AirbusFBW/NDShowNDBFO"),
    (FcuEfisLed::EfisrArptGreen, "AirbusFBW/NDShowARPTFO"),
    (FcuEfisLed::EfislFdGreen, "AirbusFBW/FD1Engage"),
    (FcuEfisLed::EfislLsGreen, "AirbusFBW/ILSonCapt"),
    (FcuEfisLed::EfislCstrGreen, "AirbusFBW/NDShowCSTRCapt"),
    (FcuEfisLed::EfislWptGreen, "AirbusFBW/NDShowWPTCapt"),
    (FcuEfisLed::EfislVordGreen, "AirbusFBW/NDShowVORDCapt"),
    (FcuEfisLed::EfislNdbGreen, "AirbusFBW/NDShowNDBCapt"),
    (FcuEfisLed::EfislArptGreen, "AirbusFBW/NDShowARPTCapt"),
];

const ND_MODE_CAPT: &str  = "AirbusFBW/NDmodeCapt";
const ND_MODE_FO: &str    = "AirbusFBW/NDmodeFO";
const ND_RANGE_CAPT: &str = "AirbusFBW/NDrangeCapt";
const ND_RANGE_FO: &str   = "AirbusFBW/NDrangeFO";
const EFIS1_CAPT: &str    = "sim/cockpit2/EFIS/EFIS_1_selection_pilot";
const EFIS2_CAPT: &str    = "sim/cockpit2/EFIS/EFIS_2_selection_pilot";
const EFIS1_FO: &str      = "sim/cockpit2/EFIS/EFIS_1_selection_copilot";
const EFIS2_FO: &str      = "sim/cockpit2/EFIS/EFIS_2_selection_copilot";
const ALT_STEP: &str      = "AirbusFBW/ALT100_1000";

const BUTTONS: &[FcuButton] = &[
    FcuButton::cmd(0, "MACH", "toliss_airbus/ias_mach_button_push"),
    FcuButton::cmd(1, "LOC", "AirbusFBW/LOCbutton"),
    FcuButton::cmd(2, "TRK", "toliss_airbus/hdgtrk_button_push"),
    FcuButton::toggle(3, "AP1", dr::AP1),
    FcuButton::toggle(4, "AP2", dr::AP2),
    FcuButton::cmd(5, "A/THR", "AirbusFBW/ATHRbutton"),
    FcuButton::cmd(6, "EXPED", "AirbusFBW/EXPEDbutton"),
    FcuButton::cmd(7, "METRIC", "toliss_airbus/metric_alt_button_push"),
    FcuButton::cmd(8, "APPR", "AirbusFBW/APPRbutton"),
    FcuButton::cmd(9, "SPD DEC", "sim/autopilot/airspeed_down"),
    FcuButton::cmd(10, "SPD INC", "sim/autopilot/airspeed_up"),
    FcuButton::cmd(11, "SPD PUSH", "AirbusFBW/PushSPDSel"),
    FcuButton::cmd(12, "SPD PULL", "AirbusFBW/PullSPDSel"),
    FcuButton::cmd(13, "HDG DEC", "sim/autopilot/heading_down"),
    FcuButton::cmd(14, "HDG INC", "sim/autopilot/heading_up"),
    FcuButton::cmd(15, "HDG PUSH", "AirbusFBW/PushHDGSel"),
    FcuButton::cmd(16, "HDG PULL", "AirbusFBW/PullHDGSel"),
    FcuButton::cmd(17, "ALT DEC", "sim/autopilot/altitude_down"),
    FcuButton::cmd(18, "ALT INC", "sim/autopilot/altitude_up"),
    FcuButton::cmd(19, "ALT PUSH", "AirbusFBW/PushAltitude"),
    FcuButton::cmd(20, "ALT PULL", "AirbusFBW/PullAltitude"),
    FcuButton::cmd(21, "VS DEC", "sim/autopilot/vertical_speed_down"),
    FcuButton::cmd(22, "VS INC", "sim/autopilot/vertical_speed_up"),
    FcuButton::cmd(23, "VS PUSH", "AirbusFBW/PushVSSel"),
    FcuButton::cmd(24, "VS PULL", "AirbusFBW/PullVSSel"),
    FcuButton::set(25, "ALT 100", ALT_STEP, 0.0),
    FcuButton::set(26, "ALT 1000", ALT_STEP, 1.0),
    // EFIS left
    FcuButton::cmd(32, "L_FD", "toliss_airbus/fd1_push"),
    FcuButton::cmd(33, "L_LS", "toliss_airbus/dispcommands/CaptLSButtonPush"),
    FcuButton::cmd(34, "L_CSTR", "toliss_airbus/dispcommands/CaptCstrPushButton"),
    FcuButton::cmd(35, "L_WPT", "toliss_airbus/dispcommands/CaptWptPushButton"),
    FcuButton::cmd(36, "L_VOR.D", "toliss_airbus/dispcommands/CaptVorDPushButton"),
    FcuButton::cmd(37, "L_NDB", "toliss_airbus/dispcommands/CaptNdbPushButton"),
    FcuButton::cmd(38, "L_ARPT", "toliss_airbus/dispcommands/CaptArptPushButton"),
    FcuButton::cmd(39, "L_STD PUSH", "toliss_airbus/capt_baro_push"),
    FcuButton::cmd(40, "L_STD PULL", "toliss_airbus/capt_baro_pull"),
    FcuButton::baro(41, "L_PRESS DEC", EfisSide::Captain, false),
    FcuButton::baro(42, "L_PRESS INC", EfisSide::Captain, true),
    FcuButton::set(43, "L_inHg", dr::BARO_UNIT_CAPT, 0.0),
    FcuButton::set(44, "L_hPa", dr::BARO_UNIT_CAPT, 1.0),
    FcuButton::set(45, "L_MODE LS", ND_MODE_CAPT, 0.0),
    FcuButton::set(46, "L_MODE VOR", ND_MODE_CAPT, 1.0),
    FcuButton::set(47, "L_MODE NAV", ND_MODE_CAPT, 2.0),
    FcuButton::set(48, "L_MODE ARC", ND_MODE_CAPT, 3.0),
    FcuButton::set(49, "L_MODE PLAN", ND_MODE_CAPT, 4.0),
    FcuButton::set(50, "L_RANGE 10", ND_RANGE_CAPT, 0.0),
    FcuButton::set(51, "L_RANGE 20", ND_RANGE_CAPT, 1.0),
    FcuButton::set(52, "L_RANGE 40", ND_RANGE_CAPT, 2.0),
    FcuButton::set(53, "L_RANGE 80", ND_RANGE_CAPT, 3.0),
    FcuButton::set(54, "L_RANGE 160", ND_RANGE_CAPT, 4.0),
    FcuButton::set(55, "L_RANGE 320", ND_RANGE_CAPT, 5.0),
    FcuButton::set(56, "L_1 ADF", EFIS1_CAPT, 0.0),
    FcuButton::set(57, "L_1 OFF", EFIS1_CAPT, 1.0),
    FcuButton::set(58, "L_1 VOR", EFIS1_CAPT, 2.0),
    FcuButton::set(59, "L_2 ADF", EFIS2_CAPT, 0.0),
    FcuButton::set(60, "L_2 OFF", EFIS2_CAPT, 1.0),
    FcuButton::set(61, "L_2 VOR", EFIS2_CAPT, 2.0),
    // EFIS right
    FcuButton::cmd(64, "R_FD", "toliss_airbus/fd2_push"),
    FcuButton::cmd(65, "R_LS", "toliss_airbus/dispcommands/CoLSButtonPush"),
    FcuButton::cmd(66, "R_CSTR", "toliss_airbus/dispcommands/CoCstrPushButton"),
    FcuButton::cmd(67, "R_WPT", "toliss_airbus/dispcommands/CoWptPushButton"),
    FcuButton::cmd(68, "R_VOR.D", "toliss_airbus/dispcommands/CoVorDPushButton"),
    FcuButton::cmd(69, "R_NDB", "toliss_airbus/dispcommands/CoNdbPushButton"),
    FcuButton::cmd(70, "R_ARPT", "toliss_airbus/dispcommands/CoArptPushButton"),
    FcuButton::cmd(71, "R_STD PUSH", "toliss_airbus/copilot_baro_push"),
    FcuButton::cmd(72, "R_STD PULL", "toliss_airbus/copilot_baro_pull"),
    FcuButton::baro(73, "R_PRESS DEC", EfisSide::FirstOfficer, false),
    FcuButton::baro(74, "R_PRESS INC", EfisSide::FirstOfficer, true),
    FcuButton::set(75, "R_inHg", dr::BARO_UNIT_FO, 0.0),
    FcuButton::set(76, "R_hPa", dr::BARO_UNIT_FO, 1.0),
    FcuButton::set(77, "R_MODE LS", ND_MODE_FO, 0.0),
    FcuButton::set(78, "R_MODE VOR", ND_MODE_FO, 1.0),
    FcuButton::set(79, "R_MODE NAV", ND_MODE_FO, 2.0),
    FcuButton::set(80, "R_MODE ARC", ND_MODE_FO, 3.0),
    FcuButton::set(81, "R_MODE PLAN", ND_MODE_FO, 4.0),
    FcuButton::set(82, "R_RANGE 10", ND_RANGE_FO, 0.0),
    FcuButton::set(83, "R_RANGE 20", ND_RANGE_FO, 1.0),
    FcuButton::set(84, "R_RANGE 40", ND_RANGE_FO, 2.0),
    FcuButton::set(85, "R_RANGE 80", ND_RANGE_FO, 3.0),
    FcuButton::set(86, "R_RANGE 160", ND_RANGE_FO, 4.0),
    FcuButton::set(87, "R_RANGE 320", ND_RANGE_FO, 5.0),
    FcuButton::set(88, "R_1 VOR", EFIS1_FO, 2.0),
    FcuButton::set(89, "R_1 OFF", EFIS1_FO, 1.0),
    FcuButton::set(90, "R_1 ADF", EFIS1_FO, 0.0),
    FcuButton::set(91, "R_2 VOR", EFIS2_FO, 2.0),
    FcuButton::set(92, "R_2 OFF", EFIS2_FO, 1.0),
    FcuButton::set(93, "R_2 ADF", EFIS2_FO, 0.0),
];

pub struct TolissFcuProfile;

impl TolissFcuProfile {
    pub fn is_eligible(store: &DatarefStore) -> bool {
        store.exists(MARKER)
    }

    pub fn boxed(_: ()) -> Box<dyn FcuEfisProfile> {
        Box::new(Self)
    }

    fn annun_mode(store: &DatarefStore) -> i32 {
        num(store, dr::ANNUN_MODE) as i32
    }
}

impl FcuEfisProfile for TolissFcuProfile {
    fn name(&self) -> &'static str {
        "ToLiss A3xx"
    }

    fn display_datarefs(&self) -> &'static [&'static str] {
        DISPLAY_DATAREFS
    }

    fn watch(&self, store: &DatarefStore, watch: &mut Watch) {
        watch.add_all::<f32>(store, DISPLAY_DATAREFS);
        for &(_, name) in INDICATORS {
            watch.add::<f32>(store, name);
        }
        watch.add_all::<f32>(store, &[dr::ATHR_MODE, dr::VERT_MODE]);
        watch.add::<Vec<f32>>(store, dr::REHOSTATS);
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

    fn update_display_data(&self, store: &DatarefStore, data: &mut FcuDisplayData) {
        let enabled = on(store, dr::FCU_AVAIL);
        let test = Self::annun_mode(store) == ANNUN_TEST;

        let w = &mut data.fcu;
        w.display_enabled = enabled;
        w.display_test = test;
        w.spd_managed = on(store, dr::SPD_MANAGED);
        w.hdg_managed = on(store, dr::HDG_MANAGED);
        w.alt_managed = on(store, dr::ALT_MANAGED);
        w.spd_mach = on(store, dr::IS_MACH);
        w.hdg_trk = on(store, dr::HDG_TRK);
        fill_windows(w, WindowInputs {
            speed:        num(store, dr::SPD),
            speed_dashed: on(store, dr::SPD_DASHED),
            heading:      num(store, dr::HDG),
            hdg_dashed:   on(store, dr::HDG_DASHED),
            altitude:     num(store, dr::ALT),
            vs:           num(store, dr::VS),
            vs_dashed:    on(store, dr::VS_DASHED),
        });

        data.efis_left = efis_value(store, self.baro_refs(EfisSide::Captain), enabled, test);
        data.efis_right = efis_value(store, self.baro_refs(EfisSide::FirstOfficer), enabled, test);
    }

    fn leds(&self, store: &DatarefStore) -> Vec<(FcuEfisLed, u8)> {
        let powered = on(store, dr::FCU_AVAIL);
        let annun = Self::annun_mode(store);
        let test = annun == ANNUN_TEST;
        let lamp = |lit: bool| u8::from(lit || test);

        let mut out: Vec<(FcuEfisLed, u8)> =
            INDICATORS.iter().map(|&(led, name)| (led, lamp(on(store, name)))).collect();
        out.push((FcuEfisLed::AthrGreen, lamp(num(store, dr::ATHR_MODE) > 0.0)));
        let vert = num(store, dr::VERT_MODE) as i32;
        out.push((FcuEfisLed::ExpedGreen, lamp(vert >= 0 && vert & EXPED_BIT != 0)));

        if let (Some(panel), Some(screen)) = (array_at(store, dr::REHOSTATS, 0), array_at(store, dr::REHOSTATS, 1)) {
            let backlight = if powered { level(panel) } else { 0 };
            let screen = if powered { level(screen) } else { 0 };
            let green = match (powered, annun == ANNUN_DIM) {
                (false, _) => 0,
                (true, true) => GREEN_DIM,
                (true, false) => GREEN_BRIGHT,
            };
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

    fn toliss_mock() -> (std::sync::Arc<crate::xplm_shim::MockXplm>, DatarefStore) {
        let (mock, store) = make_mock();
        set_int(&mock, dr::FCU_AVAIL, 1);
        set_int(&mock, dr::ANNUN_MODE, 1);
        set_float(&mock, dr::SPD, 250.0);
        set_float(&mock, dr::HDG, 90.0);
        set_float(&mock, dr::ALT, 5000.0);
        set_float(&mock, dr::VS, 0.0);
        set_int(&mock, dr::VS_DASHED, 1);
        set_float(&mock, dr::BARO_CAPT, 29.92);
        set_float(&mock, dr::BARO_FO, 29.92);
        set_int(&mock, dr::BARO_UNIT_CAPT, 1);
        set_int(&mock, dr::BARO_STD_FO, 1);
        (mock, store)
    }

    #[test]
    fn detected_first() {
        let (mock, store) = toliss_mock();
        mock.set_dataref("laminar/A333/ckpt_temp", DataRefValue::Float(20.0));
        let p = detect(&registry(), &store, ()).map(|p| p.name());
        assert_eq!(p, Some("ToLiss A3xx"));
    }

    #[test]
    fn display_data_from_datarefs() {
        let (_mock, store) = toliss_mock();
        let mut data = FcuDisplayData::default();
        TolissFcuProfile.update_display_data(&store, &mut data);

        assert_eq!(data.fcu.speed, "250");
        assert_eq!(data.fcu.heading, "090");
        assert_eq!(data.fcu.altitude, "05000");
        assert_eq!(data.fcu.vertical_speed, "-----");
        assert!(data.fcu.display_enabled && !data.fcu.display_test);
        assert_eq!(data.efis_left.baro, "1013", "captain on hPa");
        assert!(!data.efis_left.unit_is_in_hg);
        assert!(data.efis_right.is_std);
    }

    #[test]
    fn annunciator_test_lights_everything() {
        let (mock, store) = toliss_mock();
        mock.set_dataref(dr::REHOSTATS, DataRefValue::FloatArray(vec![0.5, 1.0]));
        let leds = TolissFcuProfile.leds(&store);
        assert_eq!(led_level(&leds, FcuEfisLed::Ap1Green), Some(0));
        assert_eq!(led_level(&leds, FcuEfisLed::Backlight), Some(127));
        assert_eq!(led_level(&leds, FcuEfisLed::ScreenBacklight), Some(255));
        assert_eq!(led_level(&leds, FcuEfisLed::OverallGreen), Some(GREEN_BRIGHT));

        let (mock, store) = toliss_mock();
        set_int(&mock, dr::ANNUN_MODE, ANNUN_TEST);
        let leds = TolissFcuProfile.leds(&store);
        assert_eq!(led_level(&leds, FcuEfisLed::Ap1Green), Some(1));
        assert_eq!(led_level(&leds, FcuEfisLed::EfislArptGreen), Some(1));
        assert_eq!(led_level(&leds, FcuEfisLed::Backlight), None, "no rehostat array, no backlight");
    }

    #[test]
    fn exped_follows_vertical_mode_bit() {
        let (mock, store) = toliss_mock();
        set_int(&mock, dr::VERT_MODE, 0x11);
        assert_eq!(led_level(&TolissFcuProfile.leds(&store), FcuEfisLed::ExpedGreen), Some(1));
    }

    #[test]
    fn buttons_dispatch() {
        let (mock, store) = toliss_mock();
        mock.add_command("AirbusFBW/PushAltitude");
        set_int(&mock, dr::AP1, 0);
        let mut p = TolissFcuProfile;

        let Some(alt_push) = find_button(BUTTONS, 19) else { panic!("ALT PUSH missing") };
        p.button_pressed(&store, alt_push, CommandPhase::Begin);
        p.button_pressed(&store, alt_push, CommandPhase::End);
        let calls = mock.command_calls();
        assert_eq!(calls, vec![("AirbusFBW/PushAltitude".to_string(), CommandPhase::Once)]);

        let Some(ap1) = find_button(BUTTONS, 3) else { panic!("AP1 missing") };
        p.button_pressed(&store, ap1, CommandPhase::Begin);
        assert_eq!(mock.dataref(dr::AP1), Some(DataRefValue::Int(1)));
        assert!(find_button(BUTTONS, 27).is_none(), "27..31 unassigned");
    }
}
