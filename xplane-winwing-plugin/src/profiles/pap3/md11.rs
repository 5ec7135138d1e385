//! Rotate MD-11. The glareshield controller has no annunciators and no
//! maintained switches; its buttons are momentary datarefs.

use winwing_state::{Pap3Leds, Pap3State};

use super::{power, turn_encoder, Encoder, Pap3Ctx, Pap3Profile};
use crate::datarefs::DatarefStore;
use crate::profiles::{is_on, position, Watch};

const MARKER: &str = "Rotate/aircraft/systems/gcp_alt_presel_ft";

mod dr {
    pub const ALT:           &str = "Rotate/aircraft/systems/gcp_alt_presel_ft";
    pub const SPD_IAS:       &str = "Rotate/aircraft/systems/gcp_spd_presel_ias";
    pub const SPD_MACH:      &str = "Rotate/aircraft/systems/gcp_spd_presel_mach";
    pub const IAS_MACH_MODE: &str = "Rotate/aircraft/systems/gcp_active_ias_mach_mode";
    pub const FMS_SPD:       &str = "Rotate/aircraft/systems/afs_fms_spd_engaged";
    pub const HDG:           &str = "Rotate/aircraft/systems/gcp_hdg_presel_deg";
    pub const HDG_TRK_SEL:   &str = "Rotate/aircraft/systems/gcp_hdg_trk_sel_set";
    pub const VS:            &str = "Rotate/aircraft/systems/gcp_vs_sel_fpm";
    pub const AT_ENGAGED:    &str = "Rotate/aircraft/systems/afs_at_engaged";
    pub const PANEL_BRT:     &str = "Rotate/aircraft/systems/light_fgs_panel_brt_ratio";
    pub const BATT_BUS:      &str = "Rotate/aircraft/systems/elec_dc_batt_bus_pwrd";
    pub const BATT_GRD:      &str = "Rotate/aircraft/controls/battery_grd";
    pub const CRS_1:         &str = "sim/cockpit/radios/nav1_obs_degm";
    pub const CRS_2:         &str = "sim/cockpit/radios/nav2_obs_degm";
}

/// Button bound to a control dataref: `value` while held, 0 on release.
struct ControlButton {
    offset:  u8,
    mask:    u8,
    dataref: &'static str,
    value:   i32,
}

const fn ctl(offset: u8, mask: u8, dataref: &'static str, value: i32) -> ControlButton {
    ControlButton { offset, mask, dataref, value }
}

const BUTTONS: &[ControlButton] = &[
    ctl(0x01, 0x02, "Rotate/aircraft/controls/fgs_fms_spd", 1),
    ctl(0x01, 0x04, "Rotate/aircraft/controls/fgs_prof", 1),
    ctl(0x01, 0x08, "Rotate/aircraft/controls/fgs_alt_mode_sel", -1),
    ctl(0x01, 0x10, "Rotate/aircraft/controls/fgs_hdg_mode_sel", -1),
    ctl(0x01, 0x20, "Rotate/aircraft/controls/fgs_nav", 1),
    ctl(0x01, 0x80, "Rotate/aircraft/controls/fgs_appr_land", 1),
    ctl(0x02, 0x01, "Rotate/aircraft/controls/fgs_alt_mode_sel", 1),
    ctl(0x02, 0x02, "Rotate/aircraft/controls/fgs_vs_fpa", 1),
    ctl(0x02, 0x04, "Rotate/aircraft/controls/fgs_autoflight", 1),
    ctl(0x02, 0x08, "Rotate/aircraft/controls/fgs_afs_ovrd_off_1", 1),
    ctl(0x02, 0x10, "Rotate/aircraft/controls/fgs_autoflight", 1),
    ctl(0x02, 0x20, "Rotate/aircraft/controls/fgs_afs_ovrd_off_2", 1),
    ctl(0x02, 0x40, "Rotate/aircraft/controls/fgs_ias_mach", 1),
    ctl(0x02, 0x80, "Rotate/aircraft/controls/fgs_spd_sel_mode", -1),
    ctl(0x03, 0x01, "Rotate/aircraft/controls/fgs_alt_mode_sel", -1),
];

// No course selectors on the GCP; both CRS knobs turn the sim heading bug.
const ENCODERS: &[Encoder] = &[
    Encoder::new(0x15, "sim/autopilot/heading_up", "sim/autopilot/heading_down"),
    Encoder::new(0x17, "Rotate/aircraft/controls_c/fgs_spd_sel_up", "Rotate/aircraft/controls_c/fgs_spd_sel_dn"),
    Encoder::new(0x19, "Rotate/aircraft/controls_c/fgs_hdg_sel_up", "Rotate/aircraft/controls_c/fgs_hdg_sel_dn"),
    Encoder::new(0x1B, "Rotate/aircraft/controls_c/fgs_alt_sel_up", "Rotate/aircraft/controls_c/fgs_alt_sel_dn"),
    Encoder::new(0x1D, "Rotate/aircraft/controls_c/fgs_pitch_sel_up", "Rotate/aircraft/controls_c/fgs_pitch_sel_dn"),
    Encoder::new(0x1F, "sim/autopilot/heading_up", "sim/autopilot/heading_down"),
];

pub struct RotateMd11Profile {
    state:   Pap3State,
    running: bool,
    watch:   Watch,
    /// Button backlight stays dark for the first powered poll.
    backlight_initialized: bool,
    /// Set by the first powered poll so the next tick polls again.
    repoll: bool,
    /// The selector reads 0 for a while after load even in HDG mode.
    hdg_trk_initialized: bool,
}

impl RotateMd11Profile {
    pub fn new() -> Self {
        Self {
            state: Pap3State { crs_visible: false, ..Pap3State::default() },
            running: false,
            watch: Watch::new(),
            backlight_initialized: false,
            repoll: false,
            hdg_trk_initialized: false,
        }
    }

    pub fn is_eligible(store: &DatarefStore) -> bool {
        store.exists(MARKER)
    }

    pub fn boxed(_: ()) -> Box<dyn Pap3Profile> {
        Box::new(Self::new())
    }

    fn poll(&mut self, store: &DatarefStore) {
        let st = &mut self.state;

        match position(store, dr::IAS_MACH_MODE) {
            Some(0) | None => {
                if let Some(v) = store.get::<f32>(dr::SPD_IAS) {
                    st.spd = v;
                    st.spd_visible = true;
                }
            }
            Some(1) => {
                if let Some(v) = store.get::<f32>(dr::SPD_MACH) {
                    st.spd = v;
                    st.spd_visible = true;
                }
            }
            Some(_) => {}
        }
        if position(store, dr::FMS_SPD) == Some(1) {
            st.spd_visible = false;
        }

        if let Some(v) = position(store, dr::HDG) {
            st.hdg = v.rem_euclid(360);
        }
        st.hdg_visible = match position(store, dr::HDG_TRK_SEL) {
            None => true,
            Some(sel) if self.hdg_trk_initialized => sel == 1,
            Some(sel) => {
                if sel == 1 {
                    self.hdg_trk_initialized = true;
                }
                // Anything else during load keeps the last value.
                if sel == 0 || sel == 1 { true } else { st.hdg_visible }
            }
        };

        if let Some(v) = position(store, dr::ALT) {
            st.alt = v;
        }
        if let Some(v) = store.get::<f32>(dr::VS) {
            st.vvi = v;
            st.vvi_visible = v.abs() > 0.5;
        }

        st.crs_visible = false;
        if let Some(v) = position(store, dr::CRS_1) {
            st.crs_capt = v.rem_euclid(360);
        }
        if let Some(v) = position(store, dr::CRS_2) {
            st.crs_fo = v.rem_euclid(360);
        }
        st.at_arm_on = is_on(store, dr::AT_ENGAGED);

        if is_on(store, dr::BATT_BUS) {
            self.repoll = !self.backlight_initialized;
            st.mcp_brightness = 1.0;
            match store.get::<f32>(dr::PANEL_BRT) {
                Some(panel) => {
                    st.cockpit_lights = panel.clamp(0.0, 1.0);
                    st.leds_brightness = if self.backlight_initialized { panel } else { 0.0 };
                }
                None => {
                    st.cockpit_lights = 1.0;
                    st.leds_brightness = if self.backlight_initialized { 1.0 } else { 0.0 };
                }
            }
            self.backlight_initialized = true;
        } else {
            st.mcp_brightness = 0.0;
            st.cockpit_lights = 0.0;
            st.leds_brightness = 0.0;
        }

        st.digit_a = false;
        st.digit_b = false;
        st.leds = Pap3Leds::default();
    }
}

impl Default for RotateMd11Profile {
    fn default() -> Self {
        Self::new()
    }
}

impl Pap3Profile for RotateMd11Profile {
    fn name(&self) -> &'static str {
        "Rotate MD-11"
    }

    fn start(&mut self, store: &DatarefStore) {
        self.running = true;
        self.backlight_initialized = false;
        self.hdg_trk_initialized = false;
        self.repoll = false;
        self.state.hdg_visible = true;
        self.watch.add_all::<f32>(store, &[
            dr::ALT, dr::SPD_IAS, dr::SPD_MACH, dr::IAS_MACH_MODE, dr::FMS_SPD, dr::HDG, dr::HDG_TRK_SEL,
            dr::VS, dr::AT_ENGAGED, dr::PANEL_BRT, dr::BATT_BUS, dr::CRS_1, dr::CRS_2,
        ]);
    }

    fn stop(&mut self, store: &DatarefStore) {
        self.running = false;
        self.watch.clear(store);
    }

    fn current(&self) -> &Pap3State {
        &self.state
    }

    fn tick(&mut self, ctx: &mut Pap3Ctx<'_>) -> bool {
        if !self.running {
            return false;
        }
        self.watch.refresh(ctx.store);
        let dirty = self.watch.take();
        if !(dirty || std::mem::take(&mut self.repoll)) {
            return false;
        }
        let before = self.state.clone();
        self.poll(ctx.store);
        self.state != before
    }

    fn on_button(&mut self, ctx: &mut Pap3Ctx<'_>, offset: u8, mask: u8, pressed: bool) {
        if let Some(b) = BUTTONS.iter().find(|b| b.offset == offset && b.mask == mask) {
            ctx.store.set::<i32>(b.dataref, if pressed { b.value } else { 0 });
        }
    }

    fn on_encoder_delta(&mut self, ctx: &mut Pap3Ctx<'_>, offset: u8, delta: i8) {
        turn_encoder(ctx.store, ENCODERS, offset, delta);
    }

    fn power_mask(&self, store: &DatarefStore) -> u8 {
        if is_on(store, dr::BATT_BUS) || is_on(store, dr::BATT_GRD) {
            power::MCP
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::xplm_shim::DataRefValue;
    use std::time::Instant;

    fn md11_mock() -> (std::sync::Arc<crate::xplm_shim::MockXplm>, DatarefStore) {
        let (mock, store) = make_mock();
        set_int(&mock, dr::ALT, 31000);
        set_float(&mock, dr::SPD_IAS, 285.0);
        set_float(&mock, dr::SPD_MACH, 0.79);
        set_int(&mock, dr::IAS_MACH_MODE, 0);
        set_int(&mock, dr::FMS_SPD, 0);
        set_float(&mock, dr::HDG, 370.0);
        set_int(&mock, dr::HDG_TRK_SEL, 0);
        set_float(&mock, dr::VS, 0.0);
        set_int(&mock, dr::BATT_BUS, 1);
        (mock, store)
    }

    /// One flight-loop pass: refresh the store, then tick.
    fn poll(p: &mut RotateMd11Profile, store: &DatarefStore) -> Pap3State {
        store.update();
        p.tick(&mut Pap3Ctx::new(store, Instant::now()));
        p.current().clone()
    }

    #[test]
    fn speed_window_follows_mode_and_fms() {
        let (mock, store) = md11_mock();
        let mut p = RotateMd11Profile::new();
        p.start(&store);
        let st = poll(&mut p, &store);
        assert_eq!(st.spd, 285.0);
        assert!(st.spd_visible);
        assert_eq!(st.hdg, 10, "wrapped");
        assert!(!st.vvi_visible, "zero V/S is blank");

        set_int(&mock, dr::IAS_MACH_MODE, 1);
        assert!((poll(&mut p, &store).spd - 0.79).abs() < 1e-6);

        set_int(&mock, dr::FMS_SPD, 1);
        assert!(!poll(&mut p, &store).spd_visible);
    }

    #[test]
    fn heading_selector_startup_glitch() {
        let (mock, store) = md11_mock();
        let mut p = RotateMd11Profile::new();
        p.start(&store);
        assert!(poll(&mut p, &store).hdg_visible, "0 before init counts as HDG");
        set_int(&mock, dr::HDG_TRK_SEL, 1);
        assert!(poll(&mut p, &store).hdg_visible);
        set_int(&mock, dr::HDG_TRK_SEL, 0);
        assert!(!poll(&mut p, &store).hdg_visible, "TRK after init");
    }

    #[test]
    fn backlight_dark_on_first_powered_poll() {
        let (mock, store) = md11_mock();
        set_float(&mock, dr::PANEL_BRT, 0.7);
        let mut p = RotateMd11Profile::new();
        p.start(&store);
        let first = poll(&mut p, &store);
        assert_eq!(first.mcp_brightness, 1.0);
        assert_eq!(first.leds_brightness, 0.0);
        assert!((poll(&mut p, &store).leds_brightness - 0.7).abs() < 1e-6, "lit without a dataref change");
        assert!(!p.tick(&mut Pap3Ctx::new(&store, Instant::now())), "then idle");

        set_int(&mock, dr::BATT_BUS, 0);
        let off = poll(&mut p, &store);
        assert_eq!((off.mcp_brightness, off.cockpit_lights, off.leds_brightness), (0.0, 0.0, 0.0));
        assert!(off.leds.iter().all(|(_, on)| !on));
    }

    #[test]
    fn buttons_pulse_control_datarefs() {
        let (mock, store) = md11_mock();
        set_int(&mock, "Rotate/aircraft/controls/fgs_hdg_mode_sel", 0);
        let mut p = RotateMd11Profile::new();
        let mut ctx = Pap3Ctx::new(&store, Instant::now());
        p.on_button(&mut ctx, 0x01, 0x10, true);
        assert_eq!(mock.dataref("Rotate/aircraft/controls/fgs_hdg_mode_sel"), Some(DataRefValue::Int(-1)));
        p.on_button(&mut ctx, 0x01, 0x10, false);
        assert_eq!(mock.dataref("Rotate/aircraft/controls/fgs_hdg_mode_sel"), Some(DataRefValue::Int(0)));
    }

    #[test]
    fn ground_power_counts() {
        let (mock, store) = md11_mock();
        set_int(&mock, dr::BATT_BUS, 0);
        let p = RotateMd11Profile::new();
        assert!(!p.has_power(&store));
        set_int(&mock, dr::BATT_GRD, 1);
        assert!(p.has_power(&store));
    }
}
