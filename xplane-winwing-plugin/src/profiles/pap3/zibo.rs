//! Zibo 737-800 (and derivatives built on the `laminar/B738` tree).

use std::time::Instant;

use tracing::debug;
use winwing_state::Pap3State;

use super::{
    bit, fire_button, power, turn_encoder, two_way, Button, Encoder, Intent, MaintainedSwitch, Pap3Ctx,
    Pap3Profile, SWITCH_DEBOUNCE,
};
use crate::datarefs::DatarefStore;
use crate::debounce::Debounce;
use crate::profiles::{float_at, is_on, position, Watch};
use crate::xplm_shim::CommandPhase;

const MARKER: &str = "laminar/B738/zibomod/filename_list";

const FD_ON: i32  = 1;
const FD_OFF: i32 = 0;
const AT_ON: i32  = 1;
const AT_OFF: i32 = 0;
// Disconnect bar up means A/P available.
const AP_ON: i32  = 0;
const AP_OFF: i32 = 1;

mod dr {
    pub const SPD:        &str = "laminar/B738/autopilot/mcp_speed_dial_kts_mach";
    pub const SPD_SHOW:   &str = "laminar/B738/autopilot/show_ias";
    pub const HDG:        &str = "laminar/B738/autopilot/mcp_hdg_dial";
    pub const ALT:        &str = "laminar/B738/autopilot/mcp_alt_dial";
    pub const VVI:        &str = "sim/cockpit2/autopilot/vvi_dial_fpm";
    pub const VVI_SHOW:   &str = "laminar/B738/autopilot/vvi_dial_show";
    pub const CRS_CAPT:   &str = "laminar/B738/autopilot/course_pilot";
    pub const CRS_FO:     &str = "laminar/B738/autopilot/course_copilot";
    pub const DIGIT_A:    &str = "laminar/B738/mcp/digit_A";
    pub const DIGIT_8:    &str = "laminar/B738/mcp/digit_8";
    pub const MCP_BRIGHT: &str = "sim/cockpit2/electrical/instrument_brightness_ratio_manual";
    pub const PANEL_BRT:  &str = "laminar/B738/electric/panel_brightness";

    pub const FD_CAPT_POS: &str = "laminar/B738/autopilot/flight_director_pos";
    pub const FD_FO_POS:   &str = "laminar/B738/autopilot/flight_director_fo_pos";
    pub const AT_ARM_POS:  &str = "laminar/B738/autopilot/autothrottle_arm_pos";
    pub const AP_DISC_POS: &str = "laminar/B738/autopilot/disconnect_pos";

    pub const HAS_AP_POWER: &str = "sim/cockpit2/autopilot/autopilot_has_power";
    pub const DC_BUS_1:     &str = "laminar/B738/electric/dc_bus1_status";
    pub const DC_BUS_2:     &str = "laminar/B738/electric/dc_bus2_status";

    pub const BANK_POS: &str = "laminar/B738/autopilot/bank_angle_pos";
    pub const BANK_SEL: &str = "laminar/B738/autopilot/bank_angle_sel";
}

mod cmd {
    pub const FD_CAPT_TOGGLE: &str = "laminar/B738/autopilot/flight_director_toggle";
    pub const FD_FO_TOGGLE:   &str = "laminar/B738/autopilot/flight_director_fo_toggle";
    pub const AT_ARM_TOGGLE:  &str = "laminar/B738/autopilot/autothrottle_arm_toggle";
    pub const AP_DISC_TOGGLE: &str = "laminar/B738/autopilot/disconnect_toggle";
    pub const BANK_UP:        &str = "laminar/B738/autopilot/bank_angle_up";
    pub const BANK_DN:        &str = "laminar/B738/autopilot/bank_angle_dn";
}

/// LED id order.
const LEDS: [&str; 17] = [
    "laminar/B738/autopilot/n1_status1",
    "laminar/B738/autopilot/speed_status1",
    "laminar/B738/autopilot/vnav_status1",
    "laminar/B738/autopilot/lvl_chg_status",
    "laminar/B738/autopilot/hdg_sel_status",
    "laminar/B738/autopilot/lnav_status",
    "laminar/B738/autopilot/vorloc_status",
    "laminar/B738/autopilot/app_status",
    "laminar/B738/autopilot/alt_hld_status",
    "laminar/B738/autopilot/vs_status",
    "laminar/B738/autopilot/cmd_a_status",
    "laminar/B738/autopilot/cws_a_status",
    "laminar/B738/autopilot/cmd_b_status",
    "laminar/B738/autopilot/cws_b_status",
    "laminar/B738/autopilot/autothrottle_status1",
    "laminar/B738/autopilot/master_capt_status",
    "laminar/B738/autopilot/master_fo_status",
];

const BUTTONS: &[Button] = &[
    Button::press(0x01, 0x01, "laminar/B738/autopilot/n1_press"),
    Button::press(0x01, 0x02, "laminar/B738/autopilot/speed_press"),
    Button::press(0x01, 0x04, "laminar/B738/autopilot/vnav_press"),
    Button::press(0x01, 0x08, "laminar/B738/autopilot/lvl_chg_press"),
    Button::press(0x01, 0x10, "laminar/B738/autopilot/hdg_sel_press"),
    Button::press(0x01, 0x20, "laminar/B738/autopilot/lnav_press"),
    Button::press(0x01, 0x40, "laminar/B738/autopilot/vorloc_press"),
    Button::press(0x01, 0x80, "laminar/B738/autopilot/app_press"),
    Button::press(0x02, 0x01, "laminar/B738/autopilot/alt_hld_press"),
    Button::press(0x02, 0x02, "laminar/B738/autopilot/vs_press"),
    Button::press(0x02, 0x04, "laminar/B738/autopilot/cmd_a_press"),
    Button::press(0x02, 0x08, "laminar/B738/autopilot/cws_a_press"),
    Button::press(0x02, 0x10, "laminar/B738/autopilot/cmd_b_press"),
    Button::press(0x02, 0x20, "laminar/B738/autopilot/cws_b_press"),
    Button::press(0x02, 0x40, "laminar/B738/autopilot/change_over_press"),
    Button::press(0x02, 0x80, "laminar/B738/autopilot/spd_interv"),
    Button::press(0x03, 0x01, "laminar/B738/autopilot/alt_interv"),
];

const ENCODERS: &[Encoder] = &[
    Encoder::new(0x15, "laminar/B738/autopilot/course_pilot_up", "laminar/B738/autopilot/course_pilot_dn"),
    Encoder::new(0x17, "sim/autopilot/airspeed_up", "sim/autopilot/airspeed_down"),
    Encoder::new(0x19, "laminar/B738/autopilot/heading_up", "laminar/B738/autopilot/heading_dn"),
    Encoder::new(0x1B, "laminar/B738/autopilot/altitude_up", "laminar/B738/autopilot/altitude_dn"),
    Encoder::new(0x1D, "sim/autopilot/vertical_speed_up", "sim/autopilot/vertical_speed_down"),
    Encoder::new(0x1F, "laminar/B738/autopilot/course_copilot_up", "laminar/B738/autopilot/course_copilot_dn"),
];

// Raw report positions of the maintained switches.
const FD_CAPT_ON: (u8, u8)  = (0x04, 0x08);
const FD_CAPT_OFF: (u8, u8) = (0x04, 0x10);
const FD_FO_ON: (u8, u8)    = (0x04, 0x20);
const FD_FO_OFF: (u8, u8)   = (0x04, 0x40);
const AT_ARM: (u8, u8)      = (0x06, 0x01);
const AT_DISARM: (u8, u8)   = (0x06, 0x02);
const AP_ENGAGE: (u8, u8)   = (0x04, 0x80);
const AP_DISENGAGE: (u8, u8) = (0x05, 0x01);

/// Bank angle selector bits on byte 0x05, 10° to 30°.
const BANK_MASKS: [u8; 5] = [0x02, 0x04, 0x08, 0x10, 0x20];
const BANK_MAX_STEPS: usize = 10;

pub struct ZiboProfile {
    state:   Pap3State,
    running: bool,
    watch:   Watch,

    intent:        Intent,
    have_intent:   bool,
    pending_apply: bool,

    fd_capt: MaintainedSwitch,
    fd_fo:   MaintainedSwitch,
    at_arm:  MaintainedSwitch,
    ap_disc: MaintainedSwitch,

    at_debounce: Debounce,
    ap_debounce: Debounce,
}

impl ZiboProfile {
    pub fn new() -> Self {
        Self {
            state:         Pap3State::default(),
            running:       false,
            watch:         Watch::new(),
            intent:        Intent::default(),
            have_intent:   false,
            pending_apply: false,
            fd_capt:       MaintainedSwitch::new(dr::FD_CAPT_POS, cmd::FD_CAPT_TOGGLE),
            fd_fo:         MaintainedSwitch::new(dr::FD_FO_POS, cmd::FD_FO_TOGGLE),
            at_arm:        MaintainedSwitch::new(dr::AT_ARM_POS, cmd::AT_ARM_TOGGLE),
            ap_disc:       MaintainedSwitch::new(dr::AP_DISC_POS, cmd::AP_DISC_TOGGLE),
            at_debounce:   Debounce::new(SWITCH_DEBOUNCE),
            ap_debounce:   Debounce::new(SWITCH_DEBOUNCE),
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
        if let Some(v) = store.get::<f32>(dr::SPD) {
            st.spd = v;
        }
        if let Some(v) = store.get::<f32>(dr::SPD_SHOW) {
            st.spd_visible = v > 0.5;
        }
        if let Some(v) = store.get::<i32>(dr::HDG) {
            st.hdg = v;
        }
        if let Some(v) = store.get::<i32>(dr::ALT) {
            st.alt = v;
        }
        if let Some(v) = store.get::<f32>(dr::VVI) {
            st.vvi = v;
        }
        if let Some(v) = store.get::<f32>(dr::VVI_SHOW) {
            st.vvi_visible = v > 0.5;
        }
        if let Some(v) = store.get::<i32>(dr::CRS_CAPT) {
            st.crs_capt = v;
        }
        if let Some(v) = store.get::<i32>(dr::CRS_FO) {
            st.crs_fo = v;
        }
        if let Some(p) = self.at_arm.sim_position(store) {
            st.at_arm_on = p == AT_ON;
        }

        if let Some(v) = float_at(store, dr::MCP_BRIGHT, 15) {
            st.mcp_brightness = v.clamp(0.0, 1.0);
        }
        if let Some(v) = float_at(store, dr::PANEL_BRT, 0) {
            st.cockpit_lights = v.clamp(0.0, 1.0);
            st.leds_brightness = v.max(0.6);
        }

        st.digit_a = is_on(store, dr::DIGIT_A);
        st.digit_b = is_on(store, dr::DIGIT_8);

        let lit: Vec<bool> = LEDS.iter().map(|name| is_on(store, name)).collect();
        let l = &mut st.leds;
        let targets = [
            &mut l.n1, &mut l.speed, &mut l.vnav, &mut l.lvl_chg, &mut l.hdg_sel, &mut l.lnav,
            &mut l.vorloc, &mut l.app, &mut l.alt_hld, &mut l.v_s, &mut l.cmd_a, &mut l.cws_a,
            &mut l.cmd_b, &mut l.cws_b, &mut l.at_arm, &mut l.ma_capt, &mut l.ma_fo,
        ];
        for (slot, on) in targets.into_iter().zip(lit) {
            *slot = on;
        }
    }

    fn apply_intent(&mut self, ctx: &mut Pap3Ctx<'_>) {
        if !self.have_intent {
            return;
        }
        let (store, now) = (ctx.store, ctx.now);
        let i = self.intent;
        self.fd_capt.drive_to(store, if i.fd_capt_on { FD_ON } else { FD_OFF }, now);
        self.fd_fo.drive_to(store, if i.fd_fo_on { FD_ON } else { FD_OFF }, now);
        self.at_arm.drive_to(store, if i.at_arm_on { AT_ON } else { AT_OFF }, now);
        ctx.set_at_hardware_intent(i.at_arm_on);
        self.ap_disc.drive_to(store, if i.ap_engaged { AP_ON } else { AP_OFF }, now);
    }

    fn intent_reached(&self, store: &DatarefStore) -> bool {
        let i = self.intent;
        self.fd_capt.at(store, if i.fd_capt_on { FD_ON } else { FD_OFF })
            && self.fd_fo.at(store, if i.fd_fo_on { FD_ON } else { FD_OFF })
            && self.ap_disc.at(store, if i.ap_engaged { AP_ON } else { AP_OFF })
    }

    fn seed_from_sim(&mut self, ctx: &mut Pap3Ctx<'_>) {
        let store = ctx.store;
        self.intent = Intent {
            fd_capt_on: self.fd_capt.at(store, FD_ON),
            fd_fo_on:   self.fd_fo.at(store, FD_ON),
            at_arm_on:  self.at_arm.at(store, AT_ON),
            ap_engaged: self.ap_disc.at(store, AP_ON),
        };
        self.finish_seed(ctx);
    }

    fn seed_from_raw(&mut self, ctx: &mut Pap3Ctx<'_>, r: &[u8]) {
        let store = ctx.store;
        self.intent = Intent {
            fd_capt_on: two_way(r, FD_CAPT_ON, FD_CAPT_OFF).unwrap_or_else(|| self.fd_capt.at(store, FD_ON)),
            fd_fo_on:   two_way(r, FD_FO_ON, FD_FO_OFF).unwrap_or_else(|| self.fd_fo.at(store, FD_ON)),
            at_arm_on:  two_way(r, AT_ARM, AT_DISARM).unwrap_or_else(|| self.at_arm.at(store, AT_ON)),
            ap_engaged: two_way(r, AP_ENGAGE, AP_DISENGAGE).unwrap_or_else(|| self.ap_disc.at(store, AP_ON)),
        };
        self.finish_seed(ctx);
    }

    fn finish_seed(&mut self, ctx: &mut Pap3Ctx<'_>) {
        let store = ctx.store;
        for sw in [&mut self.fd_capt, &mut self.fd_fo, &mut self.at_arm, &mut self.ap_disc] {
            sw.seed(store);
        }
        if let Some(p) = self.at_arm.sim_position(store) {
            self.state.at_arm_on = p == AT_ON;
        }
        self.have_intent = true;
        self.pending_apply = true;
        ctx.set_at_hardware_intent(self.intent.at_arm_on);
    }

    fn bank_index(store: &DatarefStore) -> Option<i32> {
        position(store, dr::BANK_POS)
            .or_else(|| position(store, dr::BANK_SEL))
            .map(|v| v.clamp(0, 4))
    }

    /// Step the bank angle selector towards `target` (0..=4). A step the sim
    /// swallowed is sent once more before giving up on it.
    fn nudge_bank_angle(store: &DatarefStore, target: i32) {
        let Some(mut cur) = Self::bank_index(store) else { return };
        let mut steps = 0;
        while cur != target && steps < BANK_MAX_STEPS {
            steps += 1;
            let cmd = if target > cur { cmd::BANK_UP } else { cmd::BANK_DN };
            if !store.execute_command(cmd, CommandPhase::Once) {
                break;
            }
            let mut next = Self::bank_index(store).unwrap_or(cur);
            if next == cur {
                store.execute_command(cmd, CommandPhase::Once);
                next = Self::bank_index(store).unwrap_or(cur);
            }
            cur = next;
        }
    }

    fn bank_target(mask: u8) -> Option<i32> {
        BANK_MASKS.iter().position(|&m| m == mask).map(|i| i as i32)
    }

    /// Debounced A/T or A/P toggle. A new target position re-opens the gate.
    fn guarded_drive(sw: &mut MaintainedSwitch, gate: &mut Debounce, store: &DatarefStore, desired: i32, now: Instant) {
        if sw.last_commanded() != Some(desired) {
            gate.reset();
        }
        if gate.ready(now) {
            sw.drive_to(store, desired, now);
        }
    }
}

impl Default for ZiboProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl Pap3Profile for ZiboProfile {
    fn name(&self) -> &'static str {
        "Zibo 737"
    }

    fn start(&mut self, store: &DatarefStore) {
        self.running = true;
        self.watch.add_all::<f32>(store, &[
            dr::SPD, dr::SPD_SHOW, dr::HDG, dr::ALT, dr::VVI, dr::VVI_SHOW, dr::CRS_CAPT, dr::CRS_FO,
            dr::AT_ARM_POS, dr::DIGIT_A, dr::DIGIT_8,
        ]);
        self.watch.add_all::<f32>(store, &LEDS);
        self.watch.add_all::<Vec<f32>>(store, &[dr::MCP_BRIGHT, dr::PANEL_BRT]);
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
        if self.pending_apply && self.have_intent {
            self.apply_intent(ctx);
            if self.intent_reached(ctx.store) {
                self.pending_apply = false;
                debug!("switch intent reached");
            }
        }
        self.watch.refresh(ctx.store);
        if !self.watch.take() {
            return false;
        }
        let before = self.state.clone();
        self.poll(ctx.store);
        self.state != before
    }

    fn on_button(&mut self, ctx: &mut Pap3Ctx<'_>, offset: u8, mask: u8, pressed: bool) {
        let (store, now) = (ctx.store, ctx.now);

        if offset == 0x05 && pressed {
            if let Some(target) = Self::bank_target(mask) {
                Self::nudge_bank_angle(store, target);
                return;
            }
        }

        let pos = (offset, mask);
        if [FD_CAPT_ON, FD_CAPT_OFF, FD_FO_ON, FD_FO_OFF, AT_ARM, AT_DISARM, AP_ENGAGE, AP_DISENGAGE].contains(&pos) {
            if !pressed {
                return;
            }
            self.have_intent = true;
            match pos {
                FD_CAPT_ON | FD_CAPT_OFF => {
                    self.intent.fd_capt_on = pos == FD_CAPT_ON;
                    self.fd_capt.drive_to(store, if pos == FD_CAPT_ON { FD_ON } else { FD_OFF }, now);
                }
                FD_FO_ON | FD_FO_OFF => {
                    self.intent.fd_fo_on = pos == FD_FO_ON;
                    self.fd_fo.drive_to(store, if pos == FD_FO_ON { FD_ON } else { FD_OFF }, now);
                }
                AT_ARM | AT_DISARM => {
                    let armed = pos == AT_ARM;
                    self.intent.at_arm_on = armed;
                    ctx.set_at_hardware_intent(armed);
                    let desired = if armed { AT_ON } else { AT_OFF };
                    Self::guarded_drive(&mut self.at_arm, &mut self.at_debounce, store, desired, now);
                }
                _ => {
                    let engaged = pos == AP_ENGAGE;
                    self.intent.ap_engaged = engaged;
                    let desired = if engaged { AP_ON } else { AP_OFF };
                    Self::guarded_drive(&mut self.ap_disc, &mut self.ap_debounce, store, desired, now);
                }
            }
            return;
        }

        fire_button(store, BUTTONS, offset, mask, pressed);
    }

    fn on_encoder_delta(&mut self, ctx: &mut Pap3Ctx<'_>, offset: u8, delta: i8) {
        turn_encoder(ctx.store, ENCODERS, offset, delta);
    }

    fn power_mask(&self, store: &DatarefStore) -> u8 {
        let mut mask = 0;
        if is_on(store, dr::HAS_AP_POWER) {
            mask |= power::MCP;
        }
        if is_on(store, dr::DC_BUS_1) {
            mask |= power::DC_BUS_1;
        }
        if is_on(store, dr::DC_BUS_2) {
            mask |= power::DC_BUS_2;
        }
        mask
    }

    fn sync_sim_to_hardware(&mut self, ctx: &mut Pap3Ctx<'_>) {
        self.seed_from_sim(ctx);
        self.apply_intent(ctx);
    }

    fn sync_sim_to_hardware_from_raw(&mut self, ctx: &mut Pap3Ctx<'_>, report: &[u8]) {
        if report.is_empty() {
            self.seed_from_sim(ctx);
        } else {
            self.seed_from_raw(ctx, report);
        }
        self.apply_intent(ctx);

        if let Some(target) = BANK_MASKS.iter().position(|&m| bit(report, 0x05, m)) {
            Self::nudge_bank_angle(ctx.store, target as i32);
        }
        self.at_debounce.reset();
        self.ap_debounce.reset();
    }
}
