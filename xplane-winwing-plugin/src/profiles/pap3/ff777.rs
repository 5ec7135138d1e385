//! FlightFactor 777v2. MCP values come from `1-sim/output/mcp/*`, buttons are
//! `1-sim/command/*` commands that only appear once the aircraft finished
//! loading.

use tracing::info;
use winwing_state::{LcdDisplayConfig, Pap3State};

use super::{
    fire_button, power, turn_encoder, two_way, Button, Encoder, Intent, MaintainedSwitch, Pap3Ctx, Pap3Profile,
};
use crate::datarefs::DatarefStore;
use crate::profiles::{float_at, is_on, position, Watch};

const MARKER: &str = "1-sim/output/mcp/spd";
/// Present only once the FF777 command set is registered.
const READY_COMMAND: &str = "1-sim/command/mcpSpdRotary_rotary+";

const FD_ON: i32 = 1;
const AT_ON: i32 = 1;
// The 777 disconnect bar reads 1 when the A/P is available.
const AP_ON: i32 = 1;

mod dr {
    pub const SPD:      &str = "1-sim/output/mcp/spd";
    pub const SPD_OPEN: &str = "1-sim/output/mcp/isSpdOpen";
    pub const HDG:      &str = "1-sim/output/mcp/hdg";
    pub const ALT:      &str = "1-sim/output/mcp/alt";
    pub const VS:       &str = "1-sim/output/mcp/vs";
    pub const VS_OPEN:  &str = "1-sim/output/mcp/isVsOpen";
    pub const CRS_1:    &str = "sim/cockpit/radios/nav1_obs_degm";
    pub const CRS_2:    &str = "sim/cockpit/radios/nav2_obs_degm";
    pub const GLARE:    &str = "1-sim/ckpt/lights/glareshield";
    pub const BUS_VOLTS: &str = "sim/cockpit2/electrical/bus_volts";
    pub const HAS_AP_POWER: &str = "sim/cockpit2/autopilot/autopilot_has_power";

    pub const FD_L:    &str = "1-sim/ckpt/mcpFdLSwitch/anim";
    pub const FD_R:    &str = "1-sim/ckpt/mcpFdRSwitch/anim";
    pub const AT_L:    &str = "1-sim/ckpt/mcpAtSwitchL/anim";
    pub const AT_R:    &str = "1-sim/ckpt/mcpAtSwitchR/anim";
    pub const AP_DISC: &str = "1-sim/ckpt/mcpApDiscSwitch/anim";
}

mod cmd {
    pub const FD_L:    &str = "1-sim/command/mcpFdLSwitch_trigger";
    pub const FD_R:    &str = "1-sim/command/mcpFdRSwitch_trigger";
    pub const AT_L:    &str = "1-sim/command/mcpAtSwitchL_trigger";
    pub const AT_R:    &str = "1-sim/command/mcpAtSwitchR_trigger";
    pub const AP_DISC: &str = "1-sim/command/mcpApDiscSwitch_trigger";
}

/// Annunciator glow datarefs, in the order `poll` maps them.
const GLOW: [&str; 9] = [
    "1-sim/ckpt/lampsGlow/mcpVNAV",
    "1-sim/ckpt/lampsGlow/mcpFLCH",
    "1-sim/ckpt/lampsGlow/mcpLNAV",
    "1-sim/ckpt/lampsGlow/mcpLOC",
    "1-sim/ckpt/lampsGlow/mcpAPP",
    "1-sim/ckpt/lampsGlow/mcpAltHOLD",
    "1-sim/ckpt/lampsGlow/mcpVS",
    "1-sim/ckpt/lampsGlow/mcpCaptAP",
    "1-sim/ckpt/lampsGlow/mcpAT",
];

const BUTTONS: &[Button] = &[
    Button::press(0x01, 0x01, "1-sim/command/mcpClbButton_button"),
    Button::press(0x01, 0x02, "1-sim/command/mcpAtButton_button"),
    Button::press(0x01, 0x04, "1-sim/command/mcpVnavButton_button"),
    Button::press(0x01, 0x08, "1-sim/command/mcpFlchButton_button"),
    Button::press(0x01, 0x10, "1-sim/command/mcpHdgCelButton_button"),
    Button::press(0x01, 0x20, "1-sim/command/mcpLnavButton_button"),
    Button::press(0x01, 0x40, "1-sim/command/mcpLocButton_button"),
    Button::press(0x01, 0x80, "1-sim/command/mcpAppButton_button"),
    Button::press(0x02, 0x01, "1-sim/command/mcpAltHoldButton_button"),
    Button::press(0x02, 0x02, "1-sim/command/mcpVsButton_button"),
    Button::press(0x02, 0x04, "1-sim/command/mcpApLButton_button"),
    Button::press(0x02, 0x08, "1-sim/command/mcpApLButton_button"),
    Button::press(0x02, 0x10, "1-sim/command/mcpApRButton_button"),
    Button::press(0x02, 0x20, "1-sim/command/mcpApRButton_button"),
    Button::press(0x02, 0x40, "1-sim/command/mcpIasMachButton_button"),
    Button::press(0x02, 0x80, "1-sim/command/mcpSpdRotary_push"),
    Button::press(0x03, 0x01, "1-sim/command/mcpAltRotary_push"),
];

const ENCODERS: &[Encoder] = &[
    Encoder::new(0x17, "1-sim/command/mcpSpdRotary_rotary+", "1-sim/command/mcpSpdRotary_rotary-"),
    Encoder::new(0x19, "1-sim/command/mcpHdgRotary_rotary+", "1-sim/command/mcpHdgRotary_rotary-"),
    Encoder::new(0x1B, "1-sim/command/mcpAltRotary_rotary+", "1-sim/command/mcpAltRotary_rotary-"),
    Encoder::new(0x1D, "1-sim/command/mcpVsRotary_rotary+", "1-sim/command/mcpVsRotary_rotary-"),
];

const FD_L_ON: (u8, u8)  = (0x04, 0x08);
const FD_L_OFF: (u8, u8) = (0x04, 0x10);
const FD_R_ON: (u8, u8)  = (0x04, 0x20);
const FD_R_OFF: (u8, u8) = (0x04, 0x40);
const AT_ARM: (u8, u8)    = (0x06, 0x01);
const AT_DISARM: (u8, u8) = (0x06, 0x02);
// Bar down on the hardware is "disengage", which the 777 models as position 0.
const AP_BAR_DOWN: (u8, u8) = (0x04, 0x80);
const AP_BAR_UP: (u8, u8)   = (0x05, 0x01);

pub struct Ff777Profile {
    state:    Pap3State,
    running:  bool,
    resolved: bool,
    watch:    Watch,

    intent:        Intent,
    have_intent:   bool,
    pending_apply: bool,

    fd_l:    MaintainedSwitch,
    fd_r:    MaintainedSwitch,
    at_l:    MaintainedSwitch,
    at_r:    MaintainedSwitch,
    ap_disc: MaintainedSwitch,
}

impl Ff777Profile {
    pub fn new() -> Self {
        Self {
            state:         Pap3State { crs_visible: false, ..Pap3State::default() },
            running:       false,
            resolved:      false,
            watch:         Watch::new(),
            intent:        Intent::default(),
            have_intent:   false,
            pending_apply: false,
            fd_l:          MaintainedSwitch::new(dr::FD_L, cmd::FD_L),
            fd_r:          MaintainedSwitch::new(dr::FD_R, cmd::FD_R),
            at_l:          MaintainedSwitch::new(dr::AT_L, cmd::AT_L),
            at_r:          MaintainedSwitch::new(dr::AT_R, cmd::AT_R),
            ap_disc:       MaintainedSwitch::new(dr::AP_DISC, cmd::AP_DISC),
        }
    }

    pub fn is_eligible(store: &DatarefStore) -> bool {
        store.exists(MARKER)
    }

    pub fn boxed(_: ()) -> Box<dyn Pap3Profile> {
        Box::new(Self::new())
    }

    fn try_resolve(&mut self, store: &DatarefStore) -> bool {
        if !self.resolved
            && store.command_exists(READY_COMMAND)
            && store.exists(dr::HDG)
            && store.exists(dr::ALT)
        {
            self.resolved = true;
            info!("FF777 command set available");
        }
        self.resolved
    }

    fn poll(&mut self, store: &DatarefStore) {
        let st = &mut self.state;
        if let Some(v) = store.get::<f32>(dr::SPD) {
            st.spd = v;
        }
        st.spd_visible = store.get::<f64>(dr::SPD_OPEN).is_some_and(|v| v != 0.0);
        if let Some(v) = store.get::<f64>(dr::HDG) {
            st.hdg = v as i32;
        }
        if let Some(v) = store.get::<f64>(dr::ALT) {
            st.alt = v as i32;
        }
        if let Some(v) = store.get::<f32>(dr::VS) {
            st.vvi = v;
        }
        st.vvi_visible = store.get::<f64>(dr::VS_OPEN).is_some_and(|v| v != 0.0);
        st.crs_visible = false;
        if let Some(v) = position(store, dr::CRS_1) {
            st.crs_capt = v;
        }
        if let Some(v) = position(store, dr::CRS_2) {
            st.crs_fo = v;
        }
        st.at_arm_on = self.at_l.at(store, AT_ON) || self.at_r.at(store, AT_ON);

        if let Some(v) = store.get::<f32>(dr::GLARE) {
            let v = v.clamp(0.0, 1.0);
            st.mcp_brightness = v;
            st.cockpit_lights = v;
            st.leds_brightness = v.max(0.6);
        }

        let [vnav, flch, lnav, loc, app, alt_hold, vs, capt_ap, at] = GLOW.map(|name| is_on(store, name));
        st.leds = Default::default();
        st.leds.vnav = vnav;
        st.leds.lvl_chg = flch;
        st.leds.lnav = lnav;
        st.leds.vorloc = loc;
        st.leds.app = app;
        st.leds.alt_hld = alt_hold;
        st.leds.v_s = vs;
        st.leds.cmd_a = capt_ap;
        st.leds.at_arm = at;
    }

    fn fd_target(on: bool) -> i32 {
        if on { FD_ON } else { 1 - FD_ON }
    }

    fn at_target(on: bool) -> i32 {
        if on { AT_ON } else { 1 - AT_ON }
    }

    fn ap_target(engaged: bool) -> i32 {
        if engaged { AP_ON } else { 1 - AP_ON }
    }

    fn apply_intent(&mut self, ctx: &mut Pap3Ctx<'_>) {
        if !self.have_intent {
            return;
        }
        let (store, now) = (ctx.store, ctx.now);
        let i = self.intent;
        self.fd_l.drive_to(store, Self::fd_target(i.fd_capt_on), now);
        self.fd_r.drive_to(store, Self::fd_target(i.fd_fo_on), now);
        self.at_l.drive_to(store, Self::at_target(i.at_arm_on), now);
        self.at_r.drive_to(store, Self::at_target(i.at_arm_on), now);
        ctx.set_at_hardware_intent(i.at_arm_on);
        self.ap_disc.drive_to(store, Self::ap_target(i.ap_engaged), now);
    }

    fn seed(&mut self, ctx: &mut Pap3Ctx<'_>, report: Option<&[u8]>) {
        let store = ctx.store;
        let from_sim = Intent {
            fd_capt_on: self.fd_l.at(store, FD_ON),
            fd_fo_on:   self.fd_r.at(store, FD_ON),
            at_arm_on:  self.at_l.at(store, AT_ON) || self.at_r.at(store, AT_ON),
            ap_engaged: self.ap_disc.at(store, AP_ON),
        };
        self.intent = match report {
            Some(r) => Intent {
                fd_capt_on: two_way(r, FD_L_ON, FD_L_OFF).unwrap_or(from_sim.fd_capt_on),
                fd_fo_on:   two_way(r, FD_R_ON, FD_R_OFF).unwrap_or(from_sim.fd_fo_on),
                at_arm_on:  two_way(r, AT_ARM, AT_DISARM).unwrap_or(from_sim.at_arm_on),
                ap_engaged: two_way(r, AP_BAR_UP, AP_BAR_DOWN).unwrap_or(from_sim.ap_engaged),
            },
            None => from_sim,
        };
        for sw in [&mut self.fd_l, &mut self.fd_r, &mut self.at_l, &mut self.at_r, &mut self.ap_disc] {
            sw.seed(store);
        }
        self.have_intent = true;
        self.pending_apply = true;
        ctx.set_at_hardware_intent(self.intent.at_arm_on);
    }
}

impl Default for Ff777Profile {
    fn default() -> Self {
        Self::new()
    }
}

impl Pap3Profile for Ff777Profile {
    fn name(&self) -> &'static str {
        "FlightFactor 777"
    }

    fn start(&mut self, store: &DatarefStore) {
        self.running = true;
        self.try_resolve(store);
        self.watch.add_all::<f32>(store, &[
            dr::SPD, dr::SPD_OPEN, dr::HDG, dr::ALT, dr::VS, dr::VS_OPEN, dr::CRS_1, dr::CRS_2, dr::AT_L,
            dr::AT_R, dr::GLARE,
        ]);
        self.watch.add_all::<f32>(store, &GLOW);
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
        self.try_resolve(ctx.store);
        if self.pending_apply && self.have_intent {
            self.apply_intent(ctx);
            let i = self.intent;
            if self.fd_l.at(ctx.store, Self::fd_target(i.fd_capt_on))
                && self.fd_r.at(ctx.store, Self::fd_target(i.fd_fo_on))
            {
                self.pending_apply = false;
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
        if !self.resolved {
            return;
        }
        let (store, now) = (ctx.store, ctx.now);
        let pos = (offset, mask);
        match pos {
            FD_L_ON | FD_L_OFF | FD_R_ON | FD_R_OFF | AT_ARM | AT_DISARM | AP_BAR_DOWN | AP_BAR_UP => {
                if !pressed {
                    return;
                }
                self.have_intent = true;
                match pos {
                    FD_L_ON | FD_L_OFF => {
                        self.intent.fd_capt_on = pos == FD_L_ON;
                        self.fd_l.drive_to(store, Self::fd_target(self.intent.fd_capt_on), now);
                    }
                    FD_R_ON | FD_R_OFF => {
                        self.intent.fd_fo_on = pos == FD_R_ON;
                        self.fd_r.drive_to(store, Self::fd_target(self.intent.fd_fo_on), now);
                    }
                    AT_ARM | AT_DISARM => {
                        let armed = pos == AT_ARM;
                        self.intent.at_arm_on = armed;
                        ctx.set_at_hardware_intent(armed);
                        self.at_l.drive_to(store, Self::at_target(armed), now);
                        self.at_r.drive_to(store, Self::at_target(armed), now);
                    }
                    _ => {
                        self.intent.ap_engaged = pos == AP_BAR_UP;
                        self.ap_disc.drive_to(store, Self::ap_target(self.intent.ap_engaged), now);
                    }
                }
            }
            _ => {
                fire_button(store, BUTTONS, offset, mask, pressed);
            }
        }
    }

    fn on_encoder_delta(&mut self, ctx: &mut Pap3Ctx<'_>, offset: u8, delta: i8) {
        if self.resolved {
            turn_encoder(ctx.store, ENCODERS, offset, delta);
        }
    }

    fn power_mask(&self, store: &DatarefStore) -> u8 {
        let mut mask = 0;
        if is_on(store, dr::HAS_AP_POWER) {
            mask |= power::MCP;
        }
        if float_at(store, dr::BUS_VOLTS, 0).is_some_and(|v| v > 0.5) {
            mask |= power::DC_BUS_1;
        }
        if float_at(store, dr::BUS_VOLTS, 1).is_some_and(|v| v > 0.5) {
            mask |= power::DC_BUS_2;
        }
        mask
    }

    fn sync_sim_to_hardware(&mut self, ctx: &mut Pap3Ctx<'_>) {
        self.seed(ctx, None);
        self.apply_intent(ctx);
    }

    fn sync_sim_to_hardware_from_raw(&mut self, ctx: &mut Pap3Ctx<'_>, report: &[u8]) {
        let report = (!report.is_empty()).then_some(report);
        self.seed(ctx, report);
        self.apply_intent(ctx);
    }

    fn lcd_config(&self) -> LcdDisplayConfig {
        LcdDisplayConfig { show_labels: true, ..LcdDisplayConfig::default() }
    }
}
