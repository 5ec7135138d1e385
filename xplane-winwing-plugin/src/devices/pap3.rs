//! PAP3 MCP driver.
//!
//! Startup writes go straight to the handle; after that every output goes
//! through the I/O worker. The A/T arm switch is solenoid-held: when the sim
//! drops A/T arm for good, the solenoid is pulsed so the physical switch falls
//! back to OFF as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use winwing_protocol::input::{InputDecoder, InputEvent};
use winwing_protocol::{pap3, pap3_lcd};
use winwing_state::{LcdDisplayConfig, Pap3Leds, Pap3State};

use super::{Device, DeviceLink, FIRST_REPORT_TIMEOUT};
use crate::datarefs::DatarefStore;
use crate::hid::DeviceIo;
use crate::illumination::{ratio_to_percent, Illumination};
use crate::io_worker::{OutputState, Pap3Wire};
use crate::profiles::pap3::{power, registry, Pap3Ctx, Pap3Profile};
use crate::profiles::detect;

/// How long the solenoid is released to drop the A/T arm switch.
pub const SOLENOID_PULSE: Duration = Duration::from_millis(250);

/// Consecutive identical samples before an A/T disarm counts as real.
pub const AT_STABLE_TICKS: u32 = 2;
const AT_STABILITY_CAP: u32    = 1000;

/// Only one LCD on the panel.
const LCD_TARGET: u8 = 0;

// ── A/T arm watcher ───────────────────────────────────────────────────────────

/// Tracks the simulator's A/T arm state across ticks and decides when a
/// disarm is stable enough to pulse the solenoid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AtWatcher {
    last:         Option<bool>,
    stability:    u32,
    pending_drop: bool,
}

impl AtWatcher {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_seeded(&self) -> bool {
        self.last.is_some()
    }

    /// The hardware switch was put to OFF by hand; nothing to pulse.
    pub fn cancel_drop(&mut self) {
        self.pending_drop = false;
    }

    /// Feed one sample. Returns `true` when the solenoid should be pulsed.
    pub fn observe(&mut self, armed: bool, powered: bool, synced: bool) -> bool {
        if !powered {
            self.reset();
            return false;
        }
        match self.last {
            None => {
                self.last = Some(armed);
                self.stability = 0;
                return false;
            }
            Some(prev) if prev == armed => {
                self.stability = (self.stability + 1).min(AT_STABILITY_CAP);
            }
            Some(prev) => {
                self.stability = 0;
                self.pending_drop = prev && !armed;
                self.last = Some(armed);
            }
        }
        if self.pending_drop && synced && self.stability >= AT_STABLE_TICKS {
            self.pending_drop = false;
            return true;
        }
        false
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// Everything the panel output is derived from.
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    state:      Pap3State,
    cfg:        LcdDisplayConfig,
    power_mask: u8,
}

pub struct Pap3Device {
    link:         DeviceLink,
    decoder:      InputDecoder,
    illumination: Illumination,
    profile:      Option<Box<dyn Pap3Profile>>,
    show_labels:  Arc<AtomicBool>,

    connected:      bool,
    profile_ready:  bool,
    pending_sync:   bool,
    startup_synced: bool,

    solenoid_power: bool,
    pulse_until:    Option<Instant>,
    at_watch:       AtWatcher,
    /// Last frame queued to the worker.
    shown:          Option<Frame>,
}

impl Pap3Device {
    pub fn new(io: DeviceIo, show_labels: Arc<AtomicBool>) -> Self {
        Self {
            link: DeviceLink::new("pap3", io),
            decoder: InputDecoder::new(pap3::input_layout()),
            illumination: Illumination::new(),
            profile: None,
            show_labels,
            connected: false,
            profile_ready: false,
            pending_sync: false,
            startup_synced: false,
            solenoid_power: false,
            pulse_until: None,
            at_watch: AtWatcher::default(),
            shown: None,
        }
    }

    pub fn profile_name(&self) -> Option<&'static str> {
        self.profile.as_ref().map(|p| p.name())
    }

    /// All LEDs off, blank LCD, full dimming. Returns the LCD sequence to
    /// continue from, or `None` if the device refused the first write.
    fn write_startup(&self) -> Option<u8> {
        let sink = Some(self.link.sink());
        let mut seq = pap3::INITIAL_SEQUENCE;

        if !pap3::send_led(sink, Pap3Leds::FIRST_ID, false) {
            return None;
        }
        for id in Pap3Leds::FIRST_ID + 1..=Pap3Leds::LAST_ID {
            pap3::send_led(sink, id, false);
        }
        pap3::send_lcd_init(sink, &mut seq);
        pap3::send_lcd_payload(sink, &mut seq, &[0u8; pap3::LCD_PAYLOAD_LEN]);
        pap3::send_lcd_empty(sink, &mut seq);
        pap3::send_lcd_empty(sink, &mut seq);
        pap3::send_lcd_commit(sink, &mut seq);
        for ch in 0..pap3::DIMMING_CHANNELS {
            pap3::send_dimming(sink, ch, 255);
        }
        Some(seq)
    }

    fn queue_dimming(&mut self) {
        let changed = self.illumination.compute();
        if let Some(tx) = self.link.sender() {
            for (ch, raw) in changed {
                tx.set_dimming(ch, raw);
            }
        }
    }

    fn handle_report(&mut self, ctx: &mut Pap3Ctx<'_>, report: &[u8]) {
        if self.pending_sync {
            if let Some(p) = self.profile.as_mut() {
                p.sync_sim_to_hardware_from_raw(ctx, report);
            }
            self.pending_sync = false;
            self.startup_synced = true;
        }
        for ev in self.decoder.decode(report) {
            match ev {
                InputEvent::Button { offset, mask, pressed } => {
                    if let Some(p) = self.profile.as_mut() {
                        p.on_button(ctx, offset, mask, pressed);
                    }
                }
                InputEvent::Encoder { offset, delta } => {
                    if let Some(p) = self.profile.as_mut() {
                        p.on_encoder_delta(ctx, offset, delta);
                    }
                }
                InputEvent::LightSensor(lux) => self.illumination.set_light_sensor_raw(lux),
            }
        }
    }

    /// Tick the profile and queue output for whatever changed. The A/T
    /// watcher samples every tick regardless.
    fn refresh(&mut self, ctx: &mut Pap3Ctx<'_>) {
        let Some(p) = self.profile.as_mut() else { return };
        let changed = p.tick(ctx);
        let mut cfg = p.lcd_config();
        cfg.show_labels |= self.show_labels.load(Ordering::Relaxed);
        let power_mask = p.power_mask(ctx.store);
        let st = p.current();
        // Before the first sample the annunciator stands in for the switch.
        let armed = st.at_arm_on || (!self.at_watch.is_seeded() && st.leds.at_arm);

        let stale = changed
            || self.shown.as_ref().map_or(true, |f| f.cfg != cfg || f.power_mask != power_mask);
        if stale {
            let frame = Frame { state: st.clone(), cfg, power_mask };
            if self.shown.as_ref() != Some(&frame) {
                self.apply_frame(&frame);
                self.shown = Some(frame);
            }
        }
        self.queue_dimming();

        if self.at_watch.observe(armed, self.solenoid_power, self.startup_synced) {
            info!("A/T disarmed in sim, releasing arm switch");
            self.pulse_solenoid(ctx.now);
        }
    }

    fn apply_frame(&mut self, frame: &Frame) {
        let st = &frame.state;
        let previous = self.shown.as_ref();
        if let Some(tx) = self.link.sender() {
            if previous.map_or(true, |f| f.state.leds != st.leds) {
                for (id, on) in st.leds.iter() {
                    tx.set_led(u16::from(id), u8::from(on));
                }
            }
            tx.set_display(LCD_TARGET, pap3_lcd::render_state(st, &frame.cfg).to_vec());
        }

        self.illumination.set_aircraft_percents(
            ratio_to_percent(st.cockpit_lights),
            ratio_to_percent(st.mcp_brightness),
            ratio_to_percent(st.leds_brightness),
        );
        if previous.map_or(true, |f| f.power_mask != frame.power_mask) {
            self.update_power(frame.power_mask);
        }
    }

    fn update_power(&mut self, mask: u8) {
        self.illumination.set_power_available(mask & power::MCP != 0);

        let solenoid = mask & power::SOLENOID != 0;
        if self.solenoid_power && !solenoid {
            debug!("A/T solenoid lost power");
            self.pulse_until = None;
            self.at_watch.reset();
        }
        self.solenoid_power = solenoid;
        if let Some(tx) = self.link.sender() {
            tx.set_solenoid(solenoid && self.pulse_until.is_none());
        }
    }

    /// Release the solenoid now and re-energise it after [`SOLENOID_PULSE`].
    /// A pulse already running is left alone.
    fn pulse_solenoid(&mut self, now: Instant) {
        if self.pulse_until.is_some() {
            return;
        }
        let Some(tx) = self.link.sender() else { return };
        tx.set_solenoid(false);
        if self.solenoid_power {
            self.pulse_until = Some(now + SOLENOID_PULSE);
        }
    }

    fn finish_pulse(&mut self, now: Instant) {
        if self.pulse_until.is_some_and(|t| now >= t) {
            self.pulse_until = None;
            if let Some(tx) = self.link.sender() {
                tx.set_solenoid(self.solenoid_power);
            }
        }
    }

    /// Safe state written directly, after the worker is gone.
    fn write_shutdown(&self) {
        let sink = Some(self.link.sink());
        for id in Pap3Leds::FIRST_ID..=Pap3Leds::LAST_ID {
            pap3::send_led(sink, id, false);
        }
        for ch in 0..pap3::DIMMING_CHANNELS {
            pap3::send_dimming(sink, ch, 0);
        }
        pap3::send_solenoid(sink, false);
    }
}

impl Device for Pap3Device {
    fn class_identifier(&self) -> &'static str {
        "Product-PAP3"
    }

    fn connect(&mut self, store: &DatarefStore) -> bool {
        if self.connected {
            return true;
        }
        let Some(seq) = self.write_startup() else {
            warn!(device = self.class_identifier(), "startup sequence failed");
            return false;
        };

        let leds_off = (Pap3Leds::FIRST_ID..=Pap3Leds::LAST_ID).map(|id| (u16::from(id), 0));
        let output = OutputState::new().with_sent_leds(leds_off);
        if !self.link.start(Box::new(Pap3Wire::with_sequence(seq)), output) {
            return false;
        }
        self.connected = true;

        self.illumination = Illumination::new();
        self.illumination.set_power_available(true);
        self.queue_dimming();

        self.decoder.reset();
        let snapshot = self.link.wait_report(FIRST_REPORT_TIMEOUT);
        if let Some(r) = snapshot.as_deref() {
            for ev in self.decoder.decode(r) {
                if let InputEvent::LightSensor(lux) = ev {
                    self.illumination.set_light_sensor_raw(lux);
                }
            }
        } else {
            debug!("no initial switch snapshot");
        }

        let now = Instant::now();
        let mut ctx = Pap3Ctx::new(store, now);
        self.shown = None;
        self.profile = detect(&registry(), store, ());
        match self.profile.as_mut() {
            Some(p) => {
                p.start(store);
                match snapshot.as_deref() {
                    Some(r) => {
                        p.sync_sim_to_hardware_from_raw(&mut ctx, r);
                        self.startup_synced = true;
                    }
                    None => self.pending_sync = true,
                }
                self.refresh(&mut ctx);
                if let Some(armed) = ctx.take_at_intent() {
                    if !armed {
                        self.at_watch.cancel_drop();
                    }
                }
            }
            None => info!(device = self.class_identifier(), "no aircraft profile, panel idle"),
        }
        self.profile_ready = true;
        true
    }

    fn update(&mut self, store: &DatarefStore, now: Instant) {
        if !self.connected {
            return;
        }
        let inbound = self.link.poll();
        let mut ctx = Pap3Ctx::new(store, now);
        for report in &inbound.reports {
            self.handle_report(&mut ctx, report);
        }
        if inbound.failure.is_some() {
            self.disconnect(store);
            return;
        }

        self.refresh(&mut ctx);
        if let Some(armed) = ctx.take_at_intent() {
            if !armed {
                self.at_watch.cancel_drop();
            }
        }
        self.finish_pulse(now);
    }

    fn disconnect(&mut self, store: &DatarefStore) {
        if let Some(mut p) = self.profile.take() {
            p.stop(store);
        }
        let was_running = self.link.is_running();
        self.link.stop();
        if was_running {
            self.write_shutdown();
        }
        self.link.close();

        self.connected = false;
        self.profile_ready = false;
        self.pending_sync = false;
        self.startup_synced = false;
        self.solenoid_power = false;
        self.pulse_until = None;
        self.at_watch.reset();
        self.shown = None;
        self.decoder.reset();
        debug!(device = self.class_identifier(), "disconnected");
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn profile_ready(&self) -> bool {
        self.profile_ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::testing::{make_io, wait_for};
    use crate::xplm_shim::{DataRefValue, MockXplm};

    #[test]
    fn single_tick_glitch_does_not_pulse() {
        let mut w = AtWatcher::default();
        assert!(!w.observe(true, true, true), "baseline");
        assert!(!w.observe(true, true, true));
        assert!(!w.observe(true, true, true));
        assert!(!w.observe(false, true, true), "glitch");
        assert!(!w.observe(true, true, true), "back within one tick");
        for _ in 0..5 {
            assert!(!w.observe(true, true, true));
        }
    }

    #[test]
    fn sustained_disarm_pulses_exactly_once() {
        let mut w = AtWatcher::default();
        w.observe(true, true, true);
        w.observe(true, true, true);
        let fired: usize = (0..10).map(|_| usize::from(w.observe(false, true, true))).sum();
        assert_eq!(fired, 1);
    }

    #[test]
    fn no_pulse_before_startup_sync_or_without_power() {
        let mut w = AtWatcher::default();
        w.observe(true, true, false);
        for _ in 0..5 {
            assert!(!w.observe(false, true, false), "not synced yet");
        }
        assert!(w.observe(false, true, true), "drop still pending once synced");

        let mut w = AtWatcher::default();
        w.observe(true, true, true);
        w.observe(false, true, true);
        assert!(!w.observe(false, false, true));
        assert!(!w.is_seeded(), "power loss resets");
    }

    #[test]
    fn manual_disarm_cancels_pending_drop() {
        let mut w = AtWatcher::default();
        w.observe(true, true, true);
        w.observe(false, true, true);
        w.cancel_drop();
        for _ in 0..5 {
            assert!(!w.observe(false, true, true));
        }
    }

    #[test]
    fn connect_runs_startup_and_idles_without_profile() {
        let (io, sink, source) = make_io();
        source.push(vec![0u8; 0x20]);
        let store = DatarefStore::new(Arc::new(MockXplm::new()));
        let mut dev = Pap3Device::new(io, Arc::new(AtomicBool::new(false)));

        assert!(dev.connect(&store));
        assert!(dev.is_connected());
        assert!(dev.profile_ready(), "idle mode counts as ready");
        assert_eq!(dev.profile_name(), None);

        let r = sink.reports();
        assert_eq!(r[0], pap3::led_frame(0x03, false).to_vec());
        assert_eq!(r[16], pap3::led_frame(0x13, false).to_vec());
        assert_eq!(r[17], pap3::lcd_init_frame(pap3::INITIAL_SEQUENCE).to_vec());
        assert_eq!(r[22], pap3::dimming_frame(0, 255).to_vec());
        assert_eq!(r[24], pap3::dimming_frame(2, 255).to_vec());

        dev.disconnect(&store);
        assert!(!dev.is_connected());
        let r = sink.reports();
        assert_eq!(r.last(), Some(&pap3::solenoid_frame(false).to_vec()), "solenoid off last");
    }

    #[test]
    fn zibo_state_reaches_the_panel() {
        let (io, sink, source) = make_io();
        source.push(vec![0u8; 0x20]);
        let mock = Arc::new(MockXplm::new());
        mock.set_dataref("laminar/B738/zibomod/filename_list", DataRefValue::Bytes(b"x".to_vec()));
        mock.set_dataref("sim/cockpit2/autopilot/autopilot_has_power", DataRefValue::Int(1));
        mock.set_dataref("laminar/B738/electric/dc_bus1_status", DataRefValue::Int(1));
        mock.set_dataref("laminar/B738/autopilot/vnav_status1", DataRefValue::Float(1.0));
        let store = DatarefStore::new(mock);
        let mut dev = Pap3Device::new(io, Arc::new(AtomicBool::new(false)));

        assert!(dev.connect(&store));
        assert_eq!(dev.profile_name(), Some("Zibo 737"));
        let vnav_on = pap3::led_frame(0x05, true).to_vec();
        let solenoid_on = pap3::solenoid_frame(true).to_vec();
        assert!(wait_for(&sink, |r| r.contains(&vnav_on) && r.contains(&solenoid_on)));
        dev.disconnect(&store);
    }

    fn zibo_device() -> (Pap3Device, Arc<MockXplm>, DatarefStore) {
        let (io, _sink, source) = make_io();
        source.push(vec![0u8; 0x20]);
        let mock = Arc::new(MockXplm::new());
        mock.set_dataref("laminar/B738/zibomod/filename_list", DataRefValue::Bytes(b"x".to_vec()));
        mock.set_dataref("sim/cockpit2/autopilot/autopilot_has_power", DataRefValue::Int(1));
        mock.set_dataref("laminar/B738/electric/dc_bus1_status", DataRefValue::Int(1));
        mock.set_dataref("laminar/B738/autopilot/mcp_hdg_dial", DataRefValue::Int(90));
        let store = DatarefStore::new(mock.clone());
        (Pap3Device::new(io, Arc::new(AtomicBool::new(false))), mock, store)
    }

    fn queued(dev: &Pap3Device) -> u64 {
        dev.link.sender().map_or(0, |tx| tx.queued())
    }

    #[test]
    fn unchanged_sim_queues_nothing() {
        let (mut dev, mock, store) = zibo_device();
        assert!(dev.connect(&store));
        let t0 = Instant::now();
        store.update();
        dev.update(&store, t0);
        let settled = queued(&dev);
        for i in 1..=5 {
            store.update();
            dev.update(&store, t0 + Duration::from_millis(20 * i));
        }
        assert_eq!(queued(&dev), settled, "no output for unchanged frames");

        mock.set_dataref("laminar/B738/autopilot/mcp_hdg_dial", DataRefValue::Int(91));
        store.update();
        dev.update(&store, t0 + Duration::from_millis(200));
        assert_eq!(queued(&dev), settled + 1, "only the LCD");
        dev.disconnect(&store);
    }

    #[test]
    fn label_toggle_redraws_without_a_sim_change() {
        let (io, _sink, source) = make_io();
        source.push(vec![0u8; 0x20]);
        let mock = Arc::new(MockXplm::new());
        mock.set_dataref("laminar/B738/zibomod/filename_list", DataRefValue::Bytes(b"x".to_vec()));
        let store = DatarefStore::new(mock);
        let labels = Arc::new(AtomicBool::new(false));
        let mut dev = Pap3Device::new(io, Arc::clone(&labels));
        assert!(dev.connect(&store));
        let t0 = Instant::now();
        dev.update(&store, t0);
        let settled = queued(&dev);

        labels.store(true, Ordering::Relaxed);
        dev.update(&store, t0 + Duration::from_millis(20));
        assert_eq!(queued(&dev), settled + 1);
        dev.update(&store, t0 + Duration::from_millis(40));
        assert_eq!(queued(&dev), settled + 1);
        dev.disconnect(&store);
    }
}
