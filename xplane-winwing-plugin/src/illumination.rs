//! PAP3 dimming channels: where each brightness comes from and which raw
//! values still have to be sent.

pub const BACKLIGHT: u8 = 0;
pub const LCD: u8       = 1;
pub const LEDS: u8      = 2;
pub const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IllumMode {
    /// Follow the aircraft's panel brightness.
    #[default]
    Aircraft,
    /// Always `fixed_percent`.
    Fixed,
    /// Follow the ambient light sensor on the panel.
    LightSensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub mode:          IllumMode,
    pub fixed_percent: u8,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { mode: IllumMode::Aircraft, fixed_percent: 100 }
    }
}

/// 0..=100 percent to the 0..=255 range the hardware takes, rounded.
pub fn percent_to_raw(percent: u8) -> u8 {
    let p = u32::from(percent.min(100));
    ((p * 255 + 50) / 100) as u8
}

/// A 0..1 simulator ratio as a clamped, rounded percent. NaN reads as 0.
pub fn ratio_to_percent(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v * 100.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone)]
pub struct Illumination {
    config:   [ChannelConfig; CHANNELS],
    aircraft: [u8; CHANNELS],
    sensor:   u8,
    powered:  bool,
    sent:     [Option<u8>; CHANNELS],
}

impl Default for Illumination {
    fn default() -> Self {
        Self {
            config:   [ChannelConfig::default(); CHANNELS],
            aircraft: [100; CHANNELS],
            sensor:   100,
            powered:  false,
            sent:     [None; CHANNELS],
        }
    }
}

impl Illumination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&mut self, config: [ChannelConfig; CHANNELS]) {
        self.config = config;
    }

    pub fn set_aircraft_percents(&mut self, backlight: u8, lcd: u8, leds: u8) {
        self.aircraft = [backlight.min(100), lcd.min(100), leds.min(100)];
    }

    pub fn set_light_sensor_percent(&mut self, percent: u8) {
        self.sensor = percent.min(100);
    }

    /// Raw sensor byte (0..=255) as a percent.
    pub fn set_light_sensor_raw(&mut self, lux: u8) {
        self.set_light_sensor_percent(((u16::from(lux) * 100) / 255) as u8);
    }

    pub fn set_power_available(&mut self, powered: bool) {
        self.powered = powered;
    }

    /// Effective percent of one channel; 0 without power.
    pub fn percent(&self, channel: u8) -> u8 {
        let Some(cfg) = self.config.get(usize::from(channel)) else { return 0 };
        if !self.powered {
            return 0;
        }
        match cfg.mode {
            IllumMode::Aircraft    => self.aircraft[usize::from(channel)],
            IllumMode::Fixed       => cfg.fixed_percent.min(100),
            IllumMode::LightSensor => self.sensor,
        }
    }

    /// `(channel, raw)` for every channel whose raw value differs from the
    /// last one returned.
    pub fn compute(&mut self) -> Vec<(u8, u8)> {
        let mut out = Vec::new();
        for ch in 0..CHANNELS as u8 {
            let raw = percent_to_raw(self.percent(ch));
            let slot = &mut self.sent[usize::from(ch)];
            if *slot != Some(raw) {
                *slot = Some(raw);
                out.push((ch, raw));
            }
        }
        out
    }

    /// Forget what was returned so the next `compute` yields every channel.
    pub fn reset(&mut self) {
        self.sent = [None; CHANNELS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(percent_to_raw(0), 0);
        assert_eq!(percent_to_raw(50), 128);
        assert_eq!(percent_to_raw(100), 255);
        assert_eq!(percent_to_raw(200), 255, "clamped");
        assert_eq!(ratio_to_percent(0.456), 46);
        assert_eq!(ratio_to_percent(1.7), 100);
        assert_eq!(ratio_to_percent(-0.2), 0);
        assert_eq!(ratio_to_percent(f32::NAN), 0);
    }

    #[test]
    fn only_changed_channels_are_returned() {
        let mut il = Illumination::new();
        il.set_power_available(true);
        il.set_aircraft_percents(100, 100, 100);
        assert_eq!(il.compute(), vec![(BACKLIGHT, 255), (LCD, 255), (LEDS, 255)]);
        assert!(il.compute().is_empty(), "nothing changed");

        il.set_aircraft_percents(100, 50, 100);
        assert_eq!(il.compute(), vec![(LCD, 128)]);

        il.reset();
        assert_eq!(il.compute().len(), 3);
    }

    #[test]
    fn power_loss_darkens_everything() {
        let mut il = Illumination::new();
        il.set_power_available(true);
        il.compute();
        il.set_power_available(false);
        assert_eq!(il.compute(), vec![(BACKLIGHT, 0), (LCD, 0), (LEDS, 0)]);
        assert_eq!(il.percent(LEDS), 0);
    }

    #[test]
    fn modes() {
        let mut il = Illumination::new();
        il.set_power_available(true);
        il.set_config([
            ChannelConfig { mode: IllumMode::Fixed, fixed_percent: 40 },
            ChannelConfig { mode: IllumMode::LightSensor, fixed_percent: 100 },
            ChannelConfig::default(),
        ]);
        il.set_aircraft_percents(10, 10, 70);
        il.set_light_sensor_raw(255);
        assert_eq!(il.percent(BACKLIGHT), 40);
        assert_eq!(il.percent(LCD), 100);
        assert_eq!(il.percent(LEDS), 70);
        assert_eq!(il.percent(7), 0, "unknown channel");
    }
}
