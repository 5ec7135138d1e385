//! Canonical hardware-facing state shared by the X-Plane plugin, the
//! winwing-protocol codecs and the probe CLI.
//!
//! Aircraft profiles produce these values from simulator datarefs; device
//! drivers and compositors consume them. None of the types here know anything
//! about X-Plane or USB.

use serde::{Deserialize, Serialize};

// ── PAP3 MCP ──────────────────────────────────────────────────────────────────

/// Annunciator LEDs of the PAP3 MCP, in hardware id order (0x03..=0x13).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pap3Leds {
    pub n1:      bool,
    pub speed:   bool,
    pub vnav:    bool,
    pub lvl_chg: bool,
    pub hdg_sel: bool,
    pub lnav:    bool,
    pub vorloc:  bool,
    pub app:     bool,
    pub alt_hld: bool,
    pub v_s:     bool,
    pub cmd_a:   bool,
    pub cws_a:   bool,
    pub cmd_b:   bool,
    pub cws_b:   bool,
    pub at_arm:  bool,
    pub ma_capt: bool,
    pub ma_fo:   bool,
}

impl Pap3Leds {
    pub const FIRST_ID: u8 = 0x03;
    pub const LAST_ID: u8  = 0x13;
    pub const AT_ARM_ID: u8 = 0x11;

    /// LED state for a hardware id, `None` outside the annunciator range.
    pub fn by_id(&self, id: u8) -> Option<bool> {
        let v = match id {
            0x03 => self.n1,
            0x04 => self.speed,
            0x05 => self.vnav,
            0x06 => self.lvl_chg,
            0x07 => self.hdg_sel,
            0x08 => self.lnav,
            0x09 => self.vorloc,
            0x0A => self.app,
            0x0B => self.alt_hld,
            0x0C => self.v_s,
            0x0D => self.cmd_a,
            0x0E => self.cws_a,
            0x0F => self.cmd_b,
            0x10 => self.cws_b,
            0x11 => self.at_arm,
            0x12 => self.ma_capt,
            0x13 => self.ma_fo,
            _ => return None,
        };
        Some(v)
    }

    /// `(id, on)` for every annunciator, ascending id.
    pub fn iter(&self) -> impl Iterator<Item = (u8, bool)> + '_ {
        (Self::FIRST_ID..=Self::LAST_ID).filter_map(move |id| self.by_id(id).map(|on| (id, on)))
    }
}

/// Everything the PAP3 shows: LCD windows, annunciators, brightness and the
/// A/T arm solenoid target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pap3State {
    /// IAS in knots when >= 100, otherwise Mach (either 0.xx or xx convention).
    pub spd:         f32,
    pub spd_visible: bool,
    pub hdg:         i32,
    pub hdg_visible: bool,
    pub alt:         i32,
    pub vvi:         f32,
    pub vvi_visible: bool,
    pub crs_capt:    i32,
    pub crs_fo:      i32,
    pub crs_visible: bool,
    /// Zibo "digit A" / "digit 8" flags drawn in the speed kilo position.
    pub digit_a:     bool,
    pub digit_b:     bool,

    // Brightness, 0..1
    pub mcp_brightness:  f32,
    pub cockpit_lights:  f32,
    pub leds_brightness: f32,

    pub at_arm_on: bool,
    pub leds:      Pap3Leds,
}

impl Default for Pap3State {
    fn default() -> Self {
        Self {
            spd:             0.0,
            spd_visible:     true,
            hdg:             0,
            hdg_visible:     true,
            alt:             0,
            vvi:             0.0,
            vvi_visible:     true,
            crs_capt:        0,
            crs_fo:          0,
            crs_visible:     true,
            digit_a:         false,
            digit_b:         false,
            mcp_brightness:  0.0,
            cockpit_lights:  0.0,
            leds_brightness: 1.0,
            at_arm_on:       false,
            leds:            Pap3Leds::default(),
        }
    }
}

/// How a profile wants inactive LCD windows rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcdDisplayConfig {
    pub show_labels: bool,
    pub show_labels_when_inactive: bool,
    pub show_dashes_when_inactive: bool,
}

// ── FCU / EFIS ────────────────────────────────────────────────────────────────

/// The four FCU windows and every annunciator segment around them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FcuWindows {
    pub speed:          String,
    pub heading:        String,
    pub altitude:       String,
    pub vertical_speed: String,

    pub display_enabled: bool,
    pub display_test:    bool,

    pub spd_mach:    bool,
    pub hdg_trk:     bool,
    pub alt_managed: bool,
    pub spd_managed: bool,
    pub hdg_managed: bool,
    pub vs_mode:     bool,
    pub fpa_mode:    bool,
    pub lat_mode:    bool,

    pub alt_indication:     bool,
    pub vs_horizontal_line: bool,
    pub vs_vertical_line:   bool,
    pub lvl_change:         bool,
    pub lvl_change_left:    bool,
    pub lvl_change_right:   bool,
    pub vs_indication:      bool,
    pub fpa_indication:     bool,
    pub fpa_comma:          bool,
    pub vs_sign:            bool,
}

impl Default for FcuWindows {
    fn default() -> Self {
        Self {
            speed:              String::new(),
            heading:            String::new(),
            altitude:           String::new(),
            vertical_speed:     String::new(),
            display_enabled:    true,
            display_test:       false,
            spd_mach:           false,
            hdg_trk:            false,
            alt_managed:        false,
            spd_managed:        false,
            hdg_managed:        false,
            vs_mode:            false,
            fpa_mode:           false,
            lat_mode:           false,
            alt_indication:     true,
            vs_horizontal_line: true,
            vs_vertical_line:   false,
            lvl_change:         true,
            lvl_change_left:    true,
            lvl_change_right:   true,
            vs_indication:      false,
            fpa_indication:     false,
            fpa_comma:          false,
            vs_sign:            true,
        }
    }
}

/// hPa per inHg.
pub const HPA_PER_INHG: f32 = 33.8639;

/// One EFIS barometer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EfisDisplayValue {
    pub baro:            String,
    pub display_enabled: bool,
    pub display_test:    bool,
    pub unit_is_in_hg:   bool,
    pub is_std:          bool,
    pub show_qfe:        bool,
}

impl Default for EfisDisplayValue {
    fn default() -> Self {
        Self {
            baro:            String::new(),
            display_enabled: true,
            display_test:    false,
            unit_is_in_hg:   false,
            is_std:          false,
            show_qfe:        false,
        }
    }
}

impl EfisDisplayValue {
    /// Show a QNH setting given in inHg, rendered as hundredths of inHg or
    /// whole hPa, right-aligned to four characters.
    pub fn set_baro(&mut self, in_hg: f32, is_in_hg: bool) {
        self.is_std = false;
        self.unit_is_in_hg = is_in_hg;
        let factor = if is_in_hg { 100.0 } else { HPA_PER_INHG };
        let value = (in_hg * factor).round() as i32;
        self.baro = format!("{value:>4}");
    }
}

/// Everything the FCU plus both EFIS panels display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FcuDisplayData {
    pub fcu:        FcuWindows,
    pub efis_left:  EfisDisplayValue,
    pub efis_right: EfisDisplayValue,
}

// ── CDU ───────────────────────────────────────────────────────────────────────

pub const CDU_ROWS: usize    = 14;
pub const CDU_COLUMNS: usize = 24;

/// One character cell of the CDU screen. `color` is the profile's colour code
/// (e.g. `b'w'`, `b'a'`), translated to a wire colour when the page is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CduCell {
    pub ch:    u8,
    pub color: u8,
    pub small: bool,
}

impl Default for CduCell {
    fn default() -> Self {
        Self { ch: b' ', color: b'w', small: false }
    }
}

/// A full 14×24 CDU page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CduPage {
    cells: [[CduCell; CDU_COLUMNS]; CDU_ROWS],
}

impl Default for CduPage {
    fn default() -> Self {
        Self { cells: [[CduCell::default(); CDU_COLUMNS]; CDU_ROWS] }
    }
}

impl CduPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one cell. Out-of-range positions are ignored.
    pub fn put(&mut self, row: usize, col: usize, ch: u8, color: u8, small: bool) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = CduCell { ch, color, small };
        }
    }

    /// Write `text` starting at `col`, clipping at the right edge.
    pub fn put_str(&mut self, row: usize, col: usize, text: &[u8], color: u8, small: bool) {
        for (i, &ch) in text.iter().enumerate() {
            self.put(row, col + i, ch, color, small);
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CduCell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CduCell; CDU_COLUMNS]> {
        self.cells.iter()
    }

    /// Row text as ASCII, handy for tests and logging.
    pub fn row_text(&self, row: usize) -> String {
        self.cells
            .get(row)
            .map(|r| r.iter().map(|c| c.ch as char).collect())
            .unwrap_or_default()
    }
}
