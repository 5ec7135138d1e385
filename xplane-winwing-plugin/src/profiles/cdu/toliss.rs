//! ToLiss A319/A320/A321/A339/A346 MCDU.
//!
//! Every text dataref holds one colour of one line; the name encodes row,
//! colour and font size, e.g. `AirbusFBW/MCDU1label3a` or
//! `AirbusFBW/MCDU2scont6g`. Names are parsed once when the profile is built.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use winwing_protocol::cdu::{glyph, CduKey, CduLed, CduVariant};
use winwing_state::{CduPage, CDU_COLUMNS, CDU_ROWS};

use super::{airbus_color, CduButton, CduProfile, CduUnit, Watch};
use crate::datarefs::DatarefStore;
use crate::profiles::{array_at, level, num, on};

const MARKER: &str = "AirbusFBW/PanelBrightnessLevel";

const PANEL_BRIGHTNESS: &str = MARKER;
const DU_BRIGHTNESS: &str    = "AirbusFBW/DUBrightness";
const AVIONICS_ON: &str      = "sim/cockpit/electrical/avionics_on";

/// Index of the MCDU screens in the display unit brightness array.
const MCDU_DU_INDEX: usize  = 6;
const MIN_DU_ENTRIES: usize = 8;

/// Line fields in draw order; later fields overwrite earlier ones. `{}` is
/// the line number 1..6.
const LINE_FIELDS: &[&str] = &[
    "label{}w", "label{}a", "label{}g", "label{}b", "label{}y", "label{}Lg",
    "cont{}b", "cont{}m", "scont{}m", "cont{}a", "scont{}a", "cont{}w", "cont{}g", "cont{}c",
    "scont{}g", "cont{}s", "scont{}b", "cont{}y", "scont{}w", "scont{}y",
];
const TITLE_FIELDS: &[&str] = &["titleb", "titleg", "titles", "titlew", "titley", "stitley", "stitlew"];

/// The scratchpad's amber text stops short of the slew arrows.
const AMBER_SCRATCHPAD_LEN: usize = 22;
const SCRATCHPAD_ROW: usize       = CDU_ROWS - 1;

fn field_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^AirbusFBW/MCDU([12])(s?)([a-zA-Z]+?)([0-6]?)(L?)([a-z])$").ok())
        .as_ref()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scratchpad {
    White,
    Amber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Row { row: usize, color: u8, small: bool },
    Scratchpad(Scratchpad),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    dataref: String,
    target:  Target,
}

fn parse_field(name: &str) -> Option<Field> {
    if name.ends_with("spw") || name.ends_with("spa") {
        let pad = if name.ends_with("spw") { Scratchpad::White } else { Scratchpad::Amber };
        return Some(Field { dataref: name.to_string(), target: Target::Scratchpad(pad) });
    }
    let caps = field_pattern()?.captures(name)?;
    let small_prefix = &caps[2] == "s";
    let kind = &caps[3];
    let line: usize = caps[4].parse().unwrap_or(0);
    let large_label = &caps[5] == "L";
    let color = caps[6].bytes().next()?;

    let row = match kind {
        "title" => 0,
        "label" => line.max(1) * 2 - 1,
        "cont" => line * 2,
        _ => return None,
    };
    let small = small_prefix || (kind == "label" && !large_label) || color == b's';
    Some(Field { dataref: name.to_string(), target: Target::Row { row, color, small } })
}

/// Symbol cells (`cont*s`) carry codes, not text.
fn symbol(c: u8) -> Option<(u8, u8)> {
    Some(match c {
        b'A' => (b'[', b'b'),
        b'B' => (b']', b'b'),
        b'0' => (b'<', b'b'),
        b'1' => (b'>', b'b'),
        b'2' => (b'<', b'w'),
        b'3' => (b'>', b'w'),
        b'4' => (b'<', b'a'),
        b'5' => (b'>', b'a'),
        b'E' => (b'#', b'a'),
        _ => return None,
    })
}

/// Scratchpad text up to its first NUL.
fn scratchpad_line(text: &[u8], limit: usize) -> Vec<u8> {
    text.iter().take(limit).take_while(|&&c| c != 0).copied().collect()
}

pub struct TolissCduProfile {
    mcdu:     &'static str,
    fields:   Vec<Field>,
    datarefs: Vec<String>,
    buttons:  Vec<CduButton>,
    leds:     Watch,
}

impl TolissCduProfile {
    pub fn is_eligible(store: &DatarefStore) -> bool {
        store.exists(MARKER)
    }

    pub fn boxed(unit: CduUnit) -> Box<dyn CduProfile> {
        Box::new(Self::new(unit))
    }

    pub fn new(unit: CduUnit) -> Self {
        let mcdu = if unit.variant == CduVariant::Captain { "MCDU1" } else { "MCDU2" };
        let mut names: Vec<String> = TITLE_FIELDS.iter().map(|f| format!("AirbusFBW/{mcdu}{f}")).collect();
        for pattern in LINE_FIELDS {
            for line in 1..=6 {
                names.push(format!("AirbusFBW/{mcdu}{}", pattern.replace("{}", &line.to_string())));
            }
        }
        names.push(format!("AirbusFBW/{mcdu}spw"));
        names.push(format!("AirbusFBW/{mcdu}spa"));

        let fields: Vec<Field> = names.iter().filter_map(|n| parse_field(n)).collect();
        if fields.len() != names.len() {
            debug!(parsed = fields.len(), total = names.len(), "some MCDU fields not understood");
        }
        let mut datarefs = names;
        datarefs.push(Self::slew_keys(mcdu));

        Self { mcdu, fields, datarefs, buttons: buttons(mcdu), leds: Watch::new() }
    }

    fn slew_keys(mcdu: &str) -> String {
        format!("AirbusFBW/{mcdu}VertSlewKeys")
    }
}

fn buttons(mcdu: &str) -> Vec<CduButton> {
    use CduKey::*;
    let b = |keys: &[CduKey], suffix: &str| CduButton::new(keys, format!("AirbusFBW/{mcdu}{suffix}"));
    let mut out = vec![
        b(&[Lsk1L], "LSK1L"),
        b(&[Lsk2L], "LSK2L"),
        b(&[Lsk3L], "LSK3L"),
        b(&[Lsk4L], "LSK4L"),
        b(&[Lsk5L], "LSK5L"),
        b(&[Lsk6L], "LSK6L"),
        b(&[Lsk1R], "LSK1R"),
        b(&[Lsk2R], "LSK2R"),
        b(&[Lsk3R], "LSK3R"),
        b(&[Lsk4R], "LSK4R"),
        b(&[Lsk5R], "LSK5R"),
        b(&[Lsk6R], "LSK6R"),
        b(&[McduDir], "DirTo"),
        b(&[Prog], "Prog"),
        b(&[McduPerf, Pfp3N1Limit], "Perf"),
        b(&[McduInit, PfpInitRef], "Init"),
        b(&[McduData], "Data"),
        CduButton::new(&[McduEmptyTopRight], "AirbusFBW/CaptChronoButton"),
        b(&[BrightnessUp], "KeyBright"),
        b(&[McduFpln, PfpLegs], "Fpln"),
        b(&[McduRadNav, Pfp4NavRad, Pfp7NavRad], "RadNav"),
        b(&[McduFuelPred], "FuelPred"),
        b(&[McduSecFpln], "SecFpln"),
        b(&[McduAtcComm, Pfp4Atc], "ATC"),
        b(&[Menu], "Menu"),
        b(&[BrightnessDown], "KeyDim"),
        b(&[McduAirport, PfpDepArr], "Airport"),
        CduButton::new(&[McduEmptyBottomLeft], "AirbusFBW/purser/fwd"),
        b(&[PagePrev], "SlewLeft"),
        b(&[McduPageUp, PagePrev], "SlewUp"),
        b(&[PageNext], "SlewRight"),
        b(&[McduPageDown, PageNext], "SlewDown"),
    ];
    let digits = [Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9];
    for (n, key) in digits.into_iter().enumerate() {
        out.push(b(&[key], &format!("Key{n}")));
    }
    let letters = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
        KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];
    for (key, letter) in letters.into_iter().zip('A'..='Z') {
        out.push(b(&[key], &format!("Key{letter}")));
    }
    out.extend([
        b(&[Period], "KeyDecimal"),
        b(&[PlusMinus], "KeyPM"),
        b(&[Slash], "KeySlash"),
        b(&[Space], "KeySpace"),
        b(&[McduOverfly, PfpDel], "KeyOverfly"),
        b(&[Clr], "KeyClear"),
    ]);
    out
}

impl CduProfile for TolissCduProfile {
    fn name(&self) -> &'static str {
        "ToLiss A3xx"
    }

    fn display_datarefs(&self) -> &[String] {
        &self.datarefs
    }

    fn buttons(&self) -> &[CduButton] {
        &self.buttons
    }

    fn color(&self, code: u8) -> u16 {
        airbus_color(code)
    }

    fn glyph(&self, ch: u8, small: bool, out: &mut Vec<u8>) {
        match ch {
            b'#' => out.extend_from_slice(glyph::OUTLINED_SQUARE),
            b'<' if small => out.extend_from_slice(glyph::ARROW_LEFT),
            b'>' if small => out.extend_from_slice(glyph::ARROW_RIGHT),
            30 => out.extend_from_slice(glyph::ARROW_UP),
            31 => out.extend_from_slice(glyph::ARROW_DOWN),
            b'`' => out.extend_from_slice(glyph::DEGREES),
            b'|' => out.extend_from_slice(glyph::TRIANGLE),
            c => out.push(c),
        }
    }

    fn update_page(&self, store: &DatarefStore, page: &mut CduPage) {
        *page = CduPage::new();
        let mut white_pad = Vec::new();
        let mut amber_pad = Vec::new();

        for field in &self.fields {
            let Some(text) = store.get_cached::<Vec<u8>>(&field.dataref) else { continue };
            match field.target {
                Target::Scratchpad(Scratchpad::White) => white_pad = scratchpad_line(&text, CDU_COLUMNS),
                Target::Scratchpad(Scratchpad::Amber) => amber_pad = scratchpad_line(&text, AMBER_SCRATCHPAD_LEN),
                Target::Row { row, color, small } => {
                    for (col, &c) in text.iter().enumerate() {
                        if c == 0 || c == b' ' {
                            continue;
                        }
                        let (ch, color) = if color == b's' { symbol(c).unwrap_or((c, color)) } else { (c, color) };
                        page.put(row, col, ch, color, small);
                    }
                }
            }
        }

        let slew = num(store, &Self::slew_keys(self.mcdu)) as i32;
        for col in 0..CDU_COLUMNS {
            let (mut ch, mut color, mut small) = match (white_pad.get(col), amber_pad.get(col)) {
                (_, Some(&a)) => (a, b'a', false),
                (Some(&w), None) => (w, b'w', false),
                (None, None) => (b' ', b'w', false),
            };
            if slew > 0 && col >= CDU_COLUMNS - 2 {
                if col == CDU_COLUMNS - 2 && matches!(slew, 1 | 2) {
                    ch = 30;
                } else if col == CDU_COLUMNS - 1 && matches!(slew, 1 | 3) {
                    ch = 31;
                }
                color = b'w';
                small = true;
            }
            page.put(SCRATCHPAD_ROW, col, ch, color, small);
        }
    }

    fn start(&mut self, store: &DatarefStore) {
        self.leds.add::<f32>(store, PANEL_BRIGHTNESS);
        self.leds.add::<Vec<f32>>(store, DU_BRIGHTNESS);
        self.leds.add::<f32>(store, AVIONICS_ON);
    }

    fn stop(&mut self, store: &DatarefStore) {
        self.leds.clear(store);
    }

    fn take_leds(&mut self, store: &DatarefStore) -> Option<Vec<(CduLed, u8)>> {
        if !self.leds.take() {
            return None;
        }
        let powered = on(store, AVIONICS_ON);
        let mut out = vec![(CduLed::Backlight, if powered { level(num(store, PANEL_BRIGHTNESS)) } else { 0 })];
        let du_ok = store.get_cached::<Vec<f32>>(DU_BRIGHTNESS).is_some_and(|v| v.len() >= MIN_DU_ENTRIES);
        if du_ok {
            let screen = array_at(store, DU_BRIGHTNESS, MCDU_DU_INDEX).unwrap_or(0.0);
            out.push((CduLed::ScreenBacklight, if powered { level(screen) } else { 0 }));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::find_button;
    use super::*;
    use crate::xplm_shim::{CommandPhase, DataRefValue};
    use winwing_protocol::cdu::CduHardware;

    fn captain() -> TolissCduProfile {
        TolissCduProfile::new(CduUnit { hardware: CduHardware::Mcdu, variant: CduVariant::Captain })
    }

    #[test]
    fn field_names_decode_to_rows() {
        let f = |n: &str| parse_field(n).map(|f| f.target);
        assert_eq!(f("AirbusFBW/MCDU1titleg"), Some(Target::Row { row: 0, color: b'g', small: false }));
        assert_eq!(f("AirbusFBW/MCDU1stitley"), Some(Target::Row { row: 0, color: b'y', small: true }));
        assert_eq!(f("AirbusFBW/MCDU2label3a"), Some(Target::Row { row: 5, color: b'a', small: true }));
        assert_eq!(f("AirbusFBW/MCDU1label6Lg"), Some(Target::Row { row: 11, color: b'g', small: false }));
        assert_eq!(f("AirbusFBW/MCDU1cont1b"), Some(Target::Row { row: 2, color: b'b', small: false }));
        assert_eq!(f("AirbusFBW/MCDU1scont6m"), Some(Target::Row { row: 12, color: b'm', small: true }));
        assert_eq!(f("AirbusFBW/MCDU1cont2s"), Some(Target::Row { row: 4, color: b's', small: true }));
        assert_eq!(f("AirbusFBW/MCDU1spa"), Some(Target::Scratchpad(Scratchpad::Amber)));
        assert_eq!(f("AirbusFBW/Other"), None);

        let p = captain();
        assert_eq!(p.fields.len(), TITLE_FIELDS.len() + LINE_FIELDS.len() * 6 + 2, "every field parses");
    }

    #[test]
    fn page_layers_colours_and_symbols() {
        let (mock, store) = make_mock();
        set_text(&mock, "AirbusFBW/MCDU1titlew", b"   INIT");
        set_text(&mock, "AirbusFBW/MCDU1label1w", b" CO RTE");
        set_text(&mock, "AirbusFBW/MCDU1cont1a", b"##########");
        set_text(&mock, "AirbusFBW/MCDU1cont1b", b"  AAA");
        set_text(&mock, "AirbusFBW/MCDU1cont2s", b"0");
        let mut page = CduPage::new();
        captain().update_page(&store, &mut page);

        assert_eq!(page.row_text(0).trim(), "INIT");
        assert_eq!(page.cell(1, 1).map(|c| (c.ch, c.small)), Some((b'C', true)));
        assert_eq!(page.cell(2, 0).map(|c| (c.ch, c.color)), Some((b'#', b'a')), "amber boxes");
        assert_eq!(page.cell(2, 2).map(|c| (c.ch, c.color)), Some((b'#', b'a')), "amber drawn after cyan");
        assert_eq!(page.cell(4, 0).map(|c| (c.ch, c.color)), Some((b'<', b'b')), "symbol code 0");
    }

    #[test]
    fn scratchpad_merges_amber_over_white_and_slew_arrows() {
        let (mock, store) = make_mock();
        set_text(&mock, "AirbusFBW/MCDU1spw", b"KJFK\0junk");
        set_text(&mock, "AirbusFBW/MCDU1spa", b"  X");
        set_int(&mock, "AirbusFBW/MCDU1VertSlewKeys", 1);
        let mut page = CduPage::new();
        captain().update_page(&store, &mut page);

        let row = SCRATCHPAD_ROW;
        assert_eq!(page.cell(row, 0).map(|c| (c.ch, c.color)), Some((b' ', b'a')), "amber space wins");
        assert_eq!(page.cell(row, 2).map(|c| (c.ch, c.color)), Some((b'X', b'a')));
        assert_eq!(page.cell(row, 3).map(|c| (c.ch, c.color)), Some((b'K', b'w')));
        assert_eq!(page.cell(row, 4).map(|c| c.ch), Some(b' '), "white stops at NUL");
        assert_eq!(page.cell(row, 22).map(|c| (c.ch, c.small)), Some((30, true)));
        assert_eq!(page.cell(row, 23).map(|c| (c.ch, c.small)), Some((31, true)));
    }

    #[test]
    fn backlights_follow_avionics_power() {
        let (mock, store) = make_mock();
        set_float(&mock, PANEL_BRIGHTNESS, 1.0);
        mock.set_dataref(DU_BRIGHTNESS, DataRefValue::FloatArray(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.2, 0.0]));
        set_int(&mock, AVIONICS_ON, 0);
        let mut p = captain();
        p.start(&store);

        let leds = p.take_leds(&store).unwrap_or_default();
        assert_eq!(led(&leds, CduLed::Backlight), Some(0));
        assert_eq!(led(&leds, CduLed::ScreenBacklight), Some(0));
        assert!(p.take_leds(&store).is_none(), "nothing changed");

        set_int(&mock, AVIONICS_ON, 1);
        store.update();
        let leds = p.take_leds(&store).unwrap_or_default();
        assert_eq!(led(&leds, CduLed::Backlight), Some(255));
        assert_eq!(led(&leds, CduLed::ScreenBacklight), Some(51));
        p.stop(&store);
    }

    #[test]
    fn first_officer_uses_mcdu2_commands() {
        let (mock, store) = make_mock();
        mock.add_command("AirbusFBW/MCDU2KeyA");
        let mut p = TolissCduProfile::new(CduUnit { hardware: CduHardware::Pfp4, variant: CduVariant::FirstOfficer });
        let Some(button) = find_button(p.buttons(), CduKey::KeyA).cloned() else { panic!("KeyA missing") };
        p.button_pressed(&store, &button, CommandPhase::Begin);
        p.button_pressed(&store, &button, CommandPhase::End);
        assert_eq!(
            mock.command_calls(),
            vec![
                ("AirbusFBW/MCDU2KeyA".to_string(), CommandPhase::Begin),
                ("AirbusFBW/MCDU2KeyA".to_string(), CommandPhase::End),
            ]
        );
        assert_eq!(
            find_button(p.buttons(), CduKey::Pfp4NavRad).map(|b| b.command.as_str()),
            Some("AirbusFBW/MCDU2RadNav")
        );
    }
}
