//! Rotate MD-11 MCDU.

use std::ops::Range;

use winwing_protocol::cdu::{color, glyph, CduKey, CduLed};
use winwing_state::{CduPage, CDU_COLUMNS, CDU_ROWS};

use super::{CduButton, CduProfile, CduUnit, Watch};
use crate::datarefs::DatarefStore;
use crate::profiles::{level, num, on};
use crate::xplm_shim::CommandPhase;

const MARKER: &str = "Rotate/aircraft/controls/cdu_0/mcdu_line_0_content";

const SCREEN_BRIGHTNESS: &str = "Rotate/aircraft/controls/mcdu_1_brt";
const PANEL_LIGHTS: &str      = "Rotate/aircraft/controls/instr_panel_lts";
const AC_BUS_1: &str          = "Rotate/aircraft/systems/elec_ac_bus_1_pwrd";
const EMER_AC_BUS: &str       = "Rotate/aircraft/systems/elec_emer_ac_bus_l_pwrd";
const MSG_LIGHT: &str         = "Rotate/aircraft/systems/mcdu_msg_lt";

const KEY_PREFIX: &str = "Rotate/aircraft/controls_c/cdu_0/mcdu_key_";

/// Style code of small text; also used where a cell has no style entry.
const SMALL_STYLE: u8 = 4;

// Control codes the arrows are folded into before drawing.
const LEFT_ARROW: u8  = 28;
const RIGHT_ARROW: u8 = 29;
const UP_ARROW: u8    = 30;
const DOWN_ARROW: u8  = 31;

fn content_ref(line: usize) -> String {
    format!("Rotate/aircraft/controls/cdu_0/mcdu_line_{line}_content")
}

fn style_ref(line: usize) -> String {
    format!("Rotate/aircraft/controls/cdu_0/mcdu_line_{line}_style")
}

/// Replace the UTF-8 arrows with single control codes and drop every other
/// multibyte sequence, so one byte is one screen column.
fn fold_arrows(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let c = input[i];
        if c == 0xE2 && i + 2 < input.len() {
            if input[i + 1] == 0x86 {
                match input[i + 2] {
                    0x90 => out.push(LEFT_ARROW),
                    0x92 => out.push(RIGHT_ARROW),
                    0x91 => out.push(UP_ARROW),
                    0x93 => out.push(DOWN_ARROW),
                    _ => {}
                }
            }
            i += 3;
        } else if c >= 0x80 {
            i += match c {
                _ if c & 0xE0 == 0xC0 => 2,
                _ if c & 0xF0 == 0xE0 => 3,
                _ if c & 0xF8 == 0xF0 => 4,
                _ => 1,
            };
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Flags positions of `range` that sit in a run of two or more spaces.
fn wide_gaps(content: &[u8], range: Range<usize>) -> Vec<bool> {
    let mut gaps = vec![false; range.len()];
    let mut pos = range.start;
    while pos < range.end {
        if content[pos] != b' ' {
            pos += 1;
            continue;
        }
        let run_start = pos;
        while pos < range.end && content[pos] == b' ' {
            pos += 1;
        }
        if pos - run_start >= 2 {
            gaps[run_start - range.start..pos - range.start].fill(true);
        }
    }
    gaps
}

/// Style index for each content position.
///
/// The style array has no entries for wide gaps between fields. The last
/// field on the line takes the tail of the array and everything before it
/// takes the head.
fn style_positions(content: &[u8], style_len: usize) -> Vec<Option<usize>> {
    let mut map = vec![None; content.len()];

    let blank = |c: u8| c == b' ' || c == 0;
    let end = match content.iter().rposition(|&c| !blank(c)) {
        Some(last) if content.len() - last - 1 == 1 => last + 2,
        Some(last) => last + 1,
        None => content.len(),
    };
    let start = (1..end)
        .rev()
        .find(|&i| content[i] == b' ' && content[i - 1] == b' ')
        .map_or(0, |i| i + 1);

    let tail = wide_gaps(content, start..end);
    let needed = tail.iter().filter(|gap| !**gap).count();
    if needed > 0 && needed <= style_len {
        let mut idx = style_len - needed;
        for (k, gap) in tail.iter().enumerate() {
            if !gap {
                map[start + k] = Some(idx);
                idx += 1;
            }
        }
    }

    let mut idx = 0;
    for (pos, gap) in wide_gaps(content, 0..start).into_iter().enumerate() {
        if !gap {
            map[pos] = Some(idx);
            idx += 1;
        }
    }
    map
}

pub struct RotateMd11CduProfile {
    datarefs: Vec<String>,
    buttons:  Vec<CduButton>,
    leds:     Watch,
}

impl RotateMd11CduProfile {
    pub fn is_eligible(store: &DatarefStore) -> bool {
        store.exists(MARKER)
    }

    pub fn boxed(unit: CduUnit) -> Box<dyn CduProfile> {
        Box::new(Self::new(unit))
    }

    /// The MD-11 exposes a single CDU, whichever seat the unit is set to.
    pub fn new(_unit: CduUnit) -> Self {
        let datarefs = (0..CDU_ROWS).flat_map(|line| [content_ref(line), style_ref(line)]).collect();
        Self { datarefs, buttons: buttons(), leds: Watch::new() }
    }
}

fn buttons() -> Vec<CduButton> {
    use CduKey::*;
    let k = |keys: &[CduKey], suffix: &str| CduButton::new(keys, format!("{KEY_PREFIX}{suffix}"));
    let mut out = vec![
        k(&[Lsk1L], "FL1"),
        k(&[Lsk2L], "FL2"),
        k(&[Lsk3L], "FL3"),
        k(&[Lsk4L], "FL4"),
        k(&[Lsk5L], "FL5"),
        k(&[Lsk6L], "FL6"),
        k(&[Lsk1R], "FR1"),
        k(&[Lsk2R], "FR2"),
        k(&[Lsk3R], "FR3"),
        k(&[Lsk4R], "FR4"),
        k(&[Lsk5R], "FR5"),
        k(&[Lsk6R], "FR6"),

        k(&[McduDir, PfpLegs], "DIR"),
        k(&[Prog], "PROG"),
        k(&[McduPerf, Pfp3N1Limit], "PERF"),
        k(&[McduInit, PfpInitRef], "INIT"),
        k(&[McduInit, PfpHold], "REF"),
        k(&[McduFpln, PfpRoute], "FPLN"),
        k(&[McduRadNav, Pfp4NavRad, Pfp7NavRad], "NAVRAD"),
        k(&[McduSecFpln], "SECFPLN"),
        k(&[PfpDepArr, McduAirport], "TOAPPR"),
        k(&[Menu], "MENU"),
        k(&[PfpFix, McduEmptyBottomLeft], "FIX"),
        k(&[McduEmptyTopRight], "ENGOUT"),

        k(&[McduPageUp, PagePrev], "DOWN"),
        k(&[McduPageDown, PageNext], "UP"),
        k(&[PfpExec], "PAGE"),

        CduButton::new(&[BrightnessUp], "Rotate/aircraft/controls_c/mcdu_1_brt_up"),
        CduButton::new(&[BrightnessDown], "Rotate/aircraft/controls_c/mcdu_1_brt_dn"),
    ];
    let digits = [Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9];
    for (n, key) in digits.into_iter().enumerate() {
        out.push(k(&[key], &n.to_string()));
    }
    out.extend([k(&[Period], "POINT"), k(&[PlusMinus], "PLUS"), k(&[PfpDel], "MINUS")]);
    let letters = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
        KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];
    for (key, letter) in letters.into_iter().zip('A'..='Z') {
        out.push(k(&[key], &letter.to_string()));
    }
    out.extend([
        k(&[Space], "SPC"),
        k(&[Slash], "BAR"),
        k(&[Clr], "CLR"),
        k(&[McduOverfly], "PLUS"),
    ]);
    out
}

impl CduProfile for RotateMd11CduProfile {
    fn name(&self) -> &'static str {
        "Rotate MD-11"
    }

    fn display_datarefs(&self) -> &[String] {
        &self.datarefs
    }

    fn buttons(&self) -> &[CduButton] {
        &self.buttons
    }

    fn color(&self, _code: u8) -> u16 {
        color::GREEN
    }

    fn glyph(&self, ch: u8, _small: bool, out: &mut Vec<u8>) {
        match ch {
            b'$' => out.extend_from_slice(glyph::OUTLINED_SQUARE),
            b'`' => out.extend_from_slice(glyph::DEGREES),
            LEFT_ARROW => out.extend_from_slice(glyph::ARROW_LEFT),
            RIGHT_ARROW => out.extend_from_slice(glyph::ARROW_RIGHT),
            UP_ARROW => out.extend_from_slice(glyph::ARROW_UP),
            DOWN_ARROW => out.extend_from_slice(glyph::ARROW_DOWN),
            c => out.push(c),
        }
    }

    fn update_page(&self, store: &DatarefStore, page: &mut CduPage) {
        *page = CduPage::new();
        for line in 0..CDU_ROWS {
            let raw = store.get_cached::<Vec<u8>>(&content_ref(line)).unwrap_or_default();
            if raw.iter().all(|&c| c == 0) {
                continue;
            }
            let content = fold_arrows(&raw);
            let mut style = store.get_cached::<Vec<u8>>(&style_ref(line)).unwrap_or_default();
            if let Some(nul) = style.iter().position(|&c| c == 0) {
                style.truncate(nul);
            }
            let map = style_positions(&content, style.len());

            for (pos, &c) in content.iter().enumerate().take(CDU_COLUMNS) {
                if c == 0 {
                    continue;
                }
                let code = map[pos].and_then(|i| style.get(i)).copied().unwrap_or(SMALL_STYLE);
                page.put(line, pos, c, b'g', code == SMALL_STYLE);
            }
        }
    }

    fn start(&mut self, store: &DatarefStore) {
        self.leds.add::<f32>(store, SCREEN_BRIGHTNESS);
        self.leds.add::<f32>(store, PANEL_LIGHTS);
        self.leds.add::<f32>(store, AC_BUS_1);
        self.leds.add::<f32>(store, EMER_AC_BUS);
        self.leds.add::<Vec<i32>>(store, MSG_LIGHT);
    }

    fn stop(&mut self, store: &DatarefStore) {
        self.leds.clear(store);
    }

    fn take_leds(&mut self, store: &DatarefStore) -> Option<Vec<(CduLed, u8)>> {
        if !self.leds.take() {
            return None;
        }
        let powered = on(store, AC_BUS_1) || on(store, EMER_AC_BUS);
        let lit = |name: &str| if powered { level(num(store, name)) } else { 0 };
        let msg = store
            .get_cached::<Vec<i32>>(MSG_LIGHT)
            .and_then(|v| v.first().copied())
            .is_some_and(|v| v > 0);
        Some(vec![
            (CduLed::ScreenBacklight, lit(SCREEN_BRIGHTNESS)),
            (CduLed::Backlight, lit(PANEL_LIGHTS)),
            (CduLed::PfpMsg, u8::from(msg)),
            (CduLed::McduMcdu, u8::from(msg)),
        ])
    }

    /// The MD-11 keys act on press and release only.
    fn button_pressed(&mut self, store: &DatarefStore, button: &CduButton, phase: CommandPhase) {
        if phase != CommandPhase::Continue {
            store.execute_command(&button.command, phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::find_button;
    use super::*;
    use crate::xplm_shim::DataRefValue;
    use winwing_protocol::cdu::{CduHardware, CduVariant};

    fn profile() -> RotateMd11CduProfile {
        RotateMd11CduProfile::new(CduUnit { hardware: CduHardware::Pfp7, variant: CduVariant::Captain })
    }

    #[test]
    fn arrows_fold_and_other_multibyte_is_dropped() {
        let input = [b'A', 0xE2, 0x86, 0x90, b'B', 0xE2, 0x86, 0x93, 0xC2, 0xB0, b'C', 0xE2, 0x86, 0x80, b'D'];
        assert_eq!(fold_arrows(&input), vec![b'A', LEFT_ARROW, b'B', DOWN_ARROW, b'C', b'D']);
    }

    #[test]
    fn last_field_takes_the_end_of_the_style() {
        let map = style_positions(b"ABC  DEF", 6);
        let expected = [Some(0), Some(1), Some(2), None, None, Some(3), Some(4), Some(5)];
        assert_eq!(map, expected);

        assert_eq!(style_positions(b"HELLO", 5), vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(style_positions(b"HELLO", 2)[4], None, "short style leaves the last field unmapped");
    }

    #[test]
    fn page_sizes_cells_from_style_codes() {
        let (mock, store) = make_mock();
        set_text(&mock, &content_ref(0), b"ABC  DEF");
        set_text(&mock, &style_ref(0), &[4, 4, 4, 1, 1, 1]);
        set_text(&mock, &content_ref(3), &[b'X', 0xE2, 0x86, 0x92]);
        let mut page = CduPage::new();
        profile().update_page(&store, &mut page);

        assert_eq!(page.row_text(0), format!("{:<24}", "ABC  DEF"));
        assert_eq!(page.cell(0, 0).map(|c| (c.small, c.color)), Some((true, b'g')));
        assert_eq!(page.cell(0, 7).map(|c| c.small), Some(false));
        assert_eq!(page.cell(3, 1).map(|c| (c.ch, c.small)), Some((RIGHT_ARROW, true)), "no style means small");

        let mut out = Vec::new();
        profile().glyph(RIGHT_ARROW, true, &mut out);
        assert_eq!(out, glyph::ARROW_RIGHT);
    }

    #[test]
    fn lights_need_either_ac_bus() {
        let (mock, store) = make_mock();
        set_float(&mock, SCREEN_BRIGHTNESS, 1.0);
        set_float(&mock, PANEL_LIGHTS, 0.2);
        set_int(&mock, AC_BUS_1, 0);
        set_int(&mock, EMER_AC_BUS, 0);
        mock.set_dataref(MSG_LIGHT, DataRefValue::IntArray(vec![1, 0]));
        let mut p = profile();
        p.start(&store);

        let leds = p.take_leds(&store).unwrap_or_default();
        assert_eq!(led(&leds, CduLed::ScreenBacklight), Some(0));
        assert_eq!(led(&leds, CduLed::PfpMsg), Some(1), "message light ignores power");

        set_int(&mock, EMER_AC_BUS, 1);
        store.update();
        let leds = p.take_leds(&store).unwrap_or_default();
        assert_eq!(led(&leds, CduLed::ScreenBacklight), Some(255));
        assert_eq!(led(&leds, CduLed::Backlight), Some(51));
        p.stop(&store);
    }

    #[test]
    fn keys_skip_the_continue_phase() {
        let (mock, store) = make_mock();
        mock.add_command("Rotate/aircraft/controls_c/cdu_0/mcdu_key_REF");
        let mut p = profile();
        let Some(button) = find_button(p.buttons(), CduKey::PfpHold).cloned() else { panic!("HOLD missing") };
        for phase in [CommandPhase::Begin, CommandPhase::Continue, CommandPhase::End] {
            p.button_pressed(&store, &button, phase);
        }
        assert_eq!(count_calls(&mock, "Rotate/aircraft/controls_c/cdu_0/mcdu_key_REF"), 2);
        assert_eq!(
            find_button(p.buttons(), CduKey::McduInit).map(|b| b.command.as_str()),
            Some("Rotate/aircraft/controls_c/cdu_0/mcdu_key_INIT"),
            "INIT listed before REF"
        );
    }
}
