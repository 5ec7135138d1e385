//! PAP3 LCD segment compositor.
//!
//! The LCD is driven by a 32-byte payload covering absolute frame offsets
//! 0x19..=0x38. Every 7-segment digit is spread over seven bytes (one per
//! segment) and identified by a single bit inside each of those bytes, so one
//! group of seven offsets carries up to eight digits:
//! ```text
//!        G0    G1    G2    G3      segment
//! mid    0x1D  0x1E  0x1F  0x20    G
//! topL   0x21  0x22  0x23  0x24    F
//! botL   0x25  0x26  0x27  0x28    E
//! bot    0x29  0x2A  0x2B  0x2C    D
//! botR   0x2D  0x2E  0x2F  0x30    C
//! topR   0x31  0x32  0x33  0x34    B
//! top    0x35  0x36  0x37  0x38    A
//! ```
//! Spare bits in those bytes (and 0x19..=0x1C) hold dots, labels and signs.
//!
//! [`compose`] always starts from an all-zero buffer; it never reads the
//! previous payload.

use winwing_state::{LcdDisplayConfig, Pap3State};

use crate::pap3::LCD_PAYLOAD_LEN;

pub type Payload = [u8; LCD_PAYLOAD_LEN];

const BASE: u8 = 0x19;

// ── Digit groups ──────────────────────────────────────────────────────────────

/// Absolute offsets of the seven segments of one digit group, device order.
#[derive(Debug, Clone, Copy)]
pub struct Group {
    pub mid:   u8,
    pub top_l: u8,
    pub bot_l: u8,
    pub bot:   u8,
    pub bot_r: u8,
    pub top_r: u8,
    pub top:   u8,
}

impl Group {
    const fn at(first: u8) -> Self {
        Group {
            mid:   first,
            top_l: first + 0x04,
            bot_l: first + 0x08,
            bot:   first + 0x0C,
            bot_r: first + 0x10,
            top_r: first + 0x14,
            top:   first + 0x18,
        }
    }

    /// `(offset, logical segment bit)` pairs, A = bit 0 … G = bit 6.
    fn segments(&self) -> [(u8, u8); 7] {
        [
            (self.top,   SEG_A),
            (self.top_r, SEG_B),
            (self.bot_r, SEG_C),
            (self.bot,   SEG_D),
            (self.bot_l, SEG_E),
            (self.top_l, SEG_F),
            (self.mid,   SEG_G),
        ]
    }
}

pub const G0: Group = Group::at(0x1D);
pub const G1: Group = Group::at(0x1E);
pub const G2: Group = Group::at(0x1F);
pub const G3: Group = Group::at(0x20);

// G0
pub const SPD_UNITS: u8        = 0x01;
pub const SPD_TENS: u8         = 0x02;
pub const SPD_HUNDREDS: u8     = 0x04;
pub const SPD_KILO: u8         = 0x08;
pub const CPT_CRS_UNITS: u8    = 0x20;
pub const CPT_CRS_TENS: u8     = 0x40;
pub const CPT_CRS_HUNDREDS: u8 = 0x80;
// G1
pub const ALT_HUNDREDS: u8  = 0x01;
pub const ALT_KILO: u8      = 0x02;
pub const ALT_TENS_KILO: u8 = 0x04;
pub const HDG_UNITS: u8     = 0x10;
pub const HDG_TENS: u8      = 0x20;
pub const HDG_HUNDREDS: u8  = 0x40;
// G2
pub const VSPD_UNITS: u8    = 0x01;
pub const VSPD_TENS: u8     = 0x02;
pub const VSPD_HUNDREDS: u8 = 0x04;
pub const VSPD_KILO: u8     = 0x08;
pub const ALT_UNITS: u8     = 0x40;
pub const ALT_TENS: u8      = 0x80;
// G3
pub const FO_CRS_UNITS: u8    = 0x10;
pub const FO_CRS_TENS: u8     = 0x20;
pub const FO_CRS_HUNDREDS: u8 = 0x40;

// ── Flags: (absolute offset, bit) ────────────────────────────────────────────

pub type Flag = (u8, u8);

pub const DOT_SPD: Flag     = (0x19, 0x04);
pub const DOT_CPT_CRS: Flag = (0x19, 0x20);
pub const DOT_HDG: Flag     = (0x26, 0x08);
pub const DOT_ALT: Flag     = (0x1A, 0x01);
pub const DOT_VSPD: Flag    = (0x1B, 0x04);
pub const DOT_FO_CRS: Flag  = (0x1C, 0x10);

pub const SPD_BAR_BOTTOM: Flag = (0x1E, 0x80);
pub const SPD_BAR_TOP: Flag    = (0x22, 0x80);
pub const VSPD_MINUS: Flag     = (0x1F, 0x10);
pub const VSPD_PLUS_BOT: Flag  = (0x28, 0x80);
pub const VSPD_PLUS_TOP: Flag  = (0x2C, 0x80);

pub const LBL_FPA: Flag    = (0x34, 0x80);
pub const LBL_VS: Flag     = (0x38, 0x80);
pub const LBL_HDG_L: Flag  = (0x36, 0x08);
pub const LBL_HDG_R: Flag  = (0x32, 0x08);
pub const LBL_TRK_L: Flag  = (0x2E, 0x08);
pub const LBL_TRK_R: Flag  = (0x2A, 0x08);
pub const LBL_IAS: Flag    = (0x36, 0x80);
pub const LBL_MACH_L: Flag = (0x32, 0x80);
pub const LBL_MACH_R: Flag = (0x2E, 0x80);

// ── Glyphs ────────────────────────────────────────────────────────────────────

const SEG_A: u8 = 0x01;
const SEG_B: u8 = 0x02;
const SEG_C: u8 = 0x04;
const SEG_D: u8 = 0x08;
const SEG_E: u8 = 0x10;
const SEG_F: u8 = 0x20;
const SEG_G: u8 = 0x40;

const DIGITS: [u8; 10] = [
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F,         // 0
    SEG_B | SEG_C,                                         // 1
    SEG_A | SEG_B | SEG_G | SEG_E | SEG_D,                 // 2
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_G,                 // 3
    SEG_F | SEG_G | SEG_B | SEG_C,                         // 4
    SEG_A | SEG_F | SEG_G | SEG_C | SEG_D,                 // 5
    SEG_A | SEG_F | SEG_E | SEG_D | SEG_C | SEG_G,         // 6
    SEG_A | SEG_B | SEG_C,                                 // 7
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G, // 8
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_F | SEG_G,         // 9
];
const LETTER_A: u8 = SEG_A | SEG_B | SEG_C | SEG_E | SEG_F | SEG_G;
const DASH: u8     = SEG_G;

// ── Primitives ────────────────────────────────────────────────────────────────

/// OR `mask` into the byte at absolute offset `abs`; out-of-range is ignored.
pub fn set_flag(p: &mut Payload, flag: Flag, enable: bool) {
    let (abs, mask) = flag;
    if !enable || abs < BASE {
        return;
    }
    if let Some(b) = p.get_mut((abs - BASE) as usize) {
        *b |= mask;
    }
}

fn draw_glyph(group: &Group, p: &mut Payload, bit: u8, glyph: u8) {
    for (offset, seg) in group.segments() {
        set_flag(p, (offset, bit), glyph & seg != 0);
    }
}

pub fn draw_digit(group: &Group, p: &mut Payload, bit: u8, digit: u8) {
    draw_glyph(group, p, bit, DIGITS[(digit % 10) as usize]);
}

pub fn draw_letter_a(group: &Group, p: &mut Payload, bit: u8) {
    draw_glyph(group, p, bit, LETTER_A);
}

pub fn draw_dash(group: &Group, p: &mut Payload, bit: u8) {
    draw_glyph(group, p, bit, DASH);
}

/// Read back the glyph at one digit position: a digit, `'A'`, `'-'`, `'?'`
/// for an unknown pattern, or `None` when blank.
pub fn read_glyph(group: &Group, p: &Payload, bit: u8) -> Option<char> {
    let mut glyph = 0u8;
    for (offset, seg) in group.segments() {
        if is_set(p, (offset, bit)) {
            glyph |= seg;
        }
    }
    match glyph {
        0 => None,
        DASH => Some('-'),
        LETTER_A => Some('A'),
        g => Some(
            DIGITS
                .iter()
                .position(|&d| d == g)
                .and_then(|d| char::from_digit(d as u32, 10))
                .unwrap_or('?'),
        ),
    }
}

pub fn is_set(p: &Payload, flag: Flag) -> bool {
    let (abs, mask) = flag;
    abs >= BASE && p.get((abs - BASE) as usize).is_some_and(|b| b & mask != 0)
}

fn digits<const N: usize>(value: i32) -> [u8; N] {
    let mut out = [0u8; N];
    let mut v = value.max(0);
    for slot in out.iter_mut().rev() {
        *slot = (v % 10) as u8;
        v /= 10;
    }
    out
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Everything the compositor needs for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub spd:      f32,
    pub show_spd: bool,
    pub hdg:      i32,
    pub alt:      i32,
    pub vvi:      i32,
    pub show_vvi: bool,
    pub crs_capt: i32,
    pub show_crs_capt: bool,
    pub crs_fo:   i32,
    pub show_crs_fo: bool,
    pub digit_a:  bool,
    pub digit_b:  bool,

    pub spd_bar_top: bool,
    pub spd_bar_bot: bool,

    pub lbl_ias: bool,
    pub lbl_hdg: bool,
    pub lbl_trk: bool,
    pub lbl_vs:  bool,
    pub lbl_fpa: bool,

    pub dot_spd:      bool,
    pub dot_hdg:      bool,
    pub dot_alt:      bool,
    pub dot_vvi:      bool,
    pub dot_crs_capt: bool,
    pub dot_crs_fo:   bool,
}

fn round_half_up(x: f32) -> i32 {
    (x + 0.5).floor() as i32
}

/// Build the 32-byte LCD payload for one snapshot.
pub fn compose(s: &Snapshot) -> Payload {
    let mut p = [0u8; LCD_PAYLOAD_LEN];

    if s.show_spd {
        compose_speed(s, &mut p);
    }

    if s.show_crs_capt {
        let [h, t, u] = digits::<3>(s.crs_capt.min(999));
        draw_digit(&G0, &mut p, CPT_CRS_HUNDREDS, h);
        draw_digit(&G0, &mut p, CPT_CRS_TENS, t);
        draw_digit(&G0, &mut p, CPT_CRS_UNITS, u);
        set_flag(&mut p, DOT_CPT_CRS, s.dot_crs_capt);
    }

    // Heading is always drawn; 360 and beyond wrap.
    let [h, t, u] = digits::<3>(s.hdg.rem_euclid(360));
    draw_digit(&G1, &mut p, HDG_HUNDREDS, h);
    draw_digit(&G1, &mut p, HDG_TENS, t);
    draw_digit(&G1, &mut p, HDG_UNITS, u);
    set_flag(&mut p, DOT_HDG, s.dot_hdg);
    set_flag(&mut p, LBL_HDG_L, s.lbl_hdg);
    set_flag(&mut p, LBL_HDG_R, s.lbl_hdg);
    set_flag(&mut p, LBL_TRK_L, s.lbl_trk);
    set_flag(&mut p, LBL_TRK_R, s.lbl_trk);

    // Altitude: ten-thousands only when non-zero; kilo always once
    // ten-thousands shows, otherwise only when something below is non-zero.
    let [d10k, dk, dh, dt, du] = digits::<5>(s.alt.clamp(0, 99_999));
    let show_10k = d10k != 0;
    let any_lower = dk != 0 || dh != 0 || dt != 0 || du != 0;
    if show_10k {
        draw_digit(&G1, &mut p, ALT_TENS_KILO, d10k);
    }
    if show_10k || any_lower {
        draw_digit(&G1, &mut p, ALT_KILO, dk);
    }
    draw_digit(&G1, &mut p, ALT_HUNDREDS, dh);
    draw_digit(&G2, &mut p, ALT_TENS, dt);
    draw_digit(&G2, &mut p, ALT_UNITS, du);
    set_flag(&mut p, DOT_ALT, s.dot_alt);

    if s.show_vvi {
        let abs = s.vvi.unsigned_abs().min(9999) as i32;
        let [k, h, t, u] = digits::<4>(abs);
        if abs >= 1000 {
            draw_digit(&G2, &mut p, VSPD_KILO, k);
        }
        if abs >= 100 {
            draw_digit(&G2, &mut p, VSPD_HUNDREDS, h);
        }
        if abs >= 10 {
            draw_digit(&G2, &mut p, VSPD_TENS, t);
        }
        draw_digit(&G2, &mut p, VSPD_UNITS, u);
        set_flag(&mut p, VSPD_MINUS, s.vvi != 0);
        set_flag(&mut p, VSPD_PLUS_TOP, s.vvi > 0);
        set_flag(&mut p, VSPD_PLUS_BOT, s.vvi > 0);
        set_flag(&mut p, DOT_VSPD, s.dot_vvi);
        set_flag(&mut p, LBL_VS, s.lbl_vs);
        set_flag(&mut p, LBL_FPA, s.lbl_fpa);
    }

    if s.show_crs_fo {
        let [h, t, u] = digits::<3>(s.crs_fo.min(999));
        draw_digit(&G3, &mut p, FO_CRS_HUNDREDS, h);
        draw_digit(&G3, &mut p, FO_CRS_TENS, t);
        draw_digit(&G3, &mut p, FO_CRS_UNITS, u);
        set_flag(&mut p, DOT_FO_CRS, s.dot_crs_fo);
    }

    p
}

fn compose_speed(s: &Snapshot, p: &mut Payload) {
    // Below 100 the value is Mach, either 0.xx or the ×100 convention.
    let is_mach = s.spd < 100.0;
    if is_mach {
        let raw = if s.spd < 1.0 { s.spd } else { s.spd / 100.0 };
        let mach = raw.clamp(0.0, 0.9999);
        let two = round_half_up(mach * 100.0).clamp(0, 99);
        draw_digit(&G0, p, SPD_TENS, (two / 10) as u8);
        draw_digit(&G0, p, SPD_UNITS, (two % 10) as u8);
        set_flag(p, LBL_MACH_L, s.lbl_ias);
        set_flag(p, LBL_MACH_R, s.lbl_ias);
        set_flag(p, DOT_SPD, true);
    } else {
        let ias = round_half_up(s.spd).clamp(0, 9999);
        let [k, h, t, u] = digits::<4>(ias);
        if k != 0 || h != 0 {
            draw_digit(&G0, p, SPD_HUNDREDS, h);
        }
        draw_digit(&G0, p, SPD_TENS, t);
        draw_digit(&G0, p, SPD_UNITS, u);
        set_flag(p, LBL_IAS, s.lbl_ias);
        if s.digit_a {
            draw_letter_a(&G0, p, SPD_KILO);
        }
        if s.digit_b {
            draw_digit(&G0, p, SPD_KILO, 8);
        }
    }
    set_flag(p, SPD_BAR_TOP, s.spd_bar_top);
    set_flag(p, SPD_BAR_BOTTOM, s.spd_bar_bot);
}

pub fn draw_spd_dashes(p: &mut Payload) {
    for bit in [SPD_HUNDREDS, SPD_TENS, SPD_UNITS] {
        draw_dash(&G0, p, bit);
    }
}

pub fn draw_hdg_dashes(p: &mut Payload) {
    for bit in [HDG_HUNDREDS, HDG_TENS, HDG_UNITS] {
        draw_dash(&G1, p, bit);
    }
}

pub fn draw_vvi_dashes(p: &mut Payload) {
    for bit in [VSPD_KILO, VSPD_HUNDREDS, VSPD_TENS, VSPD_UNITS] {
        draw_dash(&G2, p, bit);
    }
}

/// Device-side rendering of a profile state: labels and dashes follow the
/// profile's display configuration, dots are never lit.
pub fn render_state(st: &Pap3State, cfg: &LcdDisplayConfig) -> Payload {
    let label = |visible: bool| cfg.show_labels || (cfg.show_labels_when_inactive && !visible);
    let s = Snapshot {
        spd:           st.spd,
        show_spd:      st.spd_visible,
        hdg:           st.hdg,
        alt:           st.alt,
        vvi:           st.vvi as i32,
        show_vvi:      st.vvi_visible,
        crs_capt:      st.crs_capt,
        show_crs_capt: st.crs_visible,
        crs_fo:        st.crs_fo,
        show_crs_fo:   st.crs_visible,
        digit_a:       st.digit_a,
        digit_b:       st.digit_b,
        lbl_ias:       label(st.spd_visible),
        lbl_hdg:       label(st.hdg_visible),
        lbl_vs:        label(st.vvi_visible),
        ..Snapshot::default()
    };

    let mut p = compose(&s);
    if cfg.show_dashes_when_inactive {
        if !st.spd_visible {
            draw_spd_dashes(&mut p);
        }
        if !st.hdg_visible {
            draw_hdg_dashes(&mut p);
        }
        if !st.vvi_visible {
            draw_vvi_dashes(&mut p);
        }
    }
    p
}

/// Human-readable summary of the windows in a payload, e.g.
/// `SPD  250 | HDG 001 | ALT 12000 | V/S -1500 | CRS 090/270`.
pub fn describe(p: &Payload) -> String {
    let window = |group: &Group, bits: &[u8]| -> String {
        bits.iter().map(|&b| read_glyph(group, p, b).unwrap_or(' ')).collect()
    };
    let spd = window(&G0, &[SPD_KILO, SPD_HUNDREDS, SPD_TENS, SPD_UNITS]);
    let hdg = window(&G1, &[HDG_HUNDREDS, HDG_TENS, HDG_UNITS]);
    let alt_hi = window(&G1, &[ALT_TENS_KILO, ALT_KILO, ALT_HUNDREDS]);
    let alt_lo = window(&G2, &[ALT_TENS, ALT_UNITS]);
    let vs = window(&G2, &[VSPD_KILO, VSPD_HUNDREDS, VSPD_TENS, VSPD_UNITS]);
    let sign = if is_set(p, VSPD_PLUS_TOP) {
        '+'
    } else if is_set(p, VSPD_MINUS) {
        '-'
    } else {
        ' '
    };
    let crs_c = window(&G0, &[CPT_CRS_HUNDREDS, CPT_CRS_TENS, CPT_CRS_UNITS]);
    let crs_f = window(&G3, &[FO_CRS_HUNDREDS, FO_CRS_TENS, FO_CRS_UNITS]);
    format!("SPD {spd} | HDG {hdg} | ALT {alt_hi}{alt_lo} | V/S {sign}{vs} | CRS {crs_c}/{crs_f}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(p: &Payload, group: &Group, bits: &[u8]) -> String {
        bits.iter().map(|&b| read_glyph(group, p, b).unwrap_or(' ')).collect()
    }

    fn base() -> Snapshot {
        Snapshot { show_spd: true, show_vvi: true, ..Default::default() }
    }

    #[test]
    fn group_offsets_match_wire_layout() {
        assert_eq!((G0.mid, G0.top), (0x1D, 0x35));
        assert_eq!((G3.mid, G3.top), (0x20, 0x38));
        assert_eq!(G2.bot_r, 0x2F);
    }

    #[test]
    fn mach_conventions_render_identically() {
        let a = compose(&Snapshot { spd: 0.786, ..base() });
        let b = compose(&Snapshot { spd: 78.6, ..base() });
        assert_eq!(text(&a, &G0, &[SPD_TENS, SPD_UNITS]), "79");
        assert_eq!(a, b);
        assert!(is_set(&a, DOT_SPD));
    }

    #[test]
    fn ias_suppresses_leading_hundreds_only_when_zero() {
        let p = compose(&Snapshot { spd: 250.4, ..base() });
        assert_eq!(text(&p, &G0, &[SPD_HUNDREDS, SPD_TENS, SPD_UNITS]), "250");
        assert!(!is_set(&p, DOT_SPD));

        let p = compose(&Snapshot { spd: 100.0, digit_a: true, ..base() });
        assert_eq!(text(&p, &G0, &[SPD_KILO, SPD_HUNDREDS]), "A1");
    }

    #[test]
    fn heading_361_wraps_to_001() {
        let p = compose(&Snapshot { hdg: 361, ..base() });
        assert_eq!(text(&p, &G1, &[HDG_HUNDREDS, HDG_TENS, HDG_UNITS]), "001");
    }

    #[test]
    fn negative_vertical_speed_sets_minus_only() {
        let p = compose(&Snapshot { vvi: -1500, ..base() });
        assert_eq!(text(&p, &G2, &[VSPD_KILO, VSPD_HUNDREDS, VSPD_TENS, VSPD_UNITS]), "1500");
        assert!(is_set(&p, VSPD_MINUS));
        assert!(!is_set(&p, VSPD_PLUS_TOP));
        assert!(!is_set(&p, VSPD_PLUS_BOT));
    }

    #[test]
    fn small_vertical_speed_suppresses_leading_digits() {
        let p = compose(&Snapshot { vvi: 50, ..base() });
        assert_eq!(text(&p, &G2, &[VSPD_KILO, VSPD_HUNDREDS, VSPD_TENS, VSPD_UNITS]), "  50");
        assert!(is_set(&p, VSPD_PLUS_TOP) && is_set(&p, VSPD_MINUS));

        let p = compose(&Snapshot { vvi: 0, ..base() });
        assert_eq!(text(&p, &G2, &[VSPD_TENS, VSPD_UNITS]), " 0");
        assert!(!is_set(&p, VSPD_MINUS));
    }

    #[test]
    fn altitude_suppression_rules() {
        let alt = |v: i32| {
            let p = compose(&Snapshot { alt: v, ..base() });
            format!(
                "{}{}",
                text(&p, &G1, &[ALT_TENS_KILO, ALT_KILO, ALT_HUNDREDS]),
                text(&p, &G2, &[ALT_TENS, ALT_UNITS])
            )
        };
        assert_eq!(alt(40300), "40300");
        assert_eq!(alt(5000), " 5000");
        assert_eq!(alt(0), "  000");
        assert_eq!(alt(250_000), "99999");
        assert_eq!(alt(-20), "  000");
    }

    #[test]
    fn altitude_rendering_is_idempotent() {
        for v in [0, 7, 100, 999, 1000, 10_000, 12_345, 40_300, 99_999] {
            let p1 = compose(&Snapshot { alt: v, ..base() });
            let shown: String = format!(
                "{}{}",
                text(&p1, &G1, &[ALT_TENS_KILO, ALT_KILO, ALT_HUNDREDS]),
                text(&p1, &G2, &[ALT_TENS, ALT_UNITS])
            );
            let back: i32 = shown.trim().parse().unwrap();
            let p2 = compose(&Snapshot { alt: back, ..base() });
            assert_eq!(p1, p2, "altitude {v} did not round-trip");
        }
    }

    #[test]
    fn inactive_windows_get_dashes_and_labels() {
        let st = Pap3State { spd_visible: false, vvi_visible: false, hdg: 90, ..Default::default() };
        let cfg = LcdDisplayConfig {
            show_labels: false,
            show_labels_when_inactive: true,
            show_dashes_when_inactive: true,
        };
        let p = render_state(&st, &cfg);
        assert_eq!(text(&p, &G0, &[SPD_HUNDREDS, SPD_TENS, SPD_UNITS]), "---");
        assert_eq!(text(&p, &G2, &[VSPD_KILO, VSPD_HUNDREDS, VSPD_TENS, VSPD_UNITS]), "----");
        assert!(!is_set(&p, LBL_HDG_L), "visible heading gets no label");
        assert!(!is_set(&p, DOT_HDG));
        assert!(describe(&p).contains("HDG 090"));
    }

    #[test]
    fn compose_never_depends_on_previous_output() {
        let busy = compose(&Snapshot { spd: 888.0, alt: 88_888, vvi: 8888, hdg: 888, ..base() });
        assert_ne!(busy, [0u8; LCD_PAYLOAD_LEN]);
        let calm = compose(&Snapshot { show_spd: false, show_vvi: false, ..Default::default() });
        assert_eq!(text(&calm, &G0, &[SPD_TENS]), " ");
    }
}
