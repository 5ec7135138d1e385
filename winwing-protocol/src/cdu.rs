//! CDU / MCDU page, LED and key encoding.
//!
//! A page is streamed as one record per cell, row-major:
//! ```text
//! [color lo] [color hi] [glyph bytes…]      glyph = ASCII or UTF-8 symbol
//! ```
//! with the small font selected by adding 0x016B to the colour word. The
//! stream is cut into 63-byte chunks, each sent as a 64-byte report with
//! leading byte 0xF2.

use winwing_state::{CduPage, CDU_COLUMNS, CDU_ROWS};

use crate::{write_to, ReportSink};

pub const REPORT_LEN: usize  = 64;
const PAGE_REPORT_ID: u8     = 0xF2;
const SMALL_FONT_OFFSET: u16 = 0x016B;

// ── Hardware identification ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CduHardware {
    Mcdu,
    Pfp3n,
    Pfp4,
    Pfp7,
}

impl CduHardware {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mcdu  => "MCDU",
            Self::Pfp3n => "PFP-3N",
            Self::Pfp4  => "PFP-4",
            Self::Pfp7  => "PFP-7",
        }
    }

    /// Byte 1 of LED reports.
    pub fn identifier_byte(&self) -> u8 {
        match self {
            Self::Mcdu => 0x32,
            _ => 0x31,
        }
    }

    fn key_table(&self) -> &'static [CduKey] {
        match self {
            Self::Mcdu  => MCDU_KEYS,
            Self::Pfp3n => PFP3N_KEYS,
            Self::Pfp4  => PFP4_KEYS,
            Self::Pfp7  => PFP7_KEYS,
        }
    }

    /// Logical key for a hardware button index.
    pub fn key_for_index(&self, index: usize) -> Option<CduKey> {
        self.key_table().get(index).copied()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CduVariant {
    Captain      = 0x00,
    Observer     = 0x01,
    FirstOfficer = 0x02,
}

impl CduVariant {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Captain      => "captain",
            Self::Observer     => "observer",
            Self::FirstOfficer => "first officer",
        }
    }
}

const PRODUCTS: [(u16, CduHardware, CduVariant); 12] = [
    (0xBB36, CduHardware::Mcdu,  CduVariant::Captain),
    (0xBB3E, CduHardware::Mcdu,  CduVariant::FirstOfficer),
    (0xBB3A, CduHardware::Mcdu,  CduVariant::Observer),
    (0xBB35, CduHardware::Pfp3n, CduVariant::Captain),
    (0xBB39, CduHardware::Pfp3n, CduVariant::FirstOfficer),
    (0xBB3D, CduHardware::Pfp3n, CduVariant::Observer),
    (0xBB38, CduHardware::Pfp4,  CduVariant::Captain),
    (0xBB40, CduHardware::Pfp4,  CduVariant::FirstOfficer),
    (0xBB3C, CduHardware::Pfp4,  CduVariant::Observer),
    (0xBB37, CduHardware::Pfp7,  CduVariant::Captain),
    (0xBB3F, CduHardware::Pfp7,  CduVariant::FirstOfficer),
    (0xBB3B, CduHardware::Pfp7,  CduVariant::Observer),
];

pub fn identify(pid: u16) -> Option<(CduHardware, CduVariant)> {
    PRODUCTS.iter().find(|(p, _, _)| *p == pid).map(|&(_, hw, v)| (hw, v))
}

// ── LEDs ──────────────────────────────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CduLed {
    Backlight       = 0,
    ScreenBacklight = 1,
    Overall         = 2,

    PfpCall = 3,
    PfpFail = 4,
    PfpMsg  = 5,
    PfpOfst = 6,
    PfpExec = 7,

    McduFail   = 8,
    McduFm     = 9,
    McduMcdu   = 10,
    McduMenu   = 11,
    McduFm1    = 12,
    McduInd    = 13,
    McduRdy    = 14,
    McduStatus = 15,
    McduFm2    = 16,
}

impl CduLed {
    pub const ANNUNCIATORS: [CduLed; 14] = [
        Self::PfpCall, Self::PfpFail, Self::PfpMsg, Self::PfpOfst, Self::PfpExec,
        Self::McduFail, Self::McduFm, Self::McduMcdu, Self::McduMenu, Self::McduFm1,
        Self::McduInd, Self::McduRdy, Self::McduStatus, Self::McduFm2,
    ];
}

pub fn led_frame(hw: CduHardware, led: u8, value: u8) -> [u8; 14] {
    [0x02, hw.identifier_byte(), 0xBB, 0x00, 0x00, 0x03, 0x49, led, value, 0, 0, 0, 0, 0]
}

pub fn send_led(sink: Option<&dyn ReportSink>, hw: CduHardware, led: CduLed, value: u8) -> bool {
    write_to(sink, &led_frame(hw, led as u8, value))
}

// ── Colours and glyphs ────────────────────────────────────────────────────────

pub mod color {
    pub const BLACK: u16       = 0x0000;
    pub const AMBER: u16       = 0x0021;
    pub const WHITE: u16       = 0x0042;
    pub const CYAN: u16        = 0x0063;
    pub const GREEN: u16       = 0x0084;
    pub const MAGENTA: u16     = 0x00A5;
    pub const RED: u16         = 0x00C6;
    pub const YELLOW: u16      = 0x00E7;
    pub const DARKBROWN: u16   = 0x0108;
    pub const GREY: u16        = 0x0129;
    pub const LIGHTBROWN: u16  = 0x014A;

    /// Background variant of a foreground colour.
    pub const fn background(c: u16) -> u16 {
        c + 0x1E
    }
}

/// UTF-8 sequences the CDU font understands beyond ASCII.
pub mod glyph {
    pub const OUTLINED_SQUARE: &[u8]    = &[0xE2, 0x98, 0x90];
    pub const FILLED_ARROW_LEFT: &[u8]  = &[0xE2, 0x97, 0x80];
    pub const FILLED_ARROW_RIGHT: &[u8] = &[0xE2, 0x96, 0xB6];
    pub const ARROW_LEFT: &[u8]         = &[0xE2, 0x86, 0x90];
    pub const ARROW_RIGHT: &[u8]        = &[0xE2, 0x86, 0x92];
    pub const ARROW_UP: &[u8]           = &[0xE2, 0x86, 0x91];
    pub const ARROW_DOWN: &[u8]         = &[0xE2, 0x86, 0x93];
    pub const DEGREES: &[u8]            = &[0xC2, 0xB0];
    pub const TRIANGLE: &[u8]           = &[0xCE, 0x94];
    pub const DIAMOND: &[u8]            = &[0xE2, 0xAC, 0xA1];
}

/// Colour word for a cell, small font folded in.
pub fn color_word(color: u16, small: bool) -> [u8; 2] {
    let v = if small { color + SMALL_FONT_OFFSET } else { color };
    v.to_le_bytes()
}

/// Serialise a page. `color_of` maps the page's colour codes to wire colours;
/// `glyph_of` appends the bytes for one character (ASCII or a symbol).
pub fn encode_page<C, G>(page: &CduPage, mut color_of: C, mut glyph_of: G) -> Vec<u8>
where
    C: FnMut(u8) -> u16,
    G: FnMut(u8, bool, &mut Vec<u8>),
{
    let mut out = Vec::with_capacity(CDU_ROWS * CDU_COLUMNS * 3);
    for row in page.rows() {
        for cell in row.iter() {
            out.extend_from_slice(&color_word(color_of(cell.color), cell.small));
            glyph_of(cell.ch, cell.small, &mut out);
        }
    }
    out
}

/// Cut an encoded page into 64-byte reports.
pub fn page_frames(stream: &[u8]) -> Vec<[u8; REPORT_LEN]> {
    stream
        .chunks(REPORT_LEN - 1)
        .map(|chunk| {
            let mut f = [0u8; REPORT_LEN];
            f[0] = PAGE_REPORT_ID;
            f[1..1 + chunk.len()].copy_from_slice(chunk);
            f
        })
        .collect()
}

pub fn send_page(sink: Option<&dyn ReportSink>, stream: &[u8]) -> bool {
    page_frames(stream).iter().all(|f| write_to(sink, f))
}

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Logical CDU keys across all hardware generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CduKey {
    Lsk1L, Lsk2L, Lsk3L, Lsk4L, Lsk5L, Lsk6L,
    Lsk1R, Lsk2R, Lsk3R, Lsk4R, Lsk5R, Lsk6R,

    BrightnessDown, BrightnessUp, PageNext, PagePrev, Menu, Prog,
    Slash, Period, PlusMinus, Space, Clr,
    Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9,
    KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
    KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,

    PfpInitRef, PfpRoute, PfpLegs, PfpDepArr, PfpHold, PfpFix, PfpExec, PfpDel,
    Pfp3Clb, Pfp3Crz, Pfp3Des, Pfp3N1Limit,
    Pfp4Atc, Pfp4Vnav, Pfp4FmcComm, Pfp4NavRad,
    Pfp7Altn, Pfp7Vnav, Pfp7FmcComm, Pfp7NavRad,

    McduDir, McduPerf, McduInit, McduData, McduEmptyTopRight, McduFpln, McduRadNav,
    McduFuelPred, McduSecFpln, McduAtcComm, McduAirport, McduEmptyBottomLeft,
    McduPageUp, McduPageDown, McduOverfly,
}

use CduKey::*;

const LSKS: [CduKey; 12] = [
    Lsk1L, Lsk2L, Lsk3L, Lsk4L, Lsk5L, Lsk6L, Lsk1R, Lsk2R, Lsk3R, Lsk4R, Lsk5R, Lsk6R,
];

/// `1..9 . 0 +/-` in keypad order.
const NUMPAD: [CduKey; 12] = [
    Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9, Period, Key0, PlusMinus,
];

const LETTERS: [CduKey; 26] = [
    KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM,
    KeyN, KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
];

macro_rules! key_table {
    ($name:ident, [$($mid:expr),* $(,)?], [$($tail:expr),* $(,)?]) => {
        const $name: &[CduKey] = &{
            const MID: &[CduKey] = &[$($mid),*];
            const TAIL: &[CduKey] = &[$($tail),*];
            const LEN: usize = LSKS.len() + MID.len() + NUMPAD.len() + LETTERS.len() + TAIL.len();
            let mut out = [Lsk1L; LEN];
            let mut i = 0;
            let mut j = 0;
            while j < LSKS.len()    { out[i] = LSKS[j];    i += 1; j += 1; }
            j = 0;
            while j < MID.len()     { out[i] = MID[j];     i += 1; j += 1; }
            j = 0;
            while j < NUMPAD.len()  { out[i] = NUMPAD[j];  i += 1; j += 1; }
            j = 0;
            while j < LETTERS.len() { out[i] = LETTERS[j]; i += 1; j += 1; }
            j = 0;
            while j < TAIL.len()    { out[i] = TAIL[j];    i += 1; j += 1; }
            out
        };
    };
}

key_table!(
    MCDU_KEYS,
    [
        McduDir, Prog, McduPerf, McduInit, McduData, McduEmptyTopRight, BrightnessUp,
        McduFpln, McduRadNav, McduFuelPred, McduSecFpln, McduAtcComm, Menu, BrightnessDown,
        McduAirport, McduEmptyBottomLeft, PagePrev, McduPageUp, PageNext, McduPageDown,
    ],
    [Slash, Space, McduOverfly, Clr]
);

key_table!(
    PFP3N_KEYS,
    [
        PfpInitRef, PfpRoute, Pfp3Clb, Pfp3Crz, Pfp3Des, BrightnessDown, BrightnessUp, Menu,
        PfpLegs, PfpDepArr, PfpHold, Prog, PfpExec, Pfp3N1Limit, PfpFix, PagePrev, PageNext,
    ],
    [Space, PfpDel, Slash, Clr]
);

key_table!(
    PFP4_KEYS,
    [
        PfpInitRef, PfpRoute, PfpDepArr, Pfp4Atc, Pfp4Vnav, BrightnessDown, BrightnessUp,
        PfpFix, PfpLegs, PfpHold, Pfp4FmcComm, Prog, PfpExec, Menu, Pfp4NavRad, PagePrev,
        PageNext,
    ],
    [Space, PfpDel, Slash, Clr]
);

key_table!(
    PFP7_KEYS,
    [
        PfpInitRef, PfpRoute, PfpDepArr, Pfp7Altn, Pfp7Vnav, BrightnessDown, BrightnessUp,
        PfpFix, PfpLegs, PfpHold, Pfp7FmcComm, Prog, PfpExec, Menu, Pfp7NavRad, PagePrev,
        PageNext,
    ],
    [Space, PfpDel, Slash, Clr]
);
