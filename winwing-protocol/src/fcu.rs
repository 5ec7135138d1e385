//! FCU and EFIS panel frames.
//!
//! The FCU display is refreshed with two 64-byte reports sharing one packet
//! number: a data frame (opcode 0x31) and a commit frame (opcode 0x11). Each
//! EFIS baro window is a single frame (opcode 0x1A) addressed to 0x0D (left)
//! or 0x0E (right). Byte 2 of every frame is the rolling packet number; the
//! builders here leave it at the value passed in and [`stamp_packet`] lets the
//! I/O worker rewrite it at send time.

use winwing_state::{EfisDisplayValue, FcuWindows};

use crate::seven_segment::{encode, encode_efis, encode_swapped, fix_string_length};
use crate::{write_to, ReportSink};

pub const PRODUCT_IDS: [u16; 4] = [0xBB10, 0xBC1E, 0xBC1D, 0xBA01];
pub const IDENTIFIER_BYTE: u8   = 0x10;
pub const REPORT_LEN: usize     = 64;

const EFIS_LEFT_ID: u8  = 0x0D;
const EFIS_RIGHT_ID: u8 = 0x0E;

// ── LEDs ──────────────────────────────────────────────────────────────────────

/// LED / backlight channels. Ids below 100 address the FCU, 100..200 the
/// right EFIS and 200..300 the left EFIS.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FcuEfisLed {
    Backlight        = 0,
    ScreenBacklight  = 1,
    OverallGreen     = 2,
    LocGreen         = 3,
    Ap1Green         = 5,
    Ap2Green         = 7,
    AthrGreen        = 9,
    ExpedGreen       = 11,
    ApprGreen        = 13,
    ExpedBacklight   = 30,

    EfisrBacklight       = 100,
    EfisrScreenBacklight = 101,
    EfisrOverallGreen    = 102,
    EfisrFdGreen         = 103,
    EfisrLsGreen         = 104,
    EfisrCstrGreen       = 105,
    EfisrWptGreen        = 106,
    EfisrVordGreen       = 107,
    EfisrNdbGreen        = 108,
    EfisrArptGreen       = 109,

    EfislBacklight       = 200,
    EfislScreenBacklight = 201,
    EfislOverallGreen    = 202,
    EfislFdGreen         = 203,
    EfislLsGreen         = 204,
    EfislCstrGreen       = 205,
    EfislWptGreen        = 206,
    EfislVordGreen       = 207,
    EfislNdbGreen        = 208,
    EfislArptGreen       = 209,
}

impl FcuEfisLed {
    pub const ALL: [FcuEfisLed; 30] = [
        Self::Backlight, Self::ScreenBacklight, Self::OverallGreen, Self::LocGreen,
        Self::Ap1Green, Self::Ap2Green, Self::AthrGreen, Self::ExpedGreen,
        Self::ApprGreen, Self::ExpedBacklight,
        Self::EfisrBacklight, Self::EfisrScreenBacklight, Self::EfisrOverallGreen,
        Self::EfisrFdGreen, Self::EfisrLsGreen, Self::EfisrCstrGreen, Self::EfisrWptGreen,
        Self::EfisrVordGreen, Self::EfisrNdbGreen, Self::EfisrArptGreen,
        Self::EfislBacklight, Self::EfislScreenBacklight, Self::EfislOverallGreen,
        Self::EfislFdGreen, Self::EfislLsGreen, Self::EfislCstrGreen, Self::EfislWptGreen,
        Self::EfislVordGreen, Self::EfislNdbGreen, Self::EfislArptGreen,
    ];

    pub fn id(self) -> u16 {
        self as u16
    }
}

/// LED brightness report for a raw channel id; `None` for ids >= 300.
pub fn led_frame(id: u16, brightness: u8) -> Option<[u8; 14]> {
    let (target, panel, index) = match id {
        0..=99 => (IDENTIFIER_BYTE, 0xBB, id),
        100..=199 => (EFIS_RIGHT_ID, 0xBF, id - 100),
        200..=299 => (EFIS_LEFT_ID, 0xBF, id - 200),
        _ => return None,
    };
    Some([0x02, target, panel, 0x00, 0x00, 0x03, 0x49, index as u8, brightness, 0, 0, 0, 0, 0])
}

pub fn send_led(sink: Option<&dyn ReportSink>, led: FcuEfisLed, brightness: u8) -> bool {
    led_frame(led.id(), brightness).is_some_and(|f| write_to(sink, &f))
}

// ── Display frames ────────────────────────────────────────────────────────────

/// Positions in the 17-byte flag array overlaid on the display data.
mod idx {
    pub const H0: usize       = 0;
    pub const H3: usize       = 1;
    pub const A0: usize       = 2;
    pub const A1: usize       = 3;
    pub const A2: usize       = 4;
    pub const A3: usize       = 5;
    pub const A4: usize       = 6;
    pub const A5: usize       = 7;
    pub const V2: usize       = 8;
    pub const V3: usize       = 9;
    pub const V0: usize       = 10;
    pub const V1: usize       = 11;
    pub const S1: usize       = 12;
    pub const EFISR_B0: usize = 13;
    pub const EFISR_B2: usize = 14;
    pub const EFISL_B0: usize = 15;
    pub const EFISL_B2: usize = 16;
}

const FLAG_COUNT: usize = 17;

fn fcu_flags(w: &FcuWindows) -> [u8; FLAG_COUNT] {
    let mut f = [0u8; FLAG_COUNT];
    let mut set = |i: usize, bit: u8, on: bool| {
        if on {
            f[i] |= bit;
        }
    };
    set(idx::H3, 0x04, w.spd_mach);
    set(idx::H3, 0x02, w.spd_managed);
    set(idx::H3, 0x08, !w.spd_mach);
    set(idx::H0, 0x40, w.hdg_trk);
    set(idx::H0, 0x80, !w.hdg_trk);
    set(idx::H0, 0x10, w.hdg_managed);
    set(idx::H0, 0x20, w.lat_mode);
    set(idx::A4, 0x10, w.alt_indication);
    set(idx::V1, 0x10, w.alt_managed);
    set(idx::A5, 0x04, w.vs_mode);
    set(idx::A5, 0x01, w.fpa_mode);
    set(idx::A5, 0x02, w.hdg_trk);
    set(idx::A5, 0x08, !w.hdg_trk);
    set(idx::A0, 0x10, w.vs_horizontal_line);
    set(idx::V2, 0x20, w.vs_vertical_line);
    set(idx::A2, 0x10, w.lvl_change);
    set(idx::A3, 0x10, w.lvl_change_left);
    set(idx::A1, 0x10, w.lvl_change_right);
    set(idx::V0, 0x40, w.vs_indication);
    set(idx::V0, 0x80, w.fpa_indication);
    set(idx::V3, 0x10, w.fpa_comma);
    set(idx::V2, 0x10, w.vs_sign);
    set(idx::S1, 0x01, w.spd_mach);
    f
}

fn blank_or_test(enabled: bool, test: bool, buffers: &mut [&mut [u8]]) {
    if !enabled || test {
        let fill = if test { 0xFF } else { 0x00 };
        for b in buffers.iter_mut() {
            b.fill(fill);
        }
    }
}

fn pad(frame: Vec<u8>) -> [u8; REPORT_LEN] {
    let mut out = [0u8; REPORT_LEN];
    let n = frame.len().min(REPORT_LEN);
    out[..n].copy_from_slice(&frame[..n]);
    out
}

/// Data + commit frames for the four FCU windows.
pub fn build_fcu_frames(w: &FcuWindows, pkt: u8) -> [[u8; REPORT_LEN]; 2] {
    let mut spd = encode(3, &fix_string_length(&w.speed, 3));
    let mut hdg = encode_swapped(3, &fix_string_length(&w.heading, 3));
    let mut alt = encode_swapped(5, &fix_string_length(&w.altitude, 5));
    let mut vs = encode_swapped(4, &fix_string_length(&w.vertical_speed, 4));
    let mut f = fcu_flags(w);
    blank_or_test(
        w.display_enabled,
        w.display_test,
        &mut [
            spd.as_mut_slice(),
            hdg.as_mut_slice(),
            alt.as_mut_slice(),
            vs.as_mut_slice(),
            &mut f[..],
        ],
    );

    let mut data = vec![
        0xF0, 0x00, pkt, 0x31, IDENTIFIER_BYTE, 0xBB, 0x00, 0x00, 0x02, 0x01, 0x00, 0x00,
        0xFF, 0xFF, 0x02, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    data.extend_from_slice(&[spd[2], spd[1] | f[idx::S1], spd[0]]);
    data.extend_from_slice(&[hdg[3] | f[idx::H3], hdg[2], hdg[1], hdg[0] | f[idx::H0]]);
    data.extend_from_slice(&[
        alt[5] | f[idx::A5],
        alt[4] | f[idx::A4],
        alt[3] | f[idx::A3],
        alt[2] | f[idx::A2],
        alt[1] | f[idx::A1],
        alt[0] | vs[4] | f[idx::A0],
    ]);
    data.extend_from_slice(&[
        vs[3] | f[idx::V3],
        vs[2] | f[idx::V2],
        vs[1] | f[idx::V1],
        vs[0] | f[idx::V0],
    ]);

    let commit = vec![
        0xF0, 0x00, pkt, 0x11, IDENTIFIER_BYTE, 0xBB, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00,
        0xFF, 0xFF, 0x02, 0x00,
    ];
    [pad(data), pad(commit)]
}

/// Baro frame for one EFIS panel.
pub fn build_efis_frame(v: &EfisDisplayValue, right: bool, pkt: u8) -> [u8; REPORT_LEN] {
    let (b0, b2) = if right {
        (idx::EFISR_B0, idx::EFISR_B2)
    } else {
        (idx::EFISL_B0, idx::EFISL_B2)
    };
    let mut f = [0u8; FLAG_COUNT];
    f[b0] |= if v.is_std { 0x00 } else if v.show_qfe { 0x01 } else { 0x02 };
    if v.unit_is_in_hg {
        f[b2] |= 0x80;
    }

    let text = if v.is_std { "STD " } else { v.baro.as_str() };
    let mut baro = encode_efis(4, &fix_string_length(text, 4));
    blank_or_test(v.display_enabled, v.display_test, &mut [baro.as_mut_slice(), &mut f[..]]);

    let target = if right { EFIS_RIGHT_ID } else { EFIS_LEFT_ID };
    let mut frame = vec![
        0xF0, 0x00, pkt, 0x1A, target, 0xBF, 0x00, 0x00, 0x02, 0x01, 0x00, 0x00,
        0xFF, 0xFF, 0x1D, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    frame.extend_from_slice(&[baro[3], baro[2] | f[b2], baro[1], baro[0], f[b0]]);
    frame.extend_from_slice(&[0x0E, 0xBF, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x4C, 0x0C, 0x1D]);
    pad(frame)
}

/// Display init report sent once on connect.
pub fn init_frame() -> [u8; REPORT_LEN] {
    let mut f = [0u8; REPORT_LEN];
    f[0] = 0xF0;
    f[1] = 0x02;
    f
}

/// Overwrite the packet number of every 64-byte frame in `frames`.
pub fn stamp_packet(frames: &mut [u8], pkt: u8) {
    for frame in frames.chunks_mut(REPORT_LEN) {
        if frame.len() > 2 && frame[0] == 0xF0 {
            frame[2] = pkt;
        }
    }
}

/// Advance the packet number, skipping 0.
pub fn bump_packet(pkt: &mut u8) {
    *pkt = pkt.wrapping_add(1).max(1);
}
