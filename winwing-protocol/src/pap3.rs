//! PAP3 MCP transport frames.
//!
//! Two frame shapes. The 14-byte short command drives dimming, LEDs and the
//! A/T solenoid:
//! ```text
//! [0]     report id   : 0x02
//! [1..7]  header      : 0F BF 00 00 03 49
//! [7]     selector    : dimming channel / LED id / 0x1E solenoid
//! [8]     value
//! [9..14] zero
//! ```
//! The 64-byte LCD frame carries a rolling sequence byte and an opcode:
//! ```text
//! [0..2]   F0 00
//! [2]      sequence (never 0)
//! [3]      opcode   : 0x38 payload | 0x2A commit | 0x12 init
//! [4..18]  payload preamble (payload frames only)
//! [0x19..=0x38] 32 bytes of LCD segment payload
//! ```

use crate::input::InputLayout;
use crate::{write_to, ReportSink};

pub const PRODUCT_ID: u16 = 0xBF0F;

// Input report layout.
pub const LIGHT_SENSOR_OFFSET: u8 = 0x14;
pub const SWITCH_OFFSETS: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
pub const ENCODER_OFFSETS: [u8; 6] = [0x15, 0x17, 0x19, 0x1B, 0x1D, 0x1F];

pub fn input_layout() -> InputLayout {
    InputLayout {
        switch_offsets:  SWITCH_OFFSETS.to_vec(),
        encoder_offsets: ENCODER_OFFSETS.to_vec(),
        light_sensor:    Some(LIGHT_SENSOR_OFFSET),
    }
}

pub const SHORT_LEN: usize       = 14;
pub const REPORT_LEN: usize      = 64;
pub const LCD_PAYLOAD_LEN: usize = 32;

/// Sequence value the device expects after power-up.
pub const INITIAL_SEQUENCE: u8 = 5;

pub const SOLENOID_SELECTOR: u8 = 0x1E;
pub const DIMMING_CHANNELS: u8  = 3;

const SHORT_HEADER: [u8; 7] = [0x02, 0x0F, 0xBF, 0x00, 0x00, 0x03, 0x49];

const PAYLOAD_PREAMBLE: [u8; 14] = [
    0x0F, 0xBF, 0x00, 0x00, 0x02, 0x01, 0x00, 0x00,
    0xDF, 0xA2, 0x50, 0x00, 0x00, 0xB0,
];

const INIT_TAIL: [u8; 20] = [
    0x0F, 0xBF, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00,
    0x26, 0xCC, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
    0x00, 0x03, 0x00, 0x00,
];

/// First byte of the user payload inside an LCD frame.
pub const PAYLOAD_START: usize = 0x19;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcdOpcode {
    Payload = 0x38,
    Commit  = 0x2A,
    Init    = 0x12,
}

// ── Frame builders ────────────────────────────────────────────────────────────

pub fn short_command(selector: u8, value: u8) -> [u8; SHORT_LEN] {
    let mut buf = [0u8; SHORT_LEN];
    buf[..SHORT_HEADER.len()].copy_from_slice(&SHORT_HEADER);
    buf[7] = selector;
    buf[8] = value;
    buf
}

pub fn dimming_frame(channel: u8, value: u8) -> [u8; SHORT_LEN] {
    short_command(channel, value)
}

pub fn led_frame(id: u8, on: bool) -> [u8; SHORT_LEN] {
    short_command(id, u8::from(on))
}

pub fn solenoid_frame(on: bool) -> [u8; SHORT_LEN] {
    short_command(SOLENOID_SELECTOR, u8::from(on))
}

fn lcd_header(seq: u8, opcode: LcdOpcode) -> [u8; REPORT_LEN] {
    let mut buf = [0u8; REPORT_LEN];
    buf[0] = 0xF0;
    buf[2] = if seq == 0 { 1 } else { seq };
    buf[3] = opcode as u8;
    buf
}

/// Payload frame; bytes beyond 32 are dropped.
pub fn lcd_payload_frame(seq: u8, payload: &[u8]) -> [u8; REPORT_LEN] {
    let mut buf = lcd_header(seq, LcdOpcode::Payload);
    buf[4..4 + PAYLOAD_PREAMBLE.len()].copy_from_slice(&PAYLOAD_PREAMBLE);
    let n = payload.len().min(LCD_PAYLOAD_LEN);
    buf[PAYLOAD_START..PAYLOAD_START + n].copy_from_slice(&payload[..n]);
    buf
}

/// Payload opcode with nothing but the header. The device wants two of these
/// between a payload and its commit.
pub fn lcd_empty_frame(seq: u8) -> [u8; REPORT_LEN] {
    lcd_header(seq, LcdOpcode::Payload)
}

pub fn lcd_commit_frame(seq: u8) -> [u8; REPORT_LEN] {
    let mut buf = lcd_header(seq, LcdOpcode::Commit);
    buf[0x1D] = 0x0F;
    buf[0x1E] = 0xBF;
    buf[0x21] = 0x03;
    buf[0x22] = 0x01;
    buf[0x25] = 0xDF;
    buf[0x26] = 0xA2;
    buf[0x27] = 0x50;
    buf
}

pub fn lcd_init_frame(seq: u8) -> [u8; REPORT_LEN] {
    let mut buf = lcd_header(seq, LcdOpcode::Init);
    buf[4..4 + INIT_TAIL.len()].copy_from_slice(&INIT_TAIL);
    buf
}

/// Advance the LCD sequence byte, skipping 0.
pub fn bump_sequence(seq: &mut u8) {
    *seq = if *seq == 0 { 1 } else { seq.wrapping_add(1).max(1) };
}

// ── Senders ───────────────────────────────────────────────────────────────────

pub fn send_dimming(sink: Option<&dyn ReportSink>, channel: u8, value: u8) -> bool {
    write_to(sink, &dimming_frame(channel, value))
}

pub fn send_led(sink: Option<&dyn ReportSink>, id: u8, on: bool) -> bool {
    write_to(sink, &led_frame(id, on))
}

pub fn send_solenoid(sink: Option<&dyn ReportSink>, on: bool) -> bool {
    write_to(sink, &solenoid_frame(on))
}

fn send_sequenced(sink: Option<&dyn ReportSink>, seq: &mut u8, frame: &[u8]) -> bool {
    let ok = write_to(sink, frame);
    if ok {
        bump_sequence(seq);
    }
    ok
}

pub fn send_lcd_payload(sink: Option<&dyn ReportSink>, seq: &mut u8, payload: &[u8]) -> bool {
    let frame = lcd_payload_frame(*seq, payload);
    send_sequenced(sink, seq, &frame)
}

pub fn send_lcd_empty(sink: Option<&dyn ReportSink>, seq: &mut u8) -> bool {
    let frame = lcd_empty_frame(*seq);
    send_sequenced(sink, seq, &frame)
}

pub fn send_lcd_commit(sink: Option<&dyn ReportSink>, seq: &mut u8) -> bool {
    let frame = lcd_commit_frame(*seq);
    send_sequenced(sink, seq, &frame)
}

pub fn send_lcd_init(sink: Option<&dyn ReportSink>, seq: &mut u8) -> bool {
    let frame = lcd_init_frame(*seq);
    send_sequenced(sink, seq, &frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingSink;

    #[test]
    fn short_command_layout() {
        let f = dimming_frame(2, 0x80);
        assert_eq!(f, [0x02, 0x0F, 0xBF, 0x00, 0x00, 0x03, 0x49, 0x02, 0x80, 0, 0, 0, 0, 0]);
        assert_eq!(solenoid_frame(true)[7..9], [0x1E, 0x01]);
        assert_eq!(led_frame(0x11, false)[7..9], [0x11, 0x00]);
    }

    #[test]
    fn payload_frame_places_preamble_and_data() {
        let payload: Vec<u8> = (1..=40).collect();
        let f = lcd_payload_frame(7, &payload);
        assert_eq!(&f[..4], &[0xF0, 0x00, 0x07, 0x38]);
        assert_eq!(&f[4..18], &PAYLOAD_PREAMBLE);
        assert_eq!(f[0x19], 1);
        assert_eq!(f[0x38], 32, "payload truncated at 32 bytes");
        assert_eq!(f[0x39], 0);
    }

    #[test]
    fn commit_and_init_constants() {
        let c = lcd_commit_frame(9);
        assert_eq!(c[3], 0x2A);
        assert_eq!((c[0x1D], c[0x1E], c[0x21], c[0x22]), (0x0F, 0xBF, 0x03, 0x01));
        assert_eq!((c[0x25], c[0x26], c[0x27]), (0xDF, 0xA2, 0x50));

        let i = lcd_init_frame(0);
        assert_eq!(i[2], 1, "sequence 0 is written as 1");
        assert_eq!(i[3], 0x12);
        assert_eq!(&i[4..24], &INIT_TAIL);
    }

    #[test]
    fn sequence_never_emits_zero() {
        let mut s = 255u8;
        bump_sequence(&mut s);
        assert_eq!(s, 1);
        let mut s = 0u8;
        bump_sequence(&mut s);
        assert_eq!(s, 1);
        let mut s = 5u8;
        bump_sequence(&mut s);
        assert_eq!(s, 6);
    }

    #[test]
    fn sequence_only_advances_on_success() {
        let sink = RecordingSink::new();
        let mut seq = INITIAL_SEQUENCE;
        assert!(send_lcd_commit(Some(&sink), &mut seq));
        assert_eq!(seq, 6);

        sink.set_failing(true);
        assert!(!send_lcd_commit(Some(&sink), &mut seq));
        assert_eq!(seq, 6);

        assert!(!send_lcd_empty(None, &mut seq));
        assert_eq!(seq, 6);
        assert_eq!(sink.reports().len(), 1);
    }
}
