//! Seven-segment character encoding for the FCU and EFIS displays.
//!
//! Segment bits of the base encoding:
//! ```text
//!  0x80 top      0x40 upper right   0x20 lower right   0x10 bottom
//!  0x08 upper left   0x04 middle    0x02 lower left    0x01 dot
//! ```
//! The panels wire segments differently per window, hence the swapped and
//! EFIS variants below. Strings are encoded right to left: the last character
//! lands in byte 0.

/// Segment pattern for one character; unknown characters are blank.
pub fn segment(ch: u8) -> u8 {
    match ch.to_ascii_uppercase() {
        b'0' => 0xFA,
        b'1' => 0x60,
        b'2' => 0xD6,
        b'3' => 0xF4,
        b'4' => 0x6C,
        b'5' => 0xBC,
        b'6' => 0xBE,
        b'7' => 0xE0,
        b'8' => 0xFE,
        b'9' => 0xFC,
        b'A' => 0xEE,
        b'B' => 0xFE,
        b'C' => 0x9A,
        b'D' => 0x76,
        b'E' => 0x9E,
        b'F' => 0x8E,
        b'G' => 0xBE,
        b'H' => 0x6E,
        b'I' => 0x60,
        b'J' => 0x70,
        b'K' => 0x0E,
        b'L' => 0x1A,
        b'M' => 0xA6,
        b'N' => 0x26,
        b'O' => 0xFA,
        b'P' => 0xCE,
        b'Q' => 0xEC,
        b'R' => 0x06,
        b'S' => 0xBC,
        b'T' => 0x1E,
        b'U' => 0x7A,
        b'V' => 0x32,
        b'W' => 0x58,
        b'X' => 0x6E,
        b'Y' => 0x7C,
        b'Z' => 0xD6,
        b'-' => 0x04,
        b'#' => 0x36,
        b'/' => 0x60,
        b'\\' => 0xA0,
        _ => 0x00,
    }
}

/// Truncate to `len` characters, then left-pad with `'0'`.
pub fn fix_string_length(value: &str, len: usize) -> String {
    let truncated: String = value.chars().take(len).collect();
    let pad = len - truncated.chars().count();
    let mut out = "0".repeat(pad);
    out.push_str(&truncated);
    out
}

/// Plain encoding: `data[n-1-i] = segment(s[i])`.
pub fn encode(num_segments: usize, s: &str) -> Vec<u8> {
    let mut data = vec![0u8; num_segments];
    for (i, ch) in s.bytes().take(num_segments).enumerate() {
        data[num_segments - 1 - i] = segment(ch);
    }
    data
}

fn swap_nibbles(v: u8) -> u8 {
    v.rotate_left(4)
}

/// Encoding for the heading, altitude and V/S windows, where each digit's
/// upper nibble lives in the next byte. Returns `num_segments + 1` bytes.
pub fn encode_swapped(num_segments: usize, s: &str) -> Vec<u8> {
    let mut data = encode(num_segments, s);
    data.push(0);
    for b in data.iter_mut() {
        *b = swap_nibbles(*b);
    }
    for i in 0..num_segments {
        let hi = data[num_segments - 1 - i] & 0xF0;
        data[num_segments - i] = (data[num_segments - i] & 0x0F) | hi;
        data[num_segments - 1 - i] &= 0x0F;
    }
    data
}

/// Encoding for the EFIS baro windows, which use their own bit order.
pub fn encode_efis(num_segments: usize, s: &str) -> Vec<u8> {
    const REMAP: [(u8, u8); 8] = [
        (0x08, 0x01), // upper left
        (0x04, 0x02), // middle
        (0x02, 0x04), // lower left
        (0x10, 0x08), // bottom
        (0x80, 0x10), // top
        (0x40, 0x20), // upper right
        (0x20, 0x40), // lower right
        (0x01, 0x80), // dot
    ];
    encode(num_segments, s)
        .into_iter()
        .map(|b| REMAP.iter().filter(|(from, _)| b & from != 0).fold(0, |acc, (_, to)| acc | to))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_truncates() {
        assert_eq!(fix_string_length("5", 3), "005");
        assert_eq!(fix_string_length("12345", 3), "123");
        assert_eq!(fix_string_length("", 2), "00");
    }

    #[test]
    fn encodes_right_to_left_and_blanks_unknown() {
        assert_eq!(encode(3, "12?"), vec![0x00, 0xD6, 0x60]);
        assert_eq!(encode(2, "abc"), vec![0xFE, 0xEE], "lowercase maps, extra chars dropped");
    }

    #[test]
    fn swapped_moves_upper_nibbles_up_one_byte() {
        // "8" -> 0xFE -> swapped 0xEF; low nibble stays, high nibble moves to data[1].
        assert_eq!(encode_swapped(1, "8"), vec![0x0F, 0xE0]);

        let d = encode_swapped(3, "123");
        assert_eq!(d.len(), 4);
        // nibble-swapped 4F 6D 06 00, then each upper nibble shifts up one byte
        assert_eq!(d, vec![0x0F, 0x4D, 0x66, 0x00]);
    }

    #[test]
    fn efis_remaps_bits() {
        assert_eq!(encode_efis(1, "-"), vec![0x02]);
        assert_eq!(encode_efis(1, "8"), vec![0x7F]);
        assert_eq!(encode_efis(4, "STD "), vec![0x00, 0x6E, 0x0F, 0x5B]);
    }
}
