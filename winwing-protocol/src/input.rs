//! Raw HID input report decoding.
//!
//! Two shapes of input exist across the hardware:
//!
//! * PAP3 reports carry switch bytes at fixed offsets, free-running encoder
//!   counters and one ambient light byte. [`InputDecoder`] turns successive
//!   reports into per-bit edges and encoder deltas.
//! * FCU/EFIS and CDU reports carry a flat 96-bit button field after the
//!   report id. [`ButtonField`] turns them into per-index pressed states.
//!
//! Neither type knows what a given bit means; that mapping lives with the
//! device and its aircraft profile.

/// One decoded input event, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A single bit at `offset` changed.
    Button { offset: u8, mask: u8, pressed: bool },
    /// An encoder counter moved by `delta` detents.
    Encoder { offset: u8, delta: i8 },
    /// Ambient light sample, forwarded verbatim.
    LightSensor(u8),
}

/// Byte offsets the decoder looks at.
#[derive(Debug, Clone, Default)]
pub struct InputLayout {
    pub switch_offsets:  Vec<u8>,
    pub encoder_offsets: Vec<u8>,
    pub light_sensor:    Option<u8>,
}

/// Stateful edge detector over fixed-layout reports.
///
/// The first report only establishes the baseline; edges and deltas are
/// computed between consecutive reports.
#[derive(Debug, Clone)]
pub struct InputDecoder {
    layout: InputLayout,
    last:   Option<Vec<u8>>,
}

impl InputDecoder {
    pub fn new(mut layout: InputLayout) -> Self {
        layout.switch_offsets.sort_unstable();
        layout.switch_offsets.dedup();
        Self { layout, last: None }
    }

    /// Last report seen, if any.
    pub fn last_report(&self) -> Option<&[u8]> {
        self.last.as_deref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Decode one report. Offsets beyond the report length are skipped.
    pub fn decode(&mut self, report: &[u8]) -> Vec<InputEvent> {
        let mut events = Vec::new();
        if report.is_empty() {
            return events;
        }

        if let Some(prev) = self.last.as_deref() {
            for &off in &self.layout.switch_offsets {
                let (Some(&old), Some(&new)) = (prev.get(off as usize), report.get(off as usize)) else {
                    continue;
                };
                let set = new & !old;
                let clr = old & !new;
                let mut mask = 1u8;
                while mask != 0 {
                    if set & mask != 0 {
                        events.push(InputEvent::Button { offset: off, mask, pressed: true });
                    }
                    if clr & mask != 0 {
                        events.push(InputEvent::Button { offset: off, mask, pressed: false });
                    }
                    mask = mask.wrapping_shl(1);
                }
            }

            for &off in &self.layout.encoder_offsets {
                let (Some(&old), Some(&new)) = (prev.get(off as usize), report.get(off as usize)) else {
                    continue;
                };
                let delta = new.wrapping_sub(old) as i8;
                if delta != 0 {
                    events.push(InputEvent::Encoder { offset: off, delta });
                }
            }
        }

        if let Some(&lux) = self.layout.light_sensor.and_then(|off| report.get(off as usize)) {
            events.push(InputEvent::LightSensor(lux));
        }

        // Bytes a short report did not carry keep their previous value.
        match self.last.as_mut() {
            Some(prev) if prev.len() > report.len() => prev[..report.len()].copy_from_slice(report),
            _ => self.last = Some(report.to_vec()),
        }
        events
    }
}

// ── ButtonField ───────────────────────────────────────────────────────────────

pub const BUTTON_REPORT_ID: u8         = 1;
pub const BUTTON_REPORT_MIN_LEN: usize = 13;
pub const BUTTON_COUNT: u16            = 96;

/// Flat button bitmap: byte `1 + i / 8`, bit `i % 8` is hardware button `i`.
#[derive(Debug, Clone, Default)]
pub struct ButtonField {
    last: Option<u128>,
}

impl ButtonField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Extract the bitmap from a report; `None` for other report ids or
    /// truncated reports.
    pub fn bits(report: &[u8]) -> Option<u128> {
        if report.len() < BUTTON_REPORT_MIN_LEN || report[0] != BUTTON_REPORT_ID {
            return None;
        }
        let bits = report[1..BUTTON_REPORT_MIN_LEN]
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, &b)| acc | (u128::from(b) << (8 * i)));
        Some(bits)
    }

    /// Pressed state of every button, ascending index, when the bitmap
    /// differs from the previous report. Unchanged or invalid reports yield
    /// `None`.
    pub fn decode(&mut self, report: &[u8]) -> Option<Vec<(u16, bool)>> {
        let bits = Self::bits(report)?;
        if self.last == Some(bits) {
            return None;
        }
        self.last = Some(bits);
        Some((0..BUTTON_COUNT).map(|i| (i, bits & (1u128 << i) != 0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pap3_layout() -> InputLayout {
        InputLayout {
            switch_offsets:  vec![0x02, 0x01],
            encoder_offsets: vec![0x15],
            light_sensor:    Some(0x14),
        }
    }

    fn report(pairs: &[(usize, u8)]) -> Vec<u8> {
        let mut r = vec![0u8; 0x20];
        for &(off, v) in pairs {
            r[off] = v;
        }
        r
    }

    #[test]
    fn first_report_is_baseline() {
        let mut d = InputDecoder::new(pap3_layout());
        let ev = d.decode(&report(&[(0x01, 0xFF), (0x14, 9)]));
        assert_eq!(ev, vec![InputEvent::LightSensor(9)], "no edges without a previous report");
        assert!(d.last_report().is_some());
    }

    #[test]
    fn edges_fire_exactly_for_changed_bits() {
        let mut d = InputDecoder::new(pap3_layout());
        d.decode(&report(&[(0x01, 0b0000_0101)]));
        let ev = d.decode(&report(&[(0x01, 0b0000_0011), (0x02, 0x80)]));
        assert_eq!(
            ev,
            vec![
                InputEvent::Button { offset: 0x01, mask: 0x02, pressed: true },
                InputEvent::Button { offset: 0x01, mask: 0x04, pressed: false },
                InputEvent::Button { offset: 0x02, mask: 0x80, pressed: true },
                InputEvent::LightSensor(0),
            ]
        );

        let ev = d.decode(&report(&[(0x01, 0b0000_0011), (0x02, 0x80)]));
        assert_eq!(ev, vec![InputEvent::LightSensor(0)], "unchanged bytes never fire");
    }

    #[test]
    fn encoder_delta_wraps() {
        let mut d = InputDecoder::new(pap3_layout());
        d.decode(&report(&[(0x15, 250)]));
        let ev = d.decode(&report(&[(0x15, 4)]));
        assert!(ev.contains(&InputEvent::Encoder { offset: 0x15, delta: 10 }), "250 -> 4 is +10");
        let ev = d.decode(&report(&[(0x15, 1)]));
        assert!(ev.contains(&InputEvent::Encoder { offset: 0x15, delta: -3 }));
    }

    #[test]
    fn short_reports_skip_offsets() {
        let mut d = InputDecoder::new(pap3_layout());
        d.decode(&report(&[(0x01, 1)]));
        let ev = d.decode(&[0x00, 0x00]);
        assert_eq!(
            ev,
            vec![InputEvent::Button { offset: 0x01, mask: 0x01, pressed: false }],
            "offsets past the end are treated as unchanged"
        );
        assert!(d.decode(&[]).is_empty());
    }

    #[test]
    fn button_field_reports_full_state_on_change() {
        let mut f = ButtonField::new();
        let mut r = vec![0u8; 13];
        r[0] = 1;
        r[1] = 0b0000_0010;
        r[12] = 0x80;
        let states = f.decode(&r).expect("first report");
        assert_eq!(states.len(), 96);
        assert_eq!(states[1], (1, true));
        assert_eq!(states[95], (95, true));
        assert_eq!(states.iter().filter(|(_, p)| *p).count(), 2);

        assert!(f.decode(&r).is_none(), "identical bitmap is ignored");

        r[0] = 2;
        assert!(f.decode(&r).is_none(), "other report ids are ignored");
        assert!(f.decode(&[1, 0, 0]).is_none(), "short reports are ignored");
    }
}
