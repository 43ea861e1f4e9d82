//! ARGB LED controller tables.
//!
//! The PM byte from the LED handshake selects a device style (LED count,
//! segment count, zones). Some styles wire their LEDs in a different order
//! than the logical layout and need a remap before sending.

use std::fmt;

use crate::protocol::commands::{LED_POWER_SCALE, build_led_data};

/// Static description of one LED device layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedDeviceStyle {
    pub style_id: u8,
    pub led_count: usize,
    pub segment_count: usize,
    pub zone_count: usize,
    pub model_name: &'static str,
}

const fn style(
    style_id: u8,
    led_count: usize,
    segment_count: usize,
    zone_count: usize,
    model_name: &'static str,
) -> LedDeviceStyle {
    LedDeviceStyle {
        style_id,
        led_count,
        segment_count,
        zone_count,
        model_name,
    }
}

/// All known styles, indexed by `style_id - 1`.
pub const LED_STYLES: [LedDeviceStyle; 13] = [
    style(1, 30, 10, 1, "AX120_DIGITAL"),
    style(2, 84, 18, 4, "PA120_DIGITAL"),
    style(3, 64, 10, 2, "AK120_DIGITAL"),
    style(4, 31, 14, 1, "LC1"),
    style(5, 93, 23, 2, "LF8"),
    style(6, 124, 72, 2, "LF12"),
    style(7, 116, 12, 3, "LF10"),
    style(8, 18, 13, 4, "CZ1"),
    style(9, 61, 31, 1, "LC2"),
    style(10, 38, 17, 1, "LF11"),
    style(11, 93, 72, 2, "LF15"),
    style(12, 62, 62, 1, "LF13"),
    style(13, 31, 14, 1, "HR10_2280_PRO_DIGITAL"),
];

/// Style used to drive a controller whose PM is not in the registry.
pub const FALLBACK_STYLE_ID: u8 = 1;

pub fn style_by_id(style_id: u8) -> Option<&'static LedDeviceStyle> {
    LED_STYLES.iter().find(|s| s.style_id == style_id)
}

// =============================================================================
// PM Registry
// =============================================================================

/// Registry entry for a PM byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmEntry {
    pub style_id: u8,
    pub model_name: &'static str,
}

/// Look up a PM/SUB pair. Sub-type overrides are checked first.
pub fn resolve_pm(pm: u8, sub: u8) -> Option<PmEntry> {
    let entry = |style_id, model_name| Some(PmEntry { style_id, model_name });
    match (pm, sub) {
        (128, 129) => entry(13, "HR10_2280_PRO_DIGITAL"),
        (1, _) => entry(1, "FROZEN_HORIZON_PRO"),
        (2, _) => entry(1, "FROZEN_MAGIC_PRO"),
        (3, _) => entry(1, "AX120_DIGITAL"),
        (16, _) => entry(2, "PA120_DIGITAL"),
        (23, _) => entry(2, "RK120_DIGITAL"),
        (17..=31, _) => entry(2, "PA120_DIGITAL"),
        (32, _) => entry(3, "AK120_DIGITAL"),
        (48, _) => entry(5, "LF8"),
        (49, _) => entry(5, "LF10"),
        (80, _) => entry(6, "LF12"),
        (96, _) => entry(7, "LF10"),
        (112, _) => entry(9, "LC2"),
        (128, _) => entry(4, "LC1"),
        (129, _) => entry(10, "LF11"),
        (144, _) => entry(11, "LF15"),
        (160, _) => entry(12, "LF13"),
        (208, _) => entry(8, "CZ1"),
        _ => None,
    }
}

/// Style resolved from a handshake, or an explicit unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleLookup {
    Known {
        style: &'static LedDeviceStyle,
        model_name: &'static str,
    },
    Unknown {
        pm: u8,
        sub: u8,
    },
}

impl StyleLookup {
    pub fn known(&self) -> Option<&'static LedDeviceStyle> {
        match self {
            StyleLookup::Known { style, .. } => Some(style),
            StyleLookup::Unknown { .. } => None,
        }
    }

    /// Style to drive the hardware with; unknown devices use the fallback layout.
    pub fn effective_style(&self) -> &'static LedDeviceStyle {
        match self {
            StyleLookup::Known { style, .. } => style,
            StyleLookup::Unknown { .. } => &LED_STYLES[(FALLBACK_STYLE_ID - 1) as usize],
        }
    }

    pub fn model_name(&self) -> String {
        match self {
            StyleLookup::Known { model_name, .. } => (*model_name).to_string(),
            StyleLookup::Unknown { pm, .. } => format!("Unknown (pm={})", pm),
        }
    }
}

impl fmt::Display for StyleLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleLookup::Known { style, model_name } => write!(
                f,
                "{} (style {}, {} LEDs, {} segments, {} zones)",
                model_name, style.style_id, style.led_count, style.segment_count, style.zone_count
            ),
            StyleLookup::Unknown { pm, sub } => {
                write!(f, "unknown style (pm={}, sub={})", pm, sub)
            }
        }
    }
}

pub fn resolve_style(pm: u8, sub: u8) -> StyleLookup {
    match resolve_pm(pm, sub).and_then(|e| style_by_id(e.style_id).map(|s| (s, e.model_name))) {
        Some((style, model_name)) => StyleLookup::Known { style, model_name },
        None => StyleLookup::Unknown { pm, sub },
    }
}

// =============================================================================
// Remap Tables
// =============================================================================
// Physical wire position i takes the color of logical LED table[i].

#[rustfmt::skip]
const REMAP_STYLE_2: [usize; 84] = [
    3, 2, 14, 9, 10, 15, 13, 12, 11,
    21, 16, 17, 22, 20, 19, 18,
    28, 23, 24, 29, 27, 26, 25,
    36, 31, 32, 37, 35, 34, 33,
    43, 38, 39, 44, 42, 41, 40,
    8, 8,
    75, 76, 77, 79, 74, 73, 78,
    68, 69, 70, 72, 67, 66, 71,
    82, 83, 6, 7,
    61, 62, 63, 65, 60, 59, 64,
    54, 55, 56, 58, 53, 52, 57,
    47, 48, 49, 51, 46, 45, 50,
    4, 5, 6, 7, 81, 80,
];

#[rustfmt::skip]
const REMAP_STYLE_3: [usize; 64] = [
    1, 25, 26, 27, 29, 24, 23, 28,
    17, 2, 16, 21, 22, 18, 19, 20,
    10, 9, 14, 15, 11, 12, 13,
    36, 31, 32, 37, 35, 34, 33,
    43, 38, 39, 44, 42, 41, 40,
    50, 45, 46, 51, 49, 48, 47,
    6, 7, 8,
    61, 62, 63, 65, 60, 59, 64,
    54, 4, 55, 56, 58, 53, 52, 57,
    67, 68,
];

// Shared by LC1 (style 4) and HR10 (style 13).
#[rustfmt::skip]
const REMAP_STYLE_4: [usize; 31] = [
    2, 1, 33, 34, 35, 37, 32, 31, 6,
    36, 25, 26, 27, 29, 24, 23, 28,
    18, 19, 20, 22, 17, 16, 21,
    11, 12, 13, 15, 10, 9, 14,
];

pub fn remap_table(style_id: u8) -> Option<&'static [usize]> {
    match style_id {
        2 => Some(&REMAP_STYLE_2),
        3 => Some(&REMAP_STYLE_3),
        4 | 13 => Some(&REMAP_STYLE_4),
        _ => None,
    }
}

/// Reorder logical colors into wire order. Indices past the input are black.
pub fn remap_led_colors(colors: &[[u8; 3]], style_id: u8) -> Vec<[u8; 3]> {
    match remap_table(style_id) {
        Some(table) => table
            .iter()
            .map(|&idx| colors.get(idx).copied().unwrap_or([0, 0, 0]))
            .collect(),
        None => colors.to_vec(),
    }
}

// =============================================================================
// Packet Building
// =============================================================================

/// Per-send LED output options.
#[derive(Debug, Clone, PartialEq)]
pub struct LedOutput {
    /// Per-LED on/off. `None` means all on.
    pub is_on: Option<Vec<bool>>,
    pub global_on: bool,
    /// 0-100.
    pub brightness: u8,
}

impl Default for LedOutput {
    fn default() -> Self {
        Self {
            is_on: None,
            global_on: true,
            brightness: 100,
        }
    }
}

/// Build a complete LED data packet (header + scaled RGB payload).
pub fn build_led_packet(colors: &[[u8; 3]], output: &LedOutput) -> Vec<u8> {
    let factor = output.brightness.min(100) as f32 / 100.0;
    let mut payload = Vec::with_capacity(colors.len() * 3);
    for (i, color) in colors.iter().enumerate() {
        let on = output.global_on
            && output
                .is_on
                .as_ref()
                .is_none_or(|flags| flags.get(i).copied().unwrap_or(true));
        for &c in color {
            let scaled = if on {
                (c as f32 * factor * LED_POWER_SCALE) as u8
            } else {
                0
            };
            payload.push(scaled);
        }
    }
    build_led_data(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_table_consistency() {
        for (i, s) in LED_STYLES.iter().enumerate() {
            assert_eq!(s.style_id as usize, i + 1);
        }
        assert_eq!(style_by_id(6).unwrap().led_count, 124);
        assert!(style_by_id(14).is_none());
    }

    #[test]
    fn test_pm_registry() {
        assert_eq!(resolve_pm(16, 0).unwrap().style_id, 2);
        assert_eq!(resolve_pm(23, 0).unwrap().model_name, "RK120_DIGITAL");
        assert_eq!(resolve_pm(31, 0).unwrap().model_name, "PA120_DIGITAL");
        assert_eq!(resolve_pm(128, 0).unwrap().style_id, 4);
        assert_eq!(resolve_pm(128, 129).unwrap().style_id, 13);
        assert_eq!(resolve_pm(208, 5).unwrap().model_name, "CZ1");
        assert!(resolve_pm(0, 0).is_none());
        assert!(resolve_pm(33, 0).is_none());
    }

    #[test]
    fn test_unknown_style_still_drivable() {
        let lookup = resolve_style(99, 0);
        assert!(lookup.known().is_none());
        assert_eq!(lookup.effective_style().led_count, 30);
        assert_eq!(lookup.model_name(), "Unknown (pm=99)");
        assert!(lookup.to_string().contains("unknown style"));
    }

    #[test]
    fn test_remap_tables_match_style_sizes() {
        for id in [2u8, 3, 4, 13] {
            let table = remap_table(id).unwrap();
            assert_eq!(table.len(), style_by_id(id).unwrap().led_count);
        }
        assert!(remap_table(1).is_none());
    }

    #[test]
    fn test_remap_colors() {
        let colors: Vec<[u8; 3]> = (0..31u8).map(|i| [i, 0, 0]).collect();
        let out = remap_led_colors(&colors, 4);
        assert_eq!(out.len(), 31);
        assert_eq!(out[0], [2, 0, 0]);
        // Logical index 33 is past 31 input colors.
        assert_eq!(out[2], [0, 0, 0]);

        let identity = remap_led_colors(&colors, 1);
        assert_eq!(identity, colors);
    }

    #[test]
    fn test_led_packet_scaling() {
        let colors = [[255u8, 100, 0], [255, 255, 255]];
        let packet = build_led_packet(&colors, &LedOutput::default());
        assert_eq!(packet.len(), 26);
        assert_eq!(&packet[20..23], &[102, 40, 0]);

        let half = LedOutput {
            brightness: 50,
            is_on: Some(vec![true, false]),
            ..LedOutput::default()
        };
        let packet = build_led_packet(&colors, &half);
        assert_eq!(&packet[20..23], &[51, 20, 0]);
        assert_eq!(&packet[23..26], &[0, 0, 0]);

        let off = LedOutput {
            global_on: false,
            ..LedOutput::default()
        };
        assert!(build_led_packet(&colors, &off)[20..].iter().all(|&b| b == 0));
    }
}
