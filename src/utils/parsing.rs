//! Parsing utilities for CLI arguments and configuration values.

use crate::device::registry::{DeviceDescriptor, TransportKind};
use crate::error::{Result, TrccError};
use crate::utils::image_processing::Rotation;

// =============================================================================
// Color Parsing
// =============================================================================

/// Parse a hex color string into RGB components.
///
/// Accepts formats: `#RRGGBB` or `RRGGBB`
///
/// # Example
/// ```
/// use trcc_rust_devices::utils::parsing::parse_hex_color;
///
/// let (r, g, b) = parse_hex_color("#FF5500").unwrap();
/// assert_eq!((r, g, b), (255, 85, 0));
/// ```
pub fn parse_hex_color(hex: &str) -> Result<(u8, u8, u8)> {
    let digits = hex.trim_start_matches('#');
    let invalid = || TrccError::InvalidInput(format!("Invalid color hex: {}", hex));
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
    Ok((channel(0)?, channel(2)?, channel(4)?))
}

// =============================================================================
// Device Parsing
// =============================================================================

fn parse_hex_u16(s: &str) -> Option<u16> {
    u16::from_str_radix(s.trim().trim_start_matches("0x"), 16).ok()
}

/// Parse `VID:PID` in hex, e.g. `0416:5302`.
pub fn parse_vid_pid(s: &str) -> Result<(u16, u16)> {
    s.split_once(':')
        .and_then(|(v, p)| Some((parse_hex_u16(v)?, parse_hex_u16(p)?)))
        .ok_or_else(|| TrccError::InvalidInput(format!("Expected VID:PID in hex, got '{}'", s)))
}

/// Parse `WIDTHxHEIGHT`, e.g. `320x320`.
pub fn parse_resolution(s: &str) -> Result<(u32, u32)> {
    s.to_lowercase()
        .split_once('x')
        .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)))
        .filter(|&(w, h): &(u32, u32)| w > 0 && h > 0)
        .ok_or_else(|| TrccError::InvalidInput(format!("Expected WIDTHxHEIGHT, got '{}'", s)))
}

/// Parse a display rotation in degrees (0, 90, 180, 270).
pub fn parse_rotation(s: &str) -> Result<Rotation> {
    match s.trim() {
        "0" => Ok(Rotation::None),
        "90" => Ok(Rotation::Deg90),
        "180" => Ok(Rotation::Deg180),
        "270" => Ok(Rotation::Deg270),
        other => Err(TrccError::InvalidInput(format!(
            "Unknown rotation '{}'. Use: 0, 90, 180 or 270",
            other
        ))),
    }
}

/// Parse a transport name: `scsi`, `bulk` or `hid`.
pub fn parse_transport(name: &str) -> Result<TransportKind> {
    match name.to_lowercase().as_str() {
        "scsi" => Ok(TransportKind::Scsi),
        "bulk" | "usb" => Ok(TransportKind::UsbBulk),
        "hid" => Ok(TransportKind::UsbHid),
        _ => Err(TrccError::InvalidInput(format!(
            "Unknown transport '{}'. Use: scsi, bulk or hid",
            name
        ))),
    }
}

/// Build a descriptor from CLI input.
///
/// Known VID:PID pairs take their transport and type from the device
/// table; anything else needs an explicit transport.
pub fn parse_device(
    vid_pid: &str,
    path: Option<&str>,
    transport: Option<&str>,
) -> Result<DeviceDescriptor> {
    let (vid, pid) = parse_vid_pid(vid_pid)?;
    let path = path.unwrap_or_default();

    if let Some(name) = transport {
        let kind = parse_transport(name)?;
        return Ok(match DeviceDescriptor::from_known(vid, pid, path) {
            Some(desc) if desc.transport == kind => desc,
            _ => DeviceDescriptor::new(vid, pid, kind, path),
        });
    }

    DeviceDescriptor::from_known(vid, pid, path).ok_or_else(|| {
        TrccError::DeviceNotFound(format!(
            "{:04x}:{:04x} is not a known device; pass --transport",
            vid, pid
        ))
    })
}

// =============================================================================
// Tests
// =============================================================================
