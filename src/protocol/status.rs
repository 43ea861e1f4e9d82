//! Handshake response parsing for Thermalright devices.
//!
//! Turns raw handshake responses into a structured [`HandshakeResult`].
//! Resolution tables come from the vendor firmware; there is no formula.

use std::fmt;

use crate::protocol::commands::{
    BULK_MIN_RESPONSE, BULK_PM_OFFSET, BULK_SUB_OFFSET, LED_MIN_RESPONSE, TYPE2_MAGIC,
    TYPE3_FBL_CODES,
};
use crate::protocol::led::{StyleLookup, resolve_style};

// =============================================================================
// Protocol / State Enums
// =============================================================================

/// Wire protocol spoken by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Scsi,
    HidType2,
    HidType3,
    Bulk,
    Led,
    KvmLed,
}

impl ProtocolKind {
    pub fn name(self) -> &'static str {
        match self {
            ProtocolKind::Scsi => "SCSI (sg_raw)",
            ProtocolKind::HidType2 => "HID Type 2",
            ProtocolKind::HidType3 => "HID Type 3",
            ProtocolKind::Bulk => "USB Bulk",
            ProtocolKind::Led => "LED (HID 64-byte)",
            ProtocolKind::KvmLed => "KVM LED",
        }
    }

    pub fn is_led(self) -> bool {
        matches!(self, ProtocolKind::Led | ProtocolKind::KvmLed)
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Driver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No transport handle.
    Closed,
    /// Transport open, no valid handshake.
    Open,
    /// Handshake succeeded; frames may be sent.
    Handshaken,
    /// A frame send is in progress.
    Sending,
}

/// Panel geometry reported by the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayGeometry {
    Known { width: u32, height: u32 },
    Unknown,
}

impl DisplayGeometry {
    pub fn from_option(res: Option<(u32, u32)>) -> Self {
        match res {
            Some((width, height)) => DisplayGeometry::Known { width, height },
            None => DisplayGeometry::Unknown,
        }
    }

    pub fn resolution(self) -> Option<(u32, u32)> {
        match self {
            DisplayGeometry::Known { width, height } => Some((width, height)),
            DisplayGeometry::Unknown => None,
        }
    }
}

impl fmt::Display for DisplayGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayGeometry::Known { width, height } => write!(f, "{}x{}", width, height),
            DisplayGeometry::Unknown => f.write_str("unknown"),
        }
    }
}

// =============================================================================
// Handshake Result
// =============================================================================

/// Outcome of one handshake exchange.
///
/// A device that answers with an unrecognized payload still yields a
/// result; `error` then carries the reason and `geometry` is `Unknown`.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResult {
    pub protocol: ProtocolKind,
    pub geometry: DisplayGeometry,
    /// PM byte (or FBL for Type 3).
    pub model_id: u8,
    /// SUB byte.
    pub sub_type: u8,
    pub fbl: Option<u8>,
    pub serial: Option<String>,
    /// LED controllers only.
    pub led_style: Option<StyleLookup>,
    pub raw_response: Vec<u8>,
    pub error: Option<String>,
}

impl HandshakeResult {
    /// A result for a recognized device.
    pub fn new(protocol: ProtocolKind, geometry: DisplayGeometry, raw: &[u8]) -> Self {
        Self {
            protocol,
            geometry,
            model_id: 0,
            sub_type: 0,
            fbl: None,
            serial: None,
            led_style: None,
            raw_response: raw.to_vec(),
            error: None,
        }
    }

    /// A result for a device that answered with something unusable.
    pub fn failed(protocol: ProtocolKind, raw: &[u8], reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(protocol, DisplayGeometry::Unknown, raw)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.geometry.resolution()
    }

    /// First bytes of the raw response as spaced hex, for logs.
    pub fn raw_prefix_hex(&self, n: usize) -> String {
        hex_spaced(&self.raw_response[..self.raw_response.len().min(n)])
    }
}

impl fmt::Display for HandshakeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Protocol:   {}", self.protocol)?;
        writeln!(f, "Resolution: {}", self.geometry)?;
        writeln!(f, "PM / SUB:   {} / {}", self.model_id, self.sub_type)?;
        if let Some(fbl) = self.fbl {
            writeln!(f, "FBL:        {}", fbl)?;
        }
        if let Some(serial) = &self.serial {
            writeln!(f, "Serial:     {}", serial)?;
        }
        if let Some(style) = &self.led_style {
            writeln!(f, "LED style:  {}", style)?;
        }
        if let Some(err) = &self.error {
            writeln!(f, "Error:      {}", err)?;
        }
        write!(f, "Raw:        {}", self.raw_prefix_hex(32))
    }
}

pub(crate) fn hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

// =============================================================================
// Resolution Tables
// =============================================================================

/// FBL byte to resolution. FBL 224 depends on PM.
pub fn fbl_to_resolution(fbl: u8, pm: u8) -> Option<(u32, u32)> {
    let res = match fbl {
        36 | 37 => (240, 240),
        50 => (240, 320),
        51 => (320, 240),
        54 => (360, 360),
        64 => (640, 480),
        72 => (480, 480),
        100..=102 => (320, 320),
        114 => (1600, 720),
        128 => (1280, 480),
        192 => (1920, 462),
        224 => match pm {
            10 => (960, 540),
            12 => (800, 480),
            _ => (854, 480),
        },
        _ => return None,
    };
    Some(res)
}

/// Type 2 PM/SUB to FBL. Most PMs equal their FBL.
pub fn pm_to_fbl(pm: u8, sub: u8) -> u8 {
    match (pm, sub) {
        (1, 48) => 114,
        (1, 49) => 192,
        (5, _) => 50,
        (7, _) => 64,
        (9..=12, _) => 224,
        (32, _) => 100,
        (64, _) => 114,
        (65, _) => 192,
        _ => pm,
    }
}

/// Bulk PM byte to resolution.
pub fn bulk_pm_to_resolution(pm: u8) -> Option<(u32, u32)> {
    match pm {
        36 => Some((240, 240)),
        50 => Some((240, 320)),
        51 => Some((320, 240)),
        100 => Some((320, 320)),
        101 => Some((480, 480)),
        _ => None,
    }
}

// =============================================================================
// Response Parsers
// =============================================================================

/// Parse a Type 2 HID handshake response.
pub fn parse_type2_response(resp: &[u8]) -> HandshakeResult {
    if resp.len() < 20 || resp[0..4] != TYPE2_MAGIC || resp[12] != 0x01 {
        return HandshakeResult::failed(
            ProtocolKind::HidType2,
            resp,
            format!("invalid Type 2 response ({} bytes)", resp.len()),
        );
    }

    let pm = resp[5];
    let sub = resp[4];
    let fbl = pm_to_fbl(pm, sub);
    let serial = (resp.len() > 36 && resp[16] == 0x10).then(|| hex_upper(&resp[20..36]));

    HandshakeResult {
        model_id: pm,
        sub_type: sub,
        fbl: Some(fbl),
        serial,
        ..HandshakeResult::new(
            ProtocolKind::HidType2,
            DisplayGeometry::from_option(fbl_to_resolution(fbl, pm)),
            resp,
        )
    }
}

/// Parse a Type 3 HID handshake response.
pub fn parse_type3_response(resp: &[u8]) -> HandshakeResult {
    if resp.len() < 14 || !TYPE3_FBL_CODES.contains(&resp[0]) {
        return HandshakeResult::failed(
            ProtocolKind::HidType3,
            resp,
            format!("invalid Type 3 response ({} bytes)", resp.len()),
        );
    }

    let fbl = resp[0] - 1;
    HandshakeResult {
        model_id: fbl,
        fbl: Some(fbl),
        serial: Some(hex_upper(&resp[10..14])),
        ..HandshakeResult::new(
            ProtocolKind::HidType3,
            DisplayGeometry::from_option(fbl_to_resolution(fbl, 0)),
            resp,
        )
    }
}

/// Parse a USB bulk handshake response.
pub fn parse_bulk_response(resp: &[u8]) -> HandshakeResult {
    if resp.len() < BULK_MIN_RESPONSE || resp[BULK_PM_OFFSET] == 0 {
        let pm = resp.get(BULK_PM_OFFSET).copied();
        return HandshakeResult::failed(
            ProtocolKind::Bulk,
            resp,
            format!(
                "bulk handshake rejected (len={}, pm={:?})",
                resp.len(),
                pm
            ),
        );
    }

    let pm = resp[BULK_PM_OFFSET];
    HandshakeResult {
        model_id: pm,
        sub_type: resp[BULK_SUB_OFFSET],
        ..HandshakeResult::new(
            ProtocolKind::Bulk,
            DisplayGeometry::from_option(bulk_pm_to_resolution(pm)),
            resp,
        )
    }
}

/// Parse an LED controller init response.
///
/// The vendor tool does not validate the magic, so a mismatch is only logged.
pub fn parse_led_response(protocol: ProtocolKind, resp: &[u8]) -> HandshakeResult {
    if resp.len() < LED_MIN_RESPONSE {
        return HandshakeResult::failed(
            protocol,
            resp,
            format!("LED response too short ({} bytes)", resp.len()),
        );
    }
    if resp[0..4] != TYPE2_MAGIC {
        tracing::warn!(
            "LED handshake: unexpected magic {} (expected {})",
            hex_spaced(&resp[0..4]),
            hex_spaced(&TYPE2_MAGIC)
        );
    }

    let pm = resp[5];
    let sub = resp[4];
    HandshakeResult {
        model_id: pm,
        sub_type: sub,
        led_style: Some(resolve_style(pm, sub)),
        ..HandshakeResult::new(protocol, DisplayGeometry::Unknown, resp)
    }
}

/// Interpret a SCSI poll response. Byte 0 is the panel's FBL code.
pub fn parse_scsi_poll(resp: &[u8], fallback: Option<(u32, u32)>) -> HandshakeResult {
    let fbl = resp.first().copied().filter(|&b| b != 0);
    let geometry = fbl
        .and_then(|code| fbl_to_resolution(code, 0))
        .or(fallback);
    HandshakeResult {
        model_id: fbl.unwrap_or(0),
        fbl,
        ..HandshakeResult::new(
            ProtocolKind::Scsi,
            DisplayGeometry::from_option(geometry),
            &resp[..resp.len().min(64)],
        )
    }
}
