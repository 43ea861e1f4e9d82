//! USB bulk LCD driver.
//!
//! Handshake is a single 64-byte write and a read of up to 1 KiB. Frames
//! carry a 64-byte header; a transfer that ends exactly on a 512-byte
//! packet boundary must be terminated with a zero-length packet.

use crate::config::DriverConfig;
use crate::device::driver::{Connection, DeviceDriver, Opener};
use crate::device::transport::Transport;
use crate::error::{Result, TrccError};
use crate::protocol::{
    BULK_HANDSHAKE_READ_SIZE, DriverState, HandshakeResult, ProtocolKind, USB_BULK_ALIGNMENT,
    build_bulk_frame, build_bulk_handshake, parse_bulk_response,
};

/// Whether a transfer of `len` bytes needs a trailing zero-length packet.
pub fn needs_zlp(len: usize) -> bool {
    len > 0 && len % USB_BULK_ALIGNMENT == 0
}

pub struct BulkDriver {
    conn: Connection<dyn Transport>,
    config: DriverConfig,
    state: DriverState,
    info: Option<HandshakeResult>,
}

impl BulkDriver {
    pub fn new(opener: Opener<dyn Transport>, config: DriverConfig) -> Self {
        Self {
            conn: Connection::new(opener),
            config,
            state: DriverState::Closed,
            info: None,
        }
    }

    fn write_frame(&mut self, pixels: &[u8]) -> Result<()> {
        let packet = build_bulk_frame(pixels);
        let timeout = self.config.bulk_write_timeout();
        let transport = self.conn.get()?;

        transport.write(&packet, timeout)?;
        if needs_zlp(packet.len()) {
            tracing::debug!("Bulk frame of {} bytes is 512-aligned, sending ZLP", packet.len());
            transport.write(&[], timeout)?;
        }
        Ok(())
    }
}

impl DeviceDriver for BulkDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Bulk
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        let timeout = self.config.bulk_handshake_timeout();
        let transport = self.conn.get()?;
        self.state = DriverState::Open;

        transport.write(&build_bulk_handshake(), timeout)?;
        let resp = transport.read(BULK_HANDSHAKE_READ_SIZE, timeout)?;
        let result = parse_bulk_response(&resp);

        if result.is_ok() {
            tracing::info!(
                "Bulk handshake OK: pm={} sub={} resolution={}",
                result.model_id,
                result.sub_type,
                result.geometry
            );
            self.state = DriverState::Handshaken;
            self.info = Some(result.clone());
        } else {
            tracing::warn!(
                "Bulk handshake rejected: {} (raw: {})",
                result.error.as_deref().unwrap_or("invalid response"),
                result.raw_prefix_hex(48)
            );
        }
        Ok(result)
    }

    fn send_frame(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<()> {
        if matches!(self.state, DriverState::Closed | DriverState::Open) {
            let result = self.handshake()?;
            if let Some(reason) = result.error {
                return Err(TrccError::HandshakeFailed(reason));
            }
        }

        self.state = DriverState::Sending;
        match self.write_frame(pixels) {
            Ok(()) => {
                self.state = DriverState::Handshaken;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Bulk send failed: {}", e);
                self.state = DriverState::Open;
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.conn.close_with(|t| t.close());
        self.state = DriverState::Closed;
        self.info = None;
    }

    fn handshake_info(&self) -> Option<&HandshakeResult> {
        self.info.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockTransport;
    use crate::protocol::{BULK_MAGIC, BULK_PM_OFFSET, BULK_SUB_OFFSET, DisplayGeometry};

    fn response(pm: u8, sub: u8, len: usize) -> Vec<u8> {
        let mut resp = vec![0u8; len];
        resp[BULK_PM_OFFSET] = pm;
        if len > BULK_SUB_OFFSET {
            resp[BULK_SUB_OFFSET] = sub;
        }
        resp
    }

    fn driver(usb: &MockTransport) -> BulkDriver {
        BulkDriver::new(usb.opener(), DriverConfig::default())
    }

    #[test]
    fn test_handshake_pm_100() {
        let usb = MockTransport::new();
        usb.push_read(response(100, 7, 64));
        let mut drv = driver(&usb);

        let result = drv.handshake().unwrap();
        assert_eq!(result.resolution(), Some((320, 320)));
        assert_eq!(result.sub_type, 7);
        assert_eq!(drv.state(), DriverState::Handshaken);

        let sent = &usb.writes()[0];
        assert_eq!(sent.len(), 64);
        assert_eq!(&sent[..4], &BULK_MAGIC);
        assert_eq!(sent[56], 0x01);
    }

    #[test]
    fn test_handshake_rejects_pm_zero_and_short() {
        let usb = MockTransport::new();
        usb.push_read(response(0, 0, 64)).push_read(response(100, 0, 40));
        let mut drv = driver(&usb);

        let zero = drv.handshake().unwrap();
        assert!(!zero.is_ok());
        assert_eq!(zero.geometry, DisplayGeometry::Unknown);

        let short = drv.handshake().unwrap();
        assert_eq!(short.resolution(), None);
        assert_eq!(drv.state(), DriverState::Open);
    }

    #[test]
    fn test_unknown_pm_is_valid_but_unknown_geometry() {
        let usb = MockTransport::new();
        usb.push_read(response(77, 0, 64));
        let mut drv = driver(&usb);
        let result = drv.handshake().unwrap();
        assert!(result.is_ok());
        assert_eq!(result.geometry, DisplayGeometry::Unknown);
    }

    #[test]
    fn test_zlp_only_on_aligned_payload() {
        let usb = MockTransport::new();
        usb.push_read(response(100, 0, 64));
        let mut drv = driver(&usb);

        // 64 + 448 = 512
        drv.send_frame(&[0xAA; 448], 320, 320).unwrap();
        let writes = usb.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1].len(), 512);
        assert_eq!(&writes[1][60..64], &448u32.to_le_bytes());
        assert!(writes[2].is_empty());

        usb.clear_writes();
        drv.send_frame(&[0xAA; 449], 320, 320).unwrap();
        let writes = usb.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 513);
    }

    #[test]
    fn test_send_without_valid_handshake_fails() {
        let usb = MockTransport::new();
        usb.push_read(response(0, 0, 64));
        let mut drv = driver(&usb);
        let err = drv.send_frame(&[0; 8], 320, 320).unwrap_err();
        assert!(matches!(err, TrccError::HandshakeFailed(_)));
        assert_eq!(drv.state(), DriverState::Open);
    }

    #[test]
    fn test_write_failure_returns_to_open() {
        let usb = MockTransport::new();
        usb.push_read(response(100, 0, 64));
        usb.fail_writes_after(1);
        let mut drv = driver(&usb);
        assert!(drv.send_frame(&[0; 8], 320, 320).is_err());
        assert_eq!(drv.state(), DriverState::Open);
    }

    #[test]
    fn test_needs_zlp() {
        assert!(needs_zlp(512));
        assert!(needs_zlp(204_800));
        assert!(!needs_zlp(0));
        assert!(!needs_zlp(513));
    }
}
