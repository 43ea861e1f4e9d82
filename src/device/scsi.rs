//! SCSI-generic LCD driver.
//!
//! These panels enumerate as USB mass storage and accept vendor commands
//! through SCSI passthrough. Before the first frame the device is polled
//! (waiting out its boot signature) and then initialized; frames go out
//! in 64 KiB chunks, each with its own CRC-protected header.

use crate::config::DriverConfig;
use crate::device::driver::{Connection, DeviceDriver, Opener};
use crate::device::transport::{ScsiPassthrough, Sleeper};
use crate::error::Result;
use crate::protocol::{
    DriverState, HandshakeResult, ProtocolKind, SCSI_BOOT_SIGNATURE, SCSI_CHUNK_SIZE,
    SCSI_CMD_INIT, SCSI_CMD_POLL, SCSI_POLL_SIZE, build_scsi_header, parse_scsi_poll,
    scsi_frame_command,
};
use crate::utils::image_processing::{chunk_frame, frame_size};

/// One piece of a size-split frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChunk {
    pub command: u32,
    pub offset: usize,
    pub len: usize,
}

/// Chunk commands for a frame at `width` x `height` RGB565.
pub fn frame_chunks(width: u32, height: u32) -> Vec<FrameChunk> {
    chunk_frame(frame_size(width, height), SCSI_CHUNK_SIZE)
        .into_iter()
        .enumerate()
        .map(|(index, (offset, len))| FrameChunk {
            command: scsi_frame_command(index),
            offset,
            len,
        })
        .collect()
}

fn is_booting(resp: &[u8]) -> bool {
    resp.len() >= 8 && resp[4..8] == SCSI_BOOT_SIGNATURE
}

/// Driver for one SCSI LCD node (e.g. `/dev/sg1`).
pub struct ScsiDriver {
    device_path: String,
    conn: Connection<dyn ScsiPassthrough>,
    sleeper: Box<dyn Sleeper>,
    config: DriverConfig,
    /// Resolution from discovery, used when the poll byte is not recognized.
    fallback_resolution: Option<(u32, u32)>,
    state: DriverState,
    info: Option<HandshakeResult>,
}

impl ScsiDriver {
    pub fn new(
        device_path: impl Into<String>,
        opener: Opener<dyn ScsiPassthrough>,
        sleeper: Box<dyn Sleeper>,
        config: DriverConfig,
    ) -> Self {
        Self {
            device_path: device_path.into(),
            conn: Connection::new(opener),
            sleeper,
            config,
            fallback_resolution: Some((320, 320)),
            state: DriverState::Closed,
            info: None,
        }
    }

    pub fn with_fallback_resolution(mut self, resolution: Option<(u32, u32)>) -> Self {
        self.fallback_resolution = resolution;
        self
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Poll with boot-signature retries, then init. Returns the last poll response.
    fn init_device(&mut self) -> Result<Vec<u8>> {
        let poll = build_scsi_header(SCSI_CMD_POLL, SCSI_POLL_SIZE as u32);
        let timeout = self.config.scsi_command_timeout();
        let max_retries = self.config.scsi_boot_max_retries;

        let mut response = Vec::new();
        for attempt in 1..=max_retries {
            response = self.conn.get()?.read(&poll, SCSI_POLL_SIZE, timeout)?;
            if !is_booting(&response) {
                break;
            }
            tracing::info!(
                "Device {} still booting (attempt {}/{}), waiting {:?}",
                self.device_path,
                attempt,
                max_retries,
                self.config.scsi_boot_wait()
            );
            self.sleeper.sleep(self.config.scsi_boot_wait());
        }
        if is_booting(&response) {
            tracing::warn!(
                "Device {} still reports boot signature, sending init anyway",
                self.device_path
            );
        }

        let init = build_scsi_header(SCSI_CMD_INIT, SCSI_POLL_SIZE as u32);
        self.conn
            .get()?
            .write(&init, &vec![0u8; SCSI_POLL_SIZE], timeout)?;
        self.sleeper.sleep(self.config.scsi_post_init());
        Ok(response)
    }

    fn write_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let chunks = frame_chunks(width, height);
        let total = chunks.iter().map(|c| c.len).sum::<usize>();

        let mut data = pixels.to_vec();
        if data.len() < total {
            data.resize(total, 0);
        }

        let timeout = self.config.scsi_command_timeout();
        let transport = self.conn.get()?;
        for chunk in &chunks {
            let header = build_scsi_header(chunk.command, chunk.len as u32);
            transport.write(&header, &data[chunk.offset..chunk.offset + chunk.len], timeout)?;
        }
        Ok(())
    }
}

impl DeviceDriver for ScsiDriver {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Scsi
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        self.conn.get()?;
        self.state = DriverState::Open;

        let response = match self.init_device() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("SCSI init failed ({}): {}", self.device_path, e);
                return Err(e);
            }
        };

        let result = parse_scsi_poll(&response, self.fallback_resolution);
        tracing::info!(
            "SCSI handshake OK: {} resolution={} (poll: {})",
            self.device_path,
            result.geometry,
            result.raw_prefix_hex(8)
        );
        self.state = DriverState::Handshaken;
        self.info = Some(result.clone());
        Ok(result)
    }

    fn send_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        if matches!(self.state, DriverState::Closed | DriverState::Open) {
            self.handshake()?;
        }

        self.state = DriverState::Sending;
        match self.write_frame(pixels, width, height) {
            Ok(()) => {
                self.state = DriverState::Handshaken;
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "SCSI send failed ({}): {}; device will be re-initialized",
                    self.device_path,
                    e
                );
                self.state = DriverState::Open;
                self.info = None;
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.conn.close_with(|_| {});
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
    use crate::device::mock::{MockScsi, RecordingSleeper, ScsiCommand};
    use std::time::Duration;

    fn booting_response() -> Vec<u8> {
        let mut resp = vec![0u8; 64];
        resp[4..8].copy_from_slice(&SCSI_BOOT_SIGNATURE);
        resp
    }

    fn ready_response(fbl: u8) -> Vec<u8> {
        let mut resp = vec![0u8; 64];
        resp[0] = fbl;
        resp
    }

    fn driver(scsi: &MockScsi, sleeper: &RecordingSleeper) -> ScsiDriver {
        ScsiDriver::new(
            "/dev/sg9",
            scsi.opener(),
            Box::new(sleeper.clone()),
            DriverConfig::default(),
        )
    }

    #[test]
    fn test_frame_chunks() {
        let chunks = frame_chunks(320, 320);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].command, 0x0001_01F5);
        assert_eq!(chunks[3].command, 0x0301_01F5);
        assert_eq!(chunks[3].len, 0x2000);
        assert_eq!(frame_chunks(480, 480).len(), 8);
    }

    #[test]
    fn test_boot_signature_waits_once() {
        let scsi = MockScsi::new();
        scsi.push_poll(booting_response()).push_poll(ready_response(100));
        let sleeper = RecordingSleeper::new();
        let mut drv = driver(&scsi, &sleeper);

        let result = drv.handshake().unwrap();
        assert_eq!(result.resolution(), Some((320, 320)));
        assert_eq!(drv.state(), DriverState::Handshaken);

        assert_eq!(sleeper.count(Duration::from_secs(3)), 1);
        assert_eq!(scsi.count(SCSI_CMD_POLL), 2);
        assert_eq!(scsi.count(SCSI_CMD_INIT), 1);

        let commands = scsi.commands();
        assert!(matches!(commands[2], ScsiCommand::Write { data_len: 0xE100, .. }));
    }

    #[test]
    fn test_boot_signature_exhausts_retries_then_inits() {
        let scsi = MockScsi::new();
        for _ in 0..10 {
            scsi.push_poll(booting_response());
        }
        let sleeper = RecordingSleeper::new();
        let mut drv = driver(&scsi, &sleeper);

        drv.handshake().unwrap();
        let retries = DriverConfig::default().scsi_boot_max_retries as usize;
        assert_eq!(scsi.count(SCSI_CMD_POLL), retries);
        assert_eq!(sleeper.count(Duration::from_secs(3)), retries);
        assert_eq!(scsi.count(SCSI_CMD_INIT), 1);
    }

    #[test]
    fn test_send_frame_initializes_once() {
        let scsi = MockScsi::new();
        scsi.push_poll(ready_response(100));
        let sleeper = RecordingSleeper::new();
        let mut drv = driver(&scsi, &sleeper);

        let frame = vec![0xAB; 320 * 320 * 2];
        drv.send_frame(&frame, 320, 320).unwrap();
        drv.send_frame(&frame, 320, 320).unwrap();

        assert_eq!(scsi.count(SCSI_CMD_INIT), 1);
        let frame_writes: Vec<_> = scsi
            .commands()
            .into_iter()
            .filter(|c| c.code() & 0xFFFF == 0x01F5 && c.code() != SCSI_CMD_INIT)
            .collect();
        assert_eq!(frame_writes.len(), 8);
        for cmd in &frame_writes {
            if let ScsiCommand::Write { header, .. } = cmd {
                assert_eq!(header.len(), 20);
                let crc = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
                assert_eq!(crc, crc32fast::hash(&header[..16]));
            }
        }
    }

    #[test]
    fn test_short_frame_is_padded() {
        let scsi = MockScsi::new();
        let sleeper = RecordingSleeper::new();
        let mut drv = driver(&scsi, &sleeper);

        drv.send_frame(&[1, 2, 3], 240, 240).unwrap();
        let total: usize = scsi
            .commands()
            .iter()
            .filter_map(|c| match c {
                ScsiCommand::Write { header, data_len } if header[0] == 0xF5 && header[1] == 0x01 && header[2] == 0x01 => Some(*data_len),
                _ => None,
            })
            .sum();
        assert_eq!(total, 240 * 240 * 2);
    }

    #[test]
    fn test_send_failure_forces_reinit() {
        let scsi = MockScsi::new();
        let sleeper = RecordingSleeper::new();
        let mut drv = driver(&scsi, &sleeper);
        let frame = vec![0u8; 320 * 320 * 2];

        drv.send_frame(&frame, 320, 320).unwrap();
        scsi.set_fail_writes(true);
        assert!(drv.send_frame(&frame, 320, 320).is_err());
        assert_eq!(drv.state(), DriverState::Open);

        scsi.set_fail_writes(false);
        drv.send_frame(&frame, 320, 320).unwrap();
        assert_eq!(scsi.count(SCSI_CMD_INIT), 2);
    }

    #[test]
    fn test_close_returns_to_closed() {
        let scsi = MockScsi::new();
        let sleeper = RecordingSleeper::new();
        let mut drv = driver(&scsi, &sleeper);
        drv.handshake().unwrap();
        drv.close();
        assert_eq!(drv.state(), DriverState::Closed);
        assert!(drv.handshake_info().is_none());
    }
}
