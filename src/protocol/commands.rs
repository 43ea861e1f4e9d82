//! Wire constants and packet builders for Thermalright LCD/LED controllers.
//!
//! Protocol reverse-engineered from the vendor USBLCD / TRCC Windows tools.
//! Every byte offset here is part of the hardware contract.

use crate::utils::binary_cursor::BinaryWriter;

// =============================================================================
// USB Identifiers
// =============================================================================

/// Winbond-based SCSI LCD (USB mass storage).
pub const SCSI_VID_87CD: u16 = 0x87CD;
pub const SCSI_PID_70DB: u16 = 0x70DB;
/// Nuvoton-based SCSI LCD.
pub const SCSI_VID_0416: u16 = 0x0416;
pub const SCSI_PID_5406: u16 = 0x5406;
/// ALi-based SCSI LCD.
pub const SCSI_VID_0402: u16 = 0x0402;
pub const SCSI_PID_3922: u16 = 0x3922;

/// Winbond HID LCD, Type 2 ("H" variant).
pub const HID_TYPE2_VID: u16 = 0x0416;
pub const HID_TYPE2_PID_5302: u16 = 0x5302;
pub const HID_TYPE2_PID_530A: u16 = 0x530A;

/// ALi HID LCD, Type 3.
pub const HID_TYPE3_VID: u16 = 0x0418;
pub const HID_TYPE3_PID_5303: u16 = 0x5303;
pub const HID_TYPE3_PID_5304: u16 = 0x5304;
/// Winbond-branded Type 3 variant.
pub const HID_TYPE3_ALT_VID: u16 = 0x0416;
pub const HID_TYPE3_ALT_PID: u16 = 0x53E6;

/// ARGB LED controller (all LED models share this PID).
pub const LED_VID: u16 = 0x0416;
pub const LED_PID: u16 = 0x8001;

// =============================================================================
// SCSI
// =============================================================================

/// Size of every SCSI command header.
pub const SCSI_HEADER_LEN: usize = 20;
/// Bytes of the header passed as the CDB.
pub const SCSI_CDB_LEN: usize = 16;

pub const SCSI_CMD_POLL: u32 = 0xF5;
pub const SCSI_CMD_INIT: u32 = 0x1F5;
/// Frame chunk base command; chunk index goes in bits 24 and up.
pub const SCSI_CMD_FRAME_BASE: u32 = 0x101F5;

/// Poll read length and init payload length.
pub const SCSI_POLL_SIZE: usize = 0xE100;
/// Maximum bytes per frame chunk.
pub const SCSI_CHUNK_SIZE: usize = 0x10000;

/// Reported at poll bytes [4..8] while the display controller boots.
pub const SCSI_BOOT_SIGNATURE: [u8; 4] = [0xA1, 0xA2, 0xA3, 0xA4];

/// Build a 20-byte SCSI header: cmd, 8 zero bytes, size, CRC32 of the first 16 bytes.
pub fn build_scsi_header(cmd: u32, size: u32) -> [u8; SCSI_HEADER_LEN] {
    let mut w = BinaryWriter::with_capacity(SCSI_HEADER_LEN);
    w.write_u32(cmd);
    w.write_fill(0, 8);
    w.write_u32(size);
    let head = w.into_inner();

    let crc = crc32fast::hash(&head);
    let mut header = [0u8; SCSI_HEADER_LEN];
    header[..16].copy_from_slice(&head);
    header[16..].copy_from_slice(&crc.to_le_bytes());
    header
}

/// Command code for frame chunk `index`.
pub fn scsi_frame_command(index: usize) -> u32 {
    SCSI_CMD_FRAME_BASE | ((index as u32) << 24)
}

// =============================================================================
// HID LCD (Type 2 / Type 3)
// =============================================================================

pub const HID_EP_WRITE: u8 = 0x02;
pub const HID_EP_READ: u8 = 0x81;

/// Type 2 magic, also used by the LED controller.
pub const TYPE2_MAGIC: [u8; 4] = [0xDA, 0xDB, 0xDC, 0xDD];
pub const TYPE2_INIT_SIZE: usize = 512;
pub const TYPE2_RESPONSE_SIZE: usize = 512;
pub const TYPE2_FRAME_HEADER_LEN: usize = 20;

/// USB high-speed max packet size; HID frames are padded to a multiple of it.
pub const USB_BULK_ALIGNMENT: usize = 512;

pub const TYPE3_PREFIX: [u8; 8] = [0xF5, 0x00, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8];
pub const TYPE3_FRAME_PREFIX: [u8; 8] = [0xF5, 0x01, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8];
pub const TYPE3_INIT_SIZE: usize = 1040;
pub const TYPE3_RESPONSE_SIZE: usize = 1024;
pub const TYPE3_DATA_SIZE: usize = 204_800;
pub const TYPE3_FRAME_HEADER_LEN: usize = 16;
pub const TYPE3_ACK_SIZE: usize = 16;

/// Type 3 handshake first byte values.
pub const TYPE3_FBL_CODES: [u8; 2] = [0x65, 0x66];

/// Round up to the next multiple of 512.
pub fn ceil_to_512(n: usize) -> usize {
    n.div_ceil(USB_BULK_ALIGNMENT) * USB_BULK_ALIGNMENT
}

/// Type 2 init: magic, 8 zero bytes, command 1, zero padding to 512 bytes.
pub fn build_type2_init() -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(TYPE2_INIT_SIZE);
    w.write_bytes(&TYPE2_MAGIC);
    w.write_fill(0, 8);
    w.write_u32(1);
    w.write_fill(0, TYPE2_INIT_SIZE - w.len());
    w.into_inner()
}

/// Type 2 frame: 16 zero bytes, LE data length, data, padded to 512.
pub fn build_type2_frame(data: &[u8]) -> Vec<u8> {
    let total = ceil_to_512(TYPE2_FRAME_HEADER_LEN + data.len());
    let mut w = BinaryWriter::with_capacity(total);
    w.write_fill(0, 16);
    w.write_u32(data.len() as u32);
    w.write_bytes(data);
    w.write_fill(0, total - w.len());
    w.into_inner()
}

/// Type 3 init: fixed prefix, 4 zero bytes, LE 1024, 1024 zero bytes.
pub fn build_type3_init() -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(TYPE3_INIT_SIZE);
    w.write_bytes(&TYPE3_PREFIX);
    w.write_fill(0, 4);
    w.write_u32(1024);
    w.write_fill(0, 1024);
    w.into_inner()
}

/// Type 3 frame: prefix, 4 zero bytes, LE 204800, then exactly 204800 data bytes.
pub fn build_type3_frame(data: &[u8]) -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(TYPE3_FRAME_HEADER_LEN + TYPE3_DATA_SIZE);
    w.write_bytes(&TYPE3_FRAME_PREFIX);
    w.write_fill(0, 4);
    w.write_u32(TYPE3_DATA_SIZE as u32);
    let used = data.len().min(TYPE3_DATA_SIZE);
    w.write_bytes(&data[..used]);
    w.write_fill(0, TYPE3_DATA_SIZE - used);
    w.into_inner()
}

// =============================================================================
// USB Bulk LCD
// =============================================================================

pub const BULK_HANDSHAKE_LEN: usize = 64;
pub const BULK_HANDSHAKE_READ_SIZE: usize = 1024;
pub const BULK_MAGIC: [u8; 4] = [0x12, 0x34, 0x56, 0x78];
pub const BULK_MARKER_OFFSET: usize = 56;
pub const BULK_FRAME_HEADER_LEN: usize = 64;
pub const BULK_SIZE_OFFSET: usize = 60;
/// Minimum valid handshake response length.
pub const BULK_MIN_RESPONSE: usize = 41;
pub const BULK_PM_OFFSET: usize = 24;
pub const BULK_SUB_OFFSET: usize = 36;

pub fn build_bulk_handshake() -> [u8; BULK_HANDSHAKE_LEN] {
    let mut pkt = [0u8; BULK_HANDSHAKE_LEN];
    pkt[..4].copy_from_slice(&BULK_MAGIC);
    pkt[BULK_MARKER_OFFSET] = 0x01;
    pkt
}

/// 64-byte header with the data size at offset 60, followed by the data.
pub fn build_bulk_frame(data: &[u8]) -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(BULK_FRAME_HEADER_LEN + data.len());
    w.write_fill(0, BULK_SIZE_OFFSET);
    w.write_u32(data.len() as u32);
    w.write_bytes(data);
    w.into_inner()
}

// =============================================================================
// LED Controller
// =============================================================================

/// HID report size for the LED controller.
pub const LED_REPORT_SIZE: usize = 64;
pub const LED_HEADER_LEN: usize = 20;
pub const LED_CMD_INIT: u8 = 0x01;
pub const LED_CMD_DATA: u8 = 0x02;
/// Minimum init response length (PM at 5).
pub const LED_MIN_RESPONSE: usize = 7;
/// Hardware brightness ceiling as a fraction of full scale.
pub const LED_POWER_SCALE: f32 = 0.4;

/// 20-byte LED header: magic, cmd at 12, LE u16 payload length at 16.
fn led_header(cmd: u8, payload_len: u16) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(LED_HEADER_LEN + payload_len as usize);
    w.write_bytes(&TYPE2_MAGIC);
    w.write_fill(0, 8);
    w.write_u8(cmd);
    w.write_fill(0, 3);
    w.write_bytes(&payload_len.to_le_bytes());
    w.write_fill(0, 2);
    w
}

/// LED init packet, padded to one report.
pub fn build_led_init() -> Vec<u8> {
    let mut w = led_header(LED_CMD_INIT, 0);
    w.write_fill(0, LED_REPORT_SIZE - w.len());
    w.into_inner()
}

/// LED data packet from already-scaled RGB triples.
pub fn build_led_data(rgb: &[u8]) -> Vec<u8> {
    let mut w = led_header(LED_CMD_DATA, rgb.len() as u16);
    w.write_bytes(rgb);
    w.into_inner()
}

/// Split a packet into zero-padded reports.
pub fn split_reports(packet: &[u8], report_size: usize) -> Vec<Vec<u8>> {
    packet
        .chunks(report_size)
        .map(|chunk| {
            let mut report = chunk.to_vec();
            report.resize(report_size, 0);
            report
        })
        .collect()
}

// =============================================================================
// KVM LED
// =============================================================================

pub const KVM_HEADER: [u8; 2] = [0xDC, 0xDD];
pub const KVM_CHANNELS: usize = 10;
pub const KVM_CMD_ONOFF: u8 = 0x00;
pub const KVM_CMD_STATE_QUERY: u8 = 0x01;
pub const KVM_CMD_LED: u8 = 0x10;
pub const KVM_CMD_SCENE_SAVE: u8 = 0x68;
/// Channel 8 disabled by default.
pub const KVM_DEFAULT_ENABLES: [u8; KVM_CHANNELS] = [1, 1, 1, 1, 1, 1, 1, 1, 0, 1];

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= byte as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
            }
        }
        !crc
    }

    #[test]
    fn test_scsi_header_layout() {
        let header = build_scsi_header(SCSI_CMD_POLL, SCSI_POLL_SIZE as u32);
        assert_eq!(&header[0..4], &[0xF5, 0, 0, 0]);
        assert!(header[4..12].iter().all(|&b| b == 0));
        assert_eq!(&header[12..16], &[0x00, 0xE1, 0, 0]);
    }

    #[test]
    fn test_scsi_header_crc() {
        for (cmd, size) in [
            (SCSI_CMD_POLL, 0xE100u32),
            (SCSI_CMD_INIT, 0xE100),
            (scsi_frame_command(3), 0x2000),
            (0xFFFF_FFFF, 0),
        ] {
            let header = build_scsi_header(cmd, size);
            let crc = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
            assert_eq!(crc, reference_crc32(&header[..16]));
        }
    }

    #[test]
    fn test_scsi_frame_command_index() {
        assert_eq!(scsi_frame_command(0), 0x0001_01F5);
        assert_eq!(scsi_frame_command(1), 0x0101_01F5);
        assert_eq!(scsi_frame_command(7), 0x0701_01F5);
    }

    #[test]
    fn test_ceil_to_512() {
        assert_eq!(ceil_to_512(0), 0);
        assert_eq!(ceil_to_512(1), 512);
        assert_eq!(ceil_to_512(512), 512);
        assert_eq!(ceil_to_512(513), 1024);
    }

    #[test]
    fn test_type2_init_packet() {
        let pkt = build_type2_init();
        assert_eq!(pkt.len(), 512);
        assert_eq!(&pkt[0..4], &TYPE2_MAGIC);
        assert_eq!(&pkt[12..16], &[1, 0, 0, 0]);
        assert!(pkt[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_type2_frame_padding() {
        let pkt = build_type2_frame(&[0xAA; 100]);
        assert_eq!(pkt.len(), 512);
        assert_eq!(&pkt[16..20], &[100, 0, 0, 0]);
        assert_eq!(pkt[20], 0xAA);
        assert_eq!(pkt[120], 0);

        // 492 + 20 = 512 exactly, no extra padding
        assert_eq!(build_type2_frame(&[1; 492]).len(), 512);
    }

    #[test]
    fn test_type3_packets() {
        let init = build_type3_init();
        assert_eq!(init.len(), TYPE3_INIT_SIZE);
        assert_eq!(&init[0..8], &TYPE3_PREFIX);
        assert_eq!(&init[12..16], &[0x00, 0x04, 0x00, 0x00]);

        let frame = build_type3_frame(&[7; 10]);
        assert_eq!(frame.len(), 16 + TYPE3_DATA_SIZE);
        assert_eq!(&frame[12..16], &204_800u32.to_le_bytes());
        assert_eq!(frame[16], 7);
        assert_eq!(frame[26], 0);

        let oversized = build_type3_frame(&vec![1; TYPE3_DATA_SIZE + 100]);
        assert_eq!(oversized.len(), 16 + TYPE3_DATA_SIZE);
    }

    #[test]
    fn test_bulk_packets() {
        let hs = build_bulk_handshake();
        assert_eq!(&hs[0..4], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(hs[56], 0x01);
        assert_eq!(hs.iter().filter(|&&b| b != 0).count(), 5);

        let frame = build_bulk_frame(&[9; 300]);
        assert_eq!(frame.len(), 364);
        assert_eq!(&frame[60..64], &300u32.to_le_bytes());
        assert!(frame[..60].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_led_packets() {
        let init = build_led_init();
        assert_eq!(init.len(), LED_REPORT_SIZE);
        assert_eq!(&init[0..4], &TYPE2_MAGIC);
        assert_eq!(init[12], LED_CMD_INIT);

        let data = build_led_data(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(data.len(), 26);
        assert_eq!(data[12], LED_CMD_DATA);
        assert_eq!(&data[16..18], &[6, 0]);
        assert_eq!(&data[20..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_split_reports() {
        let reports = split_reports(&[1u8; 100], 64);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.len() == 64));
        assert_eq!(reports[1][35], 1);
        assert_eq!(reports[1][36], 0);
    }
}
