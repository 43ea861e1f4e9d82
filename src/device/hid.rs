//! HID report transport over `hidapi`.
//!
//! The LED controllers expose a plain HID interface with 64-byte reports.
//! hidapi expects the report ID as the first byte of every write; these
//! devices use report ID 0.

use std::time::Duration;

use hidapi::{HidApi, HidDevice};

use crate::device::transport::Transport;
use crate::error::{Result, TrccError};

/// HID transport that writes fixed-size output reports.
pub struct HidReportTransport {
    device: Option<HidDevice>,
    report_size: usize,
}

impl std::fmt::Debug for HidReportTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidReportTransport")
            .field("report_size", &self.report_size)
            .field("open", &self.device.is_some())
            .finish()
    }
}

impl HidReportTransport {
    /// Open the first HID device matching `vid:pid`.
    pub fn open(vid: u16, pid: u16, report_size: usize) -> Result<Self> {
        let api = HidApi::new()?;
        let device = api
            .device_list()
            .find(|info| info.vendor_id() == vid && info.product_id() == pid)
            .ok_or_else(|| TrccError::DeviceNotFound(format!("HID device {:04x}:{:04x}", vid, pid)))?
            .open_device(&api)?;

        tracing::info!("Opened HID device {:04x}:{:04x}", vid, pid);
        Ok(Self {
            device: Some(device),
            report_size,
        })
    }

    /// Open a HID device by its platform path.
    pub fn open_path(path: &std::ffi::CStr, report_size: usize) -> Result<Self> {
        let api = HidApi::new()?;
        let device = api.open_path(path)?;
        Ok(Self {
            device: Some(device),
            report_size,
        })
    }

    fn device(&self) -> Result<&HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| TrccError::transport("HID transport closed"))
    }
}

impl Transport for HidReportTransport {
    /// hidapi writes block without a timeout; `_timeout` is not enforced.
    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let device = self.device()?;
        let mut written = 0;
        let mut report = Vec::with_capacity(self.report_size + 1);
        for chunk in data.chunks(self.report_size.max(1)) {
            report.clear();
            report.push(0x00);
            report.extend_from_slice(chunk);
            let n = device.write(&report)?;
            written += n.saturating_sub(1).min(chunk.len());
        }
        Ok(written)
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let device = self.device()?;
        let mut buf = vec![0u8; max_len];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = device.read_timeout(&mut buf, timeout_ms)?;
        if n == 0 {
            return Err(TrccError::Timeout);
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn close(&mut self) {
        self.device = None;
    }
}

/// List `(path, serial)` for every attached HID device matching `vid:pid`.
pub fn list_hid_devices(vid: u16, pid: u16) -> Result<Vec<(String, Option<String>)>> {
    let api = HidApi::new()?;
    Ok(api
        .device_list()
        .filter(|info| info.vendor_id() == vid && info.product_id() == pid)
        .map(|info| {
            (
                info.path().to_string_lossy().into_owned(),
                info.serial_number().map(String::from),
            )
        })
        .collect())
}
