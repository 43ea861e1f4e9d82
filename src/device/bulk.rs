//! Raw USB endpoint transport over `nusb`.
//!
//! Used by the USB bulk LCDs and by the HID-class LCDs (Type 2/3), whose
//! vendor driver bypasses the HID stack and talks to endpoints 0x02/0x81
//! directly. nusb transfers have no built-in timeout, so each transfer
//! runs on a private current-thread tokio runtime under
//! `tokio::time::timeout`; dropping the transfer future cancels it.

use std::time::Duration;

use nusb::transfer::{Direction, EndpointType, RequestBuffer};

use crate::device::transport::Transport;
use crate::error::{Result, TrccError};

/// Interface claimed on every device.
pub const USB_INTERFACE: u8 = 0;

/// Fallback endpoint pair when descriptors cannot be read.
pub const DEFAULT_EP_OUT: u8 = 0x02;
pub const DEFAULT_EP_IN: u8 = 0x81;

/// Handle for endpoint transfers to one USB device.
pub struct UsbEndpointTransport {
    interface: Option<nusb::Interface>,
    runtime: tokio::runtime::Runtime,
    ep_out: u8,
    ep_in: u8,
    kind: EndpointType,
    vid: u16,
    pid: u16,
}

impl std::fmt::Debug for UsbEndpointTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbEndpointTransport")
            .field("vid", &format_args!("{:04x}", self.vid))
            .field("pid", &format_args!("{:04x}", self.pid))
            .field("ep_out", &format_args!("{:#04x}", self.ep_out))
            .field("ep_in", &format_args!("{:#04x}", self.ep_in))
            .field("open", &self.interface.is_some())
            .finish()
    }
}

impl UsbEndpointTransport {
    /// Open the first device matching `vid:pid` and claim interface 0.
    pub fn open(vid: u16, pid: u16) -> Result<Self> {
        let device_info = nusb::list_devices()?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or_else(|| {
                TrccError::DeviceNotFound(format!("USB device {:04x}:{:04x}", vid, pid))
            })?;

        let device = device_info.open()?;
        let (ep_out, ep_in, kind) = detect_endpoints(&device);

        let interface = device.detach_and_claim_interface(USB_INTERFACE).map_err(|e| {
            TrccError::transport(format!(
                "cannot claim interface {} on {:04x}:{:04x} (kernel driver bound?): {}",
                USB_INTERFACE, vid, pid, e
            ))
        })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        tracing::info!(
            "Opened USB device {:04x}:{:04x} (EP OUT={:#04x}, EP IN={:#04x}, {:?})",
            vid,
            pid,
            ep_out,
            ep_in,
            kind
        );

        Ok(Self {
            interface: Some(interface),
            runtime,
            ep_out,
            ep_in,
            kind,
            vid,
            pid,
        })
    }

    fn interface(&self) -> Result<&nusb::Interface> {
        self.interface
            .as_ref()
            .ok_or_else(|| TrccError::transport("USB transport closed"))
    }
}

/// First OUT and IN endpoints on interface 0 of the active configuration.
fn detect_endpoints(device: &nusb::Device) -> (u8, u8, EndpointType) {
    let mut ep_out = None;
    let mut ep_in = None;
    let mut kind = EndpointType::Bulk;

    match device.active_configuration() {
        Ok(config) => {
            for alt in config
                .interface_alt_settings()
                .filter(|a| a.interface_number() == USB_INTERFACE && a.alternate_setting() == 0)
            {
                for ep in alt.endpoints() {
                    match ep.direction() {
                        Direction::Out if ep_out.is_none() => {
                            ep_out = Some(ep.address());
                            kind = ep.transfer_type();
                        }
                        Direction::In if ep_in.is_none() => ep_in = Some(ep.address()),
                        _ => {}
                    }
                }
            }
        }
        Err(e) => tracing::debug!("Endpoint auto-detection failed: {}", e),
    }

    (
        ep_out.unwrap_or(DEFAULT_EP_OUT),
        ep_in.unwrap_or(DEFAULT_EP_IN),
        kind,
    )
}

impl Transport for UsbEndpointTransport {
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let interface = self.interface()?;
        let transfer = match self.kind {
            EndpointType::Interrupt => interface.interrupt_out(self.ep_out, data.to_vec()),
            _ => interface.bulk_out(self.ep_out, data.to_vec()),
        };

        let completion = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| TrccError::Timeout)?;

        completion
            .status
            .map_err(|e| TrccError::transport(format!("bulk OUT {:#04x}: {:?}", self.ep_out, e)))?;
        Ok(completion.data.actual_length())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let interface = self.interface()?;
        let buffer = RequestBuffer::new(max_len);
        let transfer = match self.kind {
            EndpointType::Interrupt => interface.interrupt_in(self.ep_in, buffer),
            _ => interface.bulk_in(self.ep_in, buffer),
        };

        let completion = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, transfer).await })
            .map_err(|_| TrccError::Timeout)?;

        completion
            .status
            .map_err(|e| TrccError::transport(format!("bulk IN {:#04x}: {:?}", self.ep_in, e)))?;
        Ok(completion.data)
    }

    fn close(&mut self) {
        if self.interface.take().is_some() {
            tracing::info!("USB device {:04x}:{:04x} closed", self.vid, self.pid);
        }
    }
}

/// Check whether a device with this VID/PID is attached.
pub fn is_usb_device_present(vid: u16, pid: u16) -> bool {
    nusb::list_devices()
        .map(|mut devices| devices.any(|d| d.vendor_id() == vid && d.product_id() == pid))
        .unwrap_or(false)
}
