//! Transport abstractions shared by every protocol driver.
//!
//! Drivers talk to hardware only through these traits, so the same
//! protocol logic runs over nusb, hidapi, sg_raw, or the in-memory
//! doubles in `device::mock` (built for tests and the `mock` feature).

use std::time::Duration;

use crate::error::Result;

/// Endpoint-style byte channel (USB bulk/interrupt endpoints, HID reports).
pub trait Transport: Send {
    /// Write `data`, returning the number of bytes accepted.
    ///
    /// An empty slice sends a zero-length packet where the transport supports it.
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Read up to `max_len` bytes.
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Release the underlying handle. Further I/O fails.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).write(data, timeout)
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).read(max_len, timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// SCSI-generic passthrough. Commands carry a 20-byte vendor header.
pub trait ScsiPassthrough: Send {
    /// Issue a data-in command and return what the device sent.
    fn read(&mut self, header: &[u8], len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Issue a data-out command with `data` as payload.
    fn write(&mut self, header: &[u8], data: &[u8], timeout: Duration) -> Result<()>;
}

impl<T: ScsiPassthrough + ?Sized> ScsiPassthrough for Box<T> {
    fn read(&mut self, header: &[u8], len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).read(header, len, timeout)
    }

    fn write(&mut self, header: &[u8], data: &[u8], timeout: Duration) -> Result<()> {
        (**self).write(header, data, timeout)
    }
}

/// Source of protocol delays.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

impl<T: Sleeper + ?Sized> Sleeper for Box<T> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
