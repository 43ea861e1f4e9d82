//! In-memory transports for exercising drivers without hardware.
//!
//! Each double records what the driver sent and replays scripted
//! responses. Handles are cheap clones sharing state, so a test can keep
//! one copy for assertions after moving another into a driver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::device::driver::Opener;
use crate::device::registry::{DeviceDescriptor, TransportProvider};
use crate::device::transport::{ScsiPassthrough, Sleeper, Transport};
use crate::error::{Result, TrccError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// MockTransport
// =============================================================================

#[derive(Debug, Default)]
struct TransportLog {
    writes: Vec<Vec<u8>>,
    reads: VecDeque<Result<Vec<u8>>>,
    fail_writes_after: Option<usize>,
    zero_writes_after: Option<usize>,
    closed: bool,
}

/// Scripted endpoint transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next read.
    pub fn push_read(&self, data: impl Into<Vec<u8>>) -> &Self {
        lock(&self.inner).reads.push_back(Ok(data.into()));
        self
    }

    /// Queue a timeout for the next read.
    pub fn push_read_timeout(&self) -> &Self {
        lock(&self.inner).reads.push_back(Err(TrccError::Timeout));
        self
    }

    /// Fail every write after `n` successful ones.
    pub fn fail_writes_after(&self, n: usize) {
        lock(&self.inner).fail_writes_after = Some(n);
    }

    /// Report 0 bytes written for every write after `n` successful ones.
    pub fn zero_writes_after(&self, n: usize) {
        lock(&self.inner).zero_writes_after = Some(n);
    }

    /// Scripted reads not yet consumed.
    pub fn pending_reads(&self) -> usize {
        lock(&self.inner).reads.len()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.inner).writes.clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.inner).writes.len()
    }

    pub fn clear_writes(&self) {
        lock(&self.inner).writes.clear();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Opener handing out clones of this transport.
    pub fn opener(&self) -> Opener<dyn Transport> {
        let mock = self.clone();
        Box::new(move || {
            lock(&mock.inner).closed = false;
            Ok(Box::new(mock.clone()) as Box<dyn Transport>)
        })
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        let mut log = lock(&self.inner);
        if log.closed {
            return Err(TrccError::transport("mock transport closed"));
        }
        if log.fail_writes_after.is_some_and(|n| log.writes.len() >= n) {
            return Err(TrccError::transport("mock write failure"));
        }
        let accepted = if log.zero_writes_after.is_some_and(|n| log.writes.len() >= n) {
            0
        } else {
            data.len()
        };
        log.writes.push(data.to_vec());
        Ok(accepted)
    }

    fn read(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let mut log = lock(&self.inner);
        match log.reads.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(max_len);
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => Err(TrccError::Timeout),
        }
    }

    fn close(&mut self) {
        lock(&self.inner).closed = true;
    }
}

// =============================================================================
// MockScsi
// =============================================================================

/// One recorded SCSI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScsiCommand {
    Read { header: Vec<u8>, len: usize },
    Write { header: Vec<u8>, data_len: usize },
}

impl ScsiCommand {
    /// Command code from the first 4 header bytes.
    pub fn code(&self) -> u32 {
        let header = match self {
            ScsiCommand::Read { header, .. } | ScsiCommand::Write { header, .. } => header,
        };
        u32::from_le_bytes([header[0], header[1], header[2], header[3]])
    }
}

#[derive(Debug, Default)]
struct ScsiLog {
    commands: Vec<ScsiCommand>,
    poll_responses: VecDeque<Vec<u8>>,
    fail_writes: bool,
}

/// Scripted SCSI passthrough.
///
/// Reads return queued poll responses, then an empty buffer.
#[derive(Debug, Clone, Default)]
pub struct MockScsi {
    inner: Arc<Mutex<ScsiLog>>,
}

impl MockScsi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_poll(&self, data: impl Into<Vec<u8>>) -> &Self {
        lock(&self.inner).poll_responses.push_back(data.into());
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }

    pub fn commands(&self) -> Vec<ScsiCommand> {
        lock(&self.inner).commands.clone()
    }

    pub fn count(&self, code: u32) -> usize {
        self.commands().iter().filter(|c| c.code() == code).count()
    }

    pub fn clear(&self) {
        lock(&self.inner).commands.clear();
    }

    /// Opener handing out clones of this passthrough.
    pub fn opener(&self) -> Opener<dyn ScsiPassthrough> {
        let mock = self.clone();
        Box::new(move || Ok(Box::new(mock.clone()) as Box<dyn ScsiPassthrough>))
    }
}

impl ScsiPassthrough for MockScsi {
    fn read(&mut self, header: &[u8], len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let mut log = lock(&self.inner);
        log.commands.push(ScsiCommand::Read {
            header: header.to_vec(),
            len,
        });
        Ok(log.poll_responses.pop_front().unwrap_or_default())
    }

    fn write(&mut self, header: &[u8], data: &[u8], _timeout: Duration) -> Result<()> {
        let mut log = lock(&self.inner);
        log.commands.push(ScsiCommand::Write {
            header: header.to_vec(),
            data_len: data.len(),
        });
        if log.fail_writes {
            return Err(TrccError::transport("sg_raw exited with status 1"));
        }
        Ok(())
    }
}

// =============================================================================
// RecordingSleeper
// =============================================================================

/// Records requested delays instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    /// How many recorded delays equal `duration`.
    pub fn count(&self, duration: Duration) -> usize {
        lock(&self.sleeps).iter().filter(|&&d| d == duration).count()
    }

    pub fn total(&self) -> Duration {
        lock(&self.sleeps).iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
    }
}

// =============================================================================
// MockTransportProvider
// =============================================================================

/// Provider handing every descriptor the same set of doubles.
#[derive(Debug, Clone, Default)]
pub struct MockTransportProvider {
    pub usb: MockTransport,
    pub hid: MockTransport,
    pub scsi: MockScsi,
    pub sleeper: RecordingSleeper,
}

impl MockTransportProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportProvider for MockTransportProvider {
    fn scsi(&self, _desc: &DeviceDescriptor) -> Opener<dyn ScsiPassthrough> {
        self.scsi.opener()
    }

    fn usb(&self, _desc: &DeviceDescriptor) -> Opener<dyn Transport> {
        self.usb.opener()
    }

    fn hid(&self, _desc: &DeviceDescriptor, _report_size: usize) -> Opener<dyn Transport> {
        self.hid.opener()
    }

    fn sleeper(&self) -> Box<dyn Sleeper> {
        Box::new(self.sleeper.clone())
    }
}
