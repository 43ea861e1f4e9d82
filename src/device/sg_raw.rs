//! SCSI-generic passthrough via the `sg_raw` utility (sg3_utils).
//!
//! The vendor header's first 16 bytes go on the command line as the CDB.
//! Write payloads are staged in a temporary file; read data comes back
//! on stdout in binary form.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::device::transport::ScsiPassthrough;
use crate::error::{Result, TrccError};
use crate::protocol::SCSI_CDB_LEN;

const SG_RAW: &str = "sg_raw";
const POLL_INTERVAL: Duration = Duration::from_millis(5);

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Passthrough that shells out to `sg_raw` for one device node.
#[derive(Debug, Clone)]
pub struct SgRawPassthrough {
    device_path: String,
}

impl SgRawPassthrough {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn cdb_args(header: &[u8]) -> Vec<String> {
        header
            .iter()
            .take(SCSI_CDB_LEN)
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Run a command, killing it once `timeout` elapses. Returns stdout.
    fn run(&self, mut cmd: Command, timeout: Duration) -> Result<Vec<u8>> {
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TrccError::transport(format!("failed to run {}: {}", SG_RAW, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TrccError::Timeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let out = stdout
            .join()
            .map_err(|_| TrccError::transport("sg_raw output reader panicked"))?;
        let err = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(TrccError::transport(format!(
                "{} {} exited with {}: {}",
                SG_RAW,
                self.device_path,
                status,
                String::from_utf8_lossy(&err).trim()
            )));
        }
        Ok(out)
    }
}

/// Read a child pipe to EOF on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut out = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut out);
        }
        out
    })
}

fn temp_payload_path() -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("trcc-sg-{}-{}.bin", std::process::id(), n))
}

impl ScsiPassthrough for SgRawPassthrough {
    fn read(&mut self, header: &[u8], len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut cmd = Command::new(SG_RAW);
        cmd.arg("-b")
            .arg("-r")
            .arg(len.to_string())
            .arg(&self.device_path)
            .args(Self::cdb_args(header));
        self.run(cmd, timeout)
    }

    fn write(&mut self, header: &[u8], data: &[u8], timeout: Duration) -> Result<()> {
        let path = temp_payload_path();
        std::fs::write(&path, data)?;

        let mut cmd = Command::new(SG_RAW);
        cmd.arg("-s")
            .arg(data.len().to_string())
            .arg("-i")
            .arg(&path)
            .arg(&self.device_path)
            .args(Self::cdb_args(header));
        let result = self.run(cmd, timeout);

        let _ = std::fs::remove_file(&path);
        result.map(|_| ())
    }
}

/// Whether `sg_raw` is on PATH.
pub fn is_sg_raw_available() -> bool {
    Command::new(SG_RAW)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}
