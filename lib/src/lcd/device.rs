use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, error};

use super::protocol::{LcdCommand, encode_text, escape};

/// Somewhere the driver can write panel bytes.
pub trait LcdDevice: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// A device node, opened fresh for every write so the panel can be unplugged
/// and reconnected while the daemon runs.
#[derive(Debug, Clone)]
pub struct DevicePath {
    path: PathBuf,
}

impl DevicePath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LcdDevice for DevicePath {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut device = OpenOptions::new().write(true).open(&self.path)?;
        device.write_all(bytes)?;
        device.flush()
    }
}

/// Records every write in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far, one entry per call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Drains the record.
    pub fn take(&self) -> Vec<Vec<u8>> {
        match self.writes.lock() {
            Ok(mut writes) => std::mem::take(&mut *writes),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl LcdDevice for MemoryDevice {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.writes.lock() {
            Ok(mut writes) => writes.push(bytes.to_vec()),
            Err(poisoned) => poisoned.into_inner().push(bytes.to_vec()),
        }
        Ok(())
    }
}

/// Fire-and-forget writer. A failed write is logged and the bytes dropped.
pub struct LcdClient {
    device: Box<dyn LcdDevice>,
}

impl LcdClient {
    pub fn new(device: Box<dyn LcdDevice>) -> Self {
        Self { device }
    }

    pub fn send(&mut self, command: LcdCommand) {
        self.write(&command.encode());
    }

    pub fn send_text(&mut self, text: &str) {
        self.write(&encode_text(text));
    }

    fn write(&mut self, bytes: &[u8]) {
        debug!("Sending command: \"{}\"", escape(bytes));
        if let Err(e) = self.device.write(bytes) {
            error!(
                "Device unavailable; command '{}' dropped: {e}",
                escape(bytes)
            );
        }
    }
}
