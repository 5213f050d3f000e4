// src/collector/transport.rs
//! Device query seam: slot handles for passthrough commands, and the
//! storage enumeration that yields serial numbers.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{NvmeError, Result};

/// An open NVMe device slot. Dropping the handle closes it.
pub trait NvmeHandle {
    /// Identify Controller (CNS 01h), 4096 bytes.
    fn identify_controller(&mut self) -> Result<Vec<u8>>;

    /// Identify Namespace (CNS 00h) for `nsid`, 4096 bytes.
    fn identify_namespace(&mut self, nsid: u32) -> Result<Vec<u8>>;

    /// SMART / Health Information log page, 512 bytes.
    fn health_log(&mut self) -> Result<Vec<u8>>;
}

/// Opens NVMe device slots.
pub trait NvmeTransport: Send + Sync {
    /// Fails when nothing addressable sits on `slot`.
    fn open(&self, slot: u32) -> Result<Box<dyn NvmeHandle>>;
}

/// Storage device as seen by the OS disk enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    pub serial: String,
    pub logical_index: u32,
}

/// Lists the OS storage devices that may be NVMe drives.
pub trait DriveEnumerator {
    fn storage_devices(&self) -> Result<Vec<StorageDescriptor>>;
}

/// Replays raw buffers captured to a directory.
///
/// Layout: `slot<N>/identify.bin`, `slot<N>/namespace<NSID>.bin`,
/// `slot<N>/health.bin` and a top-level `drives.json` holding the
/// storage descriptors. Files are read on every command.
#[derive(Debug, Clone)]
pub struct DumpTransport {
    root: PathBuf,
}

impl DumpTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl NvmeTransport for DumpTransport {
    fn open(&self, slot: u32) -> Result<Box<dyn NvmeHandle>> {
        let dir = self.root.join(format!("slot{slot}"));
        if !dir.is_dir() {
            return Err(NvmeError::Open {
                slot,
                reason: format!("{} is not a directory", dir.display()),
            });
        }
        Ok(Box::new(DumpHandle { dir }))
    }
}

impl DriveEnumerator for DumpTransport {
    fn storage_devices(&self) -> Result<Vec<StorageDescriptor>> {
        let raw = fs::read(self.root.join("drives.json"))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

struct DumpHandle {
    dir: PathBuf,
}

impl DumpHandle {
    fn read(&self, command: &'static str, file: &str) -> Result<Vec<u8>> {
        fs::read(self.dir.join(file)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => NvmeError::command(command, format!("no capture {file}")),
            _ => NvmeError::Io(e),
        })
    }
}

impl NvmeHandle for DumpHandle {
    fn identify_controller(&mut self) -> Result<Vec<u8>> {
        self.read("identify controller", "identify.bin")
    }

    fn identify_namespace(&mut self, nsid: u32) -> Result<Vec<u8>> {
        self.read("identify namespace", &format!("namespace{nsid}.bin"))
    }

    fn health_log(&mut self) -> Result<Vec<u8>> {
        self.read("get log page", "health.bin")
    }
}
