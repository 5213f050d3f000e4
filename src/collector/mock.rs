// src/collector/mock.rs
//! In-memory transport for testing drives without NVMe hardware.
//!
//! `MockTransport` serves raw buffers per slot and counts opens and live
//! handles. The `Raw*` builders lay out identify and health buffers the way
//! a controller returns them.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collector::health::{HEALTH_LOG_LEN, TEMPERATURE_SENSOR_COUNT};
use crate::collector::identity::IDENTIFY_LEN;
use crate::collector::transport::{DriveEnumerator, NvmeHandle, NvmeTransport, StorageDescriptor};
use crate::error::{NvmeError, Result};

/// Buffers served for one slot. `None` makes the command fail.
#[derive(Debug, Clone, Default)]
pub struct MockSlot {
    pub identify: Option<Vec<u8>>,
    pub namespace1: Option<Vec<u8>>,
    pub health: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    slots: BTreeMap<u32, MockSlot>,
    drives: Vec<StorageDescriptor>,
    opens: usize,
    live_handles: usize,
    health_queries: usize,
}

/// Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_slot(&self, slot: u32, contents: MockSlot) {
        self.state.lock().slots.insert(slot, contents);
    }

    pub fn remove_slot(&self, slot: u32) {
        self.state.lock().slots.remove(&slot);
    }

    /// Replaces the health log served for `slot`; `None` makes it fail.
    pub fn set_health(&self, slot: u32, health: Option<Vec<u8>>) {
        if let Some(entry) = self.state.lock().slots.get_mut(&slot) {
            entry.health = health;
        }
    }

    pub fn add_drive(&self, serial: impl Into<String>, logical_index: u32) {
        self.state.lock().drives.push(StorageDescriptor {
            serial: serial.into(),
            logical_index,
        });
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Handles currently open.
    pub fn live_handles(&self) -> usize {
        self.state.lock().live_handles
    }

    pub fn health_queries(&self) -> usize {
        self.state.lock().health_queries
    }
}

impl NvmeTransport for MockTransport {
    fn open(&self, slot: u32) -> Result<Box<dyn NvmeHandle>> {
        let mut state = self.state.lock();
        if !state.slots.contains_key(&slot) {
            return Err(NvmeError::Open {
                slot,
                reason: "no device".to_string(),
            });
        }
        state.opens += 1;
        state.live_handles += 1;
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            slot,
        }))
    }
}

impl DriveEnumerator for MockTransport {
    fn storage_devices(&self) -> Result<Vec<StorageDescriptor>> {
        Ok(self.state.lock().drives.clone())
    }
}

struct MockHandle {
    state: Arc<Mutex<MockState>>,
    slot: u32,
}

impl MockHandle {
    fn serve(&self, command: &'static str, pick: impl Fn(&MockSlot) -> Option<Vec<u8>>) -> Result<Vec<u8>> {
        let state = self.state.lock();
        state
            .slots
            .get(&self.slot)
            .and_then(pick)
            .ok_or_else(|| NvmeError::command(command, "not served"))
    }
}

impl NvmeHandle for MockHandle {
    fn identify_controller(&mut self) -> Result<Vec<u8>> {
        self.serve("identify controller", |s| s.identify.clone())
    }

    fn identify_namespace(&mut self, nsid: u32) -> Result<Vec<u8>> {
        if nsid != 1 {
            return Err(NvmeError::command("identify namespace", format!("nsid {nsid}")));
        }
        self.serve("identify namespace", |s| s.namespace1.clone())
    }

    fn health_log(&mut self) -> Result<Vec<u8>> {
        self.state.lock().health_queries += 1;
        self.serve("get log page", |s| s.health.clone())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.state.lock().live_handles -= 1;
    }
}

/// Identify Controller fields used by the collector.
#[derive(Debug, Clone)]
pub struct RawIdentify {
    pub vendor_id: u16,
    pub subsystem_vendor_id: u16,
    pub serial: String,
    pub model: String,
    pub firmware: String,
    pub ieee_oui: [u8; 3],
    pub controller_id: u16,
    pub total_capacity: u128,
    pub unallocated_capacity: u128,
    pub namespace_count: u32,
}

impl Default for RawIdentify {
    fn default() -> Self {
        Self {
            vendor_id: 0x1234,
            subsystem_vendor_id: 0x1234,
            serial: "S1".to_string(),
            model: "X".to_string(),
            firmware: "1.0".to_string(),
            ieee_oui: [0; 3],
            controller_id: 1,
            total_capacity: 0,
            unallocated_capacity: 0,
            namespace_count: 0,
        }
    }
}

impl RawIdentify {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = vec![0u8; IDENTIFY_LEN];
        raw[0..2].copy_from_slice(&self.vendor_id.to_le_bytes());
        raw[2..4].copy_from_slice(&self.subsystem_vendor_id.to_le_bytes());
        put_ascii(&mut raw[4..24], &self.serial);
        put_ascii(&mut raw[24..64], &self.model);
        put_ascii(&mut raw[64..72], &self.firmware);
        raw[73..76].copy_from_slice(&self.ieee_oui);
        raw[78..80].copy_from_slice(&self.controller_id.to_le_bytes());
        raw[280..296].copy_from_slice(&self.total_capacity.to_le_bytes());
        raw[296..312].copy_from_slice(&self.unallocated_capacity.to_le_bytes());
        raw[516..520].copy_from_slice(&self.namespace_count.to_le_bytes());
        raw
    }
}

/// Identify Namespace fields, formatted with LBA format 0.
#[derive(Debug, Clone, Default)]
pub struct RawNamespace {
    pub size: u64,
    pub capacity: u64,
    pub utilization: u64,
    pub lba_shift: u8,
}

impl RawNamespace {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = vec![0u8; IDENTIFY_LEN];
        raw[0..8].copy_from_slice(&self.size.to_le_bytes());
        raw[8..16].copy_from_slice(&self.capacity.to_le_bytes());
        raw[16..24].copy_from_slice(&self.utilization.to_le_bytes());
        raw[130] = self.lba_shift;
        raw
    }
}

/// SMART / Health Information log fields, temperatures in Kelvins.
#[derive(Debug, Clone)]
pub struct RawHealthLog {
    pub critical_warning: u8,
    pub temperature_kelvin: u16,
    pub available_spare: u8,
    pub available_spare_threshold: u8,
    pub percentage_used: u8,
    pub data_units_read: u128,
    pub data_units_written: u128,
    pub host_read_commands: u128,
    pub host_write_commands: u128,
    pub power_cycles: u128,
    pub power_on_hours: u128,
    pub unsafe_shutdowns: u128,
    pub media_errors: u128,
    pub warning_temperature_time: u32,
    pub critical_temperature_time: u32,
    /// 0 marks an unimplemented sensor
    pub temperature_sensors_kelvin: [u16; TEMPERATURE_SENSOR_COUNT],
}

impl Default for RawHealthLog {
    fn default() -> Self {
        Self {
            critical_warning: 0,
            temperature_kelvin: 273 + 35,
            available_spare: 100,
            available_spare_threshold: 10,
            percentage_used: 0,
            data_units_read: 0,
            data_units_written: 0,
            host_read_commands: 0,
            host_write_commands: 0,
            power_cycles: 0,
            power_on_hours: 0,
            unsafe_shutdowns: 0,
            media_errors: 0,
            warning_temperature_time: 0,
            critical_temperature_time: 0,
            temperature_sensors_kelvin: [0; TEMPERATURE_SENSOR_COUNT],
        }
    }
}

impl RawHealthLog {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = vec![0u8; HEALTH_LOG_LEN];
        raw[0] = self.critical_warning;
        raw[1..3].copy_from_slice(&self.temperature_kelvin.to_le_bytes());
        raw[3] = self.available_spare;
        raw[4] = self.available_spare_threshold;
        raw[5] = self.percentage_used;
        raw[32..48].copy_from_slice(&self.data_units_read.to_le_bytes());
        raw[48..64].copy_from_slice(&self.data_units_written.to_le_bytes());
        raw[64..80].copy_from_slice(&self.host_read_commands.to_le_bytes());
        raw[80..96].copy_from_slice(&self.host_write_commands.to_le_bytes());
        raw[112..128].copy_from_slice(&self.power_cycles.to_le_bytes());
        raw[128..144].copy_from_slice(&self.power_on_hours.to_le_bytes());
        raw[144..160].copy_from_slice(&self.unsafe_shutdowns.to_le_bytes());
        raw[160..176].copy_from_slice(&self.media_errors.to_le_bytes());
        raw[192..196].copy_from_slice(&self.warning_temperature_time.to_le_bytes());
        raw[196..200].copy_from_slice(&self.critical_temperature_time.to_le_bytes());
        for (i, kelvin) in self.temperature_sensors_kelvin.iter().enumerate() {
            raw[200 + 2 * i..202 + 2 * i].copy_from_slice(&kelvin.to_le_bytes());
        }
        raw
    }
}

/// Space-padded ASCII, as Identify strings are.
fn put_ascii(field: &mut [u8], value: &str) {
    field.fill(b' ');
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}
