// src/collector/sys.rs
//! Host-level info and the telemetry document shipped every tick.

use serde::Serialize;
use sysinfo::System;

use crate::collector::drive::NvmeDrive;
use crate::collector::health::HealthSnapshot;
use crate::collector::sensor::SensorReading;

/// Function to generate a timestamp in epoch time.
pub fn get_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Function to extract hostname of the system.
pub fn get_hostname() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Serialize)]
pub struct TelemetryDocument<'a> {
    pub timestamp: u64,
    pub hostname: String,
    pub drives: Vec<DriveTelemetry<'a>>,
}

#[derive(Debug, Serialize)]
pub struct DriveTelemetry<'a> {
    pub drive: &'a str,
    pub model: &'a str,
    pub serial: &'a str,
    pub firmware: &'a str,
    pub health: Option<&'a HealthSnapshot>,
    pub sensors: Vec<SensorReading>,
}

impl<'a> DriveTelemetry<'a> {
    pub fn new(drive: &'a NvmeDrive) -> Self {
        let identity = drive.identity();
        Self {
            drive: drive.identifier(),
            model: &identity.model,
            serial: &identity.serial,
            firmware: &identity.firmware_revision,
            health: drive.latest(),
            sensors: drive
                .sensors()
                .iter()
                .map(|s| SensorReading {
                    descriptor: s.descriptor().clone(),
                    value: s.value(),
                })
                .collect(),
        }
    }
}

/// Function to collect the current state of every drive.
pub fn telemetry(drives: &[NvmeDrive]) -> TelemetryDocument<'_> {
    TelemetryDocument {
        timestamp: get_timestamp(),
        hostname: get_hostname(),
        drives: drives.iter().map(DriveTelemetry::new).collect(),
    }
}
