// src/collector/mod.rs

pub mod cache;
pub mod drive;
pub mod health;
pub mod identity;
pub mod mock;
pub mod report;
pub mod sensor;
pub mod sys;
pub mod transport;
#[cfg(windows)]
pub mod windows;

pub use sys::{get_hostname, get_timestamp, telemetry};

pub use cache::{IdentityCache, MAX_SLOTS};
pub use drive::{NvmeDrive, NvmeSensor, create_device};
pub use health::{CriticalWarning, HealthSnapshot, TEMPERATURE_SENSOR_ABSENT, units_to_gigabytes};
pub use identity::{DeviceIdentity, NamespaceGeometry};
pub use sensor::{SensorBoard, SensorDescriptor, SensorKind, SensorReading, SensorRegistry};
pub use transport::{DriveEnumerator, DumpTransport, NvmeHandle, NvmeTransport, StorageDescriptor};
