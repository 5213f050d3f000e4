// src/collector/drive.rs
//! One monitored NVMe drive: sensor set, polling and report.

use std::sync::Arc;
use tracing::{info, warn};

use crate::collector::cache::IdentityCache;
use crate::collector::health::{HealthSnapshot, units_to_gigabytes};
use crate::collector::identity::DeviceIdentity;
use crate::collector::report;
use crate::collector::sensor::{SensorDescriptor, SensorHandle, SensorKind, SensorRegistry};
use crate::collector::transport::{NvmeTransport, StorageDescriptor};
use crate::error::{NvmeError, Result};

/// Pure mapping from a health snapshot to a sensor value.
pub type Extractor = Box<dyn Fn(&HealthSnapshot) -> f32 + Send + Sync>;

/// A sensor bound to the snapshot field it reports.
pub struct NvmeSensor {
    descriptor: SensorDescriptor,
    handle: SensorHandle,
    extract: Extractor,
    value: Option<f32>,
}

impl NvmeSensor {
    pub fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn index(&self) -> u32 {
        self.descriptor.index
    }

    pub fn kind(&self) -> SensorKind {
        self.descriptor.kind
    }

    pub fn hidden(&self) -> bool {
        self.descriptor.hidden
    }

    /// Value from the last successful poll.
    pub fn value(&self) -> Option<f32> {
        self.value
    }

    fn update(&mut self, health: &HealthSnapshot, registry: &dyn SensorRegistry) {
        let value = (self.extract)(health);
        self.value = Some(value);
        registry.set_value(self.handle, value);
    }
}

impl std::fmt::Debug for NvmeSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvmeSensor")
            .field("descriptor", &self.descriptor)
            .field("value", &self.value)
            .finish()
    }
}

/// Creates a drive for an OS storage device, if it is a known NVMe controller.
///
/// `None` means the device is not NVMe (or could not be identified) and
/// another driver should handle it.
pub fn create_device(
    cache: &IdentityCache,
    descriptor: &StorageDescriptor,
    registry: Arc<dyn SensorRegistry>,
) -> Option<NvmeDrive> {
    let identity = cache.resolve(&descriptor.serial)?;
    Some(NvmeDrive::new(
        identity,
        descriptor.logical_index,
        cache.transport(),
        registry,
    ))
}

/// A monitored NVMe drive.
///
/// The sensor set is decided once at construction; every [`NvmeDrive::tick`]
/// refreshes all values from a single health query.
pub struct NvmeDrive {
    identity: Arc<DeviceIdentity>,
    logical_index: u32,
    identifier: String,
    transport: Arc<dyn NvmeTransport>,
    registry: Arc<dyn SensorRegistry>,
    sensors: Vec<NvmeSensor>,
    latest: Option<HealthSnapshot>,
    closed: bool,
}

impl NvmeDrive {
    pub fn new(
        identity: Arc<DeviceIdentity>,
        logical_index: u32,
        transport: Arc<dyn NvmeTransport>,
        registry: Arc<dyn SensorRegistry>,
    ) -> Self {
        let mut drive = Self {
            identifier: format!("/nvme/{logical_index}"),
            identity,
            logical_index,
            transport,
            registry,
            sensors: Vec::new(),
            latest: None,
            closed: false,
        };
        drive.create_sensors();
        info!(
            drive = %drive.identifier,
            model = %drive.identity.model,
            serial = %drive.identity.serial,
            sensors = drive.sensors.len(),
            "NVMe drive ready"
        );
        drive
    }

    fn create_sensors(&mut self) {
        self.add_sensor("Temperature", 0, false, SensorKind::Temperature, |h| {
            f32::from(h.temperature)
        });
        self.add_sensor("Available Spare", 0, false, SensorKind::Level, |h| {
            f32::from(h.available_spare)
        });
        self.add_sensor("Available Spare Threshold", 1, false, SensorKind::Level, |h| {
            f32::from(h.available_spare_threshold)
        });
        self.add_sensor("Percentage Used", 2, false, SensorKind::Level, |h| {
            f32::from(h.percentage_used)
        });
        self.add_sensor("Data Read", 1, false, SensorKind::Data, |h| {
            units_to_gigabytes(h.data_units_read)
        });
        self.add_sensor("Data Written", 2, false, SensorKind::Data, |h| {
            units_to_gigabytes(h.data_units_written)
        });

        // Which auxiliary probes exist is only known from a live reading
        let health = match self.query_health() {
            Ok(health) => health,
            Err(e) => {
                warn!(drive = %self.identifier, "Auxiliary sensor discovery failed: {}", e);
                return;
            }
        };
        let present: Vec<usize> = health.present_temperature_sensors().map(|(i, _)| i).collect();
        for i in present {
            self.add_sensor("Temperature", i as u32 + 1, true, SensorKind::Temperature, move |h| {
                f32::from(h.temperature_sensors[i])
            });
        }

        self.apply(health);
    }

    fn add_sensor(
        &mut self,
        name: &str,
        index: u32,
        hidden: bool,
        kind: SensorKind,
        extract: impl Fn(&HealthSnapshot) -> f32 + Send + Sync + 'static,
    ) {
        let descriptor = SensorDescriptor {
            hardware: self.identifier.clone(),
            name: name.to_string(),
            index,
            hidden,
            kind,
        };
        let handle = self.registry.add_sensor(descriptor.clone());
        self.sensors.push(NvmeSensor {
            descriptor,
            handle,
            extract: Box::new(extract),
            value: None,
        });
    }

    /// Opens the slot for a single query; the handle is released on return.
    fn query_health(&self) -> Result<HealthSnapshot> {
        let mut handle = self.transport.open(self.identity.slot)?;
        let raw = handle.health_log()?;
        HealthSnapshot::parse(&raw)
    }

    fn apply(&mut self, health: HealthSnapshot) {
        for sensor in &mut self.sensors {
            sensor.update(&health, self.registry.as_ref());
        }
        self.latest = Some(health);
    }

    /// Polls the drive once and refreshes every sensor.
    ///
    /// On failure the previous values are kept until the next successful tick.
    pub fn tick(&mut self) -> Result<()> {
        if self.closed {
            return Err(NvmeError::Closed(self.identifier.clone()));
        }
        let health = self.query_health()?;
        self.apply(health);
        Ok(())
    }

    /// Diagnostic report from the identity and the latest snapshot.
    pub fn render(&self) -> String {
        report::render(&self.identity, self.latest.as_ref())
    }

    /// Stops polling. Calling it again has no effect.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            info!(drive = %self.identifier, "NVMe drive closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn logical_index(&self) -> u32 {
        self.logical_index
    }

    /// Hardware identifier sensors are registered under, e.g. `/nvme/0`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn sensors(&self) -> &[NvmeSensor] {
        &self.sensors
    }

    pub fn sensor(&self, kind: SensorKind, index: u32) -> Option<&NvmeSensor> {
        self.sensors
            .iter()
            .find(|s| s.kind() == kind && s.index() == index)
    }

    pub fn latest(&self) -> Option<&HealthSnapshot> {
        self.latest.as_ref()
    }
}
