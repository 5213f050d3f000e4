// src/collector/sensor.rs
//! Sensor registration API and an in-process board implementing it.

use parking_lot::RwLock;
use serde::Serialize;

/// What a sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Degrees Celsius
    Temperature,
    /// Percentage
    Level,
    /// Gigabytes
    Data,
}

/// Registration record for one sensor channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorDescriptor {
    /// Owning hardware identifier, e.g. `/nvme/0`
    pub hardware: String,
    pub name: String,
    /// Disambiguates sensors of the same kind on one hardware
    pub index: u32,
    /// Hidden unless the user enables it
    pub hidden: bool,
    pub kind: SensorKind,
}

/// Opaque handle returned by [`SensorRegistry::add_sensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorHandle(usize);

/// The monitoring framework drives are registered into.
pub trait SensorRegistry: Send + Sync {
    fn add_sensor(&self, descriptor: SensorDescriptor) -> SensorHandle;

    fn set_value(&self, handle: SensorHandle, value: f32);
}

/// A registered sensor with its latest value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    #[serde(flatten)]
    pub descriptor: SensorDescriptor,
    pub value: Option<f32>,
}

/// Registry keeping every sensor in memory.
#[derive(Debug, Default)]
pub struct SensorBoard {
    readings: RwLock<Vec<SensorReading>>,
}

impl SensorBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, handle: SensorHandle) -> Option<f32> {
        self.readings.read().get(handle.0).and_then(|r| r.value)
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        self.readings.read().clone()
    }

    /// Readings registered for one hardware identifier.
    pub fn readings_for(&self, hardware: &str) -> Vec<SensorReading> {
        self.readings
            .read()
            .iter()
            .filter(|r| r.descriptor.hardware == hardware)
            .cloned()
            .collect()
    }

    /// Looks up a reading by hardware, kind and index.
    pub fn find(&self, hardware: &str, kind: SensorKind, index: u32) -> Option<SensorReading> {
        self.readings
            .read()
            .iter()
            .find(|r| {
                r.descriptor.hardware == hardware
                    && r.descriptor.kind == kind
                    && r.descriptor.index == index
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }
}

impl SensorRegistry for SensorBoard {
    fn add_sensor(&self, descriptor: SensorDescriptor) -> SensorHandle {
        let mut readings = self.readings.write();
        readings.push(SensorReading {
            descriptor,
            value: None,
        });
        SensorHandle(readings.len() - 1)
    }

    fn set_value(&self, handle: SensorHandle, value: f32) {
        if let Some(reading) = self.readings.write().get_mut(handle.0) {
            reading.value = Some(value);
        }
    }
}
