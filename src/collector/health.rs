// src/collector/health.rs
//! NVMe SMART / Health Information log decoding (Log Page Identifier 02h).

use serde::Serialize;

use crate::error::{NvmeError, Result};

/// Size of the SMART / Health Information log page.
pub const HEALTH_LOG_LEN: usize = 512;

/// Number of auxiliary temperature sensors carried by the health log.
pub const TEMPERATURE_SENSOR_COUNT: usize = 8;

/// Decoded reading of an auxiliary temperature sensor the controller does not implement.
pub const TEMPERATURE_SENSOR_ABSENT: i16 = i16::MIN;

/// Offset between Kelvin as reported by the controller and Celsius.
const KELVIN_OFFSET: i32 = 273;

/// Bytes per data unit: 512-byte blocks reported in thousands.
const UNIT_BYTES: u128 = 512;
const UNIT_SCALE: u128 = 1_000_000;

/// Critical Warning bitmask (Byte 00).
///
/// A value of 0 means no critical warnings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CriticalWarning(u8);

impl CriticalWarning {
    pub const NONE: CriticalWarning = CriticalWarning(0);
    /// Bit 0: Available spare below threshold
    pub const AVAILABLE_SPARE_LOW: CriticalWarning = CriticalWarning(1 << 0);
    /// Bit 1: Temperature threshold condition
    pub const TEMPERATURE_THRESHOLD: CriticalWarning = CriticalWarning(1 << 1);
    /// Bit 2: NVM subsystem degraded reliability
    pub const RELIABILITY_DEGRADED: CriticalWarning = CriticalWarning(1 << 2);
    /// Bit 3: All media read-only
    pub const READ_ONLY: CriticalWarning = CriticalWarning(1 << 3);
    /// Bit 4: Volatile memory backup failed
    pub const VOLATILE_MEMORY_BACKUP_FAILED: CriticalWarning = CriticalWarning(1 << 4);

    pub const fn from_bits(bits: u8) -> Self {
        CriticalWarning(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: CriticalWarning) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CriticalWarning {
    type Output = CriticalWarning;

    fn bitor(self, rhs: CriticalWarning) -> CriticalWarning {
        CriticalWarning(self.0 | rhs.0)
    }
}

/// Warning flags and their report text, in the order they are reported.
pub static CRITICAL_WARNING_MESSAGES: [(CriticalWarning, &str); 5] = [
    (
        CriticalWarning::AVAILABLE_SPARE_LOW,
        "the available spare space has fallen below the threshold.",
    ),
    (
        CriticalWarning::TEMPERATURE_THRESHOLD,
        "a temperature is above an over temperature threshold or below an under temperature threshold.",
    ),
    (
        CriticalWarning::RELIABILITY_DEGRADED,
        "the device reliability has been degraded due to significant media related errors or any internal error that degrades device reliability.",
    ),
    (
        CriticalWarning::READ_ONLY,
        "the media has been placed in read only mode.",
    ),
    (
        CriticalWarning::VOLATILE_MEMORY_BACKUP_FAILED,
        "the volatile memory backup device has failed.",
    ),
];

impl CriticalWarning {
    /// Report text for every set flag, in table order.
    pub fn messages(self) -> impl Iterator<Item = &'static str> {
        CRITICAL_WARNING_MESSAGES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, message)| *message)
    }
}

/// One point-in-time reading of the controller health log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// Critical Warning (Byte 00)
    pub critical_warning: CriticalWarning,

    /// Composite Temperature (Bytes 02:01), converted from Kelvins to Celsius.
    pub temperature: i16,

    /// Available Spare (Byte 03):
    /// Normalized percentage (0-100%) of remaining spare capacity available
    pub available_spare: u8,

    /// Available Spare Threshold (Byte 04)
    pub available_spare_threshold: u8,

    /// Percentage Used (Byte 05):
    /// Vendor specific estimate of the percentage of NVM subsystem life used.
    /// May exceed 100.
    pub percentage_used: u8,

    /// Endurance Group Critical Warning Summary (Byte 06)
    pub endurance_group_warning: u8,

    /// Data Units Read (Bytes 47:32):
    /// Number of 512-byte data units read, reported in thousands.
    pub data_units_read: u128,

    /// Data Units Written (Bytes 63:48), same units as `data_units_read`.
    pub data_units_written: u128,

    /// Host Read Commands (Bytes 79:64)
    pub host_read_commands: u128,

    /// Host Write Commands (Bytes 95:80)
    pub host_write_commands: u128,

    /// Controller Busy Time (Bytes 111:96), in minutes
    pub controller_busy_time: u128,

    /// Power Cycles (Bytes 127:112)
    pub power_cycles: u128,

    /// Power On Hours (Bytes 143:128)
    pub power_on_hours: u128,

    /// Unsafe Shutdowns (Bytes 159:144)
    pub unsafe_shutdowns: u128,

    /// Media and Data Integrity Errors (Bytes 175:160)
    pub media_errors: u128,

    /// Number of Error Information Log Entries (Bytes 191:176)
    pub error_log_entries: u128,

    /// Warning Composite Temperature Time (Bytes 195:192), in minutes
    pub warning_temperature_time: u32,

    /// Critical Composite Temperature Time (Bytes 199:196), in minutes
    pub critical_temperature_time: u32,

    /// Temperature Sensors 1-8 (Bytes 215:200) in Celsius.
    /// Unimplemented sensors hold `TEMPERATURE_SENSOR_ABSENT`.
    pub temperature_sensors: [i16; TEMPERATURE_SENSOR_COUNT],

    /// Thermal Management Temperature 1/2 Transition Count (Bytes 223:216)
    pub thermal_transition_counts: [u32; 2],

    /// Total Time For Thermal Management Temperature 1/2 (Bytes 231:224), in seconds
    pub thermal_total_times: [u32; 2],
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            critical_warning: CriticalWarning::NONE,
            temperature: 0,
            available_spare: 0,
            available_spare_threshold: 0,
            percentage_used: 0,
            endurance_group_warning: 0,
            data_units_read: 0,
            data_units_written: 0,
            host_read_commands: 0,
            host_write_commands: 0,
            controller_busy_time: 0,
            power_cycles: 0,
            power_on_hours: 0,
            unsafe_shutdowns: 0,
            media_errors: 0,
            error_log_entries: 0,
            warning_temperature_time: 0,
            critical_temperature_time: 0,
            temperature_sensors: [TEMPERATURE_SENSOR_ABSENT; TEMPERATURE_SENSOR_COUNT],
            thermal_transition_counts: [0; 2],
            thermal_total_times: [0; 2],
        }
    }
}

impl HealthSnapshot {
    /// Decodes a raw health log page.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEALTH_LOG_LEN {
            return Err(NvmeError::Malformed {
                structure: "health log",
                expected: HEALTH_LOG_LEN,
                actual: raw.len(),
            });
        }

        let mut temperature_sensors = [TEMPERATURE_SENSOR_ABSENT; TEMPERATURE_SENSOR_COUNT];
        for (i, sensor) in temperature_sensors.iter_mut().enumerate() {
            let kelvin = le_u16(raw, 200 + 2 * i);
            // 0 means the sensor is not implemented
            if kelvin > 0 {
                *sensor = kelvin_to_celsius(kelvin);
            }
        }

        Ok(Self {
            critical_warning: CriticalWarning::from_bits(raw[0]),
            temperature: kelvin_to_celsius(le_u16(raw, 1)),
            available_spare: raw[3],
            available_spare_threshold: raw[4],
            percentage_used: raw[5],
            endurance_group_warning: raw[6],
            data_units_read: le_u128(raw, 32),
            data_units_written: le_u128(raw, 48),
            host_read_commands: le_u128(raw, 64),
            host_write_commands: le_u128(raw, 80),
            controller_busy_time: le_u128(raw, 96),
            power_cycles: le_u128(raw, 112),
            power_on_hours: le_u128(raw, 128),
            unsafe_shutdowns: le_u128(raw, 144),
            media_errors: le_u128(raw, 160),
            error_log_entries: le_u128(raw, 176),
            warning_temperature_time: le_u32(raw, 192),
            critical_temperature_time: le_u32(raw, 196),
            temperature_sensors,
            thermal_transition_counts: [le_u32(raw, 216), le_u32(raw, 220)],
            thermal_total_times: [le_u32(raw, 224), le_u32(raw, 228)],
        })
    }

    /// Auxiliary temperature sensors that report a reading, as `(index, celsius)`.
    pub fn present_temperature_sensors(&self) -> impl Iterator<Item = (usize, i16)> + '_ {
        self.temperature_sensors
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, t)| *t > TEMPERATURE_SENSOR_ABSENT)
    }
}

/// Converts a data unit counter into gigabytes (10^9 bytes).
///
/// One unit is 512 * 1000 bytes. The product is never formed directly so
/// counters up to `u128::MAX` stay exact; the whole part saturates at `f32::MAX`.
pub fn units_to_gigabytes(units: u128) -> f32 {
    let (q, r) = (units / UNIT_SCALE, units % UNIT_SCALE);
    // r * UNIT_BYTES < 512 * 10^6, no overflow
    let whole = q * UNIT_BYTES + (r * UNIT_BYTES) / UNIT_SCALE;
    let fraction = (r * UNIT_BYTES) % UNIT_SCALE;

    if whole >= f32::MAX as u128 {
        return f32::MAX;
    }
    let gigabytes = whole as f64 + fraction as f64 / UNIT_SCALE as f64;
    gigabytes.min(f32::MAX as f64) as f32
}

fn kelvin_to_celsius(kelvin: u16) -> i16 {
    (i32::from(kelvin) - KELVIN_OFFSET) as i16
}

pub(crate) fn le_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

pub(crate) fn le_u32(raw: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&raw[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn le_u64(raw: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn le_u128(raw: &[u8], offset: usize) -> u128 {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&raw[offset..offset + 16]);
    u128::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::RawHealthLog;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_unit_is_half_a_megabyte() {
        assert_relative_eq!(units_to_gigabytes(1), 0.000512_f32, max_relative = 1e-6);
    }

    #[test]
    fn test_units_to_gigabytes_whole_values() {
        assert_eq!(units_to_gigabytes(0), 0.0);
        // 1_953_125 * 512_000 bytes = 10^12 bytes
        assert_eq!(units_to_gigabytes(1_953_125), 1000.0);
        assert_relative_eq!(units_to_gigabytes(1953), 0.999_936_f32, max_relative = 1e-6);
    }

    #[test]
    fn test_units_beyond_i64_byte_range() {
        // 2^54 units * 512 exceeds i64::MAX
        let units = 1u128 << 54;
        let expected = ((1u128 << 63) as f64 / 1e6) as f32;
        assert_relative_eq!(units_to_gigabytes(units), expected, max_relative = 1e-6);
    }

    #[test]
    fn test_units_saturate_without_overflow() {
        let gb = units_to_gigabytes(u128::MAX);
        assert!(gb.is_finite());
        assert!(gb <= f32::MAX);
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        let err = HealthSnapshot::parse(&[0u8; 100]).unwrap_err();
        assert!(matches!(
            err,
            NvmeError::Malformed {
                expected: HEALTH_LOG_LEN,
                actual: 100,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_decodes_fields() {
        let mut raw = RawHealthLog {
            critical_warning: 0b1001,
            temperature_kelvin: 310,
            available_spare: 100,
            available_spare_threshold: 10,
            percentage_used: 3,
            data_units_read: 1_953_125,
            data_units_written: u128::from(u64::MAX) + 1,
            power_on_hours: 1234,
            media_errors: 2,
            warning_temperature_time: 7,
            ..Default::default()
        };
        raw.temperature_sensors_kelvin[1] = 315;

        let snapshot = HealthSnapshot::parse(&raw.to_bytes()).unwrap();
        assert_eq!(snapshot.temperature, 37);
        assert_eq!(snapshot.available_spare, 100);
        assert_eq!(snapshot.available_spare_threshold, 10);
        assert_eq!(snapshot.percentage_used, 3);
        assert_eq!(snapshot.data_units_read, 1_953_125);
        assert_eq!(snapshot.data_units_written, u128::from(u64::MAX) + 1);
        assert_eq!(snapshot.power_on_hours, 1234);
        assert_eq!(snapshot.media_errors, 2);
        assert_eq!(snapshot.warning_temperature_time, 7);
        assert!(snapshot.critical_warning.contains(CriticalWarning::AVAILABLE_SPARE_LOW));
        assert!(snapshot.critical_warning.contains(CriticalWarning::READ_ONLY));
        assert_eq!(
            snapshot.temperature_sensors,
            [i16::MIN, 42, i16::MIN, i16::MIN, i16::MIN, i16::MIN, i16::MIN, i16::MIN]
        );
        assert_eq!(
            snapshot.present_temperature_sensors().collect::<Vec<_>>(),
            vec![(1, 42)]
        );
    }

    #[test]
    fn test_warning_messages_follow_table_order() {
        let warning = CriticalWarning::READ_ONLY | CriticalWarning::AVAILABLE_SPARE_LOW;
        let messages: Vec<_> = warning.messages().collect();
        assert_eq!(
            messages,
            vec![
                "the available spare space has fallen below the threshold.",
                "the media has been placed in read only mode.",
            ]
        );
        assert_eq!(CriticalWarning::NONE.messages().count(), 0);
    }

    #[test]
    fn test_unknown_warning_bits_produce_no_messages() {
        // bit 5 (persistent memory region read-only) is not reported
        assert_eq!(CriticalWarning::from_bits(1 << 5).messages().count(), 0);
    }
}
