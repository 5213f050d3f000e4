// src/collector/identity.rs
//! Static controller identity from Identify Controller / Identify Namespace data.

use serde::Serialize;

use crate::collector::health::{le_u16, le_u32, le_u64, le_u128};
use crate::error::{NvmeError, Result};

/// Size of an Identify data structure.
pub const IDENTIFY_LEN: usize = 4096;

/// Geometry of namespace 1, when the controller reports one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceGeometry {
    /// Namespace Size (NSZE), in logical blocks
    pub size: u64,
    /// Namespace Capacity (NCAP), in logical blocks
    pub capacity: u64,
    /// Namespace Utilization (NUSE), in logical blocks
    pub utilization: u64,
    /// Logical block data size of the formatted LBA format, in bytes
    pub lba_data_size: u64,
}

impl NamespaceGeometry {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        check_len("identify namespace", raw)?;

        // FLBAS bits 3:0 select the LBA format
        let format = usize::from(raw[26] & 0x0F);
        let lba_shift = raw[128 + 4 * format + 2];
        if lba_shift >= 64 {
            return Err(NvmeError::Inconsistent {
                structure: "identify namespace",
                reason: format!("LBA data size shift {lba_shift} out of range"),
            });
        }

        Ok(Self {
            size: le_u64(raw, 0),
            capacity: le_u64(raw, 8),
            utilization: le_u64(raw, 16),
            lba_data_size: 1u64 << lba_shift,
        })
    }
}

/// Identity of one NVMe controller, keyed by serial number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Transport slot the controller was discovered on
    pub slot: u32,
    pub vendor_id: u16,
    pub subsystem_vendor_id: u16,
    /// IEEE OUI Identifier, least significant byte first
    pub ieee_oui: [u8; 3],
    pub model: String,
    pub firmware_revision: String,
    pub serial: String,
    pub controller_id: u16,
    /// Total NVM Capacity, in bytes
    pub total_capacity: u128,
    /// Unallocated NVM Capacity, in bytes
    pub unallocated_capacity: u128,
    pub namespace_count: u32,
    pub namespace1: Option<NamespaceGeometry>,
}

impl DeviceIdentity {
    /// Decodes an Identify Controller structure.
    pub fn parse(slot: u32, controller: &[u8], namespace1: Option<NamespaceGeometry>) -> Result<Self> {
        check_len("identify controller", controller)?;

        let serial = ascii_field(&controller[4..24]);
        if serial.is_empty() {
            return Err(NvmeError::Inconsistent {
                structure: "identify controller",
                reason: "empty serial number".to_string(),
            });
        }

        Ok(Self {
            slot,
            vendor_id: le_u16(controller, 0),
            subsystem_vendor_id: le_u16(controller, 2),
            serial,
            model: ascii_field(&controller[24..64]),
            firmware_revision: ascii_field(&controller[64..72]),
            ieee_oui: [controller[73], controller[74], controller[75]],
            controller_id: le_u16(controller, 78),
            total_capacity: le_u128(controller, 280),
            unallocated_capacity: le_u128(controller, 296),
            namespace_count: le_u32(controller, 516),
            namespace1,
        })
    }
}

/// Normalizes a serial number for lookups across enumeration paths.
pub fn normalize_serial(serial: &str) -> &str {
    serial.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\0')
}

fn ascii_field(raw: &[u8]) -> String {
    normalize_serial(&String::from_utf8_lossy(raw)).to_string()
}

fn check_len(structure: &'static str, raw: &[u8]) -> Result<()> {
    if raw.len() < IDENTIFY_LEN {
        return Err(NvmeError::Malformed {
            structure,
            expected: IDENTIFY_LEN,
            actual: raw.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{RawIdentify, RawNamespace};

    #[test]
    fn test_parse_controller_trims_padding() {
        let raw = RawIdentify {
            vendor_id: 0x144d,
            subsystem_vendor_id: 0x144d,
            serial: "S4EWNX0R123456".into(),
            model: "Samsung SSD 970 EVO Plus 1TB".into(),
            firmware: "2B2QEXM7".into(),
            ieee_oui: [0x38, 0x25, 0x00],
            controller_id: 4,
            total_capacity: 1_000_204_886_016,
            namespace_count: 1,
            ..Default::default()
        };

        let identity = DeviceIdentity::parse(3, &raw.to_bytes(), None).unwrap();
        assert_eq!(identity.slot, 3);
        assert_eq!(identity.serial, "S4EWNX0R123456");
        assert_eq!(identity.model, "Samsung SSD 970 EVO Plus 1TB");
        assert_eq!(identity.firmware_revision, "2B2QEXM7");
        assert_eq!(identity.vendor_id, 0x144d);
        assert_eq!(identity.ieee_oui, [0x38, 0x25, 0x00]);
        assert_eq!(identity.controller_id, 4);
        assert_eq!(identity.total_capacity, 1_000_204_886_016);
        assert_eq!(identity.namespace_count, 1);
        assert!(identity.namespace1.is_none());
    }

    #[test]
    fn test_parse_controller_rejects_blank_serial() {
        let raw = RawIdentify {
            serial: String::new(),
            ..Default::default()
        };
        assert!(DeviceIdentity::parse(0, &raw.to_bytes(), None).is_err());
    }

    #[test]
    fn test_parse_controller_rejects_short_buffer() {
        let err = DeviceIdentity::parse(0, &[0u8; 512], None).unwrap_err();
        assert!(matches!(err, NvmeError::Malformed { actual: 512, .. }));
    }

    #[test]
    fn test_namespace_uses_formatted_lba() {
        let raw = RawNamespace {
            size: 1_953_525_168,
            capacity: 1_953_525_168,
            utilization: 412_000_000,
            lba_shift: 12,
        };
        let ns = NamespaceGeometry::parse(&raw.to_bytes()).unwrap();
        assert_eq!(ns.size, 1_953_525_168);
        assert_eq!(ns.utilization, 412_000_000);
        assert_eq!(ns.lba_data_size, 4096);
    }

    #[test]
    fn test_normalize_serial() {
        assert_eq!(normalize_serial("  S1  \0\0"), "S1");
        assert_eq!(normalize_serial("S1"), "S1");
    }
}
