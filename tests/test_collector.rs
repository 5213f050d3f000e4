use nvmecollectd::collector::mock::{RawHealthLog, RawIdentify, RawNamespace};
use nvmecollectd::collector::*;
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Helper function to lay out a capture directory with one drive
    fn write_capture(root: &Path, slot: u32, serial: &str, health: &RawHealthLog) {
        let dir = root.join(format!("slot{slot}"));
        fs::create_dir_all(&dir).unwrap();
        let identify = RawIdentify {
            serial: serial.to_string(),
            model: "Capture Drive".to_string(),
            namespace_count: 1,
            ..Default::default()
        };
        fs::write(dir.join("identify.bin"), identify.to_bytes()).unwrap();
        let namespace = RawNamespace {
            size: 2048,
            capacity: 2048,
            utilization: 1024,
            lba_shift: 9,
        };
        fs::write(dir.join("namespace1.bin"), namespace.to_bytes()).unwrap();
        fs::write(dir.join("health.bin"), health.to_bytes()).unwrap();
    }

    fn create_test_drives(root: &Path) -> Vec<NvmeDrive> {
        let dump = DumpTransport::new(root);
        let cache = IdentityCache::new(Arc::new(dump.clone()));
        let board = Arc::new(SensorBoard::new());
        dump.storage_devices()
            .unwrap()
            .iter()
            .filter_map(|d| create_device(&cache, d, board.clone()))
            .collect()
    }

    #[test]
    fn test_get_timestamp() {
        let timestamp = get_timestamp();
        assert!(timestamp > 1_577_836_800, "Timestamp should be after 2020");
    }

    #[test]
    fn test_get_hostname() {
        assert!(!get_hostname().is_empty());
    }

    #[test]
    fn test_capture_correlation() {
        let dir = TempDir::new().unwrap();
        write_capture(dir.path(), 0, "CAP-0", &RawHealthLog::default());
        write_capture(dir.path(), 2, "CAP-2", &RawHealthLog::default());
        // logical indices do not follow slot numbers; one disk is not NVMe
        fs::write(
            dir.path().join("drives.json"),
            r#"[
                {"serial": "CAP-2", "logical_index": 0},
                {"serial": "SATA-9", "logical_index": 1},
                {"serial": "CAP-0", "logical_index": 2}
            ]"#,
        )
        .unwrap();

        let drives = create_test_drives(dir.path());
        assert_eq!(drives.len(), 2);
        assert_eq!(drives[0].identity().slot, 2);
        assert_eq!(drives[0].identifier(), "/nvme/0");
        assert_eq!(drives[1].identity().slot, 0);
        assert_eq!(drives[1].identifier(), "/nvme/2");

        let ns = drives[0].identity().namespace1.clone().unwrap();
        assert_eq!(ns.lba_data_size, 512);
        assert!(drives[0].render().contains("Namespace 1 Utilization: 1024"));
    }

    #[test]
    fn test_capture_is_polled_again() {
        let dir = TempDir::new().unwrap();
        write_capture(dir.path(), 0, "CAP-0", &RawHealthLog::default());
        fs::write(
            dir.path().join("drives.json"),
            r#"[{"serial": "CAP-0", "logical_index": 0}]"#,
        )
        .unwrap();
        let mut drives = create_test_drives(dir.path());

        let worn = RawHealthLog {
            percentage_used: 97,
            ..Default::default()
        };
        fs::write(dir.path().join("slot0/health.bin"), worn.to_bytes()).unwrap();
        drives[0].tick().unwrap();

        let used = drives[0].sensor(SensorKind::Level, 2).unwrap();
        assert_eq!(used.value(), Some(97.0));
    }

    #[test]
    fn test_telemetry_document() {
        let dir = TempDir::new().unwrap();
        let mut health = RawHealthLog {
            data_units_written: u128::from(u64::MAX) * 4,
            ..Default::default()
        };
        health.temperature_sensors_kelvin[3] = 320;
        write_capture(dir.path(), 0, "CAP-0", &health);
        fs::write(
            dir.path().join("drives.json"),
            r#"[{"serial": "CAP-0", "logical_index": 0}]"#,
        )
        .unwrap();
        let drives = create_test_drives(dir.path());

        let bytes = serde_json::to_vec(&telemetry(&drives)).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();

        assert!(doc["timestamp"].is_u64());
        assert!(doc["hostname"].is_string());
        assert_eq!(doc["drives"].as_array().unwrap().len(), 1);

        let drive = &doc["drives"][0];
        assert_eq!(drive["drive"], "/nvme/0");
        assert_eq!(drive["serial"], "CAP-0");
        assert_eq!(drive["model"], "Capture Drive");
        assert_eq!(drive["health"]["available_spare"], 100);
        assert_eq!(drive["health"]["temperature_sensors"][3], 47);

        let sensors = drive["sensors"].as_array().unwrap();
        assert_eq!(sensors.len(), 7);
        assert_eq!(sensors[0]["name"], "Temperature");
        assert_eq!(sensors[0]["kind"], "temperature");
        assert_eq!(sensors[0]["value"], 35.0);
        assert_eq!(sensors[6]["index"], 4);
        assert_eq!(sensors[6]["hidden"], true);
    }

    #[test]
    fn test_telemetry_without_drives() {
        let doc = telemetry(&[]);
        assert!(doc.drives.is_empty());
    }
}
