// src/collector/report.rs
//! Plain-text diagnostic report for one drive.

use std::fmt::Write;

use crate::collector::health::HealthSnapshot;
use crate::collector::identity::DeviceIdentity;

/// Renders identity and, when available, the latest health snapshot.
pub fn render(identity: &DeviceIdentity, health: Option<&HealthSnapshot>) -> String {
    let mut r = String::new();
    // Writing to a String cannot fail
    let _ = write_identity(&mut r, identity);
    let _ = match health {
        Some(health) => write_health(&mut r, health),
        None => writeln!(r, "Health Information: unavailable"),
    };
    r
}

fn write_identity(r: &mut String, info: &DeviceIdentity) -> std::fmt::Result {
    writeln!(r, "Model: {}", info.model)?;
    writeln!(r, "Firmware Revision: {}", info.firmware_revision)?;
    writeln!(r, "Serial Number: {}", info.serial)?;
    writeln!(r, "PCI Vendor ID: 0x{:04x}", info.vendor_id)?;
    if info.vendor_id != info.subsystem_vendor_id {
        writeln!(r, "PCI Subsystem Vendor ID: 0x{:04x}", info.subsystem_vendor_id)?;
    }
    writeln!(
        r,
        "IEEE OUI Identifier: 0x{:02x}{:02x}{:02x}",
        info.ieee_oui[2], info.ieee_oui[1], info.ieee_oui[0]
    )?;
    writeln!(r, "Total NVM Capacity: {}", info.total_capacity)?;
    writeln!(r, "Unallocated NVM Capacity: {}", info.unallocated_capacity)?;
    writeln!(r, "Controller ID: {}", info.controller_id)?;
    writeln!(r, "Number of Namespaces: {}", info.namespace_count)?;
    if let Some(ns) = &info.namespace1 {
        writeln!(r, "Namespace 1 Size: {}", ns.size)?;
        writeln!(r, "Namespace 1 Capacity: {}", ns.capacity)?;
        writeln!(r, "Namespace 1 Utilization: {}", ns.utilization)?;
        writeln!(r, "Namespace 1 LBA Data Size: {}", ns.lba_data_size)?;
    }
    Ok(())
}

fn write_health(r: &mut String, health: &HealthSnapshot) -> std::fmt::Result {
    if health.critical_warning.is_empty() {
        writeln!(r, "Critical Warning: -")?;
    }
    for message in health.critical_warning.messages() {
        writeln!(r, "Critical Warning: {message}")?;
    }

    writeln!(r, "Temperature: {} Celsius", health.temperature)?;
    writeln!(r, "Available Spare: {}%", health.available_spare)?;
    writeln!(r, "Available Spare Threshold: {}%", health.available_spare_threshold)?;
    writeln!(r, "Percentage Used: {}%", health.percentage_used)?;
    writeln!(r, "Data Units Read: {}", health.data_units_read)?;
    writeln!(r, "Data Units Written: {}", health.data_units_written)?;
    writeln!(r, "Host Read Commands: {}", health.host_read_commands)?;
    writeln!(r, "Host Write Commands: {}", health.host_write_commands)?;
    writeln!(r, "Controller Busy Time: {}", health.controller_busy_time)?;
    writeln!(r, "Power Cycles: {}", health.power_cycles)?;
    writeln!(r, "Power On Hours: {}", health.power_on_hours)?;
    writeln!(r, "Unsafe Shutdowns: {}", health.unsafe_shutdowns)?;
    writeln!(r, "Media Errors: {}", health.media_errors)?;
    writeln!(r, "Number of Error Information Log Entries: {}", health.error_log_entries)?;
    writeln!(r, "Warning Composite Temperature Time: {}", health.warning_temperature_time)?;
    writeln!(r, "Critical Composite Temperature Time: {}", health.critical_temperature_time)?;
    for (i, celsius) in health.present_temperature_sensors() {
        writeln!(r, "Temperature Sensor {}: {} Celsius", i + 1, celsius)?;
    }
    Ok(())
}
