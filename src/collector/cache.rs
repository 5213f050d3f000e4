// src/collector/cache.rs
//! Serial number to controller identity map.
//!
//! Adapter slots (`\\.\ScsiN:`) and physical drives (`\\.\PhysicalDriveN`)
//! are numbered independently, so the serial number is the only join key
//! between a storage device and its NVMe controller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::collector::identity::{DeviceIdentity, NamespaceGeometry, normalize_serial};
use crate::collector::transport::NvmeTransport;
use crate::error::Result;

/// Slots scanned when building the cache.
pub const MAX_SLOTS: u32 = 32;

/// Identities of every NVMe controller reachable through a transport.
///
/// The slot scan runs once, on the first lookup, and is never repeated;
/// concurrent first lookups wait for the same scan. Drives plugged in later
/// are not seen.
pub struct IdentityCache {
    transport: Arc<dyn NvmeTransport>,
    max_slots: u32,
    identities: OnceLock<HashMap<String, Arc<DeviceIdentity>>>,
    scans: AtomicUsize,
}

impl IdentityCache {
    pub fn new(transport: Arc<dyn NvmeTransport>) -> Self {
        Self::with_max_slots(transport, MAX_SLOTS)
    }

    pub fn with_max_slots(transport: Arc<dyn NvmeTransport>, max_slots: u32) -> Self {
        Self {
            transport,
            max_slots,
            identities: OnceLock::new(),
            scans: AtomicUsize::new(0),
        }
    }

    /// Transport used to reopen resolved devices.
    pub fn transport(&self) -> Arc<dyn NvmeTransport> {
        Arc::clone(&self.transport)
    }

    /// Looks up the controller reporting `serial`.
    pub fn resolve(&self, serial: &str) -> Option<Arc<DeviceIdentity>> {
        self.map().get(normalize_serial(serial)).cloned()
    }

    /// Number of slot scans performed; never exceeds 1.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// All cached identities, ordered by slot.
    pub fn identities(&self) -> Vec<Arc<DeviceIdentity>> {
        let mut all: Vec<_> = self.map().values().cloned().collect();
        all.sort_by_key(|identity| identity.slot);
        all
    }

    fn map(&self) -> &HashMap<String, Arc<DeviceIdentity>> {
        self.identities.get_or_init(|| self.scan())
    }

    fn scan(&self) -> HashMap<String, Arc<DeviceIdentity>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let mut map = HashMap::new();

        for slot in 0..self.max_slots {
            let identity = match self.query_slot(slot) {
                Ok(identity) => identity,
                Err(e) => {
                    debug!(slot, "Skipping NVMe slot: {}", e);
                    continue;
                }
            };

            let serial = identity.serial.clone();
            if let Some(previous) = map.insert(serial.clone(), Arc::new(identity)) {
                // Non-conformant hardware; the later slot wins
                warn!(
                    serial = %serial,
                    previous_slot = previous.slot,
                    slot,
                    "Duplicate NVMe serial number"
                );
            }
        }

        info!("Discovered {} NVMe controller(s)", map.len());
        map
    }

    /// The handle is dropped on return, whether or not the queries succeeded.
    fn query_slot(&self, slot: u32) -> Result<DeviceIdentity> {
        let mut handle = self.transport.open(slot)?;
        let controller = handle.identify_controller()?;

        let mut identity = DeviceIdentity::parse(slot, &controller, None)?;
        if identity.namespace_count > 0 {
            identity.namespace1 = match handle
                .identify_namespace(1)
                .and_then(|raw| NamespaceGeometry::parse(&raw))
            {
                Ok(ns) => Some(ns),
                Err(e) => {
                    debug!(slot, "No geometry for namespace 1: {}", e);
                    None
                }
            };
        }

        debug!(slot, serial = %identity.serial, model = %identity.model, "Identified NVMe controller");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockSlot, MockTransport, RawHealthLog, RawIdentify, RawNamespace};

    fn slot_with(identify: RawIdentify) -> MockSlot {
        MockSlot {
            identify: Some(identify.to_bytes()),
            namespace1: None,
            health: Some(RawHealthLog::default().to_bytes()),
        }
    }

    fn serial(serial: &str) -> RawIdentify {
        RawIdentify {
            serial: serial.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_hits_and_misses() {
        let mock = MockTransport::new();
        mock.add_slot(0, slot_with(serial("S1")));
        mock.add_slot(5, slot_with(serial("S2")));
        let cache = IdentityCache::new(Arc::new(mock));

        let s1 = cache.resolve("S1").unwrap();
        assert_eq!(s1.serial, "S1");
        assert_eq!(s1.slot, 0);
        assert_eq!(cache.resolve("S2").unwrap().slot, 5);
        assert!(cache.resolve("S3").is_none());
        assert!(cache.resolve("").is_none());
    }

    #[test]
    fn test_scan_runs_once() {
        let mock = MockTransport::new();
        mock.add_slot(0, slot_with(serial("S1")));
        let cache = IdentityCache::new(Arc::new(mock.clone()));
        assert_eq!(cache.scan_count(), 0);

        cache.resolve("S1");
        cache.resolve("missing");
        cache.resolve("S1");

        assert_eq!(cache.scan_count(), 1);
        assert_eq!(mock.open_count(), 1);
    }

    #[test]
    fn test_concurrent_first_lookups_share_one_scan() {
        let mock = MockTransport::new();
        mock.add_slot(1, slot_with(serial("S1")));
        let cache = Arc::new(IdentityCache::new(Arc::new(mock.clone())));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.resolve("S1").is_some())
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap());
        }

        assert_eq!(cache.scan_count(), 1);
        assert_eq!(mock.open_count(), 1);
    }

    #[test]
    fn test_unqueryable_slots_are_excluded() {
        let mock = MockTransport::new();
        mock.add_slot(0, MockSlot::default());
        mock.add_slot(1, slot_with(serial("S1")));
        mock.add_slot(
            2,
            MockSlot {
                identify: Some(vec![0u8; 16]),
                ..Default::default()
            },
        );
        let cache = IdentityCache::new(Arc::new(mock.clone()));

        assert_eq!(cache.len(), 1);
        assert!(cache.resolve("S1").is_some());
        assert_eq!(mock.live_handles(), 0);
    }

    #[test]
    fn test_slots_beyond_limit_are_not_scanned() {
        let mock = MockTransport::new();
        mock.add_slot(4, slot_with(serial("S1")));
        let cache = IdentityCache::with_max_slots(Arc::new(mock), 4);
        assert!(cache.resolve("S1").is_none());
    }

    // Documents current behavior for colliding serials rather than a contract.
    #[test]
    fn test_duplicate_serial_last_write_wins() {
        let mock = MockTransport::new();
        mock.add_slot(0, slot_with(serial("DUP")));
        mock.add_slot(3, slot_with(serial("DUP")));
        let cache = IdentityCache::new(Arc::new(mock));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resolve("DUP").unwrap().slot, 3);
    }

    #[test]
    fn test_namespace_geometry_is_optional() {
        let mock = MockTransport::new();
        let with_ns = RawIdentify {
            serial: "NS".into(),
            namespace_count: 1,
            ..Default::default()
        };
        mock.add_slot(
            0,
            MockSlot {
                identify: Some(with_ns.to_bytes()),
                namespace1: Some(
                    RawNamespace {
                        size: 100,
                        capacity: 100,
                        utilization: 50,
                        lba_shift: 9,
                    }
                    .to_bytes(),
                ),
                health: None,
            },
        );
        let without_ns = RawIdentify {
            serial: "NONS".into(),
            namespace_count: 1,
            ..Default::default()
        };
        mock.add_slot(1, slot_with(without_ns));
        let cache = IdentityCache::new(Arc::new(mock));

        let ns = cache.resolve("NS").unwrap().namespace1.clone().unwrap();
        assert_eq!(ns.lba_data_size, 512);
        assert_eq!(ns.utilization, 50);
        assert!(cache.resolve("NONS").unwrap().namespace1.is_none());
    }

    #[test]
    fn test_identities_sorted_by_slot() {
        let mock = MockTransport::new();
        mock.add_slot(7, slot_with(serial("B")));
        mock.add_slot(2, slot_with(serial("A")));
        let cache = IdentityCache::new(Arc::new(mock));

        let slots: Vec<_> = cache.identities().iter().map(|i| i.slot).collect();
        assert_eq!(slots, vec![2, 7]);
    }
}
