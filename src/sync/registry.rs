use crate::models::state::DeviceRecord;
use crate::models::tado::{HomeId, ZoneId};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// Home id to the zone ids polled in that home.
pub type HomeZoneIndex = BTreeMap<HomeId, BTreeSet<ZoneId>>;

/// Logical devices known to the engine, unique by id.
///
/// A handful of devices per home is the expected scale, so lookups are linear.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` unless its id is already present. Returns whether it was inserted.
    pub fn register(&mut self, record: DeviceRecord) -> bool {
        if self.get(&record.id).is_some() {
            debug!("Device {} already registered", record.id);
            return false;
        }
        info!(
            "Registered device {} (home {}, zone {} {:?})",
            record.id, record.home_id.0, record.zone_id.0, record.zone_type
        );
        self.devices.push(record);
        true
    }

    /// Replace the stored record with the same id. Returns whether one was found.
    pub fn update(&mut self, record: DeviceRecord) -> bool {
        match self.devices.iter_mut().find(|d| d.id == record.id) {
            Some(slot) => {
                if *slot != record {
                    info!(
                        "Updated device {}: zone {} -> {} ({:?})",
                        record.id, slot.zone_id.0, record.zone_id.0, record.zone_type
                    );
                }
                *slot = record;
                true
            }
            None => {
                debug!("Ignoring update of unknown device {}", record.id);
                false
            }
        }
    }

    /// Remove the record with `id`, returning it when present.
    pub fn unregister(&mut self, id: &str) -> Option<DeviceRecord> {
        let pos = self.devices.iter().position(|d| d.id == id)?;
        let removed = self.devices.remove(pos);
        info!("Unregistered device {} (home {})", removed.id, removed.home_id.0);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter()
    }

    pub fn contains_home(&self, home_id: HomeId) -> bool {
        self.devices.iter().any(|d| d.home_id == home_id)
    }

    /// Point-in-time home to zones projection. Recompute after every mutation.
    pub fn home_zone_index(&self) -> HomeZoneIndex {
        let mut index = HomeZoneIndex::new();
        for d in &self.devices {
            index.entry(d.home_id).or_default().insert(d.zone_id);
        }
        index
    }

    pub fn homes(&self) -> BTreeSet<HomeId> {
        self.devices.iter().map(|d| d.home_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tado::ZoneType;

    fn record(id: &str, home: i64, zone: i64) -> DeviceRecord {
        DeviceRecord::new(id, HomeId(home), ZoneId(zone), ZoneType::Heating)
    }

    #[test]
    fn re_registering_is_a_no_op() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.register(record("RU1", 1, 1)));
        assert!(!registry.register(record("RU1", 1, 5)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("RU1").unwrap().zone_id, ZoneId(1));
    }

    #[test]
    fn update_replaces_in_place_and_ignores_unknown_ids() {
        let mut registry = DeviceRegistry::new();
        registry.register(record("RU1", 1, 1));
        registry.register(record("VA1", 1, 2));

        assert!(registry.update(record("VA1", 1, 4)));
        assert!(!registry.update(record("VA9", 1, 4)));

        let ids: Vec<_> = registry.iter().map(|d| (d.id.as_str(), d.zone_id.0)).collect();
        assert_eq!(ids, vec![("RU1", 1), ("VA1", 4)]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = DeviceRegistry::new();
        registry.register(record("RU1", 1, 1));
        assert!(registry.unregister("RU1").is_some());
        assert!(registry.unregister("RU1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn home_zone_index_groups_zones_per_home() {
        let mut registry = DeviceRegistry::new();
        registry.register(record("RU1", 1, 1));
        registry.register(record("VA1", 1, 1));
        registry.register(record("VA2", 1, 3));
        registry.register(record("RU2", 2, 1));

        let index = registry.home_zone_index();
        assert_eq!(index.len(), 2);
        assert_eq!(index[&HomeId(1)].iter().map(|z| z.0).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(index[&HomeId(2)].len(), 1);

        registry.unregister("RU2");
        assert!(!registry.contains_home(HomeId(2)));
        assert_eq!(registry.homes().into_iter().collect::<Vec<_>>(), vec![HomeId(1)]);
    }
}
