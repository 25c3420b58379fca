//! Pose registry: identity -> tracked object

use std::collections::HashMap;
use tracing::debug;

use crate::entity::{Entity, EntityId, Pose};
use crate::manifest::AssetManifest;
use crate::wire::ObjectRecord;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Records that resolved to an entity
    pub placed: usize,
    /// Records whose identity is not registered
    pub skipped: usize,
}

/// Every tracked object, populated once from the asset manifest
///
/// There is no insert or remove after construction. Unknown identities in a
/// snapshot are skipped, never created on demand.
#[derive(Debug, Clone)]
pub struct PoseRegistry<H> {
    entities: HashMap<EntityId, Entity<H>>,
}

impl<H> Default for PoseRegistry<H> {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
}

impl<H> PoseRegistry<H> {
    /// Build the registry, creating one renderable handle per manifest entry.
    ///
    /// `load` returns `None` when an entry's asset could not be loaded; that
    /// identity then stays unknown for the whole session.
    pub fn from_manifest<F>(manifest: &AssetManifest, mut load: F) -> Self
    where
        F: FnMut(EntityId, &str) -> Option<H>,
    {
        let entities = manifest
            .entries()
            .filter_map(|(id, name)| {
                let handle = load(id, name)?;
                Some((id, Entity::new(id, name, handle)))
            })
            .collect();
        Self { entities }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity<H>> {
        self.entities.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity<H>> {
        self.entities.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity<H>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.entities.values().filter(|e| e.is_visible()).count()
    }

    /// Hide everything, then place and show each listed entity in input order.
    ///
    /// A repeated identity within one snapshot ends at its last record.
    pub(crate) fn reconcile(&mut self, records: &[ObjectRecord]) -> ReconcileSummary {
        for entity in self.entities.values_mut() {
            entity.hide();
        }

        let mut summary = ReconcileSummary::default();
        for record in records {
            match self.get_mut(EntityId(record.id)) {
                Some(entity) => {
                    entity.place(Pose::from(record));
                    summary.placed += 1;
                }
                None => {
                    debug!(id = record.id, "Skipping unknown object id");
                    summary.skipped += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(names: &[&str]) -> PoseRegistry<String> {
        let manifest = AssetManifest::new(names.iter().map(|s| s.to_string()).collect());
        PoseRegistry::from_manifest(&manifest, |_, name| Some(format!("mesh:{}", name)))
    }

    fn record(id: i64, x: f64, rot: f64) -> ObjectRecord {
        ObjectRecord { id, x, y: 0.0, z: 0.0, rot }
    }

    #[test]
    fn test_bootstrap_hidden() {
        let reg = registry(&["a", "b", "c"]);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.visible_count(), 0);
        assert_eq!(reg.get(EntityId(1)).unwrap().handle(), "mesh:b");
        assert!(reg.get(EntityId(3)).is_none());
    }

    #[test]
    fn test_failed_asset_leaves_gap() {
        let manifest = AssetManifest::new(vec!["a".into(), "broken".into(), "c".into()]);
        let reg = PoseRegistry::from_manifest(&manifest, |_, name| {
            (name != "broken").then(|| name.to_string())
        });
        assert_eq!(reg.len(), 2);
        assert!(reg.get(EntityId(1)).is_none());
        assert_eq!(reg.get(EntityId(2)).unwrap().name(), "c");
    }

    #[test]
    fn test_reconcile_skips_unknown() {
        let mut reg = registry(&["a", "b"]);
        let summary = reg.reconcile(&[record(1, 0.3, 1.0), record(7, 0.0, 0.0), record(-1, 0.0, 0.0)]);
        assert_eq!(summary, ReconcileSummary { placed: 1, skipped: 2 });
        assert_eq!(reg.len(), 2);

        let b = reg.get(EntityId(1)).unwrap();
        assert!(b.is_visible());
        assert_eq!(b.pose().position, [0.3, 0.0, 0.0]);
        assert_eq!(b.pose().rot, 1.0);
        assert!(!reg.get(EntityId(0)).unwrap().is_visible());
    }

    #[test]
    fn test_duplicate_id_last_wins() {
        let mut reg = registry(&["a"]);
        reg.reconcile(&[record(0, 1.0, 0.1), record(0, 2.0, 0.2)]);
        let a = reg.get(EntityId(0)).unwrap();
        assert_eq!(a.pose().position[0], 2.0);
        assert_eq!(a.pose().rot, 0.2);
    }

    #[test]
    fn test_hidden_entity_keeps_last_pose() {
        let mut reg = registry(&["a"]);
        reg.reconcile(&[record(0, 1.5, 0.0)]);
        reg.reconcile(&[]);
        let a = reg.get(EntityId(0)).unwrap();
        assert!(!a.is_visible());
        assert_eq!(a.pose().position[0], 1.5);
    }
}
