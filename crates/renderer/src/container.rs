//! Texture-keyed object bins.
//!
//! Objects sharing a texture set are drawn back to back, so the drawers bind
//! each texture once per bin instead of once per object.

use std::collections::{BTreeMap, HashMap};

use hecs::Entity;

/// One model type's objects, grouped by texture type.
#[derive(Debug, Default, Clone)]
pub struct ModelRenderContainer {
    bins: BTreeMap<u32, Vec<Entity>>,
    /// Texture type each object was binned under.
    index: HashMap<Entity, u32>,
}

impl ModelRenderContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object. A second insertion of the same object is ignored.
    pub fn add_object(&mut self, entity: Entity, texture_type: u32) {
        if self.index.contains_key(&entity) {
            log::warn!("Ignoring duplicate insertion of {entity:?} into render container");
            return;
        }
        self.index.insert(entity, texture_type);
        self.bins.entry(texture_type).or_default().push(entity);
    }

    /// Remove an object if present. Returns whether it was binned.
    pub fn del_object(&mut self, entity: Entity) -> bool {
        let Some(texture_type) = self.index.remove(&entity) else {
            return false;
        };
        if let Some(bin) = self.bins.get_mut(&texture_type) {
            if let Some(pos) = bin.iter().position(|e| *e == entity) {
                bin.swap_remove(pos);
            }
            if bin.is_empty() {
                self.bins.remove(&texture_type);
            }
        }
        true
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn num_objects(&self) -> usize {
        self.index.len()
    }

    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Non-empty bins in ascending texture-type order.
    pub fn bins(&self) -> impl Iterator<Item = (u32, &[Entity])> {
        self.bins.iter().map(|(tex, objs)| (*tex, objs.as_slice()))
    }

    pub fn bin(&self, texture_type: u32) -> &[Entity] {
        self.bins.get(&texture_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.bins.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hecs::World;

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.spawn(())).collect()
    }

    #[test]
    fn add_then_del_restores_previous_state() {
        let es = entities(3);
        let mut c = ModelRenderContainer::new();
        c.add_object(es[0], 1);
        c.add_object(es[1], 2);
        let before_bins: Vec<(u32, Vec<Entity>)> = c.bins().map(|(t, o)| (t, o.to_vec())).collect();

        c.add_object(es[2], 3);
        assert_eq!(c.num_objects(), 3);
        assert!(c.del_object(es[2]));

        let after_bins: Vec<(u32, Vec<Entity>)> = c.bins().map(|(t, o)| (t, o.to_vec())).collect();
        assert_eq!(before_bins, after_bins);
        assert_eq!(c.num_objects(), 2);
    }

    #[test]
    fn del_of_absent_object_is_tolerated() {
        let es = entities(2);
        let mut c = ModelRenderContainer::new();
        c.add_object(es[0], 7);
        assert!(!c.del_object(es[1]));
        assert!(c.del_object(es[0]));
        assert!(!c.del_object(es[0]));
        assert!(c.is_empty());
        assert_eq!(c.num_bins(), 0);
    }

    #[test]
    fn objects_sharing_a_texture_share_a_bin() {
        let es = entities(4);
        let mut c = ModelRenderContainer::new();
        c.add_object(es[0], 5);
        c.add_object(es[1], 2);
        c.add_object(es[2], 5);
        c.add_object(es[3], 2);
        let bins: Vec<(u32, usize)> = c.bins().map(|(t, o)| (t, o.len())).collect();
        assert_eq!(bins, vec![(2, 2), (5, 2)]);
        assert_eq!(c.bin(5), &[es[0], es[2]]);
    }

    #[test]
    fn duplicate_insertion_is_ignored() {
        let es = entities(1);
        let mut c = ModelRenderContainer::new();
        c.add_object(es[0], 1);
        c.add_object(es[0], 4);
        assert_eq!(c.num_objects(), 1);
        assert_eq!(c.bin(1), &[es[0]]);
        assert!(c.bin(4).is_empty());
        assert!(c.del_object(es[0]));
        assert_eq!(c.num_objects(), 0);
    }
}
