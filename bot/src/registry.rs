//! Local mirror of the remote entities currently visible to the session
//!
//! The registry only mirrors a best-effort stream: messages can reference
//! entities that already left or were never announced. Every operation treats
//! a missing id as a normal, silent outcome.

use shared::Vec3;
use std::collections::HashMap;

/// A remote actor (usually another player) visible to this session
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Display name
    pub name: String,
    /// Session-scoped id, reused by the server after the entity is removed
    pub runtime_id: u64,
    /// Stable id across the entity's whole existence; informational only
    pub global_id: i64,
    /// Last known position
    pub position: Vec3,
}

/// Entities keyed by runtime id. At most one entry per id.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<u64, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// Inserts the entity, replacing any record already stored under `runtime_id`.
    ///
    /// Replacement is total: no field of the previous record survives.
    pub fn upsert(&mut self, runtime_id: u64, name: &str, global_id: i64, position: Vec3) {
        self.entities.insert(
            runtime_id,
            Entity {
                name: name.to_string(),
                runtime_id,
                global_id,
                position,
            },
        );
    }

    /// Replaces the stored position.
    ///
    /// Returns true only if the entity exists and the new position is
    /// distinguishable from the old one. The stored value is refreshed either way.
    pub fn move_to(&mut self, runtime_id: u64, position: Vec3) -> bool {
        match self.entities.get_mut(&runtime_id) {
            Some(entity) => {
                let changed = !entity.position.approx_eq(&position);
                entity.position = position;
                changed
            }
            None => false,
        }
    }

    /// Adds `delta` to the stored position. Same return contract as [`move_to`](Self::move_to).
    pub fn move_delta(&mut self, runtime_id: u64, delta: Vec3) -> bool {
        match self.entities.get_mut(&runtime_id) {
            Some(entity) => {
                let moved = entity.position + delta;
                let changed = !entity.position.approx_eq(&moved);
                entity.position = moved;
                changed
            }
            None => false,
        }
    }

    pub fn remove(&mut self, runtime_id: u64) -> Option<Entity> {
        self.entities.remove(&runtime_id)
    }

    pub fn get(&self, runtime_id: u64) -> Option<&Entity> {
        self.entities.get(&runtime_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}
