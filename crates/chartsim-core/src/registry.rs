//! Arena registry of groups and entities.
//!
//! Both tables are keyed by stable surrogate ids. A [`Group`] lists the ids of
//! its entities and an [`Entity`] names its owner by [`GroupId`]; neither
//! holds a reference to the other. Names are mutable attributes: lookups by
//! name scan the table, renames check uniqueness.
//!
//! Not thread-safe. The runtime wraps the registry in a lock so that a
//! scheduler tick and an on-demand action never interleave on an entity.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::types::{
    ChartState, DerivationParams, Entity, EntityId, Group, GroupId, GroupProfile, Metrics,
    SimAttributes,
};

/// Flat id-keyed tables. Iteration order is id order, which keeps seeded
/// simulations reproducible.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    groups: BTreeMap<GroupId, Group>,
    entities: BTreeMap<EntityId, Entity>,
    next_group: u64,
    next_entity: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group. Group names are unique ignoring ASCII case.
    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        profile: GroupProfile,
    ) -> Result<GroupId, RegistryError> {
        let name = name.into();
        if self.find_group(&name).is_some() {
            return Err(RegistryError::NameTaken(name));
        }
        self.next_group += 1;
        let id = GroupId(self.next_group);
        self.groups.insert(
            id,
            Group {
                id,
                name,
                popularity: profile.popularity,
                fan_base: profile.fan_base,
                general_interest: profile.general_interest,
                active: true,
                entities: Vec::new(),
            },
        );
        Ok(id)
    }

    /// Create an entity owned by `group`.
    ///
    /// Simulation attributes are derived from the group's scores at this
    /// moment and never re-derived. `platforms` seeds an empty chart state
    /// per platform name.
    pub fn create_entity<'a>(
        &mut self,
        group: GroupId,
        name: impl Into<String>,
        released_at: DateTime<Utc>,
        params: &DerivationParams,
        platforms: impl IntoIterator<Item = &'a str>,
    ) -> Result<EntityId, RegistryError> {
        let name = name.into();
        if self.find_entity(&name).is_some() {
            return Err(RegistryError::NameTaken(name));
        }
        let owner = self
            .groups
            .get_mut(&group)
            .ok_or(RegistryError::UnknownGroup(group))?;

        self.next_entity += 1;
        let id = EntityId(self.next_entity);
        let attributes = SimAttributes::derive(owner, params);
        owner.entities.push(id);

        let charts = platforms
            .into_iter()
            .map(|p| (p.to_string(), ChartState::default()))
            .collect();

        self.entities.insert(
            id,
            Entity {
                id,
                group,
                name,
                released_at,
                metrics: Metrics::default(),
                charts,
                promotion: None,
                attributes,
                history: VecDeque::new(),
                excluded: false,
            },
        );
        Ok(id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Owner group of an entity, if both exist.
    pub fn owner_of(&self, id: EntityId) -> Option<&Group> {
        self.entities.get(&id).and_then(|e| self.groups.get(&e.group))
    }

    pub fn find_group(&self, name: &str) -> Option<GroupId> {
        self.groups
            .values()
            .find(|g| g.name.eq_ignore_ascii_case(name))
            .map(|g| g.id)
    }

    pub fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.entities
            .values()
            .find(|e| e.name == name)
            .map(|e| e.id)
    }

    pub fn rename_group(&mut self, id: GroupId, name: impl Into<String>) -> Result<(), RegistryError> {
        let name = name.into();
        if self.find_group(&name).is_some_and(|other| other != id) {
            return Err(RegistryError::NameTaken(name));
        }
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGroup(id))?;
        group.name = name;
        Ok(())
    }

    pub fn rename_entity(
        &mut self,
        id: EntityId,
        name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.find_entity(&name).is_some_and(|other| other != id) {
            return Err(RegistryError::NameTaken(name));
        }
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(RegistryError::UnknownEntity(id))?;
        entity.name = name;
        Ok(())
    }

    /// Flip a group's active flag. Inactive owners freeze their entities.
    pub fn set_group_active(&mut self, id: GroupId, active: bool) -> Result<(), RegistryError> {
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGroup(id))?;
        group.active = active;
        Ok(())
    }

    /// Replace a group's externally supplied scores. Existing entities keep
    /// the attributes they were created with.
    pub fn update_group_profile(
        &mut self,
        id: GroupId,
        profile: GroupProfile,
    ) -> Result<(), RegistryError> {
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(RegistryError::UnknownGroup(id))?;
        group.popularity = profile.popularity;
        group.fan_base = profile.fan_base;
        group.general_interest = profile.general_interest;
        Ok(())
    }

    pub fn entities_of(&self, group: GroupId) -> &[EntityId] {
        self.groups
            .get(&group)
            .map(|g| g.entities.as_slice())
            .unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
