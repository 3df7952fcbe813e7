//! Entity-component store.
//!
//! Entities are plain ids. Each component type lives in its own ordered map
//! keyed by entity id, and every entity carries a [`ComponentSet`] telling
//! which maps it appears in. Views are queries over those sets, ordered by id
//! so that systems always visit entities in the same order.

use super::components::*;
use crate::game::EntityId;
use crate::physics::PhysicsWorld;
use std::collections::BTreeMap;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentSet(u32);

impl ComponentSet {
    pub const EMPTY: ComponentSet = ComponentSet(0);
    pub const PHYSICAL_BODY: ComponentSet = ComponentSet(1 << 0);
    pub const HEALTH: ComponentSet = ComponentSet(1 << 1);
    pub const PLAYER: ComponentSet = ComponentSet(1 << 2);
    pub const RENDER: ComponentSet = ComponentSet(1 << 3);
    pub const PERCEPTION: ComponentSet = ComponentSet(1 << 4);
    pub const OWNED: ComponentSet = ComponentSet(1 << 5);
    pub const STEERING: ComponentSet = ComponentSet(1 << 6);
    pub const SHOOTING: ComponentSet = ComponentSet(1 << 7);
    pub const IMPACTOR: ComponentSet = ComponentSet(1 << 8);
    pub const COLLIDABLE: ComponentSet = ComponentSet(1 << 9);
    pub const LIFECYCLE: ComponentSet = ComponentSet(1 << 10);
    pub const RESPAWN: ComponentSet = ComponentSet(1 << 11);
    pub const MAILBOX: ComponentSet = ComponentSet(1 << 12);

    pub const fn union(self, other: ComponentSet) -> ComponentSet {
        ComponentSet(self.0 | other.0)
    }

    pub const fn contains(self, other: ComponentSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: ComponentSet) -> bool {
        self.0 & other.0 != 0
    }

    fn without(self, other: ComponentSet) -> ComponentSet {
        ComponentSet(self.0 & !other.0)
    }
}

impl BitOr for ComponentSet {
    type Output = ComponentSet;

    fn bitor(self, rhs: ComponentSet) -> ComponentSet {
        self.union(rhs)
    }
}

/// A component type and the map that stores it.
pub trait Component: Sized {
    const TAG: ComponentSet;

    fn storage(manager: &EntityManager) -> &BTreeMap<EntityId, Self>;
    fn storage_mut(manager: &mut EntityManager) -> &mut BTreeMap<EntityId, Self>;
}

macro_rules! component {
    ($ty:ty, $tag:ident, $field:ident) => {
        impl Component for $ty {
            const TAG: ComponentSet = ComponentSet::$tag;

            fn storage(manager: &EntityManager) -> &BTreeMap<EntityId, Self> {
                &manager.$field
            }

            fn storage_mut(manager: &mut EntityManager) -> &mut BTreeMap<EntityId, Self> {
                &mut manager.$field
            }
        }
    };
}

component!(PhysicalBody, PHYSICAL_BODY, physical_bodies);
component!(Health, HEALTH, healths);
component!(Player, PLAYER, players);
component!(Render, RENDER, renders);
component!(Perception, PERCEPTION, perceptions);
component!(Owned, OWNED, owned);
component!(Steering, STEERING, steerings);
component!(Shooting, SHOOTING, shootings);
component!(Impactor, IMPACTOR, impactors);
component!(Collidable, COLLIDABLE, collidables);
component!(Lifecycle, LIFECYCLE, lifecycles);
component!(Respawn, RESPAWN, respawns);
component!(Mailbox, MAILBOX, mailboxes);

#[derive(Debug, Default)]
pub struct EntityManager {
    next_id: u32,
    entities: BTreeMap<EntityId, ComponentSet>,
    physical_bodies: BTreeMap<EntityId, PhysicalBody>,
    healths: BTreeMap<EntityId, Health>,
    players: BTreeMap<EntityId, Player>,
    renders: BTreeMap<EntityId, Render>,
    perceptions: BTreeMap<EntityId, Perception>,
    owned: BTreeMap<EntityId, Owned>,
    steerings: BTreeMap<EntityId, Steering>,
    shootings: BTreeMap<EntityId, Shooting>,
    impactors: BTreeMap<EntityId, Impactor>,
    collidables: BTreeMap<EntityId, Collidable>,
    lifecycles: BTreeMap<EntityId, Lifecycle>,
    respawns: BTreeMap<EntityId, Respawn>,
    mailboxes: BTreeMap<EntityId, Mailbox>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new id; ids are never reused.
    pub fn new_entity(&mut self) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.entities.insert(id, ComponentSet::EMPTY);
        id
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Attaches `component` to `id`, replacing any previous one of that type.
    pub fn add<C: Component>(&mut self, id: EntityId, component: C) -> &mut Self {
        if let Some(tag) = self.entities.get_mut(&id) {
            *tag = tag.union(C::TAG);
            C::storage_mut(self).insert(id, component);
        }
        self
    }

    pub fn get<C: Component>(&self, id: EntityId) -> Option<&C> {
        C::storage(self).get(&id)
    }

    pub fn get_mut<C: Component>(&mut self, id: EntityId) -> Option<&mut C> {
        C::storage_mut(self).get_mut(&id)
    }

    pub fn has(&self, id: EntityId, components: ComponentSet) -> bool {
        self.entities
            .get(&id)
            .map_or(false, |tag| tag.contains(components))
    }

    /// Entities holding every component of `required`, in id order.
    pub fn view(&self, required: ComponentSet) -> Vec<EntityId> {
        self.view_excluding(required, ComponentSet::EMPTY)
    }

    /// Like [`EntityManager::view`], skipping entities holding any of `excluded`.
    pub fn view_excluding(&self, required: ComponentSet, excluded: ComponentSet) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, tag)| tag.contains(required) && !tag.intersects(excluded))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Removes the entity and all its components. Its physical body, if any,
    /// is destroyed in `world`.
    pub fn dispose(&mut self, id: EntityId, world: &mut PhysicsWorld) -> bool {
        let Some(tag) = self.entities.remove(&id) else {
            return false;
        };

        if let Some(body) = self.physical_bodies.remove(&id) {
            world.destroy_body(body.body);
        }

        let rest = tag.without(ComponentSet::PHYSICAL_BODY);
        if rest.contains(ComponentSet::HEALTH) {
            self.healths.remove(&id);
        }
        if rest.contains(ComponentSet::PLAYER) {
            self.players.remove(&id);
        }
        if rest.contains(ComponentSet::RENDER) {
            self.renders.remove(&id);
        }
        if rest.contains(ComponentSet::PERCEPTION) {
            self.perceptions.remove(&id);
        }
        if rest.contains(ComponentSet::OWNED) {
            self.owned.remove(&id);
        }
        if rest.contains(ComponentSet::STEERING) {
            self.steerings.remove(&id);
        }
        if rest.contains(ComponentSet::SHOOTING) {
            self.shootings.remove(&id);
        }
        if rest.contains(ComponentSet::IMPACTOR) {
            self.impactors.remove(&id);
        }
        if rest.contains(ComponentSet::COLLIDABLE) {
            self.collidables.remove(&id);
        }
        if rest.contains(ComponentSet::LIFECYCLE) {
            self.lifecycles.remove(&id);
        }
        if rest.contains(ComponentSet::RESPAWN) {
            self.respawns.remove(&id);
        }
        if rest.contains(ComponentSet::MAILBOX) {
            self.mailboxes.remove(&id);
        }

        true
    }
}
