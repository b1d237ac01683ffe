//! Entity identifiers and the entity registry.
//!
//! An [`Entity`] is a 64-bit handle that packs an *index* in the high 48 bits
//! and a *generation* in the low 16 bits. The generation is bumped every time
//! a slot is destroyed, which allows immediate stale-handle detection once the
//! slot is recycled.
//!
//! Dead slots form an intrusive free list: the index field of a dead slot
//! holds the index of the next dead slot, so recycling needs no side
//! allocation.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::EcsError;

const GENERATION_BITS: u32 = 16;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Largest index an entity can carry (48 bits).
pub const MAX_INDEX: u64 = (1 << (u64::BITS - GENERATION_BITS)) - 1;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[index: 48 bits | generation: 16 bits]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// Construct an `Entity` from an index and generation.
    #[inline]
    pub fn new(index: u64, generation: u16) -> Self {
        debug_assert!(index <= MAX_INDEX, "entity index {index} exceeds 48 bits");
        Self((index << GENERATION_BITS) | generation as u64)
    }

    /// The index portion (high 48 bits).
    #[inline]
    pub fn index(self) -> u64 {
        self.0 >> GENERATION_BITS
    }

    /// The generation portion (low 16 bits).
    #[inline]
    pub fn generation(self) -> u16 {
        (self.0 & GENERATION_MASK) as u16
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.index() as usize
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Slots {
    /// One entry per slot. Alive slots hold their own entity; dead slots hold
    /// the next free index in the index field.
    entities: Vec<Entity>,
    /// Whether each slot is currently occupied.
    alive: Vec<bool>,
    /// Head of the free list.
    next: u64,
    /// Length of the free list.
    available: u64,
}

impl Slots {
    fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.slot();
        idx < self.entities.len()
            && self.alive[idx]
            && self.entities[idx].generation() == entity.generation()
    }
}

/// Creates, destroys and validates [`Entity`] handles.
///
/// Safe to share between threads: `is_alive` takes a shared lock while
/// `create` and `destroy` take the exclusive lock.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: RwLock<Slots>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with room for `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Slots {
                entities: Vec::with_capacity(capacity),
                alive: Vec::with_capacity(capacity),
                next: 0,
                available: 0,
            }),
        }
    }

    /// Create a new entity.
    ///
    /// Reuses the most recently destroyed slot if there is one (its generation
    /// was already bumped on destroy); otherwise appends a fresh slot with
    /// generation 0.
    pub fn create(&self) -> Entity {
        let mut slots = self.slots.write();

        if slots.available == 0 {
            let index = slots.entities.len() as u64;
            assert!(index <= MAX_INDEX, "entity index space exhausted");
            let entity = Entity::new(index, 0);
            slots.entities.push(entity);
            slots.alive.push(true);
            return entity;
        }

        let index = slots.next;
        let idx = index as usize;
        let dead = slots.entities[idx];
        let entity = Entity::new(index, dead.generation());
        slots.next = dead.index();
        slots.entities[idx] = entity;
        slots.alive[idx] = true;
        slots.available -= 1;
        entity
    }

    /// Destroy an entity, bumping its slot's generation so that outstanding
    /// handles become stale, and push the slot onto the free list.
    ///
    /// Fails with [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn destroy(&self, entity: Entity) -> Result<(), EcsError> {
        let mut slots = self.slots.write();
        if !slots.is_alive(entity) {
            warn!(%entity, "destroy called on a dead or stale entity");
            return Err(EcsError::StaleEntity { entity });
        }

        let idx = entity.slot();
        let head = slots.next;
        let generation = slots.entities[idx].generation().wrapping_add(1);
        slots.entities[idx] = Entity::new(head, generation);
        slots.alive[idx] = false;
        slots.next = entity.index();
        slots.available += 1;
        Ok(())
    }

    /// Whether `entity` refers to an occupied slot with a matching generation.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots.read().is_alive(entity)
    }

    /// The live entity occupying slot `index`, if any.
    pub fn resolve(&self, index: u64) -> Option<Entity> {
        let slots = self.slots.read();
        let idx = usize::try_from(index).ok()?;
        match slots.alive.get(idx) {
            Some(true) => Some(slots.entities[idx]),
            _ => None,
        }
    }

    /// Number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        let slots = self.slots.read();
        slots.entities.len() - slots.available as usize
    }

    /// Number of slots ever allocated (alive and dead).
    pub fn capacity(&self) -> usize {
        self.slots.read().entities.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
