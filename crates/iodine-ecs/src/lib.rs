//! Iodine ECS -- sparse-set Entity Component System with ownership groups.
//!
//! Entities are generational 64-bit handles. Every component type lives in its
//! own pool (a sparse set keyed by entity index). Systems declare which
//! components they read and write; from those declarations each system gets a
//! [`Group`](system::Group) that packs the pools it owns into iteration order
//! and tells a scheduler which systems may run side by side. Events travel
//! between systems through double-buffered queues that flip once per step.
//!
//! # Quick Start
//!
//! ```
//! use iodine_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! iodine_ecs::component!(Position);
//!
//! let ecs = Ecs::new();
//! ecs.enter::<Position>().unwrap();
//!
//! let e = ecs.create();
//! ecs.insert(e, Position { x: 1.0, y: 2.0 }).unwrap();
//! assert_eq!(*ecs.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
//! ```

#![deny(unsafe_code)]

pub mod bitset;
pub mod component;
pub mod config;
pub mod ecs;
pub mod entity;
pub mod event;
mod reflect;
pub mod sparse_set;
pub mod system;
pub mod view;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Coarse classification of an [`EcsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Something looked up does not exist.
    NotFound,
    /// The request conflicts with existing state or declarations.
    InvalidArgument,
}

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity is dead, recycled, or was never allocated.
    #[error("entity {entity} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::Entity },

    /// A sparse set was indexed at an absent key.
    #[error("sparse set has no value at index {index}")]
    MissingIndex { index: usize },

    /// A component type was used before being registered.
    #[error("component type '{name}' not registered")]
    UnknownComponent { name: String },

    /// The entity does not have the requested component.
    #[error("entity {entity} has no '{component}' component")]
    MissingComponent {
        entity: entity::Entity,
        component: &'static str,
    },

    /// An event name was never registered.
    #[error("event '{name}' not registered")]
    UnknownEvent { name: String },

    /// No system is registered under this id.
    #[error("no system with id {id}")]
    UnknownSystem { id: system::SystemId },

    /// Two different component types share one name.
    #[error("component name '{name}' is already used by another type")]
    NameConflict { name: String },

    /// A system with this name is already registered.
    #[error("system '{name}' is already registered")]
    DuplicateSystem { name: String },

    /// The event type already has a queue.
    #[error("event '{name}' already has a queue")]
    DuplicateQueue { name: &'static str },

    /// The event type is registered but has no queue.
    #[error("event '{name}' has no queue")]
    MissingQueue { name: &'static str },

    /// A component cannot be erased while systems declare it.
    #[error("component '{name}' is declared by {systems} registered system(s)")]
    ComponentInUse { name: &'static str, systems: usize },

    /// A system touched a component or event outside its declaration.
    #[error("system '{system}' did not declare {} access to '{name}'", access_word(.write))]
    UndeclaredAccess {
        system: String,
        name: &'static str,
        write: bool,
    },

    /// Configuration could not be parsed or rendered.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

fn access_word(write: &bool) -> &'static str {
    if *write {
        "write"
    } else {
        "read"
    }
}

impl EcsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StaleEntity { .. }
            | Self::MissingIndex { .. }
            | Self::UnknownComponent { .. }
            | Self::MissingComponent { .. }
            | Self::UnknownEvent { .. }
            | Self::UnknownSystem { .. } => ErrorKind::NotFound,
            Self::NameConflict { .. }
            | Self::DuplicateSystem { .. }
            | Self::DuplicateQueue { .. }
            | Self::MissingQueue { .. }
            | Self::ComponentInUse { .. }
            | Self::UndeclaredAccess { .. }
            | Self::Config(_) => ErrorKind::InvalidArgument,
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::bitset::BitSet;
    pub use crate::component::{Component, ComponentId, ComponentRegistry, Pool, Ref, RefMut};
    pub use crate::config::EcsConfig;
    pub use crate::ecs::{Ecs, StepDiagnostics};
    pub use crate::entity::{Entity, EntityRegistry};
    pub use crate::event::{Event, EventBus, EventId, EventRegistry, Queue};
    pub use crate::sparse_set::SparseSet;
    pub use crate::system::{Builder, Context, Descriptor, Group, SystemId, SystemRegistry};
    pub use crate::view::View;
    pub use crate::{EcsError, ErrorKind};
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    crate::component!(Position, Velocity, Health);

    fn setup() -> Ecs {
        let ecs = Ecs::new();
        ecs.enter::<Position>().unwrap();
        ecs.enter::<Velocity>().unwrap();
        ecs.enter::<Health>().unwrap();
        ecs
    }

    #[test]
    fn position_create_remove_recreate() {
        let ecs = setup();
        let e = ecs.create();

        ecs.components().create(e, Position { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(*ecs.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });

        ecs.components().remove::<Position>(e).unwrap();
        ecs.components().create(e, Position { x: 3.0, y: 4.0 }).unwrap();
        assert_eq!(*ecs.get::<Position>(e).unwrap(), Position { x: 3.0, y: 4.0 });
    }

    #[test]
    fn duplicate_component_registration_shares_pool() {
        let ecs = setup();
        let first = ecs.enter::<Position>().unwrap();
        let second = ecs.enter::<Position>().unwrap();
        assert_eq!(first, second);
        assert_eq!(ecs.components().count(), 3);

        let a = ecs.components().pool::<Position>().unwrap();
        let b = ecs.components().pool::<Position>().unwrap();
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn duplicate_system_name_is_invalid_argument() {
        let mut ecs = setup();
        let first = ecs.system("physics").build(|_| {}).unwrap();
        ecs.add_system(first).unwrap();
        let second = ecs.system("physics").build(|_| {}).unwrap();
        let err = ecs.add_system(second).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn missing_component_is_not_found() {
        let ecs = setup();
        let e = ecs.create();
        let err = ecs.get::<Health>(e).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), format!("entity {e} has no 'Health' component"));
    }

    #[test]
    fn get_mut_then_read_back() {
        let ecs = setup();
        let e = ecs.create();
        ecs.insert(e, Health(10)).unwrap();
        ecs.get_mut::<Health>(e).unwrap().0 -= 3;
        assert_eq!(*ecs.get::<Health>(e).unwrap(), Health(7));
    }

    #[test]
    fn group_signature_lists_owned_and_partial() {
        let mut ecs = setup();
        let desc = ecs
            .system("render")
            .reads::<(Position, Velocity)>()
            .writes::<(Health,)>()
            .allow_partial(true)
            .build(|_| {})
            .unwrap();
        let id = ecs.add_system(desc).unwrap();
        let system = ecs.systems().get(id).unwrap();
        assert_eq!(
            system.group().signature(ecs.components()),
            "~Position, ~Velocity, +Health"
        );
    }

    #[test]
    fn scale_10k_entities() {
        let mut ecs = setup();
        let movement = ecs
            .system("movement")
            .reads::<(Velocity,)>()
            .writes::<(Position,)>()
            .build(|ctx| {
                let mut view = ctx.view::<(&mut Position, &Velocity)>().unwrap();
                for (_, (pos, vel)) in view.iter() {
                    pos.x += vel.dx;
                    pos.y += vel.dy;
                }
            })
            .unwrap();
        ecs.add_system(movement).unwrap();

        let mut entities = Vec::with_capacity(10_000);
        for i in 0..10_000u32 {
            let e = ecs.create();
            ecs.insert(e, Position { x: i as f32, y: 0.0 }).unwrap();
            if i % 2 == 0 {
                ecs.insert(e, Velocity { dx: 1.0, dy: -1.0 }).unwrap();
            }
            entities.push(e);
        }

        ecs.step();
        assert_eq!(
            *ecs.get::<Position>(entities[0]).unwrap(),
            Position { x: 1.0, y: -1.0 }
        );
        assert_eq!(
            *ecs.get::<Position>(entities[1]).unwrap(),
            Position { x: 1.0, y: 0.0 }
        );

        for e in entities.iter().take(5_000) {
            ecs.destroy(*e).unwrap();
        }
        assert_eq!(ecs.alive_count(), 5_000);

        ecs.step();
        assert_eq!(
            *ecs.get::<Position>(entities[5_000]).unwrap(),
            Position { x: 5_002.0, y: -2.0 }
        );
        assert_eq!(
            *ecs.get::<Position>(entities[5_001]).unwrap(),
            Position { x: 5_001.0, y: 0.0 }
        );
    }
}
