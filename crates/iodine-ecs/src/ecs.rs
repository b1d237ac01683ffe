//! The [`Ecs`] facade: one owner for every registry plus the step driver.
//!
//! Each [`step`](Ecs::step):
//!
//! 1. swaps every event queue, so events emitted last step become readable;
//! 2. runs every active system in ascending id order, refreshing its group
//!    right before the callback;
//! 3. records timing in [`StepDiagnostics`].
//!
//! Systems run sequentially on the calling thread. An external scheduler can
//! use [`Group::can_run_with`](crate::system::Group::can_run_with) to decide
//! which of them could share a step concurrently.
//!
//! ```
//! use iodine_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! struct Velocity { dx: f32, dy: f32 }
//! iodine_ecs::component!(Position, Velocity);
//!
//! let mut ecs = Ecs::new();
//! let movement = ecs
//!     .system("movement")
//!     .reads::<(Velocity,)>()
//!     .writes::<(Position,)>()
//!     .build(|ctx| {
//!         let mut view = ctx.view::<(&mut Position, &Velocity)>().unwrap();
//!         for (_, (pos, vel)) in view.iter() {
//!             pos.x += vel.dx;
//!             pos.y += vel.dy;
//!         }
//!     })
//!     .unwrap();
//! ecs.add_system(movement).unwrap();
//!
//! let e = ecs.create();
//! ecs.insert(e, Position { x: 0.0, y: 0.0 }).unwrap();
//! ecs.insert(e, Velocity { dx: 1.0, dy: 2.0 }).unwrap();
//!
//! ecs.run(3);
//! assert_eq!(*ecs.get::<Position>(e).unwrap(), Position { x: 3.0, y: 6.0 });
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug_span, trace};

use crate::component::{Component, ComponentId, ComponentRegistry, Ref, RefMut};
use crate::config::EcsConfig;
use crate::entity::{Entity, EntityRegistry};
use crate::event::{Event, EventBus, EventId, EventRegistry, Queue};
use crate::system::{Builder, Context, Descriptor, SystemId, SystemRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// StepDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last step.
#[derive(Debug, Clone, Default)]
pub struct StepDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(String, Duration)>,
    /// Time spent swapping event queues.
    pub swap_time: Duration,
    /// Total time for the step.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// Ecs
// ---------------------------------------------------------------------------

/// Owns the entity, component, event and system registries.
#[derive(Debug)]
pub struct Ecs {
    config: EcsConfig,
    entities: EntityRegistry,
    components: ComponentRegistry,
    bus: EventBus,
    systems: SystemRegistry,
    step_counter: u64,
    last_diagnostics: StepDiagnostics,
}

impl Default for Ecs {
    fn default() -> Self {
        Self::new()
    }
}

impl Ecs {
    /// Create an empty ECS with default settings.
    pub fn new() -> Self {
        Self::with_config(EcsConfig::default())
    }

    /// Create an empty ECS.
    pub fn with_config(config: EcsConfig) -> Self {
        let events = Arc::new(EventRegistry::new());
        Self {
            entities: EntityRegistry::with_capacity(config.initial_entities),
            components: ComponentRegistry::new(),
            bus: EventBus::with_capacity(events, config.event_capacity),
            systems: SystemRegistry::new(),
            step_counter: 0,
            last_diagnostics: StepDiagnostics::default(),
            config,
        }
    }

    pub fn config(&self) -> &EcsConfig {
        &self.config
    }

    // -- entities -----------------------------------------------------------

    pub fn create(&self) -> Entity {
        self.entities.create()
    }

    /// Destroy `entity` and every component attached to it.
    pub fn destroy(&self, entity: Entity) -> Result<(), EcsError> {
        self.check_alive(entity)?;
        self.components.remove_all(entity);
        self.entities.destroy(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    // -- components ---------------------------------------------------------

    /// Register component type `T`. Idempotent.
    pub fn enter<T: Component>(&self) -> Result<ComponentId, EcsError> {
        self.components.enter::<T>()
    }

    /// Attach `value` to `entity`, registering `T` if needed.
    ///
    /// If the entity already has `T`, the existing value is kept.
    pub fn insert<T: Component>(&self, entity: Entity, value: T) -> Result<RefMut<T>, EcsError> {
        self.check_alive(entity)?;
        self.components.enter::<T>()?;
        self.components.create(entity, value)
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Result<Ref<T>, EcsError> {
        self.check_alive(entity)?;
        self.components.get(entity)
    }

    pub fn get_mut<T: Component>(&self, entity: Entity) -> Result<RefMut<T>, EcsError> {
        self.check_alive(entity)?;
        self.components.get_mut(entity)
    }

    /// Detach `T` from `entity`.
    pub fn remove<T: Component>(&self, entity: Entity) -> Result<Option<T>, EcsError> {
        self.check_alive(entity)?;
        self.components.remove(entity)
    }

    /// Whether a live `entity` has `T`.
    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity) && self.components.contains::<T>(entity)
    }

    // -- events -------------------------------------------------------------

    /// Register event type `E` and create its queue.
    pub fn enter_event<E: Event>(&self) -> Result<EventId, EcsError> {
        self.bus.enter::<E>()
    }

    /// Queue `event` for the next step.
    pub fn emit<E: Event>(&self, event: E) -> Result<(), EcsError> {
        self.bus.emit(event)
    }

    pub fn queue<E: Event>(&self) -> Result<Arc<Queue<E>>, EcsError> {
        self.bus.queue::<E>()
    }

    // -- systems ------------------------------------------------------------

    /// Start describing a system. Pass the result to
    /// [`add_system`](Self::add_system).
    pub fn system(&self, name: impl Into<String>) -> Builder<'_> {
        Builder::new(name, &self.components)
    }

    /// Register a system. The components it declares cannot be erased until
    /// it is removed again.
    pub fn add_system(&mut self, descriptor: Descriptor) -> Result<SystemId, EcsError> {
        let id = self.systems.enter(descriptor)?;
        let system = self.systems.get(id)?;
        self.components.hold(system.group().required());
        Ok(id)
    }

    pub fn remove_system(&mut self, id: SystemId) -> Result<Descriptor, EcsError> {
        let descriptor = self.systems.erase(id)?;
        self.components.release(&(descriptor.reads() | descriptor.writes()));
        Ok(descriptor)
    }

    pub fn set_active(&mut self, id: SystemId, active: bool) -> Result<(), EcsError> {
        self.systems.set_active(id, active)
    }

    // -- stepping -----------------------------------------------------------

    /// Run one step: swap event queues, then run every active system.
    pub fn step(&mut self) {
        let span = debug_span!("step", step = self.step_counter);
        let _enter = span.enter();
        let step_start = Instant::now();

        let swap_start = Instant::now();
        self.bus.swap();
        let swap_time = swap_start.elapsed();

        let mut system_times = Vec::with_capacity(self.systems.len());
        for (id, system) in self.systems.iter_mut() {
            if !system.active {
                continue;
            }
            let sys_start = Instant::now();
            let descriptor = &mut system.descriptor;
            let group = &mut system.group;
            group.refresh(&self.components, &self.entities);
            {
                let mut ctx = Context::new(
                    id,
                    &descriptor.name,
                    group,
                    &self.components,
                    &self.entities,
                    &self.bus,
                );
                (descriptor.callback)(&mut ctx);
            }
            let elapsed = sys_start.elapsed();
            trace!(system = %descriptor.name, entities = group.len(), ?elapsed, "ran system");
            if self.config.collect_diagnostics {
                system_times.push((descriptor.name.clone(), elapsed));
            }
        }

        self.step_counter += 1;
        self.last_diagnostics = StepDiagnostics {
            system_times,
            swap_time,
            total_time: step_start.elapsed(),
        };
    }

    /// Run `count` steps.
    pub fn run(&mut self, count: u64) {
        for _ in 0..count {
            self.step();
        }
    }

    pub fn step_count(&self) -> u64 {
        self.step_counter
    }

    pub fn last_diagnostics(&self) -> &StepDiagnostics {
        &self.last_diagnostics
    }

    // -- accessors ----------------------------------------------------------

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        self.bus.events()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }

    fn check_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::StaleEntity { entity })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
