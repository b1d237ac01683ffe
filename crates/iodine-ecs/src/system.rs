//! System descriptors, component groups and the system registry.
//!
//! A system is a named callback plus the components it reads and writes and
//! the events it emits and listens to. Those declarations are fixed when the
//! [`Descriptor`] is built and drive two things:
//!
//! - the [`Group`]: which pools the system *owns* (iterated densely, writable)
//!   and which it only *partially* observes (looked up per entity), and
//! - the concurrency oracle: [`Group::can_run_with`] tells a scheduler whether
//!   two systems may run at the same time.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::bitset::{BitIndex, BitSet};
use crate::component::{ComponentId, ComponentMask, ComponentRegistry, ComponentSet};
use crate::entity::{Entity, EntityRegistry};
use crate::event::{Event, EventBus, EventId, EventMask};
use crate::view::{View, ViewQuery};
use crate::EcsError;

/// The function a system runs once per step.
pub type Callback = Box<dyn FnMut(&mut Context<'_>) + Send>;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Immutable declaration of one system.
pub struct Descriptor {
    pub(crate) name: String,
    pub(crate) callback: Callback,
    reads: ComponentMask,
    writes: ComponentMask,
    emits: EventMask,
    listens: EventMask,
    require_full: bool,
    allow_partial: bool,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("emits", &self.emits)
            .field("listens", &self.listens)
            .field("require_full", &self.require_full)
            .field("allow_partial", &self.allow_partial)
            .finish_non_exhaustive()
    }
}

impl Descriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reads(&self) -> &ComponentMask {
        &self.reads
    }

    pub fn writes(&self) -> &ComponentMask {
        &self.writes
    }

    pub fn emits(&self) -> &EventMask {
        &self.emits
    }

    pub fn listens(&self) -> &EventMask {
        &self.listens
    }

    /// Whether the system owns the components it only reads, too.
    pub fn require_full(&self) -> bool {
        self.require_full
    }

    /// Whether read-only components are observed as partial members.
    pub fn allow_partial(&self) -> bool {
        self.allow_partial
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent constructor for a [`Descriptor`].
///
/// ```ignore
/// let desc = Builder::new("movement", &components)
///     .reads::<(Velocity,)>()
///     .writes::<(Position,)>()
///     .build(|ctx| { /* ... */ })?;
/// ```
pub struct Builder<'r> {
    name: String,
    registry: &'r ComponentRegistry,
    reads: ComponentMask,
    writes: ComponentMask,
    emits: EventMask,
    listens: EventMask,
    require_full: bool,
    allow_partial: bool,
    error: Option<EcsError>,
}

impl<'r> Builder<'r> {
    pub fn new(name: impl Into<String>, registry: &'r ComponentRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
            reads: ComponentMask::new(),
            writes: ComponentMask::new(),
            emits: EventMask::new(),
            listens: EventMask::new(),
            require_full: false,
            allow_partial: false,
            error: None,
        }
    }

    /// Declare read access to every component in `S`, registering them.
    pub fn reads<S: ComponentSet>(mut self) -> Self {
        match S::enter(self.registry) {
            Ok(ids) => self.reads.extend(ids),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Declare write access to every component in `S`, registering them.
    pub fn writes<S: ComponentSet>(mut self) -> Self {
        match S::enter(self.registry) {
            Ok(ids) => self.writes.extend(ids),
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn emits(mut self, events: &[EventId]) -> Self {
        self.emits.extend(events.iter().copied());
        self
    }

    pub fn listens(mut self, events: &[EventId]) -> Self {
        self.listens.extend(events.iter().copied());
        self
    }

    pub fn require_full(mut self, value: bool) -> Self {
        self.require_full = value;
        self
    }

    pub fn allow_partial(mut self, value: bool) -> Self {
        self.allow_partial = value;
        self
    }

    /// Finish the descriptor. Fails with the first registration error raised
    /// by [`reads`](Self::reads) or [`writes`](Self::writes).
    pub fn build(
        self,
        callback: impl FnMut(&mut Context<'_>) + Send + 'static,
    ) -> Result<Descriptor, EcsError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut reads = self.reads;
        let mut writes = self.writes;
        align(&mut reads, &mut writes);
        let mut emits = self.emits;
        let mut listens = self.listens;
        align(&mut emits, &mut listens);

        Ok(Descriptor {
            name: self.name,
            callback: Box::new(callback),
            reads,
            writes,
            emits,
            listens,
            require_full: self.require_full,
            allow_partial: self.allow_partial,
        })
    }

    fn fail(&mut self, err: EcsError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

fn align<I: BitIndex>(a: &mut BitSet<I>, b: &mut BitSet<I>) {
    a.match_capacity(b);
    b.match_capacity(a);
}

fn union(a: &ComponentMask, b: &ComponentMask) -> ComponentMask {
    let mut out = a.clone();
    let mut rhs = b.clone();
    align(&mut out, &mut rhs);
    out |= &rhs;
    out
}

/// Whether `a` and `b` share a bit, comparing at a common capacity.
fn overlaps(a: &ComponentMask, b: &ComponentMask) -> bool {
    if a.word_count() == b.word_count() {
        return a.intersects(b);
    }
    let mut a = a.clone();
    let mut b = b.clone();
    align(&mut a, &mut b);
    a.intersects(&b)
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// The component partition of one system and its current entity snapshot.
///
/// `owning` pools are packed so that their dense prefix follows
/// [`entities`](Self::entities); `partial` pools are only read by lookup.
pub struct Group {
    owning: ComponentMask,
    partial: ComponentMask,
    writes: ComponentMask,
    required: ComponentMask,
    emits: EventMask,
    listens: EventMask,
    entities: Vec<Entity>,
    signature: OnceLock<String>,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("owning", &self.owning)
            .field("partial", &self.partial)
            .field("entities", &self.entities.len())
            .finish()
    }
}

impl Group {
    /// Partition the descriptor's components.
    pub fn new(descriptor: &Descriptor) -> Self {
        let reads = &descriptor.reads;
        let writes = &descriptor.writes;

        let owning = if descriptor.require_full {
            writes | reads
        } else {
            writes.clone()
        };
        let partial = if descriptor.allow_partial {
            reads - &owning
        } else {
            ComponentMask::with_capacity(owning.capacity())
        };

        Self {
            required: reads | writes,
            writes: writes.clone(),
            owning,
            partial,
            emits: descriptor.emits.clone(),
            listens: descriptor.listens.clone(),
            entities: Vec::new(),
            signature: OnceLock::new(),
        }
    }

    pub fn owning(&self) -> &ComponentMask {
        &self.owning
    }

    pub fn partial(&self) -> &ComponentMask {
        &self.partial
    }

    /// Every component the system declared, read or written.
    pub fn required(&self) -> &ComponentMask {
        &self.required
    }

    /// Whether the system owns `id`.
    #[inline]
    pub fn owns(&self, id: ComponentId) -> bool {
        self.owning.test(id)
    }

    /// Whether the system declared `id` at all.
    #[inline]
    pub fn declares(&self, id: ComponentId) -> bool {
        self.required.test(id)
    }

    pub fn emits(&self, id: EventId) -> bool {
        self.emits.test(id)
    }

    pub fn listens(&self, id: EventId) -> bool {
        self.listens.test(id)
    }

    /// Entities matched by the last [`refresh`](Self::refresh).
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Human-readable partition, e.g. `"+Position, ~Velocity"`: `+` marks an
    /// owned component, `~` a partial one. Computed once.
    pub fn signature(&self, registry: &ComponentRegistry) -> &str {
        self.signature.get_or_init(|| {
            union(&self.owning, &self.partial)
                .iter()
                .map(|id| {
                    let mark = if self.owns(id) { '+' } else { '~' };
                    match registry.name(id) {
                        Some(name) => format!("{mark}{name}"),
                        None => format!("{mark}{id}"),
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    /// Whether this system and `other` touch overlapping data in a way that
    /// forbids running them concurrently.
    pub fn conflicts_with(&self, other: &Group) -> bool {
        overlaps(&self.owning, &union(&other.owning, &other.partial))
            || overlaps(&other.owning, &union(&self.owning, &self.partial))
            || overlaps(&self.owning, &other.writes)
            || overlaps(&other.owning, &self.writes)
    }

    /// Inverse of [`conflicts_with`](Self::conflicts_with).
    pub fn can_run_with(&self, other: &Group) -> bool {
        !self.conflicts_with(other)
    }

    /// Rebuild the entity snapshot and pack the owned pools.
    ///
    /// Members are the live entities that hold every declared component. The
    /// smallest declared pool drives the scan. A system that declares no
    /// components matches nothing.
    pub fn refresh(&mut self, components: &ComponentRegistry, entities: &EntityRegistry) {
        self.entities.clear();

        let mut pools = Vec::new();
        for id in self.required.iter() {
            match components.storage(id) {
                Some(pool) => pools.push((id, pool)),
                None => return,
            }
        }
        let Some((driver, smallest)) = pools.iter().min_by_key(|(_, pool)| pool.len()) else {
            return;
        };

        let mut indices = smallest.indices();
        for (id, pool) in &pools {
            if id != driver {
                pool.retain(&mut indices);
            }
        }

        let mut order = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(entity) = entities.resolve(index as u64) {
                order.push(index);
                self.entities.push(entity);
            }
        }

        for (id, pool) in &pools {
            if self.owns(*id) {
                pool.arrange(&order);
                trace!(component = pool.name(), members = order.len(), "packed owned pool");
            }
        }
    }

    /// Whether every owned pool's dense prefix still matches the snapshot.
    pub(crate) fn is_packed(&self, components: &ComponentRegistry) -> bool {
        let order: Vec<usize> = self.entities.iter().map(|e| e.slot()).collect();
        self.owning.iter().all(|id| {
            components
                .storage(id)
                .is_some_and(|pool| pool.aligned(&order))
        })
    }
}

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

/// Identifier of a registered system.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub(crate) u32);

impl SystemId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.0)
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered system: its descriptor, its group and whether it runs.
#[derive(Debug)]
pub struct System {
    pub(crate) descriptor: Descriptor,
    pub(crate) group: Group,
    pub(crate) active: bool,
}

impl System {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Owns every registered [`System`], keyed by [`SystemId`].
#[derive(Debug, Default)]
pub struct SystemRegistry {
    systems: BTreeMap<SystemId, System>,
    names: HashMap<String, SystemId>,
    free: VecDeque<SystemId>,
    next: u32,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system and build its group.
    ///
    /// Fails with [`EcsError::DuplicateSystem`] if the name is taken.
    pub fn enter(&mut self, descriptor: Descriptor) -> Result<SystemId, EcsError> {
        if self.names.contains_key(descriptor.name()) {
            return Err(EcsError::DuplicateSystem {
                name: descriptor.name().to_owned(),
            });
        }

        let id = match self.free.pop_front() {
            Some(id) => id,
            None => {
                let id = SystemId(self.next);
                self.next += 1;
                id
            }
        };
        let group = Group::new(&descriptor);
        debug!(system = descriptor.name(), id = id.0, "registered system");
        self.names.insert(descriptor.name().to_owned(), id);
        self.systems.insert(
            id,
            System {
                descriptor,
                group,
                active: true,
            },
        );
        Ok(id)
    }

    /// Unregister a system, releasing its id, and return its descriptor.
    pub fn erase(&mut self, id: SystemId) -> Result<Descriptor, EcsError> {
        let system = self.systems.remove(&id).ok_or(EcsError::UnknownSystem { id })?;
        self.names.remove(system.name());
        self.free.push_back(id);
        debug!(system = system.name(), id = id.0, "erased system");
        Ok(system.descriptor)
    }

    pub fn get(&self, id: SystemId) -> Result<&System, EcsError> {
        self.systems.get(&id).ok_or(EcsError::UnknownSystem { id })
    }

    pub fn get_mut(&mut self, id: SystemId) -> Result<&mut System, EcsError> {
        self.systems.get_mut(&id).ok_or(EcsError::UnknownSystem { id })
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.contains_key(&id)
    }

    /// Id of the system called `name`.
    pub fn id(&self, name: &str) -> Option<SystemId> {
        self.names.get(name).copied()
    }

    /// Enable or disable a system. Disabled systems are skipped by `step`.
    pub fn set_active(&mut self, id: SystemId, active: bool) -> Result<(), EcsError> {
        self.get_mut(id)?.active = active;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Systems in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (SystemId, &System)> + '_ {
        self.systems.iter().map(|(id, system)| (*id, system))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (SystemId, &mut System)> + '_ {
        self.systems.iter_mut().map(|(id, system)| (*id, system))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What a system callback sees while it runs.
pub struct Context<'a> {
    pub(crate) id: SystemId,
    pub(crate) name: &'a str,
    pub(crate) group: &'a mut Group,
    pub(crate) components: &'a ComponentRegistry,
    pub(crate) entities: &'a EntityRegistry,
    pub(crate) bus: &'a EventBus,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        id: SystemId,
        name: &'a str,
        group: &'a mut Group,
        components: &'a ComponentRegistry,
        entities: &'a EntityRegistry,
        bus: &'a EventBus,
    ) -> Self {
        Self {
            id,
            name,
            group,
            components,
            entities,
            bus,
        }
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// The entities this system iterates this step.
    pub fn entities(&self) -> &[Entity] {
        self.group.entities()
    }

    pub fn group(&self) -> &Group {
        &*self.group
    }

    /// Direct registry access, for structural changes (attaching and removing
    /// components). Borrowed from the context, so it is unavailable while a
    /// [`View`] is alive.
    pub fn components(&self) -> &ComponentRegistry {
        self.components
    }

    /// Allocate a new entity.
    pub fn create(&self) -> Entity {
        self.entities.create()
    }

    /// Destroy `entity` together with every component attached to it.
    ///
    /// Fails with [`EcsError::StaleEntity`] if the handle is not alive.
    pub fn destroy(&self, entity: Entity) -> Result<(), EcsError> {
        if !self.entities.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        self.components.remove_all(entity);
        self.entities.destroy(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Lock the pools named by `Q` and iterate the group through them.
    ///
    /// Fails with [`EcsError::UndeclaredAccess`] if `Q` touches a component
    /// the system did not declare, or writes one it does not own.
    ///
    /// The view borrows the context, so two views cannot overlap:
    ///
    /// ```compile_fail
    /// use iodine_ecs::prelude::*;
    ///
    /// struct Position(f32);
    /// iodine_ecs::component!(Position);
    ///
    /// let ecs = Ecs::new();
    /// let _ = ecs.system("overlap").writes::<(Position,)>().build(|ctx| {
    ///     let first = ctx.view::<&mut Position>().unwrap();
    ///     let second = ctx.view::<&Position>().unwrap();
    ///     drop((first, second));
    /// });
    /// ```
    pub fn view<Q: ViewQuery>(&mut self) -> Result<View<'_, Q>, EcsError> {
        View::new(self)
    }

    /// Queue an event for the next step. The system must declare it with
    /// [`Builder::emits`].
    pub fn emit<E: Event>(&self, event: E) -> Result<(), EcsError> {
        let id = self.bus.events().get(E::NAME)?;
        if !self.group.emits(id) {
            return Err(self.undeclared(E::NAME, true));
        }
        self.bus.emit(event)
    }

    /// Run `f` over the events of type `E` emitted during the previous step.
    /// The system must declare them with [`Builder::listens`].
    pub fn read<E: Event, R>(&self, f: impl FnOnce(&[E]) -> R) -> Result<R, EcsError> {
        let id = self.bus.events().get(E::NAME)?;
        if !self.group.listens(id) {
            return Err(self.undeclared(E::NAME, false));
        }
        let queue = self.bus.queue::<E>()?;
        let events = queue.read();
        Ok(f(&events))
    }

    pub(crate) fn undeclared(&self, name: &'static str, write: bool) -> EcsError {
        EcsError::UndeclaredAccess {
            system: self.name.to_owned(),
            name,
            write,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;
    struct C;
    crate::component!(A, B, C);

    fn noop(_: &mut Context<'_>) {}

    fn ids(registry: &ComponentRegistry) -> (ComponentId, ComponentId, ComponentId) {
        (
            registry.enter::<A>().unwrap(),
            registry.enter::<B>().unwrap(),
            registry.enter::<C>().unwrap(),
        )
    }

    #[test]
    fn default_ownership_is_writes_only() {
        let reg = ComponentRegistry::new();
        let (a, b, _) = ids(&reg);
        let desc = Builder::new("s", &reg)
            .reads::<(A, B)>()
            .writes::<(B,)>()
            .build(noop)
            .unwrap();
        let group = Group::new(&desc);

        assert_eq!(group.owning(), &ComponentMask::create([b]));
        assert!(group.partial().none());
        assert!(group.declares(a));
        assert!(!group.owns(a));
    }

    #[test]
    fn require_full_owns_reads() {
        let reg = ComponentRegistry::new();
        let (a, b, _) = ids(&reg);
        let desc = Builder::new("s", &reg)
            .reads::<(A, B)>()
            .writes::<(B,)>()
            .require_full(true)
            .build(noop)
            .unwrap();
        let group = Group::new(&desc);
        assert_eq!(group.owning(), &ComponentMask::create([a, b]));
        assert!(group.partial().none());
    }

    #[test]
    fn allow_partial_observes_reads() {
        let reg = ComponentRegistry::new();
        let (a, b, _) = ids(&reg);
        let desc = Builder::new("s", &reg)
            .reads::<(A, B)>()
            .writes::<(B,)>()
            .allow_partial(true)
            .build(noop)
            .unwrap();
        let group = Group::new(&desc);
        assert_eq!(group.owning(), &ComponentMask::create([b]));
        assert_eq!(group.partial(), &ComponentMask::create([a]));
        assert_eq!(group.signature(&reg), "~A, +B");
    }

    #[test]
    fn builder_surfaces_registration_errors() {
        mod other {
            pub struct A;
            crate::component!(A);
        }
        let reg = ComponentRegistry::new();
        reg.enter::<A>().unwrap();
        let result = Builder::new("s", &reg)
            .reads::<(other::A,)>()
            .build(noop);
        assert!(matches!(result, Err(EcsError::NameConflict { .. })));
    }

    #[test]
    fn oracle_detects_write_conflicts() {
        let reg = ComponentRegistry::new();
        ids(&reg);
        let w_a = Group::new(&Builder::new("wa", &reg).writes::<(A,)>().build(noop).unwrap());
        let w_b = Group::new(&Builder::new("wb", &reg).writes::<(B,)>().build(noop).unwrap());
        let r_a = Group::new(
            &Builder::new("ra", &reg)
                .reads::<(A,)>()
                .writes::<(C,)>()
                .allow_partial(true)
                .build(noop)
                .unwrap(),
        );

        assert!(w_a.can_run_with(&w_b));
        assert!(w_a.conflicts_with(&w_a));
        assert!(w_a.conflicts_with(&r_a));
        assert!(r_a.conflicts_with(&w_a));
        assert!(w_b.can_run_with(&r_a));
    }

    #[test]
    fn oracle_handles_spilled_masks() {
        let a = ComponentId(3);
        let far = ComponentId(700);
        let mut small = Group::new(&Builder::new("x", &ComponentRegistry::new()).build(noop).unwrap());
        small.owning = ComponentMask::create([a]);
        small.writes = small.owning.clone();
        let mut big = Group::new(&Builder::new("y", &ComponentRegistry::new()).build(noop).unwrap());
        big.owning = ComponentMask::create([a, far]);
        big.writes = big.owning.clone();

        assert_ne!(small.owning.word_count(), big.owning.word_count());
        assert!(small.conflicts_with(&big));
        assert!(big.conflicts_with(&small));
    }

    #[test]
    fn refresh_matches_entities_with_all_components() {
        let reg = ComponentRegistry::new();
        let entities = EntityRegistry::new();
        reg.enter::<A>().unwrap();
        reg.enter::<B>().unwrap();

        let e: Vec<Entity> = (0..4).map(|_| entities.create()).collect();
        for &entity in &e {
            reg.create(entity, A).unwrap();
        }
        reg.create(e[3], B).unwrap();
        reg.create(e[1], B).unwrap();

        let desc = Builder::new("s", &reg)
            .reads::<(B,)>()
            .writes::<(A,)>()
            .build(noop)
            .unwrap();
        let mut group = Group::new(&desc);
        group.refresh(&reg, &entities);

        assert_eq!(group.entities(), &[e[3], e[1]]);
        assert!(group.is_packed(&reg));
        let pool = reg.pool::<A>().unwrap();
        assert_eq!(&pool.read().set().indices()[..2], &[3, 1]);
    }

    #[test]
    fn empty_declaration_matches_nothing() {
        let reg = ComponentRegistry::new();
        let entities = EntityRegistry::new();
        entities.create();
        let mut group = Group::new(&Builder::new("s", &reg).build(noop).unwrap());
        group.refresh(&reg, &entities);
        assert!(group.is_empty());
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let reg = ComponentRegistry::new();
        let mut systems = SystemRegistry::new();
        systems.enter(Builder::new("s", &reg).build(noop).unwrap()).unwrap();
        let err = systems
            .enter(Builder::new("s", &reg).build(noop).unwrap())
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateSystem { ref name } if name == "s"));
        assert_eq!(systems.len(), 1);
    }

    #[test]
    fn registry_reuses_ids_and_toggles() {
        let reg = ComponentRegistry::new();
        let mut systems = SystemRegistry::new();
        let s0 = systems.enter(Builder::new("a", &reg).build(noop).unwrap()).unwrap();
        let s1 = systems.enter(Builder::new("b", &reg).build(noop).unwrap()).unwrap();

        assert_eq!(systems.erase(s0).unwrap().name(), "a");
        assert!(!systems.contains(s0));
        assert!(matches!(systems.get(s0), Err(EcsError::UnknownSystem { .. })));

        let s2 = systems.enter(Builder::new("c", &reg).build(noop).unwrap()).unwrap();
        assert_eq!(s2, s0);
        assert_eq!(systems.id("c"), Some(s2));

        systems.set_active(s1, false).unwrap();
        assert!(!systems.get(s1).unwrap().is_active());
        let order: Vec<_> = systems.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![s0, s1]);
    }
}
