//! Component registration and per-type pool storage.
//!
//! Every component type must be entered into a [`ComponentRegistry`] before
//! use. Entering produces a [`ComponentId`] (the bit used in system masks) and
//! a [`Pool`]: a [`SparseSet`] of values keyed by entity index.
//!
//! Pools of different types sit in one table behind the type-erased
//! [`Storage`] trait. The only place a pool is turned back into its concrete
//! type is [`ComponentRegistry::pool`], which checks the registered Rust type
//! before downcasting.
//!
//! The registry table is guarded by a reader-writer lock: lookups of already
//! registered types take the shared lock, and only first-time registration
//! takes the exclusive one. Each pool has its own lock; callers that honor the
//! system ownership partition never contend on it.

use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use tracing::{debug, warn};

use crate::bitset::{BitIndex, BitSet};
use crate::entity::Entity;
use crate::sparse_set::SparseSet;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A plain data type that can be attached to entities.
///
/// `NAME` is the type's stable registry key. Implement it with the
/// [`component!`](crate::component!) macro.
pub trait Component: Send + Sync + 'static {
    /// Stable, process-unique name of the component type.
    const NAME: &'static str;
}

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// The raw numeric id.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl BitIndex for ComponentId {
    #[inline]
    fn to_bit(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn from_bit(bit: usize) -> Self {
        Self(bit as u32)
    }
}

/// A set of component ids.
pub type ComponentMask = BitSet<ComponentId>;

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Storage for every instance of one component type, keyed by entity index.
#[derive(Debug)]
pub struct Pool<T> {
    id: ComponentId,
    set: SparseSet<T>,
}

impl<T: Component> Pool<T> {
    /// Create an empty pool for the component registered as `id`.
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            set: SparseSet::new(),
        }
    }

    /// The component id this pool stores.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The component type's name.
    pub fn name(&self) -> &'static str {
        T::NAME
    }

    /// Attach `value` to `entity`.
    ///
    /// Warns and does nothing if the entity already has this component.
    /// Returns `true` if the value was stored.
    pub fn insert(&mut self, entity: Entity, value: T) -> bool {
        self.emplace(entity, || value)
    }

    /// Attach a value built by `make` to `entity`; `make` only runs if the
    /// entity does not have this component yet.
    pub fn emplace(&mut self, entity: Entity, make: impl FnOnce() -> T) -> bool {
        let inserted = self.set.emplace(entity.slot(), make);
        if !inserted {
            warn!(%entity, component = T::NAME, "entity already has component");
        }
        inserted
    }

    /// Detach and return the component of `entity`. Warns if absent.
    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let removed = self.set.erase(entity.slot());
        if removed.is_none() {
            warn!(%entity, component = T::NAME, "entity does not have component");
        }
        removed
    }

    /// Whether `entity` has this component.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.set.contains(entity.slot())
    }

    /// Dense position of `entity`'s value.
    #[inline]
    pub fn position(&self, entity: Entity) -> Option<usize> {
        self.set.position(entity.slot())
    }

    /// The component of `entity`.
    pub fn get(&self, entity: Entity) -> Result<&T, EcsError> {
        self.set.get(entity.slot()).ok_or(EcsError::MissingComponent {
            entity,
            component: T::NAME,
        })
    }

    /// The component of `entity`, mutably.
    pub fn get_mut(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        self.set.get_mut(entity.slot()).ok_or(EcsError::MissingComponent {
            entity,
            component: T::NAME,
        })
    }

    /// The raw dense buffer. Positions are invalidated by insert and remove.
    #[inline]
    pub fn data(&self) -> &[T] {
        self.set.data()
    }

    /// The raw dense buffer, mutably.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        self.set.data_mut()
    }

    /// The underlying sparse set.
    #[inline]
    pub fn set(&self) -> &SparseSet<T> {
        &self.set
    }

    /// Number of entities holding this component.
    #[inline]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether no entity holds this component.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Reorder the dense arrays so that position `i` holds `order[i]`.
    /// Every index in `order` must be present.
    pub(crate) fn arrange(&mut self, order: &[usize]) {
        for (pos, &index) in order.iter().enumerate() {
            let Some(&occupant) = self.set.indices().get(pos) else {
                break;
            };
            if occupant != index {
                self.set.swap(occupant, index);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Storage -- type-erased pool interface
// ---------------------------------------------------------------------------

/// Operations the registry and groups need on a pool without knowing its
/// component type. Each call takes the pool's own lock.
pub(crate) trait Storage: Send + Sync {
    fn name(&self) -> &'static str;
    fn len(&self) -> usize;
    /// Drop every index from `indices` that this pool does not hold.
    fn retain(&self, indices: &mut Vec<usize>);
    /// Whether the dense prefix of this pool equals `order`.
    fn aligned(&self, order: &[usize]) -> bool;
    fn indices(&self) -> Vec<usize>;
    fn remove_index(&self, index: usize) -> bool;
    fn arrange(&self, order: &[usize]);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Component> Storage for RwLock<Pool<T>> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn retain(&self, indices: &mut Vec<usize>) {
        let pool = self.read();
        indices.retain(|&index| pool.set.contains(index));
    }

    fn aligned(&self, order: &[usize]) -> bool {
        self.read().set.indices().starts_with(order)
    }

    fn indices(&self) -> Vec<usize> {
        self.read().set.indices().to_vec()
    }

    fn remove_index(&self, index: usize) -> bool {
        self.write().set.erase(index).is_some()
    }

    fn arrange(&self, order: &[usize]) {
        self.write().arrange(order);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Shared handle to a typed pool. Resolve it once with
/// [`ComponentRegistry::pool`] and keep it for hot paths.
pub type SharedPool<T> = Arc<RwLock<Pool<T>>>;

// ---------------------------------------------------------------------------
// Ref / RefMut
// ---------------------------------------------------------------------------

/// Shared access to one component value. Holds the pool's read lock.
pub struct Ref<T: Component> {
    guard: ArcRwLockReadGuard<RawRwLock, Pool<T>>,
    pos: usize,
}

impl<T: Component> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.data()[self.pos]
    }
}

impl<T: Component + fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive access to one component value. Holds the pool's write lock.
pub struct RefMut<T: Component> {
    guard: ArcRwLockWriteGuard<RawRwLock, Pool<T>>,
    pos: usize,
}

impl<T: Component> Deref for RefMut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.data()[self.pos]
    }
}

impl<T: Component> DerefMut for RefMut<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard.data_mut()[self.pos]
    }
}

impl<T: Component + fmt::Debug> fmt::Debug for RefMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Table {
    /// Name -> id.
    ids: HashMap<&'static str, ComponentId>,
    /// Id -> name.
    names: HashMap<ComponentId, &'static str>,
    /// Id -> Rust type, to catch two types sharing one name.
    types: HashMap<ComponentId, TypeId>,
    /// Id -> pool.
    pools: HashMap<ComponentId, Arc<dyn Storage>>,
    /// Ids released by `erase`, reused first-in first-out.
    free: VecDeque<ComponentId>,
    /// Id -> number of registered systems declaring it.
    holds: HashMap<ComponentId, usize>,
    /// Next never-used id.
    next: u32,
}

impl Table {
    fn lookup<T: Component>(&self) -> Result<Option<ComponentId>, EcsError> {
        let Some(&id) = self.ids.get(T::NAME) else {
            return Ok(None);
        };
        if self.types.get(&id) != Some(&TypeId::of::<T>()) {
            return Err(EcsError::NameConflict {
                name: T::NAME.to_owned(),
            });
        }
        Ok(Some(id))
    }

    fn allocate(&mut self) -> ComponentId {
        if let Some(id) = self.free.pop_front() {
            return id;
        }
        let id = ComponentId(self.next);
        self.next += 1;
        id
    }
}

/// Maps component types to ids and owns one [`Pool`] per registered type.
#[derive(Default)]
pub struct ComponentRegistry {
    table: RwLock<Table>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.names())
            .finish()
    }
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` (idempotent) and return its id.
    ///
    /// The first registration allocates an id (reusing erased ids first) and
    /// builds the backing pool. Later calls return the same id without
    /// touching the pool. Fails with [`EcsError::NameConflict`] if another
    /// Rust type already uses `T::NAME`.
    pub fn enter<T: Component>(&self) -> Result<ComponentId, EcsError> {
        if let Some(id) = self.table.read().lookup::<T>()? {
            return Ok(id);
        }

        let mut table = self.table.write();
        if let Some(id) = table.lookup::<T>()? {
            return Ok(id);
        }

        let id = table.allocate();
        let pool: Arc<dyn Storage> = Arc::new(RwLock::new(Pool::<T>::new(id)));
        table.ids.insert(T::NAME, id);
        table.names.insert(id, T::NAME);
        table.types.insert(id, TypeId::of::<T>());
        table.pools.insert(id, pool);
        debug!(component = T::NAME, id = id.0, "registered component");
        Ok(id)
    }

    /// The id of `T` if it is registered.
    pub fn id<T: Component>(&self) -> Option<ComponentId> {
        self.table.read().lookup::<T>().ok().flatten()
    }

    /// Resolve the typed pool of `T`.
    ///
    /// Fails with [`EcsError::UnknownComponent`] if `T` was never entered.
    pub fn pool<T: Component>(&self) -> Result<SharedPool<T>, EcsError> {
        let storage = {
            let table = self.table.read();
            let id = table.lookup::<T>()?.ok_or_else(|| EcsError::UnknownComponent {
                name: T::NAME.to_owned(),
            })?;
            Arc::clone(&table.pools[&id])
        };
        storage
            .into_any()
            .downcast::<RwLock<Pool<T>>>()
            .map_err(|_| EcsError::NameConflict {
                name: T::NAME.to_owned(),
            })
    }

    /// Attach `value` to `entity` and return the stored component.
    ///
    /// If the entity already has `T` this warns, drops `value` and returns the
    /// existing component.
    pub fn create<T: Component>(&self, entity: Entity, value: T) -> Result<RefMut<T>, EcsError> {
        self.emplace(entity, || value)
    }

    /// Like [`create`](Self::create), building the value only if it will be
    /// stored.
    pub fn emplace<T: Component>(
        &self,
        entity: Entity,
        make: impl FnOnce() -> T,
    ) -> Result<RefMut<T>, EcsError> {
        let pool = self.pool::<T>()?;
        let mut guard = pool.write_arc();
        guard.emplace(entity, make);
        let pos = guard.position(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: T::NAME,
        })?;
        Ok(RefMut { guard, pos })
    }

    /// The `T` component of `entity`.
    ///
    /// Fails with [`EcsError::MissingComponent`] if the entity lacks it.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Ref<T>, EcsError> {
        let pool = self.pool::<T>()?;
        let guard = pool.read_arc();
        let pos = guard.position(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: T::NAME,
        })?;
        Ok(Ref { guard, pos })
    }

    /// The `T` component of `entity`, mutably.
    pub fn get_mut<T: Component>(&self, entity: Entity) -> Result<RefMut<T>, EcsError> {
        let pool = self.pool::<T>()?;
        let guard = pool.write_arc();
        let pos = guard.position(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: T::NAME,
        })?;
        Ok(RefMut { guard, pos })
    }

    /// Whether `entity` has a `T` component. `false` if `T` is unregistered.
    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.pool::<T>()
            .map(|pool| pool.read().contains(entity))
            .unwrap_or(false)
    }

    /// Detach `T` from `entity`, returning it. Warns and returns `None` if
    /// the entity did not have it.
    pub fn remove<T: Component>(&self, entity: Entity) -> Result<Option<T>, EcsError> {
        let pool = self.pool::<T>()?;
        let removed = pool.write().remove(entity);
        Ok(removed)
    }

    /// Detach every component from `entity`. Returns how many were removed.
    pub fn remove_all(&self, entity: Entity) -> usize {
        let pools: Vec<Arc<dyn Storage>> = self.table.read().pools.values().cloned().collect();
        pools
            .iter()
            .filter(|pool| pool.remove_index(entity.slot()))
            .count()
    }

    /// Unregister `T`, dropping its pool and releasing its id for reuse.
    ///
    /// Fails with [`EcsError::ComponentInUse`] while a registered system
    /// declares `T`, since its masks would silently refer to whichever type
    /// receives the id next.
    pub fn erase<T: Component>(&self) -> Result<ComponentId, EcsError> {
        let mut table = self.table.write();
        let id = table.lookup::<T>()?.ok_or_else(|| EcsError::UnknownComponent {
            name: T::NAME.to_owned(),
        })?;
        if let Some(&systems) = table.holds.get(&id) {
            return Err(EcsError::ComponentInUse {
                name: T::NAME,
                systems,
            });
        }
        table.ids.remove(T::NAME);
        table.names.remove(&id);
        table.types.remove(&id);
        table.pools.remove(&id);
        table.free.push_back(id);
        debug!(component = T::NAME, id = id.0, "erased component");
        Ok(id)
    }

    /// Number of registered component types.
    pub fn count(&self) -> usize {
        self.table.read().pools.len()
    }

    /// Name of the component registered as `id`.
    pub fn name(&self, id: ComponentId) -> Option<&'static str> {
        self.table.read().names.get(&id).copied()
    }

    /// Names of all registered components, ordered by id.
    pub fn names(&self) -> Vec<&'static str> {
        let table = self.table.read();
        let mut entries: Vec<_> = table.names.iter().map(|(id, name)| (*id, *name)).collect();
        entries.sort();
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// Mark every id in `mask` as declared by one more system.
    pub(crate) fn hold(&self, mask: &ComponentMask) {
        let mut table = self.table.write();
        for id in mask.iter() {
            *table.holds.entry(id).or_insert(0) += 1;
        }
    }

    /// Undo one [`hold`](Self::hold) of `mask`.
    pub(crate) fn release(&self, mask: &ComponentMask) {
        let mut table = self.table.write();
        for id in mask.iter() {
            if let Some(count) = table.holds.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    table.holds.remove(&id);
                }
            }
        }
    }

    pub(crate) fn storage(&self, id: ComponentId) -> Option<Arc<dyn Storage>> {
        self.table.read().pools.get(&id).cloned()
    }
}

// ---------------------------------------------------------------------------
// ComponentSet -- tuples of component types
// ---------------------------------------------------------------------------

/// A tuple of component types, used by the system builder to declare
/// accesses: `reads::<(Position, Velocity)>()`.
pub trait ComponentSet {
    /// Enter every member type and return their ids.
    fn enter(registry: &ComponentRegistry) -> Result<Vec<ComponentId>, EcsError>;
}

macro_rules! impl_component_set {
    ($($ty:ident),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            fn enter(registry: &ComponentRegistry) -> Result<Vec<ComponentId>, EcsError> {
                Ok(vec![$(registry.enter::<$ty>()?),+])
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
