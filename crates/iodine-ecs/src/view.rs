//! Typed iteration over a system's group.
//!
//! A [`View`] locks the pools named by its query for as long as it lives and
//! walks the group's entity snapshot. Owned components come straight out of
//! the dense prefix of their pool (the group keeps it in snapshot order), so
//! they can be borrowed mutably as plain slice iterators. Components the
//! system only reads without owning are looked up per entity.
//!
//! ```ignore
//! let mut view = ctx.view::<(&mut Position, &Velocity)>()?;
//! for (_entity, (pos, vel)) in view.iter() {
//!     pos.x += vel.dx;
//! }
//! ```

use std::marker::PhantomData;
use std::slice;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;
use tracing::trace;

use crate::component::{Component, ComponentId, ComponentRegistry, Pool};
use crate::entity::Entity;
use crate::system::{Context, Group};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Access declaration
// ---------------------------------------------------------------------------

/// One component a query wants to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// `None` when the component type is not registered.
    pub id: Option<ComponentId>,
    pub name: &'static str,
    pub write: bool,
}

// ---------------------------------------------------------------------------
// Per-component state
// ---------------------------------------------------------------------------

/// Locked state of one query element, able to hand out a cursor.
pub trait FetchState {
    type Cursor<'a>
    where
        Self: 'a;
    type Item<'a>
    where
        Self: 'a;

    /// Start a pass over the first `len` group members.
    fn cursor(&mut self, len: usize) -> Self::Cursor<'_>;

    /// Produce the item for `entity` and advance. Dense cursors advance even
    /// when a sibling element yields nothing, so every element stays in step.
    fn advance<'a>(cursor: &mut Self::Cursor<'a>, entity: Entity) -> Option<Self::Item<'a>>
    where
        Self: 'a;
}

/// Read lock on a pool.
pub struct Shared<T: Component> {
    guard: ArcRwLockReadGuard<RawRwLock, Pool<T>>,
    owned: bool,
}

pub enum SharedCursor<'a, T> {
    Dense(slice::Iter<'a, T>),
    Sparse(&'a Pool<T>),
}

impl<T: Component> FetchState for Shared<T> {
    type Cursor<'a> = SharedCursor<'a, T>;
    type Item<'a> = &'a T;

    fn cursor(&mut self, len: usize) -> SharedCursor<'_, T> {
        if self.owned {
            let data = self.guard.data();
            SharedCursor::Dense(data[..len.min(data.len())].iter())
        } else {
            SharedCursor::Sparse(&*self.guard)
        }
    }

    fn advance<'a>(cursor: &mut SharedCursor<'a, T>, entity: Entity) -> Option<&'a T>
    where
        Self: 'a,
    {
        match cursor {
            SharedCursor::Dense(iter) => iter.next(),
            SharedCursor::Sparse(pool) => {
                let pool: &'a Pool<T> = *pool;
                pool.get(entity).ok()
            }
        }
    }
}

/// Write lock on an owned pool.
pub struct Exclusive<T: Component> {
    guard: ArcRwLockWriteGuard<RawRwLock, Pool<T>>,
}

impl<T: Component> FetchState for Exclusive<T> {
    type Cursor<'a> = slice::IterMut<'a, T>;
    type Item<'a> = &'a mut T;

    fn cursor(&mut self, len: usize) -> slice::IterMut<'_, T> {
        let data = self.guard.data_mut();
        let len = len.min(data.len());
        data[..len].iter_mut()
    }

    fn advance<'a>(cursor: &mut slice::IterMut<'a, T>, _entity: Entity) -> Option<&'a mut T>
    where
        Self: 'a,
    {
        cursor.next()
    }
}

// ---------------------------------------------------------------------------
// ViewQuery
// ---------------------------------------------------------------------------

/// Something a view can be built for: `&T`, `&mut T`, or a tuple of those.
pub trait ViewQuery {
    type State: FetchState;

    /// List the components this query touches.
    fn access(components: &ComponentRegistry, out: &mut Vec<Access>);

    /// Take the locks.
    fn lock(components: &ComponentRegistry, group: &Group) -> Result<Self::State, EcsError>;
}

impl<T: Component> ViewQuery for &T {
    type State = Shared<T>;

    fn access(components: &ComponentRegistry, out: &mut Vec<Access>) {
        out.push(Access {
            id: components.id::<T>(),
            name: T::NAME,
            write: false,
        });
    }

    fn lock(components: &ComponentRegistry, group: &Group) -> Result<Shared<T>, EcsError> {
        let owned = components.id::<T>().is_some_and(|id| group.owns(id));
        let pool = components.pool::<T>()?;
        Ok(Shared {
            guard: pool.read_arc(),
            owned,
        })
    }
}

impl<T: Component> ViewQuery for &mut T {
    type State = Exclusive<T>;

    fn access(components: &ComponentRegistry, out: &mut Vec<Access>) {
        out.push(Access {
            id: components.id::<T>(),
            name: T::NAME,
            write: true,
        });
    }

    fn lock(components: &ComponentRegistry, _group: &Group) -> Result<Exclusive<T>, EcsError> {
        let pool = components.pool::<T>()?;
        Ok(Exclusive {
            guard: pool.write_arc(),
        })
    }
}

macro_rules! impl_view_query {
    ($(($ty:ident, $var:ident)),+) => {
        impl<$($ty: FetchState),+> FetchState for ($($ty,)+) {
            type Cursor<'a> = ($($ty::Cursor<'a>,)+) where Self: 'a;
            type Item<'a> = ($($ty::Item<'a>,)+) where Self: 'a;

            fn cursor(&mut self, len: usize) -> Self::Cursor<'_> {
                let ($($var,)+) = self;
                ($($var.cursor(len),)+)
            }

            fn advance<'a>(cursor: &mut Self::Cursor<'a>, entity: Entity) -> Option<Self::Item<'a>>
            where
                Self: 'a,
            {
                let ($($var,)+) = cursor;
                $(let $var = $ty::advance($var, entity);)+
                Some(($($var?,)+))
            }
        }

        impl<$($ty: ViewQuery),+> ViewQuery for ($($ty,)+) {
            type State = ($($ty::State,)+);

            fn access(components: &ComponentRegistry, out: &mut Vec<Access>) {
                $($ty::access(components, out);)+
            }

            fn lock(components: &ComponentRegistry, group: &Group) -> Result<Self::State, EcsError> {
                Ok(($($ty::lock(components, group)?,)+))
            }
        }
    };
}

impl_view_query!((A, a));
impl_view_query!((A, a), (B, b));
impl_view_query!((A, a), (B, b), (C, c));
impl_view_query!((A, a), (B, b), (C, c), (D, d));

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// Locked pools plus the group snapshot they are iterated over.
///
/// A view mutably borrows the [`Context`] it came from, so a callback holds at
/// most one view at a time and cannot touch the registries while its locks
/// are held.
pub struct View<'c, Q: ViewQuery> {
    entities: Vec<Entity>,
    state: Q::State,
    _context: PhantomData<&'c mut ()>,
}

impl<'c, Q: ViewQuery> View<'c, Q> {
    pub(crate) fn new(ctx: &'c mut Context<'_>) -> Result<Self, EcsError> {
        let mut access = Vec::new();
        Q::access(ctx.components, &mut access);

        for (i, item) in access.iter().enumerate() {
            assert!(
                access[..i].iter().all(|prev| prev.name != item.name),
                "component `{}` requested twice in one view",
                item.name
            );
            let Some(id) = item.id.filter(|&id| ctx.group.declares(id)) else {
                return Err(ctx.undeclared(item.name, item.write));
            };
            if item.write && !ctx.group.owns(id) {
                return Err(ctx.undeclared(item.name, true));
            }
        }

        if !ctx.group.is_packed(ctx.components) {
            ctx.group.refresh(ctx.components, ctx.entities);
        }

        let state = Q::lock(ctx.components, ctx.group)?;
        Ok(Self {
            entities: ctx.group.entities().to_vec(),
            state,
            _context: PhantomData,
        })
    }

    /// Iterate `(entity, item)` pairs. May be called again to restart.
    pub fn iter(&mut self) -> ViewIter<'_, Q::State> {
        let len = self.entities.len();
        ViewIter {
            entities: self.entities.iter(),
            cursor: self.state.cursor(len),
        }
    }

    /// The entities this view walks.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Upper bound on the number of items.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<Q: ViewQuery> Drop for View<'_, Q> {
    fn drop(&mut self) {
        trace!(entities = self.entities.len(), "released view");
    }
}

/// Iterator returned by [`View::iter`].
pub struct ViewIter<'a, S: FetchState + 'a> {
    entities: slice::Iter<'a, Entity>,
    cursor: S::Cursor<'a>,
}

impl<'a, S: FetchState + 'a> Iterator for ViewIter<'a, S> {
    type Item = (Entity, S::Item<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entity = *self.entities.next()?;
            if let Some(item) = S::advance(&mut self.cursor, entity) {
                return Some((entity, item));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
