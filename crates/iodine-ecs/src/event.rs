//! Event identifiers, double-buffered event queues and the event bus.
//!
//! Events emitted during step *N* land in a queue's back buffer and become
//! readable from its front buffer during step *N + 1*, after
//! [`EventBus::swap`]. Anything not read by then is dropped.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::bitset::{BitIndex, BitSet};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A message type that systems exchange through the [`EventBus`].
///
/// Implement it with the [`event!`](crate::event!) macro.
pub trait Event: Send + Sync + 'static {
    /// Stable, process-unique name of the event type.
    const NAME: &'static str;
}

// ---------------------------------------------------------------------------
// EventId
// ---------------------------------------------------------------------------

/// Opaque identifier for a registered event name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) u32);

impl EventId {
    /// The raw numeric id.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

impl BitIndex for EventId {
    #[inline]
    fn to_bit(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn from_bit(bit: usize) -> Self {
        Self(bit as u32)
    }
}

/// A set of event ids.
pub type EventMask = BitSet<EventId>;

// ---------------------------------------------------------------------------
// EventRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Names {
    ids: HashMap<String, EventId>,
    names: HashMap<EventId, String>,
    free: VecDeque<EventId>,
    next: u32,
}

/// Maps event names to [`EventId`]s.
#[derive(Debug, Default)]
pub struct EventRegistry {
    names: RwLock<Names>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `name`, allocating one if needed. Erased ids are
    /// reused first-in first-out.
    pub fn enter(&self, name: &str) -> EventId {
        if let Some(&id) = self.names.read().ids.get(name) {
            return id;
        }

        let mut names = self.names.write();
        if let Some(&id) = names.ids.get(name) {
            return id;
        }
        let id = match names.free.pop_front() {
            Some(id) => id,
            None => {
                let id = EventId(names.next);
                names.next += 1;
                id
            }
        };
        names.ids.insert(name.to_owned(), id);
        names.names.insert(id, name.to_owned());
        debug!(event = name, id = id.0, "registered event");
        id
    }

    /// The id of `name`.
    ///
    /// Fails with [`EcsError::UnknownEvent`] if it was never entered.
    pub fn get(&self, name: &str) -> Result<EventId, EcsError> {
        self.names
            .read()
            .ids
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::UnknownEvent {
                name: name.to_owned(),
            })
    }

    /// Forget `name` and release its id. Returns the released id, if any.
    pub fn erase(&self, name: &str) -> Option<EventId> {
        let mut names = self.names.write();
        let id = names.ids.remove(name)?;
        names.names.remove(&id);
        names.free.push_back(id);
        Some(id)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.names.read().ids.contains_key(name)
    }

    /// The name registered as `id`.
    pub fn name(&self, id: EventId) -> Option<String> {
        self.names.read().names.get(&id).cloned()
    }

    /// Number of registered names.
    pub fn count(&self) -> usize {
        self.names.read().ids.len()
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// A double-buffered queue of one event type.
///
/// Writers append to the back buffer under a mutex; readers take a shared lock
/// on the front buffer. [`swap`](Self::swap) exchanges the two and clears the
/// new back buffer.
pub struct Queue<E> {
    front: RwLock<Vec<E>>,
    back: Mutex<Vec<E>>,
}

impl<E> Default for Queue<E> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<E> fmt::Debug for Queue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("readable", &self.front.read().len())
            .field("pending", &self.back.lock().len())
            .finish()
    }
}

impl<E> Queue<E> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue whose buffers can hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            front: RwLock::new(Vec::with_capacity(capacity)),
            back: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Queue an event for the next step.
    pub fn push(&self, event: E) {
        self.back.lock().push(event);
    }

    /// Queue an event built by `make` for the next step.
    pub fn emplace(&self, make: impl FnOnce() -> E) {
        self.back.lock().push(make());
    }

    /// Events emitted during the previous step.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [E]> {
        RwLockReadGuard::map(self.front.read(), Vec::as_slice)
    }

    /// Make pending events readable and discard the previously readable ones.
    pub fn swap(&self) {
        let mut front = self.front.write();
        let mut back = self.back.lock();
        std::mem::swap(&mut *front, &mut *back);
        back.clear();
    }

    /// Number of readable events.
    pub fn len(&self) -> usize {
        self.front.read().len()
    }

    /// Whether there are no readable events.
    pub fn is_empty(&self) -> bool {
        self.front.read().is_empty()
    }

    /// Number of events waiting for the next swap.
    pub fn pending(&self) -> usize {
        self.back.lock().len()
    }
}

/// Type-erased queue, so the bus can swap queues of every event type.
trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    fn swap(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Event> Channel for Queue<E> {
    fn name(&self) -> &'static str {
        E::NAME
    }

    fn swap(&self) {
        Queue::swap(self);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Owns one [`Queue`] per registered event type.
pub struct EventBus {
    events: Arc<EventRegistry>,
    queues: RwLock<HashMap<EventId, Arc<dyn Channel>>>,
    capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.queues.read();
        let mut names: Vec<_> = queues.values().map(|q| q.name()).collect();
        names.sort_unstable();
        f.debug_struct("EventBus").field("queues", &names).finish()
    }
}

impl EventBus {
    /// Create a bus that registers event names in `events`.
    pub fn new(events: Arc<EventRegistry>) -> Self {
        Self::with_capacity(events, 0)
    }

    /// Like [`new`](Self::new), preallocating `capacity` events per queue.
    pub fn with_capacity(events: Arc<EventRegistry>, capacity: usize) -> Self {
        Self {
            events,
            queues: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// The registry event names are entered into.
    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    /// Register `E` and create its queue.
    ///
    /// Fails with [`EcsError::DuplicateQueue`] if `E` already has a queue.
    pub fn enter<E: Event>(&self) -> Result<EventId, EcsError> {
        let id = self.events.enter(E::NAME);
        let mut queues = self.queues.write();
        if queues.contains_key(&id) {
            return Err(EcsError::DuplicateQueue { name: E::NAME });
        }
        queues.insert(id, Arc::new(Queue::<E>::with_capacity(self.capacity)));
        debug!(event = E::NAME, id = id.0, "created event queue");
        Ok(id)
    }

    /// The queue of `E`.
    ///
    /// Fails with [`EcsError::UnknownEvent`] if `E` was never registered and
    /// with [`EcsError::MissingQueue`] if it has no queue.
    pub fn queue<E: Event>(&self) -> Result<Arc<Queue<E>>, EcsError> {
        let id = self.events.get(E::NAME)?;
        let channel = self
            .queues
            .read()
            .get(&id)
            .cloned()
            .ok_or(EcsError::MissingQueue { name: E::NAME })?;
        channel
            .into_any()
            .downcast::<Queue<E>>()
            .map_err(|_| EcsError::MissingQueue { name: E::NAME })
    }

    /// Whether `E` has a queue.
    pub fn contains<E: Event>(&self) -> bool {
        self.events
            .get(E::NAME)
            .map(|id| self.queues.read().contains_key(&id))
            .unwrap_or(false)
    }

    /// Drop the queue of `E` and release its id.
    pub fn remove<E: Event>(&self) -> Result<(), EcsError> {
        let id = self.events.get(E::NAME)?;
        self.queues
            .write()
            .remove(&id)
            .ok_or(EcsError::MissingQueue { name: E::NAME })?;
        self.events.erase(E::NAME);
        Ok(())
    }

    /// Queue `event` for the next step.
    pub fn emit<E: Event>(&self, event: E) -> Result<(), EcsError> {
        self.queue::<E>()?.push(event);
        Ok(())
    }

    /// Swap every queue.
    pub fn swap(&self) {
        let queues: Vec<Arc<dyn Channel>> = self.queues.read().values().cloned().collect();
        for queue in queues {
            queue.swap();
        }
    }

    /// Number of queues.
    pub fn len(&self) -> usize {
        self.queues.read().len()
    }

    /// Whether the bus has no queues.
    pub fn is_empty(&self) -> bool {
        self.queues.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Collision {
        a: u32,
        b: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Spawned(u32);

    crate::event!(Collision, Spawned);

    fn bus() -> EventBus {
        EventBus::new(Arc::new(EventRegistry::new()))
    }

    #[test]
    fn registry_enter_is_idempotent() {
        let reg = EventRegistry::new();
        let a = reg.enter("hit");
        assert_eq!(reg.enter("hit"), a);
        assert_ne!(reg.enter("miss"), a);
        assert_eq!(reg.count(), 2);
        assert_eq!(reg.get("hit").unwrap(), a);
        assert_eq!(reg.name(a).as_deref(), Some("hit"));
    }

    #[test]
    fn registry_unknown_name() {
        let reg = EventRegistry::new();
        assert!(matches!(
            reg.get("nope"),
            Err(EcsError::UnknownEvent { ref name }) if name == "nope"
        ));
    }

    #[test]
    fn registry_reuses_erased_ids_fifo() {
        let reg = EventRegistry::new();
        let a = reg.enter("a");
        let b = reg.enter("b");
        reg.enter("c");

        assert_eq!(reg.erase("a"), Some(a));
        assert_eq!(reg.erase("b"), Some(b));
        assert!(!reg.contains("a"));

        assert_eq!(reg.enter("d"), a);
        assert_eq!(reg.enter("e"), b);
        assert_eq!(reg.enter("f"), EventId(3));
    }

    #[test]
    fn queue_double_buffering() {
        let queue = Queue::new();
        queue.push(1);
        queue.emplace(|| 2);
        assert!(queue.is_empty());
        assert_eq!(queue.pending(), 2);

        queue.swap();
        assert_eq!(&*queue.read(), &[1, 2]);
        assert_eq!(queue.pending(), 0);

        queue.push(3);
        assert_eq!(&*queue.read(), &[1, 2]);
        assert_eq!(queue.pending(), 1);
        queue.swap();
        assert_eq!(&*queue.read(), &[3]);

        queue.swap();
        assert!(queue.is_empty());
    }

    #[test]
    fn bus_emit_swap_read() {
        let bus = bus();
        bus.enter::<Collision>().unwrap();
        bus.emit(Collision { a: 1, b: 2 }).unwrap();

        let queue = bus.queue::<Collision>().unwrap();
        assert!(queue.is_empty());

        bus.swap();
        assert_eq!(&*queue.read(), &[Collision { a: 1, b: 2 }]);

        bus.emit(Collision { a: 3, b: 4 }).unwrap();
        assert_eq!(&*queue.read(), &[Collision { a: 1, b: 2 }]);

        bus.swap();
        assert_eq!(&*queue.read(), &[Collision { a: 3, b: 4 }]);

        bus.swap();
        assert!(queue.is_empty());
    }

    #[test]
    fn bus_rejects_duplicate_queue() {
        let bus = bus();
        bus.enter::<Spawned>().unwrap();
        assert!(matches!(
            bus.enter::<Spawned>(),
            Err(EcsError::DuplicateQueue { name: "Spawned" })
        ));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn bus_missing_queue() {
        let bus = bus();
        assert!(matches!(
            bus.queue::<Spawned>(),
            Err(EcsError::UnknownEvent { .. })
        ));

        bus.events().enter(Spawned::NAME);
        assert!(matches!(
            bus.queue::<Spawned>(),
            Err(EcsError::MissingQueue { name: "Spawned" })
        ));
    }

    #[test]
    fn bus_remove_releases_id() {
        let bus = bus();
        let id = bus.enter::<Spawned>().unwrap();
        bus.remove::<Spawned>().unwrap();
        assert!(!bus.contains::<Spawned>());
        assert!(bus.is_empty());
        assert_eq!(bus.enter::<Collision>().unwrap(), id);
    }

    #[test]
    fn concurrent_push() {
        let queue = Queue::new();
        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let queue = &queue;
                scope.spawn(move || {
                    for i in 0..100 {
                        queue.push(t * 1000 + i);
                    }
                });
            }
        });
        queue.swap();
        assert_eq!(queue.len(), 400);
    }
}
