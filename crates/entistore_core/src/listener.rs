//! Change notification for primary indices.
//!
//! Every put and remove on a primary index emits a [`ChangeEvent`]. Events
//! reach observers in two ways:
//!
//! - [`PrimaryIndexListener`]s, each driven by its own worker thread with a
//!   FIFO queue,
//! - raw channel subscribers created with `subscribe`.
//!
//! Delivery is fire-and-forget: the mutating call returns once the event is
//! queued. Each observer sees events in mutation order; order across
//! observers is unspecified.
//!
//! ```rust,ignore
//! let humans = store.get_or_create_primary_index("Human")?;
//! let receiver = humans.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = receiver.recv() {
//!         println!("{:?} {:?}", event.change_type, event.identity);
//!     }
//! });
//! ```

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectRef;
use crate::types::{Identity, ListenerId, TypeName};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// No entity existed under the identity before the put.
    Created,
    /// The put replaced an existing occupant.
    Updated,
    /// The entity was removed.
    Deleted,
}

/// A single change on one primary index.
#[derive(Debug, Clone)]
pub struct ChangeEvent<I> {
    /// Position of the change in the index's mutation order, starting at 1.
    pub sequence: u64,
    /// Type of the view that changed.
    pub entity_type: TypeName,
    /// Identity of the entity.
    pub identity: I,
    /// The new occupant, or the removed entity for deletes.
    pub entity: ObjectRef,
    /// Type of change.
    pub change_type: ChangeType,
}

/// Callbacks for primary index changes.
///
/// All methods default to doing nothing. Callbacks run on the listener's
/// worker thread; a panic is logged and the worker keeps going.
pub trait PrimaryIndexListener<I>: Send + Sync + 'static {
    /// Called after an entity was put under a new identity.
    fn created(&self, identity: &I, entity: &ObjectRef) {
        let _ = (identity, entity);
    }

    /// Called after an entity replaced the occupant of an identity.
    fn updated(&self, identity: &I, entity: &ObjectRef) {
        let _ = (identity, entity);
    }

    /// Called after an entity was removed.
    fn deleted(&self, identity: &I, entity: &ObjectRef) {
        let _ = (identity, entity);
    }
}

struct Slot<I> {
    id: ListenerId,
    sender: Sender<ChangeEvent<I>>,
}

/// Fan-out of change events to listeners and subscribers.
pub(crate) struct ListenerRegistry<I> {
    entity_type: TypeName,
    thread_prefix: String,
    slots: Mutex<Vec<Slot<I>>>,
    next_id: AtomicU64,
    sequence: AtomicU64,
}

impl<I: Identity> ListenerRegistry<I> {
    pub(crate) fn new(entity_type: TypeName, thread_prefix: impl Into<String>) -> Self {
        Self {
            entity_type,
            thread_prefix: thread_prefix.into(),
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
        }
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Starts a worker thread delivering events to `listener`.
    pub(crate) fn add_listener(
        &self,
        listener: Arc<dyn PrimaryIndexListener<I>>,
    ) -> CoreResult<ListenerId> {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::channel::<ChangeEvent<I>>();
        let name = format!("{}-{}-{}", self.thread_prefix, self.entity_type, id.as_u64());

        thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(id, listener, rx))
            .map_err(|e| CoreError::ListenerSpawn {
                message: e.to_string(),
            })?;

        self.slots.lock().push(Slot { id, sender: tx });
        debug!(entity_type = %self.entity_type, %id, "listener added");
        Ok(id)
    }

    /// Creates a raw channel subscriber.
    pub(crate) fn subscribe(&self) -> (ListenerId, Receiver<ChangeEvent<I>>) {
        let id = self.allocate_id();
        let (tx, rx) = mpsc::channel();
        self.slots.lock().push(Slot { id, sender: tx });
        (id, rx)
    }

    /// Detaches a listener or subscriber. Queued events are still delivered.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|slot| slot.id != id);
        slots.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Queues an event for every observer, dropping disconnected ones.
    pub(crate) fn emit(&self, identity: I, entity: ObjectRef, change_type: ChangeType) {
        let mut slots = self.slots.lock();
        if slots.is_empty() {
            return;
        }
        let event = ChangeEvent {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            entity_type: self.entity_type.clone(),
            identity,
            entity,
            change_type,
        };
        slots.retain(|slot| slot.sender.send(event.clone()).is_ok());
    }
}

fn run_worker<I: Identity>(
    id: ListenerId,
    listener: Arc<dyn PrimaryIndexListener<I>>,
    rx: Receiver<ChangeEvent<I>>,
) {
    while let Ok(event) = rx.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match event.change_type {
            ChangeType::Created => listener.created(&event.identity, &event.entity),
            ChangeType::Updated => listener.updated(&event.identity, &event.entity),
            ChangeType::Deleted => listener.deleted(&event.identity, &event.entity),
        }));
        if outcome.is_err() {
            error!(
                %id,
                entity_type = %event.entity_type,
                identity = ?event.identity,
                change = ?event.change_type,
                "listener panicked"
            );
        }
    }
    debug!(%id, "listener worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use std::time::Duration;

    #[derive(Debug)]
    struct Thing;

    impl Object for Thing {
        fn type_name(&self) -> &'static str {
            "Thing"
        }
    }

    struct Recorder(Mutex<Vec<(ChangeType, u32)>>, Sender<()>);

    impl PrimaryIndexListener<u32> for Recorder {
        fn created(&self, identity: &u32, _: &ObjectRef) {
            self.0.lock().push((ChangeType::Created, *identity));
            let _ = self.1.send(());
        }

        fn deleted(&self, identity: &u32, _: &ObjectRef) {
            self.0.lock().push((ChangeType::Deleted, *identity));
            let _ = self.1.send(());
        }
    }

    struct Panicky;

    impl PrimaryIndexListener<u32> for Panicky {
        fn created(&self, _: &u32, _: &ObjectRef) {
            panic!("listener failure");
        }
    }

    fn registry() -> ListenerRegistry<u32> {
        ListenerRegistry::new(TypeName::new("Thing"), "test-listener")
    }

    #[test]
    fn subscriber_receives_in_order() {
        let registry = registry();
        let (_, rx) = registry.subscribe();
        let thing = ObjectRef::new(Thing);

        registry.emit(1, thing.clone(), ChangeType::Created);
        registry.emit(1, thing.clone(), ChangeType::Updated);
        registry.emit(1, thing, ChangeType::Deleted);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].change_type, ChangeType::Created);
        assert_eq!(events[2].change_type, ChangeType::Deleted);
        assert_eq!(events[2].sequence, 3);
        assert_eq!(events[0].entity_type, "Thing");
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let registry = registry();
        let (_, rx) = registry.subscribe();
        drop(rx);
        assert_eq!(registry.len(), 1);
        registry.emit(1, ObjectRef::new(Thing), ChangeType::Created);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn remove_detaches() {
        let registry = registry();
        let (id, rx) = registry.subscribe();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.emit(1, ObjectRef::new(Thing), ChangeType::Created);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn listener_worker_delivers_fifo() {
        let registry = registry();
        let (tx, done) = mpsc::channel();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new()), tx));
        registry.add_listener(recorder.clone()).unwrap();

        let thing = ObjectRef::new(Thing);
        registry.emit(1, thing.clone(), ChangeType::Created);
        registry.emit(2, thing.clone(), ChangeType::Created);
        registry.emit(1, thing, ChangeType::Deleted);

        for _ in 0..3 {
            done.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(
            *recorder.0.lock(),
            vec![
                (ChangeType::Created, 1),
                (ChangeType::Created, 2),
                (ChangeType::Deleted, 1)
            ]
        );
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let registry = registry();
        registry.add_listener(Arc::new(Panicky)).unwrap();
        let (tx, done) = mpsc::channel();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new()), tx));
        registry.add_listener(recorder.clone()).unwrap();

        registry.emit(1, ObjectRef::new(Thing), ChangeType::Created);
        registry.emit(2, ObjectRef::new(Thing), ChangeType::Created);

        done.recv_timeout(Duration::from_secs(5)).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(recorder.0.lock().len(), 2);
        // the panicking worker survives its first panic
        assert_eq!(registry.len(), 2);
    }
}
