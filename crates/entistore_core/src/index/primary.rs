//! Primary indices.
//!
//! A primary index owns the identity-to-entity map of one type view. Its
//! `put` and `remove` carry the side effects that keep the rest of the store
//! consistent:
//!
//! - `put` decouples a displaced occupant, moves the identity's secondary
//!   entries from the old occupant to the new one, and emits
//!   `Created`/`Updated`,
//! - `remove` drops the entity from every secondary index, decouples it and
//!   emits `Deleted`.
//!
//! Both validate first and then mutate. A failure after the identity map
//! changed is reported as an inconsistency.

use super::traits::IndexMaintenance;
use crate::error::{CoreError, CoreResult};
use crate::listener::{ChangeEvent, ChangeType, ListenerRegistry, PrimaryIndexListener};
use crate::object::ObjectRef;
use crate::store::EntityStore;
use crate::types::{Identity, ListenerId, TypeName};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Identity map of one view, kept in both directions.
pub(crate) struct EntitiesById<I> {
    by_id: BTreeMap<I, ObjectRef>,
    ids_by_entity: HashMap<ObjectRef, I>,
}

impl<I: Identity> EntitiesById<I> {
    fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
            ids_by_entity: HashMap::new(),
        }
    }

    fn get(&self, id: &I) -> Option<&ObjectRef> {
        self.by_id.get(id)
    }

    fn identity_of(&self, entity: &ObjectRef) -> Option<&I> {
        self.ids_by_entity.get(entity)
    }

    fn insert(&mut self, id: I, entity: ObjectRef) -> Option<ObjectRef> {
        let previous = self.by_id.insert(id.clone(), entity.clone());
        if let Some(previous) = &previous {
            self.ids_by_entity.remove(previous);
        }
        self.ids_by_entity.insert(entity, id);
        previous
    }

    fn remove(&mut self, id: &I) -> Option<ObjectRef> {
        let removed = self.by_id.remove(id)?;
        self.ids_by_entity.remove(&removed);
        Some(removed)
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Identity-to-entity map for one type view.
pub struct PrimaryIndex<I: Identity> {
    entity_type: TypeName,
    entities: RwLock<EntitiesById<I>>,
    secondary_indices: RwLock<BTreeMap<String, Arc<dyn IndexMaintenance>>>,
    listeners: ListenerRegistry<I>,
    store: Weak<EntityStore<I>>,
    update_lock: Arc<ReentrantMutex<()>>,
}

impl<I: Identity> PrimaryIndex<I> {
    pub(crate) fn new(
        entity_type: TypeName,
        store: Weak<EntityStore<I>>,
        update_lock: Arc<ReentrantMutex<()>>,
        listener_thread_prefix: &str,
    ) -> Self {
        Self {
            listeners: ListenerRegistry::new(entity_type.clone(), listener_thread_prefix),
            entity_type,
            entities: RwLock::new(EntitiesById::new()),
            secondary_indices: RwLock::new(BTreeMap::new()),
            store,
            update_lock,
        }
    }

    /// Type of the view.
    pub fn entity_type(&self) -> &TypeName {
        &self.entity_type
    }

    /// The store-wide update lock.
    ///
    /// `put`, `remove` and secondary index reconstruction acquire it
    /// themselves. Hold it around a sequence of calls that must not
    /// interleave with other writers. The lock is re-entrant.
    pub fn update_lock(&self) -> Arc<ReentrantMutex<()>> {
        Arc::clone(&self.update_lock)
    }

    fn store(&self) -> CoreResult<Arc<EntityStore<I>>> {
        self.store.upgrade().ok_or(CoreError::StoreClosed)
    }

    /// Entity stored under `id`.
    pub fn get(&self, id: &I) -> Option<ObjectRef> {
        self.entities.read().get(id).cloned()
    }

    /// Returns true if an entity is stored under `id`.
    pub fn contains(&self, id: &I) -> bool {
        self.entities.read().get(id).is_some()
    }

    /// Identity `entity` is stored under.
    pub fn identity_of(&self, entity: &ObjectRef) -> Option<I> {
        self.entities.read().identity_of(entity).cloned()
    }

    /// All entities, in identity order.
    pub fn entities(&self) -> Vec<ObjectRef> {
        self.entities.read().by_id.values().cloned().collect()
    }

    /// All identities, in order.
    pub fn identities(&self) -> Vec<I> {
        self.entities.read().by_id.keys().cloned().collect()
    }

    /// All entries, in identity order.
    pub fn entries(&self) -> Vec<(I, ObjectRef)> {
        self.entities
            .read()
            .by_id
            .iter()
            .map(|(id, entity)| (id.clone(), entity.clone()))
            .collect()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if the view holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Puts `entity` under `id` in this view only.
    ///
    /// Returns the previous occupant. Use [`EntityStore::put`] to update
    /// every view of the entity's type at once.
    pub fn put(&self, id: I, entity: ObjectRef) -> CoreResult<Option<ObjectRef>> {
        let _guard = self.update_lock.lock();
        let store = self.store()?;
        self.check_put(&store, &id, &entity)?;
        self.apply_put(&store, id, entity)
    }

    /// Removes the entity under `id` from this view only.
    pub fn remove(&self, id: &I) -> CoreResult<Option<ObjectRef>> {
        let _guard = self.update_lock.lock();
        let store = self.store()?;
        if let Some(entity) = self.get(id) {
            store.check_decouple(&entity)?;
        }
        self.apply_remove(&store, id)
    }

    /// Validates a put without mutating anything.
    pub(crate) fn check_put(
        &self,
        store: &EntityStore<I>,
        id: &I,
        entity: &ObjectRef,
    ) -> CoreResult<()> {
        let closure = store.type_closure(entity.type_name());
        if !closure.contains(&self.entity_type) {
            return Err(CoreError::NotViewableAs {
                type_name: entity.type_name().to_string(),
                view: self.entity_type.to_string(),
            });
        }

        let previous = {
            let entities = self.entities.read();
            if let Some(existing) = entities.identity_of(entity) {
                if existing != id {
                    return Err(CoreError::duplicate_entity(
                        self.entity_type.as_str(),
                        format!("{existing:?}"),
                    ));
                }
            }
            entities.get(id).cloned()
        };

        for index in self.secondary_snapshot() {
            index.check_insert(entity)?;
        }

        match previous {
            Some(previous) if !previous.ptr_eq(entity) => store.check_decouple(&previous),
            _ => Ok(()),
        }
    }

    pub(crate) fn apply_put(
        &self,
        store: &EntityStore<I>,
        id: I,
        entity: ObjectRef,
    ) -> CoreResult<Option<ObjectRef>> {
        let previous = self.entities.write().insert(id.clone(), entity.clone());

        if let Err(e) = self.after_put(store, previous.as_ref(), &entity) {
            error!(view = %self.entity_type, identity = ?id, error = %e, "put failed after mutation");
            return Err(CoreError::inconsistency(format!(
                "put into {} under {id:?} failed after mutation: {e}",
                self.entity_type
            )));
        }

        let change = if previous.is_some() {
            ChangeType::Updated
        } else {
            ChangeType::Created
        };
        debug!(view = %self.entity_type, identity = ?id, ?change, "primary put");
        self.listeners.emit(id, entity, change);
        Ok(previous)
    }

    fn after_put(
        &self,
        store: &EntityStore<I>,
        previous: Option<&ObjectRef>,
        entity: &ObjectRef,
    ) -> CoreResult<()> {
        if let Some(previous) = previous {
            if !previous.ptr_eq(entity) {
                store.decouple(previous)?;
            }
        }
        let indices = self.secondary_snapshot();
        if let Some(previous) = previous {
            for index in &indices {
                index.remove_entity(previous);
            }
        }
        for index in &indices {
            index.insert_entity(entity)?;
        }
        Ok(())
    }

    pub(crate) fn apply_remove(
        &self,
        store: &EntityStore<I>,
        id: &I,
    ) -> CoreResult<Option<ObjectRef>> {
        let removed = self.entities.write().remove(id);
        let Some(entity) = removed else {
            return Ok(None);
        };

        for index in self.secondary_snapshot() {
            index.remove_entity(&entity);
        }
        if let Err(e) = store.decouple(&entity) {
            error!(view = %self.entity_type, identity = ?id, error = %e, "remove failed after mutation");
            return Err(CoreError::inconsistency(format!(
                "remove from {} of {id:?} failed after mutation: {e}",
                self.entity_type
            )));
        }

        debug!(view = %self.entity_type, identity = ?id, "primary remove");
        self.listeners.emit(id.clone(), entity.clone(), ChangeType::Deleted);
        Ok(Some(entity))
    }

    fn secondary_snapshot(&self) -> Vec<Arc<dyn IndexMaintenance>> {
        self.secondary_indices.read().values().cloned().collect()
    }

    /// Links a reconstructed secondary index. Returns false if the name is
    /// taken on this view.
    pub(crate) fn link_secondary(&self, index: Arc<dyn IndexMaintenance>) -> bool {
        let mut indices = self.secondary_indices.write();
        if indices.contains_key(index.name()) {
            return false;
        }
        indices.insert(index.name().to_string(), index);
        true
    }

    pub(crate) fn unlink_secondary(&self, name: &str) -> bool {
        self.secondary_indices.write().remove(name).is_some()
    }

    /// Names of the secondary indices following this view.
    pub fn secondary_index_names(&self) -> Vec<String> {
        self.secondary_indices.read().keys().cloned().collect()
    }

    /// Registers a listener. Each listener runs on its own worker thread
    /// and sees events in mutation order.
    pub fn add_listener(
        &self,
        listener: Arc<dyn PrimaryIndexListener<I>>,
    ) -> CoreResult<ListenerId> {
        self.listeners.add_listener(listener)
    }

    /// Subscribes a raw channel to this view's change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent<I>> {
        self.listeners.subscribe().1
    }

    /// Subscribes a raw channel and returns its handle for later removal.
    pub fn subscribe_with_id(&self) -> (ListenerId, Receiver<ChangeEvent<I>>) {
        self.listeners.subscribe()
    }

    /// Detaches a listener or subscriber. Returns false if unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Number of attached listeners and subscribers.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<I: Identity> fmt::Debug for PrimaryIndex<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryIndex")
            .field("entity_type", &self.entity_type)
            .field("len", &self.len())
            .field("secondary_indices", &self.secondary_index_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::schema::{Schema, TypeDef};

    #[derive(Debug)]
    struct Gadget(&'static str);

    impl Object for Gadget {
        fn type_name(&self) -> &'static str {
            "Gadget"
        }
    }

    #[derive(Debug)]
    struct Widget;

    impl Object for Widget {
        fn type_name(&self) -> &'static str {
            "Widget"
        }
    }

    fn store() -> Arc<EntityStore<u32>> {
        let schema = Schema::builder()
            .with_type(TypeDef::entity("Gadget"))
            .with_type(TypeDef::entity("Widget"))
            .build()
            .unwrap();
        EntityStore::new(schema)
    }

    #[test]
    fn entities_by_id_tracks_both_directions() {
        let mut map = EntitiesById::new();
        let a = ObjectRef::new(Gadget("a"));
        let b = ObjectRef::new(Gadget("b"));

        assert!(map.insert(1u32, a.clone()).is_none());
        assert_eq!(map.insert(1, b.clone()), Some(a.clone()));
        assert!(map.identity_of(&a).is_none());
        assert_eq!(map.identity_of(&b), Some(&1));
        assert_eq!(map.remove(&1), Some(b.clone()));
        assert!(map.identity_of(&b).is_none());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn put_get_remove() {
        let store = store();
        let gadgets = store.get_or_create_primary_index("Gadget").unwrap();
        let a = ObjectRef::new(Gadget("a"));

        assert!(gadgets.put(7, a.clone()).unwrap().is_none());
        assert_eq!(gadgets.get(&7), Some(a.clone()));
        assert_eq!(gadgets.identity_of(&a), Some(7));
        assert_eq!(gadgets.identities(), vec![7]);

        assert_eq!(gadgets.remove(&7).unwrap(), Some(a));
        assert!(gadgets.is_empty());
        assert_eq!(gadgets.remove(&7).unwrap(), None);
    }

    #[test]
    fn same_object_under_two_identities_is_rejected() {
        let store = store();
        let gadgets = store.get_or_create_primary_index("Gadget").unwrap();
        let a = ObjectRef::new(Gadget("a"));
        gadgets.put(1, a.clone()).unwrap();

        let err = gadgets.put(2, a.clone()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateEntity { .. }));
        assert_eq!(gadgets.len(), 1);

        // re-putting under the same identity is an update
        assert_eq!(gadgets.put(1, a.clone()).unwrap(), Some(a));
    }

    #[test]
    fn foreign_type_is_not_viewable() {
        let store = store();
        let gadgets = store.get_or_create_primary_index("Gadget").unwrap();
        let err = gadgets.put(1, ObjectRef::new(Widget)).unwrap_err();
        assert!(matches!(err, CoreError::NotViewableAs { .. }));
        assert!(gadgets.is_empty());
    }

    #[test]
    fn subscriber_sees_created_updated_deleted() {
        let store = store();
        let gadgets = store.get_or_create_primary_index("Gadget").unwrap();
        let rx = gadgets.subscribe();

        gadgets.put(1, ObjectRef::new(Gadget("a"))).unwrap();
        gadgets.put(1, ObjectRef::new(Gadget("b"))).unwrap();
        gadgets.remove(&1).unwrap();

        let changes: Vec<_> = rx.try_iter().map(|e| e.change_type).collect();
        assert_eq!(
            changes,
            vec![ChangeType::Created, ChangeType::Updated, ChangeType::Deleted]
        );
    }

    #[test]
    fn closed_store() {
        let store = store();
        let gadgets = store.get_or_create_primary_index("Gadget").unwrap();
        drop(store);
        let err = gadgets.put(1, ObjectRef::new(Gadget("a"))).unwrap_err();
        assert!(matches!(err, CoreError::StoreClosed));
    }
}
