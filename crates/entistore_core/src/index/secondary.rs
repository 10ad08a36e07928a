//! Secondary indices.
//!
//! A secondary index maps derived keys to the entities of one primary index
//! view. Each entity occupies exactly one key; the index remembers which, so
//! an entity whose attributes changed is still removed from the key-set it
//! was inserted under.

use super::primary::PrimaryIndex;
use super::traits::{IndexKey, IndexMaintenance, KeyExtractor, SecondaryIndexSpec};
use crate::error::{CoreError, CoreResult};
use crate::object::ObjectRef;
use crate::types::{Identity, TypeName};
use crate::value::Value;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

struct KeyTable<K> {
    by_key: BTreeMap<K, Vec<ObjectRef>>,
    key_by_entity: HashMap<ObjectRef, K>,
}

impl<K: IndexKey> KeyTable<K> {
    fn new() -> Self {
        Self {
            by_key: BTreeMap::new(),
            key_by_entity: HashMap::new(),
        }
    }

    fn insert(&mut self, key: K, entity: ObjectRef) {
        self.by_key
            .entry(key.clone())
            .or_default()
            .push(entity.clone());
        self.key_by_entity.insert(entity, key);
    }

    fn remove(&mut self, entity: &ObjectRef) -> bool {
        let Some(key) = self.key_by_entity.remove(entity) else {
            return false;
        };
        if let Some(set) = self.by_key.get_mut(&key) {
            set.retain(|e| !e.ptr_eq(entity));
            if set.is_empty() {
                self.by_key.remove(&key);
            }
        }
        true
    }
}

/// Derived-key multimap over one primary index view.
pub struct SecondaryIndex<I: Identity, K: IndexKey> {
    spec: SecondaryIndexSpec,
    extractor: Box<dyn KeyExtractor<K>>,
    primary: RwLock<Weak<PrimaryIndex<I>>>,
    table: RwLock<KeyTable<K>>,
}

impl<I: Identity, K: IndexKey> SecondaryIndex<I, K> {
    /// Creates an unattached index. It becomes live once registered with
    /// the store.
    pub fn new(spec: SecondaryIndexSpec, extractor: impl KeyExtractor<K> + 'static) -> Self {
        Self {
            spec,
            extractor: Box::new(extractor),
            primary: RwLock::new(Weak::new()),
            table: RwLock::new(KeyTable::new()),
        }
    }

    /// Returns the index specification.
    pub fn spec(&self) -> &SecondaryIndexSpec {
        &self.spec
    }

    /// Name of the index.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub(crate) fn attach(&self, primary: &Arc<PrimaryIndex<I>>) {
        *self.primary.write() = Arc::downgrade(primary);
    }

    /// The primary index this index follows, if registered.
    pub fn primary_index(&self) -> Option<Arc<PrimaryIndex<I>>> {
        self.primary.read().upgrade()
    }

    /// Key of `entity` as the index would store it.
    pub fn secondary_key_of(&self, entity: &ObjectRef) -> CoreResult<K> {
        self.extractor.key_of(entity)
    }

    /// Key addressed by lookup parameters.
    pub fn secondary_key_from(&self, params: &[Value]) -> CoreResult<K> {
        self.extractor
            .key_from(params)
            .map_err(|message| CoreError::arity_or_type_mismatch(self.spec.name.as_str(), message))
    }

    /// Inserts `entity` under its current key.
    ///
    /// Fails with `DuplicateEntity` if the entity is already indexed; an
    /// attribute change must be applied as remove then put.
    pub fn put(&self, entity: &ObjectRef) -> CoreResult<()> {
        let key = self.secondary_key_of(entity)?;
        let mut table = self.table.write();
        if let Some(existing) = table.key_by_entity.get(entity) {
            return Err(CoreError::duplicate_entity(
                self.spec.name.as_str(),
                format!("{existing:?}"),
            ));
        }
        debug!(index = %self.spec.name, ?key, "secondary insert");
        table.insert(key, entity.clone());
        Ok(())
    }

    /// Removes `entity` from the key-set it occupies.
    ///
    /// Returns false if the entity was not indexed; strict indices also log
    /// that case.
    pub fn remove(&self, entity: &ObjectRef) -> bool {
        let removed = self.table.write().remove(entity);
        if !removed && self.spec.strict {
            warn!(
                index = %self.spec.name,
                entity = entity.type_name(),
                "removal of an entity the index does not hold"
            );
        }
        removed
    }

    /// The single entity under the key addressed by `params`.
    ///
    /// Fails with `NotUnique` if more than one entity matches.
    pub fn get(&self, params: &[Value]) -> CoreResult<Option<ObjectRef>> {
        let key = self.secondary_key_from(params)?;
        self.get_by_key(&key)
    }

    /// The single entity under `key`.
    pub fn get_by_key(&self, key: &K) -> CoreResult<Option<ObjectRef>> {
        let table = self.table.read();
        match table.by_key.get(key).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([only]) => Ok(Some(only.clone())),
            Some(many) => Err(CoreError::NotUnique {
                index: self.spec.name.clone(),
                count: many.len(),
            }),
        }
    }

    /// All entities under the key addressed by `params`, in insertion
    /// order, or `None` if there are none.
    pub fn list(&self, params: &[Value]) -> CoreResult<Option<Vec<ObjectRef>>> {
        let key = self.secondary_key_from(params)?;
        Ok(self.list_by_key(&key))
    }

    /// All entities under `key`, or `None`.
    pub fn list_by_key(&self, key: &K) -> Option<Vec<ObjectRef>> {
        self.table
            .read()
            .by_key
            .get(key)
            .filter(|set| !set.is_empty())
            .cloned()
    }

    /// Returns true if `entity` is indexed.
    pub fn contains(&self, entity: &ObjectRef) -> bool {
        self.table.read().key_by_entity.contains_key(entity)
    }

    /// Key `entity` is currently indexed under.
    pub fn key_of_indexed(&self, entity: &ObjectRef) -> Option<K> {
        self.table.read().key_by_entity.get(entity).cloned()
    }

    /// Distinct keys, in key order.
    pub fn keys(&self) -> Vec<K> {
        self.table.read().by_key.keys().cloned().collect()
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.table.read().key_by_entity.len()
    }

    /// Returns true if no entity is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.table.read().by_key.len()
    }

    /// Clears the index and re-inserts every entity of its primary index,
    /// in identity order.
    ///
    /// Holds the store's update lock, so no put or remove interleaves. If
    /// any key cannot be extracted the index is left unchanged.
    pub fn reconstruct(&self) -> CoreResult<()> {
        let primary = self.primary_index().ok_or(CoreError::StoreClosed)?;
        let lock = primary.update_lock();
        let _guard = lock.lock();

        let entities = primary.entities();
        let mut rebuilt = KeyTable::new();
        for entity in entities {
            let key = self.secondary_key_of(&entity)?;
            rebuilt.insert(key, entity);
        }
        debug!(
            index = %self.spec.name,
            entities = rebuilt.key_by_entity.len(),
            keys = rebuilt.by_key.len(),
            "secondary index reconstructed"
        );
        *self.table.write() = rebuilt;
        Ok(())
    }
}

impl<I: Identity, K: IndexKey> IndexMaintenance for SecondaryIndex<I, K> {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn entity_type(&self) -> &TypeName {
        &self.spec.entity_type
    }

    fn check_insert(&self, entity: &ObjectRef) -> CoreResult<()> {
        self.secondary_key_of(entity).map(|_| ())
    }

    fn insert_entity(&self, entity: &ObjectRef) -> CoreResult<()> {
        self.put(entity)
    }

    fn remove_entity(&self, entity: &ObjectRef) -> bool {
        self.remove(entity)
    }

    fn reconstruct(&self) -> CoreResult<()> {
        SecondaryIndex::reconstruct(self)
    }

    fn len(&self) -> usize {
        SecondaryIndex::len(self)
    }

    fn key_count(&self) -> usize {
        SecondaryIndex::key_count(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<I: Identity, K: IndexKey> fmt::Debug for SecondaryIndex<I, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondaryIndex")
            .field("spec", &self.spec)
            .field("len", &self.len())
            .field("keys", &self.key_count())
            .finish()
    }
}
