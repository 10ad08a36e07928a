//! The entity store.
//!
//! An [`EntityStore`] owns one [`PrimaryIndex`] per entity type view. A
//! concrete type is visible through itself and through every supertype that
//! is also an entity type (its *type closure*); a single logical `put` or
//! `remove` is applied to every view in the closure, and all views must
//! agree on what they held before.
//!
//! # Example
//!
//! ```rust,ignore
//! use entistore_core::{EntityStore, ObjectRef, Schema, TypeDef};
//!
//! let schema = Schema::builder()
//!     .with_type(TypeDef::plain("LegalPerson"))
//!     .with_type(TypeDef::entity("Human").extends("LegalPerson"))
//!     .build()?;
//! let store = EntityStore::<u64>::new(schema);
//! store.register_type("LegalPerson");
//!
//! store.put(0, ObjectRef::new(alice))?;
//! assert!(store.get("LegalPerson", &0)?.is_some());
//! store.remove("Human", &0)?;
//! ```

use crate::config::StoreConfig;
use crate::decouple::{DecoupleReport, Decoupler};
use crate::error::{CoreError, CoreResult};
use crate::identifier::{Identifier, IdentifierGenerator};
use crate::index::{IndexKey, IndexMaintenance, KeyExtractor, PrimaryIndex, SecondaryIndex, SecondaryIndexSpec};
use crate::object::{same_object, ObjectRef};
use crate::schema::Schema;
use crate::stats::StoreStats;
use crate::types::{Identity, TypeName};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use tracing::{debug, error, warn};

/// Registry of primary and secondary indices over one object graph.
pub struct EntityStore<I: Identity> {
    self_ref: Weak<EntityStore<I>>,
    config: StoreConfig,
    schema: Arc<Schema>,
    /// Types registered explicitly, in addition to the schema's entity types.
    allowed: RwLock<BTreeSet<TypeName>>,
    primary_indices: RwLock<HashMap<TypeName, Arc<PrimaryIndex<I>>>>,
    secondary_indices: RwLock<BTreeMap<String, Arc<dyn IndexMaintenance>>>,
    /// Cached type closures per concrete type.
    closures: RwLock<HashMap<TypeName, Arc<[TypeName]>>>,
    identifiers: IdentifierGenerator,
    update_lock: Arc<ReentrantMutex<()>>,
    stats: StoreStats,
}

impl<I: Identity> EntityStore<I> {
    /// Creates a store over `schema` with default configuration.
    pub fn new(schema: impl Into<Arc<Schema>>) -> Arc<Self> {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Creates a store with the given configuration.
    pub fn with_config(schema: impl Into<Arc<Schema>>, config: StoreConfig) -> Arc<Self> {
        Self::with_generator(schema, config, IdentifierGenerator::new())
    }

    pub(crate) fn with_generator(
        schema: impl Into<Arc<Schema>>,
        config: StoreConfig,
        identifiers: IdentifierGenerator,
    ) -> Arc<Self> {
        let schema = schema.into();
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            schema,
            allowed: RwLock::new(BTreeSet::new()),
            primary_indices: RwLock::new(HashMap::new()),
            secondary_indices: RwLock::new(BTreeMap::new()),
            closures: RwLock::new(HashMap::new()),
            identifiers,
            update_lock: Arc::new(ReentrantMutex::new(())),
            stats: StoreStats::new(),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the statistics counters.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// The store-wide update lock shared by all primary indices.
    ///
    /// Mutating operations take it themselves; hold it to make a sequence
    /// of them atomic with respect to other writers.
    pub fn update_lock(&self) -> Arc<ReentrantMutex<()>> {
        Arc::clone(&self.update_lock)
    }

    // === Type registry ===

    /// Allow-lists `type_name` as an entity type. Returns false if it was
    /// already registered.
    pub fn register_type(&self, type_name: impl Into<TypeName>) -> bool {
        let type_name = type_name.into();
        let inserted = self.allowed.write().insert(type_name.clone());
        if inserted {
            self.closures.write().clear();
            debug!(%type_name, "entity type registered");
        }
        inserted
    }

    /// Types registered through [`register_type`](Self::register_type).
    pub fn registered_types(&self) -> Vec<TypeName> {
        self.allowed.read().iter().cloned().collect()
    }

    /// Returns true if `type_name` is allow-listed or declared as an entity
    /// type by the schema.
    pub fn is_entity_type(&self, type_name: &str) -> bool {
        self.allowed.read().contains(type_name) || self.schema.is_entity_type(type_name)
    }

    /// Entity-type views of `type_name`: itself (if an entity type) followed
    /// by its entity-type supertypes, breadth first.
    pub fn type_closure(&self, type_name: &str) -> Arc<[TypeName]> {
        if let Some(closure) = self.closures.read().get(type_name) {
            return Arc::clone(closure);
        }
        let closure: Arc<[TypeName]> = self
            .schema
            .ancestors(type_name)
            .into_iter()
            .filter(|t| self.is_entity_type(t.as_str()))
            .collect();
        self.closures
            .write()
            .insert(TypeName::new(type_name), Arc::clone(&closure));
        closure
    }

    // === Primary indices ===

    /// Returns the primary index of `entity_type`, creating it on first use.
    pub fn get_or_create_primary_index(&self, entity_type: &str) -> CoreResult<Arc<PrimaryIndex<I>>> {
        if !self.is_entity_type(entity_type) {
            return Err(CoreError::not_registered(entity_type));
        }
        if let Some(index) = self.primary_indices.read().get(entity_type) {
            return Ok(Arc::clone(index));
        }
        let mut indices = self.primary_indices.write();
        let index = indices.entry(TypeName::new(entity_type)).or_insert_with(|| {
            debug!(entity_type, "primary index created");
            Arc::new(PrimaryIndex::new(
                TypeName::new(entity_type),
                self.self_ref.clone(),
                Arc::clone(&self.update_lock),
                &self.config.listener_thread_prefix,
            ))
        });
        Ok(Arc::clone(index))
    }

    /// Returns the primary index of `entity_type` if it has been created.
    ///
    /// Fails with `NotRegistered` if the type is not an entity type.
    pub fn get_primary_index(&self, entity_type: &str) -> CoreResult<Option<Arc<PrimaryIndex<I>>>> {
        if !self.is_entity_type(entity_type) {
            return Err(CoreError::not_registered(entity_type));
        }
        Ok(self.primary_indices.read().get(entity_type).cloned())
    }

    /// All created primary indices, ordered by type name.
    pub fn primary_indices(&self) -> Vec<Arc<PrimaryIndex<I>>> {
        let mut indices: Vec<_> = self.primary_indices.read().values().cloned().collect();
        indices.sort_by(|a, b| a.entity_type().cmp(b.entity_type()));
        indices
    }

    fn existing_views(&self, closure: &[TypeName]) -> Vec<Arc<PrimaryIndex<I>>> {
        let indices = self.primary_indices.read();
        closure.iter().filter_map(|t| indices.get(t).cloned()).collect()
    }

    // === Entity operations ===

    /// Puts `entity` under `id` in every view of its type closure.
    ///
    /// Returns the previous occupant. All views must report the same
    /// previous occupant; a disagreement is an `Inconsistency`.
    pub fn put(&self, id: I, entity: ObjectRef) -> CoreResult<Option<ObjectRef>> {
        let _guard = self.update_lock.lock();

        let closure = self.type_closure(entity.type_name());
        if closure.is_empty() {
            return Err(CoreError::not_registered(entity.type_name()));
        }
        let views = closure
            .iter()
            .map(|t| self.get_or_create_primary_index(t.as_str()))
            .collect::<CoreResult<Vec<_>>>()?;

        for view in &views {
            view.check_put(self, &id, &entity)?;
        }

        let mut previous: Option<Option<ObjectRef>> = None;
        for view in &views {
            let displaced = view.apply_put(self, id.clone(), entity.clone())?;
            match &previous {
                None => previous = Some(displaced),
                Some(first) if !same_object(first.as_ref(), displaced.as_ref()) => {
                    error!(view = %view.entity_type(), identity = ?id, "views disagree on previous occupant");
                    return Err(CoreError::inconsistency(format!(
                        "view {} held {:?} under {id:?}, expected {:?}",
                        view.entity_type(),
                        displaced,
                        first
                    )));
                }
                Some(_) => {}
            }
        }

        let previous = previous.flatten();
        self.stats.record_put(previous.is_some());
        Ok(previous)
    }

    /// Entity stored under `id` in the `entity_type` view.
    pub fn get(&self, entity_type: &str, id: &I) -> CoreResult<Option<ObjectRef>> {
        self.stats.record_lookup();
        Ok(self
            .get_primary_index(entity_type)?
            .and_then(|index| index.get(id)))
    }

    /// Returns true if the `entity_type` view holds `id`.
    pub fn contains(&self, entity_type: &str, id: &I) -> CoreResult<bool> {
        Ok(self
            .get_primary_index(entity_type)?
            .is_some_and(|index| index.contains(id)))
    }

    /// Identity `entity` is stored under, looked up in its type's views.
    pub fn identity_of(&self, entity: &ObjectRef) -> Option<I> {
        let closure = self.type_closure(entity.type_name());
        self.existing_views(&closure)
            .iter()
            .find_map(|view| view.identity_of(entity))
    }

    /// Removes the entity under `id` from every view of its type closure.
    ///
    /// `entity_type` may be any view the entity is visible through. Returns
    /// the removed entity. Removal decouples the entity from its
    /// associations and cascades into composite parts.
    pub fn remove(&self, entity_type: &str, id: &I) -> CoreResult<Option<ObjectRef>> {
        let _guard = self.update_lock.lock();

        let Some(view) = self.get_primary_index(entity_type)? else {
            return Ok(None);
        };
        let Some(entity) = view.get(id) else {
            return Ok(None);
        };

        let closure = self.type_closure(entity.type_name());
        let views = self.existing_views(&closure);
        self.check_decouple(&entity)?;

        for view in &views {
            match view.apply_remove(self, id)? {
                Some(removed) if !removed.ptr_eq(&entity) => {
                    error!(view = %view.entity_type(), identity = ?id, "views disagree on removed entity");
                    return Err(CoreError::inconsistency(format!(
                        "view {} held {removed:?} under {id:?}, expected {entity:?}",
                        view.entity_type()
                    )));
                }
                // already taken out by a cascade that re-entered the store
                _ => {}
            }
        }

        self.stats.record_remove();
        Ok(Some(entity))
    }

    /// Removes `entity` wherever it is stored. Returns its identity, or
    /// `None` if the store does not hold it.
    pub fn remove_entity(&self, entity: &ObjectRef) -> CoreResult<Option<I>> {
        let _guard = self.update_lock.lock();
        let closure = self.type_closure(entity.type_name());
        for view in self.existing_views(&closure) {
            if let Some(id) = view.identity_of(entity) {
                self.remove(view.entity_type().as_str(), &id)?;
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Cuts every association of `entity` and cascades into composite parts
    /// held by the store. The entity itself stays where it is.
    pub fn decouple(&self, entity: &ObjectRef) -> CoreResult<DecoupleReport> {
        let _guard = self.update_lock.lock();
        let report = Decoupler::new(self).decouple(entity)?;
        self.stats.record_links_removed(report.links_removed as u64);
        for _ in &report.cascaded {
            self.stats.record_cascade();
        }
        Ok(report)
    }

    pub(crate) fn check_decouple(&self, entity: &ObjectRef) -> CoreResult<()> {
        Decoupler::new(self).check(entity)
    }

    // === Secondary indices ===

    /// Registers a secondary index.
    ///
    /// Returns false if an index of the same name is already registered.
    /// Otherwise the index is rebuilt from its primary index and linked, so
    /// that the primary keeps it current from then on.
    pub fn register_secondary_index<K: IndexKey>(
        &self,
        index: Arc<SecondaryIndex<I, K>>,
    ) -> CoreResult<bool> {
        let _guard = self.update_lock.lock();
        let name = index.name().to_string();

        if self.secondary_indices.read().contains_key(&name) {
            warn!(index = %name, "secondary index name already registered");
            return Ok(false);
        }

        let primary = self.get_or_create_primary_index(index.spec().entity_type.as_str())?;
        index.attach(&primary);
        index.reconstruct()?;

        let erased: Arc<dyn IndexMaintenance> = index;
        if !primary.link_secondary(Arc::clone(&erased)) {
            return Err(CoreError::inconsistency(format!(
                "primary index {} already links a secondary index named {name}",
                primary.entity_type()
            )));
        }
        self.secondary_indices.write().insert(name.clone(), erased);
        debug!(index = %name, view = %primary.entity_type(), "secondary index registered");
        Ok(true)
    }

    /// Creates and registers a secondary index.
    ///
    /// The index is strict if either `spec.strict` or the store configuration
    /// asks for it. Returns `None` if the name is taken.
    pub fn create_secondary_index<K: IndexKey>(
        &self,
        mut spec: SecondaryIndexSpec,
        extractor: impl KeyExtractor<K> + 'static,
    ) -> CoreResult<Option<Arc<SecondaryIndex<I, K>>>> {
        spec.strict |= self.config.strict_secondary_removal;
        let index = Arc::new(SecondaryIndex::new(spec, extractor));
        if self.register_secondary_index(Arc::clone(&index))? {
            Ok(Some(index))
        } else {
            Ok(None)
        }
    }

    /// Unlinks the secondary index `name`. Returns false if unknown.
    pub fn drop_secondary_index(&self, name: &str) -> bool {
        let _guard = self.update_lock.lock();
        let Some(index) = self.secondary_indices.write().remove(name) else {
            return false;
        };
        if let Some(primary) = self.primary_indices.read().get(index.entity_type()) {
            primary.unlink_secondary(name);
        }
        debug!(index = name, "secondary index dropped");
        true
    }

    /// The secondary index `name`, if registered with key type `K`.
    pub fn secondary_index<K: IndexKey>(&self, name: &str) -> Option<Arc<SecondaryIndex<I, K>>> {
        let erased = self.secondary_indices.read().get(name).cloned()?;
        erased.into_any().downcast::<SecondaryIndex<I, K>>().ok()
    }

    /// The secondary index `name`, type-erased.
    pub fn secondary_index_dyn(&self, name: &str) -> Option<Arc<dyn IndexMaintenance>> {
        self.secondary_indices.read().get(name).cloned()
    }

    /// Names of all registered secondary indices, in order.
    pub fn secondary_index_names(&self) -> Vec<String> {
        self.secondary_indices.read().keys().cloned().collect()
    }

    // === Identifiers ===

    /// The store's identifier generator.
    pub fn identifiers(&self) -> &IdentifierGenerator {
        &self.identifiers
    }

    /// Produces the next identifier for `instant`.
    pub fn next_identity(&self, instant: SystemTime) -> CoreResult<Identifier> {
        let id = self.identifiers.next_identity(instant)?;
        self.stats.record_identifier();
        Ok(id)
    }
}

impl<I: Identity> fmt::Debug for EntityStore<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("config", &self.config)
            .field("registered_types", &self.registered_types())
            .field("primary_indices", &self.primary_indices())
            .field("secondary_indices", &self.secondary_index_names())
            .finish_non_exhaustive()
    }
}
