//! Store snapshots.
//!
//! A [`StoreSnapshot`] captures everything needed to rebuild a store with
//! identical identity maps: the identifier generator state, the explicitly
//! registered entity types, the identity list of every view, and one
//! encoded payload per distinct entity. Secondary index records carry only
//! names and sizes; their extractors are code, so the caller registers them
//! again after a restore and they rebuild from the primary indices.
//!
//! # Binary Format
//!
//! ```text
//! | magic "ESNP" (4) | version u16 BE (2) | CBOR body |
//! ```

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::identifier::{GeneratorState, IdentifierGenerator};
use crate::object::ObjectRef;
use crate::schema::Schema;
use crate::store::EntityStore;
use crate::types::{Identity, TypeName};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, info};

/// Magic bytes opening a binary snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"ESNP";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Resolves a reference by concrete type name and identity.
pub type Resolver<'a, I> = &'a dyn Fn(&str, &I) -> Option<ObjectRef>;

/// Converts entities to and from snapshot payloads.
///
/// Links between entities are the codec's business: `encode` can record
/// references as `(type name, identity)` pairs and `relink` restores them
/// once every entity has been decoded and stored.
pub trait EntityCodec<I>: Send + Sync {
    /// Encodes an entity. `identify` yields the identity of a stored
    /// entity.
    fn encode(&self, entity: &ObjectRef, identify: &dyn Fn(&ObjectRef) -> Option<I>) -> CoreResult<Vec<u8>>;

    /// Decodes an entity of concrete type `type_name`, without its links.
    fn decode(&self, type_name: &str, payload: &[u8]) -> CoreResult<ObjectRef>;

    /// Restores the links of a decoded entity.
    fn relink(&self, entity: &ObjectRef, payload: &[u8], resolve: Resolver<'_, I>) -> CoreResult<()> {
        let _ = (entity, payload, resolve);
        Ok(())
    }
}

/// Identities held by one primary index view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSnapshot<I> {
    /// Type of the view.
    pub entity_type: TypeName,
    /// Identities, in order.
    pub identities: Vec<I>,
}

/// One distinct entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord<I> {
    /// Identity the entity is stored under.
    pub identity: I,
    /// Concrete type.
    pub type_name: TypeName,
    /// Codec payload.
    pub payload: Vec<u8>,
}

/// Shape of a registered secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexRecord {
    /// Index name.
    pub name: String,
    /// View the index follows.
    pub entity_type: TypeName,
    /// Distinct keys at snapshot time.
    pub keys: usize,
    /// Indexed entities at snapshot time.
    pub entries: usize,
}

/// Serializable image of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot<I> {
    /// Identifier generator state.
    pub generator: GeneratorState,
    /// Explicitly registered entity types.
    pub entity_types: Vec<TypeName>,
    /// Identity lists per view, ordered by type name.
    pub views: Vec<ViewSnapshot<I>>,
    /// Distinct entities, in first-seen view order.
    pub entities: Vec<EntityRecord<I>>,
    /// Registered secondary indices.
    pub secondary_indices: Vec<SecondaryIndexRecord>,
}

impl<I> StoreSnapshot<I> {
    /// Total number of identities across views.
    pub fn view_entries(&self) -> usize {
        self.views.iter().map(|v| v.identities.len()).sum()
    }
}

impl<I: Serialize> StoreSnapshot<I> {
    /// Encodes the snapshot in the binary format.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Writes the binary format to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> CoreResult<()> {
        writer.write_all(&SNAPSHOT_MAGIC)?;
        writer.write_all(&SNAPSHOT_VERSION.to_be_bytes())?;
        ciborium::into_writer(self, writer).map_err(|e| CoreError::codec(e.to_string()))
    }
}

impl<I: DeserializeOwned> StoreSnapshot<I> {
    /// Decodes the binary format.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        Self::read_from(bytes)
    }

    /// Reads the binary format from `reader`.
    pub fn read_from<R: Read>(mut reader: R) -> CoreResult<Self> {
        let mut header = [0u8; 6];
        reader.read_exact(&mut header).map_err(|_| CoreError::invalid_format("truncated header"))?;
        if header[..4] != SNAPSHOT_MAGIC {
            return Err(CoreError::invalid_format("bad magic"));
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != SNAPSHOT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported version {version}, expected {SNAPSHOT_VERSION}"
            )));
        }
        ciborium::from_reader(reader).map_err(|e| CoreError::codec(e.to_string()))
    }
}

impl<I: Identity> EntityStore<I> {
    /// Captures the store's current state.
    ///
    /// Holds the update lock for the duration, so the image is consistent.
    pub fn snapshot(&self, codec: &dyn EntityCodec<I>) -> CoreResult<StoreSnapshot<I>> {
        let lock = self.update_lock();
        let _guard = lock.lock();

        let identify = |entity: &ObjectRef| self.identity_of(entity);
        let mut seen = HashSet::new();
        let mut views = Vec::new();
        let mut entities = Vec::new();

        for view in self.primary_indices() {
            let entries = view.entries();
            for (identity, entity) in &entries {
                if seen.insert(entity.clone()) {
                    entities.push(EntityRecord {
                        identity: identity.clone(),
                        type_name: TypeName::new(entity.type_name()),
                        payload: codec.encode(entity, &identify)?,
                    });
                }
            }
            views.push(ViewSnapshot {
                entity_type: view.entity_type().clone(),
                identities: entries.into_iter().map(|(id, _)| id).collect(),
            });
        }

        let secondary_indices = self
            .secondary_index_names()
            .into_iter()
            .filter_map(|name| self.secondary_index_dyn(&name))
            .map(|index| SecondaryIndexRecord {
                name: index.name().to_string(),
                entity_type: index.entity_type().clone(),
                keys: index.key_count(),
                entries: index.len(),
            })
            .collect();

        debug!(entities = entities.len(), views = views.len(), "snapshot taken");
        Ok(StoreSnapshot {
            generator: self.identifiers().state(),
            entity_types: self.registered_types(),
            views,
            entities,
            secondary_indices,
        })
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// Entities are decoded and put in snapshot order, then relinked. With
    /// `verify_views_after_restore` set, every view must end up holding
    /// exactly the identities the snapshot lists for it.
    pub fn restore(
        schema: impl Into<Arc<Schema>>,
        config: StoreConfig,
        snapshot: &StoreSnapshot<I>,
        codec: &dyn EntityCodec<I>,
    ) -> CoreResult<Arc<Self>> {
        let verify = config.verify_views_after_restore;
        let store = Self::with_generator(
            schema,
            config,
            IdentifierGenerator::from_state(snapshot.generator),
        );
        for type_name in &snapshot.entity_types {
            store.register_type(type_name.clone());
        }

        let mut decoded = Vec::with_capacity(snapshot.entities.len());
        for record in &snapshot.entities {
            let entity = codec.decode(record.type_name.as_str(), &record.payload)?;
            if entity.type_name() != record.type_name.as_str() {
                return Err(CoreError::codec(format!(
                    "payload of {} decoded as {}",
                    record.type_name,
                    entity.type_name()
                )));
            }
            store.put(record.identity.clone(), entity.clone())?;
            decoded.push((entity, record));
        }

        let by_type: HashMap<(&str, &I), &ObjectRef> = decoded
            .iter()
            .map(|(entity, record)| ((record.type_name.as_str(), &record.identity), entity))
            .collect();
        let resolve = |type_name: &str, identity: &I| by_type.get(&(type_name, identity)).map(|e| (*e).clone());
        for (entity, record) in &decoded {
            codec.relink(entity, &record.payload, &resolve)?;
        }

        if verify {
            for view in &snapshot.views {
                let restored = store
                    .get_primary_index(view.entity_type.as_str())?
                    .map(|index| index.identities())
                    .unwrap_or_default();
                if restored != view.identities {
                    return Err(CoreError::inconsistency(format!(
                        "restored view {} holds {} identities, snapshot lists {}",
                        view.entity_type,
                        restored.len(),
                        view.identities.len()
                    )));
                }
            }
        }

        info!(entities = decoded.len(), views = snapshot.views.len(), "store restored");
        Ok(store)
    }
}
