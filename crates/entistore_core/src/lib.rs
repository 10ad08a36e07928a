//! # Entistore Core
//!
//! In-process object store for mutable entity graphs.
//!
//! This crate provides:
//! - Primary indices: identity to entity, one per entity type view
//! - Secondary indices: derived keys to entities, kept current on every
//!   put and remove
//! - Association decoupling: removing an entity unlinks it from every
//!   counterpart and cascades into composite parts
//! - Deterministic 12-byte identifiers
//! - Change listeners and snapshots

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod decouple;
mod error;
mod identifier;
mod index;
mod listener;
mod object;
mod schema;
mod snapshot;
mod stats;
mod store;
mod types;
mod value;

pub use config::{StoreConfig, DEFAULT_LISTENER_THREAD_PREFIX};
pub use decouple::DecoupleReport;
pub use error::{CoreError, CoreResult};
pub use identifier::{
    system_time_millis, DecodedIdentifier, GeneratorState, Identifier, IdentifierGenerator,
    IDENTIFIER_HEX_LEN, IDENTIFIER_LEN,
};
pub use index::{
    FieldKey, FnKey, IndexKey, IndexMaintenance, KeyExtractor, PrimaryIndex, SecondaryIndex,
    SecondaryIndexSpec,
};
pub use listener::{ChangeEvent, ChangeType, PrimaryIndexListener};
pub use object::{same_object, AsAny, Object, ObjectRef};
pub use schema::{
    Accessor, Aggregation, AssociationClass, AssociationEnd, Multiplicity, Schema, SchemaBuilder,
    TypeDef,
};
pub use snapshot::{
    EntityCodec, EntityRecord, Resolver, SecondaryIndexRecord, StoreSnapshot, ViewSnapshot,
    SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::EntityStore;
pub use types::{Identity, ListenerId, TypeName};
pub use value::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
