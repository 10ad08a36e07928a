//! Primary and secondary indices.
//!
//! - [`PrimaryIndex`]: identity to entity, one per registered type view.
//! - [`SecondaryIndex`]: derived key to entities, following one primary
//!   index and kept in sync by it.
//!
//! Secondary indices are created by the caller, registered with the store
//! under a store-wide unique name, rebuilt from their primary index at
//! registration, and maintained incrementally afterwards.

mod primary;
mod secondary;
mod traits;

pub use primary::PrimaryIndex;
pub use secondary::SecondaryIndex;
pub use traits::{FieldKey, FnKey, IndexKey, IndexMaintenance, KeyExtractor, SecondaryIndexSpec};
