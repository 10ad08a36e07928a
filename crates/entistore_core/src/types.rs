//! Core type definitions for entistore.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

/// Identity of an entity within a store.
///
/// Identities must be ordered (primary indices iterate in identity order)
/// and hashable. Every type satisfying the bounds is an identity.
pub trait Identity: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

impl<T> Identity for T where T: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

/// Name of a type known to the schema.
///
/// Type names key primary indices, association ends and the type-closure
/// cache. They are stable across snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// Creates a new type name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TypeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for TypeName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TypeName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Handle of a listener registered on a primary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl ListenerId {
    /// Creates a new listener ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn type_name_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(TypeName::from("Human"), 1);
        assert_eq!(map.get("Human"), Some(&1));
        assert_eq!(TypeName::new("Human"), "Human");
    }

    #[test]
    fn listener_id_display() {
        assert_eq!(format!("{}", ListenerId::new(7)), "listener:7");
    }

    #[test]
    fn identity_blanket_impl() {
        fn assert_identity<I: Identity>() {}
        assert_identity::<u64>();
        assert_identity::<String>();
        assert_identity::<crate::Identifier>();
    }
}
