//! Index traits and key types.

use crate::error::CoreResult;
use crate::identifier::Identifier;
use crate::object::{Object, ObjectRef};
use crate::types::TypeName;
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// A key that can be indexed.
///
/// Keys are ordered (secondary indices iterate in key order) and must be
/// constructible from lookup parameters.
pub trait IndexKey: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {
    /// Builds a key from one lookup value, if the value has the right shape.
    fn from_value(value: &Value) -> Option<Self>;
}

impl IndexKey for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer()
    }
}

impl IndexKey for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl IndexKey for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl IndexKey for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }
}

impl IndexKey for Identifier {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(bytes) => Identifier::from_slice(bytes),
            Value::Text(hex) => Identifier::parse_hex(hex).ok(),
            _ => None,
        }
    }
}

/// Absent attributes index under `None`; a null parameter looks them up.
impl<K: IndexKey> IndexKey for Option<K> {
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            K::from_value(value).map(Some)
        }
    }
}

/// Derives secondary keys from entities and from lookup parameters.
///
/// Both methods must map into the same key space: for every entity `e`
/// with key `k`, some parameter list yields `k`.
pub trait KeyExtractor<K>: Send + Sync {
    /// Projects the key of an entity.
    fn key_of(&self, entity: &ObjectRef) -> CoreResult<K>;

    /// Builds a key from lookup parameters. The error describes the
    /// mismatch.
    fn key_from(&self, params: &[Value]) -> Result<K, String>;
}

/// Indexes one attribute of one concrete entity type.
///
/// Lookups take exactly one parameter of the key's shape.
pub struct FieldKey<T, K, F> {
    field: String,
    project: F,
    _marker: PhantomData<fn(&T) -> K>,
}

impl<T, K, F> FieldKey<T, K, F>
where
    T: Object,
    K: IndexKey,
    F: Fn(&T) -> K + Send + Sync,
{
    /// Creates a field key named `field` projecting with `project`.
    pub fn new(field: impl Into<String>, project: F) -> Self {
        Self {
            field: field.into(),
            project,
            _marker: PhantomData,
        }
    }
}

impl<T, K, F> KeyExtractor<K> for FieldKey<T, K, F>
where
    T: Object + 'static,
    K: IndexKey,
    F: Fn(&T) -> K + Send + Sync,
{
    fn key_of(&self, entity: &ObjectRef) -> CoreResult<K> {
        let typed = entity
            .downcast_ref::<T>()
            .ok_or_else(|| crate::error::CoreError::NotViewableAs {
                type_name: entity.type_name().to_string(),
                view: std::any::type_name::<T>().to_string(),
            })?;
        Ok((self.project)(typed))
    }

    fn key_from(&self, params: &[Value]) -> Result<K, String> {
        match params {
            [value] => K::from_value(value).ok_or_else(|| {
                format!(
                    "{} parameter does not fit field {}",
                    value.kind(),
                    self.field
                )
            }),
            _ => Err(format!(
                "field {} takes exactly 1 parameter, got {}",
                self.field,
                params.len()
            )),
        }
    }
}

type KeyOfFn<K> = dyn Fn(&ObjectRef) -> CoreResult<K> + Send + Sync;
type KeyFromFn<K> = dyn Fn(&[Value]) -> Result<K, String> + Send + Sync;

/// Key extractor built from two closures.
///
/// Useful for indices over supertype views holding several concrete types,
/// and for keys combining more than one attribute.
pub struct FnKey<K> {
    key_of: Box<KeyOfFn<K>>,
    key_from: Box<KeyFromFn<K>>,
}

impl<K> FnKey<K> {
    /// Creates an extractor from its two projections.
    pub fn new<A, B>(key_of: A, key_from: B) -> Self
    where
        A: Fn(&ObjectRef) -> CoreResult<K> + Send + Sync + 'static,
        B: Fn(&[Value]) -> Result<K, String> + Send + Sync + 'static,
    {
        Self {
            key_of: Box::new(key_of),
            key_from: Box::new(key_from),
        }
    }
}

impl<K> KeyExtractor<K> for FnKey<K> {
    fn key_of(&self, entity: &ObjectRef) -> CoreResult<K> {
        (self.key_of)(entity)
    }

    fn key_from(&self, params: &[Value]) -> Result<K, String> {
        (self.key_from)(params)
    }
}

/// Specification of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryIndexSpec {
    /// Primary index view the secondary index follows.
    pub entity_type: TypeName,
    /// Store-wide unique name.
    pub name: String,
    /// Whether removing an entity the index does not hold is logged.
    pub strict: bool,
}

impl SecondaryIndexSpec {
    /// Creates a new index specification.
    pub fn new(entity_type: impl Into<TypeName>, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            strict: false,
        }
    }

    /// Makes removal of unknown entities log an inconsistency.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Type-erased maintenance interface of a secondary index.
///
/// Primary indices drive their secondary indices through this trait.
pub trait IndexMaintenance: Send + Sync {
    /// Name of the index.
    fn name(&self) -> &str;

    /// View the index follows.
    fn entity_type(&self) -> &TypeName;

    /// Checks that an entity's key can be extracted, without mutating.
    fn check_insert(&self, entity: &ObjectRef) -> CoreResult<()>;

    /// Inserts an entity under its current key.
    fn insert_entity(&self, entity: &ObjectRef) -> CoreResult<()>;

    /// Removes an entity from the key-set it occupies.
    fn remove_entity(&self, entity: &ObjectRef) -> bool;

    /// Rebuilds the index from its primary index.
    fn reconstruct(&self) -> CoreResult<()>;

    /// Number of indexed entities.
    fn len(&self) -> usize;

    /// Returns true if the index holds no entities.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct keys.
    fn key_count(&self) -> usize;

    /// Upcast used to recover the concrete index type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
