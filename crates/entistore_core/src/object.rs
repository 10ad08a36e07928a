//! Object handles.
//!
//! Everything the store touches (entities as well as association-class nodes)
//! is held through an [`ObjectRef`]. Handles compare and hash by pointer, so
//! two structurally equal objects are still different entities.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Upcast helper implemented for every `'static` type.
pub trait AsAny {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A node of the object graph.
///
/// Implementors use interior mutability for their association fields; the
/// store only ever holds shared handles.
pub trait Object: AsAny + Send + Sync + fmt::Debug {
    /// Name of the concrete type as registered in the schema.
    fn type_name(&self) -> &'static str;
}

/// Shared handle to an [`Object`].
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Object>);

impl ObjectRef {
    /// Wraps a value in a new handle.
    pub fn new<T: Object + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an existing shared value.
    pub fn from_arc(value: Arc<dyn Object>) -> Self {
        Self(value)
    }

    /// Name of the concrete type of the referenced object.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    /// Returns the referenced object if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Object + 'static>(&self) -> Option<&T> {
        <dyn Object as AsAny>::as_any(&*self.0).downcast_ref::<T>()
    }

    /// Returns true if the referenced object is a `T`.
    #[must_use]
    pub fn is<T: Object + 'static>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Returns true if both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    /// Number of live handles to the referenced object.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Returns true if both optional handles refer to the same object, or both
/// are absent.
#[must_use]
pub fn same_object(a: Option<&ObjectRef>, b: Option<&ObjectRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => true,
        _ => false,
    }
}
