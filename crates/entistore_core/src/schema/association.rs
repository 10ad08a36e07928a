//! Association ends and their accessors.

use crate::error::{CoreError, CoreResult};
use crate::object::{Object, ObjectRef};
use crate::types::TypeName;
use std::fmt;
use std::sync::Arc;

/// How many counterparts an end can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    /// A single optional reference.
    One,
    /// A collection of references.
    Many,
}

/// Ownership semantics of an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Aggregation {
    /// Plain association; removal only unlinks.
    #[default]
    Plain,
    /// The owner of this end owns its counterparts; removal cascades.
    Composite,
}

type ReadFn = dyn Fn(&ObjectRef) -> CoreResult<Vec<ObjectRef>> + Send + Sync;
type DetachFn = dyn Fn(&ObjectRef, &ObjectRef) -> CoreResult<bool> + Send + Sync;

/// Read/write capability over one association field.
///
/// `read` returns the current counterparts in field order. `detach` removes
/// one counterpart (by handle identity) and reports whether it was present.
#[derive(Clone)]
pub struct Accessor {
    multiplicity: Multiplicity,
    read: Arc<ReadFn>,
    detach: Arc<DetachFn>,
}

impl Accessor {
    /// Accessor over a single optional reference held by a `T`.
    pub fn single<T, G, S>(get: G, set: S) -> Self
    where
        T: Object + 'static,
        G: Fn(&T) -> Option<ObjectRef> + Send + Sync + 'static,
        S: Fn(&T, Option<ObjectRef>) + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let get_for_detach = Arc::clone(&get);
        Self {
            multiplicity: Multiplicity::One,
            read: Arc::new(move |owner| Ok(get(downcast::<T>(owner)?).into_iter().collect())),
            detach: Arc::new(move |owner, value| {
                let owner = downcast::<T>(owner)?;
                match get_for_detach(owner) {
                    Some(current) if current.ptr_eq(value) => {
                        set(owner, None);
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }),
        }
    }

    /// Accessor over a collection of references held by a `T`.
    ///
    /// `remove` must drop the given handle from the collection and return
    /// whether it was there.
    pub fn many<T, G, R>(get: G, remove: R) -> Self
    where
        T: Object + 'static,
        G: Fn(&T) -> Vec<ObjectRef> + Send + Sync + 'static,
        R: Fn(&T, &ObjectRef) -> bool + Send + Sync + 'static,
    {
        Self {
            multiplicity: Multiplicity::Many,
            read: Arc::new(move |owner| Ok(get(downcast::<T>(owner)?))),
            detach: Arc::new(move |owner, value| Ok(remove(downcast::<T>(owner)?, value))),
        }
    }

    /// Accessor built from untyped closures.
    ///
    /// Used for fields whose shape the typed constructors cannot express,
    /// such as qualified (keyed) collections.
    pub fn dynamic<R, D>(multiplicity: Multiplicity, read: R, detach: D) -> Self
    where
        R: Fn(&ObjectRef) -> CoreResult<Vec<ObjectRef>> + Send + Sync + 'static,
        D: Fn(&ObjectRef, &ObjectRef) -> CoreResult<bool> + Send + Sync + 'static,
    {
        Self {
            multiplicity,
            read: Arc::new(read),
            detach: Arc::new(detach),
        }
    }

    /// Multiplicity of the field.
    #[must_use]
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// Current counterparts of `owner`.
    pub fn read(&self, owner: &ObjectRef) -> CoreResult<Vec<ObjectRef>> {
        (self.read)(owner)
    }

    /// Removes `value` from `owner`'s field.
    pub fn detach(&self, owner: &ObjectRef, value: &ObjectRef) -> CoreResult<bool> {
        (self.detach)(owner, value)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("multiplicity", &self.multiplicity)
            .finish_non_exhaustive()
    }
}

fn downcast<T: Object + 'static>(owner: &ObjectRef) -> CoreResult<&T> {
    owner
        .downcast_ref::<T>()
        .ok_or_else(|| CoreError::NotViewableAs {
            type_name: owner.type_name().to_string(),
            view: std::any::type_name::<T>().to_string(),
        })
}

/// The edge object of an association that carries attributes.
///
/// `back` reads the node field that points at the owner of the end this
/// class is attached to.
#[derive(Debug, Clone)]
pub struct AssociationClass {
    /// Type of the edge object.
    pub node_type: TypeName,
    /// Node field referencing this end's owner.
    pub back: Accessor,
}

/// One navigable direction of a binary association.
#[derive(Debug, Clone)]
pub struct AssociationEnd {
    /// Field name on the owner.
    pub name: String,
    /// Type declaring the end. Filled in by [`TypeDef::end`](super::TypeDef::end).
    pub owner: TypeName,
    /// Type at the far side of the association.
    pub other_type: TypeName,
    /// Name of the paired end on `other_type`; `None` if that side does not
    /// navigate back.
    pub other_end: Option<String>,
    /// Ownership semantics.
    pub aggregation: Aggregation,
    /// Whether the owner navigates this end.
    pub navigable: bool,
    /// Edge object, if the association carries attributes.
    pub association_class: Option<AssociationClass>,
    /// Qualifier key name for keyed associations.
    pub qualifier: Option<String>,
    /// Field capability.
    pub accessor: Accessor,
}

impl AssociationEnd {
    /// Creates a plain navigable end.
    pub fn new(name: impl Into<String>, other_type: impl Into<TypeName>, accessor: Accessor) -> Self {
        Self {
            name: name.into(),
            owner: TypeName::new(""),
            other_type: other_type.into(),
            other_end: None,
            aggregation: Aggregation::Plain,
            navigable: true,
            association_class: None,
            qualifier: None,
            accessor,
        }
    }

    /// Pairs this end with `name` on the other type.
    #[must_use]
    pub fn other_end(mut self, name: impl Into<String>) -> Self {
        self.other_end = Some(name.into());
        self
    }

    /// Marks the owner of this end as owning its counterparts.
    #[must_use]
    pub fn composite(mut self) -> Self {
        self.aggregation = Aggregation::Composite;
        self
    }

    /// Attaches an association class.
    #[must_use]
    pub fn association_class(mut self, node_type: impl Into<TypeName>, back: Accessor) -> Self {
        self.association_class = Some(AssociationClass {
            node_type: node_type.into(),
            back,
        });
        self
    }

    /// Marks the end as keyed by `qualifier`.
    #[must_use]
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Marks the end as not navigable from its owner.
    #[must_use]
    pub fn not_navigable(mut self) -> Self {
        self.navigable = false;
        self
    }

    /// Multiplicity of the end.
    #[must_use]
    pub fn multiplicity(&self) -> Multiplicity {
        self.accessor.multiplicity()
    }

    /// Returns true if removal of the owner cascades to counterparts.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.aggregation == Aggregation::Composite
    }

    /// Returns true if the end is keyed.
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }
}

impl fmt::Display for AssociationEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} -> {}", self.owner, self.name, self.other_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Node {
        next: Mutex<Option<ObjectRef>>,
        children: Mutex<Vec<ObjectRef>>,
    }

    impl Object for Node {
        fn type_name(&self) -> &'static str {
            "Node"
        }
    }

    fn next_accessor() -> Accessor {
        Accessor::single::<Node, _, _>(|n| n.next.lock().clone(), |n, v| *n.next.lock() = v)
    }

    fn children_accessor() -> Accessor {
        Accessor::many::<Node, _, _>(
            |n| n.children.lock().clone(),
            |n, v| {
                let mut children = n.children.lock();
                let before = children.len();
                children.retain(|c| !c.ptr_eq(v));
                children.len() != before
            },
        )
    }

    #[test]
    fn single_detach_only_matching_value() {
        let a = ObjectRef::new(Node::default());
        let b = ObjectRef::new(Node::default());
        let c = ObjectRef::new(Node::default());
        *a.downcast_ref::<Node>().unwrap().next.lock() = Some(b.clone());

        let accessor = next_accessor();
        assert_eq!(accessor.multiplicity(), Multiplicity::One);
        assert_eq!(accessor.read(&a).unwrap(), vec![b.clone()]);
        assert!(!accessor.detach(&a, &c).unwrap());
        assert!(accessor.detach(&a, &b).unwrap());
        assert!(accessor.read(&a).unwrap().is_empty());
    }

    #[test]
    fn many_detach() {
        let a = ObjectRef::new(Node::default());
        let b = ObjectRef::new(Node::default());
        let c = ObjectRef::new(Node::default());
        a.downcast_ref::<Node>()
            .unwrap()
            .children
            .lock()
            .extend([b.clone(), c.clone()]);

        let accessor = children_accessor();
        assert!(accessor.detach(&a, &b).unwrap());
        assert!(!accessor.detach(&a, &b).unwrap());
        assert_eq!(accessor.read(&a).unwrap(), vec![c]);
    }

    #[derive(Debug)]
    struct Stranger;

    impl Object for Stranger {
        fn type_name(&self) -> &'static str {
            "Stranger"
        }
    }

    #[test]
    fn wrong_owner_type_is_rejected() {
        let stranger = ObjectRef::new(Stranger);
        let err = next_accessor().read(&stranger).unwrap_err();
        assert!(matches!(err, CoreError::NotViewableAs { .. }));
    }

    #[test]
    fn end_builder() {
        let end = AssociationEnd::new("children", "Node", children_accessor())
            .other_end("parent")
            .composite()
            .qualified("slot");
        assert!(end.is_composite());
        assert!(end.is_qualified());
        assert!(end.navigable);
        assert_eq!(end.multiplicity(), Multiplicity::Many);
        assert_eq!(end.other_end.as_deref(), Some("parent"));
    }
}
