//! Relationship-descriptor table.
//!
//! The schema declares, per type:
//!
//! - whether the type is an entity type (eligible for a primary index),
//! - the supertypes it can be viewed as,
//! - its association ends, with read/write accessors.
//!
//! The store and the decoupler consume only this table.

mod association;

pub use association::{Accessor, Aggregation, AssociationClass, AssociationEnd, Multiplicity};

use crate::error::{CoreError, CoreResult};
use crate::types::TypeName;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Declaration of one type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: TypeName,
    entity: bool,
    extends: Vec<TypeName>,
    ends: Vec<AssociationEnd>,
}

impl TypeDef {
    /// Declares an entity type.
    pub fn entity(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            entity: true,
            extends: Vec::new(),
            ends: Vec::new(),
        }
    }

    /// Declares a type that is not an entity type (association classes,
    /// composite parts, abstract supertypes).
    pub fn plain(name: impl Into<TypeName>) -> Self {
        Self {
            entity: false,
            ..Self::entity(name)
        }
    }

    /// Adds a supertype this type can be viewed as.
    #[must_use]
    pub fn extends(mut self, supertype: impl Into<TypeName>) -> Self {
        self.extends.push(supertype.into());
        self
    }

    /// Adds an association end owned by this type.
    #[must_use]
    pub fn end(mut self, mut end: AssociationEnd) -> Self {
        end.owner = self.name.clone();
        self.ends.push(end);
        self
    }

    /// Name of the type.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// Returns true if the type is declared as an entity type.
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.entity
    }

    /// Direct supertypes, in declaration order.
    #[must_use]
    pub fn supertypes(&self) -> &[TypeName] {
        &self.extends
    }

    /// Ends declared directly on this type.
    #[must_use]
    pub fn own_ends(&self) -> &[AssociationEnd] {
        &self.ends
    }
}

/// Builder for a [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: BTreeMap<TypeName, TypeDef>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type declaration, replacing any earlier one of the same name.
    #[must_use]
    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.types.insert(def.name.clone(), def);
        self
    }

    /// Validates the declarations and builds the schema.
    ///
    /// Every supertype, counterpart type and association-class type must be
    /// declared, and every named other end must exist on its type.
    pub fn build(self) -> CoreResult<Schema> {
        let schema = Schema { types: self.types };
        for def in schema.types.values() {
            for supertype in &def.extends {
                if !schema.types.contains_key(supertype) {
                    return Err(CoreError::not_registered(supertype.as_str()));
                }
            }
            for end in &def.ends {
                if !schema.types.contains_key(&end.other_type) {
                    return Err(CoreError::not_registered(end.other_type.as_str()));
                }
                if let Some(class) = &end.association_class {
                    if !schema.types.contains_key(&class.node_type) {
                        return Err(CoreError::not_registered(class.node_type.as_str()));
                    }
                }
                if let Some(other) = &end.other_end {
                    if schema.find_end(end.other_type.as_str(), other).is_none() {
                        return Err(CoreError::UnknownAssociationEnd {
                            type_name: end.other_type.to_string(),
                            end: other.clone(),
                        });
                    }
                }
            }
        }
        Ok(schema)
    }
}

/// Validated relationship-descriptor table.
#[derive(Debug, Default)]
pub struct Schema {
    types: BTreeMap<TypeName, TypeDef>,
}

impl Schema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Returns the declaration of `type_name`.
    #[must_use]
    pub fn type_def(&self, type_name: &str) -> Option<&TypeDef> {
        self.types.get(type_name)
    }

    /// Returns true if `type_name` is declared as an entity type.
    #[must_use]
    pub fn is_entity_type(&self, type_name: &str) -> bool {
        self.types.get(type_name).is_some_and(TypeDef::is_entity)
    }

    /// All declared type names, in name order.
    pub fn type_names(&self) -> impl Iterator<Item = &TypeName> {
        self.types.keys()
    }

    /// `type_name` followed by its transitive supertypes, breadth first,
    /// each listed once.
    ///
    /// Undeclared types yield just themselves.
    #[must_use]
    pub fn ancestors(&self, type_name: &str) -> Vec<TypeName> {
        let mut out = vec![TypeName::new(type_name)];
        let mut seen: HashSet<TypeName> = out.iter().cloned().collect();
        let mut queue = VecDeque::from([TypeName::new(type_name)]);
        while let Some(current) = queue.pop_front() {
            let Some(def) = self.types.get(&current) else {
                continue;
            };
            for supertype in &def.extends {
                if seen.insert(supertype.clone()) {
                    out.push(supertype.clone());
                    queue.push_back(supertype.clone());
                }
            }
        }
        out
    }

    /// Association ends of `type_name`: its own ends first, then inherited
    /// ones in supertype order. An inherited end hidden by a nearer end of
    /// the same name is skipped.
    #[must_use]
    pub fn relationship_ends(&self, type_name: &str) -> Vec<&AssociationEnd> {
        let mut names = HashSet::new();
        let mut ends = Vec::new();
        for ancestor in self.ancestors(type_name) {
            if let Some(def) = self.types.get(&ancestor) {
                for end in &def.ends {
                    if names.insert(end.name.as_str()) {
                        ends.push(end);
                    }
                }
            }
        }
        ends
    }

    /// Looks up the end `name` visible on `type_name`, inherited ends
    /// included.
    #[must_use]
    pub fn find_end(&self, type_name: &str, name: &str) -> Option<&AssociationEnd> {
        self.relationship_ends(type_name)
            .into_iter()
            .find(|end| end.name == name)
    }

    /// The end paired with `end`, navigable or not.
    #[must_use]
    pub fn other_end(&self, end: &AssociationEnd) -> Option<&AssociationEnd> {
        end.other_end
            .as_deref()
            .and_then(|name| self.find_end(end.other_type.as_str(), name))
    }
}
