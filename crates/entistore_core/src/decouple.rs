//! Association decoupling.
//!
//! When an entity leaves the store (removed, or displaced by a put of a
//! different object under its identity) every association it takes part in
//! is cut on both sides:
//!
//! - plain ends: the counterpart is dropped from the entity's field and the
//!   entity from the counterpart's paired field,
//! - ends with an association class: the edge node is dropped from the
//!   entity's field and from the counterpart's field, and both of the
//!   node's end references are cleared,
//! - composite ends: after unlinking, counterparts of an entity type that
//!   are held by the store are removed from it as well, recursively.
//!
//! Ends are visited in schema order and counterparts in field order, so the
//! traversal is deterministic. Decoupling an entity whose own navigable end
//! is qualified and non-empty fails with `NotImplemented`; that case is
//! rejected by [`Decoupler::check`] before any mutation, for the entity and
//! for every stored composite part the removal would cascade into.
//!
//! The paired end is always consulted to clear the edge node, even when it
//! is not navigable; navigability only decides whether the counterpart's
//! own field is edited.

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectRef;
use crate::schema::AssociationEnd;
use crate::store::EntityStore;
use crate::types::Identity;
use std::collections::HashSet;
use tracing::debug;

/// Outcome of decoupling one entity.
#[derive(Debug, Clone, Default)]
pub struct DecoupleReport {
    /// Number of field entries cleared, on either side.
    pub links_removed: usize,
    /// Composite parts removed from the store, in removal order.
    pub cascaded: Vec<ObjectRef>,
}

impl DecoupleReport {
    /// Returns true if nothing was unlinked or removed.
    pub fn is_empty(&self) -> bool {
        self.links_removed == 0 && self.cascaded.is_empty()
    }
}

pub(crate) struct Decoupler<'a, I: Identity> {
    store: &'a EntityStore<I>,
}

impl<'a, I: Identity> Decoupler<'a, I> {
    pub(crate) fn new(store: &'a EntityStore<I>) -> Self {
        Self { store }
    }

    /// Fails if decoupling `entity`, or any stored composite part a removal
    /// would cascade into, would reach an unsupported end.
    pub(crate) fn check(&self, entity: &ObjectRef) -> CoreResult<()> {
        let mut visited = HashSet::new();
        self.check_reachable(entity, &mut visited)
    }

    fn check_reachable(
        &self,
        entity: &ObjectRef,
        visited: &mut HashSet<ObjectRef>,
    ) -> CoreResult<()> {
        if !visited.insert(entity.clone()) {
            return Ok(());
        }
        for end in self.store.schema().relationship_ends(entity.type_name()) {
            if !end.navigable {
                continue;
            }
            let counterparts = end.accessor.read(entity)?;
            if counterparts.is_empty() {
                continue;
            }
            if end.is_qualified() {
                return Err(qualified_end(end));
            }
            if !end.is_composite() {
                continue;
            }
            for counterpart in counterparts {
                let part = if end.association_class.is_some() {
                    self.node_counterpart(end, &counterpart)?
                } else {
                    Some(counterpart)
                };
                if let Some(part) = part {
                    if self.store.is_entity_type(part.type_name())
                        && self.store.identity_of(&part).is_some()
                    {
                        self.check_reachable(&part, visited)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The object an association-class `node` of `end` connects to, read
    /// through the paired end's class whether or not that end is navigable.
    fn node_counterpart(
        &self,
        end: &AssociationEnd,
        node: &ObjectRef,
    ) -> CoreResult<Option<ObjectRef>> {
        let other_class = self
            .store
            .schema()
            .other_end(end)
            .and_then(|o| o.association_class.as_ref());
        match other_class {
            Some(class) => Ok(class.back.read(node)?.into_iter().next()),
            None => Ok(None),
        }
    }

    pub(crate) fn decouple(&self, entity: &ObjectRef) -> CoreResult<DecoupleReport> {
        let schema = self.store.schema();
        let mut report = DecoupleReport::default();

        for end in schema.relationship_ends(entity.type_name()) {
            if !end.navigable {
                continue;
            }
            let counterparts = end.accessor.read(entity)?;
            if counterparts.is_empty() {
                continue;
            }
            if end.is_qualified() {
                return Err(qualified_end(end));
            }
            debug!(%end, count = counterparts.len(), "decoupling end");

            let other = schema.other_end(end);
            if end.association_class.is_some() {
                for node in counterparts {
                    let counterpart = self.decouple_node(entity, end, other, &node, &mut report)?;
                    if let Some(counterpart) = counterpart {
                        self.cascade(end, &counterpart, &mut report)?;
                    }
                }
            } else {
                for counterpart in counterparts {
                    if end.accessor.detach(entity, &counterpart)? {
                        report.links_removed += 1;
                    }
                    if let Some(other) = other.filter(|o| o.navigable) {
                        if other.accessor.detach(&counterpart, entity)? {
                            report.links_removed += 1;
                        }
                    }
                    self.cascade(end, &counterpart, &mut report)?;
                }
            }
        }
        Ok(report)
    }

    /// Unlinks one association-class node and returns the counterpart it
    /// connected `entity` to.
    fn decouple_node(
        &self,
        entity: &ObjectRef,
        end: &AssociationEnd,
        other: Option<&AssociationEnd>,
        node: &ObjectRef,
        report: &mut DecoupleReport,
    ) -> CoreResult<Option<ObjectRef>> {
        if end.accessor.detach(entity, node)? {
            report.links_removed += 1;
        }

        let counterpart = self.node_counterpart(end, node)?;

        if let (Some(other), Some(counterpart)) = (other.filter(|o| o.navigable), &counterpart) {
            if other.accessor.detach(counterpart, node)? {
                report.links_removed += 1;
            }
        }

        if let Some(class) = &end.association_class {
            if class.back.detach(node, entity)? {
                report.links_removed += 1;
            }
        }
        let other_class = other.and_then(|o| o.association_class.as_ref());
        if let (Some(class), Some(counterpart)) = (other_class, &counterpart) {
            if class.back.detach(node, counterpart)? {
                report.links_removed += 1;
            }
        }
        Ok(counterpart)
    }

    fn cascade(
        &self,
        end: &AssociationEnd,
        counterpart: &ObjectRef,
        report: &mut DecoupleReport,
    ) -> CoreResult<()> {
        if !end.is_composite() || !self.store.is_entity_type(counterpart.type_name()) {
            return Ok(());
        }
        if self.store.remove_entity(counterpart)?.is_some() {
            debug!(%end, part = counterpart.type_name(), "cascaded composite removal");
            report.cascaded.push(counterpart.clone());
        }
        Ok(())
    }
}

fn qualified_end(end: &AssociationEnd) -> CoreError {
    CoreError::not_implemented(format!("decoupling qualified association end {end}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::schema::{Accessor, AssociationEnd, Multiplicity, Schema, TypeDef};
    use parking_lot::Mutex;
    use std::fmt;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Folder {
        files: Mutex<Vec<ObjectRef>>,
        tags: Mutex<Vec<ObjectRef>>,
    }

    impl Object for Folder {
        fn type_name(&self) -> &'static str {
            "Folder"
        }
    }

    #[derive(Debug, Default)]
    struct File {
        folder: Mutex<Option<ObjectRef>>,
    }

    impl Object for File {
        fn type_name(&self) -> &'static str {
            "File"
        }
    }

    #[derive(Debug, Default)]
    struct Tag {
        folders: Mutex<Vec<ObjectRef>>,
    }

    impl Object for Tag {
        fn type_name(&self) -> &'static str {
            "Tag"
        }
    }

    fn remove_from(list: &Mutex<Vec<ObjectRef>>, value: &ObjectRef) -> bool {
        let mut list = list.lock();
        let before = list.len();
        list.retain(|v| !v.ptr_eq(value));
        list.len() != before
    }

    fn schema(qualified_tags: bool) -> Schema {
        let mut tags = AssociationEnd::new(
            "tags",
            "Tag",
            Accessor::many::<Folder, _, _>(|f| f.tags.lock().clone(), |f, v| remove_from(&f.tags, v)),
        )
        .other_end("folders");
        if qualified_tags {
            tags = tags.qualified("label");
        }
        Schema::builder()
            .with_type(
                TypeDef::entity("Folder")
                    .end(
                        AssociationEnd::new(
                            "files",
                            "File",
                            Accessor::many::<Folder, _, _>(
                                |f| f.files.lock().clone(),
                                |f, v| remove_from(&f.files, v),
                            ),
                        )
                        .other_end("folder")
                        .composite(),
                    )
                    .end(tags),
            )
            .with_type(TypeDef::entity("File").end(
                AssociationEnd::new(
                    "folder",
                    "Folder",
                    Accessor::single::<File, _, _>(
                        |f| f.folder.lock().clone(),
                        |f, v| *f.folder.lock() = v,
                    ),
                )
                .other_end("files"),
            ))
            .with_type(TypeDef::entity("Tag").end(
                AssociationEnd::new(
                    "folders",
                    "Folder",
                    Accessor::dynamic(
                        Multiplicity::Many,
                        |t| Ok(t.downcast_ref::<Tag>().map(|t| t.folders.lock().clone()).unwrap_or_default()),
                        |t, v| Ok(t.downcast_ref::<Tag>().is_some_and(|t| remove_from(&t.folders, v))),
                    ),
                )
                .other_end("tags"),
            ))
            .build()
            .unwrap()
    }

    fn link(folder: &ObjectRef, file: &ObjectRef, tag: &ObjectRef) {
        folder.downcast_ref::<Folder>().unwrap().files.lock().push(file.clone());
        folder.downcast_ref::<Folder>().unwrap().tags.lock().push(tag.clone());
        *file.downcast_ref::<File>().unwrap().folder.lock() = Some(folder.clone());
        tag.downcast_ref::<Tag>().unwrap().folders.lock().push(folder.clone());
    }

    fn setup(qualified_tags: bool) -> (Arc<EntityStore<u32>>, ObjectRef, ObjectRef, ObjectRef) {
        let store = EntityStore::new(schema(qualified_tags));
        let folder = ObjectRef::new(Folder::default());
        let file = ObjectRef::new(File::default());
        let tag = ObjectRef::new(Tag::default());
        link(&folder, &file, &tag);
        store.put(1, folder.clone()).unwrap();
        store.put(2, file.clone()).unwrap();
        store.put(3, tag.clone()).unwrap();
        (store, folder, file, tag)
    }

    #[test]
    fn plain_links_are_cut_on_both_sides() {
        let (store, folder, _file, tag) = setup(false);
        let report = store.decouple(&tag).unwrap();
        assert_eq!(report.links_removed, 2);
        assert!(report.cascaded.is_empty());
        assert!(folder.downcast_ref::<Folder>().unwrap().tags.lock().is_empty());
        assert!(tag.downcast_ref::<Tag>().unwrap().folders.lock().is_empty());
    }

    #[test]
    fn composite_parts_cascade() {
        let (store, folder, file, tag) = setup(false);
        assert_eq!(store.remove("Folder", &1).unwrap(), Some(folder.clone()));

        assert!(store.get("File", &2).unwrap().is_none());
        assert!(store.identity_of(&file).is_none());
        assert!(file.downcast_ref::<File>().unwrap().folder.lock().is_none());
        assert!(tag.downcast_ref::<Tag>().unwrap().folders.lock().is_empty());
        // tags are not owned
        assert_eq!(store.get("Tag", &3).unwrap(), Some(tag));
        assert_eq!(store.stats().cascade_removals(), 1);
    }

    #[test]
    fn decoupling_twice_is_a_no_op() {
        let (store, _folder, file, _tag) = setup(false);
        assert!(!store.decouple(&file).unwrap().is_empty());
        assert!(store.decouple(&file).unwrap().is_empty());
    }

    #[test]
    fn qualified_end_fails_before_mutation() {
        let (store, folder, file, _tag) = setup(true);
        let err = store.remove("Folder", &1).unwrap_err();
        assert!(matches!(err, CoreError::NotImplemented { .. }));
        assert_eq!(store.get("Folder", &1).unwrap(), Some(folder.clone()));
        assert_eq!(folder.downcast_ref::<Folder>().unwrap().files.lock().len(), 1);
        assert_eq!(store.get("File", &2).unwrap(), Some(file));
    }

    #[test]
    fn counterparts_qualified_end_is_left_to_its_accessor() {
        // the tag side is plain; the folder side is qualified, but removing
        // the tag only detaches through the folder's accessor
        let (store, folder, _file, tag) = setup(true);
        assert_eq!(store.remove("Tag", &3).unwrap(), Some(tag));
        assert!(folder.downcast_ref::<Folder>().unwrap().tags.lock().is_empty());
    }

    // Owner ◆──[Link]──* Item, where Item does not navigate back.

    #[derive(Default)]
    struct Owner {
        items: Mutex<Vec<ObjectRef>>,
    }

    #[derive(Default)]
    struct Item {
        labels: Mutex<Vec<ObjectRef>>,
    }

    #[derive(Default)]
    struct Link {
        owner: Mutex<Option<ObjectRef>>,
        item: Mutex<Option<ObjectRef>>,
    }

    #[derive(Debug, Default)]
    struct Label;

    impl Object for Owner {
        fn type_name(&self) -> &'static str {
            "Owner"
        }
    }

    impl Object for Item {
        fn type_name(&self) -> &'static str {
            "Item"
        }
    }

    impl Object for Link {
        fn type_name(&self) -> &'static str {
            "Link"
        }
    }

    impl Object for Label {
        fn type_name(&self) -> &'static str {
            "Label"
        }
    }

    impl fmt::Debug for Owner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Owner")
                .field("items", &self.items.lock().len())
                .finish()
        }
    }

    impl fmt::Debug for Item {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Item")
                .field("labels", &self.labels.lock().len())
                .finish()
        }
    }

    impl fmt::Debug for Link {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Link")
                .field("owner", &self.owner.lock().is_some())
                .field("item", &self.item.lock().is_some())
                .finish()
        }
    }

    fn linked_schema(qualified_labels: bool) -> Schema {
        let mut labels = AssociationEnd::new(
            "labels",
            "Label",
            Accessor::many::<Item, _, _>(|i| i.labels.lock().clone(), |i, v| remove_from(&i.labels, v)),
        );
        if qualified_labels {
            labels = labels.qualified("key");
        }
        Schema::builder()
            .with_type(TypeDef::entity("Thing"))
            .with_type(
                TypeDef::entity("Owner").extends("Thing").end(
                    AssociationEnd::new(
                        "items",
                        "Item",
                        Accessor::many::<Owner, _, _>(
                            |o| o.items.lock().clone(),
                            |o, v| remove_from(&o.items, v),
                        ),
                    )
                    .other_end("owners")
                    .composite()
                    .association_class(
                        "Link",
                        Accessor::single::<Link, _, _>(
                            |l| l.owner.lock().clone(),
                            |l, v| *l.owner.lock() = v,
                        ),
                    ),
                ),
            )
            .with_type(
                TypeDef::entity("Item")
                    .end(
                        AssociationEnd::new(
                            "owners",
                            "Owner",
                            Accessor::dynamic(Multiplicity::Many, |_| Ok(Vec::new()), |_, _| Ok(false)),
                        )
                        .other_end("items")
                        .association_class(
                            "Link",
                            Accessor::single::<Link, _, _>(
                                |l| l.item.lock().clone(),
                                |l, v| *l.item.lock() = v,
                            ),
                        )
                        .not_navigable(),
                    )
                    .end(labels),
            )
            .with_type(TypeDef::plain("Link"))
            .with_type(TypeDef::plain("Label"))
            .build()
            .unwrap()
    }

    fn linked(qualified_labels: bool) -> (Arc<EntityStore<u32>>, ObjectRef, ObjectRef, ObjectRef) {
        let store = EntityStore::new(linked_schema(qualified_labels));
        let owner = ObjectRef::new(Owner::default());
        let item = ObjectRef::new(Item::default());
        let link = ObjectRef::new(Link {
            owner: Mutex::new(Some(owner.clone())),
            item: Mutex::new(Some(item.clone())),
        });
        owner.downcast_ref::<Owner>().unwrap().items.lock().push(link.clone());
        store.put(1, owner.clone()).unwrap();
        store.put(2, item.clone()).unwrap();
        (store, owner, item, link)
    }

    #[test]
    fn edge_node_is_cleared_when_the_paired_end_does_not_navigate() {
        let (store, owner, item, link) = linked(false);
        assert_eq!(store.remove("Owner", &1).unwrap(), Some(owner.clone()));

        let link = link.downcast_ref::<Link>().unwrap();
        assert!(link.owner.lock().is_none());
        assert!(link.item.lock().is_none());
        assert!(owner.downcast_ref::<Owner>().unwrap().items.lock().is_empty());
        // the item is owned through the edge
        assert!(store.get("Item", &2).unwrap().is_none());
        assert!(store.identity_of(&item).is_none());
        assert_eq!(store.stats().cascade_removals(), 1);
    }

    #[test]
    fn qualified_end_of_a_composite_part_fails_before_mutation() {
        let (store, owner, item, link) = linked(true);
        item.downcast_ref::<Item>()
            .unwrap()
            .labels
            .lock()
            .push(ObjectRef::new(Label));

        let err = store.remove("Owner", &1).unwrap_err();
        assert!(matches!(err, CoreError::NotImplemented { .. }));
        assert_eq!(store.get("Owner", &1).unwrap(), Some(owner.clone()));
        assert_eq!(store.get("Thing", &1).unwrap(), Some(owner.clone()));
        assert_eq!(store.get("Item", &2).unwrap(), Some(item));
        assert_eq!(owner.downcast_ref::<Owner>().unwrap().items.lock().len(), 1);
        assert!(link.downcast_ref::<Link>().unwrap().owner.lock().is_some());
    }

    #[test]
    fn unstored_composite_part_is_not_checked() {
        let store: Arc<EntityStore<u32>> = EntityStore::new(linked_schema(true));
        let owner = ObjectRef::new(Owner::default());
        let item = ObjectRef::new(Item::default());
        item.downcast_ref::<Item>()
            .unwrap()
            .labels
            .lock()
            .push(ObjectRef::new(Label));
        let link = ObjectRef::new(Link {
            owner: Mutex::new(Some(owner.clone())),
            item: Mutex::new(Some(item.clone())),
        });
        owner.downcast_ref::<Owner>().unwrap().items.lock().push(link.clone());
        store.put(1, owner.clone()).unwrap();

        assert_eq!(store.remove("Owner", &1).unwrap(), Some(owner));
        assert!(link.downcast_ref::<Link>().unwrap().item.lock().is_none());
        assert_eq!(store.stats().cascade_removals(), 0);
    }
}
