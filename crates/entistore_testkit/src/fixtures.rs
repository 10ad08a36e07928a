//! Test domain and store helpers.
//!
//! A small HR domain exercising every kind of association the decoupler
//! handles:
//!
//! ```text
//! Identifiable
//!   └─ LegalPerson
//!        ├─ Human          (registered at runtime, not declared an entity)
//!        └─ Organization
//!
//! Human.employments *──[Employment]──* Organization.employees
//! Human.children    *────────────────* Human.parents
//! Human.contact_information ◆── ContactInformation   (composite, not an entity)
//! Department.teams  ◆────────────────1 Team.department (composite)
//! ```

use entistore_core::{
    Accessor, AssociationEnd, CoreError, EntityStore, FieldKey, FnKey, IndexKey, Object, ObjectRef,
    PrimaryIndexListener, Schema, SecondaryIndex, SecondaryIndexSpec, TypeDef, Value,
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identity type of the test domain.
pub type Id = i64;

/// Store over the test domain.
pub type DomainStore = EntityStore<Id>;

fn remove_ref(list: &Mutex<Vec<ObjectRef>>, value: &ObjectRef) -> bool {
    let mut list = list.lock();
    let before = list.len();
    list.retain(|v| !v.ptr_eq(value));
    list.len() != before
}

fn short(entity: &Option<ObjectRef>) -> &'static str {
    entity.as_ref().map_or("-", ObjectRef::type_name)
}

// ============================================================================
// Human
// ============================================================================

/// A natural person.
pub struct Human {
    name: RwLock<String>,
    first_name: RwLock<String>,
    nick_name: RwLock<String>,
    last_name: RwLock<String>,
    employments: Mutex<Vec<ObjectRef>>,
    children: Mutex<Vec<ObjectRef>>,
    parents: Mutex<Vec<ObjectRef>>,
    contact_information: Mutex<Option<ObjectRef>>,
}

impl Human {
    /// Creates an unlinked human.
    pub fn new(
        name: impl Into<String>,
        first_name: impl Into<String>,
        nick_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            name: RwLock::new(name.into()),
            first_name: RwLock::new(first_name.into()),
            nick_name: RwLock::new(nick_name.into()),
            last_name: RwLock::new(last_name.into()),
            employments: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            parents: Mutex::new(Vec::new()),
            contact_information: Mutex::new(None),
        }
    }

    /// Creates a human and wraps it in a handle.
    pub fn create(name: &str, first_name: &str, nick_name: &str, last_name: &str) -> ObjectRef {
        ObjectRef::new(Self::new(name, first_name, nick_name, last_name))
    }

    /// Views `entity` as a human.
    pub fn of(entity: &ObjectRef) -> &Human {
        entity.downcast_ref::<Human>().expect("entity is not a Human")
    }

    /// Full name.
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// First name.
    pub fn first_name(&self) -> String {
        self.first_name.read().clone()
    }

    /// Nick name.
    pub fn nick_name(&self) -> String {
        self.nick_name.read().clone()
    }

    /// Last name.
    pub fn last_name(&self) -> String {
        self.last_name.read().clone()
    }

    /// Changes the last name. Indices pick this up on the next put.
    pub fn set_last_name(&self, last_name: impl Into<String>) {
        *self.last_name.write() = last_name.into();
    }

    /// Employment edges.
    pub fn employments(&self) -> Vec<ObjectRef> {
        self.employments.lock().clone()
    }

    /// Children.
    pub fn children(&self) -> Vec<ObjectRef> {
        self.children.lock().clone()
    }

    /// Parents.
    pub fn parents(&self) -> Vec<ObjectRef> {
        self.parents.lock().clone()
    }

    /// Owned contact information.
    pub fn contact_information(&self) -> Option<ObjectRef> {
        self.contact_information.lock().clone()
    }

    /// Replaces the contact information.
    pub fn set_contact_information(&self, info: Option<ObjectRef>) {
        *self.contact_information.lock() = info;
    }

    /// Links `parent` and `child` on both sides.
    pub fn adopt(parent: &ObjectRef, child: &ObjectRef) {
        Human::of(parent).children.lock().push(child.clone());
        Human::of(child).parents.lock().push(parent.clone());
    }

    pub(crate) fn push_employment(&self, node: ObjectRef) {
        self.employments.lock().push(node);
    }

    pub(crate) fn push_child(&self, child: ObjectRef) {
        self.children.lock().push(child);
    }

    pub(crate) fn push_parent(&self, parent: ObjectRef) {
        self.parents.lock().push(parent);
    }
}

impl Object for Human {
    fn type_name(&self) -> &'static str {
        "Human"
    }
}

impl fmt::Debug for Human {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Human")
            .field("name", &*self.name.read())
            .field("last_name", &*self.last_name.read())
            .field("employments", &self.employments.lock().len())
            .field("children", &self.children.lock().len())
            .field("parents", &self.parents.lock().len())
            .field("contact_information", &short(&self.contact_information.lock()))
            .finish()
    }
}

// ============================================================================
// Organization
// ============================================================================

/// A juridical person.
pub struct Organization {
    name: RwLock<String>,
    employees: Mutex<Vec<ObjectRef>>,
}

impl Organization {
    /// Creates an organization without employees.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: RwLock::new(name.into()),
            employees: Mutex::new(Vec::new()),
        }
    }

    /// Creates an organization and wraps it in a handle.
    pub fn create(name: &str) -> ObjectRef {
        ObjectRef::new(Self::new(name))
    }

    /// Views `entity` as an organization.
    pub fn of(entity: &ObjectRef) -> &Organization {
        entity
            .downcast_ref::<Organization>()
            .expect("entity is not an Organization")
    }

    /// Name.
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// Employment edges.
    pub fn employees(&self) -> Vec<ObjectRef> {
        self.employees.lock().clone()
    }
}

impl Object for Organization {
    fn type_name(&self) -> &'static str {
        "Organization"
    }
}

impl fmt::Debug for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Organization")
            .field("name", &*self.name.read())
            .field("employees", &self.employees.lock().len())
            .finish()
    }
}

// ============================================================================
// Employment
// ============================================================================

/// Association class between a human and an organization.
pub struct Employment {
    title: String,
    employee: Mutex<Option<ObjectRef>>,
    employer: Mutex<Option<ObjectRef>>,
}

impl Employment {
    /// Creates an employment edge and links it into both ends.
    pub fn link(title: &str, employee: &ObjectRef, employer: &ObjectRef) -> ObjectRef {
        let node = ObjectRef::new(Self {
            title: title.to_string(),
            employee: Mutex::new(Some(employee.clone())),
            employer: Mutex::new(Some(employer.clone())),
        });
        Human::of(employee).push_employment(node.clone());
        Organization::of(employer).employees.lock().push(node.clone());
        node
    }

    /// Views `node` as an employment.
    pub fn of(node: &ObjectRef) -> &Employment {
        node.downcast_ref::<Employment>().expect("node is not an Employment")
    }

    /// Job title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The employed human, if still linked.
    pub fn employee(&self) -> Option<ObjectRef> {
        self.employee.lock().clone()
    }

    /// The employing organization, if still linked.
    pub fn employer(&self) -> Option<ObjectRef> {
        self.employer.lock().clone()
    }
}

impl Object for Employment {
    fn type_name(&self) -> &'static str {
        "Employment"
    }
}

impl fmt::Debug for Employment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Employment")
            .field("title", &self.title)
            .field("employee", &short(&self.employee.lock()))
            .field("employer", &short(&self.employer.lock()))
            .finish()
    }
}

// ============================================================================
// ContactInformation
// ============================================================================

/// Contact details owned by a human. Not an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactInformation {
    /// Email address.
    pub email: String,
    /// Phone number.
    pub phone: String,
}

impl ContactInformation {
    /// Creates contact details and attaches them to `owner`.
    pub fn attach(owner: &ObjectRef, email: &str, phone: &str) -> ObjectRef {
        let info = ObjectRef::new(Self {
            email: email.to_string(),
            phone: phone.to_string(),
        });
        Human::of(owner).set_contact_information(Some(info.clone()));
        info
    }
}

impl Object for ContactInformation {
    fn type_name(&self) -> &'static str {
        "ContactInformation"
    }
}

// ============================================================================
// Department / Team
// ============================================================================

/// A department composed of teams.
pub struct Department {
    name: String,
    teams: Mutex<Vec<ObjectRef>>,
}

impl Department {
    /// Creates an empty department.
    pub fn create(name: &str) -> ObjectRef {
        ObjectRef::new(Self {
            name: name.to_string(),
            teams: Mutex::new(Vec::new()),
        })
    }

    /// Views `entity` as a department.
    pub fn of(entity: &ObjectRef) -> &Department {
        entity.downcast_ref::<Department>().expect("entity is not a Department")
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owned teams.
    pub fn teams(&self) -> Vec<ObjectRef> {
        self.teams.lock().clone()
    }

    pub(crate) fn push_team(&self, team: ObjectRef) {
        self.teams.lock().push(team);
    }
}

impl Object for Department {
    fn type_name(&self) -> &'static str {
        "Department"
    }
}

impl fmt::Debug for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Department")
            .field("name", &self.name)
            .field("teams", &self.teams.lock().len())
            .finish()
    }
}

/// A team, part of exactly one department.
pub struct Team {
    name: String,
    department: Mutex<Option<ObjectRef>>,
}

impl Team {
    /// Creates a team and links it into `department`.
    pub fn create(name: &str, department: &ObjectRef) -> ObjectRef {
        let team = Self::detached(name);
        Team::of(&team).set_department(Some(department.clone()));
        Department::of(department).push_team(team.clone());
        team
    }

    pub(crate) fn detached(name: &str) -> ObjectRef {
        ObjectRef::new(Self {
            name: name.to_string(),
            department: Mutex::new(None),
        })
    }

    /// Views `entity` as a team.
    pub fn of(entity: &ObjectRef) -> &Team {
        entity.downcast_ref::<Team>().expect("entity is not a Team")
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning department, if linked.
    pub fn department(&self) -> Option<ObjectRef> {
        self.department.lock().clone()
    }

    pub(crate) fn set_department(&self, department: Option<ObjectRef>) {
        *self.department.lock() = department;
    }
}

impl Object for Team {
    fn type_name(&self) -> &'static str {
        "Team"
    }
}

impl fmt::Debug for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Team")
            .field("name", &self.name)
            .field("department", &short(&self.department.lock()))
            .finish()
    }
}

// ============================================================================
// Schema and store
// ============================================================================

/// Name of any legal person, or `None` for other types.
pub fn legal_person_name(entity: &ObjectRef) -> Option<String> {
    if let Some(human) = entity.downcast_ref::<Human>() {
        Some(human.name())
    } else {
        entity.downcast_ref::<Organization>().map(Organization::name)
    }
}

/// Relationship-descriptor table of the test domain.
pub fn domain_schema() -> Schema {
    Schema::builder()
        .with_type(TypeDef::entity("Identifiable"))
        .with_type(TypeDef::entity("LegalPerson").extends("Identifiable"))
        .with_type(
            TypeDef::plain("Human")
                .extends("LegalPerson")
                .end(
                    AssociationEnd::new(
                        "employments",
                        "Organization",
                        Accessor::many::<Human, _, _>(Human::employments, |h, v| {
                            remove_ref(&h.employments, v)
                        }),
                    )
                    .other_end("employees")
                    .association_class(
                        "Employment",
                        Accessor::single::<Employment, _, _>(Employment::employee, |e, v| {
                            *e.employee.lock() = v
                        }),
                    ),
                )
                .end(
                    AssociationEnd::new(
                        "children",
                        "Human",
                        Accessor::many::<Human, _, _>(Human::children, |h, v| {
                            remove_ref(&h.children, v)
                        }),
                    )
                    .other_end("parents"),
                )
                .end(
                    AssociationEnd::new(
                        "parents",
                        "Human",
                        Accessor::many::<Human, _, _>(Human::parents, |h, v| {
                            remove_ref(&h.parents, v)
                        }),
                    )
                    .other_end("children"),
                )
                .end(
                    AssociationEnd::new(
                        "contact_information",
                        "ContactInformation",
                        Accessor::single::<Human, _, _>(Human::contact_information, |h, v| {
                            h.set_contact_information(v)
                        }),
                    )
                    .composite(),
                ),
        )
        .with_type(
            TypeDef::entity("Organization").extends("LegalPerson").end(
                AssociationEnd::new(
                    "employees",
                    "Human",
                    Accessor::many::<Organization, _, _>(Organization::employees, |o, v| {
                        remove_ref(&o.employees, v)
                    }),
                )
                .other_end("employments")
                .association_class(
                    "Employment",
                    Accessor::single::<Employment, _, _>(Employment::employer, |e, v| {
                        *e.employer.lock() = v
                    }),
                ),
            ),
        )
        .with_type(TypeDef::plain("Employment"))
        .with_type(TypeDef::plain("ContactInformation"))
        .with_type(
            TypeDef::entity("Department").end(
                AssociationEnd::new(
                    "teams",
                    "Team",
                    Accessor::many::<Department, _, _>(Department::teams, |d, v| {
                        remove_ref(&d.teams, v)
                    }),
                )
                .other_end("department")
                .composite(),
            ),
        )
        .with_type(
            TypeDef::entity("Team").end(
                AssociationEnd::new(
                    "department",
                    "Department",
                    Accessor::single::<Team, _, _>(Team::department, |t, v| t.set_department(v)),
                )
                .other_end("teams"),
            ),
        )
        .build()
        .expect("test domain schema is valid")
}

/// A store over [`domain_schema`] with `Human` allow-listed and the
/// primary index of every entity type created.
pub fn domain_store() -> Arc<DomainStore> {
    let store = EntityStore::new(domain_schema());
    store.register_type("Human");
    for entity_type in [
        "Identifiable",
        "LegalPerson",
        "Human",
        "Organization",
        "Department",
        "Team",
    ] {
        store
            .get_or_create_primary_index(entity_type)
            .expect("entity type is registered");
    }
    store
}

/// Legal persons by full name, over the `LegalPerson` view.
pub fn legal_persons_by_name() -> SecondaryIndex<Id, String> {
    SecondaryIndex::new(
        SecondaryIndexSpec::new("LegalPerson", "legalPersonsByName"),
        FnKey::new(
            |entity| {
                legal_person_name(entity).ok_or_else(|| CoreError::NotViewableAs {
                    type_name: entity.type_name().to_string(),
                    view: "LegalPerson".to_string(),
                })
            },
            |params| match params {
                [value] => {
                    String::from_value(value).ok_or_else(|| format!("{} is not a name", value.kind()))
                }
                _ => Err(format!("expected 1 parameter, got {}", params.len())),
            },
        ),
    )
}

/// Humans by last name.
pub fn humans_by_last_name() -> SecondaryIndex<Id, String> {
    SecondaryIndex::new(
        SecondaryIndexSpec::new("Human", "humansByLastName"),
        FieldKey::<Human, String, _>::new("last_name", Human::last_name),
    )
}

/// Lookup parameters for a single text key.
pub fn text(key: &str) -> [Value; 1] {
    [Value::from(key)]
}

// ============================================================================
// Listener
// ============================================================================

/// Listener recording `"<change> <name>"` lines for legal persons.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
    arrived: Condvar,
}

impl RecordingListener {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, change: &str, entity: &ObjectRef) {
        let name = legal_person_name(entity).unwrap_or_else(|| entity.type_name().to_string());
        self.events.lock().push(format!("{change} {name}"));
        self.arrived.notify_all();
    }

    /// Waits until at least `count` events arrived or `timeout` passed,
    /// then returns everything recorded so far.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while events.len() < count {
            if self.arrived.wait_until(&mut events, deadline).timed_out() {
                break;
            }
        }
        events.clone()
    }
}

impl PrimaryIndexListener<Id> for RecordingListener {
    fn created(&self, _identity: &Id, entity: &ObjectRef) {
        self.record("created", entity);
    }

    fn updated(&self, _identity: &Id, entity: &ObjectRef) {
        self.record("updated", entity);
    }

    fn deleted(&self, _identity: &Id, entity: &ObjectRef) {
        self.record("deleted", entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_closure_includes_runtime_registration() {
        let store = domain_store();
        let closure: Vec<_> = store.type_closure("Human").iter().map(|t| t.to_string()).collect();
        assert_eq!(closure, ["Human", "LegalPerson", "Identifiable"]);
        assert!(store.type_closure("Employment").is_empty());
    }

    #[test]
    fn employment_links_both_sides() {
        let alice = Human::create("Alice", "Alice", "Alice", "Tegnér");
        let hd = Organization::create("HD");
        let node = Employment::link("Jurist", &alice, &hd);
        assert_eq!(Human::of(&alice).employments(), vec![node.clone()]);
        assert_eq!(Organization::of(&hd).employees(), vec![node.clone()]);
        assert_eq!(Employment::of(&node).employer(), Some(hd));
        assert_eq!(Employment::of(&node).title(), "Jurist");
    }

    #[test]
    fn debug_does_not_follow_cycles() {
        let alice = Human::create("Alice", "Alice", "Alice", "Tegnér");
        let hd = Organization::create("HD");
        Employment::link("Jurist", &alice, &hd);
        let rendered = format!("{alice:?} {hd:?}");
        assert!(rendered.contains("employments: 1"));
    }

    #[test]
    fn legal_person_names() {
        assert_eq!(
            legal_person_name(&Organization::create("HD")),
            Some("HD".to_string())
        );
        let team = Team::detached("Core");
        assert_eq!(legal_person_name(&team), None);
    }
}
