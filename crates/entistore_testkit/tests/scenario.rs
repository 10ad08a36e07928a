//! End-to-end store scenarios over the test domain.

use entistore_core::{CoreError, ObjectRef, SecondaryIndex};
use entistore_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn alice() -> ObjectRef {
    Human::create("Alice Charlotta Tegnér", "Alice Charlotta", "Alice", "Tegnér")
}

fn bob() -> ObjectRef {
    Human::create("Robert Gustavsson", "Robert", "Bob", "Gustavsson")
}

#[test]
fn employment_lifecycle() {
    let store = domain_store();

    let by_name = Arc::new(legal_persons_by_name());
    assert!(store.register_secondary_index(Arc::clone(&by_name)).unwrap());
    let unused = Arc::new(legal_persons_by_name());
    assert!(!store.register_secondary_index(Arc::clone(&unused)).unwrap());

    let listener = RecordingListener::new();
    store
        .get_primary_index("LegalPerson")
        .unwrap()
        .unwrap()
        .add_listener(listener.clone())
        .unwrap();

    let hd = Organization::create("Högsta domstolen");
    let alice = alice();
    let jurist = Employment::link("Jurist", &alice, &hd);
    Employment::link("Häradshövding", &alice, &hd);
    Employment::link("Protokollsekreterare", &alice, &hd);
    ContactInformation::attach(&alice, "alice@example.org", "+46 8 561 666 00");

    assert_eq!(store.put(0, alice.clone()).unwrap(), None);
    assert_eq!(store.put(1, hd.clone()).unwrap(), None);

    assert_eq!(store.get("Organization", &1).unwrap(), Some(hd.clone()));
    assert_eq!(store.get("Human", &0).unwrap(), Some(alice.clone()));
    assert_eq!(store.get("LegalPerson", &0).unwrap(), Some(alice.clone()));
    assert_eq!(store.get("Identifiable", &0).unwrap(), Some(alice.clone()));
    assert_eq!(store.get("Organization", &0).unwrap(), None);

    assert_eq!(by_name.get(&text("Alice Charlotta Tegnér")).unwrap(), Some(alice.clone()));
    assert_eq!(unused.get(&text("Alice Charlotta Tegnér")).unwrap(), None);

    let bob = bob();
    Employment::link("Snubbe", &bob, &hd);
    store.put(2, bob.clone()).unwrap();

    assert_eq!(store.get("Human", &0).unwrap(), Some(alice.clone()));
    assert_eq!(store.get("LegalPerson", &2).unwrap(), Some(bob.clone()));
    assert_eq!(store.get("Organization", &2).unwrap(), None);
    assert_eq!(Organization::of(&hd).employees().len(), 4);

    let by_last_name = Arc::new(humans_by_last_name());
    assert!(store.register_secondary_index(Arc::clone(&by_last_name)).unwrap());
    assert_eq!(by_last_name.get(&text("Tegnér")).unwrap(), Some(alice.clone()));

    assert_eq!(store.remove("Human", &0).unwrap(), Some(alice.clone()));

    assert!(Human::of(&alice).employments().is_empty());
    let employees = Organization::of(&hd).employees();
    assert_eq!(employees.len(), 1);
    assert!(!employees.contains(&jurist));
    assert_eq!(Employment::of(&employees[0]).title(), "Snubbe");
    assert!(Employment::of(&jurist).employee().is_none());
    assert!(Employment::of(&jurist).employer().is_none());
    assert!(Human::of(&alice).contact_information().is_none());

    for view in ["Human", "LegalPerson", "Identifiable", "Organization"] {
        assert_eq!(store.get(view, &0).unwrap(), None, "view {view}");
    }
    assert_eq!(by_name.get(&text("Alice Charlotta Tegnér")).unwrap(), None);
    assert_eq!(by_last_name.get(&text("Tegnér")).unwrap(), None);

    assert_eq!(store.get("Human", &2).unwrap(), Some(bob.clone()));
    assert_eq!(store.get("LegalPerson", &2).unwrap(), Some(bob.clone()));
    assert_eq!(by_name.get(&text("Robert Gustavsson")).unwrap(), Some(bob.clone()));

    assert_eq!(by_last_name.get(&text("Gustavsson")).unwrap(), Some(bob.clone()));

    Human::of(&bob).set_last_name("Svensson");
    assert_eq!(store.put(2, bob.clone()).unwrap(), Some(bob.clone()));
    assert_eq!(by_last_name.get(&text("Gustavsson")).unwrap(), None);
    assert_eq!(by_last_name.get(&text("Svensson")).unwrap(), Some(bob.clone()));

    assert!(matches!(
        store.get_or_create_primary_index("DummyInterface"),
        Err(CoreError::NotRegistered { .. })
    ));
    assert!(store.get_primary_index("Identifiable").unwrap().is_some());

    let events = listener.wait_for(5, Duration::from_secs(5));
    assert_eq!(
        events,
        [
            "created Alice Charlotta Tegnér",
            "created Högsta domstolen",
            "created Robert Gustavsson",
            "deleted Alice Charlotta Tegnér",
            "updated Robert Gustavsson",
        ]
    );
}

#[test]
fn composite_department_cascades_into_teams() {
    let store = domain_store();
    let research = Department::create("Research");
    let core = Team::create("Core", &research);
    let tools = Team::create("Tools", &research);
    store.put(10, research.clone()).unwrap();
    store.put(11, core.clone()).unwrap();
    store.put(12, tools.clone()).unwrap();

    let report = store.decouple(&core).unwrap();
    assert_eq!(report.links_removed, 2);
    assert!(report.cascaded.is_empty());
    assert_eq!(Department::of(&research).teams(), vec![tools.clone()]);
    // decoupling does not remove
    assert_eq!(store.get("Team", &11).unwrap(), Some(core));

    store.remove("Department", &10).unwrap();
    assert_eq!(store.get("Team", &12).unwrap(), None);
    assert!(Team::of(&tools).department().is_none());
    assert!(Department::of(&research).teams().is_empty());
    assert_eq!(store.stats().cascade_removals(), 1);
}

#[test]
fn removing_a_team_keeps_its_department() {
    let store = domain_store();
    let research = Department::create("Research");
    let core = Team::create("Core", &research);
    store.put(10, research.clone()).unwrap();
    store.put(11, core.clone()).unwrap();

    store.remove("Team", &11).unwrap();
    assert_eq!(store.get("Department", &10).unwrap(), Some(research.clone()));
    assert!(Department::of(&research).teams().is_empty());
}

#[test]
fn parent_child_links_are_cut_both_ways() {
    let store = domain_store();
    let parent = alice();
    let child = bob();
    Human::adopt(&parent, &child);
    store.put(0, parent.clone()).unwrap();
    store.put(1, child.clone()).unwrap();

    store.remove("LegalPerson", &1).unwrap();
    assert!(Human::of(&parent).children().is_empty());
    assert!(Human::of(&child).parents().is_empty());
    assert_eq!(store.get("Human", &0).unwrap(), Some(parent));
}

#[test]
fn replacing_an_occupant_decouples_the_old_one() {
    let store = domain_store();
    let hd = Organization::create("Högsta domstolen");
    let alice = alice();
    Employment::link("Jurist", &alice, &hd);
    store.put(0, alice.clone()).unwrap();
    store.put(1, hd.clone()).unwrap();

    let bob = bob();
    assert_eq!(store.put(0, bob.clone()).unwrap(), Some(alice.clone()));
    assert!(Human::of(&alice).employments().is_empty());
    assert!(Organization::of(&hd).employees().is_empty());
    assert_eq!(store.get("LegalPerson", &0).unwrap(), Some(bob));
    assert_eq!(store.identity_of(&alice), None);
}

#[test]
fn same_entity_under_two_identities_is_rejected() {
    let store = domain_store();
    let alice = alice();
    store.put(0, alice.clone()).unwrap();
    let err = store.put(5, alice.clone()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateEntity { .. }));
    assert_eq!(store.get("Human", &5).unwrap(), None);
    assert_eq!(store.identity_of(&alice), Some(0));
}

#[test]
fn non_entity_types_cannot_be_put() {
    let store = domain_store();
    let hd = Organization::create("HD");
    let node = Employment::link("Jurist", &alice(), &hd);
    assert!(matches!(
        store.put(3, node),
        Err(CoreError::NotRegistered { .. })
    ));
}

#[test]
fn unique_lookup_reports_ambiguity() {
    let store = domain_store();
    let by_last_name: Arc<SecondaryIndex<Id, String>> = Arc::new(humans_by_last_name());
    store.register_secondary_index(Arc::clone(&by_last_name)).unwrap();

    store.put(0, Human::create("Anna Lind", "Anna", "Anna", "Lind")).unwrap();
    store.put(1, Human::create("Per Lind", "Per", "Per", "Lind")).unwrap();

    assert!(matches!(
        by_last_name.get(&text("Lind")),
        Err(CoreError::NotUnique { count: 2, .. })
    ));
    assert_eq!(by_last_name.list(&text("Lind")).unwrap().map(|l| l.len()), Some(2));
    assert!(matches!(
        by_last_name.get(&[]),
        Err(CoreError::ArityOrTypeMismatch { .. })
    ));
}
