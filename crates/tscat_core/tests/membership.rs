use chrono::NaiveDate;
use rusqlite::Connection;
use tscat_core::{
    open_db_in_memory, Catalogue, CatalogueDraft, CatalogueScope, CatalogueService, ComparisonOp,
    CoreError, Entity, Event, EventDraft, EventScope, Membership, Operand, Predicate,
    QueryOptions, RemoveMode, SqliteBackend, Timestamp,
};

fn ts(hour: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2022, 5, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn service(conn: &Connection) -> CatalogueService<SqliteBackend<'_>> {
    CatalogueService::new(SqliteBackend::try_new(conn).unwrap())
}

fn event(service: &CatalogueService<SqliteBackend<'_>>, author: &str, hour: u32) -> Event {
    service
        .create_event(EventDraft::new(ts(hour), ts(hour + 1), author))
        .unwrap()
}

fn dynamic(service: &CatalogueService<SqliteBackend<'_>>, author: &str) -> Catalogue {
    service
        .create_catalogue(
            CatalogueDraft::new(format!("by {author}"), "tests").predicate(Predicate::comparison(
                ComparisonOp::Eq,
                Operand::field("author"),
                author,
            )),
            &[],
        )
        .unwrap()
}

fn members(
    service: &CatalogueService<SqliteBackend<'_>>,
    catalogue: &Catalogue,
    membership: Membership,
) -> Vec<(String, Option<bool>)> {
    service
        .get_events(
            EventScope::Catalogue(catalogue),
            QueryOptions::membership(membership),
        )
        .unwrap()
        .iter()
        .map(|event| (event.author().unwrap().to_string(), event.assigned()))
        .collect()
}

fn entry(author: &str, assigned: bool) -> (String, Option<bool>) {
    (author.to_string(), Some(assigned))
}

#[test]
fn dynamic_catalogue_resolves_members_and_matches() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = event(&service, "P", 0);
    let b = event(&service, "Q", 2);
    let catalogue = dynamic(&service, "P");

    assert_eq!(
        members(&service, &catalogue, Membership::Resolved),
        vec![entry("P", false)]
    );

    service.add_events_to_catalogue(&catalogue, &[&b]).unwrap();
    assert_eq!(
        members(&service, &catalogue, Membership::Resolved),
        vec![entry("P", false), entry("Q", true)]
    );
    assert_eq!(
        members(&service, &catalogue, Membership::AssignedOnly),
        vec![entry("Q", true)]
    );
    assert_eq!(
        members(&service, &catalogue, Membership::FilteredOnly),
        vec![entry("P", false)]
    );

    service.add_events_to_catalogue(&catalogue, &[&a]).unwrap();
    assert_eq!(
        members(&service, &catalogue, Membership::Resolved),
        vec![entry("P", true), entry("Q", true)]
    );
    assert_eq!(
        members(&service, &catalogue, Membership::FilteredOnly),
        vec![entry("P", true)]
    );
}

#[test]
fn static_catalogue_has_only_explicit_members() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = event(&service, "P", 0);
    event(&service, "Q", 2);
    let catalogue = service
        .create_catalogue(CatalogueDraft::new("static", "tests"), &[&a])
        .unwrap();

    assert_eq!(
        members(&service, &catalogue, Membership::Resolved),
        vec![entry("P", true)]
    );
    assert_eq!(
        members(&service, &catalogue, Membership::AssignedOnly),
        vec![entry("P", true)]
    );
    assert!(members(&service, &catalogue, Membership::FilteredOnly).is_empty());
}

#[test]
fn duplicate_add_and_missing_remove_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = event(&service, "P", 0);
    let b = event(&service, "Q", 2);
    let catalogue = dynamic(&service, "P");
    service.add_events_to_catalogue(&catalogue, &[&b]).unwrap();

    match service.add_events_to_catalogue(&catalogue, &[&a, &b]) {
        Err(CoreError::AlreadyAssigned {
            catalogue: catalogue_uuid,
            event,
        }) => {
            assert_eq!(catalogue_uuid, catalogue.uuid().unwrap());
            assert_eq!(event, b.uuid().unwrap());
        }
        other => panic!("expected AlreadyAssigned, got {other:?}"),
    }
    // the batch is all-or-nothing
    assert_eq!(
        members(&service, &catalogue, Membership::AssignedOnly),
        vec![entry("Q", true)]
    );

    match service.remove_events_from_catalogue(&catalogue, &[&a]) {
        Err(CoreError::NotAssigned { event, .. }) => assert_eq!(event, a.uuid().unwrap()),
        other => panic!("expected NotAssigned, got {other:?}"),
    }

    service
        .remove_events_from_catalogue(&catalogue, &[&b])
        .unwrap();
    assert!(members(&service, &catalogue, Membership::AssignedOnly).is_empty());
}

#[test]
fn catalogues_of_an_event_follow_explicit_membership() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = event(&service, "P", 0);
    let b = event(&service, "Q", 2);
    let first = service
        .create_catalogue(CatalogueDraft::new("first", "tests"), &[&a, &b])
        .unwrap();
    let second = service
        .create_catalogue(CatalogueDraft::new("second", "tests"), &[&b])
        .unwrap();
    dynamic(&service, "P");

    let of_a = service
        .get_catalogues(CatalogueScope::Event(&a), false)
        .unwrap();
    let of_b = service
        .get_catalogues(CatalogueScope::Event(&b), false)
        .unwrap();
    assert_eq!(of_a, vec![first.clone()]);
    assert_eq!(of_b, vec![first, second]);
}

#[test]
fn hard_deleted_handles_cannot_join_catalogues() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut gone = event(&service, "P", 0);
    let catalogue = service
        .create_catalogue(CatalogueDraft::new("c", "tests"), &[])
        .unwrap();
    service.remove(&mut gone, RemoveMode::Permanent).unwrap();

    assert!(matches!(
        service.add_events_to_catalogue(&catalogue, &[&gone]),
        Err(CoreError::InvalidHandle)
    ));
    assert!(matches!(
        service.get_catalogues(CatalogueScope::Event(&gone), false),
        Err(CoreError::InvalidHandle)
    ));
}

#[test]
fn deleting_a_catalogue_keeps_its_events() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = event(&service, "P", 0);
    let b = event(&service, "Q", 2);
    let mut catalogue = service
        .create_catalogue(CatalogueDraft::new("c", "tests"), &[&a, &b])
        .unwrap();

    service
        .remove(&mut catalogue, RemoveMode::Permanent)
        .unwrap();

    let remaining = service
        .get_events(EventScope::All, QueryOptions::default())
        .unwrap();
    assert_eq!(remaining, vec![a.clone(), b]);
    assert!(service
        .get_catalogues(CatalogueScope::Event(&a), false)
        .unwrap()
        .is_empty());
    assert!(matches!(
        service.get_events(EventScope::Catalogue(&catalogue), QueryOptions::default()),
        Err(CoreError::InvalidHandle)
    ));
}

#[test]
fn other_handles_of_a_deleted_entity_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut a = event(&service, "P", 0);
    let mut catalogue = service
        .create_catalogue(CatalogueDraft::new("c", "tests"), &[&a])
        .unwrap();
    let listed = service
        .get_catalogues(CatalogueScope::All, false)
        .unwrap()
        .remove(0);
    let a_copy = a.clone();

    service
        .remove(&mut catalogue, RemoveMode::Permanent)
        .unwrap();
    assert!(listed.is_valid());
    assert!(matches!(
        service.get_events(EventScope::Catalogue(&listed), QueryOptions::default()),
        Err(CoreError::InvalidHandle)
    ));
    assert!(matches!(
        service.add_events_to_catalogue(&listed, &[&a]),
        Err(CoreError::InvalidHandle)
    ));

    service.remove(&mut a, RemoveMode::Permanent).unwrap();
    assert!(matches!(
        service.get_catalogues(CatalogueScope::Event(&a_copy), false),
        Err(CoreError::InvalidHandle)
    ));
}

#[test]
fn trashed_members_are_listed_separately() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let a = event(&service, "P", 0);
    let mut b = event(&service, "Q", 2);
    let catalogue = service
        .create_catalogue(CatalogueDraft::new("c", "tests"), &[&a, &b])
        .unwrap();

    service.remove(&mut b, RemoveMode::Soft).unwrap();

    assert_eq!(
        members(&service, &catalogue, Membership::Resolved),
        vec![entry("P", true)]
    );
    let trashed = service
        .get_events(EventScope::Catalogue(&catalogue), QueryOptions::removed())
        .unwrap();
    assert_eq!(trashed, vec![b.clone()]);

    service.restore(&mut b).unwrap();
    assert_eq!(members(&service, &catalogue, Membership::Resolved).len(), 2);
}

#[test]
fn nested_dynamic_catalogues_expand_transitively() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    event(&service, "P", 0);
    let q = event(&service, "Q", 2);
    event(&service, "R", 4);
    let inner = dynamic(&service, "P");
    service.add_events_to_catalogue(&inner, &[&q]).unwrap();
    let outer = service
        .create_catalogue(
            CatalogueDraft::new("outer", "tests")
                .predicate(Predicate::in_catalogue(&inner).unwrap()),
            &[],
        )
        .unwrap();

    assert_eq!(
        members(&service, &outer, Membership::Resolved),
        vec![entry("P", false), entry("Q", false)]
    );
}
