use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use tscat_core::{
    canonicalize, export_bundle, export_json, import_bundle, import_json, open_db_in_memory,
    AttributeValue, Bundle, Catalogue, CatalogueDraft, CatalogueScope, CatalogueService, ComparisonOp,
    CoreError, Entity, EntityKind, EventDraft, EventField, EventScope, Membership, Operand,
    Predicate, QueryOptions, SqliteBackend, Timestamp,
};
use uuid::Uuid;

fn ts(day: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2019, 11, day)
        .unwrap()
        .and_hms_opt(6, 30, 0)
        .unwrap()
}

fn service(conn: &Connection) -> CatalogueService<SqliteBackend<'_>> {
    CatalogueService::new(SqliteBackend::try_new(conn).unwrap())
}

/// One static catalogue with two members and one dynamic catalogue sharing
/// a member with it.
fn populate(service: &CatalogueService<SqliteBackend<'_>>) -> Vec<Catalogue> {
    let first = service
        .create_event(
            EventDraft::new(ts(1), ts(2), "Patrick")
                .tags(["bow"])
                .rating(8)
                .attribute("speed", 512)
                .attribute("ratio", 2.0)
                .attribute("seen", ts(3))
                .attribute("regions", vec!["dawn"]),
        )
        .unwrap();
    let second = service
        .create_event(EventDraft::new(ts(4), ts(5), "Alexis").attribute("flag", false))
        .unwrap();
    service
        .create_event(EventDraft::new(ts(6), ts(7), "Patrick"))
        .unwrap();

    let listed = service
        .create_catalogue(
            CatalogueDraft::new("listed", "Alexis")
                .tags(["mms"])
                .attribute("version", 3),
            &[&first, &second],
        )
        .unwrap();
    let by_patrick = service
        .create_catalogue(
            CatalogueDraft::new("by patrick", "Alexis").predicate(Predicate::comparison(
                ComparisonOp::Eq,
                Operand::field("author"),
                "Patrick",
            )),
            &[&second],
        )
        .unwrap();
    vec![listed, by_patrick]
}

fn member_uuids(
    service: &CatalogueService<SqliteBackend<'_>>,
    catalogue: &Catalogue,
) -> Vec<Uuid> {
    let mut uuids: Vec<Uuid> = service
        .get_events(EventScope::Catalogue(catalogue), QueryOptions::default())
        .unwrap()
        .iter()
        .map(|event| event.uuid().unwrap())
        .collect();
    uuids.sort();
    uuids
}

fn refs(catalogues: &[Catalogue]) -> Vec<&Catalogue> {
    catalogues.iter().collect()
}

#[test]
fn export_lists_resolved_members_and_dedupes_events() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogues = populate(&service);

    let bundle = export_bundle(&service, &refs(&catalogues)).unwrap();

    assert_eq!(bundle.catalogues.len(), 2);
    assert_eq!(bundle.events.len(), 3);
    assert_eq!(bundle.catalogues[0]["events"].as_array().unwrap().len(), 2);
    assert_eq!(bundle.catalogues[1]["events"].as_array().unwrap().len(), 3);
    assert_eq!(bundle.catalogues[0]["version"], json!(3));
    assert!(bundle.catalogues[0]["predicate"].is_null());
    assert_eq!(bundle.events[0]["seen"], json!("2019-11-03T06:30:00.000000"));
}

#[test]
fn export_discard_import_restores_catalogues() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogues = populate(&service);
    let expected_members: Vec<Vec<Uuid>> = catalogues
        .iter()
        .map(|catalogue| member_uuids(&service, catalogue))
        .collect();
    let expected_events = service
        .get_events(EventScope::All, QueryOptions::default())
        .unwrap();

    let text = export_json(&service, &refs(&catalogues)).unwrap();
    service.discard().unwrap();
    assert!(service
        .get_catalogues(CatalogueScope::All, false)
        .unwrap()
        .is_empty());

    let imported = import_json(&service, &text).unwrap();
    assert_eq!(imported, catalogues);
    let restored_members: Vec<Vec<Uuid>> = imported
        .iter()
        .map(|catalogue| member_uuids(&service, catalogue))
        .collect();
    assert_eq!(restored_members, expected_members);
    assert_eq!(
        service
            .get_events(EventScope::All, QueryOptions::default())
            .unwrap(),
        expected_events
    );
}

#[test]
fn import_into_another_database_keeps_identities() {
    let source_conn = open_db_in_memory().unwrap();
    let source = service(&source_conn);
    let catalogues = populate(&source);
    let bundle = export_bundle(&source, &refs(&catalogues)).unwrap();

    let target_conn = open_db_in_memory().unwrap();
    let target = service(&target_conn);
    let imported = import_bundle(&target, &bundle).unwrap();

    assert_eq!(imported.len(), 2);
    assert_eq!(imported[0].uuid().unwrap(), catalogues[0].uuid().unwrap());
    assert_eq!(
        member_uuids(&target, &imported[1]),
        member_uuids(&source, &catalogues[1])
    );
}

#[test]
fn reimporting_identical_records_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogues = populate(&service);
    let bundle = export_bundle(&service, &refs(&catalogues)).unwrap();
    service.save().unwrap();

    assert!(canonicalize(&service, &bundle).unwrap().is_empty());
    assert!(import_bundle(&service, &bundle).unwrap().is_empty());
    assert!(!service.has_unsaved_changes());
    assert_eq!(
        service
            .get_events(EventScope::All, QueryOptions::default())
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn conflicting_event_aborts_the_whole_import() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogues = populate(&service);
    let bundle = export_bundle(&service, &refs(&catalogues)).unwrap();

    let mut events = service
        .get_events(EventScope::All, QueryOptions::default())
        .unwrap();
    service
        .set_event_field(&mut events[1], EventField::Author("Someone else".into()))
        .unwrap();
    let conflicting = events[1].uuid().unwrap();

    let mut extended = bundle.clone();
    extended.events.push(
        json!({
            "uuid": "9a1b2c3d-4e5f-4a6b-8c7d-0e1f2a3b4c5d",
            "start": "2019-11-20T00:00:00.000000",
            "stop": "2019-11-21T00:00:00.000000",
            "author": "new",
        })
        .as_object()
        .unwrap()
        .clone(),
    );

    match import_bundle(&service, &extended) {
        Err(CoreError::Conflict { kind, uuid }) => {
            assert_eq!(kind, EntityKind::Event);
            assert_eq!(uuid, conflicting);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(
        service
            .get_events(EventScope::All, QueryOptions::default())
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn conflicting_catalogue_membership_is_detected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogues = populate(&service);
    let bundle = export_bundle(&service, &refs(&catalogues)).unwrap();

    let members = service
        .get_events(
            EventScope::Catalogue(&catalogues[0]),
            QueryOptions::membership(Membership::AssignedOnly),
        )
        .unwrap();
    service
        .remove_events_from_catalogue(&catalogues[0], &[&members[0]])
        .unwrap();

    assert!(matches!(
        import_bundle(&service, &bundle),
        Err(CoreError::Conflict {
            kind: EntityKind::Catalogue,
            ..
        })
    ));
}

#[test]
fn unknown_member_uuid_is_not_found_and_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let bundle: Bundle = serde_json::from_value(json!({
        "events": [{
            "uuid": "11111111-2222-4333-8444-555555555555",
            "start": "2019-11-01T00:00:00",
            "stop": "2019-11-01T01:00:00",
            "author": "a",
        }],
        "catalogues": [{
            "uuid": "66666666-7777-4888-9999-000000000000",
            "name": "dangling",
            "author": "a",
            "events": [
                "11111111-2222-4333-8444-555555555555",
                "aaaaaaaa-bbbb-4ccc-8ddd-eeeeeeeeeeee"
            ],
        }],
    }))
    .unwrap();

    assert!(matches!(
        import_bundle(&service, &bundle),
        Err(CoreError::NotFound(_))
    ));
    assert!(service
        .get_events(EventScope::All, QueryOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn members_may_refer_to_already_stored_events() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let stored = service
        .create_event(EventDraft::new(ts(1), ts(2), "a"))
        .unwrap();
    let bundle: Bundle = serde_json::from_value(json!({
        "catalogues": [{
            "name": "late",
            "author": "b",
            "events": [stored.uuid().unwrap().to_string()],
        }],
    }))
    .unwrap();

    let imported = import_bundle(&service, &bundle).unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(member_uuids(&service, &imported[0]), vec![stored.uuid().unwrap()]);
}

#[test]
fn date_like_strings_stay_strings_across_export_and_import() {
    let source_conn = open_db_in_memory().unwrap();
    let source = service(&source_conn);
    let event = source
        .create_event(
            EventDraft::new(ts(1), ts(2), "Patrick")
                .attribute("note", "2020-01-01T00:00:00")
                .attribute("spaced", "2020-01-01 00:00:00.000000")
                .attribute("seen", ts(3)),
        )
        .unwrap();
    let catalogue = source
        .create_catalogue(CatalogueDraft::new("dated", "Alexis"), &[&event])
        .unwrap();
    source.save().unwrap();
    let text = export_json(&source, &[&catalogue]).unwrap();

    assert!(import_json(&source, &text).unwrap().is_empty());
    assert!(!source.has_unsaved_changes());

    let target_conn = open_db_in_memory().unwrap();
    let target = service(&target_conn);
    let imported = import_json(&target, &text).unwrap();
    let copied = target
        .get_events(EventScope::Catalogue(&imported[0]), QueryOptions::default())
        .unwrap();
    assert_eq!(copied, vec![event]);
    assert_eq!(
        copied[0].attribute("note").unwrap(),
        Some(&AttributeValue::String("2020-01-01T00:00:00".to_string()))
    );
    assert_eq!(
        copied[0].attribute("seen").unwrap(),
        Some(&AttributeValue::Timestamp(ts(3)))
    );
}

#[test]
fn hand_written_bundle_matching_storage_is_not_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let stored = service
        .create_event(
            EventDraft::new(ts(1), ts(2), "a")
                .uuid("11111111-2222-4333-8444-555555555555")
                .attribute("label", "2019-11-01T06:30:00"),
        )
        .unwrap();
    let bundle: Bundle = serde_json::from_value(json!({
        "events": [{
            "uuid": "11111111-2222-4333-8444-555555555555",
            "start": "2019-11-01T06:30:00",
            "stop": "2019-11-02 06:30:00",
            "author": "a",
            "label": "2019-11-01T06:30:00",
        }],
    }))
    .unwrap();

    assert!(canonicalize(&service, &bundle).unwrap().is_empty());
    assert_eq!(
        service
            .get_events(EventScope::All, QueryOptions::default())
            .unwrap(),
        vec![stored]
    );
}

#[test]
fn malformed_input_is_a_format_error() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    assert!(matches!(
        import_json(&service, "{not json"),
        Err(CoreError::Format(_))
    ));
    assert!(matches!(
        import_json(
            &service,
            r#"{"events": [{"start": "yesterday", "stop": "today", "author": "a"}]}"#
        ),
        Err(CoreError::Format(_))
    ));
    assert!(matches!(
        import_json(
            &service,
            r#"{"catalogues": [{"name": "c", "author": "a", "predicate": {"bogus": 1}}]}"#
        ),
        Err(CoreError::Format(_))
    ));
}
