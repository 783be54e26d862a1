use chrono::NaiveDate;
use rusqlite::Connection;
use tscat_core::{
    open_db_in_memory, CatalogueDraft, CatalogueField, CatalogueScope, CatalogueService,
    ComparisonOp, CoreError, Entity, Event, EventDraft, EventScope, FilterError, Operand,
    Predicate, QueryOptions, SqliteBackend, Timestamp,
};
use uuid::Uuid;

fn ts(day: u32, hour: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2020, 1, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn service(conn: &Connection) -> CatalogueService<SqliteBackend<'_>> {
    CatalogueService::new(SqliteBackend::try_new(conn).unwrap())
}

struct Fixture {
    events: Vec<Event>,
    static_catalogue: Uuid,
    dynamic_catalogue: Uuid,
}

fn populate(service: &CatalogueService<SqliteBackend<'_>>) -> Fixture {
    let a = service
        .create_event(
            EventDraft::new(ts(1, 0), ts(1, 6), "Patrick")
                .tags(["storm", "bow"])
                .products(["mms"])
                .rating(7)
                .attribute("speed", 400)
                .attribute("ratio", 0.5)
                .attribute("label", "shock")
                .attribute("flagged", true)
                .attribute("seen", ts(3, 0))
                .attribute("regions", vec!["a", "b"]),
        )
        .unwrap();
    let b = service
        .create_event(
            EventDraft::new(ts(2, 0), ts(2, 12), "Alexis")
                .tags(["calm"])
                .attribute("speed", 250)
                .attribute("ratio", 2.0)
                .attribute("label", "wave")
                .attribute("flagged", false),
        )
        .unwrap();
    let c = service
        .create_event(
            EventDraft::new(ts(5, 0), ts(6, 0), "Pat")
                .rating(2)
                .attribute("speed", "fast")
                .attribute("regions", vec!["c"]),
        )
        .unwrap();
    let d = service
        .create_event(EventDraft::new(ts(7, 0), ts(7, 1), "Nobody"))
        .unwrap();

    let static_catalogue = service
        .create_catalogue(CatalogueDraft::new("static", "tests"), &[&b])
        .unwrap();
    let dynamic_catalogue = service
        .create_catalogue(
            CatalogueDraft::new("dynamic", "tests").predicate(Predicate::comparison(
                ComparisonOp::Eq,
                Operand::field("author"),
                "Patrick",
            )),
            &[&c],
        )
        .unwrap();

    Fixture {
        events: vec![a, b, c, d],
        static_catalogue: static_catalogue.uuid().unwrap(),
        dynamic_catalogue: dynamic_catalogue.uuid().unwrap(),
    }
}

fn authors(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| event.author().unwrap().to_string())
        .collect()
}

/// Runs `predicate` through storage and in memory and checks both agree.
fn both_paths(
    service: &CatalogueService<SqliteBackend<'_>>,
    fixture: &Fixture,
    predicate: Predicate,
) -> Vec<String> {
    let stored = service
        .get_events(EventScope::Predicate(predicate.clone()), QueryOptions::default())
        .unwrap();
    let in_memory = service.filter_events(&predicate, &fixture.events).unwrap();
    assert_eq!(
        authors(&stored),
        authors(&in_memory),
        "storage and in-memory results differ for {predicate}"
    );
    authors(&stored)
}

#[test]
fn storage_and_in_memory_agree_over_predicate_matrix() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let fixture = populate(&service);

    let cases: Vec<(Predicate, Vec<&str>)> = vec![
        (
            Predicate::comparison(ComparisonOp::Eq, Operand::field("author"), "Patrick"),
            vec!["Patrick"],
        ),
        (
            Predicate::comparison(ComparisonOp::Ne, Operand::field("author"), "Patrick"),
            vec!["Alexis", "Pat", "Nobody"],
        ),
        (
            Predicate::comparison(ComparisonOp::Ge, Operand::field("rating"), 5),
            vec!["Patrick"],
        ),
        (
            !Predicate::comparison(ComparisonOp::Ge, Operand::field("rating"), 5),
            vec!["Alexis", "Pat", "Nobody"],
        ),
        (
            Predicate::comparison(ComparisonOp::Lt, Operand::field("start"), ts(3, 0)),
            vec!["Patrick", "Alexis"],
        ),
        (
            Predicate::comparison(ComparisonOp::Gt, Operand::attribute("speed"), 300),
            vec!["Patrick"],
        ),
        (
            Predicate::comparison(ComparisonOp::Ne, Operand::attribute("speed"), 400),
            vec!["Alexis"],
        ),
        (
            !Predicate::comparison(ComparisonOp::Eq, Operand::attribute("speed"), 400),
            vec!["Alexis", "Pat", "Nobody"],
        ),
        (
            Predicate::comparison(ComparisonOp::Eq, Operand::attribute("speed"), "fast"),
            vec!["Pat"],
        ),
        (
            Predicate::comparison(ComparisonOp::Lt, Operand::attribute("ratio"), 1.0),
            vec!["Patrick"],
        ),
        (
            Predicate::comparison(ComparisonOp::Eq, Operand::attribute("ratio"), 2),
            vec![],
        ),
        (
            Predicate::comparison(ComparisonOp::Eq, Operand::attribute("flagged"), true),
            vec!["Patrick"],
        ),
        (
            Predicate::comparison(ComparisonOp::Le, Operand::attribute("seen"), ts(4, 0)),
            vec!["Patrick"],
        ),
        (
            Predicate::comparison(ComparisonOp::Eq, Operand::attribute("missing"), 1),
            vec![],
        ),
        (
            Predicate::comparison(ComparisonOp::Ne, Operand::attribute("missing"), 1),
            vec![],
        ),
        (Predicate::matches(Operand::field("author"), "^Pat"), vec!["Patrick", "Pat"]),
        (Predicate::matches(Operand::field("author"), "ex"), vec!["Alexis"]),
        (Predicate::matches(Operand::attribute("label"), "^s"), vec!["Patrick"]),
        (Predicate::matches(Operand::attribute("speed"), "4"), vec![]),
        (Predicate::matches(Operand::field("rating"), "7"), vec![]),
        (Predicate::has("label"), vec!["Patrick", "Alexis"]),
        (!Predicate::has("label"), vec!["Pat", "Nobody"]),
        (Predicate::contains(Operand::field("tags"), "storm"), vec!["Patrick"]),
        (Predicate::contains(Operand::field("products"), "mms"), vec!["Patrick"]),
        (Predicate::contains(Operand::field("author"), "Pat"), vec![]),
        (Predicate::contains(Operand::attribute("regions"), "c"), vec!["Pat"]),
        (Predicate::contains(Operand::attribute("label"), "shock"), vec![]),
        (Predicate::all([]), vec!["Patrick", "Alexis", "Pat", "Nobody"]),
        (Predicate::any([]), vec![]),
        (
            Predicate::all([
                Predicate::has("speed"),
                !Predicate::comparison(ComparisonOp::Eq, Operand::field("author"), "Pat"),
            ]),
            vec!["Patrick", "Alexis"],
        ),
        (
            Predicate::any([
                Predicate::contains(Operand::field("tags"), "calm"),
                Predicate::comparison(ComparisonOp::Eq, Operand::field("rating"), 2),
            ]),
            vec!["Alexis", "Pat"],
        ),
        (
            Predicate::in_catalogue_uuid(fixture.static_catalogue),
            vec!["Alexis"],
        ),
        (
            Predicate::in_catalogue_uuid(fixture.dynamic_catalogue),
            vec!["Patrick", "Pat"],
        ),
        (Predicate::in_no_catalogue(), vec!["Patrick", "Nobody"]),
        (!Predicate::in_no_catalogue(), vec!["Alexis", "Pat"]),
    ];

    for (predicate, expected) in cases {
        let description = predicate.to_string();
        assert_eq!(
            both_paths(&service, &fixture, predicate),
            expected,
            "unexpected result for {description}"
        );
    }
}

#[test]
fn uuid_shorthand_selects_one_event() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let fixture = populate(&service);
    let target = fixture.events[2].uuid().unwrap().to_string();

    let predicate = Predicate::uuid(&target).unwrap();
    assert_eq!(both_paths(&service, &fixture, predicate), vec!["Pat"]);
    assert!(Predicate::uuid("not-a-uuid").is_err());
}

#[test]
fn unknown_field_and_bad_regex_fail_before_evaluation() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let fixture = populate(&service);

    let unknown = Predicate::comparison(ComparisonOp::Eq, Operand::field("colour"), "red");
    assert!(matches!(
        service.get_events(EventScope::Predicate(unknown.clone()), QueryOptions::default()),
        Err(CoreError::Filter(FilterError::UnknownField { .. }))
    ));
    assert!(matches!(
        service.filter_events(&unknown, &fixture.events),
        Err(CoreError::Filter(FilterError::UnknownField { .. }))
    ));

    let bad_regex = Predicate::matches(Operand::field("author"), "(");
    assert!(matches!(
        service.get_events(EventScope::Predicate(bad_regex), QueryOptions::default()),
        Err(CoreError::Filter(FilterError::InvalidRegex { .. }))
    ));
}

#[test]
fn self_referencing_catalogue_raises_recursion() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut catalogue = service
        .create_catalogue(CatalogueDraft::new("loop", "tests"), &[])
        .unwrap();
    let uuid = catalogue.uuid().unwrap();
    service
        .set_catalogue_field(
            &mut catalogue,
            CatalogueField::Predicate(Some(Predicate::in_catalogue_uuid(uuid))),
        )
        .unwrap();

    match service.get_events(EventScope::Catalogue(&catalogue), QueryOptions::default()) {
        Err(CoreError::Recursion(found)) => assert_eq!(found, uuid),
        other => panic!("expected recursion error, got {other:?}"),
    }
}

#[test]
fn mutually_referencing_catalogues_raise_recursion() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut first = service
        .create_catalogue(CatalogueDraft::new("first", "tests"), &[])
        .unwrap();
    let second = service
        .create_catalogue(
            CatalogueDraft::new("second", "tests")
                .predicate(Predicate::in_catalogue(&first).unwrap()),
            &[],
        )
        .unwrap();
    service
        .set_catalogue_field(
            &mut first,
            CatalogueField::Predicate(Some(Predicate::in_catalogue(&second).unwrap())),
        )
        .unwrap();

    assert!(matches!(
        service.get_events(
            EventScope::Predicate(Predicate::in_catalogue(&second).unwrap()),
            QueryOptions::default()
        ),
        Err(CoreError::Recursion(_))
    ));
}

#[test]
fn shared_non_cyclic_reference_is_not_recursion() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let fixture = populate(&service);
    let dynamic = Predicate::in_catalogue_uuid(fixture.dynamic_catalogue);

    let predicate = Predicate::all([dynamic.clone(), dynamic]);
    assert_eq!(both_paths(&service, &fixture, predicate), vec!["Patrick", "Pat"]);
}

#[test]
fn in_catalogue_on_catalogue_query_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let fixture = populate(&service);

    let result = service.get_catalogues(
        CatalogueScope::Predicate(Predicate::in_catalogue_uuid(fixture.static_catalogue)),
        false,
    );
    assert!(matches!(result, Err(CoreError::CatalogueFilter)));
}

#[test]
fn catalogue_predicates_filter_catalogues_on_both_paths() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    populate(&service);

    let predicate = Predicate::matches(Operand::field("name"), "^dyn");
    let stored = service
        .get_catalogues(CatalogueScope::Predicate(predicate.clone()), false)
        .unwrap();
    let all = service.get_catalogues(CatalogueScope::All, false).unwrap();
    let in_memory = service.filter_catalogues(&predicate, &all).unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name().unwrap(), "dynamic");
    assert_eq!(stored, in_memory);
}
