use chrono::NaiveDate;
use rusqlite::Connection;
use tscat_core::{
    export_tabular, import_tabular, open_db_in_memory, AttributeValue, Catalogue,
    CatalogueDraft, CatalogueService, Column, CoreError, Entity, Event, EventDraft, EventScope,
    QueryOptions, SqliteBackend, Table, TabularDocument, Timestamp,
};

fn ts(hour: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2018, 2, 9)
        .unwrap()
        .and_hms_opt(hour, 15, 0)
        .unwrap()
}

fn service(conn: &Connection) -> CatalogueService<SqliteBackend<'_>> {
    CatalogueService::new(SqliteBackend::try_new(conn).unwrap())
}

fn members(service: &CatalogueService<SqliteBackend<'_>>, catalogue: &Catalogue) -> Vec<Event> {
    service
        .get_events(EventScope::Catalogue(catalogue), QueryOptions::default())
        .unwrap()
}

fn text_column(name: &str) -> Column {
    Column {
        name: name.to_string(),
        datatype: Some("char".to_string()),
        arraysize: Some("*".to_string()),
        ..Column::default()
    }
}

fn time_column(name: &str, id: &str, ucd: &str) -> Column {
    Column {
        id: Some(id.to_string()),
        ucd: Some(ucd.to_string()),
        xtype: Some("dateTime".to_string()),
        ..text_column(name)
    }
}

fn interval_table(name: &str, rows: Vec<Vec<String>>) -> Table {
    Table {
        name: name.to_string(),
        columns: vec![
            time_column("Start Time", "TimeIntervalStart", "time.start"),
            time_column("Stop Time", "TimeIntervalStop", "time.end"),
            Column {
                datatype: Some("long".to_string()),
                ..Column {
                    name: "orbit".to_string(),
                    ..Column::default()
                }
            },
        ],
        rows,
    }
}

fn row(start: &str, stop: &str, orbit: &str) -> Vec<String> {
    vec![start.to_string(), stop.to_string(), orbit.to_string()]
}

/// Catalogue whose events carry one attribute of every kind.
fn populate(service: &CatalogueService<SqliteBackend<'_>>) -> Catalogue {
    let first = service
        .create_event(
            EventDraft::new(ts(1), ts(2), "Patrick")
                .tags(["bow", "shock"])
                .products(["mms1"])
                .rating(4)
                .attribute("label", "crossing")
                .attribute("orbit", 12)
                .attribute("ratio", 2.5)
                .attribute("inbound", true)
                .attribute("peak", ts(1))
                .attribute("probes", vec!["c1", "c3"]),
        )
        .unwrap();
    let second = service
        .create_event(
            EventDraft::new(ts(3), ts(4), "Alexis")
                .attribute("label", "")
                .attribute("orbit", 13)
                .attribute("ratio", 3.0)
                .attribute("inbound", false)
                .attribute("peak", ts(3))
                .attribute("probes", Vec::<String>::new()),
        )
        .unwrap();
    service
        .create_catalogue(CatalogueDraft::new("Bow shocks", "Alexis"), &[&first, &second])
        .unwrap()
}

#[test]
fn export_describes_columns_and_rows() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogue = populate(&service);

    let document = export_tabular(&service, &[&catalogue]).unwrap();

    assert_eq!(
        document.description.as_deref(),
        Some("Contact:Alexis;Name:Bow shocks;")
    );
    let table = &document.tables[0];
    assert_eq!(table.name, "Bow_shocks");
    let names: Vec<&str> = table.columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Start Time",
            "Stop Time",
            "author",
            "uuid",
            "tags",
            "products",
            "rating",
            "inbound",
            "label",
            "orbit",
            "peak",
            "probes",
            "ratio",
        ]
    );
    assert_eq!(table.columns[9].datatype.as_deref(), Some("long"));
    assert_eq!(table.columns[10].xtype.as_deref(), Some("dateTime"));
    assert_eq!(table.columns[11].utype.as_deref(), Some("json"));
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0][0], "2018-02-09T01:15:00.000000");
    assert_eq!(table.rows[0][4], r#"["bow","shock"]"#);
    assert_eq!(table.rows[1][6], "");
}

#[test]
fn exported_table_imports_back_into_a_fresh_database() {
    let source_conn = open_db_in_memory().unwrap();
    let source = service(&source_conn);
    let catalogue = populate(&source);
    let document = export_tabular(&source, &[&catalogue]).unwrap();

    let target_conn = open_db_in_memory().unwrap();
    let target = service(&target_conn);
    let imported = import_tabular(&target, &document, "unused.xml").unwrap();

    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].name().unwrap(), "Bow shocks");
    assert_eq!(imported[0].author().unwrap(), "Alexis");
    assert_ne!(imported[0].uuid().unwrap(), catalogue.uuid().unwrap());
    assert_eq!(members(&target, &imported[0]), members(&source, &catalogue));
}

#[test]
fn importing_next_to_the_source_reuses_identical_events() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let catalogue = populate(&service);
    let document = export_tabular(&service, &[&catalogue]).unwrap();

    let imported = import_tabular(&service, &document, "copy.xml").unwrap();

    assert_eq!(members(&service, &imported[0]), members(&service, &catalogue));
    assert_eq!(
        service
            .get_events(EventScope::All, QueryOptions::default())
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn attributes_missing_on_some_events_cannot_be_exported() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let partial = service
        .create_event(EventDraft::new(ts(1), ts(2), "a").attribute("only_here", 1))
        .unwrap();
    let plain = service
        .create_event(EventDraft::new(ts(3), ts(4), "a"))
        .unwrap();
    let catalogue = service
        .create_catalogue(CatalogueDraft::new("c", "a"), &[&partial, &plain])
        .unwrap();

    assert!(matches!(
        export_tabular(&service, &[&catalogue]),
        Err(CoreError::Format(_))
    ));
}

#[test]
fn attributes_of_mixed_kinds_cannot_be_exported() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let first = service
        .create_event(EventDraft::new(ts(1), ts(2), "a").attribute("x", 1))
        .unwrap();
    let second = service
        .create_event(EventDraft::new(ts(3), ts(4), "a").attribute("x", "one"))
        .unwrap();
    let catalogue = service
        .create_catalogue(CatalogueDraft::new("c", "a"), &[&first, &second])
        .unwrap();

    assert!(matches!(
        export_tabular(&service, &[&catalogue]),
        Err(CoreError::Format(_))
    ));
}

#[test]
fn minimal_table_gets_default_author_and_generated_uuids() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let document = TabularDocument {
        description: None,
        tables: vec![interval_table(
            "ignored",
            vec![
                row("2018-02-09T01:00:00", "2018-02-09T02:00:00", "7"),
                row("2018-02-09 03:00:00.5", "2018-02-09 04:00:00", ""),
            ],
        )],
    };

    let imported = import_tabular(&service, &document, "orbits.xml").unwrap();

    assert_eq!(imported[0].name().unwrap(), "orbits.xml");
    assert_eq!(imported[0].author().unwrap(), "VOTable Import");
    let events = members(&service, &imported[0]);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].author().unwrap(), "VOTable Import");
    assert_eq!(events[0].uuid().unwrap().get_version_num(), 4);
    assert_eq!(
        events[0].attribute("orbit").unwrap(),
        Some(&AttributeValue::Integer(7))
    );
    assert_eq!(events[1].attribute("orbit").unwrap(), None);
    assert_eq!(
        events[1].start().unwrap(),
        NaiveDate::from_ymd_opt(2018, 2, 9)
            .unwrap()
            .and_hms_milli_opt(3, 0, 0, 500)
            .unwrap()
    );
}

#[test]
fn several_tables_become_numbered_catalogues() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let document = TabularDocument {
        description: Some("Contact:bob;Name:orbits;".to_string()),
        tables: vec![
            interval_table(
                "a",
                vec![row("2018-02-09T01:00:00", "2018-02-09T02:00:00", "1")],
            ),
            interval_table(
                "b",
                vec![row("2018-02-09T05:00:00", "2018-02-09T06:00:00", "2")],
            ),
        ],
    };

    let imported = import_tabular(&service, &document, "file.xml").unwrap();

    let names: Vec<&str> = imported
        .iter()
        .map(|catalogue| catalogue.name().unwrap())
        .collect();
    assert_eq!(names, vec!["orbits_0", "orbits_1"]);
    assert!(imported
        .iter()
        .all(|catalogue| catalogue.author().unwrap() == "bob"));
    assert_eq!(members(&service, &imported[1]).len(), 1);
}

#[test]
fn malformed_tables_are_rejected_before_writing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let mut unknown = interval_table("t", vec![]);
    unknown.columns.push(Column {
        name: "raw".to_string(),
        datatype: Some("unsignedByte".to_string()),
        ..Column::default()
    });
    let mut without_start = interval_table("t", vec![]);
    without_start.columns.remove(0);
    let short_row = interval_table(
        "t",
        vec![vec!["2018-02-09T01:00:00".to_string(), "2018-02-09T02:00:00".to_string()]],
    );
    let bad_cell = interval_table(
        "t",
        vec![row("2018-02-09T01:00:00", "2018-02-09T02:00:00", "seven")],
    );

    for table in [unknown, without_start, short_row, bad_cell] {
        let document = TabularDocument {
            description: None,
            tables: vec![table],
        };
        assert!(matches!(
            import_tabular(&service, &document, "bad.xml"),
            Err(CoreError::Format(_))
        ));
    }
    assert!(!service.has_unsaved_changes());
}
