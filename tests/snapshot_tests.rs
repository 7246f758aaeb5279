// Integration tests for baseline capture, sibling tables and flat files.

mod common;

use common::TestDb;
use datafresh::{DataFresh, Error, TableRef};
use std::fs;

#[test]
fn test_sibling_baseline_matches_live_tables() {
    let db = TestDb::shop();
    let fresh = db.fresh();
    fresh.prepare(true).unwrap();

    for table in ["Customers", "Orders", "Regions"] {
        assert_eq!(db.dump(table), db.dump(&format!("{table}__backup")), "{table}");
    }
}

#[test]
fn test_create_snapshot_twice_is_identical() {
    let db = TestDb::shop();
    let fresh = db.fresh();
    fresh.prepare(true).unwrap();
    let first = db.dump("Orders__backup");

    let report = fresh.create_snapshot().unwrap();
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.total_rows(), 7);

    assert_eq!(db.dump("Orders__backup"), first);
    assert_eq!(first.len(), 3);
}

#[test]
fn test_flat_file_snapshot_twice_is_byte_identical() {
    let db = TestDb::shop();
    let fresh = DataFresh::open(db.flat_file_config()).unwrap();
    fresh.prepare(true).unwrap();

    let path = db.snapshot_root().join("main.Customers.jsonl");
    let first = fs::read(&path).unwrap();
    fresh.create_snapshot().unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
    assert_eq!(String::from_utf8(first).unwrap().lines().count(), 2);
}

#[test]
fn test_snapshot_overwrites_previous_baseline() {
    let db = TestDb::shop();
    let fresh = db.fresh();
    fresh.prepare(true).unwrap();

    db.exec("INSERT INTO Regions (Code, Label) VALUES ('AS', 'Asia');");
    fresh.create_snapshot().unwrap();
    let new_baseline = db.dump("Regions");
    assert_eq!(new_baseline.len(), 3);

    db.exec("DELETE FROM Regions;");
    fresh.refresh().unwrap();

    assert_eq!(db.dump("Regions"), new_baseline);
}

#[test]
fn test_flat_file_restore_preserves_values() {
    let db = TestDb::shop();
    let fresh = DataFresh::open(db.flat_file_config()).unwrap();
    fresh.prepare(true).unwrap();
    let baseline = db.dump("Customers");

    db.exec(
        "UPDATE Customers SET Photo = x'deadbeef', Score = 2.5 WHERE Id = 1;
         INSERT INTO Customers (Name, Photo, Score) VALUES ('Linus', NULL, NULL);",
    );
    fresh.refresh().unwrap();

    assert_eq!(db.dump("Customers"), baseline);
    assert!(!fresh.has_database_been_modified().unwrap());
}

#[test]
fn test_flat_file_checksum_mismatch_fails_restore() {
    let db = TestDb::shop();
    let fresh = DataFresh::open(db.flat_file_config()).unwrap();
    fresh.prepare(true).unwrap();

    let path = db.snapshot_root().join("main.Regions.jsonl");
    let tampered = fs::read_to_string(&path).unwrap().replace("Europe", "Eurape");
    fs::write(&path, tampered).unwrap();

    db.exec("INSERT INTO Regions (Code, Label) VALUES ('OC', 'Oceania');");
    match fresh.refresh() {
        Err(Error::Transfer { failed, attempted, .. }) => {
            assert_eq!(attempted, 1);
            assert_eq!(failed[0].0, TableRef::new("main", "Regions"));
            assert!(failed[0].1.contains("checksum"), "{}", failed[0].1);
        }
        other => panic!("expected transfer error, got {other:?}"),
    }
}

#[test]
fn test_shape_drift_is_a_restore_failure() {
    let db = TestDb::shop();
    let fresh = db.fresh();
    fresh.prepare(true).unwrap();

    db.exec("ALTER TABLE Regions ADD COLUMN Population INTEGER;");
    db.exec("INSERT INTO Regions (Code, Label) VALUES ('AN', 'Antarctica');");

    match fresh.refresh() {
        Err(Error::Transfer { failed, .. }) => {
            assert_eq!(failed.len(), 1);
            assert!(failed[0].1.contains("shape mismatch"), "{}", failed[0].1);
        }
        other => panic!("expected transfer error, got {other:?}"),
    }
}

#[test]
fn test_snapshot_after_drift_rebuilds_sibling() {
    let db = TestDb::shop();
    let fresh = db.fresh();
    fresh.prepare(true).unwrap();

    db.exec("ALTER TABLE Regions ADD COLUMN Population INTEGER;");
    fresh.create_snapshot().unwrap();

    let backup = db.dump("Regions__backup");
    assert_eq!(backup.len(), 2);
    assert_eq!(backup[0].len(), 3);

    db.exec("UPDATE Regions SET Population = 1;");
    fresh.refresh().unwrap();
    assert_eq!(db.dump("Regions"), backup);
}

#[test]
fn test_missing_baseline_is_reported_per_table() {
    let db = TestDb::shop();
    let fresh = db.fresh();
    fresh.prepare(false).unwrap();

    db.exec(
        "INSERT INTO Regions (Code, Label) VALUES ('AF', 'Africa');
         UPDATE Customers SET Name = 'X' WHERE Id = 2;",
    );

    match fresh.refresh() {
        Err(Error::Transfer { failed, attempted, .. }) => {
            assert_eq!(attempted, 2);
            assert_eq!(failed.len(), 2);
            assert!(failed.iter().all(|(_, m)| m.contains("no baseline")));
        }
        other => panic!("expected transfer error, got {other:?}"),
    }
}

#[test]
fn test_flat_file_restore_keeps_non_utf8_text() {
    let db = TestDb::with_schema(
        "CREATE TABLE Notes (Id INTEGER PRIMARY KEY, Body TEXT);
         INSERT INTO Notes VALUES (1, CAST(x'ff00fe41' AS TEXT));
         INSERT INTO Notes VALUES (2, 'plain');",
    );
    let fresh = DataFresh::open(db.flat_file_config()).unwrap();
    fresh.prepare(true).unwrap();

    db.exec("UPDATE Notes SET Body = 'edited';");
    fresh.refresh().unwrap();

    let body = |id: i64| -> (String, String) {
        db.conn()
            .query_row("SELECT typeof(Body), hex(Body) FROM Notes WHERE Id = ?1", [id], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap()
    };
    assert_eq!(body(1), ("text".to_string(), "FF00FE41".to_string()));
    assert_eq!(body(2), ("text".to_string(), "706C61696E".to_string()));
}

const LOOKALIKE_SCHEMA: &str = "
    CREATE TABLE \"Order Lines\" (Id INTEGER PRIMARY KEY, Label TEXT);
    CREATE TABLE Order_Lines (Id INTEGER PRIMARY KEY, Label TEXT);
    INSERT INTO \"Order Lines\" VALUES (1, 'space');
    INSERT INTO Order_Lines VALUES (1, 'underscore');
    INSERT INTO Order_Lines VALUES (2, 'underscore2');
";

#[test]
fn test_flat_file_entries_are_distinct_for_lookalike_names() {
    let db = TestDb::with_schema(LOOKALIKE_SCHEMA);
    let fresh = DataFresh::open(db.flat_file_config()).unwrap();
    fresh.prepare(true).unwrap();
    let spaced = db.dump("Order Lines");
    let underscored = db.dump("Order_Lines");

    db.exec("UPDATE \"Order Lines\" SET Label = 'changed'; DELETE FROM Order_Lines WHERE Id = 2;");
    let summary = fresh.refresh().unwrap();

    assert_eq!(summary.reloaded.attempted(), 2);
    assert_eq!(db.dump("Order Lines"), spaced);
    assert_eq!(db.dump("Order_Lines"), underscored);
}

#[test]
fn test_flat_file_entry_of_another_table_is_refused() {
    let db = TestDb::shop();
    let fresh = DataFresh::open(db.flat_file_config()).unwrap();
    fresh.prepare(true).unwrap();

    // Put the Customers baseline where Regions' baseline belongs.
    let root = db.snapshot_root();
    fs::copy(root.join("main.Customers.jsonl"), root.join("main.Regions.jsonl")).unwrap();
    fs::copy(root.join("main.Customers.meta.json"), root.join("main.Regions.meta.json")).unwrap();

    db.exec("DELETE FROM Regions WHERE Code = 'EU';");
    match fresh.refresh() {
        Err(Error::Transfer { failed, .. }) => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, TableRef::new("main", "Regions"));
            assert!(failed[0].1.contains("belongs to main.Customers"), "{}", failed[0].1);
        }
        other => panic!("expected transfer error, got {other:?}"),
    }
}
