//! Session lifecycle tests: acquisition/release ordering, partial-failure
//! unwinding, lookup and enumeration semantics.

use std::path::PathBuf;

use pretty_assertions::assert_eq;

use rangeport::{Error, NamePredicate, Session};

use crate::common::{sample_book, touch_workbook, FakeEndpoint};

fn open_with_refs(
    endpoint: FakeEndpoint,
    dir: &std::path::Path,
    reference_names: &[&str],
) -> (rangeport::Result<Session>, Vec<PathBuf>) {
    let source = touch_workbook(dir, "src.xlsx");
    let references: Vec<PathBuf> = reference_names
        .iter()
        .map(|n| touch_workbook(dir, n))
        .collect();
    (Session::open(endpoint, source, &references), references)
}

#[test]
fn acquisition_order_is_app_collection_references_then_primary() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = FakeEndpoint::new(sample_book());
    let log = endpoint.log();

    let (session, _) = open_with_refs(endpoint, dir.path(), &["ref1.xlsx", "ref2.xlsx"]);
    let session = session.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "Init",
            "AcquireWorkbooks",
            "OpenWorkbook:ref1.xlsx",
            "OpenWorkbook:ref2.xlsx",
            "OpenWorkbook:src.xlsx",
        ]
    );

    session.close().unwrap();
    assert_eq!(
        log.lock().unwrap()[5..],
        [
            "CloseWorkbook:3", // primary, opened last
            "CloseWorkbook:2", // references, reverse open order
            "CloseWorkbook:1",
            "ReleaseWorkbooks",
            "Shutdown",
        ]
    );
}

#[test]
fn close_is_idempotent_and_drop_after_close_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = FakeEndpoint::new(sample_book());
    let log = endpoint.log();

    let (session, _) = open_with_refs(endpoint, dir.path(), &[]);
    let session = session.unwrap();

    session.close().unwrap();
    let after_first_close = log.lock().unwrap().len();
    session.close().unwrap();
    assert_eq!(log.lock().unwrap().len(), after_first_close);

    drop(session);
    assert_eq!(log.lock().unwrap().len(), after_first_close);
}

#[test]
fn drop_releases_in_reverse_order() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = FakeEndpoint::new(sample_book());
    let log = endpoint.log();

    let (session, _) = open_with_refs(endpoint, dir.path(), &["ref1.xlsx"]);
    drop(session.unwrap());

    assert_eq!(
        log.lock().unwrap()[3..],
        [
            "CloseWorkbook:2",
            "CloseWorkbook:1",
            "ReleaseWorkbooks",
            "Shutdown",
        ]
    );
}

#[test]
fn missing_source_fails_before_any_command() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = FakeEndpoint::new(sample_book());
    let log = endpoint.log();

    let err = Session::open(endpoint, dir.path().join("absent.xlsx"), &[]).unwrap_err();
    assert!(matches!(err, Error::SourceNotFound(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn missing_reference_fails_before_any_command_and_names_it() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = FakeEndpoint::new(sample_book());
    let log = endpoint.log();

    let source = touch_workbook(dir.path(), "src.xlsx");
    let present = touch_workbook(dir.path(), "ref1.xlsx");
    let absent = dir.path().join("ref2.xlsx");

    let err = Session::open(endpoint, source, &[present, absent.clone()]).unwrap_err();
    match err {
        Error::ReferenceNotFound(path) => assert_eq!(path, absent),
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn duplicate_references_open_once() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = FakeEndpoint::new(sample_book());
    let log = endpoint.log();

    let source = touch_workbook(dir.path(), "src.xlsx");
    let reference = touch_workbook(dir.path(), "ref1.xlsx");

    Session::open(endpoint, source, &[reference.clone(), reference]).unwrap();
    let opens = log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("OpenWorkbook:ref1"))
        .count();
    assert_eq!(opens, 1);
}

/// Inject a failure at every acquisition step in turn. Whatever succeeded
/// before the failure must be released, in exact reverse order, before
/// `ApplicationOpenFailed` propagates.
#[test]
fn failure_at_each_acquisition_step_unwinds_in_reverse() {
    // Init, AcquireWorkbooks, ref1, ref2, primary
    let total_steps = 5u64;

    for failing in 1..=total_steps {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = FakeEndpoint::new(sample_book()).fail_command(failing);
        let log = endpoint.log();

        let (session, _) = open_with_refs(endpoint, dir.path(), &["ref1.xlsx", "ref2.xlsx"]);
        let err = session.unwrap_err();
        assert!(
            matches!(err, Error::ApplicationOpenFailed(_)),
            "step {failing}: {err}"
        );

        let log = log.lock().unwrap();
        let acquisitions: Vec<&String> = log
            .iter()
            .take_while(|c| !c.starts_with("fail:"))
            .collect();
        assert_eq!(acquisitions.len() as u64, failing - 1);

        let releases: Vec<&String> = log
            .iter()
            .skip_while(|c| !c.starts_with("fail:"))
            .skip(1)
            .collect();

        // Expected unwind mirrors the successful acquisitions.
        let mut expected: Vec<String> = Vec::new();
        let opened = failing.saturating_sub(3); // workbooks opened before failure
        for handle in (1..=opened).rev() {
            expected.push(format!("CloseWorkbook:{handle}"));
        }
        if failing > 2 {
            expected.push("ReleaseWorkbooks".to_string());
        }
        if failing > 1 {
            expected.push("Shutdown".to_string());
        }

        let releases: Vec<String> = releases.into_iter().cloned().collect();
        assert_eq!(releases, expected, "unwind after failing step {failing}");
    }
}

// -- Lookup and enumeration --

fn open_sample(dir: &std::path::Path) -> Session {
    let source = touch_workbook(dir, "src.xlsx");
    Session::open(FakeEndpoint::new(sample_book()), source, &[]).unwrap()
}

#[test]
fn find_sheet_is_exact_and_case_sensitive() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_sample(dir.path());

    let found = session.find_sheet("List").unwrap().unwrap();
    assert_eq!(found.name(), "List");
    assert_eq!(found.descriptor().address, "A1:B3");

    assert!(session.find_sheet("list").unwrap().is_none());
    assert!(session.find_sheet("Missing").unwrap().is_none());
}

#[test]
fn find_sheet_at_is_one_based() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_sample(dir.path());

    assert_eq!(session.find_sheet_at(1).unwrap().unwrap().name(), "List");
    assert_eq!(session.find_sheet_at(2).unwrap().unwrap().name(), "Ref");
    assert!(session.find_sheet_at(0).unwrap().is_none());
    assert!(session.find_sheet_at(3).unwrap().is_none());
}

#[test]
fn find_table_scans_sheets_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_sample(dir.path());

    let table = session.find_table("RefTable").unwrap().unwrap();
    assert_eq!(table.name(), "RefTable");
    assert_eq!(table.descriptor().address, "A1:A2");
    assert!(session.find_table("NoSuchTable").unwrap().is_none());
}

#[test]
fn sheet_enumeration_is_ordered_filtered_and_restartable() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_sample(dir.path());

    let names = session.sheet_names().unwrap();
    assert_eq!(names, vec!["List", "Ref"]);

    let predicate = NamePredicate::new("^Li.*", true, false).unwrap();
    let filtered: Vec<String> = session
        .sheets(Some(&predicate))
        .unwrap()
        .map(|r| r.unwrap().name().to_string())
        .collect();
    assert_eq!(filtered, vec!["List"]);

    // Re-enumeration re-walks from scratch and yields the same sequence.
    assert_eq!(session.sheet_names().unwrap(), names);
}

#[test]
fn table_enumeration_twice_yields_identical_name_address_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_sample(dir.path());

    let walk = || -> Vec<(String, String)> {
        session
            .tables(None)
            .unwrap()
            .map(|r| {
                let handle = r.unwrap();
                let d = handle.descriptor();
                (d.name, d.address)
            })
            .collect()
    };

    let first = walk();
    let second = walk();
    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![
            ("ListTable".to_string(), "D2:E3".to_string()),
            ("RefTable".to_string(), "A1:A2".to_string()),
        ]
    );
}

#[test]
fn lookups_fail_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let session = open_sample(dir.path());
    session.close().unwrap();
    assert!(session.find_sheet("List").is_err());
}
