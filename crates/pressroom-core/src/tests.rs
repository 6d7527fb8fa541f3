use super::*;

use std::sync::Arc;
use std::thread;

use chrono::Utc;

#[test]
fn normalize_uri_collapses_leading_separators() {
    assert_eq!(normalize_uri("zero.txt"), "/zero.txt");
    assert_eq!(normalize_uri("/one.txt"), "/one.txt");
    assert_eq!(normalize_uri("//two.txt"), "/two.txt");
    assert_eq!(normalize_uri("///deep/three.txt"), "/deep/three.txt");
}

#[test]
fn timestamp_format_carries_explicit_utc_offset() {
    let now = Utc::now();
    let rendered = to_timestamp(now);
    assert!(rendered.ends_with("+0000"), "got: {rendered}");

    let parsed = parse_timestamp(&rendered).expect("must parse");
    assert_eq!(to_timestamp(parsed), rendered);
}

#[test]
fn timestamp_rejects_garbage() {
    assert!(parse_timestamp("not a date").is_err());
    assert!(parse_timestamp("2026-08-04").is_err());
}

#[test]
fn uri_info_stop_with_fingerprint_marks_uploaded() {
    let mut info = UriInfo::new("/test.txt", Utc::now());
    assert_eq!(info.status, UriStatus::Started);

    info.stop(Some("abc123".to_string()));
    assert_eq!(info.status, UriStatus::Uploaded);
    assert_eq!(info.sha256.as_deref(), Some("abc123"));
    assert!(info.ended_at.is_some());
    assert!(info.duration_ms.expect("duration") >= 0);
    assert!(!info.has_error());
}

#[test]
fn uri_info_stop_without_fingerprint_marks_upload_failed() {
    let mut info = UriInfo::new("/test.txt", Utc::now());
    info.stop(None);
    assert_eq!(info.status, UriStatus::UploadFailed);
    assert!(info.sha256.is_none());
}

#[test]
fn uri_info_blank_fingerprint_marks_upload_failed() {
    let mut info = UriInfo::new("/test.txt", Utc::now());
    info.stop(Some("   ".to_string()));
    assert_eq!(info.status, UriStatus::UploadFailed);
}

#[test]
fn unknown_uri_info_carries_error() {
    let info = UriInfo::unknown("nowhere.txt");
    assert_eq!(info.uri, "/nowhere.txt");
    assert_eq!(info.status, UriStatus::Unknown);
    assert_eq!(info.error.as_deref(), Some(UNKNOWN_URI_ERROR));
    assert!(info.has_error());
}

#[test]
fn new_transaction_is_open_with_unique_id() {
    let first = Transaction::new();
    let second = Transaction::new();
    assert_ne!(first.id(), second.id());
    assert_eq!(first.status(), TransactionStatus::Started);
    assert!(first.is_open());
    assert!(!first.has_errors());
}

#[test]
fn first_stage_moves_status_to_publishing() {
    let transaction = Transaction::new();
    transaction.add_uri(UriInfo::new("/a.txt", Utc::now()));
    assert_eq!(transaction.status(), TransactionStatus::Publishing);
    assert!(transaction.is_open());
}

#[test]
fn second_stage_of_same_uri_replaces_first() {
    let transaction = Transaction::new();

    let mut first = UriInfo::new("/a.txt", Utc::now());
    first.stop(Some("first".to_string()));
    transaction.add_uri(first);

    let mut second = UriInfo::new("/a.txt", Utc::now());
    second.stop(Some("second".to_string()));
    transaction.add_uri(second);

    let additions = transaction.additions();
    assert_eq!(additions.len(), 1);
    assert_eq!(
        additions.get("/a.txt").expect("record").sha256.as_deref(),
        Some("second")
    );
}

#[test]
fn has_errors_via_transaction_error() {
    let transaction = Transaction::new();
    assert!(!transaction.has_errors());
    transaction.add_error("something went wrong");
    assert!(transaction.has_errors());
    assert_eq!(transaction.errors().len(), 1);
}

#[test]
fn has_errors_via_addition_error() {
    let transaction = Transaction::new();
    let mut info = UriInfo::new("/broken.txt", Utc::now());
    info.stop(None);
    info.record_error("disk full");
    transaction.add_uri(info);

    assert!(transaction.has_errors());
    assert!(transaction.errors().is_empty());
}

#[test]
fn mark_addition_committed_requires_matching_record() {
    let transaction = Transaction::new();
    transaction.add_uri(UriInfo::new("/a.txt", Utc::now()));

    assert!(transaction.mark_addition_committed("/a.txt"));
    assert!(!transaction.mark_addition_committed("/missing.txt"));

    let additions = transaction.additions();
    assert_eq!(
        additions.get("/a.txt").expect("record").status,
        UriStatus::Committed
    );
}

#[test]
fn mark_addition_commit_failed_records_the_error() {
    let transaction = Transaction::new();
    transaction.add_uri(UriInfo::new("/a.txt", Utc::now()));

    assert!(transaction.mark_addition_commit_failed("/a.txt", "disk full"));
    assert!(!transaction.mark_addition_commit_failed("/missing.txt", "disk full"));

    let additions = transaction.additions();
    let failed = additions.get("/a.txt").expect("record");
    assert_eq!(failed.status, UriStatus::CommitFailed);
    assert_eq!(failed.error.as_deref(), Some("disk full"));
    assert!(transaction.has_errors());
}

#[test]
fn rollback_marks_every_addition() {
    let transaction = Transaction::new();
    transaction.add_uri(UriInfo::new("/a.txt", Utc::now()));
    transaction.add_uri(UriInfo::new("/b.txt", Utc::now()));

    transaction.mark_additions_rolled_back();
    transaction.end_rollback(true);

    assert_eq!(transaction.status(), TransactionStatus::RolledBack);
    assert!(transaction.ended_at().is_some());
    for info in transaction.additions().values() {
        assert_eq!(info.status, UriStatus::RolledBack);
    }
}

#[test]
fn end_commit_reflects_outcome() {
    let ok = Transaction::new();
    ok.end_commit(true);
    assert_eq!(ok.status(), TransactionStatus::Committed);
    assert!(ok.ended_at().is_some());
    assert!(!ok.is_open());

    let failed = Transaction::new();
    failed.end_commit(false);
    assert_eq!(failed.status(), TransactionStatus::CommitFailed);
}

#[test]
fn terminal_status_does_not_reopen_on_late_stage() {
    let transaction = Transaction::new();
    transaction.end_commit(true);
    transaction.add_uri(UriInfo::new("/late.txt", Utc::now()));
    assert_eq!(transaction.status(), TransactionStatus::Committed);
}

#[test]
fn uri_info_lookup_synthesizes_unknown_record() {
    let transaction = Transaction::new();
    transaction.add_uri(UriInfo::new("/known.txt", Utc::now()));

    let known = transaction.uri_info("known.txt");
    assert_eq!(known.uri, "/known.txt");
    assert_eq!(known.status, UriStatus::Started);

    let missing = transaction.uri_info("/missing.txt");
    assert_eq!(missing.status, UriStatus::Unknown);
    assert_eq!(missing.error.as_deref(), Some(UNKNOWN_URI_ERROR));
}

#[test]
fn record_round_trips_through_json() {
    let transaction = Transaction::new();
    let mut staged = UriInfo::new("/pages/index.html", Utc::now());
    staged.stop(Some("deadbeef".to_string()));
    transaction.add_uri(staged);
    transaction.add_uri_delete(UriInfo::new("/old/page.html", Utc::now()));
    transaction.add_error("first error");
    transaction.end_commit(false);

    let record = transaction.record();
    let raw = serde_json::to_string_pretty(&record).expect("must serialize");
    let reloaded: TransactionRecord = serde_json::from_str(&raw).expect("must parse");
    assert_eq!(reloaded, record);

    let rebuilt = Transaction::from_record(reloaded);
    assert_eq!(rebuilt.id(), transaction.id());
    assert_eq!(rebuilt.status(), TransactionStatus::CommitFailed);
    assert_eq!(rebuilt.record(), record);
}

#[test]
fn record_tolerates_unrecognized_uri_status() {
    let raw = r#"{"uri": "/a.txt", "status": "some-future-state"}"#;
    let info: UriInfo = serde_json::from_str(raw).expect("must parse");
    assert_eq!(info.status, UriStatus::Unknown);
}

#[test]
fn errors_only_view_filters_clean_additions() {
    let transaction = Transaction::new();
    let mut clean = UriInfo::new("/clean.txt", Utc::now());
    clean.stop(Some("ok".to_string()));
    transaction.add_uri(clean);
    let mut broken = UriInfo::new("/broken.txt", Utc::now());
    broken.stop(None);
    broken.record_error("write failed");
    transaction.add_uri(broken);
    transaction.add_uri_delete(UriInfo::new("/gone.txt", Utc::now()));
    transaction.add_error("top-level error");

    let view = transaction.record().errors_only();
    assert_eq!(view.additions.len(), 1);
    assert_eq!(view.additions[0].uri, "/broken.txt");
    assert!(view.deletions.is_empty());
    assert_eq!(view.errors, vec!["top-level error".to_string()]);
    assert!(view.has_errors());
}

#[test]
fn manifest_defaults_missing_collections_to_empty() {
    let manifest = Manifest::from_json_str("{}").expect("must parse");
    assert!(manifest.files_to_copy.is_empty());
    assert!(manifest.uris_to_delete.is_empty());

    let manifest = Manifest::from_json_str(
        r#"{
            "files_to_copy": [{"source": "/a.txt", "target": "/b.txt"}],
            "uris_to_delete": ["/old"]
        }"#,
    )
    .expect("must parse");
    assert_eq!(manifest.files_to_copy.len(), 1);
    assert_eq!(manifest.files_to_copy[0].source, "/a.txt");
    assert_eq!(manifest.uris_to_delete, vec!["/old".to_string()]);
}

#[test]
fn concurrent_adds_lose_no_records() {
    let transaction = Arc::new(Transaction::new());
    let mut handles = Vec::new();
    for index in 0..16 {
        let transaction = transaction.clone();
        handles.push(thread::spawn(move || {
            let mut info = UriInfo::new(&format!("/file-{index}.txt"), Utc::now());
            info.stop(Some(format!("sha-{index}")));
            transaction.add_uri(info);
        }));
    }
    for handle in handles {
        handle.join().expect("thread must finish");
    }

    let additions = transaction.additions();
    assert_eq!(additions.len(), 16);
    for index in 0..16 {
        assert!(additions.contains_key(&format!("/file-{index}.txt")));
    }
}
