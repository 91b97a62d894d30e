use nf_core::model::{Decision, EventType};
use nf_core::policy::WorkflowPolicy;
use nf_storage::{
    CreateDraftRequest, CreateNoticeRequest, DecideRequest, DistributionBegin,
    DistributionBeginRequest, SendResult, SqliteStore, StoreError,
};
use rusqlite::{Connection, params};
use std::path::PathBuf;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("nf_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn sample_notice(notice_id: &str) -> CreateNoticeRequest {
    CreateNoticeRequest {
        notice_id: notice_id.to_string(),
        security_code: "7203".to_string(),
        security_name: "Example Motor Corp".to_string(),
        event_type: EventType::Dividend,
        record_date: "2024-03-31".to_string(),
        payment_date: None,
        notice_text: "Dividend announcement.".to_string(),
        source_channel: "manual".to_string(),
        actor: "intake-bot".to_string(),
    }
}

/// Runs the full workflow once so the ledger carries entries for every
/// entity type.
fn run_workflow(store: &mut SqliteStore) {
    store.notice_create(sample_notice("CA-1")).expect("notice");
    let draft = store
        .draft_create(CreateDraftRequest {
            notice_id: "CA-1".to_string(),
            editor_id: "alice".to_string(),
            edited_text: "v1".to_string(),
            source_output_id: None,
            supersede: false,
        })
        .expect("draft");
    store
        .draft_submit_for_review(draft.draft_id, "alice", None)
        .expect("submit");
    store
        .draft_decide(DecideRequest {
            draft_id: draft.draft_id,
            approver_id: "bob".to_string(),
            decision: Decision::Approved,
            comment: None,
            expected_revision: None,
        })
        .expect("approve");
    let row = match store
        .distribution_begin(DistributionBeginRequest {
            draft_id: draft.draft_id,
            channel: "email".to_string(),
            batch_id: "B1".to_string(),
            actor: "dispatcher".to_string(),
        })
        .expect("begin")
    {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(row.distribution_id, SendResult::Sent, "dispatcher")
        .expect("resolve");
}

#[test]
fn untouched_ledger_verifies_from_genesis() {
    let dir = temp_dir("verify_ok");
    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("open store");
    run_workflow(&mut store);

    let entries = store.audit_list().expect("audit list");
    assert!(!entries.is_empty());
    let verified = store.audit_verify_chain().expect("verify");
    assert_eq!(verified, entries.len() as u64);
}

#[test]
fn every_transition_lands_in_the_ledger_in_order() {
    let dir = temp_dir("audit_order");
    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("open store");
    run_workflow(&mut store);

    let actions: Vec<String> = store
        .audit_list()
        .expect("audit list")
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            "notice.create",
            "notice.status",
            "draft.create",
            "notice.status",
            "draft.submit",
            "notice.status",
            "draft.decide",
            "distribution.queue",
            "notice.status",
            "distribution.result",
        ]
    );

    let seqs: Vec<i64> = store
        .audit_list()
        .expect("audit list")
        .into_iter()
        .map(|entry| entry.seq)
        .collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
}

#[test]
fn tampering_with_an_entry_breaks_the_chain_at_its_seq() {
    let dir = temp_dir("tamper");
    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("open store");
    run_workflow(&mut store);
    drop(store);

    // Rewrite history behind the store's back.
    let conn = Connection::open(dir.join("noticeflow.db")).expect("raw connection");
    conn.execute(
        "UPDATE audit_log SET actor = ?1 WHERE seq = 3",
        params!["mallory"],
    )
    .expect("tamper");
    drop(conn);

    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("reopen store");
    let err = store.audit_verify_chain().expect_err("chain must break");
    match err {
        StoreError::ChainBroken { seq } => assert_eq!(seq, 3),
        other => panic!("expected ChainBroken, got {other:?}"),
    }
    assert_eq!(err.code(), "CHAIN_BROKEN");
}

#[test]
fn rewriting_a_digest_is_detected_too() {
    let dir = temp_dir("tamper_digest");
    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("open store");
    run_workflow(&mut store);
    drop(store);

    let conn = Connection::open(dir.join("noticeflow.db")).expect("raw connection");
    conn.execute(
        "UPDATE audit_log SET payload_digest = ?1 WHERE seq = 1",
        params!["deadbeef"],
    )
    .expect("tamper");
    drop(conn);

    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("reopen store");
    let err = store.audit_verify_chain().expect_err("chain must break");
    assert!(matches!(err, StoreError::ChainBroken { seq: 1 }));
}

#[test]
fn a_broken_chain_halts_audited_writes_until_reopen() {
    let dir = temp_dir("poisoned_writes");
    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("open store");
    run_workflow(&mut store);
    drop(store);

    let conn = Connection::open(dir.join("noticeflow.db")).expect("raw connection");
    conn.execute(
        "UPDATE audit_log SET actor = ?1 WHERE seq = 2",
        params!["mallory"],
    )
    .expect("tamper");
    drop(conn);

    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("reopen store");
    assert!(store.audit_verify_chain().is_err());

    // The handle is poisoned: every audited write is refused.
    let err = store
        .notice_create(sample_notice("CA-2"))
        .expect_err("writes halted");
    assert!(matches!(err, StoreError::ChainBroken { seq: 2 }));

    // Reads still work for the operator.
    assert!(store.notice_get("CA-1").expect("read").is_some());

    // Reopening is the operator's reset; writes work again.
    let mut store = SqliteStore::open(&dir, WorkflowPolicy::default()).expect("reopen again");
    store.notice_create(sample_notice("CA-2")).expect("create after reopen");
}
