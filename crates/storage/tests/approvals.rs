use nf_core::model::{ApprovalStatus, Decision, EventType, NoticeStatus};
use nf_core::policy::WorkflowPolicy;
use nf_storage::{
    CreateDraftRequest, CreateNoticeRequest, DecideRequest, SqliteStore, StoreError,
};
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

/// Store with one notice and one pending draft edited by alice.
fn pending_draft(test_name: &str, policy: WorkflowPolicy) -> (SqliteStore, i64) {
    let mut store = SqliteStore::open(temp_dir(test_name), policy).expect("open store");
    store
        .notice_create(CreateNoticeRequest {
            notice_id: "CA-1".to_string(),
            security_code: "7203".to_string(),
            security_name: "Example Motor Corp".to_string(),
            event_type: EventType::Dividend,
            record_date: "2024-03-31".to_string(),
            payment_date: None,
            notice_text: "Dividend announcement.".to_string(),
            source_channel: "manual".to_string(),
            actor: "intake-bot".to_string(),
        })
        .expect("notice");
    let draft = store
        .draft_create(CreateDraftRequest {
            notice_id: "CA-1".to_string(),
            editor_id: "alice".to_string(),
            edited_text: "v1".to_string(),
            source_output_id: None,
            supersede: false,
        })
        .expect("draft");
    let draft = store
        .draft_submit_for_review(draft.draft_id, "alice", None)
        .expect("submit");
    (store, draft.draft_id)
}

fn decide(draft_id: i64, approver: &str, decision: Decision) -> DecideRequest {
    DecideRequest {
        draft_id,
        approver_id: approver.to_string(),
        decision,
        comment: None,
        expected_revision: None,
    }
}

#[test]
fn the_editor_cannot_approve_their_own_draft() {
    let (mut store, draft_id) = pending_draft("self_approval", WorkflowPolicy::default());

    let err = store
        .draft_decide(decide(draft_id, "alice", Decision::Approved))
        .expect_err("maker-checker violation");
    assert!(matches!(err, StoreError::SelfApproval));
    assert_eq!(err.code(), "SELF_APPROVAL");

    // No decision row was recorded for the refused call.
    assert!(store.approval_history(draft_id).expect("history").is_empty());
}

#[test]
fn self_approval_is_allowed_when_maker_checker_is_off() {
    let policy = WorkflowPolicy {
        maker_checker: false,
        ..WorkflowPolicy::default()
    };
    let (mut store, draft_id) = pending_draft("maker_checker_off", policy);

    let (draft, _) = store
        .draft_decide(decide(draft_id, "alice", Decision::Approved))
        .expect("decide");
    assert_eq!(draft.approval_status, ApprovalStatus::Approved);
}

#[test]
fn decide_requires_a_pending_draft() {
    let mut store = SqliteStore::open(temp_dir("decide_guard"), WorkflowPolicy::default())
        .expect("open store");
    store
        .notice_create(CreateNoticeRequest {
            notice_id: "CA-1".to_string(),
            security_code: "7203".to_string(),
            security_name: "Example Motor Corp".to_string(),
            event_type: EventType::Dividend,
            record_date: "2024-03-31".to_string(),
            payment_date: None,
            notice_text: "Dividend announcement.".to_string(),
            source_channel: "manual".to_string(),
            actor: "intake-bot".to_string(),
        })
        .expect("notice");
    let draft = store
        .draft_create(CreateDraftRequest {
            notice_id: "CA-1".to_string(),
            editor_id: "alice".to_string(),
            edited_text: "v1".to_string(),
            source_output_id: None,
            supersede: false,
        })
        .expect("draft");

    let err = store
        .draft_decide(decide(draft.draft_id, "bob", Decision::Approved))
        .expect_err("not submitted yet");
    match err {
        StoreError::InvalidState { expected, actual } => {
            assert_eq!(expected, "pending");
            assert_eq!(actual, "draft");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn exactly_one_of_two_racing_decisions_wins() {
    let (mut store, draft_id) = pending_draft("decide_race", WorkflowPolicy::default());

    // Both reviewers read the same revision before deciding.
    let revision = store
        .draft_get(draft_id)
        .expect("get")
        .expect("exists")
        .revision;

    let (draft, _) = store
        .draft_decide(DecideRequest {
            expected_revision: Some(revision),
            ..decide(draft_id, "bob", Decision::Approved)
        })
        .expect("first decide wins");
    assert_eq!(draft.approval_status, ApprovalStatus::Approved);

    let err = store
        .draft_decide(DecideRequest {
            expected_revision: Some(revision),
            ..decide(draft_id, "carol", Decision::Rejected)
        })
        .expect_err("second decide loses");
    match err {
        StoreError::ConcurrentModification { expected, actual } => {
            assert_eq!(expected, revision);
            assert_eq!(actual, revision + 1);
        }
        other => panic!("expected ConcurrentModification, got {other:?}"),
    }
    assert!(err.is_retryable());

    // Exactly one decision row exists.
    let history = store.approval_history(draft_id).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].approver_id, "bob");
}

#[test]
fn rejection_keeps_the_notice_open_for_redrafting() {
    let (mut store, draft_id) = pending_draft("reject_reopens", WorkflowPolicy::default());

    let (draft, approval) = store
        .draft_decide(DecideRequest {
            comment: Some("tone is wrong".to_string()),
            ..decide(draft_id, "bob", Decision::Rejected)
        })
        .expect("decide");
    assert_eq!(draft.approval_status, ApprovalStatus::Rejected);
    assert_eq!(approval.approval_comment.as_deref(), Some("tone is wrong"));

    // Unlimited redrafts by default: still in review, awaiting a new version.
    let notice = store.notice_get("CA-1").expect("get").expect("exists");
    assert_eq!(notice.status, NoticeStatus::UnderReview);
}

#[test]
fn returned_drafts_loop_back_through_editing() {
    let (mut store, draft_id) = pending_draft("returned_loop", WorkflowPolicy::default());

    let (draft, _) = store
        .draft_decide(decide(draft_id, "bob", Decision::Returned))
        .expect("return");
    assert_eq!(draft.approval_status, ApprovalStatus::Draft);
    assert_eq!(store.draft_derived_status(draft_id).expect("derived"), draft.approval_status);

    let draft = store
        .draft_submit_for_review(draft_id, "alice", None)
        .expect("resubmit");
    assert_eq!(draft.approval_status, ApprovalStatus::Pending);

    let (draft, _) = store
        .draft_decide(decide(draft_id, "bob", Decision::Approved))
        .expect("approve");
    assert_eq!(draft.approval_status, ApprovalStatus::Approved);

    let decisions: Vec<Decision> = store
        .approval_history(draft_id)
        .expect("history")
        .into_iter()
        .map(|row| row.decision)
        .collect();
    assert_eq!(decisions, vec![Decision::Returned, Decision::Approved]);
}

#[test]
fn stored_status_always_matches_the_projection() {
    let (mut store, draft_id) = pending_draft("projection", WorkflowPolicy::default());
    let check = |store: &SqliteStore| {
        let stored = store
            .draft_get(draft_id)
            .expect("get")
            .expect("exists")
            .approval_status;
        let derived = store.draft_derived_status(draft_id).expect("derived");
        assert_eq!(stored, derived);
    };

    check(&store);
    store
        .draft_decide(decide(draft_id, "bob", Decision::Returned))
        .expect("return");
    check(&store);
    store
        .draft_submit_for_review(draft_id, "alice", None)
        .expect("resubmit");
    check(&store);
    store
        .draft_decide(decide(draft_id, "bob", Decision::Rejected))
        .expect("reject");
    check(&store);
}
