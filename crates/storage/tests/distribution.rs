use nf_core::model::{Decision, DistributionStatus, EventType, NoticeStatus};
use nf_core::policy::{ChannelCompletion, WorkflowPolicy};
use nf_storage::{
    CreateDraftRequest, CreateNoticeRequest, DecideRequest, DistributionBegin,
    DistributionBeginRequest, SendResult, SqliteStore, StoreError,
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

/// Store with one approved draft for notice CA-1.
fn approved_draft(test_name: &str, policy: WorkflowPolicy) -> (SqliteStore, i64) {
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
    (store, draft.draft_id)
}

fn begin(draft_id: i64, channel: &str, batch_id: &str) -> DistributionBeginRequest {
    DistributionBeginRequest {
        draft_id,
        channel: channel.to_string(),
        batch_id: batch_id.to_string(),
        actor: "dispatcher".to_string(),
    }
}

#[test]
fn only_approved_drafts_can_distribute() {
    let mut store = SqliteStore::open(temp_dir("not_approved"), WorkflowPolicy::default())
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
        .distribution_begin(begin(draft.draft_id, "email", "B1"))
        .expect_err("draft is not approved");
    match err {
        StoreError::NotApproved { draft_id, status } => {
            assert_eq!(draft_id, draft.draft_id);
            assert_eq!(status, "draft");
        }
        other => panic!("expected NotApproved, got {other:?}"),
    }
}

#[test]
fn replaying_a_sent_batch_returns_the_original_row() {
    let (mut store, draft_id) = approved_draft("replay_sent", WorkflowPolicy::default());

    let first = match store.distribution_begin(begin(draft_id, "email", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(first.distribution_id, SendResult::Sent, "dispatcher")
        .expect("resolve");

    let replay = store
        .distribution_begin(begin(draft_id, "email", "B1"))
        .expect("replay");
    match replay {
        DistributionBegin::AlreadySent(row) => {
            assert_eq!(row.distribution_id, first.distribution_id);
            assert_eq!(row.status, DistributionStatus::Sent);
        }
        other => panic!("expected AlreadySent, got {other:?}"),
    }

    // No second row was created for the batch.
    assert_eq!(store.distributions_for_draft(draft_id).expect("list").len(), 1);
}

#[test]
fn failed_sends_are_recorded_and_retried_on_the_same_row() {
    let (mut store, draft_id) = approved_draft("retry_failed", WorkflowPolicy::default());

    let row = match store.distribution_begin(begin(draft_id, "email", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    let row = store
        .distribution_resolve(
            row.distribution_id,
            SendResult::Failed {
                detail: "smtp timeout".to_string(),
            },
            "dispatcher",
        )
        .expect("resolve failure");
    assert_eq!(row.status, DistributionStatus::Failed);
    assert_eq!(row.result_detail.as_deref(), Some("smtp timeout"));

    // Partial/failed delivery leaves the notice approved.
    let notice = store.notice_get("CA-1").expect("get").expect("exists");
    assert_eq!(notice.status, NoticeStatus::Approved);

    let retried = match store
        .distribution_begin(begin(draft_id, "email", "B1"))
        .expect("retry")
    {
        DistributionBegin::Requeued(requeued) => requeued,
        other => panic!("expected Requeued, got {other:?}"),
    };
    assert_eq!(retried.distribution_id, row.distribution_id);
    assert_eq!(retried.status, DistributionStatus::Queued);
    assert!(retried.result_detail.is_none());

    store
        .distribution_resolve(retried.distribution_id, SendResult::Sent, "dispatcher")
        .expect("resolve success");
    let notice = store.notice_get("CA-1").expect("get").expect("exists");
    assert_eq!(notice.status, NoticeStatus::Distributed);
    assert_eq!(store.distributions_for_draft(draft_id).expect("list").len(), 1);
}

#[test]
fn all_required_channels_gate_the_distributed_status() {
    let policy = WorkflowPolicy {
        required_channels: vec!["email".to_string(), "postal".to_string()],
        channel_completion: ChannelCompletion::AllRequired,
        ..WorkflowPolicy::default()
    };
    let (mut store, draft_id) = approved_draft("all_required", policy);

    let email = match store.distribution_begin(begin(draft_id, "email", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(email.distribution_id, SendResult::Sent, "dispatcher")
        .expect("email sent");

    // One of two required channels: not distributed yet.
    let notice = store.notice_get("CA-1").expect("get").expect("exists");
    assert_eq!(notice.status, NoticeStatus::Approved);

    let postal = match store.distribution_begin(begin(draft_id, "postal", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(postal.distribution_id, SendResult::Sent, "dispatcher")
        .expect("postal sent");

    let notice = store.notice_get("CA-1").expect("get").expect("exists");
    assert_eq!(notice.status, NoticeStatus::Distributed);
}

#[test]
fn any_channel_policy_completes_on_the_first_send() {
    let policy = WorkflowPolicy {
        required_channels: vec!["email".to_string(), "postal".to_string()],
        channel_completion: ChannelCompletion::AnyChannel,
        ..WorkflowPolicy::default()
    };
    let (mut store, draft_id) = approved_draft("any_channel", policy);

    let row = match store.distribution_begin(begin(draft_id, "postal", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(row.distribution_id, SendResult::Sent, "dispatcher")
        .expect("postal sent");

    let notice = store.notice_get("CA-1").expect("get").expect("exists");
    assert_eq!(notice.status, NoticeStatus::Distributed);
}

#[test]
fn resolving_a_non_queued_row_is_refused() {
    let (mut store, draft_id) = approved_draft("resolve_guard", WorkflowPolicy::default());

    let row = match store.distribution_begin(begin(draft_id, "email", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(row.distribution_id, SendResult::Sent, "dispatcher")
        .expect("first resolve");

    let err = store
        .distribution_resolve(row.distribution_id, SendResult::Sent, "dispatcher")
        .expect_err("already resolved");
    match err {
        StoreError::InvalidState { expected, actual } => {
            assert_eq!(expected, "queued");
            assert_eq!(actual, "sent");
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[test]
fn a_new_batch_gets_its_own_row() {
    let (mut store, draft_id) = approved_draft("new_batch", WorkflowPolicy::default());

    let b1 = match store.distribution_begin(begin(draft_id, "email", "B1")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued, got {other:?}"),
    };
    store
        .distribution_resolve(b1.distribution_id, SendResult::Sent, "dispatcher")
        .expect("resolve");

    let b2 = match store.distribution_begin(begin(draft_id, "email", "B2")).expect("begin") {
        DistributionBegin::Queued(row) => row,
        other => panic!("expected Queued for new batch, got {other:?}"),
    };
    assert_ne!(b1.distribution_id, b2.distribution_id);
    assert_eq!(store.distributions_for_draft(draft_id).expect("list").len(), 2);
}
