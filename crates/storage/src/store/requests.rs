#![forbid(unsafe_code)]

use nf_core::model::{ApprovalStatus, Decision, DistributionStatus, EventType, NoticeStatus};

#[derive(Clone, Debug)]
pub struct CreateNoticeRequest {
    pub notice_id: String,
    pub security_code: String,
    pub security_name: String,
    pub event_type: EventType,
    /// `YYYY-MM-DD`.
    pub record_date: String,
    pub payment_date: Option<String>,
    pub notice_text: String,
    pub source_channel: String,
    pub actor: String,
}

#[derive(Clone, Debug)]
pub struct NoticeRow {
    pub notice_id: String,
    pub security_code: String,
    pub security_name: String,
    pub event_type: EventType,
    pub record_date: String,
    pub payment_date: Option<String>,
    pub notice_text: String,
    pub source_channel: String,
    pub status: NoticeStatus,
    pub revision: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct RecordAiRequest {
    pub notice_id: String,
    pub template_type: String,
    pub customer_segment: String,
    pub prompt_json: String,
    pub requested_by: String,
}

#[derive(Clone, Debug)]
pub struct AiRequestRow {
    pub ai_request_id: i64,
    pub notice_id: String,
    pub template_type: String,
    pub customer_segment: String,
    pub prompt_json: String,
    pub requested_by: String,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct RecordAiOutput {
    pub ai_request_id: i64,
    pub internal_summary: String,
    pub customer_draft: String,
    pub model_version: String,
    pub risk_tokens: Vec<String>,
    pub actor: String,
}

#[derive(Clone, Debug)]
pub struct AiOutputRow {
    pub ai_output_id: i64,
    pub ai_request_id: i64,
    pub internal_summary: String,
    pub customer_draft: String,
    pub model_version: String,
    pub risk_tokens: Vec<String>,
    pub generated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct CreateDraftRequest {
    pub notice_id: String,
    pub editor_id: String,
    pub edited_text: String,
    pub source_output_id: Option<i64>,
    /// Atomically reject a currently active draft instead of failing with
    /// `ActiveDraftExists`.
    pub supersede: bool,
}

#[derive(Clone, Debug)]
pub struct DraftRow {
    pub draft_id: i64,
    pub notice_id: String,
    pub ai_output_id: Option<i64>,
    pub version_no: i64,
    pub editor_id: String,
    pub edited_text: String,
    pub risk_flag: bool,
    pub approval_status: ApprovalStatus,
    pub review_comment: Option<String>,
    pub revision: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct DecideRequest {
    pub draft_id: i64,
    pub approver_id: String,
    pub decision: Decision,
    pub comment: Option<String>,
    /// Compare-and-swap guard; when set, the decide fails with
    /// `ConcurrentModification` unless the draft revision still matches.
    pub expected_revision: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct ApprovalRow {
    pub approval_id: i64,
    pub draft_id: i64,
    pub approver_id: String,
    pub decision: Decision,
    pub decided_at_ms: i64,
    pub approval_comment: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DistributionBeginRequest {
    pub draft_id: i64,
    pub channel: String,
    pub batch_id: String,
    pub actor: String,
}

#[derive(Clone, Debug)]
pub struct DistributionRow {
    pub distribution_id: i64,
    pub draft_id: i64,
    pub channel: String,
    pub batch_id: String,
    pub status: DistributionStatus,
    pub sent_at_ms: Option<i64>,
    pub result_detail: Option<String>,
}

/// Outcome of `distribution_begin`: either a fresh/reused queue slot the
/// caller must now dispatch, or an idempotent replay of a finished send.
#[derive(Clone, Debug)]
pub enum DistributionBegin {
    Queued(DistributionRow),
    Requeued(DistributionRow),
    AlreadySent(DistributionRow),
}

impl DistributionBegin {
    pub fn row(&self) -> &DistributionRow {
        match self {
            Self::Queued(row) | Self::Requeued(row) | Self::AlreadySent(row) => row,
        }
    }
}

/// Result reported by the external send collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendResult {
    Sent,
    Failed { detail: String },
}

#[derive(Clone, Debug)]
pub struct AuditRow {
    pub seq: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub actor: String,
    pub ts_ms: i64,
    pub payload_digest: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoticeStatusCounts {
    pub intake: u64,
    pub ai_generated: u64,
    pub drafted: u64,
    pub under_review: u64,
    pub approved: u64,
    pub rejected: u64,
    pub distributed: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DraftStatusCounts {
    pub draft: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

/// Read-side projection over the whole store, computed inside a single
/// transaction so the counts describe one consistent snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkflowStats {
    pub notices: NoticeStatusCounts,
    pub drafts: DraftStatusCounts,
    pub high_risk_drafts: u64,
}
