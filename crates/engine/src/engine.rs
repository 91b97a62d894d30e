#![forbid(unsafe_code)]

use crate::collaborators::{ChannelSender, DraftGenerator};
use crate::error::EngineError;
use crate::support::now_rfc3339;
use nf_storage::{
    AiOutputRow, DistributionBegin, DistributionBeginRequest, DistributionRow, RecordAiOutput,
    RecordAiRequest, SqliteStore, StoreError,
};
use serde_json::json;
use std::time::Duration;

/// Drives the workflow steps that touch external collaborators. Every
/// durable effect still goes through the store, so a crash between the
/// request row and the output row leaves an honest record of the attempt.
pub struct Engine<G, S> {
    store: SqliteStore,
    generator: G,
    sender: S,
}

impl<G: DraftGenerator, S: ChannelSender> Engine<G, S> {
    pub fn new(store: SqliteStore, generator: G, sender: S) -> Self {
        Self {
            store,
            generator,
            sender,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    pub fn into_store(self) -> SqliteStore {
        self.store
    }

    /// Runs one generation attempt for a notice.
    ///
    /// The request snapshot is committed before the collaborator is
    /// called; a failed generation therefore leaves the request row
    /// behind and surfaces `GenerationFailed` without touching the
    /// notice. On success the output is recorded and the notice moves to
    /// `ai_generated` if it has not advanced past that.
    pub fn generate_draft(
        &mut self,
        notice_id: &str,
        template_type: &str,
        customer_segment: &str,
        requested_by: &str,
        timeout: Duration,
    ) -> Result<AiOutputRow, EngineError> {
        let Some(notice) = self.store.notice_get(notice_id)? else {
            return Err(StoreError::NotFound {
                entity: "notice",
                id: notice_id.to_string(),
            }
            .into());
        };

        let prompt = json!({
            "template_type": template_type,
            "customer_segment": customer_segment,
            "security_code": notice.security_code,
            "security_name": notice.security_name,
            "event_type": notice.event_type.as_str(),
            "notice_text": notice.notice_text,
        });
        let request = self.store.ai_request_record(RecordAiRequest {
            notice_id: notice_id.to_string(),
            template_type: template_type.to_string(),
            customer_segment: customer_segment.to_string(),
            prompt_json: prompt.to_string(),
            requested_by: requested_by.to_string(),
        })?;

        let generated = self
            .generator
            .generate(&notice, template_type, customer_segment, timeout)
            .map_err(|err| EngineError::GenerationFailed { detail: err.detail })?;

        let output = self.store.ai_output_record(RecordAiOutput {
            ai_request_id: request.ai_request_id,
            internal_summary: generated.internal_summary,
            customer_draft: generated.customer_draft,
            model_version: generated.model_version,
            risk_tokens: generated.risk_tokens,
            actor: requested_by.to_string(),
        })?;
        Ok(output)
    }

    /// Dispatches one approved draft over one channel.
    ///
    /// Replays of a batch that already went out return the original row
    /// without calling the sender again. Otherwise the slot is queued (or
    /// re-queued after a failure), the sender is invoked, and its verdict
    /// is recorded; a `failed` verdict is returned as data so the caller
    /// can retry with the same batch id.
    pub fn distribute(
        &mut self,
        draft_id: i64,
        channel: &str,
        recipient_segment: &str,
        batch_id: &str,
        actor: &str,
        timeout: Duration,
    ) -> Result<DistributionRow, EngineError> {
        let begin = self.store.distribution_begin(DistributionBeginRequest {
            draft_id,
            channel: channel.to_string(),
            batch_id: batch_id.to_string(),
            actor: actor.to_string(),
        })?;
        let queued = match begin {
            DistributionBegin::AlreadySent(row) => return Ok(row),
            DistributionBegin::Queued(row) | DistributionBegin::Requeued(row) => row,
        };

        let Some(draft) = self.store.draft_get(draft_id)? else {
            return Err(StoreError::NotFound {
                entity: "draft",
                id: draft_id.to_string(),
            }
            .into());
        };
        let result = self.sender.send(
            channel,
            recipient_segment,
            &draft.edited_text,
            batch_id,
            timeout,
        );

        let resolved = self
            .store
            .distribution_resolve(queued.distribution_id, result, actor)?;
        Ok(resolved)
    }

    /// One consistent snapshot of the workflow, wrapped in a dated
    /// envelope for operators.
    pub fn workflow_report(&mut self) -> Result<serde_json::Value, EngineError> {
        let stats = self.store.workflow_stats()?;
        Ok(json!({
            "generated_at": now_rfc3339(),
            "notices": {
                "intake": stats.notices.intake,
                "ai_generated": stats.notices.ai_generated,
                "drafted": stats.notices.drafted,
                "under_review": stats.notices.under_review,
                "approved": stats.notices.approved,
                "rejected": stats.notices.rejected,
                "distributed": stats.notices.distributed,
            },
            "drafts": {
                "draft": stats.drafts.draft,
                "pending": stats.drafts.pending,
                "approved": stats.drafts.approved,
                "rejected": stats.drafts.rejected,
            },
            "high_risk_drafts": stats.high_risk_drafts,
        }))
    }
}
