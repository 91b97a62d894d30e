#![forbid(unsafe_code)]

use super::audit::insert_audit_tx;
use super::drafts::draft_state_tx;
use super::notices::advance_notice_if_behind_tx;
use super::*;
use nf_core::ids::ActorId;
use nf_core::model::{ApprovalStatus, Decision, NoticeStatus, derive_approval_status};
use rusqlite::params;

struct RawApproval {
    approval_id: i64,
    draft_id: i64,
    approver_id: String,
    decision: String,
    decided_at_ms: i64,
    approval_comment: Option<String>,
}

fn read_approval_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawApproval> {
    Ok(RawApproval {
        approval_id: row.get(0)?,
        draft_id: row.get(1)?,
        approver_id: row.get(2)?,
        decision: row.get(3)?,
        decided_at_ms: row.get(4)?,
        approval_comment: row.get(5)?,
    })
}

fn finish_approval_row(raw: RawApproval) -> Result<ApprovalRow, StoreError> {
    let decision = Decision::parse(&raw.decision)
        .ok_or(StoreError::InvalidInput("unrecognized decision in store"))?;
    Ok(ApprovalRow {
        approval_id: raw.approval_id,
        draft_id: raw.draft_id,
        approver_id: raw.approver_id,
        decision,
        decided_at_ms: raw.decided_at_ms,
        approval_comment: raw.approval_comment,
    })
}

impl SqliteStore {
    /// Records one reviewer decision on a pending draft.
    ///
    /// Maker-checker: when enabled by policy, the approver must differ
    /// from the draft's editor. Exactly one of two racing callers wins;
    /// the loser fails with `ConcurrentModification` (check the draft
    /// revision you read, pass it as `expected_revision`).
    pub fn draft_decide(
        &mut self,
        request: DecideRequest,
    ) -> Result<(DraftRow, ApprovalRow), StoreError> {
        self.ensure_chain_usable()?;

        ActorId::try_new(request.approver_id.as_str())
            .map_err(|_| StoreError::InvalidInput("invalid approver id"))?;

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let draft = draft_state_tx(&tx, request.draft_id)?;
        if let Some(expected) = request.expected_revision {
            if expected != draft.revision {
                return Err(StoreError::ConcurrentModification {
                    expected,
                    actual: draft.revision,
                });
            }
        }
        if draft.status != ApprovalStatus::Pending {
            return Err(StoreError::InvalidState {
                expected: "pending",
                actual: draft.status.as_str().to_string(),
            });
        }
        if self.policy.maker_checker && request.approver_id == draft.editor_id {
            return Err(StoreError::SelfApproval);
        }

        let new_status = match request.decision {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
            Decision::Returned => ApprovalStatus::Draft,
        };

        tx.execute(
            r#"
            INSERT INTO approval_history(
              draft_id, approver_id, decision, decided_at_ms, approval_comment)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                request.draft_id,
                request.approver_id,
                request.decision.as_str(),
                now_ms,
                request.comment,
            ],
        )?;
        let approval_id = tx.last_insert_rowid();

        // Revision-guarded update: the WHERE clause is the arbiter even if
        // another writer slipped between the read and this statement.
        let updated = tx.execute(
            r#"
            UPDATE draft_version
            SET approval_status = ?2, review_comment = ?3, revision = ?4, updated_at_ms = ?5
            WHERE draft_id = ?1 AND revision = ?6
            "#,
            params![
                request.draft_id,
                new_status.as_str(),
                request.comment,
                draft.revision + 1,
                now_ms,
                draft.revision,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::ConcurrentModification {
                expected: draft.revision,
                actual: draft.revision + 1,
            });
        }

        match request.decision {
            Decision::Approved => {
                advance_notice_if_behind_tx(
                    &tx,
                    &draft.notice_id,
                    NoticeStatus::Approved,
                    &request.approver_id,
                    now_ms,
                )?;
            }
            Decision::Rejected => {
                let rejected_count: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM draft_version \
                     WHERE ca_notice_id = ?1 AND approval_status = 'rejected'",
                    params![draft.notice_id],
                    |row| row.get(0),
                )?;
                let redraft_allowed = match self.policy.redraft_limit {
                    None => true,
                    Some(limit) => rejected_count <= i64::from(limit),
                };
                if !redraft_allowed {
                    // No further attempts: the notice itself closes.
                    advance_notice_if_behind_tx(
                        &tx,
                        &draft.notice_id,
                        NoticeStatus::Rejected,
                        &request.approver_id,
                        now_ms,
                    )?;
                }
                // Otherwise the notice stays in under_review awaiting a
                // superseding draft.
            }
            Decision::Returned => {}
        }

        insert_audit_tx(
            &tx,
            "draft",
            &request.draft_id.to_string(),
            "draft.decide",
            &request.approver_id,
            now_ms,
        )?;
        tx.commit()?;

        let draft_row = self.draft_get(request.draft_id)?.ok_or(StoreError::NotFound {
            entity: "draft",
            id: request.draft_id.to_string(),
        })?;
        let approval_row = ApprovalRow {
            approval_id,
            draft_id: request.draft_id,
            approver_id: request.approver_id,
            decision: request.decision,
            decided_at_ms: now_ms,
            approval_comment: request.comment,
        };
        Ok((draft_row, approval_row))
    }

    /// Decision history for a draft, oldest first.
    pub fn approval_history(&self, draft_id: i64) -> Result<Vec<ApprovalRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT approval_id, draft_id, approver_id, decision, decided_at_ms, approval_comment
            FROM approval_history
            WHERE draft_id = ?1
            ORDER BY approval_id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![draft_id], read_approval_row)?;

        let mut history = Vec::new();
        for row in rows {
            history.push(finish_approval_row(row?)?);
        }
        Ok(history)
    }

    /// Approval status projected from the decision history alone. The
    /// stored column must always agree with this; the history is the
    /// source of truth.
    pub fn draft_derived_status(&self, draft_id: i64) -> Result<ApprovalStatus, StoreError> {
        let draft = self.draft_get(draft_id)?.ok_or(StoreError::NotFound {
            entity: "draft",
            id: draft_id.to_string(),
        })?;
        let decisions: Vec<_> = self
            .approval_history(draft_id)?
            .into_iter()
            .map(|row| row.decision)
            .collect();

        let active = if draft.approval_status.is_active() {
            draft.approval_status
        } else {
            ApprovalStatus::Pending
        };
        Ok(derive_approval_status(active, &decisions))
    }
}
