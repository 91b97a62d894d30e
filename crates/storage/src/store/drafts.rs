#![forbid(unsafe_code)]

use super::ai::decode_risk_tokens;
use super::audit::insert_audit_tx;
use super::notices::{advance_notice_if_behind_tx, advance_notice_tx, notice_state_tx};
use super::*;
use nf_core::ids::ActorId;
use nf_core::model::{ApprovalStatus, Decision, NoticeStatus};
use nf_core::risk;
use rusqlite::{OptionalExtension, Transaction, params};

pub(in crate::store) struct DraftState {
    pub notice_id: String,
    pub editor_id: String,
    pub status: ApprovalStatus,
    pub revision: i64,
    pub version_no: i64,
}

pub(in crate::store) fn draft_state_tx(
    tx: &Transaction<'_>,
    draft_id: i64,
) -> Result<DraftState, StoreError> {
    let row = tx
        .query_row(
            r#"
            SELECT ca_notice_id, editor_id, approval_status, revision, version_no
            FROM draft_version
            WHERE draft_id = ?1
            "#,
            params![draft_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((notice_id, editor_id, status, revision, version_no)) = row else {
        return Err(StoreError::NotFound {
            entity: "draft",
            id: draft_id.to_string(),
        });
    };
    let status = ApprovalStatus::parse(&status)
        .ok_or(StoreError::InvalidInput("unrecognized approval status in store"))?;
    Ok(DraftState {
        notice_id,
        editor_id,
        status,
        revision,
        version_no,
    })
}

struct RawDraft {
    draft_id: i64,
    notice_id: String,
    ai_output_id: Option<i64>,
    version_no: i64,
    editor_id: String,
    edited_text: String,
    risk_flag: i64,
    approval_status: String,
    review_comment: Option<String>,
    revision: i64,
    updated_at_ms: i64,
}

fn read_draft_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDraft> {
    Ok(RawDraft {
        draft_id: row.get(0)?,
        notice_id: row.get(1)?,
        ai_output_id: row.get(2)?,
        version_no: row.get(3)?,
        editor_id: row.get(4)?,
        edited_text: row.get(5)?,
        risk_flag: row.get(6)?,
        approval_status: row.get(7)?,
        review_comment: row.get(8)?,
        revision: row.get(9)?,
        updated_at_ms: row.get(10)?,
    })
}

fn finish_draft_row(raw: RawDraft) -> Result<DraftRow, StoreError> {
    let approval_status = ApprovalStatus::parse(&raw.approval_status)
        .ok_or(StoreError::InvalidInput("unrecognized approval status in store"))?;
    Ok(DraftRow {
        draft_id: raw.draft_id,
        notice_id: raw.notice_id,
        ai_output_id: raw.ai_output_id,
        version_no: raw.version_no,
        editor_id: raw.editor_id,
        edited_text: raw.edited_text,
        risk_flag: raw.risk_flag != 0,
        approval_status,
        review_comment: raw.review_comment,
        revision: raw.revision,
        updated_at_ms: raw.updated_at_ms,
    })
}

const DRAFT_COLUMNS: &str = "draft_id, ca_notice_id, ai_output_id, version_no, editor_id, \
     edited_text, risk_flag, approval_status, review_comment, revision, updated_at_ms";

impl SqliteStore {
    /// Creates the next draft version for a notice.
    ///
    /// Enforces the single-active-draft rule: an existing `draft`/`pending`
    /// version either blocks the call (`ActiveDraftExists`) or, with
    /// `supersede` set, is atomically rejected with a system comment
    /// before the insert. The first version ever moves the notice to
    /// `drafted`; a redraft on a terminally rejected notice reopens it to
    /// `under_review`.
    pub fn draft_create(&mut self, request: CreateDraftRequest) -> Result<DraftRow, StoreError> {
        self.ensure_chain_usable()?;

        ActorId::try_new(request.editor_id.as_str())
            .map_err(|_| StoreError::InvalidInput("invalid editor id"))?;
        if request.edited_text.trim().is_empty() {
            return Err(StoreError::InvalidInput("edited_text must not be empty"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let notice = notice_state_tx(&tx, &request.notice_id)?;
        if notice.status.is_terminal() {
            return Err(StoreError::InvalidState {
                expected: "a notice before distribution",
                actual: notice.status.as_str().to_string(),
            });
        }

        // Redraft ceiling counts completed rejection cycles before this call.
        let rejected_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM draft_version \
             WHERE ca_notice_id = ?1 AND approval_status = 'rejected'",
            params![request.notice_id],
            |row| row.get(0),
        )?;
        if let Some(limit) = self.policy.redraft_limit {
            if rejected_count > i64::from(limit) {
                return Err(StoreError::RedraftLimitExceeded { limit });
            }
        }

        let active: Option<(i64, i64)> = tx
            .query_row(
                r#"
                SELECT draft_id, revision
                FROM draft_version
                WHERE ca_notice_id = ?1 AND approval_status IN ('draft', 'pending')
                "#,
                params![request.notice_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let max_version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version_no), 0) FROM draft_version WHERE ca_notice_id = ?1",
            params![request.notice_id],
            |row| row.get(0),
        )?;
        let version_no = max_version + 1;

        if let Some((active_id, active_revision)) = active {
            if !request.supersede {
                return Err(StoreError::ActiveDraftExists { draft_id: active_id });
            }
            let comment = format!("superseded by version {version_no}");
            tx.execute(
                r#"
                UPDATE draft_version
                SET approval_status = ?2, review_comment = ?3, revision = ?4, updated_at_ms = ?5
                WHERE draft_id = ?1
                "#,
                params![
                    active_id,
                    ApprovalStatus::Rejected.as_str(),
                    comment,
                    active_revision + 1,
                    now_ms,
                ],
            )?;
            tx.execute(
                r#"
                INSERT INTO approval_history(
                  draft_id, approver_id, decision, decided_at_ms, approval_comment)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    active_id,
                    request.editor_id,
                    Decision::Rejected.as_str(),
                    now_ms,
                    comment,
                ],
            )?;
            insert_audit_tx(
                &tx,
                "draft",
                &active_id.to_string(),
                "draft.supersede",
                &request.editor_id,
                now_ms,
            )?;
        }

        let risk_flag = match request.source_output_id {
            Some(output_id) => {
                let source: Option<(String, String)> = tx
                    .query_row(
                        r#"
                        SELECT ai_request.ca_notice_id, ai_output.risk_tokens
                        FROM ai_output
                        JOIN ai_request ON ai_request.ai_request_id = ai_output.ai_request_id
                        WHERE ai_output.ai_output_id = ?1
                        "#,
                        params![output_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some((source_notice_id, risk_tokens)) = source else {
                    return Err(StoreError::NotFound {
                        entity: "ai_output",
                        id: output_id.to_string(),
                    });
                };
                if source_notice_id != request.notice_id {
                    return Err(StoreError::InvalidInput(
                        "source output belongs to a different notice",
                    ));
                }
                let tokens = decode_risk_tokens(&risk_tokens)?;
                risk::risk_flag(&tokens, &self.policy)
            }
            None => false,
        };

        let insert = tx.execute(
            r#"
            INSERT INTO draft_version(
              ca_notice_id, ai_output_id, version_no, editor_id, edited_text,
              risk_flag, approval_status, review_comment, revision, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, ?8)
            "#,
            params![
                request.notice_id,
                request.source_output_id,
                version_no,
                request.editor_id,
                request.edited_text,
                risk_flag as i64,
                ApprovalStatus::Draft.as_str(),
                now_ms,
            ],
        );
        if let Err(err) = insert {
            // The partial unique index on active drafts arbitrates racing
            // creators; the loser surfaces the same error as the fast path.
            if is_constraint_violation(&err) {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT draft_id FROM draft_version \
                         WHERE ca_notice_id = ?1 AND approval_status IN ('draft', 'pending')",
                        params![request.notice_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(StoreError::ActiveDraftExists {
                    draft_id: existing.unwrap_or_default(),
                });
            }
            return Err(err.into());
        }
        let draft_id = tx.last_insert_rowid();

        if notice.status == NoticeStatus::Rejected {
            advance_notice_tx(
                &tx,
                &request.notice_id,
                NoticeStatus::UnderReview,
                &request.editor_id,
                now_ms,
            )?;
        } else if version_no == 1 {
            advance_notice_if_behind_tx(
                &tx,
                &request.notice_id,
                NoticeStatus::Drafted,
                &request.editor_id,
                now_ms,
            )?;
        }

        insert_audit_tx(
            &tx,
            "draft",
            &draft_id.to_string(),
            "draft.create",
            &request.editor_id,
            now_ms,
        )?;
        tx.commit()?;

        self.draft_get(draft_id)?.ok_or(StoreError::NotFound {
            entity: "draft",
            id: draft_id.to_string(),
        })
    }

    /// `draft -> pending`; the notice follows to `under_review` unless it
    /// is already at or past it.
    pub fn draft_submit_for_review(
        &mut self,
        draft_id: i64,
        actor: &str,
        expected_revision: Option<i64>,
    ) -> Result<DraftRow, StoreError> {
        self.ensure_chain_usable()?;

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let draft = draft_state_tx(&tx, draft_id)?;
        if let Some(expected) = expected_revision {
            if expected != draft.revision {
                return Err(StoreError::ConcurrentModification {
                    expected,
                    actual: draft.revision,
                });
            }
        }
        if draft.status != ApprovalStatus::Draft {
            return Err(StoreError::InvalidState {
                expected: "draft",
                actual: draft.status.as_str().to_string(),
            });
        }

        tx.execute(
            r#"
            UPDATE draft_version
            SET approval_status = ?2, revision = ?3, updated_at_ms = ?4
            WHERE draft_id = ?1
            "#,
            params![
                draft_id,
                ApprovalStatus::Pending.as_str(),
                draft.revision + 1,
                now_ms,
            ],
        )?;

        advance_notice_if_behind_tx(
            &tx,
            &draft.notice_id,
            NoticeStatus::UnderReview,
            actor,
            now_ms,
        )?;
        insert_audit_tx(
            &tx,
            "draft",
            &draft_id.to_string(),
            "draft.submit",
            actor,
            now_ms,
        )?;
        tx.commit()?;

        self.draft_get(draft_id)?.ok_or(StoreError::NotFound {
            entity: "draft",
            id: draft_id.to_string(),
        })
    }

    pub fn draft_get(&self, draft_id: i64) -> Result<Option<DraftRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {DRAFT_COLUMNS} FROM draft_version WHERE draft_id = ?1"),
                params![draft_id],
                read_draft_row,
            )
            .optional()?;
        row.map(finish_draft_row).transpose()
    }

    /// All versions for a notice, oldest first.
    pub fn drafts_for_notice(&self, notice_id: &str) -> Result<Vec<DraftRow>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRAFT_COLUMNS} FROM draft_version \
             WHERE ca_notice_id = ?1 ORDER BY version_no ASC"
        ))?;
        let rows = stmt.query_map(params![notice_id], read_draft_row)?;

        let mut drafts = Vec::new();
        for row in rows {
            drafts.push(finish_draft_row(row?)?);
        }
        Ok(drafts)
    }
}
