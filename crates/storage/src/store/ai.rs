#![forbid(unsafe_code)]

use super::audit::insert_audit_tx;
use super::notices::{advance_notice_if_behind_tx, notice_state_tx};
use super::*;
use nf_core::model::NoticeStatus;
use rusqlite::{OptionalExtension, params};

fn encode_risk_tokens(tokens: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(tokens)
        .map_err(|_| StoreError::InvalidInput("risk tokens are not encodable"))
}

pub(in crate::store) fn decode_risk_tokens(raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|_| StoreError::InvalidInput("corrupt risk token list"))
}

impl SqliteStore {
    /// Records the immutable snapshot of one generation attempt. The row
    /// is written before the external call is made and survives a failed
    /// generation as the record of the attempt.
    pub fn ai_request_record(
        &mut self,
        request: RecordAiRequest,
    ) -> Result<AiRequestRow, StoreError> {
        self.ensure_chain_usable()?;

        if request.template_type.trim().is_empty() {
            return Err(StoreError::InvalidInput("template_type must not be empty"));
        }
        if request.customer_segment.trim().is_empty() {
            return Err(StoreError::InvalidInput("customer_segment must not be empty"));
        }
        if serde_json::from_str::<serde_json::Value>(&request.prompt_json).is_err() {
            return Err(StoreError::InvalidInput("prompt_json must be valid JSON"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        // Existence check doubles as the NotFound guard.
        notice_state_tx(&tx, &request.notice_id)?;

        tx.execute(
            r#"
            INSERT INTO ai_request(
              ca_notice_id, template_type, customer_segment, prompt_json,
              requested_by, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                request.notice_id,
                request.template_type,
                request.customer_segment,
                request.prompt_json,
                request.requested_by,
                now_ms,
            ],
        )?;
        let ai_request_id = tx.last_insert_rowid();

        insert_audit_tx(
            &tx,
            "ai_request",
            &ai_request_id.to_string(),
            "ai.request",
            &request.requested_by,
            now_ms,
        )?;
        tx.commit()?;

        Ok(AiRequestRow {
            ai_request_id,
            notice_id: request.notice_id,
            template_type: request.template_type,
            customer_segment: request.customer_segment,
            prompt_json: request.prompt_json,
            requested_by: request.requested_by,
            created_at_ms: now_ms,
        })
    }

    /// Records the immutable result of a successful generation and moves
    /// the notice from `intake` to `ai_generated` if it has not advanced
    /// past that yet. At most one output per request (zero when the
    /// collaborator failed).
    pub fn ai_output_record(&mut self, output: RecordAiOutput) -> Result<AiOutputRow, StoreError> {
        self.ensure_chain_usable()?;

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let notice_id: Option<String> = tx
            .query_row(
                "SELECT ca_notice_id FROM ai_request WHERE ai_request_id = ?1",
                params![output.ai_request_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(notice_id) = notice_id else {
            return Err(StoreError::NotFound {
                entity: "ai_request",
                id: output.ai_request_id.to_string(),
            });
        };

        let risk_tokens = encode_risk_tokens(&output.risk_tokens)?;
        let insert = tx.execute(
            r#"
            INSERT INTO ai_output(
              ai_request_id, internal_summary, customer_draft, model_version,
              risk_tokens, generated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                output.ai_request_id,
                output.internal_summary,
                output.customer_draft,
                output.model_version,
                risk_tokens,
                now_ms,
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::InvalidState {
                    expected: "a request without an output",
                    actual: "output already recorded".to_string(),
                });
            }
            return Err(err.into());
        }
        let ai_output_id = tx.last_insert_rowid();

        advance_notice_if_behind_tx(
            &tx,
            &notice_id,
            NoticeStatus::AiGenerated,
            &output.actor,
            now_ms,
        )?;
        insert_audit_tx(
            &tx,
            "ai_output",
            &ai_output_id.to_string(),
            "ai.output",
            &output.actor,
            now_ms,
        )?;
        tx.commit()?;

        Ok(AiOutputRow {
            ai_output_id,
            ai_request_id: output.ai_request_id,
            internal_summary: output.internal_summary,
            customer_draft: output.customer_draft,
            model_version: output.model_version,
            risk_tokens: output.risk_tokens,
            generated_at_ms: now_ms,
        })
    }

    /// Generation attempts recorded for a notice, oldest first.
    pub fn ai_requests_for_notice(
        &self,
        notice_id: &str,
    ) -> Result<Vec<AiRequestRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT ai_request_id, ca_notice_id, template_type, customer_segment,
                   prompt_json, requested_by, created_at_ms
            FROM ai_request
            WHERE ca_notice_id = ?1
            ORDER BY ai_request_id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![notice_id], |row| {
            Ok(AiRequestRow {
                ai_request_id: row.get(0)?,
                notice_id: row.get(1)?,
                template_type: row.get(2)?,
                customer_segment: row.get(3)?,
                prompt_json: row.get(4)?,
                requested_by: row.get(5)?,
                created_at_ms: row.get(6)?,
            })
        })?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    pub fn ai_output_get(&self, ai_output_id: i64) -> Result<Option<AiOutputRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT ai_output_id, ai_request_id, internal_summary, customer_draft,
                       model_version, risk_tokens, generated_at_ms
                FROM ai_output
                WHERE ai_output_id = ?1
                "#,
                params![ai_output_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            ai_output_id,
            ai_request_id,
            internal_summary,
            customer_draft,
            model_version,
            risk_tokens,
            generated_at_ms,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(AiOutputRow {
            ai_output_id,
            ai_request_id,
            internal_summary,
            customer_draft,
            model_version,
            risk_tokens: decode_risk_tokens(&risk_tokens)?,
            generated_at_ms,
        }))
    }
}
