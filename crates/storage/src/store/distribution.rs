#![forbid(unsafe_code)]

use super::audit::insert_audit_tx;
use super::drafts::draft_state_tx;
use super::notices::advance_notice_if_behind_tx;
use super::*;
use nf_core::model::{ApprovalStatus, DistributionStatus, NoticeStatus};
use nf_core::policy::ChannelCompletion;
use rusqlite::{OptionalExtension, Transaction, params};

struct RawDistribution {
    distribution_id: i64,
    draft_id: i64,
    channel: String,
    batch_id: String,
    status: String,
    sent_at_ms: Option<i64>,
    result_detail: Option<String>,
}

fn read_distribution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDistribution> {
    Ok(RawDistribution {
        distribution_id: row.get(0)?,
        draft_id: row.get(1)?,
        channel: row.get(2)?,
        batch_id: row.get(3)?,
        status: row.get(4)?,
        sent_at_ms: row.get(5)?,
        result_detail: row.get(6)?,
    })
}

fn finish_distribution_row(raw: RawDistribution) -> Result<DistributionRow, StoreError> {
    let status = DistributionStatus::parse(&raw.status).ok_or(StoreError::InvalidInput(
        "unrecognized distribution status in store",
    ))?;
    Ok(DistributionRow {
        distribution_id: raw.distribution_id,
        draft_id: raw.draft_id,
        channel: raw.channel,
        batch_id: raw.batch_id,
        status,
        sent_at_ms: raw.sent_at_ms,
        result_detail: raw.result_detail,
    })
}

const DISTRIBUTION_COLUMNS: &str = "distribution_id, draft_id, channel_type, send_batch_id, \
     distribution_status, sent_at_ms, result_detail";

fn distribution_by_id_tx(
    tx: &Transaction<'_>,
    distribution_id: i64,
) -> Result<DistributionRow, StoreError> {
    let raw = tx
        .query_row(
            &format!(
                "SELECT {DISTRIBUTION_COLUMNS} FROM distribution_log WHERE distribution_id = ?1"
            ),
            params![distribution_id],
            read_distribution_row,
        )
        .optional()?;
    let Some(raw) = raw else {
        return Err(StoreError::NotFound {
            entity: "distribution",
            id: distribution_id.to_string(),
        });
    };
    finish_distribution_row(raw)
}

impl SqliteStore {
    /// Claims (or replays) the queue slot for one send attempt.
    ///
    /// A prior `sent` row is returned as-is so client retries are
    /// idempotent; a prior `queued` or `failed` row is re-queued and
    /// reused, never duplicated. The unique index on
    /// (draft, channel, batch) makes a concurrent duplicate insert
    /// impossible; the loser of such a race gets `DuplicateBatch` and can
    /// simply retry to hit the replay path.
    pub fn distribution_begin(
        &mut self,
        request: DistributionBeginRequest,
    ) -> Result<DistributionBegin, StoreError> {
        self.ensure_chain_usable()?;

        if request.channel.trim().is_empty() {
            return Err(StoreError::InvalidInput("channel must not be empty"));
        }
        if request.batch_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("batch_id must not be empty"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let draft = draft_state_tx(&tx, request.draft_id)?;
        if draft.status != ApprovalStatus::Approved {
            return Err(StoreError::NotApproved {
                draft_id: request.draft_id,
                status: draft.status.as_str().to_string(),
            });
        }

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {DISTRIBUTION_COLUMNS} FROM distribution_log \
                     WHERE draft_id = ?1 AND channel_type = ?2 AND send_batch_id = ?3"
                ),
                params![request.draft_id, request.channel, request.batch_id],
                read_distribution_row,
            )
            .optional()?;

        if let Some(raw) = existing {
            let row = finish_distribution_row(raw)?;
            return match row.status {
                DistributionStatus::Sent => Ok(DistributionBegin::AlreadySent(row)),
                DistributionStatus::Queued | DistributionStatus::Failed => {
                    tx.execute(
                        r#"
                        UPDATE distribution_log
                        SET distribution_status = ?2, result_detail = NULL
                        WHERE distribution_id = ?1
                        "#,
                        params![row.distribution_id, DistributionStatus::Queued.as_str()],
                    )?;
                    insert_audit_tx(
                        &tx,
                        "distribution",
                        &row.distribution_id.to_string(),
                        "distribution.queue",
                        &request.actor,
                        now_ms,
                    )?;
                    tx.commit()?;
                    Ok(DistributionBegin::Requeued(DistributionRow {
                        status: DistributionStatus::Queued,
                        result_detail: None,
                        ..row
                    }))
                }
            };
        }

        let insert = tx.execute(
            r#"
            INSERT INTO distribution_log(
              draft_id, channel_type, send_batch_id, distribution_status,
              sent_at_ms, result_detail)
            VALUES (?1, ?2, ?3, ?4, NULL, NULL)
            "#,
            params![
                request.draft_id,
                request.channel,
                request.batch_id,
                DistributionStatus::Queued.as_str(),
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::DuplicateBatch {
                    draft_id: request.draft_id,
                    channel: request.channel,
                    batch_id: request.batch_id,
                });
            }
            return Err(err.into());
        }
        let distribution_id = tx.last_insert_rowid();

        insert_audit_tx(
            &tx,
            "distribution",
            &distribution_id.to_string(),
            "distribution.queue",
            &request.actor,
            now_ms,
        )?;
        tx.commit()?;

        Ok(DistributionBegin::Queued(DistributionRow {
            distribution_id,
            draft_id: request.draft_id,
            channel: request.channel,
            batch_id: request.batch_id,
            status: DistributionStatus::Queued,
            sent_at_ms: None,
            result_detail: None,
        }))
    }

    /// Records the collaborator's verdict for a queued attempt. On `sent`
    /// the notice advances to `distributed` once the policy's channel
    /// completion rule is met; a partial or failed send leaves the notice
    /// in `approved`.
    pub fn distribution_resolve(
        &mut self,
        distribution_id: i64,
        result: SendResult,
        actor: &str,
    ) -> Result<DistributionRow, StoreError> {
        self.ensure_chain_usable()?;

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let row = distribution_by_id_tx(&tx, distribution_id)?;
        if row.status != DistributionStatus::Queued {
            return Err(StoreError::InvalidState {
                expected: "queued",
                actual: row.status.as_str().to_string(),
            });
        }

        let (status, sent_at_ms, detail) = match &result {
            SendResult::Sent => (DistributionStatus::Sent, Some(now_ms), None),
            SendResult::Failed { detail } => {
                (DistributionStatus::Failed, None, Some(detail.clone()))
            }
        };
        tx.execute(
            r#"
            UPDATE distribution_log
            SET distribution_status = ?2, sent_at_ms = ?3, result_detail = ?4
            WHERE distribution_id = ?1
            "#,
            params![distribution_id, status.as_str(), sent_at_ms, detail],
        )?;

        if status == DistributionStatus::Sent {
            let draft = draft_state_tx(&tx, row.draft_id)?;
            if channels_complete_tx(&tx, &self.policy, row.draft_id)? {
                advance_notice_if_behind_tx(
                    &tx,
                    &draft.notice_id,
                    NoticeStatus::Distributed,
                    actor,
                    now_ms,
                )?;
            }
        }

        insert_audit_tx(
            &tx,
            "distribution",
            &distribution_id.to_string(),
            "distribution.result",
            actor,
            now_ms,
        )?;
        tx.commit()?;

        Ok(DistributionRow {
            status,
            sent_at_ms,
            result_detail: detail,
            ..row
        })
    }

    /// All attempts recorded for a draft, oldest first.
    pub fn distributions_for_draft(
        &self,
        draft_id: i64,
    ) -> Result<Vec<DistributionRow>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DISTRIBUTION_COLUMNS} FROM distribution_log \
             WHERE draft_id = ?1 ORDER BY distribution_id ASC"
        ))?;
        let rows = stmt.query_map(params![draft_id], read_distribution_row)?;

        let mut attempts = Vec::new();
        for row in rows {
            attempts.push(finish_distribution_row(row?)?);
        }
        Ok(attempts)
    }
}

/// Channel-completion rule: with `AnyChannel` the send that just landed is
/// enough; with `AllRequired` every channel in the policy set needs a
/// `sent` row for this draft. The row updated in this transaction counts.
fn channels_complete_tx(
    tx: &Transaction<'_>,
    policy: &nf_core::policy::WorkflowPolicy,
    draft_id: i64,
) -> Result<bool, StoreError> {
    match policy.channel_completion {
        ChannelCompletion::AnyChannel => Ok(true),
        ChannelCompletion::AllRequired => {
            for channel in &policy.required_channels {
                let sent: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM distribution_log \
                     WHERE draft_id = ?1 AND channel_type = ?2 AND distribution_status = 'sent'",
                    params![draft_id, channel],
                    |row| row.get(0),
                )?;
                if sent == 0 {
                    return Ok(false);
                }
            }
            Ok(!policy.required_channels.is_empty())
        }
    }
}
