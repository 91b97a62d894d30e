#![forbid(unsafe_code)]

use super::audit::insert_audit_tx;
use super::*;
use nf_core::ids::{ActorId, NoticeId};
use nf_core::model::{EventType, NoticeStatus};
use rusqlite::{OptionalExtension, Transaction, params};

pub(in crate::store) struct NoticeState {
    pub status: NoticeStatus,
    pub revision: i64,
}

pub(in crate::store) fn notice_state_tx(
    tx: &Transaction<'_>,
    notice_id: &str,
) -> Result<NoticeState, StoreError> {
    let row = tx
        .query_row(
            "SELECT status, revision FROM ca_notice WHERE ca_notice_id = ?1",
            params![notice_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    let Some((status, revision)) = row else {
        return Err(StoreError::NotFound {
            entity: "notice",
            id: notice_id.to_string(),
        });
    };
    let status = NoticeStatus::parse(&status)
        .ok_or(StoreError::InvalidInput("unrecognized notice status in store"))?;
    Ok(NoticeState { status, revision })
}

fn set_notice_status_tx(
    tx: &Transaction<'_>,
    notice_id: &str,
    state: &NoticeState,
    target: NoticeStatus,
    actor: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        r#"
        UPDATE ca_notice
        SET status = ?2, revision = ?3, updated_at_ms = ?4
        WHERE ca_notice_id = ?1
        "#,
        params![notice_id, target.as_str(), state.revision + 1, now_ms],
    )?;
    insert_audit_tx(tx, "notice", notice_id, "notice.status", actor, now_ms)?;
    Ok(())
}

/// Strict transition: `target` must be a legal direct successor.
pub(in crate::store) fn advance_notice_tx(
    tx: &Transaction<'_>,
    notice_id: &str,
    target: NoticeStatus,
    actor: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    let state = notice_state_tx(tx, notice_id)?;
    if !state.status.can_advance_to(target) {
        return Err(StoreError::InvalidTransition {
            from: state.status,
            to: target,
        });
    }
    set_notice_status_tx(tx, notice_id, &state, target, actor, now_ms)
}

/// Advances the notice toward `target` unless it already sits at or past
/// it, in which case the call is a no-op. Used by the draft and approval
/// flows, which must never move a notice backwards.
pub(in crate::store) fn advance_notice_if_behind_tx(
    tx: &Transaction<'_>,
    notice_id: &str,
    target: NoticeStatus,
    actor: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    let state = notice_state_tx(tx, notice_id)?;
    if state.status == target || state.status.rank() >= target.rank() {
        return Ok(());
    }
    if !state.status.can_advance_to(target) {
        return Err(StoreError::InvalidTransition {
            from: state.status,
            to: target,
        });
    }
    set_notice_status_tx(tx, notice_id, &state, target, actor, now_ms)
}

fn is_valid_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let digits = |range: std::ops::Range<usize>| -> Option<u32> {
        value.get(range)?.parse::<u32>().ok()
    };
    let (Some(_year), Some(month), Some(day)) = (digits(0..4), digits(5..7), digits(8..10)) else {
        return false;
    };
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

struct RawNotice {
    notice_id: String,
    security_code: String,
    security_name: String,
    event_type: String,
    record_date: String,
    payment_date: Option<String>,
    notice_text: String,
    source_channel: String,
    status: String,
    revision: i64,
    created_at_ms: i64,
    updated_at_ms: i64,
}

fn read_notice_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNotice> {
    Ok(RawNotice {
        notice_id: row.get(0)?,
        security_code: row.get(1)?,
        security_name: row.get(2)?,
        event_type: row.get(3)?,
        record_date: row.get(4)?,
        payment_date: row.get(5)?,
        notice_text: row.get(6)?,
        source_channel: row.get(7)?,
        status: row.get(8)?,
        revision: row.get(9)?,
        created_at_ms: row.get(10)?,
        updated_at_ms: row.get(11)?,
    })
}

fn finish_notice_row(raw: RawNotice) -> Result<NoticeRow, StoreError> {
    let event_type = EventType::parse(&raw.event_type)
        .ok_or(StoreError::InvalidInput("unrecognized event type in store"))?;
    let status = NoticeStatus::parse(&raw.status)
        .ok_or(StoreError::InvalidInput("unrecognized notice status in store"))?;
    Ok(NoticeRow {
        notice_id: raw.notice_id,
        security_code: raw.security_code,
        security_name: raw.security_name,
        event_type,
        record_date: raw.record_date,
        payment_date: raw.payment_date,
        notice_text: raw.notice_text,
        source_channel: raw.source_channel,
        status,
        revision: raw.revision,
        created_at_ms: raw.created_at_ms,
        updated_at_ms: raw.updated_at_ms,
    })
}

const NOTICE_COLUMNS: &str = "ca_notice_id, security_code, security_name, event_type, \
     record_date, payment_date, notice_text, source_channel, status, revision, \
     created_at_ms, updated_at_ms";

impl SqliteStore {
    /// Registers a raw notice in status `intake`.
    pub fn notice_create(&mut self, request: CreateNoticeRequest) -> Result<NoticeRow, StoreError> {
        self.ensure_chain_usable()?;

        let notice_id = NoticeId::try_new(request.notice_id.as_str())
            .map_err(|_| StoreError::InvalidInput("invalid notice id"))?;
        ActorId::try_new(request.actor.as_str())
            .map_err(|_| StoreError::InvalidInput("invalid actor id"))?;
        if request.security_code.trim().is_empty() {
            return Err(StoreError::InvalidInput("security_code must not be empty"));
        }
        if request.security_name.trim().is_empty() {
            return Err(StoreError::InvalidInput("security_name must not be empty"));
        }
        if request.notice_text.trim().is_empty() {
            return Err(StoreError::InvalidInput("notice_text must not be empty"));
        }
        if request.source_channel.trim().is_empty() {
            return Err(StoreError::InvalidInput("source_channel must not be empty"));
        }
        if !is_valid_date(&request.record_date) {
            return Err(StoreError::InvalidInput("record_date must be YYYY-MM-DD"));
        }
        if let Some(payment_date) = request.payment_date.as_deref() {
            if !is_valid_date(payment_date) {
                return Err(StoreError::InvalidInput("payment_date must be YYYY-MM-DD"));
            }
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let insert = tx.execute(
            r#"
            INSERT INTO ca_notice(
              ca_notice_id, security_code, security_name, event_type, record_date,
              payment_date, notice_text, source_channel, status, revision,
              created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)
            "#,
            params![
                notice_id.as_str(),
                request.security_code,
                request.security_name,
                request.event_type.as_str(),
                request.record_date,
                request.payment_date,
                request.notice_text,
                request.source_channel,
                NoticeStatus::Intake.as_str(),
                now_ms,
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::DuplicateId {
                    id: notice_id.as_str().to_string(),
                });
            }
            return Err(err.into());
        }

        insert_audit_tx(
            &tx,
            "notice",
            notice_id.as_str(),
            "notice.create",
            &request.actor,
            now_ms,
        )?;
        tx.commit()?;

        self.notice_get(notice_id.as_str())?.ok_or(StoreError::NotFound {
            entity: "notice",
            id: notice_id.as_str().to_string(),
        })
    }

    /// Moves a notice to a legal successor status.
    ///
    /// Two transitions additionally require their predecessor artifact:
    /// `drafted` needs at least one draft version, `distributed` an
    /// approved one.
    pub fn notice_advance_status(
        &mut self,
        notice_id: &str,
        target: NoticeStatus,
        actor: &str,
        expected_revision: Option<i64>,
    ) -> Result<NoticeRow, StoreError> {
        self.ensure_chain_usable()?;

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let state = notice_state_tx(&tx, notice_id)?;
        if let Some(expected) = expected_revision {
            if expected != state.revision {
                return Err(StoreError::ConcurrentModification {
                    expected,
                    actual: state.revision,
                });
            }
        }
        if !state.status.can_advance_to(target) {
            return Err(StoreError::InvalidTransition {
                from: state.status,
                to: target,
            });
        }

        match target {
            NoticeStatus::Drafted => {
                let drafts: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM draft_version WHERE ca_notice_id = ?1",
                    params![notice_id],
                    |row| row.get(0),
                )?;
                if drafts == 0 {
                    return Err(StoreError::InvalidState {
                        expected: "at least one draft version",
                        actual: "no drafts".to_string(),
                    });
                }
            }
            NoticeStatus::Distributed => {
                let approved: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM draft_version \
                     WHERE ca_notice_id = ?1 AND approval_status = 'approved'",
                    params![notice_id],
                    |row| row.get(0),
                )?;
                if approved == 0 {
                    return Err(StoreError::InvalidState {
                        expected: "an approved draft version",
                        actual: "no approved draft".to_string(),
                    });
                }
            }
            _ => {}
        }

        set_notice_status_tx(&tx, notice_id, &state, target, actor, now_ms)?;
        tx.commit()?;

        self.notice_get(notice_id)?.ok_or(StoreError::NotFound {
            entity: "notice",
            id: notice_id.to_string(),
        })
    }

    pub fn notice_get(&self, notice_id: &str) -> Result<Option<NoticeRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {NOTICE_COLUMNS} FROM ca_notice WHERE ca_notice_id = ?1"),
                params![notice_id],
                read_notice_row,
            )
            .optional()?;
        row.map(finish_notice_row).transpose()
    }

    pub fn notice_list(&self) -> Result<Vec<NoticeRow>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTICE_COLUMNS} FROM ca_notice ORDER BY created_at_ms ASC, ca_notice_id ASC"
        ))?;
        let rows = stmt.query_map([], read_notice_row)?;

        let mut notices = Vec::new();
        for row in rows {
            notices.push(finish_notice_row(row?)?);
        }
        Ok(notices)
    }
}
