#![forbid(unsafe_code)]

mod ai;
mod approvals;
mod audit;
mod distribution;
mod drafts;
mod error;
mod notices;
mod requests;
mod stats;

pub use error::StoreError;
pub use requests::*;

use nf_core::policy::WorkflowPolicy;
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE: &str = "noticeflow.db";

/// SQLite-backed store for the notice workflow.
///
/// One connection, WAL mode; every multi-row state transition runs inside
/// a single transaction together with its audit-ledger append.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    policy: WorkflowPolicy,
    /// Set when `audit_verify_chain` detects tampering. While set, every
    /// audited write fails with `ChainBroken`; reopening the store is the
    /// operator's reset.
    poisoned_at_seq: Option<i64>,
}

impl SqliteStore {
    pub fn open(
        storage_dir: impl AsRef<Path>,
        policy: WorkflowPolicy,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        install_schema(&conn)?;

        Ok(Self {
            conn,
            storage_dir,
            policy,
            poisoned_at_seq: None,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub(in crate::store) fn ensure_chain_usable(&self) -> Result<(), StoreError> {
        match self.poisoned_at_seq {
            Some(seq) => Err(StoreError::ChainBroken { seq }),
            None => Ok(()),
        }
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS ca_notice (
          ca_notice_id   TEXT PRIMARY KEY,
          security_code  TEXT NOT NULL,
          security_name  TEXT NOT NULL,
          event_type     TEXT NOT NULL,
          record_date    TEXT NOT NULL,
          payment_date   TEXT,
          notice_text    TEXT NOT NULL,
          source_channel TEXT NOT NULL,
          status         TEXT NOT NULL,
          revision       INTEGER NOT NULL,
          created_at_ms  INTEGER NOT NULL,
          updated_at_ms  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ai_request (
          ai_request_id    INTEGER PRIMARY KEY AUTOINCREMENT,
          ca_notice_id     TEXT NOT NULL REFERENCES ca_notice(ca_notice_id),
          template_type    TEXT NOT NULL,
          customer_segment TEXT NOT NULL,
          prompt_json      TEXT NOT NULL,
          requested_by     TEXT NOT NULL,
          created_at_ms    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ai_output (
          ai_output_id     INTEGER PRIMARY KEY AUTOINCREMENT,
          ai_request_id    INTEGER NOT NULL UNIQUE REFERENCES ai_request(ai_request_id),
          internal_summary TEXT NOT NULL,
          customer_draft   TEXT NOT NULL,
          model_version    TEXT NOT NULL,
          risk_tokens      TEXT NOT NULL,
          generated_at_ms  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS draft_version (
          draft_id        INTEGER PRIMARY KEY AUTOINCREMENT,
          ca_notice_id    TEXT NOT NULL REFERENCES ca_notice(ca_notice_id),
          ai_output_id    INTEGER REFERENCES ai_output(ai_output_id),
          version_no      INTEGER NOT NULL,
          editor_id       TEXT NOT NULL,
          edited_text     TEXT NOT NULL,
          risk_flag       INTEGER NOT NULL,
          approval_status TEXT NOT NULL,
          review_comment  TEXT,
          revision        INTEGER NOT NULL,
          updated_at_ms   INTEGER NOT NULL,
          UNIQUE (ca_notice_id, version_no)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_draft_single_active
          ON draft_version(ca_notice_id)
          WHERE approval_status IN ('draft', 'pending');

        CREATE TABLE IF NOT EXISTS approval_history (
          approval_id      INTEGER PRIMARY KEY AUTOINCREMENT,
          draft_id         INTEGER NOT NULL REFERENCES draft_version(draft_id),
          approver_id      TEXT NOT NULL,
          decision         TEXT NOT NULL,
          decided_at_ms    INTEGER NOT NULL,
          approval_comment TEXT
        );

        CREATE TABLE IF NOT EXISTS distribution_log (
          distribution_id     INTEGER PRIMARY KEY AUTOINCREMENT,
          draft_id            INTEGER NOT NULL REFERENCES draft_version(draft_id),
          channel_type        TEXT NOT NULL,
          send_batch_id       TEXT NOT NULL,
          distribution_status TEXT NOT NULL,
          sent_at_ms          INTEGER,
          result_detail       TEXT,
          UNIQUE (draft_id, channel_type, send_batch_id)
        );

        CREATE TABLE IF NOT EXISTS audit_log (
          seq            INTEGER PRIMARY KEY AUTOINCREMENT,
          entity_type    TEXT NOT NULL,
          entity_id      TEXT NOT NULL,
          action         TEXT NOT NULL,
          actor          TEXT NOT NULL,
          ts_ms          INTEGER NOT NULL,
          payload_digest TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

pub(in crate::store) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

pub(in crate::store) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}
