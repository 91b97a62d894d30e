#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Transaction, params};
use sha2::{Digest as _, Sha256};
use std::fmt::Write as _;

/// Digest of the imaginary entry before the first one; anchors the chain.
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Rolling digest for one ledger entry. Each entry commits to its
/// predecessor, so rewriting or deleting history invalidates every digest
/// after the edit.
pub(in crate::store) fn chain_digest(
    prev_digest: &str,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    actor: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_digest.as_bytes());
    hasher.update(b"\n");
    hasher.update(entity_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(entity_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(action.as_bytes());
    hasher.update(b"\n");
    hasher.update(actor.as_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Appends one ledger entry inside the caller's transaction. Every
/// mutating operation goes through here so the audit write commits or
/// rolls back together with the state change.
pub(in crate::store) fn insert_audit_tx(
    tx: &Transaction<'_>,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    actor: &str,
    ts_ms: i64,
) -> Result<AuditRow, StoreError> {
    let prev_digest: String = tx
        .query_row(
            "SELECT payload_digest FROM audit_log ORDER BY seq DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or_else(|| GENESIS_DIGEST.to_string());

    let payload_digest = chain_digest(&prev_digest, entity_type, entity_id, action, actor);

    tx.execute(
        r#"
        INSERT INTO audit_log(entity_type, entity_id, action, actor, ts_ms, payload_digest)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![entity_type, entity_id, action, actor, ts_ms, payload_digest],
    )?;
    let seq = tx.last_insert_rowid();

    Ok(AuditRow {
        seq,
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        action: action.to_string(),
        actor: actor.to_string(),
        ts_ms,
        payload_digest,
    })
}

fn read_audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        seq: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        action: row.get(3)?,
        actor: row.get(4)?,
        ts_ms: row.get(5)?,
        payload_digest: row.get(6)?,
    })
}

impl SqliteStore {
    /// Full ledger in sequence order, oldest first.
    pub fn audit_list(&self) -> Result<Vec<AuditRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT seq, entity_type, entity_id, action, actor, ts_ms, payload_digest
            FROM audit_log
            ORDER BY seq ASC
            "#,
        )?;
        let rows = stmt.query_map([], read_audit_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Recomputes every digest from genesis. Returns the number of
    /// verified entries, or `ChainBroken` at the first entry whose stored
    /// digest does not match. A detected break poisons this store handle:
    /// audited writes are refused until the store is reopened.
    pub fn audit_verify_chain(&mut self) -> Result<u64, StoreError> {
        let entries = self.audit_list()?;

        let mut prev_digest = GENESIS_DIGEST.to_string();
        let mut verified = 0u64;
        for entry in entries {
            let expected = chain_digest(
                &prev_digest,
                &entry.entity_type,
                &entry.entity_id,
                &entry.action,
                &entry.actor,
            );
            if expected != entry.payload_digest {
                self.poisoned_at_seq = Some(entry.seq);
                return Err(StoreError::ChainBroken { seq: entry.seq });
            }
            prev_digest = entry.payload_digest;
            verified += 1;
        }
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_every_field_and_the_predecessor() {
        let base = chain_digest(GENESIS_DIGEST, "notice", "CA-1", "notice.create", "alice");
        assert_eq!(base.len(), 64);
        assert_eq!(
            base,
            chain_digest(GENESIS_DIGEST, "notice", "CA-1", "notice.create", "alice")
        );
        assert_ne!(
            base,
            chain_digest(GENESIS_DIGEST, "notice", "CA-1", "notice.create", "bob")
        );
        assert_ne!(
            base,
            chain_digest(&base, "notice", "CA-1", "notice.create", "alice")
        );
    }
}
