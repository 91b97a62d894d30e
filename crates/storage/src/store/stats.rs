#![forbid(unsafe_code)]

use super::*;
use nf_core::model::{ApprovalStatus, NoticeStatus};

impl SqliteStore {
    /// Counts per notice status, per draft approval status, and flagged
    /// drafts, all read inside one transaction so the numbers describe a
    /// single snapshot. Pure read side: mutates nothing.
    pub fn workflow_stats(&mut self) -> Result<WorkflowStats, StoreError> {
        let tx = self.conn.transaction()?;

        let mut stats = WorkflowStats::default();

        {
            let mut stmt =
                tx.prepare("SELECT status, COUNT(*) FROM ca_notice GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                let status = NoticeStatus::parse(&status)
                    .ok_or(StoreError::InvalidInput("unrecognized notice status in store"))?;
                let count = u64::try_from(count).unwrap_or_default();
                let slot = match status {
                    NoticeStatus::Intake => &mut stats.notices.intake,
                    NoticeStatus::AiGenerated => &mut stats.notices.ai_generated,
                    NoticeStatus::Drafted => &mut stats.notices.drafted,
                    NoticeStatus::UnderReview => &mut stats.notices.under_review,
                    NoticeStatus::Approved => &mut stats.notices.approved,
                    NoticeStatus::Rejected => &mut stats.notices.rejected,
                    NoticeStatus::Distributed => &mut stats.notices.distributed,
                };
                *slot = count;
            }
        }

        {
            let mut stmt = tx.prepare(
                "SELECT approval_status, COUNT(*) FROM draft_version GROUP BY approval_status",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                let status = ApprovalStatus::parse(&status).ok_or(StoreError::InvalidInput(
                    "unrecognized approval status in store",
                ))?;
                let count = u64::try_from(count).unwrap_or_default();
                let slot = match status {
                    ApprovalStatus::Draft => &mut stats.drafts.draft,
                    ApprovalStatus::Pending => &mut stats.drafts.pending,
                    ApprovalStatus::Approved => &mut stats.drafts.approved,
                    ApprovalStatus::Rejected => &mut stats.drafts.rejected,
                };
                *slot = count;
            }
        }

        let high_risk: i64 = tx.query_row(
            "SELECT COUNT(*) FROM draft_version WHERE risk_flag != 0",
            [],
            |row| row.get(0),
        )?;
        stats.high_risk_drafts = u64::try_from(high_risk).unwrap_or_default();

        tx.commit()?;
        Ok(stats)
    }
}
