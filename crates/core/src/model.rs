#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Corporate-action event categories carried by a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Dividend,
    Split,
    Other,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dividend => "dividend",
            Self::Split => "split",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dividend" => Some(Self::Dividend),
            "split" => Some(Self::Split),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Lifecycle status of a notice.
///
/// The status moves forward along
/// `intake -> ai_generated -> drafted -> under_review -> {approved | rejected} -> distributed`,
/// with two shortcuts: a manual draft may skip `ai_generated`, and a
/// rejected notice may re-enter `under_review` when redrafting is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeStatus {
    Intake,
    AiGenerated,
    Drafted,
    UnderReview,
    Approved,
    Rejected,
    Distributed,
}

impl NoticeStatus {
    pub const ALL: [NoticeStatus; 7] = [
        Self::Intake,
        Self::AiGenerated,
        Self::Drafted,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
        Self::Distributed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::AiGenerated => "ai_generated",
            Self::Drafted => "drafted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Distributed => "distributed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "intake" => Some(Self::Intake),
            "ai_generated" => Some(Self::AiGenerated),
            "drafted" => Some(Self::Drafted),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "distributed" => Some(Self::Distributed),
            _ => None,
        }
    }

    /// Whether `target` is a legal direct successor of `self`.
    ///
    /// The `rejected -> under_review` edge exists only for the redraft
    /// loop; whether it is allowed at all is a policy question decided by
    /// the caller, not by this table.
    pub fn can_advance_to(self, target: NoticeStatus) -> bool {
        matches!(
            (self, target),
            (Self::Intake, Self::AiGenerated)
                | (Self::Intake, Self::Drafted)
                | (Self::AiGenerated, Self::Drafted)
                | (Self::Drafted, Self::UnderReview)
                | (Self::UnderReview, Self::Approved)
                | (Self::UnderReview, Self::Rejected)
                | (Self::Approved, Self::Distributed)
                | (Self::Rejected, Self::UnderReview)
        )
    }

    /// Position along the forward path, used for "advance only if not
    /// already past" checks. `rejected` shares the rank of `approved`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Intake => 0,
            Self::AiGenerated => 1,
            Self::Drafted => 2,
            Self::UnderReview => 3,
            Self::Approved | Self::Rejected => 4,
            Self::Distributed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Distributed)
    }
}

/// Approval status of one draft version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 4] =
        [Self::Draft, Self::Pending, Self::Approved, Self::Rejected];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// A draft in `draft` or `pending` blocks creation of a sibling
    /// version (single-active-draft rule).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Draft | Self::Pending)
    }
}

/// One recorded reviewer decision on a pending draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    Returned,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "returned" => Some(Self::Returned),
            _ => None,
        }
    }
}

/// Status of one distribution attempt row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    Queued,
    Sent,
    Failed,
}

impl DistributionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Projects a draft's approval status from its decision history.
///
/// The stored `approval_status` column must always agree with this
/// function; the history is the source of truth. `active` is the status
/// the draft holds while no final decision exists (`draft` before
/// submission, `pending` after).
pub fn derive_approval_status(active: ApprovalStatus, history: &[Decision]) -> ApprovalStatus {
    match history.last() {
        Some(Decision::Approved) => ApprovalStatus::Approved,
        Some(Decision::Rejected) => ApprovalStatus::Rejected,
        Some(Decision::Returned) | None => active,
    }
}
