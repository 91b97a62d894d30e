#![forbid(unsafe_code)]

use nf_core::model::NoticeStatus;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    NotFound {
        entity: &'static str,
        id: String,
    },
    DuplicateId {
        id: String,
    },
    InvalidTransition {
        from: NoticeStatus,
        to: NoticeStatus,
    },
    InvalidState {
        expected: &'static str,
        actual: String,
    },
    ActiveDraftExists {
        draft_id: i64,
    },
    SelfApproval,
    ConcurrentModification {
        expected: i64,
        actual: i64,
    },
    NotApproved {
        draft_id: i64,
        status: String,
    },
    DuplicateBatch {
        draft_id: i64,
        channel: String,
        batch_id: String,
    },
    RedraftLimitExceeded {
        limit: u32,
    },
    ChainBroken {
        seq: i64,
    },
}

impl StoreError {
    /// Stable machine-readable code for each variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQL",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::ActiveDraftExists { .. } => "ACTIVE_DRAFT_EXISTS",
            Self::SelfApproval => "SELF_APPROVAL",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::NotApproved { .. } => "NOT_APPROVED",
            Self::DuplicateBatch { .. } => "DUPLICATE_BATCH",
            Self::RedraftLimitExceeded { .. } => "REDRAFT_LIMIT_EXCEEDED",
            Self::ChainBroken { .. } => "CHAIN_BROKEN",
        }
    }

    /// Whether the caller may safely retry the failed call as-is.
    /// Only optimistic-concurrency losers qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found (id={id})"),
            Self::DuplicateId { id } => write!(f, "notice id already exists (id={id})"),
            Self::InvalidTransition { from, to } => write!(
                f,
                "invalid notice transition ({} -> {})",
                from.as_str(),
                to.as_str()
            ),
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state (expected={expected}, actual={actual})")
            }
            Self::ActiveDraftExists { draft_id } => {
                write!(f, "an active draft already exists (draft_id={draft_id})")
            }
            Self::SelfApproval => write!(f, "approver must differ from the draft editor"),
            Self::ConcurrentModification { expected, actual } => write!(
                f,
                "concurrent modification (expected revision={expected}, actual={actual})"
            ),
            Self::NotApproved { draft_id, status } => write!(
                f,
                "draft is not approved for distribution (draft_id={draft_id}, status={status})"
            ),
            Self::DuplicateBatch {
                draft_id,
                channel,
                batch_id,
            } => write!(
                f,
                "distribution batch already recorded (draft_id={draft_id}, channel={channel}, batch={batch_id})"
            ),
            Self::RedraftLimitExceeded { limit } => {
                write!(f, "redraft limit exceeded (limit={limit})")
            }
            Self::ChainBroken { seq } => {
                write!(f, "audit chain broken at seq={seq}; writes are halted")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
