#![forbid(unsafe_code)]

use nf_storage::{NoticeRow, SendResult};
use std::fmt;
use std::time::Duration;

/// What a generation collaborator hands back for one notice.
#[derive(Clone, Debug)]
pub struct GeneratedDraft {
    pub internal_summary: String,
    pub customer_draft: String,
    pub model_version: String,
    pub risk_tokens: Vec<String>,
}

/// Failure reported by a generation collaborator. The request row has
/// already been persisted by the time this surfaces.
#[derive(Clone, Debug)]
pub struct GenerateError {
    pub detail: String,
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generation failed: {}", self.detail)
    }
}

impl std::error::Error for GenerateError {}

/// Produces draft text for a notice. Implementations wrap an external
/// model call; the engine never inspects how.
pub trait DraftGenerator {
    fn generate(
        &self,
        notice: &NoticeRow,
        template_type: &str,
        customer_segment: &str,
        timeout: Duration,
    ) -> Result<GeneratedDraft, GenerateError>;
}

/// Delivers one approved draft over one channel. The verdict is recorded
/// as-is; a `Failed` outcome is data, not an error.
pub trait ChannelSender {
    fn send(
        &self,
        channel: &str,
        recipient_segment: &str,
        text: &str,
        batch_id: &str,
        timeout: Duration,
    ) -> SendResult;
}
