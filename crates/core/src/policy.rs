#![forbid(unsafe_code)]

use serde::Deserialize;

/// Rule for marking a notice `distributed` once sends succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCompletion {
    /// Every channel in `required_channels` must have a `sent` row.
    AllRequired,
    /// A single successful send on any channel completes the notice.
    AnyChannel,
}

/// Workflow configuration consumed by the store and engine.
///
/// The crate never loads this itself; callers deserialize it from wherever
/// they keep configuration and pass it in.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorkflowPolicy {
    /// Risk score at or above which a draft is flagged.
    pub risk_threshold_medium: u32,
    /// Risk score at or above which a draft is considered high risk.
    pub risk_threshold_high: u32,
    /// Channels that count toward `ChannelCompletion::AllRequired`.
    pub required_channels: Vec<String>,
    pub channel_completion: ChannelCompletion,
    /// Maker-checker separation: the approver must differ from the editor.
    pub maker_checker: bool,
    /// Maximum rejected versions per notice before further drafts are
    /// refused. `None` means unlimited.
    pub redraft_limit: Option<u32>,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            risk_threshold_medium: 50,
            risk_threshold_high: 70,
            required_channels: vec!["email".to_string()],
            channel_completion: ChannelCompletion::AllRequired,
            maker_checker: true,
            redraft_limit: None,
        }
    }
}

impl WorkflowPolicy {
    pub fn is_required_channel(&self, channel: &str) -> bool {
        self.required_channels.iter().any(|c| c == channel)
    }
}
