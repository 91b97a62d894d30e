#![forbid(unsafe_code)]

use crate::policy::WorkflowPolicy;

/// Token weights. Regulatory exposure outweighs sentiment, which
/// outweighs anything else the model emitted.
const WEIGHT_REGULATORY: u32 = 30;
const WEIGHT_NEGATIVE: u32 = 20;
const WEIGHT_DEFAULT: u32 = 10;

const REGULATORY_TOKENS: [&str; 8] = [
    "regulatory",
    "compliance",
    "sanction",
    "investigation",
    "lawsuit",
    "litigation",
    "delisting",
    "suspension",
];

const NEGATIVE_TOKENS: [&str; 8] = [
    "negative",
    "decrease",
    "decline",
    "cut",
    "loss",
    "downgrade",
    "impairment",
    "deficit",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

fn token_weight(token: &str) -> u32 {
    let token = token.trim();
    if token.is_empty() {
        return 0;
    }
    let lower = token.to_ascii_lowercase();
    if REGULATORY_TOKENS.contains(&lower.as_str()) {
        WEIGHT_REGULATORY
    } else if NEGATIVE_TOKENS.contains(&lower.as_str()) {
        WEIGHT_NEGATIVE
    } else {
        WEIGHT_DEFAULT
    }
}

/// Deterministic risk score for a draft, summed over the risk tokens the
/// generation step reported. No hidden state: same tokens, same score.
pub fn risk_score<S: AsRef<str>>(tokens: &[S]) -> u32 {
    tokens
        .iter()
        .map(|token| token_weight(token.as_ref()))
        .sum()
}

pub fn risk_level(score: u32, policy: &WorkflowPolicy) -> RiskLevel {
    if score >= policy.risk_threshold_high {
        RiskLevel::High
    } else if score >= policy.risk_threshold_medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// The flag persisted on a draft version: anything at or above the medium
/// threshold is surfaced for reviewer attention.
pub fn risk_flag<S: AsRef<str>>(tokens: &[S], policy: &WorkflowPolicy) -> bool {
    risk_level(risk_score(tokens), policy) > RiskLevel::Low
}
