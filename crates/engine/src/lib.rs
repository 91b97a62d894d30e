#![forbid(unsafe_code)]

mod collaborators;
mod engine;
mod error;
mod support;

pub use collaborators::{ChannelSender, DraftGenerator, GenerateError, GeneratedDraft};
pub use engine::Engine;
pub use error::EngineError;
