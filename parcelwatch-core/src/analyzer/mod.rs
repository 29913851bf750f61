//! Analyzers turn captured raw messages into structured order data.

pub mod llm;

use async_trait::async_trait;
use parcelwatch_model::{EmailAnalysis, RawEmail};

use crate::error::Result;

pub use llm::LlmAnalyzer;

/// A pluggable extraction backend.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one captured message.
    ///
    /// Returns the parsed analysis (or `None` when the backend produced
    /// nothing usable) plus the raw response value, which the processor
    /// stores on the queue item regardless of outcome. Transport failures
    /// are errors; malformed output is not.
    async fn analyze(&self, raw: &RawEmail) -> Result<(Option<EmailAnalysis>, serde_json::Value)>;
}
