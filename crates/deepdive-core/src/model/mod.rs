//! Model runtime used by task units.
//!
//! Task units never talk HTTP themselves: they hand a [`ModelRequest`] to a
//! [`ResearchModel`]. The Gemini client is the production implementation; the
//! offline model produces canned text for dry runs.

mod error;
mod gemini;
mod offline;
mod retry;

pub use error::ModelError;
pub use gemini::GeminiClient;
pub use offline::OfflineModel;
pub use retry::RetryPolicy;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// External capability a unit may use while generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Search-grounded generation.
    WebSearch,
    /// Plain generation without tools.
    None,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::WebSearch => "web_search",
            Capability::None => "none",
        }
    }
}

/// A single generation call.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    /// Name of the unit issuing the call.
    pub agent: String,
    pub model: String,
    pub system_instruction: String,
    pub prompt: String,
    pub capability: Capability,
}

#[async_trait]
pub trait ResearchModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

pub type DynModel = Arc<dyn ResearchModel>;
