use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{ModelError, ModelRequest, ResearchModel};

/// Deterministic model for dry runs: echoes which agent answered and the
/// head of its instruction instead of calling a provider.
#[derive(Default)]
pub struct OfflineModel {
    calls: AtomicU64,
}

impl OfflineModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResearchModel for OfflineModel {
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let head = request
            .system_instruction
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        Ok(format!(
            "[offline] {} ({}) would answer: {}",
            request.agent,
            request.capability.as_str(),
            head
        ))
    }
}
