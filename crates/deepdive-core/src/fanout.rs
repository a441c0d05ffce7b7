//! Fan-out level of the pipeline: independent units run concurrently and are
//! joined before anything downstream may read their outputs.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::runtime::{RunContext, UnitReport};
use crate::state::{OutputKey, PipelineState};
use crate::unit::TaskUnit;
use crate::DeepDiveError;

#[derive(Debug, Clone)]
pub struct FanOutGroup {
    name: String,
    units: Vec<TaskUnit>,
}

/// Outputs of a completed group, merged into state only once every member succeeded.
#[derive(Debug, Clone)]
pub struct FanOutOutcome {
    pub state: PipelineState,
    pub reports: Vec<UnitReport>,
}

impl FanOutGroup {
    /// Validate member independence: distinct names, distinct output keys, and
    /// no member referencing another member's output.
    pub fn new(name: impl Into<String>, units: Vec<TaskUnit>) -> Result<Self, DeepDiveError> {
        let name = name.into();
        if units.is_empty() {
            return Err(DeepDiveError::EmptyGroup(name));
        }

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for unit in &units {
            if !names.insert(unit.name()) {
                return Err(DeepDiveError::DuplicateUnitName(unit.name().to_string()));
            }
            if !keys.insert(unit.output_key()) {
                return Err(DeepDiveError::DuplicateOutputKey(unit.output_key().to_string()));
            }
        }

        for unit in &units {
            if let Some(key) = unit.references().iter().find(|key| keys.contains(key)) {
                return Err(DeepDiveError::DependentMember {
                    unit: unit.name().to_string(),
                    key: key.to_string(),
                });
            }
        }

        Ok(Self { name, units })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[TaskUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn produces(&self, key: &OutputKey) -> bool {
        self.units.iter().any(|unit| unit.output_key() == key)
    }

    /// Run every member concurrently and wait for all of them.
    ///
    /// The first member failure (or cancellation) aborts the members still in
    /// flight and fails the group; nothing is merged in that case.
    #[instrument(name = "stage.fan_out", skip_all, fields(group = %self.name, units = self.units.len()))]
    pub async fn execute(
        &self,
        ctx: &RunContext,
        prompt: &str,
    ) -> Result<FanOutOutcome, DeepDiveError> {
        let permits = Arc::new(Semaphore::new(ctx.max_concurrency.min(self.units.len()).max(1)));
        let mut tasks = JoinSet::new();

        for (slot, unit) in self.units.iter().cloned().enumerate() {
            let ctx = ctx.clone();
            let prompt = prompt.to_string();
            let permits = permits.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (slot, Err(DeepDiveError::UnitAborted(unit.name().to_string())));
                };
                (slot, unit.execute(&ctx, &prompt).await)
            });
        }

        let mut slots: Vec<Option<(String, UnitReport)>> =
            (0..self.units.len()).map(|_| None).collect();

        loop {
            let joined = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    warn!(outstanding = tasks.len(), "fan-out cancelled; aborting members");
                    tasks.shutdown().await;
                    return Err(DeepDiveError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((slot, Ok(output))) => slots[slot] = Some(output),
                Ok((_, Err(err))) => {
                    warn!(
                        outstanding = tasks.len(),
                        error = %err,
                        "fan-out member failed; aborting group"
                    );
                    tasks.shutdown().await;
                    return Err(err);
                }
                Err(join_err) => {
                    tasks.shutdown().await;
                    return Err(DeepDiveError::Other(anyhow!(
                        "fan-out member task failed: {join_err}"
                    )));
                }
            }
        }

        let mut state = PipelineState::new();
        let mut reports = Vec::with_capacity(self.units.len());
        for (unit, slot) in self.units.iter().zip(slots) {
            let (text, report) =
                slot.ok_or_else(|| DeepDiveError::UnitAborted(unit.name().to_string()))?;
            state.insert(unit.output_key().clone(), text)?;
            reports.push(report);
        }

        info!(outputs = state.len(), "fan-out complete");
        Ok(FanOutOutcome { state, reports })
    }
}
