//! Two-stage pipeline: fan-out group, then aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::AggregatorUnit;
use crate::events::EventCollector;
use crate::fanout::FanOutGroup;
use crate::runtime::{RunContext, UnitReport};
use crate::state::{OutputKey, PipelineState};
use crate::DeepDiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    NotStarted,
    FanningOut,
    Aggregating,
    Complete,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::NotStarted => "not_started",
            PipelineStatus::FanningOut => "fanning_out",
            PipelineStatus::Aggregating => "aggregating",
            PipelineStatus::Complete => "complete",
            PipelineStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: PipelineStatus) -> bool {
        use PipelineStatus::*;
        matches!(
            (self, next),
            (NotStarted, FanningOut)
                | (FanningOut, Aggregating)
                | (Aggregating, Complete)
                | (FanningOut, Failed)
                | (Aggregating, Failed)
        )
    }

    pub fn transition(self, next: PipelineStatus) -> Result<PipelineStatus, DeepDiveError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DeepDiveError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Drives the status machine for one run and reports every transition.
struct StatusTracker<'a> {
    status: PipelineStatus,
    history: Vec<PipelineStatus>,
    events: &'a EventCollector,
}

impl<'a> StatusTracker<'a> {
    fn new(events: &'a EventCollector) -> Self {
        Self {
            status: PipelineStatus::NotStarted,
            history: vec![PipelineStatus::NotStarted],
            events,
        }
    }

    fn advance(&mut self, next: PipelineStatus) -> Result<(), DeepDiveError> {
        let from = self.status;
        self.status = from.transition(next)?;
        self.history.push(next);
        self.events.emit_status(from, next);
        Ok(())
    }

    fn fail(mut self, run_id: Uuid, error: DeepDiveError, state: PipelineState) -> FailedRun {
        let stage = self.status;
        if self.advance(PipelineStatus::Failed).is_err() {
            self.status = PipelineStatus::Failed;
            self.history.push(PipelineStatus::Failed);
        }
        FailedRun {
            run_id,
            stage,
            error,
            state,
            history: self.history,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedRun {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub units: Vec<UnitReport>,
    pub aggregate: UnitReport,
    pub history: Vec<PipelineStatus>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CompletedRun {
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus::Complete
    }

    /// The aggregator's synthesized output.
    pub fn final_output(&self) -> Option<&str> {
        self.state.get(self.aggregate.output_key.as_str())
    }
}

#[derive(Debug, Error)]
#[error("pipeline failed while {}: {error}", .stage.as_str())]
pub struct FailedRun {
    pub run_id: Uuid,
    /// Status the run was in when the error happened.
    pub stage: PipelineStatus,
    #[source]
    pub error: DeepDiveError,
    /// Outputs merged before the failure; empty when the fan-out failed.
    pub state: PipelineState,
    pub history: Vec<PipelineStatus>,
}

impl FailedRun {
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus::Failed
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    fan_out: FanOutGroup,
    aggregator: AggregatorUnit,
}

impl Pipeline {
    /// Every key the aggregator requires must come from the group, and the
    /// aggregator's own key must not collide with a member key.
    pub fn new(
        name: impl Into<String>,
        fan_out: FanOutGroup,
        aggregator: AggregatorUnit,
    ) -> Result<Self, DeepDiveError> {
        if fan_out.produces(aggregator.output_key()) {
            return Err(DeepDiveError::DuplicateOutputKey(
                aggregator.output_key().to_string(),
            ));
        }
        if let Some(key) = aggregator
            .template()
            .required_keys()
            .into_iter()
            .find(|key| !fan_out.produces(key))
        {
            return Err(DeepDiveError::UnknownReference {
                aggregator: aggregator.name().to_string(),
                key: key.to_string(),
            });
        }

        Ok(Self {
            name: name.into(),
            fan_out,
            aggregator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fan_out(&self) -> &FanOutGroup {
        &self.fan_out
    }

    pub fn aggregator(&self) -> &AggregatorUnit {
        &self.aggregator
    }

    /// Report sections as `(key, heading)`: aggregator first, then members
    /// in declaration order.
    pub fn sections(&self) -> Vec<(&OutputKey, String)> {
        let aggregator = self.aggregator.output_key();
        std::iter::once((aggregator, aggregator.label()))
            .chain(
                self.fan_out
                    .units()
                    .iter()
                    .map(|unit| (unit.output_key(), unit.heading())),
            )
            .collect()
    }

    #[instrument(name = "pipeline.run", skip_all, fields(pipeline = %self.name))]
    pub async fn run(&self, ctx: &RunContext, prompt: &str) -> Result<CompletedRun, FailedRun> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tracker = StatusTracker::new(&ctx.events);

        if let Err(error) = tracker.advance(PipelineStatus::FanningOut) {
            return Err(tracker.fail(run_id, error, PipelineState::new()));
        }
        info!(%run_id, units = self.fan_out.len(), "fan-out started");

        let fan_out = match self.fan_out.execute(ctx, prompt).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%run_id, error = %error, "fan-out failed; aggregation skipped");
                return Err(tracker.fail(run_id, error, PipelineState::new()));
            }
        };

        let mut state = fan_out.state;
        if let Err(error) = tracker.advance(PipelineStatus::Aggregating) {
            return Err(tracker.fail(run_id, error, state));
        }
        info!(%run_id, aggregator = %self.aggregator.name(), "aggregation started");

        let (text, aggregate) = match self.aggregator.execute(ctx, prompt, &state).await {
            Ok(output) => output,
            Err(error) => {
                warn!(%run_id, error = %error, "aggregation failed");
                return Err(tracker.fail(run_id, error, state));
            }
        };
        if let Err(error) = state.insert(aggregate.output_key.clone(), text) {
            return Err(tracker.fail(run_id, error, state));
        }
        if let Err(error) = tracker.advance(PipelineStatus::Complete) {
            return Err(tracker.fail(run_id, error, state));
        }

        info!(%run_id, outputs = state.len(), "pipeline complete");
        Ok(CompletedRun {
            run_id,
            state,
            units: fan_out.reports,
            aggregate,
            history: tracker.history,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Capability;
    use crate::unit::TaskUnit;

    fn group() -> FanOutGroup {
        let unit = |name: &str, key: &str| {
            TaskUnit::new(
                name,
                "research",
                OutputKey::new(key).unwrap(),
                Capability::WebSearch,
                "m",
            )
        };
        FanOutGroup::new("team", vec![unit("A", "alpha"), unit("B", "beta")]).unwrap()
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        use PipelineStatus::*;
        assert!(NotStarted.can_transition_to(FanningOut));
        assert!(FanningOut.can_transition_to(Aggregating));
        assert!(Aggregating.can_transition_to(Complete));
        assert!(FanningOut.can_transition_to(Failed));
        assert!(Aggregating.can_transition_to(Failed));

        assert!(!NotStarted.can_transition_to(Aggregating));
        assert!(!NotStarted.can_transition_to(Failed));
        assert!(!FanningOut.can_transition_to(Complete));
        for next in [NotStarted, FanningOut, Aggregating, Complete] {
            assert!(
                matches!(Failed.transition(next), Err(DeepDiveError::InvalidTransition { .. })),
                "Failed must be absorbing"
            );
        }
    }

    #[test]
    fn aggregator_must_reference_known_keys() {
        let aggregator =
            AggregatorUnit::new("Agg", "{alpha} {gamma}", "summary", "m").unwrap();
        let err = Pipeline::new("p", group(), aggregator).unwrap_err();
        assert!(matches!(err, DeepDiveError::UnknownReference { ref key, .. } if key == "gamma"));
    }

    #[test]
    fn optional_references_need_not_exist() {
        let aggregator =
            AggregatorUnit::new("Agg", "{alpha} {beta} {gamma?}", "summary", "m").unwrap();
        assert!(Pipeline::new("p", group(), aggregator).is_ok());
    }

    #[test]
    fn aggregator_key_must_be_unique() {
        let aggregator = AggregatorUnit::new("Agg", "{alpha}", "beta", "m").unwrap();
        let err = Pipeline::new("p", group(), aggregator).unwrap_err();
        assert!(matches!(err, DeepDiveError::DuplicateOutputKey(ref key) if key == "beta"));
    }

    #[test]
    fn sections_put_aggregator_first() {
        let aggregator = AggregatorUnit::new("Agg", "{alpha} {beta}", "summary", "m").unwrap();
        let pipeline = Pipeline::new("p", group(), aggregator).unwrap();
        let keys: Vec<_> = pipeline.sections().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["summary", "alpha", "beta"]);
        assert_eq!(pipeline.sections()[1].1, "Alpha");
    }
}
