use std::fmt;
use std::str::FromStr;

use deepdive_core::{
    AggregatorUnit, DeepDiveError, FanOutGroup, Pipeline, TopicSpec, UnitFactory,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::digest::{self, DigestTopic};
use crate::investment::{self, InvestmentTopic};
use crate::topic::Topic;

/// Built-in pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Investment,
    Digest,
}

impl Workflow {
    pub const ALL: [Workflow; 2] = [Workflow::Investment, Workflow::Digest];

    pub fn as_str(self) -> &'static str {
        match self {
            Workflow::Investment => "investment",
            Workflow::Digest => "digest",
        }
    }

    /// Report title.
    pub fn title(self) -> &'static str {
        match self {
            Workflow::Investment => "Investment Analysis",
            Workflow::Digest => "Research Digest",
        }
    }

    /// Whether the workflow can run without a subject.
    pub fn supports_generic(self) -> bool {
        matches!(self, Workflow::Digest)
    }

    pub fn aggregator_key(self) -> &'static str {
        match self {
            Workflow::Investment => investment::AGGREGATOR_KEY,
            Workflow::Digest => digest::AGGREGATOR_KEY,
        }
    }

    pub fn topics(self) -> Result<Vec<TopicSpec>, DeepDiveError> {
        match self {
            Workflow::Investment => specs(&InvestmentTopic::ALL),
            Workflow::Digest => specs(&DigestTopic::ALL),
        }
    }

    pub fn kickoff_prompt(self, subject: &str) -> String {
        match self {
            Workflow::Investment => investment::kickoff_prompt(subject.trim()),
            Workflow::Digest => digest::kickoff_prompt(subject),
        }
    }

    /// Instantiate the pipeline for `subject`.
    pub fn build(self, factory: &UnitFactory, subject: &str) -> Result<Pipeline, DeepDiveError> {
        if subject.trim().is_empty() && !self.supports_generic() {
            return Err(DeepDiveError::InvalidConfiguration(format!(
                "the {} workflow needs a subject",
                self.as_str()
            )));
        }

        let (group_name, pipeline_name, aggregator_name, instruction) = match self {
            Workflow::Investment => (
                investment::GROUP_NAME,
                investment::PIPELINE_NAME,
                investment::AGGREGATOR_NAME,
                investment::aggregator_instruction(),
            ),
            Workflow::Digest => (
                digest::GROUP_NAME,
                digest::PIPELINE_NAME,
                digest::AGGREGATOR_NAME,
                digest::aggregator_instruction(),
            ),
        };

        let units = self
            .topics()?
            .iter()
            .map(|topic| factory.build(topic, subject))
            .collect();
        let group = FanOutGroup::new(group_name, units)?;
        let aggregator = AggregatorUnit::new(
            aggregator_name,
            instruction,
            self.aggregator_key(),
            factory.model(),
        )?;
        debug!(
            workflow = self.as_str(),
            units = group.len(),
            "workflow assembled"
        );
        Pipeline::new(pipeline_name, group, aggregator)
    }
}

fn specs<T: Topic>(topics: &[T]) -> Result<Vec<TopicSpec>, DeepDiveError> {
    topics.iter().map(|topic| topic.spec()).collect()
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Workflow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Workflow::ALL
            .into_iter()
            .find(|workflow| workflow.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown workflow `{value}` (expected investment or digest)"))
    }
}
