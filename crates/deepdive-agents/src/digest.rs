//! Three-topic research digest.
//!
//! Each topic has a default subject phrase, so the digest can also run
//! without a subject and survey its fields at large.

use crate::topic::{Topic, aggregator_template};

pub const GROUP_NAME: &str = "ParallelResearchTeam";
pub const PIPELINE_NAME: &str = "ResearchDigestSystem";
pub const AGGREGATOR_NAME: &str = "DigestAggregator";
pub const AGGREGATOR_KEY: &str = "executive_summary";

const AGGREGATOR_INTRO: &str = "Combine these research findings into one executive summary:";
const AGGREGATOR_CLOSING: &str = "Highlight the common themes and any surprising connections.
Close with the most important takeaways.
Summary should be around 200 words.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestTopic {
    Technology,
    Health,
    Finance,
}

impl DigestTopic {
    pub const ALL: [DigestTopic; 3] = [
        DigestTopic::Technology,
        DigestTopic::Health,
        DigestTopic::Finance,
    ];
}

impl Topic for DigestTopic {
    fn agent_name(self) -> &'static str {
        match self {
            Self::Technology => "TechResearcher",
            Self::Health => "HealthResearcher",
            Self::Finance => "FinanceResearcher",
        }
    }

    fn output_key(self) -> &'static str {
        match self {
            Self::Technology => "tech_research",
            Self::Health => "health_research",
            Self::Finance => "finance_research",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::Technology => "Technology Trends",
            Self::Health => "Health Innovations",
            Self::Finance => "Financial Developments",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::Technology => {
                "Research the latest technology trends related to {subject}.
Include the 3 most important developments and their implications.
Keep concise (100 words)."
            }
            Self::Health => {
                "Research recent health and medical innovations related to {subject}.
Include the 3 most significant advances and their practical impact.
Keep concise (100 words)."
            }
            Self::Finance => {
                "Research current financial developments related to {subject}.
Include the 3 key trends and what they mean for the market.
Keep concise (100 words)."
            }
        }
    }

    fn default_subject(self) -> Option<&'static str> {
        Some(match self {
            Self::Technology => "artificial intelligence and computing",
            Self::Health => "medicine and public health",
            Self::Finance => "global markets and fintech",
        })
    }
}

pub fn aggregator_instruction() -> String {
    aggregator_template(AGGREGATOR_INTRO, &DigestTopic::ALL, AGGREGATOR_CLOSING)
}

/// An empty subject asks for a field-wide survey.
pub fn kickoff_prompt(subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        "Research recent technology trends, health innovations, and financial developments. \
         Provide a comprehensive executive summary."
            .to_string()
    } else {
        format!(
            "Research recent technology trends, health innovations, and financial developments \
             related to {subject}. Provide a comprehensive executive summary."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_topic_has_a_default_subject() {
        for topic in DigestTopic::ALL {
            assert!(topic.default_subject().is_some());
            assert!(topic.template().contains("{subject}"));
        }
    }

    #[test]
    fn aggregator_references_all_three_outputs() {
        let instruction = aggregator_instruction();
        for key in ["{tech_research}", "{health_research}", "{finance_research}"] {
            assert!(instruction.contains(key), "missing {key}");
        }
    }

    #[test]
    fn kickoff_prompt_mentions_subject_when_given() {
        assert!(kickoff_prompt("quantum sensors").contains("related to quantum sensors."));
        assert!(!kickoff_prompt("  ").contains("related to"));
    }
}
