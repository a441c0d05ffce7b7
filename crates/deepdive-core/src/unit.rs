//! Task units and the factory that instantiates them from topic specs.

use serde::Serialize;

use crate::model::{Capability, ModelRequest};
use crate::runtime::{RunContext, UnitReport, invoke};
use crate::state::OutputKey;
use crate::template::InstructionTemplate;
use crate::DeepDiveError;

/// Placeholder replaced by the run's subject when a unit is built.
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";
const SUBJECT_KEY: &str = "subject";

/// What a unit researches, before it is bound to a subject.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    name: String,
    output_key: OutputKey,
    template: String,
    default_subject: Option<String>,
    heading: Option<String>,
    capability: Capability,
}

impl TopicSpec {
    pub fn new(
        name: impl Into<String>,
        output_key: &str,
        template: impl Into<String>,
    ) -> Result<Self, DeepDiveError> {
        Ok(Self {
            name: name.into(),
            output_key: OutputKey::new(output_key)?,
            template: template.into(),
            default_subject: None,
            heading: None,
            capability: Capability::WebSearch,
        })
    }

    /// Phrase substituted for `{subject}` when the run has no subject.
    pub fn with_default_subject(mut self, phrase: impl Into<String>) -> Self {
        self.default_subject = Some(phrase.into());
        self
    }

    /// Section heading for reports; defaults to the key's label.
    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_key(&self) -> &OutputKey {
        &self.output_key
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

/// One independent research task bound to a subject.
#[derive(Debug, Clone, Serialize)]
pub struct TaskUnit {
    name: String,
    instruction: String,
    output_key: OutputKey,
    capability: Capability,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading: Option<String>,
    #[serde(skip)]
    references: Vec<OutputKey>,
}

impl TaskUnit {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        output_key: OutputKey,
        capability: Capability,
        model: impl Into<String>,
    ) -> Self {
        let instruction = instruction.into();
        let references = InstructionTemplate::parse(instruction.as_str())
            .referenced_keys()
            .into_iter()
            .cloned()
            .collect();
        Self {
            name: name.into(),
            instruction,
            output_key,
            capability,
            model: model.into(),
            heading: None,
            references,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn output_key(&self) -> &OutputKey {
        &self.output_key
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn heading(&self) -> String {
        self.heading
            .clone()
            .unwrap_or_else(|| self.output_key.label())
    }

    /// Output keys mentioned as placeholders in the unit's topic template.
    pub fn references(&self) -> &[OutputKey] {
        &self.references
    }

    pub fn request(&self, prompt: &str) -> ModelRequest {
        ModelRequest {
            agent: self.name.clone(),
            model: self.model.clone(),
            system_instruction: self.instruction.clone(),
            prompt: prompt.to_string(),
            capability: self.capability,
        }
    }

    pub(crate) async fn execute(
        &self,
        ctx: &RunContext,
        prompt: &str,
    ) -> Result<(String, UnitReport), DeepDiveError> {
        invoke(ctx, &self.output_key, &self.request(prompt)).await
    }
}

/// Builds task units for one model.
#[derive(Debug, Clone)]
pub struct UnitFactory {
    model: String,
}

impl UnitFactory {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Bind `topic` to `subject`. An empty subject falls back to the topic's
    /// default phrase.
    pub fn build(&self, topic: &TopicSpec, subject: &str) -> TaskUnit {
        let subject = subject.trim();
        let subject = if subject.is_empty() {
            topic.default_subject.as_deref().unwrap_or_default()
        } else {
            subject
        };

        // References are taken from the template; the subject never contributes any.
        let references = InstructionTemplate::parse(topic.template.as_str())
            .referenced_keys()
            .into_iter()
            .filter(|key| key.as_str() != SUBJECT_KEY)
            .cloned()
            .collect();

        TaskUnit {
            name: topic.name.clone(),
            instruction: topic.template.replace(SUBJECT_PLACEHOLDER, subject),
            output_key: topic.output_key.clone(),
            capability: topic.capability,
            model: self.model.clone(),
            heading: topic.heading.clone(),
            references,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> TopicSpec {
        TopicSpec::new(
            "DebtAnalysisAgent",
            "debt_analysis",
            "Research {subject}'s debt levels. Keep concise.",
        )
        .unwrap()
    }

    #[test]
    fn factory_binds_subject_and_model() {
        let unit = UnitFactory::new("gemini-2.5-flash-lite").build(&topic(), " ACME ");
        assert_eq!(unit.name(), "DebtAnalysisAgent");
        assert_eq!(unit.instruction(), "Research ACME's debt levels. Keep concise.");
        assert_eq!(unit.output_key().as_str(), "debt_analysis");
        assert_eq!(unit.model(), "gemini-2.5-flash-lite");
        assert_eq!(unit.capability(), Capability::WebSearch);
        assert!(unit.references().is_empty());
        assert_eq!(unit.heading(), "Debt Analysis");
    }

    #[test]
    fn curated_heading_overrides_key_label() {
        let topic = TopicSpec::new("CEOAgent", "ceo_analysis", "Assess {subject}'s CEO.")
            .unwrap()
            .with_heading("CEO Analysis");
        let unit = UnitFactory::new("m").build(&topic, "ACME");
        assert_eq!(unit.heading(), "CEO Analysis");
    }

    #[test]
    fn factory_is_deterministic() {
        let factory = UnitFactory::new("m");
        let first = factory.build(&topic(), "ACME");
        let second = factory.build(&topic(), "ACME");
        assert_eq!(first.instruction(), second.instruction());
        assert_eq!(first.output_key(), second.output_key());
    }

    #[test]
    fn empty_subject_uses_default_phrase() {
        let topic = TopicSpec::new(
            "TechResearcher",
            "tech_research",
            "Research technology trends in {subject}.",
        )
        .unwrap()
        .with_default_subject("the industry at large");
        let unit = UnitFactory::new("m").build(&topic, "  ");
        assert_eq!(
            unit.instruction(),
            "Research technology trends in the industry at large."
        );
    }

    #[test]
    fn references_come_from_template_not_subject() {
        let topic = TopicSpec::new("Follower", "follower", "Extend {leader} for {subject}.").unwrap();
        let unit = UnitFactory::new("m").build(&topic, "{sneaky}");
        let refs: Vec<_> = unit.references().iter().map(OutputKey::as_str).collect();
        assert_eq!(refs, vec!["leader"]);
    }

    #[test]
    fn invalid_topic_key_is_rejected() {
        let err = TopicSpec::new("Bad", "bad key", "x").unwrap_err();
        assert!(matches!(err, DeepDiveError::InvalidOutputKey(_)));
    }

    #[test]
    fn request_carries_instruction_and_prompt() {
        let unit = UnitFactory::new("m").build(&topic(), "ACME");
        let request = unit.request("Analyze ACME");
        assert_eq!(request.agent, "DebtAnalysisAgent");
        assert_eq!(request.system_instruction, unit.instruction());
        assert_eq!(request.prompt, "Analyze ACME");
        assert_eq!(request.capability, Capability::WebSearch);
    }
}
