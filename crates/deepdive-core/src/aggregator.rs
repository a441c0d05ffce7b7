use crate::model::{Capability, ModelRequest};
use crate::runtime::{RunContext, UnitReport, invoke};
use crate::state::{OutputKey, PipelineState};
use crate::template::InstructionTemplate;
use crate::DeepDiveError;

/// Final unit that synthesizes the fan-out outputs into one result.
#[derive(Debug, Clone)]
pub struct AggregatorUnit {
    name: String,
    template: InstructionTemplate,
    output_key: OutputKey,
    model: String,
}

impl AggregatorUnit {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        output_key: &str,
        model: impl Into<String>,
    ) -> Result<Self, DeepDiveError> {
        Ok(Self {
            name: name.into(),
            template: InstructionTemplate::parse(template),
            output_key: OutputKey::new(output_key)?,
            model: model.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_key(&self) -> &OutputKey {
        &self.output_key
    }

    pub fn template(&self) -> &InstructionTemplate {
        &self.template
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Substitute the referenced outputs; fails fast if any required one is absent.
    pub fn render_instruction(&self, state: &PipelineState) -> Result<String, DeepDiveError> {
        self.template.render(state)
    }

    pub(crate) async fn execute(
        &self,
        ctx: &RunContext,
        prompt: &str,
        state: &PipelineState,
    ) -> Result<(String, UnitReport), DeepDiveError> {
        let instruction = self.render_instruction(state)?;
        let request = ModelRequest {
            agent: self.name.clone(),
            model: self.model.clone(),
            system_instruction: instruction,
            prompt: prompt.to_string(),
            capability: Capability::None,
        };
        invoke(ctx, &self.output_key, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_referenced_outputs() {
        let aggregator =
            AggregatorUnit::new("Summary", "Combine: {alpha} / {beta}", "summary", "m").unwrap();
        let mut state = PipelineState::new();
        state.insert(OutputKey::new("alpha").unwrap(), "A text").unwrap();
        state.insert(OutputKey::new("beta").unwrap(), "B text").unwrap();

        assert_eq!(
            aggregator.render_instruction(&state).unwrap(),
            "Combine: A text / B text"
        );
    }

    #[test]
    fn refuses_to_render_with_missing_outputs() {
        let aggregator =
            AggregatorUnit::new("Summary", "Combine: {alpha} / {beta}", "summary", "m").unwrap();
        let err = aggregator.render_instruction(&PipelineState::new()).unwrap_err();
        assert!(matches!(err, DeepDiveError::MissingOutput(ref key) if key == "alpha"));
    }
}
