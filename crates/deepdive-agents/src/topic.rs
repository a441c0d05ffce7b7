use std::fmt::Write as _;

use deepdive_core::{DeepDiveError, TopicSpec};

/// A research topic from one of the built-in catalogs.
///
/// Output keys are compile-time constants; [`Topic::spec`] still validates
/// them so a malformed catalog entry fails at construction, not mid-run.
pub trait Topic: Copy + 'static {
    fn agent_name(self) -> &'static str;
    fn output_key(self) -> &'static str;
    /// Heading used where this topic's output is quoted or reported.
    fn heading(self) -> &'static str;
    /// Instruction with a `{subject}` placeholder.
    fn template(self) -> &'static str;

    fn default_subject(self) -> Option<&'static str> {
        None
    }

    fn spec(self) -> Result<TopicSpec, DeepDiveError> {
        let spec = TopicSpec::new(self.agent_name(), self.output_key(), self.template())?
            .with_heading(self.heading());
        Ok(match self.default_subject() {
            Some(phrase) => spec.with_default_subject(phrase),
            None => spec,
        })
    }
}

/// Aggregator instruction quoting every topic's output under its heading.
pub(crate) fn aggregator_template<T: Topic>(intro: &str, topics: &[T], closing: &str) -> String {
    let mut template = format!("{intro}\n\n");
    for topic in topics {
        let _ = write!(
            template,
            "**{}:**\n{{{}}}\n\n",
            topic.heading(),
            topic.output_key()
        );
    }
    template.push_str(closing);
    template
}
