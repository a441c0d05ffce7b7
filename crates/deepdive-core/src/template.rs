//! Instruction templates with `{key}` / `{key?}` placeholders.
//!
//! A required placeholder must resolve when rendering; an optional one renders
//! empty. Braces that do not form a placeholder are kept verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::{OutputKey, PipelineState};
use crate::DeepDiveError;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(\?)?\}").expect("invalid placeholder regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { key: OutputKey, optional: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl InstructionTemplate {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut segments = Vec::new();
        let mut cursor = 0;

        for caps in PLACEHOLDER.captures_iter(&source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            // The pattern already guarantees a valid key.
            let Ok(key) = OutputKey::new(name.as_str()) else {
                continue;
            };
            if whole.start() > cursor {
                segments.push(Segment::Literal(source[cursor..whole.start()].to_string()));
            }
            segments.push(Segment::Placeholder {
                key,
                optional: caps.get(2).is_some(),
            });
            cursor = whole.end();
        }
        if cursor < source.len() {
            segments.push(Segment::Literal(source[cursor..].to_string()));
        }

        Self { source, segments }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every key referenced, in order of first appearance.
    pub fn referenced_keys(&self) -> Vec<&OutputKey> {
        self.placeholders(|_| true)
    }

    /// Keys that must be present for [`render`](Self::render) to succeed.
    pub fn required_keys(&self) -> Vec<&OutputKey> {
        self.placeholders(|optional| !optional)
    }

    fn placeholders(&self, filter: impl Fn(bool) -> bool) -> Vec<&OutputKey> {
        let mut keys: Vec<&OutputKey> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder { key, optional } = segment {
                if filter(*optional) && !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Substitute outputs from `state`; fails on the first missing required key.
    pub fn render(&self, state: &PipelineState) -> Result<String, DeepDiveError> {
        let mut rendered = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder { key, optional } => match state.get(key.as_str()) {
                    Some(value) => rendered.push_str(value),
                    None if *optional => {}
                    None => return Err(DeepDiveError::MissingOutput(key.to_string())),
                },
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(entries: &[(&str, &str)]) -> PipelineState {
        let mut state = PipelineState::new();
        for (key, text) in entries {
            state.insert(OutputKey::new(*key).unwrap(), *text).unwrap();
        }
        state
    }

    #[test]
    fn combines_referenced_outputs() {
        let template = InstructionTemplate::parse("Combine: {alpha} / {beta}");
        let rendered = template
            .render(&state(&[("alpha", "A text"), ("beta", "B text")]))
            .unwrap();
        assert_eq!(rendered, "Combine: A text / B text");
    }

    #[test]
    fn missing_required_key_fails_fast() {
        let template = InstructionTemplate::parse("Combine: {alpha} / {beta}");
        let err = template.render(&state(&[("alpha", "A text")])).unwrap_err();
        assert!(matches!(err, DeepDiveError::MissingOutput(ref key) if key == "beta"));
    }

    #[test]
    fn optional_placeholders_render_empty() {
        let template = InstructionTemplate::parse("[{alpha}] [{gamma?}]");
        assert_eq!(template.required_keys().len(), 1);
        assert_eq!(template.referenced_keys().len(), 2);
        let rendered = template.render(&state(&[("alpha", "A")])).unwrap();
        assert_eq!(rendered, "[A] []");
    }

    #[test]
    fn non_placeholder_braces_are_literal() {
        let template = InstructionTemplate::parse("json {\"a\": 1} {not a key} {{alpha}}");
        let keys: Vec<_> = template.referenced_keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["alpha"]);
        let rendered = template.render(&state(&[("alpha", "A")])).unwrap();
        assert_eq!(rendered, "json {\"a\": 1} {not a key} {A}");
    }

    #[test]
    fn repeated_keys_are_listed_once() {
        let template = InstructionTemplate::parse("{alpha} and again {alpha}");
        assert_eq!(template.referenced_keys().len(), 1);
        assert_eq!(template.source(), "{alpha} and again {alpha}");
    }
}
