//! Output keys and the write-once pipeline state.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::DeepDiveError;

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid output key regex"));

/// Name under which a unit publishes its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputKey(String);

impl OutputKey {
    pub fn new(key: impl Into<String>) -> Result<Self, DeepDiveError> {
        let key = key.into();
        if KEY_PATTERN.is_match(&key) {
            Ok(Self(key))
        } else {
            Err(DeepDiveError::InvalidOutputKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable label: `debt_analysis` becomes `Debt Analysis`.
    pub fn label(&self) -> String {
        self.0
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OutputKey {
    type Error = DeepDiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OutputKey> for String {
    fn from(key: OutputKey) -> Self {
        key.0
    }
}

impl std::borrow::Borrow<str> for OutputKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Outputs produced during one run. Each key is written at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    outputs: HashMap<OutputKey, String>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `text` under `key`; an existing key is never overwritten.
    pub fn insert(&mut self, key: OutputKey, text: impl Into<String>) -> Result<(), DeepDiveError> {
        if self.outputs.contains_key(&key) {
            return Err(DeepDiveError::DuplicateOutputKey(key.0));
        }
        self.outputs.insert(key, text.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.outputs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &OutputKey> {
        self.outputs.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_keys_are_validated() {
        assert!(OutputKey::new("business_understanding").is_ok());
        assert!(OutputKey::new("_private2").is_ok());
        for bad in ["", "2fast", "has space", "dash-key", "brace}"] {
            assert!(
                matches!(OutputKey::new(bad), Err(DeepDiveError::InvalidOutputKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(OutputKey::new("debt_analysis").unwrap().label(), "Debt Analysis");
        assert_eq!(OutputKey::new("ceo_analysis").unwrap().label(), "Ceo Analysis");
        assert_eq!(OutputKey::new("alpha").unwrap().label(), "Alpha");
    }

    #[test]
    fn state_is_write_once() {
        let key = OutputKey::new("alpha").unwrap();
        let mut state = PipelineState::new();
        state.insert(key.clone(), "A text").unwrap();

        let err = state.insert(key, "replacement").unwrap_err();
        assert!(matches!(err, DeepDiveError::DuplicateOutputKey(ref k) if k == "alpha"));
        assert_eq!(state.get("alpha"), Some("A text"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn keys_deserialize_with_validation() {
        let ok: OutputKey = serde_json::from_str("\"media_sentiment\"").unwrap();
        assert_eq!(ok.as_str(), "media_sentiment");
        assert!(serde_json::from_str::<OutputKey>("\"not valid\"").is_err());
    }
}
