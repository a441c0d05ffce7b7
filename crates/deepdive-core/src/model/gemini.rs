//! Gemini `generateContent` client with search grounding.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Capability, ModelError, ModelRequest, ResearchModel};
use crate::config::ModelConfig;
use crate::{DeepDiveError, SecretValue};

pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: SecretValue,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: SecretValue) -> Result<Self, DeepDiveError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| {
                DeepDiveError::InvalidConfiguration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }
}

#[async_trait]
impl ResearchModel for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let body = GenerateContentRequest::from(request);

        let response = self
            .client
            .post(self.url(&request.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ModelError::Transport(format!("request timeout: {err}"))
                } else {
                    ModelError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ModelError::Transport(format!("failed to read body: {err}")))?;

        if !status.is_success() {
            return Err(ModelError::status(status.as_u16(), error_message(&text)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|err| ModelError::Malformed(err.to_string()))?;
        let output = parsed.text();
        debug!(
            agent = %request.agent,
            chars = output.len(),
            "gemini response received"
        );

        if output.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(output)
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

impl From<&ModelRequest> for GenerateContentRequest {
    fn from(request: &ModelRequest) -> Self {
        let tools = match request.capability {
            Capability::WebSearch => vec![Tool {
                google_search: GoogleSearch {},
            }],
            Capability::None => Vec::new(),
        };
        Self {
            system_instruction: Content::text(None, &request.system_instruction),
            contents: vec![Content::text(Some("user"), &request.prompt)],
            tools,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(capability: Capability) -> ModelRequest {
        ModelRequest {
            agent: "DebtAnalysisAgent".into(),
            model: "gemini-2.5-flash-lite".into(),
            system_instruction: "Research debt".into(),
            prompt: "Analyze ACME".into(),
            capability,
        }
    }

    #[test]
    fn search_capability_adds_grounding_tool() {
        let body = serde_json::to_value(GenerateContentRequest::from(&request(
            Capability::WebSearch,
        )))
        .unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Research debt");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Analyze ACME");
        assert!(body["tools"][0]["google_search"].is_object());

        let plain =
            serde_json::to_value(GenerateContentRequest::from(&request(Capability::None))).unwrap();
        assert!(plain.get("tools").is_none());
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Debt is "},{"text":"manageable."}]}},
                {"content":{"parts":[{"text":"ignored"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "Debt is manageable.");

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn error_message_prefers_api_envelope() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(error_message(body), "Resource has been exhausted");
        assert_eq!(error_message("upstream connect error\n"), "upstream connect error");
    }
}
