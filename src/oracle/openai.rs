//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::oracle::{OracleError, OraclePrompt, ScoringOracle};

const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f64 = 0.2;

/// Oracle backed by a `/v1/chat/completions` endpoint.
pub struct OpenAiOracle {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiOracle {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

fn user_content(prompt: &OraclePrompt) -> MessageContent {
    match &prompt.image_url {
        Some(url) => MessageContent::Parts(vec![
            ContentPart::Text {
                text: prompt.user.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            },
        ]),
        None => MessageContent::Text(prompt.user.clone()),
    }
}

#[async_trait]
impl ScoringOracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, image = prompt.image_url.is_some()))]
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String, OracleError> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(prompt.system.clone()),
                },
                ChatMessage {
                    role: "user",
                    content: user_content(prompt),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(self.timeout.as_secs())
                } else {
                    OracleError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::MalformedResponse("response has no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_prompt() -> OraclePrompt {
        OraclePrompt {
            system: "judge".to_string(),
            user: "Question: ...".to_string(),
            image_url: None,
        }
    }

    fn oracle(server: &MockServer) -> OpenAiOracle {
        OpenAiOracle::new("test-key", &server.uri(), "gpt-4o-mini", Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Score: 8\n\nExplanation: Good."}, "index": 0}],
                "model": "gpt-4o-mini"
            })))
            .mount(&server)
            .await;

        let reply = oracle(&server).complete(&text_prompt()).await.unwrap();
        assert_eq!(reply, "Score: 8\n\nExplanation: Good.");
    }

    #[tokio::test]
    async fn image_prompt_sends_multimodal_parts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "judge"},
                    {"role": "user", "content": [
                        {"type": "text", "text": "Question: ..."},
                        {"type": "image_url", "image_url": {"url": "https://cdn.example.com/a.jpg"}}
                    ]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Score: 6"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut prompt = text_prompt();
        prompt.image_url = Some("https://cdn.example.com/a.jpg".to_string());

        let reply = oracle(&server).complete(&prompt).await.unwrap();
        assert_eq!(reply, "Score: 6");
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let err = oracle(&server).complete(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, OracleError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = oracle(&server).complete(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
            .mount(&server)
            .await;

        let err = oracle(&server).complete(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": [{"message": {"content": "Score: 1"}}]}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let oracle = OpenAiOracle::new("k", &server.uri(), "m", Duration::from_millis(200)).unwrap();
        let err = oracle.complete(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, OracleError::Timeout(_)));
    }
}
