use crate::config::settings::LLMConfig;
use crate::error::GenerationError;
use crate::handover::{Speaker, Turn};
use crate::knowledge::KnowledgeRow;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces the automated reply for one user message.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(
        &self,
        query: &str,
        context: &[KnowledgeRow],
        history: &[Turn],
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Reference-data block appended to the persona instruction.
pub fn context_block(context: &[KnowledgeRow]) -> String {
    if context.is_empty() {
        return "No reference data is available for this question.".to_string();
    }
    let lines: Vec<String> = context.iter().map(|row| format!("- {}", row)).collect();
    format!("Reference data:\n{}", lines.join("\n"))
}

fn role_for(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::User => "user",
        Speaker::Assistant => "model",
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

pub struct LLMClient {
    client: Client,
    api_key: String,
    config: LLMConfig,
    retry_base_delay: Duration,
}

impl LLMClient {
    pub fn new(api_key: String, config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
            retry_base_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based), doubling each time up to
    /// `MAX_RETRY_DELAY`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY)
    }

    fn build_request(&self, query: &str, context: &[KnowledgeRow], history: &[Turn]) -> GenerateRequest {
        let instruction = format!("{}\n\n{}", self.config.persona, context_block(context));

        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content::text(Some(role_for(turn.speaker())), turn.text()))
            .collect();
        contents.push(Content::text(Some("user"), query));

        GenerateRequest {
            system_instruction: Content::text(None, instruction),
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn attempt(&self, request: &GenerateRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let generated: GenerateResponse = response.json().await?;
        let text: String = generated
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ReplyGenerator for LLMClient {
    async fn generate_reply(
        &self,
        query: &str,
        context: &[KnowledgeRow],
        history: &[Turn],
    ) -> Result<String, GenerationError> {
        let request = self.build_request(query, context, history);
        let max_retries = self.config.max_retries.max(1);

        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                tracing::warn!(
                    "[LLMClient] Retrying API call (attempt {}/{}) after {:?} delay",
                    attempt + 1,
                    max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    tracing::warn!("[LLMClient] Attempt failed: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(GenerationError::RetriesExhausted {
            attempts: max_retries,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> LLMClient {
        let config = LLMConfig {
            base_url,
            max_retries: 3,
            ..LLMConfig::default()
        };
        LLMClient::new("test-key".to_string(), config).with_retry_base_delay(Duration::from_millis(1))
    }

    fn reply_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        })
    }

    #[test]
    fn test_context_block() {
        assert!(context_block(&[]).contains("No reference data"));
        let block = context_block(&[KnowledgeRow::new("Fee: 40000"), KnowledgeRow::new("Term: 2")]);
        assert_eq!(block, "Reference data:\n- Fee: 40000\n- Term: 2");
    }

    #[test]
    fn test_request_layout() {
        let llm = client("http://localhost".to_string());
        let history = vec![Turn::user("hello"), Turn::assistant("hi, how can I help?")];
        let request = llm.build_request("what is the fee?", &[KnowledgeRow::new("Fee: 40000")], &history);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"].as_array().unwrap().len(), 3);
        assert_eq!(value["contents"][1]["role"], "model");
        assert_eq!(value["contents"][2]["role"], "user");
        assert_eq!(value["contents"][2]["parts"][0]["text"], "what is the fee?");
        assert!(value["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("- Fee: 40000"));
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 500);
    }

    #[test]
    fn test_backoff_doubles_and_is_capped() {
        let client = LLMClient::new("test-key".to_string(), LLMConfig::default());
        assert_eq!(client.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(client.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(client.backoff_delay(40), MAX_RETRY_DELAY);
        assert_eq!(client.backoff_delay(u32::MAX), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_generate_reply() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("Tuition is 40000.")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let llm = client(mock_server.uri());
        let reply = llm.generate_reply("fee?", &[], &[]).await.unwrap();
        assert_eq!(reply, "Tuition is 40000.");
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("recovered")))
            .mount(&mock_server)
            .await;

        let llm = client(mock_server.uri());
        assert_eq!(llm.generate_reply("hi", &[], &[]).await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let llm = client(mock_server.uri());
        match llm.generate_reply("hi", &[], &[]).await {
            Err(GenerationError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("429"));
            }
            other => panic!("expected exhausted retries, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let llm = client(mock_server.uri());
        assert!(matches!(
            llm.generate_reply("hi", &[], &[]).await,
            Err(GenerationError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&mock_server)
            .await;

        let llm = client(mock_server.uri());
        assert!(matches!(
            llm.generate_reply("hi", &[], &[]).await,
            Err(GenerationError::EmptyResponse)
        ));
    }
}
