//! OpenAI-compatible HTTP client.
//!
//! One client serves both model calls the bot makes: chat completions for
//! answer generation and `/embeddings` for knowledge indexing and queries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use unibot_core::config::LlmConfig;
use unibot_core::error::{Result, UnibotError};
use unibot_core::generation::TextGenerator;
use unibot_vector::embedding::EmbeddingService;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ClientSettings {
    /// Build settings from config, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            UnibotError::Config(format!("{} is not set", config.api_key_env))
        })?;
        Ok(Self::with_api_key(config, api_key))
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Vector width for the known OpenAI embedding models.
pub fn embedding_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// HTTP client implementing [`TextGenerator`] and [`EmbeddingService`].
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    settings: ClientSettings,
    client: Client,
}

impl OpenAiClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| UnibotError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> std::result::Result<Response, String> {
        let url = format!("{}/{}", self.settings.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("request to {} timed out", path)
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} returned {}: {}", path, status.as_u16(), body));
        }
        Ok(response)
    }

    /// Send one user-role prompt and return the first choice's text.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .post("chat/completions", &request)
            .await
            .map_err(UnibotError::Generation)?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| UnibotError::Generation(format!("Malformed completion: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UnibotError::Generation("Completion had no content".to_string()))?;

        debug!(model = %self.settings.model, chars = text.len(), "Completion received");
        Ok(text)
    }

    /// Embed one text with the configured embedding model.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(UnibotError::Embedding("Cannot embed empty text".to_string()));
        }
        let request = EmbeddingRequest {
            model: &self.settings.embedding_model,
            input: text,
        };

        let response = self
            .post("embeddings", &request)
            .await
            .map_err(UnibotError::Embedding)?;
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| UnibotError::Embedding(format!("Malformed embedding: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| UnibotError::Embedding("Embedding response was empty".to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt).await
    }
}

impl EmbeddingService for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text).await
    }

    fn dimensions(&self) -> usize {
        embedding_dimensions(&self.settings.embedding_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};

    fn settings(base_url: &str) -> ClientSettings {
        let mut config = LlmConfig::default();
        config.base_url = base_url.to_string();
        config.timeout_secs = 5;
        ClientSettings::with_api_key(&config, "sk-test")
    }

    async fn chat_handler(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        let reply = format!(
            "model={} temp={} max={} prompt={}",
            body["model"].as_str().unwrap_or_default(),
            body["temperature"],
            body["max_tokens"],
            prompt
        );
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]})),
        )
    }

    async fn embeddings_handler(Json(body): Json<Value>) -> Json<Value> {
        let len = body["input"].as_str().map(|s| s.len()).unwrap_or(0) as f32;
        Json(json!({"data": [{"embedding": [len, 0.5, body["model"].as_str().map(|m| m.len()).unwrap_or(0) as f32]}]}))
    }

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn mock_router() -> Router {
        Router::new()
            .route("/chat/completions", post(chat_handler))
            .route("/embeddings", post(embeddings_handler))
    }

    #[test]
    fn test_settings_from_config_trims_trailing_slash() {
        let mut config = LlmConfig::default();
        config.base_url = "https://example.test/v1/".to_string();
        let s = ClientSettings::with_api_key(&config, "k");
        assert_eq!(s.base_url, "https://example.test/v1");
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_settings_missing_env_is_config_error() {
        let mut config = LlmConfig::default();
        config.api_key_env = "UNIBOT_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = ClientSettings::from_config(&config).unwrap_err();
        assert!(matches!(err, UnibotError::Config(_)));
    }

    #[test]
    fn test_embedding_dimensions() {
        assert_eq!(embedding_dimensions("text-embedding-3-small"), 1536);
        assert_eq!(embedding_dimensions("text-embedding-3-large"), 3072);
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.3,
            max_tokens: 1000,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 1000);
    }

    #[tokio::test]
    async fn test_generate_round_trip() {
        let base = spawn_server(mock_router()).await;
        let client = OpenAiClient::new(settings(&base)).unwrap();

        let text = client.generate("Student asked: fees").await.unwrap();
        assert!(text.contains("model=gpt-4o-mini"));
        assert!(text.contains("max=1000"));
        assert!(text.ends_with("prompt=Student asked: fees"));
    }

    #[tokio::test]
    async fn test_embed_round_trip() {
        let base = spawn_server(mock_router()).await;
        let client = OpenAiClient::new(settings(&base)).unwrap();

        let v = client.embed("four").await.unwrap();
        assert_eq!(v, vec![4.0, 0.5, "text-embedding-3-small".len() as f32]);
        assert_eq!(EmbeddingService::dimensions(&client), 1536);
        assert!(client.embed("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_http_error_maps_to_generation_error() {
        let base = spawn_server(mock_router()).await;
        let mut s = settings(&base);
        s.api_key = "wrong".to_string();
        let client = OpenAiClient::new(s).unwrap();

        let err = client.generate("hello").await.unwrap_err();
        match err {
            UnibotError::Generation(msg) => assert!(msg.contains("401")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = spawn_server(router).await;
        let client = OpenAiClient::new(settings(&base)).unwrap();
        assert!(matches!(
            client.generate("x").await.unwrap_err(),
            UnibotError::Generation(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let client = OpenAiClient::new(settings("http://127.0.0.1:9")).unwrap();
        assert!(client.embed("text").await.is_err());
    }
}
