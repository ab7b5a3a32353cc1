//! llama-server (`/completion`) adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use dialog_core::{EngineError, GenerationEngine};
use dialog_shared::config::EngineSettings;

const CONTEXT_EXCEEDED_TYPE: &str = "exceed_context_size_error";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    cache_prompt: bool,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

/// Remote engine speaking the llama.cpp server completion API.
///
/// Prompt caching is disabled on every request, so no working memory
/// survives an attempt on the server side.
#[derive(Clone)]
pub struct LlamaServerEngine {
    client: Client,
    settings: EngineSettings,
}

impl LlamaServerEngine {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.max(1)))
            .build()
            .map_err(|e| EngineError::Failed(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!("{}/completion", self.settings.base_url.trim_end_matches('/'))
    }

    fn classify_failure<D: std::fmt::Display>(
        status: reqwest::StatusCode,
        body: Result<String, D>,
    ) -> EngineError {
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                return EngineError::Failed(format!(
                    "llama-server error: {} - unreadable body: {}",
                    status, e
                ))
            }
        };

        let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.kind, envelope.error.message),
            Err(_) => (String::new(), body),
        };

        let lowered = message.to_lowercase();
        if kind == CONTEXT_EXCEEDED_TYPE
            || lowered.contains("out of memory")
            || lowered.contains("failed to allocate")
        {
            EngineError::ResourceExhausted(message)
        } else {
            EngineError::Failed(format!("llama-server error: {} - {}", status, message))
        }
    }
}

#[async_trait]
impl GenerationEngine for LlamaServerEngine {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        debug!(prompt_chars = prompt.chars().count(), "Calling llama-server");

        let request = CompletionRequest {
            prompt,
            n_predict: self.settings.max_tokens,
            temperature: self.settings.temperature,
            cache_prompt: false,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(Duration::from_secs(self.settings.timeout_seconds))
                } else {
                    EngineError::Failed(format!("Failed to call llama-server: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error = Self::classify_failure(status, response.text().await);
            warn!(%status, error = %error, "llama-server rejected completion");
            return Err(error);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Failed(format!("Failed to parse llama-server response: {}", e)))?;

        Ok(completion.content.trim().to_string())
    }
}
