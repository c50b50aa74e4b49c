//! Text-generation oracle.

use crate::config::OracleConfig;
use crate::error::OracleError;
use cacheforge_evaluator::CancelToken;
use std::time::Duration;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = "You are an expert in CPU cache replacement policies. \
     Answer in exactly the requested output format.";

/// Returns a completion for a prompt.
pub trait Oracle: Send + Sync {
    /// Name of this oracle.
    fn name(&self) -> &str;

    /// Complete `prompt`. Implementations check `cancel` before issuing a
    /// request.
    fn complete(&self, prompt: &str, cancel: &CancelToken) -> Result<String, OracleError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsOracle {
    agent: ureq::Agent,
    api_endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl ChatCompletionsOracle {
    /// Build from configuration, reading the key from `api_key_env`.
    /// `CACHEFORGE_LLM_ENDPOINT` and `CACHEFORGE_LLM_MODEL` override the
    /// configured endpoint and model when set.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| OracleError::MissingCredentials(config.api_key_env.clone()))?;
        let api_endpoint =
            std::env::var("CACHEFORGE_LLM_ENDPOINT").unwrap_or_else(|_| config.endpoint.clone());
        let model = std::env::var("CACHEFORGE_LLM_MODEL").unwrap_or_else(|_| config.model.clone());

        Ok(Self::new(
            api_endpoint,
            api_key,
            model,
            Duration::from_secs(config.timeout_secs),
            config.temperature,
        ))
    }

    pub fn new(
        api_endpoint: String,
        api_key: String,
        model: String,
        timeout: Duration,
        temperature: Option<f32>,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            api_endpoint,
            api_key,
            model,
            temperature,
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ]
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }
}

impl Oracle for ChatCompletionsOracle {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str, cancel: &CancelToken) -> Result<String, OracleError> {
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending prompt");
        let response = self
            .agent
            .post(&self.api_endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(self.request_body(prompt));

        let body: serde_json::Value = match response {
            Ok(resp) => resp
                .into_json()
                .map_err(|e| OracleError::Transport(format!("invalid response body: {e}")))?,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(OracleError::Status { status, body });
            }
            Err(e) => return Err(OracleError::Transport(e.to_string())),
        };

        // The request may have outlived a cancellation; drop the answer.
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }

        let content = completion_text(&body).ok_or(OracleError::EmptyResponse)?;
        info!(model = %self.model, reply_chars = content.len(), "oracle replied");
        Ok(content)
    }
}

fn completion_text(body: &serde_json::Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}
