//! Chat-completions client for OpenRouter.
//!
//! One blocking round trip per call; retry and backoff live in
//! [`crate::resilient`], not here. Errors are classified at this boundary
//! so the retry policy can tell a rate limit from a bad key.

use crate::resilient::ServiceError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Per-call knobs. Fix mode and design-fix mode differ only in
/// temperature - design fixes get more creative latitude.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
}

impl ChatClient {
    pub fn new(api_key: String, request_timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::Fatal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, api_key })
    }

    /// One chat round trip. Returns the raw assistant text.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        opts: &ChatOptions,
    ) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: opts.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            stream: false,
            response_format: opts.json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .http
            .post(OPENROUTER_URL)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://github.com/taskforge-dev/taskforge")
            .header("X-Title", "taskforge")
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::from_http(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::from_http(&e))?;

        if !status.is_success() {
            return Err(classify_http_status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            ServiceError::Malformed(format!("Unparseable API envelope: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ServiceError::Malformed("Response contained no choices".to_string()))
    }
}

fn classify_http_status(status: u16, body: &str) -> ServiceError {
    let preview = crate::util::truncate(body, 200);
    match status {
        429 => ServiceError::Transient(format!("rate limited: {}", preview)),
        500..=599 => ServiceError::Transient(format!("server error {}: {}", status, preview)),
        401 | 403 => ServiceError::Fatal(format!(
            "API key rejected ({}). Check OPENROUTER_API_KEY.",
            status
        )),
        _ => ServiceError::Fatal(format!("API error {}: {}", status, preview)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_http_status(429, "slow down"),
            ServiceError::Transient(_)
        ));
        assert!(matches!(
            classify_http_status(503, ""),
            ServiceError::Transient(_)
        ));
        assert!(matches!(
            classify_http_status(401, ""),
            ServiceError::Fatal(_)
        ));
        assert!(matches!(
            classify_http_status(400, "bad request"),
            ServiceError::Fatal(_)
        ));
    }

    #[test]
    fn test_request_omits_response_format_outside_json_mode() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: Vec::new(),
            max_tokens: 100,
            temperature: 0.2,
            stream: false,
            response_format: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("response_format"));
    }
}
