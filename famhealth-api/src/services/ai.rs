/// Chat-completions client for the DashScope compatible endpoint
///
/// All calls go to `POST {base_url}/chat/completions` with a bearer key.
/// The key and model are resolved per call from `system_config` first and
/// the environment second, so an admin can rotate them at runtime.
///
/// # Streaming
///
/// Streaming responses arrive as `data: {json}` lines. [`CompletionStreamDecoder`]
/// turns raw body chunks into content deltas and remembers the token usage
/// reported by the provider. Lines that fail to parse are skipped.
///
/// # Example
///
/// ```no_run
/// use famhealth_api::services::ai::{AiClient, ChatCompletionMessage};
/// use famhealth_api::config::AiConfig;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), famhealth_api::services::ai::AiError> {
/// let client = AiClient::new(&AiConfig::default());
/// let settings = client.settings(&pool).await?;
/// let completion = client
///     .complete(&settings, vec![ChatCompletionMessage::user("你好")], 0.7, 2000)
///     .await?;
/// println!("{} ({} tokens)", completion.content, completion.tokens_used);
/// # Ok(())
/// # }
/// ```

use base64::{engine::general_purpose, Engine as _};
use famhealth_shared::models::system_config::{self, SystemConfig};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{AiConfig, DEFAULT_DASHSCOPE_MODEL};
use crate::services::prompts::{FORMAT_SYSTEM_PROMPT, OCR_PROMPT};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI service not configured")]
    NotConfigured,
    #[error("AI request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("AI service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("AI service returned an empty response")]
    EmptyResponse,
    #[error("{0}")]
    UnsupportedSource(String),
    #[error("failed to read source file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid AI response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One message in OpenAI chat format
///
/// `content` is a plain string for text turns and an array of parts for
/// vision requests.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionMessage {
    pub role: &'static str,
    pub content: Value,
}

impl ChatCompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: Value::String(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: Value::String(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: Value::String(content.into()),
        }
    }

    /// Prompt text plus one inline image
    pub fn user_with_image(text: &str, data_url: String) -> Self {
        Self {
            role: "user",
            content: json!([
                { "type": "image_url", "image_url": { "url": data_url } },
                { "type": "text", "text": text },
            ]),
        }
    }
}

/// Key and models in effect for one call
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub api_key: String,
    pub model: String,
    pub vision_model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tokens_used: i32,
    pub model: String,
}

/// What a finished stream produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutcome {
    pub content: String,
    pub tokens_used: i32,
}

/// Incremental parser for `data:` lines of a streaming completion
#[derive(Debug, Default)]
pub struct CompletionStreamDecoder {
    buffer: Vec<u8>,
    tokens_used: i32,
}

impl CompletionStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a body chunk and returns the content deltas of every complete line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(delta) = self.decode_line(&String::from_utf8_lossy(&line)) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flushes a trailing line without newline and returns the token usage
    pub fn finish(&mut self) -> (Vec<String>, i32) {
        let rest = std::mem::take(&mut self.buffer);
        let deltas = self
            .decode_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect();
        (deltas, self.tokens_used)
    }

    pub fn tokens_used(&self) -> i32 {
        self.tokens_used
    }

    fn decode_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload.is_empty() || payload == "[DONE]" {
            return None;
        }

        let data: Value = serde_json::from_str(payload).ok()?;

        if let Some(total) = data.pointer("/usage/total_tokens").and_then(Value::as_i64) {
            self.tokens_used = total as i32;
        }

        data.pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// HTTP client for the language model provider
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    env_api_key: Option<String>,
    env_model: String,
    vision_model: String,
}

impl AiClient {
    pub fn new(config: &AiConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: config.dashscope_base_url.trim_end_matches('/').to_string(),
            env_api_key: config.dashscope_api_key.clone(),
            env_model: config.dashscope_model.clone(),
            vision_model: config.vision_model.clone(),
        }
    }

    /// Whether an API key is available from the environment
    pub fn has_env_key(&self) -> bool {
        self.env_api_key.is_some()
    }

    /// Resolves the key and model, database values first
    pub async fn settings(&self, pool: &PgPool) -> Result<AiSettings, AiError> {
        let stored_key = SystemConfig::get_non_empty(pool, system_config::DASHSCOPE_API_KEY)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to read stored API key, falling back to env");
                None
            });

        let api_key = stored_key
            .or_else(|| self.env_api_key.clone())
            .ok_or(AiError::NotConfigured)?;

        let model = SystemConfig::get_non_empty(pool, system_config::DASHSCOPE_MODEL)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| {
                if self.env_model.is_empty() {
                    DEFAULT_DASHSCOPE_MODEL.to_string()
                } else {
                    self.env_model.clone()
                }
            });

        Ok(AiSettings {
            api_key,
            model,
            vision_model: self.vision_model.clone(),
        })
    }

    async fn post(&self, settings: &AiSettings, body: Value) -> Result<reqwest::Response, AiError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "AI provider returned an error");
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn complete_with_model(
        &self,
        settings: &AiSettings,
        model: &str,
        messages: Vec<ChatCompletionMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, AiError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let data: Value = self.post(settings, body).await?.json().await?;

        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tokens_used = data
            .pointer("/usage/total_tokens")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32;

        tracing::debug!(model, tokens_used, "AI completion finished");

        Ok(Completion {
            content,
            tokens_used,
            model: model.to_string(),
        })
    }

    /// Single non-streaming completion with the text model
    pub async fn complete(
        &self,
        settings: &AiSettings,
        messages: Vec<ChatCompletionMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, AiError> {
        self.complete_with_model(settings, &settings.model, messages, temperature, max_tokens)
            .await
    }

    /// Streams a completion, forwarding each delta to `tx`
    ///
    /// Returns once the provider closes the body. A closed receiver does not
    /// abort the call; the full answer is still collected for persistence.
    pub async fn stream_chat(
        &self,
        settings: &AiSettings,
        messages: Vec<ChatCompletionMessage>,
        tx: mpsc::Sender<String>,
    ) -> Result<StreamOutcome, AiError> {
        let body = json!({
            "model": settings.model,
            "messages": messages,
            "temperature": DEFAULT_TEMPERATURE,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        let response = self.post(settings, body).await?;
        let mut body = response.bytes_stream();
        let mut decoder = CompletionStreamDecoder::new();
        let mut content = String::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for delta in decoder.push(&chunk) {
                content.push_str(&delta);
                let _ = tx.send(delta).await;
            }
        }

        let (rest, tokens_used) = decoder.finish();
        for delta in rest {
            content.push_str(&delta);
            let _ = tx.send(delta).await;
        }

        Ok(StreamOutcome { content, tokens_used })
    }

    /// Reads the text of an image with the vision model
    pub async fn ocr_image(&self, settings: &AiSettings, path: &Path, mime_type: &str) -> Result<Completion, AiError> {
        if mime_type == "application/pdf" {
            return Err(AiError::UnsupportedSource(
                "PDF files cannot be recognised yet, please upload an image".to_string(),
            ));
        }
        if !mime_type.starts_with("image/") {
            return Err(AiError::UnsupportedSource(format!("unsupported file type: {}", mime_type)));
        }

        let bytes = tokio::fs::read(path).await?;
        let data_url = format!("data:{};base64,{}", mime_type, general_purpose::STANDARD.encode(&bytes));

        let completion = self
            .complete_with_model(
                settings,
                &settings.vision_model,
                vec![ChatCompletionMessage::user_with_image(OCR_PROMPT, data_url)],
                0.1,
                4000,
            )
            .await?;

        if completion.content.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(completion)
    }

    /// Tidies OCR output into markdown
    pub async fn format_ocr_text(&self, settings: &AiSettings, ocr_text: &str) -> Result<Completion, AiError> {
        let completion = self
            .complete(
                settings,
                vec![
                    ChatCompletionMessage::system(FORMAT_SYSTEM_PROMPT),
                    ChatCompletionMessage::user(ocr_text),
                ],
                0.3,
                4000,
            )
            .await?;

        if completion.content.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(content: &str) -> String {
        format!("data: {}\n\n", json!({"choices": [{"delta": {"content": content}}]}))
    }

    #[test]
    fn test_decoder_yields_deltas() {
        let mut decoder = CompletionStreamDecoder::new();
        let body = format!("{}{}data: [DONE]\n", line("你好"), line("，世界"));

        let deltas = decoder.push(body.as_bytes());
        assert_eq!(deltas, vec!["你好", "，世界"]);
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = CompletionStreamDecoder::new();
        let body = line("abc");
        let (head, tail) = body.as_bytes().split_at(10);

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["abc"]);
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = CompletionStreamDecoder::new();
        let body = line("血压");
        let bytes = body.as_bytes();
        let cut = body.find('血').unwrap() + 1;

        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(decoder.push(&bytes[cut..]), vec!["血压"]);
    }

    #[test]
    fn test_decoder_tracks_usage_and_skips_garbage() {
        let mut decoder = CompletionStreamDecoder::new();
        let body = concat!(
            "data: {not json}\n",
            ": keep-alive\n",
            "data: {\"choices\":[],\"usage\":{\"total_tokens\":321}}\n",
        );

        assert!(decoder.push(body.as_bytes()).is_empty());
        assert_eq!(decoder.tokens_used(), 321);
    }

    #[test]
    fn test_decoder_finish_flushes_trailing_line() {
        let mut decoder = CompletionStreamDecoder::new();
        let body = line("end");
        decoder.push(body.trim_end().as_bytes());

        let (rest, tokens) = decoder.finish();
        assert_eq!(rest, vec!["end"]);
        assert_eq!(tokens, 0);
    }

    #[test]
    fn test_message_shapes() {
        let msg = serde_json::to_value(ChatCompletionMessage::system("sys")).unwrap();
        assert_eq!(msg, json!({"role": "system", "content": "sys"}));

        let msg = serde_json::to_value(ChatCompletionMessage::user_with_image("read", "data:x".into())).unwrap();
        assert_eq!(msg["content"][0]["image_url"]["url"], "data:x");
        assert_eq!(msg["content"][1]["text"], "read");
    }

    #[tokio::test]
    async fn test_pdf_source_is_rejected() {
        let client = AiClient::new(&AiConfig::default());
        let settings = AiSettings {
            api_key: "k".to_string(),
            model: "m".to_string(),
            vision_model: "v".to_string(),
        };

        let err = client
            .ocr_image(&settings, Path::new("/nonexistent.pdf"), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::UnsupportedSource(_)));
    }
}
