//! Klaro completion client: blocking generation plus a streaming relay over
//! any OpenAI-compatible `/chat/completions` endpoint.
//!
//! The relay multiplexes data and errors over one ordered channel: content
//! fragments arrive as plain elements, and a terminal backend failure arrives
//! as a single final element carrying the [`STREAM_ERROR_PREFIX`] marker.

#![forbid(unsafe_code)]

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use klaro_core::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Prefix marking the one terminal error element of a chunk stream.
/// Consumers must treat any element starting with it as an error, not content.
pub const STREAM_ERROR_PREFIX: &str = "ERROR: ";

/// Pending fragments held between producer and consumer before backpressure.
const STREAM_QUEUE_CAP: usize = 100;

/// Caller-supplied completion configuration; immutable per client.
#[derive(Debug, Clone, Default, serde::Serialize, Deserialize)]
pub struct AiConfig {
    pub auth_token: String,
    /// Endpoint override; defaults to [`DEFAULT_BASE_URL`].
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(default)]
    pub proxy_enabled: bool,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
}

pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl CompletionClient {
    /// Validate the config and construct the backend handle.
    pub fn configure(cfg: AiConfig) -> Result<Self> {
        if cfg.auth_token.trim().is_empty() {
            return Err(Error::Config("auth token is required".into()));
        }
        let base_url = cfg
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("base url {base_url:?}: {e}")))?;

        let mut builder = reqwest::Client::builder();
        if cfg.proxy_enabled {
            if cfg.http_proxy.is_none() && cfg.https_proxy.is_none() {
                return Err(Error::Config("proxy enabled but no proxy url configured".into()));
            }
            if let Some(url) = cfg.http_proxy.as_deref() {
                let proxy = reqwest::Proxy::http(url)
                    .map_err(|e| Error::Config(format!("http proxy {url:?}: {e}")))?;
                builder = builder.proxy(proxy);
            }
            if let Some(url) = cfg.https_proxy.as_deref() {
                let proxy = reqwest::Proxy::https(url)
                    .map_err(|e| Error::Config(format!("https proxy {url:?}: {e}")))?;
                builder = builder.proxy(proxy);
            }
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            auth_token: cfg.auth_token,
            model: cfg.model,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "top_p": self.top_p,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    async fn post_completions(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, stream, "completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.auth_token)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("completion backend: {e}")))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(Error::Transport(format!("unauthorized ({status})")));
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "completion backend error");
            return Err(Error::Transport(format!("completion backend status {status}: {body}")));
        }
        Ok(response)
    }

    /// Single-turn blocking generation with the stored sampling parameters.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.post_completions(prompt, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("parsing completion response: {e}")))?;
        first_choice_text(parsed)
    }

    /// Open a streaming generation and relay it through a bounded channel.
    ///
    /// An error while opening the request is returned here; once the stream is
    /// established, failures are delivered in-band as a final
    /// [`STREAM_ERROR_PREFIX`] element and the call itself stays successful.
    pub async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<String>> {
        let response = self.post_completions(prompt, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_QUEUE_CAP);
        tokio::spawn(relay_chunks(response.bytes_stream(), tx));
        Ok(rx)
    }
}

/// Extract the first candidate's text verbatim.
fn first_choice_text(resp: ChatResponse) -> Result<String> {
    let choice = resp.choices.into_iter().next().ok_or(Error::EmptyResponse)?;
    Ok(choice.message.content.unwrap_or_default())
}

/// Pump a backend SSE byte stream into the chunk channel.
///
/// Owns the byte stream exclusively; it is dropped (releasing the backend
/// connection) on every exit: `[DONE]`, natural EOF, backend failure, or the
/// consumer dropping the receiver.
async fn relay_chunks<S, E>(chunks: S, tx: mpsc::Sender<String>)
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    futures::pin_mut!(chunks);
    let mut buffer = String::new();
    while let Some(next) = chunks.next().await {
        let bytes = match next {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(format!("{STREAM_ERROR_PREFIX}{e}")).await;
                return;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));
        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim_end_matches('\r').to_string();
            buffer.drain(..=line_end);
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data: ") else { continue };
            let data = data.trim();
            if data == "[DONE]" {
                return;
            }
            match serde_json::from_str::<StreamResponse>(data) {
                Ok(resp) => {
                    let Some(choice) = resp.choices.first() else { continue };
                    let Some(content) = choice.delta.content.as_deref() else { continue };
                    if content.is_empty() {
                        continue;
                    }
                    metrics::counter!("klaro_ai_stream_chunks", 1);
                    if tx.send(content.to_string()).await.is_err() {
                        // consumer walked away
                        return;
                    }
                }
                Err(e) => trace!(data = %data, error = %e, "ignoring unparseable stream chunk"),
            }
        }
    }
}

// --- wire types (OpenAI-compatible) ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
