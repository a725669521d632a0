//! HTTP-backed collaborator clients
//!
//! Thin clients over the external knowledge-search and voice services. Each
//! client owns a private tokio runtime so the trait surface stays
//! synchronous - the VM blocks on the call, which is exactly the suspension
//! semantics the interpreter expects.

use super::{AudioHandle, KnowledgeAnswer, KnowledgeClient, VoiceClient};
use crate::error::{self, Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Connection settings shared by both HTTP clients.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    /// Service base URL, e.g. `https://knowledge.example.com/v1`
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-request timeout; elapsing it is a CollaboratorTimeout
    pub timeout: Duration,
}

impl CollaboratorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn build_runtime(which: &'static str) -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|e| {
            error::collaborator_unavailable(which, "failed to start client runtime").set_source(e)
        })
}

fn build_client(config: &CollaboratorConfig, which: &'static str) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| {
            error::collaborator_unavailable(which, "failed to build HTTP client").set_source(e)
        })
}

fn request_error(which: &'static str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        error::collaborator_timeout(which).set_source(err)
    } else if err.is_connect() {
        error::collaborator_unavailable(which, "endpoint not reachable").set_source(err)
    } else {
        error::collaborator_failed(which, err.to_string()).set_source(err)
    }
}

async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
    client: &Client,
    config: &CollaboratorConfig,
    which: &'static str,
    path: &str,
    body: &B,
) -> Result<T> {
    let mut req = client
        .post(format!("{}/{}", config.base_url.trim_end_matches('/'), path))
        .json(body);
    if let Some(key) = &config.api_key {
        req = req.bearer_auth(key);
    }

    let response = req.send().await.map_err(|e| request_error(which, e))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(error::collaborator_failed(which, text)
            .with_context("status", status.as_u16().to_string()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| error::collaborator_failed(which, "malformed response body").set_source(e))
}

// =============================================================================
// Knowledge
// =============================================================================

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

/// HTTP knowledge client: `POST {base}/query {"query": ...}` returning
/// `{"summary": ..., "related_topics": [...]}`.
pub struct HttpKnowledgeClient {
    client: Client,
    config: CollaboratorConfig,
    runtime: Runtime,
}

impl HttpKnowledgeClient {
    pub fn new(config: CollaboratorConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&config, "knowledge")?,
            runtime: build_runtime("knowledge")?,
            config,
        })
    }
}

impl KnowledgeClient for HttpKnowledgeClient {
    fn query(&self, text: &str) -> Result<KnowledgeAnswer> {
        self.runtime.block_on(post_json(
            &self.client,
            &self.config,
            "knowledge",
            "query",
            &QueryRequest { query: text },
        ))
    }
}

// =============================================================================
// Voice
// =============================================================================

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    emotion: &'a str,
}

#[derive(Serialize)]
struct TranscribeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// HTTP voice client: `POST {base}/synthesize` and `POST {base}/transcribe`.
pub struct HttpVoiceClient {
    client: Client,
    config: CollaboratorConfig,
    runtime: Runtime,
}

impl HttpVoiceClient {
    pub fn new(config: CollaboratorConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(&config, "voice")?,
            runtime: build_runtime("voice")?,
            config,
        })
    }
}

impl VoiceClient for HttpVoiceClient {
    fn synthesize(&self, text: &str, emotion: &str) -> Result<AudioHandle> {
        self.runtime.block_on(post_json(
            &self.client,
            &self.config,
            "voice",
            "synthesize",
            &SynthesizeRequest { text, emotion },
        ))
    }

    fn transcribe(&self, timeout: Option<Duration>) -> Result<String> {
        let response: TranscribeResponse = self.runtime.block_on(post_json(
            &self.client,
            &self.config,
            "voice",
            "transcribe",
            &TranscribeRequest {
                timeout_ms: timeout.map(|d| d.as_millis() as u64),
            },
        ))?;
        Ok(response.text)
    }
}
