use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::endpoint::ServerEndpoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Base64 encoded image payloads.
    pub images: Vec<String>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// The two calls the analyzer makes against an inference server.
///
/// The listing payload is handed back untouched: servers disagree on its
/// shape and the catalog loader owns the normalisation.
pub trait InferenceApi: Clone + Send + Sync + 'static {
    async fn list_models(&self) -> Result<serde_json::Value>;

    async fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: ServerEndpoint,
    probe_timeout: Duration,
}

impl OllamaClient {
    pub fn new(endpoint: &ServerEndpoint, probe_timeout: Duration) -> Result<Self> {
        // No overall timeout: a generate call may legitimately run for minutes.
        // Ollama lives on this machine, so system proxies are bypassed.
        let client = Client::builder()
            .connect_timeout(probe_timeout)
            .no_proxy()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.clone(),
            probe_timeout,
        })
    }
}

impl InferenceApi for OllamaClient {
    async fn list_models(&self) -> Result<serde_json::Value> {
        let models_url = self.endpoint.tags_url();
        debug!(url = %models_url, "fetching models");

        let response = self
            .client
            .get(&models_url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .context(format!("Failed to fetch models from {}", &models_url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Server returned error {}: {}",
                response.status(),
                response.text().await.unwrap_or_else(|_| "No error message".to_string())
            ));
        }

        let text = response.text().await?;
        debug!(bytes = text.len(), "model listing received");

        serde_json::from_str(&text).context("Failed to parse model listing")
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let generate_url = self.endpoint.generate_url();
        debug!(
            url = %generate_url,
            model = %request.model,
            images = request.images.len(),
            "sending generate request"
        );

        let response = self
            .client
            .post(&generate_url)
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send request: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(anyhow::anyhow!("Request failed with status {}: {}", status, message));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse generate response")?;

        Ok(body.response)
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Calls {
        list: AtomicUsize,
        generate: AtomicUsize,
        last_request: Mutex<Option<GenerateRequest>>,
    }

    /// Scripted stand-in for a server. Clones share call counters.
    #[derive(Debug, Clone)]
    pub struct FakeApi {
        listing: std::result::Result<serde_json::Value, String>,
        reply: std::result::Result<String, String>,
        hang: bool,
        calls: Arc<Calls>,
    }

    impl FakeApi {
        pub fn with_listing(listing: serde_json::Value) -> Self {
            Self {
                listing: Ok(listing),
                reply: Ok(String::new()),
                hang: false,
                calls: Arc::default(),
            }
        }

        pub fn with_models(names: &[&str]) -> Self {
            let models: Vec<serde_json::Value> = names
                .iter()
                .map(|name| serde_json::json!({ "name": name, "model": name }))
                .collect();
            Self::with_listing(serde_json::json!({ "models": models }))
        }

        pub fn unreachable(message: &str) -> Self {
            Self {
                listing: Err(message.to_string()),
                ..Self::with_models(&[])
            }
        }

        pub fn replying(mut self, text: &str) -> Self {
            self.reply = Ok(text.to_string());
            self
        }

        pub fn failing(mut self, message: &str) -> Self {
            self.reply = Err(message.to_string());
            self
        }

        pub fn hanging(mut self) -> Self {
            self.hang = true;
            self
        }

        pub fn list_calls(&self) -> usize {
            self.calls.list.load(Ordering::SeqCst)
        }

        pub fn generate_calls(&self) -> usize {
            self.calls.generate.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<GenerateRequest> {
            self.calls.last_request.lock().unwrap().clone()
        }
    }

    impl InferenceApi for FakeApi {
        async fn list_models(&self) -> Result<serde_json::Value> {
            self.calls.list.fetch_add(1, Ordering::SeqCst);
            self.listing.clone().map_err(|e| anyhow::anyhow!(e))
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<String> {
            self.calls.generate.fetch_add(1, Ordering::SeqCst);
            *self.calls.last_request.lock().unwrap() = Some(request.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }
}
