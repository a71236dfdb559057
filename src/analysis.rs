use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use eframe::egui;
use poll_promise::Promise;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::error::{AnalysisError, ValidationError};
use crate::ollama::{GenerateRequest, InferenceApi};

const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub model: String,
    pub prompt: String,
    pub image_path: PathBuf,
}

impl AnalysisRequest {
    /// Checks preconditions in a fixed order so the user always hears about
    /// the first missing piece.
    pub fn prepare(
        connected: bool,
        image_path: Option<&Path>,
        model: &str,
        prompt: &str,
    ) -> Result<Self, ValidationError> {
        if !connected {
            return Err(ValidationError::NotConnected);
        }
        let image_path = image_path.ok_or(ValidationError::NoImage)?;
        let model = model.trim();
        if model.is_empty() {
            return Err(ValidationError::NoModel);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        Ok(Self {
            model: model.to_string(),
            prompt: prompt.to_string(),
            image_path: image_path.to_path_buf(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Success(String),
    Failure(String),
}

impl From<Result<String, AnalysisError>> for AnalysisOutcome {
    fn from(result: Result<String, AnalysisError>) -> Self {
        match result {
            Ok(text) => AnalysisOutcome::Success(text),
            Err(e) => AnalysisOutcome::Failure(sanitize(&e.to_string())),
        }
    }
}

/// Strips control characters and caps the length of a message bound for the
/// response area.
pub fn sanitize(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.chars().count() > MAX_ERROR_CHARS {
        let mut short: String = cleaned.chars().take(MAX_ERROR_CHARS).collect();
        short.push('…');
        short
    } else {
        cleaned.to_string()
    }
}

pub async fn analyze<A: InferenceApi>(
    api: &A,
    request: &AnalysisRequest,
    limit: Option<Duration>,
) -> Result<String, AnalysisError> {
    let bytes = tokio::fs::read(&request.image_path)
        .await
        .map_err(|source| AnalysisError::ReadImage {
            path: request.image_path.clone(),
            source,
        })?;

    let body = GenerateRequest {
        model: request.model.clone(),
        prompt: request.prompt.clone(),
        images: vec![general_purpose::STANDARD.encode(&bytes)],
        stream: false,
    };
    info!(model = %body.model, image_bytes = bytes.len(), "starting analysis");

    let call = api.generate(&body);
    let reply = match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| AnalysisError::TimedOut(limit))?,
        None => call.await,
    };

    reply.map_err(|e| AnalysisError::Request(format!("{:#}", e)))
}

/// Builds a current-thread runtime for a one-shot worker thread.
pub fn run_on_worker<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

/// An analysis running on its own thread. Produces exactly one outcome.
pub struct AnalysisJob {
    promise: Promise<AnalysisOutcome>,
    cancel: Option<oneshot::Sender<()>>,
}

impl AnalysisJob {
    pub fn spawn<A: InferenceApi>(
        api: A,
        request: AnalysisRequest,
        limit: Option<Duration>,
        repaint: Option<egui::Context>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let promise = Promise::spawn_thread("image_analysis".to_string(), move || {
            let result = run_on_worker(async move {
                tokio::select! {
                    reply = analyze(&api, &request, limit) => reply,
                    _ = cancel_rx => Err(AnalysisError::Cancelled),
                }
            })
            .unwrap_or_else(|e| Err(AnalysisError::Runtime(e.to_string())));

            match &result {
                Ok(text) => info!(chars = text.len(), "analysis finished"),
                Err(e) => error!(error = %e, "analysis failed"),
            }

            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
            AnalysisOutcome::from(result)
        });

        Self {
            promise,
            cancel: Some(cancel_tx),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Hands the outcome over once the worker is done, or gives the job back.
    pub fn try_finish(self) -> Result<AnalysisOutcome, Self> {
        let Self { promise, cancel } = self;
        promise.try_take().map_err(|promise| Self { promise, cancel })
    }

    #[cfg(test)]
    pub fn wait(&self) {
        self.promise.block_until_ready();
    }
}
