use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::endpoint::ServerEndpoint;
use crate::error::ConnectionError;
use crate::ollama::{InferenceApi, OllamaClient};

/// A client that answered the liveness probe, plus where it answered from.
#[derive(Debug, Clone)]
pub struct Connection<A> {
    pub api: A,
    pub endpoint: ServerEndpoint,
}

/// Progress reported while candidates are probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectEvent {
    Failed { label: String, error: String },
    Connected { label: String },
    Reconnected,
    FallingBack,
}

impl fmt::Display for ConnectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectEvent::Failed { label, error } => {
                let short: String = error.chars().take(50).collect();
                write!(f, "❌ Failed {}: {}...", label, short)
            }
            ConnectEvent::Connected { label } => write!(f, "✅ Connected via {}", label),
            ConnectEvent::Reconnected => write!(f, "✅ Reconnected successfully"),
            ConnectEvent::FallingBack => {
                write!(f, "❌ Previous connection failed, trying all methods...")
            }
        }
    }
}

type Opener<A> = Arc<dyn Fn(&ServerEndpoint) -> anyhow::Result<A> + Send + Sync>;

#[derive(Clone)]
pub struct ConnectionManager<A> {
    candidates: Vec<ServerEndpoint>,
    open: Opener<A>,
}

impl ConnectionManager<OllamaClient> {
    pub fn ollama(config: &AppConfig) -> Self {
        let probe_timeout = config.probe_timeout;
        Self::new(config.endpoints.clone(), move |endpoint| {
            OllamaClient::new(endpoint, probe_timeout)
        })
    }
}

impl<A: InferenceApi> ConnectionManager<A> {
    pub fn new(
        candidates: Vec<ServerEndpoint>,
        open: impl Fn(&ServerEndpoint) -> anyhow::Result<A> + Send + Sync + 'static,
    ) -> Self {
        Self {
            candidates,
            open: Arc::new(open),
        }
    }

    /// Full sweep: the first candidate whose probe succeeds wins and the
    /// rest are never touched.
    pub async fn connect(
        &self,
        mut on_event: impl FnMut(ConnectEvent),
    ) -> Result<Connection<A>, ConnectionError> {
        for endpoint in &self.candidates {
            match self.probe(endpoint).await {
                Ok(api) => {
                    info!(label = %endpoint.label, url = %endpoint.base_url(), "connected to ollama");
                    on_event(ConnectEvent::Connected {
                        label: endpoint.label.clone(),
                    });
                    return Ok(Connection {
                        api,
                        endpoint: endpoint.clone(),
                    });
                }
                Err(e) => {
                    warn!(label = %endpoint.label, error = %e, "connection attempt failed");
                    on_event(ConnectEvent::Failed {
                        label: endpoint.label.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        Err(ConnectionError::Unreachable {
            attempts: self.candidates.len(),
        })
    }

    /// Retries the endpoint that worked last time before falling back to a
    /// full sweep.
    pub async fn refresh(
        &self,
        last: Option<&ServerEndpoint>,
        mut on_event: impl FnMut(ConnectEvent),
    ) -> Result<Connection<A>, ConnectionError> {
        if let Some(endpoint) = last {
            match self.probe(endpoint).await {
                Ok(api) => {
                    info!(label = %endpoint.label, "reconnected to ollama");
                    on_event(ConnectEvent::Reconnected);
                    return Ok(Connection {
                        api,
                        endpoint: endpoint.clone(),
                    });
                }
                Err(e) => {
                    warn!(label = %endpoint.label, error = %e, "previous endpoint no longer answers");
                    on_event(ConnectEvent::FallingBack);
                }
            }
        }

        self.connect(on_event).await
    }

    async fn probe(&self, endpoint: &ServerEndpoint) -> anyhow::Result<A> {
        let api = (self.open)(endpoint)?;
        api.list_models().await?;
        Ok(api)
    }
}
