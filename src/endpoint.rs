pub const DEFAULT_PORT: &str = "11434";
pub const DEFAULT_HOST: &str = "http://127.0.0.1:11434";

/// A candidate server address. `host: None` stands for the client library's
/// own default, which honours `OLLAMA_HOST` the same way the `ollama` CLI does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: Option<String>,
    pub label: String,
}

impl ServerEndpoint {
    pub fn new(host: &str, label: &str) -> Self {
        Self {
            host: Some(host.to_string()),
            label: label.to_string(),
        }
    }

    pub fn library_default(label: &str) -> Self {
        Self {
            host: None,
            label: label.to_string(),
        }
    }

    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) => normalize_host(host),
            None => default_host(),
        }
    }

    pub fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }
}

pub fn default_host() -> String {
    host_from_env(std::env::var("OLLAMA_HOST").ok())
}

fn host_from_env(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| normalize_host(&v))
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

/// Turns `localhost`, `localhost:8080` or `https://box/` into a base URL
/// with an explicit scheme and port and no trailing slash.
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", trimmed),
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    // Bracketed IPv6 literals carry colons of their own.
    let has_port = match authority.rfind(']') {
        Some(close) => authority[close..].contains(':'),
        None => authority.contains(':'),
    };

    if has_port {
        format!("{}://{}{}", scheme, authority, path)
    } else {
        format!("{}://{}:{}{}", scheme, authority, DEFAULT_PORT, path)
    }
}
