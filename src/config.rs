use std::time::Duration;

use tracing::warn;

use crate::endpoint::ServerEndpoint;

pub const DEFAULT_PROMPT: &str = "Describe what you see in this image.";
pub const PREVIEW_MAX_EDGE: u32 = 150;

const VISION_KEYWORDS: [&str; 7] = [
    "llava",
    "vision",
    "vi",
    "clip",
    "moondream",
    "qwen2.5vi",
    "bakllava",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Tried in order on startup and on a full reconnect sweep.
    pub endpoints: Vec<ServerEndpoint>,
    pub vision_keywords: Vec<String>,
    pub preview_max_edge: u32,
    pub default_prompt: String,
    pub probe_timeout: Duration,
    /// `None` waits for the model for as long as it takes.
    pub analysis_timeout: Option<Duration>,
    pub drag_and_drop: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                ServerEndpoint::new("http://localhost:11434", "Default port 11434"),
                ServerEndpoint::new("http://127.0.0.1:11434", "Localhost IP with port 11434"),
                ServerEndpoint::new("http://localhost:8080", "Alternative port 8080"),
                ServerEndpoint::library_default("Default client configuration"),
            ],
            vision_keywords: VISION_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            preview_max_edge: PREVIEW_MAX_EDGE,
            default_prompt: DEFAULT_PROMPT.to_string(),
            probe_timeout: Duration::from_secs(5),
            analysis_timeout: None,
            drag_and_drop: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("VISION_ANALYZER_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.analysis_timeout = Some(Duration::from_secs(secs)),
                _ => warn!(value = %raw, "ignoring invalid VISION_ANALYZER_TIMEOUT_SECS"),
            }
        }

        if lookup("VISION_ANALYZER_NO_DND").is_some_and(|v| !v.trim().is_empty()) {
            self.drag_and_drop = false;
        }

        if let Some(raw) = lookup("VISION_ANALYZER_KEYWORDS") {
            let keywords: Vec<String> = raw
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                warn!(value = %raw, "ignoring empty VISION_ANALYZER_KEYWORDS");
            } else {
                self.vision_keywords = keywords;
            }
        }

        self
    }
}
