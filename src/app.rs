use std::path::PathBuf;
use std::sync::mpsc;

use eframe::egui;
use poll_promise::Promise;
use tracing::{info, warn};

use crate::analysis::{run_on_worker, AnalysisJob, AnalysisOutcome, AnalysisRequest};
use crate::catalog::{self, Catalog};
use crate::config::AppConfig;
use crate::connection::{ConnectEvent, Connection, ConnectionManager};
use crate::endpoint::ServerEndpoint;
use crate::error::{CatalogError, ConnectionError, ValidationError};
use crate::image_select::{self, SelectedImage};
use crate::ollama::{InferenceApi, OllamaClient};

pub const APP_TITLE: &str = "Ollama Vision Model Analyzer";
pub const ANALYZING_TEXT: &str = "Analyzing image, please wait...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    Warning,
}

/// A blocking message the user has to dismiss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn error(title: &str, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            title: title.to_string(),
            message: message.into(),
        }
    }

    fn warning(title: &str, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Warning,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

impl From<&ValidationError> for Notice {
    fn from(e: &ValidationError) -> Self {
        Notice::error(e.title(), e.to_string())
    }
}

struct ConnectReport<A> {
    connection: Result<Connection<A>, ConnectionError>,
    catalog: Option<Result<Catalog, CatalogError>>,
}

/// All window state. Mutated only on the UI thread, through the action
/// methods below; background work hands results back through promises.
pub struct VisionApp<A: InferenceApi = OllamaClient> {
    pub config: AppConfig,
    manager: ConnectionManager<A>,
    connection: Option<Connection<A>>,
    last_endpoint: Option<ServerEndpoint>,
    connect_job: Option<Promise<ConnectReport<A>>>,
    connect_events: Option<mpsc::Receiver<ConnectEvent>>,
    pub catalog: Catalog,
    pub selected_model: String,
    pub image: Option<SelectedImage>,
    pub prompt: String,
    pub response: String,
    phase: Phase,
    analysis: Option<AnalysisJob>,
    pub status: String,
    pub notice: Option<Notice>,
    pending_copy: Option<String>,
    pub(crate) preview_texture: Option<egui::TextureHandle>,
    pub(crate) preview_dirty: bool,
    pub(crate) shown_title: String,
    repaint: Option<egui::Context>,
}

impl VisionApp<OllamaClient> {
    pub fn ollama(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let manager = ConnectionManager::ollama(&config);
        let mut app = Self::new(config, manager, Some(cc.egui_ctx.clone()));
        app.start_connect();
        app
    }
}

impl<A: InferenceApi> VisionApp<A> {
    pub fn new(config: AppConfig, manager: ConnectionManager<A>, repaint: Option<egui::Context>) -> Self {
        Self {
            prompt: config.default_prompt.clone(),
            config,
            manager,
            connection: None,
            last_endpoint: None,
            connect_job: None,
            connect_events: None,
            catalog: Catalog::default(),
            selected_model: String::new(),
            image: None,
            response: String::new(),
            phase: Phase::Idle,
            analysis: None,
            status: "Starting...".to_string(),
            notice: None,
            pending_copy: None,
            preview_texture: None,
            preview_dirty: false,
            shown_title: String::new(),
            repaint,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.connect_job.is_some()
    }

    pub fn connected_endpoint(&self) -> Option<&ServerEndpoint> {
        self.connection.as_ref().map(|c| &c.endpoint)
    }

    pub fn title(&self) -> String {
        format!("{} - {}", APP_TITLE, self.status)
    }

    /// Startup: sweep every candidate.
    pub fn start_connect(&mut self) {
        self.status = "Connecting to Ollama...".to_string();
        self.spawn_connect(None);
    }

    /// Reconnect, trying the last working endpoint first.
    pub fn refresh_connection(&mut self) {
        self.status = "🔄 Refreshing connection...".to_string();
        let last = self.last_endpoint.clone();
        self.spawn_connect(last);
    }

    fn spawn_connect(&mut self, last: Option<ServerEndpoint>) {
        if self.connect_job.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel();
        self.connect_events = Some(rx);

        let manager = self.manager.clone();
        let keywords = self.config.vision_keywords.clone();
        let repaint = self.repaint.clone();

        self.connect_job = Some(Promise::spawn_thread("ollama_connect".to_string(), move || {
            let notify = repaint.clone();
            let on_event = move |event: ConnectEvent| {
                let _ = tx.send(event);
                if let Some(ctx) = &notify {
                    ctx.request_repaint();
                }
            };

            let report = run_on_worker(async move {
                let connection = match &last {
                    Some(endpoint) => manager.refresh(Some(endpoint), on_event).await,
                    None => manager.connect(on_event).await,
                };
                let catalog = match &connection {
                    Ok(connection) => Some(catalog::load_models(connection, &keywords).await),
                    Err(_) => None,
                };
                ConnectReport { connection, catalog }
            })
            .unwrap_or_else(|e| ConnectReport {
                connection: Err(ConnectionError::Runtime(e.to_string())),
                catalog: None,
            });

            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
            report
        }));
    }

    /// Applies whatever the background threads have finished since the last
    /// frame.
    pub fn poll_background(&mut self) {
        self.drain_connect_events();

        if let Some(job) = self.connect_job.take() {
            match job.try_take() {
                Ok(report) => {
                    self.drain_connect_events();
                    self.connect_events = None;
                    self.apply_connect_report(report);
                }
                Err(job) => self.connect_job = Some(job),
            }
        }

        if let Some(job) = self.analysis.take() {
            match job.try_finish() {
                Ok(outcome) => self.apply_outcome(outcome),
                Err(job) => self.analysis = Some(job),
            }
        }
    }

    fn drain_connect_events(&mut self) {
        if let Some(rx) = &self.connect_events {
            while let Ok(event) = rx.try_recv() {
                self.status = event.to_string();
            }
        }
    }

    fn apply_connect_report(&mut self, report: ConnectReport<A>) {
        match report.connection {
            Ok(connection) => {
                self.last_endpoint = Some(connection.endpoint.clone());
                self.connection = Some(connection);
            }
            Err(e) => {
                warn!(error = %e, "no ollama endpoint reachable");
                self.connection = None;
                self.last_endpoint = None;
                self.catalog = Catalog::default();
                self.selected_model.clear();
                self.status = "❌ No connection to Ollama".to_string();
                self.notice = Some(Notice::error("Connection Failed", e.to_string()));
            }
        }

        if let Some(catalog) = report.catalog {
            self.apply_catalog(catalog);
        }
    }

    fn apply_catalog(&mut self, result: Result<Catalog, CatalogError>) {
        match result {
            Ok(catalog) => {
                self.selected_model = catalog.default_selection().unwrap_or_default().to_string();
                if catalog.is_empty() {
                    self.status = "❌ No models found".to_string();
                    self.notice = Some(Notice::warning(
                        "No Models",
                        "No models found in Ollama.\n\n\
                         Install a model with:\n\
                         ollama pull llava:7b\n\
                         ollama pull qwen2.5-coder:7b\n\
                         ollama pull moondream",
                    ));
                } else {
                    self.status = format!("✅ Found {} model(s)", catalog.len());
                }
                self.catalog = catalog;
            }
            Err(e) => {
                warn!(error = %e, "could not load models");
                self.catalog = Catalog::default();
                self.selected_model.clear();
                self.status = format!("❌ Error loading models: {}", e);
                self.notice = Some(Notice::error(
                    "Model Loading Error",
                    format!(
                        "Could not load models: {}\n\n\
                         Try clicking the refresh button (🔄) or restart the application.",
                        e
                    ),
                ));
            }
        }
    }

    pub fn select_model(&mut self, name: &str) {
        if self.catalog.contains(name) {
            self.selected_model = name.to_string();
        }
    }

    pub fn browse_image(&mut self) {
        if let Some(path) = image_select::pick_with_dialog() {
            self.choose_image(path);
        }
    }

    pub fn choose_image(&mut self, path: PathBuf) {
        let result = image_select::select(path, self.config.preview_max_edge);
        self.accept_image(result);
    }

    /// Handles a drag-and-drop payload; ignored when drag-and-drop is off.
    pub fn drop_files(&mut self, dropped: Vec<Option<PathBuf>>) {
        if !self.config.drag_and_drop || dropped.is_empty() {
            return;
        }
        let result = image_select::select_dropped(dropped, self.config.preview_max_edge);
        self.accept_image(result);
    }

    fn accept_image(&mut self, result: Result<SelectedImage, ValidationError>) {
        match result {
            Ok(image) => {
                info!(path = %image.path.display(), "image selected");
                self.image = Some(image);
                self.preview_dirty = true;
            }
            Err(e) => self.notice = Some(Notice::from(&e)),
        }
    }

    pub fn analyze(&mut self) {
        if self.phase == Phase::Busy || self.analysis.is_some() {
            return;
        }

        let request = AnalysisRequest::prepare(
            self.connection.is_some(),
            self.image.as_ref().map(|i| i.path.as_path()),
            &self.selected_model,
            &self.prompt,
        );
        let (request, api) = match (request, &self.connection) {
            (Ok(request), Some(connection)) => (request, connection.api.clone()),
            (Err(e), _) => {
                self.notice = Some(Notice::from(&e));
                return;
            }
            (Ok(_), None) => {
                self.notice = Some(Notice::from(&ValidationError::NotConnected));
                return;
            }
        };

        self.phase = Phase::Busy;
        self.response = ANALYZING_TEXT.to_string();
        self.analysis = Some(AnalysisJob::spawn(
            api,
            request,
            self.config.analysis_timeout,
            self.repaint.clone(),
        ));
    }

    pub fn cancel_analysis(&mut self) {
        if let Some(job) = &mut self.analysis {
            job.cancel();
        }
    }

    fn apply_outcome(&mut self, outcome: AnalysisOutcome) {
        match outcome {
            AnalysisOutcome::Success(text) => {
                self.response = text;
                self.status = "✅ Analysis complete!".to_string();
            }
            AnalysisOutcome::Failure(message) => {
                self.response = format!("❌ Error: {}", message);
                self.status = "❌ Analysis failed".to_string();
            }
        }
        self.phase = Phase::Idle;
    }

    pub fn copy_response(&mut self) {
        let text = self.response.trim();
        if text.is_empty() {
            return;
        }
        self.pending_copy = Some(text.to_string());
        self.status = "📋 Response copied to clipboard!".to_string();
    }

    /// Text waiting to be written to the clipboard by the next frame.
    pub fn take_clipboard(&mut self) -> Option<String> {
        self.pending_copy.take()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    #[cfg(test)]
    fn wait_for_background(&mut self) {
        if let Some(job) = &self.connect_job {
            job.block_until_ready();
        }
        if let Some(job) = &self.analysis {
            job.wait();
        }
        self.poll_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::fake::FakeApi;
    use image::{Rgba, RgbaImage};

    fn app_with(api: FakeApi) -> VisionApp<FakeApi> {
        let config = AppConfig::default();
        let manager = ConnectionManager::new(
            vec![ServerEndpoint::new("http://localhost:11434", "Default port 11434")],
            move |_| Ok(api.clone()),
        );
        VisionApp::new(config, manager, None)
    }

    fn connected(api: FakeApi) -> VisionApp<FakeApi> {
        let mut app = app_with(api);
        app.start_connect();
        app.wait_for_background();
        app
    }

    fn sample_image() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        RgbaImage::from_pixel(300, 200, Rgba([10, 20, 30, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        (dir, path)
    }

    #[test]
    fn startup_connects_and_selects_first_vision_model() {
        let app = connected(FakeApi::with_models(&["codellama", "moondream", "llava:7b"]));

        assert!(app.is_connected());
        assert!(!app.is_connecting());
        assert_eq!(app.connected_endpoint().unwrap().label, "Default port 11434");
        assert_eq!(app.selected_model, "llava:7b");
        assert_eq!(app.status, "✅ Found 3 model(s)");
        assert_eq!(app.title(), "Ollama Vision Model Analyzer - ✅ Found 3 model(s)");
        assert!(app.notice.is_none());
        assert_eq!(app.prompt, "Describe what you see in this image.");
    }

    #[test]
    fn empty_catalog_warns_without_selecting() {
        let app = connected(FakeApi::with_models(&[]));

        assert!(app.is_connected());
        assert!(app.selected_model.is_empty());
        assert_eq!(app.status, "❌ No models found");
        let notice = app.notice.as_ref().unwrap();
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert_eq!(notice.title, "No Models");
    }

    #[test]
    fn malformed_listing_is_reported_not_fatal() {
        let mut app = app_with(FakeApi::with_listing(serde_json::json!({ "status": "ok" })));
        app.start_connect();
        app.wait_for_background();

        // The probe only checks reachability, so the connection itself holds.
        assert!(app.is_connected());
        assert!(app.catalog.is_empty());
        assert!(app.status.starts_with("❌ Error loading models:"));
        assert_eq!(app.notice.as_ref().unwrap().title, "Model Loading Error");
    }

    #[test]
    fn unreachable_server_shows_troubleshooting() {
        let app = connected(FakeApi::unreachable("connection refused"));

        assert!(!app.is_connected());
        assert_eq!(app.status, "❌ No connection to Ollama");
        let notice = app.notice.as_ref().unwrap();
        assert_eq!(notice.title, "Connection Failed");
        assert!(notice.message.contains("ollama serve"));
    }

    #[test]
    fn refresh_reuses_the_last_endpoint() {
        let api = FakeApi::with_models(&["llava"]);
        let mut app = connected(api.clone());
        assert_eq!(api.list_calls(), 2);

        app.refresh_connection();
        app.wait_for_background();
        assert_eq!(api.list_calls(), 4);
        assert_eq!(app.status, "✅ Found 1 model(s)");
        assert!(app.is_connected());
    }

    #[test]
    fn empty_prompt_is_rejected_without_network_call() {
        let (_dir, path) = sample_image();
        let api = FakeApi::with_models(&["llava:7b"]).replying("unused");
        let mut app = connected(api.clone());
        app.choose_image(path);
        app.prompt = "   \n ".to_string();

        app.analyze();

        assert_eq!(app.phase(), Phase::Idle);
        assert_eq!(app.notice, Some(Notice::from(&ValidationError::EmptyPrompt)));
        assert_eq!(api.generate_calls(), 0);
    }

    #[test]
    fn analyze_without_connection_or_image_is_rejected() {
        let mut app = app_with(FakeApi::with_models(&["llava"]));
        app.analyze();
        assert_eq!(app.notice.as_ref().unwrap().title, "No Connection");

        let mut app = connected(FakeApi::with_models(&["llava"]));
        app.analyze();
        assert_eq!(app.notice.as_ref().unwrap().title, "No Image");
        assert_eq!(app.phase(), Phase::Idle);
    }

    #[test]
    fn invalid_image_keeps_previous_selection() {
        let (_dir, path) = sample_image();
        let mut app = connected(FakeApi::with_models(&["llava"]));
        app.choose_image(path.clone());
        app.choose_image(PathBuf::from("photo.WEBP"));

        assert_eq!(app.image.as_ref().unwrap().path, path);
        assert_eq!(app.notice.as_ref().unwrap().title, "Invalid File");
    }

    #[test]
    fn drops_are_ignored_when_drag_and_drop_is_off() {
        let (_dir, path) = sample_image();
        let mut app = connected(FakeApi::with_models(&["llava"]));
        app.config.drag_and_drop = false;
        app.drop_files(vec![Some(path.clone())]);
        assert!(app.image.is_none());

        app.config.drag_and_drop = true;
        app.drop_files(vec![Some(path.clone())]);
        assert_eq!(app.image.as_ref().unwrap().path, path);
        assert!(app.preview_dirty);
    }

    #[test]
    fn successful_analysis_round_trip() {
        let (_dir, path) = sample_image();
        let api = FakeApi::with_models(&["llava:7b"]).replying("A cat on a mat.");
        let mut app = connected(api.clone());
        app.choose_image(path);

        app.analyze();
        assert_eq!(app.phase(), Phase::Busy);
        assert_eq!(app.response, ANALYZING_TEXT);

        // A second trigger while busy must not start another worker.
        app.analyze();

        app.wait_for_background();
        assert_eq!(app.phase(), Phase::Idle);
        assert_eq!(app.response, "A cat on a mat.");
        assert_eq!(app.status, "✅ Analysis complete!");
        assert_eq!(api.generate_calls(), 1);

        app.copy_response();
        assert_eq!(app.take_clipboard().as_deref(), Some("A cat on a mat."));
        assert_eq!(app.take_clipboard(), None);
        assert_eq!(app.status, "📋 Response copied to clipboard!");
    }

    #[test]
    fn failed_analysis_returns_to_idle_with_message() {
        let (_dir, path) = sample_image();
        let api = FakeApi::with_models(&["llava:7b"]).failing("connection reset");
        let mut app = connected(api);
        app.choose_image(path);

        app.analyze();
        app.wait_for_background();

        assert_eq!(app.phase(), Phase::Idle);
        assert!(app.response.ends_with("connection reset"), "{}", app.response);
        assert_eq!(app.status, "❌ Analysis failed");
    }

    #[test]
    fn cancelling_returns_to_idle() {
        let (_dir, path) = sample_image();
        let mut app = connected(FakeApi::with_models(&["llava:7b"]).hanging());
        app.choose_image(path);

        app.analyze();
        app.cancel_analysis();
        app.wait_for_background();

        assert_eq!(app.phase(), Phase::Idle);
        assert!(app.response.contains("analysis cancelled"));
    }

    #[test]
    fn copy_with_empty_response_does_nothing() {
        let mut app = app_with(FakeApi::with_models(&[]));
        app.copy_response();
        assert_eq!(app.take_clipboard(), None);
    }

    #[test]
    fn select_model_ignores_unknown_names() {
        let mut app = connected(FakeApi::with_models(&["llava", "moondream"]));
        app.select_model("moondream");
        assert_eq!(app.selected_model, "moondream");
        app.select_model("gpt-4");
        assert_eq!(app.selected_model, "moondream");
    }
}
