#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use anyhow::Result;
use eframe::egui;
use tracing_subscriber::EnvFilter;

mod analysis;
mod app;
mod app_ui;
mod catalog;
mod config;
mod connection;
mod endpoint;
mod error;
mod image_select;
mod ollama;

use app::{VisionApp, APP_TITLE};
use config::AppConfig;

fn install_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    install_tracing();

    let config = AppConfig::from_env();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(APP_TITLE)
            .with_inner_size([600.0, 700.0])
            .with_drag_and_drop(config.drag_and_drop),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        options,
        Box::new(move |cc| Box::new(VisionApp::ollama(cc, config))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))
}
