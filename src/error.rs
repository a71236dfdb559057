use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(
        "Could not connect to Ollama server ({attempts} address(es) tried).\n\n\
         Troubleshooting:\n\
         1. Make sure 'ollama serve' is running\n\
         2. Try restarting Ollama\n\
         3. Check if another app is using port 11434\n\
         4. Try running: ollama list (in command line)"
    )]
    Unreachable { attempts: usize },
    #[error("Could not start the background runtime: {0}")]
    Runtime(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Transport(String),
    #[error("unexpected model listing: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Not connected to Ollama server.\nClick the refresh button (🔄) to reconnect.")]
    NotConnected,
    #[error("Please select an image first.")]
    NoImage,
    #[error("Please select a vision model.")]
    NoModel,
    #[error("Please enter a prompt.")]
    EmptyPrompt,
    #[error("'{0}' is not a supported image.\nPlease select a valid image file (JPG, PNG, GIF, BMP, TIFF)")]
    UnsupportedFile(String),
    #[error("'{0}' is not a supported image.\nPlease drop a valid image file (JPG, PNG, GIF, BMP, TIFF)")]
    UnsupportedDrop(String),
    #[error("The dropped item is not a local file.")]
    NothingDropped,
}

impl ValidationError {
    pub fn title(&self) -> &'static str {
        match self {
            ValidationError::NotConnected => "No Connection",
            ValidationError::NoImage => "No Image",
            ValidationError::NoModel => "No Model",
            ValidationError::EmptyPrompt => "No Prompt",
            ValidationError::UnsupportedFile(_)
            | ValidationError::UnsupportedDrop(_)
            | ValidationError::NothingDropped => "Invalid File",
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("could not read {}: {source}", .path.display())]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Request(String),
    #[error("no response from the model within {} s", .0.as_secs())]
    TimedOut(Duration),
    #[error("analysis cancelled")]
    Cancelled,
    #[error("could not start the background runtime: {0}")]
    Runtime(String),
}
