use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Required input missing before a stage could start.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more scenes exceed the per-scene duration cap.
    #[error("Scene(s) {} exceed the 8-second limit", join_numbers(.scenes))]
    DurationExceeded { scenes: Vec<u32> },

    #[error("Generation error: {0}")]
    Generation(String),

    /// The service answered, but the payload did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Scene {scene_number} failed: {message}")]
    ItemFailure { scene_number: u32, message: String },

    #[error("Video job did not finish after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Another action is in progress ({0})")]
    Busy(Stage),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}

impl PipelineError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn item_failure(scene_number: u32, message: impl Into<String>) -> Self {
        Self::ItemFailure {
            scene_number,
            message: message.into(),
        }
    }

    /// Parse failures are logged apart from service failures.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Json(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn join_numbers(numbers: &[u32]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
