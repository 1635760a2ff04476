//! Capabilities the pipeline consumes from the outside world.
//!
//! [`ContentGenerator`] is the generative AI service (text, structured JSON,
//! images, speech, long-running video jobs). [`MediaProcessor`] is the media
//! toolkit used to concatenate clips and mux an audio track.

mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use gemini::GeminiClient;

/// One piece of request content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    pub fn inline(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        ContentPart::InlineData {
            mime_type: mime_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJobParams {
    pub aspect_ratio: String,
    pub number_of_videos: u32,
}

impl Default for VideoJobParams {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            number_of_videos: 1,
        }
    }
}

/// Opaque reference to a submitted video job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJobHandle(pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJobStatus {
    pub done: bool,
    pub result_uri: Option<String>,
    /// Set when the job finished unsuccessfully.
    pub error: Option<String>,
}

impl VideoJobStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn finished(uri: impl Into<String>) -> Self {
        Self {
            done: true,
            result_uri: Some(uri.into()),
            error: None,
        }
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// JSON generation constrained by `schema`. Malformed output is a
    /// [`PipelineError::Parse`](crate::PipelineError::Parse).
    async fn generate_structured(
        &self,
        system_instruction: &str,
        parts: &[ContentPart],
        schema: &Value,
    ) -> Result<Value>;

    async fn generate_text(
        &self,
        system_instruction: Option<&str>,
        parts: &[ContentPart],
    ) -> Result<String>;

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        count: u32,
    ) -> Result<Vec<ImageData>>;

    /// Spoken rendition of `text`, as WAV bytes.
    async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    async fn submit_video_job(&self, prompt: &str, params: &VideoJobParams)
        -> Result<VideoJobHandle>;

    async fn poll_video_job(&self, handle: &VideoJobHandle) -> Result<VideoJobStatus>;
}

/// Sandboxed media toolkit. `load_runtime` must succeed before anything else.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn load_runtime(&self) -> Result<()>;

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()>;

    async fn execute(&self, args: &[String]) -> Result<()>;

    async fn read_output(&self, name: &str) -> Result<Vec<u8>>;
}
