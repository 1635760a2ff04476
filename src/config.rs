//! Runtime configuration.
//!
//! Defaults match the hosted Gemini models; every value can be overridden
//! through `SCENE_DIRECTOR_*` environment variables (a `.env` file is loaded by
//! the binary before these are read).

use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::scene::NarrationLanguage;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub video_model: String,
    pub speech_model: String,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            image_model: "imagen-4.0-generate-001".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Applies `SCENE_DIRECTOR_{BASE_URL,TEXT_MODEL,IMAGE_MODEL,VIDEO_MODEL,SPEECH_MODEL}`.
    pub fn apply_env(mut self) -> Self {
        if let Some(v) = env_var("BASE_URL") {
            self = self.with_base_url(v);
        }
        if let Some(v) = env_var("TEXT_MODEL") {
            self.text_model = v;
        }
        if let Some(v) = env_var("IMAGE_MODEL") {
            self.image_model = v;
        }
        if let Some(v) = env_var("VIDEO_MODEL") {
            self.video_model = v;
        }
        if let Some(v) = env_var("SPEECH_MODEL") {
            self.speech_model = v;
        }
        self
    }
}

/// Knobs for the pipeline itself, independent of the service behind it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub aspect_ratio: String,
    pub voice: String,
    pub narration_language: NarrationLanguage,
    /// Prepended to every single-image prompt as `"{coherence}. Scene: {prompt}"`
    pub image_coherence: Option<String>,
    pub poll: PollConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            voice: "Kore".to_string(),
            narration_language: NarrationLanguage::default(),
            image_coherence: None,
            poll: PollConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_var("ASPECT_RATIO") {
            config.aspect_ratio = v;
        }
        if let Some(v) = env_var("VOICE") {
            config.voice = v;
        }
        if let Some(v) = env_var("NARRATION_LANGUAGE") {
            config.narration_language = v.parse()?;
        }
        if let Some(v) = env_var("IMAGE_COHERENCE") {
            config.image_coherence = Some(v);
        }
        if let Some(v) = env_var("POLL_INTERVAL_SECS") {
            config.poll.interval = Duration::from_secs(parse_number("POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = env_var("POLL_MAX_ATTEMPTS") {
            let attempts = parse_number("POLL_MAX_ATTEMPTS", &v)?;
            config.poll.max_attempts = (attempts > 0).then_some(attempts as u32);
        }

        Ok(config)
    }
}

/// Video job polling. `max_attempts = None` polls until the job reports done.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    /// Interval multiplier applied after each poll; 1.0 keeps it fixed.
    pub backoff_factor: f64,
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: Some(90),
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("SCENE_DIRECTOR_{}", suffix))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        PipelineError::invalid_argument(format!("SCENE_DIRECTOR_{} must be a number, got {}", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_poll_every_ten_seconds() {
        let config = PipelineConfig::default();
        assert_eq!(config.poll.interval, Duration::from_secs(10));
        assert_eq!(config.poll.max_attempts, Some(90));
        assert_eq!(config.narration_language, NarrationLanguage::Portuguese);
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = GeminiConfig::new("key").with_base_url("http://localhost:8080/");
        assert_eq!(config.base_url, "http://localhost:8080");
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(parse_number("POLL_INTERVAL_SECS", "ten").is_err());
        assert_eq!(parse_number("POLL_INTERVAL_SECS", " 5 ").unwrap(), 5);
    }
}
