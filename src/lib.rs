//! Scene-by-scene video scripting and generation.
//!
//! A source (video, image, URL or free text) becomes a structured script of
//! timed scenes. From there the pipeline produces per-scene images, narration
//! and video clips, keeping the clips visually consistent through a shared
//! style guide, and finally muxes clips and an audio track into one file.

pub mod api;
pub mod audio;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod director;
pub mod error;
pub mod pipeline;
pub mod scene;
pub mod video;

#[cfg(test)]
mod testing;

pub use api::{ContentGenerator, GeminiClient, MediaProcessor};
pub use cancel::CancelToken;
pub use config::{GeminiConfig, PipelineConfig, PollConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineController, Stage, StageState};
pub use scene::{Scene, SceneScript, Script, ScriptInput, TargetModel};
