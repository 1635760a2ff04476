use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::ImageData;
use crate::scene::{NarrationLanguage, Script, Summary};

/// A script with the summary derived from it, if one could be derived.
#[derive(Debug, Clone)]
pub struct ScriptRecord {
    pub script: Script,
    pub summary: Option<Summary>,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// `None` for images generated outside a scene batch
    pub scene_number: Option<u32>,
    /// Prompt as given, before the coherence prefix
    pub prompt: String,
    pub image: ImageData,
}

#[derive(Debug, Clone)]
pub struct Narration {
    pub scene_number: u32,
    pub language: NarrationLanguage,
    /// WAV
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneVideo {
    pub scene_number: u32,
    pub prompt: String,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct ConceptArt {
    pub prompt: String,
    pub image: ImageData,
}

#[derive(Debug, Clone)]
pub struct MergedVideo {
    pub bytes: Vec<u8>,
}

/// Everything the pipeline has produced for the current script.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutputs {
    /// Append-only; regenerating a scene adds another entry.
    pub images: Vec<GeneratedImage>,
    pub narrations: BTreeMap<u32, Narration>,
    pub videos: BTreeMap<u32, SceneVideo>,
    pub concept_art: Option<ConceptArt>,
    pub merged: Option<MergedVideo>,
}

impl PipelineOutputs {
    pub fn has_narration(&self, scene_number: u32) -> bool {
        self.narrations.contains_key(&scene_number)
    }

    pub fn images_for(&self, scene_number: u32) -> impl Iterator<Item = &GeneratedImage> {
        self.images
            .iter()
            .filter(move |img| img.scene_number == Some(scene_number))
    }

    /// Videos in scene order.
    pub fn ordered_videos(&self) -> Vec<&SceneVideo> {
        self.videos.values().collect()
    }
}
