pub mod input;
pub mod planner;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub use input::{ScriptInput, ScriptSource};
pub use planner::{SceneAggregate, ScenePlanner, MAX_SCENE_SECONDS};
pub use schema::{InputModality, ScriptRequest, ScriptSchema, TargetModel};

/// One timed segment of the generated video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique within a script, 1-based
    pub scene_number: u32,
    /// English visual description, source of image and video prompts
    #[serde(rename = "visual_prompt_english", alias = "visual_prompt")]
    pub visual_prompt: String,
    pub duration_seconds: u32,
    pub narration_english: String,
    pub narration_portuguese: String,
    pub subtitles_english: String,
}

impl Scene {
    pub fn new(scene_number: u32, visual_prompt: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            scene_number,
            visual_prompt: visual_prompt.into(),
            duration_seconds,
            narration_english: String::new(),
            narration_portuguese: String::new(),
            subtitles_english: String::new(),
        }
    }

    pub fn with_narration(
        mut self,
        english: impl Into<String>,
        portuguese: impl Into<String>,
    ) -> Self {
        self.narration_english = english.into();
        self.narration_portuguese = portuguese.into();
        self
    }

    pub fn narration(&self, language: NarrationLanguage) -> &str {
        match language {
            NarrationLanguage::English => &self.narration_english,
            NarrationLanguage::Portuguese => &self.narration_portuguese,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneScript {
    pub scenes: Vec<Scene>,
    pub final_instructions: String,
}

impl SceneScript {
    pub fn scene(&self, scene_number: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.scene_number == scene_number)
    }

    pub fn visual_prompts(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.visual_prompt.clone()).collect()
    }
}

/// Free-form structured prompt. Keys on the wire are the Portuguese ones the
/// generator is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeformScript {
    pub persona: String,
    #[serde(rename = "tarefa")]
    pub task: String,
    #[serde(rename = "contexto")]
    pub context: String,
    #[serde(rename = "passos_requisitos")]
    pub steps: Vec<String>,
    #[serde(rename = "formato_saida")]
    pub output_format: String,
    #[serde(rename = "restricoes")]
    pub constraints: Vec<String>,
    #[serde(rename = "legendas_sugestao")]
    pub caption_suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Script {
    Scenes(SceneScript),
    Freeform(FreeformScript),
}

impl Script {
    /// Decode a generator response into the variant `model` asked for.
    pub fn from_value(model: TargetModel, value: Value) -> Result<Self> {
        let script = match model {
            TargetModel::Structured => serde_json::from_value(value)
                .map(Script::Scenes)
                .map_err(|e| PipelineError::parse(format!("invalid scene script: {}", e)))?,
            TargetModel::Freeform => serde_json::from_value(value)
                .map(Script::Freeform)
                .map_err(|e| PipelineError::parse(format!("invalid freeform script: {}", e)))?,
        };
        Ok(script)
    }

    pub fn model(&self) -> TargetModel {
        match self {
            Script::Scenes(_) => TargetModel::Structured,
            Script::Freeform(_) => TargetModel::Freeform,
        }
    }

    pub fn scenes(&self) -> &[Scene] {
        match self {
            Script::Scenes(script) => &script.scenes,
            Script::Freeform(_) => &[],
        }
    }

    pub fn as_scene_script(&self) -> Option<&SceneScript> {
        match self {
            Script::Scenes(script) => Some(script),
            Script::Freeform(_) => None,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "summary_english")]
    pub english: String,
    #[serde(rename = "summary_portuguese")]
    pub portuguese: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationLanguage {
    English,
    #[default]
    Portuguese,
}

impl std::str::FromStr for NarrationLanguage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "pt" | "pt-br" | "portuguese" => Ok(Self::Portuguese),
            other => Err(PipelineError::invalid_argument(format!(
                "unknown narration language: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scene_script_with_wire_names() {
        let value = json!({
            "scenes": [{
                "scene_number": 1,
                "visual_prompt_english": "A lighthouse at dusk",
                "duration_seconds": 8,
                "narration_english": "It stands alone.",
                "narration_portuguese": "Ele está sozinho.",
                "subtitles_english": "It stands alone."
            }],
            "final_instructions": "Audio in Brazilian Portuguese."
        });

        let script = Script::from_value(TargetModel::Structured, value).unwrap();
        assert_eq!(script.model(), TargetModel::Structured);
        assert_eq!(script.scenes()[0].visual_prompt, "A lighthouse at dusk");
    }

    #[test]
    fn parses_freeform_script() {
        let value = json!({
            "persona": "Diretor",
            "tarefa": "Criar um vídeo",
            "contexto": "Praia",
            "passos_requisitos": ["abrir", "fechar"],
            "formato_saida": "mp4",
            "restricoes": ["sem texto"],
            "legendas_sugestao": "Olá"
        });

        let script = Script::from_value(TargetModel::Freeform, value).unwrap();
        match script {
            Script::Freeform(f) => assert_eq!(f.steps, vec!["abrir", "fechar"]),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn wrong_shape_is_a_parse_error() {
        let err = Script::from_value(TargetModel::Structured, json!({"persona": "x"})).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn freeform_script_has_no_scenes() {
        let script = Script::Freeform(FreeformScript {
            persona: String::new(),
            task: String::new(),
            context: String::new(),
            steps: vec![],
            output_format: String::new(),
            constraints: vec![],
            caption_suggestion: String::new(),
        });
        assert!(script.scenes().is_empty());
        assert!(script.as_scene_script().is_none());
    }
}
