use tracing::info;

use crate::api::{ContentGenerator, ContentPart};
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::scene::Scene;

use super::StyleGuide;

const DIRECTOR_INSTRUCTION: &str = "You are a creative video director. Using the provided \"Master Style Guide\" and the specific scene description, write a detailed, cinematic prompt for a video generation AI. Describe camera shots (e.g., \"Medium shot of... tracking left\"), character actions, and key visual elements. Do NOT just repeat the scene description; interpret it cinematically.";

pub struct ScenePromptDirector;

impl ScenePromptDirector {
    pub fn instruction() -> &'static str {
        DIRECTOR_INSTRUCTION
    }

    pub fn request_text(style_guide: &StyleGuide, scene: &Scene) -> String {
        format!(
            "Master Style Guide: {}\n\nScene {} Description: {}",
            style_guide, scene.scene_number, scene.visual_prompt
        )
    }

    /// Cinematic video prompt for one scene, written against the run's style guide.
    pub async fn derive_prompt(
        generator: &dyn ContentGenerator,
        style_guide: &StyleGuide,
        scene: &Scene,
        cancel: &CancelToken,
    ) -> Result<String> {
        info!("Directing scene {}...", scene.scene_number);

        let request = Self::request_text(style_guide, scene);
        let prompt = cancel
            .run(generator.generate_text(Some(DIRECTOR_INSTRUCTION), &[ContentPart::text(request)]))
            .await?;

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::generation(format!(
                "empty cinematic prompt for scene {}",
                scene.scene_number
            )));
        }
        Ok(prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::StyleGuideSynthesizer;
    use crate::testing::{Call, MockGenerator};

    #[tokio::test]
    async fn combines_guide_and_scene() {
        let generator = MockGenerator::new();
        let cancel = CancelToken::new();
        let guide = StyleGuideSynthesizer::synthesize(&generator, &["dunes".to_string()], &cancel)
            .await
            .unwrap();
        let scene = Scene::new(3, "A caravan crosses the dunes", 8);

        let prompt = ScenePromptDirector::derive_prompt(&generator, &guide, &scene, &cancel)
            .await
            .unwrap();
        assert!(!prompt.is_empty());

        let calls = generator.calls();
        match &calls[1] {
            Call::Text { system, content } => {
                assert_eq!(system.as_deref(), Some(DIRECTOR_INSTRUCTION));
                assert!(content.starts_with("Master Style Guide: "));
                assert!(content.ends_with("Scene 3 Description: A caravan crosses the dunes"));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_before_the_call() {
        let generator = MockGenerator::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let guide = StyleGuide::new("calm");
        let scene = Scene::new(1, "x", 4);
        let err = ScenePromptDirector::derive_prompt(&generator, &guide, &scene, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(generator.calls().is_empty());
    }
}
