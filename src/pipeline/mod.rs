//! Top-level sequencing of the generation stages.
//!
//! `PipelineController` owns the scripts and every output store. Each public
//! operation is one stage: it claims the stage board, does its work against
//! the content generator and writes results back under a short lock. Only
//! one stage runs at a time; a second caller gets `PipelineError::Busy`.

mod outputs;
mod state;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::api::{ContentGenerator, ContentPart, ImageData, MediaProcessor, VideoJobParams};
use crate::batch::{
    BatchKind, BatchOrchestrator, FailurePolicy, GenerationRun, ItemStatus, Progress, ProgressFn,
};
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::director::{ScenePromptDirector, StyleGuide, StyleGuideSynthesizer};
use crate::error::{PipelineError, Result};
use crate::scene::{
    InputModality, Scene, ScenePlanner, Script, ScriptInput, ScriptSchema, Summary, TargetModel,
};
use crate::video::{MediaInput, VideoJobPoller, VideoMerger};

pub use outputs::{
    ConceptArt, GeneratedImage, MergedVideo, Narration, PipelineOutputs, SceneVideo, ScriptRecord,
};
pub use state::{Stage, StageBoard, StageState};

#[derive(Default)]
struct Inner {
    /// Bumped by `reset`; work started under an older epoch writes nothing.
    epoch: u64,
    cancel: CancelToken,
    stages: StageBoard,
    /// Model and modality of the last generation, reused by `transform`.
    request: Option<(TargetModel, InputModality)>,
    generated: Option<ScriptRecord>,
    transformed: Option<ScriptRecord>,
    outputs: PipelineOutputs,
}

/// A claimed stage.
struct Ticket {
    stage: Stage,
    epoch: u64,
    cancel: CancelToken,
}

pub struct PipelineController {
    generator: Arc<dyn ContentGenerator>,
    config: PipelineConfig,
    progress: Option<ProgressFn>,
    inner: Mutex<Inner>,
}

impl PipelineController {
    pub fn new(generator: Arc<dyn ContentGenerator>, config: PipelineConfig) -> Self {
        Self {
            generator,
            config,
            progress: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ---- state ----

    /// The transformed script if there is one, otherwise the generated one.
    pub fn current_script(&self) -> Option<Script> {
        let inner = self.inner.lock();
        inner
            .transformed
            .as_ref()
            .or(inner.generated.as_ref())
            .map(|r| r.script.clone())
    }

    pub fn generated_script(&self) -> Option<ScriptRecord> {
        self.inner.lock().generated.clone()
    }

    pub fn transformed_script(&self) -> Option<ScriptRecord> {
        self.inner.lock().transformed.clone()
    }

    pub fn outputs(&self) -> PipelineOutputs {
        self.inner.lock().outputs.clone()
    }

    pub fn stage_state(&self, stage: Stage) -> StageState {
        self.inner.lock().stages.state(stage)
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().stages.is_busy()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.inner.lock().cancel.clone()
    }

    pub fn cancel(&self) {
        warn!("Cancellation requested");
        self.inner.lock().cancel.cancel();
    }

    /// Cancels whatever is running and drops every script and output.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.cancel.cancel();
        let epoch = inner.epoch + 1;
        *inner = Inner {
            epoch,
            ..Inner::default()
        };
        info!("Pipeline reset");
    }

    /// Installs an existing script as the generated one, clearing all outputs.
    pub fn load_script(&self, script: Script) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(active) = inner.stages.running() {
            return Err(PipelineError::Busy(active));
        }
        inner.request = Some((script.model(), InputModality::Text));
        inner.generated = Some(ScriptRecord {
            script,
            summary: None,
        });
        inner.transformed = None;
        inner.outputs = PipelineOutputs::default();
        Ok(())
    }

    /// Seeds the narration store, e.g. from audio already on disk.
    pub fn restore_narration(&self, narration: Narration) {
        self.inner
            .lock()
            .outputs
            .narrations
            .insert(narration.scene_number, narration);
    }

    /// Claims `stage`. A cancel that arrived while nothing was running is
    /// consumed here and the stage does not start.
    fn begin(&self, stage: Stage) -> Result<Ticket> {
        let mut inner = self.inner.lock();
        if let Some(active) = inner.stages.running() {
            return Err(PipelineError::Busy(active));
        }
        if inner.cancel.is_cancelled() {
            inner.cancel = CancelToken::new();
            warn!("{} not started: cancellation was pending", stage);
            return Err(PipelineError::Cancelled);
        }
        inner.stages.begin(stage)?;
        info!("Starting {}...", stage);
        Ok(Ticket {
            stage,
            epoch: inner.epoch,
            cancel: inner.cancel.clone(),
        })
    }

    fn finish<T>(&self, ticket: &Ticket, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => info!("{} completed", ticket.stage),
            Err(err) if err.is_parse() => error!(kind = "parse", "{} failed: {}", ticket.stage, err),
            Err(err) => error!("{} failed: {}", ticket.stage, err),
        }

        let mut inner = self.inner.lock();
        if inner.epoch == ticket.epoch {
            match &result {
                Ok(_) => inner.stages.complete(ticket.stage),
                Err(err) => inner.stages.fail(ticket.stage, err.to_string()),
            }
            // This stage has seen the cancel; the next one starts clean.
            if inner.cancel.is_cancelled() {
                inner.cancel = CancelToken::new();
            }
        }
        result
    }

    /// Applies `f` unless the ticket's run was cancelled or reset.
    fn store(&self, ticket: &Ticket, f: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != ticket.epoch || ticket.cancel.is_cancelled() {
            return false;
        }
        f(&mut *inner);
        true
    }

    fn commit(&self, ticket: &Ticket, f: impl FnOnce(&mut Inner)) -> Result<()> {
        if self.store(ticket, f) {
            Ok(())
        } else {
            Err(PipelineError::Cancelled)
        }
    }

    fn report(&self, progress: Progress) {
        if let Some(f) = &self.progress {
            f(&progress);
        }
    }

    fn batch(&self, kind: BatchKind, policy: FailurePolicy, ticket: &Ticket) -> BatchOrchestrator {
        BatchOrchestrator::new(kind, policy)
            .with_progress(self.progress.clone())
            .with_cancel(ticket.cancel.clone())
    }

    fn current_scenes(&self) -> Result<Vec<Scene>> {
        let inner = self.inner.lock();
        let record = inner
            .transformed
            .as_ref()
            .or(inner.generated.as_ref())
            .ok_or_else(|| PipelineError::invalid_argument("no script has been generated"))?;
        record
            .script
            .as_scene_script()
            .map(|s| s.scenes.clone())
            .ok_or_else(|| PipelineError::invalid_argument("the current script has no scenes"))
    }

    fn current_scene(&self, scene_number: u32) -> Result<Scene> {
        self.current_scenes()?
            .into_iter()
            .find(|s| s.scene_number == scene_number)
            .ok_or_else(|| PipelineError::invalid_argument(format!("scene {} not found", scene_number)))
    }

    // ---- script ----

    pub async fn generate_script(&self, input: &ScriptInput, model: TargetModel) -> Result<Script> {
        let ticket = self.begin(Stage::Script)?;
        let result = self.run_generate_script(&ticket, input, model).await;
        self.finish(&ticket, result)
    }

    async fn run_generate_script(
        &self,
        ticket: &Ticket,
        input: &ScriptInput,
        model: TargetModel,
    ) -> Result<Script> {
        // 1. Validate input and drop everything derived from the old script
        input.validate()?;
        self.commit(ticket, |inner| {
            inner.request = None;
            inner.generated = None;
            inner.transformed = None;
            inner.outputs = PipelineOutputs::default();
        })?;

        // 2. Ask for the script in the model's schema
        let modality = input.modality();
        let request = ScriptSchema::build_request(model, modality);
        info!("Generating {} script from {} input...", model, modality);

        let value = ticket
            .cancel
            .run(self.generator.generate_structured(
                &request.instruction,
                &input.script_parts(),
                &request.schema,
            ))
            .await?;
        let script = Script::from_value(model, value)?;

        // 3. Scene count check (advisory)
        if let Some(scenes) = script.as_scene_script().map(|s| &s.scenes) {
            let aggregate = ScenePlanner::aggregate(scenes);
            info!(
                "Script has {} scenes, {} seconds in total",
                aggregate.scene_count, aggregate.total_duration_seconds
            );
            if !ScenePlanner::is_minimal(scenes) {
                warn!(
                    "Script uses {} scenes where {} would cover {} seconds",
                    aggregate.scene_count,
                    ScenePlanner::minimal_scene_count(aggregate.total_duration_seconds),
                    aggregate.total_duration_seconds
                );
            }
        }

        self.commit(ticket, |inner| {
            inner.request = Some((model, modality));
            inner.generated = Some(ScriptRecord {
                script: script.clone(),
                summary: None,
            });
        })?;

        // 4. Summary, best effort
        let summary = self.summarize(&ticket.cancel, &script).await;
        self.commit(ticket, |inner| {
            if let Some(record) = inner.generated.as_mut() {
                record.summary = summary;
            }
        })?;

        Ok(script)
    }

    pub async fn transform(&self, instructions: &str) -> Result<Script> {
        let ticket = self.begin(Stage::Transform)?;
        let result = self.run_transform(&ticket, instructions).await;
        self.finish(&ticket, result)
    }

    async fn run_transform(&self, ticket: &Ticket, instructions: &str) -> Result<Script> {
        let (original, request) = {
            let inner = self.inner.lock();
            (inner.generated.as_ref().map(|r| r.script.clone()), inner.request)
        };

        let original = original.ok_or_else(|| {
            PipelineError::invalid_argument("a generated script is required before transforming")
        })?;
        let instructions = instructions.trim();
        if instructions.is_empty() {
            return Err(PipelineError::invalid_argument(
                "transformation instructions are required",
            ));
        }

        let (model, modality) = request.unwrap_or((original.model(), InputModality::Text));
        let schema = ScriptSchema::build_request(model, modality).schema;
        let content = format!(
            "Original Script: {}\n\nModification Instructions: {}",
            original.to_json_pretty()?,
            instructions
        );

        info!("Transforming script...");
        let value = ticket
            .cancel
            .run(self.generator.generate_structured(
                ScriptSchema::transform_instruction(),
                &[ContentPart::text(content)],
                &schema,
            ))
            .await?;
        let script = Script::from_value(model, value)?;

        let summary = self.summarize(&ticket.cancel, &script).await;
        self.commit(ticket, |inner| {
            inner.transformed = Some(ScriptRecord {
                script: script.clone(),
                summary,
            });
        })?;

        Ok(script)
    }

    /// Never fails the stage; a missing summary is only logged.
    async fn summarize(&self, cancel: &CancelToken, script: &Script) -> Option<Summary> {
        let total = ScenePlanner::aggregate(script.scenes()).total_duration_seconds;
        let request = ScriptSchema::summary_request(total);

        let result: Result<Summary> = async {
            let content = format!("Here is the script JSON: {}", serde_json::to_string(script)?);
            let value = cancel
                .run(self.generator.generate_structured(
                    &request.instruction,
                    &[ContentPart::text(content)],
                    &request.schema,
                ))
                .await?;
            serde_json::from_value(value)
                .map_err(|e| PipelineError::parse(format!("invalid summary: {}", e)))
        }
        .await;

        match result {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!("Failed to generate script summary: {}", err);
                None
            }
        }
    }

    // ---- images ----

    pub async fn generate_concept_art(&self, input: &ScriptInput) -> Result<ConceptArt> {
        let ticket = self.begin(Stage::ConceptArt)?;
        let result = self.run_concept_art(&ticket, input).await;
        self.finish(&ticket, result)
    }

    async fn run_concept_art(&self, ticket: &Ticket, input: &ScriptInput) -> Result<ConceptArt> {
        input.validate()?;

        info!("Deriving concept art prompt from {} input...", input.modality());
        let prompt = ticket
            .cancel
            .run(self.generator.generate_text(
                Some(ScriptSchema::concept_art_instruction()),
                &input.concept_parts(),
            ))
            .await?;
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(PipelineError::generation("empty concept art prompt"));
        }

        let image = self.first_image(&ticket.cancel, &prompt).await?;
        let art = ConceptArt { prompt, image };
        self.commit(ticket, |inner| inner.outputs.concept_art = Some(art.clone()))?;
        Ok(art)
    }

    pub async fn generate_image(&self, prompt: &str, scene_number: Option<u32>) -> Result<GeneratedImage> {
        let ticket = self.begin(Stage::Images)?;
        let result: Result<GeneratedImage> = async {
            let image = self.render_image(&ticket, prompt, scene_number).await?;
            self.commit(&ticket, |inner| inner.outputs.images.push(image.clone()))?;
            Ok(image)
        }
        .await;
        self.finish(&ticket, result)
    }

    /// One image per scene, best effort. Every success is appended to the gallery.
    pub async fn generate_all_images(&self) -> Result<GenerationRun<GeneratedImage>> {
        let ticket = self.begin(Stage::Images)?;
        let result = self.run_all_images(&ticket).await;
        self.finish(&ticket, result)
    }

    async fn run_all_images(&self, ticket: &Ticket) -> Result<GenerationRun<GeneratedImage>> {
        let scenes = self.current_scenes()?;

        let run = self
            .batch(BatchKind::Image, FailurePolicy::BestEffort, ticket)
            .run(
                &scenes,
                |_| false,
                |scene| async move {
                    self.render_image(ticket, &scene.visual_prompt, Some(scene.scene_number))
                        .await
                },
                |_, status| {
                    if let ItemStatus::Done(image) = status {
                        self.store(ticket, |inner| inner.outputs.images.push(image.clone()));
                    }
                },
            )
            .await;

        if run.was_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !run.failures().is_empty() {
            warn!("Images failed for scene(s) {:?}", run.failures());
        }
        Ok(run)
    }

    async fn render_image(
        &self,
        ticket: &Ticket,
        prompt: &str,
        scene_number: Option<u32>,
    ) -> Result<GeneratedImage> {
        let full_prompt = match self.config.image_coherence.as_deref().map(str::trim) {
            Some(coherence) if !coherence.is_empty() => format!("{}. Scene: {}", coherence, prompt),
            _ => prompt.to_string(),
        };

        let image = self.first_image(&ticket.cancel, &full_prompt).await?;
        Ok(GeneratedImage {
            scene_number,
            prompt: prompt.to_string(),
            image,
        })
    }

    async fn first_image(&self, cancel: &CancelToken, prompt: &str) -> Result<ImageData> {
        cancel
            .run(self.generator.generate_image(prompt, &self.config.aspect_ratio, 1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::generation("no image returned"))
    }

    // ---- narration ----

    pub async fn generate_narration(&self, scene_number: u32) -> Result<Narration> {
        let ticket = self.begin(Stage::Narration)?;
        let result: Result<Narration> = async {
            let scene = self.current_scene(scene_number)?;
            let narration = self.narrate(&ticket, &scene).await?;
            self.commit(&ticket, |inner| {
                inner.outputs.narrations.insert(scene_number, narration.clone());
            })?;
            Ok(narration)
        }
        .await;
        self.finish(&ticket, result)
    }

    /// Narrates every scene that has no narration yet, best effort.
    pub async fn generate_all_narrations(&self) -> Result<GenerationRun<Narration>> {
        let ticket = self.begin(Stage::Narration)?;
        let result = self.run_all_narrations(&ticket).await;
        self.finish(&ticket, result)
    }

    async fn run_all_narrations(&self, ticket: &Ticket) -> Result<GenerationRun<Narration>> {
        let scenes = self.current_scenes()?;

        let run = self
            .batch(BatchKind::Narration, FailurePolicy::BestEffort, ticket)
            .run(
                &scenes,
                |n| self.inner.lock().outputs.has_narration(n),
                |scene| async move { self.narrate(ticket, &scene).await },
                |n, status| {
                    if let ItemStatus::Done(narration) = status {
                        self.store(ticket, |inner| {
                            inner.outputs.narrations.insert(n, narration.clone());
                        });
                    }
                },
            )
            .await;

        if run.was_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if !run.failures().is_empty() {
            warn!("Narration failed for scene(s) {:?}", run.failures());
        }
        Ok(run)
    }

    async fn narrate(&self, ticket: &Ticket, scene: &Scene) -> Result<Narration> {
        let language = self.config.narration_language;
        let text = scene.narration(language).trim();
        if text.is_empty() {
            return Err(PipelineError::invalid_argument(format!(
                "scene {} has no {:?} narration",
                scene.scene_number, language
            )));
        }

        let audio = ticket
            .cancel
            .run(self.generator.synthesize_speech(text, &self.config.voice))
            .await?;
        Ok(Narration {
            scene_number: scene.scene_number,
            language,
            audio,
        })
    }

    // ---- video ----

    /// Style guide first, then one clip per scene in order. The first scene
    /// that fails stops the run; clips finished before it are kept.
    pub async fn generate_full_video(&self) -> Result<Vec<SceneVideo>> {
        let ticket = self.begin(Stage::Video)?;
        let result = self.run_full_video(&ticket).await;
        self.finish(&ticket, result)
    }

    async fn run_full_video(&self, ticket: &Ticket) -> Result<Vec<SceneVideo>> {
        let scenes = self.current_scenes()?;
        if scenes.is_empty() {
            return Err(PipelineError::invalid_argument("no scenes found in the script"));
        }
        // 1. Every scene must fit in one clip
        ScenePlanner::validate(&scenes)?;

        self.commit(ticket, |inner| inner.outputs.videos.clear())?;

        // 2. One style guide shared by all scenes
        self.report(Progress {
            current: 0,
            total: scenes.len() + 2,
            message: "Analyzing script to build a visual style...".to_string(),
        });
        let prompts: Vec<String> = scenes.iter().map(|s| s.visual_prompt.clone()).collect();
        let style_guide =
            StyleGuideSynthesizer::synthesize(self.generator.as_ref(), &prompts, &ticket.cancel).await?;

        let poller = VideoJobPoller::new(self.config.poll.clone());
        let params = VideoJobParams {
            aspect_ratio: self.config.aspect_ratio.clone(),
            number_of_videos: 1,
        };

        // 3. Scenes in order, stopping at the first failure
        let (style_guide, poller, params) = (&style_guide, &poller, &params);
        let run = self
            .batch(BatchKind::Video, FailurePolicy::AbortOnFirstFailure, ticket)
            .run(
                &scenes,
                |_| false,
                |scene| async move {
                    self.render_video(ticket, style_guide, poller, params, &scene)
                        .await
                },
                |n, status| {
                    if let ItemStatus::Done(video) = status {
                        self.store(ticket, |inner| {
                            inner.outputs.videos.insert(n, video.clone());
                        });
                    }
                },
            )
            .await;

        if run.was_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some((scene_number, message)) = run.first_failure() {
            return Err(PipelineError::item_failure(scene_number, message));
        }

        // 4. Clips in scene order
        Ok(run
            .items
            .into_values()
            .filter_map(|status| match status {
                ItemStatus::Done(video) => Some(video),
                _ => None,
            })
            .collect())
    }

    async fn render_video(
        &self,
        ticket: &Ticket,
        style_guide: &StyleGuide,
        poller: &VideoJobPoller,
        params: &VideoJobParams,
        scene: &Scene,
    ) -> Result<SceneVideo> {
        let generator = self.generator.as_ref();
        let prompt =
            ScenePromptDirector::derive_prompt(generator, style_guide, scene, &ticket.cancel).await?;

        let handle = ticket
            .cancel
            .run(generator.submit_video_job(&prompt, params))
            .await?;
        info!("Submitted video job {} for scene {}", handle.0, scene.scene_number);

        let status = poller.wait(generator, &handle, &ticket.cancel).await?;
        let uri = status
            .result_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| {
                PipelineError::generation(format!(
                    "no download link for scene {}",
                    scene.scene_number
                ))
            })?;

        Ok(SceneVideo {
            scene_number: scene.scene_number,
            prompt,
            uri,
        })
    }

    // ---- merge ----

    pub async fn merge_videos(
        &self,
        processor: &dyn MediaProcessor,
        videos: &[MediaInput],
        audio: &MediaInput,
    ) -> Result<MergedVideo> {
        let ticket = self.begin(Stage::Merge)?;
        let result: Result<MergedVideo> = async {
            let bytes = ticket
                .cancel
                .run(VideoMerger::new(processor).merge(videos, audio))
                .await?;
            let merged = MergedVideo { bytes };
            self.commit(&ticket, |inner| inner.outputs.merged = Some(merged.clone()))?;
            Ok(merged)
        }
        .await;
        self.finish(&ticket, result)
    }
}
