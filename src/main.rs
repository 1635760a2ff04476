use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use scene_director::batch::{Progress, ProgressFn};
use scene_director::pipeline::{Narration, PipelineController};
use scene_director::scene::{Script, ScriptInput, TargetModel};
use scene_director::video::{FfmpegProcessor, MediaInput, VideoMerger};
use scene_director::{GeminiClient, GeminiConfig, PipelineConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scene-director")]
#[command(about = "Scene-by-scene video scripting and generation using AI", long_about = None)]
struct Cli {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Working directory for generated files
    #[arg(short = 'w', long, default_value = "./output", global = true)]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a script and its summary from a source
    Script {
        #[command(flatten)]
        source: SourceArgs,

        /// structured (scene list) or freeform
        #[arg(long, default_value = "structured")]
        model: String,

        /// Output file name inside the working directory
        #[arg(long, default_value = "script.json")]
        out: String,
    },

    /// Rewrite an existing script following instructions
    Transform {
        #[arg(long)]
        script: PathBuf,

        #[arg(long)]
        instructions: String,
    },

    /// Generate a single concept image for a source
    ConceptArt {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Generate one image per scene
    Images {
        #[arg(long)]
        script: PathBuf,
    },

    /// Generate narration audio per scene (existing files are kept)
    Narrate {
        #[arg(long)]
        script: PathBuf,
    },

    /// Generate one video clip per scene
    Video {
        #[arg(long)]
        script: PathBuf,

        /// Download every finished clip into the working directory
        #[arg(long)]
        download: bool,
    },

    /// Concatenate clips and replace their audio with one track
    Merge {
        #[arg(long = "video", required = true)]
        videos: Vec<PathBuf>,

        #[arg(long)]
        audio: PathBuf,

        /// Output file name inside the working directory
        #[arg(long, default_value = "final.mp4")]
        out: String,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Idea or instructions as free text
    #[arg(long)]
    text: Option<String>,

    /// URL whose content the script is based on
    #[arg(long)]
    url: Option<String>,

    /// Video file to analyze
    #[arg(long)]
    video: Option<PathBuf>,

    /// Image file to analyze
    #[arg(long)]
    image: Option<PathBuf>,

    /// Additional instructions for the generator
    #[arg(long, default_value = "")]
    instructions: String,
}

impl SourceArgs {
    async fn into_input(self) -> anyhow::Result<ScriptInput> {
        let input = match (self.text, self.url, self.video, self.image) {
            (Some(text), None, None, None) => ScriptInput::text(text),
            (None, Some(url), None, None) => ScriptInput::url(url),
            (None, None, Some(path), None) => ScriptInput::video(read_file(&path).await?, mime_for(&path)),
            (None, None, None, Some(path)) => ScriptInput::image(read_file(&path).await?, mime_for(&path)),
            _ => bail!("Exactly one of --text, --url, --video or --image must be provided"),
        };

        Ok(input.with_instructions(self.instructions))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    // Output directory
    tokio::fs::create_dir_all(&cli.work_dir)
        .await
        .context("Failed to create work directory")?;

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let work_dir = cli.work_dir;
    let api_key = cli.api_key;

    match cli.command {
        Command::Script { source, model, out } => {
            let model: TargetModel = model.parse()?;
            let input = source.into_input().await?;
            let (_, controller) = pipeline(api_key)?;

            let script = controller.generate_script(&input, model).await?;
            write_json(&work_dir.join(&out), &script).await?;

            match controller.generated_script().and_then(|r| r.summary) {
                Some(summary) => {
                    info!("Summary (EN): {}", summary.english);
                    info!("Summary (PT): {}", summary.portuguese);
                    write_json(&work_dir.join("summary.json"), &summary).await?;
                }
                None => warn!("No summary was generated for this script"),
            }
        }

        Command::Transform { script, instructions } => {
            let (_, controller) = pipeline(api_key)?;
            controller.load_script(read_script(&script).await?)?;

            let transformed = controller.transform(&instructions).await?;
            write_json(&work_dir.join("transformed.json"), &transformed).await?;

            if let Some(summary) = controller.transformed_script().and_then(|r| r.summary) {
                write_json(&work_dir.join("transformed_summary.json"), &summary).await?;
            }
        }

        Command::ConceptArt { source } => {
            let input = source.into_input().await?;
            let (_, controller) = pipeline(api_key)?;

            let art = controller.generate_concept_art(&input).await?;
            let path = work_dir.join(format!("concept_art.{}", art.image.extension()));
            write_file(&path, &art.image.bytes).await?;
            info!("Concept art prompt: {}", art.prompt);
        }

        Command::Images { script } => {
            let (_, controller) = pipeline(api_key)?;
            controller.load_script(read_script(&script).await?)?;

            let run = controller.generate_all_images().await?;
            for image in controller.outputs().images {
                let scene = image.scene_number.unwrap_or(0);
                let path = next_free_image(&work_dir, scene, image.image.extension()).await;
                write_file(&path, &image.image.bytes).await?;
            }
            report_failures("image", &run.failures());
        }

        Command::Narrate { script } => {
            let (_, controller) = pipeline(api_key)?;
            controller.load_script(read_script(&script).await?)?;

            // Existing narration files are kept
            restore_narrations(&controller, &work_dir).await;

            let run = controller.generate_all_narrations().await?;
            let outputs = controller.outputs();
            for scene_number in run.completed() {
                if let Some(narration) = outputs.narrations.get(&scene_number) {
                    write_file(&narration_path(&work_dir, scene_number), &narration.audio).await?;
                }
            }
            report_failures("narration", &run.failures());
        }

        Command::Video { script, download } => {
            let (client, controller) = pipeline(api_key)?;
            controller.load_script(read_script(&script).await?)?;

            let result = controller.generate_full_video().await;

            // Clips that finished before a failure are kept.
            let outputs = controller.outputs();
            let videos = outputs.ordered_videos();
            write_json(&work_dir.join("videos.json"), &videos).await?;

            if download {
                for video in &videos {
                    let bytes = client.download(&video.uri).await?;
                    write_file(&work_dir.join(format!("clip_{}.mp4", video.scene_number)), &bytes).await?;
                }
            }
            result?;
        }

        Command::Merge { videos, audio, out } => {
            merge(&work_dir, &videos, &audio, &out).await?;
        }
    }

    Ok(())
}

/// Builds the client and controller, and wires Ctrl-C to cancellation.
fn pipeline(api_key: Option<String>) -> anyhow::Result<(Arc<GeminiClient>, Arc<PipelineController>)> {
    let api_key = api_key.context(
        "GEMINI_API_KEY not found. Please set it via --api-key or the GEMINI_API_KEY environment variable",
    )?;
    let client = Arc::new(GeminiClient::new(GeminiConfig::new(api_key).apply_env())?);
    let config = PipelineConfig::from_env()?;

    let progress: ProgressFn = Arc::new(|p: &Progress| {
        info!("[{}/{}] {}", p.current, p.total, p.message);
    });
    let controller = Arc::new(PipelineController::new(client.clone(), config).with_progress(progress));

    // Ctrl-C cancels the running stage, or the next one if none is running
    let watcher = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling...");
            watcher.cancel();
        }
    });

    Ok((client, controller))
}

async fn merge(work_dir: &Path, videos: &[PathBuf], audio: &Path, out: &str) -> anyhow::Result<()> {
    let mut inputs = Vec::with_capacity(videos.len());
    for path in videos {
        inputs.push(MediaInput::new(file_name(path), read_file(path).await?));
    }
    let audio = MediaInput::new(file_name(audio), read_file(audio).await?);

    let processor = FfmpegProcessor::new(work_dir.join("ffmpeg"))
        .with_progress(|fraction| info!("Merging... {:.0}%", fraction * 100.0));
    let merged = VideoMerger::new(&processor).merge(&inputs, &audio).await?;

    write_file(&work_dir.join(out), &merged).await
}

/// Narration files already on disk count as done.
async fn restore_narrations(controller: &PipelineController, work_dir: &Path) {
    let Some(script) = controller.current_script() else {
        return;
    };
    let language = controller.config().narration_language;

    for scene in script.scenes() {
        let path = narration_path(work_dir, scene.scene_number);
        if let Ok(audio) = tokio::fs::read(&path).await {
            info!("Scene {} narration already exists, skipping...", scene.scene_number);
            controller.restore_narration(Narration {
                scene_number: scene.scene_number,
                language,
                audio,
            });
        }
    }
}

fn report_failures(kind: &str, failures: &[u32]) {
    if !failures.is_empty() {
        warn!("{} generation failed for scene(s) {:?}", kind, failures);
    }
}

fn narration_path(work_dir: &Path, scene_number: u32) -> PathBuf {
    work_dir.join(format!("narration_{}.wav", scene_number))
}

/// `scene_{n}_{k}.{ext}` with the first `k` not taken yet.
async fn next_free_image(work_dir: &Path, scene_number: u32, extension: &str) -> PathBuf {
    let mut k = 1;
    loop {
        let path = work_dir.join(format!("scene_{}_{}.{}", scene_number, k, extension));
        if tokio::fs::metadata(&path).await.is_err() {
            return path;
        }
        k += 1;
    }
}

async fn read_script(path: &Path) -> anyhow::Result<Script> {
    let text = tokio::fs::read_to_string(path)
        .await
        .context(format!("Failed to read script: {}", path.display()))?;
    serde_json::from_str(&text).context(format!("Invalid script JSON: {}", path.display()))
}

async fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .context(format!("Failed to read file: {}", path.display()))
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .context(format!("Failed to write file: {}", path.display()))?;
    info!("Saved {}", path.display());
    Ok(())
}

async fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_file(path, json.as_bytes()).await
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn mime_for(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}
