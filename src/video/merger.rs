use tracing::info;

use crate::api::MediaProcessor;
use crate::error::{PipelineError, Result};

const FILE_LIST: &str = "mylist.txt";
const OUTPUT: &str = "output.mp4";

/// A named media file handed to the merger.
#[derive(Debug, Clone)]
pub struct MediaInput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl MediaInput {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    fn extension(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("wav")
    }
}

/// Concatenates clips and replaces their audio with one track.
pub struct VideoMerger<'a> {
    processor: &'a dyn MediaProcessor,
}

impl<'a> VideoMerger<'a> {
    pub fn new(processor: &'a dyn MediaProcessor) -> Self {
        Self { processor }
    }

    pub fn file_list(video_names: &[String]) -> String {
        video_names
            .iter()
            .map(|name| format!("file '{}'", name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Stream-copies the concatenated video, re-encodes audio to AAC and stops
    /// at the shorter of the two.
    pub fn merge_command(audio_name: &str) -> Vec<String> {
        [
            "-f", "concat",
            "-safe", "0",
            "-i", FILE_LIST,
            "-i", audio_name,
            "-c:v", "copy",
            "-c:a", "aac",
            "-map", "0:v:0",
            "-map", "1:a:0",
            "-shortest",
            OUTPUT,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub async fn merge(&self, videos: &[MediaInput], audio: &MediaInput) -> Result<Vec<u8>> {
        if videos.is_empty() {
            return Err(PipelineError::invalid_argument("at least one video is required"));
        }
        if audio.bytes.is_empty() {
            return Err(PipelineError::invalid_argument("an audio track is required"));
        }

        self.processor.load_runtime().await?;

        info!("Writing {} video inputs and the audio track...", videos.len());
        let mut video_names = Vec::with_capacity(videos.len());
        for (i, video) in videos.iter().enumerate() {
            let name = format!("input{}.mp4", i);
            self.processor.write_input(&name, &video.bytes).await?;
            video_names.push(name);
        }

        let audio_name = format!("audio.{}", audio.extension());
        self.processor.write_input(&audio_name, &audio.bytes).await?;
        self.processor
            .write_input(FILE_LIST, Self::file_list(&video_names).as_bytes())
            .await?;

        info!("Concatenating video clips...");
        self.processor.execute(&Self::merge_command(&audio_name)).await?;

        let merged = self.processor.read_output(OUTPUT).await?;
        info!("Merged video ready ({} bytes)", merged.len());
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProcessor;

    #[test]
    fn command_matches_concat_contract() {
        let args = VideoMerger::merge_command("audio.mp3");
        assert_eq!(
            args.join(" "),
            "-f concat -safe 0 -i mylist.txt -i audio.mp3 -c:v copy -c:a aac -map 0:v:0 -map 1:a:0 -shortest output.mp4"
        );
    }

    #[test]
    fn file_list_names_every_input() {
        let list = VideoMerger::file_list(&["input0.mp4".into(), "input1.mp4".into()]);
        assert_eq!(list, "file 'input0.mp4'\nfile 'input1.mp4'");
    }

    #[test]
    fn audio_extension_falls_back_to_wav() {
        assert_eq!(MediaInput::new("track.mp3", vec![1]).extension(), "mp3");
        assert_eq!(MediaInput::new("track", vec![1]).extension(), "wav");
        assert_eq!(MediaInput::new("x.../", vec![1]).extension(), "wav");
    }

    #[tokio::test]
    async fn writes_inputs_and_reads_output() {
        let processor = MockProcessor::new();
        let merger = VideoMerger::new(&processor);
        let videos = vec![
            MediaInput::new("a.mp4", vec![1]),
            MediaInput::new("b.mp4", vec![2]),
        ];

        let merged = merger
            .merge(&videos, &MediaInput::new("voice.mp3", vec![3]))
            .await
            .unwrap();

        assert_eq!(merged, b"merged");
        let files = processor.files.lock();
        assert_eq!(files.get("input0.mp4"), Some(&vec![1]));
        assert_eq!(files.get("input1.mp4"), Some(&vec![2]));
        assert_eq!(files.get("audio.mp3"), Some(&vec![3]));
        assert_eq!(
            files.get("mylist.txt").map(|b| String::from_utf8_lossy(b).to_string()),
            Some("file 'input0.mp4'\nfile 'input1.mp4'".to_string())
        );
    }

    #[tokio::test]
    async fn requires_videos_and_audio() {
        let processor = MockProcessor::new();
        let merger = VideoMerger::new(&processor);

        let err = merger
            .merge(&[], &MediaInput::new("voice.mp3", vec![3]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
        assert!(processor.executed.lock().is_empty());
    }

    #[tokio::test]
    async fn execution_failure_surfaces() {
        let processor = MockProcessor::failing();
        let merger = VideoMerger::new(&processor);

        let err = merger
            .merge(&[MediaInput::new("a.mp4", vec![1])], &MediaInput::new("t.wav", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Media(_)));
    }
}
