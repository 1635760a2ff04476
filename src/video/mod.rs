mod ffmpeg;
mod merger;
mod poller;

pub use ffmpeg::FfmpegProcessor;
pub use merger::{MediaInput, VideoMerger};
pub use poller::VideoJobPoller;
