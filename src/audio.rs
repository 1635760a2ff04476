use std::io::Cursor;

use crate::error::Result;

/// Sample layout returned by the speech model: 24 kHz, mono, signed 16-bit LE.
pub const TTS_SAMPLE_RATE: u32 = 24_000;
pub const TTS_CHANNELS: u16 = 1;
pub const TTS_BITS_PER_SAMPLE: u16 = 16;

/// Wraps raw little-endian 16-bit PCM in a WAV container. A trailing odd byte
/// is dropped.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: TTS_BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = Vec::with_capacity(44 + pcm.len());
    let mut writer = hound::WavWriter::new(Cursor::new(&mut wav), spec)?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;

    Ok(wav)
}
