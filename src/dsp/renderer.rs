//! Offline renderer: plays a profile through a seeded session and encodes
//! the result as a WAV byte buffer.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::EngineError;
use crate::profile::SoundProfile;
use crate::session::{EngineSession, OfflineOutput};

/// Stereo audio rendered offline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAudio {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl RenderedAudio {
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Interleaved L/R samples.
    pub fn interleaved(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }

    pub fn to_pcm_i16(&self) -> Vec<i16> {
        self.interleaved()
            .into_iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .collect()
    }

    /// 16-bit stereo PCM WAV.
    pub fn to_wav(&self) -> Vec<u8> {
        encode_wav(&self.to_pcm_i16(), self.sample_rate, 2)
    }
}

/// Render `seconds` of `profile` with a reproducible random source.
pub async fn render_profile(
    profile: Arc<SoundProfile>,
    seconds: f64,
    sample_rate: u32,
    seed: u64,
) -> Result<RenderedAudio, EngineError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(EngineError::InvalidTime(format!("{seconds} seconds")));
    }
    let output = OfflineOutput::new(sample_rate as f64);
    let mut session = EngineSession::with_rng(output, StdRng::seed_from_u64(seed));
    session.create_engine(profile).await?;
    let (left, right) = session.render((seconds * sample_rate as f64).round() as usize);
    session.dispose_engine();
    Ok(RenderedAudio {
        sample_rate,
        left,
        right,
    })
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileConfig;

    fn profile(kind: &str) -> Arc<SoundProfile> {
        Arc::new(SoundProfile::new(kind, ProfileConfig::new(kind)))
    }

    #[test]
    fn wav_header_valid() {
        let wav = encode_wav(&[0, 1, -1, 2], 22050, 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 22050);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 2);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);
        assert_eq!(wav.len(), 44 + 8);
    }

    #[tokio::test]
    async fn renders_requested_length() {
        let audio = render_profile(profile("noise"), 0.5, 8000, 1).await.unwrap();
        assert_eq!(audio.frames(), 4000);
        assert_eq!(audio.right.len(), 4000);

        // 4000 frames * 2 channels * 2 bytes
        let wav = audio.to_wav();
        assert_eq!(wav.len(), 44 + 16000);
    }

    #[tokio::test]
    async fn rendered_profile_is_not_silent() {
        let audio = render_profile(profile("rain"), 1.0, 8000, 9).await.unwrap();
        assert!(audio.to_pcm_i16().iter().any(|&s| s != 0));
        assert!(audio.interleaved().iter().all(|s| s.abs() <= 1.0));
    }

    #[tokio::test]
    async fn same_seed_same_audio() {
        let a = render_profile(profile("forest"), 1.0, 8000, 5).await.unwrap();
        let b = render_profile(profile("forest"), 1.0, 8000, 5).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn unknown_type_fails() {
        let err = render_profile(profile("mystery"), 1.0, 8000, 0).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownProfileType(_)));
    }
}
