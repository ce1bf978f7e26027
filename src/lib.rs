pub mod chain;
pub mod dsp;
pub mod error;
pub mod generative;
pub mod graph;
pub mod profile;
pub mod program;
pub mod session;
pub mod time;
pub mod transport;

use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::profile::SoundProfile;
use crate::program::ProgramRegistry;

pub use crate::error::EngineError;
pub use crate::session::EngineSession;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the soundscape-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: the profile `config.type` tags this build can play, sorted.
#[wasm_bindgen]
pub fn profile_types() -> Result<JsValue, JsValue> {
    let types = ProgramRegistry::default().types();
    serde_wasm_bindgen::to_value(&types).map_err(|e| JsValue::from_str(&format!("{e}")))
}

async fn render(profile_json: &str, seconds: f64, sample_rate: u32, seed: u32) -> Result<dsp::renderer::RenderedAudio, JsValue> {
    let profile = SoundProfile::from_json(profile_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    dsp::renderer::render_profile(Arc::new(profile), seconds, sample_rate, seed as u64)
        .await
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a profile (JSON) to a 16-bit stereo WAV byte array.
#[wasm_bindgen]
pub async fn render_profile_wav(profile_json: String, seconds: f64, sample_rate: u32, seed: u32) -> Result<Vec<u8>, JsValue> {
    Ok(render(&profile_json, seconds, sample_rate, seed).await?.to_wav())
}

/// WASM-exposed: render a profile (JSON) to interleaved stereo f32 samples
/// for AudioWorklet playback.
#[wasm_bindgen]
pub async fn render_profile_samples(
    profile_json: String,
    seconds: f64,
    sample_rate: u32,
    seed: u32,
) -> Result<Vec<f32>, JsValue> {
    Ok(render(&profile_json, seconds, sample_rate, seed).await?.interleaved())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }
}
