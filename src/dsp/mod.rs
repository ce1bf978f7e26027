//! DSP primitives: pure Rust synthesis and effects.
//!
//! Everything here is sample-by-sample and allocation-free once built, so the
//! same code drives the host audio callback and offline WAV rendering.

pub mod bitcrusher;
pub mod delay;
pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod limiter;
pub mod mixer;
pub mod noise;
pub mod oscillator;
pub mod renderer;
pub mod reverb;
pub mod voice;
