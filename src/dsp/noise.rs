//! Colored noise sources.
//!
//! White noise comes from a 32-bit LCG so the audio path never touches the
//! session RNG; the session only supplies the seed. Pink noise uses Paul
//! Kellet's economy filter, brown noise a leaky integrator.

use serde::{Deserialize, Serialize};

/// Spectral color of a noise source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    #[default]
    Pink,
    Brown,
}

#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    pub color: NoiseColor,
    rng_state: u32,
    pink: [f64; 3],
    brown: f64,
}

impl NoiseGenerator {
    pub fn new(color: NoiseColor, seed: u32) -> Self {
        NoiseGenerator {
            color,
            // A zero LCG state is fine, but keep seeds distinct from the default.
            rng_state: seed ^ 0x9E37_79B9,
            pink: [0.0; 3],
            brown: 0.0,
        }
    }

    #[inline]
    fn white(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        let upper = (self.rng_state >> 8) as f64;
        upper / (1u32 << 23) as f64 - 1.0
    }

    pub fn next_sample(&mut self) -> f64 {
        let white = self.white();
        match self.color {
            NoiseColor::White => white,
            NoiseColor::Pink => {
                self.pink[0] = 0.99765 * self.pink[0] + white * 0.099_046_0;
                self.pink[1] = 0.96300 * self.pink[1] + white * 0.296_516_4;
                self.pink[2] = 0.57000 * self.pink[2] + white * 1.052_691_3;
                let pink = self.pink[0] + self.pink[1] + self.pink[2] + white * 0.1848;
                pink * 0.2
            }
            NoiseColor::Brown => {
                self.brown = (self.brown + 0.02 * white) / 1.02;
                self.brown * 3.5
            }
        }
    }

    /// Clear the filter memories (the LCG keeps running).
    pub fn reset(&mut self) {
        self.pink = [0.0; 3];
        self.brown = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(color: NoiseColor) -> f64 {
        let mut n = NoiseGenerator::new(color, 7);
        let sum: f64 = (0..44100).map(|_| n.next_sample().powi(2)).sum();
        (sum / 44100.0).sqrt()
    }

    #[test]
    fn white_noise_is_bounded_and_centered() {
        let mut n = NoiseGenerator::new(NoiseColor::White, 1);
        let mut sum = 0.0;
        for _ in 0..44100 {
            let s = n.next_sample();
            assert!((-1.0..=1.0).contains(&s), "white out of range: {s}");
            sum += s;
        }
        assert!((sum / 44100.0).abs() < 0.05, "white noise should be zero-mean");
    }

    #[test]
    fn every_color_is_audible_and_finite() {
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown] {
            let level = rms(color);
            assert!(level.is_finite());
            assert!(level > 0.01, "{color:?} too quiet: {level}");
            assert!(level < 1.0, "{color:?} too loud: {level}");
        }
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = NoiseGenerator::new(NoiseColor::Pink, 42);
        let mut b = NoiseGenerator::new(NoiseColor::Pink, 42);
        for _ in 0..256 {
            assert_eq!(a.next_sample(), b.next_sample());
        }
    }
}
