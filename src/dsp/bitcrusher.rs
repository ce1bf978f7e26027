//! Bit reduction: amplitude quantization with optional sample-and-hold.
//!
//! With B bits the amplitude axis is split into 2^B levels and every sample
//! is rounded to the nearest one: `floor(x · 2^B + 0.5) / 2^B`. A downsample
//! factor above 1 latches a new input only every N samples (zero-order
//! hold), which adds the aliasing that lo-fi textures lean on.

#[derive(Debug, Clone)]
pub struct Bitcrusher {
    /// Bit depth, clamped to [1, 16]. Fractional depths are allowed.
    bits: f64,
    /// Hold factor, clamped to [1, 64]. 1 = no rate reduction.
    downsample: f64,
    /// Wet/dry mix (0.0 = dry, 1.0 = fully crushed).
    pub mix: f64,
    held_l: f32,
    held_r: f32,
    counter: f64,
}

impl Bitcrusher {
    pub fn new(bits: f64) -> Self {
        let mut crusher = Bitcrusher {
            bits: 16.0,
            downsample: 1.0,
            mix: 1.0,
            held_l: 0.0,
            held_r: 0.0,
            counter: 0.0,
        };
        crusher.set_bits(bits);
        crusher
    }

    pub fn bits(&self) -> f64 {
        self.bits
    }

    pub fn set_bits(&mut self, bits: f64) {
        self.bits = if bits.is_finite() { bits.clamp(1.0, 16.0) } else { 16.0 };
    }

    pub fn set_downsample(&mut self, factor: f64) {
        self.downsample = if factor.is_finite() { factor.clamp(1.0, 64.0) } else { 1.0 };
    }

    #[inline]
    fn quantize(sample: f32, bits: f64) -> f32 {
        let levels = 2.0_f64.powf(bits);
        ((sample as f64 * levels + 0.5).floor() / levels) as f32
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        self.counter += 1.0;
        if self.counter >= self.downsample {
            self.held_l = Self::quantize(left, self.bits);
            self.held_r = Self::quantize(right, self.bits);
            self.counter -= self.counter.floor();
        }
        let mix = self.mix.clamp(0.0, 1.0) as f32;
        (
            left * (1.0 - mix) + self.held_l * mix,
            right * (1.0 - mix) + self.held_r * mix,
        )
    }

    pub fn reset(&mut self) {
        self.held_l = 0.0;
        self.held_r = 0.0;
        self.counter = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_lands_on_quantization_grid() {
        let mut crusher = Bitcrusher::new(3.0);
        let step = 1.0 / 8.0;
        for i in 0..100 {
            let x = (i as f32 / 100.0) * 2.0 - 1.0;
            let (l, _) = crusher.process(x, x);
            let steps = l / step;
            assert!((steps - steps.round()).abs() < 1e-4, "{l} is off-grid");
        }
    }

    #[test]
    fn sixteen_bits_is_nearly_transparent() {
        let mut crusher = Bitcrusher::new(16.0);
        let (l, r) = crusher.process(0.3, -0.7);
        assert!((l - 0.3).abs() < 1e-4);
        assert!((r + 0.7).abs() < 1e-4);
    }

    #[test]
    fn downsample_holds_samples() {
        let mut crusher = Bitcrusher::new(16.0);
        crusher.set_downsample(4.0);
        let outputs: Vec<f32> = (0..8).map(|i| crusher.process(i as f32 * 0.1, 0.0).0).collect();
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[1], outputs[2]);
        assert_ne!(outputs[3], outputs[2]);
    }

    #[test]
    fn bit_depth_is_clamped() {
        assert_eq!(Bitcrusher::new(0.0).bits(), 1.0);
        assert_eq!(Bitcrusher::new(40.0).bits(), 16.0);
        assert_eq!(Bitcrusher::new(f64::NAN).bits(), 16.0);
    }
}
