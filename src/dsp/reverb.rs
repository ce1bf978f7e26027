//! Reverb: Schroeder/Freeverb-style network tuned by decay time.
//!
//! Parallel damped comb filters feed series allpass filters. Instead of a
//! room-size knob, every comb's feedback is solved from the requested decay
//! (RT60) so a 4 s tail really falls by 60 dB in about 4 s. Building the
//! network allocates several seconds' worth of delay lines, so it happens in
//! [`Reverb::generate`], which yields between channels.

use crate::error::EngineError;

/// A comb filter delay line with damped feedback.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp1: f32,
    damp2: f32,
    filterstore: f32,
}

impl CombFilter {
    fn new(size: usize, feedback: f32, damp: f32) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback,
            damp1: damp,
            damp2: 1.0 - damp,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;
        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

/// An allpass filter delay line.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    const FEEDBACK: f32 = 0.5;

    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;
        self.buffer[self.index] = input + bufout * Self::FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

// Tuning constants (scaled for 44100 Hz sample rate)
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const DAMPING: f32 = 0.2;
/// Longest tail the generator accepts, in seconds.
pub const MAX_DECAY: f64 = 60.0;

#[derive(Debug, Clone)]
struct Channel {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Channel {
    fn build(decay: f64, sample_rate: f64, spread: usize) -> Self {
        let scale = sample_rate / 44100.0;
        let combs = COMB_TUNING
            .iter()
            .map(|&t| {
                let size = ((t + spread) as f64 * scale) as usize;
                CombFilter::new(size, comb_feedback(size, decay, sample_rate), DAMPING)
            })
            .collect();
        let allpasses = ALLPASS_TUNING
            .iter()
            .map(|&t| AllpassFilter::new(((t + spread) as f64 * scale) as usize))
            .collect();
        Channel { combs, allpasses }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut out: f32 = self.combs.iter_mut().map(|c| c.process(input)).sum();
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

/// Feedback that makes a comb of `size` samples decay 60 dB in `decay` seconds.
fn comb_feedback(size: usize, decay: f64, sample_rate: f64) -> f32 {
    let loop_seconds = size as f64 / sample_rate;
    (10.0_f64.powf(-3.0 * loop_seconds / decay)).min(0.98) as f32
}

/// A stereo algorithmic reverb.
#[derive(Debug, Clone)]
pub struct Reverb {
    left: Channel,
    right: Channel,
    /// Decay (RT60) the network was generated for, in seconds.
    decay: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f64,
    /// Stereo width (0.0 to 1.0).
    pub width: f64,
    gain: f32,
}

impl Reverb {
    /// Generate the reverb network for a decay time.
    ///
    /// This is the one asynchronous step of chain construction. It fails for
    /// decays that are not finite, not positive, or longer than [`MAX_DECAY`].
    pub async fn generate(decay: f64, mix: f64, sample_rate: f64) -> Result<Self, EngineError> {
        if !decay.is_finite() || decay <= 0.0 || decay > MAX_DECAY {
            return Err(EngineError::GraphBuild(format!(
                "reverb decay must be within (0, {MAX_DECAY}] seconds, got {decay}"
            )));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EngineError::GraphBuild(format!(
                "invalid sample rate {sample_rate}"
            )));
        }

        let left = Channel::build(decay, sample_rate, 0);
        tokio::task::yield_now().await;
        let right = Channel::build(decay, sample_rate, STEREO_SPREAD);

        Ok(Reverb {
            left,
            right,
            decay,
            mix: mix.clamp(0.0, 1.0),
            width: 1.0,
            gain: 0.015,
        })
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// Process a stereo sample pair, returning the processed output.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * self.gain;
        let out_l = self.left.process(input);
        let out_r = self.right.process(input);

        let width = self.width as f32;
        let wet1 = width / 2.0 + 0.5;
        let wet2 = (1.0 - width) / 2.0;
        let wet_l = out_l * wet1 + out_r * wet2;
        let wet_r = out_r * wet1 + out_l * wet2;

        let mix = self.mix.clamp(0.0, 1.0) as f32;
        (
            left * (1.0 - mix) + wet_l * mix,
            right * (1.0 - mix) + wet_r * mix,
        )
    }
}
