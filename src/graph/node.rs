//! Graph nodes: thin wrappers that bind a DSP primitive to the graph's
//! stereo frame format and its modulatable parameters.

use crate::dsp::bitcrusher::Bitcrusher;
use crate::dsp::delay::Delay;
use crate::dsp::envelope::Adsr;
use crate::dsp::filter::{BiquadFilter, FilterType};
use crate::dsp::lfo::Lfo;
use crate::dsp::limiter::Limiter;
use crate::dsp::noise::{NoiseColor, NoiseGenerator};
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::reverb::Reverb;
use crate::dsp::voice::{VoiceKind, VoicePool};

/// One stereo sample.
pub type Frame = [f64; 2];

/// A parameter that an LFO can be layered onto.
///
/// Modulation is additive: the node keeps its base value and adds the sum of
/// every connected modulator's current output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Hz, on oscillators.
    Frequency,
    /// Cents, on oscillators and voice pools.
    Detune,
    /// Linear gain, on gain stages.
    Gain,
    /// Balance in [-1, 1], on gain stages.
    Pan,
    /// Hz, on filters.
    Cutoff,
    /// Resonance, on filters.
    Q,
    /// Dry/wet, on reverb and delay.
    Mix,
    /// Seconds, on delay.
    DelayTime,
    /// Bit depth, on bitcrushers.
    Bits,
}

impl Param {
    pub(crate) const COUNT: usize = 9;

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Summed modulation per parameter for the current sample.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Modulation([f64; Param::COUNT]);

impl Modulation {
    pub(crate) fn add(&mut self, param: Param, value: f64) {
        self.0[param.index()] += value;
    }

    fn get(&self, param: Param) -> f64 {
        self.0[param.index()]
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    /// The shared output root. Only the graph creates it.
    Destination,
    Oscillator {
        osc: Oscillator,
        frequency: f64,
        detune: f64,
        running: bool,
    },
    Noise {
        noise: NoiseGenerator,
        running: bool,
    },
    Voices {
        pool: VoicePool,
        detune: f64,
    },
    Filter {
        left: BiquadFilter,
        right: BiquadFilter,
        cutoff: f64,
        q: f64,
    },
    Gain {
        gain: f64,
        pan: f64,
    },
    Lfo(Lfo),
    Reverb {
        reverb: Reverb,
        mix: f64,
    },
    Delay {
        delay: Delay,
        time: f64,
        mix: f64,
    },
    Bitcrusher {
        crusher: Bitcrusher,
        bits: f64,
    },
    Limiter(Limiter),
}

/// Convert decibels to linear gain.
pub fn db_to_gain(db: f64) -> f64 {
    if db <= -120.0 {
        0.0
    } else {
        10.0_f64.powf(db / 20.0)
    }
}

impl Node {
    pub fn oscillator(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Node::Oscillator {
            osc: Oscillator::with_frequency(waveform, frequency, sample_rate),
            frequency,
            detune: 0.0,
            running: true,
        }
    }

    pub fn noise(color: NoiseColor, seed: u32) -> Self {
        Node::Noise {
            noise: NoiseGenerator::new(color, seed),
            running: true,
        }
    }

    pub fn tone_voices(waveform: Waveform, shape: Adsr, max_voices: usize, sample_rate: f64) -> Self {
        Node::Voices {
            pool: VoicePool::new(VoiceKind::Tone { waveform }, shape, sample_rate)
                .with_max_voices(max_voices),
            detune: 0.0,
        }
    }

    pub fn noise_voices(color: NoiseColor, shape: Adsr, seed: u32, sample_rate: f64) -> Self {
        let mut pool = VoicePool::new(VoiceKind::Noise { color }, shape, sample_rate);
        pool.reseed(seed);
        Node::Voices { pool, detune: 0.0 }
    }

    pub fn filter(kind: FilterType, cutoff: f64, q: f64, sample_rate: f64) -> Self {
        Node::Filter {
            left: BiquadFilter::with_params(kind, cutoff, q, sample_rate),
            right: BiquadFilter::with_params(kind, cutoff, q, sample_rate),
            cutoff,
            q,
        }
    }

    /// A gain stage set in decibels.
    pub fn gain_db(db: f64) -> Self {
        Node::Gain {
            gain: db_to_gain(db),
            pan: 0.0,
        }
    }

    /// A gain stage set in decibels and balanced left (-1) to right (+1).
    pub fn panned_db(db: f64, pan: f64) -> Self {
        Node::Gain {
            gain: db_to_gain(db),
            pan: pan.clamp(-1.0, 1.0),
        }
    }

    pub fn lfo(frequency: f64, min: f64, max: f64, sample_rate: f64) -> Self {
        Node::Lfo(Lfo::new(frequency, min, max, sample_rate))
    }

    pub fn reverb(reverb: Reverb) -> Self {
        let mix = reverb.mix;
        Node::Reverb { reverb, mix }
    }

    pub fn delay(time: f64, feedback: f64, mix: f64, sample_rate: f64) -> Self {
        let max = (time * 2.0).max(1.0);
        Node::Delay {
            delay: Delay::with_params(sample_rate, max, time, feedback, mix),
            time,
            mix,
        }
    }

    pub fn bitcrusher(bits: f64) -> Self {
        Node::Bitcrusher {
            crusher: Bitcrusher::new(bits),
            bits,
        }
    }

    pub fn limiter(ceiling_db: f64, sample_rate: f64) -> Self {
        Node::Limiter(Limiter::new(sample_rate, ceiling_db))
    }

    /// Short name for logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Destination => "destination",
            Node::Oscillator { .. } => "oscillator",
            Node::Noise { .. } => "noise",
            Node::Voices { .. } => "voices",
            Node::Filter { .. } => "filter",
            Node::Gain { .. } => "gain",
            Node::Lfo(_) => "lfo",
            Node::Reverb { .. } => "reverb",
            Node::Delay { .. } => "delay",
            Node::Bitcrusher { .. } => "bitcrusher",
            Node::Limiter(_) => "limiter",
        }
    }

    /// Modulators only feed parameters, never audio inputs.
    pub fn is_modulator(&self) -> bool {
        matches!(self, Node::Lfo(_))
    }

    pub fn accepts(&self, param: Param) -> bool {
        matches!(
            (self, param),
            (Node::Oscillator { .. }, Param::Frequency | Param::Detune)
                | (Node::Voices { .. }, Param::Detune)
                | (Node::Gain { .. }, Param::Gain | Param::Pan)
                | (Node::Filter { .. }, Param::Cutoff | Param::Q)
                | (Node::Reverb { .. }, Param::Mix)
                | (Node::Delay { .. }, Param::Mix | Param::DelayTime)
                | (Node::Bitcrusher { .. }, Param::Bits)
        )
    }

    /// Base value of a parameter, before modulation.
    pub fn param_value(&self, param: Param) -> Option<f64> {
        match (self, param) {
            (Node::Oscillator { frequency, .. }, Param::Frequency) => Some(*frequency),
            (Node::Oscillator { detune, .. }, Param::Detune) => Some(*detune),
            (Node::Voices { detune, .. }, Param::Detune) => Some(*detune),
            (Node::Gain { gain, .. }, Param::Gain) => Some(*gain),
            (Node::Gain { pan, .. }, Param::Pan) => Some(*pan),
            (Node::Filter { cutoff, .. }, Param::Cutoff) => Some(*cutoff),
            (Node::Filter { q, .. }, Param::Q) => Some(*q),
            (Node::Reverb { mix, .. }, Param::Mix) => Some(*mix),
            (Node::Delay { mix, .. }, Param::Mix) => Some(*mix),
            (Node::Delay { time, .. }, Param::DelayTime) => Some(*time),
            (Node::Bitcrusher { bits, .. }, Param::Bits) => Some(*bits),
            _ => None,
        }
    }

    /// Overwrite a parameter's base value. Returns false if the node has no
    /// such parameter.
    pub fn set_param(&mut self, param: Param, value: f64) -> bool {
        let slot = match (self, param) {
            (Node::Oscillator { frequency, .. }, Param::Frequency) => frequency,
            (Node::Oscillator { detune, .. }, Param::Detune) => detune,
            (Node::Voices { detune, .. }, Param::Detune) => detune,
            (Node::Gain { gain, .. }, Param::Gain) => gain,
            (Node::Gain { pan, .. }, Param::Pan) => pan,
            (Node::Filter { cutoff, .. }, Param::Cutoff) => cutoff,
            (Node::Filter { q, .. }, Param::Q) => q,
            (Node::Reverb { mix, .. }, Param::Mix) => mix,
            (Node::Delay { mix, .. }, Param::Mix) => mix,
            (Node::Delay { time, .. }, Param::DelayTime) => time,
            (Node::Bitcrusher { bits, .. }, Param::Bits) => bits,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Builder-style [`Node::set_param`].
    pub fn with_param(mut self, param: Param, value: f64) -> Self {
        self.set_param(param, value);
        self
    }

    /// Whether a continuous source is currently producing sound.
    pub fn is_running(&self) -> bool {
        match self {
            Node::Oscillator { running, .. } | Node::Noise { running, .. } => *running,
            Node::Voices { pool, .. } => pool.active_len() + pool.pending_len() > 0,
            _ => false,
        }
    }

    /// Stop continuous sources and release held or queued notes. Buffers and
    /// effect state stay allocated.
    pub fn silence(&mut self) {
        match self {
            Node::Oscillator { running, .. } | Node::Noise { running, .. } => *running = false,
            Node::Voices { pool, .. } => pool.release_all(),
            _ => {}
        }
    }

    /// Render one frame.
    pub(crate) fn process(&mut self, input: Frame, modulation: &Modulation, clock: u64) -> Frame {
        match self {
            Node::Destination => input,
            Node::Oscillator {
                osc,
                frequency,
                detune,
                running,
            } => {
                if !*running {
                    return [0.0; 2];
                }
                osc.frequency = *frequency + modulation.get(Param::Frequency);
                osc.detune = *detune + modulation.get(Param::Detune);
                let s = osc.next_sample();
                [s, s]
            }
            Node::Noise { noise, running } => {
                if !*running {
                    return [0.0; 2];
                }
                let s = noise.next_sample();
                [s, s]
            }
            Node::Voices { pool, detune } => {
                let s = pool.next_sample(clock, *detune + modulation.get(Param::Detune));
                [s, s]
            }
            Node::Filter {
                left,
                right,
                cutoff,
                q,
            } => {
                let cutoff = *cutoff + modulation.get(Param::Cutoff);
                let q = *q + modulation.get(Param::Q);
                for f in [&mut *left, &mut *right] {
                    f.set_frequency(cutoff);
                    f.set_q(q);
                }
                [left.process(input[0]), right.process(input[1])]
            }
            Node::Gain { gain, pan } => {
                let g = (*gain + modulation.get(Param::Gain)).max(0.0);
                let p = (*pan + modulation.get(Param::Pan)).clamp(-1.0, 1.0);
                [input[0] * g * (1.0 - p).min(1.0), input[1] * g * (1.0 + p).min(1.0)]
            }
            Node::Lfo(lfo) => {
                let v = lfo.next_value();
                [v, v]
            }
            Node::Reverb { reverb, mix } => {
                reverb.mix = (*mix + modulation.get(Param::Mix)).clamp(0.0, 1.0);
                let (l, r) = reverb.process(input[0] as f32, input[1] as f32);
                [l as f64, r as f64]
            }
            Node::Delay { delay, time, mix } => {
                delay.delay_time = (*time + modulation.get(Param::DelayTime)).max(0.0);
                delay.mix = (*mix + modulation.get(Param::Mix)).clamp(0.0, 1.0);
                let (l, r) = delay.process(input[0] as f32, input[1] as f32);
                [l as f64, r as f64]
            }
            Node::Bitcrusher { crusher, bits } => {
                crusher.set_bits(*bits + modulation.get(Param::Bits));
                let (l, r) = crusher.process(input[0] as f32, input[1] as f32);
                [l as f64, r as f64]
            }
            Node::Limiter(limiter) => {
                let (l, r) = limiter.process(input[0] as f32, input[1] as f32);
                [l as f64, r as f64]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_conversion() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 1e-3);
        assert_eq!(db_to_gain(-200.0), 0.0);
    }

    #[test]
    fn gain_balance_moves_signal_between_channels() {
        let mut hard_left = Node::panned_db(0.0, -1.0);
        let out = hard_left.process([0.5, 0.5], &Modulation::default(), 0);
        assert_eq!(out, [0.5, 0.0]);

        let mut centered = Node::gain_db(0.0);
        let out = centered.process([0.5, 0.5], &Modulation::default(), 0);
        assert_eq!(out, [0.5, 0.5]);
    }

    #[test]
    fn modulation_is_layered_on_base_value() {
        let mut gain = Node::gain_db(0.0);
        let mut m = Modulation::default();
        m.add(Param::Gain, -0.5);
        let out = gain.process([1.0, 1.0], &m, 0);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert_eq!(gain.param_value(Param::Gain), Some(1.0), "base value is untouched");
    }

    #[test]
    fn silence_stops_sources_but_not_effects() {
        let mut osc = Node::oscillator(Waveform::Sine, 220.0, 44100.0);
        assert!(osc.is_running());
        osc.silence();
        assert!(!osc.is_running());
        assert_eq!(osc.process([0.0; 2], &Modulation::default(), 0), [0.0, 0.0]);

        let mut filter = Node::filter(FilterType::Lowpass, 5000.0, 0.7, 44100.0);
        filter.silence();
        let out = filter.process([1.0, 1.0], &Modulation::default(), 0);
        assert!(out[0] > 0.0);
    }

    #[test]
    fn params_are_validated_per_kind() {
        let mut osc = Node::oscillator(Waveform::Sine, 220.0, 44100.0);
        assert!(osc.accepts(Param::Frequency));
        assert!(!osc.accepts(Param::Cutoff));
        assert!(osc.set_param(Param::Frequency, 330.0));
        assert_eq!(osc.param_value(Param::Frequency), Some(330.0));
        assert!(!osc.set_param(Param::Mix, 0.5));
    }
}
