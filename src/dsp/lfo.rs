//! Low-frequency modulators.
//!
//! An LFO never produces audio. The graph adds its output to a parameter of
//! some other node, so `min`/`max` are offsets around that parameter's base
//! value (e.g. `-300.0..300.0` Hz on a filter cutoff).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Lfo {
    pub shape: LfoShape,
    pub min: f64,
    pub max: f64,
    phase: f64,
    phase_inc: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(frequency: f64, min: f64, max: f64, sample_rate: f64) -> Self {
        let mut lfo = Lfo {
            shape: LfoShape::Sine,
            min,
            max,
            phase: 0.0,
            phase_inc: 0.0,
            sample_rate,
        };
        lfo.set_frequency(frequency);
        lfo
    }

    /// Start the cycle at `phase` (0.0–1.0) so sibling LFOs drift apart.
    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase.rem_euclid(1.0);
        self
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.phase_inc = frequency.max(0.0) / self.sample_rate;
    }

    pub fn frequency(&self) -> f64 {
        self.phase_inc * self.sample_rate
    }

    /// Next modulation value, within `[min, max]`.
    #[inline]
    pub fn next_value(&mut self) -> f64 {
        let bipolar = match self.shape {
            LfoShape::Sine => (2.0 * PI * self.phase).sin(),
            LfoShape::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
        };
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.min + (bipolar + 1.0) * 0.5 * (self.max - self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_one_cycle_per_period() {
        let mut lfo = Lfo::new(1.0, -1.0, 1.0, 1000.0);
        for _ in 0..1000 {
            lfo.next_value();
        }
        let phase_error = lfo.phase.min((lfo.phase - 1.0).abs());
        assert!(phase_error < 1e-6);
    }

    #[test]
    fn output_spans_range() {
        for shape in [LfoShape::Sine, LfoShape::Triangle] {
            let mut lfo = Lfo::new(5.0, -300.0, 300.0, 1000.0);
            lfo.shape = shape;
            let values: Vec<f64> = (0..1000).map(|_| lfo.next_value()).collect();
            let lo = values.iter().cloned().fold(f64::MAX, f64::min);
            let hi = values.iter().cloned().fold(f64::MIN, f64::max);
            assert!(lo >= -300.0 - 1e-9 && hi <= 300.0 + 1e-9, "{shape:?} escaped range");
            assert!(lo < -290.0 && hi > 290.0, "{shape:?} did not sweep: {lo}..{hi}");
        }
    }

    #[test]
    fn phase_offset_changes_start_value() {
        let mut a = Lfo::new(0.1, 0.0, 1.0, 100.0);
        let mut b = Lfo::new(0.1, 0.0, 1.0, 100.0).with_phase(0.25);
        assert!((a.next_value() - 0.5).abs() < 1e-9);
        assert!((b.next_value() - 1.0).abs() < 1e-9);
    }
}
