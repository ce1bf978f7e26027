//! ADSR Envelope generator.

use serde::{Deserialize, Serialize};

/// Declarative ADSR shape, in seconds (sustain is a level in [0, 1]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

impl Adsr {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// A percussive shape: no sustain, the decay carries the whole tail.
    pub const fn percussive(attack: f64, decay: f64) -> Self {
        Adsr::new(attack, decay, 0.0, decay)
    }
}

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR Envelope with linear attack/decay/release curves.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub shape: Adsr,

    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage (for retrigger and release).
    start_level: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_shape(Adsr::default(), sample_rate)
    }

    pub fn with_shape(shape: Adsr, sample_rate: f64) -> Self {
        Envelope {
            shape,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        }
    }

    fn samples(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate) as usize
    }

    /// Trigger the envelope (note on).
    pub fn gate_on(&mut self) {
        self.stage = Stage::Attack;
        self.stage_samples = self.samples(self.shape.attack);
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Release the envelope (note off).
    pub fn gate_off(&mut self) {
        if self.stage == Stage::Idle || self.stage == Stage::Release {
            return;
        }
        self.stage = Stage::Release;
        self.stage_samples = self.samples(self.shape.release);
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Generate the next envelope sample [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.stage_samples == 0 {
                    self.level = 1.0;
                    self.enter_decay();
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level + (1.0 - self.start_level) * t;
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = 1.0;
                        self.enter_decay();
                    }
                }
            }
            Stage::Decay => {
                let sustain = self.shape.sustain;
                if self.stage_samples == 0 {
                    self.level = sustain;
                    self.enter_sustain();
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = 1.0 - (1.0 - sustain) * t;
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = sustain;
                        self.enter_sustain();
                    }
                }
            }
            Stage::Sustain => {
                self.level = self.shape.sustain;
            }
            Stage::Release => {
                if self.stage_samples == 0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level * (1.0 - t);
                    self.stage_counter += 1;
                    if self.stage_counter >= self.stage_samples {
                        self.level = 0.0;
                        self.stage = Stage::Idle;
                    }
                }
            }
        }
        self.level
    }

    /// Returns true if the envelope has finished (idle after release).
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    /// Drop straight to silence without a release tail.
    pub fn kill(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
    }

    fn enter_decay(&mut self) {
        self.stage = Stage::Decay;
        self.stage_samples = self.samples(self.shape.decay);
        self.stage_counter = 0;
    }

    // A zero sustain level means the decay already finished the note.
    fn enter_sustain(&mut self) {
        if self.shape.sustain <= 0.0 {
            self.level = 0.0;
            self.stage = Stage::Idle;
        } else {
            self.stage = Stage::Sustain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let env = Envelope::new(44100.0);
        assert!(env.is_finished());
    }

    #[test]
    fn attack_reaches_one() {
        let mut env = Envelope::with_shape(Adsr::new(0.01, 0.1, 0.7, 0.3), 44100.0);
        env.gate_on();

        let max_level = (0..500).map(|_| env.next_sample()).fold(0.0, f64::max);
        assert!(
            (max_level - 1.0).abs() < 0.01,
            "Attack should reach ~1.0, got {max_level}"
        );
    }

    #[test]
    fn sustain_holds_then_release_to_zero() {
        let mut env = Envelope::with_shape(Adsr::new(0.001, 0.001, 0.6, 0.01), 44100.0);
        env.gate_on();
        for _ in 0..500 {
            env.next_sample();
        }
        let s = env.next_sample();
        assert!((s - 0.6).abs() < 0.01, "Should sustain at 0.6, got {s}");

        env.gate_off();
        for _ in 0..1000 {
            env.next_sample();
        }
        assert!(env.is_finished(), "Should be finished after release");
        assert!(env.level.abs() < 0.001);
    }

    #[test]
    fn percussive_shape_finishes_without_gate_off() {
        let mut env = Envelope::with_shape(Adsr::percussive(0.001, 0.02), 44100.0);
        env.gate_on();
        for _ in 0..2000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s));
        }
        assert!(env.is_finished(), "Zero-sustain envelope should self-terminate");
    }

    #[test]
    fn kill_silences_immediately() {
        let mut env = Envelope::new(44100.0);
        env.gate_on();
        for _ in 0..100 {
            env.next_sample();
        }
        env.kill();
        assert!(env.is_finished());
        assert_eq!(env.next_sample(), 0.0);
    }

    #[test]
    fn shape_deserializes_with_defaults() {
        let shape: Adsr = serde_json::from_str(r#"{ "attack": 2.0 }"#).unwrap();
        assert_eq!(shape.attack, 2.0);
        assert_eq!(shape.sustain, Adsr::default().sustain);
    }
}
