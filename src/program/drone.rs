//! Drone: detuned pads walking a chord set, a sub line and sparse shimmer.

use std::sync::Arc;

use serde::Deserialize;

use super::ProgramBuilder;
use crate::chain::{ChainHandle, ChainOptions};
use crate::dsp::envelope::Adsr;
use crate::dsp::filter::FilterType;
use crate::dsp::oscillator::Waveform;
use crate::dsp::voice::NoteEvent;
use crate::error::EngineError;
use crate::generative::{chance, layer_db, GoldenWalk};
use crate::graph::{Node, Param, ParamRef};
use crate::profile::{check_positive, check_probability, notes_to_frequencies, ProfileConfig};
use crate::time::TimeSpec;

pub(super) const TAG: &str = "drone";

/// Shimmer sounds at this fraction of the chord probability.
const SHIMMER_SCALE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DroneConfig {
    pub volume: f64,
    pub bpm: f64,
    pub chords: Vec<Vec<String>>,
    pub chord_interval: TimeSpec,
    /// Chance that a chord tick sounds a new chord.
    pub probability: f64,
    /// Pad detune either side of pitch, cents.
    pub detune: f64,
    pub sub_offset: f64,
    pub shimmer_interval: TimeSpec,
    pub shimmer_offset: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for DroneConfig {
    fn default() -> Self {
        let chord = |notes: [&str; 3]| notes.map(String::from).to_vec();
        DroneConfig {
            volume: -22.0,
            bpm: 50.0,
            chords: vec![
                chord(["C3", "G3", "E4"]),
                chord(["A2", "E3", "C4"]),
                chord(["F2", "C3", "A3"]),
                chord(["G2", "D3", "B3"]),
            ],
            chord_interval: TimeSpec::measures(2),
            probability: 0.85,
            detune: 7.0,
            sub_offset: -4.0,
            shimmer_interval: TimeSpec::measures(1),
            shimmer_offset: -12.0,
            reverb_decay: 8.0,
            reverb_mix: 0.55,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DroneProgram {
    config: DroneConfig,
    chords: Arc<Vec<Vec<f64>>>,
}

impl DroneProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: DroneConfig = config.parse()?;
        check_positive(TAG, "bpm", parsed.bpm)?;
        check_probability(TAG, "probability", parsed.probability)?;
        if parsed.chords.is_empty() {
            return Err(EngineError::invalid_config(TAG, "chords must not be empty"));
        }
        let chords = parsed
            .chords
            .iter()
            .map(|chord| notes_to_frequencies(TAG, chord))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DroneProgram {
            config: parsed,
            chords: Arc::new(chords),
        })
    }

    pub fn config(&self) -> &DroneConfig {
        &self.config
    }

    pub(super) fn bpm(&self) -> f64 {
        self.config.bpm
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            lowpass: Some(2400.0),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();
        let pad_shape = Adsr::new(2.5, 1.0, 0.8, 4.0);

        // Two saw pools detuned apart share one swept lowpass.
        let pad_filter = b.add_path(
            vec![
                Node::filter(FilterType::Lowpass, 900.0, 0.8, sr),
                Node::gain_db(c.volume),
            ],
            chain.reverb_entry,
        )?[0];
        let pad_a = b.add_into(
            Node::tone_voices(Waveform::Sawtooth, pad_shape, 6, sr).with_param(Param::Detune, -c.detune),
            pad_filter,
        )?;
        let pad_b = b.add_into(
            Node::tone_voices(Waveform::Sawtooth, pad_shape, 6, sr).with_param(Param::Detune, c.detune),
            pad_filter,
        )?;
        b.lfo(0.03, -300.0, 300.0, &[ParamRef::new(pad_filter, Param::Cutoff)])?;

        let root = self.chords[0].iter().copied().fold(f64::MAX, f64::min) / 2.0;
        let sub = b.add_path(
            vec![
                Node::oscillator(Waveform::Sine, root, sr),
                Node::gain_db(layer_db(c.volume, c.sub_offset)),
            ],
            chain.connect,
        )?[0];
        let sub_pitch = ParamRef::new(sub, Param::Frequency);
        b.lfo(0.05, -8.0, 8.0, &[ParamRef::new(sub, Param::Detune)])?;

        let chords = Arc::clone(&self.chords);
        let mut walk = GoldenWalk::random(chords.len(), b.rng());
        let p = c.probability;
        let interval = c.chord_interval;
        b.schedule(interval, TimeSpec::seconds(0.0), move |tick| {
            if !chance(tick.rng, p) {
                return;
            }
            let Some(chord) = walk.pick(&chords) else { return };
            let duration = tick.seconds(interval) * 0.95;
            for &frequency in chord {
                for pad in [pad_a, pad_b] {
                    tick.graph.trigger(
                        pad,
                        NoteEvent {
                            time: tick.time,
                            frequency,
                            duration,
                            velocity: 0.5,
                        },
                    );
                }
            }
            let low = chord.iter().copied().fold(f64::MAX, f64::min);
            tick.graph.set_param_at(sub_pitch, low / 2.0, tick.time);
        })?;

        let shimmer = b.add_path(
            vec![
                Node::tone_voices(Waveform::Triangle, Adsr::percussive(1.5, 3.0), 4, sr),
                Node::filter(FilterType::Highpass, 1500.0, 0.7, sr),
                Node::gain_db(layer_db(c.volume, c.shimmer_offset)),
            ],
            chain.reverb_entry,
        )?[0];
        let tones: Vec<f64> = self.chords.iter().flatten().map(|f| f * 2.0).collect();
        let mut sparkle = GoldenWalk::random(tones.len(), b.rng());
        let shimmer_p = p * SHIMMER_SCALE;
        b.schedule(c.shimmer_interval, TimeSpec::notes(4), move |tick| {
            if !chance(tick.rng, shimmer_p) {
                return;
            }
            if let Some(&frequency) = sparkle.pick(&tones) {
                tick.graph.trigger(
                    shimmer,
                    NoteEvent {
                        time: tick.time,
                        frequency,
                        duration: 3.0,
                        velocity: 0.4,
                    },
                );
            }
        })?;
        Ok(())
    }
}
