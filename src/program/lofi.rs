//! Lo-fi: a slow chord loop through a bit-reduced, tape-wobbled chain.

use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;

use super::ProgramBuilder;
use crate::chain::{ChainHandle, ChainOptions, DelaySpec};
use crate::dsp::envelope::Adsr;
use crate::dsp::filter::FilterType;
use crate::dsp::noise::NoiseColor;
use crate::dsp::oscillator::Waveform;
use crate::dsp::voice::NoteEvent;
use crate::error::EngineError;
use crate::generative::{chance, layer_db, GoldenWalk, Humanize};
use crate::graph::{Node, Param, ParamRef};
use crate::profile::{check_positive, check_probability, notes_to_frequencies, ProfileConfig};
use crate::time::{Modifier, TimeSpec, Unit};

pub(super) const TAG: &str = "lofi";

const KICK_HZ: f64 = 55.0;
const OFFBEAT_KICK_SCALE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LofiConfig {
    pub volume: f64,
    pub bpm: f64,
    pub chords: Vec<Vec<String>>,
    pub hat_probability: f64,
    pub hat_offset: f64,
    pub kick_probability: f64,
    pub kick_offset: f64,
    /// Vinyl crackle and tape hiss.
    pub crackle: bool,
    pub crackle_offset: f64,
    pub bit_depth: f64,
    pub delay: DelaySpec,
    /// Tape wow depth on the keys, cents.
    pub wow: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for LofiConfig {
    fn default() -> Self {
        let chord = |notes: [&str; 4]| notes.map(String::from).to_vec();
        LofiConfig {
            volume: -18.0,
            bpm: 72.0,
            chords: vec![
                chord(["D3", "F3", "A3", "C4"]),
                chord(["G3", "B3", "D4", "F4"]),
                chord(["C3", "E3", "G3", "B3"]),
                chord(["A2", "C3", "E3", "G3"]),
            ],
            hat_probability: 0.7,
            hat_offset: -14.0,
            kick_probability: 0.9,
            kick_offset: -3.0,
            crackle: true,
            crackle_offset: -24.0,
            bit_depth: 8.0,
            delay: DelaySpec {
                time: TimeSpec::Notation {
                    count: 8,
                    unit: Unit::Note,
                    modifier: Modifier::Dotted,
                },
                feedback: 0.3,
                mix: 0.2,
            },
            wow: 12.0,
            reverb_decay: 1.8,
            reverb_mix: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LofiProgram {
    config: LofiConfig,
    chords: Arc<Vec<Vec<f64>>>,
}

impl LofiProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: LofiConfig = config.parse()?;
        check_positive(TAG, "bpm", parsed.bpm)?;
        check_probability(TAG, "hatProbability", parsed.hat_probability)?;
        check_probability(TAG, "kickProbability", parsed.kick_probability)?;
        if parsed.chords.is_empty() {
            return Err(EngineError::invalid_config(TAG, "chords must not be empty"));
        }
        let chords = parsed
            .chords
            .iter()
            .map(|chord| notes_to_frequencies(TAG, chord))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LofiProgram {
            config: parsed,
            chords: Arc::new(chords),
        })
    }

    pub fn config(&self) -> &LofiConfig {
        &self.config
    }

    pub(super) fn bpm(&self) -> f64 {
        self.config.bpm
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            delay: Some(self.config.delay),
            highpass: Some(40.0),
            lowpass: Some(4500.0),
            bit_depth: Some(self.config.bit_depth),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();
        let bar = TimeSpec::measures(1);

        // Keys: one chord per bar, wobbling through the delay.
        let keys_in = chain.delay_entry.unwrap_or(chain.reverb_entry);
        let keys = b.add_path(
            vec![
                Node::tone_voices(Waveform::Triangle, Adsr::new(0.02, 0.6, 0.5, 0.8), 8, sr),
                Node::gain_db(c.volume),
            ],
            keys_in,
        )?[0];
        b.lfo(0.5, -c.wow, c.wow, &[ParamRef::new(keys, Param::Detune)])?;

        let chords = Arc::clone(&self.chords);
        let mut walk = GoldenWalk::random(chords.len(), b.rng());
        b.schedule(bar, TimeSpec::seconds(0.0), move |tick| {
            let Some(chord) = walk.pick(&chords) else { return };
            let duration = tick.seconds(bar) * 0.9;
            // Strum upward.
            for (i, &frequency) in chord.iter().enumerate() {
                let velocity = tick.rng.gen_range(0.4..0.6);
                tick.graph.trigger(
                    keys,
                    NoteEvent {
                        time: tick.time + i as f64 * 0.015,
                        frequency,
                        duration,
                        velocity,
                    },
                );
            }
        })?;

        let seed = b.seed();
        let hats = b.add_path(
            vec![
                Node::noise_voices(NoiseColor::White, Adsr::percussive(0.001, 0.04), seed, sr),
                Node::filter(FilterType::Highpass, 7000.0, 0.7, sr),
                Node::gain_db(layer_db(c.volume, c.hat_offset)),
            ],
            chain.connect,
        )?[0];
        let hat_p = c.hat_probability;
        let swing = Humanize {
            timing: 0.015,
            velocity: 0.15,
        };
        b.schedule(TimeSpec::notes(8), TimeSpec::seconds(0.0), move |tick| {
            if chance(tick.rng, hat_p) {
                let event = NoteEvent {
                    time: tick.time,
                    frequency: 0.0,
                    duration: 0.04,
                    velocity: 0.5,
                };
                let event = swing.apply(event, tick.rng);
                tick.graph.trigger(hats, event);
            }
        })?;

        let kick = b.add_path(
            vec![
                Node::tone_voices(Waveform::Sine, Adsr::percussive(0.002, 0.25), 2, sr),
                Node::gain_db(layer_db(c.volume, c.kick_offset)),
            ],
            chain.connect,
        )?[0];
        let kick_p = c.kick_probability;
        let mut beat = 0u32;
        b.schedule(TimeSpec::notes(4), TimeSpec::seconds(0.0), move |tick| {
            // One and three carry the kick, two and four only rarely.
            let downbeat = beat % 2 == 0;
            beat = beat.wrapping_add(1);
            let p = if downbeat { kick_p } else { kick_p * OFFBEAT_KICK_SCALE };
            if chance(tick.rng, p) {
                tick.graph.trigger(
                    kick,
                    NoteEvent {
                        time: tick.time,
                        frequency: KICK_HZ,
                        duration: 0.25,
                        velocity: 0.9,
                    },
                );
            }
        })?;

        if c.crackle {
            let level = layer_db(c.volume, c.crackle_offset);
            let seed = b.seed();
            b.add_path(
                vec![
                    Node::noise(NoiseColor::Pink, seed),
                    Node::filter(FilterType::Highpass, 3000.0, 0.7, sr),
                    Node::gain_db(level - 6.0),
                ],
                chain.connect,
            )?;
            let seed = b.seed();
            let pops = b.add_path(
                vec![
                    Node::noise_voices(NoiseColor::White, Adsr::percussive(0.0005, 0.006), seed, sr),
                    Node::gain_db(level),
                ],
                chain.connect,
            )?[0];
            b.schedule(TimeSpec::notes(16), TimeSpec::seconds(0.0), move |tick| {
                if chance(tick.rng, 0.25) {
                    let offset = tick.rng.gen_range(0.0..0.05);
                    let velocity = tick.rng.gen_range(0.2..1.0);
                    tick.graph.trigger(
                        pops,
                        NoteEvent {
                            time: tick.time + offset,
                            frequency: 0.0,
                            duration: 0.006,
                            velocity,
                        },
                    );
                }
            })?;
        }
        Ok(())
    }
}
