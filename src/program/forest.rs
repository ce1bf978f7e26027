//! Forest: wind and leaves under birdsong on staggered prime intervals.

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
use crate::graph::{db_to_gain, Node, Param, ParamRef};
use crate::profile::{check_positive, check_probability, notes_to_frequencies, ProfileConfig};
use crate::time::TimeSpec;

pub(super) const TAG: &str = "forest";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForestConfig {
    pub volume: f64,
    pub bird_notes: Vec<String>,
    /// One bird per interval, seconds.
    pub bird_intervals: Vec<f64>,
    pub bird_probability: f64,
    pub bird_offset: f64,
    pub leaves_offset: f64,
    pub insects: bool,
    pub insect_interval: TimeSpec,
    pub insect_offset: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            volume: -20.0,
            bird_notes: ["E5", "G5", "A5", "C6", "D6", "E6"].map(String::from).to_vec(),
            bird_intervals: vec![7.0, 11.0, 13.0],
            bird_probability: 0.6,
            bird_offset: -4.0,
            leaves_offset: -16.0,
            insects: true,
            insect_interval: TimeSpec::seconds(5.0),
            insect_offset: -22.0,
            reverb_decay: 2.5,
            reverb_mix: 0.35,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForestProgram {
    config: ForestConfig,
    notes: Vec<f64>,
}

impl ForestProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: ForestConfig = config.parse()?;
        let notes = notes_to_frequencies(TAG, &parsed.bird_notes)?;
        for &interval in &parsed.bird_intervals {
            check_positive(TAG, "birdIntervals", interval)?;
        }
        check_probability(TAG, "birdProbability", parsed.bird_probability)?;
        Ok(ForestProgram {
            config: parsed,
            notes,
        })
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            highpass: Some(100.0),
            delay: Some(DelaySpec {
                time: TimeSpec::seconds(0.31),
                feedback: 0.25,
                mix: 0.2,
            }),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();

        let seed = b.seed();
        let wind = b.add_path(
            vec![
                Node::noise(NoiseColor::Pink, seed),
                Node::filter(FilterType::Lowpass, 600.0, 0.8, sr),
                Node::gain_db(c.volume),
            ],
            chain.connect,
        )?;
        b.lfo(0.04, -300.0, 300.0, &[ParamRef::new(wind[1], Param::Cutoff)])?;

        let seed = b.seed();
        let leaves = b.add_path(
            vec![
                Node::noise(NoiseColor::White, seed),
                Node::filter(FilterType::Bandpass, 5000.0, 0.9, sr),
                Node::gain_db(layer_db(c.volume, c.leaves_offset)),
            ],
            chain.connect,
        )?;
        let rustle = db_to_gain(layer_db(c.volume, c.leaves_offset)) * 0.8;
        b.lfo(0.11, -rustle, rustle, &[ParamRef::new(leaves[2], Param::Gain)])?;

        // Echoes pass through the delay before the reverb.
        let to_echo = chain.delay_entry.unwrap_or(chain.reverb_entry);
        let birds = b.add_path(
            vec![
                Node::tone_voices(Waveform::Sine, Adsr::new(0.01, 0.06, 0.3, 0.12), 8, sr),
                Node::gain_db(layer_db(c.volume, c.bird_offset)),
            ],
            to_echo,
        )?[0];

        let humanize = Humanize::default();
        for (i, &interval) in c.bird_intervals.iter().enumerate() {
            let notes = self.notes.clone();
            let mut walk = GoldenWalk::random(notes.len(), b.rng());
            let p = c.bird_probability;
            b.schedule(
                TimeSpec::seconds(interval),
                TimeSpec::seconds(1.0 + i as f64 * 1.5),
                move |tick| {
                    if !chance(tick.rng, p) {
                        return;
                    }
                    // A short phrase of one to three chirps.
                    let chirps = tick.rng.gen_range(1..=3);
                    for n in 0..chirps {
                        let Some(&frequency) = walk.pick(&notes) else { return };
                        let event = NoteEvent {
                            time: tick.time + n as f64 * 0.11,
                            frequency,
                            duration: 0.07,
                            velocity: 0.6,
                        };
                        let event = humanize.apply(event, tick.rng);
                        tick.graph.trigger(birds, event);
                    }
                },
            )?;
        }

        if c.insects {
            let insects = b.add_path(
                vec![
                    Node::tone_voices(Waveform::Triangle, Adsr::new(0.005, 0.02, 0.6, 0.03), 4, sr),
                    Node::filter(FilterType::Highpass, 3000.0, 0.7, sr),
                    Node::gain_db(layer_db(c.volume, c.insect_offset)),
                ],
                chain.connect,
            )?[0];
            b.schedule(c.insect_interval, TimeSpec::seconds(2.0), move |tick| {
                if !chance(tick.rng, 0.5) {
                    return;
                }
                let pitch = tick.rng.gen_range(4200.0..5200.0);
                for n in 0..6 {
                    tick.graph.trigger(
                        insects,
                        NoteEvent {
                            time: tick.time + n as f64 * 0.06,
                            frequency: pitch,
                            duration: 0.03,
                            velocity: 0.4,
                        },
                    );
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn one_bird_per_interval() {
        let mut rig = Rig::new();
        let config = ProfileConfig::new(TAG)
            .with("birdIntervals", vec![5.0, 7.0, 11.0, 13.0])
            .with("insects", false);
        let program = rig.start(config).await.unwrap();
        assert_eq!(program.loops().len(), 4);
        let periods: Vec<f64> = program
            .loops()
            .iter()
            .map(|&id| rig.transport.loop_info(id).unwrap().interval)
            .collect();
        assert_eq!(periods, vec![5.0, 7.0, 11.0, 13.0]);

        let mut rig = Rig::new();
        let with_insects = rig.start(ProfileConfig::new(TAG)).await.unwrap();
        assert_eq!(with_insects.loops().len(), 4);
    }

    #[test]
    fn rejects_bad_notes() {
        let config = ProfileConfig::new(TAG).with("birdNotes", vec!["E5", "Q9"]);
        assert!(matches!(
            ForestProgram::from_config(&config),
            Err(EngineError::InvalidConfig { .. })
        ));
    }
}
