//! Rain: a filtered pink bed, hiss texture, gated drops and optional thunder.

use rand::Rng;
use serde::Deserialize;

use super::ProgramBuilder;
use crate::chain::{ChainHandle, ChainOptions};
use crate::dsp::envelope::Adsr;
use crate::dsp::filter::FilterType;
use crate::dsp::noise::NoiseColor;
use crate::dsp::voice::NoteEvent;
use crate::error::EngineError;
use crate::generative::{chance, layer_db, Humanize};
use crate::graph::{Node, Param, ParamRef};
use crate::profile::{check_positive, check_probability, ProfileConfig};
use crate::time::TimeSpec;

pub(super) const TAG: &str = "rain";

/// Heavy drops sound at this fraction of the drop probability.
const HEAVY_SCALE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RainConfig {
    pub volume: f64,
    /// Bed lowpass, swept by a slow LFO.
    pub bed_cutoff: f64,
    pub texture_offset: f64,
    pub drop_interval: TimeSpec,
    pub drop_probability: f64,
    pub drop_offset: f64,
    pub thunder: bool,
    pub thunder_interval: TimeSpec,
    pub thunder_probability: f64,
    pub thunder_offset: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for RainConfig {
    fn default() -> Self {
        RainConfig {
            volume: -16.0,
            bed_cutoff: 2500.0,
            texture_offset: -14.0,
            drop_interval: TimeSpec::seconds(0.2),
            drop_probability: 0.35,
            drop_offset: -6.0,
            thunder: false,
            thunder_interval: TimeSpec::seconds(13.0),
            thunder_probability: 0.3,
            thunder_offset: -2.0,
            reverb_decay: 3.0,
            reverb_mix: 0.35,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RainProgram {
    config: RainConfig,
}

impl RainProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: RainConfig = config.parse()?;
        check_positive(TAG, "bedCutoff", parsed.bed_cutoff)?;
        check_probability(TAG, "dropProbability", parsed.drop_probability)?;
        check_probability(TAG, "thunderProbability", parsed.thunder_probability)?;
        Ok(RainProgram { config: parsed })
    }

    pub fn config(&self) -> &RainConfig {
        &self.config
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            highpass: Some(60.0),
            lowpass: Some(9000.0),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();

        // Bed with a wandering cutoff.
        let seed = b.seed();
        let bed = b.add_path(
            vec![
                Node::noise(NoiseColor::Pink, seed),
                Node::filter(FilterType::Lowpass, c.bed_cutoff, 0.7, sr),
                Node::gain_db(c.volume),
            ],
            chain.connect,
        )?;
        let sweep = c.bed_cutoff * 0.25;
        b.lfo(0.07, -sweep, sweep, &[ParamRef::new(bed[1], Param::Cutoff)])?;

        let seed = b.seed();
        b.add_path(
            vec![
                Node::noise(NoiseColor::White, seed),
                Node::filter(FilterType::Bandpass, 4000.0, 0.8, sr),
                Node::gain_db(layer_db(c.volume, c.texture_offset)),
            ],
            chain.connect,
        )?;

        // Drops: light ones at p, heavy ones at p * 0.3, drawn independently.
        let seed = b.seed();
        let light = b.add_path(
            vec![
                Node::noise_voices(NoiseColor::White, Adsr::percussive(0.001, 0.03), seed, sr),
                Node::filter(FilterType::Highpass, 2000.0, 0.7, sr),
                Node::gain_db(layer_db(c.volume, c.drop_offset)),
            ],
            chain.reverb_entry,
        )?[0];
        let seed = b.seed();
        let heavy = b.add_path(
            vec![
                Node::noise_voices(NoiseColor::Pink, Adsr::percussive(0.002, 0.12), seed, sr),
                Node::gain_db(layer_db(c.volume, c.drop_offset + 3.0)),
            ],
            chain.reverb_entry,
        )?[0];

        let p = c.drop_probability;
        let humanize = Humanize {
            timing: 0.04,
            velocity: 0.3,
        };
        b.schedule(c.drop_interval, TimeSpec::seconds(0.0), move |tick| {
            if chance(tick.rng, p) {
                let velocity = tick.rng.gen_range(0.3..0.8);
                let event = NoteEvent {
                    time: tick.time,
                    frequency: 0.0,
                    duration: 0.03,
                    velocity,
                };
                let event = humanize.apply(event, tick.rng);
                tick.graph.trigger(light, event);
            }
            if chance(tick.rng, p * HEAVY_SCALE) {
                let event = NoteEvent {
                    time: tick.time,
                    frequency: 0.0,
                    duration: 0.12,
                    velocity: 0.9,
                };
                let event = humanize.apply(event, tick.rng);
                tick.graph.trigger(heavy, event);
            }
        })?;

        if c.thunder {
            self.build_thunder(b, chain)?;
        }
        Ok(())
    }

    /// Exactly three nodes and one loop.
    fn build_thunder(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();
        let seed = b.seed();
        let rumble = b.add_path(
            vec![
                Node::noise_voices(NoiseColor::Brown, Adsr::percussive(0.6, 4.0), seed, sr),
                Node::filter(FilterType::Lowpass, 300.0, 0.9, sr),
                Node::gain_db(layer_db(c.volume, c.thunder_offset)),
            ],
            chain.reverb_entry,
        )?[0];

        let p = c.thunder_probability;
        b.schedule(c.thunder_interval, TimeSpec::seconds(5.0), move |tick| {
            if chance(tick.rng, p) {
                let velocity = tick.rng.gen_range(0.5..1.0);
                tick.graph.trigger(
                    rumble,
                    NoteEvent {
                        time: tick.time,
                        frequency: 0.0,
                        duration: 4.0,
                        velocity,
                    },
                );
            }
        })?;
        Ok(())
    }
}
