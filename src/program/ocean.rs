//! Ocean: swelling brown surf, a low undertow, breaking waves and foam.

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
use crate::graph::{db_to_gain, Node, Param, ParamRef};
use crate::profile::{check_positive, check_probability, ProfileConfig};
use crate::time::TimeSpec;

pub(super) const TAG: &str = "ocean";

/// Crashes trail the swell phase by up to this many seconds.
const CRASH_LAG: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OceanConfig {
    pub volume: f64,
    /// Seconds per swell; waves break once per swell.
    pub swell_period: f64,
    pub crash_probability: f64,
    pub crash_offset: f64,
    pub foam_interval: TimeSpec,
    pub foam_probability: f64,
    pub foam_offset: f64,
    pub undertow_offset: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for OceanConfig {
    fn default() -> Self {
        OceanConfig {
            volume: -16.0,
            swell_period: 11.0,
            crash_probability: 0.7,
            crash_offset: -4.0,
            foam_interval: TimeSpec::seconds(7.0),
            foam_probability: 0.4,
            foam_offset: -14.0,
            undertow_offset: -8.0,
            reverb_decay: 4.0,
            reverb_mix: 0.4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OceanProgram {
    config: OceanConfig,
}

impl OceanProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: OceanConfig = config.parse()?;
        check_positive(TAG, "swellPeriod", parsed.swell_period)?;
        check_probability(TAG, "crashProbability", parsed.crash_probability)?;
        check_probability(TAG, "foamProbability", parsed.foam_probability)?;
        Ok(OceanProgram { config: parsed })
    }

    pub fn config(&self) -> &OceanConfig {
        &self.config
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            lowpass: Some(6000.0),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();
        let swell_rate = 1.0 / c.swell_period;

        // Surf: level and brightness rise and fall together.
        let seed = b.seed();
        let surf = b.add_path(
            vec![
                Node::noise(NoiseColor::Brown, seed),
                Node::filter(FilterType::Lowpass, 800.0, 0.6, sr),
                Node::gain_db(c.volume),
            ],
            chain.connect,
        )?;
        let depth = db_to_gain(c.volume) * 0.6;
        b.lfo(swell_rate, -depth, depth, &[ParamRef::new(surf[2], Param::Gain)])?;
        b.lfo(swell_rate, -400.0, 400.0, &[ParamRef::new(surf[1], Param::Cutoff)])?;

        let seed = b.seed();
        b.add_path(
            vec![
                Node::noise(NoiseColor::Pink, seed),
                Node::filter(FilterType::Lowpass, 300.0, 0.7, sr),
                Node::gain_db(layer_db(c.volume, c.undertow_offset)),
            ],
            chain.connect,
        )?;

        // Crashes land near the top of each swell.
        let seed = b.seed();
        let crash = b.add_path(
            vec![
                Node::noise_voices(NoiseColor::Pink, Adsr::percussive(1.2, 2.8), seed, sr),
                Node::filter(FilterType::Lowpass, 2500.0, 0.7, sr),
                Node::gain_db(layer_db(c.volume, c.crash_offset)),
            ],
            chain.reverb_entry,
        )?[0];
        let crash_p = c.crash_probability;
        let humanize = Humanize {
            timing: 0.03,
            velocity: 0.2,
        };
        b.schedule(
            TimeSpec::seconds(c.swell_period),
            TimeSpec::seconds(c.swell_period * 0.25),
            move |tick| {
                if chance(tick.rng, crash_p) {
                    let lag = tick.rng.gen_range(0.0..CRASH_LAG);
                    let event = NoteEvent {
                        time: tick.time + lag,
                        frequency: 0.0,
                        duration: 3.0,
                        velocity: 0.75,
                    };
                    let event = humanize.apply(event, tick.rng);
                    tick.graph.trigger(crash, event);
                }
            },
        )?;

        let seed = b.seed();
        let foam = b.add_path(
            vec![
                Node::noise_voices(NoiseColor::White, Adsr::percussive(0.08, 1.2), seed, sr),
                Node::filter(FilterType::Highpass, 3000.0, 0.7, sr),
                Node::gain_db(layer_db(c.volume, c.foam_offset)),
            ],
            chain.reverb_entry,
        )?[0];
        let foam_p = c.foam_probability;
        b.schedule(c.foam_interval, TimeSpec::seconds(3.0), move |tick| {
            if chance(tick.rng, foam_p) {
                let velocity = tick.rng.gen_range(0.3..0.7);
                tick.graph.trigger(
                    foam,
                    NoteEvent {
                        time: tick.time,
                        frequency: 0.0,
                        duration: 1.2,
                        velocity,
                    },
                );
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::generative::MAX_TIMING;

    #[tokio::test]
    async fn crash_follows_swell_period() {
        let mut rig = Rig::new();
        let program = rig
            .start(ProfileConfig::new(TAG).with("swellPeriod", 8.0))
            .await
            .unwrap();
        assert_eq!(program.loops().len(), 2);
        let crash = rig.transport.loop_info(program.loops()[0]).unwrap();
        assert_eq!((crash.interval, crash.offset), (8.0, 2.0));
        let foam = rig.transport.loop_info(program.loops()[1]).unwrap();
        assert_eq!(foam.interval, 7.0);
    }

    #[tokio::test]
    async fn crash_lands_shortly_after_swell_phase() {
        let mut rig = Rig::new();
        let config = ProfileConfig::new(TAG)
            .with("swellPeriod", 8.0)
            .with("crashProbability", 1.0);
        let program = rig.start(config).await.unwrap();
        let crash = program
            .components()
            .iter()
            .copied()
            .find(|&id| matches!(rig.graph.node(id), Some(Node::Voices { .. })))
            .unwrap();
        let queued = |rig: &Rig| match rig.graph.node(crash) {
            Some(Node::Voices { pool, .. }) => (pool.pending_len(), pool.active_len()),
            _ => unreachable!(),
        };

        // Fired at 2.0 but not yet sounding.
        rig.run(1.96);
        assert_eq!(queued(&rig), (1, 0));
        rig.run(2.0 + CRASH_LAG + MAX_TIMING - 1.96 + 0.01);
        assert_eq!(queued(&rig), (0, 1));
    }

    #[test]
    fn swell_must_be_positive() {
        assert!(OceanProgram::from_config(&ProfileConfig::new(TAG).with("swellPeriod", 0)).is_err());
    }
}
