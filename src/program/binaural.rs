//! Binaural beat: two sine carriers hard-panned apart by the beat frequency.

use serde::Deserialize;

use super::ProgramBuilder;
use crate::chain::{ChainHandle, ChainOptions};
use crate::dsp::noise::NoiseColor;
use crate::dsp::oscillator::Waveform;
use crate::error::EngineError;
use crate::generative::layer_db;
use crate::graph::{Node, Param, ParamRef};
use crate::profile::{check_positive, ProfileConfig};

pub(super) const TAG: &str = "binaural";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BinauralConfig {
    /// Left carrier, Hz. The right carrier sits `beat_frequency` above it.
    pub base_frequency: f64,
    pub beat_frequency: f64,
    pub volume: f64,
    pub pink_bed: bool,
    pub bed_offset: f64,
    /// Peak pitch drift applied to both carriers, Hz.
    pub drift_depth: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for BinauralConfig {
    fn default() -> Self {
        BinauralConfig {
            base_frequency: 200.0,
            beat_frequency: 10.0,
            volume: -20.0,
            pink_bed: true,
            bed_offset: -14.0,
            drift_depth: 1.5,
            reverb_decay: 1.0,
            reverb_mix: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinauralProgram {
    config: BinauralConfig,
}

impl BinauralProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: BinauralConfig = config.parse()?;
        check_positive(TAG, "baseFrequency", parsed.base_frequency)?;
        check_positive(TAG, "beatFrequency", parsed.beat_frequency)?;
        Ok(BinauralProgram { config: parsed })
    }

    pub fn config(&self) -> &BinauralConfig {
        &self.config
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            lowpass: Some(1500.0),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();

        let left = b.add_path(
            vec![
                Node::oscillator(Waveform::Sine, c.base_frequency, sr),
                Node::panned_db(c.volume, -1.0),
            ],
            chain.connect,
        )?;
        let right = b.add_path(
            vec![
                Node::oscillator(Waveform::Sine, c.base_frequency + c.beat_frequency, sr),
                Node::panned_db(c.volume, 1.0),
            ],
            chain.connect,
        )?;

        if c.pink_bed {
            let seed = b.seed();
            b.add_path(
                vec![
                    Node::noise(NoiseColor::Pink, seed),
                    Node::gain_db(layer_db(c.volume, c.bed_offset)),
                ],
                chain.reverb_entry,
            )?;
        }

        // One modulator on both carriers keeps the beat constant.
        if c.drift_depth > 0.0 {
            b.lfo(
                0.02,
                -c.drift_depth,
                c.drift_depth,
                &[
                    ParamRef::new(left[0], Param::Frequency),
                    ParamRef::new(right[0], Param::Frequency),
                ],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn carriers_are_split_by_beat() {
        let mut rig = Rig::new();
        let config = ProfileConfig::new(TAG)
            .with("baseFrequency", 150.0)
            .with("beatFrequency", 6.0)
            .with("pinkBed", false);
        let program = rig.start(config).await.unwrap();
        assert!(program.loops().is_empty());

        let carriers: Vec<f64> = program
            .components()
            .iter()
            .filter_map(|&id| rig.graph.param(ParamRef::new(id, Param::Frequency)))
            .collect();
        assert_eq!(carriers, vec![150.0, 156.0]);

        let audio = rig.run(0.5);
        assert!(audio.iter().any(|f| f[0].abs() > 1e-4));
    }

    #[test]
    fn beat_must_be_positive() {
        let config = ProfileConfig::new(TAG).with("beatFrequency", 0.0);
        assert!(matches!(
            BinauralProgram::from_config(&config),
            Err(EngineError::InvalidConfig { .. })
        ));
    }
}
