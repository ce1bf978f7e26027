//! Colored noise bed with an airy top layer and slow level drift.

use serde::Deserialize;

use super::ProgramBuilder;
use crate::chain::{ChainHandle, ChainOptions};
use crate::dsp::filter::FilterType;
use crate::dsp::noise::NoiseColor;
use crate::error::EngineError;
use crate::generative::layer_db;
use crate::graph::{db_to_gain, Node, Param, ParamRef};
use crate::profile::{check_positive, ProfileConfig};

pub(super) const TAG: &str = "noise";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoiseConfig {
    pub color: NoiseColor,
    /// Bed level in dB.
    pub volume: f64,
    /// Lowpass on the whole chain, Hz.
    pub lowpass: f64,
    /// Airy high-passed white layer, relative to `volume`.
    pub air: bool,
    pub air_offset: f64,
    /// Slow gain drift on the bed.
    pub drift: bool,
    pub drift_rate: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            color: NoiseColor::Pink,
            volume: -18.0,
            lowpass: 9000.0,
            air: true,
            air_offset: -18.0,
            drift: true,
            drift_rate: 0.05,
            reverb_decay: 1.5,
            reverb_mix: 0.15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoiseProgram {
    config: NoiseConfig,
}

impl NoiseProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: NoiseConfig = config.parse()?;
        check_positive(TAG, "lowpass", parsed.lowpass)?;
        check_positive(TAG, "driftRate", parsed.drift_rate)?;
        Ok(NoiseProgram { config: parsed })
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            lowpass: Some(self.config.lowpass),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();

        let seed = b.seed();
        let bed = b.add_path(vec![Node::noise(c.color, seed), Node::gain_db(c.volume)], chain.connect)?;

        if c.air {
            let seed = b.seed();
            b.add_path(
                vec![
                    Node::noise(NoiseColor::White, seed),
                    Node::filter(FilterType::Highpass, 6000.0, 0.5, sr),
                    Node::gain_db(layer_db(c.volume, c.air_offset)),
                ],
                chain.reverb_entry,
            )?;
        }

        if c.drift {
            let depth = db_to_gain(c.volume) * 0.25;
            b.lfo(c.drift_rate, -depth, depth, &[ParamRef::new(bed[1], Param::Gain)])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn layers_follow_flags() {
        let mut rig = Rig::new();
        let full = rig.start(ProfileConfig::new(TAG)).await.unwrap();
        // chain (limiter, lowpass, reverb) + bed 2 + air 3 + drift 1
        assert_eq!(full.components().len(), 9);
        assert!(full.loops().is_empty());

        let mut rig = Rig::new();
        let bare = rig
            .start(ProfileConfig::new(TAG).with("air", false).with("drift", false))
            .await
            .unwrap();
        assert_eq!(bare.components().len(), 5);
    }

    #[test]
    fn color_is_parsed() {
        let p = NoiseProgram::from_config(&ProfileConfig::new(TAG).with("color", "brown")).unwrap();
        assert_eq!(p.config().color, NoiseColor::Brown);
        assert!(NoiseProgram::from_config(&ProfileConfig::new(TAG).with("color", "plaid")).is_err());
        assert!(NoiseProgram::from_config(&ProfileConfig::new(TAG).with("lowpass", -5)).is_err());
    }
}
