//! Phasing: independent voices on mutually prime periods.
//!
//! Each generator walks the note set by the golden ratio on its own period
//! and offset. With prime periods no pair of generators lines up again until
//! the product of their periods, so the combined texture keeps shifting.

use serde::Deserialize;

use super::ProgramBuilder;
use crate::chain::{ChainHandle, ChainOptions};
use crate::dsp::envelope::Adsr;
use crate::dsp::oscillator::Waveform;
use crate::dsp::voice::NoteEvent;
use crate::error::EngineError;
use crate::generative::{chance, layer_db, GoldenWalk, Humanize, MAX_TIMING};
use crate::graph::{db_to_gain, Node, Param, ParamRef};
use crate::profile::{
    check_positive, check_probability, note_to_frequency, notes_to_frequencies, ProfileConfig,
};
use crate::time::TimeSpec;

pub(super) const TAG: &str = "phasing";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhasingConfig {
    pub volume: f64,
    /// Generator periods in seconds.
    pub intervals: Vec<f64>,
    /// Start offsets in seconds, one per interval. Defaults to 0, 2, 4, ...
    pub offsets: Option<Vec<f64>>,
    pub notes: Vec<String>,
    pub probability: f64,
    pub note_duration: f64,
    pub humanize: f64,
    pub bed: bool,
    pub bed_note: String,
    pub bed_offset: f64,
    pub reverb_decay: f64,
    pub reverb_mix: f64,
}

impl Default for PhasingConfig {
    fn default() -> Self {
        PhasingConfig {
            volume: -18.0,
            intervals: vec![17.0, 19.0, 23.0, 29.0, 31.0],
            offsets: None,
            notes: ["C4", "D4", "E4", "G4", "A4", "C5", "D5"].map(String::from).to_vec(),
            probability: 0.9,
            note_duration: 4.0,
            humanize: 0.02,
            bed: true,
            bed_note: "C2".to_string(),
            bed_offset: -12.0,
            reverb_decay: 6.0,
            reverb_mix: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhasingProgram {
    config: PhasingConfig,
    offsets: Vec<f64>,
    notes: Vec<f64>,
    bed: f64,
}

impl PhasingProgram {
    pub fn from_config(config: &ProfileConfig) -> Result<Self, EngineError> {
        let parsed: PhasingConfig = config.parse()?;
        if parsed.intervals.is_empty() {
            return Err(EngineError::invalid_config(TAG, "intervals must not be empty"));
        }
        for &interval in &parsed.intervals {
            check_positive(TAG, "intervals", interval)?;
        }
        let offsets = match &parsed.offsets {
            Some(offsets) if offsets.len() != parsed.intervals.len() => {
                return Err(EngineError::invalid_config(
                    TAG,
                    format!(
                        "{} offsets given for {} intervals",
                        offsets.len(),
                        parsed.intervals.len()
                    ),
                ));
            }
            Some(offsets) => offsets.clone(),
            None => (0..parsed.intervals.len()).map(|i| 2.0 * i as f64).collect(),
        };
        if offsets.iter().any(|o| !o.is_finite() || *o < 0.0) {
            return Err(EngineError::invalid_config(TAG, "offsets must not be negative"));
        }
        check_probability(TAG, "probability", parsed.probability)?;
        check_positive(TAG, "noteDuration", parsed.note_duration)?;
        if !(0.0..=MAX_TIMING).contains(&parsed.humanize) {
            return Err(EngineError::invalid_config(
                TAG,
                format!("humanize must be within 0..={MAX_TIMING}s, got {}", parsed.humanize),
            ));
        }
        let notes = notes_to_frequencies(TAG, &parsed.notes)?;
        let bed = note_to_frequency(&parsed.bed_note).ok_or_else(|| {
            EngineError::invalid_config(TAG, format!("bad note name '{}'", parsed.bed_note))
        })?;
        Ok(PhasingProgram {
            config: parsed,
            offsets,
            notes,
            bed,
        })
    }

    pub fn config(&self) -> &PhasingConfig {
        &self.config
    }

    /// Resolved `(period, offset)` pairs, in registration order.
    pub fn periods(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.config.intervals.iter().copied().zip(self.offsets.iter().copied())
    }

    pub(super) fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            reverb_decay: Some(self.config.reverb_decay),
            reverb_mix: Some(self.config.reverb_mix),
            lowpass: Some(5000.0),
            ..ChainOptions::default()
        }
    }

    pub(super) fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        let c = &self.config;
        let sr = b.sample_rate();

        let voices = b.add_path(
            vec![
                Node::tone_voices(Waveform::Sine, Adsr::new(0.8, 1.5, 0.4, 3.0), 12, sr),
                Node::gain_db(c.volume),
            ],
            chain.reverb_entry,
        )?[0];

        let humanize = Humanize {
            timing: c.humanize,
            velocity: 0.1,
        };
        for (interval, offset) in self.periods() {
            let notes = self.notes.clone();
            let mut walk = GoldenWalk::random(notes.len(), b.rng());
            let p = c.probability;
            let duration = c.note_duration;
            b.schedule(TimeSpec::seconds(interval), TimeSpec::seconds(offset), move |tick| {
                if !chance(tick.rng, p) {
                    return;
                }
                let Some(&frequency) = walk.pick(&notes) else { return };
                let event = NoteEvent {
                    time: tick.time,
                    frequency,
                    duration,
                    velocity: 0.6,
                };
                let event = humanize.apply(event, tick.rng);
                tick.graph.trigger(voices, event);
            })?;
        }

        if c.bed {
            let level = layer_db(c.volume, c.bed_offset);
            let bed = b.add_path(
                vec![Node::oscillator(Waveform::Sine, self.bed, sr), Node::gain_db(level)],
                chain.connect,
            )?;
            let breathe = db_to_gain(level) * 0.5;
            b.lfo(0.013, -breathe, breathe, &[ParamRef::new(bed[1], Param::Gain)])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    const PRIMES: [f64; 5] = [17.0, 19.0, 23.0, 29.0, 31.0];
    const OFFSETS: [f64; 5] = [0.0, 2.0, 4.0, 6.0, 8.0];

    #[tokio::test]
    async fn registers_one_loop_per_period() {
        let mut rig = Rig::new();
        let config = ProfileConfig::new(TAG)
            .with("intervals", PRIMES.to_vec())
            .with("offsets", OFFSETS.to_vec());
        let program = rig.start(config).await.unwrap();

        assert_eq!(program.loops().len(), 5);
        assert_eq!(rig.transport.pending(), 5);
        for (i, &id) in program.loops().iter().enumerate() {
            let info = rig.transport.loop_info(id).unwrap();
            assert_eq!(info.interval, PRIMES[i]);
            assert_eq!(info.offset, OFFSETS[i]);
        }
    }

    #[test]
    fn offsets_default_to_even_steps() {
        let program = PhasingProgram::from_config(&ProfileConfig::new(TAG)).unwrap();
        let periods: Vec<(f64, f64)> = program.periods().collect();
        let expected: Vec<(f64, f64)> = PRIMES.into_iter().zip(OFFSETS).collect();
        assert_eq!(periods, expected);
    }

    #[test]
    fn mismatched_offsets_are_rejected() {
        let config = ProfileConfig::new(TAG)
            .with("intervals", vec![17.0, 19.0])
            .with("offsets", vec![0.0]);
        assert!(matches!(
            PhasingProgram::from_config(&config),
            Err(EngineError::InvalidConfig { .. })
        ));
        let config = ProfileConfig::new(TAG).with("intervals", vec![17.0, 0.0]);
        assert!(PhasingProgram::from_config(&config).is_err());
    }

    #[test]
    fn humanize_is_limited_to_short_jitter() {
        for bad in [0.35, -0.01] {
            let config = ProfileConfig::new(TAG).with("humanize", bad);
            assert!(matches!(
                PhasingProgram::from_config(&config),
                Err(EngineError::InvalidConfig { .. })
            ));
        }
        let config = ProfileConfig::new(TAG).with("humanize", MAX_TIMING);
        assert!(PhasingProgram::from_config(&config).is_ok());
    }

    fn triggers(period: f64, offset: f64, window: f64) -> Vec<u64> {
        (0..)
            .map(|k| offset + k as f64 * period)
            .take_while(|&t| t < window)
            .map(|t| t as u64)
            .collect()
    }

    /// Every pair of generators lines up at most once per product of their
    /// periods, and the joint pattern does not recur within that window.
    #[test]
    fn prime_periods_rarely_coincide() {
        for i in 0..PRIMES.len() {
            for j in (i + 1)..PRIMES.len() {
                let window = PRIMES[i] * PRIMES[j];
                let a = triggers(PRIMES[i], OFFSETS[i], window);
                let b = triggers(PRIMES[j], OFFSETS[j], window);
                let shared = a.iter().filter(|t| b.contains(t)).count();
                assert!(shared <= 1, "{} and {} meet {shared} times", PRIMES[i], PRIMES[j]);
            }
        }

        // Joint phase state (seconds into each period) over 17 × 19 seconds.
        let window = (PRIMES[0] * PRIMES[1]) as u64;
        let mut states = std::collections::HashSet::new();
        for t in 0..window {
            let state: Vec<u64> = PRIMES
                .iter()
                .zip(OFFSETS)
                .map(|(&p, o)| (t as i64 - o as i64).rem_euclid(p as i64) as u64)
                .collect();
            assert!(states.insert(state), "pattern repeated at {t}s");
        }
    }

    #[tokio::test]
    async fn first_triggers_are_staggered() {
        let mut rig = Rig::new();
        let config = ProfileConfig::new(TAG).with("probability", 1.0).with("bed", false);
        let program = rig.start(config).await.unwrap();
        let first: Vec<f64> = program
            .loops()
            .iter()
            .map(|&id| rig.transport.loop_info(id).unwrap().next.unwrap())
            .collect();
        assert_eq!(first, OFFSETS.to_vec());

        rig.run(9.0);
        assert_eq!(rig.transport.fired(), 5);
    }
}
