//! Limiter: peak-following gain reduction with a hard ceiling.
//!
//! A feed-forward compressor at infinite ratio: the envelope follower tracks
//! the stereo peak with a fast attack and slow release, and any level above
//! the ceiling is pulled back to it. A final clamp guarantees no sample
//! leaves the limiter above the ceiling, even during the attack.

/// Default master ceiling in dBFS.
pub const DEFAULT_CEILING_DB: f64 = -1.0;

#[derive(Debug, Clone)]
pub struct Limiter {
    sample_rate: f64,
    /// Ceiling in dBFS (clamped to [-60, 0]).
    ceiling_db: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,

    envelope: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64, ceiling_db: f64) -> Self {
        Self {
            sample_rate,
            ceiling_db: ceiling_db.clamp(-60.0, 0.0),
            attack: 0.001,
            release: 0.1,
            envelope: 0.0,
        }
    }

    pub fn ceiling_db(&self) -> f64 {
        self.ceiling_db
    }

    #[inline]
    fn linear_to_db(linear: f64) -> f64 {
        if linear <= 0.0 {
            -120.0
        } else {
            20.0 * linear.log10()
        }
    }

    #[inline]
    fn db_to_linear(db: f64) -> f64 {
        10.0_f64.powf(db / 20.0)
    }

    /// Process a stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input_level = left.abs().max(right.abs()) as f64;

        let coef = if input_level > self.envelope {
            (-1.0 / (self.attack * self.sample_rate)).exp()
        } else {
            (-1.0 / (self.release * self.sample_rate)).exp()
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * input_level;

        let over_db = Self::linear_to_db(self.envelope) - self.ceiling_db;
        let gain = if over_db > 0.0 {
            Self::db_to_linear(-over_db) as f32
        } else {
            1.0
        };

        let ceiling = Self::db_to_linear(self.ceiling_db) as f32;
        (
            (left * gain).clamp(-ceiling, ceiling),
            (right * gain).clamp(-ceiling, ceiling),
        )
    }

    /// Current gain reduction in dB (for metering).
    pub fn gain_reduction(&self) -> f64 {
        (Self::linear_to_db(self.envelope) - self.ceiling_db).max(0.0)
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signals_pass_untouched() {
        let mut limiter = Limiter::new(44100.0, -1.0);
        for _ in 0..1000 {
            limiter.process(0.1, -0.1);
        }
        let (l, r) = limiter.process(0.1, -0.1);
        assert!((l - 0.1).abs() < 1e-6);
        assert!((r + 0.1).abs() < 1e-6);
        assert_eq!(limiter.gain_reduction(), 0.0);
    }

    #[test]
    fn output_never_exceeds_ceiling() {
        let mut limiter = Limiter::new(44100.0, -6.0);
        let ceiling = 10.0_f32.powf(-6.0 / 20.0);
        for i in 0..10000 {
            let x = if i % 2 == 0 { 3.0 } else { -3.0 };
            let (l, r) = limiter.process(x, x * 0.5);
            assert!(l.abs() <= ceiling + 1e-6, "left {l} above ceiling");
            assert!(r.abs() <= ceiling + 1e-6, "right {r} above ceiling");
        }
        assert!(limiter.gain_reduction() > 0.0);
    }

    #[test]
    fn gain_recovers_after_release() {
        let mut limiter = Limiter::new(44100.0, -12.0);
        for _ in 0..2000 {
            limiter.process(1.0, 1.0);
        }
        let (squashed, _) = limiter.process(0.1, 0.1);
        for _ in 0..44100 {
            limiter.process(0.1, 0.1);
        }
        let (recovered, _) = limiter.process(0.1, 0.1);
        assert!(recovered > squashed, "squashed={squashed}, recovered={recovered}");
    }

    #[test]
    fn ceiling_is_clamped() {
        assert_eq!(Limiter::new(44100.0, 6.0).ceiling_db(), 0.0);
        assert_eq!(Limiter::new(44100.0, -100.0).ceiling_db(), -60.0);
    }
}
