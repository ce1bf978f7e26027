//! Variation helpers shared by the sound programs.

use rand::Rng;
use rand::RngCore;

use crate::dsp::voice::NoteEvent;

/// The golden ratio.
pub const PHI: f64 = 1.618_033_988_749_895;

/// Low-discrepancy walk over a note set.
///
/// Each step adds φ to a fractional index modulo the set length and floors
/// it. Given the same start the sequence is fixed; it never consumes random
/// draws after construction.
#[derive(Debug, Clone)]
pub struct GoldenWalk {
    position: f64,
    len: usize,
}

impl GoldenWalk {
    pub fn new(len: usize, start: f64) -> Self {
        let len = len.max(1);
        GoldenWalk {
            position: start.rem_euclid(len as f64),
            len,
        }
    }

    /// Start at a random point of the set.
    pub fn random(len: usize, rng: &mut dyn RngCore) -> Self {
        let start = rng.gen_range(0.0..1.0) * len.max(1) as f64;
        Self::new(len, start)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Index for this trigger, then advance.
    pub fn next_index(&mut self) -> usize {
        let index = (self.position.floor() as usize).min(self.len - 1);
        self.position = (self.position + PHI).rem_euclid(self.len as f64);
        index
    }

    /// Pick the next item of `items`. `items` should have the walk's length.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        let index = self.next_index();
        items.get(index % items.len().max(1))
    }
}

/// Uniform [0, 1) draw below `probability`.
pub fn chance(rng: &mut dyn RngCore, probability: f64) -> bool {
    rng.gen_range(0.0..1.0) < probability
}

/// Longest timing jitter [`Humanize`] applies, in seconds.
pub const MAX_TIMING: f64 = 0.05;

/// Signed jitter applied to emitted events only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Humanize {
    /// Maximum timing offset in seconds, either direction. Capped at
    /// [`MAX_TIMING`].
    pub timing: f64,
    /// Maximum velocity offset, either direction.
    pub velocity: f64,
}

impl Default for Humanize {
    fn default() -> Self {
        Humanize {
            timing: 0.02,
            velocity: 0.1,
        }
    }
}

impl Humanize {
    pub const NONE: Humanize = Humanize {
        timing: 0.0,
        velocity: 0.0,
    };

    fn jitter(rng: &mut dyn RngCore, amount: f64) -> f64 {
        if amount > 0.0 {
            rng.gen_range(-amount..=amount)
        } else {
            0.0
        }
    }

    pub fn apply(&self, mut event: NoteEvent, rng: &mut dyn RngCore) -> NoteEvent {
        let timing = self.timing.min(MAX_TIMING);
        event.time = (event.time + Self::jitter(rng, timing)).max(0.0);
        event.velocity = (event.velocity + Self::jitter(rng, self.velocity)).clamp(0.0, 1.0);
        event
    }
}

/// Volume of a layer placed `offset_db` relative to a base volume.
pub fn layer_db(base_db: f64, offset_db: f64) -> f64 {
    base_db + offset_db
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn golden_walk_is_deterministic_from_start() {
        let mut a = GoldenWalk::new(5, 0.0);
        let mut b = GoldenWalk::new(5, 0.0);
        let seq: Vec<usize> = (0..8).map(|_| a.next_index()).collect();
        assert_eq!(seq, (0..8).map(|_| b.next_index()).collect::<Vec<_>>());
        // 0, 1.618, 3.236, 4.854, 1.472 (mod 5), 3.090, 4.708, 1.326
        assert_eq!(seq, vec![0, 1, 3, 4, 1, 3, 4, 1]);
    }

    #[test]
    fn golden_walk_visits_every_note() {
        let mut walk = GoldenWalk::new(7, 2.5);
        let mut seen = [false; 7];
        for _ in 0..30 {
            seen[walk.next_index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn golden_walk_does_not_consume_randomness() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut walk = GoldenWalk::random(4, &mut rng);
        let after_start = rng.next_u64();

        let mut rng2 = StdRng::seed_from_u64(3);
        let _ = GoldenWalk::random(4, &mut rng2);
        for _ in 0..10 {
            walk.next_index();
        }
        assert_eq!(after_start, rng2.next_u64());
    }

    #[test]
    fn pick_handles_items() {
        let notes = ["C3", "E3", "G3"];
        let mut walk = GoldenWalk::new(notes.len(), 0.0);
        assert_eq!(walk.pick(&notes), Some(&"C3"));
        assert_eq!(walk.pick(&notes), Some(&"E3"));
        let empty: [u8; 0] = [];
        assert_eq!(walk.pick(&empty), None);
    }

    #[test]
    fn chance_respects_extremes() {
        let mut rng = StdRng::seed_from_u64(11);
        assert!((0..100).all(|_| !chance(&mut rng, 0.0)));
        assert!((0..100).all(|_| chance(&mut rng, 1.0)));
        let hits = (0..10_000).filter(|_| chance(&mut rng, 0.3)).count();
        assert!((2_700..3_300).contains(&hits), "{hits}");
    }

    #[test]
    fn humanize_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let h = Humanize::default();
        let event = NoteEvent {
            time: 10.0,
            frequency: 220.0,
            duration: 1.0,
            velocity: 0.5,
        };
        for _ in 0..200 {
            let e = h.apply(event, &mut rng);
            assert!((e.time - 10.0).abs() <= 0.02);
            assert!((e.velocity - 0.5).abs() <= 0.1 + 1e-12);
            assert_eq!(e.frequency, 220.0);
        }
        assert_eq!(Humanize::NONE.apply(event, &mut rng), event);
    }

    #[test]
    fn humanize_timing_is_capped() {
        let mut rng = StdRng::seed_from_u64(9);
        let h = Humanize {
            timing: 0.35,
            velocity: 0.0,
        };
        let event = NoteEvent {
            time: 4.0,
            frequency: 0.0,
            duration: 3.0,
            velocity: 0.75,
        };
        for _ in 0..500 {
            let e = h.apply(event, &mut rng);
            assert!((e.time - 4.0).abs() <= MAX_TIMING);
        }
    }
}
