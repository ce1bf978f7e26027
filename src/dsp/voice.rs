//! Voices: triggered notes shaped by an ADSR envelope, and the pool that
//! plays them at sample-accurate times.

use serde::{Deserialize, Serialize};

use super::envelope::{Adsr, Envelope};
use super::noise::{NoiseColor, NoiseGenerator};
use super::oscillator::{Oscillator, Waveform};

/// What a pool's voices are made of.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum VoiceKind {
    Tone { waveform: Waveform },
    Noise { color: NoiseColor },
}

/// One emitted event: start time (absolute seconds), pitch, length, velocity.
///
/// `frequency` is ignored by noise pools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub time: f64,
    pub frequency: f64,
    pub duration: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone)]
enum Source {
    Tone(Oscillator),
    Noise(NoiseGenerator),
}

/// A single voice: one source shaped by an envelope.
#[derive(Debug, Clone)]
pub struct Voice {
    source: Source,
    envelope: Envelope,
    velocity: f64,
    /// Sample index at which the gate closes.
    release_sample: u64,
    released: bool,
}

impl Voice {
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    fn next_sample(&mut self, now: u64, detune: f64) -> f64 {
        if !self.released && now >= self.release_sample {
            self.envelope.gate_off();
            self.released = true;
        }
        let raw = match &mut self.source {
            Source::Tone(osc) => {
                osc.detune = detune;
                osc.next_sample()
            }
            Source::Noise(noise) => noise.next_sample(),
        };
        raw * self.envelope.next_sample() * self.velocity
    }

    fn release(&mut self) {
        self.envelope.gate_off();
        self.released = true;
    }
}

/// A polyphonic pool. Events wait in `pending` until the render clock
/// reaches their start sample, then become voices.
#[derive(Debug, Clone)]
pub struct VoicePool {
    pub kind: VoiceKind,
    pub shape: Adsr,
    pub max_voices: usize,
    pending: Vec<(u64, NoteEvent)>,
    active: Vec<Voice>,
    sample_rate: f64,
    next_seed: u32,
}

impl VoicePool {
    pub fn new(kind: VoiceKind, shape: Adsr, sample_rate: f64) -> Self {
        VoicePool {
            kind,
            shape,
            max_voices: 16,
            pending: Vec::new(),
            active: Vec::new(),
            sample_rate,
            next_seed: 1,
        }
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices.max(1);
        self
    }

    /// Seed for the noise generators of future voices.
    pub fn reseed(&mut self, seed: u32) {
        self.next_seed = seed;
    }

    /// Queue an event. Events may arrive out of order.
    pub fn schedule(&mut self, event: NoteEvent) {
        let start = (event.time.max(0.0) * self.sample_rate).round() as u64;
        let at = self.pending.partition_point(|(s, _)| *s <= start);
        self.pending.insert(at, (start, event));
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Drop queued events and move every sounding voice into release.
    pub fn release_all(&mut self) {
        self.pending.clear();
        self.active.iter_mut().for_each(Voice::release);
    }

    fn spawn(&mut self, start: u64, event: &NoteEvent) -> Voice {
        let source = match self.kind {
            VoiceKind::Tone { waveform } => {
                Source::Tone(Oscillator::with_frequency(waveform, event.frequency, self.sample_rate))
            }
            VoiceKind::Noise { color } => {
                self.next_seed = self.next_seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
                Source::Noise(NoiseGenerator::new(color, self.next_seed))
            }
        };
        let mut envelope = Envelope::with_shape(self.shape, self.sample_rate);
        envelope.gate_on();
        // Percussive shapes end on their own; the event length is irrelevant.
        let release_sample = if self.shape.sustain <= 0.0 {
            u64::MAX
        } else {
            start + (event.duration.max(0.0) * self.sample_rate) as u64
        };
        Voice {
            source,
            envelope,
            velocity: event.velocity.clamp(0.0, 1.0),
            release_sample,
            released: false,
        }
    }

    /// Render one sample at clock position `now`; `detune` is in cents.
    pub fn next_sample(&mut self, now: u64, detune: f64) -> f64 {
        while let Some((start, _)) = self.pending.first() {
            if *start > now {
                break;
            }
            let (start, event) = self.pending.remove(0);
            if self.active.len() >= self.max_voices {
                // Steal the oldest voice.
                self.active.remove(0);
            }
            let voice = self.spawn(start, &event);
            self.active.push(voice);
        }

        let sum: f64 = self
            .active
            .iter_mut()
            .map(|v| v.next_sample(now, detune))
            .sum();
        self.active.retain(|v| !v.is_finished());
        sum
    }
}
