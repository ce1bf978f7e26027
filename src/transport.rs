//! Transport: the shared clock that fires repeating callbacks.
//!
//! Loops are stored in registration order. [`Transport::advance`] fires every
//! occurrence whose scheduled time falls before the render horizon plus a
//! small lookahead, earliest first and ties in registration order. Callbacks
//! receive the absolute scheduled time, so the notes they emit land on the
//! exact sample regardless of how the render is blocked.

use rand::RngCore;
use tracing::debug;

use crate::error::EngineError;
use crate::graph::AudioGraph;
use crate::time::TimeSpec;

/// How far ahead of the render position callbacks are fired, in seconds.
pub const LOOKAHEAD: f64 = 0.1;

pub const DEFAULT_BPM: f64 = 120.0;

/// Shortest loop interval accepted, in seconds.
pub const MIN_INTERVAL: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u64);

/// Context handed to a loop callback.
pub struct Tick<'a> {
    /// Absolute scheduled time of this occurrence, in seconds.
    pub time: f64,
    pub bpm: f64,
    pub graph: &'a mut AudioGraph,
    pub rng: &'a mut dyn RngCore,
}

impl Tick<'_> {
    /// Resolve a time value against the current tempo.
    pub fn seconds(&self, spec: TimeSpec) -> f64 {
        spec.resolve(self.bpm)
    }
}

pub type Callback = Box<dyn FnMut(&mut Tick<'_>) + Send>;

/// Resolved timing of a registered loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopInfo {
    pub interval: f64,
    pub offset: f64,
    /// Next scheduled time; `None` until the transport starts.
    pub next: Option<f64>,
}

struct ScheduledLoop {
    id: LoopId,
    interval: TimeSpec,
    offset: TimeSpec,
    interval_secs: f64,
    offset_secs: f64,
    next: Option<f64>,
    callback: Callback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Started,
}

pub struct Transport {
    bpm: f64,
    state: TransportState,
    /// Render time at which position 0 occurred.
    origin: f64,
    /// Render time reached by the last advance.
    now: f64,
    loops: Vec<ScheduledLoop>,
    next_id: u64,
    fired: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("bpm", &self.bpm)
            .field("state", &self.state)
            .field("origin", &self.origin)
            .field("loops", &self.loops.len())
            .field("fired", &self.fired)
            .finish()
    }
}

fn checked_seconds(spec: TimeSpec, bpm: f64) -> Result<f64, EngineError> {
    let s = spec.resolve(bpm);
    if s.is_finite() {
        Ok(s)
    } else {
        Err(EngineError::InvalidTime(spec.to_string()))
    }
}

impl Transport {
    pub fn new() -> Self {
        Transport {
            bpm: DEFAULT_BPM,
            state: TransportState::Stopped,
            origin: 0.0,
            now: 0.0,
            loops: Vec::new(),
            next_id: 0,
            fired: 0,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change tempo. Tempo-relative loops keep their next occurrence and use
    /// the new interval from then on. Fails without changing anything if a
    /// loop would repeat faster than [`MIN_INTERVAL`].
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), EngineError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(EngineError::InvalidTime(format!("{bpm} bpm")));
        }
        let too_fast = |l: &&ScheduledLoop| {
            let secs = l.interval.resolve(bpm);
            !secs.is_finite() || secs < MIN_INTERVAL
        };
        if let Some(l) = self.loops.iter().find(too_fast) {
            return Err(EngineError::InvalidTime(format!(
                "interval {} is shorter than {MIN_INTERVAL}s at {bpm} bpm",
                l.interval
            )));
        }
        self.bpm = bpm;
        for l in &mut self.loops {
            l.interval_secs = l.interval.resolve(bpm);
            l.offset_secs = l.offset.resolve(bpm);
        }
        Ok(())
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == TransportState::Started
    }

    /// Seconds since the transport origin.
    pub fn position(&self) -> f64 {
        (self.now - self.origin).max(0.0)
    }

    /// Callbacks fired since creation.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Number of registered loops.
    pub fn pending(&self) -> usize {
        self.loops.len()
    }

    fn first_occurrence(&self, interval: f64, offset: f64) -> f64 {
        let first = self.origin + offset;
        if first >= self.now {
            return first;
        }
        let missed = ((self.now - first) / interval).ceil();
        first + missed * interval
    }

    /// Register `callback` to fire every `interval`, starting `offset` after
    /// the transport origin.
    pub fn schedule_repeat<F>(
        &mut self,
        interval: TimeSpec,
        offset: TimeSpec,
        callback: F,
    ) -> Result<LoopId, EngineError>
    where
        F: FnMut(&mut Tick<'_>) + Send + 'static,
    {
        let interval_secs = checked_seconds(interval, self.bpm)?;
        if interval_secs < MIN_INTERVAL {
            return Err(EngineError::InvalidTime(format!(
                "interval {interval} is shorter than {MIN_INTERVAL}s"
            )));
        }
        let offset_secs = checked_seconds(offset, self.bpm)?;
        if offset_secs < 0.0 {
            return Err(EngineError::InvalidTime(format!(
                "offset {offset} must not be negative"
            )));
        }

        let id = LoopId(self.next_id);
        self.next_id += 1;
        let next = self
            .is_started()
            .then(|| self.first_occurrence(interval_secs, offset_secs));
        self.loops.push(ScheduledLoop {
            id,
            interval,
            offset,
            interval_secs,
            offset_secs,
            next,
            callback: Box::new(callback),
        });
        debug!(?id, interval = interval_secs, offset = offset_secs, "Loop scheduled");
        Ok(id)
    }

    /// Remove one loop. Returns false if it was already gone.
    pub fn cancel(&mut self, id: LoopId) -> bool {
        let before = self.loops.len();
        self.loops.retain(|l| l.id != id);
        before != self.loops.len()
    }

    pub fn cancel_all(&mut self) {
        if !self.loops.is_empty() {
            debug!(count = self.loops.len(), "Cancelling all loops");
        }
        self.loops.clear();
    }

    pub fn loop_info(&self, id: LoopId) -> Option<LoopInfo> {
        self.loops.iter().find(|l| l.id == id).map(|l| LoopInfo {
            interval: l.interval_secs,
            offset: l.offset_secs,
            next: l.next,
        })
    }

    /// Start counting from render time `now`.
    pub fn start(&mut self, now: f64) {
        if self.is_started() {
            return;
        }
        self.state = TransportState::Started;
        self.origin = now;
        self.now = now;
        for l in &mut self.loops {
            l.next = Some(now + l.offset_secs);
        }
    }

    /// Stop firing. Registered loops stay until cancelled.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        for l in &mut self.loops {
            l.next = None;
        }
    }

    pub fn reset_position(&mut self) {
        self.origin = self.now;
    }

    /// Fire every occurrence scheduled before `until + LOOKAHEAD`. Returns the
    /// number of callbacks fired.
    pub fn advance(&mut self, until: f64, graph: &mut AudioGraph, rng: &mut dyn RngCore) -> usize {
        if !self.is_started() {
            return 0;
        }
        self.now = self.now.max(until);
        let horizon = until + LOOKAHEAD;
        let bpm = self.bpm;
        let mut fired = 0;
        loop {
            // Earliest due loop; `min_by` keeps the first of equal keys.
            let due = self
                .loops
                .iter_mut()
                .filter_map(|l| l.next.filter(|&t| t < horizon).map(|t| (t, l)))
                .min_by(|a, b| a.0.total_cmp(&b.0));
            let Some((time, l)) = due else { break };
            let mut tick = Tick {
                time,
                bpm,
                graph: &mut *graph,
                rng: &mut *rng,
            };
            (l.callback)(&mut tick);
            l.next = Some(time + l.interval_secs);
            fired += 1;
        }
        self.fired += fired as u64;
        fired
    }
}
