//! Engine session: owns the audio graph, the transport and at most one
//! active sound program.
//!
//! Every program switch goes through [`EngineSession::create_engine`], which
//! disposes the previous program and resets the transport before anything
//! new is built. Audio is pulled from the session with [`EngineSession::render`].

use std::future::Future;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::dsp::mixer::Mixer;
use crate::error::EngineError;
use crate::graph::AudioGraph;
use crate::profile::SoundProfile;
use crate::program::{ProgramContext, ProgramRegistry, SoundProgram};
use crate::transport::Transport;

/// Frames rendered between transport advances.
pub const BLOCK_SIZE: usize = 128;

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// The host audio output. `start` may suspend, for instance until the user
/// interacts with the page; the session awaits it once and remembers success.
pub trait AudioOutput {
    fn sample_rate(&self) -> f64;

    fn start(&mut self) -> impl Future<Output = Result<(), EngineError>>;
}

/// Output that is always ready. Used for offline rendering.
#[derive(Debug, Clone, Copy)]
pub struct OfflineOutput {
    sample_rate: f64,
}

impl OfflineOutput {
    pub fn new(sample_rate: f64) -> Self {
        OfflineOutput { sample_rate }
    }
}

impl Default for OfflineOutput {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            Ok(())
        } else {
            Err(EngineError::AudioInit(format!("invalid sample rate {}", self.sample_rate)))
        }
    }
}

/// Output that only starts once a user gesture has been granted.
#[derive(Debug, Clone)]
pub struct GatedOutput {
    sample_rate: f64,
    gesture: Arc<Notify>,
}

/// Grants the gesture a [`GatedOutput`] is waiting for.
#[derive(Debug, Clone)]
pub struct GestureHandle {
    gesture: Arc<Notify>,
}

impl GestureHandle {
    /// A grant made before the output starts is remembered.
    pub fn grant(&self) {
        self.gesture.notify_one();
    }
}

impl GatedOutput {
    pub fn new(sample_rate: f64) -> (Self, GestureHandle) {
        let gesture = Arc::new(Notify::new());
        let output = GatedOutput {
            sample_rate,
            gesture: gesture.clone(),
        };
        (output, GestureHandle { gesture })
    }
}

impl AudioOutput for GatedOutput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        debug!("Waiting for user gesture");
        self.gesture.notified().await;
        Ok(())
    }
}

/// Program accounting over the life of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub created: u64,
    pub disposed: u64,
}

impl SessionStats {
    /// Programs created and not yet disposed.
    pub fn live(&self) -> u64 {
        self.created - self.disposed
    }
}

pub struct EngineSession<O: AudioOutput> {
    output: O,
    initialized: bool,
    graph: AudioGraph,
    transport: Transport,
    rng: Box<dyn RngCore + Send>,
    registry: ProgramRegistry,
    active: Option<SoundProgram>,
    mixer: Mixer,
    stats: SessionStats,
}

impl<O: AudioOutput> EngineSession<O> {
    pub fn new(output: O) -> Self {
        Self::with_rng(output, StdRng::from_entropy())
    }

    /// Session with a caller-supplied random source, for reproducible output.
    pub fn with_rng(output: O, rng: impl RngCore + Send + 'static) -> Self {
        let graph = AudioGraph::new(output.sample_rate());
        EngineSession {
            output,
            initialized: false,
            graph,
            transport: Transport::new(),
            rng: Box::new(rng),
            registry: ProgramRegistry::default(),
            active: None,
            mixer: Mixer::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn with_registry(mut self, registry: ProgramRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn sample_rate(&self) -> f64 {
        self.graph.sample_rate()
    }

    /// Replace the active program with one built from `profile`.
    ///
    /// The previous program is disposed first, so on any error the session is
    /// left with no active program.
    pub async fn create_engine(&mut self, profile: Arc<SoundProfile>) -> Result<&SoundProgram, EngineError> {
        self.dispose_engine();
        self.ensure_output().await?;

        self.transport.stop();
        self.transport.cancel_all();
        self.transport.reset_position();

        let mut program = self.registry.construct(profile)?;
        program
            .start(ProgramContext {
                graph: &mut self.graph,
                transport: &mut self.transport,
                rng: &mut *self.rng,
            })
            .await?;
        self.transport.start(self.graph.time());

        self.stats.created += 1;
        info!(
            profile = %program.profile().id,
            kind = program.kind(),
            nodes = self.graph.len(),
            "Engine created"
        );
        Ok(&*self.active.insert(program))
    }

    async fn ensure_output(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        self.output.start().await?;
        self.initialized = true;
        info!(sample_rate = self.output.sample_rate(), "Audio output started");
        Ok(())
    }

    /// Silence the active program, if any, and stop the transport.
    pub fn stop_engine(&mut self) {
        if let Some(program) = self.active.as_mut() {
            program.stop(&mut self.graph, &mut self.transport);
        }
        self.transport.stop();
    }

    /// Tear down the active program and clear the slot. Returns the disposed
    /// program, or `None` if nothing was active.
    pub fn dispose_engine(&mut self) -> Option<SoundProgram> {
        let mut program = self.active.take()?;
        program.dispose(&mut self.graph, &mut self.transport);
        self.transport.stop();
        self.transport.cancel_all();
        self.stats.disposed += 1;
        info!(profile = %program.profile().id, nodes = self.graph.len(), "Engine disposed");
        Some(program)
    }

    pub fn current_engine(&self) -> Option<&SoundProgram> {
        self.active.as_ref()
    }

    /// Render `frames` stereo frames, firing due loops block by block.
    pub fn render(&mut self, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        let sample_rate = self.graph.sample_rate();
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(BLOCK_SIZE);
            let until = self.graph.time() + n as f64 / sample_rate;
            self.transport.advance(until, &mut self.graph, &mut *self.rng);
            self.mixer.clear(n);
            for i in 0..n {
                let [l, r] = self.graph.render_frame();
                self.mixer.add(i, l, r);
            }
            self.mixer.drain_into(&mut left, &mut right);
            remaining -= n;
        }
        (left, right)
    }
}
