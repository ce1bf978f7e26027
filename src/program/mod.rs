//! Sound programs: one generative ambience per profile type.
//!
//! A [`SoundProgram`] owns a flat list of graph nodes and a flat list of
//! transport loops. `start` builds the signal chain and the variant's layers
//! and fills both lists; `stop` halts sound but keeps the lists for
//! inspection; `dispose` removes everything and empties them.
//!
//! Variants are plain data behind the [`Variant`] enum. A [`ProgramRegistry`]
//! maps each `config.type` tag to a constructor.

mod binaural;
mod drone;
mod forest;
mod lofi;
mod noise;
mod ocean;
mod phasing;
mod rain;

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, info};

use crate::chain::{build_chain, ChainHandle, ChainOptions};
use crate::error::EngineError;
use crate::graph::{AudioGraph, Node, NodeId, ParamRef};
use crate::profile::{ProfileConfig, SoundProfile};
use crate::time::TimeSpec;
use crate::transport::{LoopId, Tick, Transport, DEFAULT_BPM};

pub use binaural::BinauralProgram;
pub use drone::DroneProgram;
pub use forest::ForestProgram;
pub use lofi::LofiProgram;
pub use noise::NoiseProgram;
pub use ocean::OceanProgram;
pub use phasing::PhasingProgram;
pub use rain::RainProgram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Constructed,
    Started,
    Stopped,
    /// Terminal.
    Disposed,
}

/// Mutable engine resources a program works against.
pub struct ProgramContext<'a> {
    pub graph: &'a mut AudioGraph,
    pub transport: &'a mut Transport,
    pub rng: &'a mut dyn RngCore,
}

/// Records every node and loop a variant creates so the program owns them.
pub struct ProgramBuilder<'a> {
    graph: &'a mut AudioGraph,
    transport: &'a mut Transport,
    rng: &'a mut dyn RngCore,
    components: &'a mut Vec<NodeId>,
    loops: &'a mut Vec<LoopId>,
}

impl ProgramBuilder<'_> {
    pub fn sample_rate(&self) -> f64 {
        self.graph.sample_rate()
    }

    pub fn bpm(&self) -> f64 {
        self.transport.bpm()
    }

    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut *self.rng
    }

    /// Fresh seed for a noise source.
    pub fn seed(&mut self) -> u32 {
        self.rng.next_u32()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = self.graph.add(node);
        self.components.push(id);
        id
    }

    /// Add `node` and route it into `to`.
    pub fn add_into(&mut self, node: Node, to: NodeId) -> Result<NodeId, EngineError> {
        let id = self.add(node);
        self.graph.connect(id, to)?;
        Ok(id)
    }

    /// Add a series of nodes wired in order, the last one into `to`.
    /// Returns the ids in the same order.
    pub fn add_path(&mut self, nodes: Vec<Node>, to: NodeId) -> Result<Vec<NodeId>, EngineError> {
        let ids: Vec<NodeId> = nodes.into_iter().map(|n| self.add(n)).collect();
        for pair in ids.windows(2) {
            self.graph.connect(pair[0], pair[1])?;
        }
        if let Some(&last) = ids.last() {
            self.graph.connect(last, to)?;
        }
        Ok(ids)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), EngineError> {
        self.graph.connect(from, to)
    }

    /// Add an LFO and layer it onto each of `targets`.
    pub fn lfo(&mut self, frequency: f64, min: f64, max: f64, targets: &[ParamRef]) -> Result<NodeId, EngineError> {
        let id = self.add(Node::lfo(frequency, min, max, self.graph.sample_rate()));
        for &target in targets {
            self.graph.modulate(id, target)?;
        }
        Ok(id)
    }

    pub fn param(&self, target: ParamRef) -> Option<f64> {
        self.graph.param(target)
    }

    pub fn schedule<F>(&mut self, interval: TimeSpec, offset: TimeSpec, callback: F) -> Result<LoopId, EngineError>
    where
        F: FnMut(&mut Tick<'_>) + Send + 'static,
    {
        let id = self.transport.schedule_repeat(interval, offset, callback)?;
        self.loops.push(id);
        Ok(id)
    }
}

/// Tagged dispatch over the built-in variants.
#[derive(Debug, Clone)]
pub enum Variant {
    Noise(NoiseProgram),
    Binaural(BinauralProgram),
    Rain(RainProgram),
    Ocean(OceanProgram),
    Forest(ForestProgram),
    Drone(DroneProgram),
    Phasing(PhasingProgram),
    Lofi(LofiProgram),
}

impl Variant {
    pub fn tag(&self) -> &'static str {
        match self {
            Variant::Noise(_) => noise::TAG,
            Variant::Binaural(_) => binaural::TAG,
            Variant::Rain(_) => rain::TAG,
            Variant::Ocean(_) => ocean::TAG,
            Variant::Forest(_) => forest::TAG,
            Variant::Drone(_) => drone::TAG,
            Variant::Phasing(_) => phasing::TAG,
            Variant::Lofi(_) => lofi::TAG,
        }
    }

    fn chain_options(&self) -> ChainOptions {
        match self {
            Variant::Noise(p) => p.chain_options(),
            Variant::Binaural(p) => p.chain_options(),
            Variant::Rain(p) => p.chain_options(),
            Variant::Ocean(p) => p.chain_options(),
            Variant::Forest(p) => p.chain_options(),
            Variant::Drone(p) => p.chain_options(),
            Variant::Phasing(p) => p.chain_options(),
            Variant::Lofi(p) => p.chain_options(),
        }
    }

    /// Tempo the variant wants the transport at, if it uses notation.
    fn bpm(&self) -> Option<f64> {
        match self {
            Variant::Drone(p) => Some(p.bpm()),
            Variant::Lofi(p) => Some(p.bpm()),
            _ => None,
        }
    }

    fn build(&self, b: &mut ProgramBuilder<'_>, chain: &ChainHandle) -> Result<(), EngineError> {
        match self {
            Variant::Noise(p) => p.build(b, chain),
            Variant::Binaural(p) => p.build(b, chain),
            Variant::Rain(p) => p.build(b, chain),
            Variant::Ocean(p) => p.build(b, chain),
            Variant::Forest(p) => p.build(b, chain),
            Variant::Drone(p) => p.build(b, chain),
            Variant::Phasing(p) => p.build(b, chain),
            Variant::Lofi(p) => p.build(b, chain),
        }
    }
}

#[derive(Debug)]
pub struct SoundProgram {
    profile: Arc<SoundProfile>,
    variant: Variant,
    state: ProgramState,
    components: Vec<NodeId>,
    loops: Vec<LoopId>,
}

impl SoundProgram {
    pub fn new(profile: Arc<SoundProfile>, variant: Variant) -> Self {
        SoundProgram {
            profile,
            variant,
            state: ProgramState::Constructed,
            components: Vec::new(),
            loops: Vec::new(),
        }
    }

    pub fn profile(&self) -> &SoundProfile {
        &self.profile
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn kind(&self) -> &'static str {
        self.variant.tag()
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// Every node this program owns, chain first.
    pub fn components(&self) -> &[NodeId] {
        &self.components
    }

    pub fn loops(&self) -> &[LoopId] {
        &self.loops
    }

    /// Build the chain and the variant's layers, and register its loops.
    ///
    /// On failure everything created so far is released and the program is
    /// left disposed.
    pub async fn start(&mut self, ctx: ProgramContext<'_>) -> Result<(), EngineError> {
        if self.state != ProgramState::Constructed {
            return Err(EngineError::InvalidTransition {
                action: "start",
                from: self.state,
            });
        }
        let ProgramContext {
            graph,
            transport,
            rng,
        } = ctx;

        if let Err(e) = self.launch(&mut *graph, &mut *transport, rng).await {
            self.release(graph, transport);
            self.state = ProgramState::Disposed;
            return Err(e);
        }

        self.state = ProgramState::Started;
        info!(
            profile = %self.profile.id,
            kind = self.kind(),
            components = self.components.len(),
            loops = self.loops.len(),
            "Sound program started"
        );
        Ok(())
    }

    async fn launch(
        &mut self,
        graph: &mut AudioGraph,
        transport: &mut Transport,
        rng: &mut dyn RngCore,
    ) -> Result<(), EngineError> {
        transport.set_bpm(self.variant.bpm().unwrap_or(DEFAULT_BPM))?;
        let options = self.variant.chain_options();
        let chain = build_chain(graph, &options, transport.bpm()).await?;
        self.components.extend_from_slice(&chain.nodes);

        let mut builder = ProgramBuilder {
            graph,
            transport,
            rng,
            components: &mut self.components,
            loops: &mut self.loops,
        };
        self.variant.build(&mut builder, &chain)
    }

    /// Cancel loops and silence sources. Lists and nodes stay. Idempotent.
    pub fn stop(&mut self, graph: &mut AudioGraph, transport: &mut Transport) {
        if self.state != ProgramState::Started {
            return;
        }
        for &id in &self.loops {
            transport.cancel(id);
        }
        for &id in &self.components {
            graph.silence(id);
        }
        self.state = ProgramState::Stopped;
        debug!(profile = %self.profile.id, "Sound program stopped");
    }

    /// Stop, then remove every owned node and empty both lists. Returns false
    /// if the program was already disposed.
    pub fn dispose(&mut self, graph: &mut AudioGraph, transport: &mut Transport) -> bool {
        if self.state == ProgramState::Disposed {
            return false;
        }
        self.stop(graph, transport);
        self.release(graph, transport);
        self.state = ProgramState::Disposed;
        debug!(profile = %self.profile.id, "Sound program disposed");
        true
    }

    fn release(&mut self, graph: &mut AudioGraph, transport: &mut Transport) {
        for id in self.loops.drain(..) {
            transport.cancel(id);
        }
        for id in self.components.drain(..).rev() {
            graph.remove(id);
        }
    }
}

/// Builds a variant from a profile config.
pub type Constructor = fn(&ProfileConfig) -> Result<Variant, EngineError>;

/// Maps `config.type` tags to variant constructors.
#[derive(Debug, Clone)]
pub struct ProgramRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        let mut registry = ProgramRegistry::empty();
        registry.register(noise::TAG, |c| Ok(Variant::Noise(NoiseProgram::from_config(c)?)));
        registry.register(binaural::TAG, |c| Ok(Variant::Binaural(BinauralProgram::from_config(c)?)));
        registry.register(rain::TAG, |c| Ok(Variant::Rain(RainProgram::from_config(c)?)));
        registry.register(ocean::TAG, |c| Ok(Variant::Ocean(OceanProgram::from_config(c)?)));
        registry.register(forest::TAG, |c| Ok(Variant::Forest(ForestProgram::from_config(c)?)));
        registry.register(drone::TAG, |c| Ok(Variant::Drone(DroneProgram::from_config(c)?)));
        registry.register(phasing::TAG, |c| Ok(Variant::Phasing(PhasingProgram::from_config(c)?)));
        registry.register(lofi::TAG, |c| Ok(Variant::Lofi(LofiProgram::from_config(c)?)));
        registry
    }
}

impl ProgramRegistry {
    pub fn empty() -> Self {
        ProgramRegistry {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: &'static str, constructor: Constructor) {
        self.constructors.insert(tag, constructor);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn types(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.constructors.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Look up the profile's type and construct an unstarted program.
    pub fn construct(&self, profile: Arc<SoundProfile>) -> Result<SoundProgram, EngineError> {
        let constructor = self
            .constructors
            .get(profile.config.kind.as_str())
            .ok_or_else(|| EngineError::UnknownProfileType(profile.config.kind.clone()))?;
        let variant = constructor(&profile.config)?;
        Ok(SoundProgram::new(profile, variant))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    pub const SR: f64 = 8000.0;

    /// A graph, transport and seeded rng for driving one program.
    pub struct Rig {
        pub graph: AudioGraph,
        pub transport: Transport,
        pub rng: StdRng,
    }

    impl Rig {
        pub fn new() -> Self {
            Rig {
                graph: AudioGraph::new(SR),
                transport: Transport::new(),
                rng: StdRng::seed_from_u64(42),
            }
        }

        pub fn ctx(&mut self) -> ProgramContext<'_> {
            ProgramContext {
                graph: &mut self.graph,
                transport: &mut self.transport,
                rng: &mut self.rng,
            }
        }

        /// Construct and start a program from a config, then start the clock.
        pub async fn start(&mut self, config: ProfileConfig) -> Result<SoundProgram, EngineError> {
            let profile = Arc::new(SoundProfile::new("test", config));
            let mut program = ProgramRegistry::default().construct(profile)?;
            program.start(self.ctx()).await?;
            self.transport.start(self.graph.time());
            Ok(program)
        }

        /// Render `seconds` of audio, firing loops block by block.
        pub fn run(&mut self, seconds: f64) -> Vec<[f64; 2]> {
            let frames = (seconds * SR) as usize;
            let mut out = Vec::with_capacity(frames);
            for chunk in 0..frames.div_ceil(128) {
                let n = 128.min(frames - chunk * 128);
                let until = self.graph.time() + n as f64 / SR;
                self.transport.advance(until, &mut self.graph, &mut self.rng);
                for _ in 0..n {
                    out.push(self.graph.render_frame());
                }
            }
            out
        }
    }

    pub fn energy(frames: &[[f64; 2]]) -> f64 {
        frames.iter().map(|f| f[0].abs() + f[1].abs()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn minimal(tag: &str) -> ProfileConfig {
        ProfileConfig::new(tag)
    }

    #[test]
    fn registry_knows_all_variants() {
        let registry = ProgramRegistry::default();
        assert_eq!(
            registry.types(),
            vec!["binaural", "drone", "forest", "lofi", "noise", "ocean", "phasing", "rain"]
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let profile = Arc::new(SoundProfile::new("x", ProfileConfig::new("not_a_real_type")));
        let err = ProgramRegistry::default().construct(profile).unwrap_err();
        assert!(matches!(err, EngineError::UnknownProfileType(ref t) if t == "not_a_real_type"));
    }

    #[tokio::test]
    async fn every_variant_starts_with_components_and_loops() {
        let registry = ProgramRegistry::default();
        for tag in registry.types() {
            let mut rig = Rig::new();
            let program = rig.start(minimal(tag)).await.unwrap();
            assert_eq!(program.state(), ProgramState::Started);
            assert_eq!(program.kind(), tag);
            assert!(!program.components().is_empty(), "{tag} has no components");
            let continuous = matches!(tag, "noise" | "binaural");
            assert_eq!(program.loops().is_empty(), continuous, "{tag} loop count");
            assert_eq!(rig.transport.pending(), program.loops().len());
            assert_eq!(rig.graph.len(), program.components().len());

            let audio = rig.run(2.0);
            assert!(energy(&audio) > 0.0, "{tag} is silent");
            assert!(audio.iter().all(|f| f[0].is_finite() && f[1].is_finite()));
        }
    }

    #[tokio::test]
    async fn stop_keeps_lists_and_silences_loops() {
        let mut rig = Rig::new();
        let mut program = rig.start(minimal("phasing")).await.unwrap();
        let components = program.components().to_vec();
        let loops = program.loops().to_vec();

        program.stop(&mut rig.graph, &mut rig.transport);
        program.stop(&mut rig.graph, &mut rig.transport);
        assert_eq!(program.state(), ProgramState::Stopped);
        assert_eq!(program.components(), components.as_slice());
        assert_eq!(program.loops(), loops.as_slice());
        assert_eq!(rig.transport.pending(), 0);
        assert_eq!(rig.graph.len(), components.len());

        let fired = rig.transport.fired();
        rig.run(40.0);
        assert_eq!(rig.transport.fired(), fired);
    }

    #[tokio::test]
    async fn dispose_empties_everything_once() {
        let mut rig = Rig::new();
        let mut program = rig.start(minimal("rain")).await.unwrap();
        rig.run(1.0);

        assert!(program.dispose(&mut rig.graph, &mut rig.transport));
        assert!(program.components().is_empty());
        assert!(program.loops().is_empty());
        assert_eq!(rig.transport.pending(), 0);
        assert!(rig.graph.is_empty());
        assert_eq!(rig.graph.input_count(NodeId::DESTINATION), 0);

        assert!(!program.dispose(&mut rig.graph, &mut rig.transport));
        assert_eq!(program.state(), ProgramState::Disposed);
    }

    #[tokio::test]
    async fn dispose_before_start_is_safe() {
        let mut rig = Rig::new();
        let profile = Arc::new(SoundProfile::new("n", minimal("noise")));
        let mut program = ProgramRegistry::default().construct(profile).unwrap();
        assert!(program.dispose(&mut rig.graph, &mut rig.transport));
        assert!(!program.dispose(&mut rig.graph, &mut rig.transport));
        assert!(matches!(
            program.start(rig.ctx()).await,
            Err(EngineError::InvalidTransition { from: ProgramState::Disposed, .. })
        ));
    }

    #[tokio::test]
    async fn stopped_program_cannot_restart() {
        let mut rig = Rig::new();
        let mut program = rig.start(minimal("drone")).await.unwrap();
        program.stop(&mut rig.graph, &mut rig.transport);
        let err = program.start(rig.ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                action: "start",
                from: ProgramState::Stopped
            }
        ));
    }

    #[tokio::test]
    async fn failed_chain_leaves_nothing_behind() {
        let mut rig = Rig::new();
        let config = minimal("noise").with("reverbDecay", -2.0);
        let profile = Arc::new(SoundProfile::new("bad", config));
        let mut program = ProgramRegistry::default().construct(profile).unwrap();
        let err = program.start(rig.ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::GraphBuild(_)));
        assert!(rig.graph.is_empty());
        assert!(program.components().is_empty());
        assert_eq!(rig.transport.pending(), 0);
    }
}
