//! Signal chain builder: the shared effects tail every program renders into.
//!
//! ```text
//! sources ─► [delay] ─► reverb ─┐
//! sources ──────────────────────┴─► connect = [crusher] ─► [hp] ─► [lp] ─► limiter ─► destination
//! ```
//!
//! The limiter is created first and is always present. Optional stages are
//! prepended in front of it, so `connect` is whichever node ended up first.
//! Reverb generation is the only suspend point; if it fails, or the build
//! future is dropped while suspended, every node created so far is removed.

use serde::Deserialize;
use tracing::debug;

use crate::dsp::filter::FilterType;
use crate::dsp::limiter::DEFAULT_CEILING_DB;
use crate::dsp::reverb::Reverb;
use crate::error::EngineError;
use crate::graph::{AudioGraph, Node, NodeId, Param, ParamRef};
use crate::time::TimeSpec;

pub const DEFAULT_REVERB_DECAY: f64 = 2.0;
pub const DEFAULT_REVERB_MIX: f64 = 0.3;

const FILTER_Q: f64 = 0.707;

/// Feedback delay that feeds the reverb.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelaySpec {
    pub time: TimeSpec,
    pub feedback: f64,
    pub mix: f64,
}

impl Default for DelaySpec {
    fn default() -> Self {
        DelaySpec {
            time: TimeSpec::notes(4),
            feedback: 0.3,
            mix: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainOptions {
    pub reverb_decay: Option<f64>,
    pub reverb_mix: Option<f64>,
    pub delay: Option<DelaySpec>,
    pub highpass: Option<f64>,
    pub lowpass: Option<f64>,
    pub bit_depth: Option<f64>,
    /// Master ceiling in dB.
    pub limiter_ceiling: f64,
}

impl Default for ChainOptions {
    fn default() -> Self {
        ChainOptions {
            reverb_decay: None,
            reverb_mix: None,
            delay: None,
            highpass: None,
            lowpass: None,
            bit_depth: None,
            limiter_ceiling: DEFAULT_CEILING_DB,
        }
    }
}

/// A built chain. Every id in `nodes` is owned by the program that asked
/// for the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainHandle {
    /// Creation order, limiter first.
    pub nodes: Vec<NodeId>,
    /// Head of the dry path.
    pub connect: NodeId,
    pub reverb_entry: NodeId,
    pub delay_entry: Option<NodeId>,
    pub limiter: NodeId,
    pub highpass: Option<ParamRef>,
    pub lowpass: Option<ParamRef>,
    pub bits: Option<ParamRef>,
    pub reverb_mix: ParamRef,
}

/// Nodes created by an in-flight build. Removed on drop unless the build
/// completes.
struct PartialChain<'g> {
    graph: &'g mut AudioGraph,
    nodes: Vec<NodeId>,
}

impl PartialChain<'_> {
    fn add(&mut self, node: Node) -> NodeId {
        let id = self.graph.add(node);
        self.nodes.push(id);
        id
    }

    fn finish(mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.nodes)
    }
}

impl Drop for PartialChain<'_> {
    fn drop(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        debug!(count = self.nodes.len(), "Releasing partially built chain");
        for id in self.nodes.drain(..).rev() {
            self.graph.remove(id);
        }
    }
}

fn cutoff(kind: &str, hz: f64) -> Result<f64, EngineError> {
    if hz.is_finite() && hz > 0.0 {
        Ok(hz)
    } else {
        Err(EngineError::GraphBuild(format!("{kind} cutoff must be positive, got {hz}")))
    }
}

pub async fn build_chain(
    graph: &mut AudioGraph,
    options: &ChainOptions,
    bpm: f64,
) -> Result<ChainHandle, EngineError> {
    let sample_rate = graph.sample_rate();
    let mut chain = PartialChain {
        graph,
        nodes: Vec::new(),
    };

    let limiter = chain.add(Node::limiter(options.limiter_ceiling, sample_rate));
    chain.graph.connect(limiter, NodeId::DESTINATION)?;
    let mut head = limiter;

    let mut lowpass = None;
    if let Some(hz) = options.lowpass {
        let id = chain.add(Node::filter(FilterType::Lowpass, cutoff("lowpass", hz)?, FILTER_Q, sample_rate));
        chain.graph.connect(id, head)?;
        lowpass = Some(ParamRef::new(id, Param::Cutoff));
        head = id;
    }

    let mut highpass = None;
    if let Some(hz) = options.highpass {
        let id = chain.add(Node::filter(FilterType::Highpass, cutoff("highpass", hz)?, FILTER_Q, sample_rate));
        chain.graph.connect(id, head)?;
        highpass = Some(ParamRef::new(id, Param::Cutoff));
        head = id;
    }

    let mut bits = None;
    if let Some(depth) = options.bit_depth {
        let id = chain.add(Node::bitcrusher(depth));
        chain.graph.connect(id, head)?;
        bits = Some(ParamRef::new(id, Param::Bits));
        head = id;
    }

    let decay = options.reverb_decay.unwrap_or(DEFAULT_REVERB_DECAY);
    let mix = options.reverb_mix.unwrap_or(DEFAULT_REVERB_MIX);
    let reverb = Reverb::generate(decay, mix, sample_rate).await?;
    let reverb_entry = chain.add(Node::reverb(reverb));
    chain.graph.connect(reverb_entry, head)?;

    let mut delay_entry = None;
    if let Some(spec) = options.delay {
        let time = spec.time.resolve(bpm);
        if !time.is_finite() || time <= 0.0 {
            return Err(EngineError::GraphBuild(format!("delay time {} must be positive", spec.time)));
        }
        let id = chain.add(Node::delay(time, spec.feedback, spec.mix, sample_rate));
        chain.graph.connect(id, reverb_entry)?;
        delay_entry = Some(id);
    }

    let nodes = chain.finish();
    debug!(nodes = nodes.len(), decay, "Signal chain built");
    Ok(ChainHandle {
        nodes,
        connect: head,
        reverb_entry,
        delay_entry,
        limiter,
        highpass,
        lowpass,
        bits,
        reverb_mix: ParamRef::new(reverb_entry, Param::Mix),
    })
}
