//! Audio graph: an arena of nodes joined by audio and modulation edges.
//!
//! Every node is addressed by a [`NodeId`]. Ids grow monotonically and are
//! never reused, so a stale id held by a disposed program can only miss,
//! never alias a newer node. Id 0 is the shared destination and cannot be
//! removed.
//!
//! Rendering is pull-free: nodes are visited in topological order once per
//! frame, each summing the outputs of its audio inputs and the current values
//! of its modulators.

pub mod node;

use std::fmt;

pub use node::{db_to_gain, Frame, Node, Param};

use crate::dsp::voice::NoteEvent;
use crate::error::EngineError;
use node::Modulation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const DESTINATION: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of one modulatable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub node: NodeId,
    pub param: Param,
}

impl ParamRef {
    pub fn new(node: NodeId, param: Param) -> Self {
        ParamRef { node, param }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    inputs: Vec<NodeId>,
    modulators: Vec<(Param, NodeId)>,
    output: Frame,
}

#[derive(Debug)]
pub struct AudioGraph {
    sample_rate: f64,
    slots: Vec<Option<Slot>>,
    live: usize,
    order: Vec<usize>,
    order_dirty: bool,
    clock: u64,
    /// Timed parameter changes, ordered by sample.
    param_changes: Vec<(u64, ParamRef, f64)>,
}

impl AudioGraph {
    pub fn new(sample_rate: f64) -> Self {
        AudioGraph {
            sample_rate,
            slots: vec![Some(Slot {
                node: Node::Destination,
                inputs: Vec::new(),
                modulators: Vec::new(),
                output: [0.0; 2],
            })],
            live: 0,
            order: Vec::new(),
            order_dirty: true,
            clock: 0,
            param_changes: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn destination(&self) -> NodeId {
        NodeId::DESTINATION
    }

    /// Frames rendered so far.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Render position in seconds.
    pub fn time(&self) -> f64 {
        self.clock as f64 / self.sample_rate
    }

    /// Number of live nodes, not counting the destination.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slot(id).map(|s| &s.node)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slot_mut(id).map(|s| &mut s.node)
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Slot {
            node,
            inputs: Vec::new(),
            modulators: Vec::new(),
            output: [0.0; 2],
        }));
        self.live += 1;
        self.order_dirty = true;
        id
    }

    /// Remove a node and every edge touching it. Returns false for unknown
    /// ids and for the destination.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == NodeId::DESTINATION || !self.contains(id) {
            return false;
        }
        self.slots[id.0 as usize] = None;
        for slot in self.slots.iter_mut().flatten() {
            slot.inputs.retain(|&i| i != id);
            slot.modulators.retain(|&(_, m)| m != id);
        }
        self.param_changes.retain(|(_, target, _)| target.node != id);
        self.live -= 1;
        self.order_dirty = true;
        true
    }

    fn require(&self, id: NodeId) -> Result<&Node, EngineError> {
        self.node(id)
            .ok_or_else(|| EngineError::GraphBuild(format!("node {id} does not exist")))
    }

    /// Whether `target` is reachable by walking upstream from `start`.
    fn is_upstream(&self, target: NodeId, start: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.slots.len()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            let idx = id.0 as usize;
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            if let Some(slot) = self.slot(id) {
                stack.extend(slot.inputs.iter().copied());
                stack.extend(slot.modulators.iter().map(|&(_, m)| m));
            }
        }
        false
    }

    /// Route the audio output of `from` into `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), EngineError> {
        let source = self.require(from)?;
        if source.is_modulator() {
            return Err(EngineError::GraphBuild(format!(
                "{} {from} only drives parameters",
                source.kind_name()
            )));
        }
        if from == NodeId::DESTINATION {
            return Err(EngineError::GraphBuild("destination has no outputs".into()));
        }
        if self.require(to)?.is_modulator() {
            return Err(EngineError::GraphBuild(format!("lfo {to} takes no audio input")));
        }
        if from == to || self.is_upstream(to, from) {
            return Err(EngineError::GraphBuild(format!(
                "connecting {from} -> {to} would form a cycle"
            )));
        }
        if let Some(slot) = self.slot_mut(to) {
            if !slot.inputs.contains(&from) {
                slot.inputs.push(from);
            }
        }
        self.order_dirty = true;
        Ok(())
    }

    /// Layer the output of modulator `lfo` onto a parameter.
    pub fn modulate(&mut self, lfo: NodeId, target: ParamRef) -> Result<(), EngineError> {
        let source = self.require(lfo)?;
        if !source.is_modulator() {
            return Err(EngineError::GraphBuild(format!(
                "{} {lfo} cannot drive a parameter",
                source.kind_name()
            )));
        }
        let dest = self.require(target.node)?;
        if !dest.accepts(target.param) {
            return Err(EngineError::GraphBuild(format!(
                "{} {} has no {:?} parameter",
                dest.kind_name(),
                target.node,
                target.param
            )));
        }
        if let Some(slot) = self.slot_mut(target.node) {
            slot.modulators.push((target.param, lfo));
        }
        self.order_dirty = true;
        Ok(())
    }

    /// Base value of a parameter.
    pub fn param(&self, target: ParamRef) -> Option<f64> {
        self.node(target.node)?.param_value(target.param)
    }

    pub fn set_param(&mut self, target: ParamRef, value: f64) -> bool {
        self.node_mut(target.node)
            .is_some_and(|n| n.set_param(target.param, value))
    }

    /// Set a parameter when the render clock reaches `time` seconds. Times
    /// already rendered apply at once. Returns false if the node is gone or
    /// has no such parameter.
    pub fn set_param_at(&mut self, target: ParamRef, value: f64, time: f64) -> bool {
        if self.param(target).is_none() {
            return false;
        }
        let at = (time.max(0.0) * self.sample_rate).round() as u64;
        if at <= self.clock {
            return self.set_param(target, value);
        }
        let idx = self.param_changes.partition_point(|(s, _, _)| *s <= at);
        self.param_changes.insert(idx, (at, target, value));
        true
    }

    /// Timed parameter changes not yet applied.
    pub fn pending_param_changes(&self) -> usize {
        self.param_changes.len()
    }

    fn apply_due_params(&mut self) {
        let due = self.param_changes.partition_point(|(s, _, _)| *s <= self.clock);
        for (_, target, value) in self.param_changes.drain(..due).collect::<Vec<_>>() {
            self.set_param(target, value);
        }
    }

    /// Queue a note on a voice pool. Returns false if the node is gone or is
    /// not a voice pool.
    pub fn trigger(&mut self, id: NodeId, event: NoteEvent) -> bool {
        match self.node_mut(id) {
            Some(Node::Voices { pool, .. }) => {
                pool.schedule(event);
                true
            }
            _ => false,
        }
    }

    pub fn silence(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.silence();
        }
    }

    /// Number of audio inputs feeding `id`.
    pub fn input_count(&self, id: NodeId) -> usize {
        self.slot(id).map_or(0, |s| s.inputs.len())
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        self.slot(id).map_or(&[], |s| s.inputs.as_slice())
    }

    fn rebuild_order(&mut self) {
        // Kahn's algorithm over audio and modulation edges, lowest id first.
        let n = self.slots.len();
        let mut indegree = vec![0usize; n];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let upstream = slot
                .inputs
                .iter()
                .copied()
                .chain(slot.modulators.iter().map(|&(_, m)| m));
            for up in upstream {
                indegree[idx] += 1;
                downstream[up.0 as usize].push(idx);
            }
        }

        let mut ready: std::collections::BTreeSet<usize> = (0..n)
            .filter(|&i| self.slots[i].is_some() && indegree[i] == 0)
            .collect();
        self.order.clear();
        while let Some(idx) = ready.pop_first() {
            self.order.push(idx);
            for &next in &downstream[idx] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.insert(next);
                }
            }
        }
        self.order_dirty = false;
    }

    /// Render one stereo frame at the destination and advance the clock.
    pub fn render_frame(&mut self) -> Frame {
        if self.order_dirty {
            self.rebuild_order();
        }
        if !self.param_changes.is_empty() {
            self.apply_due_params();
        }
        let clock = self.clock;
        for i in 0..self.order.len() {
            let idx = self.order[i];
            let (input, modulation) = {
                let Some(slot) = self.slots[idx].as_ref() else { continue };
                let mut input = [0.0; 2];
                for up in &slot.inputs {
                    if let Some(s) = self.slot(*up) {
                        input[0] += s.output[0];
                        input[1] += s.output[1];
                    }
                }
                let mut modulation = Modulation::default();
                for &(param, m) in &slot.modulators {
                    if let Some(s) = self.slot(m) {
                        modulation.add(param, s.output[0]);
                    }
                }
                (input, modulation)
            };
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.output = slot.node.process(input, &modulation, clock);
            }
        }
        self.clock += 1;
        self.slot(NodeId::DESTINATION)
            .map_or([0.0; 2], |s| s.output)
    }
}
