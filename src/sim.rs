//! Cluster assembly and the top-level simulation API.
//!
//! Builds the coupled hierarchy (per-node Raft units wrapped in network
//! stacks, all joined by the shared network), flattens it into a
//! coordinator, and exposes a small inspection surface for drivers and
//! tests. Node identity and peer sets are handed to each model at
//! construction; no wiring step reaches back into a built model.

use std::collections::BTreeSet;

use rand_chacha::ChaChaRng;
use rand_core::{RngCore, SeedableRng};

use crate::config::SimulationConfig;
use crate::devs::{Coordinator, Coupled, Time};
use crate::error::SimulationError;
use crate::message::NodeId;
use crate::models::{
    buffer, heartbeat, message_processor, network, packet_processor, raft, BufferModel,
    HeartbeatController, MessageProcessor, Model, NetworkModel, PacketProcessor, RaftController,
};
use crate::trace::TraceWriter;

/// Parent-facing input port of the node and Raft coupled models.
pub const EXTERNAL_INPUT: &str = "external_input";
/// Parent-facing output port of the node and Raft coupled models.
pub const OUTPUT_EXTERNAL: &str = "output_external";
/// Parent-facing database port of the node and Raft coupled models.
pub const OUTPUT_DATABASE: &str = "output_database";

/// The Raft unit of one node: inbound buffer, protocol controller and
/// heartbeat timer, wired together.
pub fn raft_unit(node_id: &str, peers: BTreeSet<NodeId>, random: &mut ChaChaRng) -> Coupled<Model> {
    let controller = RaftController::new(node_id, peers, ChaChaRng::seed_from_u64(random.next_u64()));
    let timer = HeartbeatController::new(ChaChaRng::seed_from_u64(random.next_u64()));

    let mut unit = Coupled::new();
    unit.add_atomic("buffer", BufferModel::new().into());
    unit.add_atomic("controller", controller.into());
    unit.add_atomic("heartbeat", timer.into());

    unit.couple("buffer", buffer::OUTPUT, "controller", raft::INPUT_BUFFER);
    unit.couple("controller", raft::OUTPUT_HEARTBEAT, "heartbeat", heartbeat::INPUT);
    unit.couple("heartbeat", heartbeat::OUTPUT, "controller", raft::INPUT_HEARTBEAT);
    unit.couple_input(EXTERNAL_INPUT, "buffer", buffer::INPUT);
    unit.couple_output("controller", raft::OUTPUT_EXTERNAL, OUTPUT_EXTERNAL);
    unit.couple_output("controller", raft::OUTPUT_DATABASE, OUTPUT_DATABASE);
    unit
}

/// One full node: packet processor in front of the Raft unit, message
/// processor behind it.
pub fn node(node_id: &str, peers: BTreeSet<NodeId>, random: &mut ChaChaRng) -> Coupled<Model> {
    let inbound = PacketProcessor::new(ChaChaRng::seed_from_u64(random.next_u64()));
    let outbound = MessageProcessor::new(ChaChaRng::seed_from_u64(random.next_u64()));

    let mut node = Coupled::new();
    node.add_atomic("packet-processor", inbound.into());
    node.add_coupled("raft", raft_unit(node_id, peers, random));
    node.add_atomic("message-processor", outbound.into());

    node.couple("packet-processor", packet_processor::OUTPUT, "raft", EXTERNAL_INPUT);
    node.couple("raft", OUTPUT_EXTERNAL, "message-processor", message_processor::INPUT);
    node.couple_input(EXTERNAL_INPUT, "packet-processor", packet_processor::INPUT);
    node.couple_output("message-processor", message_processor::OUTPUT, OUTPUT_EXTERNAL);
    node.couple_output("raft", OUTPUT_DATABASE, OUTPUT_DATABASE);
    node
}

/// The whole cluster: every node joined through the shared network.
pub fn cluster(config: &SimulationConfig) -> Coupled<Model> {
    let node_ids = node_ids(config.cluster_size);
    let mut random = ChaChaRng::seed_from_u64(config.seed);

    let mut top = Coupled::new();
    for node_id in &node_ids {
        let peers: BTreeSet<NodeId> = node_ids
            .iter()
            .filter(|peer| *peer != node_id)
            .cloned()
            .collect();
        top.add_coupled(node_id, node(node_id, peers, &mut random));
    }
    top.add_atomic(
        "network",
        NetworkModel::new(node_ids.clone(), ChaChaRng::seed_from_u64(random.next_u64())).into(),
    );

    for node_id in &node_ids {
        top.couple("network", &network::output_port(node_id), node_id, EXTERNAL_INPUT);
        top.couple(node_id, OUTPUT_EXTERNAL, "network", &network::input_port(node_id));
    }
    top
}

/// The node identities of a cluster of the given size: `node0..node{n-1}`.
pub fn node_ids(cluster_size: usize) -> Vec<NodeId> {
    (0..cluster_size).map(|index| format!("node{}", index)).collect()
}

/// A runnable cluster simulation.
pub struct Simulation {
    coordinator: Coordinator<Model>,
    node_ids: Vec<NodeId>,
    t_end: Time,
}

impl Simulation {
    /// Builds and wires a cluster per the configuration.
    ///
    /// # Errors
    ///
    /// Fails on wiring bugs surfaced while flattening the hierarchy.
    pub fn new(config: &SimulationConfig) -> Result<Self, SimulationError> {
        let trace = if config.trace {
            TraceWriter::create()
        } else {
            TraceWriter::disabled()
        };
        let coordinator = Coordinator::new(cluster(config), trace)?;
        Ok(Self {
            coordinator,
            node_ids: node_ids(config.cluster_size),
            t_end: config.t_end,
        })
    }

    /// The current simulated time.
    pub fn time(&self) -> Time {
        self.coordinator.time()
    }

    /// The node identities of this cluster.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Processes a single event instant. Returns the instant, or `None` when
    /// every model is passive.
    pub fn step(&mut self) -> Result<Option<Time>, SimulationError> {
        self.coordinator.step()
    }

    /// Runs until the given simulated time.
    pub fn run_until(&mut self, t_end: Time) -> Result<(), SimulationError> {
        self.coordinator.run_until(t_end)
    }

    /// Runs to the configured end time.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        let t_end = self.t_end;
        self.run_until(t_end)
    }

    /// The Raft controller of the given node.
    pub fn raft(&self, node_id: &str) -> Option<&RaftController> {
        self.coordinator
            .model(&format!("{}.raft.controller", node_id))
            .and_then(Model::as_raft)
    }

    /// Every Raft controller, in node order.
    pub fn rafts(&self) -> impl Iterator<Item = &RaftController> {
        self.node_ids
            .iter()
            .filter_map(move |node_id| self.raft(node_id))
    }

    /// The `(term, node)` pairs of every node currently in the leader role.
    pub fn leaders(&self) -> Vec<(u64, NodeId)> {
        self.rafts()
            .filter(|raft| raft.is_leader())
            .map(|raft| (raft.current_term(), raft.node_id().clone()))
            .collect()
    }

    /// The shared network model.
    pub fn network(&self) -> Option<&NetworkModel> {
        self.coordinator.model("network").and_then(Model::as_network)
    }

    /// The heartbeat timer of the given node.
    pub fn heartbeat(&self, node_id: &str) -> Option<&HeartbeatController> {
        self.coordinator
            .model(&format!("{}.raft.heartbeat", node_id))
            .and_then(Model::as_heartbeat)
    }

    /// Mutable access to the given node's outbound message processor, for
    /// fault injection.
    pub fn message_processor_mut(&mut self, node_id: &str) -> Option<&mut MessageProcessor> {
        self.coordinator
            .model_mut(&format!("{}.message-processor", node_id))
            .and_then(Model::as_message_processor_mut)
    }

    /// The underlying coordinator.
    pub fn coordinator(&self) -> &Coordinator<Model> {
        &self.coordinator
    }
}
