//! The atomic models of the simulation.
//!
//! [`Model`] is the tagged sum the coordinator schedules; every variant
//! delegates the four transition operations to its concrete model. The
//! accessors let tests and the inspection API reach a concrete model without
//! downcasting.

pub mod buffer;
pub mod heartbeat;
pub mod message_processor;
pub mod network;
pub mod packet_processor;
pub mod raft;

use core::fmt;

pub use buffer::BufferModel;
pub use heartbeat::HeartbeatController;
pub use message_processor::MessageProcessor;
pub use network::NetworkModel;
pub use packet_processor::PacketProcessor;
pub use raft::RaftController;

use crate::devs::{Atomic, Bag, Time};
use crate::error::SimulationError;

/// Any atomic model of the simulation.
pub enum Model {
    /// Inbound FIFO feeding a Raft controller.
    Buffer(BufferModel),
    /// Election-timeout / heartbeat-tick timer.
    Heartbeat(HeartbeatController),
    /// Raft protocol state machine.
    Raft(RaftController),
    /// The shared packet network.
    Network(NetworkModel),
    /// Per-node inbound packet queue.
    PacketProcessor(PacketProcessor),
    /// Per-node outbound message queue.
    MessageProcessor(MessageProcessor),
}

impl Model {
    /// This model as a Raft controller, if it is one.
    pub fn as_raft(&self) -> Option<&RaftController> {
        match self {
            Model::Raft(raft) => Some(raft),
            _ => None,
        }
    }

    /// Mutable access to the Raft controller, if this is one.
    pub fn as_raft_mut(&mut self) -> Option<&mut RaftController> {
        match self {
            Model::Raft(raft) => Some(raft),
            _ => None,
        }
    }

    /// This model as the network, if it is one.
    pub fn as_network(&self) -> Option<&NetworkModel> {
        match self {
            Model::Network(network) => Some(network),
            _ => None,
        }
    }

    /// Mutable access to the outbound message processor, if this is one.
    pub fn as_message_processor_mut(&mut self) -> Option<&mut MessageProcessor> {
        match self {
            Model::MessageProcessor(processor) => Some(processor),
            _ => None,
        }
    }

    /// This model as a heartbeat controller, if it is one.
    pub fn as_heartbeat(&self) -> Option<&HeartbeatController> {
        match self {
            Model::Heartbeat(controller) => Some(controller),
            _ => None,
        }
    }
}

impl Atomic for Model {
    fn internal(&mut self) {
        match self {
            Model::Buffer(model) => model.internal(),
            Model::Heartbeat(model) => model.internal(),
            Model::Raft(model) => model.internal(),
            Model::Network(model) => model.internal(),
            Model::PacketProcessor(model) => model.internal(),
            Model::MessageProcessor(model) => model.internal(),
        }
    }

    fn external(&mut self, elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        match self {
            Model::Buffer(model) => model.external(elapsed, inputs),
            Model::Heartbeat(model) => model.external(elapsed, inputs),
            Model::Raft(model) => model.external(elapsed, inputs),
            Model::Network(model) => model.external(elapsed, inputs),
            Model::PacketProcessor(model) => model.external(elapsed, inputs),
            Model::MessageProcessor(model) => model.external(elapsed, inputs),
        }
    }

    fn output(&self, outputs: &mut Bag) {
        match self {
            Model::Buffer(model) => model.output(outputs),
            Model::Heartbeat(model) => model.output(outputs),
            Model::Raft(model) => model.output(outputs),
            Model::Network(model) => model.output(outputs),
            Model::PacketProcessor(model) => model.output(outputs),
            Model::MessageProcessor(model) => model.output(outputs),
        }
    }

    fn time_advance(&self) -> Time {
        match self {
            Model::Buffer(model) => model.time_advance(),
            Model::Heartbeat(model) => model.time_advance(),
            Model::Raft(model) => model.time_advance(),
            Model::Network(model) => model.time_advance(),
            Model::PacketProcessor(model) => model.time_advance(),
            Model::MessageProcessor(model) => model.time_advance(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Buffer(model) => fmt::Display::fmt(model, fmt),
            Model::Heartbeat(model) => fmt::Display::fmt(model, fmt),
            Model::Raft(model) => fmt::Display::fmt(model, fmt),
            Model::Network(model) => fmt::Display::fmt(model, fmt),
            Model::PacketProcessor(model) => fmt::Display::fmt(model, fmt),
            Model::MessageProcessor(model) => fmt::Display::fmt(model, fmt),
        }
    }
}

impl From<BufferModel> for Model {
    fn from(model: BufferModel) -> Self {
        Model::Buffer(model)
    }
}

impl From<HeartbeatController> for Model {
    fn from(model: HeartbeatController) -> Self {
        Model::Heartbeat(model)
    }
}

impl From<RaftController> for Model {
    fn from(model: RaftController) -> Self {
        Model::Raft(model)
    }
}

impl From<NetworkModel> for Model {
    fn from(model: NetworkModel) -> Self {
        Model::Network(model)
    }
}

impl From<PacketProcessor> for Model {
    fn from(model: PacketProcessor) -> Self {
        Model::PacketProcessor(model)
    }
}

impl From<MessageProcessor> for Model {
    fn from(model: MessageProcessor) -> Self {
        Model::MessageProcessor(model)
    }
}
