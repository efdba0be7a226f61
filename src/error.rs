//! Error types for simulation construction and execution.

use thiserror::Error;

use crate::message::NodeId;

/// A fatal error raised while wiring or running a simulation.
///
/// Protocol-level rejections (stale terms, invalid certificates, heartbeats
/// from an unknown leader) are not errors; they are dropped by the models and
/// at most traced. Everything in this enum indicates a wiring bug.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A packet was addressed to a node the network has no port for.
    #[error("packet from `{sender}` addressed to unknown node `{destination}`")]
    UnknownDestination {
        /// The unroutable destination address.
        destination: NodeId,
        /// The node which sent the packet.
        sender: NodeId,
    },

    /// A coupling referenced a child component that does not exist.
    #[error("coupling references unknown child `{name}`")]
    UnknownComponent {
        /// The dangling child name.
        name: String,
    },

    /// A coupling endpoint on a coupled child has no onward connection.
    #[error("coupling endpoint `{endpoint}` never reaches an atomic port")]
    DanglingCoupling {
        /// The endpoint, as `child.port`.
        endpoint: String,
    },
}
