//! Discrete-event simulation of Raft leader election over a stochastic
//! packet network.
//!
//! A cluster of Raft nodes is modeled as a hierarchy of atomic and coupled
//! discrete-event models: each node couples an inbound packet queue, a
//! message buffer, the Raft protocol state machine and its election-timeout
//! timer, and an outbound message queue; a shared network model joins the
//! nodes and gives every packet an independent exponential transit delay,
//! fanning broadcasts out to all other nodes. A root coordinator advances
//! simulated time to the minimum next-event time across all models, so runs
//! are fully deterministic for a given seed.
//!
//! # Example
//!
//! ```
//! use raftsim::config::SimulationConfig;
//! use raftsim::sim::Simulation;
//!
//! let config = SimulationConfig {
//!     cluster_size: 3,
//!     t_end: 0.3,
//!     seed: 7,
//!     trace: false,
//! };
//!
//! let mut simulation = Simulation::new(&config).unwrap();
//! simulation.run().unwrap();
//!
//! // One of the nodes timed out first, won the vote of its peers and now
//! // holds leadership for term 1.
//! let leaders = simulation.leaders();
//! assert_eq!(leaders.len(), 1);
//! assert_eq!(leaders[0].0, 1);
//! ```

#[macro_use]
mod macros;

pub mod config;
pub mod devs;
pub mod error;
pub mod message;
pub mod models;
pub mod sim;
pub mod stochastic;
pub mod trace;
