//! Simulation parameters.

use crate::devs::Time;

/// Configurable parameters of a simulation run.
///
/// Everything else in the simulation is derived from these three values plus
/// the model constants: node identities are `node0..node{n-1}`, each node's
/// peer set is the full cluster minus itself, and every stochastic draw in
/// the run is seeded (directly or indirectly) from `seed`.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Number of Raft nodes in the cluster.
    pub cluster_size: usize,

    /// Simulated time at which the run stops, in seconds.
    pub t_end: Time,

    /// Master seed for every pseudo-random draw in the run. Two runs with the
    /// same configuration produce identical event histories.
    pub seed: u64,

    /// Whether to write the event trace to a timestamped file under `logs/`.
    pub trace: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cluster_size: 3,
            t_end: 0.3,
            seed: 0,
            trace: false,
        }
    }
}
