#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use rand_chacha::ChaChaRng;
use rand_core::SeedableRng;

use raftsim::config::SimulationConfig;
use raftsim::devs::Time;
use raftsim::message::NodeId;
use raftsim::models::raft::{RaftController, Role};
use raftsim::sim::Simulation;

pub const SEED: u64 = 0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn init_random() -> ChaChaRng {
    ChaChaRng::seed_from_u64(SEED)
}

pub fn cluster(size: usize, seed: u64) -> Simulation {
    init_logging();
    let config = SimulationConfig {
        cluster_size: size,
        t_end: 0.3,
        seed,
        trace: false,
    };
    Simulation::new(&config).expect("cluster wiring")
}

/// Builds a bare Raft controller for driving its transitions directly.
pub fn raft(node_id: &str, peers: &[&str], random: &mut ChaChaRng) -> RaftController {
    init_logging();
    let peers: BTreeSet<NodeId> = peers.iter().map(|peer| peer.to_string()).collect();
    RaftController::new(
        node_id,
        peers,
        ChaChaRng::seed_from_u64(rand_core::RngCore::next_u64(random)),
    )
}

/// Observes protocol invariants over a stepped run: terms never decrease,
/// the commit index stays inside the log, and leadership transitions are
/// recorded as `(term, node)` pairs.
#[derive(Default)]
pub struct InvariantWatch {
    prev_roles: BTreeMap<NodeId, Role>,
    prev_terms: BTreeMap<NodeId, u64>,
    pub elections: Vec<(u64, NodeId)>,
}

impl InvariantWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sim: &Simulation) {
        for raft in sim.rafts() {
            let node_id = raft.node_id().clone();
            let term = raft.current_term();
            if let Some(prev) = self.prev_terms.get(&node_id) {
                assert!(
                    term >= *prev,
                    "term went backwards on {}: {} -> {}",
                    node_id,
                    prev,
                    term
                );
            }
            self.prev_terms.insert(node_id.clone(), term);

            let log_length = raft.message_log().len() as u64;
            if log_length == 0 {
                assert_eq!(raft.commit_index(), 0, "commit index on an empty log");
            } else {
                assert!(
                    raft.commit_index() <= log_length - 1,
                    "commit index {} past log of length {} on {}",
                    raft.commit_index(),
                    log_length,
                    node_id
                );
            }

            let role = raft.role();
            let prev_role = self.prev_roles.insert(node_id.clone(), role);
            if role == Role::Leader && prev_role != Some(Role::Leader) {
                self.elections.push((term, node_id));
            }
        }
    }

    pub fn assert_single_leader_per_term(&self) {
        let mut winners: BTreeMap<u64, &NodeId> = BTreeMap::new();
        for (term, node_id) in &self.elections {
            if let Some(winner) = winners.insert(*term, node_id) {
                assert_eq!(
                    winner, node_id,
                    "two leaders elected at term {}: {} and {}",
                    term, winner, node_id
                );
            }
        }
    }
}

/// Steps the simulation until `t_end`, feeding every instant to the watch.
pub fn run_watched(sim: &mut Simulation, watch: &mut InvariantWatch, t_end: Time) {
    watch.observe(sim);
    while sim.coordinator().next_event_time() < t_end {
        sim.step().expect("simulation step");
        watch.observe(sim);
    }
}

/// Steps the simulation until the predicate holds, failing past `deadline`.
pub fn run_until_holds(
    sim: &mut Simulation,
    watch: &mut InvariantWatch,
    deadline: Time,
    mut predicate: impl FnMut(&Simulation) -> bool,
) {
    watch.observe(sim);
    while !predicate(sim) {
        assert!(
            sim.coordinator().next_event_time() < deadline,
            "condition not reached by simulated time {}",
            deadline
        );
        sim.step().expect("simulation step");
        watch.observe(sim);
    }
}
