//! Runs a 3-node cluster to 0.3 s of simulated time and prints the outcome.
//!
//! The event trace lands in `logs/simulation_log_<timestamp>.txt`; protocol
//! logging goes through `env_logger` (`RUST_LOG=info` to see elections).

use raftsim::config::SimulationConfig;
use raftsim::sim::Simulation;

fn main() {
    env_logger::init();

    let config = SimulationConfig {
        cluster_size: 3,
        t_end: 0.3,
        seed: 0,
        trace: true,
    };

    let mut simulation = Simulation::new(&config).expect("cluster wiring");
    simulation.run().expect("simulation run");

    println!(
        "simulated {:.3} s across {} nodes",
        simulation.time(),
        config.cluster_size
    );
    for raft in simulation.rafts() {
        println!("  {}", raft);
    }
    match simulation.leaders().as_slice() {
        [] => println!("no leader elected"),
        leaders => {
            for (term, node_id) in leaders {
                println!("leader at term {}: {}", term, node_id);
            }
        }
    }
    if let Some(network) = simulation.network() {
        println!(
            "network: {} packets accepted, {} delivered, {} in flight",
            network.accepted(),
            network.delivered(),
            network.queued()
        );
    }
}
