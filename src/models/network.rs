//! The switched packet network.
//!
//! One atomic model with a port pair per active node. Every packet gets an
//! independent exponential transit delay; a packet addressed to the wildcard
//! `*` is fanned out to every active node except its source, all copies
//! sharing the same payload. Queued packets are released in order of their
//! absolute release time, ties kept in arrival order.

use core::fmt;
use std::collections::BinaryHeap;

use rand_chacha::ChaChaRng;

use crate::devs::{Atomic, Bag, Payload, Time, PASSIVE};
use crate::error::SimulationError;
use crate::message::{NodeId, Packet, PacketEvent, BROADCAST};
use crate::stochastic::exponential_delay;

/// Transit rate (1/mean seconds) for every packet.
pub const TRANSIT_RATE: f64 = 1_000_000.0;

/// The input port carrying packets from the given node.
pub fn input_port(node_id: &str) -> String {
    format!("input_packet_{}", node_id)
}

/// The output port delivering packets to the given node.
pub fn output_port(node_id: &str) -> String {
    format!("output_packet_{}", node_id)
}

/// The stochastic-latency network connecting all nodes.
pub struct NetworkModel {
    queue: BinaryHeap<PacketEvent>,
    active_nodes: Vec<NodeId>,
    current_time: Time,
    random: ChaChaRng,
    seq: u64,
    accepted: u64,
    delivered: u64,
}

impl NetworkModel {
    /// Creates a network serving the given nodes, one port pair each.
    pub fn new(active_nodes: Vec<NodeId>, random: ChaChaRng) -> Self {
        Self {
            queue: BinaryHeap::new(),
            active_nodes,
            current_time: 0.0,
            random,
            seq: 0,
            accepted: 0,
            delivered: 0,
        }
    }

    /// The nodes this network serves.
    pub fn active_nodes(&self) -> &[NodeId] {
        &self.active_nodes
    }

    /// Number of packets currently queued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Packet events accepted into the queue, broadcast fan-out expanded.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Packets delivered on an output port so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn enqueue(&mut self, packet: Packet) {
        let delay = exponential_delay(&mut self.random, TRANSIT_RATE);
        let event = PacketEvent {
            packet,
            delay,
            dispatch_time: self.current_time,
            seq: self.seq,
        };
        self.seq += 1;
        self.accepted += 1;
        self.queue.push(event);
    }
}

impl Atomic for NetworkModel {
    fn internal(&mut self) {
        if self.queue.pop().is_some() {
            self.delivered += 1;
        }
    }

    fn external(&mut self, elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        self.current_time += elapsed;
        let active_nodes = self.active_nodes.clone();
        for node_id in &active_nodes {
            let port = input_port(node_id);
            for packet in inputs.packets(&port) {
                if packet.destination == BROADCAST {
                    for target in &active_nodes {
                        if *target != packet.source {
                            let mut copy = packet.clone();
                            copy.destination = target.clone();
                            self.enqueue(copy);
                        }
                    }
                } else if active_nodes.contains(&packet.destination) {
                    self.enqueue(packet.clone());
                } else {
                    return Err(SimulationError::UnknownDestination {
                        destination: packet.destination.clone(),
                        sender: packet.source.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn output(&self, outputs: &mut Bag) {
        if let Some(head) = self.queue.peek() {
            outputs.push(
                &output_port(&head.packet.destination),
                Payload::Packet(head.packet.clone()),
            );
        }
    }

    fn time_advance(&self) -> Time {
        // The head's original draw, not the remaining time to its absolute
        // release; in the one-pop-per-imminence regime the two coincide.
        match self.queue.peek() {
            Some(head) => head.delay,
            None => PASSIVE,
        }
    }
}

impl fmt::Display for NetworkModel {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("NetworkState")
            .field("queued", &self.queue.len())
            .field("accepted", &self.accepted)
            .field("delivered", &self.delivered)
            .field("current_time", &self.current_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand_core::SeedableRng;

    use crate::message::{RaftMessage, RaftRpc, RequestVote, OPAQUE_DIGEST};

    use super::*;

    fn network() -> NetworkModel {
        NetworkModel::new(
            vec!["node0".into(), "node1".into(), "node2".into()],
            ChaChaRng::seed_from_u64(0),
        )
    }

    fn packet(source: &str, destination: &str) -> Packet {
        let payload = Arc::new(RaftMessage {
            source: source.to_string(),
            dest: destination.to_string(),
            content: RaftRpc::VoteRequest(RequestVote {
                term: 1,
                candidate_id: source.to_string(),
                last_log_index: 0,
                signed_digest: OPAQUE_DIGEST.to_string(),
            }),
        });
        Packet {
            payload,
            destination: destination.to_string(),
            source: source.to_string(),
            timestamp: 0.0,
        }
    }

    fn inject(network: &mut NetworkModel, from: &str, packet_in: Packet) {
        let mut bag = Bag::new();
        bag.push(&input_port(from), Payload::Packet(packet_in));
        network.external(0.0, &bag).unwrap();
    }

    #[test]
    fn unicast_packet_is_queued_once() {
        let mut network = network();
        inject(&mut network, "node0", packet("node0", "node1"));
        assert_eq!(network.queued(), 1);
        assert_eq!(network.accepted(), 1);
    }

    #[test]
    fn broadcast_fans_out_to_every_other_node() {
        let mut network = network();
        inject(&mut network, "node0", packet("node0", BROADCAST));
        assert_eq!(network.queued(), 2);

        let mut destinations = Vec::new();
        while network.queued() > 0 {
            let mut outputs = Bag::new();
            network.output(&mut outputs);
            for node in ["node0", "node1", "node2"] {
                for delivered in outputs.packets(&output_port(node)) {
                    destinations.push(delivered.destination.clone());
                    // Fan-out copies share one payload.
                    assert_eq!(delivered.payload.dest, BROADCAST);
                }
            }
            network.internal();
        }
        destinations.sort();
        assert_eq!(destinations, vec!["node1".to_string(), "node2".to_string()]);
        assert_eq!(network.delivered(), 2);
    }

    #[test]
    fn delivers_in_release_time_order() {
        let mut network = network();
        for _ in 0..5 {
            inject(&mut network, "node0", packet("node0", "node1"));
            inject(&mut network, "node2", packet("node2", "node1"));
        }

        let mut last_release = 0.0;
        while let Some(head) = network.queue.peek().cloned() {
            assert!(head.release_time() >= last_release);
            last_release = head.release_time();
            network.internal();
        }
    }

    #[test]
    fn unknown_destination_is_fatal() {
        let mut network = network();
        let mut bag = Bag::new();
        bag.push(
            &input_port("node0"),
            Payload::Packet(packet("node0", "node9")),
        );
        let err = network.external(0.0, &bag).unwrap_err();
        assert!(matches!(
            err,
            SimulationError::UnknownDestination { destination, .. } if destination == "node9"
        ));
    }

    #[test]
    fn time_advance_is_the_head_delay() {
        let mut network = network();
        assert_eq!(network.time_advance(), PASSIVE);
        inject(&mut network, "node0", packet("node0", "node1"));
        let advance = network.time_advance();
        assert!(advance > 0.0 && advance.is_finite());
    }
}
