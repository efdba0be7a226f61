//! Per-node inbound packet processor.
//!
//! Queues packets arriving from the network with an independent exponential
//! processing delay each, and forwards the *payload* (the protocol message)
//! once a packet is due.

use core::fmt;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rand_chacha::ChaChaRng;

use crate::devs::{Atomic, Bag, Payload, Time, PASSIVE};
use crate::error::SimulationError;
use crate::message::PacketEvent;
use crate::stochastic::exponential_delay;

/// Input port for packets from the network.
pub const INPUT: &str = "input_packet";
/// Output port for the unwrapped protocol messages.
pub const OUTPUT: &str = "output_raft_message";

/// Processing rate (1/mean seconds) per inbound packet.
pub const PROCESS_RATE: f64 = 1_000_000.0;

/// The inbound side of a node's network stack.
pub struct PacketProcessor {
    queue: BinaryHeap<PacketEvent>,
    current_time: Time,
    random: ChaChaRng,
    seq: u64,
}

impl PacketProcessor {
    /// Creates an empty, passive processor.
    pub fn new(random: ChaChaRng) -> Self {
        Self {
            queue: BinaryHeap::new(),
            current_time: 0.0,
            random,
            seq: 0,
        }
    }

    /// Number of packets currently queued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Atomic for PacketProcessor {
    fn internal(&mut self) {
        self.queue.pop();
    }

    fn external(&mut self, elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        self.current_time += elapsed;
        for packet in inputs.packets(INPUT) {
            let delay = exponential_delay(&mut self.random, PROCESS_RATE);
            self.queue.push(PacketEvent {
                packet: packet.clone(),
                delay,
                dispatch_time: self.current_time,
                seq: self.seq,
            });
            self.seq += 1;
        }
        Ok(())
    }

    fn output(&self, outputs: &mut Bag) {
        if let Some(head) = self.queue.peek() {
            verbose!("forwarding {}", head.packet);
            outputs.push(OUTPUT, Payload::Raft(Arc::clone(&head.packet.payload)));
        }
    }

    fn time_advance(&self) -> Time {
        match self.queue.peek() {
            Some(head) => head.delay,
            None => PASSIVE,
        }
    }
}

impl fmt::Display for PacketProcessor {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("PacketProcessorState")
            .field("queued", &self.queue.len())
            .field("current_time", &self.current_time)
            .finish()
    }
}
