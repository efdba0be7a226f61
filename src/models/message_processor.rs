//! Per-node outbound message processor.
//!
//! Queues protocol messages leaving the Raft controller with an independent
//! exponential dispatch delay each, and wraps the head message in a network
//! packet once it is due.
//!
//! The emit side can be disabled to model a node whose transmitter has
//! failed; queued messages then drain silently.

use core::fmt;
use std::collections::BinaryHeap;
use std::sync::Arc;

use rand_chacha::ChaChaRng;

use crate::devs::{Atomic, Bag, Payload, Time, PASSIVE};
use crate::error::SimulationError;
use crate::message::{MessageEvent, Packet};
use crate::stochastic::exponential_delay;

/// Input port for protocol messages from the Raft controller.
pub const INPUT: &str = "input_raft_message";
/// Output port for packets towards the network.
pub const OUTPUT: &str = "output_packet";

/// Dispatch rate (1/mean seconds) per outbound message.
pub const DISPATCH_RATE: f64 = 1_000_000.0;

/// The outbound side of a node's network stack.
pub struct MessageProcessor {
    queue: BinaryHeap<MessageEvent>,
    current_time: Time,
    random: ChaChaRng,
    seq: u64,
    enabled: bool,
}

impl MessageProcessor {
    /// Creates an empty, passive processor.
    pub fn new(random: ChaChaRng) -> Self {
        Self {
            queue: BinaryHeap::new(),
            current_time: 0.0,
            random,
            seq: 0,
            enabled: true,
        }
    }

    /// Number of messages currently queued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether the emit side is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the emit side (fault injection).
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl Atomic for MessageProcessor {
    fn internal(&mut self) {
        self.queue.pop();
    }

    fn external(&mut self, elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        self.current_time += elapsed;
        for message in inputs.raft_messages(INPUT) {
            let delay = exponential_delay(&mut self.random, DISPATCH_RATE);
            self.queue.push(MessageEvent {
                message: Arc::clone(message),
                delay,
                dispatch_time: self.current_time,
                seq: self.seq,
            });
            self.seq += 1;
        }
        Ok(())
    }

    fn output(&self, outputs: &mut Bag) {
        if !self.enabled {
            return;
        }
        if let Some(head) = self.queue.peek() {
            let packet = Packet {
                payload: Arc::clone(&head.message),
                destination: head.message.dest.clone(),
                source: head.message.source.clone(),
                timestamp: head.dispatch_time,
            };
            verbose!("dispatching {}", packet);
            outputs.push(OUTPUT, Payload::Packet(packet));
        }
    }

    fn time_advance(&self) -> Time {
        match self.queue.peek() {
            Some(head) => head.delay,
            None => PASSIVE,
        }
    }
}

impl fmt::Display for MessageProcessor {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("MessageProcessorState")
            .field("queued", &self.queue.len())
            .field("enabled", &self.enabled)
            .field("current_time", &self.current_time)
            .finish()
    }
}
