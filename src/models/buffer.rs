//! Inbound message buffer.
//!
//! A FIFO with a constant, near-zero processing delay. Bursts arriving in one
//! bag are re-emitted one element per internal transition, so the downstream
//! controller sees at most one message per event instant.

use core::fmt;
use std::collections::VecDeque;

use crate::devs::{Atomic, Bag, Payload, Time, PASSIVE};
use crate::error::SimulationError;

/// Input port.
pub const INPUT: &str = "input_buffer";
/// Output port.
pub const OUTPUT: &str = "output_buffer";

/// Per-element processing delay, in seconds.
pub const PROCESSING_DELAY: Time = 0.000_000_01;

/// A single-element-per-step FIFO feeding the Raft controller.
#[derive(Debug, Default)]
pub struct BufferModel {
    queue: VecDeque<Payload>,
    busy: bool,
}

impl BufferModel {
    /// Creates an empty, passive buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued payloads.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the buffer holds no payloads.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Atomic for BufferModel {
    fn internal(&mut self) {
        self.queue.pop_front();
        self.busy = !self.queue.is_empty();
    }

    fn external(&mut self, _elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        for payload in inputs.payloads(INPUT) {
            self.queue.push_back(payload.clone());
        }
        self.busy = true;
        Ok(())
    }

    fn output(&self, outputs: &mut Bag) {
        if let Some(head) = self.queue.front() {
            outputs.push(OUTPUT, head.clone());
        }
    }

    fn time_advance(&self) -> Time {
        if self.busy {
            PROCESSING_DELAY
        } else {
            PASSIVE
        }
    }
}

impl fmt::Display for BufferModel {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("BufferState")
            .field("busy", &self.busy)
            .field("queued", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::message::HeartbeatSignal;

    use super::*;

    fn signal_bag(signals: &[HeartbeatSignal]) -> Bag {
        let mut bag = Bag::new();
        for &signal in signals {
            bag.push(INPUT, Payload::Heartbeat(signal));
        }
        bag
    }

    #[test]
    fn emits_a_burst_in_arrival_order() {
        let mut buffer = BufferModel::new();
        assert_eq!(buffer.time_advance(), PASSIVE);

        let bag = signal_bag(&[
            HeartbeatSignal::Alive,
            HeartbeatSignal::Timeout,
            HeartbeatSignal::Update,
        ]);
        buffer.external(0.0, &bag).unwrap();
        assert_eq!(buffer.time_advance(), PROCESSING_DELAY);

        let mut seen = Vec::new();
        while buffer.time_advance().is_finite() {
            let mut outputs = Bag::new();
            buffer.output(&mut outputs);
            seen.extend(outputs.heartbeat_signals(OUTPUT));
            buffer.internal();
        }
        assert_eq!(
            seen,
            vec![
                HeartbeatSignal::Alive,
                HeartbeatSignal::Timeout,
                HeartbeatSignal::Update,
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn input_while_busy_appends_behind_the_head() {
        let mut buffer = BufferModel::new();
        buffer
            .external(0.0, &signal_bag(&[HeartbeatSignal::Alive]))
            .unwrap();
        buffer
            .external(0.0, &signal_bag(&[HeartbeatSignal::Update]))
            .unwrap();
        assert_eq!(buffer.len(), 2);

        let mut outputs = Bag::new();
        buffer.output(&mut outputs);
        assert_eq!(
            outputs.heartbeat_signals(OUTPUT).next(),
            Some(HeartbeatSignal::Alive)
        );
    }
}
