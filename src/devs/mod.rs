//! The discrete-event kernel.
//!
//! Models are either *atomic* (an event-driven state machine implementing
//! [`Atomic`]) or *coupled* (a container wiring children together,
//! [`coupled::Coupled`]). A [`coordinator::Coordinator`] owns the flattened
//! hierarchy and advances simulated time to the minimum next-event time
//! across all atomic models.
//!
//! Messages move between models in [`Bag`]s: per-port multisets of
//! [`Payload`] values present at a single event instant.

pub mod coordinator;
pub mod coupled;

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use coordinator::Coordinator;
pub use coupled::{Component, Coupled};

use crate::error::SimulationError;
use crate::message::{DatabaseMessage, HeartbeatSignal, Packet, RaftMessage};

/// Simulated time, in seconds. Monotonically advanced by the coordinator.
pub type Time = f64;

/// The time advance of a passive model: no internal event is scheduled.
pub const PASSIVE: Time = Time::INFINITY;

/// An atomic discrete-event model.
///
/// The four operations are the classic quadruple: `internal` fires when the
/// model's own scheduled time elapses, `external` fires when input arrives,
/// `output` produces messages just before an internal transition, and
/// `time_advance` returns the delay until the next internal transition.
///
/// The `Display` impl renders the model state for the trace log.
pub trait Atomic: fmt::Display {
    /// Internal transition, applied after [`output`](Self::output).
    fn internal(&mut self);

    /// External transition. `elapsed` is the simulated time since this
    /// model's previous event; `inputs` is the bag accumulated on its input
    /// ports at this instant.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal wiring bugs (e.g. a packet addressed
    /// to a node the network does not know); protocol-level rejections are
    /// handled by dropping.
    fn external(&mut self, elapsed: Time, inputs: &Bag) -> Result<(), SimulationError>;

    /// Output function, called just before [`internal`](Self::internal).
    fn output(&self, outputs: &mut Bag);

    /// Delay until this model's next internal transition, or [`PASSIVE`].
    fn time_advance(&self) -> Time;
}

/// A value travelling through a port.
///
/// The tagged sum over every message kind the simulation routes. Models read
/// their input ports through the typed accessors on [`Bag`]; a payload of an
/// unexpected kind on a port is skipped.
#[derive(Clone, Debug)]
pub enum Payload {
    /// A protocol message (already unwrapped from its packet).
    Raft(Arc<RaftMessage>),
    /// A network-layer packet.
    Packet(Packet),
    /// A heartbeat steering signal.
    Heartbeat(HeartbeatSignal),
    /// A message for the downstream database collaborator.
    Database(DatabaseMessage),
}

/// The multiset of messages present on a model's ports at one event instant.
///
/// Ports are keyed by name in a sorted map so that iteration order, and with
/// it the whole event history of a seeded run, is deterministic.
#[derive(Debug, Default)]
pub struct Bag {
    slots: BTreeMap<String, Vec<Payload>>,
}

impl Bag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no port holds any payload.
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
    }

    /// Removes every payload from every port.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Adds a payload to the named port.
    pub fn push(&mut self, port: &str, payload: Payload) {
        self.slots.entry(port.to_string()).or_default().push(payload);
    }

    /// All payloads on the named port, in arrival order.
    pub fn payloads(&self, port: &str) -> &[Payload] {
        self.slots.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates over `(port, payloads)` pairs in port-name order.
    pub fn ports(&self) -> impl Iterator<Item = (&str, &[Payload])> {
        self.slots
            .iter()
            .map(|(port, payloads)| (port.as_str(), payloads.as_slice()))
    }

    /// The protocol messages on the named port.
    pub fn raft_messages<'a>(&'a self, port: &str) -> impl Iterator<Item = &'a Arc<RaftMessage>> {
        self.payloads(port).iter().filter_map(|payload| match payload {
            Payload::Raft(message) => Some(message),
            _ => None,
        })
    }

    /// The packets on the named port.
    pub fn packets<'a>(&'a self, port: &str) -> impl Iterator<Item = &'a Packet> {
        self.payloads(port).iter().filter_map(|payload| match payload {
            Payload::Packet(packet) => Some(packet),
            _ => None,
        })
    }

    /// The heartbeat signals on the named port.
    pub fn heartbeat_signals<'a>(&'a self, port: &str) -> impl Iterator<Item = HeartbeatSignal> + 'a {
        self.payloads(port).iter().filter_map(|payload| match payload {
            Payload::Heartbeat(signal) => Some(*signal),
            _ => None,
        })
    }
}

//
// Payload impls
//

impl fmt::Display for Payload {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Payload::Raft(message) => fmt::Display::fmt(message, fmt),
            Payload::Packet(packet) => fmt::Display::fmt(packet, fmt),
            Payload::Heartbeat(signal) => fmt::Display::fmt(signal, fmt),
            Payload::Database(message) => fmt::Display::fmt(message, fmt),
        }
    }
}
