//! Message types exchanged between simulation models.
//!
//! The top-level protocol message is [`RaftMessage`]; its content is the
//! tagged sum [`RaftRpc`]. On the wire layer, protocol messages travel inside
//! [`Packet`] envelopes, and the queueing models wrap either in release-timed
//! events ([`PacketEvent`], [`MessageEvent`]).
//!
//! Message payloads are immutable after creation. A broadcast fans the same
//! [`RaftMessage`] out into several packets, so packets hold the payload
//! behind an [`Arc`] rather than cloning it per destination.

use core::cmp::Ordering;
use core::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::devs::Time;

/// The identity of a simulated node, e.g. `"node0"`.
pub type NodeId = String;

/// The wildcard destination: deliver to every active node except the sender.
pub const BROADCAST: &str = "*";

/// Placeholder for the digest an external signature service would produce.
/// The core treats digests as opaque and validates them only nominally.
pub const OPAQUE_DIGEST: &str = "msg-digest-signed";

/// A protocol message sent between Raft nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct RaftMessage {
    /// The node which produced the message.
    pub source: NodeId,
    /// The destination node, or [`BROADCAST`].
    pub dest: NodeId,
    /// The Remote Procedure Call contained by this message.
    pub content: RaftRpc,
}

/// A Remote Procedure Call to a Raft node.
#[derive(Clone, Debug, PartialEq)]
pub enum RaftRpc {
    /// A request to obtain leadership amongst Raft nodes.
    VoteRequest(RequestVote),

    /// A response to a [`RequestVote`] granting or denying leadership.
    VoteResponse(ResponseVote),

    /// A request to append entries to a Raft node's log; also the carrier of
    /// leader heartbeats.
    AppendEntries(AppendEntries),
}

/// A request to obtain leadership amongst Raft nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestVote {
    /// The term the candidate is standing for.
    pub term: u64,
    /// The candidate's node id.
    pub candidate_id: NodeId,
    /// The index of the last log entry stored by the candidate.
    pub last_log_index: u64,
    /// Opaque signed digest of the request.
    pub signed_digest: String,
}

/// The response to a [`RequestVote`] granting or denying leadership.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseVote {
    /// The term of the vote request being answered.
    pub term: u64,
    /// The candidate this response is about.
    pub voted_for: NodeId,
    /// The candidate's last log index, echoed back.
    pub last_log_index: u64,
    /// Whether the vote was granted.
    pub vote_granted: bool,
    /// The responding node.
    pub node_id: NodeId,
    /// Opaque signed digest of the response.
    pub signed_digest: String,
}

/// A request to append entries to a Raft node's log.
#[derive(Clone, Debug, PartialEq)]
pub struct AppendEntries {
    /// The leader's current term.
    pub term: u64,
    /// The id of the leader issuing the request.
    pub leader_id: NodeId,
    /// Index of the log entry preceding the new entries.
    pub prev_log_index: u64,
    /// Term of the log entry at `prev_log_index`.
    pub prev_log_term: u64,
    /// Log entries to be replicated.
    pub entries: Vec<LogEntry>,
    /// The highest log entry index the leader knows to be committed.
    pub leader_commit: u64,
    /// Opaque signed digest of the request.
    pub signed_digest: String,
}

/// An entry in a node's replicated message log.
#[derive(Clone, Debug, PartialEq)]
pub enum LogEntry {
    /// An election certificate: the winning vote request together with the
    /// responses that elected the leader. Followers validate it
    /// independently before accepting the new leader.
    Raft(RaftCertificate),

    /// A leader heartbeat ping.
    Heartbeat(HeartbeatPing),

    /// An application entry with opaque data. Reserved; the base protocol
    /// never produces one.
    External(Bytes),
}

/// The election certificate carried in a [`LogEntry::Raft`].
#[derive(Clone, Debug, PartialEq)]
pub struct RaftCertificate {
    /// The vote request the candidate broadcast when it stood for election.
    pub request: RequestVote,
    /// The granted responses that formed the winning quorum.
    pub responses: Vec<ResponseVote>,
}

impl RaftCertificate {
    /// Number of granted votes packaged in this certificate.
    pub fn granted_votes(&self) -> usize {
        self.responses
            .iter()
            .filter(|response| response.vote_granted)
            .count()
    }
}

/// The heartbeat payload carried in a [`LogEntry::Heartbeat`].
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatPing {
    /// The leader which sent the ping.
    pub sender_id: NodeId,
    /// The leader's log index at send time.
    pub sequence_number: u64,
    /// The leader's local simulated time at send time.
    pub timestamp: Time,
    /// Ping direction.
    pub status: PingStatus,
}

/// Direction of a heartbeat ping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PingStatus {
    /// Leader-to-follower ping.
    Ping,
    /// Follower echo. Reserved; the base protocol never produces one.
    EchoResponse,
}

/// Steering signal exchanged between a Raft controller and its heartbeat
/// timeout controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeartbeatSignal {
    /// Nothing happened; when sent to the timeout controller, re-arms the
    /// follower election timer with a fresh random draw.
    Alive,
    /// The election timer expired without a heartbeat.
    Timeout,
    /// Switch to (or confirm) the periodic leader heartbeat cadence.
    Update,
}

/// The network-layer envelope around a [`RaftMessage`].
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    /// The protocol message being carried. Shared between the fan-out copies
    /// of a broadcast.
    pub payload: Arc<RaftMessage>,
    /// Destination node address, or [`BROADCAST`].
    pub destination: NodeId,
    /// Source node address.
    pub source: NodeId,
    /// Simulated time at which the packet entered the network layer.
    pub timestamp: Time,
}

/// A queued packet with its drawn transit delay.
///
/// Events are released in order of `dispatch_time + delay`; ties break on the
/// insertion sequence number, so equal release times keep arrival order.
#[derive(Clone, Debug)]
pub struct PacketEvent {
    /// The queued packet.
    pub packet: Packet,
    /// The transit delay drawn for this packet, in seconds.
    pub delay: Time,
    /// Simulated time at which the packet was enqueued.
    pub dispatch_time: Time,
    /// Insertion sequence number, unique per queue.
    pub seq: u64,
}

impl PacketEvent {
    /// The absolute simulated time at which this event is due.
    pub fn release_time(&self) -> Time {
        self.dispatch_time + self.delay
    }
}

/// A queued outbound protocol message with its drawn dispatch delay.
///
/// The outbound mirror of [`PacketEvent`]: same ordering, but the item is a
/// bare [`RaftMessage`] that has not been wrapped in a packet yet.
#[derive(Clone, Debug)]
pub struct MessageEvent {
    /// The queued protocol message.
    pub message: Arc<RaftMessage>,
    /// The dispatch delay drawn for this message, in seconds.
    pub delay: Time,
    /// Simulated time at which the message was enqueued.
    pub dispatch_time: Time,
    /// Insertion sequence number, unique per queue.
    pub seq: u64,
}

impl MessageEvent {
    /// The absolute simulated time at which this event is due.
    pub fn release_time(&self) -> Time {
        self.dispatch_time + self.delay
    }
}

/// A message to the downstream database collaborator.
///
/// Produced on application-log commit; the base protocol commits no
/// application entries, so the port carrying these stays quiet.
#[derive(Clone, Debug, PartialEq)]
pub enum DatabaseMessage {
    /// Record an event.
    Insert(InsertMetadata),
    /// Query recorded events.
    Query(QueryMetadata),
}

/// Payload of a [`DatabaseMessage::Insert`].
#[derive(Clone, Debug, PartialEq)]
pub struct InsertMetadata {
    /// Simulated time of the recorded event.
    pub timestamp: Time,
    /// Kind of the recorded event.
    pub event_type: String,
    /// The node which recorded the event.
    pub source_id: NodeId,
}

/// Payload of a [`DatabaseMessage::Query`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueryMetadata {
    /// Start of the queried time range.
    pub start_time: Time,
    /// End of the queried time range.
    pub end_time: Time,
    /// Optional filter on the event kind.
    pub event_type_filter: Option<String>,
    /// Optional filter on the recording node.
    pub source_id_filter: Option<NodeId>,
}

//
// RaftMessage impls
//

impl fmt::Display for RaftMessage {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            source,
            dest,
            content,
        } = self;
        fmt.debug_struct("RaftMessage")
            .field("source", source)
            .field("dest", dest)
            .field("content", &format_args!("{}", content))
            .finish()
    }
}

//
// RaftRpc impls
//

impl fmt::Display for RaftRpc {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            RaftRpc::VoteRequest(msg) => fmt::Display::fmt(msg, fmt),
            RaftRpc::VoteResponse(msg) => fmt::Display::fmt(msg, fmt),
            RaftRpc::AppendEntries(msg) => fmt::Display::fmt(msg, fmt),
        }
    }
}

//
// RequestVote impls
//

impl fmt::Display for RequestVote {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            term,
            candidate_id,
            last_log_index,
            signed_digest: _,
        } = self;
        fmt.debug_struct("RequestVote")
            .field("term", term)
            .field("candidate_id", candidate_id)
            .field("last_log_index", last_log_index)
            .finish()
    }
}

//
// ResponseVote impls
//

impl fmt::Display for ResponseVote {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            term,
            voted_for,
            last_log_index: _,
            vote_granted,
            node_id,
            signed_digest: _,
        } = self;
        fmt.debug_struct("ResponseVote")
            .field("term", term)
            .field("voted_for", voted_for)
            .field("vote_granted", vote_granted)
            .field("node_id", node_id)
            .finish()
    }
}

//
// AppendEntries impls
//

impl fmt::Display for AppendEntries {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            term,
            leader_id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit,
            signed_digest: _,
        } = self;
        fmt.debug_struct("AppendEntries")
            .field("term", term)
            .field("leader_id", leader_id)
            .field("prev_log_index", prev_log_index)
            .field("prev_log_term", prev_log_term)
            .field("entries", &entries.len())
            .field("leader_commit", leader_commit)
            .finish()
    }
}

//
// LogEntry impls
//

impl fmt::Display for LogEntry {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            LogEntry::Raft(certificate) => fmt::Display::fmt(certificate, fmt),
            LogEntry::Heartbeat(ping) => fmt::Display::fmt(ping, fmt),
            LogEntry::External(data) => fmt
                .debug_struct("ExternalEntry")
                .field("len", &data.len())
                .finish(),
        }
    }
}

//
// RaftCertificate impls
//

impl fmt::Display for RaftCertificate {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { request, responses } = self;
        fmt.debug_struct("RaftCertificate")
            .field("request", &format_args!("{}", request))
            .field("responses", &responses.len())
            .field("granted", &self.granted_votes())
            .finish()
    }
}

//
// HeartbeatPing impls
//

impl fmt::Display for HeartbeatPing {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            sender_id,
            sequence_number,
            timestamp,
            status,
        } = self;
        fmt.debug_struct("HeartbeatPing")
            .field("sender_id", sender_id)
            .field("sequence_number", sequence_number)
            .field("timestamp", timestamp)
            .field("status", status)
            .finish()
    }
}

//
// HeartbeatSignal impls
//

impl fmt::Display for HeartbeatSignal {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeartbeatSignal::Alive => "ALIVE",
            HeartbeatSignal::Timeout => "TIMEOUT",
            HeartbeatSignal::Update => "UPDATE",
        };
        fmt.write_str(name)
    }
}

//
// Packet impls
//

impl fmt::Display for Packet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            payload,
            destination,
            source,
            timestamp,
        } = self;
        fmt.debug_struct("Packet")
            .field("source", source)
            .field("destination", destination)
            .field("timestamp", timestamp)
            .field("payload", &format_args!("{}", payload))
            .finish()
    }
}

//
// PacketEvent impls
//

// Ordering is inverted so a `BinaryHeap` keeps the earliest release time at
// the top; equal release times keep insertion order.
impl Ord for PacketEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .release_time()
            .total_cmp(&self.release_time())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PacketEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PacketEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PacketEvent {}

//
// MessageEvent impls
//

// Same inverted ordering as `PacketEvent`.
impl Ord for MessageEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .release_time()
            .total_cmp(&self.release_time())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for MessageEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MessageEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MessageEvent {}

//
// DatabaseMessage impls
//

impl fmt::Display for DatabaseMessage {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            DatabaseMessage::Insert(metadata) => fmt
                .debug_struct("InsertDatabase")
                .field("timestamp", &metadata.timestamp)
                .field("event_type", &metadata.event_type)
                .field("source_id", &metadata.source_id)
                .finish(),
            DatabaseMessage::Query(metadata) => fmt
                .debug_struct("QueryDatabase")
                .field("start_time", &metadata.start_time)
                .field("end_time", &metadata.end_time)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u64, dispatch_time: Time, delay: Time) -> PacketEvent {
        let payload = Arc::new(RaftMessage {
            source: "node0".into(),
            dest: "node1".into(),
            content: RaftRpc::VoteResponse(ResponseVote {
                term: 1,
                voted_for: "node0".into(),
                last_log_index: 0,
                vote_granted: true,
                node_id: "node1".into(),
                signed_digest: OPAQUE_DIGEST.into(),
            }),
        });
        PacketEvent {
            packet: Packet {
                payload,
                destination: "node1".into(),
                source: "node0".into(),
                timestamp: dispatch_time,
            },
            delay,
            dispatch_time,
            seq,
        }
    }

    #[test]
    fn packet_events_pop_in_release_order() {
        let mut queue = std::collections::BinaryHeap::new();
        queue.push(packet(0, 0.0, 0.5));
        queue.push(packet(1, 0.0, 0.2));
        queue.push(packet(2, 0.1, 0.3));
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|e| e.seq).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn equal_release_times_keep_insertion_order() {
        let mut queue = std::collections::BinaryHeap::new();
        queue.push(packet(0, 0.0, 0.25));
        queue.push(packet(1, 0.0, 0.25));
        queue.push(packet(2, 0.0, 0.25));
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|e| e.seq).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
