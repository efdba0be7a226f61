//! The Raft protocol state machine of one node.
//!
//! Drives elections, vote accounting, append-entries handling and log
//! commitment. The controller never talks to a clock directly: the heartbeat
//! timeout controller steers it through status signals, and it steers the
//! timer back through its heartbeat output port.

use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, warn};
use rand_chacha::ChaChaRng;

use crate::devs::{Atomic, Bag, Payload, Time, PASSIVE};
use crate::error::SimulationError;
use crate::message::{
    AppendEntries, DatabaseMessage, HeartbeatPing, HeartbeatSignal, LogEntry, NodeId, PingStatus,
    RaftCertificate, RaftMessage, RaftRpc, RequestVote, ResponseVote, BROADCAST, OPAQUE_DIGEST,
};
use crate::stochastic::exponential_delay;

/// Input port for protocol messages (delivered through the buffer).
pub const INPUT_BUFFER: &str = "input_buffer";
/// Input port for heartbeat timer events.
pub const INPUT_HEARTBEAT: &str = "input_heartbeat";
/// Output port towards the downstream database collaborator.
pub const OUTPUT_DATABASE: &str = "output_database";
/// Output port for outbound protocol messages.
pub const OUTPUT_EXTERNAL: &str = "output_external";
/// Output port steering the heartbeat timer.
pub const OUTPUT_HEARTBEAT: &str = "output_heartbeat";

/// Minimum quiet period, in seconds, since the last accepted heartbeat
/// before an expired election timer turns the node into a candidate.
pub const HEARTBEAT_GRACE: Time = 0.150;

/// Processing rate (1/mean seconds) for vote requests and responses.
const VOTE_PROCESS_RATE: f64 = 100_000.0;
/// Processing rate (1/mean seconds) per append-entries log entry.
const APPEND_PROCESS_RATE: f64 = 10_000.0;

/// The leadership role of a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Passive replica, waiting on leader heartbeats.
    Follower,
    /// Standing for election in the current term.
    Candidate,
    /// Elected leader of the current term.
    Leader,
}

/// Whether this node has cast its vote for the current term.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VoteStatus {
    /// No vote cast yet.
    NotYetSubmitted,
    /// Vote cast (as a grant, or implicitly by standing as candidate).
    Submitted,
}

/// The Raft state machine of one node.
pub struct RaftController {
    node_id: NodeId,
    peers: BTreeSet<NodeId>,
    random: ChaChaRng,

    role: Role,
    voted_status: VoteStatus,
    heartbeat_status: HeartbeatSignal,
    current_term: u64,
    commit_index: u64,
    log_index: u64,
    current_time: Time,
    last_heartbeat_update: Time,
    leader_id: NodeId,

    message_log: Vec<LogEntry>,
    pending_votes: Vec<ResponseVote>,
    leader_proof: Option<RequestVote>,

    out_raft: Vec<Arc<RaftMessage>>,
    out_database: Vec<DatabaseMessage>,
    // Sum of the processing delays drawn for the queued outbound messages.
    // Drawn once at enqueue time so `time_advance` stays pure.
    pending_delay: Time,

    private_key: String,
    public_keys: Vec<String>,
}

impl RaftController {
    /// Creates a follower at term 0. `peers` is the cluster membership; the
    /// node's own id is removed if present.
    pub fn new(node_id: &str, mut peers: BTreeSet<NodeId>, random: ChaChaRng) -> Self {
        peers.remove(node_id);
        Self {
            node_id: node_id.to_string(),
            peers,
            random,
            role: Role::Follower,
            voted_status: VoteStatus::NotYetSubmitted,
            heartbeat_status: HeartbeatSignal::Alive,
            current_term: 0,
            commit_index: 0,
            log_index: 0,
            current_time: 0.0,
            last_heartbeat_update: 0.0,
            leader_id: NodeId::new(),
            message_log: Vec::new(),
            pending_votes: Vec::new(),
            leader_proof: None,
            out_raft: Vec::new(),
            out_database: Vec::new(),
            pending_delay: 0.0,
            private_key: String::new(),
            public_keys: Vec::new(),
        }
    }

    /// Attaches the opaque key material an external signature service would
    /// use. The core never interprets it.
    pub fn with_keys(mut self, private_key: &str, public_keys: Vec<String>) -> Self {
        self.private_key = private_key.to_string();
        self.public_keys = public_keys;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn peers(&self) -> &BTreeSet<NodeId> {
        &self.peers
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn voted_status(&self) -> VoteStatus {
        self.voted_status
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    /// The last known leader, or `None` before any leader was learned.
    pub fn leader_id(&self) -> Option<&NodeId> {
        if self.leader_id.is_empty() {
            None
        } else {
            Some(&self.leader_id)
        }
    }

    pub fn last_heartbeat_update(&self) -> Time {
        self.last_heartbeat_update
    }

    /// This node's local view of simulated time.
    pub fn current_time(&self) -> Time {
        self.current_time
    }

    /// The committed entries, in arrival order.
    pub fn message_log(&self) -> &[LogEntry] {
        &self.message_log
    }

    /// Votes accumulated while candidate in the current term, own vote
    /// included.
    pub fn pending_votes(&self) -> &[ResponseVote] {
        &self.pending_votes
    }

    /// The outbound protocol messages queued for the next output.
    pub fn out_raft(&self) -> &[Arc<RaftMessage>] {
        &self.out_raft
    }

    fn quorum(&self) -> usize {
        quorum_size(self.peers.len())
    }

    fn push_outbound(&mut self, message: RaftMessage) {
        let delay = match &message.content {
            RaftRpc::AppendEntries(append) => {
                append.entries.len() as f64
                    * exponential_delay(&mut self.random, APPEND_PROCESS_RATE)
            }
            RaftRpc::VoteRequest(_) | RaftRpc::VoteResponse(_) => {
                exponential_delay(&mut self.random, VOTE_PROCESS_RATE)
            }
        };
        self.pending_delay += delay;
        self.out_raft.push(Arc::new(message));
    }

    /// Answers a vote request.
    ///
    /// A vote is granted for a term newer than ours, or for our own term if
    /// we have not voted yet. Granting does not mark the vote as submitted,
    /// so a node may grant several requests in the same term; the behavior
    /// is kept as the protocol model defines it.
    fn handle_vote_request(&mut self, request: &RequestVote, from: &NodeId) {
        let larger_term = request.term > self.current_term;
        let equal_not_voted = request.term == self.current_term
            && self.voted_status == VoteStatus::NotYetSubmitted;
        let vote_granted = larger_term || equal_not_voted;

        if larger_term {
            self.current_term = request.term;
        }

        if vote_granted {
            info!(
                "{}: granted vote to {} at term {}",
                self.node_id, request.candidate_id, request.term
            );
        } else {
            debug!(
                "{}: rejected vote for {} at term {} (current term {})",
                self.node_id, request.candidate_id, request.term, self.current_term
            );
        }

        let response = ResponseVote {
            term: request.term,
            voted_for: request.candidate_id.clone(),
            last_log_index: request.last_log_index,
            vote_granted,
            node_id: self.node_id.clone(),
            signed_digest: OPAQUE_DIGEST.to_string(),
        };
        self.push_outbound(RaftMessage {
            source: self.node_id.clone(),
            dest: from.clone(),
            content: RaftRpc::VoteResponse(response),
        });
    }

    /// Stores a granted vote response. Denied responses are dropped.
    fn handle_vote_response(&mut self, response: &ResponseVote) {
        if response.vote_granted {
            self.pending_votes.push(response.clone());
        }
    }

    /// Applies an append-entries request: validates and commits each carried
    /// entry, then advances the commit index towards the leader's.
    fn handle_append_entries(&mut self, append: &AppendEntries) {
        if append.term < self.current_term {
            debug!(
                "{}: dropped stale append-entries at term {} (current term {})",
                self.node_id, append.term, self.current_term
            );
            return;
        }
        if append.term > self.current_term {
            self.current_term = append.term;
        }

        for entry in &append.entries {
            match entry {
                LogEntry::Raft(certificate) => {
                    self.apply_certificate(entry, certificate, &append.leader_id);
                }
                LogEntry::Heartbeat(_) => {
                    self.apply_heartbeat(entry, &append.leader_id);
                }
                LogEntry::External(_) => {}
            }
        }

        self.commit_index = append
            .leader_commit
            .min(self.message_log.len().saturating_sub(1) as u64);
        self.log_index = self.message_log.len() as u64;
    }

    /// Commits an election certificate if it carries a quorum of granted
    /// votes, adopting its sender as the new leader.
    fn apply_certificate(&mut self, entry: &LogEntry, certificate: &RaftCertificate, leader_id: &NodeId) {
        if certificate.granted_votes() < self.quorum() {
            warn!(
                "{}: rejected election certificate from {} with {} of {} required votes",
                self.node_id,
                leader_id,
                certificate.granted_votes(),
                self.quorum()
            );
            return;
        }
        self.message_log.push(entry.clone());
        self.leader_id = leader_id.clone();
        self.last_heartbeat_update = self.current_time;
        info!(
            "{}: accepted leader {} at term {} (log length {})",
            self.node_id,
            leader_id,
            certificate.request.term,
            self.message_log.len()
        );
    }

    /// Commits a heartbeat entry if it comes from the known leader.
    fn apply_heartbeat(&mut self, entry: &LogEntry, leader_id: &NodeId) {
        if *leader_id != self.leader_id {
            debug!(
                "{}: dropped heartbeat from {} (known leader {:?})",
                self.node_id,
                leader_id,
                self.leader_id()
            );
            return;
        }
        self.last_heartbeat_update = self.current_time;
        self.message_log.push(entry.clone());
    }

    /// Reacts to the heartbeat timer: a leader broadcasts a ping on every
    /// update tick; a follower whose timer expired after a long enough quiet
    /// period stands for election, otherwise its timer is re-armed.
    fn check_and_transition_heartbeat(&mut self, signal: HeartbeatSignal) {
        match signal {
            HeartbeatSignal::Alive => {}
            HeartbeatSignal::Update => {
                if self.role == Role::Leader {
                    self.last_heartbeat_update = self.current_time;
                    let ping = self.heartbeat_entry();
                    self.broadcast_append_entries(vec![ping]);
                }
            }
            HeartbeatSignal::Timeout => {
                if self.role == Role::Leader {
                    return;
                }
                // Either way the timer gets re-armed through the heartbeat
                // output; a quiet period longer than the grace window also
                // starts an election.
                self.heartbeat_status = HeartbeatSignal::Timeout;
                if self.current_time - self.last_heartbeat_update > HEARTBEAT_GRACE {
                    self.become_candidate();
                }
            }
        }
    }

    fn become_candidate(&mut self) {
        self.role = Role::Candidate;
        self.current_term += 1;
        self.voted_status = VoteStatus::Submitted;
        info!(
            "{}: became candidate at term {}",
            self.node_id, self.current_term
        );

        let request = RequestVote {
            term: self.current_term,
            candidate_id: self.node_id.clone(),
            last_log_index: self.commit_index,
            signed_digest: OPAQUE_DIGEST.to_string(),
        };
        self.leader_proof = Some(request.clone());

        // The candidate's own vote counts towards the quorum.
        self.pending_votes.clear();
        self.pending_votes.push(ResponseVote {
            term: self.current_term,
            voted_for: self.node_id.clone(),
            last_log_index: self.commit_index,
            vote_granted: true,
            node_id: self.node_id.clone(),
            signed_digest: OPAQUE_DIGEST.to_string(),
        });

        self.push_outbound(RaftMessage {
            source: self.node_id.clone(),
            dest: BROADCAST.to_string(),
            content: RaftRpc::VoteRequest(request),
        });
    }

    /// Promotes a candidate holding a quorum of votes to leader and
    /// broadcasts the election certificate together with the first ping.
    fn check_and_transition_to_leader(&mut self) {
        if self.role != Role::Candidate {
            return;
        }
        let granted = self
            .pending_votes
            .iter()
            .filter(|vote| vote.vote_granted)
            .count();
        if granted < self.quorum() {
            return;
        }
        let proof = match &self.leader_proof {
            Some(proof) => proof.clone(),
            None => {
                warn!(
                    "{}: quorum reached at term {} without a retained vote request",
                    self.node_id, self.current_term
                );
                return;
            }
        };

        self.role = Role::Leader;
        self.leader_id = self.node_id.clone();
        self.heartbeat_status = HeartbeatSignal::Update;
        info!(
            "{}: became leader at term {} with {} votes",
            self.node_id, self.current_term, granted
        );

        // The certificate rides first so followers learn the leader before
        // they see its ping.
        let certificate = LogEntry::Raft(RaftCertificate {
            request: proof,
            responses: self.pending_votes.clone(),
        });
        let ping = self.heartbeat_entry();
        self.broadcast_append_entries(vec![certificate, ping]);
    }

    fn heartbeat_entry(&self) -> LogEntry {
        LogEntry::Heartbeat(HeartbeatPing {
            sender_id: self.node_id.clone(),
            sequence_number: self.log_index,
            timestamp: self.current_time,
            status: PingStatus::Ping,
        })
    }

    fn broadcast_append_entries(&mut self, entries: Vec<LogEntry>) {
        let append = AppendEntries {
            term: self.current_term,
            leader_id: self.node_id.clone(),
            prev_log_index: self.log_index,
            prev_log_term: self.current_term,
            entries,
            leader_commit: self.commit_index,
            signed_digest: OPAQUE_DIGEST.to_string(),
        };
        self.push_outbound(RaftMessage {
            source: self.node_id.clone(),
            dest: BROADCAST.to_string(),
            content: RaftRpc::AppendEntries(append),
        });
    }
}

impl Atomic for RaftController {
    fn internal(&mut self) {
        self.heartbeat_status = HeartbeatSignal::Alive;
        self.out_raft.clear();
        self.out_database.clear();
        self.pending_delay = 0.0;
    }

    fn external(&mut self, elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        self.current_time += elapsed;

        for message in inputs.raft_messages(INPUT_BUFFER) {
            match &message.content {
                RaftRpc::VoteRequest(request) => {
                    self.handle_vote_request(request, &message.source);
                }
                RaftRpc::VoteResponse(response) => self.handle_vote_response(response),
                RaftRpc::AppendEntries(append) => self.handle_append_entries(append),
            }
        }

        let signal = inputs
            .heartbeat_signals(INPUT_HEARTBEAT)
            .next()
            .unwrap_or(HeartbeatSignal::Alive);
        self.check_and_transition_heartbeat(signal);
        self.check_and_transition_to_leader();
        Ok(())
    }

    fn output(&self, outputs: &mut Bag) {
        for message in &self.out_database {
            outputs.push(OUTPUT_DATABASE, Payload::Database(message.clone()));
        }
        for message in &self.out_raft {
            outputs.push(OUTPUT_EXTERNAL, Payload::Raft(Arc::clone(message)));
        }
        match self.heartbeat_status {
            HeartbeatSignal::Update => {
                outputs.push(OUTPUT_HEARTBEAT, Payload::Heartbeat(HeartbeatSignal::Update));
            }
            HeartbeatSignal::Timeout => {
                // An expired follower timer is answered with ALIVE so the
                // timeout controller draws a fresh election window.
                outputs.push(OUTPUT_HEARTBEAT, Payload::Heartbeat(HeartbeatSignal::Alive));
            }
            HeartbeatSignal::Alive => {}
        }
    }

    fn time_advance(&self) -> Time {
        if self.pending_delay > 0.0 {
            self.pending_delay
        } else if self.heartbeat_status != HeartbeatSignal::Alive {
            // Nothing to send, but the heartbeat steering signal still has
            // to go out immediately.
            0.0
        } else {
            PASSIVE
        }
    }
}

impl fmt::Display for RaftController {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("RaftState")
            .field("node_id", &self.node_id)
            .field("role", &self.role)
            .field("current_term", &self.current_term)
            .field("voted_status", &self.voted_status)
            .field("commit_index", &self.commit_index)
            .field("log_index", &self.log_index)
            .field("leader_id", &self.leader_id)
            .field("private_key", &self.private_key)
            .field("public_keys", &self.public_keys.len())
            .field("peers", &self.peers.len())
            .field("log_length", &self.message_log.len())
            .field("current_time", &self.current_time)
            .finish()
    }
}

/// Minimum number of granted votes, the candidate's own included, needed to
/// win an election in a cluster with `peer_count` peers (self excluded):
/// `ceil((peer_count + 1) / 2)`.
pub fn quorum_size(peer_count: usize) -> usize {
    (peer_count + 2) / 2
}

#[cfg(test)]
mod tests {
    use rand_core::SeedableRng;

    use super::*;

    fn peers(ids: &[&str]) -> BTreeSet<NodeId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn controller() -> RaftController {
        RaftController::new(
            "node0",
            peers(&["node1", "node2"]),
            ChaChaRng::seed_from_u64(0),
        )
    }

    fn raft_bag(message: RaftMessage) -> Bag {
        let mut bag = Bag::new();
        bag.push(INPUT_BUFFER, Payload::Raft(Arc::new(message)));
        bag
    }

    fn timeout_bag() -> Bag {
        let mut bag = Bag::new();
        bag.push(INPUT_HEARTBEAT, Payload::Heartbeat(HeartbeatSignal::Timeout));
        bag
    }

    fn vote_request(term: u64, candidate: &str) -> RaftMessage {
        RaftMessage {
            source: candidate.to_string(),
            dest: "node0".to_string(),
            content: RaftRpc::VoteRequest(RequestVote {
                term,
                candidate_id: candidate.to_string(),
                last_log_index: 0,
                signed_digest: OPAQUE_DIGEST.to_string(),
            }),
        }
    }

    fn granted_response(term: u64, from: &str) -> RaftMessage {
        RaftMessage {
            source: from.to_string(),
            dest: "node0".to_string(),
            content: RaftRpc::VoteResponse(ResponseVote {
                term,
                voted_for: "node0".to_string(),
                last_log_index: 0,
                vote_granted: true,
                node_id: from.to_string(),
                signed_digest: OPAQUE_DIGEST.to_string(),
            }),
        }
    }

    fn certificate_entry(term: u64, leader: &str, voters: &[&str]) -> LogEntry {
        let request = RequestVote {
            term,
            candidate_id: leader.to_string(),
            last_log_index: 0,
            signed_digest: OPAQUE_DIGEST.to_string(),
        };
        let responses = voters
            .iter()
            .map(|voter| ResponseVote {
                term,
                voted_for: leader.to_string(),
                last_log_index: 0,
                vote_granted: true,
                node_id: voter.to_string(),
                signed_digest: OPAQUE_DIGEST.to_string(),
            })
            .collect();
        LogEntry::Raft(RaftCertificate { request, responses })
    }

    fn append_entries(term: u64, leader: &str, entries: Vec<LogEntry>) -> RaftMessage {
        RaftMessage {
            source: leader.to_string(),
            dest: "node0".to_string(),
            content: RaftRpc::AppendEntries(AppendEntries {
                term,
                leader_id: leader.to_string(),
                prev_log_index: 0,
                prev_log_term: term,
                entries,
                leader_commit: 0,
                signed_digest: OPAQUE_DIGEST.to_string(),
            }),
        }
    }

    #[test]
    fn quorum_is_a_strict_majority_for_odd_clusters() {
        assert_eq!(quorum_size(0), 1);
        assert_eq!(quorum_size(2), 2);
        assert_eq!(quorum_size(4), 3);
        // Literal formula: an even cluster can be won by half its nodes.
        assert_eq!(quorum_size(3), 2);
    }

    #[test]
    fn grants_vote_for_newer_term_and_adopts_it() {
        let mut raft = controller();
        raft.external(0.0, &raft_bag(vote_request(1, "node1"))).unwrap();
        assert_eq!(raft.current_term(), 1);
        assert_eq!(raft.out_raft().len(), 1);
        let reply = &raft.out_raft()[0];
        assert_eq!(reply.dest, "node1");
        match &reply.content {
            RaftRpc::VoteResponse(response) => {
                assert!(response.vote_granted);
                assert_eq!(response.term, 1);
                assert_eq!(response.node_id, "node0");
            }
            other => panic!("expected vote response, got {}", other),
        }
    }

    #[test]
    fn granting_does_not_mark_the_vote_submitted() {
        let mut raft = controller();
        raft.external(0.0, &raft_bag(vote_request(1, "node1"))).unwrap();
        assert_eq!(raft.voted_status(), VoteStatus::NotYetSubmitted);

        // A second candidate in the same term is granted as well.
        raft.external(0.0, &raft_bag(vote_request(1, "node2"))).unwrap();
        let reply = &raft.out_raft()[1];
        match &reply.content {
            RaftRpc::VoteResponse(response) => assert!(response.vote_granted),
            other => panic!("expected vote response, got {}", other),
        }
    }

    #[test]
    fn rejects_vote_for_stale_term() {
        let mut raft = controller();
        raft.external(0.0, &raft_bag(vote_request(2, "node1"))).unwrap();
        raft.internal();
        raft.external(0.0, &raft_bag(vote_request(1, "node2"))).unwrap();
        match &raft.out_raft()[0].content {
            RaftRpc::VoteResponse(response) => assert!(!response.vote_granted),
            other => panic!("expected vote response, got {}", other),
        }
    }

    #[test]
    fn timeout_makes_a_candidate_with_a_self_vote() {
        let mut raft = controller();
        raft.external(0.2, &timeout_bag()).unwrap();
        assert_eq!(raft.role(), Role::Candidate);
        assert_eq!(raft.current_term(), 1);
        assert_eq!(raft.voted_status(), VoteStatus::Submitted);
        assert_eq!(raft.pending_votes().len(), 1);
        assert_eq!(raft.pending_votes()[0].node_id, "node0");

        assert_eq!(raft.out_raft().len(), 1);
        let broadcast = &raft.out_raft()[0];
        assert_eq!(broadcast.dest, BROADCAST);
        assert!(matches!(broadcast.content, RaftRpc::VoteRequest(_)));
        assert!(raft.time_advance().is_finite());
    }

    #[test]
    fn timeout_within_grace_window_only_rearms_the_timer() {
        let mut raft = controller();
        raft.external(0.1, &timeout_bag()).unwrap();
        assert_eq!(raft.role(), Role::Follower);
        assert!(raft.out_raft().is_empty());
        // The timer re-arm goes out immediately.
        assert_eq!(raft.time_advance(), 0.0);
        let mut outputs = Bag::new();
        raft.output(&mut outputs);
        assert_eq!(
            outputs.heartbeat_signals(OUTPUT_HEARTBEAT).next(),
            Some(HeartbeatSignal::Alive)
        );
    }

    #[test]
    fn quorum_of_votes_promotes_to_leader() {
        let mut raft = controller();
        raft.external(0.2, &timeout_bag()).unwrap();
        raft.internal();

        raft.external(0.0, &raft_bag(granted_response(1, "node1"))).unwrap();
        assert_eq!(raft.role(), Role::Leader);
        assert_eq!(raft.leader_id(), Some(&"node0".to_string()));

        // Victory broadcast: certificate first, then the ping.
        let broadcast = &raft.out_raft()[0];
        assert_eq!(broadcast.dest, BROADCAST);
        match &broadcast.content {
            RaftRpc::AppendEntries(append) => {
                assert_eq!(append.entries.len(), 2);
                assert!(matches!(append.entries[0], LogEntry::Raft(_)));
                assert!(matches!(append.entries[1], LogEntry::Heartbeat(_)));
                match &append.entries[0] {
                    LogEntry::Raft(certificate) => {
                        assert_eq!(certificate.granted_votes(), 2);
                    }
                    _ => unreachable!(),
                }
            }
            other => panic!("expected append entries, got {}", other),
        }
    }

    #[test]
    fn denied_responses_do_not_count() {
        let mut raft = controller();
        raft.external(0.2, &timeout_bag()).unwrap();
        raft.internal();

        let mut denied = granted_response(1, "node1");
        if let RaftRpc::VoteResponse(response) = &mut denied.content {
            response.vote_granted = false;
        }
        raft.external(0.0, &raft_bag(denied)).unwrap();
        assert_eq!(raft.role(), Role::Candidate);
        assert_eq!(raft.pending_votes().len(), 1);
    }

    #[test]
    fn accepts_certificate_with_quorum_and_learns_the_leader() {
        let mut raft = controller();
        let entry = certificate_entry(1, "node1", &["node1", "node2"]);
        raft.external(0.1, &raft_bag(append_entries(1, "node1", vec![entry]))).unwrap();
        assert_eq!(raft.message_log().len(), 1);
        assert_eq!(raft.leader_id(), Some(&"node1".to_string()));
        assert_eq!(raft.current_term(), 1);
        assert_eq!(raft.last_heartbeat_update(), 0.1);
    }

    #[test]
    fn rejects_certificate_below_quorum() {
        let mut raft = controller();
        let entry = certificate_entry(1, "node1", &["node1"]);
        raft.external(0.1, &raft_bag(append_entries(1, "node1", vec![entry]))).unwrap();
        assert!(raft.message_log().is_empty());
        assert_eq!(raft.leader_id(), None);
    }

    #[test]
    fn heartbeat_from_unknown_leader_is_dropped() {
        let mut raft = controller();
        let ping = LogEntry::Heartbeat(HeartbeatPing {
            sender_id: "node1".to_string(),
            sequence_number: 0,
            timestamp: 0.0,
            status: PingStatus::Ping,
        });
        raft.external(0.1, &raft_bag(append_entries(1, "node1", vec![ping]))).unwrap();
        assert!(raft.message_log().is_empty());
    }

    #[test]
    fn heartbeat_from_known_leader_appends_one_entry() {
        let mut raft = controller();
        let certificate = certificate_entry(1, "node1", &["node1", "node2"]);
        raft.external(0.1, &raft_bag(append_entries(1, "node1", vec![certificate]))).unwrap();
        raft.internal();

        let ping = LogEntry::Heartbeat(HeartbeatPing {
            sender_id: "node1".to_string(),
            sequence_number: 1,
            timestamp: 0.15,
            status: PingStatus::Ping,
        });
        raft.external(0.05, &raft_bag(append_entries(1, "node1", vec![ping]))).unwrap();
        assert_eq!(raft.message_log().len(), 2);
        assert_eq!(raft.last_heartbeat_update(), 0.1 + 0.05);
    }

    #[test]
    fn certificate_then_ping_in_one_request_both_commit() {
        let mut raft = controller();
        let certificate = certificate_entry(1, "node1", &["node1", "node2"]);
        let ping = LogEntry::Heartbeat(HeartbeatPing {
            sender_id: "node1".to_string(),
            sequence_number: 0,
            timestamp: 0.1,
            status: PingStatus::Ping,
        });
        raft.external(
            0.1,
            &raft_bag(append_entries(1, "node1", vec![certificate, ping])),
        )
        .unwrap();
        assert_eq!(raft.message_log().len(), 2);
    }

    #[test]
    fn stale_append_entries_is_dropped() {
        let mut raft = controller();
        raft.external(0.2, &timeout_bag()).unwrap();
        raft.internal();
        assert_eq!(raft.current_term(), 1);

        let entry = certificate_entry(0, "node1", &["node1", "node2"]);
        raft.external(0.0, &raft_bag(append_entries(0, "node1", vec![entry]))).unwrap();
        assert!(raft.message_log().is_empty());
    }

    #[test]
    fn commit_index_is_clamped_to_the_log() {
        let mut raft = controller();
        let mut message = append_entries(
            1,
            "node1",
            vec![certificate_entry(1, "node1", &["node1", "node2"])],
        );
        if let RaftRpc::AppendEntries(append) = &mut message.content {
            append.leader_commit = 7;
        }
        raft.external(0.1, &raft_bag(message)).unwrap();
        assert_eq!(raft.commit_index(), 0);

        // An empty-log apply never underflows.
        let mut fresh = controller();
        let mut empty = append_entries(1, "node1", Vec::new());
        if let RaftRpc::AppendEntries(append) = &mut empty.content {
            append.leader_commit = 3;
        }
        fresh.external(0.1, &raft_bag(empty)).unwrap();
        assert_eq!(fresh.commit_index(), 0);
    }

    #[test]
    fn internal_transition_flushes_outbound_state() {
        let mut raft = controller();
        raft.external(0.2, &timeout_bag()).unwrap();
        assert!(!raft.out_raft().is_empty());
        assert!(raft.time_advance() > 0.0);

        raft.internal();
        assert!(raft.out_raft().is_empty());
        assert_eq!(raft.time_advance(), PASSIVE);
    }

    #[test]
    fn update_tick_as_leader_broadcasts_a_ping() {
        let mut raft = controller();
        raft.external(0.2, &timeout_bag()).unwrap();
        raft.internal();
        raft.external(0.0, &raft_bag(granted_response(1, "node1"))).unwrap();
        raft.internal();
        assert!(raft.is_leader());

        let mut bag = Bag::new();
        bag.push(INPUT_HEARTBEAT, Payload::Heartbeat(HeartbeatSignal::Update));
        raft.external(0.05, &bag).unwrap();

        let broadcast = &raft.out_raft()[0];
        match &broadcast.content {
            RaftRpc::AppendEntries(append) => {
                assert_eq!(append.entries.len(), 1);
                assert!(matches!(append.entries[0], LogEntry::Heartbeat(_)));
            }
            other => panic!("expected append entries, got {}", other),
        }
        assert_eq!(raft.last_heartbeat_update(), raft.current_time());
    }
}
