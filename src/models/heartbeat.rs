//! Heartbeat timeout controller.
//!
//! A timer with two cadences, steered by its Raft controller through status
//! signals: in follower mode it counts down a random election timeout and
//! fires `TIMEOUT` once; in leader mode it ticks `UPDATE` periodically on its
//! own. A fired follower timer stays silent until the controller re-arms it
//! with `ALIVE`.

use core::fmt;

use rand_chacha::ChaChaRng;

use crate::devs::{Atomic, Bag, Payload, Time, PASSIVE};
use crate::error::SimulationError;
use crate::message::HeartbeatSignal;
use crate::stochastic::uniform_delay;

/// Input port for steering signals from the Raft controller.
pub const INPUT: &str = "input_heartbeat";
/// Output port for timeout/update events towards the Raft controller.
pub const OUTPUT: &str = "output_heartbeat";

/// Lower bound of the follower election timeout, in seconds.
pub const ELECTION_TIMEOUT_MIN: Time = 0.150;
/// Upper bound of the follower election timeout, in seconds.
pub const ELECTION_TIMEOUT_MAX: Time = 0.300;
/// Leader heartbeat cadence, in seconds.
pub const LEADER_TICK: Time = 0.050;

/// The election-timeout / heartbeat-tick timer of one node.
pub struct HeartbeatController {
    status: HeartbeatSignal,
    timeout: Time,
    random: ChaChaRng,
}

impl HeartbeatController {
    /// Creates a controller armed with a fresh random election timeout.
    pub fn new(mut random: ChaChaRng) -> Self {
        let timeout = uniform_delay(&mut random, ELECTION_TIMEOUT_MIN, ELECTION_TIMEOUT_MAX);
        Self {
            status: HeartbeatSignal::Alive,
            timeout,
            random,
        }
    }

    /// The delay until the next timer event, or infinity when disarmed.
    pub fn timeout(&self) -> Time {
        self.timeout
    }

    /// The current steering status.
    pub fn status(&self) -> HeartbeatSignal {
        self.status
    }
}

impl Atomic for HeartbeatController {
    fn internal(&mut self) {
        // In update mode the timer re-arms itself and keeps ticking; any
        // other status waits for the next steering signal.
        if self.status != HeartbeatSignal::Update {
            self.timeout = PASSIVE;
        }
    }

    fn external(&mut self, _elapsed: Time, inputs: &Bag) -> Result<(), SimulationError> {
        if let Some(signal) = inputs.heartbeat_signals(INPUT).next() {
            self.status = signal;
            match signal {
                HeartbeatSignal::Alive => {
                    self.timeout = uniform_delay(
                        &mut self.random,
                        ELECTION_TIMEOUT_MIN,
                        ELECTION_TIMEOUT_MAX,
                    );
                }
                HeartbeatSignal::Update => {
                    self.timeout = LEADER_TICK;
                }
                HeartbeatSignal::Timeout => {}
            }
        }
        Ok(())
    }

    fn output(&self, outputs: &mut Bag) {
        match self.status {
            HeartbeatSignal::Alive => {
                outputs.push(OUTPUT, Payload::Heartbeat(HeartbeatSignal::Timeout));
            }
            HeartbeatSignal::Update => {
                outputs.push(OUTPUT, Payload::Heartbeat(HeartbeatSignal::Update));
            }
            HeartbeatSignal::Timeout => {}
        }
    }

    fn time_advance(&self) -> Time {
        self.timeout
    }
}

impl fmt::Display for HeartbeatController {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("HeartbeatControllerState")
            .field("status", &format_args!("{}", self.status))
            .field("timeout", &self.timeout)
            .finish()
    }
}
