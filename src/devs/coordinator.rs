//! The root coordinator.
//!
//! Owns the flattened model hierarchy and drives the event loop: advance the
//! global clock to the minimum next-event time, collect outputs from the
//! imminent models, route them through the resolved couplings, then apply
//! transitions. Events scheduled strictly before an instant are always
//! processed before any event at that instant.

use std::collections::BTreeMap;

use crate::devs::{Atomic, Bag, Coupled, Time, PASSIVE};
use crate::error::SimulationError;
use crate::trace::TraceWriter;

struct Slot<M> {
    name: String,
    model: M,
    last_time: Time,
    next_time: Time,
    inbox: Bag,
}

/// Schedules and executes every atomic model of a flattened hierarchy.
pub struct Coordinator<M> {
    slots: Vec<Slot<M>>,
    routes: BTreeMap<(usize, String), Vec<(usize, String)>>,
    time: Time,
    trace: TraceWriter,
}

impl<M: Atomic> Coordinator<M> {
    /// Flattens `top` and initializes every model's schedule.
    ///
    /// # Errors
    ///
    /// Fails if a coupling references an unknown child or never reaches an
    /// atomic port. Outputs routed to a top-level parent port are legal; they
    /// leave the simulation and are discarded.
    pub fn new(top: Coupled<M>, trace: TraceWriter) -> Result<Self, SimulationError> {
        let flattened = top.flatten("")?;
        let slots = flattened
            .atomics
            .into_iter()
            .map(|(name, model)| {
                let next_time = model.time_advance();
                Slot {
                    name,
                    model,
                    last_time: 0.0,
                    next_time,
                    inbox: Bag::new(),
                }
            })
            .collect();

        let mut routes: BTreeMap<(usize, String), Vec<(usize, String)>> = BTreeMap::new();
        for (from, to) in flattened.routes {
            routes.entry(from).or_default().push(to);
        }

        Ok(Self {
            slots,
            routes,
            time: 0.0,
            trace,
        })
    }

    /// The current simulated time.
    pub fn time(&self) -> Time {
        self.time
    }

    /// The time of the next scheduled internal event, or [`PASSIVE`] when
    /// every model is passive.
    pub fn next_event_time(&self) -> Time {
        self.slots
            .iter()
            .map(|slot| slot.next_time)
            .fold(PASSIVE, Time::min)
    }

    /// Processes one event instant.
    ///
    /// Within the instant: every imminent model's output is produced and
    /// routed first; then internal transitions; then external transitions of
    /// the receivers; a model that is both imminent and receiving input gets
    /// its internal transition followed by an external transition with zero
    /// elapsed time. Returns the instant processed, or `None` when every
    /// model is passive.
    pub fn step(&mut self) -> Result<Option<Time>, SimulationError> {
        let now = self.next_event_time();
        if !now.is_finite() {
            return Ok(None);
        }
        self.time = now;

        let imminent: Vec<usize> = (0..self.slots.len())
            .filter(|&index| self.slots[index].next_time == now)
            .collect();

        // Outputs first, routed into the receivers' inboxes.
        let mut outbox = Bag::new();
        for &index in &imminent {
            outbox.clear();
            self.slots[index].model.output(&mut outbox);
            for (port, payloads) in outbox.ports() {
                let targets = self.routes.get(&(index, port.to_string()));
                for payload in payloads {
                    self.trace
                        .output(now, index, &self.slots[index].name, port, payload);
                }
                if let Some(targets) = targets {
                    for (target, target_port) in targets.clone() {
                        for payload in payloads {
                            self.slots[target].inbox.push(&target_port, payload.clone());
                        }
                    }
                }
            }
        }

        // Internal transitions of the imminent set.
        for &index in &imminent {
            self.slots[index].model.internal();
            self.slots[index].last_time = now;
        }

        // External transitions of models that only received input.
        for index in 0..self.slots.len() {
            if self.slots[index].next_time == now || self.slots[index].inbox.is_empty() {
                continue;
            }
            let elapsed = now - self.slots[index].last_time;
            let inbox = std::mem::take(&mut self.slots[index].inbox);
            self.slots[index].model.external(elapsed, &inbox)?;
            self.slots[index].last_time = now;
        }

        // Confluent: imminent models that also received input transition
        // again externally, with zero elapsed time.
        for &index in &imminent {
            if self.slots[index].inbox.is_empty() {
                continue;
            }
            let inbox = std::mem::take(&mut self.slots[index].inbox);
            self.slots[index].model.external(0.0, &inbox)?;
        }

        // Reschedule and trace every touched model.
        for slot in &mut self.slots {
            if slot.last_time == now {
                slot.next_time = now + slot.model.time_advance();
                self.trace.state(now, &slot.name, &slot.model);
            }
        }

        Ok(Some(now))
    }

    /// Runs until the next event would be at or past `t_end`, or until every
    /// model is passive. Leaves the clock at `t_end` if the horizon was
    /// reached.
    pub fn run_until(&mut self, t_end: Time) -> Result<(), SimulationError> {
        self.trace.start();
        loop {
            let next = self.next_event_time();
            if !next.is_finite() {
                break;
            }
            if next >= t_end {
                self.time = t_end;
                break;
            }
            self.step()?;
        }
        self.trace.stop();
        Ok(())
    }

    /// Looks a model up by its flattened path name.
    pub fn model(&self, name: &str) -> Option<&M> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| &slot.model)
    }

    /// Mutable lookup by flattened path name (used for fault injection).
    pub fn model_mut(&mut self, name: &str) -> Option<&mut M> {
        self.slots
            .iter_mut()
            .find(|slot| slot.name == name)
            .map(|slot| &mut slot.model)
    }

    /// Iterates over `(path, model)` pairs in registration order.
    pub fn models(&self) -> impl Iterator<Item = (&str, &M)> {
        self.slots
            .iter()
            .map(|slot| (slot.name.as_str(), &slot.model))
    }
}
