use crate::message;
use crate::message::{Ballot, Instance, PValue, Reply, Request};
use crate::state;
use crate::thread::peer::Core;

/// Result of a prepare round.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<V> {
    /// A majority promised. Carries the highest-ballot value any of them had
    /// accepted, which the proposer must use instead of its own.
    Adopted(Option<PValue<V>>),

    /// No majority; retry above this ballot.
    Preempted(Ballot),
}

/// Running count of P1B replies for one ballot.
#[derive(Debug)]
pub struct Tally<V> {
    count: usize,
    majority: usize,
    promised: usize,
    refused: usize,
    highest: Ballot,
    accepted: Option<PValue<V>>,
}

impl<V: state::Value> Tally<V> {
    pub fn new(b_id: Ballot, count: usize) -> Self {
        Tally {
            count,
            majority: count / 2 + 1,
            promised: 0,
            refused: 0,
            highest: b_id,
            accepted: None,
        }
    }

    /// Folds in one reply; returns an outcome as soon as one is certain.
    pub fn record(&mut self, p1b: message::P1B<V>) -> Option<Outcome<V>> {
        if p1b.ok {
            self.promised += 1;
            if let Some(pvalue) = p1b.accepted {
                let newer = self.accepted.as_ref()
                    .map_or(true, |accepted| pvalue.b_id > accepted.b_id);
                if newer {
                    self.accepted = Some(pvalue);
                }
            }
            if self.promised >= self.majority {
                return Some(Outcome::Adopted(self.accepted.take()))
            }
        } else {
            self.refused += 1;
            self.highest = self.highest.max(p1b.b_id);
            if self.refused > self.count - self.majority {
                return Some(Outcome::Preempted(self.highest))
            }
        }
        None
    }

    /// Every reply that is ever going to arrive has arrived.
    pub fn exhausted(self) -> Outcome<V> {
        Outcome::Preempted(self.highest)
    }
}

/// Sends P1A for `b_id` to every peer and waits for a majority either way.
pub async fn run<V: state::Value>(core: &Core<V>, instance: Instance, b_id: Ballot) -> Outcome<V> {
    debug!("preparing instance {} with {:?}", instance, b_id);
    let mut rx = core.narrowcast(Request::P1A(message::P1A { instance, b_id }));
    let mut tally = Tally::new(b_id, core.count());
    while let Some(reply) = rx.recv().await {
        if let Reply::P1B(p1b) = reply {
            if let Some(outcome) = tally.record(p1b) {
                return outcome
            }
        }
    }
    tally.exhausted()
}
