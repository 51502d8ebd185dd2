use crate::message;
use crate::message::{Ballot, Instance, PValue, Reply, Request};
use crate::state;
use crate::thread::peer::Core;

/// Result of an accept round.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Outcome {
    /// A majority accepted; the value is decided.
    Chosen,

    /// No majority; retry above this ballot.
    Preempted(Ballot),
}

/// Running count of P2B replies for one PValue.
#[derive(Debug)]
pub struct Tally {
    count: usize,
    majority: usize,
    accepted: usize,
    refused: usize,
    highest: Ballot,
}

impl Tally {
    pub fn new(b_id: Ballot, count: usize) -> Self {
        Tally {
            count,
            majority: count / 2 + 1,
            accepted: 0,
            refused: 0,
            highest: b_id,
        }
    }

    pub fn record(&mut self, p2b: message::P2B) -> Option<Outcome> {
        if p2b.ok {
            self.accepted += 1;
            if self.accepted >= self.majority {
                return Some(Outcome::Chosen)
            }
        } else {
            self.refused += 1;
            self.highest = self.highest.max(p2b.b_id);
            if self.refused > self.count - self.majority {
                return Some(Outcome::Preempted(self.highest))
            }
        }
        None
    }

    pub fn exhausted(self) -> Outcome {
        Outcome::Preempted(self.highest)
    }
}

/// Sends P2A for `pvalue` to every peer and waits for a majority either way.
pub async fn run<V: state::Value>(core: &Core<V>, instance: Instance, pvalue: PValue<V>) -> Outcome {
    debug!("accepting instance {} with {:?}", instance, pvalue);
    let mut tally = Tally::new(pvalue.b_id, core.count());
    let mut rx = core.narrowcast(Request::P2A(message::P2A { instance, pvalue }));
    while let Some(reply) = rx.recv().await {
        if let Reply::P2B(p2b) = reply {
            if let Some(outcome) = tally.record(p2b) {
                return outcome
            }
        }
    }
    tally.exhausted()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn accepted() -> message::P2B {
        message::P2B { ok: true, b_id: Ballot::new(1, 0) }
    }

    #[test]
    fn chosen_on_majority() {
        let mut tally = Tally::new(Ballot::new(1, 0), 5);
        assert_eq!(tally.record(accepted()), None);
        assert_eq!(tally.record(accepted()), None);
        assert_eq!(tally.record(message::P2B { ok: false, b_id: Ballot::new(3, 4) }), None);
        assert_eq!(tally.record(accepted()), Some(Outcome::Chosen));
    }

    #[test]
    fn preempted_by_highest_refusal() {
        let mut tally = Tally::new(Ballot::new(1, 0), 3);
        assert_eq!(tally.record(message::P2B { ok: false, b_id: Ballot::new(5, 2) }), None);
        assert_eq!(
            tally.record(message::P2B { ok: false, b_id: Ballot::new(4, 1) }),
            Some(Outcome::Preempted(Ballot::new(5, 2))),
        );
    }

    #[test]
    fn single_peer_cluster_needs_only_itself() {
        let mut tally = Tally::new(Ballot::new(1, 0), 1);
        assert_eq!(tally.record(accepted()), Some(Outcome::Chosen));
    }
}
