//! # Summary
//!
//! This module defines the `Slot` struct, which acts as Paxos's
//! distributed memory for a single instance. Acceptors keep track of the
//! highest ballot they have promised and the most recently accepted
//! PValue, and they learn decisions broadcast by proposers.

use crate::message;
use crate::message::{Ballot, PValue, Reply, Request};
use crate::shared::Log;
use crate::state;

/// Acceptor state for one instance.
#[derive(Derivative)]
#[derivative(Default(bound = ""))]
#[derive(Clone, Debug)]
pub struct Slot<V> {
    /// Highest ballot promised
    pub promised: Ballot,

    /// Most recently accepted PValue
    pub accepted: Option<PValue<V>>,

    /// Value chosen by a majority, once known
    pub decided: Option<V>,
}

impl<V: state::Value> Slot<V> {
    /// Promises `b_id` if it beats every earlier promise, and reports the
    /// value accepted so far so the proposer can adopt it.
    pub fn respond_p1a(&mut self, b_id: Ballot) -> message::P1B<V> {
        if b_id > self.promised {
            self.promised = b_id;
            message::P1B { ok: true, b_id, accepted: self.accepted.clone() }
        } else {
            message::P1B { ok: false, b_id: self.promised, accepted: None }
        }
    }

    /// Accepts `pvalue` unless a higher ballot has been promised since.
    pub fn respond_p2a(&mut self, pvalue: PValue<V>) -> message::P2B {
        if pvalue.b_id >= self.promised {
            let b_id = pvalue.b_id;
            self.promised = b_id;
            self.accepted = Some(pvalue);
            message::P2B { ok: true, b_id }
        } else {
            message::P2B { ok: false, b_id: self.promised }
        }
    }

    pub fn respond_decision(&mut self, value: V) {
        match &self.decided {
        | None => self.decided = Some(value),
        | Some(decided) if *decided != value => {
            error!("conflicting decisions {:?} and {:?}", decided, value);
        }
        | Some(_) => (),
        }
    }
}

/// Applies an incoming request to the table and builds the reply.
/// Requests for forgotten instances are refused; refusing is always safe.
pub fn respond<V: state::Value>(log: &mut Log<V>, request: Request<V>) -> Reply<V> {
    let min = log.min();
    match request {
    | Request::P1A(p1a) if p1a.instance < min => {
        Reply::P1B(message::P1B { ok: false, b_id: p1a.b_id, accepted: None })
    }
    | Request::P1A(p1a) => {
        Reply::P1B(log.slot(p1a.instance).respond_p1a(p1a.b_id))
    }
    | Request::P2A(p2a) if p2a.instance < min => {
        Reply::P2B(message::P2B { ok: false, b_id: p2a.pvalue.b_id })
    }
    | Request::P2A(p2a) => {
        Reply::P2B(log.slot(p2a.instance).respond_p2a(p2a.pvalue))
    }
    | Request::Decision(decision) => {
        if decision.instance >= min {
            log.slot(decision.instance).respond_decision(decision.value);
        }
        Reply::Ack
    }
    | Request::Done => Reply::Ack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{P1A, P2A};
    use pretty_assertions::assert_eq;

    fn pvalue(round: u64, p_id: usize, value: &str) -> PValue<String> {
        PValue { b_id: Ballot::new(round, p_id), value: value.to_string() }
    }

    #[test]
    fn promises_only_higher_ballots() {
        let mut slot: Slot<String> = Slot::default();
        assert!(slot.respond_p1a(Ballot::new(2, 1)).ok);

        let refused = slot.respond_p1a(Ballot::new(1, 2));
        assert!(!refused.ok);
        assert_eq!(refused.b_id, Ballot::new(2, 1));

        // A duplicate of the promised ballot is not higher.
        assert!(!slot.respond_p1a(Ballot::new(2, 1)).ok);
        assert!(slot.respond_p1a(Ballot::new(2, 2)).ok);
    }

    #[test]
    fn promise_reports_accepted_value() {
        let mut slot: Slot<String> = Slot::default();
        assert!(slot.respond_p2a(pvalue(1, 0, "a")).ok);

        let promise = slot.respond_p1a(Ballot::new(3, 1));
        assert!(promise.ok);
        assert_eq!(promise.accepted, Some(pvalue(1, 0, "a")));
    }

    #[test]
    fn accept_refused_after_higher_promise() {
        let mut slot: Slot<String> = Slot::default();
        slot.respond_p1a(Ballot::new(4, 2));

        let refused = slot.respond_p2a(pvalue(3, 0, "a"));
        assert!(!refused.ok);
        assert_eq!(refused.b_id, Ballot::new(4, 2));
        assert_eq!(slot.accepted, None);

        assert!(slot.respond_p2a(pvalue(4, 2, "b")).ok);
        assert_eq!(slot.accepted, Some(pvalue(4, 2, "b")));
    }

    #[test]
    fn first_decision_sticks() {
        let mut slot: Slot<String> = Slot::default();
        slot.respond_decision("a".to_string());
        slot.respond_decision("b".to_string());
        assert_eq!(slot.decided, Some("a".to_string()));
    }

    #[test]
    fn forgotten_instances_are_refused() {
        let mut log: Log<String> = Log::new(0, 1);
        log.advance(0, Some(3));

        let reply = respond(&mut log, Request::P1A(P1A { instance: 2, b_id: Ballot::new(9, 0) }));
        assert!(matches!(reply, Reply::P1B(message::P1B { ok: false, .. })));

        let reply = respond(&mut log, Request::P2A(P2A { instance: 4, pvalue: pvalue(1, 0, "a") }));
        assert!(matches!(reply, Reply::P2B(message::P2B { ok: true, .. })));
        assert_eq!(log.len(), 1);
    }
}
