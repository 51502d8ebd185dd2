use serde_derive::{Deserialize, Serialize};

/// Position in the replicated log. Every instance runs its own ballots.
pub type Instance = u64;

/// Totally ordered proposal number. Rounds are compared first, so the
/// proposer ID only breaks ties between peers that picked the same round.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ballot {
    pub round: u64,
    pub p_id: usize,
}

impl Ballot {
    pub fn new(round: u64, p_id: usize) -> Self {
        Ballot { round, p_id }
    }

    /// Smallest ballot owned by `p_id` that beats `self`.
    pub fn succ(self, p_id: usize) -> Self {
        Ballot { round: self.round + 1, p_id }
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub struct PValue<V> {
    pub b_id: Ballot,
    pub value: V,
}

/// Prepare.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct P1A {
    pub instance: Instance,
    pub b_id: Ballot,
}

/// Promise, or refusal carrying the ballot that beat us.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub struct P1B<V> {
    pub ok: bool,
    pub b_id: Ballot,
    pub accepted: Option<PValue<V>>,
}

/// Accept.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub struct P2A<V> {
    pub instance: Instance,
    pub pvalue: PValue<V>,
}

/// Accepted, or refusal carrying the ballot that beat us.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct P2B {
    pub ok: bool,
    pub b_id: Ballot,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub struct Decision<V> {
    pub instance: Instance,
    pub value: V,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Request<V> {
    P1A(P1A),
    P2A(P2A<V>),
    Decision(Decision<V>),
    /// Carries nothing but the envelope's watermark.
    Done,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Reply<V> {
    P1B(P1B<V>),
    P2B(P2B),
    Ack,
}

/// Every message between peers piggybacks the sender's `Done` watermark.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope<T> {
    pub from: usize,
    pub done: Option<Instance>,
    pub body: T,
}

/// Reply from a replicated state machine to one of its clients.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Answer<R> {
    Done(R),
    /// The server gave up on the request; try another replica.
    Retry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballots_order_by_round_then_proposer() {
        assert!(Ballot::new(2, 0) > Ballot::new(1, 4));
        assert!(Ballot::new(1, 4) > Ballot::new(1, 3));
        assert!(Ballot::default() < Ballot::new(1, 0));
    }

    #[test]
    fn successor_beats_foreign_ballot() {
        let theirs = Ballot::new(5, 4);
        let ours = theirs.succ(0);
        assert!(ours > theirs);
        assert_eq!(ours, Ballot::new(6, 0));
    }

    #[test]
    fn envelope_survives_bincode() {
        let envelope = Envelope {
            from: 2,
            done: Some(9),
            body: Request::P2A(P2A {
                instance: 10,
                pvalue: PValue { b_id: Ballot::new(3, 2), value: "x".to_string() },
            }),
        };
        let bytes = bincode::serialize(&envelope).unwrap();
        let decoded: Envelope<Request<String>> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }
}
