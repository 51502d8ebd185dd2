use std::sync::Arc;

use crate::message::{Ballot, Instance, PValue};
use crate::shared::Status;
use crate::state;
use crate::thread::{commander, scout};
use crate::thread::peer::Core;

/// Where a proposer is in its attempt to get an instance decided.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Preparing,
    Accepting,
    Decided,
    /// The peer was killed or the instance forgotten before a decision.
    Abandoned,
}

/// Drives one instance through prepare and accept rounds, retrying with
/// higher ballots after a backoff until the instance is decided.
pub struct Leader<V> {
    core: Arc<Core<V>>,
    instance: Instance,

    /// Value this peer would like decided
    candidate: V,

    /// Value for the accept round, fixed by the last adopted prepare
    proposal: Option<V>,

    /// Ballot of the current attempt
    b_id: Ballot,

    /// Highest foreign ballot reported back to us
    seen: Ballot,

    phase: Phase,
    attempt: u32,
}

impl<V: state::Value> Leader<V> {
    pub fn new(core: Arc<Core<V>>, instance: Instance, candidate: V) -> Self {
        Leader {
            core,
            instance,
            candidate,
            proposal: None,
            b_id: Ballot::default(),
            seen: Ballot::default(),
            phase: Phase::Preparing,
            attempt: 0,
        }
    }

    pub async fn run(mut self) -> Phase {
        loop {
            if let Some(phase) = self.settled() {
                self.phase = phase;
            }
            match self.phase {
            | Phase::Preparing => self.prepare().await,
            | Phase::Accepting => self.accept().await,
            | Phase::Decided | Phase::Abandoned => break,
            }
        }
        debug!("instance {} finished as {:?}", self.instance, self.phase);
        self.phase
    }

    /// Terminal phase if something outside this proposer ended the attempt.
    fn settled(&self) -> Option<Phase> {
        if self.core.is_dead() {
            return Some(Phase::Abandoned)
        }
        match self.core.status(self.instance) {
        | Status::Decided(_) => Some(Phase::Decided),
        | Status::Forgotten => Some(Phase::Abandoned),
        | Status::Pending => None,
        }
    }

    async fn prepare(&mut self) {
        self.b_id = self.core
            .promised(self.instance)
            .max(self.seen)
            .max(self.b_id)
            .succ(self.core.id());
        match scout::run(&self.core, self.instance, self.b_id).await {
        | scout::Outcome::Adopted(accepted) => {
            debug!("{:?} adopted for instance {}", self.b_id, self.instance);
            let value = match accepted {
            | Some(pvalue) => pvalue.value,
            | None => self.candidate.clone(),
            };
            self.proposal = Some(value);
            self.phase = Phase::Accepting;
        }
        | scout::Outcome::Preempted(b_id) => self.preempted(b_id).await,
        }
    }

    async fn accept(&mut self) {
        let value = match self.proposal.take() {
        | Some(value) => value,
        | None => {
            self.phase = Phase::Preparing;
            return
        }
        };
        let pvalue = PValue { b_id: self.b_id, value: value.clone() };
        match commander::run(&self.core, self.instance, pvalue).await {
        | commander::Outcome::Chosen => {
            debug!("instance {} decided with {:?}", self.instance, value);
            self.core.decide(self.instance, value);
            self.phase = Phase::Decided;
        }
        | commander::Outcome::Preempted(b_id) => {
            self.phase = Phase::Preparing;
            self.preempted(b_id).await;
        }
        }
    }

    async fn preempted(&mut self, b_id: Ballot) {
        debug!("{:?} preempted by {:?} for instance {}", self.b_id, b_id, self.instance);
        self.seen = self.seen.max(b_id);
        self.attempt += 1;
        let delay = self.core.backoff().delay(self.attempt);
        tokio::time::sleep(delay).await;
    }
}
