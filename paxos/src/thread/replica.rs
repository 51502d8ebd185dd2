//! # Summary
//!
//! This module defines `Replica`, a state machine replicated through the
//! consensus peer. Every request, reads included, is placed in its own log
//! instance and only answered once every instance before it has been
//! applied, so each replica executes the same commands in the same order.
//!
//! Requests race for instances. A request that loses its instance to some
//! other command simply claims a later one. Gaps left behind by requests
//! that moved on are filled with no-ops once something after them is
//! decided.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap as Map;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::message::{Answer, Instance};
use crate::shared::Status;
use crate::state::{Command, State};
use crate::thread::peer::Paxos;
use crate::transport::Handler;

type ClientID<S> = <<S as State>::Command as Command>::ClientID;
type LocalID<S> = <<S as State>::Command as Command>::LocalID;

/// Whether a command has already taken effect.
#[derive(Clone, Debug, PartialEq)]
pub enum Seen<R> {
    New,
    /// Applied before; carries the cached response.
    Applied(R),
    /// The client has since moved on to a later request.
    Stale,
}

/// Application state plus everything needed to apply the log exactly once.
pub struct Machine<S: State> {
    state: S,

    /// Lowest unapplied instance
    next: Instance,

    /// Lowest instance not yet claimed by a local request
    claimed: Instance,

    /// Latest applied request and its response, per client
    seen: Map<ClientID<S>, (LocalID<S>, S::Response)>,
}

impl<S: State> Default for Machine<S> {
    fn default() -> Self {
        Machine {
            state: S::default(),
            next: 0,
            claimed: 0,
            seen: Map::default(),
        }
    }
}

impl<S: State> Machine<S> {
    pub fn lookup(&self, command: &S::Command) -> Seen<S::Response> {
        match self.seen.get(&command.client_id()) {
        | Some((local_id, response)) if *local_id == command.local_id() => Seen::Applied(response.clone()),
        | Some((local_id, _)) if *local_id > command.local_id() => Seen::Stale,
        | _ => Seen::New,
        }
    }

    /// Applies the command decided for instance `next`.
    pub fn apply(&mut self, command: &S::Command) {
        let slot = self.next;
        self.next += 1;
        if command.is_noop() {
            trace!("skipping no-op in slot {}", slot);
            return
        }
        if let Seen::New = self.lookup(command) {
            info!("executing {:?} in slot {}", command, slot);
            let response = self.state.execute(slot, command);
            self.seen.insert(command.client_id(), (command.local_id(), response));
        } else {
            debug!("skipping duplicate {:?} in slot {}", command, slot);
        }
    }

    /// Picks an instance for a new request. Never reuses a claimed
    /// instance, and jumps ahead of instances known to be taken elsewhere
    /// by at most `window` past the lowest unapplied one.
    pub fn claim(&mut self, max: Option<Instance>, window: u64) -> Instance {
        let mut slot = self.claimed.max(self.next);
        if let Some(max) = max {
            slot = slot.max((max + 1).min(self.next + window));
        }
        self.claimed = slot + 1;
        slot
    }

    pub fn next(&self) -> Instance {
        self.next
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

struct Inner<S: State> {
    paxos: Paxos<S::Command>,
    machine: Mutex<Machine<S>>,
    poll: (Duration, Duration),
    window: u64,
}

/// Handle to a replicated state machine. Cheap to clone.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Replica<S: State> {
    inner: Arc<Inner<S>>,
}

impl<S: State> Replica<S> {
    pub fn new(paxos: Paxos<S::Command>, config: &Config) -> Self {
        Replica {
            inner: Arc::new(Inner {
                paxos,
                machine: Mutex::new(Machine::default()),
                poll: config.poll(),
                window: config.window(),
            }),
        }
    }

    /// Runs `command` through the log and answers with its response, or
    /// with `Retry` if this replica cannot finish the request.
    pub async fn execute(&self, command: S::Command) -> Answer<S::Response> {
        let paxos = &self.inner.paxos;
        loop {
            if paxos.is_dead() {
                return Answer::Retry
            }

            let slot = {
                let mut machine = self.inner.machine.lock().await;
                self.learn(&mut machine);
                match machine.lookup(&command) {
                | Seen::Applied(response) => return Answer::Done(response),
                | Seen::Stale => return Answer::Retry,
                | Seen::New => machine.claim(paxos.max(), self.inner.window),
                }
            };

            debug!("proposing {:?} for slot {}", command, slot);
            paxos.start(slot, command.clone());
            match self.wait(slot).await {
            | Some(decided) if decided == command => (),
            | Some(_) => {
                debug!("lost slot {} for {:?}", slot, command);
                continue
            }
            | None => continue,
            }

            let mut machine = self.inner.machine.lock().await;
            if !self.apply_through(&mut machine, slot).await {
                continue
            }
            return match machine.lookup(&command) {
            | Seen::Applied(response) => Answer::Done(response),
            | Seen::New | Seen::Stale => Answer::Retry,
            };
        }
    }

    /// Applies every decided instance at the front of the log.
    fn learn(&self, machine: &mut Machine<S>) {
        let start = machine.next;
        while let Status::Decided(command) = self.inner.paxos.status(machine.next) {
            machine.apply(&command);
        }
        self.release(machine, start);
    }

    /// Applies everything up to and including `slot`, proposing no-ops for
    /// any instance that is still open. Returns false if the replica died
    /// or an instance was lost before it could be applied.
    async fn apply_through(&self, machine: &mut Machine<S>, slot: Instance) -> bool {
        let start = machine.next;
        let mut complete = true;
        while machine.next <= slot {
            let next = machine.next;
            let command = match self.inner.paxos.status(next) {
            | Status::Decided(command) => command,
            | Status::Forgotten => {
                warn!("slot {} was forgotten before it was applied", next);
                complete = false;
                break
            }
            | Status::Pending => {
                self.inner.paxos.start(next, S::Command::noop());
                match self.wait(next).await {
                | Some(command) => command,
                | None => {
                    complete = false;
                    break
                }
                }
            }
            };
            machine.apply(&command);
        }
        self.release(machine, start);
        complete
    }

    /// Lets the consensus peer forget what has been applied.
    fn release(&self, machine: &Machine<S>, start: Instance) {
        if machine.next > start {
            self.inner.paxos.done(machine.next - 1);
        }
    }

    /// Polls until `slot` is decided, backing off between checks. `None`
    /// if the peer dies or the slot is forgotten first.
    async fn wait(&self, slot: Instance) -> Option<S::Command> {
        let (mut interval, max) = self.inner.poll;
        loop {
            if self.inner.paxos.is_dead() {
                return None
            }
            match self.inner.paxos.status(slot) {
            | Status::Decided(command) => return Some(command),
            | Status::Forgotten => return None,
            | Status::Pending => (),
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(max);
        }
    }

    /// Stops this replica and its consensus peer.
    pub fn kill(&self) {
        self.inner.paxos.kill();
    }

    pub fn is_dead(&self) -> bool {
        self.inner.paxos.is_dead()
    }

    pub fn paxos(&self) -> &Paxos<S::Command> {
        &self.inner.paxos
    }

    /// Runs `f` against the current application state.
    pub async fn inspect<T>(&self, f: impl FnOnce(&Machine<S>) -> T) -> T {
        f(&*self.inner.machine.lock().await)
    }
}

#[async_trait]
impl<S: State> Handler<S::Command, Answer<S::Response>> for Replica<S> {
    async fn handle(&self, command: S::Command) -> Answer<S::Response> {
        trace!("received {:?}", command);
        self.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Fixed;
    use crate::local::Peers;
    use pretty_assertions::assert_eq;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    #[derive(Clone, Debug, PartialEq)]
    enum Add {
        By { client: u8, local: u32, amount: i64 },
        Nothing,
    }

    impl Command for Add {
        type ClientID = u8;
        type LocalID = u32;

        fn client_id(&self) -> u8 {
            match self {
            | Add::By { client, .. } => *client,
            | Add::Nothing => 0,
            }
        }

        fn local_id(&self) -> u32 {
            match self {
            | Add::By { local, .. } => *local,
            | Add::Nothing => 0,
            }
        }

        fn noop() -> Self {
            Add::Nothing
        }

        fn is_noop(&self) -> bool {
            *self == Add::Nothing
        }
    }

    #[derive(Default)]
    struct Counter(i64);

    impl State for Counter {
        type Command = Add;
        type Response = i64;
        fn execute(&mut self, _: Instance, command: &Add) -> i64 {
            if let Add::By { amount, .. } = command {
                self.0 += amount;
            }
            self.0
        }
    }

    fn add(client: u8, local: u32, amount: i64) -> Add {
        Add::By { client, local, amount }
    }

    fn cluster(count: usize) -> Vec<Replica<Counter>> {
        let network: Peers<Add> = Peers::new();
        cluster_on(&network, count)
    }

    fn cluster_on(network: &Peers<Add>, count: usize) -> Vec<Replica<Counter>> {
        (0..count)
            .map(|id| {
                let config = Config::new(id, 0, count)
                    .with_backoff(Fixed(Duration::from_millis(1)))
                    .with_poll(Duration::from_millis(1), Duration::from_millis(20));
                let paxos = Paxos::new(&config, Arc::new(network.endpoint(id)));
                network.connect(id, Arc::new(paxos.clone()));
                Replica::new(paxos, &config)
            })
            .collect()
    }

    #[test]
    fn machine_applies_each_request_once() {
        let mut machine: Machine<Counter> = Machine::default();
        machine.apply(&add(1, 1, 5));
        machine.apply(&Add::Nothing);
        machine.apply(&add(1, 1, 5));
        machine.apply(&add(2, 1, 3));
        assert_eq!(machine.next(), 4);
        assert_eq!(machine.state().0, 8);
        assert_eq!(machine.lookup(&add(1, 1, 5)), Seen::Applied(5));
        assert_eq!(machine.lookup(&add(1, 0, 5)), Seen::Stale);
        assert_eq!(machine.lookup(&add(1, 2, 5)), Seen::New);
    }

    #[test]
    fn claims_never_repeat_and_jump_within_window() {
        let mut machine: Machine<Counter> = Machine::default();
        assert_eq!(machine.claim(None, 4), 0);
        assert_eq!(machine.claim(None, 4), 1);
        assert_eq!(machine.claim(Some(2), 4), 3);
        assert_eq!(machine.claim(Some(100), 4), 4);
        assert_eq!(machine.claim(Some(100), 4), 5);
    }

    #[tokio::test]
    async fn single_replica_executes_in_order() {
        let replica = cluster(1).remove(0);
        assert_eq!(replica.execute(add(1, 1, 2)).await, Answer::Done(2));
        assert_eq!(replica.execute(add(1, 2, 3)).await, Answer::Done(5));
        assert_eq!(replica.execute(add(2, 1, -1)).await, Answer::Done(4));
        assert_eq!(replica.inspect(|machine| machine.next()).await, 3);
    }

    #[tokio::test]
    async fn retransmission_is_answered_from_cache() {
        let replica = cluster(1).remove(0);
        assert_eq!(replica.execute(add(1, 1, 10)).await, Answer::Done(10));
        assert_eq!(replica.execute(add(1, 1, 10)).await, Answer::Done(10));
        assert_eq!(replica.execute(add(1, 0, 10)).await, Answer::Retry);
        assert_eq!(replica.inspect(|machine| machine.state().0).await, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn replicas_agree_on_order() {
        let replicas = cluster(3);
        let mut handles = Vec::new();
        for (client, replica) in replicas.iter().enumerate() {
            let replica = replica.clone();
            handles.push(tokio::spawn(async move {
                for local in 1..=5 {
                    replica.execute(add(client as u8 + 1, local, 1)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Bring everyone up to date through the log.
        for (id, replica) in replicas.iter().enumerate() {
            assert_eq!(replica.execute(add(9, id as u32 + 1, 0)).await, Answer::Done(15));
        }
    }

    #[tokio::test]
    async fn killed_replica_asks_for_retry() {
        let replica = cluster(1).remove(0);
        replica.kill();
        assert_eq!(replica.execute(add(1, 1, 1)).await, Answer::Retry);
    }

    #[tokio::test]
    async fn waiting_request_retries_once_killed() {
        let network: Peers<Add> = Peers::new();
        let replicas = cluster_on(&network, 3);
        network.disconnect(1);
        network.disconnect(2);

        let replica = replicas[0].clone();
        let pending = tokio::spawn(async move { replica.execute(add(1, 1, 1)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(replicas[0].paxos().status(0), Status::Pending);

        replicas[0].kill();
        let answer = tokio::time::timeout(Duration::from_secs(1), pending).await;
        assert_eq!(answer.unwrap().unwrap(), Answer::Retry);
    }
}
