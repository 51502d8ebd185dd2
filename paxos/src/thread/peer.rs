//! # Summary
//!
//! This module defines `Paxos`, the consensus peer. It plays every role at
//! once: acceptor for whoever asks, proposer for instances the local
//! application starts, and learner of decisions gossiped by others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backoff::Backoff;
use crate::config::Config;
use crate::message::{Ballot, Decision, Envelope, Instance, Reply, Request};
use crate::shared::{Shared, Status};
use crate::state;
use crate::thread::{acceptor, leader, learner};
use crate::transport::{Handler, Transport};

/// Connection from one peer to all of the others.
pub type Link<V> = Arc<dyn Transport<Envelope<Request<V>>, Envelope<Reply<V>>>>;

/// State shared by the peer handle, its proposers and its gossip task.
pub struct Core<V> {
    id: usize,
    count: usize,
    shared: Shared<V>,
    transport: Link<V>,
    backoff: Arc<dyn Backoff>,
    gossip: learner::Gossip<V>,
    dead: AtomicBool,
}

impl<V: state::Value> Core<V> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn backoff(&self) -> &dyn Backoff {
        &*self.backoff
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn status(&self, instance: Instance) -> Status<V> {
        self.shared.read().status(instance)
    }

    pub fn promised(&self, instance: Instance) -> Ballot {
        self.shared.read().promised(instance)
    }

    /// Records a decision locally and queues it for the other peers.
    pub fn decide(&self, instance: Instance, value: V) {
        {
            let mut log = self.shared.write();
            if instance < log.min() {
                return
            }
            log.slot(instance).respond_decision(value.clone());
        }
        self.gossip.decided(instance, value);
    }

    fn envelope<T>(&self, body: T) -> Envelope<T> {
        let done = self.shared.read().done();
        Envelope { from: self.id, done, body }
    }

    /// Acceptor side of every request, local or remote.
    fn receive(&self, envelope: Envelope<Request<V>>) -> Envelope<Reply<V>> {
        let mut log = self.shared.write();
        log.advance(envelope.from, envelope.done);
        let body = acceptor::respond(&mut log, envelope.body);
        Envelope { from: self.id, done: log.done(), body }
    }

    /// Sends `request` to every peer, including this one, and streams back
    /// whichever replies arrive. The stream ends once every call has
    /// either answered or been lost.
    pub fn narrowcast(&self, request: Request<V>) -> mpsc::UnboundedReceiver<Reply<V>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for peer in 0..self.count {
            if peer == self.id {
                let reply = self.receive(self.envelope(request.clone()));
                tx.send(reply.body).ok();
                continue
            }
            let tx = tx.clone();
            let call = self.call(peer, request.clone());
            tokio::spawn(async move {
                if let Some(reply) = call.await {
                    tx.send(reply).ok();
                }
            });
        }
        rx
    }

    /// Sends `request` to every other peer without waiting for replies.
    fn broadcast(&self, request: Request<V>) {
        for peer in (0..self.count).filter(|peer| *peer != self.id) {
            tokio::spawn(self.call(peer, request.clone()));
        }
    }

    /// Single exchange with a remote peer. Folds the piggybacked watermark
    /// of the reply into the local table before handing back its body.
    fn call(&self, peer: usize, request: Request<V>) -> impl std::future::Future<Output = Option<Reply<V>>> {
        let envelope = self.envelope(request);
        let transport = self.transport.clone();
        let shared = self.shared.clone();
        async move {
            trace!("sending {:?} to {}", envelope.body, peer);
            let reply = transport.call(peer, envelope).await?;
            trace!("received {:?} from {}", reply.body, peer);
            shared.write().advance(reply.from, reply.done);
            Some(reply.body)
        }
    }
}

/// Handle to a consensus peer. Cheap to clone; all clones share one peer.
///
/// Must be created inside a Tokio runtime: construction spawns the task
/// that gossips decisions, and `start` spawns proposers.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Paxos<V> {
    core: Arc<Core<V>>,
}

impl<V: state::Value> Paxos<V> {
    pub fn new(config: &Config, transport: Link<V>) -> Self {
        let (gossip, outbox) = learner::channel();
        let core = Arc::new(Core {
            id: config.id(),
            count: config.count(),
            shared: Shared::new(config.id(), config.count()),
            transport,
            backoff: config.backoff(),
            gossip,
            dead: AtomicBool::new(false),
        });
        tokio::spawn(spread(Arc::downgrade(&core), outbox));
        Paxos { core }
    }

    pub fn id(&self) -> usize {
        self.core.id
    }

    /// Starts driving `instance` towards a decision, proposing `value` if
    /// no other value has been accepted yet. Returns immediately.
    pub fn start(&self, instance: Instance, value: V) {
        if self.core.is_dead() {
            return
        }
        {
            let mut log = self.core.shared.write();
            if instance < log.min() {
                return
            }
            log.observe(instance);
        }
        let leader = leader::Leader::new(self.core.clone(), instance, value);
        tokio::spawn(async move {
            leader.run().await;
        });
    }

    /// Local knowledge about `instance`; never blocks on the network.
    pub fn status(&self, instance: Instance) -> Status<V> {
        self.core.status(instance)
    }

    /// The application no longer needs `instance` or anything before it.
    pub fn done(&self, instance: Instance) {
        let moved = self.core.shared
            .write()
            .advance(self.core.id, Some(instance));
        if moved {
            self.core.gossip.done();
        }
    }

    /// Highest instance this peer has heard of, if any.
    pub fn max(&self) -> Option<Instance> {
        self.core.shared.read().max()
    }

    /// Lowest instance still retained. Everything below is `Forgotten`.
    pub fn min(&self) -> Instance {
        self.core.shared.read().min()
    }

    /// Stops proposing. Running proposers abandon at their next step.
    pub fn kill(&self) {
        info!("peer {} shutting down", self.core.id);
        self.core.dead.store(true, Ordering::SeqCst);
    }

    pub fn is_dead(&self) -> bool {
        self.core.is_dead()
    }

    /// Number of instances currently held in memory.
    pub fn retained(&self) -> usize {
        self.core.shared.read().len()
    }
}

#[async_trait]
impl<V: state::Value> Handler<Envelope<Request<V>>, Envelope<Reply<V>>> for Paxos<V> {
    async fn handle(&self, request: Envelope<Request<V>>) -> Envelope<Reply<V>> {
        trace!("received {:?} from {}", request.body, request.from);
        self.core.receive(request)
    }
}

/// Drains the gossip queue until the peer is dropped or killed.
async fn spread<V: state::Value>(core: Weak<Core<V>>, mut outbox: learner::Outbox<V>) {
    while let Some(notice) = outbox.next().await {
        let core = match core.upgrade() {
        | Some(core) if !core.is_dead() => core,
        | _ => break,
        };
        let request = match notice {
        | learner::Notice::Decided(instance, value) => Request::Decision(Decision { instance, value }),
        | learner::Notice::Done => Request::Done,
        };
        core.broadcast(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Fixed;
    use crate::local::Peers;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn solo() -> Paxos<String> {
        let network: Peers<String> = Peers::new();
        let config = Config::new(0, 0, 1).with_backoff(Fixed(Duration::ZERO));
        let paxos = Paxos::new(&config, Arc::new(network.endpoint(0)));
        network.connect(0, Arc::new(paxos.clone()));
        paxos
    }

    #[tokio::test]
    async fn single_peer_decides_alone() {
        let paxos = solo();
        paxos.start(0, "only".to_string());
        for _ in 0..100 {
            if paxos.status(0) != Status::Pending {
                break
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(paxos.status(0), Status::Decided("only".to_string()));
        assert_eq!(paxos.max(), Some(0));
    }

    #[tokio::test]
    async fn done_forgets_in_single_peer_cluster() {
        let paxos = solo();
        paxos.start(0, "a".to_string());
        paxos.start(1, "b".to_string());
        for _ in 0..100 {
            if paxos.status(1) != Status::Pending && paxos.status(0) != Status::Pending {
                break
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        paxos.done(0);
        assert_eq!(paxos.min(), 1);
        assert_eq!(paxos.status(0), Status::Forgotten);
        assert_eq!(paxos.status(1), Status::Decided("b".to_string()));
        assert_eq!(paxos.retained(), 1);
    }

    #[tokio::test]
    async fn killed_peer_ignores_proposals() {
        let paxos = solo();
        paxos.kill();
        paxos.start(3, "ignored".to_string());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(paxos.status(3), Status::Pending);
        assert_eq!(paxos.max(), None);
    }
}
