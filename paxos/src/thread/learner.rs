//! # Summary
//!
//! Outgoing notices that every other peer should eventually hear about:
//! decisions reached by a local proposer, and movement of the local `done`
//! watermark. Producers push into an unbounded queue and never block; a
//! single task drains it in order and broadcasts best-effort, so a lost
//! notice only costs the receiver a later ballot of its own.

use tokio::sync::mpsc;

use crate::message::Instance;

#[derive(Clone, Debug, PartialEq)]
pub enum Notice<V> {
    Decided(Instance, V),
    Done,
}

/// Producing end, held by the peer.
#[derive(Debug)]
pub struct Gossip<V>(mpsc::UnboundedSender<Notice<V>>);

/// Consuming end, held by the broadcasting task.
#[derive(Debug)]
pub struct Outbox<V>(mpsc::UnboundedReceiver<Notice<V>>);

pub fn channel<V>() -> (Gossip<V>, Outbox<V>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Gossip(tx), Outbox(rx))
}

impl<V> Gossip<V> {
    pub fn decided(&self, instance: Instance, value: V) {
        self.send(Notice::Decided(instance, value));
    }

    pub fn done(&self) {
        self.send(Notice::Done);
    }

    /// Does nothing if the broadcasting task has already stopped.
    fn send(&self, notice: Notice<V>) {
        self.0.send(notice).ok();
    }
}

impl<V> Outbox<V> {
    /// Next notice in the order it was produced, or `None` once every
    /// producer is gone.
    pub async fn next(&mut self) -> Option<Notice<V>> {
        self.0.recv().await
    }
}
