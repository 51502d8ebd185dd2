//! # Summary
//!
//! This module holds the per-peer instance table. We wrap the central `Log`
//! type with Arc<RwLock<T>> so that proposer tasks, the acceptor handler
//! and status queries can share it. Every acceptor decision for every
//! instance happens under the write lock, which serializes concurrent
//! prepares and accepts for the same instance.

use std::sync::Arc;

use hashbrown::HashMap as Map;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::message::{Ballot, Instance};
use crate::state;
use crate::thread::acceptor::Slot;

/// What a peer currently knows about an instance.
#[derive(Clone, Debug, PartialEq)]
pub enum Status<V> {
    Pending,
    Decided(V),
    /// Every peer has called `done` past this instance and it was discarded.
    Forgotten,
}

/// Thread-safe wrapper around the instance table.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Shared<V>(Arc<RwLock<Log<V>>>);

impl<V: state::Value> Shared<V> {
    pub fn new(id: usize, count: usize) -> Self {
        Shared(Arc::new(RwLock::new(Log::new(id, count))))
    }

    /// Acquires a read lock on the underlying table.
    pub fn read(&self) -> RwLockReadGuard<'_, Log<V>> {
        self.0.read()
    }

    /// Acquires a write lock on the underlying table.
    pub fn write(&self) -> RwLockWriteGuard<'_, Log<V>> {
        self.0.write()
    }
}

/// Acceptor state for every retained instance, plus garbage collection
/// watermarks for every peer.
pub struct Log<V> {
    /// ID of the owning peer
    id: usize,

    /// Lazily created acceptor state
    slots: Map<Instance, Slot<V>>,

    /// Highest instance each peer has declared done with
    done: Vec<Option<Instance>>,

    /// Highest instance seen locally
    max: Option<Instance>,

    /// Everything below has been discarded
    floor: Instance,
}

impl<V: state::Value> Log<V> {
    pub fn new(id: usize, count: usize) -> Self {
        Log {
            id,
            slots: Map::default(),
            done: vec![None; count],
            max: None,
            floor: 0,
        }
    }

    /// Acceptor state for `instance`, created on first touch.
    pub fn slot(&mut self, instance: Instance) -> &mut Slot<V> {
        self.observe(instance);
        self.slots.entry(instance).or_default()
    }

    /// Records that `instance` exists somewhere in the system.
    pub fn observe(&mut self, instance: Instance) {
        self.max = Some(self.max.map_or(instance, |max| max.max(instance)));
    }

    pub fn status(&self, instance: Instance) -> Status<V> {
        if instance < self.min() {
            return Status::Forgotten
        }
        match self.slots.get(&instance).and_then(|slot| slot.decided.as_ref()) {
        | Some(value) => Status::Decided(value.clone()),
        | None => Status::Pending,
        }
    }

    /// Highest ballot this peer has promised for `instance`.
    pub fn promised(&self, instance: Instance) -> Ballot {
        self.slots.get(&instance)
            .map(|slot| slot.promised)
            .unwrap_or_default()
    }

    pub fn max(&self) -> Option<Instance> {
        self.max
    }

    /// One past the lowest `done` watermark across all peers.
    pub fn min(&self) -> Instance {
        self.done.iter()
            .map(|done| done.map_or(0, |done| done + 1))
            .min()
            .unwrap_or(0)
    }

    /// This peer's own watermark.
    pub fn done(&self) -> Option<Instance> {
        self.done.get(self.id).copied().flatten()
    }

    /// Raises `peer`'s watermark and discards anything nobody needs.
    /// Returns whether the watermark moved.
    pub fn advance(&mut self, peer: usize, done: Option<Instance>) -> bool {
        let (current, done) = match (self.done.get_mut(peer), done) {
        | (Some(current), Some(done)) => (current, done),
        | _ => return false,
        };
        if current.map_or(false, |current| current >= done) {
            return false
        }
        *current = Some(done);
        self.forget();
        true
    }

    fn forget(&mut self) {
        let min = self.min();
        if min <= self.floor {
            return
        }
        debug!("forgetting instances below {}", min);
        self.slots.retain(|instance, _| *instance >= min);
        self.floor = min;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
