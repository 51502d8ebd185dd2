//! # Summary
//!
//! This module contains the tasks that make up a consensus peer and the
//! replicated state machine built on top of it.
//!
//! `scout`, `commander` and `leader` drive one instance through the two
//! phases of single-decree Paxos, following the roles described in
//! [Paxos Made Moderately Complex][1]. `acceptor` answers them, `learner`
//! spreads what they decide, and `peer` ties the roles together. `replica`
//! and `client` sit above the peer and speak to applications.
//!
//! [1]: http://paxos.systems/index.html

/// Distributed memory.
pub(crate) mod acceptor;

/// Application-side handle.
pub(crate) mod client;

/// Accept round.
pub(crate) mod commander;

/// Per-instance proposer.
pub(crate) mod leader;

/// Decision gossip.
pub(crate) mod learner;

/// Consensus peer.
pub(crate) mod peer;

/// Replicated state machine.
pub(crate) mod replica;

/// Prepare round.
pub(crate) mod scout;
