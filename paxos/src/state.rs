use crate::message::Instance;

/// Unique identifier
pub trait Identifier: std::hash::Hash
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Clone
    + Eq
    + Send
    + Sync
    + 'static
{
}

impl<T> Identifier for T where T: std::hash::Hash
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Clone
    + Eq
    + Send
    + Sync
    + 'static
{
}

/// Anything a single Paxos instance can agree on
pub trait Value: Clone
    + PartialEq
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> Value for T where T: Clone
    + PartialEq
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

/// Operation that can be applied to a state machine
pub trait Command: Value {
    type ClientID: Identifier;
    type LocalID: Identifier + Ord;
    fn client_id(&self) -> Self::ClientID;
    fn local_id(&self) -> Self::LocalID;

    /// Filler decided into a slot that a replica had to skip over.
    fn noop() -> Self;
    fn is_noop(&self) -> bool;
}

/// Result of applying an operation to a state machine
pub trait Response: Clone
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> Response for T where T: Clone
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

/// Replicated state machine
pub trait State: Default + Send + 'static {
    type Command: Command;
    type Response: Response;
    fn execute(&mut self, slot: Instance, command: &Self::Command) -> Self::Response;
}
