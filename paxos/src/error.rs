//! Errors surfaced outside the consensus core.
//!
//! Nothing in here ever reaches a proposer or acceptor: the transports
//! collapse every failure into "no reply" before handing control back.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("invalid address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("connection closed before a reply arrived")]
    Closed,

    #[error("unknown peer {0}")]
    UnknownPeer(usize),
}
