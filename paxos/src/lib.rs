#[macro_use] extern crate derivative;
#[macro_use] extern crate log;

mod backoff;
mod config;
mod error;
pub mod local;
pub mod message;
mod shared;
pub mod socket;
mod state;
mod thread;
mod transport;

pub use crate::backoff::{Backoff, Fixed, Jitter};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::message::{Answer, Ballot, Instance};
pub use crate::shared::Status;
pub use crate::state::{Identifier, Value, Command, Response, State};
pub use crate::thread::client::{Client, Rotation};
pub use crate::thread::peer::{Link, Paxos};
pub use crate::thread::replica::{Machine, Replica, Seen};
pub use crate::transport::{Handler, Transport};
