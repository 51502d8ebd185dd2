#[macro_use] extern crate log;

use std::collections::HashMap as Map;

use serde_derive::{Serialize, Deserialize};

mod clerk;
pub mod logger;

pub use crate::clerk::Clerk;

/// A key/value store replicated by Paxos.
pub type Server = paxos::Replica<Store>;

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub client_id: u64,
    pub local_id: u64,
    pub mode: Mode,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    Get { key: String },
    Put { key: String, value: String },
    Append { key: String, value: String },
    /// Fills a log slot nobody claimed.
    Noop,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Value(String),
    Ack,
}

#[derive(Debug, Default)]
pub struct Store {
    map: Map<String, String>,
}

impl Store {
    /// Current value of `key`; absent keys read as empty.
    pub fn get(&self, key: &str) -> &str {
        self.map.get(key).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl paxos::Command for Command {
    type ClientID = u64;
    type LocalID = u64;
    fn client_id(&self) -> Self::ClientID {
        self.client_id
    }
    fn local_id(&self) -> Self::LocalID {
        self.local_id
    }
    fn noop() -> Self {
        Command { client_id: 0, local_id: 0, mode: Mode::Noop }
    }
    fn is_noop(&self) -> bool {
        self.mode == Mode::Noop
    }
}

impl paxos::State for Store {
    type Command = Command;
    type Response = Response;
    fn execute(&mut self, slot: paxos::Instance, command: &Self::Command) -> Self::Response {
        match &command.mode {
        | Mode::Get { key } => Response::Value(self.get(key).to_string()),
        | Mode::Put { key, value } => {
            self.map.insert(key.clone(), value.clone());
            Response::Ack
        }
        | Mode::Append { key, value } => {
            self.map.entry(key.clone()).or_default().push_str(value);
            Response::Ack
        }
        | Mode::Noop => {
            warn!("asked to execute a no-op in slot {}", slot);
            Response::Ack
        }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paxos::{Command as _, State as _};
    use pretty_assertions::assert_eq;

    fn command(local_id: u64, mode: Mode) -> Command {
        Command { client_id: 7, local_id, mode }
    }

    fn get(key: &str) -> Mode {
        Mode::Get { key: key.to_string() }
    }

    #[test]
    fn missing_keys_read_empty() {
        let mut store = Store::default();
        assert_eq!(store.execute(0, &command(1, get("a"))), Response::Value(String::new()));
        assert!(store.is_empty());
    }

    #[test]
    fn put_overwrites_and_append_concatenates() {
        let mut store = Store::default();
        let put = Mode::Put { key: "a".to_string(), value: "x".to_string() };
        let append = Mode::Append { key: "a".to_string(), value: "yz".to_string() };
        assert_eq!(store.execute(0, &command(1, put.clone())), Response::Ack);
        assert_eq!(store.execute(1, &command(2, append.clone())), Response::Ack);
        assert_eq!(store.execute(2, &command(3, get("a"))), Response::Value("xyz".to_string()));
        assert_eq!(store.execute(3, &command(4, put)), Response::Ack);
        assert_eq!(store.get("a"), "x");

        let append = Mode::Append { key: "b".to_string(), value: "new".to_string() };
        store.execute(4, &command(5, append));
        assert_eq!(store.get("b"), "new");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn noop_is_recognized() {
        assert!(Command::noop().is_noop());
        assert!(!command(1, get("a")).is_noop());
    }
}
