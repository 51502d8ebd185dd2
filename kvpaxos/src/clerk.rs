use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use paxos::{Answer, Client, Rotation, Transport};
use rand::Rng;

use crate::{Command, Mode, Response};

/// Client handle for the replicated store.
///
/// Every request carries this clerk's random ID and a fresh local counter,
/// so replicas can recognize a retransmission and answer it from cache.
/// Calls only return once some replica has answered.
pub struct Clerk {
    id: u64,
    counter: u64,
    client: Client<Command, Response>,
}

impl Clerk {
    pub fn new(servers: usize, transport: Arc<dyn Transport<Command, Answer<Response>>>) -> Self {
        let id = rand::thread_rng().gen_range(1..u64::MAX);
        debug!("clerk {:x} talking to {} replicas", id, servers);
        Clerk {
            id,
            counter: 0,
            client: Client::new(servers, transport),
        }
    }

    /// Clerk for replicas listening on `ports` of the local host.
    pub fn connect(ports: &[usize], timeout: Duration) -> paxos::Result<Self> {
        let mut addrs = Vec::with_capacity(ports.len());
        for port in ports {
            addrs.push(format!("127.0.0.1:{}", port).parse::<SocketAddr>()?);
        }
        let remote = paxos::socket::Remote::<Command, Answer<Response>>::new(addrs, timeout);
        Ok(Clerk::new(ports.len(), Arc::new(remote)))
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.client = self.client.with_rotation(rotation);
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.client = self.client.with_pause(pause);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current value of `key`, or the empty string if it was never set.
    pub async fn get(&mut self, key: &str) -> String {
        match self.request(Mode::Get { key: key.to_string() }).await {
        | Response::Value(value) => value,
        | Response::Ack => {
            warn!("replica acknowledged a read of {:?}", key);
            String::new()
        }
        }
    }

    pub async fn put(&mut self, key: &str, value: &str) {
        self.request(Mode::Put { key: key.to_string(), value: value.to_string() }).await;
    }

    pub async fn append(&mut self, key: &str, value: &str) {
        self.request(Mode::Append { key: key.to_string(), value: value.to_string() }).await;
    }

    async fn request(&mut self, mode: Mode) -> Response {
        self.counter += 1;
        let command = Command {
            client_id: self.id,
            local_id: self.counter,
            mode,
        };
        self.client.call(command).await
    }
}
