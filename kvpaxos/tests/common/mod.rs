use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kvpaxos::{Clerk, Command, Response, Server};
use paxos::local::{Network, Peers};
use paxos::{Answer, Config, Jitter, Paxos, Rotation, Transport};

pub type Front = Network<Command, Answer<Response>>;

/// A store cluster wired together in memory.
pub struct Cluster {
    pub peers: Peers<Command>,
    pub front: Front,
    pub servers: Vec<Server>,
}

impl Cluster {
    pub fn new(count: usize) -> Self {
        let peers: Peers<Command> = Peers::new();
        let front: Front = Front::new();
        let servers = (0..count)
            .map(|id| {
                let config = Config::new(id, 0, count)
                    .with_backoff(Jitter::new(Duration::from_millis(1), Duration::from_millis(20)))
                    .with_poll(Duration::from_millis(1), Duration::from_millis(50));
                let paxos = Paxos::new(&config, Arc::new(peers.endpoint(id)));
                peers.connect(id, Arc::new(paxos.clone()));
                let server = Server::new(paxos, &config);
                front.connect(id, Arc::new(server.clone()));
                server
            })
            .collect();
        Cluster { peers, front, servers }
    }

    /// Clerk that may use any replica.
    pub fn clerk(&self) -> Clerk {
        Clerk::new(self.servers.len(), Arc::new(self.front.clone()))
            .with_pause(Duration::from_millis(10))
    }

    /// Clerk that tries the replicas in a fresh random order every pass.
    pub fn random_clerk(&self) -> Clerk {
        self.clerk().with_rotation(Rotation::Random)
    }

    /// Clerk that only ever talks to replica `id`.
    pub fn clerk_at(&self, id: usize) -> Clerk {
        let pinned = Pinned { front: self.front.clone(), server: id };
        Clerk::new(1, Arc::new(pinned)).with_pause(Duration::from_millis(10))
    }

    pub fn set_unreliable(&self, unreliable: bool) {
        self.peers.set_unreliable(unreliable);
        self.front.set_unreliable(unreliable);
    }

    /// Crashes replica `id`: it stops proposing and nobody can reach it.
    pub fn kill(&self, id: usize) {
        self.servers[id].kill();
        self.peers.disconnect(id);
        self.front.disconnect(id);
    }
}

struct Pinned {
    front: Front,
    server: usize,
}

#[async_trait]
impl Transport<Command, Answer<Response>> for Pinned {
    async fn call(&self, _: usize, request: Command) -> Option<Answer<Response>> {
        self.front.call(self.server, request).await
    }
}

/// Checks that every `x <client> <n> y` fragment appears exactly once, in
/// increasing `n` order per client.
pub fn check_appends(value: &str, clients: usize, count: usize) {
    for client in 0..clients {
        let mut last = None;
        for n in 0..count {
            let fragment = format!("x {} {} y", client, n);
            let found = value.match_indices(&fragment).map(|(at, _)| at).collect::<Vec<_>>();
            assert_eq!(found.len(), 1, "{:?} appears {} times in {:?}", fragment, found.len(), value);
            if let Some(last) = last {
                assert!(found[0] > last, "{:?} is out of order in {:?}", fragment, value);
            }
            last = Some(found[0]);
        }
    }
}
