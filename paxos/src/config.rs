use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, Jitter};
use crate::error::{Error, Result};
use crate::message::{Answer, Envelope, Reply, Request};
use crate::socket;
use crate::state;
use crate::thread::peer::{Link, Paxos};
use crate::thread::replica::Replica;

const INTERNAL_PORT: usize = 20000;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unique replica ID
    id: usize,

    /// Port for incoming client requests
    port: usize,

    /// Total number of replicas
    count: usize,

    /// Host to bind and to reach peers on
    host: String,

    /// Explicit peer addresses, overriding `host:20000 + id`
    peers: Option<Vec<SocketAddr>>,

    /// Timeout for detecting unresponsive servers
    timeout: Duration,

    /// Delay policy between ballot attempts
    backoff: Arc<dyn Backoff>,

    /// Initial and maximum interval between status checks
    poll: (Duration, Duration),

    /// Furthest a replica may claim past its lowest unapplied instance
    window: u64,
}

impl Config {
    pub fn new(id: usize, port: usize, count: usize) -> Self {
        Config {
            id,
            port,
            count,
            host: "127.0.0.1".to_string(),
            peers: None,
            timeout: Duration::from_secs(1),
            backoff: Arc::new(Jitter::default()),
            poll: (Duration::from_millis(10), Duration::from_secs(1)),
            window: 16,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn with_poll(mut self, initial: Duration, max: Duration) -> Self {
        self.poll = (initial, max.max(initial));
        self
    }

    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_peers(mut self, peers: Vec<SocketAddr>) -> Self {
        self.count = peers.len();
        self.peers = Some(peers);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn port(&self) -> usize {
        self.port
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backoff(&self) -> Arc<dyn Backoff> {
        self.backoff.clone()
    }

    pub fn poll(&self) -> (Duration, Duration) {
        self.poll
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Consensus addresses of every replica, this one included.
    pub fn peer_addrs(&self) -> Result<Vec<SocketAddr>> {
        if let Some(peers) = &self.peers {
            return Ok(peers.clone())
        }
        let mut addrs = Vec::with_capacity(self.count);
        for id in 0..self.count {
            addrs.push(format!("{}:{}", self.host, id + INTERNAL_PORT).parse()?);
        }
        Ok(addrs)
    }

    /// Address this replica accepts client requests on.
    pub fn client_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    /// Binds both listeners and serves consensus traffic and client
    /// requests until either listener fails.
    pub async fn run<S: state::State>(self) -> Result<()> {
        let peers = self.peer_addrs()?;
        let addr = *peers.get(self.id).ok_or(Error::UnknownPeer(self.id))?;
        let internal = tokio::net::TcpListener::bind(addr).await?;
        let external = tokio::net::TcpListener::bind(self.client_addr()?).await?;

        let transport: Link<S::Command> = Arc::new(
            socket::Remote::<Envelope<Request<S::Command>>, Envelope<Reply<S::Command>>>::new(peers, self.timeout)
        );
        let paxos = Paxos::new(&self, transport);
        let replica = Replica::<S>::new(paxos.clone(), &self);

        info!("replica {} of {} serving clients on port {}", self.id, self.count, self.port);
        tokio::select! {
            result = socket::serve::<Envelope<Request<S::Command>>, Envelope<Reply<S::Command>>>(internal, Arc::new(paxos)) => result,
            result = socket::serve::<S::Command, Answer<S::Response>>(external, Arc::new(replica)) => result,
        }
    }
}
