//! # Summary
//!
//! In-process transport, used to run whole clusters inside one test.
//!
//! Every peer registers a `Handler` under its index and talks through an
//! `Endpoint` stamped with that same index, so that a disconnected peer
//! can neither be reached nor reach anyone else. Anonymous callers, such as
//! clients of a replicated state machine, call the `Network` directly.
//!
//! When unreliable, a request is lost before delivery with probability
//! 10%, and a reply is lost after the handler already ran with probability
//! 20%. Either way the caller sees `None`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::{HashMap as Map, HashSet as Set};
use parking_lot::RwLock;
use rand::Rng;

use crate::message::{Envelope, Reply, Request};
use crate::transport::{Handler, Transport};

const DROP_REQUEST: f64 = 0.1;
const DROP_REPLY: f64 = 0.2;

/// Network carrying consensus traffic for values of type `V`.
pub type Peers<V> = Network<Envelope<Request<V>>, Envelope<Reply<V>>>;

/// Shared switchboard. All clones route through the same handlers.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Network<Req, Resp> {
    inner: Arc<RwLock<Inner<Req, Resp>>>,
    calls: Arc<AtomicUsize>,
}

struct Inner<Req, Resp> {
    handlers: Map<usize, Arc<dyn Handler<Req, Resp>>>,
    isolated: Set<usize>,
    unreliable: bool,
    delay: Option<Duration>,
}

/// A peer's own view of the network.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Endpoint<Req, Resp> {
    network: Network<Req, Resp>,
    from: usize,
}

impl<Req, Resp> Default for Network<Req, Resp> {
    fn default() -> Self {
        Network {
            inner: Arc::new(RwLock::new(Inner {
                handlers: Map::default(),
                isolated: Set::default(),
                unreliable: false,
                delay: None,
            })),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<Req, Resp> Network<Req, Resp>
where Req: Send + 'static,
      Resp: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every delivery by a random amount up to `max`, which lets
    /// messages overtake each other.
    pub fn with_delay(self, max: Duration) -> Self {
        self.set_delay(Some(max));
        self
    }

    pub fn set_delay(&self, max: Option<Duration>) {
        self.inner.write().delay = max;
    }

    /// Registers `handler` as peer `id`, replacing any previous one, and
    /// lifts any isolation of `id`.
    pub fn connect(&self, id: usize, handler: Arc<dyn Handler<Req, Resp>>) {
        let mut inner = self.inner.write();
        inner.handlers.insert(id, handler);
        inner.isolated.remove(&id);
    }

    /// Cuts `id` off in both directions. Its handler is kept for `reconnect`.
    pub fn disconnect(&self, id: usize) {
        debug!("disconnecting {}", id);
        self.inner.write().isolated.insert(id);
    }

    pub fn reconnect(&self, id: usize) {
        debug!("reconnecting {}", id);
        self.inner.write().isolated.remove(&id);
    }

    pub fn set_unreliable(&self, unreliable: bool) {
        self.inner.write().unreliable = unreliable;
    }

    /// Transport for peer `from`, which fails whenever `from` is disconnected.
    pub fn endpoint(&self, from: usize) -> Endpoint<Req, Resp> {
        Endpoint { network: self.clone(), from }
    }

    /// Number of calls handed to a handler so far.
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn deliver(&self, from: Option<usize>, to: usize, request: Req) -> Option<Resp> {
        let (handler, unreliable, delay) = {
            let inner = self.inner.read();
            let cut = |id: usize| inner.isolated.contains(&id);
            if cut(to) || from.map_or(false, cut) {
                return None
            }
            (inner.handlers.get(&to)?.clone(), inner.unreliable, inner.delay)
        };
        if let Some(max) = delay {
            tokio::time::sleep(jitter(max)).await;
        }
        if unreliable && lost(DROP_REQUEST) {
            return None
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = handler.handle(request).await;
        if unreliable && lost(DROP_REPLY) {
            return None
        }
        Some(reply)
    }
}

fn lost(probability: f64) -> bool {
    rand::thread_rng().gen_bool(probability)
}

fn jitter(max: Duration) -> Duration {
    let nanos = max.as_nanos() as u64;
    Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
}

#[async_trait]
impl<Req, Resp> Transport<Req, Resp> for Network<Req, Resp>
where Req: Send + 'static,
      Resp: Send + 'static,
{
    async fn call(&self, to: usize, request: Req) -> Option<Resp> {
        self.deliver(None, to, request).await
    }
}

#[async_trait]
impl<Req, Resp> Transport<Req, Resp> for Endpoint<Req, Resp>
where Req: Send + 'static,
      Resp: Send + 'static,
{
    async fn call(&self, to: usize, request: Req) -> Option<Resp> {
        self.network.deliver(Some(self.from), to, request).await
    }
}
