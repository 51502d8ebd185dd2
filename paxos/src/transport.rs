//! # Summary
//!
//! The seam between the protocol and whatever moves bytes between peers.
//!
//! A transport may lose any request or any reply. Both cases look the same
//! to the caller: `call` returns `None`. It never hands back a reply that
//! belongs to a different request.

use async_trait::async_trait;

/// Point-to-point request/reply delivery to peers named by index.
#[async_trait]
pub trait Transport<Req, Resp>: Send + Sync {
    async fn call(&self, to: usize, request: Req) -> Option<Resp>;
}

/// Receiving end of a transport.
#[async_trait]
pub trait Handler<Req, Resp>: Send + Sync {
    async fn handle(&self, request: Req) -> Resp;
}
