//! # Summary
//!
//! This module carries the transport seam over TCP.
//!
//! Messages are serialized with `bincode` inside `tokio-util`'s
//! length-delimited frames. Each connection carries one request/reply
//! exchange at a time, so a reply always belongs to the request that was
//! just written. Idle connections are pooled per destination and reused.

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::{Error, Result};
use crate::transport::{Handler, Transport};

type Stream = Framed<TcpStream, LengthDelimitedCodec>;

fn frame(stream: TcpStream) -> Stream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

async fn send<T: Serialize>(stream: &mut Stream, message: &T) -> Result<()> {
    let bytes = bincode::serialize(message)?;
    stream.send(Bytes::from(bytes)).await?;
    Ok(())
}

async fn receive<T: DeserializeOwned>(stream: &mut Stream) -> Result<T> {
    let frame = stream.next().await.ok_or(Error::Closed)??;
    Ok(bincode::deserialize(&frame)?)
}

/// Accepts connections on `listener` forever, answering every request on
/// every connection with `handler`. Only fails if `accept` does.
pub async fn serve<Req, Resp>(listener: TcpListener, handler: Arc<dyn Handler<Req, Resp>>) -> Result<()>
where Req: DeserializeOwned + Send + 'static,
      Resp: Serialize + Send + 'static,
{
    info!("listening on {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("connected to {}", addr);
        let handler = handler.clone();
        tokio::spawn(async move {
            match connection(frame(stream), handler).await {
            | Ok(()) => debug!("disconnected from {}", addr),
            | Err(error) => warn!("dropping connection to {}: {}", addr, error),
            }
        });
    }
}

async fn connection<Req, Resp>(mut stream: Stream, handler: Arc<dyn Handler<Req, Resp>>) -> Result<()>
where Req: DeserializeOwned + Send + 'static,
      Resp: Serialize + Send + 'static,
{
    while let Some(frame) = stream.next().await {
        let request: Req = bincode::deserialize(&frame?)?;
        let reply = bincode::serialize(&handler.handle(request).await)?;
        stream.send(Bytes::from(reply)).await?;
    }
    Ok(())
}

/// Client side of `serve`, addressing destinations by index into `addrs`.
pub struct Remote<Req, Resp> {
    addrs: Vec<SocketAddr>,
    pool: Vec<Mutex<Vec<Stream>>>,
    timeout: Duration,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Remote<Req, Resp>
where Req: Serialize + Send + Sync + 'static,
      Resp: DeserializeOwned + Send + 'static,
{
    pub fn new(addrs: Vec<SocketAddr>, timeout: Duration) -> Self {
        let pool = addrs.iter().map(|_| Mutex::new(Vec::new())).collect();
        Remote { addrs, pool, timeout, _marker: PhantomData }
    }

    async fn exchange(&self, to: usize, request: &Req) -> Result<Resp> {
        let addr = *self.addrs.get(to).ok_or(Error::UnknownPeer(to))?;
        let pooled = self.pool[to].lock().pop();
        let mut stream = match pooled {
        | Some(stream) => stream,
        | None => frame(TcpStream::connect(addr).await?),
        };
        send(&mut stream, request).await?;
        let reply = receive(&mut stream).await?;
        self.pool[to].lock().push(stream);
        Ok(reply)
    }
}

#[async_trait]
impl<Req, Resp> Transport<Req, Resp> for Remote<Req, Resp>
where Req: Serialize + Send + Sync + 'static,
      Resp: DeserializeOwned + Send + 'static,
{
    async fn call(&self, to: usize, request: Req) -> Option<Resp> {
        match tokio::time::timeout(self.timeout, self.exchange(to, &request)).await {
        | Ok(Ok(reply)) => Some(reply),
        | Ok(Err(error)) => {
            trace!("call to {} failed: {}", to, error);
            None
        }
        | Err(_) => {
            trace!("call to {} timed out", to);
            None
        }
        }
    }
}
