//! # Summary
//!
//! This module defines the application side of a replicated state machine.
//!
//! A `Client` keeps sending one command to replicas until one of them
//! answers it. Lost calls and `Retry` answers both move on to the next
//! replica in the rotation; after every replica has been tried once it
//! pauses before starting another pass. It never gives up.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::message::Answer;
use crate::state;
use crate::transport::Transport;

/// Order in which replicas are tried.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// Start from whichever replica answered last, then go in order.
    RoundRobin,
    /// Fresh shuffle every pass.
    Random,
}

pub struct Client<C, R> {
    servers: usize,
    transport: Arc<dyn Transport<C, Answer<R>>>,
    rotation: Rotation,
    pause: Duration,
    cursor: usize,
}

impl<C, R> Client<C, R>
where C: state::Value,
      R: state::Response,
{
    pub fn new(servers: usize, transport: Arc<dyn Transport<C, Answer<R>>>) -> Self {
        Client {
            servers,
            transport,
            rotation: Rotation::RoundRobin,
            pause: Duration::from_millis(100),
            cursor: 0,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Replicas to try during the next pass.
    fn order(&self) -> Vec<usize> {
        let mut order = (0..self.servers)
            .map(|offset| (self.cursor + offset) % self.servers)
            .collect::<Vec<_>>();
        if self.rotation == Rotation::Random {
            order.shuffle(&mut rand::thread_rng());
        }
        order
    }

    /// Sends `command` until some replica answers it.
    pub async fn call(&mut self, command: C) -> R {
        loop {
            for server in self.order() {
                trace!("sending {:?} to replica {}", command, server);
                match self.transport.call(server, command.clone()).await {
                | Some(Answer::Done(response)) => {
                    self.cursor = server;
                    return response
                }
                | Some(Answer::Retry) => debug!("replica {} asked for a retry", server),
                | None => debug!("no reply from replica {}", server),
                }
            }
            tokio::time::sleep(self.pause).await;
        }
    }
}
