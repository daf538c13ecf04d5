//! Channel publisher adapter
//!
//! Forwards snapshots into an `embassy-sync` channel. The transport
//! task (process bus, serial link, ...) drains the channel at its own
//! pace; `try_send` keeps the sampling loop from ever blocking on a
//! slow consumer.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;

use crate::domain::Snapshot;
use crate::ports::publisher::{PublishError, PublisherPort};

/// PublisherPort adapter over an embassy-sync channel sender
pub struct ChannelPublisher<'a, M: RawMutex, const N: usize> {
    sender: Sender<'a, M, Snapshot, N>,
}

impl<'a, M: RawMutex, const N: usize> ChannelPublisher<'a, M, N> {
    pub fn new(sender: Sender<'a, M, Snapshot, N>) -> Self {
        Self { sender }
    }
}

impl<'a, M: RawMutex, const N: usize> PublisherPort for ChannelPublisher<'a, M, N> {
    async fn publish(&mut self, snapshot: &Snapshot) -> Result<(), PublishError> {
        self.sender
            .try_send(snapshot.clone())
            .map_err(|_| PublishError::Backpressure)
    }
}
