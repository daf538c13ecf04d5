//! Publisher port - abstraction for forwarding completed snapshots
//!
//! The orchestrator emits exactly one snapshot per completed sampling
//! cycle. What happens to it (process bus, serial link, log) is the
//! adapter's business; sampling must never block on a slow consumer.

use core::future::Future;

use crate::domain::Snapshot;

/// Error type for publish operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishError {
    /// The notification queue is full; the snapshot was dropped
    Backpressure,
    /// No consumer is attached
    Disconnected,
}

/// Port for change notifications carrying the aggregated mapping
pub trait PublisherPort {
    /// Forward one completed snapshot.
    ///
    /// A failure here is reported to the caller but does not fault any
    /// driver; the snapshot is still retained as the node's latest.
    fn publish(&mut self, snapshot: &Snapshot)
        -> impl Future<Output = Result<(), PublishError>>;
}
