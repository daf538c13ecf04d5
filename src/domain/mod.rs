//! Domain layer - pure value types independent of infrastructure
//!
//! This module contains the entities exchanged between drivers, the
//! orchestrator and the publisher. Nothing here knows about registers,
//! buses or transports.

pub mod reading;

pub use reading::{Observation, Quantity, Snapshot, MAX_QUANTITIES};
