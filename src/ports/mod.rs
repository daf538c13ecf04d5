//! Ports (interfaces) defining the boundaries of the application
//!
//! Ports are traits that define how the domain interacts with external
//! systems. They allow the domain to remain independent of specific
//! implementations.
//!
//! # Hexagonal Architecture
//!
//! In hexagonal architecture, ports define the "holes" in the hexagon
//! where adapters plug in:
//!
//! - **BusPort**: How register transactions reach the chips (I2C, sim)
//! - **SensorPort**: How a chip is initialized and read
//! - **PublisherPort**: How completed snapshots leave the node

pub mod bus;
pub mod publisher;
pub mod sensor;

pub use bus::{BusError, BusPort};
pub use publisher::{PublishError, PublisherPort};
pub use sensor::{DriverState, Observations, SensorError, SensorPort};
