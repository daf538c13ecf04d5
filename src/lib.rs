//! Environmental Sensor Node Library
//!
//! This library provides a hexagonal architecture for a multi-sensor
//! environmental node: chip drivers for a shared I2C bus, datasheet
//! compensation algorithms, and a periodic sampling orchestrator that
//! aggregates readings and forwards them to a publisher.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                                 │
//! │  - Quantity (measurement name)                                   │
//! │  - Observation / Snapshot entities                               │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Ports (Traits)                               │
//! │  - BusPort: byte/word/block register transactions               │
//! │  - SensorPort: init and read compensated values                 │
//! │  - PublisherPort: per-cycle change notifications                │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters                                     │
//! │  - I2cBus: BusPort over embedded-hal-async I2C                  │
//! │  - Bme680Driver: temperature/humidity/pressure/gas              │
//! │  - Veml7700Driver: ambient light (lux)                          │
//! │  - As7331Driver: UVA/UVB/UVC irradiance + die temperature       │
//! │  - ChannelPublisher: embassy-sync channel notifications         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`sampler::Sampler`] owns the bus and all configured drivers, so
//! register transactions are strictly sequential by construction. A
//! failing sensor never aborts a sampling cycle; its entries are simply
//! omitted from that cycle's snapshot.
//!
//! # Key Benefits
//!
//! - **Testable** - Ports allow simulating the bus for deterministic
//!   driver and orchestrator tests
//! - **Extensible** - Add sensors by implementing SensorPort
//! - **No alloc** - Fixed-capacity collections throughout

#![cfg_attr(not(test), no_std)]

/// Domain layer - pure value types
pub mod domain;

/// Ports - traits defining boundaries
pub mod ports;

/// Adapters - concrete implementations
pub mod adapters;

/// Sampling orchestrator
pub mod sampler;

// Re-export key domain types
pub use domain::{Observation, Quantity, Snapshot};

// Re-export key port traits
pub use ports::{BusError, BusPort, PublisherPort, SensorError, SensorPort};

// Re-export adapters
pub use adapters::{As7331Driver, Bme680Driver, ChannelPublisher, I2cBus, Veml7700Driver};

// Re-export the orchestrator
pub use sampler::{Sampler, SAMPLE_INTERVAL_MAX, SAMPLE_INTERVAL_MIN};
