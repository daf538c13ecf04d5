//! Adapters - concrete implementations of ports
//!
//! Adapters connect the domain to the outside world by implementing
//! the port traits. Each adapter knows how to work with a specific
//! chip or technology.
//!
//! # Available Adapters
//!
//! - **i2c_bus**: BusPort over any embedded-hal-async I2C bus
//! - **bme680**: Bosch BME680 climate sensor (T/H/P/gas)
//! - **veml7700**: Vishay VEML7700 ambient light sensor
//! - **as7331**: ams AS7331 UV spectrum sensor
//! - **channel_publisher**: snapshot notifications via embassy-sync

pub mod as7331;
pub mod bme680;
pub mod channel_publisher;
pub mod i2c_bus;
pub mod veml7700;

#[cfg(test)]
pub(crate) mod sim_bus;

pub use as7331::{As7331Config, As7331Driver};
pub use bme680::{Bme680Config, Bme680Driver};
pub use channel_publisher::ChannelPublisher;
pub use i2c_bus::I2cBus;
pub use veml7700::{Veml7700Config, Veml7700Driver};
