//! VEML7700 ambient light sensor adapter
//!
//! 16-bit ALS count register, word-oriented configuration. The lux
//! resolution is derived from the selected gain and integration time
//! relative to the datasheet reference point (gain 2x, 800 ms). Above
//! 1000 lux at low gain the sensor response goes non-linear and the
//! vendor correction polynomial is applied.

use embassy_time::{Duration, Timer};

use crate::domain::{Observation, Quantity};
use crate::ports::bus::BusPort;
use crate::ports::sensor::{DriverState, Observations, SensorError, SensorPort};

mod regs {
    pub const ALS_CONF: u8 = 0x00;
    pub const ALS: u8 = 0x04;
    pub const ID: u8 = 0x07;
}

/// Fixed I2C address; the chip has no address pins.
pub const DEFAULT_ADDRESS: u8 = 0x10;

/// Low byte of the device ID register
const ID_LOW_BYTE: u8 = 0x81;

/// Lux per count at the reference operating point
const BASE_RESOLUTION: f32 = 0.0036;
const REFERENCE_GAIN: f32 = 2.0;
const REFERENCE_INTEGRATION_MS: f32 = 800.0;

/// Non-linearity correction kicks in above this, at quarter gain or less
const CORRECTION_THRESHOLD_LUX: f32 = 1000.0;

/// ALS analog gain (configuration word bits 12:11)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Gain {
    X1 = 0b00,
    X2 = 0b01,
    Eighth = 0b10,
    Quarter = 0b11,
}

impl Gain {
    pub const fn multiplier(&self) -> f32 {
        match self {
            Gain::X1 => 1.0,
            Gain::X2 => 2.0,
            Gain::Eighth => 0.125,
            Gain::Quarter => 0.25,
        }
    }
}

/// ALS integration time (configuration word bits 9:6)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IntegrationTime {
    Ms25 = 0b1100,
    Ms50 = 0b1000,
    Ms100 = 0b0000,
    Ms200 = 0b0001,
    Ms400 = 0b0010,
    Ms800 = 0b0011,
}

impl IntegrationTime {
    pub const fn as_ms(&self) -> u32 {
        match self {
            IntegrationTime::Ms25 => 25,
            IntegrationTime::Ms50 => 50,
            IntegrationTime::Ms100 => 100,
            IntegrationTime::Ms200 => 200,
            IntegrationTime::Ms400 => 400,
            IntegrationTime::Ms800 => 800,
        }
    }
}

/// Initialization-time configuration
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Veml7700Config {
    pub address: u8,
    pub gain: Gain,
    pub integration_time: IntegrationTime,
}

impl Default for Veml7700Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            gain: Gain::X1,
            integration_time: IntegrationTime::Ms100,
        }
    }
}

/// Lux per raw count for a gain / integration-time selection
fn lux_per_count(gain: Gain, integration_time: IntegrationTime) -> f32 {
    BASE_RESOLUTION
        * (REFERENCE_INTEGRATION_MS / integration_time.as_ms() as f32)
        * (REFERENCE_GAIN / gain.multiplier())
}

/// Vendor high-lux correction polynomial (application note).
///
/// Identity below the threshold or above quarter gain; the response is
/// linear there.
fn correct_high_lux(lux: f32, gain: Gain) -> f32 {
    if gain.multiplier() > 0.25 || lux <= CORRECTION_THRESHOLD_LUX {
        return lux;
    }
    let x = lux;
    6.0135e-13 * x * x * x * x - 9.3924e-9 * x * x * x + 8.1488e-5 * x * x + 1.0023 * x
}

/// VEML7700 driver state machine
pub struct Veml7700Driver {
    config: Veml7700Config,
    lux_per_count: Option<f32>,
    state: DriverState,
}

impl Veml7700Driver {
    pub fn new(config: Veml7700Config) -> Self {
        Self {
            config,
            lux_per_count: None,
            state: DriverState::Uninitialized,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Packed configuration word: gain bits 12:11, integration time
    /// bits 9:6, persistence 1, interrupts off, shutdown cleared.
    fn config_word(&self) -> u16 {
        ((self.config.gain as u16) << 11) | ((self.config.integration_time as u16) << 6)
    }
}

impl<B: BusPort> SensorPort<B> for Veml7700Driver {
    async fn init(&mut self, bus: &mut B) -> Result<(), SensorError> {
        self.state = DriverState::Configuring;
        self.lux_per_count = None;

        let id = match bus.read_word(self.config.address, regs::ID).await {
            Ok(id) => id,
            Err(e) => {
                self.state = DriverState::Faulted;
                return Err(e.into());
            }
        };
        if id as u8 != ID_LOW_BYTE {
            self.state = DriverState::Faulted;
            return Err(SensorError::DeviceNotFound);
        }

        if let Err(e) = bus
            .write_word(self.config.address, regs::ALS_CONF, self.config_word())
            .await
        {
            self.state = DriverState::Faulted;
            return Err(e.into());
        }

        // The first conversion is only valid one full integration
        // period after configuration.
        Timer::after(Duration::from_millis(
            self.config.integration_time.as_ms() as u64,
        ))
        .await;

        self.lux_per_count = Some(lux_per_count(self.config.gain, self.config.integration_time));
        self.state = DriverState::Ready;
        Ok(())
    }

    async fn read(&mut self, bus: &mut B) -> Result<Observations, SensorError> {
        let lux_per_count = self.lux_per_count.ok_or(SensorError::NotInitialized)?;

        let count = match bus.read_word(self.config.address, regs::ALS).await {
            Ok(count) => count,
            Err(e) => {
                self.state = DriverState::Faulted;
                return Err(e.into());
            }
        };
        self.state = DriverState::Ready;

        let lux = correct_high_lux(count as f32 * lux_per_count, self.config.gain);

        let mut out = Observations::new();
        let _ = out.push(Observation::new(Quantity::Illuminance, lux));
        Ok(out)
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn label(&self) -> &'static str {
        "veml7700"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_bus::SimBus;
    use crate::ports::bus::BusError;
    use embassy_futures::block_on;

    fn sim_with_chip() -> SimBus {
        let mut bus = SimBus::new();
        bus.add_device(DEFAULT_ADDRESS);
        bus.set_word(DEFAULT_ADDRESS, regs::ID, 0xC481);
        bus
    }

    #[test]
    fn resolution_scales_from_reference_point() {
        assert!((lux_per_count(Gain::X2, IntegrationTime::Ms800) - 0.0036).abs() < 1e-7);
        assert!((lux_per_count(Gain::X1, IntegrationTime::Ms100) - 0.0576).abs() < 1e-6);
        assert!((lux_per_count(Gain::Quarter, IntegrationTime::Ms100) - 0.2304).abs() < 1e-6);
        assert!((lux_per_count(Gain::Eighth, IntegrationTime::Ms25) - 1.8432).abs() < 1e-5);
    }

    #[test]
    fn correction_is_identity_in_linear_region() {
        // Below the threshold, any gain
        assert_eq!(correct_high_lux(999.0, Gain::Quarter), 999.0);
        assert_eq!(correct_high_lux(1000.0, Gain::Eighth), 1000.0);
        // Above the threshold but gain over quarter scale
        assert_eq!(correct_high_lux(5000.0, Gain::X1), 5000.0);
        assert_eq!(correct_high_lux(5000.0, Gain::X2), 5000.0);
    }

    #[test]
    fn correction_applies_at_low_gain_high_lux() {
        let corrected = correct_high_lux(1500.0, Gain::Quarter);
        assert!((corrected - 1658.143).abs() < 0.01);
        // Quarter and eighth gain use the same polynomial
        assert_eq!(corrected, correct_high_lux(1500.0, Gain::Eighth));
    }

    #[test]
    fn init_rejects_wrong_identity() {
        let mut bus = sim_with_chip();
        bus.set_word(DEFAULT_ADDRESS, regs::ID, 0xC435);

        let mut driver = Veml7700Driver::new(Veml7700Config::default());
        let err = block_on(driver.init(&mut bus)).unwrap_err();
        assert_eq!(err, SensorError::DeviceNotFound);
        assert_eq!(driver.state(), DriverState::Faulted);
    }

    #[test]
    fn init_writes_packed_config_word() {
        let mut bus = sim_with_chip();
        let mut driver = Veml7700Driver::new(Veml7700Config {
            address: DEFAULT_ADDRESS,
            gain: Gain::X2,
            integration_time: IntegrationTime::Ms50,
        });
        block_on(driver.init(&mut bus)).unwrap();

        let word = u16::from_le_bytes([
            bus.reg(DEFAULT_ADDRESS, regs::ALS_CONF),
            bus.reg(DEFAULT_ADDRESS, regs::ALS_CONF + 1),
        ]);
        assert_eq!(word, (0b01 << 11) | (0b1000 << 6));
        assert_eq!(driver.state(), DriverState::Ready);
    }

    #[test]
    fn read_scales_counts_to_lux() {
        let mut bus = sim_with_chip();
        bus.set_word(DEFAULT_ADDRESS, regs::ALS, 5000);

        let mut driver = Veml7700Driver::new(Veml7700Config {
            address: DEFAULT_ADDRESS,
            gain: Gain::X1,
            integration_time: IntegrationTime::Ms100,
        });
        let out = block_on(async {
            driver.init(&mut bus).await.unwrap();
            driver.read(&mut bus).await.unwrap()
        });

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].quantity, Quantity::Illuminance);
        // 5000 counts * 0.0576 lux/count = 288 lux, linear region
        assert!((out[0].value - 288.0).abs() < 0.01);
    }

    #[test]
    fn read_before_init_is_rejected() {
        let mut bus = sim_with_chip();
        let mut driver = Veml7700Driver::new(Veml7700Config::default());
        let err = block_on(driver.read(&mut bus)).unwrap_err();
        assert_eq!(err, SensorError::NotInitialized);
    }

    #[test]
    fn fatal_bus_error_faults_driver_until_next_success() {
        let mut bus = sim_with_chip();
        bus.set_word(DEFAULT_ADDRESS, regs::ALS, 100);

        let mut driver = Veml7700Driver::new(Veml7700Config::default());
        block_on(driver.init(&mut bus)).unwrap();

        // Chip drops off the bus mid-operation
        bus.remove_device(DEFAULT_ADDRESS);
        let err = block_on(driver.read(&mut bus)).unwrap_err();
        assert_eq!(err, SensorError::Bus(BusError::Nack));
        assert_eq!(driver.state(), DriverState::Faulted);

        // Back on the bus: the next successful read restores Ready
        bus.add_device(DEFAULT_ADDRESS);
        bus.set_word(DEFAULT_ADDRESS, regs::ALS, 100);
        assert!(block_on(driver.read(&mut bus)).is_ok());
        assert_eq!(driver.state(), DriverState::Ready);
    }
}
