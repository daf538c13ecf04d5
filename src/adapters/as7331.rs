//! AS7331 UV spectrum sensor adapter
//!
//! Three UV channels (UVA/UVB/UVC) plus die temperature. The chip has
//! two register banks: configuration registers are only reachable in
//! configuration mode, measurement results only in measurement mode.
//! Conversions run one-shot: trigger, wait the conversion time plus a
//! fixed margin, then read all three channels in one block so a cycle
//! can never mix two conversions.

use embassy_time::{Duration, Timer};

use crate::domain::{Observation, Quantity};
use crate::ports::bus::BusPort;
use crate::ports::sensor::{DriverState, Observations, SensorError, SensorPort};

mod regs {
    /// Operational state register, both banks
    pub const OSR: u8 = 0x00;
    /// Device ID, configuration bank; upper nibble is the device class
    pub const AGEN: u8 = 0x02;
    /// Gain (bits 7:4) and conversion time (bits 3:0), configuration bank
    pub const CREG1: u8 = 0x06;
    /// Internal clock divider, configuration bank
    pub const CREG3: u8 = 0x08;
    /// Die temperature, measurement bank
    pub const TEMP: u8 = 0x01;
    /// UVA/UVB/UVC result words, measurement bank
    pub const MRES: u8 = 0x02;
}

/// OSR device-operating-state encodings
const DOS_CONFIG: u8 = 0x02;
const DOS_MEASURE: u8 = 0x03;
/// Start-conversion bit in OSR
const OSR_SS: u8 = 0x80;

/// Expected upper nibble of the AGEN register
const DEVICE_CLASS: u8 = 0x2;

/// Default I2C address (A1/A0 low)
pub const DEFAULT_ADDRESS: u8 = 0x74;

const MRES_LEN: usize = 6;

/// Extra settle time on top of the conversion time before readout
const CONVERSION_MARGIN: Duration = Duration::from_millis(10);

/// Nominal channel responsivities, uW/cm2 per count at gain 1 and 1 ms
const RESPONSIVITY_UVA: f32 = 1.348;
const RESPONSIVITY_UVB: f32 = 1.574;
const RESPONSIVITY_UVC: f32 = 0.701;

/// Die temperature conversion: T = raw * scale + offset
const TEMP_SCALE: f32 = 0.5;
const TEMP_OFFSET: f32 = -40.0;

const GAIN_CODE_MAX: u8 = 11;
const TIME_CODE_MAX: u8 = 14;
const CLOCK_DIVIDER_MAX: u8 = 3;

/// Gain multiplier for a 4-bit gain code: 2^code, code in [0, 11]
pub const fn gain_multiplier(code: u8) -> u16 {
    1 << code
}

/// Conversion time for a 4-bit time code: 2^code ms, code in [0, 14]
pub const fn conversion_time_ms(code: u8) -> u32 {
    1 << code
}

/// Initialization-time configuration.
///
/// Construction validates the register codes, so a driver can never be
/// built with out-of-range gain or conversion time.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct As7331Config {
    address: u8,
    gain_code: u8,
    time_code: u8,
    clock_divider: u8,
}

impl As7331Config {
    pub fn new(
        address: u8,
        gain_code: u8,
        time_code: u8,
        clock_divider: u8,
    ) -> Result<Self, SensorError> {
        if gain_code > GAIN_CODE_MAX || time_code > TIME_CODE_MAX || clock_divider > CLOCK_DIVIDER_MAX
        {
            return Err(SensorError::ConfigRejected);
        }
        Ok(Self {
            address,
            gain_code,
            time_code,
            clock_divider,
        })
    }

    pub fn gain(&self) -> u16 {
        gain_multiplier(self.gain_code)
    }

    pub fn conversion_time_ms(&self) -> u32 {
        conversion_time_ms(self.time_code)
    }
}

impl Default for As7331Config {
    /// Gain 256x, 64 ms conversions, 1.024 MHz internal clock
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            gain_code: 8,
            time_code: 6,
            clock_divider: 0,
        }
    }
}

/// AS7331 driver state machine
pub struct As7331Driver {
    config: As7331Config,
    ready: bool,
    state: DriverState,
}

impl As7331Driver {
    pub fn new(config: As7331Config) -> Self {
        Self {
            config,
            ready: false,
            state: DriverState::Uninitialized,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    fn scale(&self, raw: u16, responsivity: f32) -> f32 {
        raw as f32 * responsivity
            / (self.config.gain() as f32 * self.config.conversion_time_ms() as f32)
    }
}

impl<B: BusPort> SensorPort<B> for As7331Driver {
    async fn init(&mut self, bus: &mut B) -> Result<(), SensorError> {
        self.state = DriverState::Configuring;
        self.ready = false;
        let addr = self.config.address;

        let result = async {
            // Configuration registers are only visible in config mode
            bus.write_byte(addr, regs::OSR, DOS_CONFIG).await?;

            let agen = bus.read_byte(addr, regs::AGEN).await?;
            if agen >> 4 != DEVICE_CLASS {
                return Err(SensorError::DeviceNotFound);
            }

            bus.write_byte(
                addr,
                regs::CREG1,
                (self.config.gain_code << 4) | self.config.time_code,
            )
            .await?;
            bus.write_byte(addr, regs::CREG3, self.config.clock_divider)
                .await?;

            bus.write_byte(addr, regs::OSR, DOS_MEASURE).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.ready = true;
                self.state = DriverState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = DriverState::Faulted;
                Err(e)
            }
        }
    }

    async fn read(&mut self, bus: &mut B) -> Result<Observations, SensorError> {
        if !self.ready {
            return Err(SensorError::NotInitialized);
        }
        let addr = self.config.address;

        let result = async {
            // One-shot conversion
            bus.write_byte(addr, regs::OSR, DOS_MEASURE | OSR_SS).await?;
            Timer::after(
                Duration::from_millis(self.config.conversion_time_ms() as u64)
                    + CONVERSION_MARGIN,
            )
            .await;

            let mut buf = [0u8; MRES_LEN];
            let n = bus.read_block(addr, regs::MRES, &mut buf).await?;
            if n != MRES_LEN {
                return Err(SensorError::ParseError);
            }
            let temp_raw = bus.read_byte(addr, regs::TEMP).await?;
            Ok((buf, temp_raw))
        }
        .await;

        let (buf, temp_raw) = match result {
            Ok(v) => v,
            Err(e @ (SensorError::Timeout | SensorError::ParseError)) => return Err(e),
            Err(e) => {
                self.state = DriverState::Faulted;
                return Err(e);
            }
        };
        self.state = DriverState::Ready;

        let uva = u16::from_le_bytes([buf[0], buf[1]]);
        let uvb = u16::from_le_bytes([buf[2], buf[3]]);
        let uvc = u16::from_le_bytes([buf[4], buf[5]]);

        let mut out = Observations::new();
        let _ = out.push(Observation::new(
            Quantity::Uva,
            self.scale(uva, RESPONSIVITY_UVA),
        ));
        let _ = out.push(Observation::new(
            Quantity::Uvb,
            self.scale(uvb, RESPONSIVITY_UVB),
        ));
        let _ = out.push(Observation::new(
            Quantity::Uvc,
            self.scale(uvc, RESPONSIVITY_UVC),
        ));
        let _ = out.push(Observation::new(
            Quantity::UvDieTemperature,
            temp_raw as f32 * TEMP_SCALE + TEMP_OFFSET,
        ));
        Ok(out)
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn label(&self) -> &'static str {
        "as7331"
    }
}
