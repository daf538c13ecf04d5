//! BME680 climate sensor adapter
//!
//! Drives the Bosch BME680 over the bus port: identity check, soft
//! reset, factory calibration parsing, oversampling/IIR configuration,
//! forced-mode conversions and the Bosch integer compensation formulas
//! for temperature, pressure, humidity and gas resistance.
//!
//! Compensation ordering is load-bearing: temperature produces the
//! fine-temperature intermediate that pressure and humidity consume in
//! the same cycle.

use embassy_time::{Duration, Timer};

use crate::domain::{Observation, Quantity};
use crate::ports::bus::BusPort;
use crate::ports::sensor::{DriverState, Observations, SensorError, SensorPort};

/// Register map (BME680 datasheet section 5.3)
mod regs {
    pub const CHIP_ID: u8 = 0xD0;
    pub const RESET: u8 = 0xE0;
    pub const STATUS: u8 = 0x1D;
    pub const MEAS_DATA: u8 = 0x1F;
    pub const COEFF_BLOCK1: u8 = 0x89;
    pub const COEFF_BLOCK2: u8 = 0xE1;
    pub const RES_HEAT_VAL: u8 = 0x00;
    pub const RES_HEAT_RANGE: u8 = 0x02;
    pub const RANGE_SW_ERR: u8 = 0x04;
    pub const RES_HEAT_0: u8 = 0x5A;
    pub const GAS_WAIT_0: u8 = 0x64;
    pub const CTRL_GAS_1: u8 = 0x71;
    pub const CTRL_HUM: u8 = 0x72;
    pub const CTRL_MEAS: u8 = 0x74;
    pub const CONFIG: u8 = 0x75;
}

const CHIP_ID_VALUE: u8 = 0x61;
const RESET_CMD: u8 = 0xB6;
const COEFF_BLOCK1_LEN: usize = 25;
const COEFF_BLOCK2_LEN: usize = 16;
const COEFF_TOTAL_LEN: usize = COEFF_BLOCK1_LEN + COEFF_BLOCK2_LEN;
const MEAS_DATA_LEN: usize = 13;

/// Settle time after soft reset
const RESET_SETTLE: Duration = Duration::from_millis(10);
/// Status poll budget: retries x backoff bounds the worst-case stall
const POLL_RETRIES: u32 = 10;
const POLL_BACKOFF: Duration = Duration::from_millis(10);

/// Default I2C address (SDO low). SDO high gives 0x77.
pub const DEFAULT_ADDRESS: u8 = 0x76;

/// Oversampling settings for temperature, pressure and humidity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Oversampling {
    /// Measurement skipped entirely
    Skipped = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

/// IIR filter coefficient for temperature and pressure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IirFilter {
    Off = 0,
    Coeff1 = 1,
    Coeff3 = 2,
    Coeff7 = 3,
    Coeff15 = 4,
    Coeff31 = 5,
    Coeff63 = 6,
    Coeff127 = 7,
}

/// Gas heater profile written into slot 0 at init
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GasProfile {
    /// Heater plate target temperature in degrees Celsius (capped at 400)
    pub target_temp_c: u16,
    /// Heating duration before the gas measurement, in milliseconds.
    /// The hardware encoding caps this at 4096 ms.
    pub heat_duration_ms: u32,
}

/// Initialization-time configuration
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bme680Config {
    pub address: u8,
    pub temp_oversampling: Oversampling,
    pub hum_oversampling: Oversampling,
    pub pres_oversampling: Oversampling,
    pub iir_filter: IirFilter,
    /// `None` disables the gas measurement entirely
    pub gas_profile: Option<GasProfile>,
    /// Ambient temperature estimate for the heater resistance formula
    pub ambient_temp_c: i32,
}

impl Default for Bme680Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            temp_oversampling: Oversampling::X8,
            hum_oversampling: Oversampling::X2,
            pres_oversampling: Oversampling::X4,
            iir_filter: IirFilter::Coeff3,
            gas_profile: Some(GasProfile {
                target_temp_c: 320,
                heat_duration_ms: 150,
            }),
            ambient_temp_c: 25,
        }
    }
}

/// Factory-fused calibration coefficients, parsed once at init.
///
/// Immutable after construction; compensation takes it by reference.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bme680Calibration {
    par_t1: u16,
    par_t2: i16,
    par_t3: i8,
    par_p1: u16,
    par_p2: i16,
    par_p3: i8,
    par_p4: i16,
    par_p5: i16,
    par_p6: i8,
    par_p7: i8,
    par_p8: i16,
    par_p9: i16,
    par_p10: u8,
    par_h1: u16,
    par_h2: u16,
    par_h3: i8,
    par_h4: i8,
    par_h5: i8,
    par_h6: u8,
    par_h7: i8,
    par_g1: i8,
    par_g2: i16,
    par_g3: i8,
    res_heat_range: u8,
    res_heat_val: u8,
    range_sw_err: i8,
}

impl Bme680Calibration {
    /// Parse the two concatenated coefficient blocks plus the three
    /// heater bytes. Offsets follow the datasheet register map; note
    /// H1/H2 share a nibble-packed byte at offset 26.
    fn parse(coeff: &[u8; COEFF_TOTAL_LEN], heat_val: u8, heat_range: u8, sw_err: u8) -> Self {
        Self {
            par_t1: u16::from_le_bytes([coeff[33], coeff[34]]),
            par_t2: i16::from_le_bytes([coeff[1], coeff[2]]),
            par_t3: coeff[3] as i8,
            par_p1: u16::from_le_bytes([coeff[5], coeff[6]]),
            par_p2: i16::from_le_bytes([coeff[7], coeff[8]]),
            par_p3: coeff[9] as i8,
            par_p4: i16::from_le_bytes([coeff[11], coeff[12]]),
            par_p5: i16::from_le_bytes([coeff[14], coeff[13]]),
            par_p6: coeff[16] as i8,
            par_p7: coeff[15] as i8,
            par_p8: i16::from_le_bytes([coeff[19], coeff[20]]),
            par_p9: i16::from_le_bytes([coeff[21], coeff[22]]),
            par_p10: coeff[23],
            par_h1: ((coeff[26] & 0x0F) as u16) | ((coeff[27] as u16) << 4),
            par_h2: ((coeff[26] >> 4) as u16) | ((coeff[25] as u16) << 4),
            par_h3: coeff[28] as i8,
            par_h4: coeff[29] as i8,
            par_h5: coeff[30] as i8,
            par_h6: coeff[31],
            par_h7: coeff[32] as i8,
            par_g1: coeff[37] as i8,
            par_g2: i16::from_le_bytes([coeff[35], coeff[36]]),
            par_g3: coeff[38] as i8,
            res_heat_range: (heat_range >> 4) & 0x03,
            res_heat_val: heat_val,
            range_sw_err: (sw_err as i8) >> 4,
        }
    }
}

/// Raw ADC fields extracted from one atomic 13-byte burst read
#[derive(Clone, Copy, Debug)]
struct RawSample {
    temp_adc: u32,
    press_adc: u32,
    hum_adc: u16,
    gas_adc: u16,
    gas_range: u8,
    gas_valid: bool,
    heat_stable: bool,
}

impl RawSample {
    fn extract(buf: &[u8; MEAS_DATA_LEN]) -> Self {
        Self {
            press_adc: ((buf[2] as u32) >> 4) | ((buf[1] as u32) << 4) | ((buf[0] as u32) << 12),
            temp_adc: ((buf[5] as u32) >> 4) | ((buf[4] as u32) << 4) | ((buf[3] as u32) << 12),
            hum_adc: ((buf[7] as u16) | ((buf[6] as u16) << 8)),
            gas_adc: ((buf[12] as u16) >> 6) | ((buf[11] as u16) << 2),
            gas_range: buf[12] & 0x0F,
            gas_valid: (buf[12] >> 5) & 0x1 != 0,
            heat_stable: (buf[12] >> 4) & 0x1 != 0,
        }
    }
}

/// Fine-temperature intermediate plus the compensated value.
///
/// `t_fine` is only meaningful within the sampling cycle that produced
/// it; pressure and humidity compensation of the same cycle consume it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TempReading {
    t_fine: i32,
    /// Centi-degrees Celsius (2350 = 23.50 C)
    centi_celsius: i32,
}

/// Range lookup tables for gas resistance compensation (Bosch API)
static GAS_RANGE_TABLE1: [u32; 16] = [
    2147483647, 2147483647, 2147483647, 2147483647, 2147483647, 2126008810, 2147483647,
    2130303777, 2147483647, 2147483647, 2143188679, 2136746228, 2147483647, 2126008810,
    2147483647, 2147483647,
];
static GAS_RANGE_TABLE2: [u32; 16] = [
    4096000000, 2048000000, 1024000000, 512000000, 255744255, 127110228, 64000000, 32258064,
    16016016, 8000000, 4000000, 2000000, 1000000, 500000, 250000, 125000,
];

fn compensate_temperature(cal: &Bme680Calibration, temp_adc: u32) -> TempReading {
    let var1 = ((temp_adc as i32) >> 3) - ((cal.par_t1 as i32) << 1);
    let var2 = (var1 * cal.par_t2 as i32) >> 11;
    let var3 = ((((var1 >> 1) * (var1 >> 1)) >> 12) * ((cal.par_t3 as i32) << 4)) >> 14;
    let t_fine = var2 + var3;

    TempReading {
        t_fine,
        centi_celsius: ((t_fine * 5) + 128) >> 8,
    }
}

/// Pressure in Pascal. Returns 0 when the calibration denominator
/// collapses to zero instead of dividing by it.
fn compensate_pressure(cal: &Bme680Calibration, t_fine: i32, press_adc: u32) -> u32 {
    let mut var1 = (t_fine >> 1) - 64_000;
    let mut var2 = ((((var1 >> 2) * (var1 >> 2)) >> 11) * cal.par_p6 as i32) >> 2;
    var2 += (var1 * cal.par_p5 as i32) << 1;
    var2 = (var2 >> 2) + ((cal.par_p4 as i32) << 16);
    var1 = (((((var1 >> 2) * (var1 >> 2)) >> 13) * ((cal.par_p3 as i32) << 5)) >> 3)
        + (((cal.par_p2 as i32) * var1) >> 1);
    var1 >>= 18;
    var1 = ((32768 + var1) * (cal.par_p1 as i32)) >> 15;

    if var1 == 0 {
        return 0;
    }

    let mut press_comp = 1048576u32.wrapping_sub(press_adc) as i32;
    press_comp = ((press_comp - (var2 >> 12)) as u32).wrapping_mul(3125) as i32;

    if press_comp >= (1 << 30) {
        press_comp = ((press_comp as u32).wrapping_div(var1 as u32) << 1) as i32;
    } else {
        press_comp = ((press_comp << 1) as u32).wrapping_div(var1 as u32) as i32;
    }

    let var1 = ((cal.par_p9 as i32) * (((press_comp >> 3) * (press_comp >> 3)) >> 13)) >> 12;
    let var2 = ((press_comp >> 2) * cal.par_p8 as i32) >> 13;
    let var3 = ((press_comp >> 8) * (press_comp >> 8) * (press_comp >> 8) * cal.par_p10 as i32)
        >> 17;

    press_comp += (var1 + var2 + var3 + ((cal.par_p7 as i32) << 7)) >> 4;
    press_comp as u32
}

/// Humidity in milli-percent, clamped to the physical [0, 100 %] range.
fn compensate_humidity(cal: &Bme680Calibration, temp_centi_c: i32, hum_adc: u16) -> i32 {
    let var1 = hum_adc as i32
        - ((cal.par_h1 as i32) << 4)
        - (((temp_centi_c * cal.par_h3 as i32) / 100) >> 1);
    let var2 = (cal.par_h2 as i32
        * (((temp_centi_c * cal.par_h4 as i32) / 100)
            + (((temp_centi_c * ((temp_centi_c * cal.par_h5 as i32) / 100)) >> 6) / 100
                + (1 << 14))))
        >> 10;
    let var3 = var1 as i64 * var2 as i64;
    let var4 = (((cal.par_h6 as i32) << 7) + ((temp_centi_c * cal.par_h7 as i32) / 100)) >> 4;
    let var5 = ((var3 >> 14) * (var3 >> 14)) >> 10;
    let var6 = (var4 as i64 * var5) >> 1;

    let hum = (((var3 + var6) >> 10) * 1000) >> 12;
    hum.clamp(0, 100_000) as i32
}

/// Gas resistance in Ohms from the raw ADC value and 4-bit range index.
///
/// 64-bit intermediates avoid overflow at extreme resistances.
fn compensate_gas(cal: &Bme680Calibration, gas_adc: u16, gas_range: u8) -> u32 {
    let var1 = ((1340 + (5 * cal.range_sw_err as i64))
        * (GAS_RANGE_TABLE1[gas_range as usize] as i64))
        >> 16;
    let var2 = ((gas_adc as i64) << 15) - (1 << 24) + var1;
    let var3 = (GAS_RANGE_TABLE2[gas_range as usize] as i64 * var1) >> 9;

    ((var3 + (var2 >> 1)) / var2) as u32
}

/// BME680 driver state machine
pub struct Bme680Driver {
    config: Bme680Config,
    calibration: Option<Bme680Calibration>,
    state: DriverState,
}

impl Bme680Driver {
    pub fn new(config: Bme680Config) -> Self {
        Self {
            config,
            calibration: None,
            state: DriverState::Uninitialized,
        }
    }

    pub fn calibration(&self) -> Option<&Bme680Calibration> {
        self.calibration.as_ref()
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Heater on-time register encoding: 6-bit mantissa, 2-bit
    /// multiplier (1/4/16/64 ms steps). Durations above 4096 ms do not
    /// fit the encoding.
    fn encode_heat_duration(duration_ms: u32) -> Result<u8, SensorError> {
        if duration_ms > 4096 {
            return Err(SensorError::ConfigRejected);
        }
        let (step, bits) = match duration_ms {
            0..=63 => (1, 0b00),
            64..=252 => (4, 0b01),
            253..=1008 => (16, 0b10),
            _ => (64, 0b11),
        };
        Ok(((duration_ms / step) as u8 & 0x3F) | (bits << 6))
    }

    /// Heater set-point register value from the target temperature,
    /// ambient estimate and heater calibration (Bosch integer formula).
    /// The target is capped at 400 C to protect the sensor membrane.
    fn encode_heater_resistance(cal: &Bme680Calibration, target_temp_c: u16, ambient_c: i32) -> u8 {
        let target = i32::from(target_temp_c.min(400));

        let var1 = ((ambient_c * cal.par_g3 as i32) / 10) << 8;
        let var2 = (cal.par_g1 as i32 + 784)
            * (((((cal.par_g2 as i32 + 154009) * target * 5) / 100) + 3276800) / 10);
        let var3 = var1 + (var2 >> 1);
        let var4 = var3 / (cal.res_heat_range as i32 + 4);
        let var5 = 131 * (cal.res_heat_val as i32) + 65536;

        let res_heat_x100 = ((var4 / var5) - 250) * 34;
        ((res_heat_x100 + 50) / 100) as u8
    }

    async fn read_calibration<B: BusPort>(
        &mut self,
        bus: &mut B,
    ) -> Result<Bme680Calibration, SensorError> {
        let mut coeff = [0u8; COEFF_TOTAL_LEN];
        let n = bus
            .read_block(
                self.config.address,
                regs::COEFF_BLOCK1,
                &mut coeff[..COEFF_BLOCK1_LEN],
            )
            .await?;
        if n != COEFF_BLOCK1_LEN {
            return Err(SensorError::ParseError);
        }
        let n = bus
            .read_block(
                self.config.address,
                regs::COEFF_BLOCK2,
                &mut coeff[COEFF_BLOCK1_LEN..],
            )
            .await?;
        if n != COEFF_BLOCK2_LEN {
            return Err(SensorError::ParseError);
        }

        let heat_val = bus.read_byte(self.config.address, regs::RES_HEAT_VAL).await?;
        let heat_range = bus
            .read_byte(self.config.address, regs::RES_HEAT_RANGE)
            .await?;
        let sw_err = bus.read_byte(self.config.address, regs::RANGE_SW_ERR).await?;

        Ok(Bme680Calibration::parse(&coeff, heat_val, heat_range, sw_err))
    }

    async fn write_measurement_config<B: BusPort>(
        &mut self,
        bus: &mut B,
        cal: &Bme680Calibration,
    ) -> Result<(), SensorError> {
        let addr = self.config.address;

        // Humidity oversampling, bits [2:0] of ctrl_hum
        let reg = bus.read_byte(addr, regs::CTRL_HUM).await?;
        bus.write_byte(
            addr,
            regs::CTRL_HUM,
            (reg & 0xF8) | self.config.hum_oversampling as u8,
        )
        .await?;

        // Temperature/pressure oversampling, bits [7:5]/[4:2] of ctrl_meas
        let reg = bus.read_byte(addr, regs::CTRL_MEAS).await?;
        let osrs = ((self.config.temp_oversampling as u8) << 5)
            | ((self.config.pres_oversampling as u8) << 2);
        bus.write_byte(addr, regs::CTRL_MEAS, (reg & 0x03) | osrs)
            .await?;

        // IIR filter, bits [4:2] of config
        let reg = bus.read_byte(addr, regs::CONFIG).await?;
        bus.write_byte(
            addr,
            regs::CONFIG,
            (reg & 0xE3) | ((self.config.iir_filter as u8) << 2),
        )
        .await?;

        // Gas heater profile slot 0, or run_gas cleared when disabled
        let ctrl_gas = bus.read_byte(addr, regs::CTRL_GAS_1).await?;
        match self.config.gas_profile {
            Some(profile) => {
                let wait = Self::encode_heat_duration(profile.heat_duration_ms)?;
                bus.write_byte(addr, regs::GAS_WAIT_0, wait).await?;

                let res_heat = Self::encode_heater_resistance(
                    cal,
                    profile.target_temp_c,
                    self.config.ambient_temp_c,
                );
                bus.write_byte(addr, regs::RES_HEAT_0, res_heat).await?;

                // run_gas (bit 4) on, nb_conv (bits 3:0) = slot 0
                bus.write_byte(addr, regs::CTRL_GAS_1, (ctrl_gas & 0xE0) | 0x10)
                    .await?;
            }
            None => {
                bus.write_byte(addr, regs::CTRL_GAS_1, ctrl_gas & 0xEF).await?;
            }
        }

        Ok(())
    }

    /// Poll the new_data flag with a bounded retry budget, then burst
    /// read the full measurement block.
    async fn acquire_raw<B: BusPort>(&mut self, bus: &mut B) -> Result<RawSample, SensorError> {
        let addr = self.config.address;

        let mut retries = POLL_RETRIES;
        loop {
            let status = bus.read_byte(addr, regs::STATUS).await?;
            if status >> 7 != 0 {
                break;
            }
            if retries == 0 {
                return Err(SensorError::Timeout);
            }
            retries -= 1;
            Timer::after(POLL_BACKOFF).await;
        }

        let mut buf = [0u8; MEAS_DATA_LEN];
        let n = bus.read_block(addr, regs::MEAS_DATA, &mut buf).await?;
        if n != MEAS_DATA_LEN {
            return Err(SensorError::ParseError);
        }
        Ok(RawSample::extract(&buf))
    }
}

impl<B: BusPort> SensorPort<B> for Bme680Driver {
    async fn init(&mut self, bus: &mut B) -> Result<(), SensorError> {
        self.state = DriverState::Configuring;
        self.calibration = None;

        let result = async {
            let chip_id = bus.read_byte(self.config.address, regs::CHIP_ID).await?;
            if chip_id != CHIP_ID_VALUE {
                return Err(SensorError::DeviceNotFound);
            }

            bus.write_byte(self.config.address, regs::RESET, RESET_CMD)
                .await?;
            Timer::after(RESET_SETTLE).await;

            let cal = self.read_calibration(bus).await?;
            self.write_measurement_config(bus, &cal).await?;
            Ok(cal)
        }
        .await;

        match result {
            Ok(cal) => {
                self.calibration = Some(cal);
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
        let cal = self.calibration.ok_or(SensorError::NotInitialized)?;
        let addr = self.config.address;

        let result = async {
            // Trigger one forced-mode conversion
            let reg = bus.read_byte(addr, regs::CTRL_MEAS).await?;
            bus.write_byte(addr, regs::CTRL_MEAS, (reg & 0xFC) | 0b01)
                .await?;

            // The chip measures T/P/H first, then heats for the gas stage
            if let Some(profile) = self.config.gas_profile {
                Timer::after(Duration::from_millis(profile.heat_duration_ms as u64)).await;
            }

            self.acquire_raw(bus).await
        }
        .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(e @ (SensorError::Timeout | SensorError::ParseError)) => {
                // Transient: this cycle is lost, the driver stays Ready
                return Err(e);
            }
            Err(e) => {
                self.state = DriverState::Faulted;
                return Err(e);
            }
        };
        self.state = DriverState::Ready;

        // Temperature first: pressure and humidity need this cycle's
        // fine-temperature intermediate.
        let temp = compensate_temperature(&cal, raw.temp_adc);
        let pres_pa = compensate_pressure(&cal, temp.t_fine, raw.press_adc);
        let hum_milli = compensate_humidity(&cal, temp.centi_celsius, raw.hum_adc);

        let mut out = Observations::new();
        let _ = out.push(Observation::new(
            Quantity::Temperature,
            temp.centi_celsius as f32 / 100.0,
        ));
        let _ = out.push(Observation::new(
            Quantity::Humidity,
            hum_milli as f32 / 1000.0,
        ));
        let _ = out.push(Observation::new(
            Quantity::Pressure,
            pres_pa as f32 / 100.0,
        ));

        // A gas reading with stale or unstable heater data is dropped,
        // not an error for the cycle.
        if self.config.gas_profile.is_some() && raw.gas_valid && raw.heat_stable {
            let gas_ohms = compensate_gas(&cal, raw.gas_adc, raw.gas_range);
            let _ = out.push(Observation::new(Quantity::GasResistance, gas_ohms as f32));
        }

        Ok(out)
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn label(&self) -> &'static str {
        "bme680"
    }
}
