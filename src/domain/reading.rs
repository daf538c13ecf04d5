//! Measurement domain entities
//!
//! A sampling cycle produces a [`Snapshot`]: a mapping from measurement
//! name ([`Quantity`]) to a value in physical units, stamped with the
//! cycle time. Drivers emit individual [`Observation`]s which the
//! orchestrator aggregates.

use heapless::LinearMap;

/// Maximum number of distinct quantities a snapshot can hold.
///
/// Climate contributes four, UV four, light one; a little headroom is
/// left for future sensors.
pub const MAX_QUANTITIES: usize = 12;

/// A named physical measurement.
///
/// Uses a closed enum rather than strings so snapshots stay
/// allocation-free and lookups are cheap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Quantity {
    /// Air temperature in degrees Celsius
    Temperature,
    /// Relative humidity in percent
    Humidity,
    /// Barometric pressure in hectopascal
    Pressure,
    /// Gas sensor resistance in Ohms
    GasResistance,
    /// Ambient illuminance in lux
    Illuminance,
    /// UVA irradiance in microwatt per square centimetre
    Uva,
    /// UVB irradiance in microwatt per square centimetre
    Uvb,
    /// UVC irradiance in microwatt per square centimetre
    Uvc,
    /// UV sensor die temperature in degrees Celsius
    UvDieTemperature,
}

impl Quantity {
    /// Stable string name, suitable as a key on an external bus.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Pressure => "pressure",
            Quantity::GasResistance => "gas_resistance",
            Quantity::Illuminance => "illuminance",
            Quantity::Uva => "uva",
            Quantity::Uvb => "uvb",
            Quantity::Uvc => "uvc",
            Quantity::UvDieTemperature => "uv_die_temperature",
        }
    }
}

/// A single compensated measurement produced by one driver.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Observation {
    pub quantity: Quantity,
    /// Value in the physical unit documented on [`Quantity`]
    pub value: f32,
}

impl Observation {
    pub const fn new(quantity: Quantity, value: f32) -> Self {
        Self { quantity, value }
    }
}

/// Aggregated result of one completed sampling cycle.
///
/// Holds the mapping from measurement name to value that is forwarded
/// to the publisher and retained as the node's latest state. Sensors
/// that failed during the cycle are simply absent.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Timestamp in microseconds since boot, taken at cycle start
    pub timestamp_us: i64,
    values: LinearMap<Quantity, f32, MAX_QUANTITIES>,
}

impl Snapshot {
    pub fn new(timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            values: LinearMap::new(),
        }
    }

    /// Insert an observation. Silently drops the value if the snapshot
    /// is at capacity; `MAX_QUANTITIES` covers every driver this crate
    /// ships, so that only happens with foreign drivers.
    pub fn insert(&mut self, observation: Observation) {
        let _ = self.values.insert(observation.quantity, observation.value);
    }

    pub fn get(&self, quantity: Quantity) -> Option<f32> {
        self.values.get(&quantity).copied()
    }

    pub fn contains(&self, quantity: Quantity) -> bool {
        self.values.contains_key(&quantity)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (quantity, value) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Quantity, &f32)> {
        self.values.iter()
    }
}
