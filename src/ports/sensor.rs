//! Sensor port - uniform driver capability
//!
//! Every chip driver exposes the same two operations: a one-time
//! `init` (identity check, calibration parsing, configuration) and a
//! per-cycle `read` returning compensated values in physical units.
//! The orchestrator treats all drivers through this trait and never
//! looks at registers itself.

use core::future::Future;

use crate::domain::Observation;
use crate::ports::bus::{BusError, BusPort};

/// Error type for sensor operations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Identity register did not match the expected chip constant.
    /// Fatal for the driver until it is re-initialized.
    DeviceNotFound,
    /// Bounded status-poll retry budget exhausted during a read.
    /// Transient: the cycle's entry is omitted, the driver stays Ready.
    Timeout,
    /// A transaction returned a block of unexpected length.
    ParseError,
    /// A configuration value was outside its documented bounds.
    /// Nothing was mutated.
    ConfigRejected,
    /// `read` was called before a successful `init`
    NotInitialized,
    /// Transport-level failure
    Bus(BusError),
}

impl From<BusError> for SensorError {
    fn from(e: BusError) -> Self {
        SensorError::Bus(e)
    }
}

/// Lifecycle state of one driver
///
/// `Uninitialized -> Configuring` when init starts, `-> Ready` on
/// success, `-> Faulted` on identity mismatch or unrecoverable init
/// error. After init, `Ready <-> Faulted` only for fatal read errors;
/// transient timeouts and parse failures leave the driver Ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverState {
    Uninitialized,
    Configuring,
    Ready,
    Faulted,
}

/// Compensated values produced by one driver in one cycle.
///
/// No driver in this crate emits more than four.
pub type Observations = heapless::Vec<Observation, 4>;

/// Port for one sensor chip on the shared bus
///
/// The bus is passed into every operation rather than owned by the
/// driver; the orchestrator is the single bus owner, which makes all
/// register transactions across all drivers strictly sequential.
pub trait SensorPort<B: BusPort> {
    /// Verify chip identity, parse factory calibration and write the
    /// measurement configuration. Transitions the driver to Ready.
    fn init(&mut self, bus: &mut B) -> impl Future<Output = Result<(), SensorError>>;

    /// Perform one conversion and return compensated physical values
    fn read(&mut self, bus: &mut B) -> impl Future<Output = Result<Observations, SensorError>>;

    /// Current lifecycle state
    fn state(&self) -> DriverState;

    /// Short name used in logs and diagnostics
    fn label(&self) -> &'static str;
}
