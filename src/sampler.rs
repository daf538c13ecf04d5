//! Sampling orchestrator
//!
//! Owns the bus and every configured driver, so all register
//! transactions in the system are strictly sequential. Each cycle reads
//! the drivers one after another, aggregates whatever succeeded into a
//! [`Snapshot`] and hands it to the publisher; a failing driver costs
//! only its own entries, never the cycle.

use embassy_time::{Duration, Instant, Timer};

use crate::adapters::{As7331Driver, Bme680Driver, Veml7700Driver};
use crate::domain::Snapshot;
use crate::ports::bus::BusPort;
use crate::ports::publisher::PublisherPort;
use crate::ports::sensor::{SensorError, SensorPort};

/// Shortest accepted sampling interval
pub const SAMPLE_INTERVAL_MIN: Duration = Duration::from_secs(1);
/// Longest accepted sampling interval, one day
pub const SAMPLE_INTERVAL_MAX: Duration = Duration::from_secs(86_400);

fn check_interval(interval: Duration) -> Result<(), SensorError> {
    if interval < SAMPLE_INTERVAL_MIN || interval > SAMPLE_INTERVAL_MAX {
        return Err(SensorError::ConfigRejected);
    }
    Ok(())
}

async fn init_driver<B: BusPort, S: SensorPort<B>>(driver: &mut S, bus: &mut B) {
    match driver.init(bus).await {
        Ok(()) => {
            #[cfg(feature = "defmt")]
            defmt::info!("{=str} ready", driver.label());
        }
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("{=str} init failed: {}", driver.label(), _e);
        }
    }
}

async fn read_into<B: BusPort, S: SensorPort<B>>(
    driver: &mut S,
    bus: &mut B,
    snapshot: &mut Snapshot,
) {
    match driver.read(bus).await {
        Ok(observations) => {
            for observation in &observations {
                snapshot.insert(*observation);
            }
        }
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("{=str} read failed: {}", driver.label(), _e);
        }
    }
}

/// Periodic sampling orchestrator.
///
/// Drivers are optional; a node carrying only a subset of the chips
/// configures only those. The driver set is fixed at construction.
pub struct Sampler<B: BusPort, P: PublisherPort> {
    bus: B,
    publisher: P,
    interval: Duration,
    climate: Option<Bme680Driver>,
    light: Option<Veml7700Driver>,
    uv: Option<As7331Driver>,
    latest: Option<Snapshot>,
}

impl<B: BusPort, P: PublisherPort> Sampler<B, P> {
    /// Rejects intervals outside
    /// [`SAMPLE_INTERVAL_MIN`, `SAMPLE_INTERVAL_MAX`].
    pub fn new(bus: B, publisher: P, interval: Duration) -> Result<Self, SensorError> {
        check_interval(interval)?;
        Ok(Self {
            bus,
            publisher,
            interval,
            climate: None,
            light: None,
            uv: None,
            latest: None,
        })
    }

    pub fn with_climate(mut self, driver: Bme680Driver) -> Self {
        self.climate = Some(driver);
        self
    }

    pub fn with_light(mut self, driver: Veml7700Driver) -> Self {
        self.light = Some(driver);
        self
    }

    pub fn with_uv(mut self, driver: As7331Driver) -> Self {
        self.uv = Some(driver);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Change the sampling interval. Out-of-bounds values are rejected
    /// and the previous interval stays in effect.
    pub fn set_interval(&mut self, interval: Duration) -> Result<(), SensorError> {
        check_interval(interval)?;
        self.interval = interval;
        Ok(())
    }

    /// Snapshot of the last completed cycle, if any
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Initialize every configured driver. A driver that fails to come
    /// up is left Faulted and skipped by subsequent cycles; the others
    /// are unaffected.
    pub async fn init_all(&mut self) {
        if let Some(driver) = self.climate.as_mut() {
            init_driver(driver, &mut self.bus).await;
        }
        if let Some(driver) = self.light.as_mut() {
            init_driver(driver, &mut self.bus).await;
        }
        if let Some(driver) = self.uv.as_mut() {
            init_driver(driver, &mut self.bus).await;
        }
    }

    /// Run one sampling cycle: read every driver in turn, publish the
    /// aggregate and retain it as the latest state. Publishing failures
    /// drop the notification only; the snapshot is still retained.
    pub async fn run_cycle(&mut self) {
        let mut snapshot = Snapshot::new(Instant::now().as_micros() as i64);

        if let Some(driver) = self.climate.as_mut() {
            read_into(driver, &mut self.bus, &mut snapshot).await;
        }
        if let Some(driver) = self.light.as_mut() {
            read_into(driver, &mut self.bus, &mut snapshot).await;
        }
        if let Some(driver) = self.uv.as_mut() {
            read_into(driver, &mut self.bus, &mut snapshot).await;
        }

        if let Err(_e) = self.publisher.publish(&snapshot).await {
            #[cfg(feature = "defmt")]
            defmt::warn!("snapshot dropped: {}", _e);
        }
        self.latest = Some(snapshot);
    }

    /// Initialize all drivers, then sample forever at the configured
    /// interval.
    pub async fn run(&mut self) -> ! {
        self.init_all().await;
        loop {
            self.run_cycle().await;
            Timer::after(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_bus::SimBus;
    use crate::adapters::{
        as7331, bme680, veml7700, As7331Config, Bme680Config, ChannelPublisher, Veml7700Config,
    };
    use crate::domain::Quantity;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;

    type SnapChannel = Channel<CriticalSectionRawMutex, Snapshot, 4>;

    fn add_light_chip(bus: &mut SimBus, als_count: u16) {
        bus.add_device(veml7700::DEFAULT_ADDRESS);
        bus.set_word(veml7700::DEFAULT_ADDRESS, 0x07, 0xC481);
        bus.set_word(veml7700::DEFAULT_ADDRESS, 0x04, als_count);
    }

    fn add_uv_chip(bus: &mut SimBus) {
        bus.add_device(as7331::DEFAULT_ADDRESS);
        // The identity byte shares its address with the first result
        // word (separate register banks), so it is scripted as a
        // queued read.
        bus.queue_byte_reads(as7331::DEFAULT_ADDRESS, 0x02, &[0x21]);
        // UVA=512, UVB=256 result words, die temperature raw 130
        bus.load_block(
            as7331::DEFAULT_ADDRESS,
            0x02,
            &[0x00, 0x02, 0x00, 0x01, 0x80, 0x00],
        );
        bus.set_reg(as7331::DEFAULT_ADDRESS, 0x01, 130);
    }

    fn fast_uv_driver() -> As7331Driver {
        // 1 ms conversions keep the cycle short
        As7331Driver::new(As7331Config::new(as7331::DEFAULT_ADDRESS, 1, 0, 0).unwrap())
    }

    #[test]
    fn interval_bounds_are_enforced() {
        let channel: SnapChannel = Channel::new();

        for (interval, accepted) in [
            (SAMPLE_INTERVAL_MIN, true),
            (SAMPLE_INTERVAL_MAX, true),
            (Duration::from_millis(999), false),
            (Duration::from_secs(86_401), false),
        ] {
            let result = Sampler::new(
                SimBus::new(),
                ChannelPublisher::new(channel.sender()),
                interval,
            );
            assert_eq!(result.is_ok(), accepted, "{:?}", interval);
        }
    }

    #[test]
    fn rejected_interval_change_retains_previous() {
        let channel: SnapChannel = Channel::new();
        let mut sampler = Sampler::new(
            SimBus::new(),
            ChannelPublisher::new(channel.sender()),
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(
            sampler.set_interval(Duration::from_secs(0)),
            Err(SensorError::ConfigRejected)
        );
        assert_eq!(sampler.interval(), Duration::from_secs(60));

        sampler.set_interval(Duration::from_secs(300)).unwrap();
        assert_eq!(sampler.interval(), Duration::from_secs(300));
    }

    #[test]
    fn cycle_aggregates_all_configured_drivers() {
        let mut bus = SimBus::new();
        add_light_chip(&mut bus, 5000);
        add_uv_chip(&mut bus);

        let channel: SnapChannel = Channel::new();
        let mut sampler = Sampler::new(
            bus,
            ChannelPublisher::new(channel.sender()),
            Duration::from_secs(60),
        )
        .unwrap()
        .with_light(Veml7700Driver::new(Veml7700Config::default()))
        .with_uv(fast_uv_driver());

        block_on(async {
            sampler.init_all().await;
            sampler.run_cycle().await;
        });

        let snap = channel.try_receive().unwrap();
        assert_eq!(snap.len(), 5);
        assert!(snap.contains(Quantity::Illuminance));
        assert!(snap.contains(Quantity::Uva));
        assert!(snap.contains(Quantity::Uvb));
        assert!(snap.contains(Quantity::Uvc));
        assert_eq!(snap.get(Quantity::UvDieTemperature), Some(25.0));

        assert_eq!(sampler.latest().unwrap().len(), 5);
    }

    #[test]
    fn timed_out_driver_is_omitted_not_fatal() {
        let mut bus = SimBus::new();
        // Climate chip answers its identity check but its status
        // register never reports new data, so every read times out.
        bus.add_device(bme680::DEFAULT_ADDRESS);
        bus.set_reg(bme680::DEFAULT_ADDRESS, 0xD0, 0x61);
        add_light_chip(&mut bus, 1000);

        let channel: SnapChannel = Channel::new();
        let mut sampler = Sampler::new(
            bus,
            ChannelPublisher::new(channel.sender()),
            Duration::from_secs(60),
        )
        .unwrap()
        .with_climate(Bme680Driver::new(Bme680Config::default()))
        .with_light(Veml7700Driver::new(Veml7700Config::default()));

        block_on(async {
            sampler.init_all().await;
            sampler.run_cycle().await;
        });

        let snap = channel.try_receive().unwrap();
        assert!(!snap.contains(Quantity::Temperature));
        assert!(!snap.contains(Quantity::Pressure));
        assert!(snap.contains(Quantity::Illuminance));
    }

    #[test]
    fn failed_init_driver_is_skipped_in_cycles() {
        let mut bus = SimBus::new();
        add_light_chip(&mut bus, 1000);
        // Wrong identity register; the light driver must not come up
        bus.set_word(veml7700::DEFAULT_ADDRESS, 0x07, 0xC435);
        add_uv_chip(&mut bus);

        let channel: SnapChannel = Channel::new();
        let mut sampler = Sampler::new(
            bus,
            ChannelPublisher::new(channel.sender()),
            Duration::from_secs(60),
        )
        .unwrap()
        .with_light(Veml7700Driver::new(Veml7700Config::default()))
        .with_uv(fast_uv_driver());

        block_on(async {
            sampler.init_all().await;
            sampler.run_cycle().await;
        });

        let snap = channel.try_receive().unwrap();
        assert!(!snap.contains(Quantity::Illuminance));
        assert_eq!(snap.len(), 4);
    }

    #[test]
    fn publish_failure_still_retains_latest() {
        let mut bus = SimBus::new();
        add_light_chip(&mut bus, 2000);

        let channel: Channel<CriticalSectionRawMutex, Snapshot, 1> = Channel::new();
        let mut sampler = Sampler::new(
            bus,
            ChannelPublisher::new(channel.sender()),
            Duration::from_secs(60),
        )
        .unwrap()
        .with_light(Veml7700Driver::new(Veml7700Config::default()));

        block_on(async {
            sampler.init_all().await;
            sampler.run_cycle().await;
            // Channel is full now; the second publish is dropped
            sampler.run_cycle().await;
        });

        assert!(sampler.latest().unwrap().contains(Quantity::Illuminance));
        assert_eq!(channel.len(), 1);
    }
}
