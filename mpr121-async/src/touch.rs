//! Core implementation of the MPR121 driver: setup, polling and configuration.

use core::cell::Cell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::device::Registers;
use crate::error::Error;
use crate::event::{EdgeDetector, EventFilter, EventRouter, TouchMask, TouchSubscriber};
use crate::registers::{Address, Electrode};

/// Shortest accepted polling interval.
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(5);
/// Longest accepted polling interval.
pub const MAX_POLLING_INTERVAL: Duration = Duration::from_millis(200);
/// Polling interval used by [`Config::default`].
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(20);

/// Touch and release thresholds of one electrode.
///
/// A touch is detected when the filtered signal drops more than `touch` below
/// the baseline, and released once it is back within `release`. Keep
/// `touch > release` to get some hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPair {
    /// Touch threshold.
    pub touch: u8,
    /// Release threshold.
    pub release: u8,
}

impl ThresholdPair {
    /// Touch 12, release 6.
    pub const DEFAULT: Self = Self::new(12, 6);

    /// Creates a pair from register values.
    pub const fn new(touch: u8, release: u8) -> Self {
        Self { touch, release }
    }

    /// Creates a pair, clamping both values into `0..=255`.
    pub fn clamped(touch: i32, release: i32) -> Self {
        Self::new(clamp_to_u8(touch), clamp_to_u8(release))
    }
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn clamp_to_u8(value: i32) -> u8 {
    value.clamp(0, u8::MAX as i32) as u8
}

fn clamp_polling_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_POLLING_INTERVAL, MAX_POLLING_INTERVAL)
}

/// `(register, value)` writes programming `pair` into every electrode of `electrodes`.
fn threshold_writes(
    electrodes: impl IntoIterator<Item = Electrode>,
    pair: ThresholdPair,
) -> impl Iterator<Item = (u8, u8)> {
    electrodes.into_iter().flat_map(move |electrode| {
        [
            (electrode.touch_threshold_register(), pair.touch),
            (electrode.release_threshold_register(), pair.release),
        ]
    })
}

/// Configuration for [`Mpr121::open`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Bus address the controller is strapped to.
    pub address: Address,
    /// Time between two samples, clamped to 5..=200 ms.
    pub polling_interval: Duration,
    /// Thresholds programmed into all electrodes while opening. `None` keeps
    /// what the controller already holds.
    pub thresholds: Option<ThresholdPair>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: Address::default(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            thresholds: None,
        }
    }
}

/// A polling driver for the MPR121 capacitive touch controller.
///
/// All methods take `&self`, so one handle (usually placed in a `StaticCell`)
/// can be shared between the poller task started with [`Mpr121::run`], event
/// subscribers and code changing the configuration. Bus access is serialized
/// through an internal lock.
pub struct Mpr121<I2C, D> {
    registers: Mutex<CriticalSectionRawMutex, Registers<I2C, D>>,
    address: Address,
    polling_interval: BlockingMutex<CriticalSectionRawMutex, Cell<Duration>>,
    polling: BlockingMutex<CriticalSectionRawMutex, Cell<bool>>,
    shutdown: Signal<CriticalSectionRawMutex, ()>,
    events: EventRouter,
}

/// Releases the polling latch when the poller returns.
struct PollerGuard<'a> {
    polling: &'a BlockingMutex<CriticalSectionRawMutex, Cell<bool>>,
}

impl Drop for PollerGuard<'_> {
    fn drop(&mut self) {
        self.polling.lock(|polling| polling.set(false));
    }
}

impl<I2C, D> Mpr121<I2C, D>
where
    I2C: I2c<SevenBitAddress>,
    D: DelayNs,
{
    /// Brings the controller into a known state and returns a ready handle.
    ///
    /// Scanning is stopped, `config.thresholds` (if any) are written to all
    /// electrodes, then scanning is started with all twelve electrodes.
    ///
    /// # Arguments
    ///
    /// * `i2c` - An I2C peripheral that implements `embedded-hal-async::i2c::I2c`.
    /// * `delay` - Delay provider for the settle time after run-mode changes.
    /// * `config` - Address, polling interval and initial thresholds.
    pub async fn open(i2c: I2C, delay: D, config: Config) -> Result<Self, Error<I2C::Error>> {
        let mut registers = Registers::new(i2c, delay, config.address);
        registers.stop().await?;
        registers
            .apply_safely(
                config
                    .thresholds
                    .into_iter()
                    .flat_map(|pair| threshold_writes(Electrode::ALL, pair)),
            )
            .await?;

        let polling_interval = clamp_polling_interval(config.polling_interval);
        log::debug!(
            "mpr121@{:#04x}: ready, polling every {} ms",
            config.address.value(),
            polling_interval.as_millis()
        );

        Ok(Self {
            registers: Mutex::new(registers),
            address: config.address,
            polling_interval: BlockingMutex::new(Cell::new(polling_interval)),
            polling: BlockingMutex::new(Cell::new(false)),
            shutdown: Signal::new(),
            events: EventRouter::new(),
        })
    }

    /// Consumes the driver and gives back the bus and the delay provider.
    ///
    /// The controller is left in whatever run state it was in.
    pub fn release(self) -> (I2C, D) {
        self.registers.into_inner().release()
    }

    /// The bus address this handle talks to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The effective polling interval.
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval.lock(|interval| interval.get())
    }

    /// Changes the polling interval, clamped to 5..=200 ms.
    ///
    /// The poller picks up the new value before its next sleep.
    pub fn set_polling_interval(&self, interval: Duration) {
        let interval = clamp_polling_interval(interval);
        self.polling_interval.lock(|current| current.set(interval));
        log::debug!(
            "mpr121@{:#04x}: polling interval {} ms",
            self.address.value(),
            interval.as_millis()
        );
    }

    /// Whether the controller is currently scanning its electrodes.
    pub async fn is_running(&self) -> bool {
        self.registers.lock().await.is_running()
    }

    /// Stops electrode scanning. Does nothing when already stopped.
    ///
    /// While stopped, the touch status no longer changes and the poller sees
    /// no new edges.
    pub async fn stop(&self) -> Result<(), Error<I2C::Error>> {
        self.registers.lock().await.stop().await
    }

    /// Starts electrode scanning. Does nothing when already running.
    pub async fn start(&self) -> Result<(), Error<I2C::Error>> {
        self.registers.lock().await.start().await
    }

    /// Writes arbitrary `(register, value)` pairs with scanning paused.
    ///
    /// Scanning is resumed even if one of the writes fails; the failure is
    /// reported afterwards.
    pub async fn apply_safely<W>(&self, writes: W) -> Result<(), Error<I2C::Error>>
    where
        W: IntoIterator<Item = (u8, u8)>,
    {
        self.registers.lock().await.apply_safely(writes).await
    }

    /// Sets the thresholds of one electrode. Values are clamped into `0..=255`.
    pub async fn set_threshold(
        &self,
        electrode: Electrode,
        touch: i32,
        release: i32,
    ) -> Result<(), Error<I2C::Error>> {
        let pair = ThresholdPair::clamped(touch, release);
        self.apply_safely(threshold_writes([electrode], pair)).await?;
        log::debug!(
            "mpr121@{:#04x}: {electrode} thresholds set to {pair:?}",
            self.address.value()
        );
        Ok(())
    }

    /// Sets the same thresholds on all twelve electrodes in one stop/start
    /// cycle. Values are clamped into `0..=255`.
    pub async fn set_all_thresholds(&self, touch: i32, release: i32) -> Result<(), Error<I2C::Error>> {
        let pair = ThresholdPair::clamped(touch, release);
        self.apply_safely(threshold_writes(Electrode::ALL, pair))
            .await?;
        log::debug!(
            "mpr121@{:#04x}: all thresholds set to {pair:?}",
            self.address.value()
        );
        Ok(())
    }

    /// Reads back the thresholds of one electrode.
    pub async fn threshold(&self, electrode: Electrode) -> Result<ThresholdPair, Error<I2C::Error>> {
        let mut registers = self.registers.lock().await;
        let touch = registers
            .read_register(electrode.touch_threshold_register())
            .await?;
        let release = registers
            .read_register(electrode.release_threshold_register())
            .await?;
        Ok(ThresholdPair::new(touch, release))
    }

    /// Reads the current touch state of all electrodes.
    ///
    /// This is a live read and does not affect the events produced by the
    /// poller.
    pub async fn read_touch_status(&self) -> Result<TouchMask, Error<I2C::Error>> {
        self.registers.lock().await.read_touch_mask().await
    }

    /// Returns `true` if `electrode` is touched right now.
    pub async fn is_touched(&self, electrode: Electrode) -> Result<bool, Error<I2C::Error>> {
        Ok(self.read_touch_status().await?.is_touched(electrode))
    }

    /// Subscribes to the events passing `filter`.
    pub fn subscribe(&self, filter: EventFilter) -> Result<TouchSubscriber<'_>, Error<I2C::Error>> {
        self.events.subscribe(filter).ok_or_else(|| {
            log::warn!("Error subscribing to touch events: no subscriber slot left");
            Error::TooManySubscribers
        })
    }

    /// Subscribes to presses of `electrode`.
    pub fn on_pressed(&self, electrode: Electrode) -> Result<TouchSubscriber<'_>, Error<I2C::Error>> {
        self.subscribe(EventFilter::Pressed(electrode))
    }

    /// Subscribes to releases of `electrode`.
    pub fn on_released(&self, electrode: Electrode) -> Result<TouchSubscriber<'_>, Error<I2C::Error>> {
        self.subscribe(EventFilter::Released(electrode))
    }

    /// Subscribes to presses of any electrode.
    pub fn on_any_pressed(&self) -> Result<TouchSubscriber<'_>, Error<I2C::Error>> {
        self.subscribe(EventFilter::AnyPressed)
    }

    /// Subscribes to releases of any electrode.
    pub fn on_any_released(&self) -> Result<TouchSubscriber<'_>, Error<I2C::Error>> {
        self.subscribe(EventFilter::AnyReleased)
    }

    /// Asks a running [`Mpr121::run`] to return.
    ///
    /// The poller finishes its current sample first. Has no effect when no
    /// poller is running.
    pub fn shutdown(&self) {
        self.shutdown.signal(());
    }

    /// Polls the touch status and publishes edge events until
    /// [`Mpr121::shutdown`] is called.
    ///
    /// Run this from a dedicated task. `delay` paces the samples; it is separate
    /// from the driver's own delay so that sleeping never holds the bus lock.
    /// A bus failure ends the poller with the error.
    pub async fn run<P: DelayNs>(&self, mut delay: P) -> Result<(), Error<I2C::Error>> {
        let _guard = self.claim_poller()?;
        // Drop a request left over from before this poller existed.
        self.shutdown.reset();
        log::debug!("mpr121@{:#04x}: poller started", self.address.value());

        let result = self.poll_until_shutdown(&mut delay).await;
        self.shutdown.reset();

        match &result {
            Ok(()) => log::debug!("mpr121@{:#04x}: poller stopped", self.address.value()),
            Err(_) => log::warn!("mpr121@{:#04x}: poller aborted", self.address.value()),
        }
        result
    }

    fn claim_poller(&self) -> Result<PollerGuard<'_>, Error<I2C::Error>> {
        let already_polling = self.polling.lock(|polling| polling.replace(true));
        if already_polling {
            log::warn!("mpr121@{:#04x}: poller already running", self.address.value());
            return Err(Error::AlreadyPolling);
        }
        Ok(PollerGuard {
            polling: &self.polling,
        })
    }

    async fn poll_until_shutdown<P: DelayNs>(&self, delay: &mut P) -> Result<(), Error<I2C::Error>> {
        let mut detector = EdgeDetector::new();

        loop {
            let mask = self.registers.lock().await.read_touch_mask().await?;
            for event in detector.update(mask) {
                log::trace!("mpr121@{:#04x}: {event:?}", self.address.value());
                self.events.publish(event);
            }

            if self.shutdown.signaled() {
                return Ok(());
            }

            let interval_ms = self.polling_interval().as_millis() as u32;
            if let Either::Second(()) = select(delay.delay_ms(interval_ms), self.shutdown.wait()).await {
                return Ok(());
            }
        }
    }
}
