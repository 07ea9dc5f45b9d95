#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those     holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use esp_hal::i2c::master::I2c;
use esp_hal::Async;
use esp_hal::{clock::CpuClock, time::Rate, timer::systimer::SystemTimer};
use esp_println::println;
use log::{info, warn};
use mpr121_async::{Address, Config, Electrode, EventFilter, Mpr121, ThresholdPair};
use static_cell::StaticCell;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println!("{}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type Touch = Mpr121<I2c<'static, Async>, Delay>;

static TOUCH: StaticCell<Touch> = StaticCell::new();

/// The main entry point of the application.
#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    // Init logging
    esp_println::logger::init_logger(log::LevelFilter::Debug);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    info!("Peripherals initialized");

    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    let touch_scl = peripherals.GPIO14;
    let touch_sda = peripherals.GPIO13;

    let config = esp_hal::i2c::master::Config::default().with_frequency(Rate::from_khz(100));

    let touch_i2c = I2c::new(peripherals.I2C0, config)
        .unwrap()
        .with_sda(touch_sda)
        .with_scl(touch_scl)
        .into_async();

    let touch_config = Config {
        address: Address::Addr0x5A,
        polling_interval: Duration::from_millis(20),
        thresholds: Some(ThresholdPair::DEFAULT),
    };
    let touch: &'static Touch = match Mpr121::open(touch_i2c, Delay, touch_config).await {
        Ok(touch) => TOUCH.init(touch),
        Err(err) => {
            warn!("Error initializing MPR121: {err:?}");
            loop {
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    };
    log::debug!("MPR121 initialized.");

    spawner.spawn(poll_touch(touch)).unwrap();
    spawner.spawn(log_touch(touch)).unwrap();

    // Electrode 0 sits behind a thicker overlay; make it more sensitive.
    Timer::after(Duration::from_secs(5)).await;
    if let Err(err) = touch.set_threshold(Electrode::E0, 8, 4).await {
        warn!("Error setting E0 thresholds: {err:?}");
    }
    match touch.threshold(Electrode::E0).await {
        Ok(pair) => info!("E0 thresholds now {pair:?}"),
        Err(err) => warn!("Error reading E0 thresholds: {err:?}"),
    }

    loop {
        match touch.read_touch_status().await {
            Ok(mask) => info!("Touched: {mask}"),
            Err(err) => warn!("Error reading touch status: {err:?}"),
        }
        Timer::after(Duration::from_secs(10)).await;
    }
}

/// A task that samples the controller and publishes touch events.
#[embassy_executor::task]
async fn poll_touch(touch: &'static Touch) {
    if let Err(err) = touch.run(Delay).await {
        warn!("Touch poller stopped: {err:?}");
    }
}

/// A task that logs every touch event.
#[embassy_executor::task]
async fn log_touch(touch: &'static Touch) {
    let mut events = match touch.subscribe(EventFilter::All) {
        Ok(events) => events,
        Err(err) => {
            warn!("Error subscribing to touch events: {err:?}");
            return;
        }
    };
    loop {
        let event = events.next().await;
        info!("Touch event {event:?}");
    }
}
