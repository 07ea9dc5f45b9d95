//! An asynchronous, `no_std` driver for the MPR121 capacitive touch controller.
//!
//! This driver provides an `Mpr121` handle to interact with the MPR121 over I2C.
//! It polls the 12-bit touch status at a configurable interval, turns changes
//! into per-electrode pressed/released events, and lets you retune the touch
//! and release thresholds while the poller keeps running.
//!
//! # Usage
//!
//! To use this driver, you need an I2C peripheral implementation that satisfies the
//! `embedded-hal-async::i2c::I2c` trait and a delay implementing
//! `embedded-hal-async::delay::DelayNs`, such as `embassy_time::Delay`.
//!
//! ```ignore
//! use embassy_time::Delay;
//! use mpr121_async::{Config, Electrode, Mpr121, TouchEvent};
//! use static_cell::StaticCell;
//!
//! type Touch = Mpr121<I2c<'static, esp_hal::Async>, Delay>;
//! static TOUCH: StaticCell<Touch> = StaticCell::new();
//!
//! #[esp_hal_embassy::main]
//! async fn main(spawner: Spawner) {
//!     // Initialize peripherals and I2C, then open the controller
//!     let touch = TOUCH.init(Mpr121::open(i2c, Delay, Config::default()).await.unwrap());
//!
//!     // Spawn the poller
//!     spawner.spawn(poll_touch(touch)).unwrap();
//!
//!     // React to presses of electrode 3
//!     let mut pressed = touch.on_pressed(Electrode::E3).unwrap();
//!     loop {
//!         let TouchEvent::Pressed(electrode) = pressed.next().await else { continue };
//!         // log::info!("{electrode} pressed");
//!     }
//! }
//!
//! #[embassy_executor::task]
//! async fn poll_touch(touch: &'static Touch) {
//!     if let Err(err) = touch.run(Delay).await {
//!         // log::warn!("Touch poller failed: {err:?}");
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod device;
pub mod error;
pub mod event;
pub mod registers;
pub mod touch;

pub use error::Error;
pub use event::{EdgeDetector, EventFilter, TouchEvent, TouchMask, TouchSubscriber};
pub use registers::{Address, Electrode, InvalidElectrode};
pub use touch::{Config, Mpr121, ThresholdPair};
