// lib.rs
#![warn(clippy::large_futures)]

pub use std::{
    net,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

pub use anyhow::bail;
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::RwLock,
    time::{Duration, sleep},
};

mod config;
pub use config::*;

mod state;
pub use state::*;

pub mod bus;
pub use bus::{Bus, BusError, HalBus, I2cBus, BUS_TIMEOUT};

mod sensors;
pub use sensors::*;

mod cache;
pub use cache::*;

mod sampler;
pub use sampler::*;

mod apiserver;
pub use apiserver::*;

#[cfg(target_os = "espidf")]
mod esp_bus;

#[cfg(target_os = "espidf")]
mod wifi;
#[cfg(target_os = "espidf")]
pub use wifi::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One complete set of readings, all taken in the same sampling cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_rh: f32,
    pub voc_index: u16,
    pub nox_index: u16,
    pub pressure_hpa: f32,
}

// EOF
