// sampler.rs

use tokio::time::{interval, MissedTickBehavior};

use crate::*;

pub const SAMPLER_STACK_SIZE: usize = 8192;

/// One sampling cycle: climate, air quality, pressure, in that order.
///
/// The first failing sensor ends the cycle and nothing is published, so the
/// cache keeps the last complete snapshot.
pub async fn sample_once<B: I2cBus>(
    bus: &mut Bus<B>,
    cache: &MetricsCache,
    verify_crc: bool,
) -> Result<MetricsSnapshot, SensorError> {
    let climate = read_climate(bus).await?;
    let air = read_air_quality(bus, verify_crc).await?;
    let pressure_hpa = read_pressure(bus)?;

    let snapshot = MetricsSnapshot {
        co2_ppm: climate.co2_ppm,
        temperature_c: climate.temperature_c,
        humidity_rh: climate.humidity_rh,
        voc_index: air.voc_index,
        nox_index: air.nox_index,
        pressure_hpa,
    };
    cache.publish(snapshot).await;
    Ok(snapshot)
}

/// Runs forever. Takes the bus by value: the sampler is its only user.
pub async fn poll_sensors<B: I2cBus>(
    state: Arc<Pin<Box<MyState>>>,
    mut bus: Bus<B>,
) -> anyhow::Result<()> {
    let period = state.config.sample_interval();
    let verify_crc = state.config.verify_crc;
    info!("Sampling every {period:?}, checksums verified: {verify_crc}");

    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        match sample_once(&mut bus, &state.cache, verify_crc).await {
            Ok(m) => info!(
                "CO2: {:.1} ppm, Temp: {:.2} C, RH: {:.2}%, VOC: {}, NOx: {}, Pressure: {:.2} hPa",
                m.co2_ppm, m.temperature_c, m.humidity_rh, m.voc_index, m.nox_index, m.pressure_hpa
            ),
            Err(e) => error!("Sampling cycle discarded: {e}"),
        }
    }
}

/// Run `poll_sensors` on its own thread with its own runtime.
///
/// Bus transfers block for up to the bus timeout per phase. Keeping them off the
/// runtime that serves HTTP means a hung device never stalls request handlers.
pub fn spawn_sampler<B>(
    state: Arc<Pin<Box<MyState>>>,
    bus: Bus<B>,
) -> anyhow::Result<std::thread::JoinHandle<()>>
where
    B: I2cBus + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("sampler".into())
        .stack_size(SAMPLER_STACK_SIZE)
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Sampler runtime failed: {e:?}");
                    return;
                }
            };
            if let Err(e) = rt.block_on(Box::pin(poll_sensors(state, bus))) {
                error!("poll_sensors() ended: {e:?}");
            }
        })?;
    Ok(handle)
}


// EOF
