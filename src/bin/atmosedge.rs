// bin/atmosedge.rs

#![warn(clippy::large_futures)]

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::main()
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("atmosedge firmware runs on espidf targets only, use `cargo test` on the host")
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::Arc;

    use atmosedge::*;
    use esp_idf_hal::{
        i2c::{I2cConfig, I2cDriver},
        prelude::Peripherals,
        units::Hertz,
    };
    use esp_idf_svc::{
        eventloop::EspSystemEventLoop, nvs, timer::EspTaskTimerService, wifi::WifiDriver,
    };
    use esp_idf_sys::{esp, esp_app_desc};

    const I2C_FREQ: Hertz = Hertz(400_000);

    esp_app_desc!();

    pub fn main() -> anyhow::Result<()> {
        esp_idf_sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();

        // eventfd is needed by our mio poll implementation.  Note you should set max_fds
        // higher if you have other code that may need eventfd.
        #[allow(clippy::needless_update)]
        let config = esp_idf_sys::esp_vfs_eventfd_config_t {
            max_fds: 1,
            ..Default::default()
        };
        esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

        info!("atmosedge {FW_VERSION} starting up.");

        let sysloop = EspSystemEventLoop::take()?;
        let timer = EspTaskTimerService::new()?;
        let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

        let ns = env!("CARGO_BIN_NAME");
        let mut nvs = nvs::EspNvs::new(nvs_default_partition.clone(), ns, true)?;
        info!("Got namespace {ns:?} from default partition");

        #[cfg(feature = "reset_settings")]
        let config = {
            let c = MyConfig::default();
            c.to_nvs(&mut nvs)?;
            c
        };

        #[cfg(not(feature = "reset_settings"))]
        let config = match MyConfig::from_nvs(&mut nvs) {
            None => {
                error!("Could not read nvs config, using defaults");
                let c = MyConfig::default();
                c.to_nvs(&mut nvs)?;
                info!("Successfully saved default config to nvs.");
                c
            }

            // using settings saved on nvs if we could find them
            Some(c) => c,
        };
        info!("My config:\n{config:#?}");

        let peripherals = Peripherals::take()?;
        let pins = peripherals.pins;

        #[cfg(feature = "esp32c3")]
        let (sda, scl) = (pins.gpio8, pins.gpio9);
        #[cfg(feature = "esp32s")]
        let (sda, scl) = (pins.gpio21, pins.gpio22);

        info!("Initializing I2C and sensors...");
        let i2c_config = I2cConfig::new()
            .baudrate(I2C_FREQ)
            .sda_enable_pullup(true)
            .scl_enable_pullup(true);
        // a dead bus is not fatal: the endpoint keeps serving the zeroed snapshot
        let bus = match I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config) {
            Ok(drv) => {
                let mut bus = Bus::new(drv, config.bus_timeout());
                if let Err(e) = init_sensors(&mut bus) {
                    error!("Sensor init failed: {e}");
                }
                Some(bus)
            }
            Err(e) => {
                error!("I2C init failed: {e:?}");
                None
            }
        };

        let wifidriver = WifiDriver::new(
            peripherals.modem,
            sysloop.clone(),
            Some(nvs_default_partition),
        )?;

        let shared_state = Arc::new(Box::pin(MyState::new(config)));
        let netlink = NetLink::new(shared_state.clone(), wifidriver, sysloop, timer)?;

        // sensor I/O blocks, keep it away from the runtime serving HTTP
        match bus {
            Some(bus) => {
                spawn_sampler(shared_state.clone(), bus)?;
            }
            None => error!("No sensor bus, sampling disabled."),
        }

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(Box::pin(async move {
                info!("Entering main loop...");
                tokio::select! {
                    _ = Box::pin(run_api_server(shared_state.clone())) => { error!("run_api_server() ended."); }
                    _ = Box::pin(netlink.run()) => { error!("netlink.run() ended."); }
                };
            }));

        // not actually returning from main() but we reboot instead
        info!("main() finished, reboot.");
        esp_idf_hal::delay::FreeRtos::delay_ms(3000);
        esp_idf_hal::reset::restart();
    }
}

// EOF
