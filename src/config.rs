// config.rs

use crc::{Crc, CRC_32_ISCSI};

use crate::*;

pub const NVS_BUF_SIZE: usize = 256;

const DEFAULT_API_PORT: u16 = 80;
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 2000;
const DEFAULT_BUS_TIMEOUT_MS: u64 = 100;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 100;
const MIN_SAMPLE_INTERVAL_MS: u64 = 100;

#[cfg(target_os = "espidf")]
const CONFIG_NAME: &str = "cfg";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MyConfig {
    pub port: u16,
    pub sample_interval_ms: u64,
    pub bus_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub verify_crc: bool,

    pub wifi_ssid: String,
    pub wifi_pass: String,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            port: option_env!("API_PORT")
                .unwrap_or("-")
                .parse()
                .unwrap_or(DEFAULT_API_PORT),
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            bus_timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            verify_crc: false,

            wifi_ssid: option_env!("WIFI_SSID").unwrap_or("internet").into(),
            wifi_pass: option_env!("WIFI_PASS").unwrap_or("password").into(),
        }
    }
}

impl MyConfig {
    pub fn sample_interval(&self) -> Duration {
        // a zero period would make the sampler spin
        Duration::from_millis(self.sample_interval_ms.max(MIN_SAMPLE_INTERVAL_MS))
    }

    pub fn bus_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::from_bytes_crc32::<MyConfig>(b, digest) {
            Ok(c) => {
                info!("Successfully parsed config.");
                Some(c)
            }
            Err(e) => {
                error!("Cannot parse config: {e:?}");
                None
            }
        }
    }

    pub fn to_bytes<'a>(&self, buf: &'a mut [u8]) -> anyhow::Result<&'a mut [u8]> {
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::to_slice_crc32(self, buf, digest) {
            Ok(d) => Ok(d),
            Err(e) => bail!("Cannot encode config to buffer {e:?}"),
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn from_nvs(nvs: &mut esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>) -> Option<Self> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
            Err(e) => {
                error!("Nvs read error {e:?}");
                return None;
            }
            Ok(Some(b)) => b,
            _ => {
                error!("Nvs key not found");
                return None;
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());
        Self::from_bytes(b)
    }

    #[cfg(target_os = "espidf")]
    pub fn to_nvs(&self, nvs: &mut esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault>) -> anyhow::Result<()> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        let nvsdata = self.to_bytes(&mut nvsbuf)?;
        info!(
            "Encoded config to {sz} bytes. Saving to nvs...",
            sz = nvsdata.len()
        );

        match nvs.set_raw(CONFIG_NAME, nvsdata) {
            Ok(_) => {
                info!("Config saved.");
                Ok(())
            }
            Err(e) => bail!("Cannot save to nvs: {e:?}"),
        }
    }
}


// EOF
