// wifi.rs

use embedded_svc::wifi::{ClientConfiguration, Configuration};
use esp_idf_svc::{
    eventloop::{EspEventLoop, System},
    timer::{EspTimerService, Task},
    wifi::{AsyncWifi, EspWifi, WifiDriver},
};

use crate::*;

/// Station mode link. Brings the network up once, then keeps reconnecting.
pub struct NetLink<'a> {
    pub state: Arc<Pin<Box<MyState>>>,
    pub wifi: AsyncWifi<EspWifi<'a>>,
}

impl<'a> NetLink<'a> {
    pub fn new(
        state: Arc<Pin<Box<MyState>>>,
        wifidriver: WifiDriver<'a>,
        sysloop: EspEventLoop<System>,
        timer: EspTimerService<Task>,
    ) -> anyhow::Result<Self> {
        info!("Initializing Wi-Fi...");
        let espwifi = EspWifi::wrap(wifidriver)?;
        let wifi = AsyncWifi::wrap(espwifi, sysloop, timer)?;
        Ok(NetLink { state, wifi })
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let config = &self.state.config;
        let client = ClientConfiguration {
            ssid: match config.wifi_ssid.as_str().try_into() {
                Ok(s) => s,
                Err(_) => bail!("WiFi SSID too long"),
            },
            password: match config.wifi_pass.as_str().try_into() {
                Ok(p) => p,
                Err(_) => bail!("WiFi password too long"),
            },
            ..Default::default()
        };

        info!("WiFi setting credentials...");
        self.wifi.set_configuration(&Configuration::Client(client))?;
        info!("WiFi driver starting...");
        Box::pin(self.wifi.start()).await?;

        Box::pin(self.connect(Some(Duration::from_secs(30)))).await?;

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("WiFi up, address {}", ip_info.ip);
        *self.state.ip_addr.write().await = ip_info.ip;
        *self.state.wifi_up.write().await = true;

        loop {
            // returns once the link drops
            Box::pin(self.wifi.wifi_wait(|w| w.is_up(), None)).await.ok();
            error!("WiFi link lost.");
            *self.state.wifi_up.write().await = false;

            if let Err(e) = Box::pin(self.connect(None)).await {
                error!("WiFi reconnect failed: {e:?}");
                sleep(Duration::from_secs(5)).await;
                continue;
            }
            // DHCP may have handed out a different lease
            match self.wifi.wifi().sta_netif().get_ip_info() {
                Ok(ip_info) => {
                    info!("WiFi up again, address {}", ip_info.ip);
                    *self.state.ip_addr.write().await = ip_info.ip;
                }
                Err(e) => error!("Cannot read IP info: {e:?}"),
            }
            *self.state.wifi_up.write().await = true;
        }
    }

    async fn connect(&mut self, timeout: Option<Duration>) -> anyhow::Result<()> {
        info!("WiFi connecting...");
        Box::pin(self.wifi.connect()).await?;

        info!("WiFi waiting for association...");
        Box::pin(
            self.wifi
                .ip_wait_while(|w| w.is_up().map(|s| !s), timeout),
        )
        .await?;

        info!("WiFi connected.");
        Ok(())
    }
}

// EOF
