// state.rs

use crate::*;

use std::net::Ipv4Addr;

pub struct MyState {
    pub config: MyConfig,
    pub cache: MetricsCache,
    pub api_cnt: AtomicU32,
    pub wifi_up: RwLock<bool>,
    pub ip_addr: RwLock<Ipv4Addr>,
}

impl MyState {
    pub fn new(config: MyConfig) -> Self {
        let cache = MetricsCache::new(config.fetch_timeout());
        MyState {
            config,
            cache,
            api_cnt: AtomicU32::new(0),
            wifi_up: RwLock::new(false),
            ip_addr: RwLock::new(Ipv4Addr::new(0, 0, 0, 0)),
        }
    }
}

// EOF
