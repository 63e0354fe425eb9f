// esp_bus.rs

use esp_idf_hal::{delay::TickType, i2c::I2cDriver};
use esp_idf_sys::{esp_err_t, EspError, ESP_ERR_TIMEOUT};

use crate::*;

// The native driver calls take a tick timeout; the embedded-hal ones block forever.
impl I2cBus for I2cDriver<'_> {
    fn write(&mut self, addr: u8, bytes: &[u8], timeout: Duration) -> Result<(), BusError> {
        I2cDriver::write(self, addr, bytes, TickType::from(timeout).ticks()).map_err(esp_error)
    }

    fn read(&mut self, addr: u8, buf: &mut [u8], timeout: Duration) -> Result<(), BusError> {
        I2cDriver::read(self, addr, buf, TickType::from(timeout).ticks()).map_err(esp_error)
    }

    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), BusError> {
        I2cDriver::write_read(self, addr, bytes, buf, TickType::from(timeout).ticks())
            .map_err(esp_error)
    }
}

fn esp_error(e: EspError) -> BusError {
    if e.code() == ESP_ERR_TIMEOUT as esp_err_t {
        BusError::Timeout
    } else {
        BusError::Transaction(format!("{e:?}"))
    }
}

// EOF
