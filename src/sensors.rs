// sensors.rs

use crc::{Crc, CRC_8_NRSC_5};
use thiserror::Error;

use crate::*;

// SCD41: CO2, temperature, humidity
pub const CLIMATE_ADDR: u8 = 0x62;
pub const CLIMATE_START_CMD: [u8; 2] = [0x21, 0xB1];
pub const CLIMATE_MEASURE_CMD: [u8; 2] = [0xEC, 0x05];
pub const CLIMATE_SETTLE: Duration = Duration::from_millis(5);

// SGP41: VOC and NOx index
pub const AIR_QUALITY_ADDR: u8 = 0x59;
pub const AIR_QUALITY_CMD: [u8; 2] = [0x26, 0x0F];
pub const AIR_QUALITY_SETTLE: Duration = Duration::from_millis(50);

// LPS22: barometric pressure
pub const PRESSURE_ADDR: u8 = 0x5C;
pub const PRESSURE_OUT_XL: u8 = 0x28;
pub const AUTO_INCREMENT: u8 = 0x80;

// Sensirion word checksum: poly 0x31, init 0xff, no reflection
const SENSIRION_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SensorError {
    #[error("climate sensor: {0}")]
    Climate(BusError),
    #[error("air quality sensor: {0}")]
    AirQuality(BusError),
    #[error("pressure sensor: {0}")]
    Pressure(BusError),
    #[error("air quality sensor: checksum {got:#04x}, expected {expected:#04x}")]
    Checksum { got: u8, expected: u8 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Climate {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_rh: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AirQuality {
    pub voc_index: u16,
    pub nox_index: u16,
}

pub fn temperature_from_raw(raw: u16) -> f32 {
    (-45.0 + 175.0 * (f64::from(raw) / 65535.0)) as f32
}

pub fn humidity_from_raw(raw: u16) -> f32 {
    (100.0 * (f64::from(raw) / 65535.0)) as f32
}

pub fn decode_climate(data: &[u8; 6]) -> Climate {
    let co2_raw = u16::from_be_bytes([data[0], data[1]]);
    let t_raw = u16::from_be_bytes([data[2], data[3]]);
    let rh_raw = u16::from_be_bytes([data[4], data[5]]);

    Climate {
        co2_ppm: f32::from(co2_raw),
        temperature_c: temperature_from_raw(t_raw),
        humidity_rh: humidity_from_raw(rh_raw),
    }
}

/// Bytes 2 and 5 carry the device checksums of the two words in front of them.
pub fn decode_air_quality(data: &[u8; 6], verify_crc: bool) -> Result<AirQuality, SensorError> {
    if verify_crc {
        check_word(&data[0..3])?;
        check_word(&data[3..6])?;
    }

    Ok(AirQuality {
        voc_index: u16::from_be_bytes([data[0], data[1]]),
        nox_index: u16::from_be_bytes([data[3], data[4]]),
    })
}

fn check_word(word: &[u8]) -> Result<(), SensorError> {
    let expected = SENSIRION_CRC.checksum(&word[0..2]);
    match word[2] {
        got if got == expected => Ok(()),
        got => Err(SensorError::Checksum { got, expected }),
    }
}

/// 24-bit two's complement, least significant byte first, 4096 LSB per hPa.
pub fn decode_pressure(data: &[u8; 3]) -> f32 {
    let raw = i32::from_le_bytes([0, data[0], data[1], data[2]]) >> 8;
    raw as f32 / 4096.0
}

/// Put the climate sensor into continuous measurement mode. Needed once after power-up.
pub fn init_sensors<B: I2cBus>(bus: &mut Bus<B>) -> Result<(), SensorError> {
    info!("Starting climate sensor periodic measurement...");
    bus.write(CLIMATE_ADDR, &CLIMATE_START_CMD)
        .map_err(SensorError::Climate)?;
    info!("Sensors initialized");
    Ok(())
}

pub async fn read_climate<B: I2cBus>(bus: &mut Bus<B>) -> Result<Climate, SensorError> {
    let data = bus
        .write_then_read::<6>(CLIMATE_ADDR, &CLIMATE_MEASURE_CMD, CLIMATE_SETTLE)
        .await
        .map_err(SensorError::Climate)?;
    Ok(decode_climate(&data))
}

pub async fn read_air_quality<B: I2cBus>(
    bus: &mut Bus<B>,
    verify_crc: bool,
) -> Result<AirQuality, SensorError> {
    let data = bus
        .write_then_read::<6>(AIR_QUALITY_ADDR, &AIR_QUALITY_CMD, AIR_QUALITY_SETTLE)
        .await
        .map_err(SensorError::AirQuality)?;
    decode_air_quality(&data, verify_crc)
}

pub fn read_pressure<B: I2cBus>(bus: &mut Bus<B>) -> Result<f32, SensorError> {
    let data = bus
        .read_with_register::<3>(PRESSURE_ADDR, PRESSURE_OUT_XL | AUTO_INCREMENT)
        .map_err(SensorError::Pressure)?;
    Ok(decode_pressure(&data))
}


// EOF
