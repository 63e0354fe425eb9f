// bus.rs

use embedded_hal::i2c::{self, I2c};
use thiserror::Error;

use crate::*;

pub const BUS_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("bus timeout")]
    Timeout,
    #[error("bus transaction failed: {0}")]
    Transaction(String),
}

/// Raw I2C transfers, each phase bounded by `timeout`.
pub trait I2cBus {
    fn write(&mut self, addr: u8, bytes: &[u8], timeout: Duration) -> Result<(), BusError>;
    fn read(&mut self, addr: u8, buf: &mut [u8], timeout: Duration) -> Result<(), BusError>;
    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), BusError>;
}

/// Transaction layer on top of a single I2C bus.
///
/// There is no locking here. The sampler owns the one and only `Bus` and is the
/// only caller, which keeps transactions from interleaving. Sharing a `Bus`
/// with anything else requires putting it behind a mutex first.
pub struct Bus<B> {
    i2c: B,
    timeout: Duration,
}

impl<B: I2cBus> Bus<B> {
    pub fn new(i2c: B, timeout: Duration) -> Self {
        Bus { i2c, timeout }
    }

    pub fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.i2c.write(addr, bytes, self.timeout)
    }

    /// Send a command, give the device `settle` to prepare its answer, then read it.
    pub async fn write_then_read<const N: usize>(
        &mut self,
        addr: u8,
        cmd: &[u8],
        settle: Duration,
    ) -> Result<[u8; N], BusError> {
        self.i2c.write(addr, cmd, self.timeout)?;
        sleep(settle).await;

        let mut data = [0u8; N];
        self.i2c.read(addr, &mut data, self.timeout)?;
        Ok(data)
    }

    pub fn read_with_register<const N: usize>(
        &mut self,
        addr: u8,
        reg: u8,
    ) -> Result<[u8; N], BusError> {
        let mut data = [0u8; N];
        self.i2c.write_read(addr, &[reg], &mut data, self.timeout)?;
        Ok(data)
    }

    #[cfg(test)]
    pub(crate) fn inner_mut(&mut self) -> &mut B {
        &mut self.i2c
    }
}

/// Adapter for any `embedded-hal` I2C driver.
///
/// embedded-hal transfers take no timeout, so each one is timed instead. A
/// transfer that overran its bound is reported as `BusError::Timeout` even if
/// the driver eventually returned data.
pub struct HalBus<I>(pub I);

impl<I: I2c> HalBus<I> {
    fn bounded<F>(&mut self, timeout: Duration, op: F) -> Result<(), BusError>
    where
        F: FnOnce(&mut I) -> Result<(), I::Error>,
    {
        let start = std::time::Instant::now();
        let res = op(&mut self.0);
        if start.elapsed() > timeout {
            return Err(BusError::Timeout);
        }
        res.map_err(hal_error)
    }
}

impl<I: I2c> I2cBus for HalBus<I> {
    fn write(&mut self, addr: u8, bytes: &[u8], timeout: Duration) -> Result<(), BusError> {
        self.bounded(timeout, |i2c| i2c.write(addr, bytes))
    }

    fn read(&mut self, addr: u8, buf: &mut [u8], timeout: Duration) -> Result<(), BusError> {
        self.bounded(timeout, |i2c| i2c.read(addr, buf))
    }

    fn write_read(
        &mut self,
        addr: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(), BusError> {
        self.bounded(timeout, |i2c| i2c.write_read(addr, bytes, buf))
    }
}

fn hal_error<E: i2c::Error>(e: E) -> BusError {
    BusError::Transaction(format!("{:?}", e.kind()))
}


#[cfg(test)]
mod tests {
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    use super::fake::FakeBus;
    use super::*;

    struct NackingI2c;

    impl ErrorType for NackingI2c {
        type Error = ErrorKind;
    }

    impl I2c for NackingI2c {
        fn transaction(
            &mut self,
            _address: u8,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        }
    }

    struct SlowI2c(Duration);

    impl ErrorType for SlowI2c {
        type Error = ErrorKind;
    }

    impl I2c for SlowI2c {
        fn transaction(
            &mut self,
            _address: u8,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn write_then_read_waits_for_settle() {
        let mut bus = Bus::new(FakeBus::new().respond(0x10, &[1, 2, 3]), BUS_TIMEOUT);

        let start = tokio::time::Instant::now();
        let data: [u8; 3] = bus
            .write_then_read(0x10, &[0xAA], Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(data, [1, 2, 3]);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(bus.inner_mut().writes, vec![(0x10, vec![0xAA])]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_skips_read() {
        let mut fake = FakeBus::new().respond(0x10, &[1, 2]);
        fake.fail(0x10, BusError::Timeout);
        let mut bus = Bus::new(fake, BUS_TIMEOUT);

        let res = bus
            .write_then_read::<2>(0x10, &[0xAA], Duration::from_millis(5))
            .await;
        assert_eq!(res, Err(BusError::Timeout));
        assert!(bus.inner_mut().writes.is_empty());
    }

    #[test]
    fn register_read_sends_register_first() {
        let mut bus = Bus::new(FakeBus::new().respond(0x20, &[9, 8]), BUS_TIMEOUT);

        let data: [u8; 2] = bus.read_with_register(0x20, 0xA8).unwrap();
        assert_eq!(data, [9, 8]);
        assert_eq!(bus.inner_mut().writes, vec![(0x20, vec![0xA8])]);
    }

    #[test]
    fn short_response_is_a_transaction_failure() {
        let mut bus = Bus::new(FakeBus::new().respond(0x20, &[9]), BUS_TIMEOUT);
        let res = bus.read_with_register::<2>(0x20, 0x00);
        assert!(matches!(res, Err(BusError::Transaction(_))));
    }

    #[test]
    fn hal_errors_become_transaction_failures() {
        let mut bus = Bus::new(HalBus(NackingI2c), BUS_TIMEOUT);
        match bus.write(0x62, &[0x21, 0xB1]) {
            Err(BusError::Transaction(msg)) => assert!(msg.contains("NoAcknowledge")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn hal_transfer_past_its_bound_is_a_timeout() {
        let bound = Duration::from_millis(20);
        let mut bus = Bus::new(HalBus(SlowI2c(Duration::from_millis(60))), bound);

        assert_eq!(bus.write(0x62, &[0x21, 0xB1]), Err(BusError::Timeout));
        assert_eq!(bus.read_with_register::<3>(0x5C, 0xA8), Err(BusError::Timeout));
    }

    #[test]
    fn hal_transfer_within_its_bound_succeeds() {
        let mut bus = Bus::new(HalBus(SlowI2c(Duration::ZERO)), BUS_TIMEOUT);
        assert_eq!(bus.write(0x62, &[0x21, 0xB1]), Ok(()));
        assert_eq!(bus.read_with_register::<3>(0x5C, 0xA8), Ok([0, 0, 0]));
    }
}

// EOF
