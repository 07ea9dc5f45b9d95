//! In-memory MPR121 used by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

pub const REG_TOUCH_STATUS_L: u8 = 0x00;
pub const REG_TOUCH_STATUS_H: u8 = 0x01;
pub const REG_ECR: u8 = 0x5E;

/// A bus transaction as seen by the simulated controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    Write { address: u8, register: u8, value: u8 },
    Read { address: u8, register: u8 },
}

pub struct BusState {
    pub registers: [u8; 256],
    /// Touch masks served one per read of the low status register. Once empty
    /// the registers keep their last value.
    pub masks: VecDeque<u16>,
    /// Fail status reads once `masks` is exhausted, ending a poller.
    pub fail_when_exhausted: bool,
    /// Writes to this register fail.
    pub fail_writes_to: Option<u8>,
    pub log: Vec<Transaction>,
}

impl BusState {
    fn read(&mut self, address: u8, register: u8) -> Result<u8, ErrorKind> {
        if register == REG_TOUCH_STATUS_L {
            match self.masks.pop_front() {
                Some(mask) => {
                    self.registers[REG_TOUCH_STATUS_L as usize] = mask as u8;
                    self.registers[REG_TOUCH_STATUS_H as usize] = (mask >> 8) as u8;
                }
                None if self.fail_when_exhausted => return Err(ErrorKind::Other),
                None => {}
            }
        }
        self.log.push(Transaction::Read { address, register });
        Ok(self.registers[register as usize])
    }

    fn write(&mut self, address: u8, register: u8, value: u8) -> Result<(), ErrorKind> {
        if self.fail_writes_to == Some(register) {
            return Err(ErrorKind::Other);
        }
        self.log.push(Transaction::Write {
            address,
            register,
            value,
        });
        self.registers[register as usize] = value;
        Ok(())
    }
}

/// Shared handle to a simulated MPR121; clones see the same state.
#[derive(Clone)]
pub struct FakeBus {
    pub state: Rc<RefCell<BusState>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                registers: [0; 256],
                masks: VecDeque::new(),
                fail_when_exhausted: false,
                fail_writes_to: None,
                log: Vec::new(),
            })),
        }
    }

    pub fn with_masks(masks: &[u16]) -> Self {
        let bus = Self::new();
        bus.state.borrow_mut().masks.extend(masks.iter().copied());
        bus
    }

    pub fn failing_when_exhausted(self) -> Self {
        self.state.borrow_mut().fail_when_exhausted = true;
        self
    }

    pub fn fail_writes_to(&self, register: Option<u8>) {
        self.state.borrow_mut().fail_writes_to = register;
    }

    pub fn register(&self, register: u8) -> u8 {
        self.state.borrow().registers[register as usize]
    }

    pub fn log(&self) -> Vec<Transaction> {
        self.state.borrow().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }

    /// Successful writes as `(register, value)`.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.log()
            .into_iter()
            .filter_map(|transaction| match transaction {
                Transaction::Write {
                    register, value, ..
                } => Some((register, value)),
                Transaction::Read { .. } => None,
            })
            .collect()
    }

    /// Values written to the electrode configuration register.
    pub fn ecr_writes(&self) -> Vec<u8> {
        self.writes()
            .into_iter()
            .filter(|(register, _)| *register == REG_ECR)
            .map(|(_, value)| value)
            .collect()
    }

    pub fn status_reads(&self) -> usize {
        self.log()
            .iter()
            .filter(|transaction| {
                matches!(
                    transaction,
                    Transaction::Read {
                        register: REG_TOUCH_STATUS_L,
                        ..
                    }
                )
            })
            .count()
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c<SevenBitAddress> for FakeBus {
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        match operations {
            [Operation::Write(bytes)] if bytes.len() == 2 => state.write(address, bytes[0], bytes[1]),
            [Operation::Write(select), Operation::Read(buffer)]
                if select.len() == 1 && buffer.len() == 1 =>
            {
                buffer[0] = state.read(address, select[0])?;
                Ok(())
            }
            _ => panic!("unexpected I2C transaction shape"),
        }
    }
}

/// Completes immediately, adding up the requested time.
#[derive(Clone, Default)]
pub struct NoopDelay {
    pub elapsed_ns: Rc<Cell<u64>>,
}

impl NoopDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.get() / 1_000_000
    }
}

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + ns as u64);
    }
}

/// Never completes.
pub struct PendingDelay;

impl DelayNs for PendingDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        core::future::pending::<()>().await
    }
}

/// Completes on the second poll, recording every requested sleep in ms.
///
/// Yielding lets other branches of a `join` run between two samples.
#[derive(Clone, Default)]
pub struct SteppingDelay {
    pub sleeps_ms: Rc<RefCell<Vec<u32>>>,
}

impl SteppingDelay {
    pub fn sleeps_ms(&self) -> Vec<u32> {
        self.sleeps_ms.borrow().clone()
    }
}

impl DelayNs for SteppingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleeps_ms.borrow_mut().push(ns / 1_000_000);
        embassy_futures::yield_now().await;
    }
}
