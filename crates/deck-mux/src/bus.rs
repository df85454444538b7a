//! Raw multiplexer control register access
//!
//! [`ChannelSelect`] is the only primitive that changes which downstream
//! channel is connected. It is handed to the
//! [`MultiplexerManager`](crate::MultiplexerManager) at construction and is
//! never reachable from outside it.
//!
//! Blocking transfers cannot be cancelled once they reach the kernel, so a
//! transaction the manager gave up on may still be running. Every handle on
//! the physical bus therefore shares one [`BusLock`]: it is held for the whole
//! of each blocking job, and a job issued before a later select is refused
//! instead of landing on the newly routed channel.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use crate::channel::ChannelId;
use crate::error::BusError;

/// Write access to the multiplexer's channel-select register
pub trait ChannelSelect: Send {
    /// Connect `channel` and disconnect every other channel
    fn select(&mut self, channel: ChannelId) -> impl Future<Output = Result<(), BusError>> + Send;

    /// Check that the multiplexer acknowledges its address
    fn ping(&mut self) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// Routing epoch observed when a bus job was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTicket(u64);

#[derive(Debug, Default)]
struct BusLockInner {
    held: Mutex<()>,
    /// Bumped by every select that reaches the wire; only written under `held`
    epoch: AtomicU64,
}

/// Exclusive access to one physical bus, shared by every handle on it
#[derive(Debug, Clone, Default)]
pub struct BusLock {
    inner: Arc<BusLockInner>,
}

impl BusLock {
    /// Lock for a bus no job has used yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for a job about to be issued; never blocks
    pub fn ticket(&self) -> BusTicket {
        BusTicket(self.inner.epoch.load(Ordering::SeqCst))
    }

    /// Run `f` holding the bus, unless a select happened since `ticket`
    ///
    /// Blocks until the bus is free. Returns `None` without calling `f` if
    /// the job was superseded.
    pub fn exclusive<T>(&self, ticket: BusTicket, f: impl FnOnce() -> T) -> Option<T> {
        let _held = self.inner.held.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.epoch.load(Ordering::SeqCst) != ticket.0 {
            return None;
        }
        Some(f())
    }

    /// Like [`exclusive`](Self::exclusive), and starts a new routing epoch
    fn reroute<T>(&self, ticket: BusTicket, f: impl FnOnce() -> T) -> Option<T> {
        let _held = self.inner.held.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.epoch.load(Ordering::SeqCst) != ticket.0 {
            return None;
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        Some(f())
    }
}

/// [`ChannelSelect`] over a blocking `embedded-hal` I2C bus
///
/// Bus calls run on the blocking thread pool so that the manager's
/// transaction timeout can fire even if the kernel driver stalls.
pub struct I2cChannelSelect<I> {
    bus: Arc<Mutex<I>>,
    address: u8,
    settle: Duration,
    lock: BusLock,
}

impl<I> I2cChannelSelect<I>
where
    I: I2c + Send + 'static,
{
    /// Wrap a bus handle talking to the multiplexer at `address`
    pub fn new(bus: I, address: u8) -> Self {
        Self {
            bus: Arc::new(Mutex::new(bus)),
            address,
            settle: Duration::ZERO,
            lock: BusLock::new(),
        }
    }

    /// Share `lock` with the device handles on the same bus
    pub fn with_bus_lock(mut self, lock: BusLock) -> Self {
        self.lock = lock;
        self
    }

    /// Lock guarding the bus this multiplexer sits on
    pub fn bus_lock(&self) -> &BusLock {
        &self.lock
    }

    /// Wait `settle` after each select write before releasing the bus
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Multiplexer address
    pub fn address(&self) -> u8 {
        self.address
    }

    async fn run<F>(&self, reroute: bool, f: F) -> Result<(), BusError>
    where
        F: FnOnce(&mut I, u8) -> Result<(), I::Error> + Send + 'static,
    {
        let bus = Arc::clone(&self.bus);
        let lock = self.lock.clone();
        let ticket = lock.ticket();
        let address = self.address;
        tokio::task::spawn_blocking(move || {
            let job = || {
                let mut bus = bus
                    .lock()
                    .map_err(|_| BusError::Io("bus handle poisoned".to_string()))?;
                f(&mut bus, address).map_err(|e| map_i2c_error(e.kind(), address))
            };
            let outcome = if reroute {
                lock.reroute(ticket, job)
            } else {
                lock.exclusive(ticket, job)
            };
            outcome.unwrap_or(Err(BusError::Superseded))
        })
        .await
        .map_err(|e| BusError::Io(format!("bus task failed: {}", e)))?
    }
}

fn map_i2c_error(kind: ErrorKind, address: u8) -> BusError {
    match kind {
        ErrorKind::NoAcknowledge(_) => BusError::Nack { address },
        other => BusError::Io(format!("{:?}", other)),
    }
}

impl<I> ChannelSelect for I2cChannelSelect<I>
where
    I: I2c + Send + 'static,
{
    async fn select(&mut self, channel: ChannelId) -> Result<(), BusError> {
        let mask = channel.select_mask();
        let settle = self.settle;
        self.run(true, move |bus, address| {
            bus.write(address, &[mask])?;
            if !settle.is_zero() {
                std::thread::sleep(settle);
            }
            Ok(())
        })
        .await
    }

    async fn ping(&mut self) -> Result<(), BusError> {
        self.run(false, |bus, address| {
            let mut control = [0u8; 1];
            bus.read(address, &mut control)
        })
        .await
    }
}
