//! Simulated I2C multiplexer
//!
//! [`SimBus`] is handed to the manager as its select primitive. The paired
//! [`SimBusHandle`] stays with the test (or the daemon in simulate mode) and
//! exposes which channel the simulated hardware is physically routed to.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use deck_mux::{BusError, ChannelId, ChannelSelect};
use tracing::trace;

#[derive(Debug)]
struct BusState {
    address: u8,
    present: bool,
    routed: Option<ChannelId>,
    select_log: Vec<ChannelId>,
    fail_selects: usize,
    select_delay: Option<Duration>,
}

/// Shared view of the simulated multiplexer
#[derive(Debug, Clone)]
pub struct SimBusHandle {
    state: Arc<Mutex<BusState>>,
}

impl SimBusHandle {
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Channel the simulated hardware is currently connected to
    pub fn routed_channel(&self) -> Option<ChannelId> {
        self.lock().routed
    }

    /// Every successful select write, in order
    pub fn select_log(&self) -> Vec<ChannelId> {
        self.lock().select_log.clone()
    }

    /// Number of successful select writes
    pub fn select_count(&self) -> usize {
        self.lock().select_log.len()
    }

    /// Make the next `count` select writes fail with a NACK
    pub fn fail_next_selects(&self, count: usize) {
        self.lock().fail_selects = count;
    }

    /// Delay every select write, to exercise transaction timeouts
    pub fn set_select_delay(&self, delay: Option<Duration>) {
        self.lock().select_delay = delay;
    }

    /// Whether the multiplexer answers its address at all
    pub fn set_present(&self, present: bool) {
        self.lock().present = present;
    }

    /// Change the routing behind the manager's back, as a glitch or a
    /// second bus master would
    pub fn force_route(&self, channel: Option<ChannelId>) {
        self.lock().routed = channel;
    }
}

/// Simulated multiplexer select register
#[derive(Debug)]
pub struct SimBus {
    handle: SimBusHandle,
}

impl SimBus {
    /// A present multiplexer at `address` with nothing routed
    pub fn new(address: u8) -> (Self, SimBusHandle) {
        let handle = SimBusHandle {
            state: Arc::new(Mutex::new(BusState {
                address,
                present: true,
                routed: None,
                select_log: Vec::new(),
                fail_selects: 0,
                select_delay: None,
            })),
        };
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl ChannelSelect for SimBus {
    async fn select(&mut self, channel: ChannelId) -> Result<(), BusError> {
        let delay = self.handle.lock().select_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.handle.lock();
        if !state.present {
            return Err(BusError::Nack {
                address: state.address,
            });
        }
        if state.fail_selects > 0 {
            state.fail_selects -= 1;
            // A failed write leaves the routing undefined
            state.routed = None;
            return Err(BusError::Nack {
                address: state.address,
            });
        }
        state.routed = Some(channel);
        state.select_log.push(channel);
        trace!("Simulated mux routed to channel {}", channel);
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), BusError> {
        let state = self.handle.lock();
        if state.present {
            Ok(())
        } else {
            Err(BusError::Nack {
                address: state.address,
            })
        }
    }
}
