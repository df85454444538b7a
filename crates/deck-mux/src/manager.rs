//! Multiplexer Manager
//!
//! Owns the multiplexer's channel-select primitive and the in-memory record of
//! which channel is connected. Every transaction that depends on a channel
//! runs through [`MultiplexerManager::with_channel`], which holds an async
//! mutex for the whole select-then-operate sequence.
//!
//! # Channel state
//!
//! The recorded channel starts as unknown, so the first use of any channel
//! always issues an explicit select. It is set only after a select write
//! succeeds and is cleared again whenever a select or an operation fails, or
//! an operation is abandoned part way (cancelled future or panic). A cleared
//! record forces the next caller to re-select.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::bus::ChannelSelect;
use crate::channel::ChannelId;
use crate::error::{BusError, DriverError, MuxError};

/// Default bound on any single bus transaction
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(100);

struct MuxSlot<B> {
    bus: B,
    current: Option<ChannelId>,
    /// Set while an operation is running; still set on entry means the
    /// previous holder never finished and the bus state is unknown
    in_flight: bool,
    select_writes: u64,
}

/// Exclusive owner of the multiplexer channel selection
pub struct MultiplexerManager<B> {
    slot: Mutex<MuxSlot<B>>,
    timeout: Duration,
}

impl<B: ChannelSelect> MultiplexerManager<B> {
    /// Take ownership of the select primitive
    pub fn new(bus: B, transaction_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(MuxSlot {
                bus,
                current: None,
                in_flight: false,
                select_writes: 0,
            }),
            timeout: transaction_timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Run `operation` with `channel` selected and no other caller on the bus
    ///
    /// Issues a select write only if `channel` is not already the recorded
    /// channel. Both the select and the operation are bounded by the
    /// transaction timeout. Exclusivity is released on every exit path.
    pub async fn with_channel<T, F, Fut>(&self, channel: ChannelId, operation: F) -> Result<T, MuxError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let mut slot = self.slot.lock().await;

        if slot.in_flight {
            warn!("Previous bus transaction was abandoned, forcing re-select");
            slot.in_flight = false;
            slot.current = None;
        }

        if slot.current != Some(channel) {
            slot.current = None;
            match timeout(self.timeout, slot.bus.select(channel)).await {
                Ok(Ok(())) => {
                    slot.current = Some(channel);
                    slot.select_writes += 1;
                    trace!("Selected multiplexer channel {}", channel);
                }
                Ok(Err(e)) => {
                    debug!("Select of channel {} failed: {}", channel, e);
                    return Err(MuxError::Bus(e));
                }
                Err(_) => {
                    debug!("Select of channel {} timed out", channel);
                    return Err(MuxError::Bus(BusError::Timeout {
                        channel,
                        timeout_ms: self.timeout_ms(),
                    }));
                }
            }
        }

        slot.in_flight = true;
        let result = timeout(self.timeout, operation()).await;
        slot.in_flight = false;

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                slot.current = None;
                Err(MuxError::Driver { channel, source })
            }
            Err(_) => {
                slot.current = None;
                Err(MuxError::Timeout {
                    channel,
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }

    /// Check that the multiplexer answers on the bus
    pub async fn ping(&self) -> Result<(), BusError> {
        let mut slot = self.slot.lock().await;
        match timeout(self.timeout, slot.bus.ping()).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Io(format!(
                "ping timed out after {}ms",
                self.timeout_ms()
            ))),
        }
    }

    /// Currently recorded channel, `None` if unknown
    pub async fn current_channel(&self) -> Option<ChannelId> {
        let slot = self.slot.lock().await;
        if slot.in_flight {
            None
        } else {
            slot.current
        }
    }

    /// Forget the recorded channel so the next use re-selects explicitly
    pub async fn invalidate(&self) {
        self.slot.lock().await.current = None;
    }

    /// Number of successful select writes issued so far
    pub async fn select_writes(&self) -> u64 {
        self.slot.lock().await.select_writes
    }

    /// Transaction timeout in effect
    pub fn transaction_timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    /// Select primitive that records writes and can be told to fail
    #[derive(Clone, Default)]
    struct FakeBus {
        writes: Arc<StdMutex<Vec<ChannelId>>>,
        fail_next: Arc<AtomicUsize>,
        hang: Arc<AtomicBool>,
    }

    impl ChannelSelect for FakeBus {
        async fn select(&mut self, channel: ChannelId) -> Result<(), BusError> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BusError::Nack { address: 0x70 });
            }
            self.writes.lock().unwrap().push(channel);
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), BusError> {
            Ok(())
        }
    }

    fn ch(index: u8) -> ChannelId {
        ChannelId::new(index).unwrap()
    }

    fn manager(bus: FakeBus) -> MultiplexerManager<FakeBus> {
        MultiplexerManager::new(bus, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_starts_unknown() {
        let mux = manager(FakeBus::default());
        assert_eq!(mux.current_channel().await, None);
    }

    #[tokio::test]
    async fn test_same_channel_selects_once() {
        let bus = FakeBus::default();
        let mux = manager(bus.clone());

        mux.with_channel(ch(0), || async { Ok(()) }).await.unwrap();
        mux.with_channel(ch(0), || async { Ok(()) }).await.unwrap();

        assert_eq!(*bus.writes.lock().unwrap(), vec![ch(0)]);
        assert_eq!(mux.select_writes().await, 1);
        assert_eq!(mux.current_channel().await, Some(ch(0)));
    }

    #[tokio::test]
    async fn test_switching_channels_selects_each_time() {
        let bus = FakeBus::default();
        let mux = manager(bus.clone());

        for index in [0, 1, 1, 0] {
            mux.with_channel(ch(index), || async { Ok(()) }).await.unwrap();
        }

        assert_eq!(*bus.writes.lock().unwrap(), vec![ch(0), ch(1), ch(0)]);
    }

    #[tokio::test]
    async fn test_operation_result_is_returned() {
        let mux = manager(FakeBus::default());
        let value = mux.with_channel(ch(2), || async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_select_failure_leaves_unknown_and_skips_operation() {
        let bus = FakeBus::default();
        bus.fail_next.store(1, Ordering::SeqCst);
        let mux = manager(bus.clone());
        let ran = AtomicBool::new(false);

        let result = mux
            .with_channel(ch(1), || async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result, Err(MuxError::Bus(BusError::Nack { address: 0x70 })));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(mux.current_channel().await, None);
    }

    #[tokio::test]
    async fn test_operation_failure_resets_to_unknown() {
        let bus = FakeBus::default();
        let mux = manager(bus.clone());

        let result: Result<(), _> = mux
            .with_channel(ch(1), || async {
                Err(DriverError::transfer("servo", "nack"))
            })
            .await;
        assert!(matches!(result, Err(MuxError::Driver { .. })));
        assert_eq!(mux.current_channel().await, None);

        // Next use of the same channel must re-select
        mux.with_channel(ch(1), || async { Ok(()) }).await.unwrap();
        assert_eq!(*bus.writes.lock().unwrap(), vec![ch(1), ch(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_select_times_out() {
        let bus = FakeBus::default();
        bus.hang.store(true, Ordering::SeqCst);
        let mux = manager(bus);

        let result = mux.with_channel(ch(3), || async { Ok(()) }).await;
        assert_eq!(
            result,
            Err(MuxError::Bus(BusError::Timeout {
                channel: ch(3),
                timeout_ms: 50
            }))
        );
        assert_eq!(mux.current_channel().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_operation_times_out_and_releases() {
        let mux = manager(FakeBus::default());

        let result: Result<(), _> = mux
            .with_channel(ch(0), || std::future::pending::<Result<(), DriverError>>())
            .await;
        assert!(matches!(result, Err(MuxError::Timeout { .. })));

        // Lock was released: a later call goes through
        mux.with_channel(ch(0), || async { Ok(()) }).await.unwrap();
        assert_eq!(mux.current_channel().await, Some(ch(0)));
    }

    #[tokio::test]
    async fn test_cancelled_operation_forces_reselect() {
        let bus = FakeBus::default();
        let mux = manager(bus.clone());

        {
            let call = mux.with_channel(ch(0), || async {
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                Ok(())
            });
            // Poll once so the select happens, then drop mid-operation
            tokio::select! {
                biased;
                _ = call => panic!("operation should not finish on first poll"),
                _ = tokio::task::yield_now() => {}
            }
        }

        assert_eq!(mux.current_channel().await, None);
        mux.with_channel(ch(0), || async { Ok(()) }).await.unwrap();
        assert_eq!(*bus.writes.lock().unwrap(), vec![ch(0), ch(0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_overlap() {
        let bus = FakeBus::default();
        let mux = Arc::new(manager(bus.clone()));
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for worker in 0..8u8 {
            let mux = Arc::clone(&mux);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            tasks.push(tokio::spawn(async move {
                for i in 0..50u8 {
                    let channel = ch((worker + i) % 2);
                    mux.with_channel(channel, || async {
                        if inside.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::task::yield_now().await;
                        inside.store(false, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                    .unwrap();
                    assert!(mux.current_channel().await.is_some());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        let writes = bus.writes.lock().unwrap();
        // Never two consecutive selects of the same channel
        assert!(writes.windows(2).all(|w| w[0] != w[1]));
    }
}
