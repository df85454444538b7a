//! Encoder sampling task
//!
//! Runs on its own schedule, independent of the controller cycle. It only
//! reads GPIO lines and publishes events; it never touches the I2C bus.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::button::{ButtonTimings, ButtonTracker};
use crate::error::InputError;
use crate::event::EncoderEvent;
use crate::pins::{EncoderPinConfig, EncoderPins};
use crate::quadrature::QuadratureDecoder;
use crate::queue::EventQueue;

/// Pause after a failed pin read before sampling again
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Line assignment
    pub pins: EncoderPinConfig,
    /// Gray-code sub-steps per mechanical detent
    pub steps_per_detent: u8,
    /// Sampling period in microseconds
    pub sample_period_us: u64,
    /// Button gesture thresholds
    pub button: ButtonTimings,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            pins: EncoderPinConfig::default(),
            steps_per_detent: 4,
            sample_period_us: 1000,
            button: ButtonTimings::default(),
        }
    }
}

impl EncoderSettings {
    /// Sampling period as a duration
    pub fn sample_period(&self) -> Duration {
        Duration::from_micros(self.sample_period_us)
    }
}

/// Decodes encoder samples and publishes events to the queue
pub struct EncoderSource<P> {
    pins: P,
    decoder: QuadratureDecoder,
    button: ButtonTracker,
    queue: Arc<EventQueue>,
}

impl<P: EncoderPins> EncoderSource<P> {
    /// Create a source, taking an initial sample to seed the decoder
    pub fn new(
        mut pins: P,
        settings: &EncoderSettings,
        queue: Arc<EventQueue>,
        now: Instant,
    ) -> Result<Self, InputError> {
        let initial = pins.sample()?;
        let decoder =
            QuadratureDecoder::new(settings.steps_per_detent)?.with_initial_levels(initial.a, initial.b);
        let button = ButtonTracker::new(settings.button, now).with_initial_level(initial.button);

        Ok(Self {
            pins,
            decoder,
            button,
            queue,
        })
    }

    /// Take one sample and publish any resulting events
    ///
    /// Returns the number of events pushed.
    pub fn poll(&mut self, now: Instant) -> Result<usize, InputError> {
        let levels = self.pins.sample()?;
        let mut pushed = 0;

        if let Some(direction) = self.decoder.update(levels.a, levels.b) {
            self.publish(EncoderEvent::rotation(direction, 1));
            pushed += 1;
        }
        if let Some(gesture) = self.button.update(levels.button, now) {
            self.publish(gesture);
            pushed += 1;
        }
        Ok(pushed)
    }

    fn publish(&self, event: EncoderEvent) {
        debug!("Encoder event: {:?}", event);
        self.queue.push(event);
    }
}

/// Run the sampling loop until shutdown is signalled
///
/// The task stops as soon as the shutdown flag becomes `true` or its sender
/// is dropped; it never waits on the consumer.
pub async fn run_encoder_task<P: EncoderPins>(
    mut source: EncoderSource<P>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Encoder task started (period {:?})", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let now = tokio::time::Instant::now().into_std();
                if let Err(e) = source.poll(now) {
                    warn!("Encoder sample failed: {}", e);
                    sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }
    }

    info!(
        "Encoder task stopped ({} events dropped)",
        source.queue.dropped()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::PinLevels;
    use std::collections::VecDeque;

    /// Pins that replay a script, then hold the last sample
    struct ScriptedPins {
        script: VecDeque<Result<PinLevels, ()>>,
        last: PinLevels,
    }

    impl ScriptedPins {
        fn new(samples: Vec<Result<PinLevels, ()>>) -> Self {
            Self {
                script: samples.into(),
                last: PinLevels {
                    a: true,
                    b: true,
                    button: false,
                },
            }
        }
    }

    impl EncoderPins for ScriptedPins {
        fn sample(&mut self) -> Result<PinLevels, InputError> {
            match self.script.pop_front() {
                Some(Ok(levels)) => {
                    self.last = levels;
                    Ok(levels)
                }
                Some(Err(())) => Err(InputError::PinRead {
                    pin: "clk",
                    reason: "scripted failure".to_string(),
                }),
                None => Ok(self.last),
            }
        }
    }

    fn lv(a: bool, b: bool) -> Result<PinLevels, ()> {
        Ok(PinLevels {
            a,
            b,
            button: false,
        })
    }

    #[test]
    fn test_poll_publishes_rotation() {
        let queue = Arc::new(EventQueue::new(8).unwrap());
        let pins = ScriptedPins::new(vec![
            lv(true, true),
            lv(false, true),
            lv(false, false),
            lv(true, false),
            lv(true, true),
        ]);
        let now = Instant::now();
        let mut source =
            EncoderSource::new(pins, &EncoderSettings::default(), Arc::clone(&queue), now).unwrap();

        let mut pushed = 0;
        for i in 1..=4 {
            pushed += source.poll(now + Duration::from_millis(i)).unwrap();
        }
        assert_eq!(pushed, 1);
        assert_eq!(queue.drain_all(), vec![EncoderEvent::RotateCw(1)]);
    }

    #[test]
    fn test_button_held_at_startup_is_not_a_click() {
        let queue = Arc::new(EventQueue::new(8).unwrap());
        let held = Ok(PinLevels {
            a: true,
            b: true,
            button: true,
        });
        let released = Ok(PinLevels {
            a: true,
            b: true,
            button: false,
        });
        let pins = ScriptedPins::new(vec![held, held, released]);
        let now = Instant::now();
        let mut source =
            EncoderSource::new(pins, &EncoderSettings::default(), Arc::clone(&queue), now).unwrap();

        // Release and wait well past the double-click window
        for i in 1..=2000 {
            source.poll(now + Duration::from_millis(i)).unwrap();
        }
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_until_shutdown() {
        let queue = Arc::new(EventQueue::new(8).unwrap());
        let pins = ScriptedPins::new(vec![
            lv(true, true),
            lv(true, false),
            Err(()),
            lv(false, false),
            lv(false, true),
            lv(true, true),
        ]);
        let source = EncoderSource::new(
            pins,
            &EncoderSettings::default(),
            Arc::clone(&queue),
            tokio::time::Instant::now().into_std(),
        )
        .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_encoder_task(
            source,
            Duration::from_millis(1),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.drain_all(), vec![EncoderEvent::RotateCcw(1)]);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_when_sender_dropped() {
        let queue = Arc::new(EventQueue::new(8).unwrap());
        let source = EncoderSource::new(
            ScriptedPins::new(vec![]),
            &EncoderSettings::default(),
            queue,
            tokio::time::Instant::now().into_std(),
        )
        .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_encoder_task(
            source,
            Duration::from_millis(1),
            shutdown_rx,
        ));
        drop(shutdown_tx);
        task.await.unwrap();
    }
}
