//! Push-button gesture recognition
//!
//! The encoder shaft switch is sampled at a fixed rate. A level change only
//! counts once it has been stable for the debounce time. Released presses
//! shorter than the long-press threshold are clicks; a click is held back for
//! the double-click window so that a second click can upgrade it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::event::EncoderEvent;

/// Timing thresholds for button gestures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonTimings {
    /// Minimum time a level must hold before it is accepted (ms)
    pub debounce_ms: u64,
    /// Maximum gap between the releases of a double click (ms)
    pub double_click_ms: u64,
    /// Hold time after which a press becomes a long press (ms)
    pub long_press_ms: u64,
}

impl Default for ButtonTimings {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            double_click_ms: 300,
            long_press_ms: 1000,
        }
    }
}

impl ButtonTimings {
    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn double_click(&self) -> Duration {
        Duration::from_millis(self.double_click_ms)
    }

    fn long_press(&self) -> Duration {
        Duration::from_millis(self.long_press_ms)
    }
}

/// State machine turning raw switch samples into gestures
#[derive(Debug, Clone)]
pub struct ButtonTracker {
    timings: ButtonTimings,
    raw: bool,
    raw_since: Instant,
    stable: bool,
    pressed_at: Option<Instant>,
    long_press_fired: bool,
    pending_click: Option<Instant>,
}

impl ButtonTracker {
    /// Create a tracker with the button released at `now`
    pub fn new(timings: ButtonTimings, now: Instant) -> Self {
        Self {
            timings,
            raw: false,
            raw_since: now,
            stable: false,
            pressed_at: None,
            long_press_fired: false,
            pending_click: None,
        }
    }

    /// Start from an observed level
    ///
    /// A button already held at startup is treated as settled: it produces
    /// neither a long press nor a click when it is eventually released.
    pub fn with_initial_level(mut self, pressed: bool) -> Self {
        self.raw = pressed;
        self.stable = pressed;
        self
    }

    /// Debounced button level
    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    /// Feed one sample, returning at most one recognised gesture
    ///
    /// Must be called regularly even when the level does not change, so that
    /// held-back single clicks and long presses are reported on time.
    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<EncoderEvent> {
        if pressed != self.raw {
            self.raw = pressed;
            self.raw_since = now;
        }

        if let Some(released_at) = self.pending_click {
            if now.duration_since(released_at) > self.timings.double_click() {
                self.pending_click = None;
                return Some(EncoderEvent::SingleClick);
            }
        }

        if self.raw != self.stable
            && now.duration_since(self.raw_since) >= self.timings.debounce()
        {
            self.stable = self.raw;
            if self.stable {
                self.pressed_at = Some(now);
                self.long_press_fired = false;
            } else if let Some(event) = self.on_release(now) {
                return Some(event);
            }
        }

        if let Some(pressed_at) = self.pressed_at {
            if self.stable
                && !self.long_press_fired
                && now.duration_since(pressed_at) >= self.timings.long_press()
            {
                self.long_press_fired = true;
                return Some(EncoderEvent::LongPress);
            }
        }

        None
    }

    fn on_release(&mut self, now: Instant) -> Option<EncoderEvent> {
        self.pressed_at.take()?;
        if self.long_press_fired {
            return None;
        }
        match self.pending_click.take() {
            Some(_) => Some(EncoderEvent::DoubleClick),
            None => {
                self.pending_click = Some(now);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the tracker with 1 ms samples following a level script
    struct Harness {
        tracker: ButtonTracker,
        now: Instant,
        events: Vec<(u64, EncoderEvent)>,
        elapsed_ms: u64,
    }

    impl Harness {
        fn new() -> Self {
            let now = Instant::now();
            Self {
                tracker: ButtonTracker::new(ButtonTimings::default(), now),
                now,
                events: Vec::new(),
                elapsed_ms: 0,
            }
        }

        fn hold(&mut self, pressed: bool, ms: u64) {
            for _ in 0..ms {
                self.now += Duration::from_millis(1);
                self.elapsed_ms += 1;
                if let Some(event) = self.tracker.update(pressed, self.now) {
                    self.events.push((self.elapsed_ms, event));
                }
            }
        }

        fn gestures(&self) -> Vec<EncoderEvent> {
            self.events.iter().map(|(_, e)| *e).collect()
        }
    }

    #[test]
    fn test_single_click_reported_after_window() {
        let mut h = Harness::new();
        h.hold(true, 120);
        h.hold(false, 100);
        assert!(h.gestures().is_empty(), "click held back for double window");
        h.hold(false, 400);
        assert_eq!(h.gestures(), vec![EncoderEvent::SingleClick]);
    }

    #[test]
    fn test_double_click() {
        let mut h = Harness::new();
        h.hold(true, 100);
        h.hold(false, 120);
        h.hold(true, 100);
        h.hold(false, 600);
        assert_eq!(h.gestures(), vec![EncoderEvent::DoubleClick]);
    }

    #[test]
    fn test_slow_second_click_is_two_singles() {
        let mut h = Harness::new();
        h.hold(true, 100);
        h.hold(false, 500);
        h.hold(true, 100);
        h.hold(false, 500);
        assert_eq!(
            h.gestures(),
            vec![EncoderEvent::SingleClick, EncoderEvent::SingleClick]
        );
    }

    #[test]
    fn test_long_press_fires_once_while_held() {
        let mut h = Harness::new();
        h.hold(true, 3000);
        assert_eq!(h.gestures(), vec![EncoderEvent::LongPress]);
        let (at, _) = h.events[0];
        assert!((1000..1100).contains(&at), "fired at {}ms", at);

        // Release after a long press is not a click
        h.hold(false, 1000);
        assert_eq!(h.gestures(), vec![EncoderEvent::LongPress]);
    }

    #[test]
    fn test_bounce_shorter_than_debounce_ignored() {
        let mut h = Harness::new();
        for _ in 0..10 {
            h.hold(true, 5);
            h.hold(false, 5);
        }
        h.hold(false, 1000);
        assert!(h.gestures().is_empty());
        assert!(!h.tracker.is_pressed());
    }

    #[test]
    fn test_bouncy_click_counts_once() {
        let mut h = Harness::new();
        // chatter on press, then a clean hold
        h.hold(true, 3);
        h.hold(false, 2);
        h.hold(true, 150);
        // chatter on release
        h.hold(false, 3);
        h.hold(true, 2);
        h.hold(false, 600);
        assert_eq!(h.gestures(), vec![EncoderEvent::SingleClick]);
    }
}
