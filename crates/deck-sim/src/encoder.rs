//! Scripted encoder lines
//!
//! [`SimEncoderPins`] replays queued samples, holding the last level once the
//! script runs out, the way a physical encoder rests between gestures. The
//! helpers on [`SimEncoderHandle`] expand gestures into the sample sequences a
//! real encoder would produce at a 1 ms sampling period.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use deck_input::{Direction, EncoderPins, InputError, PinLevels};

/// Gray sequences for one detent starting from rest (A=1, B=1)
const CW_CYCLE: [(bool, bool); 4] = [(false, true), (false, false), (true, false), (true, true)];
const CCW_CYCLE: [(bool, bool); 4] = [(true, false), (false, false), (false, true), (true, true)];

#[derive(Debug)]
struct Script {
    samples: VecDeque<PinLevels>,
    resting: PinLevels,
}

/// Test-side control of [`SimEncoderPins`]
#[derive(Debug, Clone)]
pub struct SimEncoderHandle {
    script: Arc<Mutex<Script>>,
}

impl SimEncoderHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append raw samples
    pub fn push_samples(&self, samples: impl IntoIterator<Item = PinLevels>) {
        self.lock().samples.extend(samples);
    }

    /// Append `detents` full quadrature cycles in `direction`
    pub fn turn(&self, direction: Direction, detents: u32) {
        let mut script = self.lock();
        let button = script.samples.back().unwrap_or(&script.resting).button;
        let cycle = match direction {
            Direction::Clockwise => CW_CYCLE,
            Direction::CounterClockwise => CCW_CYCLE,
        };
        for _ in 0..detents {
            for (a, b) in cycle {
                script.samples.push_back(PinLevels { a, b, button });
            }
        }
    }

    /// Hold the button for `held_ms` samples, then release for `released_ms`
    pub fn press(&self, held_ms: usize, released_ms: usize) {
        let mut script = self.lock();
        let rest = PinLevels {
            a: true,
            b: true,
            button: false,
        };
        let down = PinLevels { button: true, ..rest };
        script.samples.extend(std::iter::repeat(down).take(held_ms));
        script.samples.extend(std::iter::repeat(rest).take(released_ms));
    }

    /// Samples not yet consumed
    pub fn remaining(&self) -> usize {
        self.lock().samples.len()
    }
}

/// Encoder lines fed from a script
#[derive(Debug)]
pub struct SimEncoderPins {
    handle: SimEncoderHandle,
}

impl SimEncoderPins {
    /// Encoder at rest with the button released
    pub fn new() -> (Self, SimEncoderHandle) {
        let handle = SimEncoderHandle {
            script: Arc::new(Mutex::new(Script {
                samples: VecDeque::new(),
                resting: PinLevels {
                    a: true,
                    b: true,
                    button: false,
                },
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

impl EncoderPins for SimEncoderPins {
    fn sample(&mut self) -> Result<PinLevels, InputError> {
        let mut script = self.handle.lock();
        if let Some(levels) = script.samples.pop_front() {
            script.resting = levels;
        }
        Ok(script.resting)
    }
}
