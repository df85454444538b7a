//! Rotary Encoder Input
//!
//! This crate turns the raw GPIO lines of a push-button rotary encoder into
//! discrete [`EncoderEvent`]s and hands them to the controller through a
//! bounded [`EventQueue`].
//!
//! # Architecture
//!
//! - [`QuadratureDecoder`] converts phase-line samples into detent ticks,
//!   rejecting contact bounce
//! - [`ButtonTracker`] recognises clicks, double clicks and long presses
//! - [`EncoderSource`] combines both over an [`EncoderPins`] implementation
//! - [`run_encoder_task`] samples on its own schedule until shutdown
//!
//! The queue is the only state shared with the controller. Pushing never
//! blocks; when the controller falls behind the oldest events are dropped.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use deck_input::{EncoderEvent, EventQueue};
//!
//! let queue = Arc::new(EventQueue::new(2).unwrap());
//! queue.push(EncoderEvent::RotateCw(1));
//! queue.push(EncoderEvent::SingleClick);
//! queue.push(EncoderEvent::RotateCcw(1));
//!
//! assert_eq!(queue.drain_all().len(), 2);
//! assert_eq!(queue.dropped(), 1);
//! ```

pub mod button;
pub mod error;
pub mod event;
pub mod pins;
pub mod quadrature;
pub mod queue;
pub mod source;

pub use button::{ButtonTimings, ButtonTracker};
pub use error::InputError;
pub use event::{Direction, EncoderEvent};
pub use pins::{EncoderPinConfig, EncoderPins, GpioEncoderPins, PinLevels};
pub use quadrature::QuadratureDecoder;
pub use queue::{EventQueue, DEFAULT_QUEUE_CAPACITY};
pub use source::{run_encoder_task, EncoderSettings, EncoderSource};
