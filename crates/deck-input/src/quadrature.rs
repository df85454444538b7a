//! Quadrature decoding for the rotary encoder phase signals
//!
//! Each sample of the two phase lines forms a 2-bit Gray code state. Valid
//! transitions move one bit at a time and contribute a sub-step of +1 or -1;
//! transitions that flip both bits are physically impossible at our sampling
//! rate, so they are treated as noise and discard any partial run. A detent
//! tick is only reported once a full run of sub-steps in one direction lands
//! back on a detent state, so contact bounce that wobbles between two states
//! never produces a tick, let alone a reverse one.

use crate::error::InputError;
use crate::event::Direction;

/// Sub-step contribution indexed by `(previous << 2) | current`
const TRANSITIONS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Both lines high: the resting state with pull-up resistors
const REST_STATE: u8 = 0b11;

/// Decoder for a two-phase incremental encoder
#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    state: u8,
    accumulated: i8,
    steps_per_detent: u8,
}

impl QuadratureDecoder {
    /// Create a decoder for an encoder with the given sub-steps per detent
    ///
    /// Common mechanical encoders produce a full Gray cycle (4 sub-steps) per
    /// detent; half-step parts produce 2.
    pub fn new(steps_per_detent: u8) -> Result<Self, InputError> {
        if !matches!(steps_per_detent, 1 | 2 | 4) {
            return Err(InputError::InvalidStepsPerDetent(steps_per_detent));
        }
        Ok(Self {
            state: REST_STATE,
            accumulated: 0,
            steps_per_detent,
        })
    }

    /// Start from an observed line state instead of assuming rest
    pub fn with_initial_levels(mut self, a: bool, b: bool) -> Self {
        self.state = encode(a, b);
        self
    }

    fn is_detent(&self, state: u8) -> bool {
        match self.steps_per_detent {
            4 => state == REST_STATE,
            2 => state == REST_STATE || state == 0b00,
            _ => true,
        }
    }

    /// Feed one sample of the phase lines, returning a tick if one completed
    pub fn update(&mut self, a: bool, b: bool) -> Option<Direction> {
        let next = encode(a, b);
        if next == self.state {
            return None;
        }

        let step = TRANSITIONS[usize::from((self.state << 2) | next)];
        self.state = next;
        if step == 0 {
            // Both lines flipped: direction unknown, drop the partial run
            self.accumulated = 0;
            return None;
        }
        let steps = self.steps_per_detent as i8;
        self.accumulated = (self.accumulated + step).clamp(-steps, steps);

        if !self.is_detent(next) {
            return None;
        }

        let tick = if self.accumulated >= steps {
            Some(Direction::Clockwise)
        } else if self.accumulated <= -steps {
            Some(Direction::CounterClockwise)
        } else {
            None
        };
        // Partial runs are discarded at every detent
        self.accumulated = 0;
        tick
    }
}

fn encode(a: bool, b: bool) -> u8 {
    (u8::from(a) << 1) | u8::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One clockwise detent starting and ending at rest: A falls first
    const CW_CYCLE: [(bool, bool); 4] = [(false, true), (false, false), (true, false), (true, true)];
    const CCW_CYCLE: [(bool, bool); 4] = [(true, false), (false, false), (false, true), (true, true)];

    fn feed(decoder: &mut QuadratureDecoder, samples: &[(bool, bool)]) -> Vec<Direction> {
        samples
            .iter()
            .filter_map(|&(a, b)| decoder.update(a, b))
            .collect()
    }

    #[test]
    fn test_full_cycle_emits_one_tick() {
        let mut decoder = QuadratureDecoder::new(4).unwrap();
        assert_eq!(feed(&mut decoder, &CW_CYCLE), vec![Direction::Clockwise]);
        assert_eq!(
            feed(&mut decoder, &CCW_CYCLE),
            vec![Direction::CounterClockwise]
        );
    }

    #[test]
    fn test_repeated_samples_are_ignored() {
        let mut decoder = QuadratureDecoder::new(4).unwrap();
        let mut samples = Vec::new();
        for s in CW_CYCLE {
            samples.push(s);
            samples.push(s);
            samples.push(s);
        }
        assert_eq!(feed(&mut decoder, &samples), vec![Direction::Clockwise]);
    }

    #[test]
    fn test_bounce_on_first_edge_produces_nothing() {
        let mut decoder = QuadratureDecoder::new(4).unwrap();
        // A chatters low/high without B ever moving
        let bounce = [
            (false, true),
            (true, true),
            (false, true),
            (true, true),
            (false, true),
            (true, true),
        ];
        assert!(feed(&mut decoder, &bounce).is_empty());
    }

    #[test]
    fn test_bounce_mid_cycle_does_not_reverse() {
        let mut decoder = QuadratureDecoder::new(4).unwrap();
        let samples = [
            (false, true),
            (false, false),
            // contact bounce back and forth
            (false, true),
            (false, false),
            (true, false),
            (true, true),
        ];
        let ticks = feed(&mut decoder, &samples);
        assert!(ticks.iter().all(|d| *d == Direction::Clockwise));
    }

    #[test]
    fn test_invalid_double_transition_ignored() {
        let mut decoder = QuadratureDecoder::new(4).unwrap();
        // 11 -> 00 skips a state entirely
        assert_eq!(decoder.update(false, false), None);
        // Completing a clockwise run from here still requires valid steps
        assert_eq!(
            feed(&mut decoder, &[(true, false), (true, true)]),
            Vec::<Direction>::new()
        );
        assert_eq!(feed(&mut decoder, &CW_CYCLE), vec![Direction::Clockwise]);
    }

    #[test]
    fn test_fast_spin_skipping_rest_never_ticks() {
        let mut decoder = QuadratureDecoder::new(4).unwrap().with_initial_levels(false, true);
        // Every loop jumps 10 -> 01 across the rest state
        let spin: Vec<(bool, bool)> = (0..100)
            .flat_map(|_| [(false, false), (true, false), (false, true)])
            .collect();
        assert!(feed(&mut decoder, &spin).is_empty());

        // Decoding resumes normally once the encoder is back at rest
        assert!(feed(&mut decoder, &[(true, true)]).is_empty());
        assert_eq!(feed(&mut decoder, &CW_CYCLE), vec![Direction::Clockwise]);
    }

    #[test]
    fn test_half_step_encoder() {
        let mut decoder = QuadratureDecoder::new(2).unwrap();
        assert_eq!(
            feed(&mut decoder, &CW_CYCLE),
            vec![Direction::Clockwise, Direction::Clockwise]
        );
    }

    #[test]
    fn test_invalid_steps_per_detent() {
        assert!(matches!(
            QuadratureDecoder::new(3),
            Err(InputError::InvalidStepsPerDetent(3))
        ));
    }
}
