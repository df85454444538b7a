//! Stdin encoder driver for simulated runs

use deck_input::{Direction, EncoderSettings};
use deck_sim::SimEncoderHandle;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// A line typed on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Turn(Direction, u32),
    Click,
    DoubleClick,
    LongPress,
    Quit,
}

impl Command {
    /// Parse `cw [n]`, `ccw [n]`, `click`, `double`, `long` or `quit`
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let count = match words.next() {
            Some(n) => n.parse().ok().filter(|&n| n > 0)?,
            None => 1,
        };
        match verb {
            "cw" | "right" => Some(Self::Turn(Direction::Clockwise, count)),
            "ccw" | "left" => Some(Self::Turn(Direction::CounterClockwise, count)),
            "click" => Some(Self::Click),
            "double" => Some(Self::DoubleClick),
            "long" => Some(Self::LongPress),
            "quit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Expands gestures into encoder samples
pub struct GestureScript {
    handle: SimEncoderHandle,
    settings: EncoderSettings,
}

impl GestureScript {
    pub fn new(handle: SimEncoderHandle, settings: EncoderSettings) -> Self {
        Self { handle, settings }
    }

    fn samples(&self, ms: u64) -> usize {
        (ms * 1000 / self.settings.sample_period_us.max(1)) as usize
    }

    /// Queue the samples for `command`; `Quit` queues nothing
    pub fn play(&self, command: Command) {
        let timings = self.settings.button;
        let held = self.samples(timings.debounce_ms * 2);
        let settle = self.samples(timings.double_click_ms + timings.debounce_ms * 2);
        match command {
            Command::Turn(direction, detents) => {
                // One scripted cycle is four Gray steps
                let steps = u32::from(self.settings.steps_per_detent);
                self.handle.turn(direction, (detents * steps).div_ceil(4));
            }
            Command::Click => self.handle.press(held, settle),
            Command::DoubleClick => {
                self.handle.press(held, held);
                self.handle.press(held, settle);
            }
            Command::LongPress => {
                let long = self.samples(timings.long_press_ms + timings.debounce_ms * 2);
                self.handle.press(long, settle);
            }
            Command::Quit => {}
        }
    }
}

/// Read commands from stdin until `quit`
///
/// End of input leaves the simulation running until a signal arrives.
pub async fn drive_from_stdin(script: GestureScript) {
    info!("Simulated encoder: cw [n], ccw [n], click, double, long, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match Command::parse(&line) {
                Some(Command::Quit) => return,
                Some(command) => script.play(command),
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}'", line.trim()),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        }
    }
    std::future::pending::<()>().await;
}
