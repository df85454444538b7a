//! Spectrum analyzer animation for the 128x64 OLED
//!
//! Bars rise and fall on overlapping sine waves with a slow peak-hold marker
//! above each one. The state only advances by the frame delta it is given, so
//! a skipped frame does not make the animation jump.

use std::time::Duration;

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};

/// Number of bars across the panel
pub const BAR_COUNT: usize = 16;

/// Peak marker fall rate (pixels per second)
const PEAK_FALL_RATE: f32 = 24.0;

/// Animated spectrum bars
#[derive(Debug, Clone)]
pub struct SpectrumAnimation {
    size: Size,
    elapsed: f32,
    levels: [f32; BAR_COUNT],
    peaks: [f32; BAR_COUNT],
}

impl SpectrumAnimation {
    /// Animation sized for a `width` x `height` panel
    pub fn new(size: Size) -> Self {
        Self {
            size,
            elapsed: 0.0,
            levels: [0.0; BAR_COUNT],
            peaks: [0.0; BAR_COUNT],
        }
    }

    fn max_height(&self) -> f32 {
        self.size.height.saturating_sub(2) as f32
    }

    /// Advance the animation by `delta`
    pub fn advance(&mut self, delta: Duration) {
        let dt = delta.as_secs_f32();
        self.elapsed += dt;
        let t = self.elapsed;
        let max = self.max_height();

        for (i, (level, peak)) in self.levels.iter_mut().zip(self.peaks.iter_mut()).enumerate() {
            let band = i as f32;
            let slow = (t * 1.3 + band * 0.45).sin();
            let fast = (t * 4.7 + band * 1.1).sin() * 0.35;
            let tilt = 1.0 - band / (BAR_COUNT as f32 * 1.6);
            *level = (((slow + fast) * 0.5 + 0.5) * tilt).clamp(0.0, 1.0) * max;

            *peak = (*peak - PEAK_FALL_RATE * dt).max(*level);
        }
    }

    /// Current bar heights in pixels
    pub fn bar_heights(&self) -> impl Iterator<Item = u32> + '_ {
        self.levels.iter().map(|h| h.round() as u32)
    }

    /// Current peak marker heights in pixels
    pub fn peak_heights(&self) -> impl Iterator<Item = u32> + '_ {
        self.peaks.iter().map(|h| h.round() as u32)
    }

    /// Draw the current state
    pub fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let slot = self.size.width / BAR_COUNT as u32;
        let bar_width = slot.saturating_sub(2).max(1);
        let floor = self.size.height as i32 - 1;
        let fill = PrimitiveStyle::with_fill(BinaryColor::On);
        let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 1);

        for (i, (height, peak)) in self.bar_heights().zip(self.peak_heights()).enumerate() {
            let x = (i as u32 * slot) as i32 + 1;
            if height > 0 {
                Rectangle::new(
                    Point::new(x, floor - height as i32 + 1),
                    Size::new(bar_width, height),
                )
                .into_styled(fill)
                .draw(target)?;
            }
            let y = floor - peak as i32 - 1;
            Line::new(Point::new(x, y), Point::new(x + bar_width as i32 - 1, y))
                .into_styled(stroke)
                .draw(target)?;
        }
        Ok(())
    }
}
