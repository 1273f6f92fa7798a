//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Measures per-frame delta time and a rolling frame rate.
///
/// The rate is recomputed once per `report_interval`, which keeps the log
/// readable when the loop is presenting at display rate.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
    report_interval: Duration,
}

impl FrameTimer {
    pub fn new(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
            report_interval,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance one frame and return the time since the previous call.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.window_frames += 1;
        delta
    }

    /// Frames per second over the last completed interval.
    ///
    /// Returns `None` until `report_interval` has elapsed since the last
    /// report, then resets the window.
    pub fn take_fps(&mut self) -> Option<f32> {
        let window = self.last_tick.duration_since(self.window_start);
        if window < self.report_interval || self.window_frames == 0 {
            return None;
        }

        let fps = self.window_frames as f32 / window.as_secs_f32();
        self.window_start = self.last_tick;
        self.window_frames = 0;
        Some(fps)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fps_before_interval() {
        let mut timer = FrameTimer::new(Duration::from_secs(3600));
        timer.tick();
        timer.tick();
        assert!(timer.take_fps().is_none());
    }

    #[test]
    fn test_fps_reported_after_interval() {
        let mut timer = FrameTimer::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        timer.tick();
        let fps = timer.take_fps().expect("interval elapsed");
        assert!(fps > 0.0);
        // Window was reset.
        assert!(timer.take_fps().is_none());
    }
}
