use std::thread;
use std::time::{Duration, Instant};

/// Time source seam so pacing can be tested against a scripted clock.
pub trait Clock {
    fn now(&mut self) -> Instant;
    fn sleep(&mut self, d: Duration);
}

/// The real monotonic clock.
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, d: Duration) {
        thread::sleep(d);
    }
}

/// Keeps capture cycles on a fixed interval: after each cycle's work, sleep
/// for whatever remains of the interval, or not at all when the work ran
/// over. Overruns are not repaid later; the next cycle just starts late.
pub struct PacingController<C: Clock> {
    interval: Duration,
    clock: C,
    cycle_start: Option<Instant>,
}

impl<C: Clock> PacingController<C> {
    pub fn new(interval: Duration, clock: C) -> PacingController<C> {
        PacingController {
            interval,
            clock,
            cycle_start: None,
        }
    }

    /// Interval for a whole-frames-per-second target. Zero disables pacing.
    pub fn from_fps(fps: u32, clock: C) -> PacingController<C> {
        let interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / fps as u64)
        };
        PacingController::new(interval, clock)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn begin_cycle(&mut self) {
        self.cycle_start = Some(self.clock.now());
    }

    /// Sleep off the remainder of the interval. Returns the time slept,
    /// which is zero when the cycle ran at or over the interval.
    pub fn end_cycle(&mut self) -> Duration {
        let start = match self.cycle_start.take() {
            Some(s) => s,
            None => return Duration::ZERO,
        };
        let work = self.clock.now().saturating_duration_since(start);
        let remaining = self.interval.saturating_sub(work);
        if !remaining.is_zero() {
            self.clock.sleep(remaining);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedClock {
        origin: Instant,
        offset: Duration,
        slept: Vec<Duration>,
    }

    impl ScriptedClock {
        fn new() -> ScriptedClock {
            ScriptedClock {
                origin: Instant::now(),
                offset: Duration::ZERO,
                slept: Vec::new(),
            }
        }

        fn advance(&mut self, d: Duration) {
            self.offset += d;
        }
    }

    impl Clock for ScriptedClock {
        fn now(&mut self) -> Instant {
            self.origin + self.offset
        }

        fn sleep(&mut self, d: Duration) {
            self.slept.push(d);
            self.offset += d;
        }
    }

    #[test]
    fn sleeps_off_the_interval_remainder() {
        let mut pace = PacingController::new(Duration::from_millis(100), ScriptedClock::new());
        pace.begin_cycle();
        pace.clock.advance(Duration::from_millis(40));
        let slept = pace.end_cycle();
        assert_eq!(slept, Duration::from_millis(60));
        assert_eq!(pace.clock.slept, vec![Duration::from_millis(60)]);
    }

    #[test]
    fn no_sleep_when_the_cycle_overruns() {
        let mut pace = PacingController::new(Duration::from_millis(100), ScriptedClock::new());
        pace.begin_cycle();
        pace.clock.advance(Duration::from_millis(130));
        assert_eq!(pace.end_cycle(), Duration::ZERO);
        assert!(pace.clock.slept.is_empty());
    }

    #[test]
    fn exact_budget_does_not_sleep() {
        let mut pace = PacingController::new(Duration::from_millis(100), ScriptedClock::new());
        pace.begin_cycle();
        pace.clock.advance(Duration::from_millis(100));
        assert_eq!(pace.end_cycle(), Duration::ZERO);
    }

    #[test]
    fn zero_fps_disables_pacing() {
        let mut pace = PacingController::from_fps(0, ScriptedClock::new());
        assert_eq!(pace.interval(), Duration::ZERO);
        pace.begin_cycle();
        pace.clock.advance(Duration::from_millis(5));
        assert_eq!(pace.end_cycle(), Duration::ZERO);
        assert!(pace.clock.slept.is_empty());
    }

    #[test]
    fn fps_target_sets_the_interval() {
        let pace = PacingController::from_fps(10, ScriptedClock::new());
        assert_eq!(pace.interval(), Duration::from_millis(100));
    }

    #[test]
    fn end_without_begin_is_inert() {
        let mut pace = PacingController::new(Duration::from_millis(100), ScriptedClock::new());
        assert_eq!(pace.end_cycle(), Duration::ZERO);
        assert!(pace.clock.slept.is_empty());
    }
}
