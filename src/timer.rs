use std::time::{Duration, Instant};

/// Elapsed time of the current phase, minus any paused intervals.
///
/// Used to keep instrumentation (printing ping times, dumping stats) out of
/// throughput figures.
#[derive(Debug, Clone)]
pub struct PhaseTimer {
    started: Instant,
    paused: Duration,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            paused: Duration::ZERO,
        }
    }

    pub fn restart(&mut self) {
        self.started = Instant::now();
        self.paused = Duration::ZERO;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed().saturating_sub(self.paused)
    }

    pub fn paused(&self) -> Duration {
        self.paused
    }

    /// Exclude everything until the returned guard is dropped.
    pub fn pause(&mut self) -> Pause<'_> {
        Pause {
            timer: self,
            since: Instant::now(),
        }
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::start()
    }
}

/// Scope guard returned by [`PhaseTimer::pause`]. The pause ends on drop,
/// including early returns and unwinding.
#[must_use = "the pause ends as soon as the guard is dropped"]
pub struct Pause<'a> {
    timer: &'a mut PhaseTimer,
    since: Instant,
}

impl Drop for Pause<'_> {
    fn drop(&mut self) {
        self.timer.paused += self.since.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn pause_is_excluded() {
        let mut t = PhaseTimer::start();
        {
            let _p = t.pause();
            sleep(Duration::from_millis(40));
        }
        assert!(t.paused() >= Duration::from_millis(40));
        assert!(t.elapsed() < Duration::from_millis(40));
    }

    #[test]
    fn pause_accumulates_on_early_return() {
        fn work(t: &mut PhaseTimer, bail: bool) -> Result<(), ()> {
            let _p = t.pause();
            sleep(Duration::from_millis(5));
            if bail {
                return Err(());
            }
            Ok(())
        }
        let mut t = PhaseTimer::start();
        assert!(work(&mut t, true).is_err());
        let first = t.paused();
        assert!(first >= Duration::from_millis(5));
        work(&mut t, false).unwrap();
        assert!(t.paused() >= first + Duration::from_millis(5));
    }

    #[test]
    fn restart_clears_pauses() {
        let mut t = PhaseTimer::start();
        drop(t.pause());
        sleep(Duration::from_millis(2));
        t.restart();
        assert_eq!(t.paused(), Duration::ZERO);
    }
}
