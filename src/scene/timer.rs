/// A repeating timer driven by simulation time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timer {
    /// Seconds between firings.
    pub interval: f64,
    /// Seconds since the last firing.
    pub elapsed: f64,
}

impl Timer {
    pub fn new(interval: f64) -> Self {
        Self {
            interval: interval.max(f64::EPSILON),
            elapsed: 0.0,
        }
    }

    /// Advance by `dt` and return how many times the timer fired.
    pub fn tick(&mut self, dt: f64) -> usize {
        self.elapsed += dt.max(0.0);
        let mut fired = 0;
        while self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            fired += 1;
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_interval() {
        let mut timer = Timer::new(1.0);
        assert_eq!(timer.tick(0.6), 0);
        assert_eq!(timer.tick(0.6), 1);
        assert!((timer.elapsed - 0.2).abs() < 1e-12);
        assert_eq!(timer.tick(2.5), 2);
        assert_eq!(timer.tick(-1.0), 0);
    }
}
