//! Fixed timestep driving of a physics world from real elapsed time.

use crate::physics::PhysicsWorld;

use std::time::Duration;

// time snapping technique from Tyler Glaiel's blog post
// https://medium.com/@tglaiel/how-to-make-your-game-run-at-60fps-24c61210fe75
const NANOS_120FPS: u128 = 1_000_000_000 / 120;
const NANOS_60FPS: u128 = 1_000_000_000 / 60;
const NANOS_30FPS: u128 = 1_000_000_000 / 30;
const NANOS_20FPS: u128 = 1_000_000_000 / 20;
const NANOS_15FPS: u128 = 1_000_000_000 / 15;
const SNAP_THRESHOLD: u128 = 200_000;

const MAX_ACC_VALUE: u128 = 1_000_000_000 / 8;

fn should_snap(dt: u128, target: u128) -> bool {
    if dt < target {
        target - dt < SNAP_THRESHOLD
    } else {
        dt - target < SNAP_THRESHOLD
    }
}

/// There's some inaccuracy in frame timings when vsynced,
/// so pretend frame timing is exact if it's close to a common refresh rate.
fn snap_to_refresh_rate(dt: u128) -> u128 {
    [
        NANOS_120FPS,
        NANOS_60FPS,
        NANOS_30FPS,
        NANOS_20FPS,
        NANOS_15FPS,
    ]
    .into_iter()
    .find(|&target| should_snap(dt, target))
    .unwrap_or(dt)
}

/// Runs whole fixed-length steps as real time passes.
///
/// ```
/// let mut world = tumble::PhysicsWorld::default();
/// let mut runner = tumble::Runner::new(60);
/// let steps = runner.advance(&mut world, std::time::Duration::from_millis(50));
/// assert_eq!(steps, 3);
/// ```
#[derive(Debug)]
pub struct Runner {
    nanos_per_step: u128,
    dt: f64,
    acc: u128,
    prev_time: Option<instant::Instant>,
}

impl Runner {
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            nanos_per_step: 1_000_000_000 / u128::from(fps),
            dt: 1.0 / fps as f64,
            acc: 0,
            prev_time: None,
        }
    }

    /// Length of one step in seconds.
    #[inline]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Run as many steps of `world` as fit into the accumulated time.
    /// Returns the number of steps run.
    pub fn advance(&mut self, world: &mut PhysicsWorld, elapsed: Duration) -> usize {
        self.advance_with(elapsed, |dt| world.step(dt))
    }

    /// Like [`advance`][Self::advance], but call a function instead of stepping a world.
    /// Useful when something else needs to happen on every step,
    /// like a scene running its timers.
    pub fn advance_with(&mut self, elapsed: Duration, mut tick: impl FnMut(f64)) -> usize {
        self.acc += snap_to_refresh_rate(elapsed.as_nanos());
        // limit acc to prevent spiral of death
        if self.acc > MAX_ACC_VALUE {
            log::trace!("Simulation falling behind, dropping time");
            self.acc = MAX_ACC_VALUE;
        }

        let mut steps = 0;
        while self.acc >= self.nanos_per_step {
            tick(self.dt);
            self.acc -= self.nanos_per_step;
            steps += 1;
        }
        steps
    }

    /// Advance by the wall clock time elapsed since the previous call.
    /// The first call only starts the clock.
    pub fn advance_realtime(&mut self, world: &mut PhysicsWorld) -> usize {
        let now = instant::Instant::now();
        let elapsed = match self.prev_time.replace(now) {
            Some(prev) => now.duration_since(prev),
            None => return 0,
        };
        self.advance(world, elapsed)
    }

    /// Forget accumulated time, e.g. after the simulation was paused.
    pub fn reset(&mut self) {
        self.acc = 0;
        self.prev_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_steps_and_remainder() {
        let mut runner = Runner::new(60);
        let mut world = PhysicsWorld::default();
        assert_eq!(runner.advance(&mut world, Duration::from_millis(10)), 0);
        assert_eq!(runner.advance(&mut world, Duration::from_millis(10)), 1);
        // vsync snapping makes slightly long frames count as exactly one step
        let almost_frame = Duration::from_nanos(1_000_000_000 / 60 + 100_000);
        runner.reset();
        let steps: usize = (0..60)
            .map(|_| runner.advance(&mut world, almost_frame))
            .sum();
        assert_eq!(steps, 60);
    }

    #[test]
    fn long_frames_are_capped() {
        let mut runner = Runner::new(60);
        let mut dts = Vec::new();
        let steps = runner.advance_with(Duration::from_secs(5), |dt| dts.push(dt));
        // at most an eighth of a second is simulated at once
        assert_eq!(steps, 7);
        assert!(dts.iter().all(|&dt| (dt - 1.0 / 60.0).abs() < 1e-12));
    }
}
