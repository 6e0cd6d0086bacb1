//! Broad phase collision detection algorithms
//! are responsible for detecting pairs of possibly intersecting objects
//! for further, more accurate narrow phase inspection.

use super::{grid::Grid, AABB};

/// A broad phase algorithm.
pub trait BroadPhase {
    /// Find pairs of indices into `aabbs` whose boxes overlap.
    ///
    /// Pairs are written into `out` (which is cleared first) as `[i, j]` with `i < j`,
    /// sorted lexicographically.
    fn pairs(&mut self, aabbs: &[AABB], out: &mut Vec<[usize; 2]>);
}

/// The simplest possible broad phase algorithm,
/// which tests every object against every other object.
/// Very inefficient, but can work for small systems.
#[derive(Clone, Copy, Debug, Default)]
pub struct BruteForce;

impl BroadPhase for BruteForce {
    fn pairs(&mut self, aabbs: &[AABB], out: &mut Vec<[usize; 2]>) {
        out.clear();
        for (i, a) in aabbs.iter().enumerate() {
            for (j, b) in aabbs.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    out.push([i, j]);
                }
            }
        }
    }
}

/// Selection of the broad phase algorithm used by a physics world.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum BroadPhaseKind {
    BruteForce,
    /// Uniform grid with the given cell size in metres.
    Grid { cell_size: f64 },
}

impl Default for BroadPhaseKind {
    fn default() -> Self {
        BroadPhaseKind::Grid { cell_size: 1.0 }
    }
}

impl BroadPhaseKind {
    pub(crate) fn build(self) -> Box<dyn BroadPhase> {
        match self {
            BroadPhaseKind::BruteForce => Box::new(BruteForce),
            BroadPhaseKind::Grid { cell_size } => Box::new(Grid::new(cell_size)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math as m;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_aabbs(count: usize, seed: u64) -> Vec<AABB> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let min = m::Vec2::new(rng.gen_range(-10.0..10.0), rng.gen_range(-5.0..5.0));
                let size = m::Vec2::new(rng.gen_range(0.05..2.5), rng.gen_range(0.05..2.5));
                AABB {
                    min,
                    max: min + size,
                }
            })
            .collect()
    }

    #[test]
    fn brute_force_finds_overlaps_in_order() {
        let aabbs = [
            AABB {
                min: m::Vec2::new(0.0, 0.0),
                max: m::Vec2::new(1.0, 1.0),
            },
            AABB {
                min: m::Vec2::new(5.0, 5.0),
                max: m::Vec2::new(6.0, 6.0),
            },
            AABB {
                min: m::Vec2::new(0.5, 0.5),
                max: m::Vec2::new(5.5, 5.5),
            },
        ];
        let mut pairs = Vec::new();
        BruteForce.pairs(&aabbs, &mut pairs);
        itertools::assert_equal(pairs, [[0, 2], [1, 2]]);
    }

    #[test]
    fn grid_matches_brute_force() {
        for (seed, cell_size) in [(1, 1.0), (2, 0.3), (3, 4.0)] {
            let aabbs = random_aabbs(150, seed);
            let mut expected = Vec::new();
            BruteForce.pairs(&aabbs, &mut expected);
            let mut actual = Vec::new();
            let mut grid = BroadPhaseKind::Grid { cell_size }.build();
            grid.pairs(&aabbs, &mut actual);
            assert!(!expected.is_empty());
            assert_eq!(expected, actual, "seed {seed}, cell size {cell_size}");

            // reusing the grid gives the same result
            grid.pairs(&aabbs, &mut actual);
            assert_eq!(expected, actual);
        }
    }
}
