use super::{collision::BroadPhaseKind, CombineRule};

/// Parameters tweaking the behavior of the physics solver.
///
/// Can be loaded from a RON file with the `serde-types` feature,
/// missing fields taking their default values.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TuningConstants {
    /// Number of substeps per step. More substeps give stiffer constraints
    /// and more stable stacks at the cost of performance.
    pub substeps: usize,
    /// Number of position solver passes per substep.
    pub iterations: usize,
    pub restitution_rule: CombineRule,
    pub friction_rule: CombineRule,
    pub broad_phase: BroadPhaseKind,
    /// Scales the normal speed below which contacts don't bounce.
    /// The speed is relative to the velocity gained from external forces in one substep.
    pub restitution_threshold_scale: f64,
}

impl Default for TuningConstants {
    fn default() -> Self {
        Self {
            substeps: 8,
            iterations: 1,
            restitution_rule: CombineRule::Max,
            friction_rule: CombineRule::Min,
            broad_phase: BroadPhaseKind::default(),
            restitution_threshold_scale: 1.0,
        }
    }
}

impl TuningConstants {
    pub fn with_substeps(mut self, substeps: usize) -> Self {
        self.substeps = substeps.max(1);
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    pub fn with_restitution_rule(mut self, rule: CombineRule) -> Self {
        self.restitution_rule = rule;
        self
    }

    pub fn with_friction_rule(mut self, rule: CombineRule) -> Self {
        self.friction_rule = rule;
        self
    }

    pub fn with_broad_phase(mut self, broad_phase: BroadPhaseKind) -> Self {
        self.broad_phase = broad_phase;
        self
    }

    pub fn with_restitution_threshold_scale(mut self, scale: f64) -> Self {
        self.restitution_threshold_scale = scale.max(0.0);
        self
    }

    /// Substep and iteration counts with zeroes replaced by one,
    /// in case the fields were edited directly.
    #[inline]
    pub(crate) fn counts(&self) -> (usize, usize) {
        (self.substeps.max(1), self.iterations.max(1))
    }
}

#[cfg(all(test, feature = "serde-types"))]
mod tests {
    use super::*;

    #[test]
    fn load_partial_ron() {
        let tuning: TuningConstants = ron::from_str(
            "(substeps: 4, friction_rule: Average, broad_phase: Grid(cell_size: 2.5))",
        )
        .unwrap();
        assert_eq!(tuning.substeps, 4);
        assert_eq!(tuning.iterations, 1);
        assert_eq!(tuning.friction_rule, CombineRule::Average);
        assert_eq!(tuning.restitution_rule, CombineRule::Max);
        assert_eq!(tuning.broad_phase, BroadPhaseKind::Grid { cell_size: 2.5 });
    }

    #[test]
    fn counts_never_zero() {
        let mut tuning = TuningConstants::default().with_substeps(0);
        assert_eq!(tuning.substeps, 1);
        tuning.iterations = 0;
        assert_eq!(tuning.counts(), (1, 1));
    }
}
