mod aabb;
pub use aabb::AABB;

mod bitmatrix;

pub mod broadphase;
pub use broadphase::{BroadPhase, BroadPhaseKind, BruteForce};

pub mod grid;
pub use grid::Grid;

pub mod narrowphase;
pub use narrowphase::{intersection_check, Contact, ContactResult};

/// Rules for which bodies can collide with each other.
///
/// Two bodies in the same nonzero group always collide if the group is positive
/// and never collide if it's negative.
/// Otherwise they collide if each one's category is in the other's mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CollisionFilter {
    pub group: i32,
    pub category: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            group: 0,
            category: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionFilter {
    /// A filter for a group of bodies that never collide with each other,
    /// such as the parts of a ragdoll. `id` must be nonzero.
    pub fn non_colliding_group(id: i32) -> Self {
        Self {
            group: -id.saturating_abs().max(1),
            ..Default::default()
        }
    }

    pub fn can_collide(&self, other: &CollisionFilter) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        (self.mask & other.category) != 0 && (other.mask & self.category) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_groups_and_masks() {
        let default = CollisionFilter::default();
        assert!(default.can_collide(&default));

        let ragdoll = CollisionFilter::non_colliding_group(3);
        assert_eq!(ragdoll.group, -3);
        assert!(!ragdoll.can_collide(&ragdoll));
        assert!(ragdoll.can_collide(&default));
        let other_ragdoll = CollisionFilter::non_colliding_group(-4);
        assert!(ragdoll.can_collide(&other_ragdoll));

        let always = CollisionFilter {
            group: 2,
            mask: 0,
            ..Default::default()
        };
        assert!(always.can_collide(&always));
        assert!(!always.can_collide(&default));

        let only_category_2 = CollisionFilter {
            mask: 2,
            ..Default::default()
        };
        assert!(!only_category_2.can_collide(&default));
        let category_2 = CollisionFilter {
            category: 2,
            ..Default::default()
        };
        assert!(only_category_2.can_collide(&category_2));
    }
}
