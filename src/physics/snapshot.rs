//! Complete copies of a world's simulation state.

use super::{
    Body, Constraint, ConstraintBuilder, ConstraintError, PhysicsError, PhysicsWorld,
    TuningConstants,
};
use crate::math as m;

use std::collections::HashMap;

/// Everything needed to reconstruct a world and continue simulating it
/// with identical results.
///
/// Constraints refer to bodies by their index in `bodies`.
/// Event subscriptions aren't part of a snapshot.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldSnapshot {
    #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_vec2"))]
    pub gravity: m::Vec2,
    pub time_scale: f64,
    #[cfg_attr(feature = "serde-types", serde(default))]
    pub tuning: TuningConstants,
    pub bodies: Vec<Body>,
    pub constraints: Vec<Constraint<usize>>,
}

impl PhysicsWorld {
    /// Copy the state of every body and constraint.
    pub fn snapshot(&self) -> WorldSnapshot {
        let index_of: HashMap<_, _> = self
            .bodies()
            .enumerate()
            .map(|(idx, (key, _))| (key, idx))
            .collect();
        WorldSnapshot {
            gravity: self.gravity,
            time_scale: self.time_scale,
            tuning: self.tuning,
            bodies: self.bodies().map(|(_, body)| body.clone()).collect(),
            constraints: self
                .constraints()
                .filter_map(|(_, c)| c.map_bodies(|b| index_of.get(&b).copied().ok_or(())).ok())
                .collect(),
        }
    }

    /// Build a world from a snapshot.
    ///
    /// Fails without creating anything if a body has an invalid mass or state,
    /// or a constraint is invalid or refers to a body that isn't in the snapshot.
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Result<Self, PhysicsError> {
        let body_count = snapshot.bodies.len();
        for (idx, body) in snapshot.bodies.iter().enumerate() {
            if !(body.mass().is_valid() && body.moment_of_inertia().is_valid()) {
                return Err(PhysicsError::InvalidMass(idx));
            }
            if body.is_static() && body.inverse_mass() != 0.0 {
                return Err(PhysicsError::InvalidMass(idx));
            }
            if !body.is_finite() {
                return Err(PhysicsError::NonFinite("body state"));
            }
        }
        for c in &snapshot.constraints {
            ConstraintBuilder::new(c.a)
                .with_b(c.b)
                .with_length(c.length)
                .with_stiffness(c.stiffness)
                .with_damping(c.damping)
                .validate()?;
            for idx in [c.a.body_ref(), c.b.body_ref()].into_iter().flatten() {
                if *idx >= body_count {
                    return Err(ConstraintError::UnknownMember(*idx, body_count).into());
                }
            }
        }

        let mut world =
            PhysicsWorld::new(snapshot.gravity, snapshot.time_scale).with_tuning(snapshot.tuning);
        let keys: Vec<_> = snapshot
            .bodies
            .into_iter()
            .map(|body| world.entities.insert_body(body))
            .collect();
        for c in snapshot.constraints {
            // indices were checked above
            if let Ok(c) = c.map_bodies(|idx| keys.get(idx).copied().ok_or(())) {
                world.entities.insert_constraint(c);
            }
        }
        log::debug!(
            "Restored a world with {} bodies and {} constraints",
            world.body_count(),
            world.constraint_count()
        );
        Ok(world)
    }
}

#[cfg(all(test, feature = "serde-types"))]
mod tests {
    use super::*;
    use crate::{
        math::Angle,
        physics::{Anchor, Material, Shape},
    };

    fn build_world() -> PhysicsWorld {
        let mut world = PhysicsWorld::default();
        world.add_body(Body::new_static(
            Shape::rect(12.0, 0.5).unwrap(),
            m::Vec2::new(6.0, 0.0),
        ));
        for row in 0..5 {
            for col in 0..3 {
                world.add_body(
                    Body::new(
                        Shape::rect(0.6, 0.6).unwrap(),
                        m::Vec2::new(4.0 + col as f64 * 0.62, 0.6 + row as f64 * 0.61),
                    )
                    .with_angle(Angle::Deg(row as f64 * 3.0)),
                );
            }
        }
        let bob = world.add_body(
            Body::new(Shape::circle(0.3).unwrap(), m::Vec2::new(8.0, 5.0))
                .with_material(Material::default().with_restitution(0.9)),
        );
        world
            .add_constraint(
                ConstraintBuilder::new(Anchor::body(bob))
                    .with_b(Anchor::world(m::Vec2::new(10.0, 7.5)))
                    .with_stiffness(0.1)
                    .with_damping(0.05),
            )
            .unwrap();
        world
    }

    fn poses(world: &PhysicsWorld) -> Vec<(m::Vec2, f64)> {
        world
            .bodies()
            .map(|(_, b)| (b.position(), b.angle()))
            .collect()
    }

    #[test]
    fn ron_roundtrip_reproduces_trajectory() {
        let mut world = build_world();
        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }

        let text = ron::to_string(&world.snapshot()).unwrap();
        let snapshot: WorldSnapshot = ron::from_str(&text).unwrap();
        let mut restored = PhysicsWorld::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.body_count(), world.body_count());
        assert_eq!(restored.constraint_count(), 1);
        assert_eq!(poses(&restored), poses(&world));

        for _ in 0..60 {
            world.step(1.0 / 60.0);
            restored.step(1.0 / 60.0);
        }
        assert_eq!(poses(&restored), poses(&world));
    }

    #[test]
    fn bodies_with_bad_mass_or_state_are_rejected() {
        let mut snapshot = build_world().snapshot();
        snapshot.bodies[3].mass = ron::from_str("Finite(mass: 2.0, inverse: -0.5)").unwrap();
        assert_eq!(
            PhysicsWorld::from_snapshot(snapshot).err(),
            Some(PhysicsError::InvalidMass(3))
        );

        let mut snapshot = build_world().snapshot();
        snapshot.bodies[2].pose.translation.x = f64::NAN;
        assert_eq!(
            PhysicsWorld::from_snapshot(snapshot).err(),
            Some(PhysicsError::NonFinite("body state"))
        );
    }

    #[test]
    fn invalid_constraint_index_is_rejected() {
        let mut snapshot = build_world().snapshot();
        snapshot.constraints[0].a = Anchor::body(99);
        let count = snapshot.bodies.len();
        assert_eq!(
            PhysicsWorld::from_snapshot(snapshot).err(),
            Some(PhysicsError::InvalidConstraint(
                ConstraintError::UnknownMember(99, count)
            ))
        );
    }
}
