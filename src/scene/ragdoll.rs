//! Humanoid figures made of boxes and a ball, joined at the neck, shoulders,
//! elbows, hips and knees.

use crate::{
    math as m,
    physics::{
        composite::{Attach, CompositeDesc},
        Anchor, Body, CollisionFilter, ConstraintBuilder, Material, PhysicsError, Shape,
    },
};

pub const PART_COUNT: usize = 10;
pub const JOINT_COUNT: usize = 9;

const JOINT_STIFFNESS: f64 = 0.8;
const FRICTION: f64 = 0.8;
const AIR_FRICTION: f64 = 3.0;

/// Describe a ragdoll with its torso centered at `position`.
///
/// A scale of one makes a figure about two and a half metres tall.
/// Parts of the same ragdoll never collide with each other;
/// give each ragdoll its own nonzero `group` to keep them
/// colliding with other ragdolls.
pub fn ragdoll(position: m::Vec2, scale: f64, group: i32) -> Result<CompositeDesc, PhysicsError> {
    let filter = CollisionFilter::non_colliding_group(group);
    let s = scale;
    let part = |shape: Shape, x: f64, y: f64, density: f64| {
        Body::new(shape, position + m::Vec2::new(x, y) * s)
            .with_material(
                Material::default()
                    .with_density(density)
                    .with_friction(FRICTION)
                    .with_air_friction(AIR_FRICTION),
            )
            .with_filter(filter)
    };

    let mut desc = CompositeDesc::new("ragdoll");
    let head = desc.add_body(part(Shape::circle(0.3 * s)?, 0.0, 0.6, 1.0).with_label("head"));
    let torso =
        desc.add_body(part(Shape::rect(0.4 * s, 0.8 * s)?, 0.0, 0.0, 1.0).with_label("torso"));

    let mut limbs = Vec::with_capacity(4);
    for side in [1.0, -1.0] {
        let upper_arm = desc.add_body(part(Shape::rect(0.6 * s, 0.2 * s)?, 0.4 * side, 0.2, 0.5));
        let lower_arm = desc.add_body(part(Shape::rect(0.6 * s, 0.15 * s)?, 0.8 * side, 0.2, 0.4));
        limbs.push((side, upper_arm, lower_arm, true));
    }
    for side in [1.0, -1.0] {
        let upper_leg = desc.add_body(part(Shape::rect(0.2 * s, 0.6 * s)?, 0.2 * side, -0.6, 0.6));
        let lower_leg = desc.add_body(part(Shape::rect(0.18 * s, 0.6 * s)?, 0.2 * side, -1.1, 0.5));
        limbs.push((side, upper_leg, lower_leg, false));
    }

    let mut joint = |a: usize, a_offset: (f64, f64), b: usize, b_offset: (f64, f64)| {
        desc.add_constraint(
            ConstraintBuilder::new(Anchor::body_point(
                Attach::Member(a),
                m::Vec2::new(a_offset.0, a_offset.1) * s,
            ))
            .with_b(Anchor::body_point(
                Attach::Member(b),
                m::Vec2::new(b_offset.0, b_offset.1) * s,
            ))
            .with_stiffness(JOINT_STIFFNESS),
        );
    };

    joint(head, (0.0, -0.25), torso, (0.0, 0.35));
    for (side, upper, lower, is_arm) in limbs {
        if is_arm {
            joint(torso, (0.2 * side, 0.3), upper, (-0.25 * side, 0.0));
            joint(upper, (0.25 * side, 0.0), lower, (-0.2 * side, 0.0));
        } else {
            joint(torso, (0.15 * side, -0.35), upper, (0.0, 0.25));
            joint(upper, (0.0, -0.25), lower, (0.0, 0.25));
        }
    }

    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PhysicsWorld;

    #[test]
    fn ragdoll_parts_and_joints() {
        let desc = ragdoll(m::Vec2::new(3.0, 4.0), 0.5, 3).unwrap();
        assert_eq!(desc.body_count(), PART_COUNT);
        assert_eq!(desc.constraints.len(), JOINT_COUNT);
        assert!(desc
            .bodies
            .iter()
            .all(|b| b.filter == CollisionFilter::non_colliding_group(3)));

        let mut world = PhysicsWorld::default();
        let composite = world.add_composite(desc).unwrap();
        assert_eq!(composite.bodies.len(), PART_COUNT);
        assert_eq!(world.constraint_count(), JOINT_COUNT);
        let torso = world.body(composite.bodies[1]).unwrap();
        assert_eq!(torso.position(), m::Vec2::new(3.0, 4.0));
        let head = world.body(composite.bodies[0]).unwrap();
        assert!(head.position().y > torso.position().y);
    }

    #[test]
    fn invalid_scale_is_an_error() {
        assert!(ragdoll(m::Vec2::zero(), 0.0, 1).is_err());
    }
}
