//! Substep solver based on Extended Position Based Dynamics.
//!
//! Each substep predicts new poses from velocities, moves bodies directly to satisfy
//! constraints and contacts, derives velocities back from the change in pose,
//! and finally applies velocity-level effects like restitution and friction.

use super::{
    collision::{intersection_check, ContactResult},
    Anchor, Body, Constraint, Shape, Velocity,
};
use crate::math::{self as m, Pose};

use itertools::izip;

/// Values of a body the solver needs, gathered once per step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BodyParams {
    pub inv_mass: f64,
    pub inv_inertia: f64,
    pub is_static: bool,
    /// Acceleration from gravity and applied forces.
    pub ext_accel: m::Vec2,
    /// Angular acceleration from applied torque.
    pub ext_ang_accel: f64,
    pub air_friction: f64,
}

impl BodyParams {
    pub fn new(body: &Body, world_gravity: m::Vec2) -> Self {
        if body.is_static() {
            return Self {
                inv_mass: 0.0,
                inv_inertia: 0.0,
                is_static: true,
                ext_accel: m::Vec2::zero(),
                ext_ang_accel: 0.0,
                air_friction: 0.0,
            };
        }
        let inv_mass = body.inverse_mass();
        let inv_inertia = body.inverse_moment_of_inertia();
        let (force, torque) = body.accumulated_force();
        Self {
            inv_mass,
            inv_inertia,
            is_static: false,
            ext_accel: body.gravity.acceleration(world_gravity) + force * inv_mass,
            ext_ang_accel: torque * inv_inertia,
            air_friction: body.material.air_friction,
        }
    }

    /// Inverse mass felt by an impulse at offset `r` in direction `dir`.
    #[inline]
    fn effective_inv_mass(&self, r: m::Vec2, dir: m::Vec2) -> f64 {
        self.inv_mass + m::cross(r, dir).powi(2) * self.inv_inertia
    }
}

/// A pair of bodies that may be in contact, with their combined material.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PairParams {
    pub bodies: [usize; 2],
    pub restitution: f64,
    pub friction: f64,
    pub slop: f64,
}

/// View into the working buffers created in `PhysicsWorld::step`.
/// Everything is indexed by the position of a body in `params`.
pub(crate) struct DataView<'a> {
    /// Length of one substep.
    pub dt: f64,
    pub inv_dt: f64,
    /// Number of position solver passes per substep.
    pub iterations: usize,
    /// `1 / (substeps * iterations)`, used to spread stiffness over every pass.
    pub correction_exponent: f64,
    /// `1 / substeps`, used to spread damping over the substeps.
    pub damping_exponent: f64,
    pub restitution_threshold_scale: f64,
    pub params: &'a [BodyParams],
    pub shapes: &'a [&'a Shape],
    pub old_poses: &'a mut [Pose],
    pub poses: &'a mut [Pose],
    pub old_velocities: &'a mut [Velocity],
    pub velocities: &'a mut [Velocity],
    pub constraints: &'a [Constraint<usize>],
    pub pairs: &'a [PairParams],
    pub contacts: &'a mut [ContactResult],
    /// Latest nonzero contact of each pair during the step, for collision events.
    pub last_contacts: &'a mut [ContactResult],
    pub contact_lambdas: &'a mut [[f64; 2]],
}

/// Run one substep.
pub(crate) fn substep(data: &mut DataView<'_>) {
    integrate(data);
    detect_contacts(data);
    for _ in 0..data.iterations {
        if !data.constraints.is_empty() {
            solve_constraints(data);
        }
        if !data.pairs.is_empty() {
            solve_contacts(data);
        }
    }
    update_velocities(data);
    if !data.pairs.is_empty() {
        contact_velocity_step(data);
    }
    if !data.constraints.is_empty() {
        constraint_damping(data);
    }
}

//
// Prediction
//

fn integrate(data: &mut DataView<'_>) {
    let _span = tracy_span!("integrate", "integrate");

    for (params, old_pose, pose, old_vel, vel) in izip!(
        data.params,
        &mut *data.old_poses,
        &mut *data.poses,
        &mut *data.old_velocities,
        &mut *data.velocities
    ) {
        *old_pose = *pose;
        if params.is_static {
            *vel = Velocity::default();
            *old_vel = *vel;
            continue;
        }

        // semi-implicit Euler: velocity first, then pose from the new velocity
        vel.linear += params.ext_accel * data.dt;
        vel.angular += params.ext_ang_accel * data.dt;
        let drag = 1.0 / (1.0 + params.air_friction * data.dt);
        *vel = *vel * drag;

        // old_vel is velocity after external forces but before collisions
        *old_vel = *vel;
        *pose = vel.apply_to_pose(data.dt, *pose);
    }
}

//
// Narrow phase
//

fn detect_contacts(data: &mut DataView<'_>) {
    let _span = tracy_span!("narrow phase", "detect_contacts");

    let poses = &*data.poses;
    let shapes = data.shapes;
    let check = |pair: &PairParams| {
        let [i, j] = pair.bodies;
        intersection_check(&poses[i], shapes[i], &poses[j], shapes[j])
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        data.pairs
            .par_iter()
            .zip(data.contacts.par_iter_mut())
            .for_each(|(pair, contact)| *contact = check(pair));
    }
    #[cfg(not(feature = "parallel"))]
    for (pair, contact) in izip!(data.pairs, &mut *data.contacts) {
        *contact = check(pair);
    }

    for (contact, last_contact, lambdas) in izip!(
        &*data.contacts,
        &mut *data.last_contacts,
        &mut *data.contact_lambdas
    ) {
        *lambdas = [0.0; 2];
        if !contact.is_zero() {
            *last_contact = *contact;
        }
    }
}

//
// Solve constraints
//

#[inline]
fn anchor_position(anchor: &Anchor<usize>, poses: &[Pose]) -> m::Vec2 {
    match anchor {
        Anchor::World(p) => *p,
        Anchor::Body { body, offset } => poses[*body] * *offset,
    }
}

/// Offset of an anchor from its body's center of mass, rotated to world orientation.
#[inline]
fn anchor_offset_rotated(anchor: &Anchor<usize>, poses: &[Pose]) -> m::Vec2 {
    match anchor {
        Anchor::World(_) => m::Vec2::zero(),
        Anchor::Body { body, offset } => poses[*body].rotation * *offset,
    }
}

/// Move a body as if a positional impulse `p` was applied at offset `r`.
#[inline]
fn apply_correction(pose: &mut Pose, params: &BodyParams, r: m::Vec2, p: m::Vec2) {
    pose.append_translation(params.inv_mass * p);
    pose.prepend_rotation(m::Angle::Rad(params.inv_inertia * m::cross(r, p)).into());
}

#[inline]
fn apply_impulse(vel: &mut Velocity, params: &BodyParams, r: m::Vec2, p: m::Vec2) {
    vel.linear += params.inv_mass * p;
    vel.angular += params.inv_inertia * m::cross(r, p);
}

fn solve_constraints(data: &mut DataView<'_>) {
    let _span = tracy_span!("solve constraints", "solve_constraints");

    for constraint in data.constraints {
        let pos_a = anchor_position(&constraint.a, data.poses);
        let pos_b = anchor_position(&constraint.b, data.poses);
        let dist = pos_b - pos_a;
        let dist_mag = dist.mag();
        let error = dist_mag - constraint.length;
        if error == 0.0 {
            continue;
        }
        let dir = if dist_mag != 0.0 {
            dist / dist_mag
        } else {
            m::Vec2::unit_y()
        };

        let bodies = [constraint.a.body_ref().copied(), constraint.b.body_ref().copied()];
        let offsets = [
            anchor_offset_rotated(&constraint.a, data.poses),
            anchor_offset_rotated(&constraint.b, data.poses),
        ];
        let eff_inv_mass: f64 = izip!(&bodies, &offsets)
            .map(|(b, r)| b.map_or(0.0, |b| data.params[b].effective_inv_mass(*r, dir)))
            .sum();
        // both ends immovable, nothing to do
        if eff_inv_mass <= 0.0 {
            continue;
        }

        let stiffness = 1.0 - (1.0 - constraint.stiffness).powf(data.correction_exponent);
        // positive when stretched, pulling a towards b
        let lambda = stiffness * error / eff_inv_mass;

        if let Some(a) = bodies[0] {
            apply_correction(&mut data.poses[a], &data.params[a], offsets[0], lambda * dir);
        }
        if let Some(b) = bodies[1] {
            apply_correction(&mut data.poses[b], &data.params[b], offsets[1], -lambda * dir);
        }
    }
}

//
// Solve contacts
//

fn solve_contacts(data: &mut DataView<'_>) {
    let _span = tracy_span!("solve contacts", "solve_contacts");

    for (pair, contacts, lambdas) in izip!(
        data.pairs,
        &*data.contacts,
        &mut *data.contact_lambdas
    ) {
        let [i, j] = pair.bodies;
        let params = [&data.params[i], &data.params[j]];

        for (contact, lambda_n) in contacts.iter().zip(lambdas.iter_mut()) {
            let normal = *contact.normal;

            // we can't use the depth from collision detection directly because
            // earlier position corrections can change it,
            // thus we compute depth here from the points on each object's surface
            let r = [
                data.poses[i].rotation * contact.offsets[0],
                data.poses[j].rotation * contact.offsets[1],
            ];
            let depth = ((data.poses[i].translation + r[0]) - (data.poses[j].translation + r[1]))
                .dot(normal);
            let error = depth - pair.slop;
            if error <= 0.0 {
                continue;
            }

            let w_n = params[0].effective_inv_mass(r[0], normal)
                + params[1].effective_inv_mass(r[1], normal);
            if w_n <= 0.0 {
                continue;
            }
            let d_lambda_n = -error / w_n;
            *lambda_n += d_lambda_n;
            apply_correction(&mut data.poses[i], params[0], r[0], d_lambda_n * normal);
            apply_correction(&mut data.poses[j], params[1], r[1], -d_lambda_n * normal);

            // static friction

            if pair.friction <= 0.0 {
                continue;
            }
            let tangent = m::left_normal(normal);
            let r = [
                data.poses[i].rotation * contact.offsets[0],
                data.poses[j].rotation * contact.offsets[1],
            ];
            let motion = [
                data.poses[i] * contact.offsets[0] - data.old_poses[i] * contact.offsets[0],
                data.poses[j] * contact.offsets[1] - data.old_poses[j] * contact.offsets[1],
            ];
            let motion_along_tan = (motion[0] - motion[1]).dot(tangent);
            let w_t = params[0].effective_inv_mass(r[0], tangent)
                + params[1].effective_inv_mass(r[1], tangent);
            if w_t <= 0.0 {
                continue;
            }
            let lambda_t = -motion_along_tan / w_t;

            // only stick if the tangential correction is inside the friction cone
            if lambda_t.abs() <= pair.friction * lambda_n.abs() {
                apply_correction(&mut data.poses[i], params[0], r[0], lambda_t * tangent);
                apply_correction(&mut data.poses[j], params[1], r[1], -lambda_t * tangent);
            }
        }
    }
}

//
// Velocity update
//

fn update_velocities(data: &mut DataView<'_>) {
    for (params, old_pose, pose, vel) in izip!(
        data.params,
        &*data.old_poses,
        &*data.poses,
        &mut *data.velocities
    ) {
        if params.is_static {
            continue;
        }
        vel.linear = (pose.translation - old_pose.translation) * data.inv_dt;
        vel.angular =
            m::Angle::from(pose.rotation * old_pose.rotation.reversed()).rad() * data.inv_dt;
    }
}

//
// Contact velocity step
//

fn contact_velocity_step(data: &mut DataView<'_>) {
    let _span = tracy_span!("contact velocity step", "contact_velocity_step");

    for (pair, contacts, lambdas) in izip!(data.pairs, &*data.contacts, &*data.contact_lambdas) {
        let [i, j] = pair.bodies;
        let params = [&data.params[i], &data.params[j]];

        for (contact, &lambda_n) in contacts.iter().zip(lambdas.iter()) {
            // contacts that weren't corrected this substep don't push back
            if lambda_n == 0.0 {
                continue;
            }
            let normal = *contact.normal;
            let r = [
                data.poses[i].rotation * contact.offsets[0],
                data.poses[j].rotation * contact.offsets[1],
            ];

            let relative_vel = data.velocities[i].point_velocity(r[0])
                - data.velocities[j].point_velocity(r[1]);

            // restitution

            let normal_vel = relative_vel.dot(normal);
            let old_relative_vel = data.old_velocities[i].point_velocity(r[0])
                - data.old_velocities[j].point_velocity(r[1]);
            let old_normal_vel = old_relative_vel.dot(normal);
            let ext_accel = (params[0].ext_accel - params[1].ext_accel).mag()
                * data.restitution_threshold_scale;
            let restitution = if old_normal_vel.abs() < data.dt * ext_accel {
                // don't bounce if the normal velocity is very small to avoid jitter
                0.0
            } else {
                pair.restitution
            };
            let delta_normal_vel = -normal_vel - restitution * old_normal_vel.max(0.0);

            // dynamic friction

            let tangent = m::left_normal(normal);
            let delta_tan_vel = if pair.friction > 0.0 {
                let tangent_vel = relative_vel.dot(tangent);
                let w_t = params[0].effective_inv_mass(r[0], tangent)
                    + params[1].effective_inv_mass(r[1], tangent);
                // Coulomb limit on the friction impulse, converted to a velocity change
                let max_coulomb_dv = pair.friction * lambda_n.abs() * data.inv_dt * w_t;
                -tangent_vel.signum() * tangent_vel.abs().min(max_coulomb_dv)
            } else {
                0.0
            };

            // apply impulse

            let total_vel_update = delta_normal_vel * normal + delta_tan_vel * tangent;
            let vel_update_mag = total_vel_update.mag();
            if vel_update_mag < 0.0001 {
                continue;
            }
            let vel_update_dir = total_vel_update / vel_update_mag;
            let w = params[0].effective_inv_mass(r[0], vel_update_dir)
                + params[1].effective_inv_mass(r[1], vel_update_dir);
            if w <= 0.0 {
                continue;
            }
            let impulse = (vel_update_mag / w) * vel_update_dir;

            apply_impulse(&mut data.velocities[i], params[0], r[0], impulse);
            apply_impulse(&mut data.velocities[j], params[1], r[1], -impulse);
        }
    }
}

//
// Constraint damping
//

fn constraint_damping(data: &mut DataView<'_>) {
    let _span = tracy_span!("constraint damping", "constraint_damping");

    for constraint in data.constraints {
        if constraint.damping <= 0.0 {
            continue;
        }
        let dist = anchor_position(&constraint.b, data.poses)
            - anchor_position(&constraint.a, data.poses);
        let Some(dir) = m::Unit::try_new(dist, 1e-9) else {
            continue;
        };
        let dir = *dir;

        let bodies = [constraint.a.body_ref().copied(), constraint.b.body_ref().copied()];
        let offsets = [
            anchor_offset_rotated(&constraint.a, data.poses),
            anchor_offset_rotated(&constraint.b, data.poses),
        ];
        let point_vels = map_pair(&[0, 1], |&i| {
            bodies[i].map_or(m::Vec2::zero(), |b| {
                data.velocities[b].point_velocity(offsets[i])
            })
        });
        let relative_vel = (point_vels[1] - point_vels[0]).dot(dir);
        let eff_inv_mass: f64 = izip!(&bodies, &offsets)
            .map(|(b, r)| b.map_or(0.0, |b| data.params[b].effective_inv_mass(*r, dir)))
            .sum();
        if eff_inv_mass <= 0.0 {
            continue;
        }

        let damping = 1.0 - (1.0 - constraint.damping).powf(data.damping_exponent);
        let impulse = (-damping * relative_vel / eff_inv_mass) * dir;

        if let Some(a) = bodies[0] {
            apply_impulse(&mut data.velocities[a], &data.params[a], offsets[0], -impulse);
        }
        if let Some(b) = bodies[1] {
            apply_impulse(&mut data.velocities[b], &data.params[b], offsets[1], impulse);
        }
    }
}

#[inline]
fn map_pair<T, R>(pair: &[T; 2], f: impl Fn(&T) -> R) -> [R; 2] {
    [f(&pair[0]), f(&pair[1])]
}
