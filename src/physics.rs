//! 2D rigid body physics based on Extended Position Based Dynamics.

use crate::math::{self as m, Angle};

use itertools::izip;
use std::collections::{HashMap, HashSet};

//

pub mod body;
pub use body::{Body, BodyGravity, Mass};

pub mod collision;
pub use collision::{BroadPhaseKind, CollisionFilter, Contact, ContactResult, AABB};

pub mod composite;
pub use composite::{Attach, Composite, CompositeDesc};

pub mod constraint;
pub use constraint::{Anchor, Constraint, ConstraintBuilder, ConstraintError};

mod entity_set;
use entity_set::EntitySet;
pub use entity_set::{BodyKey, ConstraintKey, EntityKey};

pub mod events;
pub use events::{CollisionEvent, EventKind, Subscription, WorldEvent};

pub mod material;
pub use material::{CombineRule, Material};

pub mod shape;
pub use shape::{ConvexPolygon, Shape, ShapeError};

pub mod snapshot;
pub use snapshot::WorldSnapshot;

mod solver;
use solver::{BodyParams, PairParams};

pub mod tuning;
pub use tuning::TuningConstants;

//

/// Velocity of an object.
///
// Equivalent to a Vec3 but with names for the translational and rotational part.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocity {
    /// Linear velocity in metres per second.
    #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_vec2"))]
    pub linear: m::Vec2,
    /// Angular velocity in radians per second.
    pub angular: f64,
}

impl Default for Velocity {
    fn default() -> Self {
        Velocity {
            linear: m::Vec2::zero(),
            angular: 0.0,
        }
    }
}

impl Velocity {
    /// Get the linear velocity of a point offset from the center of mass.
    pub fn point_velocity(&self, offset: m::Vec2) -> m::Vec2 {
        let tangent = m::left_normal(offset) * self.angular;
        self.linear + tangent
    }

    pub fn apply_to_pose(&self, dt: f64, mut pose: m::Pose) -> m::Pose {
        let scaled = *self * dt;
        pose.append_translation(scaled.linear);
        pose.prepend_rotation(m::Angle::Rad(scaled.angular).into());
        pose
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        m::is_finite_vec(self.linear) && self.angular.is_finite()
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Velocity {
            linear: self.linear + rhs.linear,
            angular: self.angular + rhs.angular,
        }
    }
}

impl std::ops::AddAssign for Velocity {
    fn add_assign(&mut self, rhs: Self) {
        self.linear += rhs.linear;
        self.angular += rhs.angular;
    }
}

impl std::ops::Mul<f64> for Velocity {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Velocity {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

//

/// Errors from operations on a physics world.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum PhysicsError {
    #[error("Invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(#[from] ConstraintError),
    #[error("{0:?} is not in the world")]
    UnknownEntity(EntityKey),
    #[error("Non-finite {0}")]
    NonFinite(&'static str),
    #[error("Body {0} has an invalid mass")]
    InvalidMass(usize),
}

fn check_finite(finite: bool, what: &'static str) -> Result<(), PhysicsError> {
    if finite {
        Ok(())
    } else {
        log::debug!("Rejected a non-finite {what}");
        Err(PhysicsError::NonFinite(what))
    }
}

fn unknown_entity(key: impl Into<EntityKey>) -> PhysicsError {
    let key = key.into();
    log::debug!("Tried to use {key:?} which is not in the world");
    PhysicsError::UnknownEntity(key)
}

/// Read-only copy of what a renderer needs to know about a body.
#[derive(Clone, Debug)]
pub struct BodyView {
    pub key: BodyKey,
    pub pose: m::Pose,
    pub shape: Shape,
    pub is_static: bool,
    pub label: Option<String>,
}

/// Working buffers of a step, kept between steps to avoid reallocating.
/// Indexed by the position of a body in `keys`.
#[derive(Default)]
struct StepBuffers {
    keys: Vec<BodyKey>,
    params: Vec<BodyParams>,
    start_poses: Vec<m::Pose>,
    old_poses: Vec<m::Pose>,
    poses: Vec<m::Pose>,
    old_velocities: Vec<Velocity>,
    velocities: Vec<Velocity>,
    aabbs: Vec<AABB>,
    candidates: Vec<[usize; 2]>,
    pairs: Vec<PairParams>,
    constraints: Vec<Constraint<usize>>,
    contacts: Vec<ContactResult>,
    last_contacts: Vec<ContactResult>,
    lambdas: Vec<[f64; 2]>,
}

impl StepBuffers {
    fn clear(&mut self) {
        self.keys.clear();
        self.params.clear();
        self.start_poses.clear();
        self.old_poses.clear();
        self.poses.clear();
        self.old_velocities.clear();
        self.velocities.clear();
        self.aabbs.clear();
        self.candidates.clear();
        self.pairs.clear();
        self.constraints.clear();
        self.contacts.clear();
        self.last_contacts.clear();
        self.lambdas.clear();
    }
}

/// A world of bodies and constraints that can be stepped forward in time.
pub struct PhysicsWorld {
    entities: EntitySet,
    gravity: m::Vec2,
    time_scale: f64,
    tuning: TuningConstants,
    broad_phase: Box<dyn collision::BroadPhase>,
    listeners: events::Listeners,
    in_step: bool,
    // added during the current step, first simulated in the next one
    pending_adds: HashSet<EntityKey>,
    // applied at the end of the current step
    pending_removals: Vec<EntityKey>,
    // pairs that touched during the last step, for collision start and end events
    touching: Vec<CollisionEvent>,
    buffers: StepBuffers,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(m::Vec2::new(0.0, -9.81), 1.0)
    }
}

impl PhysicsWorld {
    pub fn new(gravity: m::Vec2, time_scale: f64) -> Self {
        let tuning = TuningConstants::default();
        let mut world = Self {
            entities: EntitySet::new(),
            gravity,
            time_scale: 1.0,
            tuning,
            broad_phase: tuning.broad_phase.build(),
            listeners: events::Listeners::default(),
            in_step: false,
            pending_adds: HashSet::new(),
            pending_removals: Vec::new(),
            touching: Vec::new(),
            buffers: StepBuffers::default(),
        };
        world.set_time_scale(time_scale);
        world
    }

    pub fn with_tuning(mut self, tuning: TuningConstants) -> Self {
        self.set_tuning(tuning);
        self
    }

    //
    // configuration
    //

    #[inline]
    pub fn gravity(&self) -> m::Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, x: f64, y: f64) {
        self.gravity = m::Vec2::new(x, y);
    }

    #[inline]
    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Set the multiplier of step length. Zero pauses the simulation.
    /// Negative and non-finite values are treated as zero.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };
    }

    #[inline]
    pub fn tuning(&self) -> &TuningConstants {
        &self.tuning
    }

    pub fn set_tuning(&mut self, tuning: TuningConstants) {
        if tuning.broad_phase != self.tuning.broad_phase {
            self.broad_phase = tuning.broad_phase.build();
        }
        self.tuning = tuning;
    }

    //
    // adding and removing
    //

    /// Add a body to the world. If called during a step,
    /// the body first participates in the next step.
    pub fn add_body(&mut self, body: Body) -> BodyKey {
        let key = self.entities.insert_body(body);
        if self.in_step {
            log::debug!("Body {key:?} added during a step, deferring until the next");
            self.pending_adds.insert(key.into());
        }
        key
    }

    /// Add a constraint between bodies in the world.
    ///
    /// If the builder doesn't have a length set,
    /// the current distance between the anchors is used.
    pub fn add_constraint(
        &mut self,
        builder: ConstraintBuilder,
    ) -> Result<ConstraintKey, PhysicsError> {
        builder.validate()?;
        for anchor in builder.anchors() {
            if let Some(&body) = anchor.body_ref() {
                if !self.entities.contains(body.into()) {
                    return Err(unknown_entity(body));
                }
            }
        }
        let [a, b] = builder.anchors().map(|anchor| self.anchor_position(anchor));
        let constraint = builder.build_resolved((b - a).mag())?;
        let key = self.entities.insert_constraint(constraint);
        if self.in_step {
            log::debug!("Constraint {key:?} added during a step, deferring until the next");
            self.pending_adds.insert(key.into());
        }
        Ok(key)
    }

    /// Remove a body or a constraint. Removing a body also removes
    /// every constraint attached to it.
    ///
    /// If called during a step, the removal happens at the end of the step.
    pub fn remove(&mut self, key: impl Into<EntityKey>) -> Result<(), PhysicsError> {
        let key = key.into();
        if !self.entities.contains(key) {
            return Err(unknown_entity(key));
        }
        if self.in_step {
            log::debug!("Removal of {key:?} deferred until the end of the step");
            if !self.pending_removals.contains(&key) {
                self.pending_removals.push(key);
            }
        } else {
            self.remove_now(key);
        }
        Ok(())
    }

    /// Remove many things at once, returning how many of them existed.
    pub fn remove_all(&mut self, keys: impl IntoIterator<Item = EntityKey>) -> usize {
        keys.into_iter()
            .filter(|&key| self.remove(key).is_ok())
            .count()
    }

    /// Remove every body and constraint. Event subscriptions are kept.
    pub fn clear(&mut self) {
        if self.in_step {
            let bodies = self.entities.iter_bodies().map(|(k, _)| EntityKey::from(k));
            let constraints = self
                .entities
                .iter_constraints()
                .map(|(k, _)| EntityKey::from(k));
            let all: Vec<EntityKey> = constraints.chain(bodies).collect();
            self.remove_all(all);
            return;
        }
        self.entities.clear();
        self.touching.clear();
        self.pending_adds.clear();
        self.pending_removals.clear();
    }

    fn remove_now(&mut self, key: EntityKey) -> bool {
        match key {
            EntityKey::Body(body) => {
                let removed = self.entities.remove_body(body).is_some();
                if removed {
                    self.touching.retain(|ev| !ev.bodies.contains(&body));
                }
                removed
            }
            EntityKey::Constraint(constraint) => {
                self.entities.remove_constraint(constraint).is_some()
            }
        }
    }

    fn flush_pending(&mut self) {
        self.pending_adds.clear();
        let removals = std::mem::take(&mut self.pending_removals);
        if !removals.is_empty() {
            log::debug!("Applying {} deferred removals", removals.len());
        }
        for key in removals {
            // might have already been removed along with a body
            self.remove_now(key);
        }
    }

    //
    // access
    //

    #[inline]
    pub fn body(&self, key: BodyKey) -> Option<&Body> {
        self.entities.get_body(key)
    }

    #[inline]
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.entities.get_body_mut(key)
    }

    #[inline]
    pub fn constraint(&self, key: ConstraintKey) -> Option<&Constraint> {
        self.entities.get_constraint(key)
    }

    /// Mutable access to a constraint, e.g. to move a world anchor.
    #[inline]
    pub fn constraint_mut(&mut self, key: ConstraintKey) -> Option<&mut Constraint> {
        self.entities.get_constraint_mut(key)
    }

    #[inline]
    pub fn contains(&self, key: impl Into<EntityKey>) -> bool {
        self.entities.contains(key.into())
    }

    /// Every body in the order they were added.
    pub fn bodies(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.entities.iter_bodies()
    }

    /// Every constraint in the order they were added.
    pub fn constraints(&self) -> impl '_ + Iterator<Item = (ConstraintKey, &Constraint)> {
        self.entities.iter_constraints()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.entities.body_count()
    }

    pub fn dynamic_body_count(&self) -> usize {
        self.bodies().filter(|(_, b)| !b.is_static()).count()
    }

    #[inline]
    pub fn constraint_count(&self) -> usize {
        self.entities.constraint_count()
    }

    /// Find the body that was added last out of those containing `point`.
    pub fn query_point(&self, point: m::Vec2) -> Option<BodyKey> {
        self.bodies()
            .filter(|(_, body)| body.contains_point(point))
            .map(|(key, _)| key)
            .last()
    }

    /// Copy the pose and shape of every body, for rendering.
    pub fn snapshot_bodies(&self) -> Vec<BodyView> {
        self.bodies()
            .map(|(key, body)| BodyView {
                key,
                pose: body.pose,
                shape: body.shape().clone(),
                is_static: body.is_static(),
                label: body.label.clone(),
            })
            .collect()
    }

    fn anchor_position(&self, anchor: &Anchor) -> m::Vec2 {
        match anchor {
            Anchor::World(p) => *p,
            Anchor::Body { body, offset } => self
                .entities
                .get_body(*body)
                .map_or(*offset, |b| b.pose * *offset),
        }
    }

    //
    // mutation
    //

    fn body_or_err(&mut self, key: BodyKey) -> Result<&mut Body, PhysicsError> {
        self.entities
            .get_body_mut(key)
            .ok_or_else(|| unknown_entity(key))
    }

    /// Apply a force at a point in world space for the duration of the next step.
    pub fn apply_force(
        &mut self,
        key: BodyKey,
        point: m::Vec2,
        force: m::Vec2,
    ) -> Result<(), PhysicsError> {
        let body = self.body_or_err(key)?;
        check_finite(m::is_finite_vec(point) && m::is_finite_vec(force), "force")?;
        body.apply_force(point, force);
        Ok(())
    }

    pub fn set_velocity(&mut self, key: BodyKey, velocity: m::Vec2) -> Result<(), PhysicsError> {
        let body = self.body_or_err(key)?;
        check_finite(m::is_finite_vec(velocity), "velocity")?;
        body.set_velocity(velocity);
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, key: BodyKey, angular: f64) -> Result<(), PhysicsError> {
        let body = self.body_or_err(key)?;
        check_finite(angular.is_finite(), "angular velocity")?;
        body.set_angular_velocity(angular);
        Ok(())
    }

    /// Teleport a body. Constraints attached to it are solved
    /// from the new position during the next step.
    pub fn set_position(&mut self, key: BodyKey, position: m::Vec2) -> Result<(), PhysicsError> {
        let body = self.body_or_err(key)?;
        check_finite(m::is_finite_vec(position), "position")?;
        body.set_position(position);
        Ok(())
    }

    pub fn set_angle(&mut self, key: BodyKey, angle: Angle) -> Result<(), PhysicsError> {
        let body = self.body_or_err(key)?;
        check_finite(angle.rad().is_finite(), "angle")?;
        body.set_angle(angle);
        Ok(())
    }

    //
    // stepping
    //

    /// Advance the simulation by `dt` seconds, scaled by the time scale.
    ///
    /// Calling this from inside an event listener does nothing.
    pub fn step(&mut self, dt: f64) {
        if self.in_step {
            log::debug!("Step requested during a step, ignoring");
            return;
        }
        if !(dt.is_finite() && dt >= 0.0) {
            log::warn!("Invalid step length {dt}, ignoring");
            return;
        }
        let _span = tracy_span!("physics step", "step");

        self.in_step = true;
        let dt = dt * self.time_scale;
        self.dispatch(&WorldEvent::BeforeStep { dt });
        if dt > 0.0 {
            let collision_events = self.simulate(dt);
            for event in &collision_events {
                self.dispatch(event);
            }
        } else {
            // forces last for one step whether or not time passed during it
            let pending_adds = &self.pending_adds;
            for (key, body) in self.entities.iter_bodies_mut() {
                if !pending_adds.contains(&EntityKey::from(key)) {
                    body.clear_forces();
                }
            }
        }
        self.dispatch(&WorldEvent::AfterStep { dt });
        self.in_step = false;
        self.flush_pending();
    }

    /// Move everything forward and return collision events.
    fn simulate(&mut self, dt: f64) -> Vec<WorldEvent> {
        let _span = tracy_span!("simulate", "simulate");

        let (substeps, iterations) = self.tuning.counts();

        // bodies can be broken through their public fields between steps
        let broken: Vec<BodyKey> = self
            .entities
            .iter_bodies()
            .filter(|(_, body)| !body.is_finite())
            .map(|(key, _)| key)
            .collect();
        for key in broken {
            if let Some(body) = self.entities.get_body_mut(key) {
                log::warn!(
                    "Body {key:?} ({}) was given a non-finite state, resetting it",
                    body.label.as_deref().unwrap_or("unlabeled")
                );
                body.reset_to_last_finite();
            }
        }

        let bufs = &mut self.buffers;
        bufs.clear();

        let entities = &self.entities;
        let pending_adds = &self.pending_adds;
        let removing: HashSet<EntityKey> = self.pending_removals.iter().copied().collect();
        let is_active = |key: EntityKey| !pending_adds.contains(&key) && !removing.contains(&key);

        // gather bodies

        let mut shapes: Vec<&Shape> = Vec::with_capacity(entities.body_count());
        let mut index_of: HashMap<BodyKey, usize> = HashMap::with_capacity(entities.body_count());
        for (key, body) in entities.iter_bodies() {
            if !is_active(key.into()) {
                continue;
            }
            index_of.insert(key, bufs.keys.len());
            let params = BodyParams::new(body, self.gravity);
            let velocity = if params.is_static {
                Velocity::default()
            } else {
                body.velocity
            };
            let rotation_sweep = velocity.angular.abs() * dt * body.shape().bounding_radius();
            bufs.aabbs.push(
                body.aabb()
                    .extended(velocity.linear * dt)
                    .padded(rotation_sweep),
            );
            bufs.keys.push(key);
            bufs.params.push(params);
            bufs.poses.push(body.pose);
            bufs.velocities.push(velocity);
            shapes.push(body.shape());
        }
        bufs.start_poses.extend_from_slice(&bufs.poses);
        bufs.old_poses.extend_from_slice(&bufs.poses);
        bufs.old_velocities.extend_from_slice(&bufs.velocities);

        // broad phase, once for the whole step

        self.broad_phase.pairs(&bufs.aabbs, &mut bufs.candidates);
        for &[i, j] in &bufs.candidates {
            let (Some(a), Some(b)) = (
                entities.get_body(bufs.keys[i]),
                entities.get_body(bufs.keys[j]),
            ) else {
                continue;
            };
            if (a.is_static() && b.is_static()) || !a.filter.can_collide(&b.filter) {
                continue;
            }
            bufs.pairs.push(PairParams {
                bodies: [i, j],
                restitution: self
                    .tuning
                    .restitution_rule
                    .combine(a.material.restitution, b.material.restitution),
                friction: self
                    .tuning
                    .friction_rule
                    .combine(a.material.friction, b.material.friction),
                slop: a.material.slop.max(b.material.slop),
            });
        }
        let pair_count = bufs.pairs.len();
        bufs.contacts.resize(pair_count, ContactResult::Zero);
        bufs.last_contacts.resize(pair_count, ContactResult::Zero);
        bufs.lambdas.resize(pair_count, [0.0; 2]);

        // constraints by body index

        for (key, constraint) in entities.iter_constraints() {
            if !is_active(key.into()) {
                continue;
            }
            if let Ok(c) = constraint.map_bodies(|b| index_of.get(&b).copied().ok_or(())) {
                bufs.constraints.push(c);
            }
        }

        // solve

        let h = dt / substeps as f64;
        let mut view = solver::DataView {
            dt: h,
            inv_dt: 1.0 / h,
            iterations,
            correction_exponent: 1.0 / (substeps * iterations) as f64,
            damping_exponent: 1.0 / substeps as f64,
            restitution_threshold_scale: self.tuning.restitution_threshold_scale,
            params: &bufs.params,
            shapes: &shapes,
            old_poses: &mut bufs.old_poses,
            poses: &mut bufs.poses,
            old_velocities: &mut bufs.old_velocities,
            velocities: &mut bufs.velocities,
            constraints: &bufs.constraints,
            pairs: &bufs.pairs,
            contacts: &mut bufs.contacts,
            last_contacts: &mut bufs.last_contacts,
            contact_lambdas: &mut bufs.lambdas,
        };
        for _ in 0..substeps {
            solver::substep(&mut view);
        }
        drop(shapes);

        // write results back, resetting anything that blew up

        let mut resets = 0;
        for (idx, &key) in bufs.keys.iter().enumerate() {
            let Some(body) = self.entities.get_body_mut(key) else {
                continue;
            };
            body.clear_forces();
            if bufs.params[idx].is_static {
                body.last_finite_pose = body.pose;
                continue;
            }
            let mut pose = bufs.poses[idx];
            pose.rotation.normalize();
            let velocity = bufs.velocities[idx];
            if m::is_finite_pose(&pose) && velocity.is_finite() {
                body.pose = pose;
                body.velocity = velocity;
                body.last_finite_pose = pose;
            } else {
                log::warn!(
                    "Body {key:?} ({}) got a non-finite pose or velocity, resetting it",
                    body.label.as_deref().unwrap_or("unlabeled")
                );
                body.pose = bufs.start_poses[idx];
                body.velocity = Velocity::default();
                resets += 1;
            }
        }

        // collision events

        let mut touching = Vec::new();
        for (pair, contact) in izip!(&bufs.pairs, &bufs.last_contacts) {
            let Some(deepest) = contact.deepest() else {
                continue;
            };
            let [i, j] = pair.bodies;
            touching.push(CollisionEvent {
                bodies: [bufs.keys[i], bufs.keys[j]],
                normal: *deepest.normal,
                depth: deepest.depth,
                points: contact
                    .iter()
                    .map(|c| c.world_point(&bufs.poses[i]))
                    .collect(),
            });
        }
        log::trace!(
            "Stepped {} bodies, {} constraints, {} candidate pairs, {} touching, {} resets",
            bufs.keys.len(),
            bufs.constraints.len(),
            pair_count,
            touching.len(),
            resets,
        );

        let previous = std::mem::replace(&mut self.touching, touching);
        let was_touching: HashSet<[BodyKey; 2]> = previous.iter().map(|ev| ev.bodies).collect();
        let is_touching: HashSet<[BodyKey; 2]> = self.touching.iter().map(|ev| ev.bodies).collect();
        let started = self
            .touching
            .iter()
            .filter(|ev| !was_touching.contains(&ev.bodies))
            .cloned()
            .map(WorldEvent::CollisionStart);
        let ended = previous
            .into_iter()
            .filter(|ev| !is_touching.contains(&ev.bodies))
            .map(WorldEvent::CollisionEnd);
        started.chain(ended).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    const DT: f64 = 1.0 / 60.0;

    fn ground() -> Body {
        Body::new_static(Shape::rect(12.0, 0.5).unwrap(), m::Vec2::new(6.0, 0.0))
    }

    fn ball(r: f64, pos: m::Vec2) -> Body {
        Body::new(Shape::circle(r).unwrap(), pos)
    }

    #[test]
    fn static_bodies_stay_put() {
        let mut world = PhysicsWorld::default();
        let ground = world.add_body(ground());
        let wall = world.add_body(
            Body::new_static(Shape::rect(0.5, 8.0).unwrap(), m::Vec2::new(0.0, 4.0))
                .with_angle(Angle::Deg(10.0)),
        );
        for i in 0..10 {
            world.add_body(ball(0.2, m::Vec2::new(0.5 + i as f64 * 0.3, 2.0 + i as f64)));
        }
        let before: Vec<_> = [ground, wall]
            .iter()
            .map(|&k| world.body(k).unwrap().pose)
            .collect();
        for _ in 0..300 {
            world.step(DT);
        }
        for (&key, pose) in [ground, wall].iter().zip(&before) {
            let body = world.body(key).unwrap();
            assert_eq!(body.pose, *pose);
            assert_eq!(body.velocity, Velocity::default());
        }
        // and the balls ended up on top of the ground
        for (_, body) in world.bodies().filter(|(_, b)| !b.is_static()) {
            assert!(body.position().y > 0.2, "fell through at {:?}", body.position());
        }
    }

    #[test]
    fn rigid_chain_converges_to_rest_length() {
        let mut world = PhysicsWorld::default();
        let mut prev = Anchor::world(m::Vec2::new(6.0, 7.0));
        let mut keys = Vec::new();
        for i in 1..=4 {
            let key = world.add_body(ball(0.1, m::Vec2::new(6.0, 7.0 - i as f64 * 0.5)));
            world
                .add_constraint(
                    ConstraintBuilder::new(prev)
                        .with_b(Anchor::body(key))
                        .with_length(0.5),
                )
                .unwrap();
            prev = Anchor::body(key);
            keys.push(key);
        }
        for _ in 0..300 {
            world.step(DT);
        }
        for (_, c) in world.constraints() {
            let [a, b] = [&c.a, &c.b].map(|anchor| world.anchor_position(anchor));
            let len = (b - a).mag();
            assert!((len - 0.5).abs() < 0.005, "length {len}");
        }
    }

    #[test]
    fn constraint_with_immovable_ends_does_nothing() {
        let mut world = PhysicsWorld::default();
        let wall = world.add_body(ground());
        world
            .add_constraint(
                ConstraintBuilder::new(Anchor::body(wall))
                    .with_b(Anchor::world(m::Vec2::new(0.0, 10.0)))
                    .with_length(1.0),
            )
            .unwrap();
        world.step(DT);
        assert_eq!(world.body(wall).unwrap().position(), m::Vec2::new(6.0, 0.0));
    }

    #[test]
    fn bounce_height_follows_restitution() {
        let mut world = PhysicsWorld::default();
        world.add_body(ground());
        let e = 0.8;
        let r = 0.25;
        let h = 2.0;
        let ground_top = 0.25;
        let ball = world.add_body(
            ball(r, m::Vec2::new(6.0, ground_top + r + h)).with_material(
                Material::default()
                    .with_restitution(e)
                    .with_air_friction(0.0),
            ),
        );

        let mut bounced = false;
        let mut peak = f64::MIN;
        for _ in 0..300 {
            world.step(DT);
            let body = world.body(ball).unwrap();
            let vy = body.velocity.linear.y;
            if !bounced && vy > 0.0 {
                bounced = true;
            }
            if bounced {
                peak = peak.max(body.position().y - r - ground_top);
                if vy < 0.0 {
                    break;
                }
            }
        }
        assert!(bounced);
        let expected = e * e * h;
        assert!(
            peak > 0.75 * expected && peak < 1.15 * expected,
            "bounced to {peak}, expected about {expected}"
        );
    }

    #[test]
    fn isolated_collision_conserves_momentum() {
        let mut world = PhysicsWorld::default();
        let mat = Material::default()
            .with_restitution(1.0)
            .with_friction(0.0)
            .with_air_friction(0.0);
        let make = |x: f64| {
            ball(0.3, m::Vec2::new(x, 4.0))
                .with_material(mat)
                .with_gravity(BodyGravity::Ignore)
                .with_fixed_rotation()
        };
        let a = world.add_body(make(2.0).with_velocity(m::Vec2::new(2.0, 0.0)));
        let b = world.add_body(make(4.0));
        let total = |world: &PhysicsWorld| {
            world.body(a).unwrap().momentum() + world.body(b).unwrap().momentum()
        };
        let initial = total(&world);
        for _ in 0..120 {
            world.step(DT);
            let p = total(&world);
            assert!((p - initial).mag() < 1e-9 * initial.mag().max(1.0));
        }
        // momentum was handed over
        assert!(world.body(b).unwrap().velocity.linear.x > 1.5);
        assert!(world.body(a).unwrap().velocity.linear.x.abs() < 0.5);
    }

    #[test]
    fn removal_in_before_step_leaves_nothing_behind() {
        let mut world = PhysicsWorld::default();
        let a = world.add_body(ball(0.2, m::Vec2::new(1.0, 4.0)));
        let b = world.add_body(ball(0.2, m::Vec2::new(2.0, 4.0)));
        let link = world
            .add_constraint(ConstraintBuilder::new(Anchor::body(a)).with_b(Anchor::body(b)))
            .unwrap();
        let still_there = Rc::new(RefCell::new(None));
        {
            let still_there = still_there.clone();
            world.on(EventKind::BeforeStep, move |world, _| {
                if world.contains(a) {
                    world.remove(a).unwrap();
                    *still_there.borrow_mut() = Some(world.contains(a));
                }
            });
        }

        world.step(DT);
        assert_eq!(*still_there.borrow(), Some(true));
        assert!(!world.contains(a));
        assert!(!world.contains(link));
        assert_eq!(world.constraint_count(), 0);
        itertools::assert_equal(world.bodies().map(|(k, _)| k), [b]);
        for _ in 0..10 {
            world.step(DT);
        }
        assert!(world.body(b).unwrap().position().y < 4.0);
    }

    #[test]
    fn bodies_added_mid_step_wait_for_next_step() {
        let mut world = PhysicsWorld::default();
        let added = Rc::new(RefCell::new(None));
        {
            let added = added.clone();
            world.on(EventKind::AfterStep, move |world, _| {
                if added.borrow().is_none() {
                    let key = world.add_body(ball(0.2, m::Vec2::new(3.0, 5.0)));
                    *added.borrow_mut() = Some(key);
                }
            });
        }
        world.step(DT);
        let key = added.borrow().unwrap();
        assert_eq!(world.body(key).unwrap().position(), m::Vec2::new(3.0, 5.0));
        world.step(DT);
        assert!(world.body(key).unwrap().position().y < 5.0);
    }

    #[test]
    fn non_finite_body_is_reset() {
        let mut world = PhysicsWorld::default();
        let key = world.add_body(ball(0.2, m::Vec2::new(3.0, 5.0)));
        world.body_mut(key).unwrap().velocity.linear = m::Vec2::new(f64::NAN, 0.0);
        world.step(DT);
        let body = world.body(key).unwrap();
        assert!(body.is_finite());
        assert_eq!(body.position().x, 3.0);
        assert!(body.position().y <= 5.0);
        world.step(DT);
        assert!(world.body(key).unwrap().position().y < 5.0);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let mut world = PhysicsWorld::default();
        let key = world.add_body(ball(0.2, m::Vec2::new(3.0, 5.0)));
        let nan = m::Vec2::new(f64::NAN, 5.0);
        assert_eq!(
            world.set_position(key, nan),
            Err(PhysicsError::NonFinite("position"))
        );
        assert!(world.set_velocity(key, nan).is_err());
        assert!(world.set_angular_velocity(key, f64::INFINITY).is_err());
        assert!(world.set_angle(key, Angle::Rad(f64::NAN)).is_err());
        assert!(world.apply_force(key, m::Vec2::zero(), nan).is_err());
        let body = world.body(key).unwrap();
        assert!(body.is_finite());
        assert_eq!(body.position(), m::Vec2::new(3.0, 5.0));
    }

    #[test]
    fn broken_pose_returns_to_last_finite_one() {
        let mut world = PhysicsWorld::default();
        let key = world.add_body(ball(0.2, m::Vec2::new(3.0, 5.0)));
        world.step(DT);
        world.step(DT);
        let last_good = world.body(key).unwrap().position();
        assert!(last_good.y < 5.0);

        world.body_mut(key).unwrap().pose.translation = m::Vec2::new(f64::NAN, 5.0);
        for _ in 0..3 {
            world.step(DT);
            let body = world.body(key).unwrap();
            assert!(body.is_finite(), "still broken at {:?}", body.position());
        }
        let body = world.body(key).unwrap();
        assert_eq!(body.position().x, last_good.x);
        assert!((body.position() - last_good).mag() < 0.1);
    }

    #[test]
    fn zero_time_scale_pauses_but_fires_events() {
        let mut world = PhysicsWorld::new(m::Vec2::new(0.0, -9.81), 0.0);
        let key = world.add_body(ball(0.2, m::Vec2::new(3.0, 5.0)));
        let steps = Rc::new(RefCell::new(0));
        {
            let steps = steps.clone();
            world.on(EventKind::AfterStep, move |_, _| *steps.borrow_mut() += 1);
        }
        for _ in 0..5 {
            world.step(DT);
        }
        assert_eq!(*steps.borrow(), 5);
        assert_eq!(world.body(key).unwrap().position(), m::Vec2::new(3.0, 5.0));

        world.set_time_scale(-2.0);
        assert_eq!(world.time_scale(), 0.0);
        world.set_time_scale(1.0);
        world.step(DT);
        assert!(world.body(key).unwrap().position().y < 5.0);
    }

    #[test]
    fn paused_steps_drop_forces() {
        let mut world = PhysicsWorld::new(m::Vec2::zero(), 0.0);
        let key = world.add_body(
            ball(0.2, m::Vec2::zero()).with_material(Material::default().with_air_friction(0.0)),
        );
        for _ in 0..10 {
            world
                .apply_force(key, m::Vec2::zero(), m::Vec2::new(1.0, 0.0))
                .unwrap();
            world.step(DT);
            assert_eq!(world.body(key).unwrap().accumulated_force().0, m::Vec2::zero());
        }
        world.set_time_scale(1.0);
        world.step(DT);
        let body = world.body(key).unwrap();
        assert_eq!(body.velocity.linear, m::Vec2::zero());
        assert_eq!(body.position(), m::Vec2::zero());
    }

    #[test]
    fn friction_slows_sliding_boxes() {
        let slide = |friction: f64| {
            let mut world = PhysicsWorld::default();
            let surface = Material::default().with_friction(friction).with_air_friction(0.0);
            world.add_body(ground().with_material(surface));
            let key = world.add_body(
                Body::new(Shape::rect(0.5, 0.5).unwrap(), m::Vec2::new(3.0, 0.5))
                    .with_material(surface)
                    .with_velocity(m::Vec2::new(3.0, 0.0)),
            );
            let energy = world.body(key).unwrap().kinetic_energy();
            for _ in 0..60 {
                world.step(DT);
            }
            let body = world.body(key).unwrap();
            (body.position().x - 3.0, body.kinetic_energy() / energy)
        };
        let (sticky_dist, sticky_energy) = slide(1.0);
        let (slippy_dist, slippy_energy) = slide(0.0);
        // stopping distance is v^2 / 2 mu g, about half a metre
        assert!(sticky_dist < 1.0, "{sticky_dist}");
        assert!(sticky_energy < 0.01, "{sticky_energy}");
        assert!(slippy_dist > 2.5, "{slippy_dist}");
        assert!(slippy_energy > 0.9, "{slippy_energy}");
    }

    #[test]
    fn filtered_bodies_pass_through_each_other() {
        let gap_after = |filter: CollisionFilter| {
            let mut world = PhysicsWorld::new(m::Vec2::zero(), 1.0);
            let a = world.add_body(ball(0.2, m::Vec2::zero()).with_filter(filter));
            let b = world.add_body(ball(0.2, m::Vec2::new(0.2, 0.0)).with_filter(filter));
            for _ in 0..10 {
                world.step(DT);
            }
            let [a, b] = [a, b].map(|k| world.body(k).unwrap().position());
            (b - a).mag()
        };
        let filtered = gap_after(CollisionFilter::non_colliding_group(1));
        assert!((filtered - 0.2).abs() < 1e-9, "{filtered}");
        let colliding = gap_after(CollisionFilter::default());
        assert!(colliding > 0.35, "{colliding}");
    }

    #[test]
    fn unknown_entities_are_reported() {
        let mut world = PhysicsWorld::default();
        let key = world.add_body(ball(0.2, m::Vec2::zero()));
        world.remove(key).unwrap();
        assert_eq!(
            world.remove(key),
            Err(PhysicsError::UnknownEntity(EntityKey::Body(key)))
        );
        assert!(world.set_velocity(key, m::Vec2::unit_x()).is_err());
        assert!(world
            .apply_force(key, m::Vec2::zero(), m::Vec2::unit_y())
            .is_err());
        assert!(matches!(
            world.add_constraint(ConstraintBuilder::new(Anchor::body(key))),
            Err(PhysicsError::UnknownEntity(_))
        ));
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn query_point_finds_topmost() {
        let mut world = PhysicsWorld::default();
        let below = world.add_body(Body::new(Shape::rect(1.0, 1.0).unwrap(), m::Vec2::zero()));
        let above = world.add_body(Body::new(
            Shape::rect(1.0, 1.0).unwrap(),
            m::Vec2::new(0.4, 0.0),
        ));
        assert_eq!(world.query_point(m::Vec2::new(0.2, 0.0)), Some(above));
        assert_eq!(world.query_point(m::Vec2::new(-0.4, 0.0)), Some(below));
        assert_eq!(world.query_point(m::Vec2::new(5.0, 5.0)), None);
    }

    #[test]
    fn forces_last_one_step() {
        let mut world = PhysicsWorld::new(m::Vec2::zero(), 1.0);
        let key = world.add_body(
            ball(0.2, m::Vec2::zero())
                .with_material(Material::default().with_air_friction(0.0))
                .with_mass(2.0),
        );
        world
            .apply_force(key, m::Vec2::zero(), m::Vec2::new(120.0, 0.0))
            .unwrap();
        world.step(DT);
        let v = world.body(key).unwrap().velocity.linear.x;
        // a = F/m = 60, for one sixtieth of a second
        assert!((v - 1.0).abs() < 1e-6, "{v}");
        world.step(DT);
        assert!((world.body(key).unwrap().velocity.linear.x - v).abs() < 1e-9);
    }

    #[test]
    fn collision_start_and_end() {
        let mut world = PhysicsWorld::default();
        let ground = world.add_body(ground());
        let ball = world.add_body(ball(0.2, m::Vec2::new(6.0, 0.6)));
        let events = Rc::new(RefCell::new(Vec::new()));
        for kind in [EventKind::CollisionStart, EventKind::CollisionEnd] {
            let events = events.clone();
            world.on(kind, move |_, ev| events.borrow_mut().push(ev.clone()));
        }
        for _ in 0..60 {
            world.step(DT);
        }
        {
            let events = events.borrow();
            assert_eq!(events.len(), 1);
            let WorldEvent::CollisionStart(ev) = &events[0] else {
                panic!("expected a collision start, got {:?}", events[0]);
            };
            assert_eq!(ev.bodies, [ground, ball]);
            assert!(ev.normal.y > 0.9);
            assert!(!ev.points.is_empty());
        }

        world.set_position(ball, m::Vec2::new(6.0, 5.0)).unwrap();
        world.step(DT);
        let events = events.borrow();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], WorldEvent::CollisionEnd(_)));
    }

    #[test]
    fn clear_keeps_subscriptions() {
        let mut world = PhysicsWorld::default();
        world.add_body(ground());
        world.add_body(ball(0.2, m::Vec2::new(1.0, 1.0)));
        world.on(EventKind::AfterStep, |_, _| {});
        world.clear();
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.listener_count(), 1);
        assert!(world.snapshot_bodies().is_empty());
    }
}
