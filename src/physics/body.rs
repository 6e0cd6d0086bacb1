use super::{collision::CollisionFilter, Material, Shape, Velocity};
use crate::math::{self as m, Angle, Pose};

/// A body is a rigid shape that moves and collides in a physics world.
///
/// The pose of a body is the pose of its center of mass.
/// Static bodies never move on their own and have infinite mass.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Body {
    #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_pose"))]
    pub pose: Pose,
    pub velocity: Velocity,
    pub material: Material,
    pub gravity: BodyGravity,
    pub filter: CollisionFilter,
    /// Optional name for debugging and for finding specific bodies in scenes.
    pub label: Option<String>,
    shape: Shape,
    pub(super) mass: Mass,
    pub(super) moment_of_inertia: Mass,
    is_static: bool,
    fixed_rotation: bool,
    #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_vec2"))]
    pub(crate) force: m::Vec2,
    pub(crate) torque: f64,
    /// Where the body was at the end of the last step that left it in a valid state.
    #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_pose"))]
    pub(crate) last_finite_pose: Pose,
}

/// How global gravity applies to a single body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyGravity {
    /// Accelerate with the world's gravity.
    #[default]
    World,
    /// Not affected by gravity at all.
    Ignore,
    /// Use this acceleration instead of the world's gravity.
    Custom(
        #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_vec2"))] m::Vec2,
    ),
}

impl BodyGravity {
    /// The gravitational acceleration this body experiences given the world's gravity.
    #[inline]
    pub fn acceleration(&self, world_gravity: m::Vec2) -> m::Vec2 {
        match self {
            BodyGravity::World => world_gravity,
            BodyGravity::Ignore => m::Vec2::zero(),
            BodyGravity::Custom(g) => *g,
        }
    }
}

impl Body {
    /// Create a dynamic body, computing its mass and moment of inertia from the shape
    /// using the default material's density.
    pub fn new(shape: Shape, position: m::Vec2) -> Self {
        let pose = Pose::new(position, m::Rotor2::identity());
        let mut body = Self {
            pose,
            velocity: Velocity::default(),
            material: Material::default(),
            gravity: BodyGravity::World,
            filter: CollisionFilter::default(),
            label: None,
            shape,
            mass: Mass::Infinite,
            moment_of_inertia: Mass::Infinite,
            is_static: false,
            fixed_rotation: false,
            force: m::Vec2::zero(),
            torque: 0.0,
            last_finite_pose: pose,
        };
        body.recompute_mass(body.shape.area() * body.material.density);
        body
    }

    /// Create a static body that never moves.
    pub fn new_static(shape: Shape, position: m::Vec2) -> Self {
        let mut body = Self::new(shape, position);
        body.is_static = true;
        body.mass = Mass::Infinite;
        body.moment_of_inertia = Mass::Infinite;
        body
    }

    /// Set the material, recomputing mass from its density.
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self.recompute_mass(self.shape.area() * material.density);
        self
    }

    /// Set the density, recomputing mass.
    pub fn with_density(self, density: f64) -> Self {
        let material = self.material.with_density(density);
        self.with_material(material)
    }

    /// Set the mass directly. Density is adjusted to match.
    ///
    /// A mass that isn't finite and positive makes the body static.
    pub fn with_mass(mut self, mass: f64) -> Self {
        if !(mass.is_finite() && mass > 0.0) {
            log::warn!("Invalid body mass {mass}, making the body static");
            self.is_static = true;
            self.mass = Mass::Infinite;
            self.moment_of_inertia = Mass::Infinite;
            self.velocity = Velocity::default();
            return self;
        }
        let area = self.shape.area();
        self.material = self.material.with_density(mass / area);
        self.recompute_mass(self.material.density * area);
        self
    }

    /// Prevent the body from rotating by giving it an infinite moment of inertia.
    pub fn with_fixed_rotation(mut self) -> Self {
        self.fixed_rotation = true;
        self.moment_of_inertia = Mass::Infinite;
        self
    }

    pub fn with_angle(mut self, angle: Angle) -> Self {
        self.pose.rotation = angle.into();
        self
    }

    pub fn with_velocity(mut self, linear: m::Vec2) -> Self {
        self.set_velocity(linear);
        self
    }

    pub fn with_angular_velocity(mut self, angular: f64) -> Self {
        self.set_angular_velocity(angular);
        self
    }

    pub fn with_gravity(mut self, gravity: BodyGravity) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn recompute_mass(&mut self, mass: f64) {
        if self.is_static {
            return;
        }
        self.mass = Mass::from(mass);
        self.moment_of_inertia = if self.fixed_rotation {
            Mass::Infinite
        } else {
            Mass::from(self.shape.second_moment_of_area() * mass / self.shape.area())
        };
    }

    // accessors

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn mass(&self) -> Mass {
        self.mass
    }

    #[inline]
    pub fn moment_of_inertia(&self) -> Mass {
        self.moment_of_inertia
    }

    /// Returns the inverse mass of the body, which is zero if the mass is infinite.
    #[inline]
    pub fn inverse_mass(&self) -> f64 {
        self.mass.inv()
    }

    #[inline]
    pub fn inverse_moment_of_inertia(&self) -> f64 {
        self.moment_of_inertia.inv()
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[inline]
    pub fn position(&self) -> m::Vec2 {
        self.pose.translation
    }

    /// Rotation of the body in radians.
    #[inline]
    pub fn angle(&self) -> f64 {
        m::angle_of(self.pose.rotation)
    }

    /// Check that the pose and velocity contain only finite numbers.
    #[inline]
    pub fn is_finite(&self) -> bool {
        m::is_finite_pose(&self.pose)
            && self.velocity.is_finite()
            && m::is_finite_vec(self.force)
            && self.torque.is_finite()
    }

    /// Force accumulated for the next step.
    #[inline]
    pub fn accumulated_force(&self) -> (m::Vec2, f64) {
        (self.force, self.torque)
    }

    /// Linear momentum of the body. Static bodies have none.
    pub fn momentum(&self) -> m::Vec2 {
        match self.mass {
            Mass::Finite { mass, .. } => self.velocity.linear * mass,
            Mass::Infinite => m::Vec2::zero(),
        }
    }

    pub fn kinetic_energy(&self) -> f64 {
        let lin = match self.mass {
            Mass::Finite { mass, .. } => 0.5 * mass * self.velocity.linear.mag_sq(),
            Mass::Infinite => 0.0,
        };
        let ang = match self.moment_of_inertia {
            Mass::Finite { mass, .. } => 0.5 * mass * self.velocity.angular.powi(2),
            Mass::Infinite => 0.0,
        };
        lin + ang
    }

    /// Axis-aligned bounding box in the current pose.
    #[inline]
    pub fn aabb(&self) -> super::collision::AABB {
        self.shape.aabb(&self.pose)
    }

    /// Check whether a point in world space is inside this body.
    #[inline]
    pub fn contains_point(&self, point: m::Vec2) -> bool {
        self.shape.contains_point(&self.pose, point)
    }

    // mutators

    /// Apply a force at a point in world space for the duration of the next step.
    ///
    /// A force off the center of mass also produces a torque.
    /// Forces on static bodies are ignored.
    pub fn apply_force(&mut self, point: m::Vec2, force: m::Vec2) {
        if self.is_static {
            return;
        }
        self.force += force;
        self.torque += m::cross(point - self.pose.translation, force);
    }

    /// Put the body back where it last was in a valid state and stop it.
    pub(crate) fn reset_to_last_finite(&mut self) {
        if !m::is_finite_pose(&self.last_finite_pose) {
            // created in an invalid pose and never stepped since
            self.last_finite_pose = Pose::identity();
        }
        self.pose = self.last_finite_pose;
        self.velocity = Velocity::default();
        self.clear_forces();
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = m::Vec2::zero();
        self.torque = 0.0;
    }

    /// Move the body, keeping its velocity.
    #[inline]
    pub fn set_position(&mut self, position: m::Vec2) {
        self.pose.translation = position;
    }

    #[inline]
    pub fn set_angle(&mut self, angle: Angle) {
        self.pose.rotation = angle.into();
    }

    /// Set the linear velocity. Static bodies always stay at rest.
    #[inline]
    pub fn set_velocity(&mut self, linear: m::Vec2) {
        if !self.is_static {
            self.velocity.linear = linear;
        }
    }

    #[inline]
    pub fn set_angular_velocity(&mut self, angular: f64) {
        if !self.is_static {
            self.velocity.angular = angular;
        }
    }
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        if mass.is_finite() && mass > 0.0 {
            Mass::Finite {
                mass,
                inverse: 1.0 / mass,
            }
        } else {
            Mass::Infinite
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }

    /// Check that a finite mass is positive and matches its stored inverse.
    pub fn is_valid(&self) -> bool {
        match *self {
            Mass::Finite { mass, inverse } => {
                mass.is_finite()
                    && mass > 0.0
                    && inverse.is_finite()
                    && inverse > 0.0
                    && (mass * inverse - 1.0).abs() < 1e-9
            }
            Mass::Infinite => true,
        }
    }

    /// Get the mass if it's finite.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            Mass::Finite { mass, .. } => Some(*mass),
            Mass::Infinite => None,
        }
    }
}
