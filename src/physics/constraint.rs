//! Distance constraints between points on bodies and in the world.

use super::BodyKey;
use crate::math as m;

/// One end of a constraint.
///
/// Generic over the way bodies are referred to, so that the same type can describe
/// constraints inside the world (by [`BodyKey`][super::BodyKey]),
/// in prefabs (by member index) and in snapshots (by position in the snapshot).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Anchor<B = BodyKey> {
    /// A fixed point in world space.
    World(#[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_vec2"))] m::Vec2),
    /// A point on a body, relative to its center of mass in the body's local space.
    Body {
        body: B,
        #[cfg_attr(feature = "serde-types", serde(with = "crate::math::serde_vec2"))]
        offset: m::Vec2,
    },
}

impl<B> Anchor<B> {
    #[inline]
    pub fn world(point: m::Vec2) -> Self {
        Anchor::World(point)
    }

    /// The center of mass of a body.
    #[inline]
    pub fn body(body: B) -> Self {
        Anchor::Body {
            body,
            offset: m::Vec2::zero(),
        }
    }

    /// A point on a body in its local space.
    #[inline]
    pub fn body_point(body: B, offset: m::Vec2) -> Self {
        Anchor::Body { body, offset }
    }

    #[inline]
    pub fn body_ref(&self) -> Option<&B> {
        match self {
            Anchor::World(_) => None,
            Anchor::Body { body, .. } => Some(body),
        }
    }

    /// Offset of the anchor on its body, or the world position for world anchors.
    #[inline]
    pub fn offset(&self) -> m::Vec2 {
        match self {
            Anchor::World(p) => *p,
            Anchor::Body { offset, .. } => *offset,
        }
    }

    /// Change the way the body of this anchor is referred to.
    pub fn map_body<C, E>(self, f: impl FnOnce(B) -> Result<C, E>) -> Result<Anchor<C>, E> {
        Ok(match self {
            Anchor::World(p) => Anchor::World(p),
            Anchor::Body { body, offset } => Anchor::Body {
                body: f(body)?,
                offset,
            },
        })
    }
}

/// Reasons a constraint can be rejected at creation.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum ConstraintError {
    #[error("At least one end of a constraint must be attached to a body")]
    NoBody,
    #[error("Both ends of a constraint are attached to the same body")]
    SameBody,
    #[error("Stiffness must be in the range (0, 1], got {0}")]
    InvalidStiffness(f64),
    #[error("Length must be finite and non-negative, got {0}")]
    InvalidLength(f64),
    #[error("Damping must be in the range [0, 1], got {0}")]
    InvalidDamping(f64),
    #[error("Anchor has non-finite coordinates")]
    NonFiniteAnchor,
    #[error("Anchor refers to member {0} of a composite that only has {1} bodies")]
    UnknownMember(usize, usize),
}

/// A constraint keeps two points at a fixed distance from each other.
///
/// With a stiffness below one it behaves like a spring.
/// [`ConstraintBuilder`][self::ConstraintBuilder] is the preferred
/// way to create these, but the fields are public to allow in-place editing.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint<B = BodyKey> {
    pub a: Anchor<B>,
    pub b: Anchor<B>,
    /// Rest length.
    pub length: f64,
    /// Fraction of the length error corrected per step, in (0, 1].
    pub stiffness: f64,
    /// Fraction of relative velocity along the constraint removed per step, in [0, 1].
    pub damping: f64,
}

impl<B> Constraint<B> {
    /// Change the way the bodies of this constraint are referred to.
    pub fn map_bodies<C, E>(
        self,
        mut f: impl FnMut(B) -> Result<C, E>,
    ) -> Result<Constraint<C>, E> {
        Ok(Constraint {
            a: self.a.map_body(&mut f)?,
            b: self.b.map_body(&mut f)?,
            length: self.length,
            stiffness: self.stiffness,
            damping: self.damping,
        })
    }
}

impl Constraint<BodyKey> {
    /// Keys of the bodies this constraint is attached to.
    #[inline]
    pub fn bodies(&self) -> [Option<BodyKey>; 2] {
        [self.a.body_ref().copied(), self.b.body_ref().copied()]
    }
}

/// A builder that allows ergonomic construction of constraints.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintBuilder<B = BodyKey> {
    a: Anchor<B>,
    b: Anchor<B>,
    length: Option<f64>,
    stiffness: f64,
    damping: f64,
}

impl<B> ConstraintBuilder<B> {
    /// Start building a constraint.
    ///
    /// If you don't attach the other end with `with_b`,
    /// it will be attached to the world origin.
    pub fn new(a: Anchor<B>) -> Self {
        Self {
            a,
            b: Anchor::World(m::Vec2::zero()),
            length: None,
            stiffness: 1.0,
            damping: 0.0,
        }
    }

    pub fn with_b(mut self, b: Anchor<B>) -> Self {
        self.b = b;
        self
    }

    /// Set the rest length. If it isn't set, the distance between the anchors
    /// at the time the constraint is added to a world is used.
    pub fn with_length(mut self, length: f64) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the stiffness, 1 being completely rigid.
    pub fn with_stiffness(mut self, stiffness: f64) -> Self {
        self.stiffness = stiffness;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    #[inline]
    pub fn anchors(&self) -> [&Anchor<B>; 2] {
        [&self.a, &self.b]
    }

    #[inline]
    pub fn length(&self) -> Option<f64> {
        self.length
    }

    /// Change the way the bodies of this constraint are referred to.
    pub fn map_bodies<C, E>(
        self,
        mut f: impl FnMut(B) -> Result<C, E>,
    ) -> Result<ConstraintBuilder<C>, E> {
        Ok(ConstraintBuilder {
            a: self.a.map_body(&mut f)?,
            b: self.b.map_body(&mut f)?,
            length: self.length,
            stiffness: self.stiffness,
            damping: self.damping,
        })
    }

    /// Replace both anchors with the result of a function.
    pub fn map_anchors(self, mut f: impl FnMut(Anchor<B>) -> Anchor<B>) -> Self {
        ConstraintBuilder {
            a: f(self.a),
            b: f(self.b),
            length: self.length,
            stiffness: self.stiffness,
            damping: self.damping,
        }
    }

    /// Check that the parameters describe a valid constraint.
    pub fn validate(&self) -> Result<(), ConstraintError>
    where
        B: PartialEq,
    {
        match (self.a.body_ref(), self.b.body_ref()) {
            (None, None) => return Err(ConstraintError::NoBody),
            (Some(a), Some(b)) if a == b => return Err(ConstraintError::SameBody),
            _ => {}
        }
        if !(self.stiffness > 0.0 && self.stiffness <= 1.0) {
            return Err(ConstraintError::InvalidStiffness(self.stiffness));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(ConstraintError::InvalidDamping(self.damping));
        }
        if let Some(length) = self.length {
            if !(length.is_finite() && length >= 0.0) {
                return Err(ConstraintError::InvalidLength(length));
            }
        }
        if !(m::is_finite_vec(self.a.offset()) && m::is_finite_vec(self.b.offset())) {
            return Err(ConstraintError::NonFiniteAnchor);
        }
        Ok(())
    }

    /// Validate and build the constraint,
    /// using `measured_length` as the rest length if none was set.
    pub fn build_resolved(self, measured_length: f64) -> Result<Constraint<B>, ConstraintError>
    where
        B: PartialEq,
    {
        self.validate()?;
        let length = self.length.unwrap_or(measured_length);
        if !(length.is_finite() && length >= 0.0) {
            return Err(ConstraintError::InvalidLength(length));
        }
        Ok(Constraint {
            a: self.a,
            b: self.b,
            length,
            stiffness: self.stiffness,
            damping: self.damping,
        })
    }
}
