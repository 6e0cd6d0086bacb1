//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// The translation of a body's pose is always its center of mass.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// An angle in either degrees or radians.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    /// Normalize a vector, returning `None` if it's too short to have a direction.
    pub fn try_new(v: Vec2, min_length: f64) -> Option<Self> {
        let mag = v.mag();
        if mag > min_length {
            Some(Unit(v / mag))
        } else {
            None
        }
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    #[inline]
    pub fn into_inner(self) -> Vec2 {
        self.0
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

/// Module to (de)serialize `Pose`s with the serde attribute `#[serde(with = "serde_pose")]`.
///
/// The rotor is stored as is rather than as an angle so that poses round-trip exactly.
#[cfg(feature = "serde-types")]
pub mod serde_pose {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct RawPose {
        translation: [f64; 2],
        rotor: [f64; 2],
    }

    pub fn serialize<S>(pose: &Pose, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::Serialize;
        RawPose {
            translation: [pose.translation.x, pose.translation.y],
            rotor: [pose.rotation.s, pose.rotation.bv.xy],
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pose, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;
        RawPose::deserialize(deserializer).map(|raw| {
            Pose::new(
                Vec2::new(raw.translation[0], raw.translation[1]),
                Rotor2::new(raw.rotor[0], uv::DBivec2::new(raw.rotor[1])),
            )
        })
    }
}

/// Module to (de)serialize `Vec2`s as plain `[x, y]` arrays.
#[cfg(feature = "serde-types")]
pub mod serde_vec2 {
    use super::Vec2;

    pub fn serialize<S>(v: &Vec2, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::Serialize;
        [v.x, v.y].serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;
        <[f64; 2]>::deserialize(deserializer).map(|[x, y]| Vec2::new(x, y))
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// The z component of the 3D cross product of two vectors in the xy plane.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar angular quantity with a vector, `ω × r`.
#[inline]
pub fn cross_scalar(w: f64, r: Vec2) -> Vec2 {
    left_normal(r) * w
}

// pose utils

#[inline]
pub fn is_finite_vec(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

#[inline]
pub fn is_finite_pose(p: &Pose) -> bool {
    is_finite_vec(p.translation) && p.rotation.s.is_finite() && p.rotation.bv.xy.is_finite()
}

/// Rotation angle of a pose in radians, in the range (-π, π].
#[inline]
pub fn angle_of(rotor: Rotor2) -> f64 {
    Angle::from(rotor).rad()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angle_conversions() {
        assert!((Angle::Deg(180.0).rad() - PI).abs() < 1e-12);
        assert!((Angle::Rad(PI / 2.0).deg() - 90.0).abs() < 1e-12);

        let rotor: Rotor2 = Angle::Deg(30.0).into();
        assert!((angle_of(rotor) - Angle::Deg(30.0).rad()).abs() < 1e-9);
    }

    #[test]
    fn rotor_rotates_counterclockwise() {
        let rotor: Rotor2 = Angle::Deg(90.0).into();
        let v = rotor * Vec2::unit_x();
        assert!((v - Vec2::unit_y()).mag() < 1e-9);
    }

    #[test]
    fn cross_products() {
        assert_eq!(cross(Vec2::unit_x(), Vec2::unit_y()), 1.0);
        assert_eq!(cross(Vec2::unit_y(), Vec2::unit_x()), -1.0);
        let v = cross_scalar(2.0, Vec2::new(1.0, 0.0));
        assert_eq!(v, Vec2::new(0.0, 2.0));
    }

    #[test]
    fn unit_try_new_rejects_short_vectors() {
        assert!(Unit::try_new(Vec2::new(1e-12, 0.0), 1e-9).is_none());
        let u = Unit::try_new(Vec2::new(3.0, 4.0), 1e-9).unwrap();
        assert!((u.mag() - 1.0).abs() < 1e-12);
    }
}
