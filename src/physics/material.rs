/// Determines how the surface of a body responds to collisions
/// and how heavy the body is for its size.
///
/// Each body has its own coefficients and pairs of bodies combine them
/// with a [`CombineRule`][self::CombineRule] set in the world's tuning constants.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Material {
    /// Mass per square metre.
    pub density: f64,
    /// Bounciness, 0 to 1.
    pub restitution: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Fraction of velocity lost per second to drag.
    pub air_friction: f64,
    /// Penetration depth that is allowed without positional correction.
    pub slop: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            restitution: 0.0,
            friction: 0.1,
            air_friction: 0.6,
            slop: 0.005,
        }
    }
}

impl Material {
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = sanitize(density, f64::MIN_POSITIVE, f64::MAX, 1.0);
        self
    }

    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = sanitize(restitution, 0.0, 1.0, 0.0);
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = sanitize(friction, 0.0, f64::MAX, 0.0);
        self
    }

    pub fn with_air_friction(mut self, air_friction: f64) -> Self {
        self.air_friction = sanitize(air_friction, 0.0, f64::MAX, 0.0);
        self
    }

    pub fn with_slop(mut self, slop: f64) -> Self {
        self.slop = sanitize(slop, 0.0, f64::MAX, 0.0);
        self
    }
}

#[inline]
fn sanitize(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// How to combine a material coefficient of two bodies in contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum CombineRule {
    Max,
    Min,
    Average,
    Multiply,
}

impl CombineRule {
    #[inline]
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            CombineRule::Max => a.max(b),
            CombineRule::Min => a.min(b),
            CombineRule::Average => (a + b) / 2.0,
            CombineRule::Multiply => a * b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp_into_range() {
        let mat = Material::default()
            .with_restitution(1.5)
            .with_friction(-1.0)
            .with_air_friction(f64::NAN)
            .with_density(0.0);
        assert_eq!(mat.restitution, 1.0);
        assert_eq!(mat.friction, 0.0);
        assert_eq!(mat.air_friction, 0.0);
        assert!(mat.density > 0.0);
    }

    #[test]
    fn combine_rules() {
        assert_eq!(CombineRule::Max.combine(0.2, 0.8), 0.8);
        assert_eq!(CombineRule::Min.combine(0.2, 0.8), 0.2);
        assert_eq!(CombineRule::Average.combine(0.2, 0.8), 0.5);
        assert!((CombineRule::Multiply.combine(0.2, 0.8) - 0.16).abs() < 1e-12);
    }
}
