use crate::math as m;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AABB {
    pub min: m::Vec2,
    pub max: m::Vec2,
}

impl AABB {
    #[inline]
    pub fn zero() -> Self {
        Self {
            min: m::Vec2::zero(),
            max: m::Vec2::zero(),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn center(&self) -> m::Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Check if two boxes overlap. Boxes that only touch at the edges overlap too.
    #[inline]
    pub fn overlaps(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Get the overlapping area of two boxes, if there is any.
    pub fn intersection(&self, other: &AABB) -> Option<AABB> {
        if !self.overlaps(other) {
            return None;
        }
        Some(AABB {
            min: self.min.max_by_component(other.min),
            max: self.max.min_by_component(other.max),
        })
    }

    /// Smallest box containing both boxes.
    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// Extend the box in the direction of a displacement,
    /// so that it covers everything this box passes over when moved by it.
    pub fn extended(&self, displacement: m::Vec2) -> AABB {
        let moved = AABB {
            min: self.min + displacement,
            max: self.max + displacement,
        };
        self.union(&moved)
    }

    /// Grow the box by the same amount on every side.
    #[inline]
    pub fn padded(&self, amount: f64) -> AABB {
        let pad = m::Vec2::new(amount, amount);
        AABB {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    #[inline]
    pub fn contains_point(&self, point: m::Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(min: [f64; 2], max: [f64; 2]) -> AABB {
        AABB {
            min: m::Vec2::new(min[0], min[1]),
            max: m::Vec2::new(max[0], max[1]),
        }
    }

    #[test]
    fn overlap_and_intersection() {
        let a = aabb([0.0, 0.0], [2.0, 2.0]);
        let b = aabb([1.0, 1.5], [3.0, 4.0]);
        let c = aabb([2.5, 0.0], [3.0, 1.0]);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersection(&b), Some(aabb([1.0, 1.5], [2.0, 2.0])));
        assert_eq!(a.intersection(&c), None);
        // touching edges count
        assert!(a.overlaps(&aabb([2.0, 0.0], [3.0, 1.0])));
    }

    #[test]
    fn extended_covers_motion() {
        let a = aabb([0.0, 0.0], [1.0, 1.0]);
        let ext = a.extended(m::Vec2::new(-2.0, 0.5));
        assert_eq!(ext, aabb([-2.0, 0.0], [1.0, 1.5]));
        assert!((ext.width() - 3.0).abs() < 1e-12);
        assert!((ext.height() - 1.5).abs() < 1e-12);
    }
}
