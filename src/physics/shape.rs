//! Geometric shapes of bodies.

use super::collision::AABB;
use crate::math::{self as m, Pose};

/// Anything smaller than this is considered a degenerate edge or area.
const DEGENERATE_EPSILON: f64 = 1e-9;

/// Reasons a shape can be rejected at creation.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum ShapeError {
    #[error("A polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("Shape has non-finite coordinates")]
    NonFinite,
    #[error("Polygon has zero area")]
    ZeroArea,
    #[error("Polygon has two consecutive vertices at the same position")]
    DuplicateVertex,
    #[error("Polygon outline is self-intersecting or not convex")]
    NotConvex,
    #[error("Radius or side length must be positive, got {0}")]
    NonPositiveSize(f64),
}

/// The physical shape of a body.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum Shape {
    Circle { r: f64 },
    Polygon(ConvexPolygon),
}

impl Shape {
    /// Create a circle shape from a radius.
    pub fn circle(r: f64) -> Result<Self, ShapeError> {
        if !r.is_finite() {
            return Err(ShapeError::NonFinite);
        }
        if r <= 0.0 {
            return Err(ShapeError::NonPositiveSize(r));
        }
        Ok(Shape::Circle { r })
    }

    /// Create an axis-aligned rectangle centered on the origin.
    pub fn rect(width: f64, height: f64) -> Result<Self, ShapeError> {
        for side in [width, height] {
            if !side.is_finite() {
                return Err(ShapeError::NonFinite);
            }
            if side <= 0.0 {
                return Err(ShapeError::NonPositiveSize(side));
            }
        }
        let hw = width / 2.0;
        let hh = height / 2.0;
        ConvexPolygon::new(&[
            m::Vec2::new(-hw, -hh),
            m::Vec2::new(hw, -hh),
            m::Vec2::new(hw, hh),
            m::Vec2::new(-hw, hh),
        ])
        .map(Shape::Polygon)
    }

    /// Create a regular polygon with the given number of sides,
    /// with vertices at distance `radius` from the center.
    pub fn regular_polygon(sides: usize, radius: f64) -> Result<Self, ShapeError> {
        if sides < 3 {
            return Err(ShapeError::TooFewVertices(sides));
        }
        if !radius.is_finite() {
            return Err(ShapeError::NonFinite);
        }
        if radius <= 0.0 {
            return Err(ShapeError::NonPositiveSize(radius));
        }
        // rotated by half a segment so that one edge is flat on the bottom
        let theta = 2.0 * std::f64::consts::PI / sides as f64;
        let offset = -std::f64::consts::FRAC_PI_2 - theta * 0.5;
        let verts: Vec<m::Vec2> = (0..sides)
            .map(|i| {
                let ang = offset + theta * i as f64;
                m::Vec2::new(radius * ang.cos(), radius * ang.sin())
            })
            .collect();
        ConvexPolygon::new(&verts).map(Shape::Polygon)
    }

    /// Create a convex polygon from vertices in either winding order.
    ///
    /// The vertices are moved so that the centroid of the polygon is at the origin.
    pub fn polygon(vertices: &[m::Vec2]) -> Result<Self, ShapeError> {
        ConvexPolygon::new(vertices).map(Shape::Polygon)
    }

    pub fn area(&self) -> f64 {
        match self {
            Shape::Circle { r } => std::f64::consts::PI * r * r,
            Shape::Polygon(poly) => poly.area,
        }
    }

    /// Second moment of area about the centroid.
    /// Multiplied by density, this gives the moment of inertia.
    pub fn second_moment_of_area(&self) -> f64 {
        match self {
            Shape::Circle { r } => std::f64::consts::PI * r.powi(4) / 2.0,
            Shape::Polygon(poly) => poly.second_moment,
        }
    }

    /// Distance from the center to the farthest point of the shape.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Shape::Circle { r } => *r,
            Shape::Polygon(poly) => poly
                .vertices
                .iter()
                .map(|v| v.mag())
                .fold(0.0, f64::max),
        }
    }

    /// Get the axis-aligned bounding box of the shape in the given pose.
    pub fn aabb(&self, pose: &Pose) -> AABB {
        match self {
            Shape::Circle { r } => {
                let rv = m::Vec2::new(*r, *r);
                AABB {
                    min: pose.translation - rv,
                    max: pose.translation + rv,
                }
            }
            Shape::Polygon(poly) => {
                let mut verts = poly.vertices.iter().map(|v| *pose * *v);
                // polygons always have at least 3 vertices
                let first = verts.next().unwrap_or(pose.translation);
                verts.fold(AABB { min: first, max: first }, |acc, v| AABB {
                    min: acc.min.min_by_component(v),
                    max: acc.max.max_by_component(v),
                })
            }
        }
    }

    /// Check whether or not a point in world space is inside the shape in the given pose.
    pub fn contains_point(&self, pose: &Pose, point: m::Vec2) -> bool {
        let p_local = pose.inversed() * point;
        match self {
            Shape::Circle { r } => p_local.mag_sq() < r * r,
            Shape::Polygon(poly) => poly
                .vertices
                .iter()
                .zip(&poly.normals)
                .all(|(v, n)| (p_local - *v).dot(*n) < 0.0),
        }
    }
}

/// A convex polygon with counterclockwise vertices centered on the centroid.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "PolygonVertices", into = "PolygonVertices")
)]
pub struct ConvexPolygon {
    vertices: Vec<m::Vec2>,
    /// Outward normal of the edge from `vertices[i]` to `vertices[i + 1]`.
    normals: Vec<m::Vec2>,
    area: f64,
    second_moment: f64,
}

impl ConvexPolygon {
    /// Validate and create a polygon.
    pub fn new(vertices: &[m::Vec2]) -> Result<Self, ShapeError> {
        if vertices.len() < 3 {
            return Err(ShapeError::TooFewVertices(vertices.len()));
        }
        if !vertices.iter().all(|v| m::is_finite_vec(*v)) {
            return Err(ShapeError::NonFinite);
        }

        let mut verts = vertices.to_vec();
        let signed_area = signed_area(&verts);
        if signed_area.abs() < DEGENERATE_EPSILON {
            return Err(ShapeError::ZeroArea);
        }
        if signed_area < 0.0 {
            verts.reverse();
        }

        let n = verts.len();
        for i in 0..n {
            let edge = verts[(i + 1) % n] - verts[i];
            if edge.mag_sq() < DEGENERATE_EPSILON * DEGENERATE_EPSILON {
                return Err(ShapeError::DuplicateVertex);
            }
        }

        // every turn must be to the left (counterclockwise), and the edges must wind around
        // exactly once. the second check catches star shapes whose turns are all to the left
        let mut total_turn = 0.0;
        for i in 0..n {
            let e1 = verts[(i + 1) % n] - verts[i];
            let e2 = verts[(i + 2) % n] - verts[(i + 1) % n];
            let turn = m::cross(e1, e2);
            if turn < -DEGENERATE_EPSILON {
                return Err(ShapeError::NotConvex);
            }
            total_turn += turn.atan2(e1.dot(e2));
        }
        if (total_turn - 2.0 * std::f64::consts::PI).abs() > 1e-6 {
            return Err(ShapeError::NotConvex);
        }

        let area = signed_area.abs();
        let centroid = centroid(&verts, area);
        for v in &mut verts {
            *v -= centroid;
        }

        let normals = (0..n)
            .map(|i| m::right_normal(verts[(i + 1) % n] - verts[i]).normalized())
            .collect();

        // triangle fan formula for the polar moment of a polygon about its centroid
        let mut second_moment = 0.0;
        for i in 0..n {
            let a = verts[i];
            let b = verts[(i + 1) % n];
            second_moment += m::cross(a, b) * (a.dot(a) + a.dot(b) + b.dot(b));
        }
        second_moment /= 12.0;

        Ok(ConvexPolygon {
            vertices: verts,
            normals,
            area,
            second_moment,
        })
    }

    #[inline]
    pub fn vertices(&self) -> &[m::Vec2] {
        &self.vertices
    }

    #[inline]
    pub fn normals(&self) -> &[m::Vec2] {
        &self.normals
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

fn signed_area(verts: &[m::Vec2]) -> f64 {
    let n = verts.len();
    (0..n)
        .map(|i| m::cross(verts[i], verts[(i + 1) % n]))
        .sum::<f64>()
        / 2.0
}

fn centroid(verts: &[m::Vec2], area: f64) -> m::Vec2 {
    let n = verts.len();
    let mut c = m::Vec2::zero();
    for i in 0..n {
        let a = verts[i];
        let b = verts[(i + 1) % n];
        c += (a + b) * m::cross(a, b);
    }
    c / (6.0 * area)
}

/// Serialized form of a polygon, re-validated when deserialized.
#[cfg(feature = "serde-types")]
#[derive(serde::Serialize, serde::Deserialize)]
struct PolygonVertices(Vec<[f64; 2]>);

#[cfg(feature = "serde-types")]
impl TryFrom<PolygonVertices> for ConvexPolygon {
    type Error = ShapeError;

    fn try_from(raw: PolygonVertices) -> Result<Self, Self::Error> {
        let verts: Vec<m::Vec2> = raw.0.iter().map(|[x, y]| m::Vec2::new(*x, *y)).collect();
        ConvexPolygon::new(&verts)
    }
}

#[cfg(feature = "serde-types")]
impl From<ConvexPolygon> for PolygonVertices {
    fn from(poly: ConvexPolygon) -> Self {
        PolygonVertices(poly.vertices.iter().map(|v| [v.x, v.y]).collect())
    }
}
