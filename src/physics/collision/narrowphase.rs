//! Exact intersection tests between pairs of shapes.

use crate::math::{self as m, Pose, Unit};
use crate::physics::shape::{ConvexPolygon, Shape};

/// Polygon separations closer than this are considered equal
/// when choosing which polygon owns the reference edge.
/// Keeps the choice stable between frames for resting stacks.
const REFERENCE_EDGE_TOLERANCE: f64 = 0.0005;

/// 0-2 points of contact can occur between two 2D objects.
#[derive(Clone, Copy, Debug)]
pub enum ContactResult {
    Zero,
    One(Contact),
    Two(Contact, Contact),
}

impl ContactResult {
    pub fn iter(&self) -> ContactIterator<'_> {
        ContactIterator { cr: self, idx: 0 }
    }

    /// Execute a function on every contact in the result.
    pub fn map(self, f: impl Fn(Contact) -> Contact) -> Self {
        match self {
            ContactResult::Zero => ContactResult::Zero,
            ContactResult::One(c) => ContactResult::One(f(c)),
            ContactResult::Two(c1, c2) => ContactResult::Two(f(c1), f(c2)),
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        matches!(self, ContactResult::Zero)
    }

    /// The deepest contact of the result.
    pub fn deepest(&self) -> Option<&Contact> {
        self.iter()
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
    }

    fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let mut iter = contacts.into_iter();
        match (iter.next(), iter.next()) {
            (Some(c1), Some(c2)) => ContactResult::Two(c1, c2),
            (Some(c), None) | (None, Some(c)) => ContactResult::One(c),
            (None, None) => ContactResult::Zero,
        }
    }
}

/// An iterator over the contacts in a ContactResult.
pub struct ContactIterator<'a> {
    cr: &'a ContactResult,
    idx: u8,
}
impl<'a> Iterator for ContactIterator<'a> {
    type Item = &'a Contact;

    fn next(&mut self) -> Option<Self::Item> {
        self.idx += 1;
        use ContactResult::*;
        match (self.cr, self.idx - 1) {
            (Zero, _) => None,
            (One(c), 0) => Some(c),
            (One(_), _) => None,
            (Two(c1, _), 0) => Some(c1),
            (Two(_, c2), 1) => Some(c2),
            (Two(_, _), _) => None,
        }
    }
}

/// An intersection between two objects.
#[derive(Clone, Copy, Debug)]
pub struct Contact {
    /// The normal, facing away from obj1
    pub normal: Unit<m::Vec2>,
    /// Points of contact on the surface of each object, in object-local space.
    pub offsets: [m::Vec2; 2],
    /// Penetration depth at the time of detection.
    /// The solver recomputes this from `offsets` as bodies move.
    pub depth: f64,
}

impl Contact {
    /// Point of contact on the surface of obj1 in world space.
    #[inline]
    pub fn world_point(&self, pose1: &Pose) -> m::Vec2 {
        *pose1 * self.offsets[0]
    }
}

/// Checks two shapes for intersection.
pub fn intersection_check(
    pose1: &Pose,
    shape1: &Shape,
    pose2: &Pose,
    shape2: &Shape,
) -> ContactResult {
    match (shape1, shape2) {
        (Shape::Circle { r: r1 }, Shape::Circle { r: r2 }) => {
            circle_circle(pose1, *r1, pose2, *r2)
        }
        (Shape::Polygon(poly), Shape::Circle { r }) => polygon_circle(pose1, poly, pose2, *r),
        (Shape::Circle { r }, Shape::Polygon(poly)) => {
            flip_contacts(polygon_circle(pose2, poly, pose1, *r))
        }
        (Shape::Polygon(poly1), Shape::Polygon(poly2)) => {
            polygon_polygon(pose1, poly1, pose2, poly2)
        }
    }
}

fn flip_contacts(contacts: ContactResult) -> ContactResult {
    contacts.map(|c| Contact {
        normal: -c.normal,
        offsets: [c.offsets[1], c.offsets[0]],
        depth: c.depth,
    })
}

//
// CIRCLE <-> CIRCLE
//

fn circle_circle(pose1: &Pose, r1: f64, pose2: &Pose, r2: f64) -> ContactResult {
    let dist = pose2.translation - pose1.translation;
    let dist_sq = dist.mag_sq();
    let r_sum = r1 + r2;

    if dist_sq >= r_sum * r_sum {
        return ContactResult::Zero;
    }
    // same position, consider penetration to be on the x axis
    let normal = Unit::try_new(dist, 1e-9).unwrap_or_else(Unit::unit_x);
    let depth = r_sum - dist_sq.sqrt();

    ContactResult::One(Contact {
        normal,
        offsets: [
            pose1.rotation.reversed() * (r1 * *normal),
            pose2.rotation.reversed() * (-r2 * *normal),
        ],
        depth,
    })
}

//
// POLYGON <-> CIRCLE
//

fn polygon_circle(
    pose_poly: &Pose,
    poly: &ConvexPolygon,
    pose_circle: &Pose,
    r: f64,
) -> ContactResult {
    // work in the polygon's local space
    let center = pose_poly.inversed() * pose_circle.translation;
    let verts = poly.vertices();
    let normals = poly.normals();

    // edge with the largest separation from the circle center
    let mut best_edge = 0;
    let mut best_sep = f64::MIN;
    for (i, (v, n)) in verts.iter().zip(normals).enumerate() {
        let sep = (center - *v).dot(*n);
        if sep > r {
            return ContactResult::Zero;
        }
        if sep > best_sep {
            best_sep = sep;
            best_edge = i;
        }
    }

    let v1 = verts[best_edge];
    let v2 = verts[(best_edge + 1) % verts.len()];
    let edge_normal = normals[best_edge];

    let (normal, surface_point, dist) = if best_sep <= 0.0 {
        // center is inside the polygon, push out through the closest edge
        (edge_normal, center - edge_normal * best_sep, best_sep)
    } else if (center - v1).dot(v2 - v1) <= 0.0 {
        match closest_to_vertex(center, v1, r) {
            Some(result) => result,
            None => return ContactResult::Zero,
        }
    } else if (center - v2).dot(v1 - v2) <= 0.0 {
        match closest_to_vertex(center, v2, r) {
            Some(result) => result,
            None => return ContactResult::Zero,
        }
    } else {
        (edge_normal, center - edge_normal * best_sep, best_sep)
    };

    let circle_point_worldspace = *pose_poly * (center - normal * r);
    ContactResult::One(Contact {
        normal: Unit::new_unchecked(pose_poly.rotation * normal),
        offsets: [
            surface_point,
            pose_circle.inversed() * circle_point_worldspace,
        ],
        depth: r - dist,
    })
}

/// Normal, closest point and distance when the circle center is in a vertex region.
fn closest_to_vertex(center: m::Vec2, vert: m::Vec2, r: f64) -> Option<(m::Vec2, m::Vec2, f64)> {
    let to_center = center - vert;
    let dist_sq = to_center.mag_sq();
    if dist_sq >= r * r {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = Unit::try_new(to_center, 1e-9)
        .map(Unit::into_inner)
        .unwrap_or_else(m::Vec2::unit_y);
    Some((normal, vert, dist))
}

//
// POLYGON <-> POLYGON
//

/// Polygon vertices and normals transformed to world space.
struct WorldPolygon {
    verts: Vec<m::Vec2>,
    normals: Vec<m::Vec2>,
}

impl WorldPolygon {
    fn new(pose: &Pose, poly: &ConvexPolygon) -> Self {
        Self {
            verts: poly.vertices().iter().map(|v| *pose * *v).collect(),
            normals: poly.normals().iter().map(|n| pose.rotation * *n).collect(),
        }
    }

    #[inline]
    fn edge(&self, i: usize) -> [m::Vec2; 2] {
        [self.verts[i], self.verts[(i + 1) % self.verts.len()]]
    }
}

/// Find the edge of `a` along whose normal `b` is the least deep.
/// Positive separation means the polygons don't intersect.
fn max_separation(a: &WorldPolygon, b: &WorldPolygon) -> (usize, f64) {
    let mut best = (0, f64::MIN);
    for (i, (va, na)) in a.verts.iter().zip(&a.normals).enumerate() {
        let sep = b
            .verts
            .iter()
            .map(|vb| (*vb - *va).dot(*na))
            .fold(f64::MAX, f64::min);
        if sep > best.1 {
            best = (i, sep);
        }
    }
    best
}

fn polygon_polygon(
    pose1: &Pose,
    poly1: &ConvexPolygon,
    pose2: &Pose,
    poly2: &ConvexPolygon,
) -> ContactResult {
    let wp1 = WorldPolygon::new(pose1, poly1);
    let wp2 = WorldPolygon::new(pose2, poly2);

    let (edge1, sep1) = max_separation(&wp1, &wp2);
    if sep1 >= 0.0 {
        return ContactResult::Zero;
    }
    let (edge2, sep2) = max_separation(&wp2, &wp1);
    if sep2 >= 0.0 {
        return ContactResult::Zero;
    }

    // the reference edge is on the polygon with the smallest penetration along its normal,
    // penetrating points are found on the other (incident) polygon
    let ref_is_2 = sep2 > sep1 + REFERENCE_EDGE_TOLERANCE;
    let (reference, ref_edge, incident) = if ref_is_2 {
        (&wp2, edge2, &wp1)
    } else {
        (&wp1, edge1, &wp2)
    };
    let ref_normal = reference.normals[ref_edge];

    // incident edge is the one facing most directly against the reference normal
    let inc_edge = incident
        .normals
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.dot(ref_normal).total_cmp(&b.dot(ref_normal)))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let [r1, r2] = reference.edge(ref_edge);
    let Some(tangent) = Unit::try_new(r2 - r1, 1e-12) else {
        return ContactResult::Zero;
    };

    // clip the incident edge to the side planes of the reference edge
    let clipped = clip_segment(incident.edge(inc_edge), -*tangent, -tangent.dot(r1))
        .and_then(|seg| clip_segment(seg, *tangent, tangent.dot(r2)));
    let Some(clipped) = clipped else {
        return ContactResult::Zero;
    };

    let pose1_inv = pose1.inversed();
    let pose2_inv = pose2.inversed();
    let contacts = clipped.into_iter().filter_map(|inc_point| {
        let depth = (r1 - inc_point).dot(ref_normal);
        if depth <= 0.0 {
            return None;
        }
        let ref_point = inc_point + ref_normal * depth;
        Some(if ref_is_2 {
            Contact {
                normal: Unit::new_unchecked(-ref_normal),
                offsets: [pose1_inv * inc_point, pose2_inv * ref_point],
                depth,
            }
        } else {
            Contact {
                normal: Unit::new_unchecked(ref_normal),
                offsets: [pose1_inv * ref_point, pose2_inv * inc_point],
                depth,
            }
        })
    });
    ContactResult::from_contacts(contacts)
}

/// Clip a line segment to the half-plane `dot(normal, p) <= offset`.
fn clip_segment(seg: [m::Vec2; 2], normal: m::Vec2, offset: f64) -> Option<[m::Vec2; 2]> {
    let d0 = normal.dot(seg[0]) - offset;
    let d1 = normal.dot(seg[1]) - offset;
    match (d0 <= 0.0, d1 <= 0.0) {
        (true, true) => Some(seg),
        (false, false) => None,
        _ => {
            let t = d0 / (d0 - d1);
            let crossing = seg[0] + (seg[1] - seg[0]) * t;
            if d0 > 0.0 {
                Some([crossing, seg[1]])
            } else {
                Some([seg[0], crossing])
            }
        }
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Angle;

    fn pose(x: f64, y: f64, deg: f64) -> Pose {
        Pose::new(m::Vec2::new(x, y), Angle::Deg(deg).into())
    }

    /// Depth recomputed the way the solver does it.
    fn solver_depth(c: &Contact, p1: &Pose, p2: &Pose) -> f64 {
        (*p1 * c.offsets[0] - *p2 * c.offsets[1]).dot(*c.normal)
    }

    #[test]
    fn circles() {
        let c = Shape::circle(1.0).unwrap();
        let (p1, p2) = (pose(0.0, 0.0, 0.0), pose(1.5, 0.0, 30.0));
        let res = intersection_check(&p1, &c, &p2, &c);
        let ContactResult::One(contact) = res else {
            panic!("expected one contact, got {:?}", res)
        };
        assert!((*contact.normal - m::Vec2::unit_x()).mag() < 1e-9);
        assert!((contact.depth - 0.5).abs() < 1e-9);
        assert!((solver_depth(&contact, &p1, &p2) - 0.5).abs() < 1e-9);

        let far = pose(2.5, 0.0, 0.0);
        assert!(intersection_check(&p1, &c, &far, &c).is_zero());
    }

    #[test]
    fn box_resting_on_box_gives_two_contacts() {
        let ground = Shape::rect(10.0, 1.0).unwrap();
        let block = Shape::rect(1.0, 1.0).unwrap();
        let (p1, p2) = (pose(0.0, 0.0, 0.0), pose(0.3, 0.95, 0.0));
        let res = intersection_check(&p1, &ground, &p2, &block);
        let ContactResult::Two(c1, c2) = res else {
            panic!("expected two contacts, got {:?}", res)
        };
        for c in [c1, c2] {
            assert!((*c.normal - m::Vec2::unit_y()).mag() < 1e-9);
            assert!((c.depth - 0.05).abs() < 1e-9);
            assert!((solver_depth(&c, &p1, &p2) - 0.05).abs() < 1e-9);
        }
        let xs = [c1.world_point(&p1).x, c2.world_point(&p1).x];
        assert!((xs[0] - xs[1]).abs() > 0.99);
    }

    #[test]
    fn rotated_box_corner_gives_one_contact() {
        let ground = Shape::rect(10.0, 1.0).unwrap();
        let block = Shape::rect(1.0, 1.0).unwrap();
        let half_diag = 0.5 * 2.0_f64.sqrt();
        let (p1, p2) = (pose(0.0, 0.0, 0.0), pose(0.0, 0.5 + half_diag - 0.1, 45.0));
        let res = intersection_check(&p1, &ground, &p2, &block);
        let ContactResult::One(c) = res else {
            panic!("expected one contact, got {:?}", res)
        };
        assert!((*c.normal - m::Vec2::unit_y()).mag() < 1e-9);
        assert!((c.depth - 0.1).abs() < 1e-9);
    }

    #[test]
    fn swapping_shapes_flips_normal() {
        let ground = Shape::rect(10.0, 1.0).unwrap();
        let ball = Shape::circle(0.5).unwrap();
        let (p1, p2) = (pose(0.0, 0.0, 0.0), pose(1.0, 0.9, 0.0));

        let res = intersection_check(&p1, &ground, &p2, &ball);
        let ContactResult::One(c) = res else {
            panic!("expected one contact, got {:?}", res)
        };
        assert!((*c.normal - m::Vec2::unit_y()).mag() < 1e-9);
        assert!((c.depth - 0.1).abs() < 1e-9);

        let res = intersection_check(&p2, &ball, &p1, &ground);
        let ContactResult::One(c) = res else {
            panic!("expected one contact, got {:?}", res)
        };
        assert!((*c.normal + m::Vec2::unit_y()).mag() < 1e-9);
        assert!((solver_depth(&c, &p2, &p1) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn circle_near_polygon_vertex() {
        let block = Shape::rect(1.0, 1.0).unwrap();
        let ball = Shape::circle(0.5).unwrap();
        let p1 = pose(0.0, 0.0, 0.0);
        // diagonally off the top right corner, 0.4 away from it
        let offset = 0.4 / 2.0_f64.sqrt();
        let p2 = pose(0.5 + offset, 0.5 + offset, 0.0);
        let res = intersection_check(&p1, &block, &p2, &ball);
        let ContactResult::One(c) = res else {
            panic!("expected one contact, got {:?}", res)
        };
        let diag = m::Vec2::new(1.0, 1.0).normalized();
        assert!((*c.normal - diag).mag() < 1e-9);
        assert!((c.depth - 0.1).abs() < 1e-9);

        // same direction but out of reach
        let offset = 0.6 / 2.0_f64.sqrt();
        let p2 = pose(0.5 + offset, 0.5 + offset, 0.0);
        assert!(intersection_check(&p1, &block, &p2, &ball).is_zero());
    }

    #[test]
    fn circle_center_inside_polygon() {
        let block = Shape::rect(2.0, 2.0).unwrap();
        let ball = Shape::circle(0.25).unwrap();
        let (p1, p2) = (pose(0.0, 0.0, 0.0), pose(0.0, 0.8, 0.0));
        let res = intersection_check(&p1, &block, &p2, &ball);
        let ContactResult::One(c) = res else {
            panic!("expected one contact, got {:?}", res)
        };
        assert!((*c.normal - m::Vec2::unit_y()).mag() < 1e-9);
        assert!((c.depth - 0.45).abs() < 1e-9);
    }

    #[test]
    fn separated_polygons() {
        let tri = Shape::regular_polygon(3, 1.0).unwrap();
        let hex = Shape::regular_polygon(6, 1.0).unwrap();
        let (p1, p2) = (pose(0.0, 0.0, 10.0), pose(2.1, 0.0, 0.0));
        assert!(intersection_check(&p1, &tri, &p2, &hex).is_zero());
    }
}
