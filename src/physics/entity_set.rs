use super::{Body, Constraint};

use thunderdome as td;

/// Key type to look up a body stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyKey(pub(super) td::Index);

impl BodyKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from bodies to other things.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Key type to look up a constraint stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintKey(pub(super) td::Index);

impl ConstraintKey {
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Any kind of thing that can be stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Body(BodyKey),
    Constraint(ConstraintKey),
}

impl From<BodyKey> for EntityKey {
    fn from(key: BodyKey) -> Self {
        EntityKey::Body(key)
    }
}

impl From<ConstraintKey> for EntityKey {
    fn from(key: ConstraintKey) -> Self {
        EntityKey::Constraint(key)
    }
}

/// Internal storage of objects in the physics world.
///
/// Arena slots get reused after removal, so insertion order is tracked separately.
/// Iteration always happens in insertion order, which keeps stepping deterministic
/// for worlds built with the same sequence of operations.
#[derive(Default)]
pub(crate) struct EntitySet {
    // pub fields instead of immutable accessors, the solver needs to borrow them separately.
    // the invariant that every key in an order list is live must be kept by hand
    pub(super) bodies: td::Arena<Body>,
    pub(super) body_order: Vec<BodyKey>,
    pub(super) constraints: td::Arena<Constraint>,
    pub(super) constraint_order: Vec<ConstraintKey>,
}

impl EntitySet {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get_body(&self, body: BodyKey) -> Option<&Body> {
        self.bodies.get(body.0)
    }

    #[inline]
    pub fn get_body_mut(&mut self, body: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(body.0)
    }

    #[inline]
    pub fn get_constraint(&self, constraint: ConstraintKey) -> Option<&Constraint> {
        self.constraints.get(constraint.0)
    }

    #[inline]
    pub fn get_constraint_mut(&mut self, constraint: ConstraintKey) -> Option<&mut Constraint> {
        self.constraints.get_mut(constraint.0)
    }

    #[inline]
    pub fn contains(&self, key: EntityKey) -> bool {
        match key {
            EntityKey::Body(b) => self.bodies.contains(b.0),
            EntityKey::Constraint(c) => self.constraints.contains(c.0),
        }
    }

    pub fn insert_body(&mut self, body: Body) -> BodyKey {
        let key = BodyKey(self.bodies.insert(body));
        self.body_order.push(key);
        key
    }

    pub fn insert_constraint(&mut self, constraint: Constraint) -> ConstraintKey {
        let key = ConstraintKey(self.constraints.insert(constraint));
        self.constraint_order.push(key);
        key
    }

    /// Remove a body and every constraint attached to it,
    /// returning the body if it still existed.
    pub fn remove_body(&mut self, body: BodyKey) -> Option<Body> {
        let removed = self.bodies.remove(body.0)?;
        self.body_order.retain(|&k| k != body);
        let constraints = &mut self.constraints;
        self.constraint_order.retain(|&k| {
            let attached = constraints
                .get(k.0)
                .map_or(false, |c| c.bodies().contains(&Some(body)));
            if attached {
                constraints.remove(k.0);
            }
            !attached
        });
        Some(removed)
    }

    pub fn remove_constraint(&mut self, constraint: ConstraintKey) -> Option<Constraint> {
        let removed = self.constraints.remove(constraint.0)?;
        self.constraint_order.retain(|&k| k != constraint);
        Some(removed)
    }

    /// Iterate over bodies in insertion order.
    pub fn iter_bodies(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.body_order
            .iter()
            .filter_map(|&k| self.bodies.get(k.0).map(|b| (k, b)))
    }

    /// Iterate mutably over bodies in arbitrary order.
    pub fn iter_bodies_mut(&mut self) -> impl '_ + Iterator<Item = (BodyKey, &mut Body)> {
        self.bodies.iter_mut().map(|(idx, b)| (BodyKey(idx), b))
    }

    /// Iterate over constraints in insertion order.
    pub fn iter_constraints(&self) -> impl '_ + Iterator<Item = (ConstraintKey, &Constraint)> {
        self.constraint_order
            .iter()
            .filter_map(|&k| self.constraints.get(k.0).map(|c| (k, c)))
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.body_order.len()
    }

    #[inline]
    pub fn constraint_count(&self) -> usize {
        self.constraint_order.len()
    }

    // not exposed to users, must use through PhysicsWorld::clear
    pub(super) fn clear(&mut self) {
        self.bodies.clear();
        self.body_order.clear();
        self.constraints.clear();
        self.constraint_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math as m,
        physics::{Anchor, ConstraintBuilder, Shape},
    };

    fn ball() -> Body {
        Body::new(Shape::circle(0.5).unwrap(), m::Vec2::zero())
    }

    #[test]
    fn removing_body_removes_attached_constraints() {
        let mut set = EntitySet::new();
        let a = set.insert_body(ball());
        let b = set.insert_body(ball());
        let c = set.insert_body(ball());
        let link = |x, y| {
            ConstraintBuilder::new(Anchor::body(x))
                .with_b(Anchor::body(y))
                .with_length(1.0)
                .build_resolved(1.0)
        };
        let ab = set.insert_constraint(link(a, b).unwrap());
        let bc = set.insert_constraint(link(b, c).unwrap());

        assert!(set.remove_body(a).is_some());
        assert!(set.remove_body(a).is_none());
        assert!(set.get_constraint(ab).is_none());
        assert!(set.get_constraint(bc).is_some());
        itertools::assert_equal(set.iter_bodies().map(|(k, _)| k), [b, c]);
        itertools::assert_equal(set.iter_constraints().map(|(k, _)| k), [bc]);
    }

    #[test]
    fn iteration_follows_insertion_order_after_slot_reuse() {
        let mut set = EntitySet::new();
        let a = set.insert_body(ball());
        let b = set.insert_body(ball());
        set.remove_body(a);
        // reuses the slot of `a`
        let c = set.insert_body(ball());
        itertools::assert_equal(set.iter_bodies().map(|(k, _)| k), [b, c]);
        assert_eq!(set.body_count(), 2);
    }
}
