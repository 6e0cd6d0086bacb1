//! Groups of bodies and constraints that are added and removed together.

use super::{
    Anchor, Body, BodyKey, ConstraintBuilder, ConstraintError, ConstraintKey, EntityKey,
    PhysicsError, PhysicsWorld,
};
use crate::math as m;

/// What a constraint end in a [`CompositeDesc`] is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attach {
    /// A body of the same description, by its index in `bodies`.
    Member(usize),
    /// A body already in the world.
    Body(BodyKey),
}

/// Description of a composite, ready to be added to a world.
///
/// Constraints refer to the description's own bodies with [`Attach::Member`].
/// Children are added after the parent and can refer to the parent's bodies
/// only via keys, which makes them independent descriptions.
#[derive(Clone, Debug, Default)]
pub struct CompositeDesc {
    pub name: String,
    pub bodies: Vec<Body>,
    pub constraints: Vec<ConstraintBuilder<Attach>>,
    pub children: Vec<CompositeDesc>,
}

impl CompositeDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a body, returning its member index.
    pub fn add_body(&mut self, body: Body) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn add_constraint(&mut self, constraint: ConstraintBuilder<Attach>) {
        self.constraints.push(constraint);
    }

    pub fn add_child(&mut self, child: CompositeDesc) {
        self.children.push(child);
    }

    /// Move every body, including those of children, by `offset`.
    /// World anchors are moved as well.
    pub fn translate(&mut self, offset: m::Vec2) {
        for body in &mut self.bodies {
            body.pose.append_translation(offset);
        }
        for constraint in &mut self.constraints {
            *constraint = constraint.map_anchors(|anchor| match anchor {
                Anchor::World(p) => Anchor::World(p + offset),
                other => other,
            });
        }
        for child in &mut self.children {
            child.translate(offset);
        }
    }

    /// Total number of bodies including children.
    pub fn body_count(&self) -> usize {
        self.bodies.len() + self.children.iter().map(|c| c.body_count()).sum::<usize>()
    }

    /// Check that everything in the description can be added to `world`.
    pub(super) fn validate(&self, world: &PhysicsWorld) -> Result<(), PhysicsError> {
        for constraint in &self.constraints {
            constraint.validate()?;
            for anchor in constraint.anchors() {
                match anchor.body_ref() {
                    Some(Attach::Member(i)) if *i >= self.bodies.len() => {
                        return Err(ConstraintError::UnknownMember(*i, self.bodies.len()).into());
                    }
                    Some(Attach::Body(key)) if world.body(*key).is_none() => {
                        return Err(PhysicsError::UnknownEntity(EntityKey::Body(*key)));
                    }
                    _ => {}
                }
            }
        }
        self.children.iter().try_for_each(|c| c.validate(world))
    }
}

/// Keys of the things a [`CompositeDesc`] created in a world.
///
/// This only refers to things, it doesn't own them,
/// so removing a member directly leaves a stale key here.
/// Use [`retain_live`][Self::retain_live] to clean those up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composite {
    pub name: String,
    pub bodies: Vec<BodyKey>,
    pub constraints: Vec<ConstraintKey>,
    pub children: Vec<Composite>,
}

impl Composite {
    /// Bodies of this composite and all its children.
    pub fn all_bodies(&self) -> Vec<BodyKey> {
        let mut out = self.bodies.clone();
        for child in &self.children {
            out.extend(child.all_bodies());
        }
        out
    }

    /// Constraints of this composite and all its children.
    pub fn all_constraints(&self) -> Vec<ConstraintKey> {
        let mut out = self.constraints.clone();
        for child in &self.children {
            out.extend(child.all_constraints());
        }
        out
    }

    /// Drop keys that no longer exist in `world`.
    pub fn retain_live(&mut self, world: &PhysicsWorld) {
        self.bodies.retain(|&k| world.contains(k));
        self.constraints.retain(|&k| world.contains(k));
        for child in &mut self.children {
            child.retain_live(world);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
            && self.constraints.is_empty()
            && self.children.iter().all(|c| c.is_empty())
    }
}

impl PhysicsWorld {
    /// Add every body and constraint of a description.
    ///
    /// The whole description is validated first,
    /// and nothing is added if any part of it is invalid.
    pub fn add_composite(&mut self, desc: CompositeDesc) -> Result<Composite, PhysicsError> {
        desc.validate(self)?;
        Ok(self.insert_composite(desc))
    }

    fn insert_composite(&mut self, desc: CompositeDesc) -> Composite {
        let bodies: Vec<BodyKey> = desc.bodies.into_iter().map(|b| self.add_body(b)).collect();

        let mut constraints = Vec::with_capacity(desc.constraints.len());
        for builder in desc.constraints {
            let resolved = builder.map_bodies(|attach| match attach {
                Attach::Member(i) => bodies.get(i).copied().ok_or(()),
                Attach::Body(key) => Ok(key),
            });
            // validation guarantees all of these succeed
            match resolved.map(|b| self.add_constraint(b)) {
                Ok(Ok(key)) => constraints.push(key),
                _ => log::warn!("Composite '{}' had an invalid constraint", desc.name),
            }
        }

        let children = desc
            .children
            .into_iter()
            .map(|c| self.insert_composite(c))
            .collect();

        log::debug!(
            "Added composite '{}' with {} bodies and {} constraints",
            desc.name,
            bodies.len(),
            constraints.len()
        );
        Composite {
            name: desc.name,
            bodies,
            constraints,
            children,
        }
    }

    /// Remove every member of a composite that still exists.
    pub fn remove_composite(&mut self, composite: &Composite) {
        let constraints = composite.all_constraints().into_iter().map(EntityKey::from);
        let bodies = composite.all_bodies().into_iter().map(EntityKey::from);
        self.remove_all(constraints.chain(bodies));
    }
}
