use crate::{
    math as m,
    physics::{Anchor, BodyKey, ConstraintBuilder, ConstraintKey, PhysicsWorld},
};

/// Stiffness of the spring pulling a grabbed body towards the pointer.
pub const GRAB_STIFFNESS: f64 = 0.2;

/// Dragging bodies around with a pointer, using a spring constraint
/// between the grabbed point on the body and the pointer position.
#[derive(Debug, Default)]
pub struct PointerGrab {
    grab: Option<(BodyKey, ConstraintKey)>,
}

impl PointerGrab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grab the topmost dynamic body at `point`.
    /// Returns the body if a drag was started.
    pub fn press(&mut self, world: &mut PhysicsWorld, point: m::Vec2) -> Option<BodyKey> {
        self.release(world);

        let body_key = world.query_point(point)?;
        let body = world.body(body_key)?;
        if body.is_static() {
            return None;
        }
        let offset = body.pose.inversed() * point;
        let constraint = world
            .add_constraint(
                ConstraintBuilder::new(Anchor::body_point(body_key, offset))
                    .with_b(Anchor::world(point))
                    .with_length(0.0)
                    .with_stiffness(GRAB_STIFFNESS),
            )
            .ok()?;
        self.grab = Some((body_key, constraint));
        Some(body_key)
    }

    /// Move the pointer end of the spring.
    pub fn drag(&mut self, world: &mut PhysicsWorld, point: m::Vec2) {
        let Some((_, constraint)) = self.grab else {
            return;
        };
        match world.constraint_mut(constraint) {
            Some(c) => c.b = Anchor::world(point),
            // the body was removed from under us
            None => self.grab = None,
        }
    }

    pub fn release(&mut self, world: &mut PhysicsWorld) {
        if let Some((_, constraint)) = self.grab.take() {
            // fine if it's already gone
            let _ = world.remove(constraint);
        }
    }

    #[inline]
    pub fn grabbed(&self) -> Option<BodyKey> {
        self.grab.map(|(body, _)| body)
    }
}
