use super::{Scene, SceneKind};
use crate::{
    math as m,
    physics::{BodyView, PhysicsError, PhysicsWorld},
    runner::Runner,
};

use std::time::Duration;

/// Steps per second the demo runs at.
pub const STEP_RATE: u32 = 60;

/// Everything needed to run the demo scenes interactively:
/// a world, the active scene and fixed timestep running.
///
/// Input coordinates are in world space; converting from screen space
/// is up to whoever is drawing the bodies.
pub struct Demo {
    world: PhysicsWorld,
    scene: Option<Scene>,
    runner: Runner,
    seed: u64,
}

impl Demo {
    pub fn new(kind: SceneKind, seed: u64) -> Result<Self, PhysicsError> {
        let mut demo = Self {
            world: PhysicsWorld::default(),
            scene: None,
            runner: Runner::new(STEP_RATE),
            seed,
        };
        demo.switch_to(kind)?;
        Ok(demo)
    }

    /// Tear down the current scene and set up another one.
    pub fn switch_to(&mut self, kind: SceneKind) -> Result<(), PhysicsError> {
        if let Some(scene) = self.scene.take() {
            scene.teardown(&mut self.world);
        }
        self.runner.reset();
        self.scene = Some(Scene::setup(kind, &mut self.world, self.seed)?);
        Ok(())
    }

    #[inline]
    pub fn kind(&self) -> Option<SceneKind> {
        self.scene.as_ref().map(|s| s.kind())
    }

    /// Advance by `elapsed` real time. Returns the number of steps run.
    pub fn frame(&mut self, elapsed: Duration) -> usize {
        let Demo {
            world,
            scene,
            runner,
            ..
        } = self;
        runner.advance_with(elapsed, |dt| match scene.as_mut() {
            Some(scene) => scene.update(world, dt),
            None => world.step(dt),
        })
    }

    pub fn pointer_down(&mut self, point: m::Vec2) {
        if let Some(scene) = &mut self.scene {
            scene.pointer_down(&mut self.world, point);
        }
    }

    pub fn pointer_move(&mut self, point: m::Vec2) {
        if let Some(scene) = &mut self.scene {
            scene.pointer_move(&mut self.world, point);
        }
    }

    pub fn pointer_up(&mut self) {
        if let Some(scene) = &mut self.scene {
            scene.pointer_up(&mut self.world);
        }
    }

    #[inline]
    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    #[inline]
    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }

    /// Poses and shapes of every body, for drawing.
    pub fn bodies(&self) -> Vec<BodyView> {
        self.world.snapshot_bodies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_scenes_cleans_up() {
        let mut demo = Demo::new(SceneKind::Car, 1).unwrap();
        assert_eq!(demo.kind(), Some(SceneKind::Car));
        assert_eq!(demo.world().listener_count(), 1);
        assert_eq!(demo.frame(Duration::from_millis(50)), 3);

        demo.switch_to(SceneKind::Pyramid).unwrap();
        assert_eq!(demo.world().listener_count(), 0);
        assert_eq!(demo.world().body_count(), 211);
        assert_eq!(demo.bodies().len(), 211);
    }

    #[test]
    fn pointer_drags_and_releases() {
        let mut demo = Demo::new(SceneKind::Pyramid, 1).unwrap();
        demo.pointer_down(m::Vec2::new(6.1, 0.4));
        assert_eq!(demo.world().constraint_count(), 1);
        demo.pointer_move(m::Vec2::new(6.1, 2.0));
        demo.frame(Duration::from_millis(100));
        demo.pointer_up();
        assert_eq!(demo.world().constraint_count(), 0);

        // the grab spring doesn't survive a scene switch either
        demo.pointer_down(m::Vec2::new(6.1, 0.4));
        demo.switch_to(SceneKind::Basic).unwrap();
        assert_eq!(demo.world().constraint_count(), 0);
        assert_eq!(demo.world().body_count(), 4);
    }
}
