//! Interactive demo scenes built on the physics world.
//!
//! A scene sets up bodies and constraints, then keeps them interesting
//! with timed actions like spawning new bodies or changing gravity.
//! Each scene owns its timers and event subscriptions and releases them in
//! [`teardown`][Scene::teardown], so switching between scenes leaves nothing behind.
//!
//! World units are metres with the y axis pointing up.
//! The visible area is [`WIDTH`] × [`HEIGHT`] with the origin at the bottom left corner.

use crate::{
    math as m,
    physics::{BodyKey, Composite, PhysicsError, PhysicsWorld, Subscription},
};

use rand::{rngs::StdRng, SeedableRng};

mod demo;
pub use demo::Demo;

mod pointer;
pub use pointer::PointerGrab;

mod presets;

pub mod ragdoll;

mod timer;
pub use timer::Timer;

/// Width of the visible area in metres.
pub const WIDTH: f64 = 12.0;
/// Height of the visible area in metres.
pub const HEIGHT: f64 = 8.0;
/// Magnitude of standard gravity.
pub const GRAVITY: f64 = 9.81;

/// The available demo scenes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SceneKind {
    /// A few shapes, with more dropping from the top every second.
    Basic,
    /// Balls in a closed box with the direction of gravity changing.
    Gravity,
    /// Balls in a closed box that each have their own gravity.
    GravityStrength,
    /// Springy pendulums.
    Constraints,
    /// A car on sprung wheels driving over bumpy terrain.
    Car,
    /// Block towers with heavy balls dropping on them.
    Stack,
    /// A pyramid of blocks that explodes when grabbed.
    Pyramid,
    NewtonCradle,
    Ragdoll,
}

impl SceneKind {
    pub const ALL: [SceneKind; 9] = [
        SceneKind::Basic,
        SceneKind::Gravity,
        SceneKind::GravityStrength,
        SceneKind::Constraints,
        SceneKind::Car,
        SceneKind::Stack,
        SceneKind::Pyramid,
        SceneKind::NewtonCradle,
        SceneKind::Ragdoll,
    ];

    /// Stable textual identifier, used for example in command line arguments.
    pub fn id(&self) -> &'static str {
        match self {
            SceneKind::Basic => "basic",
            SceneKind::Gravity => "gravity",
            SceneKind::GravityStrength => "gravity-strength",
            SceneKind::Constraints => "constraints",
            SceneKind::Car => "car",
            SceneKind::Stack => "stack",
            SceneKind::Pyramid => "pyramid",
            SceneKind::NewtonCradle => "newton-cradle",
            SceneKind::Ragdoll => "ragdoll",
        }
    }
}

impl std::fmt::Display for SceneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("Unknown scene '{0}'")]
pub struct SceneParseError(pub String);

impl std::str::FromStr for SceneKind {
    type Err = SceneParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SceneKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| SceneParseError(s.to_string()))
    }
}

/// Things scenes do periodically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    SpawnShape,
    RandomizeGravity,
    DriveCar,
    DropHeavyBall,
    RefillPyramid,
    KickCradle,
}

/// Bodies of the car scene.
#[derive(Clone, Copy, Debug)]
struct Car {
    chassis: BodyKey,
    wheels: [BodyKey; 2],
}

/// State specific to one kind of scene.
#[derive(Debug, Default)]
enum SceneState {
    #[default]
    Empty,
    Car(Car),
    Pyramid {
        /// Seconds until the next explosion is allowed.
        explosion_cooldown: f64,
    },
    Cradles(Vec<Composite>),
    Ragdolls {
        ragdolls: Vec<Composite>,
        next_group: i32,
    },
}

/// A running demo scene.
pub struct Scene {
    kind: SceneKind,
    rng: StdRng,
    timers: Vec<(Timer, Action)>,
    subscriptions: Vec<Subscription>,
    pointer: PointerGrab,
    state: SceneState,
}

impl Scene {
    /// Populate `world` with a scene.
    ///
    /// The world should be empty. All randomness comes from `seed`.
    pub fn setup(
        kind: SceneKind,
        world: &mut PhysicsWorld,
        seed: u64,
    ) -> Result<Self, PhysicsError> {
        let mut scene = Scene {
            kind,
            rng: StdRng::seed_from_u64(seed),
            timers: Vec::new(),
            subscriptions: Vec::new(),
            pointer: PointerGrab::new(),
            state: SceneState::Empty,
        };
        presets::build(&mut scene, world)?;
        log::info!(
            "Set up scene '{}' with {} bodies and {} constraints",
            kind,
            world.body_count(),
            world.constraint_count()
        );
        Ok(scene)
    }

    #[inline]
    pub fn kind(&self) -> SceneKind {
        self.kind
    }

    /// Advance timers, run their actions and step the world.
    ///
    /// Timers run on simulation time, so they stop while the world is paused.
    pub fn update(&mut self, world: &mut PhysicsWorld, dt: f64) {
        let sim_dt = dt * world.time_scale();
        let mut due = Vec::new();
        for (timer, action) in &mut self.timers {
            for _ in 0..timer.tick(sim_dt) {
                due.push(*action);
            }
        }
        for action in due {
            if let Err(err) = presets::run_action(self, world, action) {
                log::warn!("Scene action {action:?} failed: {err}");
            }
        }
        if let SceneState::Pyramid { explosion_cooldown } = &mut self.state {
            *explosion_cooldown = (*explosion_cooldown - sim_dt).max(0.0);
        }
        world.step(dt);
    }

    /// React to a pointer press at `point` in world coordinates.
    /// Grabs the dynamic body under the pointer, if any.
    pub fn pointer_down(&mut self, world: &mut PhysicsWorld, point: m::Vec2) {
        if let Some(body) = self.pointer.press(world, point) {
            self.drag_started(world, body);
        }
        if let Err(err) = presets::pointer_down(self, world, point) {
            log::warn!("Scene pointer action failed: {err}");
        }
    }

    /// Drag the grabbed body, if there is one, towards `point`.
    pub fn pointer_move(&mut self, world: &mut PhysicsWorld, point: m::Vec2) {
        self.pointer.drag(world, point);
    }

    pub fn pointer_up(&mut self, world: &mut PhysicsWorld) {
        self.pointer.release(world);
    }

    /// The body currently being dragged.
    #[inline]
    pub fn grabbed(&self) -> Option<BodyKey> {
        self.pointer.grabbed()
    }

    /// React to the pointer starting to drag `body`.
    pub fn drag_started(&mut self, world: &mut PhysicsWorld, body: BodyKey) {
        presets::drag_started(self, world, body);
    }

    /// Release everything this scene created
    /// and restore the world's default configuration.
    pub fn teardown(mut self, world: &mut PhysicsWorld) {
        self.pointer.release(world);
        for sub in &self.subscriptions {
            world.off(*sub);
        }
        world.clear();
        world.set_gravity(0.0, -GRAVITY);
        world.set_time_scale(1.0);
        log::info!("Tore down scene '{}'", self.kind);
    }

    fn add_timer(&mut self, interval: f64, action: Action) {
        self.timers.push((Timer::new(interval), action));
    }
}
