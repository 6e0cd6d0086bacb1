//! 2D rigid body physics built on Extended Position Based Dynamics,
//! with a collection of interactive demo scenes.

/// Open a Tracy profiling zone that lasts until the returned value is dropped.
/// Does nothing unless the `tracy` feature is enabled and a profiler is connected.
macro_rules! tracy_span {
    ($name:literal, $fn_name:literal) => {
        tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!($name), 0))
    };
}

pub mod math;
#[cfg(feature = "serde-types")]
pub use math::serde_pose;
pub use math::{uv, Angle, Pose, Rotor2, Unit, Vec2};

pub mod physics;
pub use physics::{
    collision::{self, BroadPhaseKind, CollisionFilter, Contact, ContactResult, AABB},
    composite::{Attach, Composite, CompositeDesc},
    events::{CollisionEvent, EventKind, Subscription, WorldEvent},
    Anchor, Body, BodyGravity, BodyKey, BodyView, CombineRule, Constraint, ConstraintBuilder,
    ConstraintError, ConstraintKey, EntityKey, Mass, Material, PhysicsError, PhysicsWorld, Shape,
    ShapeError, TuningConstants, Velocity, WorldSnapshot,
};

pub mod runner;
pub use runner::Runner;

pub mod scene;
pub use scene::{Demo, Scene, SceneKind};
