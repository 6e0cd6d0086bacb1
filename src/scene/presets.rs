//! Contents and behavior of each scene.

use super::{ragdoll, Action, Car, Scene, SceneKind, SceneState, GRAVITY, HEIGHT, WIDTH};
use crate::{
    math::{self as m, Angle},
    physics::{
        composite::{Attach, CompositeDesc},
        Anchor, Body, BodyGravity, BodyKey, CollisionFilter, ConstraintBuilder, EventKind,
        Material, PhysicsError, PhysicsWorld, Shape,
    },
};

use rand::Rng;
use std::f64::consts::TAU;

/// One-off pushes are given as forces acting for one step of this length.
const PUSH_STEP: f64 = 1.0 / 60.0;

const WALL_THICKNESS: f64 = 0.5;

pub(super) const GRAVITY_STRENGTH_START_Y: f64 = 7.0;
pub(super) const MAX_RAGDOLL_BODIES: usize = 100;

const CAR_START: [f64; 2] = [2.0, 2.0];
const CAR_RESET: [f64; 2] = [1.0, 2.0];
const CAR_SPEED: f64 = 5.0;
const WHEEL_BASE: f64 = 1.0;
const WHEEL_DROP: f64 = 0.2;
const DRIVE_KICK_SPEED: f64 = 1.0;

const EXPLOSION_SPEED: f64 = 4.0;
const EXPLOSION_COOLDOWN: f64 = 1.0;
const PYRAMID_MIN_BLOCKS: usize = 50;

const KICK_SPEED: f64 = 2.0;

/// Force that changes the velocity of a body of mass `mass` by `dv` in one step.
fn push_force(mass: f64, dv: m::Vec2) -> m::Vec2 {
    dv * (mass / PUSH_STEP)
}

fn body_mass(world: &PhysicsWorld, key: BodyKey) -> f64 {
    world
        .body(key)
        .and_then(|b| b.mass().value())
        .unwrap_or(0.0)
}

fn wall(position: m::Vec2, width: f64, height: f64) -> Result<Body, PhysicsError> {
    Ok(Body::new_static(Shape::rect(width, height)?, position))
}

fn add_ground(world: &mut PhysicsWorld) -> Result<BodyKey, PhysicsError> {
    let ground = wall(m::Vec2::new(WIDTH / 2.0, 0.0), WIDTH, WALL_THICKNESS)?;
    Ok(world.add_body(ground.with_label("ground")))
}

fn add_closed_box(world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    world.add_body(wall(m::Vec2::new(WIDTH / 2.0, HEIGHT), WIDTH, WALL_THICKNESS)?);
    world.add_body(wall(m::Vec2::new(0.0, HEIGHT / 2.0), WALL_THICKNESS, HEIGHT)?);
    world.add_body(wall(m::Vec2::new(WIDTH, HEIGHT / 2.0), WALL_THICKNESS, HEIGHT)?);
    Ok(())
}

pub(super) fn build(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    match scene.kind {
        SceneKind::Basic => build_basic(scene, world),
        SceneKind::Gravity => build_gravity(scene, world),
        SceneKind::GravityStrength => build_gravity_strength(world),
        SceneKind::Constraints => build_constraints(world),
        SceneKind::Car => build_car(scene, world),
        SceneKind::Stack => build_stack(scene, world),
        SceneKind::Pyramid => build_pyramid(scene, world),
        SceneKind::NewtonCradle => build_newton_cradle(scene, world),
        SceneKind::Ragdoll => build_ragdolls(scene, world),
    }
}

pub(super) fn run_action(
    scene: &mut Scene,
    world: &mut PhysicsWorld,
    action: Action,
) -> Result<(), PhysicsError> {
    match action {
        Action::SpawnShape => spawn_shape(scene, world),
        Action::RandomizeGravity => {
            let angle = scene.rng.gen_range(0.0..TAU);
            world.set_gravity(GRAVITY * angle.sin(), -GRAVITY * angle.cos());
            log::debug!("Gravity is now {:?}", world.gravity());
            Ok(())
        }
        Action::DriveCar => drive_car(scene, world),
        Action::DropHeavyBall => drop_heavy_ball(scene, world),
        Action::RefillPyramid => refill_pyramid(scene, world),
        Action::KickCradle => kick_cradle(scene, world),
    }
}

pub(super) fn pointer_down(
    scene: &mut Scene,
    world: &mut PhysicsWorld,
    point: m::Vec2,
) -> Result<(), PhysicsError> {
    let SceneState::Ragdolls {
        ragdolls,
        next_group,
    } = &mut scene.state
    else {
        return Ok(());
    };
    if world.body_count() >= MAX_RAGDOLL_BODIES {
        log::debug!("Too many bodies for another ragdoll");
        return Ok(());
    }
    let scale = scene.rng.gen_range(0.3..0.7);
    let composite = world.add_composite(ragdoll::ragdoll(point, scale, *next_group)?)?;
    *next_group += 1;
    ragdolls.push(composite);
    Ok(())
}

pub(super) fn drag_started(scene: &mut Scene, world: &mut PhysicsWorld, grabbed: BodyKey) {
    let SceneState::Pyramid { explosion_cooldown } = &mut scene.state else {
        return;
    };
    if *explosion_cooldown > 0.0 {
        return;
    }
    let Some(center) = world.body(grabbed).map(|b| b.position()) else {
        return;
    };
    *explosion_cooldown = EXPLOSION_COOLDOWN;

    let targets: Vec<(BodyKey, m::Vec2, f64)> = world
        .bodies()
        .filter(|(key, body)| *key != grabbed && !body.is_static())
        .filter_map(|(key, body)| Some((key, body.position(), body.mass().value()?)))
        .collect();
    log::debug!("Explosion pushing {} bodies", targets.len());
    for (key, position, mass) in targets {
        let offset = position - center;
        let distance = offset.mag();
        let Some(dir) = m::Unit::try_new(offset, 1e-9) else {
            continue;
        };
        let dv = dir.into_inner() * (EXPLOSION_SPEED / distance.max(1.0));
        if let Err(err) = world.apply_force(key, position, push_force(mass, dv)) {
            log::warn!("Explosion couldn't push {key:?}: {err}");
        }
    }
}

//
// basic
//

fn build_basic(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    let bouncy = Material::default().with_restitution(0.8).with_friction(0.1);
    world.add_body(
        Body::new(Shape::circle(0.4)?, m::Vec2::new(WIDTH / 2.0, 7.0)).with_material(bouncy),
    );
    world.add_body(
        Body::new(Shape::rect(0.6, 0.6)?, m::Vec2::new(WIDTH / 2.0 - 1.0, 7.4))
            .with_material(bouncy),
    );
    world.add_body(
        Body::new(
            Shape::regular_polygon(6, 0.4)?,
            m::Vec2::new(WIDTH / 2.0 + 1.0, 7.4),
        )
        .with_material(bouncy.with_restitution(0.6)),
    );
    scene.add_timer(1.0, Action::SpawnShape);
    Ok(())
}

fn spawn_shape(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    let rng = &mut scene.rng;
    let x = rng.gen_range(0.5..WIDTH - 0.5);
    let radius = rng.gen_range(0.15..0.3);
    let shape = if rng.gen_bool(0.5) {
        Shape::circle(radius)?
    } else {
        Shape::regular_polygon(rng.gen_range(3..=7), radius)?
    };
    world.add_body(
        Body::new(shape, m::Vec2::new(x, HEIGHT - 0.1))
            .with_material(Material::default().with_restitution(0.8).with_friction(0.1)),
    );
    Ok(())
}

//
// gravity
//

fn build_gravity(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_closed_box(world)?;
    let material = Material::default().with_restitution(0.8).with_friction(0.1);
    for _ in 0..40 {
        let rng = &mut scene.rng;
        let position = m::Vec2::new(
            rng.gen_range(0.5..WIDTH - 0.5),
            rng.gen_range(0.5..HEIGHT - 0.5),
        );
        let radius = rng.gen_range(0.1..0.2);
        world.add_body(Body::new(Shape::circle(radius)?, position).with_material(material));
    }
    scene.add_timer(3.0, Action::RandomizeGravity);
    Ok(())
}

fn build_gravity_strength(world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    world.set_gravity(0.0, 0.0);
    add_closed_box(world)?;
    let material = Material::default().with_restitution(0.5).with_friction(0.5);
    let strengths = [("red", 3.5), ("blue", 1.75), ("green", -1.05), ("yellow", 0.0)];
    for (idx, (label, strength)) in strengths.into_iter().enumerate() {
        let x = WIDTH / 2.0 + (idx as f64 - 1.5) * 1.5;
        world.add_body(
            Body::new(Shape::circle(0.3)?, m::Vec2::new(x, GRAVITY_STRENGTH_START_Y))
                .with_material(material)
                .with_gravity(BodyGravity::Custom(m::Vec2::new(0.0, -GRAVITY * strength)))
                .with_label(label),
        );
    }
    Ok(())
}

//
// constraints
//

fn build_constraints(world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    const COUNT: usize = 10;
    const RADIUS: f64 = 0.3;
    let spacing = RADIUS * 2.0;
    let start_x = (WIDTH - (COUNT - 1) as f64 * spacing) / 2.0;
    let material = Material::default().with_restitution(0.99).with_friction(0.001);
    for i in 0..COUNT {
        let x = start_x + i as f64 * spacing;
        let ball = world.add_body(
            Body::new(Shape::circle(RADIUS)?, m::Vec2::new(x, 5.0)).with_material(material),
        );
        world.add_constraint(
            ConstraintBuilder::new(Anchor::world(m::Vec2::new(x, 7.5)))
                .with_b(Anchor::body(ball))
                .with_length(2.0)
                .with_stiffness(0.1)
                .with_damping(0.05),
        )?;
    }
    Ok(())
}

//
// car
//

fn build_car(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    const SEGMENTS: usize = 20;
    let segment_width = WIDTH / SEGMENTS as f64;
    let terrain_height = |i: usize| 1.0 - 0.5 * (i as f64 * 0.4).sin();
    for i in 1..=SEGMENTS {
        let start = m::Vec2::new((i - 1) as f64 * segment_width, terrain_height(i - 1));
        let end = m::Vec2::new(i as f64 * segment_width, terrain_height(i));
        let dir = end - start;
        world.add_body(
            wall((start + end) / 2.0, segment_width, 0.1)?
                .with_angle(Angle::Rad(dir.y.atan2(dir.x))),
        );
    }
    world.add_body(wall(m::Vec2::new(0.0, 3.0), WALL_THICKNESS, 4.0)?);
    world.add_body(wall(m::Vec2::new(WIDTH, 3.0), WALL_THICKNESS, 4.0)?);

    let start = m::Vec2::from(CAR_START);
    let mut car = CompositeDesc::new("car");
    // the car's parts overlap at the axles
    let filter = CollisionFilter::non_colliding_group(1);
    let chassis = car.add_body(
        Body::new(Shape::rect(1.5, 0.3)?, start)
            .with_material(Material::default().with_density(2.0).with_friction(0.01))
            .with_filter(filter)
            .with_velocity(m::Vec2::new(CAR_SPEED, 0.0))
            .with_label("chassis"),
    );
    let mut wheels = [0; 2];
    for (wheel, side) in wheels.iter_mut().zip([-1.0, 1.0]) {
        let axle = m::Vec2::new(side * WHEEL_BASE / 2.0, 0.0);
        *wheel = car.add_body(
            Body::new(
                Shape::circle(0.2)?,
                start + axle - m::Vec2::new(0.0, WHEEL_DROP),
            )
            .with_material(Material::default().with_friction(0.8))
            .with_filter(filter),
        );
        car.add_constraint(
            ConstraintBuilder::new(Anchor::body_point(Attach::Member(chassis), axle))
                .with_b(Anchor::body(Attach::Member(*wheel)))
                .with_stiffness(0.5)
                .with_length(WHEEL_DROP),
        );
    }
    let keys = world.add_composite(car)?.bodies;
    let car = Car {
        chassis: keys[chassis],
        wheels: wheels.map(|w| keys[w]),
    };

    let sub = world.on(EventKind::AfterStep, move |world, _| {
        let past_edge = [car.chassis, car.wheels[0], car.wheels[1]]
            .iter()
            .filter_map(|&key| world.body(key))
            .any(|b| b.position().x > WIDTH + 1.0);
        if past_edge {
            if let Err(err) = reset_car(world, car) {
                log::warn!("Failed to reset the car: {err}");
            }
        }
    });
    scene.subscriptions.push(sub);
    scene.state = SceneState::Car(car);
    scene.add_timer(0.1, Action::DriveCar);
    Ok(())
}

fn reset_car(world: &mut PhysicsWorld, car: Car) -> Result<(), PhysicsError> {
    log::debug!("Car drove off the edge, resetting");
    let [wheel_a, wheel_b] = car.wheels;
    let reset = m::Vec2::from(CAR_RESET);
    let axle = m::Vec2::new(WHEEL_BASE / 2.0, -WHEEL_DROP);
    for (key, position) in [
        (car.chassis, reset),
        (wheel_a, reset + m::Vec2::new(-axle.x, axle.y)),
        (wheel_b, reset + axle),
    ] {
        world.set_position(key, position)?;
        world.set_angle(key, Angle::Rad(0.0))?;
        world.set_velocity(key, m::Vec2::new(CAR_SPEED, 0.0))?;
        world.set_angular_velocity(key, 0.0)?;
    }
    Ok(())
}

fn drive_car(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    let SceneState::Car(car) = &scene.state else {
        return Ok(());
    };
    for wheel in car.wheels {
        let Some(position) = world.body(wheel).map(|b| b.position()) else {
            continue;
        };
        let force = push_force(
            body_mass(world, wheel),
            m::Vec2::new(DRIVE_KICK_SPEED, 0.0),
        );
        world.apply_force(wheel, position, force)?;
    }
    Ok(())
}

//
// stack and pyramid
//

fn build_stack(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    const BLOCK: f64 = 0.6;
    const ROWS: usize = 10;
    let material = Material::default().with_restitution(0.1).with_friction(0.8);
    for tower in 1..=3 {
        let tower_x = WIDTH * tower as f64 / 4.0;
        for row in 0..ROWS {
            let blocks = if row % 2 == 0 { 4 } else { 3 };
            let y = WALL_THICKNESS / 2.0 + (row as f64 + 0.5) * BLOCK;
            for col in 0..blocks {
                let x = tower_x + (col as f64 - (blocks - 1) as f64 / 2.0) * BLOCK;
                world.add_body(
                    Body::new(Shape::rect(BLOCK, BLOCK)?, m::Vec2::new(x, y))
                        .with_material(material),
                );
            }
        }
    }
    scene.add_timer(5.0, Action::DropHeavyBall);
    Ok(())
}

fn drop_heavy_ball(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    let rng = &mut scene.rng;
    let x = rng.gen_range(1.0..WIDTH - 1.0);
    let radius = rng.gen_range(0.2..0.4);
    world.add_body(
        Body::new(Shape::circle(radius)?, m::Vec2::new(x, HEIGHT)).with_material(
            Material::default()
                .with_density(20.0)
                .with_restitution(0.1)
                .with_friction(0.05),
        ),
    );
    Ok(())
}

fn pyramid_material() -> Material {
    Material::default().with_restitution(0.1).with_friction(1.0)
}

fn build_pyramid(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    const LEVELS: usize = 20;
    const BLOCK: f64 = 0.3;
    for level in 0..LEVELS {
        let blocks = LEVELS - level;
        let start_x = WIDTH / 2.0 - blocks as f64 * BLOCK / 2.0 + BLOCK / 2.0;
        let y = WALL_THICKNESS / 2.0 + (level as f64 + 0.5) * BLOCK;
        for i in 0..blocks {
            world.add_body(
                Body::new(
                    Shape::rect(BLOCK, BLOCK)?,
                    m::Vec2::new(start_x + i as f64 * BLOCK, y),
                )
                .with_material(pyramid_material()),
            );
        }
    }
    scene.state = SceneState::Pyramid {
        explosion_cooldown: 0.0,
    };
    scene.add_timer(2.0, Action::RefillPyramid);
    Ok(())
}

fn refill_pyramid(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    if world.dynamic_body_count() >= PYRAMID_MIN_BLOCKS {
        return Ok(());
    }
    let rng = &mut scene.rng;
    let size = rng.gen_range(0.2..0.4);
    let x = rng.gen_range(size..WIDTH - size);
    let sides = rng.gen_range(3..=8);
    world.add_body(
        Body::new(
            Shape::regular_polygon(sides, size)?,
            m::Vec2::new(x, HEIGHT + size),
        )
        .with_material(pyramid_material()),
    );
    Ok(())
}

//
// newton's cradle
//

fn cradle(
    anchor: m::Vec2,
    count: usize,
    radius: f64,
    length: f64,
) -> Result<CompositeDesc, PhysicsError> {
    let material = Material::default()
        .with_restitution(1.0)
        .with_friction(0.0)
        .with_air_friction(0.006)
        .with_slop(0.01);
    let mut desc = CompositeDesc::new("cradle");
    for i in 0..count {
        let top = anchor + m::Vec2::new(i as f64 * radius * 2.0, 0.0);
        let ball = desc.add_body(
            Body::new(Shape::circle(radius)?, top - m::Vec2::new(0.0, length))
                .with_fixed_rotation()
                .with_material(material),
        );
        desc.add_constraint(
            ConstraintBuilder::new(Anchor::world(top))
                .with_b(Anchor::body(Attach::Member(ball)))
                .with_length(length)
                .with_stiffness(0.9),
        );
    }
    Ok(desc)
}

fn build_newton_cradle(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    let cradles = vec![
        world.add_composite(cradle(m::Vec2::new(WIDTH * 0.25, 6.5), 5, 0.3, 2.0)?)?,
        world.add_composite(cradle(m::Vec2::new(WIDTH * 0.65, 5.5), 7, 0.2, 1.6)?)?,
    ];
    scene.state = SceneState::Cradles(cradles);
    scene.add_timer(10.0, Action::KickCradle);
    Ok(())
}

fn kick_cradle(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    let SceneState::Cradles(cradles) = &scene.state else {
        return Ok(());
    };
    let rng = &mut scene.rng;
    let Some(cradle) = cradles.get(rng.gen_range(0..cradles.len().max(1))) else {
        return Ok(());
    };
    let Some(&ball) = cradle.bodies.get(rng.gen_range(0..cradle.bodies.len().max(1))) else {
        return Ok(());
    };
    let Some(position) = world.body(ball).map(|b| b.position()) else {
        return Ok(());
    };
    let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let dv = m::Vec2::new(sign * KICK_SPEED, KICK_SPEED / 3.0);
    world.apply_force(ball, position, push_force(body_mass(world, ball), dv))
}

//
// ragdolls
//

fn build_ragdolls(scene: &mut Scene, world: &mut PhysicsWorld) -> Result<(), PhysicsError> {
    add_ground(world)?;
    let placements = [
        (m::Vec2::new(WIDTH * 0.25, 7.0), 0.8),
        (m::Vec2::new(WIDTH * 0.5, 7.5), 1.0),
        (m::Vec2::new(WIDTH * 0.75, 6.5), 0.6),
    ];
    let mut ragdolls = Vec::with_capacity(placements.len());
    let mut group = 1;
    for (position, scale) in placements {
        ragdolls.push(world.add_composite(ragdoll::ragdoll(position, scale, group)?)?);
        group += 1;
    }
    scene.state = SceneState::Ragdolls {
        ragdolls,
        next_group: group,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_changes_velocity_over_one_step() {
        let mut world = PhysicsWorld::new(m::Vec2::zero(), 1.0);
        let ball = world.add_body(
            Body::new(Shape::circle(0.5).unwrap(), m::Vec2::zero())
                .with_material(Material::default().with_air_friction(0.0)),
        );
        let dv = m::Vec2::new(2.0, -1.0);
        world
            .apply_force(ball, m::Vec2::zero(), push_force(body_mass(&world, ball), dv))
            .unwrap();
        world.step(PUSH_STEP);
        let velocity = world.body(ball).unwrap().velocity.linear;
        assert!((velocity - dv).mag() < 1e-9);
    }

    #[test]
    fn cradle_balls_hang_in_a_row() {
        let desc = cradle(m::Vec2::new(1.0, 5.0), 4, 0.25, 1.5).unwrap();
        assert_eq!(desc.body_count(), 4);
        for (i, ball) in desc.bodies.iter().enumerate() {
            assert_eq!(ball.position(), m::Vec2::new(1.0 + i as f64 * 0.5, 3.5));
        }
    }
}
