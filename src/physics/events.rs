//! Lifecycle notifications of a physics world.

use super::{BodyKey, PhysicsWorld};
use crate::math as m;

use thunderdome as td;

/// The kinds of events that can be subscribed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeStep,
    AfterStep,
    CollisionStart,
    CollisionEnd,
}

/// An event emitted by [`PhysicsWorld::step`][super::PhysicsWorld::step].
#[derive(Clone, Debug, PartialEq)]
pub enum WorldEvent {
    /// Emitted before anything else in a step. `dt` is already scaled by the time scale.
    BeforeStep { dt: f64 },
    /// Emitted after bodies have moved and collision events have been emitted,
    /// before pending additions and removals are applied.
    AfterStep { dt: f64 },
    /// Two bodies touched this step but not during the previous one.
    CollisionStart(CollisionEvent),
    /// Two bodies touched during the previous step but not this one.
    CollisionEnd(CollisionEvent),
}

impl WorldEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorldEvent::BeforeStep { .. } => EventKind::BeforeStep,
            WorldEvent::AfterStep { .. } => EventKind::AfterStep,
            WorldEvent::CollisionStart(_) => EventKind::CollisionStart,
            WorldEvent::CollisionEnd(_) => EventKind::CollisionEnd,
        }
    }
}

/// Information about a touching pair of bodies.
///
/// For [`CollisionEnd`][WorldEvent::CollisionEnd] events
/// this describes the last contact the pair had.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionEvent {
    pub bodies: [BodyKey; 2],
    /// Contact normal pointing from the first body towards the second.
    pub normal: m::Vec2,
    pub depth: f64,
    /// Contact points in world space.
    pub points: Vec<m::Vec2>,
}

/// Handle returned from [`PhysicsWorld::on`] that can be used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(td::Index);

pub(crate) type Callback = Box<dyn FnMut(&mut PhysicsWorld, &WorldEvent)>;

struct Listener {
    kind: EventKind,
    // taken out while the callback is running so that it can borrow the world mutably
    callback: Option<Callback>,
}

/// Storage of event listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    arena: td::Arena<Listener>,
    // arena slots are reused, so subscription order is tracked separately
    order: Vec<td::Index>,
}

impl Listeners {
    fn insert(&mut self, kind: EventKind, callback: Callback) -> Subscription {
        let id = self.arena.insert(Listener {
            kind,
            callback: Some(callback),
        });
        self.order.push(id);
        Subscription(id)
    }

    fn remove(&mut self, sub: Subscription) -> bool {
        if self.arena.remove(sub.0).is_none() {
            return false;
        }
        self.order.retain(|&id| id != sub.0);
        true
    }

    fn subscribed_to(&self, kind: EventKind) -> Vec<td::Index> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.arena.get(id).map_or(false, |l| l.kind == kind))
            .collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }
}

impl PhysicsWorld {
    /// Subscribe to an event.
    ///
    /// The callback gets full mutable access to the world.
    /// Adding and removing things during a step is deferred until the step ends.
    pub fn on(
        &mut self,
        kind: EventKind,
        callback: impl FnMut(&mut PhysicsWorld, &WorldEvent) + 'static,
    ) -> Subscription {
        self.listeners.insert(kind, Box::new(callback))
    }

    /// Unsubscribe from an event, returning whether the subscription still existed.
    /// A listener may unsubscribe itself while it's running.
    pub fn off(&mut self, sub: Subscription) -> bool {
        self.listeners.remove(sub)
    }

    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Call every listener subscribed to the kind of `event`,
    /// in the order they subscribed.
    ///
    /// Listeners subscribed during dispatch only receive later events.
    pub(super) fn dispatch(&mut self, event: &WorldEvent) {
        if self.listeners.is_empty() {
            return;
        }
        for id in self.listeners.subscribed_to(event.kind()) {
            let Some(mut callback) = self
                .listeners
                .arena
                .get_mut(id)
                .and_then(|l| l.callback.take())
            else {
                // unsubscribed by an earlier listener
                continue;
            };
            callback(self, event);
            // only put it back if it wasn't unsubscribed while running
            if let Some(listener) = self.listeners.arena.get_mut(id) {
                listener.callback = Some(callback);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn subscribe_and_unsubscribe() {
        let mut world = PhysicsWorld::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let before = {
            let log = log.clone();
            world.on(EventKind::BeforeStep, move |_, ev| {
                log.borrow_mut().push(ev.kind());
            })
        };
        {
            let log = log.clone();
            world.on(EventKind::AfterStep, move |_, ev| {
                log.borrow_mut().push(ev.kind());
            });
        }

        world.step(1.0 / 60.0);
        assert!(world.off(before));
        assert!(!world.off(before));
        world.step(1.0 / 60.0);

        itertools::assert_equal(
            log.borrow().iter().copied(),
            [
                EventKind::BeforeStep,
                EventKind::AfterStep,
                EventKind::AfterStep,
            ],
        );
        assert_eq!(world.listener_count(), 1);
    }

    #[test]
    fn listener_can_unsubscribe_itself() {
        let mut world = PhysicsWorld::default();
        let calls = Rc::new(RefCell::new(0));
        let own_sub: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let sub = {
            let calls = calls.clone();
            let own_sub = own_sub.clone();
            world.on(EventKind::AfterStep, move |world, _| {
                *calls.borrow_mut() += 1;
                if let Some(sub) = *own_sub.borrow() {
                    world.off(sub);
                }
            })
        };
        *own_sub.borrow_mut() = Some(sub);

        world.step(1.0 / 60.0);
        world.step(1.0 / 60.0);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(world.listener_count(), 0);
    }

    #[test]
    fn listeners_added_during_dispatch_wait_for_next_event() {
        let mut world = PhysicsWorld::default();
        let calls = Rc::new(RefCell::new(0));
        {
            let calls = calls.clone();
            world.on(EventKind::BeforeStep, move |world, _| {
                let calls = calls.clone();
                world.on(EventKind::BeforeStep, move |_, _| {
                    *calls.borrow_mut() += 1;
                });
            });
        }
        world.step(1.0 / 60.0);
        assert_eq!(*calls.borrow(), 0);
        world.step(1.0 / 60.0);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn dt_is_scaled() {
        let mut world = PhysicsWorld::default();
        world.set_time_scale(0.5);
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = seen.clone();
            world.on(EventKind::BeforeStep, move |_, ev| {
                if let WorldEvent::BeforeStep { dt } = ev {
                    *seen.borrow_mut() = Some(*dt);
                }
            });
        }
        world.step(0.1);
        assert_eq!(*seen.borrow(), Some(0.05));
    }
}
