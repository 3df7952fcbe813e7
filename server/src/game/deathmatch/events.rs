//! Gameplay events and their handlers.
//!
//! Systems publish [`GameEvent`]s on the game's [`EventBus`]; every handler
//! subscribed to the event topic runs before `publish` returns, so the
//! mailboxes they fill are visible to the systems that follow in the tick.

use super::components::{Mailbox, Notification, Owned, Player, Respawn};
use super::DeathmatchGame;
use crate::game::EntityId;
use log::info;
use shared::Vector2;
use std::collections::BTreeMap;
use std::fmt;

pub(super) const TOPIC_FRAGGED: &str = "entity:fragged";
pub(super) const TOPIC_HIT: &str = "entity:hit";
pub(super) const TOPIC_RESPAWNING: &str = "entity:respawning";
pub(super) const TOPIC_RESPAWNED: &str = "entity:respawned";
pub(super) const TOPIC_EXITED_MAZE: &str = "entity:exitedmaze";

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    EntityFragged {
        entity: EntityId,
        fragged_by: EntityId,
    },
    EntityHit {
        entity: EntityId,
        hit_by: EntityId,
        coming_from: f64,
        damage: f64,
    },
    EntityRespawning {
        entity: EntityId,
        respawns_in: i64,
    },
    EntityRespawned {
        entity: EntityId,
        starting_point: Vector2,
    },
    EntityExitedMaze {
        entity: EntityId,
        exit: EntityId,
    },
}

impl GameEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            GameEvent::EntityFragged { .. } => TOPIC_FRAGGED,
            GameEvent::EntityHit { .. } => TOPIC_HIT,
            GameEvent::EntityRespawning { .. } => TOPIC_RESPAWNING,
            GameEvent::EntityRespawned { .. } => TOPIC_RESPAWNED,
            GameEvent::EntityExitedMaze { .. } => TOPIC_EXITED_MAZE,
        }
    }
}

pub type EventHandler = fn(&mut DeathmatchGame, &GameEvent);

/// Synchronous publish/subscribe keyed by event topic.
#[derive(Default)]
pub struct EventBus {
    subscribers: BTreeMap<&'static str, Vec<EventHandler>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.subscribers.iter().map(|(topic, h)| (topic, h.len())))
            .finish()
    }
}

impl EventBus {
    pub fn subscribe(&mut self, topic: &'static str, handler: EventHandler) {
        self.subscribers.entry(topic).or_default().push(handler);
    }

    ///Returns the handlers of `topic`, in subscription order.
    pub fn handlers(&self, topic: &str) -> Vec<EventHandler> {
        self.subscribers.get(topic).cloned().unwrap_or_default()
    }
}

impl DeathmatchGame {
    pub(super) fn publish(&mut self, event: GameEvent) {
        for handler in self.bus.handlers(event.topic()) {
            handler(self, &event);
        }
    }

    /// The agent behind `entity`: its owner for a projectile, itself otherwise.
    fn resolve_owner(&self, entity: EntityId) -> EntityId {
        self.manager
            .get::<Owned>(entity)
            .map_or(entity, |owned| owned.owner)
    }

    fn notify(&mut self, entity: EntityId, notification: Notification) -> bool {
        match self.manager.get_mut::<Mailbox>(entity) {
            Some(mailbox) => {
                mailbox.push(notification);
                true
            }
            None => false,
        }
    }
}

pub(super) fn on_entity_fragged(game: &mut DeathmatchGame, event: &GameEvent) {
    let GameEvent::EntityFragged { entity, fragged_by } = *event else {
        return;
    };

    // The frag is made by a projectile; credit its shooter
    let fragger = game.resolve_owner(fragged_by);

    game.notify(entity, Notification::BeenFragged { by: fragger });
    game.notify(fragger, Notification::HaveFragged { who: entity });

    if let Some(player) = game.manager.get_mut::<Player>(entity) {
        player.stats.nb_been_fragged += 1;
    }
    if let Some(player) = game.manager.get_mut::<Player>(fragger) {
        player.stats.nb_has_fragged += 1;
    }
}

pub(super) fn on_entity_hit(game: &mut DeathmatchGame, event: &GameEvent) {
    let GameEvent::EntityHit {
        entity,
        hit_by,
        coming_from,
        damage,
    } = *event
    else {
        return;
    };

    let hitter = game.resolve_owner(hit_by);

    game.notify(
        entity,
        Notification::BeenHit {
            coming_from,
            damage,
        },
    );
    game.notify(hitter, Notification::HaveHit { who: entity });

    if let Some(player) = game.manager.get_mut::<Player>(entity) {
        player.stats.nb_been_hit += 1;
    }
    if let Some(player) = game.manager.get_mut::<Player>(hitter) {
        player.stats.nb_has_hit += 1;
    }
}

pub(super) fn on_entity_respawning(game: &mut DeathmatchGame, event: &GameEvent) {
    let GameEvent::EntityRespawning {
        entity,
        respawns_in,
    } = *event
    else {
        return;
    };

    let respawns_in = game
        .manager
        .get::<Respawn>(entity)
        .map_or(respawns_in, |r| r.respawning_countdown);

    game.notify(
        entity,
        Notification::Respawning {
            respawning_in: respawns_in,
        },
    );
}

pub(super) fn on_entity_respawned(game: &mut DeathmatchGame, event: &GameEvent) {
    let GameEvent::EntityRespawned { entity, .. } = *event else {
        return;
    };

    game.notify(entity, Notification::Respawned);
}

pub(super) fn on_entity_exited_maze(game: &mut DeathmatchGame, event: &GameEvent) {
    let GameEvent::EntityExitedMaze { entity, exit } = *event else {
        return;
    };

    // Only agents have a mailbox; projectiles crossing the exit are ignored
    if !game.notify(entity, Notification::ExitedMaze) {
        return;
    }

    info!("Entity {} exited the maze through {}", entity, exit);

    if let Some(game_over) = game.game_over.as_ref() {
        game_over();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut DeathmatchGame, _: &GameEvent) {}

    #[test]
    fn test_topics_are_distinct() {
        let events = [
            GameEvent::EntityFragged {
                entity: EntityId(1),
                fragged_by: EntityId(2),
            },
            GameEvent::EntityHit {
                entity: EntityId(1),
                hit_by: EntityId(2),
                coming_from: 0.0,
                damage: 1.0,
            },
            GameEvent::EntityRespawning {
                entity: EntityId(1),
                respawns_in: 50,
            },
            GameEvent::EntityRespawned {
                entity: EntityId(1),
                starting_point: Vector2::ZERO,
            },
            GameEvent::EntityExitedMaze {
                entity: EntityId(1),
                exit: EntityId(3),
            },
        ];

        let mut topics: Vec<&str> = events.iter().map(|e| e.topic()).collect();
        topics.dedup();
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0], TOPIC_FRAGGED);
        assert_eq!(topics[1], TOPIC_HIT);
        assert_eq!(topics[2], TOPIC_RESPAWNING);
        assert_eq!(topics[3], TOPIC_RESPAWNED);
        assert_eq!(topics[4], TOPIC_EXITED_MAZE);
    }

    #[test]
    fn test_bus_keeps_subscription_order() {
        let mut bus = EventBus::default();
        bus.subscribe(TOPIC_HIT, noop);
        bus.subscribe(TOPIC_HIT, on_entity_hit);

        let handlers = bus.handlers(TOPIC_HIT);
        assert_eq!(handlers.len(), 2);
        assert!(bus.handlers(TOPIC_FRAGGED).is_empty());
    }
}
