//! Inbound message handling
//!
//! The dispatcher applies one decoded [`Packet`] at a time to the
//! [`EntityRegistry`] and reports what the operator should see as an
//! [`Observation`]. It never performs network I/O and never fails: lookups
//! that miss degrade to no-ops.

use crate::lang::{strip_format_codes, Translator};
use crate::registry::EntityRegistry;
use log::{debug, info, warn};
use shared::{ActorEventKind, Packet, PlayerListEntry, TextKind, Vec3};
use std::sync::Arc;

/// Human-readable outcome of dispatching one message
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Chat { source: String, text: String },
    Roster { entries: Vec<PlayerListEntry> },
    Join { name: String, runtime_id: u64, position: Vec3 },
    Leave { name: String, runtime_id: u64 },
    Death { name: String, runtime_id: u64 },
    Moved { name: String, position: Vec3 },
}

impl Observation {
    /// Log target for this observation's category, e.g. `bot::chat`.
    pub fn target(&self) -> &'static str {
        match self {
            Observation::Chat { .. } => "bot::chat",
            Observation::Roster { .. } => "bot::roster",
            Observation::Join { .. } => "bot::join",
            Observation::Leave { .. } => "bot::leave",
            Observation::Death { .. } => "bot::death",
            Observation::Moved { .. } => "bot::movement",
        }
    }

    pub fn log(&self) {
        let target = self.target();
        match self {
            Observation::Chat { source, text } => {
                info!(target: target, "{}> {}", source, text);
            }
            Observation::Roster { entries } => {
                info!(target: target, "Received player list with {} players", entries.len());
                for entry in entries {
                    info!(target: target, "User: {} EntityID: {}", entry.username, entry.unique_id);
                }
            }
            Observation::Join { name, position, .. } => {
                info!(target: target, "Player {} added at {}", name, position);
            }
            Observation::Leave { name, .. } => {
                info!(target: target, "Player {} went out of range", name);
            }
            Observation::Death { name, .. } => {
                warn!(target: target, "Player {} died", name);
            }
            Observation::Moved { name, position } => {
                debug!(target: target, "Player {} at {}", name, position);
            }
        }
    }
}

pub struct Dispatcher {
    registry: EntityRegistry,
    translator: Arc<dyn Translator>,
    locale: String,
}

impl Dispatcher {
    pub fn new(registry: EntityRegistry, translator: Arc<dyn Translator>, locale: &str) -> Self {
        Self {
            registry,
            translator,
            locale: locale.to_string(),
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> EntityRegistry {
        self.registry
    }

    /// Applies a message and logs the resulting observation, if any.
    pub fn dispatch(&mut self, packet: Packet) -> Option<Observation> {
        let observation = self.apply(packet);
        if let Some(observation) = &observation {
            observation.log();
        }
        observation
    }

    fn apply(&mut self, packet: Packet) -> Option<Observation> {
        match packet {
            Packet::Text {
                kind,
                source_name,
                message,
                parameters,
                needs_translation,
            } => {
                if kind == TextKind::ObjectWhisper {
                    return None;
                }

                let text = if needs_translation {
                    self.translator.translate(&self.locale, &message, &parameters)
                } else {
                    message
                };

                Some(Observation::Chat {
                    source: source_name,
                    text: strip_format_codes(&text),
                })
            }

            Packet::PlayerList { entries } => Some(Observation::Roster { entries }),

            Packet::RemoveEntity { runtime_id } => {
                let entity = self.registry.remove(runtime_id)?;
                Some(Observation::Leave {
                    name: entity.name,
                    runtime_id,
                })
            }

            Packet::AddPlayer {
                username,
                runtime_id,
                unique_id,
                position,
            } => {
                self.registry.upsert(runtime_id, &username, unique_id, position);
                Some(Observation::Join {
                    name: username,
                    runtime_id,
                    position,
                })
            }

            Packet::ActorEvent {
                runtime_id,
                event: ActorEventKind::Died,
            } => {
                debug!("Entity {} died", runtime_id);
                let entity = self.registry.get(runtime_id)?;
                Some(Observation::Death {
                    name: entity.name.clone(),
                    runtime_id,
                })
            }

            Packet::MovePlayer {
                runtime_id,
                position,
            }
            | Packet::MoveActorAbsolute {
                runtime_id,
                position,
            } => {
                let changed = self.registry.move_to(runtime_id, position);
                self.moved(runtime_id, changed)
            }

            Packet::MoveActorDelta { runtime_id, delta } => {
                let changed = self.registry.move_delta(runtime_id, delta);
                self.moved(runtime_id, changed)
            }

            _ => None,
        }
    }

    fn moved(&self, runtime_id: u64, changed: bool) -> Option<Observation> {
        if !changed {
            return None;
        }
        let entity = self.registry.get(runtime_id)?;
        Some(Observation::Moved {
            name: entity.name.clone(),
            position: entity.position,
        })
    }
}
