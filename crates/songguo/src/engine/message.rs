//! Type-safe message system
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::state::SwitchState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was set up and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
        platform: &'static str,
        name: String,
    },

    /// An entity was removed (entry unloaded, etc.)
    EntityRemoved { entity_id: String },

    /// A switch's state changed
    SwitchStateChanged {
        entity_id: String,
        state: SwitchState,
    },
}

/// Actions a switch entity accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SwitchAction {
    TurnOn,
    TurnOff,
    ForceShutdown,
    ForceRestart,
    /// Poll the device immediately instead of waiting for the next interval.
    Update,
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Command to act on a switch
    SwitchCommand {
        entity_id: String,
        action: SwitchAction,
    },
}

impl ToIntegrationMessage {
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::SwitchCommand { entity_id, .. } => entity_id,
        }
    }
}
