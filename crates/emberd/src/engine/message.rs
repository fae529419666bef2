//! Type-safe message system for emberd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use tokio::sync::oneshot;

use super::state::CameraState;
use super::state::ThermostatState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
    },

    /// A thermostat's state changed
    ThermostatStateChanged {
        entity_id: String,
        state: ThermostatState,
    },

    /// A camera's state changed (new image URL, renamed device)
    CameraStateChanged {
        entity_id: String,
        state: CameraState,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug)]
pub enum ToIntegrationMessage {
    /// Change the target temperature of a thermostat
    SetTemperature { entity_id: String, temperature: f64 },

    /// Turn away mode on or off
    SetAwayMode { entity_id: String, on: bool },

    /// Fetch the current camera image. `None` is sent back when no image is available.
    CameraImage {
        entity_id: String,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
}

impl ToIntegrationMessage {
    /// Entity the command is addressed to, used for routing
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::SetTemperature { entity_id, .. }
            | ToIntegrationMessage::SetAwayMode { entity_id, .. }
            | ToIntegrationMessage::CameraImage { entity_id, .. } => entity_id,
        }
    }
}
