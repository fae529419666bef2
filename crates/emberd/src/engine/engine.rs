use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;
use crate::engine::IntegrationContext;

/// Errors surfaced to callers that route commands through the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration channel not available: {0}")]
    IntegrationUnavailable(String),

    #[error("Integration dropped the reply for entity: {0}")]
    NoReply(String),
}

/// emberd engine
///
/// This structure handles the flow of events, sending commands to the
/// correct integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: HashMap<String, ToIntegrationSender>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: Vec<JoinHandle<()>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: HashMap::new(),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: Vec::new(),
        }
    }

    /// Register integrations from configuration
    ///
    /// Every factory in the registry is offered the config; factories whose
    /// section is absent decline, failing factories are logged and skipped.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        self.integration_channels
            .insert(name.clone(), to_integration_tx);

        info!("Registering integration '{}'", name);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine, one at a time
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        self.integration_handles.push(handle);
    }

    /// Number of integrations registered with the engine
    pub fn integration_count(&self) -> usize {
        self.integration_channels.len()
    }

    /// Stop all integration tasks, including their polling loops
    pub fn abort_integrations(&self) {
        for handle in &self.integration_handles {
            handle.abort();
        }
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), EngineError> {
        let entity_id = msg.entity_id().to_string();

        // Route to the integration that owns this entity
        let integration_name = {
            let map = self
                .entity_integration_map
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.get(&entity_id)
                .cloned()
                .ok_or_else(|| EngineError::UnknownEntity(entity_id.clone()))?
        };

        let tx = self
            .integration_channels
            .get(&integration_name)
            .ok_or_else(|| EngineError::IntegrationUnavailable(integration_name.clone()))?;

        debug!("Routing {:?} to '{}'", msg, integration_name);
        tx.send(msg)
            .map_err(|_| EngineError::IntegrationUnavailable(integration_name))
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        // Main event loop - only receives FromIntegration messages
        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Change the target temperature of a thermostat entity
    pub fn set_temperature(&self, entity_id: String, temperature: f64) -> Result<(), EngineError> {
        self.send_command(ToIntegrationMessage::SetTemperature {
            entity_id,
            temperature,
        })
    }

    /// Turn away mode on or off for a thermostat entity
    pub fn set_away_mode(&self, entity_id: String, on: bool) -> Result<(), EngineError> {
        self.send_command(ToIntegrationMessage::SetAwayMode { entity_id, on })
    }

    /// Fetch the latest image of a camera entity
    ///
    /// `Ok(None)` means the camera exists but has no image available right now.
    pub async fn camera_image(&self, entity_id: String) -> Result<Option<Vec<u8>>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send_command(ToIntegrationMessage::CameraImage {
            entity_id: entity_id.clone(),
            reply,
        })?;

        rx.await.map_err(|_| EngineError::NoReply(entity_id))
    }

    /// Handle an event from an integration
    pub(crate) fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
            } => {
                info!("Entity discovered: {} (from {})", entity_id, integration_name);

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                let mut map = self
                    .entity_integration_map
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                map.insert(entity_id, integration_name);
            }
            FromIntegrationMessage::ThermostatStateChanged { entity_id, state } => {
                info!(
                    "Thermostat state changed: {} -> current={:?}, target={:?}, operation={}, away={}",
                    entity_id,
                    state.current_temperature,
                    state.target_temperature,
                    state.operation,
                    state.away_mode
                );

                let mut snapshot = State::clone(&self.state.load());
                snapshot.thermostats.insert(entity_id, state);
                self.state.store(Arc::new(snapshot));
            }
            FromIntegrationMessage::CameraStateChanged { entity_id, state } => {
                debug!(
                    "Camera state changed: {} -> image_url={:?}",
                    entity_id, state.image_url
                );

                let mut snapshot = State::clone(&self.state.load());
                snapshot.cameras.insert(entity_id, state);
                self.state.store(Arc::new(snapshot));
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::engine::state::CameraState;
    use crate::engine::state::Operation;
    use crate::engine::state::ThermostatState;

    /// Integration that announces one entity and records every command it receives
    struct RecordingIntegration {
        entity_id: String,
        received: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Integration for RecordingIntegration {
        fn name(&self) -> &str {
            "recording"
        }

        async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            tx.send(FromIntegrationMessage::EntityDiscovered {
                entity_id: self.entity_id.clone(),
                integration_name: "recording".to_string(),
            })
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            let description = match msg {
                ToIntegrationMessage::SetTemperature {
                    entity_id,
                    temperature,
                } => format!("{} temperature {}", entity_id, temperature),
                ToIntegrationMessage::SetAwayMode { entity_id, on } => {
                    format!("{} away {}", entity_id, on)
                }
                ToIntegrationMessage::CameraImage { entity_id, reply } => {
                    let _ = reply.send(Some(b"jpeg".to_vec()));
                    format!("{} image", entity_id)
                }
            };
            let _ = self.received.send(description);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    /// Register a recording integration and process its discovery event
    async fn engine_with_entity(entity_id: &str) -> (Engine, mpsc::UnboundedReceiver<String>) {
        let mut engine = Engine::new();
        let (received, commands) = mpsc::unbounded_channel();
        engine.register_integration(
            "recording".to_string(),
            Box::new(RecordingIntegration {
                entity_id: entity_id.to_string(),
                received,
            }),
        );

        let discovered = engine.message_rx.lock().await.recv().await.unwrap();
        engine.handle_event(discovered);
        (engine, commands)
    }

    #[tokio::test]
    async fn test_commands_are_routed_to_owning_integration() {
        let (engine, mut commands) = engine_with_entity("climate.hallway").await;

        engine
            .set_temperature("climate.hallway".to_string(), 70.5)
            .unwrap();
        engine
            .set_away_mode("climate.hallway".to_string(), true)
            .unwrap();

        assert_eq!(
            commands.recv().await.unwrap(),
            "climate.hallway temperature 70.5"
        );
        assert_eq!(commands.recv().await.unwrap(), "climate.hallway away true");
    }

    #[tokio::test]
    async fn test_unknown_entity_is_rejected() {
        let (engine, _commands) = engine_with_entity("climate.hallway").await;

        let err = engine
            .set_temperature("climate.attic".to_string(), 70.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownEntity(ref id) if id == "climate.attic"));
    }

    #[tokio::test]
    async fn test_camera_image_round_trip() {
        let (engine, _commands) = engine_with_entity("camera.sky").await;

        let image = engine.camera_image("camera.sky".to_string()).await.unwrap();
        assert_eq!(image.as_deref(), Some(&b"jpeg"[..]));
    }

    #[tokio::test]
    async fn test_state_changes_update_snapshot() {
        let engine = Engine::new();

        engine.handle_event(FromIntegrationMessage::ThermostatStateChanged {
            entity_id: "climate.hallway".to_string(),
            state: ThermostatState {
                name: "Hallway".to_string(),
                target_temperature: Some(68.0),
                operation: Operation::Heat,
                ..Default::default()
            },
        });
        engine.handle_event(FromIntegrationMessage::CameraStateChanged {
            entity_id: "camera.sky".to_string(),
            state: CameraState {
                name: "Sky".to_string(),
                device_id: "ABC".to_string(),
                image_url: None,
            },
        });

        let snapshot = engine.state_snapshot();
        assert_eq!(
            snapshot.thermostats["climate.hallway"].target_temperature,
            Some(68.0)
        );
        assert_eq!(snapshot.cameras["camera.sky"].device_id, "ABC");
    }
}
