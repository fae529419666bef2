use std::error::Error;

use async_trait::async_trait;
use linkme::distributed_slice;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use super::entity::Entity;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use crate::config::Config;

/// Channel types for messages FROM integrations TO the engine
/// These are bounded channels to provide backpressure
pub type FromIntegrationSender = mpsc::Sender<FromIntegrationMessage>;
pub type FromIntegrationReceiver = mpsc::Receiver<FromIntegrationMessage>;

/// Channel types for messages FROM the engine TO integrations (unbounded - engine must not block)
pub type ToIntegrationSender = mpsc::UnboundedSender<ToIntegrationMessage>;

/// Result type for integration factory functions
pub type IntegrationFactoryResult = anyhow::Result<Option<Box<dyn Integration>>>;

pub struct IntegrationContext<'a> {
    pub config: &'a Config,
}

#[distributed_slice]
pub static REGISTRY: [fn(&IntegrationContext) -> IntegrationFactoryResult];

/// Integration trait that all integrations must implement
#[async_trait]
pub trait Integration: Send + Sync {
    /// Get the name/identifier of this integration
    fn name(&self) -> &str;

    /// Set up the integration - connect to devices, create entities, start polling.
    ///
    /// The integration receives a sender to report events back to the engine
    /// (discovery, state changes, etc.)
    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>>;

    /// Handle a command from the engine
    ///
    /// The integration should execute the requested action (e.g., change a setpoint)
    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>>;

    /// Shut down the integration gracefully
    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>>;
}

/// Announce an entity to the engine and report its initial state
pub async fn register_entity(
    entity: &dyn Entity,
    integration_name: &str,
    to_engine: &FromIntegrationSender,
) {
    let msg = FromIntegrationMessage::EntityDiscovered {
        entity_id: entity.entity_id().to_string(),
        integration_name: integration_name.to_string(),
    };
    if let Err(e) = to_engine.send(msg).await {
        warn!("Failed to send EntityDiscovered message: {}", e);
        return;
    }
    info!(
        "Registered {} entity: {}",
        entity.platform(),
        entity.entity_id()
    );

    report_state(entity, to_engine).await;
}

/// Report the current state of an entity to the engine
pub async fn report_state(entity: &dyn Entity, to_engine: &FromIntegrationSender) {
    if let Err(e) = to_engine.send(entity.state_message()).await {
        warn!(
            "Failed to report state for {}: {}",
            entity.entity_id(),
            e
        );
    }
}

/// Error returned from `handle_message` when a command cannot apply to the target entity
pub fn unsupported_command(msg: &ToIntegrationMessage) -> Box<dyn Error + Send> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("Unsupported command for entity {}", msg.entity_id()),
    ))
}

/// Error returned from `handle_message` when the target entity is not owned by the integration
pub fn entity_not_found(entity_id: &str) -> Box<dyn Error + Send> {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("Entity not found: {}", entity_id),
    ))
}
