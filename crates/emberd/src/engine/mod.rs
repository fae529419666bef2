mod engine;
mod entity;
mod integration;
mod message;
pub mod state;

pub use engine::Engine;
pub use engine::EngineError;
pub use entity::slugify;
pub use entity::Entity;
pub use integration::entity_not_found;
pub use integration::register_entity;
pub use integration::report_state;
pub use integration::unsupported_command;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::CameraState;
pub use state::Operation;
pub use state::State;
pub use state::ThermostatState;
