pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::ConfigWarning;
pub use config::LogLevel;
pub use engine::CameraState;
pub use engine::Engine;
pub use engine::EngineError;
pub use engine::Operation;
pub use engine::State;
pub use engine::ThermostatState;
pub use integrations::ClientError;
