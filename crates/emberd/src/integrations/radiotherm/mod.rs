mod client;
mod config;
mod discover;
#[allow(clippy::module_inception)]
mod radiotherm;
mod thermostat;

pub use client::DeviceTime;
pub use client::FanMode;
pub use client::HttpThermostatClient;
pub use client::ThermostatClient;
pub use client::ThermostatMode;
pub use client::ThermostatStatus;
pub use config::Config as RadioThermConfig;
pub use discover::discover_addresses;
pub use discover::DiscoveryError;
use linkme::distributed_slice;
pub use radiotherm::RadioThermIntegration;
pub use thermostat::RadioThermostat;
pub use thermostat::ThermostatOptions;

use crate::engine;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_radiotherm(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let radiotherm_config = if let Some(c) = &ctx.config.integrations.radiotherm {
        c
    } else {
        return Ok(None);
    };

    Ok(Some(Box::new(RadioThermIntegration::new(
        radiotherm_config,
        HttpThermostatClient::new,
    ))))
}
