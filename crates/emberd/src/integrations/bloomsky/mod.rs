#[allow(clippy::module_inception)]
mod bloomsky;
mod camera;
mod client;
mod config;

use std::sync::Arc;

use anyhow::Context;
pub use bloomsky::BloomSkyIntegration;
pub use camera::BloomSkyCamera;
pub use client::BloomSkyClient;
pub use client::DeviceData;
pub use client::DeviceRecord;
pub use client::HttpBloomSkyClient;
pub use config::Config as BloomSkyConfig;
use linkme::distributed_slice;

use crate::engine;

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_bloomsky(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let bloomsky_config = if let Some(c) = &ctx.config.integrations.bloomsky {
        c
    } else {
        return Ok(None);
    };

    let client =
        HttpBloomSkyClient::new(bloomsky_config).context("Failed to create BloomSky client")?;
    Ok(Some(Box::new(BloomSkyIntegration::new(Arc::new(client)))))
}
