use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use super::camera::BloomSkyCamera;
use super::client::BloomSkyClient;
use crate::engine;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

const INTEGRATION_NAME: &str = "bloomsky";

/// BloomSky Integration for emberd
///
/// Exposes one camera entity per weather station of the configured account.
pub struct BloomSkyIntegration {
    client: Arc<dyn BloomSkyClient>,
    http: reqwest::Client,
    cameras: HashMap<String, BloomSkyCamera>,
    to_engine: Option<FromIntegrationSender>,
}

impl BloomSkyIntegration {
    /// Create a new BloomSky integration
    pub fn new(client: Arc<dyn BloomSkyClient>) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
            cameras: HashMap::new(),
            to_engine: None,
        }
    }

    /// Pick an entity id for a station, falling back to the device id on name clashes
    fn entity_id_for(&self, device_name: &str, device_id: &str) -> String {
        let entity_id = format!("camera.{}", engine::slugify(device_name));
        if self.cameras.contains_key(&entity_id) {
            format!(
                "camera.{}_{}",
                engine::slugify(device_name),
                engine::slugify(device_id)
            )
        } else {
            entity_id
        }
    }

    /// Serve a camera image request
    async fn camera_image(
        &mut self,
        entity_id: &str,
    ) -> Result<Option<Vec<u8>>, Box<dyn Error + Send>> {
        let camera = self
            .cameras
            .get_mut(entity_id)
            .ok_or_else(|| engine::entity_not_found(entity_id))?;

        let previous_url = camera.last_url().map(String::from);
        let image = camera.camera_image().await;

        if camera.last_url() != previous_url.as_deref() {
            info!("[{}] New image published", entity_id);
            if let Some(tx) = &self.to_engine {
                engine::report_state(&*camera, tx).await;
            }
        }

        Ok(image)
    }
}

#[async_trait]
impl Integration for BloomSkyIntegration {
    fn name(&self) -> &str {
        INTEGRATION_NAME
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        info!("Fetching BloomSky devices");
        self.client
            .refresh_devices()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        let devices = self.client.devices().await;
        if devices.is_empty() {
            warn!("No BloomSky devices found for this account");
        }

        for device in devices {
            let entity_id = self.entity_id_for(&device.device_name, &device.device_id);
            let camera = BloomSkyCamera::new(
                entity_id.clone(),
                &device,
                self.client.clone(),
                self.http.clone(),
            );
            info!(
                "Discovered BloomSky camera: {} ({})",
                camera.name(),
                entity_id
            );

            engine::register_entity(&camera, INTEGRATION_NAME, &tx).await;
            self.cameras.insert(entity_id, camera);
        }

        info!(
            "BloomSky integration ready with {} camera(s)",
            self.cameras.len()
        );
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::CameraImage { entity_id, reply } => {
                let result = self.camera_image(&entity_id).await;
                let image = match &result {
                    Ok(image) => image.clone(),
                    Err(_) => None,
                };
                if reply.send(image).is_err() {
                    warn!("[{}] Image requester went away", entity_id);
                }
                result.map(|_| ())
            }
            other => Err(engine::unsupported_command(&other)),
        }
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("BloomSky integration shutting down");
        Ok(())
    }
}
