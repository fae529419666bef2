use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::error;

use super::client::BloomSkyClient;
use super::client::DeviceRecord;
use crate::engine::CameraState;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::integrations::ClientError;

/// Timeout for downloading a single sky image
pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Camera entity showing the images published by a BloomSky station
///
/// Images are only downloaded when the station reports a new image URL, so
/// frequent polling does not fetch the same image over and over.
pub struct BloomSkyCamera {
    entity_id: String,
    name: String,
    device_id: String,
    bloomsky: Arc<dyn BloomSkyClient>,
    http: reqwest::Client,
    timeout: Duration,

    /// URL the cached image was downloaded from
    last_url: Option<String>,
    last_image: Option<Vec<u8>>,
}

impl BloomSkyCamera {
    pub fn new(
        entity_id: String,
        device: &DeviceRecord,
        bloomsky: Arc<dyn BloomSkyClient>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            entity_id,
            name: device.device_name.clone(),
            device_id: device.device_id.clone(),
            bloomsky,
            http,
            timeout: IMAGE_TIMEOUT,
            last_url: None,
            last_image: None,
        }
    }

    /// Override the image download timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL of the cached image
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    /// Return the latest image, downloading it if the station published a new one.
    ///
    /// Failures are logged and reported as `None`; they never reach the caller.
    pub async fn camera_image(&mut self) -> Option<Vec<u8>> {
        match self.fetch_image().await {
            Ok(image) => image,
            Err(e) => {
                error!("[{}] Error getting BloomSky image: {}", self.entity_id, e);
                None
            }
        }
    }

    async fn fetch_image(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        let url = self
            .bloomsky
            .image_url(&self.device_id)
            .await
            .ok_or_else(|| ClientError::UnknownDevice(self.device_id.clone()))?;

        self.bloomsky.refresh_devices().await?;

        // Same URL means same image
        if self.last_url.as_deref() != Some(url.as_str()) {
            debug!("[{}] Downloading new image from {}", self.entity_id, url);
            let image = self
                .http
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;

            self.last_url = Some(url);
            self.last_image = Some(image.to_vec());
        }

        Ok(self.last_image.clone())
    }
}

impl Entity for BloomSkyCamera {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> &'static str {
        "camera"
    }

    fn state_message(&self) -> FromIntegrationMessage {
        FromIntegrationMessage::CameraStateChanged {
            entity_id: self.entity_id.clone(),
            state: CameraState {
                name: self.name.clone(),
                device_id: self.device_id.clone(),
                image_url: self.last_url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;

    use super::*;
    use crate::integrations::bloomsky::client::MockBloomSkyClient;

    const DEVICE_ID: &str = "442C05954A59";

    async fn mount_image(server: &MockServer, image_path: &str, body: &[u8], expected: u64) {
        Mock::given(method("GET"))
            .and(path(image_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn camera(server: &MockServer, image_path: &str) -> (BloomSkyCamera, Arc<MockBloomSkyClient>) {
        let url = format!("{}{}", server.uri(), image_path);
        let bloomsky = Arc::new(MockBloomSkyClient::with_device(
            DEVICE_ID,
            "Backyard",
            Some(&url),
        ));
        let device = DeviceRecord {
            device_id: DEVICE_ID.to_string(),
            device_name: "Backyard".to_string(),
            data: Default::default(),
        };
        let camera = BloomSkyCamera::new(
            "camera.backyard".to_string(),
            &device,
            bloomsky.clone(),
            reqwest::Client::new(),
        );
        (camera, bloomsky)
    }

    #[tokio::test]
    async fn test_unchanged_url_serves_cached_image() {
        let server = MockServer::start().await;
        mount_image(&server, "/one.jpg", b"first image", 1).await;
        let (mut camera, bloomsky) = camera(&server, "/one.jpg");

        let first = camera.camera_image().await;
        let second = camera.camera_image().await;

        assert_eq!(first.as_deref(), Some(&b"first image"[..]));
        assert_eq!(second, first);
        assert_eq!(bloomsky.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_changed_url_downloads_once() {
        let server = MockServer::start().await;
        mount_image(&server, "/one.jpg", b"first image", 1).await;
        mount_image(&server, "/two.jpg", b"second image", 1).await;
        let (mut camera, bloomsky) = camera(&server, "/one.jpg");

        assert_eq!(
            camera.camera_image().await.as_deref(),
            Some(&b"first image"[..])
        );

        bloomsky.set_image_url(DEVICE_ID, &format!("{}/two.jpg", server.uri()));
        assert_eq!(
            camera.camera_image().await.as_deref(),
            Some(&b"second image"[..])
        );
        assert_eq!(
            camera.camera_image().await.as_deref(),
            Some(&b"second image"[..])
        );
        assert_eq!(
            camera.last_url(),
            Some(format!("{}/two.jpg", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn test_timeout_yields_no_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let (camera, _bloomsky) = camera(&server, "/slow.jpg");
        let mut camera = camera.with_timeout(Duration::from_millis(50));

        assert_eq!(camera.camera_image().await, None);
        // Nothing was cached, so the next request tries again
        assert_eq!(camera.last_url(), None);
    }

    #[tokio::test]
    async fn test_error_status_keeps_previous_cache() {
        let server = MockServer::start().await;
        mount_image(&server, "/one.jpg", b"first image", 1).await;
        Mock::given(method("GET"))
            .and(path("/broken.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (mut camera, bloomsky) = camera(&server, "/one.jpg");

        camera.camera_image().await.unwrap();
        bloomsky.set_image_url(DEVICE_ID, &format!("{}/broken.jpg", server.uri()));

        assert_eq!(camera.camera_image().await, None);
        assert_eq!(
            camera.last_url(),
            Some(format!("{}/one.jpg", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_yields_no_image() {
        let server = MockServer::start().await;
        mount_image(&server, "/one.jpg", b"first image", 0).await;
        let (mut camera, bloomsky) = camera(&server, "/one.jpg");
        bloomsky.fail_refresh.store(true, Ordering::SeqCst);

        assert_eq!(camera.camera_image().await, None);
    }

    #[tokio::test]
    async fn test_unknown_device_yields_no_image() {
        let bloomsky = Arc::new(MockBloomSkyClient::default());
        let device = DeviceRecord {
            device_id: "gone".to_string(),
            device_name: "Gone".to_string(),
            data: Default::default(),
        };
        let mut camera = BloomSkyCamera::new(
            "camera.gone".to_string(),
            &device,
            bloomsky.clone(),
            reqwest::Client::new(),
        );

        assert_eq!(camera.camera_image().await, None);
        assert_eq!(bloomsky.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_state_message_reports_cached_url() {
        let server = MockServer::start().await;
        mount_image(&server, "/one.jpg", b"first image", 1).await;
        let (mut camera, _bloomsky) = camera(&server, "/one.jpg");
        camera.camera_image().await;

        match camera.state_message() {
            FromIntegrationMessage::CameraStateChanged { entity_id, state } => {
                assert_eq!(entity_id, "camera.backyard");
                assert_eq!(state.name, "Backyard");
                assert_eq!(state.device_id, DEVICE_ID);
                assert_eq!(
                    state.image_url,
                    Some(format!("{}/one.jpg", server.uri()))
                );
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
