use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::config::Config;
use crate::integrations::ClientError;

/// Timeout for calls to the sky data endpoint
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One weather station as reported by the sky data endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "DeviceID")]
    pub device_id: String,

    #[serde(rename = "DeviceName")]
    pub device_name: String,

    #[serde(rename = "Data", default)]
    pub data: DeviceData,
}

/// Latest observation of a station
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceData {
    /// URL of the most recent sky image
    #[serde(rename = "ImageURL")]
    pub image_url: Option<String>,

    /// Unix timestamp of the observation
    #[serde(rename = "TS")]
    pub timestamp: Option<i64>,

    #[serde(rename = "Temperature")]
    pub temperature: Option<f64>,

    #[serde(rename = "Humidity")]
    pub humidity: Option<f64>,
}

/// Trait for BloomSky account access
///
/// The client keeps the last fetched device records; cameras of the same
/// account share one client.
#[async_trait]
pub trait BloomSkyClient: Send + Sync {
    /// Fetch the device records again, unless they were fetched recently
    async fn refresh_devices(&self) -> Result<(), ClientError>;

    /// All known devices, ordered by device id
    async fn devices(&self) -> Vec<DeviceRecord>;

    /// Current image URL of a device, if the device is known and has one
    async fn image_url(&self, device_id: &str) -> Option<String>;
}

#[derive(Debug, Default)]
struct DeviceCache {
    devices: BTreeMap<String, DeviceRecord>,
    last_refresh: Option<Instant>,
}

/// BloomSky client backed by the sky data HTTP API
pub struct HttpBloomSkyClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    min_refresh: Duration,
    cache: Mutex<DeviceCache>,
}

impl HttpBloomSkyClient {
    /// Create a new HttpBloomSkyClient from configuration
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            min_refresh: Duration::from_secs(config.min_refresh_secs),
            cache: Mutex::new(DeviceCache::default()),
        })
    }

    async fn fetch_devices(&self) -> Result<Vec<DeviceRecord>, ClientError> {
        let response = self
            .http
            .get(&self.endpoint)
            .header(AUTHORIZATION, &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        let devices = response
            .error_for_status()?
            .json::<Vec<DeviceRecord>>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(devices)
    }
}

#[async_trait]
impl BloomSkyClient for HttpBloomSkyClient {
    async fn refresh_devices(&self) -> Result<(), ClientError> {
        // Held across the request so concurrent refreshes collapse into one
        let mut cache = self.cache.lock().await;

        if let Some(last) = cache.last_refresh {
            if last.elapsed() < self.min_refresh {
                debug!("Skipping BloomSky refresh, last one {:?} ago", last.elapsed());
                return Ok(());
            }
        }

        let devices = self.fetch_devices().await?;
        debug!("Fetched {} BloomSky device(s)", devices.len());

        cache.devices = devices
            .into_iter()
            .map(|d| (d.device_id.clone(), d))
            .collect();
        cache.last_refresh = Some(Instant::now());

        Ok(())
    }

    async fn devices(&self) -> Vec<DeviceRecord> {
        self.cache.lock().await.devices.values().cloned().collect()
    }

    async fn image_url(&self, device_id: &str) -> Option<String> {
        self.cache
            .lock()
            .await
            .devices
            .get(device_id)
            .and_then(|d| d.data.image_url.clone())
    }
}

/// Mock BloomSky client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockBloomSkyClient {
    pub devices: std::sync::Mutex<BTreeMap<String, DeviceRecord>>,
    pub refreshes: std::sync::atomic::AtomicUsize,
    pub fail_refresh: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockBloomSkyClient {
    /// Create a mock client knowing a single device
    pub fn with_device(device_id: &str, device_name: &str, image_url: Option<&str>) -> Self {
        let client = Self::default();
        client.add_device(device_id, device_name, image_url);
        client
    }

    pub fn add_device(&self, device_id: &str, device_name: &str, image_url: Option<&str>) {
        self.devices.lock().unwrap().insert(
            device_id.to_string(),
            DeviceRecord {
                device_id: device_id.to_string(),
                device_name: device_name.to_string(),
                data: DeviceData {
                    image_url: image_url.map(String::from),
                    ..Default::default()
                },
            },
        );
    }

    /// Simulate the station publishing a new image
    pub fn set_image_url(&self, device_id: &str, image_url: &str) {
        if let Some(device) = self.devices.lock().unwrap().get_mut(device_id) {
            device.data.image_url = Some(image_url.to_string());
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl BloomSkyClient for MockBloomSkyClient {
    async fn refresh_devices(&self) -> Result<(), ClientError> {
        use std::sync::atomic::Ordering;

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::Decode("refresh failed".to_string()));
        }
        Ok(())
    }

    async fn devices(&self) -> Vec<DeviceRecord> {
        self.devices.lock().unwrap().values().cloned().collect()
    }

    async fn image_url(&self, device_id: &str) -> Option<String> {
        self.devices
            .lock()
            .unwrap()
            .get(device_id)
            .and_then(|d| d.data.image_url.clone())
    }
}
