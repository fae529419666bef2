use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client::ThermostatClient;
use super::config::Config;
use super::discover;
use super::discover::DiscoveryError;
use super::thermostat::RadioThermostat;
use super::thermostat::ThermostatOptions;
use crate::engine;
use crate::engine::Entity;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;
use crate::integrations::ClientError;

const INTEGRATION_NAME: &str = "radiotherm";

/// How long to wait for discovery replies
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates a device client for a thermostat address
type Connector<C> = Box<dyn Fn(&str) -> Result<C, ClientError> + Send + Sync>;

/// Finds thermostat addresses on the local network within a timeout
type Discovery = Box<
    dyn Fn(Duration) -> Pin<Box<dyn Future<Output = Result<Vec<String>, DiscoveryError>> + Send>>
        + Send
        + Sync,
>;

/// Type alias for the shared thermostats map
type ThermostatsMap<C> = Arc<Mutex<HashMap<String, Arc<Mutex<RadioThermostat<C>>>>>>;

/// Radio Thermostat Integration for emberd
///
/// Connects to every configured (or discovered) thermostat, polls them on a
/// fixed interval, and applies setpoint and away-mode commands.
pub struct RadioThermIntegration<C: ThermostatClient> {
    config: Config,
    connector: Connector<C>,
    discovery: Discovery,
    thermostats: ThermostatsMap<C>,
    to_engine: Option<FromIntegrationSender>,
    /// Handle to the background polling task
    poll_task: Option<JoinHandle<()>>,
}

impl<C: ThermostatClient + 'static> RadioThermIntegration<C> {
    /// Create a new Radio Thermostat integration
    pub fn new(
        config: &Config,
        connector: impl Fn(&str) -> Result<C, ClientError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config: config.clone(),
            connector: Box::new(connector),
            discovery: Box::new(|timeout| Box::pin(discover::discover_addresses(timeout))),
            thermostats: Arc::new(Mutex::new(HashMap::new())),
            to_engine: None,
            poll_task: None,
        }
    }

    /// Replace the network discovery used when no hosts are configured
    pub fn with_discovery<F, Fut>(mut self, discovery: F) -> Self
    where
        F: Fn(Duration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<String>, DiscoveryError>> + Send + 'static,
    {
        self.discovery = Box::new(move |timeout| Box::pin(discovery(timeout)));
        self
    }

    /// Configured hosts, or the ones found on the local network
    async fn resolve_hosts(&self) -> Result<Vec<String>, Box<dyn Error + Send>> {
        if let Some(hosts) = self.config.hosts() {
            return Ok(hosts.to_vec());
        }

        info!("No thermostat hosts configured, running discovery");
        match (self.discovery)(DISCOVERY_TIMEOUT).await {
            Ok(hosts) => {
                info!("Discovered Radio Thermostat(s): {:?}", hosts);
                Ok(hosts)
            }
            Err(e) => {
                error!("Radio Thermostat discovery failed: {}", e);
                Err(Box::new(e))
            }
        }
    }

    /// Connect to a single thermostat
    async fn connect(&self, host: &str) -> Result<RadioThermostat<C>, ClientError> {
        let client = (self.connector)(host)?;
        RadioThermostat::connect(client, host, ThermostatOptions::from(&self.config)).await
    }

    /// Poll every thermostat once and report the refreshed states
    async fn poll_once(thermostats: &ThermostatsMap<C>, to_engine: &FromIntegrationSender) {
        let entries: Vec<_> = thermostats.lock().await.values().cloned().collect();

        for thermostat in entries {
            let mut thermostat = thermostat.lock().await;
            match thermostat.update().await {
                Ok(()) => engine::report_state(&*thermostat, to_engine).await,
                Err(e) => warn!(
                    "[{}] Failed to update thermostat at {}: {}",
                    thermostat.entity_id(),
                    thermostat.host(),
                    e
                ),
            }
        }
    }

    /// Background task polling the thermostats every `period`
    async fn poll_task(
        thermostats: ThermostatsMap<C>,
        to_engine: FromIntegrationSender,
        period: Duration,
    ) {
        // Setup already read every thermostat, so skip the immediate tick
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            Self::poll_once(&thermostats, &to_engine).await;
        }
    }

    async fn thermostat(
        &self,
        entity_id: &str,
    ) -> Result<Arc<Mutex<RadioThermostat<C>>>, Box<dyn Error + Send>> {
        self.thermostats
            .lock()
            .await
            .get(entity_id)
            .cloned()
            .ok_or_else(|| engine::entity_not_found(entity_id))
    }

    async fn report(&self, thermostat: &RadioThermostat<C>) {
        if let Some(tx) = &self.to_engine {
            engine::report_state(thermostat, tx).await;
        }
    }
}

#[async_trait]
impl<C: ThermostatClient + 'static> Integration for RadioThermIntegration<C> {
    fn name(&self) -> &str {
        INTEGRATION_NAME
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        let hosts = self.resolve_hosts().await?;

        for host in hosts {
            let thermostat = match self.connect(&host).await {
                Ok(t) => t,
                Err(e) => {
                    error!("Unable to connect to Radio Thermostat {}: {}", host, e);
                    continue;
                }
            };

            let mut thermostats = self.thermostats.lock().await;
            let thermostat = if thermostats.contains_key(thermostat.entity_id()) {
                let entity_id = format!("{}_{}", thermostat.entity_id(), engine::slugify(&host));
                thermostat.with_entity_id(entity_id)
            } else {
                thermostat
            };

            info!(
                "Connected to Radio Thermostat {} at {} ({})",
                thermostat.name(),
                host,
                thermostat.entity_id()
            );
            engine::register_entity(&thermostat, INTEGRATION_NAME, &tx).await;
            thermostats.insert(
                thermostat.entity_id().to_string(),
                Arc::new(Mutex::new(thermostat)),
            );
        }

        let count = self.thermostats.lock().await.len();
        if count == 0 {
            warn!("No Radio Thermostats could be connected");
        }

        let period = Duration::from_secs(self.config.scan_interval_secs);
        info!(
            "Radio Thermostat integration ready with {} thermostat(s), polling every {:?}",
            count, period
        );

        let thermostats = self.thermostats.clone();
        let task = tokio::spawn(async move {
            Self::poll_task(thermostats, tx, period).await;
        });
        self.poll_task = Some(task);

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::SetTemperature {
                entity_id,
                temperature,
            } => {
                info!("[{}] Setting target temperature to {}", entity_id, temperature);
                let thermostat = self.thermostat(&entity_id).await?;
                let mut thermostat = thermostat.lock().await;
                thermostat
                    .set_temperature(temperature)
                    .await
                    .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
                self.report(&thermostat).await;
            }
            ToIntegrationMessage::SetAwayMode { entity_id, on } => {
                info!("[{}] Turning away mode {}", entity_id, if on { "on" } else { "off" });
                let thermostat = self.thermostat(&entity_id).await?;
                let mut thermostat = thermostat.lock().await;
                let result = if on {
                    thermostat.turn_away_mode_on().await
                } else {
                    thermostat.turn_away_mode_off().await
                };
                result.map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;
                self.report(&thermostat).await;
            }
            ToIntegrationMessage::CameraImage { ref entity_id, .. } => {
                warn!("[{}] Thermostats have no camera image", entity_id);
                // Dropping the reply tells the requester there is no image
                return Err(engine::unsupported_command(&msg));
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("Radio Thermostat integration shutting down");
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        Ok(())
    }
}

impl<C: ThermostatClient> Drop for RadioThermIntegration<C> {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}
