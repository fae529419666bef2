use std::collections::BTreeMap;

use tracing::debug;
use tracing::info;

use super::client::DeviceTime;
use super::client::FanMode;
use super::client::ThermostatClient;
use super::client::ThermostatMode;
use super::config::Config;
use crate::engine;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::Operation;
use crate::engine::ThermostatState;
use crate::integrations::ClientError;

/// Radio Thermostats report and accept Fahrenheit only
pub const UNIT_FAHRENHEIT: &str = "°F";

/// Per-thermostat behavior taken from the integration configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermostatOptions {
    /// Write hold=1 along with every setpoint change
    pub hold_temp: bool,

    /// Offset applied to the target while away mode is on
    pub away_delta: f64,
}

impl From<&Config> for ThermostatOptions {
    fn from(config: &Config) -> Self {
        Self {
            hold_temp: config.hold_temp,
            away_delta: config.away_delta,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Thermostat entity backed by a Radio Thermostat device
pub struct RadioThermostat<C: ThermostatClient> {
    client: C,
    entity_id: String,
    host: String,
    name: String,
    options: ThermostatOptions,

    current_temperature: Option<f64>,
    target_temperature: Option<f64>,
    operation: Operation,
    fan: Option<FanMode>,
    mode: Option<ThermostatMode>,

    away: bool,
    /// Target to restore when away mode is turned off
    old_temp: Option<f64>,
}

impl<C: ThermostatClient> RadioThermostat<C> {
    /// Connect to a thermostat: set its clock, read its state, and remember
    /// the current target as the one to return to after away mode.
    pub async fn connect(
        client: C,
        host: &str,
        options: ThermostatOptions,
    ) -> Result<Self, ClientError> {
        let mut thermostat = Self {
            client,
            entity_id: String::new(),
            host: host.to_string(),
            name: String::new(),
            options,
            current_temperature: None,
            target_temperature: None,
            operation: Operation::Idle,
            fan: None,
            mode: None,
            away: false,
            old_temp: None,
        };

        thermostat.set_time(DeviceTime::now()).await?;
        thermostat.update().await?;
        thermostat.old_temp = thermostat.target_temperature;
        thermostat.entity_id = format!("climate.{}", engine::slugify(&thermostat.name));

        Ok(thermostat)
    }

    /// Replace the entity id chosen at connect time
    pub fn with_entity_id(mut self, entity_id: String) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn unit_of_measurement(&self) -> &'static str {
        UNIT_FAHRENHEIT
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature.map(round1)
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature.map(round1)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn is_away_mode_on(&self) -> bool {
        self.away
    }

    /// Human-readable fan and thermostat modes as reported by the device
    pub fn device_state_attributes(&self) -> BTreeMap<&'static str, String> {
        let mut attributes = BTreeMap::new();
        if let Some(fan) = self.fan {
            attributes.insert("fan", fan.to_string());
        }
        if let Some(mode) = self.mode {
            attributes.insert("mode", mode.to_string());
        }
        attributes
    }

    /// Pull temperature, name and mode from the device.
    ///
    /// A target changed on the unit itself (not through emberd) ends away mode.
    pub async fn update(&mut self) -> Result<(), ClientError> {
        let status = self.client.status().await?;
        self.name = self.client.name().await?;

        self.current_temperature = Some(status.temp);
        self.fan = Some(status.fmode);
        self.mode = Some(status.tmode);

        match status.tmode {
            ThermostatMode::Cool => {
                let reported = status.t_cool.ok_or_else(|| {
                    ClientError::Decode("t_cool missing while cooling".to_string())
                })?;
                self.sync_target(reported);
                self.operation = Operation::Cool;
            }
            ThermostatMode::Heat => {
                let reported = status.t_heat.ok_or_else(|| {
                    ClientError::Decode("t_heat missing while heating".to_string())
                })?;
                self.sync_target(reported);
                self.operation = Operation::Heat;
            }
            ThermostatMode::Off | ThermostatMode::Auto => {
                self.operation = Operation::Idle;
            }
        }

        Ok(())
    }

    fn sync_target(&mut self, reported: f64) {
        if self.target_temperature == Some(reported) {
            return;
        }
        if self.away {
            info!(
                "[{}] Target changed on the unit to {}, leaving away mode",
                self.entity_id, reported
            );
        }
        self.away = false;
        self.target_temperature = Some(reported);
    }

    /// Write a new target to the setpoint of the active mode, along with the
    /// configured hold flag. In idle mode only the hold flag is written.
    pub async fn set_temperature(&mut self, temperature: f64) -> Result<(), ClientError> {
        self.write_setpoint(temperature).await?;
        self.client.set_hold(self.options.hold_temp).await
    }

    /// Write the setpoint of the active mode and adopt it as the target.
    async fn write_setpoint(&mut self, temperature: f64) -> Result<(), ClientError> {
        match self.operation {
            Operation::Cool => self.client.set_cool_setpoint(temperature).await?,
            Operation::Heat => self.client.set_heat_setpoint(temperature).await?,
            Operation::Idle => debug!("[{}] Idle, keeping setpoints untouched", self.entity_id),
        }
        self.target_temperature = Some(temperature);
        Ok(())
    }

    /// Move the target away from comfort: up while cooling, down while heating.
    ///
    /// Does nothing while away mode is already on, so the comfort target
    /// saved the first time is kept.
    pub async fn turn_away_mode_on(&mut self) -> Result<(), ClientError> {
        if self.away {
            debug!("[{}] Away mode already on", self.entity_id);
            return Ok(());
        }

        let comfort = self.target_temperature;
        let away_target = match (comfort, self.operation) {
            (Some(t), Operation::Cool) => Some(t + self.options.away_delta),
            (Some(t), Operation::Heat) => Some(t - self.options.away_delta),
            _ => None,
        };

        if let Some(away_target) = away_target {
            self.write_setpoint(away_target).await?;
        }
        self.old_temp = comfort;
        self.away = true;

        if away_target.is_some() {
            self.client.set_hold(self.options.hold_temp).await?;
        }
        Ok(())
    }

    /// Restore the target saved when away mode was turned on.
    pub async fn turn_away_mode_off(&mut self) -> Result<(), ClientError> {
        if let Some(old_temp) = self.old_temp {
            self.write_setpoint(old_temp).await?;
        }
        self.away = false;

        if self.old_temp.is_some() {
            self.client.set_hold(self.options.hold_temp).await?;
        }
        Ok(())
    }

    /// Set the device clock
    pub async fn set_time(&mut self, time: DeviceTime) -> Result<(), ClientError> {
        self.client.set_time(time).await
    }

    /// Current state as stored by the engine
    pub fn state(&self) -> ThermostatState {
        let attributes = self.device_state_attributes();
        ThermostatState {
            name: self.name.clone(),
            current_temperature: self.current_temperature(),
            target_temperature: self.target_temperature(),
            operation: self.operation,
            away_mode: self.away,
            unit: UNIT_FAHRENHEIT.to_string(),
            fan: attributes.get("fan").cloned(),
            mode: attributes.get("mode").cloned(),
        }
    }

    #[cfg(test)]
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }
}

impl<C: ThermostatClient> Entity for RadioThermostat<C> {
    fn entity_id(&self) -> &str {
        &self.entity_id
    }

    fn platform(&self) -> &'static str {
        "climate"
    }

    fn state_message(&self) -> FromIntegrationMessage {
        FromIntegrationMessage::ThermostatStateChanged {
            entity_id: self.entity_id.clone(),
            state: self.state(),
        }
    }
}
