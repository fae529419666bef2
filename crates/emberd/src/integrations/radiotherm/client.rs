use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use chrono::Timelike;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::integrations::ClientError;

/// Timeout for calls to the thermostat's local API
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thermostat mode (`tmode`) as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(try_from = "u8")]
pub enum ThermostatMode {
    Off,
    Heat,
    Cool,
    Auto,
}

impl TryFrom<u8> for ThermostatMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ThermostatMode::Off),
            1 => Ok(ThermostatMode::Heat),
            2 => Ok(ThermostatMode::Cool),
            3 => Ok(ThermostatMode::Auto),
            other => Err(format!("unknown thermostat mode {}", other)),
        }
    }
}

/// Fan mode (`fmode`) as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(try_from = "u8")]
pub enum FanMode {
    Auto,
    Circulate,
    On,
}

impl TryFrom<u8> for FanMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FanMode::Auto),
            1 => Ok(FanMode::Circulate),
            2 => Ok(FanMode::On),
            other => Err(format!("unknown fan mode {}", other)),
        }
    }
}

/// Deserialize a 0/1 device flag into a bool.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(u8::deserialize(deserializer)? != 0)
}

/// Snapshot of `/tstat`
///
/// The device only reports the setpoint of the active mode: `t_heat` in
/// heat mode, `t_cool` in cool mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThermostatStatus {
    /// Measured temperature in °F
    pub temp: f64,

    pub tmode: ThermostatMode,

    pub fmode: FanMode,

    #[serde(default)]
    pub t_heat: Option<f64>,

    #[serde(default)]
    pub t_cool: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_flag")]
    pub hold: bool,
}

/// Time of day as understood by the device clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceTime {
    /// Day of the week, Monday = 0
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl DeviceTime {
    pub fn from_datetime<T: Datelike + Timelike>(t: &T) -> Self {
        Self {
            day: t.weekday().num_days_from_monday() as u8,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }

    /// Current local time
    pub fn now() -> Self {
        Self::from_datetime(&chrono::Local::now())
    }
}

/// Trait for Radio Thermostat device operations
///
/// This trait allows for mocking the device for testing purposes
#[async_trait]
pub trait ThermostatClient: Send + Sync {
    /// Read the current temperature, modes and setpoints
    async fn status(&mut self) -> Result<ThermostatStatus, ClientError>;

    /// Read the user-assigned device name
    async fn name(&mut self) -> Result<String, ClientError>;

    /// Write the cooling setpoint
    async fn set_cool_setpoint(&mut self, temperature: f64) -> Result<(), ClientError>;

    /// Write the heating setpoint
    async fn set_heat_setpoint(&mut self, temperature: f64) -> Result<(), ClientError>;

    /// Pin (or release) the current setpoint
    async fn set_hold(&mut self, hold: bool) -> Result<(), ClientError>;

    /// Set the device clock
    async fn set_time(&mut self, time: DeviceTime) -> Result<(), ClientError>;
}

/// Thermostat client speaking the device's local JSON API
pub struct HttpThermostatClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct NameResponse {
    name: String,
}

impl HttpThermostatClient {
    /// Create a client for the thermostat at `host` (an address, or a full base URL)
    pub fn new(host: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host)
        };

        Ok(Self { http, base_url })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        self.http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// POST a partial update to `/tstat`
    async fn update(&self, body: serde_json::Value) -> Result<(), ClientError> {
        let url = format!("{}/tstat", self.base_url);
        debug!("POST {} {}", url, body);

        let response: serde_json::Value = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        // The device answers {"success": 0} or {"error": "..."}
        if let Some(error) = response.get("error") {
            return Err(ClientError::Rejected(error.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ThermostatClient for HttpThermostatClient {
    async fn status(&mut self) -> Result<ThermostatStatus, ClientError> {
        self.get("/tstat").await
    }

    async fn name(&mut self) -> Result<String, ClientError> {
        let response: NameResponse = self.get("/sys/name").await?;
        Ok(response.name)
    }

    async fn set_cool_setpoint(&mut self, temperature: f64) -> Result<(), ClientError> {
        self.update(serde_json::json!({ "t_cool": temperature }))
            .await
    }

    async fn set_heat_setpoint(&mut self, temperature: f64) -> Result<(), ClientError> {
        self.update(serde_json::json!({ "t_heat": temperature }))
            .await
    }

    async fn set_hold(&mut self, hold: bool) -> Result<(), ClientError> {
        self.update(serde_json::json!({ "hold": u8::from(hold) }))
            .await
    }

    async fn set_time(&mut self, time: DeviceTime) -> Result<(), ClientError> {
        self.update(serde_json::json!({ "time": time })).await
    }
}

/// Mock thermostat for testing
///
/// Setpoint writes land in `status`, the way the real device would report
/// them on the next read.
#[cfg(test)]
#[derive(Debug)]
pub struct MockThermostatClient {
    pub status: ThermostatStatus,
    pub name: String,
    pub time: Option<DeviceTime>,
    pub offline: bool,
    /// Reject hold writes while setpoint writes still succeed
    pub fail_hold: bool,
    /// Every write, in order, e.g. "t_cool=78"
    pub writes: Vec<String>,
}

#[cfg(test)]
impl MockThermostatClient {
    /// A thermostat in `tmode` with the matching setpoint at `target`
    pub fn new(name: &str, tmode: ThermostatMode, temp: f64, target: f64) -> Self {
        let (t_heat, t_cool) = match tmode {
            ThermostatMode::Heat => (Some(target), None),
            ThermostatMode::Cool => (None, Some(target)),
            _ => (None, None),
        };
        Self {
            status: ThermostatStatus {
                temp,
                tmode,
                fmode: FanMode::Auto,
                t_heat,
                t_cool,
                hold: false,
            },
            name: name.to_string(),
            time: None,
            offline: false,
            fail_hold: false,
            writes: Vec::new(),
        }
    }

    fn check_online(&self) -> Result<(), ClientError> {
        if self.offline {
            Err(ClientError::Decode("thermostat offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ThermostatClient for MockThermostatClient {
    async fn status(&mut self) -> Result<ThermostatStatus, ClientError> {
        self.check_online()?;
        Ok(self.status.clone())
    }

    async fn name(&mut self) -> Result<String, ClientError> {
        self.check_online()?;
        Ok(self.name.clone())
    }

    async fn set_cool_setpoint(&mut self, temperature: f64) -> Result<(), ClientError> {
        self.check_online()?;
        self.status.t_cool = Some(temperature);
        self.writes.push(format!("t_cool={}", temperature));
        Ok(())
    }

    async fn set_heat_setpoint(&mut self, temperature: f64) -> Result<(), ClientError> {
        self.check_online()?;
        self.status.t_heat = Some(temperature);
        self.writes.push(format!("t_heat={}", temperature));
        Ok(())
    }

    async fn set_hold(&mut self, hold: bool) -> Result<(), ClientError> {
        self.check_online()?;
        if self.fail_hold {
            return Err(ClientError::Rejected("hold".to_string()));
        }
        self.status.hold = hold;
        self.writes.push(format!("hold={}", u8::from(hold)));
        Ok(())
    }

    async fn set_time(&mut self, time: DeviceTime) -> Result<(), ClientError> {
        self.check_online()?;
        self.time = Some(time);
        Ok(())
    }
}
