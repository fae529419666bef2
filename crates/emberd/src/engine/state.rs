use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// Operation mode of a thermostat, mirrored from the device's own state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Heat,
    Cool,
    #[default]
    Idle,
}

/// State of a thermostat entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThermostatState {
    pub name: String,

    /// Measured temperature, rounded to one decimal.
    pub current_temperature: Option<f64>,

    /// Setpoint for the active mode, rounded to one decimal.
    /// `None` until the device has reported heat or cool mode at least once.
    pub target_temperature: Option<f64>,

    pub operation: Operation,

    pub away_mode: bool,

    /// Unit the temperatures are expressed in (e.g. "°F").
    pub unit: String,

    /// Human-readable fan mode as reported by the device ("Auto", "On", ...)
    pub fan: Option<String>,

    /// Human-readable thermostat mode as reported by the device ("Heat", "Off", ...)
    pub mode: Option<String>,
}

/// State of a camera entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraState {
    pub name: String,

    /// Upstream identifier of the device the camera belongs to.
    pub device_id: String,

    /// URL of the most recently downloaded image.
    pub image_url: Option<String>,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub thermostats: HashMap<String, ThermostatState>,
    pub cameras: HashMap<String, CameraState>,
}
