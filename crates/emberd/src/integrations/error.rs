/// Errors raised by the device clients (BloomSky cloud API, Radio Thermostat local API)
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request was not authorized, check the API key")]
    Unauthorized,

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Device rejected the update: {0}")]
    Rejected(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}
