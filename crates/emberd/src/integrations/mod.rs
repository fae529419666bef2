mod error;

#[cfg(feature = "integration_bloomsky")]
pub mod bloomsky;
#[cfg(feature = "integration_radiotherm")]
pub mod radiotherm;

pub use error::ClientError;
