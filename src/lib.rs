pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod sensor;
pub mod service;
pub mod throttle;
pub mod types;

pub use auth::{AuthTokens, Credential, OAuthSession, TokenProvider, TokenRefreshCallback};
pub use client::AirthingsClient;
pub use error::Error;
pub use models::{Device, DeviceHandle, Location};
pub use sensor::{SensorEntity, SensorType};
pub use service::{CycleReport, LocationService};
pub use throttle::{Throttle, SCAN_INTERVAL};
