//! Configuration management: defaults, validation, loading from DB + environment.

pub mod app_config;
pub mod defaults;
pub mod manager;
pub mod validation;

pub use app_config::AppConfig;
pub use manager::SettingsManager;

use serde::{Deserialize, Serialize};

/// A setting as reported by the local API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingInfo {
    pub key: String,
    pub value: String,
    pub required: bool,
    pub description: String,
    pub has_value: bool,
}

/// Feature availability status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub realtime_configured: bool,
    pub missing_settings: Vec<String>,
    pub warnings: Vec<String>,
}
