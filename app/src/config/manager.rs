//! SettingsManager: DB-backed settings with defaults, migration, and feature status.

use std::collections::HashMap;

use client_store::Database;
use realtime_client::Endpoint;

use super::defaults::{DEFAULT_SETTINGS, get_default};
use super::validation::validate_setting;
use super::{FeatureStatus, SettingInfo};

/// Wraps [`Database`] to provide high-level settings operations.
pub struct SettingsManager {
    db: Database,
}

impl SettingsManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a setting value. Falls back to default if not in DB.
    pub fn get_setting(&self, key: &str) -> Result<String, anyhow::Error> {
        if let Some(val) = self.db.get_setting(key)? {
            return Ok(val);
        }
        match get_default(key) {
            Some(default) => Ok(default.to_string()),
            None => anyhow::bail!("setting not found: {key}"),
        }
    }

    /// Set a setting value with validation.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        if !DEFAULT_SETTINGS.contains_key(key) {
            anyhow::bail!("unknown setting key: {key}");
        }
        validate_setting(key, value).map_err(|e| anyhow::anyhow!("validation error for {key}: {e}"))?;
        self.db.set_setting(key, value, "normal")?;
        Ok(())
    }

    /// Get all settings, filling in defaults for missing keys.
    pub fn get_all_settings(&self) -> Result<HashMap<String, SettingInfo>, anyhow::Error> {
        let db_settings = self.db.get_all_settings()?;
        let mut result = HashMap::new();

        for (key, def) in DEFAULT_SETTINGS.iter() {
            let value = db_settings
                .get(*key)
                .cloned()
                .unwrap_or_else(|| def.default.to_string());
            result.insert(
                key.to_string(),
                SettingInfo {
                    key: key.to_string(),
                    has_value: !value.is_empty(),
                    value,
                    required: def.required,
                    description: def.description.to_string(),
                },
            );
        }

        // Keys written by older builds are reported as-is.
        for (key, value) in db_settings {
            result.entry(key.clone()).or_insert_with(|| SettingInfo {
                key,
                has_value: !value.is_empty(),
                value,
                required: false,
                description: String::new(),
            });
        }

        Ok(result)
    }

    /// Initialize default settings in DB (skip existing).
    pub fn initialize_defaults(&self) -> Result<(), anyhow::Error> {
        for (key, def) in DEFAULT_SETTINGS.iter() {
            self.db
                .insert_setting_if_absent(key, def.default, "normal", def.required, def.description)?;
        }
        Ok(())
    }

    /// Migrate settings from environment variables to DB (one-time).
    pub fn migrate_from_env(&self) -> Result<u32, anyhow::Error> {
        let mut migrated = 0u32;
        for key in DEFAULT_SETTINGS.keys() {
            if self.db.get_setting(key)?.is_some() {
                continue;
            }
            if let Ok(env_val) = std::env::var(key) {
                if env_val.is_empty() {
                    continue;
                }
                if let Err(e) = validate_setting(key, &env_val) {
                    tracing::warn!("Ignoring invalid env setting {key}: {e}");
                    continue;
                }
                self.db.set_setting(key, &env_val, "normal")?;
                tracing::info!("Migrated setting from env: {key}");
                migrated += 1;
            }
        }
        if migrated > 0 {
            tracing::info!("Migration completed: {migrated} settings migrated");
        }
        Ok(migrated)
    }

    /// Check which features are properly configured.
    pub fn check_feature_status(&self) -> Result<FeatureStatus, anyhow::Error> {
        let mut status = FeatureStatus {
            realtime_configured: true,
            missing_settings: Vec::new(),
            warnings: Vec::new(),
        };

        for (key, def) in DEFAULT_SETTINGS.iter() {
            if def.required && self.get_setting(key).unwrap_or_default().trim().is_empty() {
                status.missing_settings.push(key.to_string());
                status.realtime_configured = false;
            }
        }
        status.missing_settings.sort();

        let base_url = self.get_setting("API_BASE_URL").unwrap_or_default();
        if !base_url.trim().is_empty() {
            if let Err(e) = Endpoint::derive(&base_url) {
                status.realtime_configured = false;
                status.warnings.push(format!("API_BASE_URL is unusable: {e}"));
            }
        }

        if self.get_setting("REALTIME_ENABLED").unwrap_or_default() == "false" {
            status.warnings.push("REALTIME_ENABLED is false - notifications are not received".into());
        }

        Ok(status)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}
