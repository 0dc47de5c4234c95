//! Runtime application configuration loaded from DB + environment overrides.

use std::time::Duration;

use realtime_client::options::parse_transports;
use realtime_client::{ClientOptions, TransportKind};

use super::manager::SettingsManager;

/// Runtime configuration populated from the settings DB.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub realtime_enabled: bool,
    pub notification_dwell_ms: u64,
    pub reconnection_delay_ms: u64,
    pub reconnection_delay_max_ms: u64,
    pub reconnection_attempts: u32,
    pub connect_timeout_ms: u64,
    pub server_disconnect_retry_ms: u64,
    pub transports: Vec<TransportKind>,
    pub transport_upgrade: bool,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            realtime_enabled: true,
            notification_dwell_ms: 3500,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            reconnection_attempts: 5,
            connect_timeout_ms: 20_000,
            server_disconnect_retry_ms: 2000,
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            transport_upgrade: true,
            server_port: 8090,
        }
    }
}

impl AppConfig {
    /// Load configuration from the settings manager (DB-first, env overrides).
    pub fn load(sm: &SettingsManager) -> Result<Self, anyhow::Error> {
        let g = |key: &str| -> String { sm.get_setting(key).unwrap_or_default() };
        let defaults = Self::default();

        let mut api_base_url = g("API_BASE_URL").trim().to_string();
        let mut server_port = parse_or(&g("SERVER_PORT"), defaults.server_port);

        // Environment variable overrides
        if let Ok(v) = std::env::var("API_BASE_URL") {
            if !v.trim().is_empty() {
                api_base_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("SERVER_PORT") {
            if let Ok(p) = v.parse::<u16>() {
                server_port = p;
            }
        }

        let transports = match parse_transports(&g("REALTIME_TRANSPORTS")) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("Invalid REALTIME_TRANSPORTS ({e}); using defaults");
                defaults.transports.clone()
            }
        };

        Ok(Self {
            api_base_url,
            realtime_enabled: g("REALTIME_ENABLED") != "false",
            notification_dwell_ms: parse_or(&g("NOTIFICATION_DWELL_MS"), defaults.notification_dwell_ms),
            reconnection_delay_ms: parse_or(&g("RECONNECTION_DELAY_MS"), defaults.reconnection_delay_ms),
            reconnection_delay_max_ms: parse_or(
                &g("RECONNECTION_DELAY_MAX_MS"),
                defaults.reconnection_delay_max_ms,
            ),
            reconnection_attempts: parse_or(&g("RECONNECTION_ATTEMPTS"), defaults.reconnection_attempts),
            connect_timeout_ms: parse_or(&g("CONNECT_TIMEOUT_MS"), defaults.connect_timeout_ms),
            server_disconnect_retry_ms: parse_or(
                &g("SERVER_DISCONNECT_RETRY_MS"),
                defaults.server_disconnect_retry_ms,
            ),
            transports,
            transport_upgrade: g("TRANSPORT_UPGRADE") != "false",
            server_port,
        })
    }

    /// Reload config from the settings manager.
    pub fn reload(&mut self, sm: &SettingsManager) -> Result<(), anyhow::Error> {
        *self = Self::load(sm)?;
        Ok(())
    }

    pub fn notification_dwell(&self) -> Duration {
        Duration::from_millis(self.notification_dwell_ms)
    }

    /// Connection options for the realtime client.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            transports: self.transports.clone(),
            upgrade: self.transport_upgrade,
            reconnection_delay: Duration::from_millis(self.reconnection_delay_ms),
            reconnection_delay_max: Duration::from_millis(
                self.reconnection_delay_max_ms.max(self.reconnection_delay_ms),
            ),
            reconnection_attempts: self.reconnection_attempts,
            timeout: Duration::from_millis(self.connect_timeout_ms),
            server_disconnect_retry: Duration::from_millis(self.server_disconnect_retry_ms),
            ..ClientOptions::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(s: &str, default: T) -> T {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}
