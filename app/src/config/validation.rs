//! Setting value validation.

use realtime_client::Endpoint;
use realtime_client::options::parse_transports;

/// Validate a setting value. Returns `Ok(())` if valid, or an error message.
pub fn validate_setting(key: &str, value: &str) -> Result<(), String> {
    match key {
        "API_BASE_URL" => {
            // Empty clears the setting; anything else must yield an endpoint.
            if !value.trim().is_empty() {
                Endpoint::derive(value).map_err(|e| e.to_string())?;
            }
        }
        "REALTIME_TRANSPORTS" => {
            parse_transports(value)?;
        }
        "NOTIFICATION_DWELL_MS" => validate_int_range(value, 500, 60_000)?,
        "RECONNECTION_DELAY_MS" => validate_int_range(value, 100, 60_000)?,
        "RECONNECTION_DELAY_MAX_MS" => validate_int_range(value, 100, 300_000)?,
        "RECONNECTION_ATTEMPTS" => validate_int_range(value, 0, 100)?,
        "CONNECT_TIMEOUT_MS" => validate_int_range(value, 1_000, 120_000)?,
        "SERVER_DISCONNECT_RETRY_MS" => validate_int_range(value, 0, 60_000)?,
        "SERVER_PORT" => validate_int_range(value, 1, 65_535)?,
        k if is_boolean_setting(k) => {
            if value != "true" && value != "false" {
                return Err("must be 'true' or 'false'".into());
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_int_range(value: &str, min: i64, max: i64) -> Result<(), String> {
    let v: i64 = value.parse().map_err(|_| "must be an integer")?;
    if v < min || v > max {
        return Err(format!("must be between {min} and {max}"));
    }
    Ok(())
}

fn is_boolean_setting(key: &str) -> bool {
    matches!(key, "REALTIME_ENABLED" | "TRANSPORT_UPGRADE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_boolean() {
        assert!(validate_setting("REALTIME_ENABLED", "true").is_ok());
        assert!(validate_setting("TRANSPORT_UPGRADE", "false").is_ok());
        assert!(validate_setting("REALTIME_ENABLED", "yes").is_err());
    }

    #[test]
    fn test_api_base_url() {
        assert!(validate_setting("API_BASE_URL", "https://api.example.com/api/v1").is_ok());
        assert!(validate_setting("API_BASE_URL", "").is_ok());
        assert!(validate_setting("API_BASE_URL", "ftp://example.com").is_err());
        assert!(validate_setting("API_BASE_URL", "not a url").is_err());
    }

    #[test]
    fn test_transports() {
        assert!(validate_setting("REALTIME_TRANSPORTS", "websocket,polling").is_ok());
        assert!(validate_setting("REALTIME_TRANSPORTS", "polling").is_ok());
        assert!(validate_setting("REALTIME_TRANSPORTS", "carrier-pigeon").is_err());
        assert!(validate_setting("REALTIME_TRANSPORTS", "").is_err());
    }

    #[test]
    fn test_int_ranges() {
        assert!(validate_setting("NOTIFICATION_DWELL_MS", "3500").is_ok());
        assert!(validate_setting("NOTIFICATION_DWELL_MS", "10").is_err());
        assert!(validate_setting("RECONNECTION_ATTEMPTS", "0").is_ok());
        assert!(validate_setting("SERVER_PORT", "70000").is_err());
        assert!(validate_setting("SERVER_PORT", "abc").is_err());
    }
}
