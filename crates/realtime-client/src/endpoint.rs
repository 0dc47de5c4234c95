//! Realtime endpoint derivation from the REST base URL.
//!
//! The REST API lives under `/api` or `/api/v<N>`; the realtime namespace
//! `/ws` hangs off the same prefix without the API segment. Derivation is
//! idempotent so an already-derived endpoint can be fed back in.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::options::TransportKind;
use crate::RealtimeError;

/// Namespace suffix appended to the derived base.
pub const NAMESPACE_SUFFIX: &str = "/ws";

/// Engine.IO protocol revision spoken by the backend.
const ENGINE_PROTOCOL: &str = "4";

static VERSIONED_API: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/api/v\d+/?$").expect("static regex"));
static BARE_API: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/api/?$").expect("static regex"));

/// A derived realtime endpoint, e.g. `wss://api.example.com/ws`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Derive the realtime endpoint from a configured base API URL.
    pub fn derive(base_url: &str) -> Result<Self, RealtimeError> {
        let trimmed = base_url.trim();
        if trimmed.trim_end_matches('/').is_empty() {
            return Err(RealtimeError::Config("base URL is empty".into()));
        }

        let mut url = Url::parse(trimmed)
            .map_err(|e| RealtimeError::Config(format!("invalid base URL {trimmed:?}: {e}")))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(RealtimeError::Config(format!("base URL {trimmed:?} has no host")));
        }

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RealtimeError::Config(format!(
                    "unsupported scheme {other:?} in base URL"
                )));
            }
        };

        let prefix = strip_api_path(url.path());
        url.set_path(&format!("{prefix}{NAMESPACE_SUFFIX}"));
        url.set_query(None);
        url.set_fragment(None);
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::Config(format!("cannot switch {trimmed:?} to {scheme}")))?;

        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Socket.IO namespace addressed by this endpoint (the URL path).
    pub fn namespace(&self) -> &str {
        self.url.path()
    }

    /// Build the Engine.IO URL for a transport.
    ///
    /// The engine lives at `engine_path` on the endpoint's origin; the bearer
    /// token travels as the `token` query parameter.
    pub fn engine_url(
        &self,
        engine_path: &str,
        transport: TransportKind,
        token: &str,
        sid: Option<&str>,
    ) -> Url {
        let mut url = self.url.clone();
        let secure = url.scheme() == "wss";
        let scheme = match (transport, secure) {
            (TransportKind::WebSocket, true) => "wss",
            (TransportKind::WebSocket, false) => "ws",
            (TransportKind::Polling, true) => "https",
            (TransportKind::Polling, false) => "http",
        };
        // ws/wss/http/https are all special schemes, so switching cannot fail.
        let _ = url.set_scheme(scheme);
        url.set_path(engine_path);
        {
            let mut query = url.query_pairs_mut();
            query
                .clear()
                .append_pair("EIO", ENGINE_PROTOCOL)
                .append_pair("transport", transport.as_str())
                .append_pair("token", token);
            if let Some(sid) = sid {
                query.append_pair("sid", sid);
            }
        }
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Remove trailing slashes, API segments and a previous namespace suffix.
fn strip_api_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    let path = VERSIONED_API.replace(path, "");
    let path = BARE_API.replace(&path, "");
    let mut path = path.trim_end_matches('/');
    if let Some(rest) = path.strip_suffix(NAMESPACE_SUFFIX) {
        path = rest;
    }
    if let Some(rest) = path.strip_suffix("/api") {
        path = rest;
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(base: &str) -> String {
        Endpoint::derive(base).unwrap().to_string()
    }

    #[test]
    fn versioned_api_base_maps_to_secure_namespace() {
        assert_eq!(derive("https://api.example.com/api/v1"), "wss://api.example.com/ws");
    }

    #[test]
    fn namespace_free_base_gets_suffix() {
        assert_eq!(derive("https://api.example.com/"), "wss://api.example.com/ws");
    }

    #[test]
    fn plain_http_and_bare_api_segment() {
        assert_eq!(derive("http://localhost:3000/api/"), "ws://localhost:3000/ws");
        assert_eq!(derive("http://localhost:3000/api"), "ws://localhost:3000/ws");
    }

    #[test]
    fn path_prefix_is_kept() {
        assert_eq!(
            derive("https://example.com/backend/api/v2///"),
            "wss://example.com/backend/ws"
        );
    }

    #[test]
    fn leftover_namespace_and_api_are_stripped() {
        assert_eq!(derive("wss://api.example.com/ws/"), "wss://api.example.com/ws");
        assert_eq!(derive("https://api.example.com/api/ws"), "wss://api.example.com/ws");
    }

    #[test]
    fn similar_looking_segments_survive() {
        assert_eq!(derive("https://example.com/news"), "wss://example.com/news/ws");
        assert_eq!(derive("https://example.com/myapi"), "wss://example.com/myapi/ws");
    }

    #[test]
    fn derivation_is_idempotent() {
        for base in [
            "https://api.example.com/api/v1",
            "https://api.example.com/",
            "http://localhost:3000/api",
            "https://example.com/backend/api/v12/",
            "wss://api.example.com/ws",
        ] {
            let once = derive(base);
            let twice = derive(&once);
            assert_eq!(once, twice, "not idempotent for {base}");
            assert!(!twice.ends_with("/ws/ws"));
            let namespace = Endpoint::derive(&once).unwrap().namespace().to_string();
            assert!(!namespace.contains("/api"), "api segment left in {namespace}");
        }
    }

    #[test]
    fn query_and_fragment_are_dropped() {
        assert_eq!(
            derive("https://api.example.com/api/v1?debug=1#top"),
            "wss://api.example.com/ws"
        );
    }

    #[test]
    fn empty_or_malformed_base_is_a_config_error() {
        for base in ["", "   ", "///", "not a url", "ftp://files.example.com/api"] {
            assert!(
                matches!(Endpoint::derive(base), Err(RealtimeError::Config(_))),
                "expected config error for {base:?}"
            );
        }
    }

    #[test]
    fn namespace_is_the_path() {
        let endpoint = Endpoint::derive("https://example.com/backend/api").unwrap();
        assert_eq!(endpoint.namespace(), "/backend/ws");
    }

    #[test]
    fn engine_url_carries_token_and_transport() {
        let endpoint = Endpoint::derive("https://api.example.com/api/v1").unwrap();
        let ws = endpoint.engine_url("/socket.io/", TransportKind::WebSocket, "abc", None);
        assert_eq!(
            ws.as_str(),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket&token=abc"
        );

        let polling =
            endpoint.engine_url("/socket.io/", TransportKind::Polling, "a b", Some("sid1"));
        assert_eq!(
            polling.as_str(),
            "https://api.example.com/socket.io/?EIO=4&transport=polling&token=a+b&sid=sid1"
        );
    }
}
