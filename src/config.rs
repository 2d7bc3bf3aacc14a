use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL};

pub const DEFAULT_MODEL_PATH: &str = "vehicle_health_model.json";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model_path: PathBuf,
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Rows shown in the "Uploaded Data" preview.
    pub preview_rows: usize,
    pub max_upload_bytes: usize,
    /// Idle time after which a browser session and its upload are dropped.
    pub session_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            preview_rows: 5,
            max_upload_bytes: 16 * 1024 * 1024,
            session_ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            model_path: get("MODEL_PATH").map(PathBuf::from).unwrap_or(d.model_path),
            bind_addr: get("BIND_ADDR")
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.bind_addr),
            port: get("PORT").and_then(|s| s.parse().ok()).unwrap_or(d.port),
            preview_rows: get("PREVIEW_ROWS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.preview_rows),
            max_upload_bytes: get("MAX_UPLOAD_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.max_upload_bytes),
            session_ttl: get("SESSION_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(d.session_ttl),
            max_sessions: get("MAX_SESSIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.max_sessions),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let c = AppConfig::from_lookup(|_| None);
        assert_eq!(c.model_path, PathBuf::from("vehicle_health_model.json"));
        assert_eq!(c.socket_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(c.preview_rows, 5);
    }

    #[test]
    fn bad_port_falls_back() {
        let env: HashMap<&str, &str> = [
            ("PORT", "http"),
            ("MODEL_PATH", "/srv/m.json"),
            ("SESSION_TTL_SECS", "90"),
            ("MAX_SESSIONS", "-3"),
        ]
        .into();
        let c = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.port, 8080);
        assert_eq!(c.session_ttl, Duration::from_secs(90));
        assert_eq!(c.max_sessions, 256);
        assert_eq!(c.model_path, PathBuf::from("/srv/m.json"));
    }
}
