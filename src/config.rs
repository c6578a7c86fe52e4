use std::time::Duration;

use crate::store::DEFAULT_TTL_SECONDS;

const DEFAULT_PORT: u16 = 8724;

/// Server-level configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Comma-separated allowlist; `*` permits any origin outside production.
    pub cors_origins: Vec<String>,
    pub production: bool,
    pub room_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origins: vec!["*".to_string()],
            production: false,
            room_ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let cors_origins = std::env::var("CORS_ORIGIN")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let production = std::env::var("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let room_ttl = std::env::var("ROOM_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TTL_SECONDS));

        Self {
            port,
            cors_origins,
            production,
            room_ttl,
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*") && !self.production
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.allows_any_origin());
        assert_eq!(config.room_ttl, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn wildcard_is_ignored_in_production() {
        let config = ServerConfig {
            production: true,
            ..ServerConfig::default()
        };
        assert!(!config.allows_any_origin());
    }
}
