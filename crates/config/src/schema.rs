//! Config schema (viewer, login listener, backend services, timeouts).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridwayConfig {
    pub viewer: ViewerConfig,
    pub login: LoginConfig,
    pub services: ServicesConfig,
    pub timeouts: TimeoutsConfig,
}

/// The viewer process the gateway fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Path to the viewer binary.
    pub path: Option<String>,
    /// Extra arguments appended after the login-uri redirect.
    pub args: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            path: None,
            args: vec!["-multiple".into()],
        }
    }
}

/// Local login listener and remote login defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub bind: String,
    pub port: u16,
    /// Port assumed for a remote grid when the avatar name does not carry one.
    pub default_remote_port: u16,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
            default_remote_port: 8002,
        }
    }
}

/// Optional overrides for the home-grid services. When unset, the URLs from
/// the login response are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub user: Option<String>,
    pub inventory: Option<String>,
    pub asset: Option<String>,
    pub grid: Option<String>,
}

/// Backend call timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub grid_lookup_secs: u64,
    pub region_presence_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            grid_lookup_secs: 3,
            region_presence_secs: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GridwayConfig::default();
        assert_eq!(cfg.login.port, 8080);
        assert_eq!(cfg.login.default_remote_port, 8002);
        assert_eq!(cfg.timeouts.grid_lookup_secs, 3);
        assert!(cfg.services.inventory.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: GridwayConfig = toml::from_str("[login]\nport = 9999\n").unwrap();
        assert_eq!(cfg.login.port, 9999);
        assert_eq!(cfg.login.bind, "127.0.0.1");
        assert_eq!(cfg.timeouts.region_presence_secs, 6);
    }
}
