use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crate::allocator::AllocatorConfig;
use crate::types::{DEFAULT_ESTIMATE_DEBOUNCE_MS, DEFAULT_WEIGHT_CEILING_G, Grams};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub engine: EngineConfig,
    pub estimator: EstimatorConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            engine: EngineConfig::from_env(),
            estimator: EstimatorConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;

    fn from_env() -> Self {
        let host_value =
            env_string("BOXWISE_API_HOST").unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse BOXWISE_API_HOST ('{}'): {}. Using {}.",
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    Self::DEFAULT_HOST
                        .parse::<IpAddr>()
                        .expect("Default host must be valid"),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match env_string("BOXWISE_API_PORT") {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    eprintln!(
                        "⚠️ BOXWISE_API_PORT must not be 0. Using {}.",
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    eprintln!(
                        "⚠️ Could not parse BOXWISE_API_PORT ('{}'): {}. Using {}.",
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration for the allocation engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    weight_ceiling_g: Grams,
}

impl EngineConfig {
    const WEIGHT_CEILING_VAR: &'static str = "BOXWISE_WEIGHT_CEILING_G";

    fn from_env() -> Self {
        let weight_ceiling_g = load_u64_with_warning(
            Self::WEIGHT_CEILING_VAR,
            DEFAULT_WEIGHT_CEILING_G,
            |value| value > 0,
            "must be greater than 0",
        );
        Self { weight_ceiling_g }
    }

    /// Default per-box weight ceiling in grams.
    pub fn weight_ceiling_g(&self) -> Grams {
        self.weight_ceiling_g
    }

    /// Allocator configuration with the configured ceiling.
    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig::with_ceiling(self.weight_ceiling_g)
            .expect("Configured weight ceiling is validated at load time")
    }

    #[cfg(test)]
    pub(crate) fn default_for_tests() -> Self {
        Self {
            weight_ceiling_g: DEFAULT_WEIGHT_CEILING_G,
        }
    }
}

/// Configuration for the external cost estimator.
#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    endpoint: Option<String>,
    debounce_ms: u64,
}

impl EstimatorConfig {
    const ENDPOINT_VAR: &'static str = "BOXWISE_ESTIMATOR_URL";
    const DEBOUNCE_VAR: &'static str = "BOXWISE_ESTIMATE_DEBOUNCE_MS";

    fn from_env() -> Self {
        let endpoint = env_string(Self::ENDPOINT_VAR);
        if endpoint.is_none() {
            println!("ℹ️ {} not set; cost estimation disabled.", Self::ENDPOINT_VAR);
        }
        let debounce_ms = load_u64_with_warning(
            Self::DEBOUNCE_VAR,
            DEFAULT_ESTIMATE_DEBOUNCE_MS,
            |_| true,
            "",
        );
        Self {
            endpoint,
            debounce_ms,
        }
    }

    /// Endpoint of the estimator, if configured.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Debounce window for estimate triggers.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[cfg(test)]
    pub(crate) fn disabled_for_tests() -> Self {
        Self {
            endpoint: None,
            debounce_ms: DEFAULT_ESTIMATE_DEBOUNCE_MS,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            eprintln!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn load_u64_with_warning(
    var_name: &str,
    default: u64,
    validator: impl Fn(u64) -> bool,
    invalid_hint: &str,
) -> u64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) => {
                if !validator(value) {
                    eprintln!(
                        "⚠️ {} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    value
                }
            }
            Err(err) => {
                eprintln!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable reads are process-global, so these tests go
    // through the loader with explicit values instead of mutating the
    // environment.

    #[test]
    fn loader_falls_back_on_invalid_values() {
        assert_eq!(
            load_u64_with_warning("BOXWISE_TEST_UNSET_VAR", 42, |v| v > 0, "must be positive"),
            42
        );
    }

    #[test]
    fn engine_config_produces_valid_allocator_config() {
        let config = EngineConfig {
            weight_ceiling_g: 5000,
        };
        assert_eq!(config.allocator_config().weight_ceiling_g, 5000);
    }

    #[test]
    fn estimator_config_exposes_debounce_duration() {
        let config = EstimatorConfig {
            endpoint: Some("http://estimator.internal/estimate".to_string()),
            debounce_ms: 300,
        };
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(
            config.endpoint(),
            Some("http://estimator.internal/estimate")
        );
    }
}
