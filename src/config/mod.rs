//! Runtime configuration, read from command-line flags or the environment.

use std::net::SocketAddr;

use clap::Parser;

/// Address used when neither `--addr` nor `KVCACHE_ADDR` is given.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Log filter used when neither `--log-filter` nor `KVCACHE_LOG` is given.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Settings for the `kvcache` binary.
///
/// Flags take precedence over environment variables, which take precedence
/// over the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "kvcache")]
#[command(about = "In-memory key/value cache served over HTTP", long_about = None)]
#[command(version)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[arg(long, env = "KVCACHE_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// tracing-subscriber filter directive, e.g. `kvcache=debug`.
    /// `RUST_LOG` overrides it when set.
    #[arg(long, env = "KVCACHE_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config =
            ServerConfig::try_parse_from(["kvcache", "--addr", "0.0.0.0:9000", "--log-filter", "debug"])
                .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn default_matches_declared_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn bad_address_is_a_usage_error() {
        let err = ServerConfig::try_parse_from(["kvcache", "--addr", "localhost"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
