//! API server configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                     | Default           |
//! |------------------------------|-------------------|
//! | `TALLY_PORT`                 | `8080`            |
//! | `TALLY_DB_PATH`              | `./data/tally.db` |
//! | `TALLY_DB_MAX_CONNECTIONS`   | `5`               |
//! | `TALLY_TAX_RATE_BPS`         | `1000` (10%)      |
//! | `TALLY_LOYALTY_POINTS`       | `10`              |
//! | `TALLY_OPERATION_TIMEOUT_MS` | `5000`            |

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tally_core::TaxRate;
use tally_db::DbConfig;
use tally_engine::EngineConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HTTP listen port
    pub port: u16,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Upper bound on pooled SQLite connections
    pub db_max_connections: u32,

    /// Tax rate in basis points
    pub tax_rate_bps: u32,

    /// Loyalty points per sale with a customer
    pub loyalty_points: i64,

    /// Bound on each engine operation
    pub operation_timeout: Duration,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = ApiConfig {
            port: parse_or(&lookup, "TALLY_PORT", 8080)?,

            database_path: lookup("TALLY_DB_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/tally.db")),

            db_max_connections: parse_or(&lookup, "TALLY_DB_MAX_CONNECTIONS", 5)?,

            tax_rate_bps: parse_or(&lookup, "TALLY_TAX_RATE_BPS", 1000)?,

            loyalty_points: parse_or(&lookup, "TALLY_LOYALTY_POINTS", 10)?,

            operation_timeout: Duration::from_millis(parse_or(
                &lookup,
                "TALLY_OPERATION_TIMEOUT_MS",
                5000,
            )?),
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("TALLY_DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone()).max_connections(self.db_max_connections)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .tax_rate(TaxRate::from_bps(self.tax_rate_bps))
            .loyalty_points_per_sale(self.loyalty_points)
            .operation_timeout(self.operation_timeout)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
