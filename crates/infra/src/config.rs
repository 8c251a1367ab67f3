//! Layered settings: code defaults, then `config/{environment}` file, then
//! `PROCURA_*` environment variables (`__` separates nested keys, e.g.
//! `PROCURA_DATABASE__URL`).

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use procura_observability::LogFormat;

use crate::store::{DEFAULT_PER_PAGE, MAX_PER_PAGE, Pagination};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: String,
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub listing: ListingSettings,
    pub inventory: InventorySettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Postgres URL. Without one the service runs on the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListingSettings {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl ListingSettings {
    pub fn pagination(&self, page: Option<u32>, per_page: Option<u32>) -> Pagination {
        Pagination::new(page, per_page, self.default_per_page, self.max_per_page)
    }
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InventorySettings {
    /// Items with fewer units on hand count as low stock on the dashboard.
    pub low_stock_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("PROCURA_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("listing.default_per_page", DEFAULT_PER_PAGE)?
            .set_default("listing.max_per_page", MAX_PER_PAGE)?
            .set_default("inventory.low_stock_threshold", 10)?
            .set_default("log.format", "json")?
            .set_default("log.level", "info")?
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(
                Environment::with_prefix("PROCURA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
