use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pagination: PaginationConfig,
    pub groups: GroupsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when a list request does not name one.
    pub default_limit: i64,
    /// Largest page size a list request may ask for.
    pub max_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupsConfig {
    /// Group memberships in the form `group=user1,user2;other=user3`.
    /// Read from env var `NOTIFICATION_GROUPS`.
    pub spec: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let pagination = PaginationConfig {
            default_limit: env::var("PAGINATION_DEFAULT_LIMIT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAGINATION_DEFAULT_LIMIT".to_string()))?,
            max_limit: env::var("PAGINATION_MAX_LIMIT")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PAGINATION_MAX_LIMIT".to_string()))?,
        };
        pagination.validate()?;

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            pagination,
            groups: GroupsConfig {
                spec: env::var("NOTIFICATION_GROUPS").unwrap_or_default(),
            },
        })
    }
}

impl PaginationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit < 1 {
            return Err(ConfigError::InvalidValue("PAGINATION_MAX_LIMIT".to_string()));
        }
        if self.default_limit < 1 || self.default_limit > self.max_limit {
            return Err(ConfigError::InvalidValue(
                "PAGINATION_DEFAULT_LIMIT".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            pagination: PaginationConfig {
                default_limit: 20,
                max_limit: 200,
            },
            groups: GroupsConfig {
                spec: String::new(),
            },
        }
    }
}
