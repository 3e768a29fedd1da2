use std::{env, net::SocketAddr, path::PathBuf};
use thiserror::Error;

const DEFAULT_PORT: u16 = 5020;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_AWS_REGION: &str = "us-east-1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

/// Where posts are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreConfig {
    DynamoDb {
        table_name: String,
        aws_region: String,
        // Optional endpoint for DynamoDB Local / LocalStack
        endpoint_url: Option<String>,
    },
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub store: StoreConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidVar("PORT".into(), e.to_string()))?,
            None => DEFAULT_PORT,
        };
        let bind_address: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidVar("HOST".into(), e.to_string()))?;

        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidVar("MAX_UPLOAD_BYTES".into(), e.to_string()))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let backend = lookup("STORE_BACKEND").unwrap_or_else(|| "dynamodb".to_string());
        let store = match backend.trim().to_ascii_lowercase().as_str() {
            "dynamodb" => StoreConfig::DynamoDb {
                table_name: lookup("POSTS_TABLE")
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingVar("POSTS_TABLE".into()))?,
                aws_region: lookup("AWS_DEFAULT_REGION")
                    .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
                endpoint_url: lookup("AWS_ENDPOINT_URL"),
            },
            "memory" => StoreConfig::Memory,
            other => {
                return Err(ConfigError::InvalidVar(
                    "STORE_BACKEND".into(),
                    format!("unknown backend '{}', expected 'dynamodb' or 'memory'", other),
                ));
            }
        };

        Ok(Config {
            bind_address,
            upload_dir,
            max_upload_bytes,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_table_is_set() {
        let config = Config::from_lookup(lookup_from(&[("POSTS_TABLE", "posts")])).unwrap();
        assert_eq!(config.bind_address.port(), 5020);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(
            config.store,
            StoreConfig::DynamoDb {
                table_name: "posts".into(),
                aws_region: "us-east-1".into(),
                endpoint_url: None,
            }
        );
    }

    #[test]
    fn dynamodb_backend_requires_table() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "POSTS_TABLE"));
    }

    #[test]
    fn port_and_memory_backend_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("STORE_BACKEND", "memory"),
            ("UPLOAD_DIR", "/tmp/files"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/files"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "http"), ("STORE_BACKEND", "memory")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar(var, _) if var == "PORT"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("STORE_BACKEND", "mongo")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar(var, _) if var == "STORE_BACKEND"));
    }
}
