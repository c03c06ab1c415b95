//! Application configuration management.
//!
//! Configuration is loaded from a YAML file and can be overridden with
//! environment variables prefixed `DEPOT_` (nested fields use `__`, e.g.
//! `DEPOT_STORAGE__BUCKET_ID`). The bare `PORT` and `API_KEY` variables are
//! also honored since hosting platforms conventionally inject them.
//!
//! Exactly one storage backend is configured per process via the tagged
//! `storage` section:
//!
//! ```yaml
//! api_key: change-me
//! storage:
//!   type: appwrite
//!   endpoint: https://cloud.appwrite.io/v1
//!   project_id: my-project
//!   api_key: server-key
//!   bucket_id: my-bucket
//! ```

use crate::errors::Error;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "DEPOT_CONFIG_FILE", default_value = "depot.yaml")]
    pub config: String,

    /// Validate the configuration and exit without starting the server
    #[arg(long, default_value_t = false)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host
    pub host: String,
    /// HTTP server port
    pub port: u16,
    /// Shared secret expected in the `x-api-key` request header
    pub api_key: Option<String>,
    /// Maximum accepted request body size in bytes
    pub max_upload_bytes: usize,
    /// Timeout applied to every storage backend call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Lifetime of signed URLs when the request does not specify one
    #[serde(with = "humantime_serde")]
    pub default_url_expiry: Duration,
    /// Maximum number of objects fetched per backend list call
    pub list_page_size: u32,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Storage backend selection and credentials
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            api_key: None,
            max_upload_bytes: 100 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            default_url_expiry: Duration::from_secs(7 * 24 * 60 * 60),
            list_page_size: 1000,
            cors: CorsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Storage backend configuration.
///
/// The two variants cover the two shapes of object store the API bridges:
/// ID-indexed buckets where objects live under server-generated IDs
/// (Appwrite-compatible), and path-indexed buckets where the object key is
/// the filename itself (Supabase-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Appwrite-compatible bucket storage (ID-indexed)
    Appwrite {
        /// API endpoint, e.g. `https://cloud.appwrite.io/v1`
        endpoint: Url,
        /// Project identifier, sent as `X-Appwrite-Project`
        project_id: String,
        /// Server API key, sent as `X-Appwrite-Key`
        api_key: String,
        /// Bucket holding the managed files
        bucket_id: String,
    },
    /// Supabase-compatible storage (path-indexed)
    Supabase {
        /// Project base URL, e.g. `https://xyz.supabase.co`
        url: Url,
        /// Service-role key used for storage operations
        service_key: String,
        /// Bucket holding the managed files
        bucket: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Appwrite {
            endpoint: Url::parse("https://cloud.appwrite.io/v1").unwrap(),
            project_id: String::new(),
            api_key: String::new(),
            bucket_id: String::new(),
        }
    }
}

impl StorageConfig {
    /// Short backend identifier for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Appwrite { .. } => "appwrite",
            StorageConfig::Supabase { .. } => "supabase",
        }
    }

    /// Name of the configured bucket.
    pub fn bucket(&self) -> &str {
        match self {
            StorageConfig::Appwrite { bucket_id, .. } => bucket_id,
            StorageConfig::Supabase { bucket, .. } => bucket,
        }
    }
}

/// CORS configuration for browser clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("DEPOT_").split("__"))
            // Bare variables that hosting platforms conventionally set
            .merge(Env::raw().only(&["PORT", "API_KEY"]))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        match self.api_key.as_deref() {
            None | Some("") => {
                return Err(Error::Internal {
                    operation: "Config validation: api_key is not configured. Please set the API_KEY environment variable or add \
                                api_key to the config file."
                        .to_string(),
                });
            }
            Some(_) => {}
        }

        if self.max_upload_bytes == 0 {
            return Err(Error::Internal {
                operation: "Config validation: max_upload_bytes cannot be 0. Set a positive byte count (default: 104857600)."
                    .to_string(),
            });
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: request_timeout cannot be 0. Set a positive duration such as '30s'.".to_string(),
            });
        }

        if self.default_url_expiry.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: default_url_expiry cannot be 0. Set a positive duration such as '7d'.".to_string(),
            });
        }

        if self.list_page_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: list_page_size cannot be 0. Set a positive integer (default: 1000).".to_string(),
            });
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        // Validate that wildcard is not used with credentials
        let has_wildcard = self
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        match &self.storage {
            StorageConfig::Appwrite {
                project_id,
                api_key,
                bucket_id,
                ..
            } => {
                if project_id.is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: storage.project_id is required for the appwrite backend.".to_string(),
                    });
                }
                if api_key.is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: storage.api_key is required for the appwrite backend.".to_string(),
                    });
                }
                if bucket_id.is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: storage.bucket_id is required for the appwrite backend.".to_string(),
                    });
                }
            }
            StorageConfig::Supabase { service_key, bucket, .. } => {
                if service_key.is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: storage.service_key is required for the supabase backend.".to_string(),
                    });
                }
                if bucket.is_empty() {
                    return Err(Error::Internal {
                        operation: "Config validation: storage.bucket is required for the supabase backend.".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_appwrite_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: secret
storage:
  type: appwrite
  endpoint: https://cloud.appwrite.io/v1
  project_id: proj
  api_key: server-key
  bucket_id: bucket
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.api_key.as_deref(), Some("secret"));
            assert_eq!(config.storage.kind(), "appwrite");
            assert_eq!(config.storage.bucket(), "bucket");
            assert_eq!(config.port, 3000); // default
            assert_eq!(config.request_timeout, Duration::from_secs(30)); // default

            Ok(())
        });
    }

    #[test]
    fn test_supabase_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: secret
default_url_expiry: 1h
storage:
  type: supabase
  url: https://xyz.supabase.co
  service_key: service-role
  bucket: files
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.storage.kind(), "supabase");
            assert_eq!(config.storage.bucket(), "files");
            assert_eq!(config.default_url_expiry, Duration::from_secs(3600));

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: secret
storage:
  type: appwrite
  endpoint: https://cloud.appwrite.io/v1
  project_id: proj
  api_key: server-key
  bucket_id: bucket
"#,
            )?;

            jail.set_env("DEPOT_HOST", "127.0.0.1");
            jail.set_env("DEPOT_PORT", "8080");
            jail.set_env("DEPOT_STORAGE__BUCKET_ID", "other-bucket");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            // Env vars should override
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.storage.bucket(), "other-bucket");

            // YAML values should be preserved
            assert_eq!(config.api_key.as_deref(), Some("secret"));

            Ok(())
        });
    }

    #[test]
    fn test_bare_platform_env_vars() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  type: supabase
  url: https://xyz.supabase.co
  service_key: service-role
  bucket: files
"#,
            )?;

            jail.set_env("PORT", "9090");
            jail.set_env("API_KEY", "from-env");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.port, 9090);
            assert_eq!(config.api_key.as_deref(), Some("from-env"));

            Ok(())
        });
    }

    #[test]
    fn test_missing_api_key_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  type: supabase
  url: https://xyz.supabase.co
  service_key: service-role
  bucket: files
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let result = Config::load(&args);
            assert!(result.is_err());
            let message = result.unwrap_err().to_string();
            assert!(message.contains("api_key"), "unexpected error: {message}");

            Ok(())
        });
    }

    #[test]
    fn test_incomplete_storage_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: secret
storage:
  type: appwrite
  endpoint: https://cloud.appwrite.io/v1
  project_id: proj
  api_key: server-key
  bucket_id: ""
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let result = Config::load(&args);
            assert!(result.is_err());
            let message = result.unwrap_err().to_string();
            assert!(message.contains("bucket_id"), "unexpected error: {message}");

            Ok(())
        });
    }

    #[test]
    fn test_wildcard_origin_with_credentials_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: secret
cors:
  allowed_origins:
    - "*"
  allow_credentials: true
storage:
  type: supabase
  url: https://xyz.supabase.co
  service_key: service-role
  bucket: files
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let result = Config::load(&args);
            assert!(result.is_err());
            let message = result.unwrap_err().to_string();
            assert!(message.contains("wildcard"), "unexpected error: {message}");

            Ok(())
        });
    }

    #[test]
    fn test_cors_origin_parsing() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
api_key: secret
cors:
  allowed_origins:
    - "*"
    - https://app.example.com
storage:
  type: supabase
  url: https://xyz.supabase.co
  service_key: service-role
  bucket: files
"#,
            )?;

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.cors.allowed_origins.len(), 2);
            assert!(matches!(config.cors.allowed_origins[0], CorsOrigin::Wildcard));
            match &config.cors.allowed_origins[1] {
                CorsOrigin::Url(url) => assert_eq!(url.as_str(), "https://app.example.com/"),
                other => panic!("expected URL origin, got {other:?}"),
            }

            Ok(())
        });
    }
}
