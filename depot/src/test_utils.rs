//! Test utilities for integration testing.

use crate::config::{Config, StorageConfig};
use crate::{AppState, Application};
use axum_test::TestServer;
use std::sync::Once;

/// API key every test configuration accepts.
pub const TEST_API_KEY: &str = "test-secret";

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the process-wide rustls crypto provider.
///
/// The binary does this at the top of `main`; tests build reqwest clients
/// without going through it, so every helper that constructs a storage
/// backend calls this first.
pub fn init_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Config wired to an Appwrite-compatible backend at `endpoint` (normally a
/// wiremock server).
pub fn appwrite_test_config(endpoint: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: Some(TEST_API_KEY.to_string()),
        storage: StorageConfig::Appwrite {
            endpoint: endpoint.parse().expect("Failed to parse endpoint URL"),
            project_id: "proj".to_string(),
            api_key: "backend-key".to_string(),
            bucket_id: "bucket".to_string(),
        },
        ..Default::default()
    }
}

/// Config wired to a Supabase-compatible backend at `url`.
pub fn supabase_test_config(url: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: Some(TEST_API_KEY.to_string()),
        storage: StorageConfig::Supabase {
            url: url.parse().expect("Failed to parse storage URL"),
            service_key: "service-role".to_string(),
            bucket: "files".to_string(),
        },
        ..Default::default()
    }
}

pub fn create_test_state(config: Config) -> AppState {
    init_crypto_provider();
    let store = crate::storage::from_config(&config).expect("Failed to create storage backend");
    AppState { config, store }
}

pub fn create_test_app(config: Config) -> TestServer {
    init_crypto_provider();
    Application::new(config).expect("Failed to create application").into_test_server()
}
