//! End-to-end tests.
//!
//! Each test builds the full application against a wiremock storage backend
//! and drives it over HTTP with `axum_test::TestServer`, so routing,
//! middleware, handlers, and backend adapters are all exercised together.
