//! Common test utilities and helpers

#![allow(dead_code)]

use axum_test::TestServer;
use flate2::write::GzEncoder;
use flate2::Compression;
use pkgd_core::{Registry, RegistryConfig, RepublishPolicy};
use pkgd_server::{create_app, AppState};
use std::sync::Arc;
use tempfile::TempDir;

pub const REGISTRY_URL: &str = "http://registry.test:8080/";

/// Test server setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub server: TestServer,
    pub state: Arc<AppState>,
}

pub async fn create_test_setup() -> TestSetup {
    create_test_setup_with(RepublishPolicy::Overwrite).await
}

pub async fn create_test_setup_with(policy: RepublishPolicy) -> TestSetup {
    let temp_dir = TempDir::new().unwrap();
    let config = RegistryConfig::new(temp_dir.path(), REGISTRY_URL).with_republish(policy);
    let registry = Registry::open(config).await.unwrap();
    let state = AppState::new(registry, "127.0.0.1:0");
    let server = TestServer::new(create_app(Arc::clone(&state))).unwrap();

    TestSetup {
        temp_dir,
        server,
        state,
    }
}

/// A gzipped npm-style tarball for `name@version`
pub fn package_tarball(name: &str, version: &str) -> Vec<u8> {
    let manifest = serde_json::json!({
        "name": name,
        "version": version,
        "description": format!("{name} package"),
        "author": "Fixture Author",
        "main": "index.js",
    })
    .to_string();

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in [
        ("package/package.json", manifest.as_str()),
        ("package/index.js", "module.exports = 42;\n"),
        ("package/README.md", "# fixture\n"),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Publish through the native upload route and assert success
pub async fn upload(server: &TestServer, name: &str, version: &str) {
    let response = server
        .put(&format!("/package/{name}/{version}"))
        .bytes(package_tarball(name, version).into())
        .await;
    response.assert_status_ok();
}
