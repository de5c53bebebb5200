//! Common test utilities and helpers
//!
//! Builds npm-style archives on disk and opens registries rooted in
//! temporary directories.

#![allow(dead_code)]

use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use pkgd_core::{Registry, RegistryConfig, RepublishPolicy};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const REGISTRY_URL: &str = "http://registry.test:8080";

/// A registry rooted in its own temporary directory
pub struct TestRegistry {
    pub temp_dir: TempDir,
    pub registry: Registry,
}

impl TestRegistry {
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A directory outside the store for building uploads
    pub fn scratch(&self) -> PathBuf {
        let dir = self.temp_dir.path().join("build");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

pub async fn open_registry(policy: RepublishPolicy) -> Result<TestRegistry> {
    let temp_dir = TempDir::new()?;
    let registry = open_at(temp_dir.path(), policy).await?;
    Ok(TestRegistry { temp_dir, registry })
}

/// Open a fresh registry over an existing storage root
pub async fn open_at(root: &Path, policy: RepublishPolicy) -> Result<Registry> {
    let config = RegistryConfig::new(root, REGISTRY_URL).with_republish(policy);
    Ok(Registry::open(config).await?)
}

pub fn manifest(name: &str, version: &str) -> String {
    serde_json::json!({
        "name": name,
        "version": version,
        "description": format!("{name} fixture"),
        "author": { "name": "Fixture Author" },
        "repository": { "type": "git", "url": format!("https://example.com/{name}.git") },
        "dependencies": {},
    })
    .to_string()
}

/// Write a gzipped tarball with `package/package.json` plus `files`
pub fn write_archive(path: &Path, manifest: &str, files: &[(&str, &str)]) -> Result<()> {
    let encoder = GzEncoder::new(File::create(path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut entries = vec![("package.json", manifest)];
    entries.extend_from_slice(files);
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        builder.append_data(&mut header, format!("package/{name}"), contents.as_bytes())?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

/// Build `name@version` under `dir` and return its path
pub fn build_package(dir: &Path, name: &str, version: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{name}-{version}-build.tgz"));
    write_archive(&path, &manifest(name, version), &[("index.js", "module.exports = 1;\n")])?;
    Ok(path)
}

/// Build `name@version` and return the archive bytes
pub fn package_bytes(dir: &Path, name: &str, version: &str) -> Result<Vec<u8>> {
    Ok(std::fs::read(build_package(dir, name, version)?)?)
}
