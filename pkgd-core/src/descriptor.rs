//! Reading the package manifest out of an unpacked archive.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::DescriptorError;
use crate::validation::{validate_package_name, validate_version};

/// Directory every npm tarball unpacks into.
pub const PACKAGE_ROOT: &str = "package";

/// Manifest file name inside [`PACKAGE_ROOT`].
pub const MANIFEST_FILE: &str = "package.json";

/// Canonical descriptor of one package version.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<Value>,
    pub repository: Option<Value>,
    pub dependencies: BTreeMap<String, String>,
    pub readme: Option<String>,
    /// Every manifest field, including the ones above. Never contains `dist`.
    pub manifest: Map<String, Value>,
}

impl PackageDescriptor {
    /// Build a descriptor from a parsed manifest object.
    pub fn from_manifest(mut manifest: Map<String, Value>) -> Result<Self, DescriptorError> {
        let name = string_field(&manifest, "name")?;
        let version = string_field(&manifest, "version")?;

        validate_package_name(&name).map_err(|source| DescriptorError::InvalidName {
            name: name.clone(),
            source,
        })?;
        validate_version(&version).map_err(|source| DescriptorError::InvalidVersion {
            version: version.clone(),
            source,
        })?;

        manifest.insert("name".to_string(), Value::String(name.clone()));
        manifest.insert("version".to_string(), Value::String(version.clone()));
        manifest.remove("dist");
        manifest
            .entry("_id")
            .or_insert_with(|| Value::String(format!("{name}@{version}")));

        let dependencies = manifest
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| {
                deps.iter()
                    .filter_map(|(k, v)| v.as_str().map(|range| (k.clone(), range.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            description: manifest
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            author: manifest.get("author").filter(|v| !v.is_null()).cloned(),
            repository: manifest.get("repository").filter(|v| !v.is_null()).cloned(),
            readme: manifest
                .get("readme")
                .and_then(Value::as_str)
                .map(String::from),
            dependencies,
            name,
            version,
            manifest,
        })
    }

    /// `<name>@<version>`
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    fn set_readme(&mut self, readme: String) {
        self.manifest
            .insert("readme".to_string(), Value::String(readme.clone()));
        self.readme = Some(readme);
    }
}

fn string_field(manifest: &Map<String, Value>, field: &'static str) -> Result<String, DescriptorError> {
    manifest
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(DescriptorError::MissingField { field })
}

/// Path of the manifest beneath a scratch directory.
pub fn manifest_path(scratch: &Path) -> PathBuf {
    scratch.join(PACKAGE_ROOT).join(MANIFEST_FILE)
}

/// Read and parse `package/package.json` beneath `scratch`.
///
/// A manifest without a `readme` field picks up the contents of a `README*`
/// file shipped next to it.
pub async fn read(scratch: &Path) -> Result<PackageDescriptor, DescriptorError> {
    let path = manifest_path(scratch);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DescriptorError::Missing { path });
        }
        Err(source) => return Err(DescriptorError::Unreadable { path, source }),
    };

    let manifest: Map<String, Value> =
        serde_json::from_str(&content).map_err(|source| DescriptorError::Malformed {
            path: path.clone(),
            source,
        })?;

    let mut descriptor = PackageDescriptor::from_manifest(manifest)?;
    if descriptor.readme.is_none() {
        if let Some(readme) = find_readme(&scratch.join(PACKAGE_ROOT)).await {
            descriptor.set_readme(readme);
        }
    }

    debug!(package = %descriptor.name, version = %descriptor.version, "Read package manifest");
    Ok(descriptor)
}

async fn find_readme(package_dir: &Path) -> Option<String> {
    let mut entries = fs::read_dir(package_dir).await.ok()?;
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && file_name.to_ascii_lowercase().starts_with("readme") {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    let path = candidates.into_iter().next()?;
    match fs::read_to_string(&path).await {
        Ok(readme) => Some(readme),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable README");
            None
        }
    }
}
