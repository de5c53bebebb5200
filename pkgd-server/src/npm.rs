//! npm registry documents built from the version index.
//!
//! `npm install` reads a package document (`GET /:name`) listing every
//! version manifest and a `dist-tags.latest`; `npm search` reads the full
//! listing (`GET /-/all`). Both use semantic-version precedence to pick the
//! latest version, unlike the `/index` summary which keeps plain string order.

use chrono::{DateTime, Utc};
use pkgd_core::range::cmp_precedence;
use pkgd_core::PackageRecord;
use serde_json::{json, Map, Value};

/// Revision reported for every document; documents are rebuilt on each request.
pub const DOCUMENT_REV: &str = "1-0";

/// Version strings of a package, lowest to highest precedence.
///
/// Versions that do not parse sort before all others, in string order.
pub fn sorted_versions(record: &PackageRecord) -> Vec<&str> {
    let mut versions: Vec<(&str, Option<semver::Version>)> = record
        .versions
        .keys()
        .map(|v| (v.as_str(), semver::Version::parse(v).ok()))
        .collect();
    versions.sort_by(|(a_raw, a), (b_raw, b)| match (a, b) {
        (Some(a), Some(b)) => cmp_precedence(a, b).then_with(|| a_raw.cmp(b_raw)),
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, None) => a_raw.cmp(b_raw),
    });
    versions.into_iter().map(|(raw, _)| raw).collect()
}

fn latest(record: &PackageRecord) -> Option<&str> {
    sorted_versions(record).last().copied()
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

/// The document served at `GET /:name`.
pub fn package_document(record: &PackageRecord) -> Value {
    let versions = sorted_versions(record);

    let mut version_docs = Map::new();
    let mut times = Map::new();
    for version in &versions {
        if let Some(entry) = record.versions.get(*version) {
            version_docs.insert(version.to_string(), entry.data.to_value());
            times.insert(version.to_string(), json!(timestamp(&entry.registered_at)));
        }
    }

    let registered = record.versions.values().map(|v| v.registered_at);
    if let Some(created) = registered.clone().min() {
        times.insert("created".to_string(), json!(timestamp(&created)));
    }
    if let Some(modified) = registered.max() {
        times.insert("modified".to_string(), json!(timestamp(&modified)));
    }

    json!({
        "_id": record.name,
        "_rev": DOCUMENT_REV,
        "name": record.name,
        "description": record.description,
        "dist-tags": { "latest": latest(record) },
        "versions": version_docs,
        "maintainers": [],
        "author": record.author,
        "repository": record.repository,
        "readme": record.readme,
        "time": times,
    })
}

/// One package's entry in the `/-/all` listing.
pub fn listing_entry(record: &PackageRecord) -> Value {
    let latest = latest(record);
    let versions: Map<String, Value> = sorted_versions(record)
        .into_iter()
        .map(|v| (v.to_string(), json!("latest")))
        .collect();
    let modified = latest
        .and_then(|v| record.versions.get(v))
        .map(|v| timestamp(&v.registered_at));

    json!({
        "_id": record.name,
        "name": record.name,
        "description": record.description,
        "dist-tags": { "latest": latest },
        "versions": versions,
        "maintainers": [],
        "author": record.author,
        "repository": record.repository,
        "time": { "modified": modified },
    })
}

/// The full `/-/all` listing.
pub fn all_listing<'a>(records: impl IntoIterator<Item = &'a PackageRecord>) -> Value {
    let mut listing = Map::new();
    listing.insert("_updated".to_string(), json!(0));
    for record in records {
        listing.insert(record.name.clone(), listing_entry(record));
    }
    Value::Object(listing)
}
