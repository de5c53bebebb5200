//! npm registry protocol handlers.
//!
//! Enough of the protocol for `npm install`, `npm publish` and `npm search`
//! against this registry. Not-found conditions use the npm error body
//! (`{"error": "not_found", "reason": "document not found"}`).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use pkgd_core::RegistryError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::NpmResult;
use crate::npm::{all_listing, package_document, DOCUMENT_REV};
use crate::routes::stream_artifact;
use crate::state::AppState;

const TARBALL_CONTENT_TYPE: &str = "application/octet-stream";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/-/all", get(list_all))
        .route("/-/all/since", get(list_all))
        .route("/{name}", get(package_metadata).put(publish_package))
        .route("/{name}/{version}", get(version_metadata))
        .route("/{name}/-/{file}", get(download_tarball))
        .route("/{name}/-/{file}/-rev/{rev}", put(upload_tarball))
        .route("/{name}/{version}/-tag/{tag}", put(tag_version))
}

async fn list_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.registry.index().snapshot();
    Json(all_listing(snapshot.values()))
}

async fn package_metadata(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> NpmResult<Json<Value>> {
    let record = state.registry.package(&name)?;
    debug!(package = %name, versions = record.versions.len(), "Serving npm package document");
    Ok(Json(package_document(&record)))
}

async fn version_metadata(
    Path((name, version)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> NpmResult<Json<Value>> {
    let record = state.registry.package(&name)?;
    let entry = record
        .versions
        .get(&version)
        .ok_or_else(|| RegistryError::VersionNotFound {
            name: name.clone(),
            version: version.clone(),
        })?;
    Ok(Json(entry.data.to_value()))
}

async fn download_tarball(
    Path((name, file)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> NpmResult<Response> {
    let artifact = state.registry.lookup_file(&name, &file)?;
    info!(package = %name, file = %file, "Downloading npm tarball");
    Ok(stream_artifact(&state.registry, &artifact, TARBALL_CONTENT_TYPE).await?)
}

/// `npm publish`: a package document with base64 `_attachments`.
///
/// A document without attachments only carries metadata, which is derived
/// from the archives themselves, so it is accepted and ignored.
async fn publish_package(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(document): Json<Value>,
) -> NpmResult<Json<Value>> {
    if document.get("_attachments").is_none() {
        debug!(package = %name, "Metadata-only npm publish, nothing to store");
        return Ok(Json(json!({ "ok": true })));
    }

    let published = state.registry.publish_document(&name, &document).await?;
    let versions: Vec<&str> = published.iter().map(|p| p.version.as_str()).collect();
    info!(package = %name, versions = ?versions, "npm package published");
    Ok(Json(json!({ "ok": true, "id": name, "rev": DOCUMENT_REV })))
}

/// Legacy publish step: the raw tarball, identity taken from its manifest.
async fn upload_tarball(
    Path((name, file, _rev)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> NpmResult<Response> {
    let registered = state.registry.publish_archive(body).await?;
    info!(
        package = %registered.name,
        version = %registered.version,
        route_package = %name,
        file = %file,
        "npm tarball uploaded"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "id": "-", "rev": DOCUMENT_REV })),
    )
        .into_response())
}

/// Dist-tags are not stored; `latest` is always computed.
async fn tag_version(Path((_name, _version, tag)): Path<(String, String, String)>) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "ok": true, "id": tag, "rev": DOCUMENT_REV })),
    )
        .into_response()
}
