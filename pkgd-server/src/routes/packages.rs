//! Native package API.
//!
//! Range downloads come in three shapes:
//!
//! - `GET /package/{name}/{range}` where `range` is `latest`, an exact
//!   version, or a constraint such as `>=1.0.0 <2.0.0`
//! - `GET /package/{name}/{op}/{v1}` with `op` one of `gt`, `lt`, `gte`, `lte`
//! - `GET /package/{name}/{op1}/{v1}/{op2}/{v2}` for two distinct operators

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use pkgd_core::error::RangeError;
use pkgd_core::{IndexEntry, PackageRecord, RegistryError, VersionConstraint};
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::routes::stream_artifact;
use crate::state::{AppState, SuccessResponse};

const TARBALL_CONTENT_TYPE: &str = "application/x-compressed";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/package/{name}/{version}",
            get(download_range).put(upload).delete(remove),
        )
        // The operator segment shares the `{version}` name so the trie has
        // one parameter at that position.
        .route("/package/{name}/{version}/{v1}", get(download_single_bound))
        .route(
            "/package/{name}/{version}/{v1}/{op2}/{v2}",
            get(download_paired_bounds),
        )
        .route("/versions/{name}", get(list_versions))
        .route("/index", get(index))
        .route("/info/{name}", get(info))
}

/// Upload a raw archive claiming to be `name@version`.
async fn upload(
    Path((name, version)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<SuccessResponse>> {
    let registered = state.registry.publish(&name, &version, body).await?;
    Ok(Json(SuccessResponse::new(format!(
        "{}@{} published",
        registered.name, registered.version
    ))))
}

async fn remove(
    Path((name, version)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<SuccessResponse>> {
    state.registry.delete(&name, &version).await?;
    info!(package = %name, version = %version, "Package deleted via API");
    Ok(Json(SuccessResponse::new(format!("{name}@{version} deleted"))))
}

async fn list_versions(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<String>> {
    Json(state.registry.versions(&name).into_iter().collect())
}

async fn download_range(
    Path((name, range)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let constraint = VersionConstraint::parse(&range).map_err(RegistryError::from)?;
    serve(&state, &name, &constraint).await
}

async fn download_single_bound(
    Path((name, op, v1)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let constraint = VersionConstraint::from_tokens(&[(op.as_str(), v1.as_str())])
        .map_err(|e| bound_error(&name, e))?;
    serve(&state, &name, &constraint).await
}

async fn download_paired_bounds(
    Path((name, op1, v1, op2, v2)): Path<(String, String, String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    if op1 == op2 {
        return Err(not_found(&name));
    }
    let constraint = VersionConstraint::from_tokens(&[
        (op1.as_str(), v1.as_str()),
        (op2.as_str(), v2.as_str()),
    ])
    .map_err(|e| bound_error(&name, e))?;
    serve(&state, &name, &constraint).await
}

/// Operator paths that are not one of the known operators are not routes.
fn not_found(name: &str) -> AppError {
    AppError::NotFound(format!("no such route for package '{name}'"))
}

fn bound_error(name: &str, err: RangeError) -> AppError {
    match err {
        RangeError::UnknownOperator(_) => not_found(name),
        other => AppError::Registry(RegistryError::InvalidRange(other)),
    }
}

async fn serve(state: &AppState, name: &str, constraint: &VersionConstraint) -> AppResult<Response> {
    let artifact = state.registry.resolve(name, constraint)?;
    info!(package = %name, constraint = %constraint, version = %artifact.version, "Serving package");
    Ok(stream_artifact(&state.registry, &artifact, TARBALL_CONTENT_TYPE).await?)
}

async fn index(State(state): State<Arc<AppState>>) -> Json<Vec<IndexEntry>> {
    Json(state.registry.summary())
}

async fn info(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<PackageRecord>> {
    Ok(Json(state.registry.package(&name)?))
}
