//! HTTP handlers, grouped by surface.
//!
//! - [`health`]: liveness and greeting
//! - [`packages`]: the native API (`/package`, `/versions`, `/index`, `/info`)
//! - [`npm`]: the subset of the npm registry protocol the npm CLI needs

pub mod health;
pub mod npm;
pub mod packages;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use pkgd_core::{Registry, RegistryResult, ResolvedArtifact};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Stream a stored artifact back to the client.
pub(crate) async fn stream_artifact(
    registry: &Registry,
    artifact: &ResolvedArtifact,
    content_type: &'static str,
) -> RegistryResult<Response> {
    let file = registry.open_artifact(artifact).await?;
    let length = file.metadata().await?.len();
    debug!(
        package = %artifact.name,
        version = %artifact.version,
        size = length,
        "Streaming artifact"
    );

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("filename={}", artifact.file_name),
            ),
        ],
        body,
    )
        .into_response())
}
