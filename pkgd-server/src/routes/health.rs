use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(greeting))
        .route("/health", get(health_check))
}

async fn greeting() -> &'static str {
    "pkgd says hi"
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "pkgd",
        "version": env!("CARGO_PKG_VERSION"),
        "packages": state.registry.index().package_count(),
    }))
}
