//! # pkgd server
//!
//! HTTP front end of the pkgd registry. It exposes the native package API
//! (`/package`, `/versions`, `/index`, `/info`) and the parts of the npm
//! registry protocol the npm CLI uses, all backed by a
//! [`pkgd_core::Registry`].
//!
//! ## Key Modules
//!
//! - [`server`]: router construction and the serve loop
//! - [`routes`]: request handlers
//! - [`npm`]: npm package documents and listings
//! - [`error`]: error classification and response bodies
//! - [`state`]: state shared by handlers

pub mod error;
pub mod npm;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use server::{create_app, run_server};
pub use state::{AppState, SuccessResponse};
