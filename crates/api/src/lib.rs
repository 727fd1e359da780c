//! Gryork API - HTTP transport over the case lifecycle core
//!
//! Every request carries an already-authenticated actor in the
//! `X-Actor-Id` / `X-Actor-Role` headers. Responses use one envelope:
//!
//! ```json
//! { "success": false, "data": null, "error": { "kind": "FORBIDDEN", "message": "..." } }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{AppConfig, StorageKind};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
