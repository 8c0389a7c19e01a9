//! HTTP API for the patient, clinician and admin portals.
//!
//! Routes are nested under `/api/`. Protected routes pass through a
//! middleware stack: Rate Limit → Auth → Audit → Handler.
//!
//! The router is composable: `api_router()` returns a `Router` that can be
//! mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server_on, ApiServer, ApiSession};
pub use types::ApiContext;
