//! Rinnovo: incremental static regeneration for axum.
//!
//! A stale-while-revalidate page cache that sits between an inbound request
//! and a downstream render capability:
//!
//! - the first request for a path renders and streams normally while the
//!   emitted bytes are captured to an on-disk artifact;
//! - requests arriving during that first render wait on its completion and
//!   are served the same artifact;
//! - every later request is served from disk immediately. Once an artifact
//!   is older than the configured threshold, the caller still gets the stale
//!   copy and a single background render refreshes it.
//!
//! At most one render is ever in flight per page, regardless of concurrent
//! demand.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, body::Body, http::Request, response::{IntoResponse, Response}};
//! use rinnovo::{IsrConfig, IsrState, PageRenderer, serve_page};
//!
//! struct Pages;
//!
//! #[async_trait::async_trait]
//! impl PageRenderer for Pages {
//!     async fn render(&self, request: Request<Body>) -> Response {
//!         axum::response::Html(format!("<h1>{}</h1>", request.uri().path())).into_response()
//!     }
//! }
//!
//! fn build() -> Result<Router, rinnovo::ArtifactError> {
//!     let state = IsrState::new(IsrConfig::default(), Arc::new(Pages))?;
//!     Ok(Router::new().fallback(serve_page).with_state(state))
//! }
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [isr]
//! revalidate_after_secs = 10
//! output_dir = "__isr__"
//! ```
//!
//! ## Known limitations
//!
//! Entries are never evicted, so memory and disk usage grow with the set of
//! distinct paths ever requested. A render that fails before finishing
//! leaves its entry parked in the revalidating state with no retry; see
//! `PageStore` for the resulting dispatch outcomes.

mod artifacts;
mod capture;
mod config;
mod flight;
mod keys;
mod lock;
mod middleware;
mod store;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use config::IsrConfig;
pub use flight::{FlightSubscription, RenderFlight};
pub use keys::PageKey;
pub use middleware::{IsrState, PageRenderer, serve_page};
pub use store::{Dispatch, PageEntry, PageStore};
