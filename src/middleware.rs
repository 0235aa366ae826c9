//! Request dispatch: serve cached artifacts, render misses, refresh stale
//! pages in the background.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error, instrument};

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::capture::{Finalizer, capture_detached, capture_forward};
use crate::config::IsrConfig;
use crate::keys::PageKey;
use crate::store::{Dispatch, PageStore};

const METRIC_HIT: &str = "rinnovo_page_hit_total";
const METRIC_MISS: &str = "rinnovo_page_miss_total";
const METRIC_WAIT: &str = "rinnovo_page_wait_total";
const METRIC_REVALIDATE: &str = "rinnovo_revalidate_total";

/// Downstream render capability.
///
/// Invoked with the live request on a cache miss and with a rebuilt request
/// head for background refreshes; must eventually finish the response body.
/// Failures are the renderer's own: the cache neither retries nor times out.
#[async_trait]
pub trait PageRenderer: Send + Sync + 'static {
    async fn render(&self, request: Request<Body>) -> Response;
}

/// Shared state for the ISR dispatcher.
#[derive(Clone)]
pub struct IsrState {
    config: IsrConfig,
    store: Arc<PageStore>,
    artifacts: Arc<ArtifactStore>,
    renderer: Arc<dyn PageRenderer>,
}

impl IsrState {
    /// Build a page cache around `renderer`, creating the artifact root.
    pub fn new(config: IsrConfig, renderer: Arc<dyn PageRenderer>) -> Result<Self, ArtifactError> {
        let artifacts = Arc::new(ArtifactStore::new(config.output_dir.clone())?);
        Ok(Self {
            config,
            store: Arc::new(PageStore::new()),
            artifacts,
            renderer,
        })
    }

    /// The underlying entry store.
    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    /// The underlying artifact storage.
    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    fn finalizer(&self, key: PageKey) -> Finalizer {
        Finalizer::new(key, Arc::clone(&self.store), Arc::clone(&self.artifacts))
    }
}

/// ISR entry point: serve `request` from cache state, rendering when needed.
///
/// A plain axum handler; mount it wherever cached pages live, e.g.
/// `Router::new().fallback(serve_page).with_state(state)`.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn serve_page(State(state): State<IsrState>, request: Request<Body>) -> Response {
    let key = PageKey::from_path(request.uri().path());

    match state.store.begin(&key, state.config.revalidate_after()) {
        Dispatch::FirstRender => {
            debug!(outcome = "miss", "rendering for the first time");
            counter!(METRIC_MISS).increment(1);

            let response = state.renderer.render(request).await;
            let (parts, body) = response.into_parts();
            let body = capture_forward(body, state.finalizer(key));
            Response::from_parts(parts, body)
        }
        Dispatch::Wait(subscription) => {
            debug!(outcome = "wait", "first render in flight, waiting");
            counter!(METRIC_WAIT).increment(1);

            subscription.resolved().await;
            match state.store.get(&key).and_then(|entry| entry.artifact) {
                Some(artifact) => serve_artifact(&state, &key, &artifact).await,
                None => {
                    error!(page_key = %key, "woke from an in-flight render that left no artifact");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        Dispatch::Serve {
            artifact,
            revalidate,
        } => {
            debug!(outcome = "hit", revalidate, "serving cached artifact");
            counter!(METRIC_HIT).increment(1);

            if revalidate {
                counter!(METRIC_REVALIDATE).increment(1);
                spawn_revalidation(&state, &key, &request);
            }
            serve_artifact(&state, &key, &artifact).await
        }
        Dispatch::Dead => {
            error!(page_key = %key, "entry has neither an artifact nor a pending render");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Re-render `key` off the request path. The result is persisted and the
/// entry updated, but no bytes reach any client; a failure here is invisible
/// to the caller already holding the stale artifact.
fn spawn_revalidation(state: &IsrState, key: &PageKey, request: &Request<Body>) {
    let state = state.clone();
    let key = key.clone();
    let request = detached_head(request);

    tokio::spawn(async move {
        debug!(page_key = %key, "background revalidation started");
        let response = state.renderer.render(request).await;
        let finalizer = state.finalizer(key);
        capture_detached(response.into_body(), finalizer).await;
    });
}

/// Body-less copy of the request head for a detached render.
fn detached_head(request: &Request<Body>) -> Request<Body> {
    let mut head = Request::new(Body::empty());
    *head.method_mut() = request.method().clone();
    *head.uri_mut() = request.uri().clone();
    *head.version_mut() = request.version();
    *head.headers_mut() = request.headers().clone();
    head
}

async fn serve_artifact(state: &IsrState, key: &PageKey, artifact: &Path) -> Response {
    match state.artifacts.read(artifact).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/html")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(error) => {
            error!(page_key = %key, error = %error, "failed to read persisted artifact");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
