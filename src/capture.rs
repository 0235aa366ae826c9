//! Output capture for renders in flight.
//!
//! Two variants over one completion path: `capture_forward` tees a live
//! response body to the client while accumulating a copy, `capture_detached`
//! drains a background render with nothing observable to any client. Both
//! hand the accumulated bytes to a [`Finalizer`].

use std::sync::Arc;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http_body_util::BodyExt;
use tracing::{debug, error};

use crate::artifacts::ArtifactStore;
use crate::keys::PageKey;
use crate::store::PageStore;

/// Completion handler shared by both capture variants: persist the
/// accumulated bytes, apply the store update, wake any waiters.
///
/// Holds only handles to the stores plus its key; never an entry.
pub(crate) struct Finalizer {
    key: PageKey,
    store: Arc<PageStore>,
    artifacts: Arc<ArtifactStore>,
}

impl Finalizer {
    pub(crate) fn new(key: PageKey, store: Arc<PageStore>, artifacts: Arc<ArtifactStore>) -> Self {
        Self {
            key,
            store,
            artifacts,
        }
    }

    /// Persist `bytes` and mark the render complete.
    ///
    /// On a persistence failure the entry is left untouched: it stays
    /// `revalidating` and is never retried.
    pub(crate) async fn complete(self, bytes: Bytes) {
        match self.artifacts.write(&self.key, &bytes).await {
            Ok(path) => {
                debug!(page_key = %self.key, bytes = bytes.len(), "persisted render artifact");
                if let Some(flight) = self.store.complete_render(&self.key, path) {
                    flight.resolve();
                }
            }
            Err(error) => {
                error!(
                    page_key = %self.key,
                    error = %error,
                    "failed to persist render artifact; entry left revalidating"
                );
            }
        }
    }
}

/// Capture-and-forward: wrap a live response body so every chunk streams to
/// the client as produced while a copy accumulates for persistence.
///
/// Finalization runs on a detached task once the body finishes, so the
/// client's connection close never waits on the filesystem. A body error
/// mid-stream is forwarded and finalization abandoned.
pub(crate) fn capture_forward(body: Body, finalizer: Finalizer) -> Body {
    let mut frames = body.into_data_stream();

    Body::from_stream(async_stream::stream! {
        let mut captured = BytesMut::new();

        while let Some(chunk) = frames.next().await {
            match chunk {
                Ok(chunk) => {
                    captured.extend_from_slice(&chunk);
                    yield Ok::<_, axum::Error>(chunk);
                }
                Err(error) => {
                    error!(
                        page_key = %finalizer.key,
                        error = %error,
                        "render body failed mid-stream; capture abandoned"
                    );
                    yield Err(error);
                    return;
                }
            }
        }

        tokio::spawn(finalizer.complete(captured.freeze()));
    })
}

/// Capture-only: drain a background render's body to completion and
/// finalize in place.
pub(crate) async fn capture_detached(body: Body, finalizer: Finalizer) {
    match body.collect().await {
        Ok(collected) => finalizer.complete(collected.to_bytes()).await,
        Err(error) => {
            error!(
                page_key = %finalizer.key,
                error = %error,
                "background render body failed; capture abandoned"
            );
        }
    }
}
