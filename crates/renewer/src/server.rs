//! HTTP responder for liveness probes and HTTP-01 challenges.
//!
//! Routes:
//!
//! - `GET /healthz` → `200 ok`
//! - `GET /.well-known/acme-challenge/{token}` → stored proof as
//!   `application/octet-stream`, or `404` for unknown and empty tokens
//!
//! Everything else is a plain `404`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acme::{ChallengeStore, ACME_CHALLENGE_PREFIX};

/// Content type of challenge responses
const CHALLENGE_CONTENT_TYPE: &str = "application/octet-stream";

/// Build the responder's router
pub fn router(challenges: ChallengeStore) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(&format!("{}{{token}}", ACME_CHALLENGE_PREFIX), get(challenge))
        .with_state(challenges)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn challenge(State(challenges): State<ChallengeStore>, Path(token): Path<String>) -> Response {
    if token.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    match challenges.lookup(&token) {
        Some(proof) => {
            debug!(token = %token, "Serving HTTP-01 challenge");
            ([(header::CONTENT_TYPE, CHALLENGE_CONTENT_TYPE)], proof).into_response()
        }
        None => {
            debug!(token = %token, "Unknown HTTP-01 challenge token");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Bound but not yet serving HTTP responder
#[derive(Debug)]
pub struct ChallengeServer {
    listener: TcpListener,
    router: Router,
}

impl ChallengeServer {
    /// Bind `addr` so the responder is reachable before the first cycle
    pub async fn bind(addr: &str, challenges: ChallengeStore) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "HTTP responder listening");

        Ok(Self {
            listener,
            router: router(challenges),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// After cancellation in-flight requests get `grace` to complete; then
    /// the remaining connections are dropped.
    pub async fn serve(self, shutdown: CancellationToken, grace: Duration) -> io::Result<()> {
        let signal = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(self.listener, self.router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        tokio::select! {
            result = &mut server => return flatten(result),
            _ = shutdown.cancelled() => {}
        }

        debug!(grace_ms = grace.as_millis() as u64, "Draining HTTP responder");

        match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => {
                info!("HTTP responder stopped");
                flatten(result)
            }
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "HTTP responder did not drain within grace period, forcing close"
                );
                server.abort();
                Ok(())
            }
        }
    }
}

fn flatten(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(io::Error::other(e)),
    }
}
