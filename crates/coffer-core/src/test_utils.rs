//! Test utilities for coffer-core
//!
//! An in-process exchange rate feed so rate fetching can be exercised over
//! real HTTP without network access.

use axum::{http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock floatrates-style feed
pub struct MockRateServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockRateServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/daily/rub.json", get(handle_rates))
            .route("/broken", get(handle_broken));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// URL of the working feed
    pub fn rates_url(&self) -> String {
        format!("http://{}/daily/rub.json", self.addr)
    }

    /// URL that always answers 500
    pub fn broken_url(&self) -> String {
        format!("http://{}/broken", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockRateServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_rates() -> Json<Value> {
    Json(json!({
        "usd": {"code": "USD", "alphaCode": "USD", "rate": 0.0128, "inverseRate": 78.1234},
        "eur": {"code": "EUR", "alphaCode": "EUR", "rate": 0.0109, "inverseRate": 91.456},
        "gel": {"code": "GEL", "alphaCode": "GEL", "rate": 0.0345, "inverseRate": 28.987},
        "gbp": {"code": "GBP", "alphaCode": "GBP", "rate": 0.0094, "inverseRate": 106.001},
        "try": {"code": "TRY", "alphaCode": "TRY", "rate": 0.41, "inverseRate": 2.43}
    }))
}

async fn handle_broken() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "feed unavailable")
}
