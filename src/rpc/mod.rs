pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::afk::SessionManager;
use crate::ledger::LedgerService;

#[derive(Clone)]
pub struct RpcState {
    pub ledger: Arc<LedgerService>,
    pub sessions: SessionManager,
}

pub struct RpcServer {
    state: RpcState,
    bind_addr: String,
}

impl RpcServer {
    pub fn new(ledger: Arc<LedgerService>, sessions: SessionManager, port: u16) -> Self {
        Self {
            state: RpcState { ledger, sessions },
            bind_addr: format!("0.0.0.0:{}", port),
        }
    }

    pub async fn start(self) {
        let app = Router::new()
            .route("/", post(handlers::handle_rpc_request))
            .route("/afk/ws", get(handlers::handle_afk_ws))
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let listener = tokio::net::TcpListener::bind(&self.bind_addr)
            .await
            .expect("Failed to bind RPC server");

        tracing::info!("RPC server listening on {}", self.bind_addr);
        axum::serve(listener, app).await.expect("RPC server failed");
    }
}
