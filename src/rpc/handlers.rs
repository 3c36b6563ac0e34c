use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::types::*;
use crate::error::LedgerError;
use crate::ledger::types::{ResourceKind, ResourceSet};
use crate::ledger::SettingsUpdate;
use crate::rpc::RpcState;

/// Main dispatcher: routes incoming JSON-RPC requests to the correct handler.
pub async fn handle_rpc_request(
    State(state): State<RpcState>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    debug!("RPC Request: method={}, id={}", req.method, req.id);

    let result = match req.method.as_str() {
        "getAccount" => handle_get_account(&state, req.params).await,
        "getSettings" => handle_get_settings(&state).await,
        "getPlans" => handle_get_plans(&state).await,
        "register" => handle_register(&state, req.params).await,
        "buyResource" => handle_buy_resource(&state, req.params).await,
        "buyPlan" => handle_buy_plan(&state, req.params).await,
        "claimDaily" => handle_claim_daily(&state, req.params).await,
        "addCoins" => handle_add_coins(&state, req.params).await,
        "setCoins" => handle_set_coins(&state, req.params).await,
        "addResources" => handle_add_resources(&state, req.params).await,
        "setResources" => handle_set_resources(&state, req.params).await,
        "ban" => handle_ban(&state, req.params).await,
        "unban" => handle_unban(&state, req.params).await,
        "updateSettings" => handle_update_settings(&state, req.params).await,
        other => Err(RpcError {
            code: -32601,
            reason: "METHOD_NOT_FOUND".to_string(),
            message: format!("Unknown method '{}'", other),
        }),
    };

    let (result, error) = match result {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err)),
    };
    Json(RpcResponse { jsonrpc: "2.0".to_string(), result, error, id: req.id })
}

fn parse<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|_| app_err(LedgerError::InvalidParams))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: -32603,
        reason: "INTERNAL".to_string(),
        message: e.to_string(),
    })
}

fn app_err(err: LedgerError) -> RpcError {
    RpcError {
        code: -32000,
        reason: err.code().to_string(),
        message: err.to_string(),
    }
}

async fn handle_get_account(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: EmailParams = parse(params)?;
    let account = state.ledger.account(&p.email).map_err(app_err)?;
    to_json(&account)
}

async fn handle_get_settings(state: &RpcState) -> Result<serde_json::Value, RpcError> {
    let settings = state.ledger.settings().map_err(app_err)?;
    to_json(&settings)
}

async fn handle_get_plans(state: &RpcState) -> Result<serde_json::Value, RpcError> {
    to_json(&state.ledger.catalog().all())
}

async fn handle_register(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: RegisterParams = parse(params)?;
    let account = state.ledger.register(&p.email, &p.username).await.map_err(app_err)?;
    to_json(&account)
}

async fn handle_buy_resource(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: BuyResourceParams = parse(params)?;
    let kind = ResourceKind::from_str(&p.resource).map_err(app_err)?;
    let account = state
        .ledger
        .purchase_resource(&p.email, kind, p.amount)
        .await
        .map_err(app_err)?;
    to_json(&account)
}

async fn handle_buy_plan(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: BuyPlanParams = parse(params)?;
    let account = state.ledger.change_plan(&p.email, p.plan).await.map_err(app_err)?;
    to_json(&account)
}

async fn handle_claim_daily(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: EmailParams = parse(params)?;
    let account = state.ledger.claim_daily(&p.email).await.map_err(app_err)?;
    to_json(&account)
}

async fn handle_add_coins(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AdminCoinsParams = parse(params)?;
    let account = state
        .ledger
        .add_coins(&p.actor, &p.email, p.amount)
        .await
        .map_err(app_err)?;
    to_json(&account)
}

async fn handle_set_coins(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AdminCoinsParams = parse(params)?;
    let account = state
        .ledger
        .set_coins(&p.actor, &p.email, p.amount)
        .await
        .map_err(app_err)?;
    to_json(&account)
}

/// Admin amounts arrive in human units; convert to raw units before the
/// ledger sees them.
fn scaled_deltas(p: &AdminResourcesParams) -> Result<HashMap<ResourceKind, i64>, RpcError> {
    let pairs = [
        (ResourceKind::Cpu, p.cpu),
        (ResourceKind::Ram, p.ram),
        (ResourceKind::Disk, p.disk),
        (ResourceKind::Backup, p.backup),
        (ResourceKind::Database, p.database),
        (ResourceKind::Allocation, p.allocation),
    ];
    let mut deltas = HashMap::with_capacity(pairs.len());
    for (kind, units) in pairs {
        let raw = units
            .checked_mul(kind.multiplier() as i64)
            .ok_or_else(|| app_err(LedgerError::InvalidAmount))?;
        deltas.insert(kind, raw);
    }
    Ok(deltas)
}

async fn handle_add_resources(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AdminResourcesParams = parse(params)?;
    let deltas = scaled_deltas(&p)?;
    let account = state
        .ledger
        .grant_resources(&p.actor, &p.email, &deltas)
        .await
        .map_err(app_err)?;
    to_json(&account)
}

async fn handle_set_resources(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: AdminResourcesParams = parse(params)?;
    let deltas = scaled_deltas(&p)?;
    let mut absolutes = ResourceSet::default();
    for (kind, raw) in deltas {
        if raw < 0 {
            return Err(app_err(LedgerError::InvalidAmount));
        }
        *absolutes.get_mut(kind) = raw as u64;
    }
    let account = state
        .ledger
        .set_resources(&p.actor, &p.email, absolutes)
        .await
        .map_err(app_err)?;
    to_json(&account)
}

async fn handle_ban(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: BanParams = parse(params)?;
    state.ledger.ban(&p.actor, &p.email, &p.reason).await.map_err(app_err)?;
    Ok(serde_json::json!({ "banned": p.email }))
}

async fn handle_unban(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: UnbanParams = parse(params)?;
    state.ledger.unban(&p.actor, &p.email).await.map_err(app_err)?;
    Ok(serde_json::json!({ "unbanned": p.email }))
}

async fn handle_update_settings(
    state: &RpcState,
    params: serde_json::Value,
) -> Result<serde_json::Value, RpcError> {
    let p: UpdateSettingsParams = parse(params)?;
    let update = SettingsUpdate {
        daily_coins_enabled: p.daily_coins_enabled,
        daily_coins: p.daily_coins,
        maintenance: p.maintenance,
        join_guild_enabled: p.join_guild_enabled,
        join_guild_id: p.join_guild_id,
    };
    let settings = state.ledger.update_settings(&p.actor, update).await.map_err(app_err)?;
    to_json(&settings)
}

// --- AFK websocket ---

pub async fn handle_afk_ws(
    State(state): State<RpcState>,
    Query(query): Query<AfkQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| afk_session(socket, state, query.email))
}

async fn afk_session(mut socket: WebSocket, state: RpcState, email: String) {
    // The account must exist (and not be banned) before a session opens.
    if state.ledger.account(&email).is_err() {
        return;
    }

    let (push_tx, mut push_rx) = mpsc::unbounded_channel();
    if let Err(err) = state.sessions.open_session(&email, push_tx).await {
        debug!("AFK session for {} rejected: {}", email, err);
        return;
    }

    loop {
        tokio::select! {
            pushed = push_rx.recv() => match pushed {
                Some(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode push message: {}", e);
                            break;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // The scheduler closed the session (store failure).
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // The channel is server-to-client only; ignore the rest.
                Some(Ok(_)) => {}
            },
        }
    }

    state.sessions.close_session(&email).await;
}
