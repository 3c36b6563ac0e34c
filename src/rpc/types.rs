// RPC types for the JSON-RPC 2.0 surface
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: u64,
}

#[derive(Serialize, Debug)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Taxonomy code, e.g. "INSUFFICIENT_BALANCE".
    pub reason: String,
    pub message: String,
}

// Method-specific parameter types

#[derive(Deserialize, Debug)]
pub struct EmailParams {
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct RegisterParams {
    pub email: String,
    pub username: String,
}

#[derive(Deserialize, Debug)]
pub struct BuyResourceParams {
    pub email: String,
    pub resource: String,
    pub amount: u64,
}

#[derive(Deserialize, Debug)]
pub struct BuyPlanParams {
    pub email: String,
    pub plan: u32,
}

#[derive(Deserialize, Debug)]
pub struct AdminCoinsParams {
    pub actor: String,
    pub email: String,
    pub amount: u64,
}

/// Units as entered by an admin; multipliers are applied server-side
/// (cpu in cores, ram/disk in GiB, the rest as plain counts).
#[derive(Deserialize, Debug)]
pub struct AdminResourcesParams {
    pub actor: String,
    pub email: String,
    pub cpu: i64,
    pub ram: i64,
    pub disk: i64,
    pub backup: i64,
    pub database: i64,
    pub allocation: i64,
}

#[derive(Deserialize, Debug)]
pub struct BanParams {
    pub actor: String,
    pub email: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize, Debug)]
pub struct UnbanParams {
    pub actor: String,
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateSettingsParams {
    pub actor: String,
    pub daily_coins_enabled: Option<bool>,
    pub daily_coins: Option<u64>,
    pub maintenance: Option<bool>,
    pub join_guild_enabled: Option<bool>,
    pub join_guild_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AfkQuery {
    pub email: String,
}
