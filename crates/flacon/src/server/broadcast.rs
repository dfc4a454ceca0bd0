use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use bitcoin::hex::FromHex;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use flacon_core::provider::TxSubmitter;
use flacon_core::NetworkParams;

use super::error::AppError;
use super::SharedState;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Deserialize)]
pub(super) struct BroadcastBody {
    hex: Option<String>,
    net: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct BatchBody {
    #[serde(default)]
    hexes: Vec<String>,
    net: Option<String>,
}

#[derive(Serialize)]
pub(super) struct BroadcastResponse {
    txid: Txid,
}

#[derive(Serialize)]
pub(super) struct BatchResponse {
    results: Vec<BroadcastResponse>,
}

// ==============================================================================
// Handlers
// ==============================================================================

pub(super) async fn broadcast(
    State(state): State<SharedState>,
    body: Result<Json<BroadcastBody>, JsonRejection>,
) -> Result<Json<BroadcastResponse>, AppError> {
    let Json(body) = body?;
    let network = NetworkParams::from_request(body.net.as_deref())?;
    let hex = body
        .hex
        .ok_or_else(|| AppError::BadRequest("missing hex".to_string()))?;
    validate_tx_hex(&hex)?;

    let txid = submit_with_timeout(&state, &hex, network).await?;
    tracing::info!(%txid, %network, "broadcast accepted");
    Ok(Json(BroadcastResponse { txid }))
}

/// Submit several transactions in order, stopping at the first failure.
pub(super) async fn broadcast_batch(
    State(state): State<SharedState>,
    body: Result<Json<BatchBody>, JsonRejection>,
) -> Result<Json<BatchResponse>, AppError> {
    let Json(body) = body?;
    let network = NetworkParams::from_request(body.net.as_deref())?;
    if body.hexes.is_empty() {
        return Err(AppError::BadRequest(
            "provide hexes as a non-empty array".to_string(),
        ));
    }
    for hex in &body.hexes {
        validate_tx_hex(hex)?;
    }

    let mut results = Vec::with_capacity(body.hexes.len());
    for (index, hex) in body.hexes.iter().enumerate() {
        match submit_with_timeout(&state, hex, network).await {
            Ok(txid) => results.push(BroadcastResponse { txid }),
            Err(AppError::BadGateway(reason)) => {
                tracing::warn!(index, accepted = results.len(), %reason, "batch broadcast stopped");
                return Err(AppError::BadGateway(format!(
                    "batch broadcast failed at index {index} after {} accepted: {reason}",
                    results.len()
                )));
            }
            Err(other) => return Err(other),
        }
    }
    Ok(Json(BatchResponse { results }))
}

async fn submit_with_timeout(
    state: &SharedState,
    hex: &str,
    network: NetworkParams,
) -> Result<Txid, AppError> {
    let submitter: &dyn TxSubmitter = state.submitter.as_ref();
    match tokio::time::timeout(state.submit_timeout, submitter.submit_raw(hex, network)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(AppError::BadGateway(
            flacon_core::sequencer::TIMEOUT_REASON.to_string(),
        )),
    }
}

fn validate_tx_hex(hex: &str) -> Result<(), AppError> {
    let bytes = Vec::<u8>::from_hex(hex.trim())
        .map_err(|e| AppError::BadRequest(format!("invalid transaction hex: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("transaction hex is empty".to_string()));
    }
    Ok(())
}
