use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use flacon_core::build_conflict_pair;
use flacon_core::request::DoubleSpendRequest;
use flacon_core::sequencer::{BroadcastReport, BroadcastSequencer};
use flacon_core::types::TxPayload;

use super::error::AppError;
use super::SharedState;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Serialize)]
pub(super) struct DoubleSpendResponse {
    tx1: TxPayload,
    tx2: TxPayload,
    /// Fee in satoshis implied by the fee rate and size estimate.
    fee: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    broadcast: Option<BroadcastReport>,
}

// ==============================================================================
// Handler
// ==============================================================================

/// Build and sign a conflicting pair, optionally broadcasting it.
///
/// Broadcast failures do not fail the request: the signed pair is returned
/// together with both outcomes.
pub(super) async fn double_spend(
    State(state): State<SharedState>,
    body: Result<Json<DoubleSpendRequest>, JsonRejection>,
) -> Result<Json<DoubleSpendResponse>, AppError> {
    let Json(body) = body?;
    let request = body.validate()?;

    let pair = build_conflict_pair(
        state.primitives.as_ref(),
        &request.pair,
        &state.conflict_policy,
    )?;

    let broadcast = match request.broadcast {
        Some(mut policy) => {
            policy.submit_timeout = Some(state.submit_timeout);
            let report =
                BroadcastSequencer::new(state.submitter.as_ref(), request.network, policy)
                    .run(&pair.tx1, &pair.tx2)
                    .await;
            match report.error() {
                Some(err) => {
                    tracing::warn!(state = ?report.state, error = %err, "pair broadcast incomplete")
                }
                None => tracing::info!(state = ?report.state, "pair broadcast complete"),
            }
            Some(report)
        }
        None => None,
    };

    Ok(Json(DoubleSpendResponse {
        tx1: TxPayload::from(&pair.tx1),
        tx2: TxPayload::from(&pair.tx2),
        fee: pair.fee.to_sat(),
        broadcast,
    }))
}
