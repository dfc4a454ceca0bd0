use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use flacon_core::network::parse_address;
use flacon_core::provider::{AddressUtxo, RecommendedFees};
use flacon_core::NetworkParams;

use super::error::AppError;
use super::{NetworkQuery, SharedState};

#[derive(Deserialize)]
pub(super) struct UtxoQuery {
    address: Option<String>,
    net: Option<String>,
}

pub(super) async fn get_utxos(
    State(state): State<SharedState>,
    query: Result<Query<UtxoQuery>, QueryRejection>,
) -> Result<Json<Vec<AddressUtxo>>, AppError> {
    let Query(query) = query?;
    let network = NetworkParams::from_request(query.net.as_deref())?;
    let address = query
        .address
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("missing address parameter".to_string()))?;
    let address = parse_address(address, network)?;

    let utxos = state.chain.get_utxos(&address, network).await?;
    tracing::debug!(%address, %network, count = utxos.len(), "fetched utxos");
    Ok(Json(utxos))
}

pub(super) async fn get_fees(
    State(state): State<SharedState>,
    query: Result<Query<NetworkQuery>, QueryRejection>,
) -> Result<Json<RecommendedFees>, AppError> {
    let Query(query) = query?;
    let network = NetworkParams::from_request(query.net.as_deref())?;
    Ok(Json(state.chain.get_recommended_fees(network).await?))
}
