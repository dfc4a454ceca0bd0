use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::Json;
use serde::Serialize;

use flacon_core::key::KeyMaterial;
use flacon_core::NetworkParams;

use super::error::AppError;
use super::NetworkQuery;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Serialize)]
pub(super) struct KeyResponse {
    wif: String,
    address: String,
    network: NetworkParams,
}

// ==============================================================================
// Handler
// ==============================================================================

/// Generate a throwaway P2WPKH key for lab use. The secret is returned to
/// the caller and not kept anywhere.
pub(super) async fn generate_key(
    query: Result<Query<NetworkQuery>, QueryRejection>,
) -> Result<Json<KeyResponse>, AppError> {
    let Query(query) = query?;
    let network = NetworkParams::from_request(query.net.as_deref())?;

    let key = KeyMaterial::generate(network);
    Ok(Json(KeyResponse {
        wif: key.to_wif(),
        address: key.address().to_string(),
        network,
    }))
}
