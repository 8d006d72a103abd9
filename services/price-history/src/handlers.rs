use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;
use price_history::{DateWindow, PriceHistoryError, PriceRecord, SourceKind, TwapMethod, TwapSummary};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Query params shared by the history and TWAP endpoints
#[derive(Debug, serde::Deserialize)]
pub struct HistoryQuery {
    asset: String,
    start: i64,
    end: i64,
}

#[derive(Debug, serde::Deserialize)]
pub struct TwapQuery {
    asset: String,
    start: i64,
    end: i64,
    days: Option<u32>,
    #[serde(default)]
    method: TwapMethod,
}

/// GET /history/:source - Normalized daily prices for an asset
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<PriceRecord>> {
    let kind = source.parse::<SourceKind>().map_err(error_response)?;
    let window = DateWindow::new(query.start, query.end).map_err(error_response)?;

    info!("Fetching {} history for {} in [{}, {}]", kind, query.asset, window.start, window.end);

    let records = state
        .service
        .get_historical_prices(kind, &query.asset, window)
        .await
        .map_err(|e| {
            warn!("{} history error for {}: {}", kind, query.asset, e);
            error_response(e)
        })?;

    Ok(Json(records))
}

/// GET /twap/:source - TWAP over the window (days default to the window length)
pub async fn get_twap(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    Query(query): Query<TwapQuery>,
) -> ApiResult<TwapSummary> {
    let kind = source.parse::<SourceKind>().map_err(error_response)?;
    let window = DateWindow::new(query.start, query.end).map_err(error_response)?;
    let days = query.days.unwrap_or_else(|| window.days());

    let summary = state
        .service
        .get_twap(kind, &query.asset, window, days, query.method)
        .await
        .map_err(|e| {
            warn!("{} TWAP error for {}: {}", kind, query.asset, e);
            error_response(e)
        })?;

    Ok(Json(summary))
}

/// GET /sources - Configured source names
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state
            .service
            .configured_sources()
            .iter()
            .map(|kind| kind.as_str().to_string())
            .collect(),
    })
}

/// GET /health - Liveness
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sources: state.service.configured_sources().len(),
    })
}

fn error_response(err: PriceHistoryError) -> (StatusCode, String) {
    let status = match &err {
        PriceHistoryError::InvalidWindow(_) | PriceHistoryError::InvalidAsset(_) => {
            StatusCode::BAD_REQUEST
        }
        PriceHistoryError::UnknownSource(_) | PriceHistoryError::AssetNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        PriceHistoryError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        PriceHistoryError::ApiError(_)
        | PriceHistoryError::InvalidResponse(_)
        | PriceHistoryError::MissingField { .. } => StatusCode::BAD_GATEWAY,
        PriceHistoryError::LocalData(_) | PriceHistoryError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

// Response types
#[derive(Debug, serde::Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub sources: usize,
}
