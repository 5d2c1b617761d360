use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::catalog_item::{CatalogItem, ItemKind};
use serde::Deserialize;
use services::services::{
    analysis_history::AnalysisHistoryEntry,
    garment_prompts::{ImageData, ItemInfo, ItemSummary, UserProfile},
    response_interpreter::EnrichmentResult,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    #[serde(default)]
    pub image: Option<ImageData>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub item_info: Option<ItemInfo>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct DescribeRequest {
    #[serde(default)]
    pub image: Option<ImageData>,
    #[serde(default)]
    pub item_info: Option<ItemInfo>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRequest {
    pub item_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct WardrobeGapsRequest {
    #[serde(default)]
    pub profile: Option<UserProfile>,
    /// Restrict the scan to one kind of item
    #[serde(default)]
    pub kind: Option<ItemKind>,
}

/// POST /api/garment-ai/enrich
/// Suggest catalog fields for an image; unreadable replies come back flagged as fallback
pub async fn enrich(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<EnrichRequest>,
) -> Result<ResponseJson<ApiResponse<EnrichmentResult>>, ApiError> {
    let result = state
        .garment_ai()
        .enrich(
            payload.image.as_ref(),
            payload.profile.as_ref(),
            payload.item_info.as_ref(),
        )
        .await?;

    Ok(ResponseJson(ApiResponse::success(result)))
}

/// POST /api/garment-ai/describe
pub async fn describe(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<DescribeRequest>,
) -> Result<ResponseJson<ApiResponse<String>>, ApiError> {
    let description = state
        .garment_ai()
        .describe(payload.image.as_ref(), payload.item_info.as_ref())
        .await?;

    Ok(ResponseJson(ApiResponse::success(description)))
}

/// POST /api/garment-ai/compatibility
/// Styling advice for a set of catalogued items
pub async fn compatibility(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CompatibilityRequest>,
) -> Result<ResponseJson<ApiResponse<String>>, ApiError> {
    let mut items = Vec::with_capacity(payload.item_ids.len());
    for id in payload.item_ids {
        let item = CatalogItem::find_by_id(&state.db().pool, id)
            .await?
            .ok_or(ApiError::NotFound("catalog item"))?;
        items.push(ItemSummary::from(&item));
    }

    let advice = state.garment_ai().compatibility(&items).await?;
    Ok(ResponseJson(ApiResponse::success(advice)))
}

/// POST /api/garment-ai/wardrobe-gaps
/// Scan the stored catalog for missing pieces
pub async fn wardrobe_gaps(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<WardrobeGapsRequest>,
) -> Result<ResponseJson<ApiResponse<String>>, ApiError> {
    let items: Vec<ItemSummary> = CatalogItem::find_all(&state.db().pool, payload.kind)
        .await?
        .iter()
        .map(ItemSummary::from)
        .collect();

    let advice = state
        .garment_ai()
        .wardrobe_gaps(&items, payload.profile.as_ref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(advice)))
}

/// GET /api/garment-ai/history
pub async fn history(
    State(state): State<AppState>,
) -> ResponseJson<ApiResponse<Vec<AnalysisHistoryEntry>>> {
    ResponseJson(ApiResponse::success(state.garment_ai().history()))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/garment-ai",
        Router::new()
            .route("/enrich", post(enrich))
            .route("/describe", post(describe))
            .route("/compatibility", post(compatibility))
            .route("/wardrobe-gaps", post(wardrobe_gaps))
            .route("/history", get(history)),
    )
}
