use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::catalog_item::{CatalogItem, CreateCatalogItem, ItemKind, UpdateCatalogItem};
use serde::{Deserialize, Serialize};
use services::services::{
    garment_ai::DescribeRequest,
    garment_prompts::{ImageData, ItemInfo},
    response_interpreter::EnrichmentResult,
};
use tracing::{info, warn};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub kind: Option<ItemKind>,
}

/// Outcome of a metadata backfill run
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateSummary {
    pub total: usize,
    pub updated: usize,
    /// Items that received a description from elsewhere while the run was going
    pub skipped: usize,
    pub failed: Vec<Uuid>,
}

/// POST /api/catalog-items
pub async fn create_item(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateCatalogItem>,
) -> Result<ResponseJson<ApiResponse<CatalogItem>>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let item = CatalogItem::create(&state.db().pool, Uuid::new_v4(), &payload).await?;
    info!(item_id = %item.id, kind = %item.kind, "Created catalog item");
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// GET /api/catalog-items?kind=garment|accessory
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<CatalogItem>>>, ApiError> {
    let items = CatalogItem::find_all(&state.db().pool, query.kind).await?;
    Ok(ResponseJson(ApiResponse::success(items)))
}

/// GET /api/catalog-items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<CatalogItem>>, ApiError> {
    let item = CatalogItem::find_by_id(&state.db().pool, id)
        .await?
        .ok_or(ApiError::NotFound("catalog item"))?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// PUT /api/catalog-items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateCatalogItem>,
) -> Result<ResponseJson<ApiResponse<CatalogItem>>, ApiError> {
    let item = CatalogItem::update(&state.db().pool, id, &payload)
        .await?
        .ok_or(ApiError::NotFound("catalog item"))?;
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// DELETE /api/catalog-items/{id}
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if CatalogItem::delete(&state.db().pool, id).await? == 0 {
        return Err(ApiError::NotFound("catalog item"));
    }
    info!(item_id = %id, "Deleted catalog item");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/catalog-items/{id}/enrichment
/// Merge a suggestion into the stored item. Fallback suggestions only store their description.
pub async fn apply_enrichment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    axum::Json(result): axum::Json<EnrichmentResult>,
) -> Result<ResponseJson<ApiResponse<CatalogItem>>, ApiError> {
    let item = CatalogItem::apply_enrichment(&state.db().pool, id, &result.to_patch())
        .await?
        .ok_or(ApiError::NotFound("catalog item"))?;

    info!(item_id = %id, source = ?result.source, "Applied enrichment to catalog item");
    Ok(ResponseJson(ApiResponse::success(item)))
}

/// POST /api/catalog-items/regenerate-metadata
/// Describe every item that has an image but no description yet
pub async fn regenerate_metadata(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<RegenerateSummary>>, ApiError> {
    let pool = &state.db().pool;
    let requests: Vec<DescribeRequest> = CatalogItem::find_missing_ai_metadata(pool)
        .await?
        .iter()
        .filter_map(|item| {
            let url = item.image_url.clone()?;
            Some(DescribeRequest {
                item_id: item.id,
                image: ImageData::Url { url },
                item_info: ItemInfo::from(item),
            })
        })
        .collect();

    let total = requests.len();
    let (mut updated, mut skipped) = (0, 0);
    let mut failed = Vec::new();
    for outcome in state.garment_ai().describe_many(requests).await {
        let item_id = outcome.item_id;
        let description = match outcome.result {
            Ok(description) => description,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Skipping item without description");
                failed.push(item_id);
                continue;
            }
        };

        match CatalogItem::fill_missing_ai_metadata(pool, item_id, &description).await {
            Ok(true) => updated += 1,
            Ok(false) => {
                info!(item_id = %item_id, "Item already has a description, keeping it");
                skipped += 1;
            }
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "Failed to store generated description");
                failed.push(item_id);
            }
        }
    }

    info!(total, updated, skipped, failed = failed.len(), "Metadata backfill finished");
    Ok(ResponseJson(ApiResponse::success(RegenerateSummary {
        total,
        updated,
        skipped,
        failed,
    })))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/catalog-items",
        Router::new()
            .route("/", post(create_item).get(list_items))
            .route("/regenerate-metadata", post(regenerate_metadata))
            .route("/{id}", get(get_item).put(update_item).delete(delete_item))
            .route("/{id}/enrichment", post(apply_enrichment)),
    )
}
