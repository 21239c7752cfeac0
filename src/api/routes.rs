//! API Routes
//!
//! HTTP endpoint definitions. Every successful response is wrapped in the
//! `{ "success": true, "data": ... }` envelope; errors render through
//! `AppError` as `{ "success": false, "error": ... }`.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::analytics::{
    conversion_rates, ActivityEntry, AnalyticsEngine, ConversionRates, ProductDetail,
    ProductListing, RankMetric, RankedProduct, ShopSummary,
};
use crate::error::AppError;
use crate::ingest::{IngestReport, IngestionService, TrackRequest};
use crate::store::{DateWindow, InteractionStore, ListQuery, SortKey, SortOrder};

/// Largest page a listing will serve.
const MAX_PAGE_SIZE: i64 = 100;

/// Largest top-N ranking the summary will compute.
const MAX_RANKING_SIZE: i64 = 50;

/// Entries in the shop-wide recent activity feed.
const ACTIVITY_FEED_LIMIT: usize = 20;

// =========================================================================
// Response envelope
// =========================================================================

/// Success envelope; clients branch on `success`, not HTTP status text.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsQuery {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

/// Query carrying only the mandatory shop scope.
#[derive(Debug, Deserialize)]
pub struct ShopQuery {
    #[serde(default)]
    pub shop: Option<String>,
}

fn default_limit() -> i64 {
    10
}

fn default_sort_by() -> String {
    "totalViews".to_string()
}

fn default_order() -> String {
    "desc".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProducts {
    pub by_center_views: Vec<RankedProduct>,
    pub by_variation_views: Vec<RankedProduct>,
    pub by_add_to_cart: Vec<RankedProduct>,
    pub by_total_views: Vec<RankedProduct>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: ShopSummary,
    pub conversion_rates: ConversionRates,
    pub top_products: TopProducts,
    pub recent_activity: Vec<ActivityEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsResponse {
    pub products: Vec<ProductListing>,
    pub pagination: Pagination,
    pub summary: ShopSummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSettingsRequest {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub top_value: Option<String>,
    #[serde(default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Option<String>,
    #[serde(default)]
    pub x_axis_collections: Option<Vec<String>>,
    #[serde(default)]
    pub y_axis_collections: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub top_value: String,
    pub x_axis: String,
    pub y_axis: String,
    pub x_axis_collections: Vec<String>,
    pub y_axis_collections: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProductStatusRequest {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatusResponse {
    pub product_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Install metadata for a registered store. The access token is
/// intentionally never selected.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub shop: String,
    pub store_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<PgPool> {
    Router::new()
        // Interaction ingestion (called by the storefront widget)
        .route("/track-interactions", post(track_interactions))
        // Analytics
        .route("/analytics/summary", get(analytics_summary))
        .route("/analytics/products", get(analytics_products))
        .route("/analytics/product-views/:product_id", get(product_views))
        // Dashboard mirrors
        .route("/settings", get(get_settings).post(save_settings))
        .route(
            "/product-status",
            get(list_product_statuses).post(save_product_status),
        )
        .route("/store", get(get_store))
}

fn require_shop(shop: Option<String>) -> Result<String, AppError> {
    match shop {
        Some(shop) if !shop.is_empty() => Ok(shop),
        _ => Err(AppError::InvalidRequest(
            "shop parameter is required".to_string(),
        )),
    }
}

// =========================================================================
// POST /track-interactions
// =========================================================================

/// Ingest a batch of interaction events for one shop
async fn track_interactions(
    State(pool): State<PgPool>,
    Json(request): Json<TrackRequest>,
) -> Result<Json<Envelope<IngestReport>>, AppError> {
    let service = IngestionService::new(InteractionStore::new(pool));
    let report = service.ingest(request).await?;

    Ok(ok(report))
}

// =========================================================================
// GET /analytics/summary
// =========================================================================

/// Shop-wide summary: totals, conversion rates, top rankings, activity feed
async fn analytics_summary(
    State(pool): State<PgPool>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Envelope<SummaryResponse>>, AppError> {
    let shop = require_shop(query.shop)?;
    let window = DateWindow {
        from: query.date_from,
        to: query.date_to,
    };
    let limit = query.limit.clamp(1, MAX_RANKING_SIZE);

    let engine = AnalyticsEngine::new(InteractionStore::new(pool));

    let summary = engine.summary(&shop, &window).await?;
    let rates = conversion_rates(&summary);

    let by_center_views = engine
        .top_products(&shop, &window, RankMetric::CenterViews, limit)
        .await?;
    let by_variation_views = engine
        .top_products(&shop, &window, RankMetric::VariationViews, limit)
        .await?;
    let by_add_to_cart = engine
        .top_products(&shop, &window, RankMetric::AddToCart, limit)
        .await?;
    let by_total_views = engine
        .top_products(&shop, &window, RankMetric::TotalInteractions, limit)
        .await?;

    let recent_activity = engine
        .recent_activity(&shop, &window, ACTIVITY_FEED_LIMIT)
        .await?;

    Ok(ok(SummaryResponse {
        summary,
        conversion_rates: rates,
        top_products: TopProducts {
            by_center_views,
            by_variation_views,
            by_add_to_cart,
            by_total_views,
        },
        recent_activity,
    }))
}

// =========================================================================
// GET /analytics/products
// =========================================================================

fn parse_sort_by(sort_by: &str) -> SortKey {
    match sort_by {
        "centerViews" => SortKey::CenterViews,
        "variationViews" => SortKey::VariationViews,
        "addToCart" => SortKey::AddToCart,
        "lastUpdated" => SortKey::LastUpdated,
        // "totalViews" and anything unrecognized
        _ => SortKey::TotalInteractions,
    }
}

fn parse_order(order: &str) -> SortOrder {
    if order.eq_ignore_ascii_case("asc") {
        SortOrder::Asc
    } else {
        SortOrder::Desc
    }
}

/// Paginated product listing with per-product view counts
async fn analytics_products(
    State(pool): State<PgPool>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<Envelope<ProductsResponse>>, AppError> {
    let shop = require_shop(query.shop)?;
    let window = DateWindow {
        from: query.date_from,
        to: query.date_to,
    };
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let store = InteractionStore::new(pool);
    let engine = AnalyticsEngine::new(store.clone());

    let list_query = ListQuery {
        sort: parse_sort_by(&query.sort_by),
        order: parse_order(&query.order),
        limit,
        offset,
        window,
    };

    let (aggregates, total) = store.list(&shop, &list_query).await?;
    let summary = engine.summary(&shop, &window).await?;

    Ok(ok(ProductsResponse {
        products: aggregates.iter().map(ProductListing::from).collect(),
        pagination: Pagination {
            total,
            limit,
            offset,
            has_more: offset + limit < total,
        },
        summary,
    }))
}

// =========================================================================
// GET /analytics/product-views/:product_id
// =========================================================================

/// Per-product analytics detail
async fn product_views(
    State(pool): State<PgPool>,
    Path(product_id): Path<String>,
    Query(query): Query<ShopQuery>,
) -> Result<Json<Envelope<ProductDetail>>, AppError> {
    let shop = require_shop(query.shop)?;

    let engine = AnalyticsEngine::new(InteractionStore::new(pool));

    let detail = engine
        .product_detail(&shop, &product_id)
        .await?
        .ok_or(AppError::ProductNotFound(product_id))?;

    Ok(ok(detail))
}

// =========================================================================
// GET/POST /settings
// =========================================================================

type SettingsRow = (
    String,
    String,
    String,
    Vec<String>,
    Vec<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn settings_response(row: SettingsRow) -> SettingsResponse {
    let (top_value, x_axis, y_axis, x_axis_collections, y_axis_collections, created_at, updated_at) =
        row;
    SettingsResponse {
        top_value,
        x_axis,
        y_axis,
        x_axis_collections,
        y_axis_collections,
        created_at,
        updated_at,
    }
}

/// Get carousel settings for a shop (null when never saved)
async fn get_settings(
    State(pool): State<PgPool>,
    Query(query): Query<ShopQuery>,
) -> Result<Json<Envelope<Option<SettingsResponse>>>, AppError> {
    let shop = require_shop(query.shop)?;

    let row: Option<SettingsRow> = sqlx::query_as(
        r#"
        SELECT top_value, x_axis, y_axis, x_axis_collections, y_axis_collections,
               created_at, updated_at
        FROM shop_settings
        WHERE shop = $1
        "#,
    )
    .bind(&shop)
    .fetch_optional(&pool)
    .await?;

    Ok(ok(row.map(settings_response)))
}

/// Upsert carousel settings for a shop
async fn save_settings(
    State(pool): State<PgPool>,
    Json(request): Json<SaveSettingsRequest>,
) -> Result<Json<Envelope<SettingsResponse>>, AppError> {
    let shop = require_shop(request.shop)?;

    let row: SettingsRow = sqlx::query_as(
        r#"
        INSERT INTO shop_settings
            (shop, top_value, x_axis, y_axis, x_axis_collections, y_axis_collections)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (shop) DO UPDATE SET
            top_value = EXCLUDED.top_value,
            x_axis = EXCLUDED.x_axis,
            y_axis = EXCLUDED.y_axis,
            x_axis_collections = EXCLUDED.x_axis_collections,
            y_axis_collections = EXCLUDED.y_axis_collections,
            updated_at = NOW()
        RETURNING top_value, x_axis, y_axis, x_axis_collections, y_axis_collections,
                  created_at, updated_at
        "#,
    )
    .bind(&shop)
    .bind(request.top_value.unwrap_or_default())
    .bind(request.x_axis.unwrap_or_default())
    .bind(request.y_axis.unwrap_or_default())
    .bind(request.x_axis_collections.unwrap_or_default())
    .bind(request.y_axis_collections.unwrap_or_default())
    .fetch_one(&pool)
    .await?;

    Ok(ok(settings_response(row)))
}

// =========================================================================
// GET/POST /product-status
// =========================================================================

/// List active/inactive flags for all products of a shop
async fn list_product_statuses(
    State(pool): State<PgPool>,
    Query(query): Query<ShopQuery>,
) -> Result<Json<Envelope<Vec<ProductStatusResponse>>>, AppError> {
    let shop = require_shop(query.shop)?;

    let rows: Vec<(String, bool, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT product_id, is_active, created_at, updated_at
        FROM product_status
        WHERE shop = $1
        ORDER BY product_id
        "#,
    )
    .bind(&shop)
    .fetch_all(&pool)
    .await?;

    let statuses = rows
        .into_iter()
        .map(
            |(product_id, is_active, created_at, updated_at)| ProductStatusResponse {
                product_id,
                is_active,
                created_at,
                updated_at,
            },
        )
        .collect();

    Ok(ok(statuses))
}

/// Upsert one product's active/inactive flag
async fn save_product_status(
    State(pool): State<PgPool>,
    Json(request): Json<SaveProductStatusRequest>,
) -> Result<Json<Envelope<ProductStatusResponse>>, AppError> {
    let (shop, product_id, is_active) = match (
        request.shop.filter(|s| !s.is_empty()),
        request.product_id.filter(|s| !s.is_empty()),
        request.is_active,
    ) {
        (Some(shop), Some(product_id), Some(is_active)) => (shop, product_id, is_active),
        _ => {
            return Err(AppError::InvalidRequest(
                "shop, productId, and isActive are required".to_string(),
            ));
        }
    };

    let row: (String, bool, DateTime<Utc>, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO product_status (shop, product_id, is_active)
        VALUES ($1, $2, $3)
        ON CONFLICT (shop, product_id) DO UPDATE SET
            is_active = EXCLUDED.is_active,
            updated_at = NOW()
        RETURNING product_id, is_active, created_at, updated_at
        "#,
    )
    .bind(&shop)
    .bind(&product_id)
    .bind(is_active)
    .fetch_one(&pool)
    .await?;

    Ok(ok(ProductStatusResponse {
        product_id: row.0,
        is_active: row.1,
        created_at: row.2,
        updated_at: row.3,
    }))
}

// =========================================================================
// GET /store
// =========================================================================

/// Install metadata for a registered store
async fn get_store(
    State(pool): State<PgPool>,
    Query(query): Query<ShopQuery>,
) -> Result<Json<Envelope<StoreResponse>>, AppError> {
    let shop = require_shop(query.shop)?;

    let row: Option<(String, Option<String>, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT shop, store_id, created_at, updated_at
        FROM stores
        WHERE shop = $1
        "#,
    )
    .bind(&shop)
    .fetch_optional(&pool)
    .await?;

    let (shop, store_id, created_at, updated_at) =
        row.ok_or(AppError::ShopNotFound(shop))?;

    Ok(ok(StoreResponse {
        shop,
        store_id,
        created_at,
        updated_at,
    }))
}
