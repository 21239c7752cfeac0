//! Interaction Store Repository
//!
//! One row per (shop, product). Every mutation is a single SQL statement so
//! concurrent writers to the same key serialize at the database row instead
//! of racing through an application-level read-modify-write cycle.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use crate::domain::{InteractionAggregate, InteractionKind, MetricBucket};

use super::StoreError;

/// Per-bucket storage cap for the timestamp arrays. Readers only ever
/// consume the most recent 3-10 entries, so the append trims the tail of
/// history beyond this bound.
pub const TIMESTAMP_CAP: usize = 100;

/// Per-statement duration bound. Exceeding it surfaces as a retryable
/// `StoreError::Timeout`; the store never retries on its own.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

const AGGREGATE_COLUMNS: &str = "shop, product_id, product_name, product_image, \
     center_view_count, variation_view_count, add_to_cart_count, \
     center_view_timestamps, variation_view_timestamps, add_to_cart_timestamps, \
     total_interactions, created_at, last_updated";

/// Sort keys accepted by `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CenterViews,
    VariationViews,
    AddToCart,
    TotalInteractions,
    LastUpdated,
}

impl SortKey {
    fn order_column(&self) -> &'static str {
        match self {
            Self::CenterViews => "center_view_count",
            Self::VariationViews => "variation_view_count",
            Self::AddToCart => "add_to_cart_count",
            Self::TotalInteractions => "total_interactions",
            Self::LastUpdated => "last_updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Optional [from, to] window applied to `last_updated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// Parameters for a paginated listing.
#[derive(Debug, Clone, Copy)]
pub struct ListQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
    pub window: DateWindow,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            sort: SortKey::TotalInteractions,
            order: SortOrder::Desc,
            limit: 10,
            offset: 0,
            window: DateWindow::none(),
        }
    }
}

/// Shop-wide totals across all matching aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopSummary {
    pub total_products: i64,
    pub total_center_views: i64,
    pub total_variation_views: i64,
    pub total_add_to_cart: i64,
    pub total_all_interactions: i64,
}

/// Database row shape for an aggregate.
#[derive(Debug, sqlx::FromRow)]
struct AggregateRow {
    shop: String,
    product_id: String,
    product_name: String,
    product_image: String,
    center_view_count: i64,
    variation_view_count: i64,
    add_to_cart_count: i64,
    center_view_timestamps: Vec<DateTime<Utc>>,
    variation_view_timestamps: Vec<DateTime<Utc>>,
    add_to_cart_timestamps: Vec<DateTime<Utc>>,
    total_interactions: i64,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl From<AggregateRow> for InteractionAggregate {
    fn from(row: AggregateRow) -> Self {
        InteractionAggregate {
            shop: row.shop,
            product_id: row.product_id,
            product_name: row.product_name,
            product_image: row.product_image,
            center_views: MetricBucket {
                count: row.center_view_count,
                timestamps: row.center_view_timestamps,
            },
            variation_views: MetricBucket {
                count: row.variation_view_count,
                timestamps: row.variation_view_timestamps,
            },
            add_to_cart: MetricBucket {
                count: row.add_to_cart_count,
                timestamps: row.add_to_cart_timestamps,
            },
            total_interactions: row.total_interactions,
            created_at: row.created_at,
            last_updated: row.last_updated,
        }
    }
}

/// Count and timestamp column pair for a bucket.
fn metric_columns(kind: InteractionKind) -> (&'static str, &'static str) {
    match kind {
        InteractionKind::CenterView => ("center_view_count", "center_view_timestamps"),
        InteractionKind::VariationView => ("variation_view_count", "variation_view_timestamps"),
        InteractionKind::AddToCart => ("add_to_cart_count", "add_to_cart_timestamps"),
    }
}

/// Keyed storage of interaction aggregates.
///
/// The pool is shared process-wide state owned by the entry point; the
/// store only borrows it.
#[derive(Debug, Clone)]
pub struct InteractionStore {
    pool: PgPool,
    op_timeout: Duration,
}

impl InteractionStore {
    /// Create a store over an already-initialized pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Override the per-statement duration bound.
    pub fn with_timeout(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Bound a statement by the configured duration.
    async fn guard<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    // =========================================================================
    // ensure_aggregate
    // =========================================================================

    /// Create a zeroed aggregate if absent; no-op otherwise.
    ///
    /// `ON CONFLICT DO NOTHING` makes concurrent first-events for the same
    /// key converge on exactly one row; a late creator can never clobber an
    /// aggregate another writer has already incremented.
    ///
    /// Returns `true` when this call created the row.
    pub async fn ensure_aggregate(
        &self,
        shop: &str,
        product_id: &str,
    ) -> Result<bool, StoreError> {
        let result = self
            .guard(
                sqlx::query(
                    r#"
                    INSERT INTO product_interactions (shop, product_id)
                    VALUES ($1, $2)
                    ON CONFLICT (shop, product_id) DO NOTHING
                    "#,
                )
                .bind(shop)
                .bind(product_id)
                .execute(&self.pool),
            )
            .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // apply_event
    // =========================================================================

    /// Fold one event into an aggregate: refresh the display cache, bump the
    /// bucket count and `total_interactions` by the same delta, and append
    /// the event timestamps (trimmed to `TIMESTAMP_CAP`).
    ///
    /// All three effects ride in one UPDATE so they are atomic relative to
    /// every other concurrent `apply_event` on the same key.
    pub async fn apply_event(
        &self,
        shop: &str,
        product_id: &str,
        kind: InteractionKind,
        count: i64,
        timestamps: &[DateTime<Utc>],
        product_name: &str,
        product_image: &str,
    ) -> Result<(), StoreError> {
        let (count_col, ts_col) = metric_columns(kind);
        let sql = format!(
            "UPDATE product_interactions \
             SET product_name = $3, \
                 product_image = $4, \
                 last_updated = NOW(), \
                 {count_col} = {count_col} + $5, \
                 total_interactions = total_interactions + $5, \
                 {ts_col} = (array_cat({ts_col}, $6))\
                     [GREATEST(cardinality(array_cat({ts_col}, $6)) - {cap} + 1, 1):] \
             WHERE shop = $1 AND product_id = $2",
            count_col = count_col,
            ts_col = ts_col,
            cap = TIMESTAMP_CAP,
        );

        let result = self
            .guard(
                sqlx::query(&sql)
                    .bind(shop)
                    .bind(product_id)
                    .bind(product_name)
                    .bind(product_image)
                    .bind(count)
                    .bind(timestamps)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AggregateMissing {
                shop: shop.to_string(),
                product_id: product_id.to_string(),
            });
        }

        Ok(())
    }

    // =========================================================================
    // get / list / summarize
    // =========================================================================

    /// Fetch a single aggregate.
    pub async fn get(
        &self,
        shop: &str,
        product_id: &str,
    ) -> Result<Option<InteractionAggregate>, StoreError> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM product_interactions \
             WHERE shop = $1 AND product_id = $2"
        );

        let row = self
            .guard(
                sqlx::query_as::<_, AggregateRow>(&sql)
                    .bind(shop)
                    .bind(product_id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        Ok(row.map(InteractionAggregate::from))
    }

    /// Paginated listing with sort and date window. Ties on the sort key
    /// fall back to insertion order (`id ASC`) so pagination is stable.
    ///
    /// Returns the page plus the total number of matching aggregates.
    pub async fn list(
        &self,
        shop: &str,
        query: &ListQuery,
    ) -> Result<(Vec<InteractionAggregate>, i64), StoreError> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM product_interactions \
             WHERE shop = $1 \
               AND ($2::timestamptz IS NULL OR last_updated >= $2) \
               AND ($3::timestamptz IS NULL OR last_updated <= $3) \
             ORDER BY {order_col} {dir}, id ASC \
             LIMIT $4 OFFSET $5",
            order_col = query.sort.order_column(),
            dir = query.order.as_sql(),
        );

        let rows = self
            .guard(
                sqlx::query_as::<_, AggregateRow>(&sql)
                    .bind(shop)
                    .bind(query.window.from)
                    .bind(query.window.to)
                    .bind(query.limit)
                    .bind(query.offset)
                    .fetch_all(&self.pool),
            )
            .await?;

        let total: i64 = self
            .guard(
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM product_interactions
                    WHERE shop = $1
                      AND ($2::timestamptz IS NULL OR last_updated >= $2)
                      AND ($3::timestamptz IS NULL OR last_updated <= $3)
                    "#,
                )
                .bind(shop)
                .bind(query.window.from)
                .bind(query.window.to)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok((rows.into_iter().map(InteractionAggregate::from).collect(), total))
    }

    /// Every aggregate matching the window, in insertion order. Used by the
    /// activity feed, which merges a bounded slice of each row.
    pub async fn list_window(
        &self,
        shop: &str,
        window: &DateWindow,
    ) -> Result<Vec<InteractionAggregate>, StoreError> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM product_interactions \
             WHERE shop = $1 \
               AND ($2::timestamptz IS NULL OR last_updated >= $2) \
               AND ($3::timestamptz IS NULL OR last_updated <= $3) \
             ORDER BY id ASC"
        );

        let rows = self
            .guard(
                sqlx::query_as::<_, AggregateRow>(&sql)
                    .bind(shop)
                    .bind(window.from)
                    .bind(window.to)
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows.into_iter().map(InteractionAggregate::from).collect())
    }

    /// Shop-wide totals across all matching aggregates.
    pub async fn summarize(
        &self,
        shop: &str,
        window: &DateWindow,
    ) -> Result<ShopSummary, StoreError> {
        let totals: (i64, i64, i64, i64, i64) = self
            .guard(
                sqlx::query_as(
                    r#"
                    SELECT
                        COUNT(*),
                        COALESCE(SUM(center_view_count), 0)::BIGINT,
                        COALESCE(SUM(variation_view_count), 0)::BIGINT,
                        COALESCE(SUM(add_to_cart_count), 0)::BIGINT,
                        COALESCE(SUM(total_interactions), 0)::BIGINT
                    FROM product_interactions
                    WHERE shop = $1
                      AND ($2::timestamptz IS NULL OR last_updated >= $2)
                      AND ($3::timestamptz IS NULL OR last_updated <= $3)
                    "#,
                )
                .bind(shop)
                .bind(window.from)
                .bind(window.to)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(ShopSummary {
            total_products: totals.0,
            total_center_views: totals.1,
            total_variation_views: totals.2,
            total_add_to_cart: totals.3,
            total_all_interactions: totals.4,
        })
    }
}
