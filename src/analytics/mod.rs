//! Aggregation Engine
//!
//! Read-side views over the interaction store: shop-wide summaries, top-N
//! rankings, conversion rates, and recency-bounded activity feeds. Every
//! call is a pure function of current store contents plus its parameters;
//! nothing here holds state or writes.
//!
//! Reads are not isolated from concurrent ingestion — a summary may mix
//! pre- and post-update aggregates. Callers get eventual consistency, not
//! a point-in-time snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{InteractionAggregate, InteractionKind};
use crate::store::{DateWindow, InteractionStore, ListQuery, SortKey, SortOrder, StoreError};

pub use crate::store::ShopSummary;

/// Timestamps merged per bucket for the shop-wide feed.
const FEED_PER_BUCKET: usize = 3;

/// Timestamps merged per bucket for a single product's detail view.
const DETAIL_PER_BUCKET: usize = 5;

/// Entries kept in a product detail's activity list.
const DETAIL_FEED_LIMIT: usize = 10;

/// Metrics a ranking can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    CenterViews,
    VariationViews,
    AddToCart,
    TotalInteractions,
}

impl RankMetric {
    fn sort_key(&self) -> SortKey {
        match self {
            Self::CenterViews => SortKey::CenterViews,
            Self::VariationViews => SortKey::VariationViews,
            Self::AddToCart => SortKey::AddToCart,
            Self::TotalInteractions => SortKey::TotalInteractions,
        }
    }
}

/// One entry in a top-N ranking. Only the ranking's own metric is
/// serialized alongside `totalInteractions` for context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProduct {
    pub product_id: String,
    pub product_name: String,
    pub product_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_views: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_views: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_to_cart: Option<i64>,
    pub total_interactions: i64,
}

impl RankedProduct {
    fn new(aggregate: &InteractionAggregate, metric: RankMetric) -> Self {
        let mut ranked = Self {
            product_id: aggregate.product_id.clone(),
            product_name: aggregate.product_name.clone(),
            product_image: aggregate.product_image.clone(),
            center_views: None,
            variation_views: None,
            add_to_cart: None,
            total_interactions: aggregate.total_interactions,
        };

        match metric {
            RankMetric::CenterViews => ranked.center_views = Some(aggregate.center_views.count),
            RankMetric::VariationViews => {
                ranked.variation_views = Some(aggregate.variation_views.count)
            }
            RankMetric::AddToCart => ranked.add_to_cart = Some(aggregate.add_to_cart.count),
            RankMetric::TotalInteractions => {}
        }

        ranked
    }
}

/// Funnel ratios derived from shop totals.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRates {
    pub center_to_variation: f64,
    pub variation_to_cart: f64,
    pub center_to_cart: f64,
}

/// One timestamped interaction in the shop-wide activity feed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub product_id: String,
    pub product_name: String,
    pub interaction_type: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Bucket counts as exposed on listings and detail views.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewCounts {
    pub center_views: i64,
    pub variation_views: i64,
    pub add_to_cart: i64,
    pub total_views: i64,
}

impl From<&InteractionAggregate> for ViewCounts {
    fn from(aggregate: &InteractionAggregate) -> Self {
        Self {
            center_views: aggregate.center_views.count,
            variation_views: aggregate.variation_views.count,
            add_to_cart: aggregate.add_to_cart.count,
            total_views: aggregate.total_interactions,
        }
    }
}

/// Share of each interaction kind within one product's total.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRates {
    pub center_view_rate: f64,
    pub variation_view_rate: f64,
    pub add_to_cart_rate: f64,
}

/// One timestamped interaction in a single product's activity list.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductActivityEntry {
    pub interaction_type: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Full per-product analytics view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    pub product_id: String,
    pub product_name: String,
    pub product_image: String,
    pub view_counts: ViewCounts,
    pub interaction_rates: InteractionRates,
    pub recent_activity: Vec<ProductActivityEntry>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ProductDetail {
    fn from_aggregate(aggregate: &InteractionAggregate) -> Self {
        let total = aggregate.total_interactions;

        let mut recent: Vec<ProductActivityEntry> = Vec::new();
        for kind in InteractionKind::ALL {
            for &timestamp in aggregate.bucket(kind).recent(DETAIL_PER_BUCKET) {
                recent.push(ProductActivityEntry {
                    interaction_type: kind.as_wire(),
                    timestamp,
                });
            }
        }
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(DETAIL_FEED_LIMIT);

        Self {
            product_id: aggregate.product_id.clone(),
            product_name: aggregate.product_name.clone(),
            product_image: aggregate.product_image.clone(),
            view_counts: ViewCounts::from(aggregate),
            interaction_rates: InteractionRates {
                center_view_rate: percentage(aggregate.center_views.count, total),
                variation_view_rate: percentage(aggregate.variation_views.count, total),
                add_to_cart_rate: percentage(aggregate.add_to_cart.count, total),
            },
            recent_activity: recent,
            last_updated: aggregate.last_updated,
            created_at: aggregate.created_at,
        }
    }
}

/// One product row in the paginated listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListing {
    pub product_id: String,
    pub product_name: String,
    pub product_image: String,
    pub view_counts: ViewCounts,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&InteractionAggregate> for ProductListing {
    fn from(aggregate: &InteractionAggregate) -> Self {
        Self {
            product_id: aggregate.product_id.clone(),
            product_name: aggregate.product_name.clone(),
            product_image: aggregate.product_image.clone(),
            view_counts: ViewCounts::from(aggregate),
            last_updated: aggregate.last_updated,
            created_at: aggregate.created_at,
        }
    }
}

/// `numerator / denominator` as a percentage rounded to 2 decimals, 0 when
/// the denominator is 0.
fn percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        round2(numerator as f64 / denominator as f64 * 100.0)
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Funnel ratios from shop totals: center → variation → cart.
///
/// The three counters are independent (a variation viewer need not have
/// center-viewed first), so these are ratio approximations, not cohort
/// conversion. No session identity exists in the data model to support a
/// true funnel trace.
pub fn conversion_rates(summary: &ShopSummary) -> ConversionRates {
    ConversionRates {
        center_to_variation: percentage(summary.total_variation_views, summary.total_center_views),
        variation_to_cart: percentage(summary.total_add_to_cart, summary.total_variation_views),
        center_to_cart: percentage(summary.total_add_to_cart, summary.total_center_views),
    }
}

/// K-way merge of each aggregate's most recent `per_bucket` timestamps per
/// kind into a single feed, newest first, truncated to `limit`.
///
/// Candidate count is bounded by 3 * per_bucket * aggregates before the
/// truncation, independent of how many events a product has ever seen.
pub fn merge_recent_activity(
    aggregates: &[InteractionAggregate],
    per_bucket: usize,
    limit: usize,
) -> Vec<ActivityEntry> {
    let mut entries: Vec<ActivityEntry> = Vec::new();

    for aggregate in aggregates {
        for kind in InteractionKind::ALL {
            for &timestamp in aggregate.bucket(kind).recent(per_bucket) {
                entries.push(ActivityEntry {
                    product_id: aggregate.product_id.clone(),
                    product_name: aggregate.product_name.clone(),
                    interaction_type: kind.as_wire(),
                    timestamp,
                });
            }
        }
    }

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries.truncate(limit);
    entries
}

/// Read-side analytics over the interaction store for one shop.
pub struct AnalyticsEngine {
    store: InteractionStore,
}

impl AnalyticsEngine {
    pub fn new(store: InteractionStore) -> Self {
        Self { store }
    }

    /// Shop-wide totals across all aggregates in the window.
    pub async fn summary(
        &self,
        shop: &str,
        window: &DateWindow,
    ) -> Result<ShopSummary, StoreError> {
        self.store.summarize(shop, window).await
    }

    /// Top `limit` products by a metric, descending, insertion-order ties.
    pub async fn top_products(
        &self,
        shop: &str,
        window: &DateWindow,
        metric: RankMetric,
        limit: i64,
    ) -> Result<Vec<RankedProduct>, StoreError> {
        let query = ListQuery {
            sort: metric.sort_key(),
            order: SortOrder::Desc,
            limit,
            offset: 0,
            window: *window,
        };

        let (aggregates, _) = self.store.list(shop, &query).await?;

        Ok(aggregates
            .iter()
            .map(|aggregate| RankedProduct::new(aggregate, metric))
            .collect())
    }

    /// Shop-wide recent activity feed, newest first, at most `limit`
    /// entries.
    pub async fn recent_activity(
        &self,
        shop: &str,
        window: &DateWindow,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let aggregates = self.store.list_window(shop, window).await?;
        Ok(merge_recent_activity(&aggregates, FEED_PER_BUCKET, limit))
    }

    /// Full analytics view for one product, or None if it has never been
    /// interacted with.
    pub async fn product_detail(
        &self,
        shop: &str,
        product_id: &str,
    ) -> Result<Option<ProductDetail>, StoreError> {
        let aggregate = self.store.get(shop, product_id).await?;
        Ok(aggregate.as_ref().map(ProductDetail::from_aggregate))
    }
}
