//! Interaction domain types
//!
//! The per-(shop, product) aggregate record and the transient event shape
//! submitted by the storefront widget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of interaction kinds the carousel widget reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    /// Product spun into the carousel center slot
    CenterView,
    /// Variation picker opened / variation image viewed
    VariationView,
    /// Add-to-cart pressed from the carousel
    AddToCart,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [
        InteractionKind::CenterView,
        InteractionKind::VariationView,
        InteractionKind::AddToCart,
    ];

    /// Parse the wire name used by the widget's tracking payloads.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "center_view" => Some(Self::CenterView),
            "variation_view" => Some(Self::VariationView),
            "add_to_cart" => Some(Self::AddToCart),
            _ => None,
        }
    }

    /// Wire name, as emitted in activity feeds.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::CenterView => "center_view",
            Self::VariationView => "variation_view",
            Self::AddToCart => "add_to_cart",
        }
    }
}

/// One interaction kind's accumulator within an aggregate.
///
/// `count` is monotone non-decreasing; `timestamps` is append-only from the
/// caller's point of view (storage trims to a recency cap, see the store).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBucket {
    pub count: i64,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl MetricBucket {
    /// The most recent `n` timestamps, oldest first.
    ///
    /// Timestamps are stored in append order, so the tail is the recent end.
    pub fn recent(&self, n: usize) -> &[DateTime<Utc>] {
        let start = self.timestamps.len().saturating_sub(n);
        &self.timestamps[start..]
    }
}

/// The per-(shop, product) accumulator record.
///
/// Invariant: `total_interactions` equals the sum of the three bucket
/// counts. The store maintains it in the same atomic statement that bumps a
/// bucket, so readers may rely on it without re-summing.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionAggregate {
    pub shop: String,
    pub product_id: String,
    pub product_name: String,
    pub product_image: String,
    pub center_views: MetricBucket,
    pub variation_views: MetricBucket,
    pub add_to_cart: MetricBucket,
    pub total_interactions: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl InteractionAggregate {
    /// Bucket for a given interaction kind.
    pub fn bucket(&self, kind: InteractionKind) -> &MetricBucket {
        match kind {
            InteractionKind::CenterView => &self.center_views,
            InteractionKind::VariationView => &self.variation_views,
            InteractionKind::AddToCart => &self.add_to_cart,
        }
    }

    /// Snapshot of the bucket counts, as reported back to the widget after
    /// an ingestion batch.
    pub fn counts(&self) -> InteractionCounts {
        InteractionCounts {
            center_views: self.center_views.count,
            variation_views: self.variation_views.count,
            add_to_cart: self.add_to_cart.count,
            total_interactions: self.total_interactions,
        }
    }
}

/// Post-update bucket counts for one product.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCounts {
    pub center_views: i64,
    pub variation_views: i64,
    pub add_to_cart: i64,
    pub total_interactions: i64,
}

/// One raw interaction event as submitted by the widget.
///
/// Every field is optional at the serde layer so that a malformed event is
/// rejected by ingestion validation with the structured error envelope
/// instead of a framework-level deserialization failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_image: Option<String>,
    #[serde(default)]
    pub interaction_type: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub timestamps: Option<Vec<DateTime<Utc>>>,
}
