//! Ingestion Service
//!
//! Validates a tracking batch for one shop and folds each event into its
//! aggregate. Validation is all-or-nothing and runs before any write; once
//! processing starts, a store fault on one event is recorded in the report
//! and does not abort its siblings.
//!
//! Redelivering a batch increments counts again — exactly-once delivery is
//! the responsibility of the widget producing the events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{InteractionCounts, InteractionEvent, InteractionKind};
use crate::error::AppError;
use crate::store::{InteractionStore, StoreError};

/// Raw tracking batch as posted by the storefront widget.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub interactions: Option<Vec<InteractionEvent>>,
}

/// An event that passed validation, with defaults applied.
#[derive(Debug, Clone)]
struct ValidEvent {
    product_id: String,
    product_name: String,
    product_image: String,
    kind: InteractionKind,
    count: i64,
    timestamps: Vec<DateTime<Utc>>,
}

/// Batch outcome. `processed` counts every attempted event; an event that
/// hits a store fault lands in `failed` and leaves no entry in
/// `product_counts`.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub processed: u64,
    pub updated: u64,
    pub created: u64,
    pub failed: u64,
    pub product_counts: BTreeMap<String, InteractionCounts>,
}

/// Applies tracking batches against the interaction store.
pub struct IngestionService {
    store: InteractionStore,
}

impl IngestionService {
    pub fn new(store: InteractionStore) -> Self {
        Self { store }
    }

    /// Validate and apply one batch.
    pub async fn ingest(&self, request: TrackRequest) -> Result<IngestReport, AppError> {
        let (shop, events) = validate(request)?;

        let mut report = IngestReport::default();

        // Sequential in submission order: per-key ordering within a batch
        // follows the submitted order, cross-key concurrency comes from
        // concurrent requests.
        for event in &events {
            report.processed += 1;

            match self.apply(&shop, event).await {
                Ok((created, counts)) => {
                    if created {
                        report.created += 1;
                    } else {
                        report.updated += 1;
                    }
                    if let Some(counts) = counts {
                        report.product_counts.insert(event.product_id.clone(), counts);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        shop = %shop,
                        product_id = %event.product_id,
                        error = %err,
                        "Failed to apply interaction event"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Fold one event: create the aggregate if this is the first sighting,
    /// then apply the atomic update and snapshot the resulting counts.
    async fn apply(
        &self,
        shop: &str,
        event: &ValidEvent,
    ) -> Result<(bool, Option<InteractionCounts>), StoreError> {
        let created = self.store.ensure_aggregate(shop, &event.product_id).await?;

        self.store
            .apply_event(
                shop,
                &event.product_id,
                event.kind,
                event.count,
                &event.timestamps,
                &event.product_name,
                &event.product_image,
            )
            .await?;

        let counts = self
            .store
            .get(shop, &event.product_id)
            .await?
            .map(|aggregate| aggregate.counts());

        Ok((created, counts))
    }
}

/// Batch-level and per-event validation. Any violation fails the whole
/// batch before a single write happens.
fn validate(request: TrackRequest) -> Result<(String, Vec<ValidEvent>), AppError> {
    let interactions = match request.interactions {
        Some(list) if !list.is_empty() => list,
        _ => {
            return Err(AppError::InvalidRequest(
                "interactions array is required and must not be empty".to_string(),
            ));
        }
    };

    let shop = match request.shop {
        Some(shop) if !shop.is_empty() => shop,
        _ => {
            return Err(AppError::InvalidRequest(
                "shop parameter is required".to_string(),
            ));
        }
    };

    let now = Utc::now();
    let events = interactions
        .into_iter()
        .map(|event| validate_event(event, now))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((shop, events))
}

fn validate_event(event: InteractionEvent, now: DateTime<Utc>) -> Result<ValidEvent, AppError> {
    let (product_id, product_name, interaction_type) = match (
        non_empty(event.product_id),
        non_empty(event.product_name),
        non_empty(event.interaction_type),
    ) {
        (Some(id), Some(name), Some(kind)) => (id, name, kind),
        _ => {
            return Err(AppError::InvalidInteraction(
                "productId, productName, and interactionType are required".to_string(),
            ));
        }
    };

    let kind = InteractionKind::from_wire(&interaction_type)
        .ok_or(AppError::InvalidInteractionType(interaction_type))?;

    let count = event.count.unwrap_or(1);
    if count < 1 {
        return Err(AppError::InvalidInteraction(
            "count must be a positive integer".to_string(),
        ));
    }

    let timestamps = match event.timestamps {
        Some(timestamps) if !timestamps.is_empty() => timestamps,
        _ => vec![now],
    };

    Ok(ValidEvent {
        product_id,
        product_name,
        product_image: event.product_image.unwrap_or_default(),
        kind,
        count,
        timestamps,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(product_id: &str, name: &str, kind: &str) -> InteractionEvent {
        InteractionEvent {
            product_id: Some(product_id.to_string()),
            product_name: Some(name.to_string()),
            product_image: None,
            interaction_type: Some(kind.to_string()),
            count: None,
            timestamps: None,
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: Some(vec![event("P1", "Shirt", "center_view")]),
        };

        let (shop, events) = validate(request).unwrap();
        assert_eq!(shop, "s1.myshopify.com");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, InteractionKind::CenterView);
        assert_eq!(events[0].count, 1);
        assert_eq!(events[0].timestamps.len(), 1);
        assert_eq!(events[0].product_image, "");
    }

    #[test]
    fn test_validate_rejects_missing_shop() {
        let request = TrackRequest {
            shop: None,
            interactions: Some(vec![event("P1", "Shirt", "center_view")]),
        };

        let err = validate(request).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert!(err.to_string().contains("shop"));
    }

    #[test]
    fn test_validate_rejects_empty_batch() {
        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: Some(vec![]),
        };
        assert!(matches!(
            validate(request),
            Err(AppError::InvalidRequest(_))
        ));

        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: None,
        };
        assert!(matches!(
            validate(request),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_event_fields() {
        let mut incomplete = event("P1", "Shirt", "center_view");
        incomplete.interaction_type = None;

        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: Some(vec![event("P2", "Hat", "add_to_cart"), incomplete]),
        };

        // One bad event fails the whole batch.
        let err = validate(request).unwrap_err();
        assert!(matches!(err, AppError::InvalidInteraction(_)));
    }

    #[test]
    fn test_validate_rejects_unknown_interaction_type() {
        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: Some(vec![event("P1", "Shirt", "drag")]),
        };

        let err = validate(request).unwrap_err();
        assert!(matches!(err, AppError::InvalidInteractionType(_)));
        assert!(err.to_string().contains("drag"));
    }

    #[test]
    fn test_validate_rejects_non_positive_count() {
        let mut zero_count = event("P1", "Shirt", "center_view");
        zero_count.count = Some(0);

        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: Some(vec![zero_count]),
        };

        assert!(matches!(
            validate(request),
            Err(AppError::InvalidInteraction(_))
        ));
    }

    #[test]
    fn test_supplied_timestamps_are_kept() {
        let ts = "2026-08-01T12:00:00Z".parse().unwrap();
        let mut with_ts = event("P1", "Shirt", "variation_view");
        with_ts.count = Some(2);
        with_ts.timestamps = Some(vec![ts, ts]);

        let request = TrackRequest {
            shop: Some("s1.myshopify.com".to_string()),
            interactions: Some(vec![with_ts]),
        };

        let (_, events) = validate(request).unwrap();
        assert_eq!(events[0].count, 2);
        assert_eq!(events[0].timestamps, vec![ts, ts]);
    }
}
