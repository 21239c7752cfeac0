//! Interaction Store Integration Tests
//!
//! Exercise the atomic fold operations against a real database, including
//! the concurrency properties the store is built around.

use chrono::{Duration as ChronoDuration, SubsecRound, Utc};

use carousel_analytics::domain::InteractionKind;
use carousel_analytics::store::{
    DateWindow, InteractionStore, ListQuery, SortKey, SortOrder, StoreError, TIMESTAMP_CAP,
};

mod common;

#[tokio::test]
async fn test_concurrent_apply_event_loses_no_updates() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("concurrent-apply");

    store.ensure_aggregate(&shop, "P1").await.unwrap();

    const WRITERS: i64 = 32;
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let store = store.clone();
        let shop = shop.clone();
        handles.push(tokio::spawn(async move {
            store
                .apply_event(
                    &shop,
                    "P1",
                    InteractionKind::CenterView,
                    1,
                    &[Utc::now()],
                    "Shirt",
                    "",
                )
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let aggregate = store.get(&shop, "P1").await.unwrap().unwrap();
    assert_eq!(aggregate.center_views.count, WRITERS, "lost updates detected");
    assert_eq!(aggregate.total_interactions, WRITERS);
    assert_eq!(aggregate.center_views.timestamps.len(), WRITERS as usize);
}

#[tokio::test]
async fn test_concurrent_ensure_creates_exactly_one_aggregate() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("concurrent-ensure");

    const CREATORS: usize = 16;
    let mut handles = Vec::new();
    for _ in 0..CREATORS {
        let store = store.clone();
        let shop = shop.clone();
        handles.push(tokio::spawn(
            async move { store.ensure_aggregate(&shop, "P1").await },
        ));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            created += 1;
        }
    }

    assert_eq!(created, 1, "exactly one creator must win");

    let aggregate = store.get(&shop, "P1").await.unwrap().unwrap();
    assert_eq!(aggregate.center_views.count, 0);
    assert_eq!(aggregate.variation_views.count, 0);
    assert_eq!(aggregate.add_to_cart.count, 0);
    assert_eq!(aggregate.total_interactions, 0);

    let (items, total) = store.list(&shop, &ListQuery::default()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_ensure_never_overwrites_an_incremented_aggregate() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("ensure-noop");

    assert!(store.ensure_aggregate(&shop, "P1").await.unwrap());
    store
        .apply_event(&shop, "P1", InteractionKind::AddToCart, 3, &[Utc::now()], "Shirt", "")
        .await
        .unwrap();

    // A late creator must be a no-op, not a zero-initialization.
    assert!(!store.ensure_aggregate(&shop, "P1").await.unwrap());

    let aggregate = store.get(&shop, "P1").await.unwrap().unwrap();
    assert_eq!(aggregate.add_to_cart.count, 3);
    assert_eq!(aggregate.total_interactions, 3);
}

#[tokio::test]
async fn test_total_always_matches_bucket_sum() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("invariant");

    store.ensure_aggregate(&shop, "P1").await.unwrap();

    let events = [
        (InteractionKind::CenterView, 4),
        (InteractionKind::VariationView, 2),
        (InteractionKind::AddToCart, 1),
        (InteractionKind::CenterView, 5),
        (InteractionKind::VariationView, 1),
    ];
    for (kind, count) in events {
        store
            .apply_event(&shop, "P1", kind, count, &[Utc::now()], "Shirt", "")
            .await
            .unwrap();
    }

    let aggregate = store.get(&shop, "P1").await.unwrap().unwrap();
    assert_eq!(
        aggregate.total_interactions,
        aggregate.center_views.count
            + aggregate.variation_views.count
            + aggregate.add_to_cart.count
    );
    assert_eq!(aggregate.center_views.count, 9);
    assert_eq!(aggregate.variation_views.count, 3);
    assert_eq!(aggregate.add_to_cart.count, 1);
}

#[tokio::test]
async fn test_apply_event_refreshes_display_cache() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("display-cache");

    store.ensure_aggregate(&shop, "P1").await.unwrap();
    store
        .apply_event(&shop, "P1", InteractionKind::CenterView, 1, &[Utc::now()], "Old Name", "old.png")
        .await
        .unwrap();
    store
        .apply_event(&shop, "P1", InteractionKind::CenterView, 1, &[Utc::now()], "New Name", "new.png")
        .await
        .unwrap();

    // Last write wins on the denormalized display fields.
    let aggregate = store.get(&shop, "P1").await.unwrap().unwrap();
    assert_eq!(aggregate.product_name, "New Name");
    assert_eq!(aggregate.product_image, "new.png");
}

#[tokio::test]
async fn test_apply_event_without_aggregate_errors() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("missing-aggregate");

    let result = store
        .apply_event(&shop, "P1", InteractionKind::CenterView, 1, &[Utc::now()], "Shirt", "")
        .await;

    assert!(matches!(result, Err(StoreError::AggregateMissing { .. })));
}

#[tokio::test]
async fn test_list_sorting_ties_and_pagination() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("sorting");

    // A and B tie on center views; A was inserted first.
    for (product_id, center_count) in [("A", 5), ("B", 5), ("C", 2)] {
        store.ensure_aggregate(&shop, product_id).await.unwrap();
        store
            .apply_event(
                &shop,
                product_id,
                InteractionKind::CenterView,
                center_count,
                &[Utc::now()],
                product_id,
                "",
            )
            .await
            .unwrap();
    }

    let query = ListQuery {
        sort: SortKey::CenterViews,
        order: SortOrder::Desc,
        limit: 2,
        offset: 0,
        window: DateWindow::none(),
    };
    let (page, total) = store.list(&shop, &query).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].product_id, "A");
    assert_eq!(page[1].product_id, "B");

    let (page, _) = store.list(&shop, &ListQuery { offset: 2, ..query }).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].product_id, "C");

    let (page, _) = store
        .list(
            &shop,
            &ListQuery {
                order: SortOrder::Asc,
                limit: 10,
                offset: 0,
                ..query
            },
        )
        .await
        .unwrap();
    assert_eq!(
        page.iter().map(|a| a.product_id.as_str()).collect::<Vec<_>>(),
        vec!["C", "A", "B"]
    );
}

#[tokio::test]
async fn test_window_filters_on_last_updated() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("window");

    store.ensure_aggregate(&shop, "P1").await.unwrap();
    store
        .apply_event(&shop, "P1", InteractionKind::CenterView, 1, &[Utc::now()], "P1", "")
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    store.ensure_aggregate(&shop, "P2").await.unwrap();
    store
        .apply_event(&shop, "P2", InteractionKind::CenterView, 1, &[Utc::now()], "P2", "")
        .await
        .unwrap();

    // Use the stored update times as the boundary to stay clock-skew free.
    let p2_updated = store.get(&shop, "P2").await.unwrap().unwrap().last_updated;

    let window = DateWindow {
        from: Some(p2_updated),
        to: None,
    };

    let matching = store.list_window(&shop, &window).await.unwrap();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].product_id, "P2");

    let summary = store.summarize(&shop, &window).await.unwrap();
    assert_eq!(summary.total_products, 1);
    assert_eq!(summary.total_center_views, 1);

    let unbounded = store.summarize(&shop, &DateWindow::none()).await.unwrap();
    assert_eq!(unbounded.total_products, 2);
    assert_eq!(unbounded.total_all_interactions, 2);
}

#[tokio::test]
async fn test_summarize_empty_shop_is_all_zero() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("empty");

    let summary = store.summarize(&shop, &DateWindow::none()).await.unwrap();
    assert_eq!(summary.total_products, 0);
    assert_eq!(summary.total_center_views, 0);
    assert_eq!(summary.total_all_interactions, 0);
}

#[tokio::test]
async fn test_timestamp_arrays_trim_to_recency_cap() {
    let pool = common::setup_test_db().await;
    let store = InteractionStore::new(pool);
    let shop = common::unique_shop("cap");

    store.ensure_aggregate(&shop, "P1").await.unwrap();

    // Whole-second timestamps so values survive the database's microsecond
    // precision unchanged.
    let base = Utc::now().trunc_subsecs(0);
    let timestamps: Vec<_> = (0..(TIMESTAMP_CAP as i64 + 20))
        .map(|i| base + ChronoDuration::seconds(i))
        .collect();

    store
        .apply_event(
            &shop,
            "P1",
            InteractionKind::CenterView,
            timestamps.len() as i64,
            &timestamps,
            "Shirt",
            "",
        )
        .await
        .unwrap();

    let aggregate = store.get(&shop, "P1").await.unwrap().unwrap();
    // The count keeps the full total; only the timestamp history is capped,
    // keeping the most recent entries.
    assert_eq!(aggregate.center_views.count, TIMESTAMP_CAP as i64 + 20);
    assert_eq!(aggregate.center_views.timestamps.len(), TIMESTAMP_CAP);
    assert_eq!(
        aggregate.center_views.timestamps.first().copied(),
        Some(base + ChronoDuration::seconds(20))
    );
    assert_eq!(
        aggregate.center_views.timestamps.last().copied(),
        timestamps.last().copied()
    );
}
