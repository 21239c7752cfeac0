//! Load Testing Tool
//!
//! Run with: cargo run --bin load_test --release -- --events 1000

use std::time::Instant;

use sqlx::postgres::PgPoolOptions;

use carousel_analytics::domain::InteractionKind;
use carousel_analytics::store::{InteractionStore, StoreError};

fn arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let event_count: u64 = arg_value(&args, "--events")
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let product_count: u64 = arg_value(&args, "--products")
        .and_then(|s| s.parse().ok())
        .unwrap_or(25);
    let shop = arg_value(&args, "--shop")
        .unwrap_or_else(|| "load-test.myshopify.com".to_string());

    let database_url = std::env::var("DATABASE_URL")?;

    println!("Load Test - Applying {} events across {} products", event_count, product_count);
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    let store = InteractionStore::new(pool.clone());

    let start = Instant::now();
    let mut success_count = 0u64;

    for i in 0..event_count {
        let product_id = format!("P{}", i % product_count);
        let kind = InteractionKind::ALL[(i % 3) as usize];
        let now = chrono::Utc::now();

        let result: Result<(), StoreError> = async {
            store.ensure_aggregate(&shop, &product_id).await?;
            store
                .apply_event(
                    &shop,
                    &product_id,
                    kind,
                    1,
                    &[now],
                    &format!("Product {}", product_id),
                    "",
                )
                .await
        }
        .await;

        if result.is_ok() {
            success_count += 1;
        }

        if (i + 1) % 1000 == 0 {
            println!("Applied {} events...", i + 1);
        }
    }

    let elapsed = start.elapsed();
    let rate = success_count as f64 / elapsed.as_secs_f64();

    println!("\n=== Load Test Results ===");
    println!("Total events: {}", event_count);
    println!("Successful: {}", success_count);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Rate: {:.0} events/sec", rate);

    // Verify the count invariant over everything we just wrote
    let rows: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT product_id, center_view_count, variation_view_count,
               add_to_cart_count, total_interactions
        FROM product_interactions
        WHERE shop = $1
        "#,
    )
    .bind(&shop)
    .fetch_all(&pool)
    .await?;

    let violations = rows
        .iter()
        .filter(|(_, center, variation, cart, total)| center + variation + cart != *total)
        .count();

    println!("Aggregates: {}", rows.len());
    println!("Count invariant violations: {}", violations);

    Ok(())
}
