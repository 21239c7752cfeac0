//! Interaction Store error types

use thiserror::Error;

/// Errors from the interaction store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistence layer could not be reached. Retryable by the caller;
    /// the store itself never retries.
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// The per-call duration bound elapsed before the statement completed.
    #[error("Store unavailable: operation timed out")]
    Timeout,

    /// An update targeted a (shop, product) key with no aggregate row.
    /// Callers are expected to `ensure_aggregate` first.
    #[error("No aggregate for product {product_id} in shop {shop}")]
    AggregateMissing { shop: String, product_id: String },
}

impl StoreError {
    /// Whether retrying the whole request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}
