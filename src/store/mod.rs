//! Interaction Store
//!
//! Durable, keyed storage of interaction aggregates with atomic fold
//! operations.

pub mod error;
pub mod repository;

pub use error::StoreError;
pub use repository::{
    DateWindow, InteractionStore, ListQuery, ShopSummary, SortKey, SortOrder, TIMESTAMP_CAP,
};
