//! Domain module
//!
//! Core types for product interaction tracking.

pub mod interaction;

pub use interaction::{
    InteractionAggregate, InteractionCounts, InteractionEvent, InteractionKind, MetricBucket,
};
