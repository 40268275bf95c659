//! Domain Layer - Market data vocabulary and subscription types.
//!
//! Pure types with serialization support and no I/O.

/// Candle intervals, trading statuses and depth bounds.
pub mod market;

/// Subscription requests and their local validation.
pub mod subscription;
