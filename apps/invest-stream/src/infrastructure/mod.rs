//! Infrastructure Layer - Adapters and external integrations.

/// Tinkoff market data WebSocket client.
pub mod tinkoff;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing setup.
pub mod telemetry;
