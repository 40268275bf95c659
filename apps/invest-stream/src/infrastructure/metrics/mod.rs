//! Prometheus Metrics Module
//!
//! Counters for the streaming client. Recording is a no-op until
//! [`init_metrics`] installs a recorder.
//!
//! # Metrics
//!
//! - `invest_stream_frames_received_total{frame}`
//! - `invest_stream_events_dispatched_total{event}`
//! - `invest_stream_frames_dropped_total{reason}`
//! - `invest_stream_control_frames_sent_total{action}`
//! - `invest_stream_connect_failures_total{reason}`

use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

fn register_metrics() {
    describe_counter!(
        "invest_stream_frames_received_total",
        "Total WebSocket frames read from the market data stream"
    );
    describe_counter!(
        "invest_stream_events_dispatched_total",
        "Total typed events handed to the event handler"
    );
    describe_counter!(
        "invest_stream_frames_dropped_total",
        "Total frames dropped because they could not be decoded"
    );
    describe_counter!(
        "invest_stream_control_frames_sent_total",
        "Total subscribe/unsubscribe frames written"
    );
    describe_counter!(
        "invest_stream_connect_failures_total",
        "Total failed connection attempts"
    );
}

/// Metric labels for WebSocket frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
    /// Close control frame.
    Close,
    /// Raw frame.
    Other,
}

impl FrameType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Close => "close",
            Self::Other => "other",
        }
    }
}

/// Record a frame read from the socket.
pub fn record_frame_received(frame: FrameType) {
    counter!(
        "invest_stream_frames_received_total",
        "frame" => frame.as_str()
    )
    .increment(1);
}

/// Record an event delivered to the handler.
pub fn record_event_dispatched(event: &'static str) {
    counter!(
        "invest_stream_events_dispatched_total",
        "event" => event
    )
    .increment(1);
}

/// Record a frame dropped by the decoder.
pub fn record_frame_dropped(reason: &'static str) {
    counter!(
        "invest_stream_frames_dropped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record a control frame written to the socket.
pub fn record_control_frame_sent(action: &'static str) {
    counter!(
        "invest_stream_control_frames_sent_total",
        "action" => action
    )
    .increment(1);
}

/// Record a failed connection attempt.
pub fn record_connect_failure(reason: &'static str) {
    counter!(
        "invest_stream_connect_failures_total",
        "reason" => reason
    )
    .increment(1);
}
