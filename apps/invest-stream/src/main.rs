//! Invest Stream Demo
//!
//! Connects to the market data stream, subscribes to one instrument's status,
//! 5-minute candles and a depth-10 order book, logs every event for a while,
//! then unsubscribes and closes.
//!
//! # Usage
//!
//! ```bash
//! INVEST_TOKEN=... cargo run --bin invest-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `INVEST_TOKEN`: API token
//!
//! ## Optional
//! - `INVEST_STREAM_URL`: Stream endpoint (default: production stream)
//! - `INVEST_HANDSHAKE_TIMEOUT_SECS`: Handshake timeout (default: 5)
//! - `INVEST_PONG_DEADLINE_MS`: Pong deadline (default: 1000)
//! - `INVEST_CLOSE_GRACE_MS`: Wait for the close acknowledgement (default: 1000)
//! - `INVEST_FIGI`: Instrument to watch (default: BBG005DXJS36)
//! - `INVEST_DEMO_SECS`: How long to stay subscribed (default: 10)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use invest_stream::infrastructure::telemetry;
use invest_stream::{CandleInterval, StreamConfig, StreamEvent, StreamingClient, init_metrics};
use tokio::signal;
use uuid::Uuid;

/// Instrument watched when `INVEST_FIGI` is unset.
const DEFAULT_FIGI: &str = "BBG005DXJS36";

/// Subscription window when `INVEST_DEMO_SECS` is unset.
const DEFAULT_DEMO_DURATION: Duration = Duration::from_secs(10);

/// Order book depth requested by the demo.
const DEMO_ORDERBOOK_DEPTH: i32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting invest stream demo");

    let metrics_handle = init_metrics()?;

    let config = StreamConfig::from_env()?;
    let figi = std::env::var("INVEST_FIGI").unwrap_or_else(|_| DEFAULT_FIGI.to_string());
    let duration = demo_duration()?;

    tracing::info!(
        url = %config.url(),
        figi = %figi,
        duration_secs = duration.as_secs(),
        "Configuration loaded"
    );

    let client = Arc::new(StreamingClient::connect(config).await?);

    let reader = Arc::clone(&client);
    let read_loop = tokio::spawn(async move {
        reader
            .run_read_loop(|event| {
                log_event(&event);
                Ok::<(), Infallible>(())
            })
            .await
    });

    client
        .subscribe_instrument_info(&figi, &request_id())
        .await?;
    client
        .subscribe_candle(&figi, CandleInterval::FiveMinutes, &request_id())
        .await?;
    client
        .subscribe_orderbook(&figi, DEMO_ORDERBOOK_DEPTH, &request_id())
        .await?;

    tokio::select! {
        () = tokio::time::sleep(duration) => {
            tracing::info!("Demo window elapsed");
        }
        () = await_shutdown() => {}
    }

    client
        .unsubscribe_instrument_info(&figi, &request_id())
        .await?;
    client
        .unsubscribe_candle(&figi, CandleInterval::FiveMinutes, &request_id())
        .await?;
    client
        .unsubscribe_orderbook(&figi, DEMO_ORDERBOOK_DEPTH, &request_id())
        .await?;

    client.close().await?;

    match read_loop.await {
        Ok(Err(e)) => tracing::info!(reason = %e, "Read loop stopped"),
        Ok(Ok(())) => {}
        Err(e) => tracing::error!(error = %e, "Read loop task failed"),
    }

    tracing::debug!(metrics = %metrics_handle.render(), "Final metrics");

    tracing::info!("Invest stream demo stopped");
    Ok(())
}

fn request_id() -> String {
    Uuid::new_v4().to_string()
}

fn demo_duration() -> anyhow::Result<Duration> {
    match std::env::var("INVEST_DEMO_SECS") {
        Ok(value) => value
            .parse()
            .map(Duration::from_secs)
            .with_context(|| format!("INVEST_DEMO_SECS must be whole seconds, got {value:?}")),
        Err(_) => Ok(DEFAULT_DEMO_DURATION),
    }
}

fn log_event(event: &StreamEvent) {
    let time = event.time();
    match event {
        StreamEvent::Candle(e) => tracing::info!(
            figi = %e.candle.figi,
            interval = %e.candle.interval,
            open = %e.candle.open,
            close = %e.candle.close,
            volume = %e.candle.volume,
            time = %time,
            "Candle"
        ),
        StreamEvent::OrderBook(e) => tracing::info!(
            figi = %e.order_book.figi,
            best_bid = ?e.order_book.bids.first().map(|l| l.price()),
            best_ask = ?e.order_book.asks.first().map(|l| l.price()),
            time = %time,
            "Order book"
        ),
        StreamEvent::InstrumentInfo(e) => tracing::info!(
            figi = %e.info.figi,
            status = ?e.info.trade_status,
            trading = e.info.trade_status.is_trading(),
            time = %time,
            "Instrument info"
        ),
        StreamEvent::Error(e) => tracing::warn!(
            request_id = ?e.request_id(),
            error = %e.error.error,
            time = %time,
            "Server rejected request"
        ),
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Can't listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Can't listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
