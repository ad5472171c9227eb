//! Courier - fetch resources through a multiplexed WebSocket transport

use clap::Parser;
use futures_util::future::join_all;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::{
    activity::LogIndicator, config::Args, CacheTier, RequestSpec, TransportBuilder,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("courier={},info", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = args.transport_config();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let tier: CacheTier = match args.cache.parse() {
        Ok(tier) => tier,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  Courier");
    info!("======================================");
    info!("Endpoint: {}", config.endpoint);
    info!("Fallback: {}", config.fallback_base_url);
    info!("Max in flight: {}", config.max_in_flight);
    info!("Cache tier: {:?}", tier);
    info!("======================================");

    let handle = TransportBuilder::new(config)
        .indicator(LogIndicator)
        .spawn()?;

    if args.listen {
        handle.on_out_of_band(|text: &str| println!("{text}"))?;
    }

    let requests = args.keys.iter().map(|key| {
        let mut spec = RequestSpec::new(key.clone(), tier);
        if let Some(ref method) = args.method {
            spec = spec.with_method(method.clone());
        }
        if let Some(ref body) = args.body {
            spec = spec.with_body(body.clone());
        }
        let handle = handle.clone();
        async move { (spec.key.clone(), handle.fetch(spec).await) }
    });

    for (key, result) in join_all(requests).await {
        let value = result?;
        println!(
            "{}",
            serde_json::json!({ "key": key, "response": &*value })
        );
    }

    let stats = handle.stats().await?;
    info!(
        total_requests = stats.total_requests,
        frames_sent = stats.frames_sent,
        "Requests complete"
    );
    println!("{}", serde_json::to_string(&stats)?);

    if args.listen {
        info!("Listening for out-of-band messages (Ctrl+C to stop)");
        tokio::signal::ctrl_c().await?;
    }

    handle.shutdown()?;
    Ok(())
}
