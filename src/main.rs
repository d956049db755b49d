//! Civipay Webhook Daemon
//!
//! Verifies payment provider webhook deliveries and reconciles donation,
//! membership, and shop purchase records.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use civipay::config::AppConfig;
use civipay::handlers::AppState;
use civipay::notify::{HttpNotifier, LogNotifier, Notifier};
use civipay::provider::{DisabledSubscriptionFetcher, HttpProviderClient, SubscriptionFetcher};
use civipay::reconcile::Reconciler;
use civipay::server::{build_router, serve};
use civipay::store::MemoryStore;
use civipay::webhook::handler::WebhookState;
use civipay::webhook::idempotency::InMemoryIdempotencyStore;
use civipay::webhook::signature::SignatureVerifier;

/// Civipay Webhook Daemon
#[derive(Parser, Debug)]
#[command(name = "civipayd")]
#[command(author = "Civipay Maintainers <dev@civipay.org>")]
#[command(version)]
#[command(about = "Payment webhook reconciliation daemon")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8787")]
    port: u16,

    /// Host to bind to (overrides CIVIPAY_BIND_ALL)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over the verbosity flag when both are set
    let default_filter = if args.verbose {
        "civipay=debug,info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let addr = match &args.host {
        Some(host) => SocketAddr::new(
            host.parse()
                .with_context(|| format!("invalid host: {host}"))?,
            args.port,
        ),
        None => config.socket_addr(args.port),
    };

    info!(version = civipay::VERSION, %addr, "starting civipayd");

    let store = Arc::new(MemoryStore::new());

    let subscriptions: Arc<dyn SubscriptionFetcher> = match config.provider_api_key() {
        Some(key) => Arc::new(
            HttpProviderClient::new(config.provider_base_url.clone(), key.to_string())
                .context("building provider client")?,
        ),
        None => {
            warn!("no provider API key configured, subscription detail fetch is disabled");
            Arc::new(DisabledSubscriptionFetcher)
        }
    };

    let notifier: Arc<dyn Notifier> = match (config.resend_api_key(), config.notify_from.as_deref())
    {
        (Some(key), Some(from)) => Arc::new(
            HttpNotifier::new(key.to_string(), from.to_string()).context("building mail client")?,
        ),
        _ => Arc::new(LogNotifier),
    };

    let reconciler = Arc::new(Reconciler::new(
        store,
        subscriptions,
        notifier,
        config.free_tier.clone(),
    ));

    let metrics = Arc::new(AppState::new());
    let webhook_state = Arc::new(WebhookState::new(
        SignatureVerifier::new(config.webhook_secret(), config.signature_tolerance_secs),
        Arc::new(InMemoryIdempotencyStore::default()),
        reconciler,
        Arc::clone(&metrics),
    ));

    let app = build_router(webhook_state, metrics);
    serve(app, addr).await?;

    Ok(())
}
