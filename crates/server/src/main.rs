//! Binary entrypoint: loads configuration, wires every crate together,
//! serves the HTTP surface, and runs the hourly subscription reconciler.

mod config;
mod queue;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use flowbridge_forwarder::Forwarder;
use flowbridge_ingress::Pipeline;
use flowbridge_lifecycle::{LifecycleManager, Reconciler, TrackingStore};
use flowbridge_platform_client::{new_transport, PlatformConfig};
use flowbridge_queue_client::{HttpQueueClient, QueueClient, TenantPreset, TenantPresetTable};
use flowbridge_retry::RetryPolicy;
use flowbridge_rpc::AppState;
use flowbridge_state_store::{SqliteStateStore, StateStore};
use flowbridge_templates::{DocumentProcessor, StatusGatedProcessor, TemplateRegistry};
use flowbridge_token_cache::TokenCache;
use tracing_subscriber::EnvFilter;

use config::Config;

fn init_tracing(config: &Config) {
    let default_directive = if config.detailed_logging { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_metrics(config: &Config) -> anyhow::Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }
    let addr: std::net::SocketAddr = config
        .metrics_listen_addr
        .parse()
        .with_context(|| format!("invalid metrics listen address: {}", config.metrics_listen_addr))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing the prometheus metrics exporter")?;
    Ok(())
}

fn build_queue_client(config: &Config, http: reqwest::Client, token_cache: Arc<TokenCache>, retry_policy: RetryPolicy) -> Arc<dyn QueueClient> {
    if !config.enable_rpa {
        tracing::warn!("rpa integration disabled via configuration");
        return Arc::new(queue::DisabledQueueClient);
    }
    let mut presets = TenantPresetTable::new(Some(config.rpa_default_tenant_tag.clone()));
    presets.insert(
        config.rpa_default_tenant_tag.clone(),
        TenantPreset {
            token_endpoint: config.rpa_default_token_endpoint.clone(),
            tenant_name: config.rpa_default_tenant_name.clone(),
            base_url: config.rpa_default_tenant_endpoint.clone(),
            default_folder_id: config.rpa_default_folder_id.clone(),
            default_queue: config.rpa_default_queue.clone(),
        },
    );
    Arc::new(HttpQueueClient::new(
        http,
        config.rpa_client_id.clone(),
        config.rpa_client_secret.clone(),
        presets,
        token_cache,
        retry_policy,
    ))
}

fn open_state_store(path: &str) -> anyhow::Result<SqliteStateStore> {
    if path == ":memory:" {
        SqliteStateStore::in_memory().context("opening in-memory state store")
    } else {
        SqliteStateStore::open(path).with_context(|| format!("opening state store at {path}"))
    }
}

fn open_tracking_store(path: &str) -> anyhow::Result<TrackingStore> {
    if path == ":memory:" {
        TrackingStore::in_memory().context("opening in-memory tracking store")
    } else {
        TrackingStore::open(path).with_context(|| format!("opening tracking store at {path}"))
    }
}

/// Spawns the reconciler sweep (§4.3: renew subscriptions nearing
/// expiry, recreate any the platform has dropped) on a fixed interval.
fn spawn_reconciler(lifecycle: Arc<LifecycleManager>, renewal_window: time::Duration, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; that's the startup reconciliation pass.
        loop {
            ticker.tick().await;
            let reconciler = Reconciler::new(lifecycle.as_ref(), renewal_window);
            match reconciler.run().await {
                Ok(report) => tracing::info!(
                    renewed = report.renewed.len(),
                    renewal_failures = report.renewal_failures.len(),
                    marked_deleted = report.marked_deleted.len(),
                    tracking_records_created = report.tracking_records_created.len(),
                    "reconciler sweep completed"
                ),
                Err(error) => tracing::error!(%error, "reconciler sweep failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config);
    install_metrics(&config)?;

    let http = reqwest::Client::builder()
        .build()
        .context("building the shared reqwest client")?;
    let token_cache = Arc::new(TokenCache::new());
    let retry_policy = RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay);

    let platform_config = PlatformConfig {
        base_url: config.platform_base_url.clone(),
        token_endpoint: config.platform_token_endpoint.clone(),
        tenant_id: config.platform_tenant_id.clone(),
        client_id: config.platform_client_id.clone(),
        client_secret: config.platform_client_secret.clone(),
        retry_policy,
    };
    let (item_reader, subscription_api) = new_transport(http.clone(), platform_config, token_cache.clone());

    let tracking_store = open_tracking_store(&config.tracking_store_path)?;
    let lifecycle = Arc::new(LifecycleManager::new(Arc::new(subscription_api), tracking_store));

    let state_store = open_state_store(&config.state_store_path)?;
    let detector = flowbridge_change_detector::ChangeDetector::new(state_store);

    let registry = Arc::new(TemplateRegistry::new());
    registry.register("document", Arc::new(DocumentProcessor));
    registry.register("status-gated", Arc::new(StatusGatedProcessor));

    let queue_client = build_queue_client(&config, http.clone(), token_cache.clone(), retry_policy);
    let forwarder = Arc::new(Forwarder::new(http.clone(), retry_policy, &config.callback_base_url));

    let pipeline = Pipeline::new(
        Arc::new(item_reader),
        detector,
        registry.clone(),
        queue_client,
        forwarder,
        Some(lifecycle.clone()),
        config.dedup_ttl,
        config.fan_out_cap,
        "flowbridge",
    );

    let renewal_window = time::Duration::hours(config.renewal_window_hours);
    spawn_reconciler(lifecycle.clone(), renewal_window, Duration::from_secs(config.reconcile_interval_secs));

    let app_state = AppState {
        pipeline,
        lifecycle,
        registry,
        renewal_window,
        function_key: config.function_key.clone(),
    };
    let router = flowbridge_rpc::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding to {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "flowbridge listening");
    axum::serve(listener, router)
        .await
        .context("serving the http surface")?;
    Ok(())
}
