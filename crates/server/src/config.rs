//! Environment configuration (§6.4): one flat [`clap::Parser`] struct so
//! every knob can be set as a flag or, more commonly in the serverless
//! deployments this binary targets, as an environment variable of the
//! same name.

use std::time::Duration;

use clap::Parser;

fn parse_duration_secs(raw: &str) -> Result<Duration, std::num::ParseIntError> {
    raw.parse::<u64>().map(Duration::from_secs)
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Bridges collaboration-platform change notifications to an RPA queue and arbitrary HTTP sinks")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "FLOWBRIDGE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Shared secret management endpoints are gated behind (`x-functions-key`).
    #[arg(long, env = "FLOWBRIDGE_FUNCTION_KEY")]
    pub function_key: Option<String>,

    /// This service's own externally reachable base URL, used both as the
    /// subscription callback target and as the loop-prevention host for
    /// the outbound forwarder.
    #[arg(long, env = "FLOWBRIDGE_CALLBACK_BASE_URL")]
    pub callback_base_url: String,

    /// Where the tracking store (subscription bookkeeping) lives. `:memory:`
    /// runs it in-process with nothing persisted across restarts.
    #[arg(long, env = "FLOWBRIDGE_TRACKING_STORE", default_value = ":memory:")]
    pub tracking_store_path: String,

    /// Where the item-state baseline store (for diffing) lives.
    #[arg(long, env = "FLOWBRIDGE_STATE_STORE", default_value = ":memory:")]
    pub state_store_path: String,

    #[arg(long, env = "FLOWBRIDGE_PLATFORM_TENANT_ID")]
    pub platform_tenant_id: String,
    #[arg(long, env = "FLOWBRIDGE_PLATFORM_CLIENT_ID")]
    pub platform_client_id: String,
    #[arg(long, env = "FLOWBRIDGE_PLATFORM_CLIENT_SECRET")]
    pub platform_client_secret: String,
    #[arg(long, env = "FLOWBRIDGE_PLATFORM_BASE_URL")]
    pub platform_base_url: String,
    #[arg(long, env = "FLOWBRIDGE_PLATFORM_TOKEN_ENDPOINT")]
    pub platform_token_endpoint: String,

    #[arg(long, env = "FLOWBRIDGE_RPA_CLIENT_ID")]
    pub rpa_client_id: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_CLIENT_SECRET")]
    pub rpa_client_secret: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_DEFAULT_TENANT_TAG", default_value = "DEV")]
    pub rpa_default_tenant_tag: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_DEFAULT_TENANT_ENDPOINT")]
    pub rpa_default_tenant_endpoint: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_DEFAULT_TOKEN_ENDPOINT")]
    pub rpa_default_token_endpoint: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_DEFAULT_TENANT_NAME")]
    pub rpa_default_tenant_name: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_DEFAULT_FOLDER_ID")]
    pub rpa_default_folder_id: String,
    #[arg(long, env = "FLOWBRIDGE_RPA_DEFAULT_QUEUE")]
    pub rpa_default_queue: String,

    /// Subscription renewal window: subscriptions expiring within this
    /// many hours of a reconciler pass are renewed (default 24h, §6.4).
    #[arg(long, env = "FLOWBRIDGE_RENEWAL_WINDOW_HOURS", default_value_t = 24)]
    pub renewal_window_hours: i64,

    /// Reconciler sweep interval.
    #[arg(long, env = "FLOWBRIDGE_RECONCILE_INTERVAL_SECS", default_value_t = 3600)]
    pub reconcile_interval_secs: u64,

    #[arg(long, env = "FLOWBRIDGE_DEDUP_TTL_SECS", value_parser = parse_duration_secs, default_value = "60")]
    pub dedup_ttl: Duration,

    #[arg(long, env = "FLOWBRIDGE_RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: usize,

    #[arg(long, env = "FLOWBRIDGE_RETRY_BASE_DELAY_SECS", value_parser = parse_duration_secs, default_value = "1")]
    pub retry_base_delay: Duration,

    #[arg(long, env = "FLOWBRIDGE_FAN_OUT_CAP", default_value_t = 10)]
    pub fan_out_cap: usize,

    #[arg(long, env = "FLOWBRIDGE_ENABLE_TOKEN_CACHE", action = clap::ArgAction::Set, default_value_t = true)]
    pub enable_token_cache: bool,
    #[arg(long, env = "FLOWBRIDGE_ENABLE_RPA", action = clap::ArgAction::Set, default_value_t = true)]
    pub enable_rpa: bool,
    #[arg(long, env = "FLOWBRIDGE_ENABLE_METRICS", action = clap::ArgAction::Set, default_value_t = true)]
    pub enable_metrics: bool,
    #[arg(long, env = "FLOWBRIDGE_DETAILED_LOGGING", action = clap::ArgAction::Set, default_value_t = false)]
    pub detailed_logging: bool,

    #[arg(long, env = "FLOWBRIDGE_METRICS_LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_listen_addr: String,
}
