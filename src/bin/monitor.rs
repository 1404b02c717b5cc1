use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use instance_monitor::{
    actors::{
        context::MonitorContext,
        scheduler::{ReleaseSchedule, Scheduler},
    },
    config::{MonitorConfig, RegistryConfig, read_config_file},
    dispatcher::AlertDispatcher,
    fleet::{AdminServerRegistry, FleetView, InstanceRegistry, StaticRegistry},
    formatter::MarkdownFormatter,
    history::HistoryStore,
    monitors::release::{ForgeClient, ReleaseFreshnessChecker},
    notifier::{Notifier, RetryPolicy, WebhookNotifier},
    policy::MonitorPolicy,
    sampler::HttpMetricSampler,
    stats::MonitorCounters,
    util::http_client,
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound for notifier deliveries still running at shutdown
const FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log at trace level
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    // the binary shares the library's target name
    let filter = filter::Targets::new().with_targets(vec![("instance_monitor", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(path: &str) -> anyhow::Result<MonitorConfig> {
    let config = read_config_file(path)?
        .resolve()
        .with_context(|| format!("invalid configuration in {path}"))?;
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = load_config(&args.file)?;

    let kinds = config.metrics.len().max(1);
    let client = http_client(config.parallelism * kinds).context("failed to build HTTP client")?;

    let registry: Arc<dyn InstanceRegistry> = match &config.registry {
        RegistryConfig::Static { instances } => {
            debug!("using {} statically configured instances", instances.len());
            Arc::new(StaticRegistry::new(instances.clone()))
        }
        RegistryConfig::AdminServer { url } => {
            debug!("using admin server registry at {url}");
            Arc::new(AdminServerRegistry::new(client.clone(), url))
        }
    };

    let fleet = Arc::new(FleetView::new(
        registry,
        config.services.clone(),
        config.fleet_stale_max,
    ));
    let policy = Arc::new(MonitorPolicy::new(
        fleet.clone(),
        config.metrics.clone(),
        config.release.suppression_ms,
    ));
    let counters = Arc::new(MonitorCounters::new());

    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    match &config.notifier {
        Some(notifier) => notifiers.push(Arc::new(WebhookNotifier::new(
            client.clone(),
            notifier.webhook_url.clone(),
            RetryPolicy {
                retries: notifier.retries,
                base: notifier.backoff_base,
                ..Default::default()
            },
        ))),
        None => warn!("no notifier configured, alerts are only logged"),
    }

    let dispatcher = Arc::new(AlertDispatcher::new(
        policy.clone(),
        Arc::new(MarkdownFormatter::default()),
        notifiers,
        counters.clone(),
    ));

    let ctx = Arc::new(MonitorContext {
        fleet: fleet.clone(),
        sampler: Arc::new(HttpMetricSampler::new(client.clone())),
        history: Arc::new(HistoryStore::new()),
        policy,
        dispatcher: dispatcher.clone(),
        counters: counters.clone(),
        parallelism: config.parallelism,
        evict_after_missing_ticks: config.evict_after_missing_ticks,
    });

    let release = config.forge.as_ref().map(|forge| ReleaseSchedule {
        checker: ReleaseFreshnessChecker::new(
            ForgeClient::new(client.clone(), forge),
            fleet.clone(),
        ),
        interval: Duration::from_secs(config.release.check_interval_seconds),
    });
    if release.is_none() {
        debug!("no forge configured, release checks disabled");
    }

    let scheduler = Scheduler::start(ctx, release);

    wait_for_shutdown(&args.file, &fleet).await;

    info!("shutting down");
    scheduler.shutdown().await;
    if tokio::time::timeout(FLUSH_TIMEOUT, dispatcher.flush()).await.is_err() {
        warn!("gave up waiting for notifier deliveries");
    }

    match serde_json::to_string(&counters.snapshot()) {
        Ok(stats) => info!("final stats: {stats}"),
        Err(e) => error!("failed to serialize stats: {e}"),
    }

    Ok(())
}

#[cfg(unix)]
fn reload_services(path: &str, fleet: &FleetView) {
    match load_config(path) {
        Ok(config) => {
            info!("reloaded {} service definitions", config.services.len());
            fleet.reload_services(config.services);
        }
        Err(e) => error!("config reload failed, keeping current services: {e:#}"),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(path: &str, fleet: &FleetView) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => Some(hangup),
        Err(e) => {
            warn!("config reload on SIGHUP unavailable: {e}");
            None
        }
    };

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("failed to listen for ctrl-c: {e}");
                }
                return;
            }

            Some(()) = async {
                match hangup.as_mut() {
                    Some(hangup) => hangup.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                debug!("received SIGHUP");
                reload_services(path, fleet);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_path: &str, _fleet: &FleetView) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }
}
