//! Entry point: wires environment configuration into the core monitoring
//! components and serves the HTTP/SSE facade (spec.md §6).

mod errors;
mod routes;
mod state;
#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use gateway_config::Config;
use gateway_core::alerts::{AlertEngine, AlertPolicy};
use gateway_core::detector::{DetectorConfig, DisruptionDetector};
use gateway_core::poller::{GatewayPoller, PollerConfig};
use gateway_core::quality::{NetworkQualityProber, ProbeConfig, ProbeTarget};
use gateway_core::scheduler::{Scheduler, SchedulerConfig};
use gateway_core::speedtest::{CdnProbeTool, CliTool, ContextConfig, SpeedtestOrchestrator, SpeedtestTool};
use gateway_core::storage::{PostgresSignalRepository, SignalRepository};
use gateway_core::types::SignalSample;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::state::AppState;

/// Default CLI/CDN speedtest tool preference order (spec.md §4.5 "Supported
/// tools"): a full `fast`/`speedtest` CLI is preferred when installed, with
/// a Cloudflare CDN download probe as the zero-dependency fallback.
fn default_speedtest_tools() -> Vec<Arc<dyn SpeedtestTool>> {
    vec![
        Arc::new(CliTool::new("fast", &["--version"], &["--json"], None)),
        Arc::new(CliTool::new("speedtest", &["--version"], &["--accept-license", "--accept-gdpr", "-f", "json"], Some("--server-id"))),
        Arc::new(CliTool::new("librespeed-cli", &["--version"], &["--json"], Some("--server"))),
        Arc::new(CdnProbeTool::new("cloudflare-cdn", "https://speed.cloudflare.com/__down?bytes=25000000")),
        Arc::new(CdnProbeTool::new("cachefly-cdn", "https://cachefly.cachefly.net/10mb.test")),
        Arc::new(CdnProbeTool::new("keycdn", "https://cdn-speedtest.keycdn.com/100mb.test")),
    ]
}

/// Default network quality probe targets and cadence. `gateway-config`'s
/// enumerated environment variables (spec.md §6) don't cover the prober, so
/// these are fixed defaults rather than invented env vars.
fn default_probe_targets() -> Vec<ProbeTarget> {
    vec![
        ProbeTarget { host: "1.1.1.1".to_string(), name: "cloudflare".to_string() },
        ProbeTarget { host: "8.8.8.8".to_string(), name: "google".to_string() },
    ]
}

async fn healthz() -> &'static str {
    "OK"
}

fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(healthz))
        .merge(routes::create_api_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_server=info,gateway_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let repo = Arc::new(PostgresSignalRepository::connect(&config.database.url).await?);
    repo.migrate().await?;

    let poller = GatewayPoller::new(
        PollerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
            poll_interval: config.gateway.poll_interval,
            timeout: config.gateway.timeout,
            failure_threshold: config.gateway.failure_threshold,
            recovery_timeout: config.gateway.recovery_timeout,
            sinr_drop_threshold_db: config.gateway.sinr_drop_threshold_db,
        },
        repo.clone(),
    );

    let detector = Arc::new(DisruptionDetector::new(
        repo.clone(),
        DetectorConfig {
            sinr_drop_5g_db: config.detector.sinr_drop_5g_db,
            sinr_drop_4g_db: config.detector.sinr_drop_4g_db,
            critical_escalation_db: config.detector.critical_escalation_db,
            cooldown_seconds: config.detector.cooldown_seconds,
        },
    ));

    let alerts = AlertEngine::new(AlertPolicy {
        enabled: config.alert_policy.enabled,
        sinr_critical: config.alert_policy.sinr_critical,
        sinr_warning: config.alert_policy.sinr_warning,
        rsrp_critical: config.alert_policy.rsrp_critical,
        rsrp_warning: config.alert_policy.rsrp_warning,
        speed_low_threshold_mbps: config.alert_policy.speed_low_threshold_mbps,
        packet_loss_threshold_percent: config.alert_policy.packet_loss_threshold_percent,
        jitter_threshold_ms: config.alert_policy.jitter_threshold_ms,
        notify_on_warning: config.alert_policy.notify_on_warning,
        notify_on_critical: config.alert_policy.notify_on_critical,
        cooldown_minutes: config.alert_policy.cooldown_minutes,
    });

    let speedtest = Arc::new(
        SpeedtestOrchestrator::new(repo.clone(), default_speedtest_tools(), ContextConfig::default(), Duration::from_secs(60)).await,
    );
    info!(tools = ?speedtest.discovered(), "speedtest tools discovered");

    let scheduler = Arc::new(Scheduler::new(
        speedtest.clone(),
        SchedulerConfig {
            enabled: config.scheduler.enabled,
            interval_minutes: config.scheduler.interval_minutes,
            time_window_start_hour: Some(config.scheduler.window_start_hour),
            time_window_end_hour: Some(config.scheduler.window_end_hour),
            run_on_weekends: true,
            tools_to_run: Vec::new(),
            delay_between_tools_seconds: 10,
        },
    ));

    let quality = Arc::new(NetworkQualityProber::new(repo.clone(), ProbeConfig::default(), default_probe_targets(), Duration::from_secs(300)));

    // Drive the detector and alert engine from every successful poll
    // (spec.md §5: "Disruption Detector and Alert Engine are driven by
    // [poller] output").
    {
        let mut signal_sub = poller.subscribe().await;
        let detector = detector.clone();
        let alerts = alerts.clone();
        let repo = repo.clone();
        tokio::spawn(async move {
            let mut previous: Option<SignalSample> = None;
            loop {
                let current = signal_sub.recv().await;
                if let Some(prev) = &previous {
                    if let Err(e) = detector.process(prev, &current).await {
                        warn!(error = %e, "disruption detector failed to persist an event");
                    }
                }
                let latest_speedtest = repo.latest_speedtest().await.ok().flatten();
                alerts.evaluate(Some(current.clone()), latest_speedtest).await;
                previous = Some(current);
            }
        });
    }

    poller.start_polling().await;
    if config.scheduler.enabled {
        scheduler.start().await?;
    }
    quality.start().await;

    let state = AppState { repo, poller, alerts, speedtest, scheduler };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8090));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway-server listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
