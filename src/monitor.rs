use crate::collectors::cron::inspect_cron;
use crate::collectors::stats::collect_stats;
use crate::config::{Config, CronConfig, StatsConfig};
use crate::report::HostReport;
use crate::runner::CommandRunner;
use crate::session::{Connector, HostTarget, Session};
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What to collect on every host.
#[derive(Debug, Clone)]
pub struct Collection {
    pub command_timeout: Duration,
    pub cron: Option<CronConfig>,
    pub stats: Option<StatsConfig>,
}

impl Collection {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            command_timeout: cfg.command_timeout(),
            cron: cfg.cron.enabled.then(|| cfg.cron.clone()),
            stats: cfg.stats.enabled.then(|| cfg.stats.clone()),
        }
    }
}

/// Opens a session, runs the enabled collectors and always closes the
/// session before returning. Only a failed open is reported as a failure.
pub async fn collect_host<C: Connector>(
    connector: &C,
    target: &HostTarget,
    collection: &Collection,
) -> HostReport {
    let started = Instant::now();
    let mut session = match connector.open(target).await {
        Ok(session) => session,
        Err(err) => {
            warn!(host = %target.host, error = %err, "connection failed");
            return HostReport::unreachable(target, err);
        }
    };

    let report = collect_with_session(&mut session, target, collection).await;
    session.close().await;

    info!(
        host = %target.host,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "host collected"
    );
    report
}

async fn collect_with_session<S: Session + ?Sized>(
    session: &mut S,
    target: &HostTarget,
    collection: &Collection,
) -> HostReport {
    let mut runner = CommandRunner::new(session, &target.host, collection.command_timeout);

    let cron = match &collection.cron {
        Some(cfg) => Some(inspect_cron(&mut runner, cfg).await),
        None => None,
    };
    let stats = match &collection.stats {
        Some(cfg) => Some(collect_stats(&mut runner, cfg).await),
        None => None,
    };

    HostReport::collected(target, cron, stats)
}

/// Collects every host with at most `max_concurrent` sessions open at once.
/// Reports come back in the order of `targets`.
pub async fn collect_all<C: Connector>(
    connector: &C,
    targets: &[HostTarget],
    collection: &Collection,
    max_concurrent: usize,
) -> Vec<HostReport> {
    stream::iter(targets)
        .map(|target| collect_host(connector, target, collection))
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}
