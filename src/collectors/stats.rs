use crate::config::StatsConfig;
use crate::report::{DiskUsage, HostStats};
use crate::runner::CommandRunner;
use crate::session::Session;
use tracing::debug;

pub const CPU_CURRENT_COMMAND: &str =
    r#"python3 -c "import psutil; print(psutil.cpu_percent(interval=1))""#;

pub const CPU_DAILY_AVG_COMMAND: &str = r#"bash -c "sar -u -s $(date +%H:%M:%S -d 'today 00:00') | awk '/Average:/ {print 100 - \$NF}'""#;

pub const RAM_CURRENT_COMMAND: &str =
    r#"python3 -c "import psutil; print(psutil.virtual_memory().percent)""#;

pub const RAM_DAILY_AVG_COMMAND: &str = r#"bash -c "sar -r -s $(date +%H:%M:%S -d 'today 00:00') | awk '/Average:/ {print ((\$3 - \$2)/\$3) * 100}'""#;

/// `mount` must already be validated (absolute, no quotes or `$`).
pub fn disk_usage_command(mount: &str) -> String {
    format!(r#"python3 -c "import psutil; print(psutil.disk_usage('{mount}').percent)""#)
}

/// `%ifutil` column of a one-second `sar -n DEV` sample for `iface`.
pub fn network_current_command(iface: &str) -> String {
    format!(r#"bash -c "sar -n DEV 1 1 | grep '{iface}' | tail -n 1 | awk '{{print \$9}}'""#)
}

pub fn network_daily_avg_command(iface: &str) -> String {
    format!(
        r#"bash -c "sar -n DEV -s $(date +%H:%M:%S -d 'today 00:00') | grep '{iface}' | awk '{{sum += \$9; count++}} END {{print sum/count}}'""#
    )
}

/// Runs every probe once, in a fixed order. A failed probe leaves only its
/// own slot empty.
pub async fn collect_stats<S>(runner: &mut CommandRunner<'_, S>, cfg: &StatsConfig) -> HostStats
where
    S: Session + ?Sized,
{
    let cpu_current = runner.number("cpu_current", CPU_CURRENT_COMMAND).await;
    let cpu_daily_avg = runner.number("cpu_daily_avg", CPU_DAILY_AVG_COMMAND).await;
    let ram_current = runner.number("ram_current", RAM_CURRENT_COMMAND).await;
    let ram_daily_avg = runner.number("ram_daily_avg", RAM_DAILY_AVG_COMMAND).await;

    let mut disks = Vec::with_capacity(cfg.disk_mounts.len());
    for mount in &cfg.disk_mounts {
        let usage_percent = runner.number("disk_usage", &disk_usage_command(mount)).await;
        disks.push(DiskUsage {
            mount: mount.clone(),
            usage_percent,
        });
    }

    let network_current = runner
        .number(
            "network_current",
            &network_current_command(&cfg.network_interface),
        )
        .await;
    let network_daily_avg = runner
        .number(
            "network_daily_avg",
            &network_daily_avg_command(&cfg.network_interface),
        )
        .await;

    let stats = HostStats {
        cpu_current,
        cpu_daily_avg,
        ram_current,
        ram_daily_avg,
        disks,
        network_current,
        network_daily_avg,
    };
    debug!(
        collected = stats.collected_count(),
        probes = stats.probe_count(),
        "stats collected"
    );
    stats
}
