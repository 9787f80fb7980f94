use crate::session::HostTarget;
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

/// Rendered in place of any value that could not be collected.
pub const UNAVAILABLE: &str = "failed to retrieve";
/// Last execution of a job with no matching cron log record.
pub const NEVER: &str = "Never";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    Failed,
    Unknown,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Success => "Success",
            JobStatus::Failed => "Failed",
            JobStatus::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronJob {
    pub schedule: String,
    pub command: String,
    pub last_execution: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CronReport {
    pub jobs: Vec<CronJob>,
    pub service_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsage {
    pub mount: String,
    pub usage_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostStats {
    pub cpu_current: Option<f64>,
    pub cpu_daily_avg: Option<f64>,
    pub ram_current: Option<f64>,
    pub ram_daily_avg: Option<f64>,
    pub disks: Vec<DiskUsage>,
    pub network_current: Option<f64>,
    pub network_daily_avg: Option<f64>,
}

impl HostStats {
    pub fn disk(&self, mount: &str) -> Option<f64> {
        self.disks
            .iter()
            .find(|d| d.mount == mount)
            .and_then(|d| d.usage_percent)
    }

    pub fn collected_count(&self) -> usize {
        let scalars = [
            self.cpu_current,
            self.cpu_daily_avg,
            self.ram_current,
            self.ram_daily_avg,
            self.network_current,
            self.network_daily_avg,
        ];
        scalars.iter().filter(|v| v.is_some()).count()
            + self.disks.iter().filter(|d| d.usage_percent.is_some()).count()
    }

    pub fn probe_count(&self) -> usize {
        6 + self.disks.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostReport {
    pub host: String,
    pub port: u16,
    pub connection_error: Option<String>,
    pub cron: Option<CronReport>,
    pub stats: Option<HostStats>,
}

impl HostReport {
    pub fn collected(
        target: &HostTarget,
        cron: Option<CronReport>,
        stats: Option<HostStats>,
    ) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            connection_error: None,
            cron,
            stats,
        }
    }

    pub fn unreachable(target: &HostTarget, error: impl ToString) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            connection_error: Some(error.to_string()),
            cron: None,
            stats: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_error.is_none()
    }
}

/// Human-readable section printed to the console for one host.
pub fn render_summary(report: &HostReport) -> String {
    let mut out = format!("{} results:\n", report.host);

    if let Some(err) = &report.connection_error {
        out.push_str(&format!("Connection failed: {err}\n"));
        return out;
    }

    if let Some(stats) = &report.stats {
        for line in stats_lines(stats) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    if let Some(cron) = &report.cron {
        out.push_str("\n=== User Cron Jobs ===\n");
        if cron.jobs.is_empty() {
            out.push_str("No user cron jobs\n");
        }
        for job in &cron.jobs {
            out.push_str(&format!(
                "\nSchedule: {}\nCommand: {}\nLast Execution: {}\nStatus: {}\n{}\n",
                job.schedule,
                job.command,
                job.last_execution,
                job.status,
                "-".repeat(50)
            ));
        }
        out.push_str("\n=== Cron Service Status ===\n");
        out.push_str(cron.service_status.as_deref().unwrap_or(UNAVAILABLE));
        out.push('\n');
    }

    out
}

/// Durable log record: a timestamped header, then one line per metric group.
pub fn render_log_record(report: &HostReport, at: SystemTime) -> String {
    let mut out = format!(
        "{} - Results for {}:\n",
        humantime::format_rfc3339_seconds(at),
        report.host
    );

    if let Some(err) = &report.connection_error {
        out.push_str(&format!("Connection failed: {err}\n"));
        return out;
    }

    if let Some(stats) = &report.stats {
        for line in stats_lines(stats) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    if let Some(cron) = &report.cron {
        let count = |status: JobStatus| cron.jobs.iter().filter(|j| j.status == status).count();
        out.push_str(&format!(
            "Cron Service Status: {}  Cron Jobs: {} (Success: {}, Failed: {}, Unknown: {})\n",
            single_line(cron.service_status.as_deref().unwrap_or(UNAVAILABLE)),
            cron.jobs.len(),
            count(JobStatus::Success),
            count(JobStatus::Failed),
            count(JobStatus::Unknown),
        ));
    }

    out
}

/// Appends one record per report to the log file, creating it when missing.
pub fn append_log_records(path: &Path, reports: &[HostReport], at: SystemTime) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut text = String::new();
    for report in reports {
        text.push_str(&render_log_record(report, at));
    }
    file.write_all(text.as_bytes())?;
    file.flush()
}

fn stats_lines(stats: &HostStats) -> Vec<String> {
    let disks = if stats.disks.is_empty() {
        "Disk Usage: no mount points configured".to_string()
    } else {
        let parts: Vec<String> = stats
            .disks
            .iter()
            .map(|d| format!("{}: {}", mount_label(&d.mount), current(d.usage_percent)))
            .collect();
        format!("Disk Usage: {}", parts.join(" "))
    };

    vec![
        format!(
            "Current CPU Usage: {}   Daily Average CPU Usage: {}",
            current(stats.cpu_current),
            average(stats.cpu_daily_avg)
        ),
        format!(
            "Current RAM Usage: {}   Daily Average RAM Usage: {}",
            current(stats.ram_current),
            average(stats.ram_daily_avg)
        ),
        disks,
        format!(
            "Current Network Utilization: {}   Daily Average Network Utilization: {}",
            current(stats.network_current),
            average(stats.network_daily_avg)
        ),
    ]
}

fn current(value: Option<f64>) -> String {
    value.map_or_else(|| UNAVAILABLE.to_string(), |v| format!("{v:.1}%"))
}

fn average(value: Option<f64>) -> String {
    value.map_or_else(|| UNAVAILABLE.to_string(), |v| format!("{v:.2}%"))
}

/// `/` is "Root"; other mounts drop the leading slash and get a capital.
fn mount_label(mount: &str) -> String {
    let trimmed = mount.trim_matches('/');
    if trimmed.is_empty() {
        return "Root".to_string();
    }
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Root".to_string(),
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Credentials;
    use std::time::{Duration, UNIX_EPOCH};

    fn target() -> HostTarget {
        HostTarget {
            host: "rhel2".to_string(),
            port: 22,
            username: None,
            credentials: Credentials::default(),
        }
    }

    fn stats() -> HostStats {
        HostStats {
            cpu_current: Some(23.4),
            cpu_daily_avg: Some(20.123),
            ram_current: None,
            ram_daily_avg: Some(55.0),
            disks: vec![
                DiskUsage {
                    mount: "/".to_string(),
                    usage_percent: None,
                },
                DiskUsage {
                    mount: "/home".to_string(),
                    usage_percent: Some(40.0),
                },
            ],
            network_current: None,
            network_daily_avg: None,
        }
    }

    #[test]
    fn mount_labels() {
        assert_eq!(mount_label("/"), "Root");
        assert_eq!(mount_label("/home"), "Home");
        assert_eq!(mount_label("/var/log/"), "Var/log");
    }

    #[test]
    fn summary_marks_missing_values() {
        let report = HostReport::collected(&target(), None, Some(stats()));
        let text = render_summary(&report);
        assert!(text.contains("Current CPU Usage: 23.4%   Daily Average CPU Usage: 20.12%"));
        assert!(text.contains("Current RAM Usage: failed to retrieve   Daily Average RAM Usage: 55.00%"));
        assert!(text.contains("Disk Usage: Root: failed to retrieve Home: 40.0%"));
        assert!(text.contains(
            "Current Network Utilization: failed to retrieve   Daily Average Network Utilization: failed to retrieve"
        ));
        assert!(!text.contains("Cron"));
    }

    #[test]
    fn summary_lists_cron_jobs() {
        let cron = CronReport {
            jobs: vec![CronJob {
                schedule: "* * * * *".to_string(),
                command: "/bin/true".to_string(),
                last_execution: NEVER.to_string(),
                status: JobStatus::Unknown,
            }],
            service_status: None,
        };
        let report = HostReport::collected(&target(), Some(cron), None);
        let text = render_summary(&report);
        assert!(text.contains("Schedule: * * * * *\nCommand: /bin/true\nLast Execution: Never\nStatus: Unknown"));
        assert!(text.contains("=== Cron Service Status ===\nfailed to retrieve"));
    }

    #[test]
    fn summary_without_jobs() {
        let report = HostReport::collected(
            &target(),
            Some(CronReport {
                jobs: vec![],
                service_status: Some("active".to_string()),
            }),
            None,
        );
        let text = render_summary(&report);
        assert!(text.contains("No user cron jobs"));
        assert!(text.ends_with("=== Cron Service Status ===\nactive\n"));
    }

    #[test]
    fn unreachable_host_renders_connection_failure_only() {
        let report = HostReport::unreachable(&target(), "host rhel2 unreachable: no route");
        assert!(!report.is_connected());
        let text = render_summary(&report);
        assert_eq!(
            text,
            "rhel2 results:\nConnection failed: host rhel2 unreachable: no route\n"
        );
    }

    #[test]
    fn log_record_has_timestamp_and_one_line_per_group() {
        let cron = CronReport {
            jobs: vec![],
            service_status: Some("  Active: active (running)\n".to_string()),
        };
        let report = HostReport::collected(&target(), Some(cron), Some(stats()));
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let text = render_log_record(&report, at);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "2023-11-14T22:13:20Z - Results for rhel2:");
        assert_eq!(lines.len(), 6);
        assert!(lines[3].starts_with("Disk Usage:"));
        assert_eq!(
            lines[5],
            "Cron Service Status: Active: active (running)  Cron Jobs: 0 (Success: 0, Failed: 0, Unknown: 0)"
        );
    }

    #[test]
    fn append_log_records_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("remote_stats.log");
        let report = HostReport::unreachable(&target(), "timeout");
        let at = UNIX_EPOCH;

        append_log_records(&path, std::slice::from_ref(&report), at).expect("first append");
        append_log_records(&path, &[report], at).expect("second append");

        let text = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(text.matches("Results for rhel2").count(), 2);
    }

    #[test]
    fn stats_counts() {
        let stats = stats();
        assert_eq!(stats.probe_count(), 8);
        assert_eq!(stats.collected_count(), 4);
        assert_eq!(stats.disk("/home"), Some(40.0));
        assert_eq!(stats.disk("/"), None);
        assert_eq!(stats.disk("/srv"), None);
    }
}
