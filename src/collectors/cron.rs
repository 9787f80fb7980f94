use crate::config::CronConfig;
use crate::parse::{parse_crontab, parse_execution_timestamp, parse_job_status, shell_quote};
use crate::report::{CronJob, CronReport, NEVER};
use crate::runner::CommandRunner;
use crate::session::Session;
use tracing::debug;

pub const LIST_JOBS_COMMAND: &str = "crontab -l 2>/dev/null";

/// Last cron log line recording a run of `command`. The pattern is matched as
/// a fixed string and shell-quoted, so command text is never interpreted.
pub fn last_execution_command(log_path: &str, command: &str) -> String {
    format!(
        "grep -aF {} {} | tail -1",
        shell_quote(&format!("CMD ({command})")),
        shell_quote(log_path)
    )
}

pub fn exit_status_command(log_path: &str, command: &str) -> String {
    format!(
        r"grep -aF {} {} | grep -o 'exit status [0-9]\+' | tail -1",
        shell_quote(&format!("CMD ({command})")),
        shell_quote(log_path)
    )
}

/// Lists the login user's cron jobs, probes the daemon and looks up each job's
/// last run in the cron log. Commands run in order because the job list
/// decides which log lookups are issued.
pub async fn inspect_cron<S>(runner: &mut CommandRunner<'_, S>, cfg: &CronConfig) -> CronReport
where
    S: Session + ?Sized,
{
    let job_list = runner.text("cron_jobs", LIST_JOBS_COMMAND).await;
    let service_status = runner.text("cron_service", &cfg.service_probe).await;

    let entries = job_list.as_deref().map(parse_crontab).unwrap_or_default();
    debug!(jobs = entries.len(), "parsed crontab");

    let mut jobs = Vec::with_capacity(entries.len());
    for entry in entries {
        let last_line = runner
            .text(
                "cron_last_execution",
                &last_execution_command(&cfg.log_path, &entry.command),
            )
            .await;
        let exit_text = runner
            .text(
                "cron_exit_status",
                &exit_status_command(&cfg.log_path, &entry.command),
            )
            .await;

        jobs.push(CronJob {
            schedule: entry.schedule,
            command: entry.command,
            last_execution: last_line
                .as_deref()
                .and_then(parse_execution_timestamp)
                .unwrap_or_else(|| NEVER.to_string()),
            status: parse_job_status(exit_text.as_deref()),
        });
    }

    CronReport {
        jobs,
        service_status,
    }
}
