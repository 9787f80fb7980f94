//! Pure parsers for remote command output.
//!
//! Everything that depends on the shape of a remote tool's text lives here so
//! the fragile bits can be tested without a host.

use crate::report::JobStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrontabEntry {
    pub schedule: String,
    pub command: String,
}

/// Parses `crontab -l` output. Blank lines, comments and lines with fewer than
/// six fields (environment assignments, truncated entries) are skipped.
pub fn parse_crontab(text: &str) -> Vec<CrontabEntry> {
    text.lines().filter_map(parse_crontab_line).collect()
}

pub fn parse_crontab_line(line: &str) -> Option<CrontabEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }
    Some(CrontabEntry {
        schedule: fields[..5].join(" "),
        command: fields[5..].join(" "),
    })
}

/// Cron log lines look like `Mar  3 04:05:01 host CROND[123]: (root) CMD (...)`;
/// the timestamp token is everything before the first parenthesis.
pub fn parse_execution_timestamp(line: &str) -> Option<String> {
    let head = match line.split_once('(') {
        Some((head, _)) => head,
        None => line,
    };
    let head = head.trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

/// Maps the last `exit status N` text found for a job to its status.
///
/// The number after the last `exit status ` is parsed and only `0` counts as
/// success. A plain substring test for `exit status 0` would also accept
/// `exit status 01` or `exit status 0x1`; those are `Failed` here.
pub fn parse_job_status(exit_text: Option<&str>) -> JobStatus {
    let Some(text) = exit_text.map(str::trim).filter(|t| !t.is_empty()) else {
        return JobStatus::Unknown;
    };
    let code = text.rfind("exit status ").and_then(|idx| {
        let digits: String = text[idx + "exit status ".len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse::<u32>().ok()
    });
    match code {
        Some(0) => JobStatus::Success,
        _ => JobStatus::Failed,
    }
}

/// Parses a probe's stdout as a single floating point number.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Wraps `value` in single quotes for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
