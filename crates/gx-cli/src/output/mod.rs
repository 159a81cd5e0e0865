//! Output formatting for the CLI
//!
//! Tables for instance, process and host listings, per-instance outcome
//! lines and coloured status messages.

use std::time::Duration;

use gx_core::results::Summary;
use gx_core::Responses;
use gx_host::HostConfig;
use tabled::{settings::Style, Table, Tabled};

/// One line of `geneos list`
#[derive(Debug, Clone, Tabled)]
pub struct InstanceRow {
    #[tabled(rename = "TYPE")]
    pub kind: String,
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "HOST")]
    pub host: String,
    #[tabled(rename = "PORT")]
    pub port: String,
    #[tabled(rename = "VERSION")]
    pub version: String,
    #[tabled(rename = "FLAGS")]
    pub flags: String,
    #[tabled(rename = "HOME")]
    pub home: String,
}

/// One line of `geneos ps`
#[derive(Debug, Clone, Tabled)]
pub struct ProcessRow {
    #[tabled(rename = "TYPE")]
    pub kind: String,
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "HOST")]
    pub host: String,
    #[tabled(rename = "PID")]
    pub pid: u32,
    #[tabled(rename = "UID:GID")]
    pub owner: String,
    #[tabled(rename = "UPTIME")]
    pub uptime: String,
    #[tabled(rename = "PORTS")]
    pub ports: String,
}

pub fn format_instances(rows: Vec<InstanceRow>) -> String {
    if rows.is_empty() {
        return "No instances found".to_string();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn format_processes(rows: Vec<ProcessRow>) -> String {
    if rows.is_empty() {
        return "No instances running".to_string();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format configured hosts, with `localhost` first
pub fn format_hosts(hosts: &[HostConfig]) -> String {
    #[derive(Tabled)]
    struct HostRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "HOSTNAME")]
        hostname: String,
        #[tabled(rename = "PORT")]
        port: String,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "ROOT")]
        root: String,
    }

    let mut rows = vec![HostRow {
        name: gx_host::LOCALHOST.to_string(),
        hostname: gx_host::LOCALHOST.to_string(),
        port: "-".to_string(),
        user: gx_host::users::current_username(),
        root: "-".to_string(),
    }];
    rows.extend(hosts.iter().map(|h| HostRow {
        name: h.name.clone(),
        hostname: h.hostname.clone(),
        port: h.port.to_string(),
        user: h.username.clone(),
        root: h
            .root
            .as_ref()
            .map(|r| r.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
    }));
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print every response: successes to stdout, failures to stderr
pub fn print_responses(responses: &Responses) {
    for response in responses {
        match &response.result {
            Ok(message) => print_success(&format!("{} {}", response.id(), message)),
            Err(e) if e.is_soft() => print_warning(&format!("{} {}", response.id(), e)),
            Err(e) => print_error(&format!("{} {}", response.id(), e)),
        }
    }
}

/// `3 ok, 1 skipped, 2 failed`
pub fn format_summary(summary: &Summary) -> String {
    let mut parts = vec![format!("{} ok", summary.ok)];
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    parts.join(", ")
}

/// Format duration in human-readable form
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(7260)), "2h 1m");
        assert_eq!(format_duration(Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_format_summary() {
        let summary = Summary {
            ok: 3,
            skipped: 0,
            failed: 2,
        };
        assert_eq!(format_summary(&summary), "3 ok, 2 failed");
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(format_instances(vec![]), "No instances found");
        assert_eq!(format_processes(vec![]), "No instances running");
    }

    #[test]
    fn test_hosts_table_starts_with_localhost() {
        let table = format_hosts(&[HostConfig::new("db1", "db1.example.com")]);
        let local = table.find("localhost").unwrap();
        let remote = table.find("db1.example.com").unwrap();
        assert!(local < remote);
    }
}
