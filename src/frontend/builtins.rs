//! The front end's reserved `:`-prefixed control-command surface. These
//! never cross a socket; they read or mutate local front-end state
//! (config, history file, supervisor) directly.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use stybulate::{Cell, Headers, Style, Table};

use crate::config::Config;
use crate::frontend::supervisor::{Health, Supervisor};
use crate::history::History;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Status,
    GetVerbosity,
    SetVerbosity(u8),
    GetProvider,
    SetProvider(String),
    History(usize),
    Exit,
}

pub const HELP_TEXT: &str = "\
:help                 show this text
:status               show child process health and version
:verbosity [0|1|2]    get or set diagnostic verbosity
:provider [name]      get or set the AI provider
:history [N]          show the last N history entries (default 20)
:exit                 exit the shell";

/// Parses a `:`-prefixed line. `None` means `line` isn't a control
/// command at all (the caller should try the rest of the classification
/// pipeline); `Some(Err(_))` is a user-syntax error to print and continue.
pub fn parse(line: &str) -> Option<Result<Builtin, String>> {
    let rest = line.strip_prefix(':')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next();

    Some(match name {
        "help" => Ok(Builtin::Help),
        "status" => Ok(Builtin::Status),
        "verbosity" => match arg {
            None => Ok(Builtin::GetVerbosity),
            Some(v) => v
                .parse::<u8>()
                .map(Builtin::SetVerbosity)
                .map_err(|_| format!("usage: :verbosity [0|1|2], got {v:?}")),
        },
        "provider" => match arg {
            None => Ok(Builtin::GetProvider),
            Some(p) => Ok(Builtin::SetProvider(p.to_string())),
        },
        "history" => match arg {
            None => Ok(Builtin::History(20)),
            Some(n) => n
                .parse::<usize>()
                .map(Builtin::History)
                .map_err(|_| format!("usage: :history [N], got {n:?}")),
        },
        "exit" | "quit" => Ok(Builtin::Exit),
        other => Err(format!("unknown control command {other:?}; try :help")),
    })
}

fn health_label(h: Health) -> &'static str {
    match h {
        Health::Running => "running",
        Health::Dead => "restarting",
        Health::Degraded => "degraded",
    }
}

/// Renders the `:status` table: one row per supervised child.
pub fn render_status(supervisor: &Supervisor) -> String {
    let version = git_version::git_version!(fallback = env!("CARGO_PKG_VERSION"));
    let rows = vec![
        vec![
            Cell::from("probe"),
            Cell::from(health_label(supervisor.probe.health)),
        ],
        vec![
            Cell::from("middleware"),
            Cell::from(health_label(supervisor.middleware.health)),
        ],
        vec![
            Cell::from("backend"),
            Cell::from(health_label(supervisor.backend.health)),
        ],
    ];
    let table = Table::new(
        Style::Plain,
        rows,
        Some(Headers::from(vec!["component", "status"])),
    )
    .tabulate();
    format!("conduit {version}\n{table}")
}

/// Renders the `:history` table of the last `n` entries.
pub fn render_history(history: &History, n: usize) -> Result<String> {
    let entries = history.tail(n)?;
    let rows = entries
        .into_iter()
        .map(|e| {
            let dt = DateTime::<Utc>::from_utc(
                NaiveDateTime::from_timestamp_opt(e.timestamp as i64, 0).unwrap_or_default(),
                Utc,
            );
            let local = DateTime::<Local>::from(dt);
            vec![
                Cell::from(&local.format("%m/%d %-I:%M%p").to_string()),
                Cell::from(&e.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())),
                Cell::from(&e.line),
            ]
        })
        .collect();
    let table = Table::new(
        Style::Plain,
        rows,
        Some(Headers::from(vec!["time", "exit", "line"])),
    )
    .tabulate();
    Ok(table)
}

pub fn set_verbosity(config: &mut Config, v: u8) -> Result<u8> {
    config.set_verbosity(v)?;
    Ok(config.verbosity)
}

pub fn set_provider(config: &mut Config, provider: String) -> Result<String> {
    config.set_provider(provider)?;
    Ok(config.ai_provider.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_and_status_take_no_args() {
        assert_eq!(parse(":help"), Some(Ok(Builtin::Help)));
        assert_eq!(parse(":status"), Some(Ok(Builtin::Status)));
    }

    #[test]
    fn verbosity_without_arg_is_a_getter() {
        assert_eq!(parse(":verbosity"), Some(Ok(Builtin::GetVerbosity)));
        assert_eq!(parse(":verbosity 2"), Some(Ok(Builtin::SetVerbosity(2))));
    }

    #[test]
    fn bad_verbosity_argument_is_a_user_syntax_error() {
        assert!(matches!(parse(":verbosity nope"), Some(Err(_))));
    }

    #[test]
    fn non_colon_lines_are_not_builtins() {
        assert_eq!(parse("ls -la"), None);
    }

    #[test]
    fn unknown_builtin_reports_usage_hint() {
        let result = parse(":frobnicate");
        assert!(matches!(result, Some(Err(ref msg)) if msg.contains(":help")));
    }

    #[test]
    fn status_table_lists_all_three_children() {
        let supervisor = Supervisor::new();
        let rendered = render_status(&supervisor);
        assert!(rendered.contains("probe"));
        assert!(rendered.contains("middleware"));
        assert!(rendered.contains("backend"));
    }
}
