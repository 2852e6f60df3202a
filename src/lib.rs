pub mod backend;
pub mod config;
pub mod ctty;
pub mod error;
pub mod frontend;
pub mod history;
pub mod middleware;
pub mod probe;
pub mod protocol;
pub mod sockets;
pub mod util;

lazy_static::lazy_static! {
    /// `$HOME`, resolved once at startup.
    pub static ref HOME: String = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
}

/// Directory under `$HOME` holding socket rendezvous points, the config
/// file, the history file and logs. Created on first use by whichever
/// component starts first.
pub fn conduit_dir() -> std::path::PathBuf {
    std::path::Path::new(HOME.as_str()).join(".conduit")
}

pub const PROBE_SOCK: &str = "probe.sock";
pub const MIDDLEWARE_SOCK: &str = "middleware.sock";
pub const BACKEND_SOCK: &str = "backend.sock";
pub const SEC_STATUS_FILE: &str = "sec-status.shm";
pub const CONFIG_FILE: &str = "config";
pub const HISTORY_FILE: &str = "history.log";

pub fn socket_path(name: &str) -> std::path::PathBuf {
    conduit_dir().join(name)
}

/// At most this many restarts within `RESTART_WINDOW_SECS` before a
/// supervised child is marked permanently degraded.
pub const MAX_RESTARTS: u32 = 3;
pub const RESTART_WINDOW_SECS: u64 = 60;

/// Probe's per-call wall-clock budget.
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Prompt status-glyph cache TTL.
pub const PROMPT_CACHE_TTL_SECS: u64 = 5;
