//! The middleware: a transparent bidirectional proxy between the front
//! end and the backend. The front end connects to `middleware.sock`
//! believing it is `backend.sock`.
//!
//! An accept loop spawns one task per front-end connection, each sharing
//! a single persistent, auto-reconnecting upstream connection to the
//! backend rather than opening a fresh one per request.

pub mod policy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::protocol::SecurityVerdict;
use crate::sockets::{listen_unix, LineConn};

/// Diagnostic-only rolling counters; not consulted by any policy decision.
#[derive(Default)]
pub struct Stats {
    pub allowed: AtomicU64,
    pub blocked: AtomicU64,
}

pub async fn middleware_main(daemonize: bool) -> Result<()> {
    if daemonize {
        daemonize_self()?;
    }

    let socket_path = crate::socket_path(crate::MIDDLEWARE_SOCK);
    let listener = listen_unix(&socket_path).await?;
    info!("middleware listening on {}", socket_path.display());

    let stats = std::sync::Arc::new(Stats::default());
    // One persistent upstream connection, shared and reconnected in place
    // rather than per front-end connection, since there is exactly one
    // real backend and ordering must stay strict FIFO per connection, not
    // concurrent, between front end and backend.
    let upstream = std::sync::Arc::new(Mutex::new(None::<LineConn>));

    loop {
        let (stream, _addr) = listener.accept().await?;
        let upstream = upstream.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_frontend(stream, upstream, stats).await {
                warn!("middleware connection ended: {e}");
            }
        });
    }
}

async fn serve_frontend(
    stream: UnixStream,
    upstream: std::sync::Arc<Mutex<Option<LineConn>>>,
    stats: std::sync::Arc<Stats>,
) -> Result<()> {
    let mut client = LineConn::new(stream);

    while let Some(line) = client.read_line().await? {
        if line.is_empty() {
            continue;
        }

        match policy::evaluate_command(&line) {
            SecurityVerdict::Block(reason) => {
                stats.blocked.fetch_add(1, Ordering::Relaxed);
                write_sec_status(&stats, Some(&reason));
                client.write_line(&format!("blocked:{reason}")).await?;
                continue;
            }
            SecurityVerdict::Allow => {
                stats.allowed.fetch_add(1, Ordering::Relaxed);
                write_sec_status(&stats, None);
            }
        }

        let reply = forward_to_backend(&line, &upstream).await;

        match policy::evaluate_response(&reply) {
            SecurityVerdict::Block(reason) => {
                stats.blocked.fetch_add(1, Ordering::Relaxed);
                write_sec_status(&stats, Some(&reason));
                client.write_line(&format!("blocked:{reason}")).await?;
            }
            SecurityVerdict::Allow => {
                client.write_line(&reply).await?;
            }
        }
    }
    Ok(())
}

/// Best-effort write of the optional status region the front end's prompt
/// polls for a live security glyph. A plain file rather than real shared
/// memory: this is a display optimization, not a correctness primitive
/// (nothing downstream of the socket protocol depends on its contents),
/// so a dropped or stale write is harmless and never logged as an error.
fn write_sec_status(stats: &Stats, last_blocked_reason: Option<&str>) {
    let path = crate::socket_path(crate::SEC_STATUS_FILE);
    let allowed = stats.allowed.load(Ordering::Relaxed);
    let blocked = stats.blocked.load(Ordering::Relaxed);
    let body = format!(
        "allowed={allowed}\nblocked={blocked}\nlast_blocked={}\n",
        last_blocked_reason.unwrap_or("")
    );
    let _ = std::fs::write(path, body);
}

/// Sends `line` to the backend over the shared persistent connection,
/// reconnecting with bounded retries on loss. After retries are exhausted,
/// synthesizes `blocked:backend-unavailable` — indistinguishable to the
/// front end from any other block, preserving transparency.
async fn forward_to_backend(line: &str, upstream: &Mutex<Option<LineConn>>) -> String {
    const MAX_ATTEMPTS: u32 = 3;
    let mut guard = upstream.lock().await;

    for attempt in 0..MAX_ATTEMPTS {
        if guard.is_none() {
            match connect_backend().await {
                Ok(conn) => *guard = Some(conn),
                Err(e) => {
                    warn!("backend connect attempt {attempt} failed: {e}");
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
            }
        }

        let conn = guard.as_mut().expect("just ensured Some");
        match roundtrip(conn, line).await {
            Ok(reply) => return reply,
            Err(e) => {
                warn!("backend roundtrip failed, will reconnect: {e}");
                *guard = None;
                tokio::time::sleep(backoff(attempt)).await;
            }
        }
    }

    let err = crate::error::ConduitError::BackendUnavailable(
        "reconnect attempts exhausted".to_string(),
    );
    warn!("{err}");
    "blocked:backend-unavailable".to_string()
}

async fn roundtrip(conn: &mut LineConn, line: &str) -> Result<String> {
    conn.write_line(line).await?;
    conn.read_line()
        .await?
        .ok_or_else(|| anyhow::anyhow!("backend closed connection"))
}

async fn connect_backend() -> Result<LineConn> {
    let mut conn = LineConn::connect(&crate::socket_path(crate::BACKEND_SOCK)).await?;
    // The backend announces readiness immediately on connect (see
    // `backend::serve_connection`); consume that greeting here so
    // subsequent request/reply pairs line up 1:1.
    let _greeting = conn.read_line().await?;
    Ok(conn)
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100u64.saturating_mul(1 << attempt.min(5)))
}

fn daemonize_self() -> Result<()> {
    let log_path = crate::conduit_dir().join("middleware-daemon.log");
    std::fs::create_dir_all(crate::conduit_dir())?;
    let stdout = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)?;
    let stderr = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)?;
    daemonize::Daemonize::new()
        .working_directory(crate::conduit_dir())
        .stdout(stdout)
        .stderr(stderr)
        .start()?;
    Ok(())
}
