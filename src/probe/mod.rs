//! The probe: a long-lived non-interactive system shell, pre-executing
//! candidate command lines and reporting a verdict without ever taking
//! over a terminal itself.
//!
//! Connections are accepted concurrently, but the single inner shell is
//! shared state across them — only one request may be in flight at a
//! time — so requests are serialized through a `tokio::sync::Mutex`
//! rather than handled on independent spawned tasks.

mod shell;

use std::sync::Arc;

use anyhow::Result;
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::protocol::ProbeVerdict;
use crate::sockets::{listen_unix, LineConn};

pub use shell::InnerShell;

pub async fn probe_main(daemonize: bool) -> Result<()> {
    if daemonize {
        daemonize_self()?;
    }

    let socket_path = crate::socket_path(crate::PROBE_SOCK);
    let listener: UnixListener = listen_unix(&socket_path).await?;
    info!("probe listening on {}", socket_path.display());

    let shell = Arc::new(Mutex::new(InnerShell::spawn().await?));

    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(x) => x,
            Err(e) => {
                error!("accept error: {e}");
                continue;
            }
        };
        let shell = shell.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, shell).await {
                warn!("probe connection ended: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    shell: Arc<Mutex<InnerShell>>,
) -> Result<()> {
    let mut conn = LineConn::new(stream);
    while let Some(line) = conn.read_line().await? {
        if line.is_empty() {
            continue;
        }
        let verdict = {
            let mut shell = shell.lock().await;
            shell.probe_line(&line).await
        };
        for part in verdict.to_wire_lines() {
            conn.write_line(&part).await?;
        }
    }
    Ok(())
}

fn daemonize_self() -> Result<()> {
    let log_path = crate::conduit_dir().join("probe-daemon.log");
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

/// Client-side helper used by the front end to talk to the probe.
pub struct ProbeClient {
    conn: LineConn,
}

impl ProbeClient {
    pub async fn connect() -> Result<ProbeClient> {
        let conn = LineConn::connect(&crate::socket_path(crate::PROBE_SOCK)).await?;
        Ok(ProbeClient { conn })
    }

    pub async fn probe(&mut self, line: &str) -> Result<ProbeVerdict> {
        self.conn.write_line(line).await?;
        let exit_line = self
            .conn
            .read_line()
            .await?
            .ok_or_else(|| anyhow::anyhow!("probe closed connection"))?;
        let stdout = self
            .conn
            .read_line()
            .await?
            .ok_or_else(|| anyhow::anyhow!("probe closed connection"))?;
        let stderr = self
            .conn
            .read_line()
            .await?
            .ok_or_else(|| anyhow::anyhow!("probe closed connection"))?;
        ProbeVerdict::parse(&exit_line, &stdout, &stderr)
    }
}
