//! The backend: owns the AI-provider session, serves one client (the
//! middleware, which the front end believes is the backend itself), and
//! never executes shell commands directly.
//!
//! Runs as a single-threaded cooperative scheduler — `main.rs` builds a
//! `current_thread` runtime for this mode, since the backend only ever
//! alternates between socket I/O and AI-provider I/O with no CPU-bound
//! work, unlike the middleware which genuinely forwards two directions
//! concurrently per connection.

pub mod ai;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::protocol::{BackendReply, BackendRequest};
use crate::sockets::{listen_unix, LineConn};

use ai::{provider_by_name, AiOutcome, AiProvider};

struct Session {
    cwd: Option<String>,
    provider: Box<dyn AiProvider>,
    verbosity: u8,
}

pub async fn backend_main(daemonize: bool, verbosity: u8) -> Result<()> {
    if daemonize {
        daemonize_self()?;
    }

    let config = Config::load_default().unwrap_or_default();
    let session = Arc::new(Mutex::new(Session {
        cwd: None,
        provider: provider_by_name(&config.ai_provider),
        verbosity,
    }));

    let socket_path = crate::socket_path(crate::BACKEND_SOCK);
    let listener = listen_unix(&socket_path).await?;
    info!("backend listening on {}", socket_path.display());

    // One connection at a time, in strict FIFO order within it; a new
    // connection after a clean disconnect is fine (middleware reconnect
    // after its own restart).
    loop {
        let (stream, _addr) = listener.accept().await?;
        let session = session.clone();
        if let Err(e) = serve_connection(stream, session).await {
            warn!("backend connection ended: {e}");
        }
    }
}

async fn serve_connection(
    stream: tokio::net::UnixStream,
    session: Arc<Mutex<Session>>,
) -> Result<()> {
    let mut conn = LineConn::new(stream);
    // A client that just connected gets announced readiness eagerly; real
    // providers with slow session setup would emit AI_LOADING first and
    // AI_READY once warm, but our stub providers are instant.
    conn.write_line(&BackendReply::AiReady.to_string()).await?;

    while let Some(line) = conn.read_line().await? {
        if line.is_empty() {
            continue;
        }
        let reply = handle_request(&line, &session).await;
        conn.write_line(&reply.to_string()).await?;
    }
    Ok(())
}

async fn handle_request(line: &str, session: &Arc<Mutex<Session>>) -> BackendReply {
    let request = match BackendRequest::parse(line) {
        Ok(r) => r,
        Err(e) => return BackendReply::Edit(format!("malformed request: {e}")),
    };

    match request {
        BackendRequest::Status => BackendReply::AiReady,
        BackendRequest::Cwd(path) => {
            session.lock().await.cwd = Some(path);
            BackendReply::Ok
        }
        BackendRequest::Verbose(v) => {
            session.lock().await.verbosity = v;
            BackendReply::Ok
        }
        BackendRequest::AiProvider(name) => {
            let mut s = session.lock().await;
            s.provider = provider_by_name(&name);
            debug!("AI provider switched to {}", s.provider.name());
            BackendReply::Ok
        }
        BackendRequest::Query(text) => run_query(&text, None, session).await,
        BackendRequest::BashFailed {
            exit_code,
            line,
            output_path,
        } => {
            let ctx = crate::protocol::FailureContext {
                exit_code,
                output_path,
            };
            run_query(&line, Some(ctx), session).await
        }
    }
}

async fn run_query(
    line: &str,
    failure: Option<crate::protocol::FailureContext>,
    session: &Arc<Mutex<Session>>,
) -> BackendReply {
    let s = session.lock().await;
    let cwd = s.cwd.clone().unwrap_or_else(|| "/".to_string());
    match s.provider.respond(line, &cwd, failure.as_ref()).await {
        Ok(AiOutcome::CommandSuggestion(cmd)) => BackendReply::Cmd(cmd),
        Ok(AiOutcome::InformationalText(text)) => BackendReply::Edit(text),
        Err(e) => {
            let err = crate::error::ConduitError::AiProvider(e.to_string());
            error!("{err}");
            BackendReply::Edit(err.to_string())
        }
    }
}

fn daemonize_self() -> Result<()> {
    let log_path = crate::conduit_dir().join("backend-daemon.log");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_without_failure_dispatches_to_provider() {
        let session = Arc::new(Mutex::new(Session {
            cwd: Some("/home/user".to_string()),
            provider: provider_by_name("stub"),
            verbosity: 0,
        }));
        let reply = handle_request("QUERY:please list the pods", &session).await;
        assert_eq!(reply, BackendReply::Cmd("kubectl get pods".to_string()));
    }

    #[tokio::test]
    async fn bash_failed_carries_context_into_provider() {
        let session = Arc::new(Mutex::new(Session {
            cwd: Some("/home/user".to_string()),
            provider: provider_by_name("echo"),
            verbosity: 0,
        }));
        let reply = handle_request(
            "BASH_FAILED:127:kubget pods:/tmp/out-1",
            &session,
        )
        .await;
        match reply {
            BackendReply::Edit(text) => assert!(text.contains("127")),
            other => panic!("expected Edit reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cwd_update_is_visible_to_later_query() {
        let session = Arc::new(Mutex::new(Session {
            cwd: None,
            provider: provider_by_name("echo"),
            verbosity: 0,
        }));
        let _ = handle_request("CWD:/srv/app", &session).await;
        assert_eq!(session.lock().await.cwd.as_deref(), Some("/srv/app"));
    }

    #[tokio::test]
    async fn malformed_request_is_structured_error_reply() {
        let session = Arc::new(Mutex::new(Session {
            cwd: None,
            provider: provider_by_name("echo"),
            verbosity: 0,
        }));
        let reply = handle_request("NOT_A_REAL_MESSAGE", &session).await;
        assert!(matches!(reply, BackendReply::Edit(_)));
    }
}
