//! The front end: the only process a user invokes directly. Owns the
//! terminal, reads lines, classifies and dispatches them, displays
//! results, supervises its three children, and renders the status
//! prompt.

pub mod builtins;
pub mod classify;
pub mod prompt;
pub mod supervisor;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, trace, warn};

use crate::config::Config;
use crate::history::History;
use crate::probe::ProbeClient;
use crate::protocol::{BackendReply, BackendRequest, ProbeVerdict};
use crate::sockets::LineConn;

use prompt::PromptCache;
use supervisor::Supervisor;

const LIVENESS_CHECK_EVERY_N_PROMPTS: u64 = 5;
const SOCKET_WAIT_ATTEMPTS: u32 = 50;
const SOCKET_WAIT_DELAY_MS: u64 = 100;

pub async fn frontend_main() -> Result<()> {
    std::fs::create_dir_all(crate::conduit_dir())?;
    let config = Config::load_default().unwrap_or_default();
    let history = History::open_default();

    let mut supervisor = Supervisor::new();
    supervisor.spawn_all()?;
    wait_for_socket(&crate::socket_path(crate::PROBE_SOCK)).await;
    wait_for_socket(&crate::socket_path(crate::MIDDLEWARE_SOCK)).await;

    let mut fe = Frontend {
        probe: ProbeClient::connect().await.ok(),
        backend: connect_backend().await.ok(),
        config,
        history,
        cwd_sent: None,
    };

    if fe.probe.is_none() {
        warn!("starting without a probe connection; direct execution only");
    }
    if fe.backend.is_none() {
        warn!("starting without a backend connection; AI unavailable");
    }

    let mut prompt_cache = PromptCache::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut tick: u64 = 0;

    println!("conduit: AI-aware interactive shell. Type :help for built-ins.");

    loop {
        tick += 1;
        if tick % LIVENESS_CHECK_EVERY_N_PROMPTS == 0 {
            supervisor.check_liveness().await;
            if fe.probe.is_none() {
                fe.probe = ProbeClient::connect().await.ok();
            }
            if fe.backend.is_none() {
                fe.backend = connect_backend().await.ok();
            }
        }

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        prompt_cache.refresh_if_stale(&cwd);
        print!("{}", prompt_cache.render(&supervisor));
        std::io::stdout().flush().ok();

        let line = match stdin.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => {
                println!();
                break;
            }
            Err(e) => {
                let err = crate::error::ConduitError::FatalTerminal(e.to_string());
                tracing::error!("{err}");
                return Err(err.into());
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        fe.dispatch(&line, &mut supervisor).await;
    }

    Ok(())
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..SOCKET_WAIT_ATTEMPTS {
        if path.exists() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(SOCKET_WAIT_DELAY_MS)).await;
    }
    warn!("timed out waiting for socket {}", path.display());
}

/// Connects to what the front end believes is the backend (actually the
/// middleware, transparently). Unlike a direct connection to the real
/// backend, the middleware never sends an unsolicited greeting on accept
/// — it only replies to requests — so there is nothing to consume here.
async fn connect_backend() -> Result<LineConn> {
    LineConn::connect(&crate::socket_path(crate::MIDDLEWARE_SOCK)).await
}

struct Frontend {
    probe: Option<ProbeClient>,
    backend: Option<LineConn>,
    config: Config,
    history: History,
    cwd_sent: Option<String>,
}

impl Frontend {
    /// Entry point for a user-typed line.
    async fn dispatch(&mut self, line: &str, supervisor: &mut Supervisor) {
        if self.handle_cd(line).await {
            return;
        }
        if let Some(result) = builtins::parse(line) {
            self.run_builtin(result, supervisor).await;
            return;
        }
        if classify::is_structural_tty(line) {
            let code = self.run_tty(line).await;
            self.history.append(line, code).ok();
            return;
        }
        let verdict = self.probe_line(line).await;
        self.handle_verdict(line, verdict, true, supervisor).await;
    }

    /// Redispatch of an AI-suggested command. Same classification rules,
    /// but a further failure here is only reported, never forwarded to
    /// the backend again: the recursion depth is one, by construction,
    /// since this method never calls `fail_forward` with `allow_ai` set.
    async fn dispatch_suggestion(&mut self, line: &str, supervisor: &mut Supervisor) {
        if self.handle_cd(line).await {
            return;
        }
        if let Some(result) = builtins::parse(line) {
            self.run_builtin(result, supervisor).await;
            return;
        }
        if classify::is_structural_tty(line) {
            let code = self.run_tty(line).await;
            self.history.append(line, code).ok();
            return;
        }
        let verdict = self.probe_line(line).await;
        self.handle_verdict(line, verdict, false, supervisor).await;
    }

    /// `cd` is never handed to the probe or shelled out: only the front
    /// end's own working directory is authoritative, and the probe is
    /// kept in sync out of band afterward. Returns whether `line` was a
    /// `cd` invocation at all.
    async fn handle_cd(&mut self, line: &str) -> bool {
        let Some(rest) = line.strip_prefix("cd").filter(|r| r.is_empty() || r.starts_with(char::is_whitespace)) else {
            return false;
        };
        let target = rest.trim();
        let target = if target.is_empty() {
            crate::HOME.clone()
        } else {
            target.to_string()
        };

        match std::env::set_current_dir(&target) {
            Ok(()) => {
                if let Some(probe) = self.probe.as_mut() {
                    let _ = probe.probe(&format!("cd {target}")).await;
                }
                self.history.append(line, Some(0)).ok();
            }
            Err(e) => {
                eprintln!("cd: {e}");
                self.history.append(line, Some(1)).ok();
            }
        }
        true
    }

    async fn run_builtin(&mut self, parsed: Result<builtins::Builtin, String>, supervisor: &Supervisor) {
        use builtins::Builtin;
        match parsed {
            Err(msg) => println!("{msg}"),
            Ok(Builtin::Help) => println!("{}", builtins::HELP_TEXT),
            Ok(Builtin::Status) => println!("{}", builtins::render_status(supervisor)),
            Ok(Builtin::GetVerbosity) => println!("verbosity: {}", self.config.verbosity),
            Ok(Builtin::SetVerbosity(v)) => match builtins::set_verbosity(&mut self.config, v) {
                Ok(v) => println!("verbosity set to {v}"),
                Err(e) => println!("failed to save verbosity: {e}"),
            },
            Ok(Builtin::GetProvider) => println!("provider: {}", self.config.ai_provider),
            Ok(Builtin::SetProvider(p)) => match builtins::set_provider(&mut self.config, p) {
                Ok(p) => {
                    if let Some(backend) = self.backend.as_mut() {
                        let request = BackendRequest::AiProvider(p.clone()).to_string();
                        if backend.write_line(&request).await.is_ok() {
                            let _ = backend.read_line().await;
                        } else {
                            self.backend = None;
                        }
                    }
                    println!("provider set to {p}");
                }
                Err(e) => println!("failed to save provider: {e}"),
            },
            Ok(Builtin::History(n)) => match builtins::render_history(&self.history, n) {
                Ok(table) => println!("{table}"),
                Err(e) => println!("failed to read history: {e}"),
            },
            Ok(Builtin::Exit) => std::process::exit(0),
        }
    }

    async fn probe_line(&mut self, line: &str) -> ProbeVerdict {
        match self.probe.as_mut() {
            Some(probe) => match probe.probe(line).await {
                Ok(v) => v,
                Err(e) => {
                    let err = crate::error::ConduitError::ProbeUnavailable(e.to_string());
                    if err.is_degradable() {
                        info!("{err}; degrading to direct execution");
                    } else {
                        warn!("{err}");
                    }
                    self.probe = None;
                    ProbeVerdict::ProbeUnavailable
                }
            },
            None => ProbeVerdict::ProbeUnavailable,
        }
    }

    async fn handle_verdict(
        &mut self,
        line: &str,
        verdict: ProbeVerdict,
        allow_ai: bool,
        supervisor: &mut Supervisor,
    ) {
        match verdict {
            ProbeVerdict::Ok {
                exit_code: 0,
                stdout,
                stderr,
            } if stderr.is_empty() => {
                print!("{stdout}");
                std::io::stdout().flush().ok();
                self.history.append(line, Some(0)).ok();
            }
            ProbeVerdict::Ok {
                exit_code,
                stdout,
                stderr,
            } => {
                self.fail_forward(line, allow_ai, exit_code, &stdout, &stderr, supervisor)
                    .await;
            }
            ProbeVerdict::Interactive => {
                let code = self.run_tty(line).await;
                self.history.append(line, code).ok();
            }
            ProbeVerdict::Timeout | ProbeVerdict::ProbeUnavailable => {
                info!("probe degraded for this line; executing directly");
                let code = self.run_tty(line).await;
                self.history.append(line, code).ok();
            }
        }
    }

    async fn fail_forward(
        &mut self,
        line: &str,
        allow_ai: bool,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
        supervisor: &mut Supervisor,
    ) {
        if !stdout.is_empty() {
            print!("{stdout}");
        }
        if !stderr.is_empty() {
            eprint!("{stderr}");
        }
        std::io::stdout().flush().ok();
        self.history.append(line, Some(exit_code)).ok();

        if !allow_ai || !classify::meets_minimum_word_count(line) {
            return;
        }

        self.ensure_cwd_synced().await;

        let Some(backend) = self.backend.as_mut() else {
            println!("AI unavailable");
            return;
        };

        let output_path = match write_capture_file(stdout, stderr) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to capture failing command output: {e}");
                return;
            }
        };

        let request = BackendRequest::BashFailed {
            exit_code,
            line: line.to_string(),
            output_path,
        };

        if backend.write_line(&request.to_string()).await.is_err() {
            let err = crate::error::ConduitError::BackendUnavailable(
                "write to backend failed".to_string(),
            );
            warn!("{err}");
            self.backend = None;
            println!("AI unavailable");
            return;
        }

        let reply = match backend.read_line().await {
            Ok(Some(raw)) => BackendReply::parse(&raw),
            Ok(None) | Err(_) => {
                let err = crate::error::ConduitError::BackendUnavailable(
                    "backend closed connection".to_string(),
                );
                warn!("{err}");
                self.backend = None;
                println!("AI unavailable");
                return;
            }
        };

        match reply {
            BackendReply::Cmd(suggestion) => {
                println!("suggestion: {suggestion}");
                Box::pin(self.dispatch_suggestion(&suggestion, supervisor)).await;
            }
            BackendReply::Edit(text) => println!("{text}"),
            BackendReply::Blocked(reason) => println!("blocked: {reason}"),
            other => println!("{other}"),
        }
    }

    async fn ensure_cwd_synced(&mut self) {
        let cwd = std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().to_string());
        if cwd.is_none() || cwd == self.cwd_sent {
            return;
        }
        let path = cwd.clone().expect("checked above");
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let request = BackendRequest::Cwd(path).to_string();
        if backend.write_line(&request).await.is_err() {
            let err = crate::error::ConduitError::BackendUnavailable(
                "write to backend failed".to_string(),
            );
            info!("{err}; degrading to direct execution");
            self.backend = None;
            return;
        }
        match backend.read_line().await {
            Ok(Some(_)) => self.cwd_sent = cwd,
            _ => {
                let err = crate::error::ConduitError::BackendUnavailable(
                    "backend closed connection".to_string(),
                );
                info!("{err}; degrading to direct execution");
                self.backend = None;
            }
        }
    }

    /// Runs `line` with the front end's own controlling terminal,
    /// returning once the child has exited and given the terminal back.
    /// A delegated program (an editor, a pager, `ssh`) is free to leave
    /// the tty's termios in whatever state it pleases; `disable_raw_mode`
    /// is called unconditionally on every exit path below so the prompt
    /// loop always resumes in cooked mode regardless of what the child did.
    async fn run_tty(&mut self, line: &str) -> Option<i32> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let result = tokio::process::Command::new(shell)
            .arg("-c")
            .arg(line)
            .status()
            .await;
        let _ = crossterm::terminal::disable_raw_mode();
        // Testable property (spec §8 invariant 4): after any delegated
        // child exits, the front end must have regained its controlling
        // terminal before the next prompt. There's nothing to restore
        // here (we never handed the fd away, only ran the child
        // foreground on it), but logging the reacquired ctty at trace
        // level gives verbosity-2 users a concrete signal the handoff
        // completed cleanly rather than just trusting it.
        match crate::ctty::session_id() {
            Ok(id) => trace!("regained terminal ownership, session pts/{id}"),
            Err(e) => trace!("could not confirm terminal ownership after delegation: {e}"),
        }
        match result {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("failed to execute {line:?} directly: {e}");
                None
            }
        }
    }
}

/// Captures a failing command's streams into a file under `.conduit/` so
/// the backend's failure-context request can reference it by path rather
/// than inlining arbitrarily large output onto the wire.
fn write_capture_file(stdout: &str, stderr: &str) -> Result<String> {
    std::fs::create_dir_all(crate::conduit_dir())?;
    let mut f = tempfile::Builder::new()
        .prefix("conduit-out-")
        .tempfile_in(crate::conduit_dir())?;
    writeln!(f, "--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")?;
    let (_, path) = f.keep()?;
    Ok(path.to_string_lossy().to_string())
}
