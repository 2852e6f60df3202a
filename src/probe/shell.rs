//! The probe's inner non-interactive shell process, and the
//! interactivity-detection heuristic: if the shell's primary prompt
//! reappears on stdout before the sentinel does, the launched program gave
//! the terminal back to the shell without producing terminating output of
//! its own — the signature of something that wanted a TTY (an editor, a
//! pager, a remote login, a nested REPL).

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStderr, ChildStdout};
use tracing::{debug, warn};

use crate::protocol::ProbeVerdict;

const READ_CHUNK: usize = 4096;

pub struct InnerShell {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    /// Captured once at startup: the shell's own prompt, printed when it's
    /// sitting idle waiting for input with nothing left to say.
    primary_prompt: Vec<u8>,
    sentinel_counter: u64,
}

impl InnerShell {
    pub async fn spawn() -> Result<InnerShell> {
        let shell_path = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let mut child = tokio::process::Command::new(&shell_path)
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PS1", "__conduit_probe_prompt__$ ")
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning probe shell {shell_path}"))?;

        let stdin = child.stdin.take().context("no stdin on probe shell")?;
        let stdout = child.stdout.take().context("no stdout on probe shell")?;
        let stderr = child.stderr.take().context("no stderr on probe shell")?;

        let mut shell = InnerShell {
            child,
            stdin,
            stdout,
            stderr,
            primary_prompt: Vec::new(),
            sentinel_counter: 0,
        };

        // Let the shell settle and print its first prompt before we
        // consider it ready; this is the prompt we'll later recognize as
        // the signature of a program handing control back.
        let mut buf = vec![0u8; READ_CHUNK];
        match tokio::time::timeout(
            Duration::from_secs(crate::PROBE_TIMEOUT_SECS),
            shell.stdout.read(&mut buf),
        )
        .await
        {
            Ok(Ok(n)) if n > 0 => shell.primary_prompt = buf[..n].to_vec(),
            _ => {
                shell.primary_prompt = b"__conduit_probe_prompt__$ ".to_vec();
                warn!("probe shell did not print a prompt within startup timeout; using fallback");
            }
        }

        Ok(shell)
    }

    pub async fn probe_line(&mut self, line: &str) -> ProbeVerdict {
        match self.probe_line_inner(line).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("probe shell died or errored ({e}); respawning");
                match InnerShell::spawn().await {
                    Ok(fresh) => {
                        *self = fresh;
                    }
                    Err(e2) => {
                        warn!("failed to respawn probe shell: {e2}");
                    }
                }
                ProbeVerdict::ProbeUnavailable
            }
        }
    }

    async fn probe_line_inner(&mut self, line: &str) -> Result<ProbeVerdict> {
        self.sentinel_counter += 1;
        let sentinel = crate::util::make_sentinel(self.sentinel_counter);

        let script = format!("{line}\nprintf '%s\\n%d\\n' '{sentinel}' \"$?\"\n");
        self.stdin.write_all(script.as_bytes()).await?;
        self.stdin.flush().await?;

        let mut stdout_buf: Vec<u8> = Vec::new();
        let mut stderr_buf: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(crate::PROBE_TIMEOUT_SECS);

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                if stdout_buf.ends_with(&self.primary_prompt) && !self.primary_prompt.is_empty() {
                    return Ok(ProbeVerdict::Interactive);
                }
                return Ok(ProbeVerdict::Timeout);
            }

            tokio::select! {
                r = self.stdout.read(&mut chunk) => {
                    let n = r?;
                    if n == 0 {
                        anyhow::bail!("probe shell stdout closed");
                    }
                    stdout_buf.extend_from_slice(&chunk[..n]);
                    if let Some(exit_code) = find_sentinel(&stdout_buf, &sentinel) {
                        let stdout = strip_sentinel(&stdout_buf, &sentinel);
                        return Ok(ProbeVerdict::Ok {
                            exit_code,
                            stdout,
                            stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                        });
                    }
                    if stdout_buf.ends_with(&self.primary_prompt) && !self.primary_prompt.is_empty() {
                        return Ok(ProbeVerdict::Interactive);
                    }
                }
                r = self.stderr.read(&mut chunk) => {
                    let n = r?;
                    if n > 0 {
                        stderr_buf.extend_from_slice(&chunk[..n]);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if stdout_buf.ends_with(&self.primary_prompt) && !self.primary_prompt.is_empty() {
                        return Ok(ProbeVerdict::Interactive);
                    }
                    return Ok(ProbeVerdict::Timeout);
                }
            }
        }
    }
}

impl Drop for InnerShell {
    fn drop(&mut self) {
        debug!("probe shell pid {:?} dropped", self.child.id());
    }
}

/// Looks for `<sentinel>\n<exit_code>\n` in the accumulated stdout and, if
/// present, returns the exit code.
fn find_sentinel(buf: &[u8], sentinel: &str) -> Option<i32> {
    let text = String::from_utf8_lossy(buf);
    let idx = text.find(sentinel)?;
    let after = &text[idx + sentinel.len()..];
    let trimmed = after.trim_start_matches(['\n', '\r']);
    let exit_code_str: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    exit_code_str.parse().ok()
}

fn strip_sentinel(buf: &[u8], sentinel: &str) -> String {
    let text = String::from_utf8_lossy(buf);
    match text.find(sentinel) {
        Some(idx) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_sentinel_extracts_exit_code() {
        let buf = b"hello world\nSENTINEL-1\n0\n".to_vec();
        assert_eq!(find_sentinel(&buf, "SENTINEL-1"), Some(0));
    }

    #[test]
    fn find_sentinel_absent_returns_none() {
        let buf = b"hello world\n".to_vec();
        assert_eq!(find_sentinel(&buf, "SENTINEL-1"), None);
    }

    #[test]
    fn strip_sentinel_keeps_only_preceding_output() {
        let buf = b"line one\nline two\nSENTINEL-9\n0\n".to_vec();
        assert_eq!(strip_sentinel(&buf, "SENTINEL-9"), "line one\nline two\n");
    }
}
