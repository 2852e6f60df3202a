//! Wire-level data model.
//!
//! Every socket in this pipeline speaks a textual, line-terminated
//! request/response protocol, so the "codec" here is just
//! `AsyncBufReadExt::lines()` on one side and `write_all` of
//! `format!("{msg}\n")` on the other, with plain prefix-matching parsers
//! rather than a generic RPC framework.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The probe's classification of a candidate command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeVerdict {
    Ok {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    Interactive,
    Timeout,
    ProbeUnavailable,
}

/// Escapes embedded newlines/backslashes so a captured stdout/stderr body
/// (which may itself be multi-line) survives as a single wire line.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl ProbeVerdict {
    /// Renders as exactly three wire lines:
    /// `EXIT_CODE:...`, `STDOUT:...`, `STDERR:...`, each newline-escaped so
    /// a multi-line captured body still fits on one protocol line.
    pub fn to_wire_lines(&self) -> [String; 3] {
        match self {
            ProbeVerdict::Ok {
                exit_code,
                stdout,
                stderr,
            } => [
                format!("EXIT_CODE:{exit_code}"),
                format!("STDOUT:{}", escape(stdout)),
                format!("STDERR:{}", escape(stderr)),
            ],
            ProbeVerdict::Interactive => [
                "EXIT_CODE:INTERACTIVE".to_string(),
                "STDOUT:".to_string(),
                "STDERR:".to_string(),
            ],
            ProbeVerdict::Timeout => [
                "EXIT_CODE:TIMEOUT".to_string(),
                "STDOUT:".to_string(),
                "STDERR:".to_string(),
            ],
            ProbeVerdict::ProbeUnavailable => [
                "EXIT_CODE:UNAVAILABLE".to_string(),
                "STDOUT:".to_string(),
                "STDERR:".to_string(),
            ],
        }
    }

    /// Parse the `EXIT_CODE:...`/`STDOUT:...`/`STDERR:...` triple the probe
    /// sends back (see `to_wire_lines`).
    pub fn parse(exit_line: &str, stdout: &str, stderr: &str) -> anyhow::Result<ProbeVerdict> {
        let code = exit_line
            .strip_prefix("EXIT_CODE:")
            .ok_or_else(|| anyhow::anyhow!("malformed probe response: {exit_line:?}"))?;
        Ok(match code {
            "INTERACTIVE" => ProbeVerdict::Interactive,
            "TIMEOUT" => ProbeVerdict::Timeout,
            "UNAVAILABLE" => ProbeVerdict::ProbeUnavailable,
            n => ProbeVerdict::Ok {
                exit_code: n.parse()?,
                stdout: unescape(stdout.strip_prefix("STDOUT:").unwrap_or(stdout)),
                stderr: unescape(stderr.strip_prefix("STDERR:").unwrap_or(stderr)),
            },
        })
    }
}

/// Optional failure context attached to a `QUERY`/`BASH_FAILED` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    pub exit_code: i32,
    pub output_path: String,
}

/// Client (front end, as seen through the middleware) -> proxy/backend
/// messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    Status,
    Cwd(String),
    Query(String),
    BashFailed {
        exit_code: i32,
        line: String,
        output_path: String,
    },
    Verbose(u8),
    AiProvider(String),
}

impl fmt::Display for BackendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendRequest::Status => write!(f, "STATUS"),
            BackendRequest::Cwd(path) => write!(f, "CWD:{path}"),
            BackendRequest::Query(line) => write!(f, "QUERY:{line}"),
            BackendRequest::BashFailed {
                exit_code,
                line,
                output_path,
            } => write!(f, "BASH_FAILED:{exit_code}:{line}:{output_path}"),
            BackendRequest::Verbose(v) => write!(f, "VERBOSE:{v}"),
            BackendRequest::AiProvider(p) => write!(f, "AI_PROVIDER:{p}"),
        }
    }
}

impl BackendRequest {
    pub fn parse(line: &str) -> anyhow::Result<BackendRequest> {
        if line == "STATUS" {
            return Ok(BackendRequest::Status);
        }
        if let Some(rest) = line.strip_prefix("CWD:") {
            return Ok(BackendRequest::Cwd(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("QUERY:") {
            return Ok(BackendRequest::Query(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("BASH_FAILED:") {
            // exit_code:raw-line:path-to-captured-output
            let mut parts = rest.splitn(3, ':');
            let exit_code: i32 = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing exit_code in BASH_FAILED"))?
                .parse()?;
            let raw_line = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing raw-line in BASH_FAILED"))?
                .to_string();
            let output_path = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing output path in BASH_FAILED"))?
                .to_string();
            return Ok(BackendRequest::BashFailed {
                exit_code,
                line: raw_line,
                output_path,
            });
        }
        if let Some(rest) = line.strip_prefix("VERBOSE:") {
            return Ok(BackendRequest::Verbose(rest.parse()?));
        }
        if let Some(rest) = line.strip_prefix("AI_PROVIDER:") {
            return Ok(BackendRequest::AiProvider(rest.to_string()));
        }
        anyhow::bail!("unrecognized request: {line:?}")
    }
}

/// Proxy/backend -> client replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    AiReady,
    AiLoading,
    AiFailed,
    Ok,
    Cmd(String),
    Edit(String),
    Blocked(String),
}

impl fmt::Display for BackendReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendReply::AiReady => write!(f, "AI_READY"),
            BackendReply::AiLoading => write!(f, "AI_LOADING"),
            BackendReply::AiFailed => write!(f, "AI_FAILED"),
            BackendReply::Ok => write!(f, "OK"),
            BackendReply::Cmd(c) => write!(f, "cmd:{c}"),
            BackendReply::Edit(t) => write!(f, "edit:{t}"),
            BackendReply::Blocked(reason) => write!(f, "blocked:{reason}"),
        }
    }
}

impl BackendReply {
    /// Any payload not matching one of the known prefixes degrades
    /// gracefully to informational text.
    pub fn parse(line: &str) -> BackendReply {
        match line {
            "AI_READY" => BackendReply::AiReady,
            "AI_LOADING" => BackendReply::AiLoading,
            "AI_FAILED" => BackendReply::AiFailed,
            "OK" => BackendReply::Ok,
            _ => {
                if let Some(rest) = line.strip_prefix("cmd:") {
                    BackendReply::Cmd(rest.to_string())
                } else if let Some(rest) = line.strip_prefix("edit:") {
                    BackendReply::Edit(rest.to_string())
                } else if let Some(rest) = line.strip_prefix("blocked:") {
                    BackendReply::Blocked(rest.to_string())
                } else {
                    BackendReply::Edit(line.to_string())
                }
            }
        }
    }
}

/// The middleware's per-message verdict. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityVerdict {
    Allow,
    Block(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_request_round_trips() {
        let reqs = vec![
            BackendRequest::Status,
            BackendRequest::Cwd("/home/user/project".to_string()),
            BackendRequest::Query("please list the pods".to_string()),
            BackendRequest::BashFailed {
                exit_code: 127,
                line: "kubget pods".to_string(),
                output_path: "/tmp/conduit-out-1".to_string(),
            },
            BackendRequest::Verbose(2),
            BackendRequest::AiProvider("acme".to_string()),
        ];
        for req in reqs {
            let wire = req.to_string();
            let parsed = BackendRequest::parse(&wire).unwrap();
            assert_eq!(parsed, req);
        }
    }

    #[test]
    fn backend_reply_unknown_payload_degrades_to_edit() {
        let reply = BackendReply::parse("some nonsense the backend should never send");
        assert_eq!(
            reply,
            BackendReply::Edit("some nonsense the backend should never send".to_string())
        );
    }

    #[test]
    fn backend_reply_known_prefixes_parse() {
        assert_eq!(
            BackendReply::parse("cmd:kubectl get pods"),
            BackendReply::Cmd("kubectl get pods".to_string())
        );
        assert_eq!(
            BackendReply::parse("blocked:destructive-filesystem"),
            BackendReply::Blocked("destructive-filesystem".to_string())
        );
    }

    #[test]
    fn probe_verdict_ok_round_trips() {
        let exit_line = "EXIT_CODE:0";
        let stdout = "STDOUT:hello\n";
        let stderr = "STDERR:";
        let verdict = ProbeVerdict::parse(exit_line, stdout, stderr).unwrap();
        assert_eq!(
            verdict,
            ProbeVerdict::Ok {
                exit_code: 0,
                stdout: "hello\n".to_string(),
                stderr: "".to_string(),
            }
        );
    }
}
