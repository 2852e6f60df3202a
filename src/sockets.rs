//! Unix-domain stream-socket plumbing shared by all four components.
//! Every rendezvous point here speaks a line-terminated request/response
//! protocol, so this is a thin wrapper around `AsyncBufReadExt::lines()`
//! rather than a generic RPC transport.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

/// Binds a fresh listener at `path`, removing a stale socket file left
/// behind by an unclean previous shutdown (a dead owner may not have
/// gotten to remove it itself).
pub async fn listen_unix(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating socket directory {}", parent.display()))?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context(format!("removing stale socket {}", path.display())),
    }
    UnixListener::bind(path).with_context(|| format!("binding socket {}", path.display()))
}

/// A single request/response line connection, read half and write half
/// kept separate so a caller can hold a read future and a write future
/// concurrently if a protocol ever needs it (none here do yet).
pub struct LineConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineConn {
    pub fn new(stream: UnixStream) -> LineConn {
        let (read_half, write_half) = stream.into_split();
        LineConn {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    pub async fn connect(path: &Path) -> Result<LineConn> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("connecting to {}", path.display()))?;
        Ok(LineConn::new(stream))
    }

    /// Reads one line, with the trailing newline stripped. `None` on EOF.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
