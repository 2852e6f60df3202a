//! Status-prompt rendering: one glyph per supervised process, plus
//! optional cached context glyphs (VCS branch, cluster, namespace),
//! refreshed on a TTL so rendering a prompt never depends on a
//! filesystem walk or a process lookup on every keystroke.

use std::time::Instant;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::frontend::supervisor::Supervisor;

pub struct PromptCache {
    branch: Option<String>,
    cluster: Option<String>,
    namespace: Option<String>,
    blocked_count: Option<u64>,
    refreshed_at: Option<Instant>,
}

impl PromptCache {
    pub fn new() -> PromptCache {
        PromptCache {
            branch: None,
            cluster: None,
            namespace: None,
            blocked_count: None,
            refreshed_at: None,
        }
    }

    fn is_stale(&self) -> bool {
        match self.refreshed_at {
            None => true,
            Some(t) => t.elapsed().as_secs() >= crate::PROMPT_CACHE_TTL_SECS,
        }
    }

    /// Refreshes the cached context glyphs if the TTL has elapsed. Branch
    /// detection reads `.git/HEAD` directly rather than shelling out to
    /// `git`; cluster/namespace come from environment variables, kept
    /// best-effort and silent on any failure since none of this affects
    /// correctness.
    pub fn refresh_if_stale(&mut self, cwd: &std::path::Path) {
        if !self.is_stale() {
            return;
        }
        self.branch = read_git_branch(cwd).map(|b| strip_zero_width_graphemes(&b));
        self.cluster = std::env::var("CONDUIT_CLUSTER").ok();
        self.namespace = std::env::var("CONDUIT_NAMESPACE").ok();
        self.blocked_count = read_blocked_count(&crate::socket_path(crate::SEC_STATUS_FILE));
        self.refreshed_at = Some(Instant::now());
    }

    pub fn render(&self, supervisor: &Supervisor) -> String {
        let mut out = String::new();
        out.push(Supervisor::glyph_for(supervisor.probe.health));
        out.push(Supervisor::glyph_for(supervisor.middleware.health));
        out.push(Supervisor::glyph_for(supervisor.backend.health));
        if matches!(self.blocked_count, Some(n) if n > 0) {
            out.push('!');
        }

        if let Some(branch) = &self.branch {
            out.push(' ');
            out.push_str(branch);
        }
        if let Some(cluster) = &self.cluster {
            out.push_str(" [");
            out.push_str(cluster);
            if let Some(ns) = &self.namespace {
                out.push(':');
                out.push_str(ns);
            }
            out.push(']');
        }
        out.push_str(" > ");
        out
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        PromptCache::new()
    }
}

/// Branch names are arbitrary bytes as far as git is concerned; strip any
/// zero-display-width grapheme (combining marks, joiners) so a crafted or
/// unusual branch name can't desync the prompt's rendered width from what
/// the terminal actually shows.
fn strip_zero_width_graphemes(s: &str) -> String {
    s.graphemes(true)
        .filter(|g| g.width() > 0)
        .collect()
}

/// Reads the middleware's optional `sec-status.shm` status region: a
/// plain file polled at the same cadence as the rest of the prompt cache
/// rather than true shared memory, since it is a display optimization
/// and nothing correctness-bearing ever reads it. Absent or unparsable
/// is simply "no glyph", never an error.
fn read_blocked_count(path: &std::path::Path) -> Option<u64> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.lines().find_map(|l| l.strip_prefix("blocked=")?.parse().ok())
}

fn read_git_branch(cwd: &std::path::Path) -> Option<String> {
    let mut dir = cwd.to_path_buf();
    loop {
        let head = dir.join(".git").join("HEAD");
        if head.is_file() {
            let contents = std::fs::read_to_string(&head).ok()?;
            let contents = contents.trim();
            return contents
                .strip_prefix("ref: refs/heads/")
                .map(|b| b.to_string())
                .or_else(|| Some(contents.chars().take(7).collect()));
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cache_reports_stale_until_first_refresh() {
        let cache = PromptCache::new();
        assert!(cache.is_stale());
    }

    #[test]
    fn render_includes_one_glyph_per_child() {
        let cache = PromptCache::new();
        let supervisor = Supervisor::new();
        let rendered = cache.render(&supervisor);
        let glyph_count = rendered
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '>')
            .count();
        assert_eq!(glyph_count, 3);
    }

    #[test]
    fn zero_width_graphemes_are_stripped_from_branch_names() {
        let dirty = "feature\u{200d}/thing";
        let clean = strip_zero_width_graphemes(dirty);
        assert_eq!(clean, "feature/thing");
    }

    #[test]
    fn blocked_count_is_parsed_from_sec_status_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sec-status.shm");
        std::fs::write(&path, "allowed=12\nblocked=3\nlast_blocked=destructive-filesystem\n").unwrap();
        assert_eq!(read_blocked_count(&path), Some(3));
    }

    #[test]
    fn missing_sec_status_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_blocked_count(&dir.path().join("nope.shm")), None);
    }

    #[test]
    fn git_branch_detection_walks_up_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("HEAD"), "ref: refs/heads/main\n").unwrap();
        let sub = dir.path().join("src").join("inner");
        std::fs::create_dir_all(&sub).unwrap();
        assert_eq!(read_git_branch(&sub), Some("main".to_string()));
    }
}
