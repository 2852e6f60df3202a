//! Pure decision helpers for the line-classification pipeline: which
//! programs must own the terminal without being probed first, and which
//! failed lines are short enough to just report rather than hand to the
//! AI provider.

const STRUCTURAL_TTY_PROGRAMS: &[&str] = &[
    "vi", "vim", "nvim", "emacs", "nano", "pico",
    "less", "more", "man",
    "ssh", "telnet", "ftp", "sftp",
    "mysql", "psql", "sqlite3",
    "python", "python3", "irb", "node", "ghci",
    "top", "htop", "watch", "tmux", "screen",
    "sudo", "su", "passwd",
];

pub fn first_token(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

fn basename(token: &str) -> &str {
    token.rsplit('/').next().unwrap_or(token)
}

/// True if `line`'s program always demands a TTY and must not be probed
/// first (editors, pagers, remote-login, REPLs, elevated-privilege entry).
pub fn is_structural_tty(line: &str) -> bool {
    match first_token(line) {
        Some(tok) => STRUCTURAL_TTY_PROGRAMS.contains(&basename(tok)),
        None => false,
    }
}

/// At least three whitespace-separated tokens, so a typo never burns an
/// AI call.
pub fn meets_minimum_word_count(line: &str) -> bool {
    line.split_whitespace().count() >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vi_with_path_triggers_structural_override() {
        assert!(is_structural_tty("vi notes.txt"));
        assert!(is_structural_tty("/usr/bin/vim notes.txt"));
    }

    #[test]
    fn ordinary_command_does_not_trigger_override() {
        assert!(!is_structural_tty("ls -la"));
        assert!(!is_structural_tty("git status"));
    }

    #[test]
    fn minimum_word_rule_rejects_short_lines() {
        assert!(!meets_minimum_word_count("fo"));
        assert!(!meets_minimum_word_count("ls -l"));
        assert!(meets_minimum_word_count("please list the pods"));
    }

    #[test]
    fn empty_line_has_no_first_token() {
        assert_eq!(first_token(""), None);
    }
}
