//! User-level configuration file: key=value lines under
//! `$HOME/.conduit/config`, unknown keys ignored, rewritten atomically by
//! the control-command surface (`:verbosity`, `:provider`).
//!
//! Provider credentials are deliberately never read from here, only from
//! the environment — that's an AI provider client concern, not this
//! repository's.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub verbosity: u8,
    pub ai_provider: String,
    pub model: Option<String>,
    path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbosity: 0,
            ai_provider: "echo".to_string(),
            model: None,
            path: crate::conduit_dir().join(crate::CONFIG_FILE),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults for anything missing or
    /// unparsable. Unknown keys are ignored, not an error.
    pub fn load(path: &Path) -> Result<Config> {
        let mut cfg = Config {
            path: path.to_path_buf(),
            ..Config::default()
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cfg),
            Err(e) => return Err(e).context(format!("reading config file {}", path.display())),
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("ignoring malformed config line: {line:?}");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "verbosity" => match value.parse::<u8>() {
                    Ok(v) if v <= 2 => cfg.verbosity = v,
                    _ => warn!("ignoring invalid verbosity value: {value:?}"),
                },
                "ai_provider" => cfg.ai_provider = value.to_string(),
                "model" => cfg.model = Some(value.to_string()),
                other => debug!("ignoring unknown config key: {other:?}"),
            }
        }

        Ok(cfg)
    }

    pub fn load_default() -> Result<Config> {
        Config::load(&crate::conduit_dir().join(crate::CONFIG_FILE))
    }

    /// Serialize back to key=value lines and write atomically
    /// (write-to-temp + rename), so a concurrent reader never observes a
    /// half-written file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut map = BTreeMap::new();
        map.insert("verbosity", self.verbosity.to_string());
        map.insert("ai_provider", self.ai_provider.clone());
        if let Some(model) = &self.model {
            map.insert("model", model.clone());
        }

        let mut body = String::new();
        for (k, v) in map {
            body.push_str(&format!("{k}={v}\n"));
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut f = std::fs::File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        f.write_all(body.as_bytes())?;
        f.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming config into place at {}", self.path.display()))?;
        Ok(())
    }

    pub fn set_verbosity(&mut self, v: u8) -> Result<()> {
        self.verbosity = v.min(2);
        self.save()
    }

    pub fn set_provider(&mut self, provider: impl Into<String>) -> Result<()> {
        self.ai_provider = provider.into();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "verbosity=2\nfrobnicate=yes\nai_provider=stub\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.verbosity, 2);
        assert_eq!(cfg.ai_provider, "stub");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg, Config { path, ..Config::default() });
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let mut cfg = Config::load(&path).unwrap();
        cfg.set_verbosity(1).unwrap();
        cfg.set_provider("acme").unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.verbosity, 1);
        assert_eq!(reloaded.ai_provider, "acme");
    }

    #[test]
    fn out_of_range_verbosity_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let mut cfg = Config::load(&path).unwrap();
        cfg.set_verbosity(9).unwrap();
        assert_eq!(cfg.verbosity, 2);
    }
}
