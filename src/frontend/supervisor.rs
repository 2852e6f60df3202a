//! Supervises the three child processes the front end spawns and depends
//! on, restarting each within a bounded budget and otherwise marking it
//! permanently degraded so the REPL can keep reporting accurate status
//! instead of retrying forever against a process that will never come
//! back up clean.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Running,
    Dead,
    Degraded,
}

pub struct ChildRecord {
    pub name: &'static str,
    mode_flag: &'static str,
    child: Option<Child>,
    pid: Option<u32>,
    restart_log: VecDeque<Instant>,
    pub health: Health,
}

impl ChildRecord {
    fn new(name: &'static str, mode_flag: &'static str) -> ChildRecord {
        ChildRecord {
            name,
            mode_flag,
            child: None,
            pid: None,
            restart_log: VecDeque::new(),
            health: Health::Dead,
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let exe = std::env::current_exe().context("resolving current executable")?;
        let mut cmd = Command::new(exe);
        cmd.arg("--mode").arg(self.mode_flag);
        cmd.kill_on_drop(true);
        let child = cmd
            .spawn()
            .with_context(|| format!("spawning {} child", self.name))?;
        self.pid = child.id();
        self.child = Some(child);
        self.health = Health::Running;
        info!("spawned {} (pid {:?})", self.name, self.pid);
        Ok(())
    }

    /// True if still within the restart budget and a restart was issued.
    fn try_restart(&mut self) -> bool {
        let now = Instant::now();
        while let Some(front) = self.restart_log.front() {
            if now.duration_since(*front) > Duration::from_secs(crate::RESTART_WINDOW_SECS) {
                self.restart_log.pop_front();
            } else {
                break;
            }
        }
        if self.restart_log.len() as u32 >= crate::MAX_RESTARTS {
            self.health = Health::Degraded;
            error!(
                "{} exceeded {} restarts in {}s; marking degraded",
                self.name,
                crate::MAX_RESTARTS,
                crate::RESTART_WINDOW_SECS
            );
            return false;
        }
        self.restart_log.push_back(now);
        match self.spawn() {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to restart {}: {e}", self.name);
                self.health = Health::Dead;
                false
            }
        }
    }
}

pub struct Supervisor {
    pub probe: ChildRecord,
    pub middleware: ChildRecord,
    pub backend: ChildRecord,
    system: System,
}

impl Supervisor {
    pub fn new() -> Supervisor {
        Supervisor {
            probe: ChildRecord::new("probe", "probe"),
            middleware: ChildRecord::new("middleware", "middleware"),
            backend: ChildRecord::new("backend", "backend"),
            system: System::new(),
        }
    }

    pub fn spawn_all(&mut self) -> Result<()> {
        self.probe.spawn()?;
        self.middleware.spawn()?;
        self.backend.spawn()?;
        Ok(())
    }

    /// Samples each child's liveness once and restarts (or degrades) any
    /// that are gone.
    pub async fn check_liveness(&mut self) {
        for record in [&mut self.probe, &mut self.middleware, &mut self.backend] {
            if record.health == Health::Degraded {
                continue;
            }
            let alive = match &mut record.child {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => false,
            };
            if alive {
                if let Some(pid) = record.pid {
                    self.system.refresh_process(Pid::from_u32(pid));
                    if self.system.process(Pid::from_u32(pid)).is_none() {
                        warn!("{} (pid {pid}) vanished from process table", record.name);
                        record.health = Health::Dead;
                        record.try_restart();
                    }
                }
                continue;
            }
            warn!("{} is dead; attempting restart", record.name);
            record.health = Health::Dead;
            record.try_restart();
        }
    }

    pub fn glyph_for(health: Health) -> char {
        match health {
            Health::Running => '\u{25cf}',  // ● solid: healthy
            Health::Dead => '\u{25cb}',     // ○ hollow: dead, restart pending
            Health::Degraded => '\u{2715}', // ✕ cross: permanently degraded
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Supervisor::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_budget_exhausts_after_max_restarts() {
        let mut record = ChildRecord::new("probe", "probe");
        // Pretend we already used up the budget without actually
        // spawning real child processes (spawn() would need a real exe).
        let now = Instant::now();
        for _ in 0..crate::MAX_RESTARTS {
            record.restart_log.push_back(now);
        }
        let now2 = Instant::now();
        while let Some(front) = record.restart_log.front() {
            if now2.duration_since(*front) > Duration::from_secs(crate::RESTART_WINDOW_SECS) {
                record.restart_log.pop_front();
            } else {
                break;
            }
        }
        assert!(record.restart_log.len() as u32 >= crate::MAX_RESTARTS);
    }

    #[test]
    fn glyphs_are_distinct() {
        let glyphs = [
            Supervisor::glyph_for(Health::Running),
            Supervisor::glyph_for(Health::Dead),
            Supervisor::glyph_for(Health::Degraded),
        ];
        assert_eq!(glyphs.len(), glyphs.iter().collect::<std::collections::HashSet<_>>().len());
    }
}
