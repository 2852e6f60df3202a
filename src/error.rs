//! The core error taxonomy, as a single typed enum.
//!
//! Each component converts its local failures into a `ConduitError` variant
//! before it crosses a component boundary (a socket reply, a front-end
//! display call); `anyhow::Result` is used everywhere else, reserving the
//! typed error for the places where a caller needs to match on what kind
//! of failure happened.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ConduitError {
    #[error("unknown built-in or bad control argument: {0}")]
    UserSyntax(String),

    #[error("probe unavailable: {0}")]
    ProbeUnavailable(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("blocked: {0}")]
    MiddlewarePolicy(String),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("fatal terminal error: {0}")]
    FatalTerminal(String),
}

impl From<std::io::Error> for ConduitError {
    fn from(e: std::io::Error) -> Self {
        ConduitError::BackendUnavailable(format!("{e}"))
    }
}

impl ConduitError {
    /// Whether this failure should be recovered from locally (degrade and
    /// continue) rather than surfaced as fatal.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            ConduitError::ProbeUnavailable(_) | ConduitError::BackendUnavailable(_)
        )
    }
}
