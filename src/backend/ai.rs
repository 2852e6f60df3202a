//! The AI provider seam. The actual model client is an external
//! collaborator, not part of this core; this trait is the interface the
//! backend requires of it, plus the two deterministic implementations
//! needed to exercise and demo the backend without a real account.

use async_trait::async_trait;

use crate::protocol::FailureContext;

/// What the backend turns natural-language input into: either a runnable
/// shell command suggestion, or plain text to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOutcome {
    CommandSuggestion(String),
    InformationalText(String),
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Human-readable identifier used by `:provider` / `AI_PROVIDER:`.
    fn name(&self) -> &str;

    async fn respond(
        &self,
        line: &str,
        cwd: &str,
        failure: Option<&FailureContext>,
    ) -> anyhow::Result<AiOutcome>;
}

/// Deterministic provider used by tests and as a documented
/// `--ai-provider=echo` fallback when no real provider is configured: it
/// never suggests a command, only reflects the question back, so it can
/// never trigger the middleware's command policy by accident.
pub struct EchoProvider;

#[async_trait]
impl AiProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn respond(
        &self,
        line: &str,
        _cwd: &str,
        failure: Option<&FailureContext>,
    ) -> anyhow::Result<AiOutcome> {
        let text = match failure {
            Some(ctx) => format!(
                "'{line}' failed with exit code {}. (no AI provider configured; \
                 captured output is at {})",
                ctx.exit_code, ctx.output_path
            ),
            None => format!("You asked: {line}"),
        };
        Ok(AiOutcome::InformationalText(text))
    }
}

/// A small fixed phrase -> command table, standing in for a real model so
/// end-to-end scenarios are exercisable without network access. Matches on
/// whether the line contains a known phrase fragment; this is
/// intentionally not fuzzy — it is test/demo scaffolding, not a language
/// model.
pub struct StubCommandProvider {
    table: Vec<(&'static str, &'static str)>,
}

impl Default for StubCommandProvider {
    fn default() -> Self {
        StubCommandProvider {
            table: vec![
                ("list the pods", "kubectl get pods"),
                ("list pods", "kubectl get pods"),
                ("show me the git status", "git status"),
                ("what changed", "git diff --stat"),
                ("list files", "ls -la"),
            ],
        }
    }
}

#[async_trait]
impl AiProvider for StubCommandProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn respond(
        &self,
        line: &str,
        _cwd: &str,
        failure: Option<&FailureContext>,
    ) -> anyhow::Result<AiOutcome> {
        let lower = line.to_lowercase();
        for (phrase, command) in &self.table {
            if lower.contains(phrase) {
                return Ok(AiOutcome::CommandSuggestion(command.to_string()));
            }
        }
        let text = match failure {
            Some(ctx) => format!(
                "The previous command failed (exit {}); I don't have a suggestion for {line:?}.",
                ctx.exit_code
            ),
            None => format!("I don't have a canned answer for {line:?}."),
        };
        Ok(AiOutcome::InformationalText(text))
    }
}

pub fn provider_by_name(name: &str) -> Box<dyn AiProvider> {
    match name {
        "stub" => Box::new(StubCommandProvider::default()),
        _ => Box::new(EchoProvider),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_provider_maps_known_phrase_to_command() {
        let provider = StubCommandProvider::default();
        let outcome = provider
            .respond("please list the pods", "/home/user", None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AiOutcome::CommandSuggestion("kubectl get pods".to_string())
        );
    }

    #[tokio::test]
    async fn stub_provider_falls_back_to_text() {
        let provider = StubCommandProvider::default();
        let outcome = provider
            .respond("tell me a joke", "/home/user", None)
            .await
            .unwrap();
        assert!(matches!(outcome, AiOutcome::InformationalText(_)));
    }

    #[tokio::test]
    async fn echo_provider_never_suggests_a_command() {
        let provider = EchoProvider;
        let outcome = provider
            .respond("rm -rf /", "/home/user", None)
            .await
            .unwrap();
        assert!(matches!(outcome, AiOutcome::InformationalText(_)));
    }
}
