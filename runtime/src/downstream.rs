//! Downstream collaborators that consume the persisted output document.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on one external stage. A stage that hangs past this is
/// treated as failed so the scheduler keeps its cadence.
pub const STAGE_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait Downstream: Send + Sync {
    fn name(&self) -> &str;

    /// Consume the document at `path`. `doc` is the same document, already
    /// parsed, for in-process stages.
    async fn run(&self, path: &Path, doc: &Value) -> Result<()>;
}

/// Runs an external program with the document path as its last argument.
#[derive(Debug, Clone)]
pub struct CommandStage {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandStage {
    /// Build from a whitespace-separated command line, e.g. `python3 merge.py`.
    pub fn parse(name: impl Into<String>, command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            name: name.into(),
            program,
            args: words.collect(),
        })
    }
}

#[async_trait]
impl Downstream for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, path: &Path, _doc: &Value) -> Result<()> {
        debug!(stage = %self.name, program = %self.program, "running downstream stage");
        let output = tokio::time::timeout(
            STAGE_TIMEOUT,
            tokio::process::Command::new(&self.program)
                .args(&self.args)
                .arg(path)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("{} timed out after {}s", self.name, STAGE_TIMEOUT.as_secs()))?
        .with_context(|| format!("failed to launch {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(stage = %self.name, stderr = %stderr.trim(), "downstream stage stderr");
            bail!("{} exited with {}", self.name, output.status);
        }
        Ok(())
    }
}

/// Merge stage first, then display, skipping any left unconfigured.
pub fn stages_from_config(config: &Config) -> Vec<Box<dyn Downstream>> {
    [("merge", &config.merge_cmd), ("display", &config.display_cmd)]
        .into_iter()
        .filter_map(|(name, cmd)| CommandStage::parse(name, cmd.as_deref()?))
        .map(|stage| Box::new(stage) as Box<dyn Downstream>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_splits_program_and_args() {
        let stage = CommandStage::parse("merge", "  python3 -u merge.py ").unwrap();
        assert_eq!(stage.program, "python3");
        assert_eq!(stage.args, vec!["-u", "merge.py"]);
        assert!(CommandStage::parse("merge", "   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_document_path() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("live_feed.json");
        std::fs::write(&doc, "{}").unwrap();
        let copy = dir.path().join("copy.json");

        // Quoted arguments cannot go through `parse`.
        let stage = CommandStage {
            name: "merge".into(),
            program: "sh".into(),
            args: vec!["-c".into(), format!("cp \"$0\" {}", copy.display())],
        };
        stage.run(&doc, &json!({})).await.unwrap();
        assert!(copy.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let stage = CommandStage::parse("display", "false").unwrap();
        let err = stage
            .run(Path::new("/nonexistent.json"), &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("display exited"));
    }
}
