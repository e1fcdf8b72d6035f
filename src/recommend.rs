//! Bridge to the external recommendation engine.
//!
//! The engine is an opaque program: it gets the snapshot path and the model
//! path as its last two arguments and prints a JSON array of track IDs on
//! stdout. Anything else is a [`DownstreamError`].

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use serde_json::Value;
use tokio::process::Command;

use crate::{config::Config, error::DownstreamError};

#[derive(Debug, Clone)]
pub struct Recommender {
    command: Vec<String>,
    model: PathBuf,
    timeout: Duration,
}

impl Recommender {
    pub fn new(command: Vec<String>, model: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command,
            model: model.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.recommender_command.clone(),
            config.recommender_model.clone(),
            config.recommender_timeout,
        )
    }

    /// Runs the engine against one snapshot and returns the recommended IDs.
    pub async fn run(&self, snapshot: &Path) -> Result<Vec<String>, DownstreamError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(DownstreamError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty recommender command",
            )));
        };

        let child = Command::new(program)
            .args(args)
            .arg(snapshot)
            .arg(&self.model)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DownstreamError::Spawn)?;

        tracing::info!(%program, snapshot = %snapshot.display(), "recommender started");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(DownstreamError::Spawn)?,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "recommender timed out");
                return Err(DownstreamError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DownstreamError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        let ids = parse_output(&String::from_utf8_lossy(&output.stdout))?;
        tracing::info!(count = ids.len(), "recommender finished");
        Ok(ids)
    }
}

/// Parses the engine's stdout, which must be exactly one JSON array of ID
/// strings. Diagnostics belong on stderr; anything else on stdout is rejected.
pub fn parse_output(stdout: &str) -> Result<Vec<String>, DownstreamError> {
    let value = serde_json::from_str::<Value>(stdout.trim())
        .map_err(|_| DownstreamError::UnparsableOutput(truncate(stdout)))?;

    let Value::Array(items) = value else {
        return Err(DownstreamError::UnparsableOutput(truncate(stdout)));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(id) if !id.is_empty() => Ok(id),
            other => Err(DownstreamError::UnparsableOutput(format!(
                "unexpected array entry {other}"
            ))),
        })
        .collect()
}

fn truncate(text: &str) -> String {
    text.trim().chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        assert_eq!(
            parse_output("[\"a\", \"b\"]\n").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn rejects_log_lines_mixed_into_stdout() {
        let stdout = "warning: model stale\n[\"x\"]\n";
        assert!(matches!(
            parse_output(stdout),
            Err(DownstreamError::UnparsableOutput(_))
        ));
    }

    #[test]
    fn rejects_non_arrays_and_non_strings() {
        assert!(matches!(
            parse_output("{\"ids\": []}"),
            Err(DownstreamError::UnparsableOutput(_))
        ));
        assert!(matches!(
            parse_output("[1, 2]"),
            Err(DownstreamError::UnparsableOutput(_))
        ));
        assert!(matches!(
            parse_output("Traceback (most recent call last)"),
            Err(DownstreamError::UnparsableOutput(_))
        ));
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_output("[]").unwrap().is_empty());
    }
}
