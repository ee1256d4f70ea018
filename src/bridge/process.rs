//! Process-backed command executor.
//!
//! Runs `<interpreter> <script> <function> <args...>` and reads the result
//! from stdout. A non-zero exit status or empty stdout is a failure.

use std::path::PathBuf;
use std::process::Stdio;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::bridge::executor::{CommandError, CommandExecutor, CommandFuture, CommandResult};
use crate::core::config::BridgeConfig;

/// Executes native commands through the generation script.
#[derive(Clone, Debug)]
pub struct ProcessCommandExecutor {
    interpreter: String,
    script: PathBuf,
}

impl ProcessCommandExecutor {
    /// Build an executor from configuration.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            script: config.script.clone(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<String>) -> CommandResult<String> {
        debug!(function = args.first().copied().unwrap_or(""), "running generation script");

        let mut child = Command::new(&self.interpreter)
            .arg(&self.script)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = ?output.status.code(), "generation script failed");
            return Err(CommandError::Failed(stderr));
        }

        let stdout = String::from_utf8(output.stdout)?.trim().to_string();
        if stdout.is_empty() {
            return Err(CommandError::EmptyOutput);
        }
        Ok(stdout)
    }
}

impl CommandExecutor for ProcessCommandExecutor {
    fn generate_image(&self, prompt: &str) -> CommandFuture<'_, CommandResult<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move { self.run(&["image", prompt.as_str()], None).await })
    }

    fn generate_audio(
        &self,
        text: &str,
        speaker: &str,
        language: &str,
    ) -> CommandFuture<'_, CommandResult<String>> {
        let text = text.to_string();
        let speaker = speaker.to_string();
        let language = language.to_string();
        Box::pin(async move {
            self.run(&["audio", text.as_str(), speaker.as_str(), language.as_str()], None)
                .await
        })
    }

    fn pdf_to_images(&self, pdf: &[u8]) -> CommandFuture<'_, CommandResult<Vec<String>>> {
        let payload = STANDARD.encode(pdf);
        Box::pin(async move {
            let stdout = self.run(&["pdf"], Some(payload)).await?;
            Ok(stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToString::to_string)
                .collect())
        })
    }
}
