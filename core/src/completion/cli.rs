use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tokio_stream::wrappers::ReceiverStream;

use super::CompletionBackend;
use super::credentials::is_placeholder;
use super::stream::{StreamEnd, parse_cli_stream};
use super::types::{CompletionRequest, TextStream, flatten_prompt};
use crate::config::{AppConfig, Credentials, ModelDefaults};
use crate::error::{BackendKind, CoreError, MAX_DIAGNOSTIC_CHARS, Result, truncate_chars};

/// Configuration for the claude CLI backend
#[derive(Debug, Clone)]
pub struct CliBackendConfig {
    /// Path to claude binary (default: "claude")
    pub binary_path: String,
    /// Timeout for non-streaming requests
    pub timeout: Duration,
    pub models: ModelDefaults,
    /// Decides which provider variables the child process sees.
    pub credentials: Credentials,
}

impl CliBackendConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            binary_path: config.completion.cli_binary.clone(),
            timeout: Duration::from_secs(config.completion.timeout_secs),
            models: config.completion.models.clone(),
            credentials: config.credentials.clone(),
        }
    }
}

/// Completion backend that shells out to the `claude` command-line tool.
///
/// The prompt is always written to stdin so long conversations never hit
/// OS argument-length limits. Streaming uses `--output-format stream-json`.
pub struct CliBackend {
    config: CliBackendConfig,
}

impl CliBackend {
    pub fn new(config: CliBackendConfig) -> Self {
        Self { config }
    }

    /// Build command args. The prompt itself is never an argument.
    pub fn build_args(model: &str, system: Option<&str>, stream: bool) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--model".to_string(),
            model.to_string(),
            "--no-session-persistence".to_string(),
            "--tools".to_string(),
            String::new(),
        ];

        if let Some(system) = system.filter(|s| !s.is_empty()) {
            args.push("--system-prompt".to_string());
            args.push(system.to_string());
        }

        if stream {
            args.extend([
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
            ]);
        }

        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            // A nested session marker makes the CLI refuse to start.
            .env_remove("CLAUDECODE");

        let creds = &self.config.credentials;
        if creds
            .anthropic_api_key
            .as_deref()
            .is_none_or(is_placeholder)
        {
            // Leaves the CLI on its OAuth login instead of a dead key.
            cmd.env_remove("ANTHROPIC_API_KEY");
        }
        if let Some(token) = creds.claude_oauth_token.as_deref().filter(|t| !t.is_empty()) {
            cmd.env("CLAUDE_CODE_OAUTH_TOKEN", token);
        }

        cmd
    }

    async fn spawn_with_prompt(&self, args: &[String], prompt: &str) -> Result<Child> {
        let mut child = self.command(args).spawn().map_err(|e| {
            let detail = if e.kind() == std::io::ErrorKind::NotFound {
                format!("binary not found: {}", self.config.binary_path)
            } else {
                format!("failed to spawn: {e}")
            };
            CoreError::backend(BackendKind::Cli, None, detail)
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await.map_err(|e| {
                CoreError::backend(BackendKind::Cli, None, format!("Failed to write to stdin: {e}"))
            })?;
            stdin.shutdown().await.map_err(|e| {
                CoreError::backend(BackendKind::Cli, None, format!("Failed to close stdin: {e}"))
            })?;
        }

        Ok(child)
    }
}

/// Prefer stderr; fall back to stdout when the CLI reports errors there.
fn exit_diagnostic(stderr: &str, stdout: &str, code: Option<i32>) -> String {
    let stderr = stderr.trim();
    let stdout = stdout.trim();
    if !stderr.is_empty() {
        stderr.to_string()
    } else if !stdout.is_empty() {
        stdout.to_string()
    } else {
        format!("exited with code {}", code.unwrap_or(-1))
    }
}

#[async_trait]
impl CompletionBackend for CliBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.models.content);
        let prompt = flatten_prompt(&request.messages);
        let args = Self::build_args(model, request.system.as_deref(), false);

        tracing::info!(model, prompt_len = prompt.len(), "Running claude CLI");
        let child = self.spawn_with_prompt(&args, &prompt).await?;

        // Dropping the child on timeout kills it (kill_on_drop).
        let output = match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                CoreError::backend(BackendKind::Cli, None, format!("Failed to wait for process: {e}"))
            })?,
            Err(_) => {
                tracing::error!(model, "claude CLI timed out after {:?}", self.config.timeout);
                return Err(CoreError::backend(
                    BackendKind::Cli,
                    None,
                    format!("timed out after {}s", self.config.timeout.as_secs()),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(
                code = ?output.status.code(),
                stderr = %truncate_chars(&stderr, MAX_DIAGNOSTIC_CHARS),
                stdout = %truncate_chars(&stdout, MAX_DIAGNOSTIC_CHARS),
                "claude CLI failed"
            );
            return Err(CoreError::backend(
                BackendKind::Cli,
                None,
                exit_diagnostic(&stderr, &stdout, output.status.code()),
            ));
        }

        Ok(stdout.trim().to_string())
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        let model = request.model.as_deref().unwrap_or(&self.config.models.chat);
        let prompt = flatten_prompt(&request.messages);
        let args = Self::build_args(model, request.system.as_deref(), true);

        tracing::info!(model, prompt_len = prompt.len(), "Streaming from claude CLI");
        let mut child = self.spawn_with_prompt(&args, &prompt).await?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CoreError::backend(BackendKind::Cli, None, "Failed to capture stdout")
        })?;
        // Drain stderr concurrently so a chatty child never blocks on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            match parse_cli_stream(stdout, &tx).await {
                Ok(StreamEnd::Eof) => {}
                Ok(StreamEnd::ReceiverGone) => {
                    tracing::debug!("Stream consumer went away; stopping claude CLI");
                    let _ = child.kill().await;
                    return;
                }
                Err(e) => {
                    let _ = child.kill().await;
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }

            let status = child.wait().await;
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            match status {
                Ok(status) if status.success() => {
                    tracing::debug!("claude CLI stream completed");
                }
                Ok(status) => {
                    tracing::error!(
                        code = ?status.code(),
                        stderr = %truncate_chars(&stderr, MAX_DIAGNOSTIC_CHARS),
                        "claude CLI stream exited with failure"
                    );
                    let _ = tx
                        .send(Err(CoreError::backend(
                            BackendKind::Cli,
                            None,
                            exit_diagnostic(&stderr, "", status.code()),
                        )))
                        .await;
                }
                Err(e) => {
                    let _ = tx
                        .send(Err(CoreError::backend(
                            BackendKind::Cli,
                            None,
                            format!("Failed to wait for process: {e}"),
                        )))
                        .await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}
