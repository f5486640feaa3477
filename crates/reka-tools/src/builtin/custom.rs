// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use reka_config::CustomToolConfig;

use crate::tool::{Tool, ToolContext};

/// A user-defined shell tool from `[tools.custom.*]`.
///
/// The command receives the JSON-encoded argument object on stdin and must
/// write a JSON object to stdout; stderr and the exit code are preserved in
/// the result either way.
pub struct CustomTool {
    name: String,
    description: String,
    config: CustomToolConfig,
}

impl CustomTool {
    pub fn new(name: impl Into<String>, config: CustomToolConfig) -> Self {
        let name = name.into();
        let description = config
            .description
            .clone()
            .unwrap_or_else(|| format!("Custom tool: {name}"));
        Self {
            name,
            description,
            config,
        }
    }
}

#[async_trait]
impl Tool for CustomTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.config
            .parameters
            .clone()
            .unwrap_or_else(|| json!({ "type": "object", "properties": {} }))
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        run_custom_command(&self.config.command, &args, self.config.timeout_secs).await
    }
}

/// Run a custom tool command, returning `{stdout, stderr, exit_code}`.
///
/// Shared with the source-adapter layer, which invokes custom tools directly
/// (without going through the registry) to hydrate non-HTTP targets.
pub async fn run_custom_command(
    command: &str,
    args: &Value,
    timeout_secs: u64,
) -> anyhow::Result<Value> {
    debug!(command, "running custom tool");

    let mut child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning custom tool command: {command}"))?;

    let payload = serde_json::to_vec(args).context("encoding tool arguments")?;
    if let Some(mut stdin) = child.stdin.take() {
        // A command that never reads stdin closes the pipe; that is fine.
        let _ = stdin.write_all(&payload).await;
        let _ = stdin.shutdown().await;
    }

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| anyhow::anyhow!("custom tool timed out after {timeout_secs}s"))?
        .context("waiting for custom tool")?;

    Ok(json!({
        "stdout": String::from_utf8_lossy(&output.stdout),
        "stderr": String::from_utf8_lossy(&output.stderr),
        "exit_code": output.status.code().unwrap_or(-1),
    }))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_receives_args_on_stdin() {
        let out = run_custom_command("cat", &json!({"k": "v"}), 10).await.unwrap();
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["stdout"], r#"{"k":"v"}"#);
    }

    #[tokio::test]
    async fn stderr_and_exit_code_are_preserved() {
        let out = run_custom_command("echo oops >&2; exit 3", &json!({}), 10)
            .await
            .unwrap();
        assert_eq!(out["exit_code"], 3);
        assert!(out["stderr"].as_str().unwrap().contains("oops"));
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let result = run_custom_command("sleep 30", &json!({}), 1).await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn tool_wrapper_uses_config_schema() {
        let cfg = CustomToolConfig {
            command: "cat".into(),
            description: Some("passthrough".into()),
            parameters: Some(json!({"type":"object","properties":{"x":{"type":"string"}}})),
            timeout_secs: 10,
        };
        let tool = CustomTool::new("passthrough", cfg);
        assert_eq!(tool.description(), "passthrough");
        assert_eq!(tool.parameters_schema()["properties"]["x"]["type"], "string");
        let out = tool
            .execute(json!({"x": "1"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out["stdout"], r#"{"x":"1"}"#);
    }

    #[tokio::test]
    async fn missing_description_gets_generated_one() {
        let tool = CustomTool::new(
            "mytool",
            CustomToolConfig {
                command: "true".into(),
                description: None,
                parameters: None,
                timeout_secs: 5,
            },
        );
        assert_eq!(tool.description(), "Custom tool: mytool");
    }
}
