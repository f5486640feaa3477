// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolContext};

#[derive(Default)]
pub struct GetDateTimeTool;

#[async_trait]
impl Tool for GetDateTimeTool {
    fn name(&self) -> &str {
        "get_date_time"
    }

    fn description(&self) -> &str {
        "Return the current date and time."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        Ok(json!({ "date_time": chrono::Local::now().to_rfc3339() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_parseable_timestamp() {
        let out = GetDateTimeTool
            .execute(json!({}), &ToolContext::default())
            .await
            .unwrap();
        let ts = out["date_time"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
