// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::fetch::fetch_and_parse;
use crate::tool::{Tool, ToolContext};

pub struct GetUrlDetailsTool {
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

#[async_trait]
impl Tool for GetUrlDetailsTool {
    fn name(&self) -> &str {
        "get_url_details"
    }

    fn description(&self) -> &str {
        "Fetch content and extract links from a URL. Use this in deep dive mode."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .context("missing 'url'")?;
        debug!(url, "get_url_details");
        let page = fetch_and_parse(url, self.fetch_timeout_secs, &self.user_agent).await?;
        Ok(json!({
            "content": page.content,
            "links": page.links,
        }))
    }
}
