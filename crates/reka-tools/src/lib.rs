// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod builtin;
pub mod fetch;
pub mod registry;
pub mod tool;

pub use fetch::{fetch_and_parse, page_title, sanitize_url, strip_html, FetchedPage, Link};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolContext};

pub use builtin::custom::{run_custom_command, CustomTool};
pub use builtin::date_time::GetDateTimeTool;
pub use builtin::page_crawler::{PageCrawlerState, PageCrawlerTool};
pub use builtin::push_data::PushDataTool;
pub use builtin::url_content::{collect_urls, GetUrlContentTool};
pub use builtin::url_details::GetUrlDetailsTool;
pub use builtin::web_search::WebSearchTool;
