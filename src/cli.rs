// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "reka",
    about = "A CLI web research agent with tool calling and persistent research memory",
    version
)]
pub struct Cli {
    /// The query to research.  All free arguments are joined into one query.
    pub query: Vec<String>,

    /// Model alias from the [models.*] configuration.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Session name or id to resume (created when it does not exist).
    #[arg(long, short = 's')]
    pub session: Option<String>,

    /// Deep research: require at least N distinct search or fetch actions
    /// before answering.
    #[arg(long, value_name = "N")]
    pub deep_research: Option<u32>,

    /// Deep dive: explore one site via get_url_details, following links
    /// within its domain.
    #[arg(long)]
    pub deep_dive: bool,

    /// Always use web_search before answering.
    #[arg(long)]
    pub force_search: bool,

    /// Summarize fetched pages with the summarization model before handing
    /// them to the conversation model.
    #[arg(long)]
    pub summarize: bool,

    /// Write the answer to a file suitable for a browser and print its path.
    #[arg(long)]
    pub open_browser: bool,

    /// Verbose logging to stderr.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Explicit configuration file (default: ~/.config/reka/config.toml).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Detach this shell from its session and exit.
    #[arg(long)]
    pub end_session: bool,

    /// Show the N most recent queries and exit.
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,

    /// Delete history rows: an id ("7"), a list ("1,3"), a range ("4-2"),
    /// or "all".
    #[arg(long, value_name = "SPEC")]
    pub delete_history: Option<String>,
}

impl Cli {
    pub fn joined_query(&self) -> String {
        self.query.join(" ").trim().to_string()
    }
}
