// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Named API endpoint definitions referenced by models via their `api` key.
    ///
    /// ```toml
    /// [api.lmstudio]
    /// url = "http://localhost:1234/v1/chat/completions"
    /// api_key = "lm-studio"
    ///
    /// [api.gemini]
    /// url = "https://generativelanguage.googleapis.com/v1beta/chat/completions"
    /// api_key_env = "GOOGLE_API_KEY"
    /// ```
    #[serde(default)]
    pub api: HashMap<String, ApiConfig>,
    /// Model definitions keyed by short alias (`--model <alias>`).
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub prompts: PromptsConfig,
    /// Outbound HTTP push endpoints registered as tools when `enabled = true`.
    #[serde(default)]
    pub push_data: HashMap<String, PushEndpointConfig>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub research: ResearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Environment variable consulted first when resolving the history DB path.
    #[serde(default = "default_db_path_env_var")]
    pub db_path_env_var: String,
    /// Explicit DB path; used when the env var above is not set.
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default = "default_query_summary_max_chars")]
    pub query_summary_max_chars: usize,
    #[serde(default = "default_answer_summary_max_chars")]
    pub answer_summary_max_chars: usize,
    /// SearXNG-compatible search endpoint (queried with `format=json`).
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Hard cap on conversation turns per query.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_model_alias")]
    pub default_model: String,
    /// Alias of the (smaller) model used for all summarization calls.
    #[serde(default = "default_summarization_model")]
    pub summarization_model: String,
    /// Percentage of the model context at which session compaction triggers.
    #[serde(default = "default_compaction_threshold")]
    pub session_compaction_threshold: u32,
    #[serde(default)]
    pub session_compaction_strategy: CompactionStrategy,
    /// Timeout for chat-completion requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for page fetches, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_db_path_env_var() -> String {
    "REKA_HISTORY_DB_PATH".into()
}
fn default_query_summary_max_chars() -> usize {
    40
}
fn default_answer_summary_max_chars() -> usize {
    200
}
fn default_search_url() -> String {
    "http://localhost:8888".into()
}
fn default_max_turns() -> u32 {
    20
}
fn default_model_alias() -> String {
    "gf".into()
}
fn default_summarization_model() -> String {
    "lfm".into()
}
fn default_compaction_threshold() -> u32 {
    80
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    "reka/0.4".into()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            db_path_env_var: default_db_path_env_var(),
            db_path: None,
            query_summary_max_chars: default_query_summary_max_chars(),
            answer_summary_max_chars: default_answer_summary_max_chars(),
            search_url: default_search_url(),
            max_turns: default_max_turns(),
            default_model: default_model_alias(),
            summarization_model: default_summarization_model(),
            session_compaction_threshold: default_compaction_threshold(),
            session_compaction_strategy: CompactionStrategy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Strategy used when compacting a session's accumulated messages.
///
/// `Summaries` (default) concatenates the per-message summaries already
/// stored alongside each turn.  `LlmSummary` sends the whole transcript
/// through the summarization model instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStrategy {
    #[default]
    Summaries,
    LlmSummary,
}

impl std::fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::Summaries => write!(f, "summaries"),
            CompactionStrategy::LlmSummary => write!(f, "llm_summary"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Full chat-completions URL for this endpoint.
    pub url: String,
    /// Literal API key; prefer `api_key_env` in version-controlled files.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key (read at request time).
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier forwarded to the API.
    pub id: String,
    /// Key into `[api.*]`; hydration copies the endpoint details below.
    #[serde(default)]
    pub api: String,
    /// Input bound (characters) for summarization calls routed to this model.
    #[serde(default = "default_model_max_chars")]
    pub max_chars: usize,
    /// Context window size in tokens (input-only accounting).
    #[serde(default = "default_context_size")]
    pub context_size: usize,
    // Filled from the referenced [api.*] section during hydration when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// The alias this model was registered under; set during hydration.
    #[serde(default)]
    pub alias: String,
}

fn default_model_max_chars() -> usize {
    4000
}
pub fn default_context_size() -> usize {
    32_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    pub system_prefix: String,
    pub force_search: String,
    pub system_suffix: String,
    /// Template with a `{n}` placeholder for the required action count.
    pub deep_research: String,
    pub deep_dive: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_prefix: "You are a helpful assistant with web search and URL retrieval \
                 capabilities. Use get_date_time for the current date/time if needed \
                 (e.g. for 'today' or 'recently'). "
                .into(),
            force_search: "Unless you are asked to use a specific URL, always use web_search; \
                 never try to answer without using web_search. "
                .into(),
            system_suffix: "Then use get_url_content for details of the search results. \
                 You can pass a list of URLs to get_url_content to fetch multiple pages \
                 efficiently at once. Use tools, don't say you can't. \
                 You have {MAX_TURNS} turns to complete your task; if you reach the limit \
                 the process will be terminated. You should finish your task before \
                 reaching 100% of your token limit."
                .into(),
            deep_research: "\nYou are in DEEP RESEARCH mode. You MUST perform at least {n} \
                 distinct web searches, or make {n} get_url_content calls to gather \
                 comprehensive information before providing a final answer. \
                 If you need to get links from a URL, use get_url_details. If you just \
                 need content from a URL, use get_url_content."
                .into(),
            deep_dive: "\nYou are in DEEP DIVE mode. Follow these instructions:\n\
                 1. Use 'get_url_details' for the INITIAL page to retrieve content and links.\n\
                 2. Follow up to 25 relevant links within the same domain to gather \
                 comprehensive information.\n\
                 3. IMPORTANT: Use 'get_url_details' ONLY for the first page. Use \
                 'get_url_content' for all subsequent links.\n\
                 4. Do not rely on your internal knowledge; base your answer strictly on \
                 the retrieved content.\n\
                 5. Do not use web_search in deep dive mode."
                .into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEndpointConfig {
    pub url: String,
    /// "get" or "post" (case-insensitive). Anything else is rejected at dispatch.
    #[serde(default = "default_push_method")]
    pub method: String,
    /// Only enabled endpoints are registered as tools.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Header map; keys ending in `_env` name an environment variable whose
    /// value becomes the header (the suffix is stripped from the header name).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Field map resolved in two phases: `_env` keys through the environment,
    /// then `${name}` placeholders against special + dynamic variables.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

fn default_push_method() -> String {
    "post".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// User-defined shell tools registered alongside the built-ins.
    #[serde(default)]
    pub custom: HashMap<String, CustomToolConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomToolConfig {
    /// Shell command; receives the JSON-encoded arguments on stdin.
    pub command: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema for the tool parameters, written as a TOML table.
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default = "default_custom_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_custom_tool_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// OpenAI-compatible embeddings endpoint.
    #[serde(default = "default_embedding_api_url")]
    pub embedding_api_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    /// Default cap on links returned per URL by extract_links.
    #[serde(default = "default_max_links_per_url")]
    pub max_links_per_url: usize,
    /// Cap on relevance-ranked links.
    #[serde(default = "default_max_relevant_links")]
    pub max_relevant_links: usize,
    /// Default result cap for query_research_memory.
    #[serde(default = "default_memory_max_results")]
    pub memory_max_results: usize,
    /// Size of the background summarization worker pool.
    #[serde(default = "default_summary_workers")]
    pub summary_workers: usize,
    #[serde(default)]
    pub source_adapters: HashMap<String, SourceAdapterConfig>,
}

fn default_embedding_api_url() -> String {
    "http://localhost:1234/v1/embeddings".into()
}
fn default_embedding_model() -> String {
    "text-embedding-nomic-embed-text-v1.5".into()
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_embedding_batch_size() -> usize {
    32
}
fn default_max_links_per_url() -> usize {
    30
}
fn default_max_relevant_links() -> usize {
    20
}
fn default_memory_max_results() -> usize {
    10
}
fn default_summary_workers() -> usize {
    2
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            embedding_api_url: default_embedding_api_url(),
            embedding_model: default_embedding_model(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            embedding_batch_size: default_embedding_batch_size(),
            max_links_per_url: default_max_links_per_url(),
            max_relevant_links: default_max_relevant_links(),
            memory_max_results: default_memory_max_results(),
            summary_workers: default_summary_workers(),
            source_adapters: HashMap::new(),
        }
    }
}

/// Routes a family of URI-like targets (`local://…`, `intranet://…`) to a
/// custom tool that handles discovery and reading for them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceAdapterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Matching prefix; defaults to `<name>://` when omitted.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Fallback tool for both operations.
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub discover_tool: Option<String>,
    #[serde(default)]
    pub read_tool: Option<String>,
}

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so a named
/// function is required for enabled-unless-disabled fields.
fn default_true() -> bool {
    true
}

impl Config {
    /// Look up a model by alias, falling back to `general.default_model`.
    pub fn model(&self, alias: Option<&str>) -> Option<&ModelConfig> {
        let key = alias.unwrap_or(&self.general.default_model);
        self.models.get(key)
    }

    /// The model used for summarization calls.
    pub fn summarization_model(&self) -> Option<&ModelConfig> {
        self.models.get(&self.general.summarization_model)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
