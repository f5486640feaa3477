// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use reka_config::{resolve_db_path, Config};
use reka_core::{
    clear_shell_session, construct_system_prompt, set_shell_session_id, ConversationEngine,
    SessionError, SessionManager,
};
use reka_model::{ChatClient, ChatMessage, HttpChatClient, Summarizer, UsageTracker};
use reka_research::{
    register_research_tools, AdapterSet, EmbeddingClient, ResearchCache, ResearchContext,
    SummaryWorkerPool, VectorStore,
};
use reka_store::{HistorySelector, Store};
use reka_tools::{
    CustomTool, GetDateTimeTool, GetUrlContentTool, GetUrlDetailsTool, PageCrawlerTool,
    PushDataTool, ToolContext, ToolRegistry, WebSearchTool,
};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = tokio::runtime::Runtime::new()
        .expect("tokio runtime")
        .block_on(run(cli));
    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "reka=debug" } else { "reka=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Exit codes: 0 success, 1 invalid configuration, 2 ambiguous session name.
async fn run(cli: Cli) -> i32 {
    let config = match reka_config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return 1;
        }
    };

    match run_inner(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    }
}

async fn run_inner(cli: Cli, config: Config) -> anyhow::Result<i32> {
    if cli.end_session {
        clear_shell_session();
        println!("Detached from session.");
        return Ok(0);
    }

    let store = Arc::new(Store::open(&resolve_db_path(&config.general))?);

    if let Some(limit) = cli.history {
        for record in store.get_history(limit)? {
            println!(
                "[{}] {} | {} -> {}",
                record.id, record.timestamp, record.query_summary, record.answer_summary
            );
        }
        return Ok(0);
    }
    if let Some(spec) = &cli.delete_history {
        let selector = if spec.eq_ignore_ascii_case("all") {
            HistorySelector::All
        } else {
            HistorySelector::parse(spec)?
        };
        let deleted = store.delete_history(&selector)?;
        println!("Deleted {deleted} history rows.");
        return Ok(0);
    }

    let query = cli.joined_query();
    if query.is_empty() {
        eprintln!("No query given. Run `reka --help` for usage.");
        return Ok(1);
    }

    let model = config
        .model(cli.model.as_deref())
        .with_context(|| {
            format!(
                "model '{}' is not configured",
                cli.model.as_deref().unwrap_or(&config.general.default_model)
            )
        })?
        .clone();

    let usage = UsageTracker::new();
    let summarizer = build_summarizer(&config, &usage);
    if cli.summarize && summarizer.is_none() {
        eprintln!(
            "Summarization model '{}' is not configured.",
            config.general.summarization_model
        );
        return Ok(1);
    }

    // Research memory wiring: embedding handle, vector index, page cache
    // with background summary workers when a summarizer is available.
    let embedder = Arc::new(EmbeddingClient::new(&config.research)?);
    let vectors = Arc::new(VectorStore::new(Arc::clone(&store), embedder));
    let (cache, summary_pool) = match &summarizer {
        Some(summarizer) => {
            let (cache, pool) = ResearchCache::with_workers(
                Arc::clone(&store),
                Arc::clone(summarizer),
                config.research.summary_workers,
                config.general.answer_summary_max_chars,
            );
            (Arc::new(cache), Some(pool))
        }
        None => (Arc::new(ResearchCache::new(Arc::clone(&store))), None),
    };

    let registry = Arc::new(build_registry(
        &config,
        Arc::clone(&cache),
        Arc::clone(&vectors),
    ));

    // Session resolution may need the query for auto-naming.
    let mut sessions = SessionManager::new(
        Arc::clone(&store),
        model.alias.clone(),
        model.context_size,
        config.general.session_compaction_threshold,
        config.general.session_compaction_strategy,
        summarizer.clone(),
    );
    let session = match sessions.start_or_resume(cli.session.as_deref(), Some(&query)) {
        Ok(session) => session,
        Err(SessionError::DuplicateName { name, candidates }) => {
            eprintln!("Multiple sessions are named '{name}'. Resume one by id:");
            for c in candidates {
                eprintln!("  {}  {}  {}", c.id, c.name, c.preview);
            }
            return Ok(2);
        }
        Err(SessionError::Other(e)) => return Err(e),
    };

    let system_prompt = construct_system_prompt(
        &config.prompts,
        config.general.max_turns,
        cli.deep_research.unwrap_or(0),
        cli.deep_dive,
        cli.force_search,
    );
    let mut messages = vec![ChatMessage::system(system_prompt)];
    messages.extend(sessions.build_context_messages());
    messages.push(ChatMessage::user(&query));

    let client: Arc<dyn ChatClient> = Arc::new(HttpChatClient::new(
        &model,
        config.general.request_timeout_secs,
        &config.general.user_agent,
    )?);
    let tool_ctx = ToolContext {
        summarize: cli.summarize,
        usage: usage.clone(),
        model_alias: model.alias.clone(),
        query: Some(query.clone()),
        answer: None,
        summarizer: summarizer.clone(),
    };
    let engine = ConversationEngine::new(
        client,
        Arc::clone(&registry),
        tool_ctx,
        config.general.max_turns,
        model.context_size,
        model.alias.clone(),
    );

    let answer = engine.run(messages).await;
    if !answer.is_empty() {
        println!("{answer}");
    }

    // Persist the turn, then compact if the session outgrew its budget.
    let (query_summary, answer_summary) = match &summarizer {
        Some(s) => {
            s.generate_summaries(
                &query,
                &answer,
                config.general.query_summary_max_chars,
                config.general.answer_summary_max_chars,
            )
            .await
        }
        None => (query.clone(), answer.clone()),
    };
    store.save_interaction(&query, &answer, &model.alias, &query_summary, &answer_summary)?;
    sessions.save_turn(&query, &answer, &query_summary, &answer_summary)?;
    sessions.check_and_compact().await?;
    set_shell_session_id(session.id);

    if cli.open_browser {
        let path = std::env::temp_dir().join(format!("reka_answer_{}.md", session.id));
        std::fs::write(&path, &answer)?;
        println!("[Answer written to {}]", path.display());
    }

    // Let in-flight page summaries finish before the process exits.
    cache.close_summary_queue();
    if let Some(pool) = summary_pool {
        drain_summaries(pool).await;
    }

    for (alias, tokens) in usage.snapshot() {
        tracing::info!("[{alias}] total tokens: {tokens}");
    }
    Ok(0)
}

fn build_summarizer(config: &Config, usage: &UsageTracker) -> Option<Arc<Summarizer>> {
    let model = config.summarization_model()?;
    let client = match HttpChatClient::new(
        model,
        config.general.request_timeout_secs,
        &config.general.user_agent,
    ) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("summarization model unavailable: {e:#}");
            return None;
        }
    };
    Some(Arc::new(Summarizer::new(
        Arc::new(client),
        model.alias.clone(),
        model.max_chars,
        usage.clone(),
    )))
}

fn build_registry(
    config: &Config,
    cache: Arc<ResearchCache>,
    vectors: Arc<VectorStore>,
) -> ToolRegistry {
    let general = &config.general;
    let mut registry = ToolRegistry::new();

    registry.register(WebSearchTool {
        search_url: general.search_url.clone(),
        timeout_secs: general.fetch_timeout_secs,
        user_agent: general.user_agent.clone(),
    });
    registry.register(GetUrlContentTool {
        fetch_timeout_secs: general.fetch_timeout_secs,
        user_agent: general.user_agent.clone(),
        summary_max_chars: general.answer_summary_max_chars,
    });
    registry.register(GetUrlDetailsTool {
        fetch_timeout_secs: general.fetch_timeout_secs,
        user_agent: general.user_agent.clone(),
    });
    registry.register(GetDateTimeTool);
    registry.register(PageCrawlerTool::new(
        general.fetch_timeout_secs,
        general.user_agent.clone(),
        general.answer_summary_max_chars,
    ));

    let adapters = Arc::new(AdapterSet::new(
        &config.research.source_adapters,
        &config.tools.custom,
    ));
    register_research_tools(
        &mut registry,
        Arc::new(ResearchContext {
            cache,
            vectors,
            adapters,
            fetch_timeout_secs: general.fetch_timeout_secs,
            user_agent: general.user_agent.clone(),
            max_links_per_url: config.research.max_links_per_url,
            max_relevant_links: config.research.max_relevant_links,
            memory_max_results: config.research.memory_max_results,
        }),
    );

    for (name, tool_config) in &config.tools.custom {
        registry.register(CustomTool::new(name.clone(), tool_config.clone()));
    }
    for (name, endpoint) in &config.push_data {
        if endpoint.enabled {
            registry.register(PushDataTool::new(name.clone(), endpoint.clone()));
        }
    }

    registry
}

async fn drain_summaries(pool: SummaryWorkerPool) {
    // Bounded wait: a hung summarization call must not wedge process exit.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(30), pool.drain()).await;
}
