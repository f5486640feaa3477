// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Persistent conversation sessions with shell-sticky attachment.
//!
//! Sessions never end; a terminal attaches to one through a lock file keyed
//! by the parent shell's pid.  The lock file holds a single decimal session
//! id — reads and writes race benignly (last write wins) and stale or
//! non-numeric content is treated as absent.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use reka_config::CompactionStrategy;
use reka_model::{estimate_tokens, ChatMessage, Summarizer, SUMMARIZE_SESSION_PROMPT};
use reka_store::{Session, SessionMessage, Store};

use crate::slug::generate_slug_with;

const LOCK_PREFIX: &str = "reka_session_";

/// Output bound for llm_summary compaction.
const COMPACTION_SUMMARY_MAX_CHARS: usize = 4000;

fn shell_pid() -> u32 {
    #[cfg(unix)]
    {
        std::os::unix::process::parent_id()
    }
    #[cfg(not(unix))]
    {
        std::process::id()
    }
}

fn lock_file_path() -> PathBuf {
    std::env::temp_dir().join(format!("{LOCK_PREFIX}{}", shell_pid()))
}

/// Read the session id from the shell's lock file, if any.
pub fn get_shell_session_id() -> Option<i64> {
    let content = std::fs::read_to_string(lock_file_path()).ok()?;
    content.trim().parse().ok()
}

/// Attach the current shell to a session.
pub fn set_shell_session_id(session_id: i64) {
    let path = lock_file_path();
    if let Err(e) = std::fs::write(&path, session_id.to_string()) {
        warn!("could not write session lock file {}: {e}", path.display());
    } else {
        info!("Session lock file created: {}", path.display());
    }
}

/// Detach the current shell from its session.
pub fn clear_shell_session() {
    let path = lock_file_path();
    if path.exists() {
        let _ = std::fs::remove_file(&path);
        info!("Session lock file removed: {}", path.display());
    }
}

#[derive(Debug, Clone)]
pub struct SessionCandidate {
    pub id: i64,
    pub name: String,
    pub preview: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Several sessions carry the requested name; the caller must pick one
    /// by id.
    #[error("Multiple sessions named '{name}'")]
    DuplicateName {
        name: String,
        candidates: Vec<SessionCandidate>,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct SessionManager {
    store: Arc<Store>,
    model_alias: String,
    context_size: usize,
    compaction_threshold_percent: u32,
    compaction_strategy: CompactionStrategy,
    summarizer: Option<Arc<Summarizer>>,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(
        store: Arc<Store>,
        model_alias: impl Into<String>,
        context_size: usize,
        compaction_threshold_percent: u32,
        compaction_strategy: CompactionStrategy,
        summarizer: Option<Arc<Summarizer>>,
    ) -> Self {
        Self {
            store,
            model_alias: model_alias.into(),
            context_size,
            compaction_threshold_percent,
            compaction_strategy,
            summarizer,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Start a new session or resume an existing one.
    ///
    /// Resolution order: numeric name → resume by id (unknown id creates a
    /// new session with that name); legacy `S<digits>` → resume by id; name
    /// with one match → resume; several matches → [`SessionError::DuplicateName`];
    /// no match → create.  Without a name the shell lock file decides, and a
    /// stale lock is cleared.
    pub fn start_or_resume(
        &mut self,
        session_name: Option<&str>,
        query: Option<&str>,
    ) -> Result<Session, SessionError> {
        if let Some(name) = session_name {
            // Resume by explicit numeric id.
            if let Ok(id) = name.parse::<i64>() {
                if let Some(session) = self.store.get_session_by_id(id)? {
                    return Ok(self.attach(session));
                }
                // Unknown id: fall through and treat the digits as a name.
            }

            // Legacy S-prefixed id form.
            if let Some(id) = parse_legacy_session_ref(name) {
                if let Some(session) = self.store.get_session_by_id(id)? {
                    return Ok(self.attach(session));
                }
            }

            let matches = self.store.get_sessions_by_name(name)?;
            return match matches.len() {
                1 => Ok(self.attach(matches.into_iter().next().expect("one match"))),
                0 => {
                    let sid = self.store.create_session(&self.model_alias, Some(name))?;
                    let session = self.must_load(sid)?;
                    Ok(self.attach(session))
                }
                _ => {
                    let mut candidates = Vec::with_capacity(matches.len());
                    for s in &matches {
                        let preview = self
                            .store
                            .get_first_message_preview(s.id)
                            .unwrap_or_default();
                        candidates.push(SessionCandidate {
                            id: s.id,
                            name: s.name.clone(),
                            preview,
                        });
                    }
                    Err(SessionError::DuplicateName {
                        name: name.to_string(),
                        candidates,
                    })
                }
            };
        }

        // No name: the shell lock file decides.
        if let Some(shell_id) = get_shell_session_id() {
            if let Some(session) = self.store.get_session_by_id(shell_id)? {
                return Ok(self.attach(session));
            }
            // Lock points at a deleted session.
            clear_shell_session();
        }

        let auto_name = query.map(|q| generate_slug_with(q, 2));
        let sid = self
            .store
            .create_session(&self.model_alias, auto_name.as_deref())?;
        let session = self.must_load(sid)?;
        Ok(self.attach(session))
    }

    fn attach(&mut self, session: Session) -> Session {
        self.current = Some(session.clone());
        session
    }

    fn must_load(&self, id: i64) -> anyhow::Result<Session> {
        self.store
            .get_session_by_id(id)?
            .ok_or_else(|| anyhow::anyhow!("session {id} vanished after creation"))
    }

    /// Prior context for the next conversation: the compacted summary (as a
    /// synthetic exchange) followed by the messages recorded after the last
    /// compaction — or the full message list when never compacted.
    ///
    /// Store failures degrade to an empty context with a log line: a broken
    /// history must not block a new query.
    pub fn build_context_messages(&self) -> Vec<ChatMessage> {
        let Some(session) = &self.current else {
            return Vec::new();
        };

        let mut messages = Vec::new();
        let mut after: Option<&str> = None;

        if let Some(summary) = session
            .compacted_summary
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            messages.push(ChatMessage::user(format!(
                "Previous conversation summary:\n{summary}"
            )));
            messages.push(ChatMessage::assistant(
                "I understand the context. How can I help further?",
            ));
            after = session.compaction_at.as_deref();
        }

        let stored = match after {
            Some(ts) => self.store.get_session_messages_after(session.id, ts),
            None => self.store.get_session_messages(session.id),
        };
        match stored {
            Ok(stored) => {
                for msg in stored {
                    messages.push(to_chat_message(&msg));
                }
            }
            Err(e) => warn!("could not load session messages: {e:#}"),
        }
        messages
    }

    /// Persist one query/answer turn with token counts.
    pub fn save_turn(
        &self,
        query: &str,
        answer: &str,
        query_summary: &str,
        answer_summary: &str,
    ) -> anyhow::Result<()> {
        let Some(session) = &self.current else {
            return Ok(());
        };
        let q_tokens = estimate_tokens(&[ChatMessage::user(query)]) as i64;
        let a_tokens = estimate_tokens(&[ChatMessage::assistant(answer)]) as i64;
        self.store
            .save_session_message(session.id, "user", query, query_summary, q_tokens)?;
        self.store
            .save_session_message(session.id, "assistant", answer, answer_summary, a_tokens)?;
        Ok(())
    }

    /// Compact when the effective context crosses the configured threshold.
    /// Returns whether a compaction happened.
    pub async fn check_and_compact(&mut self) -> anyhow::Result<bool> {
        let Some(session) = self.current.clone() else {
            return Ok(false);
        };

        let messages = self.build_context_messages();
        let current_tokens = estimate_tokens(&messages);
        let threshold_tokens =
            self.context_size * self.compaction_threshold_percent as usize / 100;

        if current_tokens < threshold_tokens {
            return Ok(false);
        }
        info!(
            "Session {} reached threshold ({current_tokens}/{threshold_tokens}). Compacting...",
            session.id
        );

        let stored = self.store.get_session_messages(session.id)?;
        let compacted = match self.compaction_strategy {
            CompactionStrategy::Summaries => compact_from_summaries(&stored),
            CompactionStrategy::LlmSummary => match self.compact_with_llm(&stored).await {
                Ok(summary) if !summary.is_empty() => summary,
                Ok(_) | Err(_) => {
                    warn!("llm_summary compaction unavailable; using per-message summaries");
                    compact_from_summaries(&stored)
                }
            },
        };

        self.store.set_compacted_summary(session.id, &compacted)?;
        // Refresh the in-memory session so the new summary takes effect now.
        self.current = self.store.get_session_by_id(session.id)?;
        Ok(true)
    }

    async fn compact_with_llm(&self, messages: &[SessionMessage]) -> anyhow::Result<String> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no summarizer configured"))?;
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", capitalize(&m.role), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        summarizer
            .summarize_content(
                &transcript,
                SUMMARIZE_SESSION_PROMPT,
                COMPACTION_SUMMARY_MAX_CHARS,
            )
            .await
    }
}

/// `S<digits>` session references from older releases.
fn parse_legacy_session_ref(name: &str) -> Option<i64> {
    let rest = name.strip_prefix('S').or_else(|| name.strip_prefix('s'))?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Concatenate per-message summaries, falling back to the first 100
/// characters of the content for messages without one.
fn compact_from_summaries(messages: &[SessionMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = capitalize(&m.role);
            if m.summary.is_empty() {
                let mut end = 100.min(m.content.len());
                while end > 0 && !m.content.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{role}: {}...", &m.content[..end])
            } else {
                format!("{role}: {}", m.summary)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn to_chat_message(msg: &SessionMessage) -> ChatMessage {
    match msg.role.as_str() {
        "assistant" => ChatMessage::assistant(&msg.content),
        "system" => ChatMessage::system(&msg.content),
        _ => ChatMessage::user(&msg.content),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reka_model::{ScriptedChatClient, UsageTracker};

    /// The shell lock file is keyed by the test runner's parent pid, so the
    /// tests that touch it must not run concurrently.
    static LOCK_FILE_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn manager(store: Arc<Store>) -> SessionManager {
        SessionManager::new(
            store,
            "gf",
            1000,
            50,
            CompactionStrategy::Summaries,
            None,
        )
    }

    // ── start_or_resume ───────────────────────────────────────────────────────

    #[test]
    fn resumes_by_numeric_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sid = store.create_session("gf", Some("research")).unwrap();
        let mut mgr = manager(Arc::clone(&store));
        let session = mgr.start_or_resume(Some(&sid.to_string()), None).unwrap();
        assert_eq!(session.id, sid);
    }

    #[test]
    fn unknown_numeric_id_becomes_a_name() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut mgr = manager(store);
        let session = mgr.start_or_resume(Some("777"), None).unwrap();
        assert_eq!(session.name, "777");
    }

    #[test]
    fn resumes_by_legacy_s_prefixed_id() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sid = store.create_session("gf", Some("research")).unwrap();
        let mut mgr = manager(Arc::clone(&store));
        let session = mgr.start_or_resume(Some(&format!("S{sid}")), None).unwrap();
        assert_eq!(session.id, sid);
    }

    #[test]
    fn single_name_match_resumes() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sid = store.create_session("gf", Some("research")).unwrap();
        let mut mgr = manager(Arc::clone(&store));
        let session = mgr.start_or_resume(Some("research"), None).unwrap();
        assert_eq!(session.id, sid);
    }

    #[test]
    fn duplicate_names_raise_with_candidates() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let a = store.create_session("gf", Some("research")).unwrap();
        let b = store.create_session("gf", Some("research")).unwrap();
        store
            .save_session_message(a, "user", "first question", "", 4)
            .unwrap();

        let mut mgr = manager(Arc::clone(&store));
        let err = mgr.start_or_resume(Some("research"), None).unwrap_err();
        match err {
            SessionError::DuplicateName { name, candidates } => {
                assert_eq!(name, "research");
                let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
                assert_eq!(ids, vec![a, b]);
                assert!(candidates[0].preview.contains("first question"));
            }
            other => panic!("expected DuplicateName, got {other:?}"),
        }
    }

    #[test]
    fn unmatched_name_creates_session_with_it() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut mgr = manager(Arc::clone(&store));
        let session = mgr.start_or_resume(Some("fresh"), None).unwrap();
        assert_eq!(session.name, "fresh");
        assert!(store.get_session_by_id(session.id).unwrap().is_some());
    }

    #[test]
    fn new_sessions_are_auto_named_from_the_query() {
        let _guard = LOCK_FILE_GUARD.lock().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut mgr = manager(store);
        // Make sure no lock file from a previous test interferes.
        clear_shell_session();
        let session = mgr
            .start_or_resume(None, Some("what is the meaning of life"))
            .unwrap();
        assert_eq!(session.name, "meaning_life");
    }

    #[test]
    fn shell_lock_round_trip_and_stale_clear() {
        let _guard = LOCK_FILE_GUARD.lock().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sid = store.create_session("gf", Some("locked")).unwrap();

        set_shell_session_id(sid);
        assert_eq!(get_shell_session_id(), Some(sid));

        let mut mgr = manager(Arc::clone(&store));
        let session = mgr.start_or_resume(None, Some("ignored query")).unwrap();
        assert_eq!(session.id, sid);

        // Point the lock at a session that no longer exists: it is cleared
        // and a fresh session is created.
        set_shell_session_id(999_999);
        let session = mgr.start_or_resume(None, Some("new topic please")).unwrap();
        assert_ne!(session.id, 999_999);
        assert_eq!(get_shell_session_id(), None);

        clear_shell_session();
    }

    #[test]
    fn nonnumeric_lock_content_is_treated_as_absent() {
        let _guard = LOCK_FILE_GUARD.lock().unwrap();
        std::fs::write(lock_file_path(), "garbage").unwrap();
        assert_eq!(get_shell_session_id(), None);
        clear_shell_session();
    }

    #[test]
    fn legacy_ref_parser_accepts_only_s_digits() {
        assert_eq!(parse_legacy_session_ref("S12"), Some(12));
        assert_eq!(parse_legacy_session_ref("s3"), Some(3));
        assert_eq!(parse_legacy_session_ref("S"), None);
        assert_eq!(parse_legacy_session_ref("S1a"), None);
        assert_eq!(parse_legacy_session_ref("session"), None);
    }

    // ── Context assembly ──────────────────────────────────────────────────────

    #[test]
    fn context_is_empty_without_a_session() {
        let mgr = manager(Arc::new(Store::open_in_memory().unwrap()));
        assert!(mgr.build_context_messages().is_empty());
    }

    #[test]
    fn context_contains_saved_turns_in_order() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut mgr = manager(Arc::clone(&store));
        mgr.start_or_resume(Some("ctx"), None).unwrap();
        mgr.save_turn("first question", "first answer", "q1", "a1")
            .unwrap();

        let ctx = mgr.build_context_messages();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].text(), "first question");
        assert_eq!(ctx[1].text(), "first answer");
    }

    #[tokio::test]
    async fn compaction_triggers_at_threshold_and_shrinks_context() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut mgr = manager(Arc::clone(&store));
        mgr.start_or_resume(Some("compact-me"), None).unwrap();

        // 2500 chars ≈ 625 tokens ≥ 50% of 1000.
        let long_answer = "a".repeat(2500);
        mgr.save_turn("the question", &long_answer, "q sum", "a sum")
            .unwrap();
        let tokens_before = estimate_tokens(&mgr.build_context_messages());

        assert!(mgr.check_and_compact().await.unwrap());

        let session = mgr.current().unwrap();
        let summary = session.compacted_summary.as_deref().unwrap();
        assert!(summary.contains("User: q sum"));
        assert!(summary.contains("Assistant: a sum"));

        let tokens_after = estimate_tokens(&mgr.build_context_messages());
        assert!(
            tokens_after <= tokens_before,
            "context must not grow through compaction ({tokens_after} > {tokens_before})"
        );
    }

    #[tokio::test]
    async fn below_threshold_no_compaction() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut mgr = manager(Arc::clone(&store));
        mgr.start_or_resume(Some("small"), None).unwrap();
        mgr.save_turn("short", "answer", "", "").unwrap();
        assert!(!mgr.check_and_compact().await.unwrap());
        assert!(mgr.current().unwrap().compacted_summary.is_none());
    }

    #[tokio::test]
    async fn llm_summary_strategy_uses_the_summarizer() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let client = Arc::new(ScriptedChatClient::always_text("a dense session summary"));
        let summarizer = Arc::new(Summarizer::new(client, "lfm", 100_000, UsageTracker::new()));
        let mut mgr = SessionManager::new(
            Arc::clone(&store),
            "gf",
            1000,
            50,
            CompactionStrategy::LlmSummary,
            Some(summarizer),
        );
        mgr.start_or_resume(Some("llm-compact"), None).unwrap();
        mgr.save_turn("q", &"a".repeat(2500), "", "").unwrap();

        assert!(mgr.check_and_compact().await.unwrap());
        assert_eq!(
            mgr.current().unwrap().compacted_summary.as_deref(),
            Some("a dense session summary")
        );
    }

    #[tokio::test]
    async fn llm_summary_degrades_to_summaries_when_model_fails() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let client = Arc::new(ScriptedChatClient::always_error("down"));
        let summarizer = Arc::new(Summarizer::new(client, "lfm", 100_000, UsageTracker::new()));
        let mut mgr = SessionManager::new(
            Arc::clone(&store),
            "gf",
            1000,
            50,
            CompactionStrategy::LlmSummary,
            Some(summarizer),
        );
        mgr.start_or_resume(Some("degrade"), None).unwrap();
        mgr.save_turn("q", &"a".repeat(2500), "q sum", "a sum").unwrap();

        assert!(mgr.check_and_compact().await.unwrap());
        let summary = mgr
            .current()
            .unwrap()
            .compacted_summary
            .clone()
            .unwrap();
        assert!(summary.contains("User: q sum"));
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn summaries_fall_back_to_truncated_content() {
        let msgs = vec![SessionMessage {
            id: 1,
            session_id: 1,
            role: "user".into(),
            content: "x".repeat(300),
            summary: String::new(),
            tokens: 75,
            created_at: String::new(),
        }];
        let compacted = compact_from_summaries(&msgs);
        assert!(compacted.starts_with("User: "));
        assert!(compacted.ends_with("..."));
        assert!(compacted.len() < 120);
    }
}
