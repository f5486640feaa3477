// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use reka_config::PromptsConfig;

/// Compose the system prompt from mode flags:
/// `prefix [+ force_search] + suffix [+ deep_research(n)] [+ deep_dive]`.
///
/// These are content-only contracts — deep research and deep dive constrain
/// the model through instructions, not through tool gating.
pub fn construct_system_prompt(
    prompts: &PromptsConfig,
    max_turns: u32,
    deep_research_n: u32,
    deep_dive: bool,
    force_search: bool,
) -> String {
    let mut content = prompts.system_prefix.clone();
    if force_search {
        content.push_str(&prompts.force_search);
    }
    content.push_str(
        &prompts
            .system_suffix
            .replace("{MAX_TURNS}", &max_turns.to_string()),
    );
    if deep_research_n > 0 {
        content.push_str(
            &prompts
                .deep_research
                .replace("{n}", &deep_research_n.to_string()),
        );
    }
    if deep_dive {
        content.push_str(&prompts.deep_dive);
    }
    content
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn prompts() -> PromptsConfig {
        PromptsConfig {
            system_prefix: "PREFIX. ".into(),
            force_search: "FORCE. ".into(),
            system_suffix: "SUFFIX {MAX_TURNS} turns.".into(),
            deep_research: " RESEARCH {n} times.".into(),
            deep_dive: " DIVE.".into(),
        }
    }

    #[test]
    fn base_prompt_is_prefix_plus_suffix() {
        let p = construct_system_prompt(&prompts(), 20, 0, false, false);
        assert_eq!(p, "PREFIX. SUFFIX 20 turns.");
    }

    #[test]
    fn force_search_sits_between_prefix_and_suffix() {
        let p = construct_system_prompt(&prompts(), 20, 0, false, true);
        assert_eq!(p, "PREFIX. FORCE. SUFFIX 20 turns.");
    }

    #[test]
    fn deep_research_appends_with_count() {
        let p = construct_system_prompt(&prompts(), 20, 5, false, false);
        assert!(p.ends_with(" RESEARCH 5 times."));
    }

    #[test]
    fn deep_dive_appends_after_deep_research() {
        let p = construct_system_prompt(&prompts(), 20, 3, true, false);
        assert!(p.contains("RESEARCH 3 times."));
        assert!(p.ends_with(" DIVE."));
    }

    #[test]
    fn default_prompts_compose_without_placeholders_left() {
        let p = construct_system_prompt(&PromptsConfig::default(), 20, 4, true, true);
        assert!(!p.contains("{MAX_TURNS}"));
        assert!(!p.contains("{n}"));
        assert!(p.contains("DEEP RESEARCH"));
        assert!(p.contains("DEEP DIVE"));
    }
}
