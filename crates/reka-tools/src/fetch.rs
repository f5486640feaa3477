// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Page fetching and HTML stripping shared by the fetch tools and the
//! research cache.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A link extracted from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

/// Result of fetching and stripping one page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub content: String,
    pub title: String,
    pub links: Vec<Link>,
}

/// Remove escape artifacts models sometimes leave in URLs.
pub fn sanitize_url(url: &str) -> String {
    url.replace('\\', "")
}

/// Fetch a URL and return its plain text, title and links.
pub async fn fetch_and_parse(
    url: &str,
    timeout_secs: u64,
    user_agent: &str,
) -> anyhow::Result<FetchedPage> {
    let url = sanitize_url(url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(user_agent.to_string())
        .build()
        .context("building fetch client")?;

    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("fetching {url}"))?;
    anyhow::ensure!(resp.status().is_success(), "{url} returned {}", resp.status());

    let body = resp.text().await.context("reading response body")?;
    let (content, links) = strip_html(&body, &url);
    let title = page_title(&content, &url);
    Ok(FetchedPage {
        content,
        title,
        links,
    })
}

/// Strip HTML to plain text and extract `{text, href}` anchors.
///
/// Relative hrefs are resolved against `base_url`; fragment-only, mailto and
/// javascript targets are dropped.
pub fn strip_html(html: &str, base_url: &str) -> (String, Vec<Link>) {
    let text = html2text::from_read(html.as_bytes(), 100);
    (text, extract_links(html, base_url))
}

/// Title heuristic: the first non-empty text line, capped at 200 characters;
/// the URL when the page has no text at all.
pub fn page_title(content: &str, url: &str) -> String {
    for line in content.lines() {
        let line = line.trim();
        if !line.is_empty() {
            let mut title = line.to_string();
            if title.len() > 200 {
                let mut end = 200;
                while end > 0 && !title.is_char_boundary(end) {
                    end -= 1;
                }
                title.truncate(end);
            }
            return title;
        }
    }
    url.to_string()
}

fn extract_links(html: &str, base_url: &str) -> Vec<Link> {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    let anchor = ANCHOR.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
            .expect("valid regex")
    });
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"));

    let base = url::Url::parse(base_url).ok();
    let mut links = Vec::new();
    for cap in anchor.captures_iter(html) {
        let raw_href = cap[1].trim();
        if raw_href.is_empty()
            || raw_href.starts_with('#')
            || raw_href.starts_with("javascript:")
            || raw_href.starts_with("mailto:")
        {
            continue;
        }
        let href = match &base {
            Some(b) => match b.join(raw_href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            None => raw_href.to_string(),
        };
        let text = tag
            .replace_all(&cap[2], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let text = if text.is_empty() { href.clone() } else { text };
        links.push(Link { text, href });
    }
    links
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let (text, _) = strip_html(html, "https://example.com");
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn links_are_extracted_with_text() {
        let html = r#"<p>Check out <a href="https://example.com/docs">Example docs</a>.</p>"#;
        let (_, links) = strip_html(html, "https://example.com");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "Example docs");
        assert_eq!(links[0].href, "https://example.com/docs");
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let html = r#"<a href="/about">About</a>"#;
        let (_, links) = strip_html(html, "https://site.com/page");
        assert_eq!(links[0].href, "https://site.com/about");
    }

    #[test]
    fn fragment_and_script_links_are_dropped() {
        let html = r##"<a href="#top">Top</a><a href="javascript:void(0)">x</a>
                       <a href="mailto:a@b.c">mail</a><a href="/real">Real</a>"##;
        let (_, links) = strip_html(html, "https://site.com");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text, "Real");
    }

    #[test]
    fn nested_markup_in_anchor_text_is_flattened() {
        let html = r#"<a href="/x"><b>Bold</b> <i>label</i></a>"#;
        let (_, links) = strip_html(html, "https://site.com");
        assert_eq!(links[0].text, "Bold label");
    }

    #[test]
    fn anchor_without_text_falls_back_to_href() {
        let html = r#"<a href="https://site.com/img"><img src="x.png"/></a>"#;
        let (_, links) = strip_html(html, "https://site.com");
        assert_eq!(links[0].text, "https://site.com/img");
    }

    #[test]
    fn title_is_first_nonempty_line() {
        let content = "\n\n  Welcome to Reka  \nSecond line";
        assert_eq!(page_title(content, "https://x"), "Welcome to Reka");
    }

    #[test]
    fn title_falls_back_to_url() {
        assert_eq!(page_title("", "https://x"), "https://x");
    }

    #[test]
    fn title_is_capped_at_200_chars() {
        let content = "a".repeat(500);
        assert_eq!(page_title(&content, "u").len(), 200);
    }

    #[test]
    fn sanitize_removes_backslashes() {
        assert_eq!(sanitize_url("https:\\/\\/x.com"), "https://x.com");
    }
}
