//! Page text normalization.
//!
//! Cleaning rules, applied in order:
//!
//! 1. A lone `\n` (not next to another `\n`) becomes a space, repairing
//!    line-wrapped PDF text while leaving paragraph breaks for step 2.
//! 2. Every remaining whitespace run collapses to a single space.
//! 3. Text is cut at the first case-insensitive occurrence of
//!    `references`, `bibliography`, `acknowledgment` or `acknowledgement`.
//! 4. Leading and trailing whitespace is trimmed.
//!
//! Pages shorter than the minimum after cleaning are dropped.
//!
//! Step 3 matches anywhere in the flattened page, so a body paragraph that
//! merely mentions "references" loses everything after the mention. This
//! is an accepted heuristic.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{CleanedPage, PageRecord};

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn back_matter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)references|bibliography|acknowledge?ment").expect("static regex")
    })
}

/// Counters for one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub pages_in: usize,
    pub pages_kept: usize,
    pub pages_dropped: usize,
}

/// Clean a single page of raw text.
pub fn clean_text(text: &str) -> String {
    let joined = join_wrapped_lines(text);
    let collapsed = whitespace_run().replace_all(&joined, " ");
    let body = match back_matter().find(&collapsed) {
        Some(m) => &collapsed[..m.start()],
        None => &collapsed[..],
    };
    body.trim().to_string()
}

fn join_wrapped_lines(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            let prev_newline = i > 0 && chars[i - 1] == '\n';
            let next_newline = chars.get(i + 1) == Some(&'\n');
            if !prev_newline && !next_newline {
                out.push(' ');
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Clean every page, dropping those shorter than `min_chars` afterwards.
pub fn normalize_pages(
    pages: Vec<PageRecord>,
    min_chars: usize,
) -> (Vec<CleanedPage>, NormalizeStats) {
    let mut stats = NormalizeStats {
        pages_in: pages.len(),
        ..Default::default()
    };

    let cleaned: Vec<CleanedPage> = pages
        .into_iter()
        .filter_map(|page| {
            let text = clean_text(&page.text);
            if text.chars().count() < min_chars {
                tracing::trace!(source = %page.metadata.source, page = page.metadata.page, "dropping near-empty page");
                return None;
            }
            Some(CleanedPage {
                text,
                metadata: page.metadata,
            })
        })
        .collect();

    stats.pages_kept = cleaned.len();
    stats.pages_dropped = stats.pages_in - stats.pages_kept;
    tracing::info!(
        kept = stats.pages_kept,
        dropped = stats.pages_dropped,
        "normalized pages"
    );
    (cleaned, stats)
}
