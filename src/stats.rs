//! Index statistics and health overview.
//!
//! Summarizes what a persisted index holds: embedder, chunk counts, on-disk
//! size, when it was built, and a per-domain breakdown. Used by `gqa stats`
//! to confirm a build produced what was expected.

use anyhow::{Context, Result};
use std::path::Path;

use crate::index::{VectorIndex, CHUNKS_FILE, MANIFEST_FILE, VECTORS_FILE};

/// Run the stats command: load the index and print a summary.
pub fn run_stats(index_dir: &Path) -> Result<()> {
    let index = VectorIndex::load(index_dir)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))?;
    let manifest = index.manifest();
    let build = &manifest.build;

    let size: u64 = [MANIFEST_FILE, VECTORS_FILE, CHUNKS_FILE]
        .iter()
        .filter_map(|f| std::fs::metadata(index_dir.join(f)).ok())
        .map(|m| m.len())
        .sum();

    println!("Grounded QA Index Stats");
    println!("=======================");
    println!();
    println!("  Index:       {}", index_dir.display());
    println!("  Size:        {}", format_bytes(size));
    println!(
        "  Built:       {}",
        format_ts_relative(manifest.built_at.timestamp())
    );
    println!("  Embedder:    {}", manifest.embedder);
    println!();
    println!("  Chunks:      {}", manifest.count);
    println!("  Dimensions:  {}", manifest.dims);
    println!(
        "  Skipped:     {} of {} chunks",
        build.skipped_chunks, build.chunks
    );
    println!(
        "  Pages:       {} raw, {} cleaned, {} skipped",
        build.raw_pages, build.cleaned_pages, build.pages_skipped
    );
    println!("  Files skipped: {}", build.files_skipped);

    let domains = index.domain_counts();
    if !domains.is_empty() {
        println!();
        println!("  By domain:");
        println!("  {:<32} {:>8}", "DOMAIN", "CHUNKS");
        println!("  {}", "-".repeat(41));
        for (domain, count) in &domains {
            println!("  {:<32} {:>8}", domain, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now, e.g. "3 hours ago".
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
