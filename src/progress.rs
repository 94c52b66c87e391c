//! Build progress reporting.
//!
//! Reports observable progress during `gqa build` so users see which file is
//! being extracted and how far embedding has got. Progress is emitted on
//! **stderr** so the stdout summary remains parseable for scripts.

use std::io::Write;

/// A single progress event for a build.
#[derive(Clone, Debug)]
pub enum BuildProgressEvent {
    /// A document finished extraction: `n` of `total` files.
    Extracting {
        source: String,
        n: u64,
        total: u64,
    },
    /// `n` of `total` chunks have been embedded.
    Embedding { n: u64, total: u64 },
    /// The index is being written to `dir`.
    Persisting { dir: String },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build  embedding  1,234 / 5,000 chunks".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Extracting { source, n, total } => format!(
                "build  extracting  {} / {} files  {}\n",
                format_number(*n),
                format_number(*total),
                source
            ),
            BuildProgressEvent::Embedding { n, total } => format!(
                "build  embedding  {} / {} chunks\n",
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Persisting { dir } => format!("build  writing index to {}\n", dir),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Extracting { source, n, total } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "source": source,
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Persisting { dir } => serde_json::json!({
                "event": "progress",
                "phase": "persisting",
                "dir": dir
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value. `None` picks [`ProgressMode::default_for_tty`].
    pub fn parse(value: Option<&str>) -> Result<Self, String> {
        match value {
            None => Ok(Self::default_for_tty()),
            Some("off") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => Err(format!(
                "invalid progress mode '{}': use off, human, or json",
                other
            )),
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
