use crate::scan_events::{ScanEvent, SkipReason};
use crate::update::UpdateOutcome;
use colored::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputMode {
    Quiet,       // Only errors
    Normal,      // Standard output
    Verbose,     // Unchanged and ignored files too
    VeryVerbose, // All details including vanished entries
}

impl OutputMode {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            OutputMode::Quiet
        } else if verbose >= 2 {
            OutputMode::VeryVerbose
        } else if verbose == 1 {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        }
    }
}

/// A progress line: colored tag, the rest, and the mode needed to show it
struct Line {
    tag: ColoredString,
    text: String,
    min_mode: OutputMode,
}

impl Line {
    fn new(tag: ColoredString, text: impl Into<String>, min_mode: OutputMode) -> Self {
        Self {
            tag,
            text: text.into(),
            min_mode,
        }
    }

    fn render(&self) -> String {
        if self.tag.is_empty() {
            self.text.clone()
        } else {
            format!("{} {}", self.tag, self.text)
        }
    }
}

fn line_for(event: &ScanEvent) -> Line {
    use OutputMode::*;

    match event {
        ScanEvent::ManifestMissing { path } => Line::new(
            "".normal(),
            format!("No existing {} file", path.display()),
            Normal,
        ),
        ScanEvent::Unchanged { path } => Line::new("match".dimmed(), path.as_str(), Verbose),
        ScanEvent::Added { path } => Line::new("add".green(), path.as_str(), Normal),
        ScanEvent::Modified { path } => Line::new("mod".yellow(), path.as_str(), Normal),
        ScanEvent::TooFresh { path } => Line::new("<3s".cyan(), path.as_str(), Normal),
        ScanEvent::Ignored { path } => Line::new("old".dimmed(), path.as_str(), Verbose),
        ScanEvent::Skipped { path, reason } => {
            let min_mode = if *reason == SkipReason::Vanished {
                VeryVerbose
            } else {
                Normal
            };
            Line::new(
                "Skipping".yellow(),
                format!("{} -- {}", path, reason),
                min_mode,
            )
        }
        ScanEvent::NothingChanged => Line::new("".normal(), "No new or modified files.", Normal),
        ScanEvent::Removed { path } => Line::new("rem".red(), path.as_str(), Normal),
        ScanEvent::Expired { path } => Line::new("exp".red(), path.as_str(), Normal),
        ScanEvent::NothingMissing => Line::new("".normal(), "No missing files.", Normal),
        ScanEvent::NothingExpired => Line::new("".normal(), "No expired files.", Normal),
    }
}

/// Plain-text progress line for an event, if `mode` shows it
pub fn format_event(event: &ScanEvent, mode: OutputMode) -> Option<String> {
    let line = line_for(event);
    (mode >= line.min_mode).then(|| line.render())
}

#[derive(Serialize)]
struct JsonSkip {
    path: String,
    reason: SkipReason,
}

#[derive(Serialize)]
struct JsonUpdate<'a> {
    version: &'static str,
    timestamp: String,
    manifest: &'a Path,
    existed: bool,
    written: bool,
    stats: &'a crate::scanner::ScanStats,
    added: &'a [String],
    modified: &'a [String],
    too_fresh: &'a [String],
    removed: &'a [String],
    expired: &'a [String],
    skipped: &'a [JsonSkip],
}

/// Paths per outcome, gathered for the JSON summary
#[derive(Default)]
struct EventLog {
    added: Vec<String>,
    modified: Vec<String>,
    too_fresh: Vec<String>,
    removed: Vec<String>,
    expired: Vec<String>,
    skipped: Vec<JsonSkip>,
}

/// Renders update events as progress lines, or collects them for JSON
pub struct Reporter {
    mode: OutputMode,
    json: bool,
    log: EventLog,
}

impl Reporter {
    pub fn new(mode: OutputMode, json: bool) -> Self {
        Self {
            mode,
            json,
            log: EventLog::default(),
        }
    }

    pub fn event(&mut self, event: ScanEvent) {
        if self.json {
            self.record(event);
            return;
        }

        let line = line_for(&event);
        if self.mode >= line.min_mode {
            println!("{}", line.render());
        }
    }

    fn record(&mut self, event: ScanEvent) {
        let log = &mut self.log;
        match event {
            ScanEvent::Added { path } => log.added.push(path),
            ScanEvent::Modified { path } => log.modified.push(path),
            ScanEvent::TooFresh { path } => log.too_fresh.push(path),
            ScanEvent::Removed { path } => log.removed.push(path),
            ScanEvent::Expired { path } => log.expired.push(path),
            ScanEvent::Skipped { path, reason } => log.skipped.push(JsonSkip { path, reason }),
            _ => {}
        }
    }

    /// Print the JSON summary (JSON mode only)
    pub fn finish(&self, manifest: &Path, outcome: &UpdateOutcome) -> anyhow::Result<()> {
        if !self.json {
            return Ok(());
        }

        let log = &self.log;
        let summary = JsonUpdate {
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().to_rfc3339(),
            manifest,
            existed: outcome.existed,
            written: outcome.written,
            stats: &outcome.stats,
            added: &log.added,
            modified: &log.modified,
            too_fresh: &log.too_fresh,
            removed: &log.removed,
            expired: &log.expired,
            skipped: &log.skipped,
        };

        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

/// Print a list of paths, one per line
pub fn print_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> std::io::Result<()> {
    use std::io::Write;

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    for path in paths {
        writeln!(out, "{}", path)?;
    }
    out.flush()
}

/// Path as shown to the user: relative to `base` when below it
pub fn display_path(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}
