use std::fmt::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::process::Outcome;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Skipped {
    pub file: String,
    pub reason: String,
}

/// Counts for one batch and the reason each unprocessed file was skipped,
/// in processing order.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: Vec<Skipped>,
}

impl RunSummary {
    pub fn new() -> RunSummary {
        RunSummary::default()
    }

    pub fn record(&mut self, path: &Path, outcome: &Outcome) {
        self.total += 1;
        if outcome.is_processed() {
            self.processed += 1;
        } else if let Some(reason) = outcome.reason() {
            self.skipped.push(Skipped {
                file: path
                    .file_name()
                    .unwrap_or(path.as_os_str())
                    .to_string_lossy()
                    .into_owned(),
                reason,
            });
        }
    }

    pub fn report(&self) -> String {
        let mut out = format!(
            "Job done for {} files. Processed: {}, Skipped: {}\n",
            self.total,
            self.processed.to_string().green(),
            self.skipped.len().to_string().yellow()
        );
        for skipped in &self.skipped {
            let _ = writeln!(out, "{}: {}", skipped.reason.red(), skipped.file);
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
