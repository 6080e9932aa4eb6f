//! Inspect command implementation.

use super::open_state;
use chrono::SecondsFormat;
use notebridge_model::{DecodedState, PassCounts, StateFormat};
use serde::Serialize;
use std::path::Path;

/// State file inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// State file path.
    pub path: String,
    /// On-disk format.
    pub format: &'static str,
    /// Document version after decoding.
    pub version: u32,
    /// Completion time of the last pass.
    pub last_sync_at: Option<String>,
    /// Counts from the last pass.
    pub last_summary: Option<PassCounts>,
    /// Number of mapping entries.
    pub entry_count: usize,
    /// Entries whose fingerprint is empty and will be settled by content.
    pub pending_verification: usize,
    /// Legacy markers that carried no remote id.
    pub dropped_legacy: usize,
    /// Entry details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntryView>>,
}

/// One mapping entry as shown to operators.
#[derive(Debug, Serialize)]
pub struct EntryView {
    /// Local note id.
    pub local_id: String,
    /// Remote note id.
    pub remote_id: Option<String>,
    /// Fingerprint at the last confirmed write.
    pub local_fingerprint: String,
    /// Remote modification time at the last confirmed write.
    pub remote_last_modified: String,
    /// Title at the last confirmed write.
    pub title: String,
    /// Time of the last confirmed write.
    pub synced_at: Option<String>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_entries: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (_store, decoded) = open_state(path)?;
    let result = inspect(path, &decoded, show_entries);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Builds the inspection result from a decoded state.
pub fn inspect(path: &Path, decoded: &DecodedState, show_entries: bool) -> InspectResult {
    let document = &decoded.document;
    let entries = document.keyed_entries();

    InspectResult {
        path: path.display().to_string(),
        format: match decoded.format {
            StateFormat::Current => "current",
            StateFormat::Legacy => "legacy",
        },
        version: document.version,
        last_sync_at: document
            .last_sync_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        last_summary: document.last_summary,
        entry_count: entries.len(),
        pending_verification: entries
            .iter()
            .filter(|e| e.local_fingerprint.is_empty())
            .count(),
        dropped_legacy: decoded.dropped_legacy,
        entries: show_entries.then(|| {
            entries
                .into_iter()
                .map(|e| EntryView {
                    remote_id: e.remote().map(str::to_string),
                    local_fingerprint: e.local_fingerprint.as_str().to_string(),
                    remote_last_modified: e.remote_last_modified.as_str().to_string(),
                    title: e.last_known_title.clone(),
                    synced_at: e
                        .synced_at
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    local_id: e.local_id,
                })
                .collect()
        }),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Sync State: {}", result.path);
    println!("==========================================");
    println!();
    println!("Format:          {} (v{})", result.format, result.version);
    println!(
        "Last sync:       {}",
        result.last_sync_at.as_deref().unwrap_or("never")
    );
    if let Some(summary) = &result.last_summary {
        println!("Last pass:       {}", summary);
    }
    println!();
    println!("Mapped pairs:    {}", result.entry_count);
    if result.pending_verification > 0 {
        println!("Pending check:   {}", result.pending_verification);
    }
    if result.dropped_legacy > 0 {
        println!("Legacy dropped:  {}", result.dropped_legacy);
    }

    if let Some(entries) = &result.entries {
        println!();
        println!("Entries:");
        println!("------------------------------------------");
        for entry in entries {
            println!(
                "  {} -> {}  {:?}",
                entry.local_id,
                entry.remote_id.as_deref().unwrap_or("-"),
                entry.title
            );
            println!(
                "      fingerprint={} remote_modified={} synced_at={}",
                if entry.local_fingerprint.is_empty() {
                    "-"
                } else {
                    &entry.local_fingerprint
                },
                if entry.remote_last_modified.is_empty() {
                    "-"
                } else {
                    &entry.remote_last_modified
                },
                entry.synced_at.as_deref().unwrap_or("-")
            );
        }
    }
}
