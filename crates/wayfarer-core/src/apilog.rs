//! On-disk log of model API exchanges.
//!
//! Each generation writes one JSON file named `{plan_id}_{timestamp}.json`
//! so a misbehaving plan can be traced back to the exact prompt and raw
//! model output that produced it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;

/// Write one model exchange to `dir`, returning the path of the new file.
pub fn write_call_log(
    dir: &Path,
    plan_id: &str,
    prompt: &str,
    response: &serde_json::Value,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let now = Utc::now();
    let path = dir.join(format!("{plan_id}_{}.json", now.format("%Y%m%d_%H%M%S")));

    let entry = json!({
        "plan_id": plan_id,
        "timestamp": now.to_rfc3339(),
        "request": { "prompt": prompt },
        "response": response,
    });
    let body = serde_json::to_string_pretty(&entry).context("failed to encode call log entry")?;
    fs::write(&path, body)
        .with_context(|| format!("failed to write call log {}", path.display()))?;

    Ok(path)
}

/// List call log files for one plan, oldest first.
///
/// A missing directory means no calls were logged, not an error.
pub fn list_call_logs(dir: &Path, plan_id: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{plan_id}_");
    let mut logs = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("failed to read log directory entry")?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(&prefix) && name.ends_with(".json") {
            logs.push(entry.path());
        }
    }

    // File names embed the timestamp, so lexical order is chronological.
    logs.sort();
    Ok(logs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
