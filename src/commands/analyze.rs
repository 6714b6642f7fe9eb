//! `trinity analyze` - summarize the codebase for planning.
//!
//! Walks the project tree and records a file census to
//! `.trinity/analysis.json`. The summary gives an operator (or a planning
//! agent reading the file) a quick picture of what the project contains.

use crate::context::{require_initialized_project, ProjectContext, STATE_DIR};
use crate::error::{Result, TrinityError};
use crate::events::{append_event, Event, EventAction};
use crate::fs::atomic_write_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Directories never worth descending into.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "dist", "build"];

/// File census of the project tree.
#[derive(Debug, Serialize, Deserialize)]
pub struct Analysis {
    pub generated_at: DateTime<Utc>,
    pub total_files: u64,
    /// File counts keyed by extension; extensionless files under "(none)".
    pub files_by_extension: BTreeMap<String, u64>,
    /// Entries directly under the project root (directories end with "/").
    pub top_level: Vec<String>,
}

pub fn execute() -> Result<()> {
    let ctx = require_initialized_project()?;
    let analysis = analyze_project(&ctx)?;

    println!(
        "Analyzed {} file(s); summary written to {}",
        analysis.total_files,
        ctx.analysis_path().display()
    );
    for (ext, count) in analysis.files_by_extension.iter().take(10) {
        println!("  {:>6}  {}", count, ext);
    }
    Ok(())
}

pub(crate) fn analyze_project(ctx: &ProjectContext) -> Result<Analysis> {
    let mut analysis = Analysis {
        generated_at: Utc::now(),
        total_files: 0,
        files_by_extension: BTreeMap::new(),
        top_level: top_level_entries(&ctx.project_root)?,
    };
    walk(&ctx.project_root, &mut analysis)?;

    let json = serde_json::to_string_pretty(&analysis).map_err(|e| {
        TrinityError::IoFailure(format!("failed to serialize analysis: {}", e))
    })?;
    atomic_write_file(ctx.analysis_path(), &json)?;

    append_event(
        ctx,
        &Event::new(EventAction::Analyze)
            .with_details(serde_json::json!({ "total_files": analysis.total_files })),
    );
    Ok(analysis)
}

/// Visible entries directly under the project root, sorted, directories
/// marked with a trailing slash.
fn top_level_entries(root: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        TrinityError::UserError(format!(
            "failed to read project root '{}': {}",
            root.display(),
            e
        ))
    })?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            names.push(format!("{}/", name));
        } else {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn walk(dir: &Path, analysis: &mut Analysis) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        TrinityError::UserError(format!("failed to read directory '{}': {}", dir.display(), e))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            TrinityError::UserError(format!(
                "failed to read directory entry in '{}': {}",
                dir.display(),
                e
            ))
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if name == STATE_DIR || name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str())
            {
                continue;
            }
            walk(&path, analysis)?;
        } else if path.is_file() {
            if name.starts_with('.') {
                continue;
            }
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "(none)".to_string());
            *analysis.files_by_extension.entry(ext).or_insert(0) += 1;
            analysis.total_files += 1;
        }
    }
    Ok(())
}
