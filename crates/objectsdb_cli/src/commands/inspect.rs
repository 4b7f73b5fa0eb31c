//! Inspect command implementation.

use super::open_log;
use crate::Format;
use objectsdb_engine::{replay, StorageBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Record log size in bytes.
    pub log_size: u64,
    /// Number of readable records.
    pub record_count: usize,
    /// Number of commit markers.
    pub commit_count: usize,
    /// Sequence number of the last commit.
    pub sequence: u64,
    /// Number of live committed objects.
    pub object_count: usize,
    /// Number of live root objects.
    pub root_count: usize,
    /// Bytes after the last commit marker that recovery would discard.
    pub uncommitted_bytes: u64,
    /// Object counts per kind (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<BTreeMap<String, usize>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_kinds: bool, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path, show_kinds)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Gathers statistics for the store at `path`.
pub fn collect(path: &Path, show_kinds: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let backend = open_log(path)?;
    let log_size = backend.size()?;
    let replayed = replay(&backend)?;

    let kinds = show_kinds.then(|| replayed.kind_counts());

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size,
        record_count: replayed.records,
        commit_count: replayed.commits,
        sequence: replayed.sequence.as_u64(),
        object_count: replayed.objects.len(),
        root_count: replayed.objects.values().filter(|l| l.meta.root).count(),
        uncommitted_bytes: log_size.saturating_sub(replayed.durable_end),
        kinds,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("ObjectsDB Store Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:        {} bytes", format_size(result.log_size));
    println!("  Records:     {}", result.record_count);
    println!("  Commits:     {}", result.commit_count);
    println!("  Sequence:    {}", result.sequence);
    if result.uncommitted_bytes > 0 {
        println!("  Uncommitted: {} bytes", format_size(result.uncommitted_bytes));
    }
    println!();
    println!("Objects:");
    println!("  Live:  {}", result.object_count);
    println!("  Roots: {}", result.root_count);

    if let Some(kinds) = &result.kinds {
        println!();
        println!("Kinds:");
        for (kind, count) in kinds {
            println!("  {kind}: {count}");
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objectsdb_engine::{ObjectEngine, ObjectId, ObjectMeta};
    use tempfile::TempDir;

    fn populate(dir: &Path) {
        let mut engine = ObjectEngine::open_or_create(dir).unwrap();
        engine.begin().unwrap();
        for key in 1..=3 {
            engine
                .persist(ObjectId::UNSET, ObjectMeta::root(key, "Protein"), vec![key as u8])
                .unwrap();
        }
        engine
            .persist(ObjectId::UNSET, ObjectMeta::root(9, "Peptide"), vec![9])
            .unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn counts_objects_per_kind() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let result = collect(dir.path(), true).unwrap();
        assert_eq!(result.object_count, 4);
        assert_eq!(result.root_count, 4);
        assert_eq!(result.commit_count, 1);
        assert_eq!(result.record_count, 5);
        assert_eq!(result.uncommitted_bytes, 0);

        let kinds = result.kinds.unwrap();
        assert_eq!(kinds["Protein"], 3);
        assert_eq!(kinds["Peptide"], 1);
    }

    #[test]
    fn kinds_omitted_unless_requested() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let result = collect(dir.path(), false).unwrap();
        assert!(result.kinds.is_none());
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("kinds"));
    }

    #[test]
    fn missing_store_is_reported() {
        let dir = TempDir::new().unwrap();
        assert!(collect(&dir.path().join("absent"), false).is_err());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
