//! Compact command implementation.

use super::open_log;
use objectsdb_engine::{replay, CompactStats, EngineConfig, ObjectEngine, Record, StorageBackend};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = if dry_run { estimate(path)? } else { compact(path)? };
    print_stats(&stats);

    if !dry_run {
        println!();
        println!("✓ Compaction complete");
    }
    Ok(())
}

/// Computes what compaction would produce without touching the store.
pub fn estimate(path: &Path) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let backend = open_log(path)?;
    let replayed = replay(&backend)?;

    let mut bytes_after = Record::Commit {
        sequence: replayed.sequence,
    }
    .encode()?
    .len() as u64;
    for location in replayed.objects.values() {
        let (_, next) = Record::read_from(&backend, location.offset)?;
        bytes_after += next - location.offset;
    }

    Ok(CompactStats {
        objects: replayed.objects.len(),
        bytes_before: backend.size()?,
        bytes_after,
    })
}

/// Rewrites the store's log. Fails if a session has the store open.
pub fn compact(path: &Path) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let config = EngineConfig {
        create_if_missing: false,
        ..EngineConfig::default()
    };
    let mut engine = ObjectEngine::open_with_config(path, config)?;
    let stats = engine.compact()?;
    engine.close()?;
    Ok(stats)
}

fn print_stats(stats: &CompactStats) {
    println!("Compaction:");
    println!("  Live objects: {}", stats.objects);
    println!("  Size before:  {} bytes", stats.bytes_before);
    println!("  Size after:   {} bytes", stats.bytes_after);
    let share = if stats.bytes_before > 0 {
        stats.reclaimed() as f64 / stats.bytes_before as f64 * 100.0
    } else {
        0.0
    };
    println!("  Reclaimed:    {} bytes ({share:.1}%)", stats.reclaimed());
}
