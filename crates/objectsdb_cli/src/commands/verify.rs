//! Verify command implementation.

use super::open_log;
use objectsdb_engine::{Record, RecordIter, StorageBackend};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of records that decoded with a valid checksum.
    pub valid_records: usize,
    /// Number of commit markers seen.
    pub commits: usize,
    /// Bytes after the last commit marker.
    pub uncommitted_bytes: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let backend = open_log(path)?;
    let result = verify_log(&backend)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Reads every record of the log and checks its framing and checksum.
///
/// Reading stops at the first damaged record, since nothing after it can be
/// framed reliably.
pub fn verify_log(backend: &dyn StorageBackend) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let size = backend.size()?;
    let mut durable_end = 0u64;

    let mut iter = RecordIter::new(backend)?;
    while let Some(item) = iter.next() {
        result.records_checked += 1;
        match item {
            Ok((_, Record::Commit { .. })) => {
                result.valid_records += 1;
                result.commits += 1;
                durable_end = iter.offset();
            }
            Ok(_) => result.valid_records += 1,
            Err(e) => {
                let offset = iter.offset();
                result.errors.push(format!(
                    "Damaged record at offset {offset}: {e} ({} bytes unreadable)",
                    size - offset
                ));
            }
        }
    }

    result.uncommitted_bytes = size.saturating_sub(durable_end);
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("Record log:");
    println!("  Records checked: {}", result.records_checked);
    println!("  Valid records:   {}", result.valid_records);
    println!("  Commits:         {}", result.commits);
    if result.uncommitted_bytes > 0 {
        println!(
            "  Uncommitted:     {} bytes (discarded on next open)",
            result.uncommitted_bytes
        );
    }

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objectsdb_engine::{InMemoryBackend, ObjectId, ObjectMeta, SequenceNumber};

    fn log_with(records: &[Record]) -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        for record in records {
            backend.append(&record.encode().unwrap()).unwrap();
        }
        backend
    }

    fn put(oid: u64) -> Record {
        Record::Put {
            oid: ObjectId::new(oid),
            meta: ObjectMeta::root(oid, "Protein"),
            payload: vec![1, 2, 3],
        }
    }

    fn commit(seq: u64) -> Record {
        Record::Commit {
            sequence: SequenceNumber::new(seq),
        }
    }

    #[test]
    fn clean_log_passes() {
        let backend = log_with(&[put(1), put(2), commit(1)]);
        let result = verify_log(&backend).unwrap();

        assert!(result.is_ok());
        assert_eq!(result.records_checked, 3);
        assert_eq!(result.valid_records, 3);
        assert_eq!(result.commits, 1);
        assert_eq!(result.uncommitted_bytes, 0);
    }

    #[test]
    fn uncommitted_tail_is_reported_not_failed() {
        let backend = log_with(&[put(1), commit(1), put(2)]);
        let result = verify_log(&backend).unwrap();

        assert!(result.is_ok());
        assert!(result.uncommitted_bytes > 0);
    }

    #[test]
    fn flipped_byte_fails() {
        let mut data = log_with(&[put(1), commit(1)]).data();
        data[14] ^= 0xFF;
        let backend = InMemoryBackend::with_data(data);
        let result = verify_log(&backend).unwrap();

        assert!(!result.is_ok());
        assert_eq!(result.valid_records, 0);
        assert_eq!(result.errors.len(), 1);
    }
}
