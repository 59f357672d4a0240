//! Business reference generation
//!
//! Two distinct styles serve different entities:
//!
//! - **Timestamp references** (`<8-hex>-<13-digit-millis>`) for invoices and
//!   credit notes. Random salt plus millisecond clock, no coordination
//!   needed between writers.
//! - **Sequential references** (`<PREFIX>_<YEAR>_<7-digit>`) for quotes.
//!   These must be gap-tolerant but strictly unique, so issuing one runs a
//!   read-increment-verify-write loop against the counter inside a single
//!   write transaction. redb admits one writer at a time, which makes that
//!   transaction the exclusive critical section; keeping nothing else in it
//!   keeps unrelated order and invoice writes out of the serialized path.
//!
//! The verify step re-checks the issued-reference table before handing a
//! number out: a residual row (for example one surviving the deletion of
//! its quote) would otherwise collide with a reset or lagging counter.

use chrono::Datelike;

use crate::storage::{LedgerStorage, StorageResult};

/// Collision-free reference: 8 hex chars, a dash, 13-digit unix millis
pub fn timestamp_reference() -> String {
    use rand::Rng;
    let salt: u32 = rand::thread_rng().r#gen();
    format!("{:08x}-{}", salt, shared::util::now_millis())
}

/// Issues sequential business references, scoped per prefix and year
#[derive(Clone)]
pub struct ReferenceSequencer {
    storage: LedgerStorage,
}

impl ReferenceSequencer {
    pub fn new(storage: LedgerStorage) -> Self {
        Self { storage }
    }

    /// Next sequential reference for the current year
    pub fn quote_reference(&self, prefix: &str) -> StorageResult<String> {
        self.sequential(prefix, chrono::Utc::now().year())
    }

    /// Next sequential reference formatted `PREFIX_YYYY_0000001`.
    ///
    /// The whole read-increment-verify-write runs in one write transaction
    /// and nothing else does, so concurrent callers serialize only here.
    pub fn sequential(&self, prefix: &str, year: i32) -> StorageResult<String> {
        let txn = self.storage.begin_write()?;
        let scope = format!("{prefix}:{year}");

        let mut counter = self.storage.quote_counter(&txn, &scope)?;
        let reference = loop {
            counter += 1;
            let candidate = format!("{prefix}_{year}_{counter:07}");
            if !self.storage.quote_ref_exists(&txn, &candidate)? {
                break candidate;
            }
            // residual row holds this number, keep incrementing
        };
        self.storage.set_quote_counter(&txn, &scope, counter)?;
        self.storage.insert_quote_ref(&txn, &reference)?;
        txn.commit()?;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sequencer() -> (ReferenceSequencer, LedgerStorage) {
        let storage = LedgerStorage::open_in_memory().unwrap();
        (ReferenceSequencer::new(storage.clone()), storage)
    }

    #[test]
    fn timestamp_reference_has_expected_shape() {
        let reference = timestamp_reference();
        let (salt, millis) = reference.split_once('-').unwrap();
        assert_eq!(salt.len(), 8);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(millis.len(), 13);
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn sequential_references_count_up_within_scope() {
        let (sequencer, _storage) = sequencer();
        assert_eq!(sequencer.sequential("QUO", 2024).unwrap(), "QUO_2024_0000001");
        assert_eq!(sequencer.sequential("QUO", 2024).unwrap(), "QUO_2024_0000002");
        // 不同年份各自从 1 开始
        assert_eq!(sequencer.sequential("QUO", 2025).unwrap(), "QUO_2025_0000001");
        assert_eq!(sequencer.sequential("ORD", 2024).unwrap(), "ORD_2024_0000001");
    }

    #[test]
    fn residual_rows_are_skipped() {
        let (sequencer, storage) = sequencer();
        sequencer.sequential("QUO", 2024).unwrap();
        sequencer.sequential("QUO", 2024).unwrap();

        // counter lost (eg. restored backup) while issued references survive
        let txn = storage.begin_write().unwrap();
        storage.set_quote_counter(&txn, "QUO:2024", 0).unwrap();
        txn.commit().unwrap();

        assert_eq!(sequencer.sequential("QUO", 2024).unwrap(), "QUO_2024_0000003");
    }

    #[test]
    fn concurrent_issuance_never_duplicates() {
        let (sequencer, _storage) = sequencer();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sequencer = sequencer.clone();
            handles.push(std::thread::spawn(move || {
                (0..5)
                    .map(|_| sequencer.sequential("QUO", 2024).unwrap())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for reference in handle.join().unwrap() {
                assert!(seen.insert(reference.clone()), "duplicate {reference}");
            }
        }
        assert_eq!(seen.len(), 40);
        assert!(seen.contains("QUO_2024_0000040"));
    }
}
