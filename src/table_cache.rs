// Copyright 2020 The stratadb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::iterator::Iterator;
use crate::options::ReadOptions;
use crate::Result;

/// The saver callback invoked by `TableCache::get` for every table entry
/// probed for the lookup key, in table order starting from the first entry
/// at or past the key. Receives the found internal key and its value and
/// returns whether probing should continue.
pub type Saver<'a> = dyn FnMut(&[u8], &[u8]) -> bool + 'a;

/// The interface of the table cache collaborator.
///
/// Table files are immutable once created so implementations are expected
/// to be internally synchronized and shareable across threads. `seq_off`
/// is the sequence offset assigned to the file when it was created and is
/// handed back verbatim so the table layer can rebase the sequence numbers
/// stored in the file.
pub trait TableCache {
    type Iter: Iterator;

    /// Probes the table with the given file number for `internal_key` and
    /// invokes `saver` on the entries found. Implementations must call
    /// `saver` with entries in key order, starting at the first entry whose
    /// internal key is at or past `internal_key`, and stop as soon as the
    /// saver returns false.
    fn get(
        &self,
        options: ReadOptions,
        file_number: u64,
        file_size: u64,
        seq_off: u64,
        internal_key: &[u8],
        saver: &mut Saver,
    ) -> Result<()>;

    /// Creates an iterator over all entries of the given table file.
    fn new_iterator(
        &self,
        options: ReadOptions,
        file_number: u64,
        file_size: u64,
        seq_off: u64,
    ) -> Result<Self::Iter>;

    /// Returns the approximate file offset at which data for `internal_key`
    /// begins within the given table.
    fn approximate_offset_of(
        &self,
        file_number: u64,
        file_size: u64,
        seq_off: u64,
        internal_key: &[u8],
    ) -> u64;

    /// Drops any cached state for the given file number.
    fn evict(&self, file_number: u64);
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::format::InternalKeyComparator;
    use crate::iterator::tests::EntryIterator;
    use crate::util::collection::HashMap;
    use crate::util::comparator::{BytewiseComparator, Comparator};
    use std::cmp::Ordering;
    use std::sync::{Arc, RwLock};

    /// An in-memory stand-in for the table layer: file number -> entries of
    /// (internal key, value), sorted by the internal key comparator.
    /// Every probed file number is recorded for assertions.
    #[derive(Clone, Default)]
    pub(crate) struct TestTables {
        icmp: InternalKeyComparator<BytewiseComparator>,
        tables: Arc<RwLock<HashMap<u64, Vec<(Vec<u8>, Vec<u8>)>>>>,
        probes: Arc<RwLock<Vec<u64>>>,
    }

    impl TestTables {
        pub(crate) fn put(&self, file_number: u64, mut entries: Vec<(Vec<u8>, Vec<u8>)>) {
            let icmp = self.icmp.clone();
            entries.sort_by(|a, b| icmp.compare(&a.0, &b.0));
            self.tables.write().unwrap().insert(file_number, entries);
        }

        pub(crate) fn probes(&self) -> Vec<u64> {
            self.probes.read().unwrap().clone()
        }

        pub(crate) fn clear_probes(&self) {
            self.probes.write().unwrap().clear()
        }
    }

    impl TableCache for TestTables {
        type Iter = EntryIterator;

        fn get(
            &self,
            _options: ReadOptions,
            file_number: u64,
            _file_size: u64,
            _seq_off: u64,
            internal_key: &[u8],
            saver: &mut Saver,
        ) -> Result<()> {
            self.probes.write().unwrap().push(file_number);
            if let Some(entries) = self.tables.read().unwrap().get(&file_number) {
                for (k, v) in entries.iter() {
                    if self.icmp.compare(k, internal_key) != Ordering::Less && !saver(k, v) {
                        break;
                    }
                }
            }
            Ok(())
        }

        fn new_iterator(
            &self,
            _options: ReadOptions,
            file_number: u64,
            _file_size: u64,
            _seq_off: u64,
        ) -> Result<Self::Iter> {
            let entries = self
                .tables
                .read()
                .unwrap()
                .get(&file_number)
                .cloned()
                .unwrap_or_default();
            Ok(EntryIterator::new(entries))
        }

        fn approximate_offset_of(
            &self,
            _file_number: u64,
            _file_size: u64,
            _seq_off: u64,
            _internal_key: &[u8],
        ) -> u64 {
            0
        }

        fn evict(&self, file_number: u64) {
            self.tables.write().unwrap().remove(&file_number);
        }
    }
}
