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

// Copyright (c) 2011 The LevelDB Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::format::{InternalKey, InternalKeyComparator};
use crate::options::Options;
use crate::util::comparator::Comparator;
use crate::version::version_edit::{FileMetaData, VersionEdit};
use crate::version::{total_file_size, Version};
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

/// Indexes into the inputs of a classic-strategy compaction
pub enum CompactionInputsRelation {
    /// level n
    Source = 0,
    /// level n + 1
    Parent = 1,
}

/// A `Compaction` encapsulates the planned inputs of one compaction job.
///
/// In the classic strategy `inputs` always holds two rows: the files of
/// `level` and the overlapping files of `level + 1`. In the sublevel
/// strategy it holds one row per sublevel of `level`'s output pool, and
/// the merged result is appended to the sublevel `output_sublevel` (the
/// top input sublevel of `level + 1`).
pub struct Compaction<C: Comparator> {
    options: Arc<Options<C>>,
    /// The level being compacted
    pub level: usize,
    /// The first sublevel row the inputs were drawn from (sublevel only)
    pub base_input_sublevel: Option<usize>,
    /// The sublevel row receiving the output (sublevel only)
    pub output_sublevel: Option<usize>,
    /// The version the inputs were picked from
    pub input_version: Arc<Version<C>>,
    /// Accumulates the result of the compaction
    pub edit: VersionEdit,
    /// The input files, grouped by level (classic) or sublevel row
    pub inputs: Vec<Vec<Arc<FileMetaData>>>,

    // State used to check for the number of overlapping grandparent bytes
    // (parent == level n + 1, grandparent == level n + 2)
    pub grandparents: Vec<Arc<FileMetaData>>,
    grandparent_index: usize,
    // See the comments in `should_stop_before`
    seen_key: bool,
    // Bytes of overlap between the current output and grandparent files
    overlapped_bytes: u64,

    // `level_ptrs` holds cursors into `input_version.files`: one position
    // per level higher than the ones involved in this compaction (i.e. for
    // all levels >= level n + 2), advanced monotonically as ascending keys
    // are fed to `is_base_level_for_key`.
    level_ptrs: Vec<usize>,
}

impl<C: Comparator + 'static> Compaction<C> {
    pub fn new(options: Arc<Options<C>>, level: usize, current: &Arc<Version<C>>) -> Self {
        let (inputs, base_input_sublevel, output_sublevel, level_ptrs) =
            if options.enable_sublevel {
                let (out_base, out_count) = current.output_pool[level];
                assert!(
                    level + 1 < current.input_pool.len(),
                    "[compaction] level {} has no next level to receive its output",
                    level
                );
                (
                    vec![vec![]; out_count],
                    Some(out_base),
                    Some(current.input_pool[level + 1].0),
                    vec![],
                )
            } else {
                (vec![vec![], vec![]], None, None, vec![0; current.files.len()])
            };
        Self {
            options,
            level,
            base_input_sublevel,
            output_sublevel,
            input_version: current.clone(),
            edit: VersionEdit::new(),
            inputs,
            grandparents: vec![],
            grandparent_index: 0,
            seen_key: false,
            overlapped_bytes: 0,
            level_ptrs,
        }
    }

    /// The count of input files in the given row
    #[inline]
    pub fn num_input_files(&self, which: usize) -> usize {
        self.inputs.get(which).map_or(0, |files| files.len())
    }

    /// The count of input files across all rows. With a `truncate_key`,
    /// only files whose smallest key is below the key are counted,
    /// matching what a truncated merge actually consumes.
    pub fn total_num_input_files(&self, truncate_key: Option<&InternalKey>) -> usize {
        let icmp = &self.input_version.comparator();
        let mut count = 0;
        for files in self.inputs.iter() {
            match truncate_key {
                Some(key) => {
                    count += files
                        .iter()
                        .take_while(|f| {
                            icmp.compare(f.smallest.data(), key.data()) == CmpOrdering::Less
                        })
                        .count()
                }
                None => count += files.len(),
            }
        }
        count
    }

    /// The byte count counterpart of `total_num_input_files`
    pub fn total_num_input_bytes(&self, truncate_key: Option<&InternalKey>) -> u64 {
        let icmp = &self.input_version.comparator();
        let mut bytes = 0;
        for files in self.inputs.iter() {
            for f in files.iter() {
                if let Some(key) = truncate_key {
                    if icmp.compare(f.smallest.data(), key.data()) != CmpOrdering::Less {
                        break;
                    }
                }
                bytes += f.file_size;
            }
        }
        bytes
    }

    /// The single input file of a trivial move
    ///
    /// # Panics
    ///
    /// Panics if every input row is empty
    pub fn the_only_file(&self) -> Arc<FileMetaData> {
        for files in self.inputs.iter() {
            if let Some(f) = files.first() {
                return f.clone();
            }
        }
        unreachable!("[compaction] no input file")
    }

    /// Is this a trivial compaction that can be implemented by just moving
    /// a single input file to the next level (no merging or splitting)?
    pub fn is_trivial_move(&self) -> bool {
        if self.options.enable_sublevel {
            self.total_num_input_files(None) == 1
        } else {
            // Avoid a move if there is lots of overlapping grandparent
            // data. Otherwise, the move could create a parent file that
            // will require a very expensive merge later on.
            self.num_input_files(CompactionInputsRelation::Source as usize) == 1
                && self.num_input_files(CompactionInputsRelation::Parent as usize) == 0
                && (!self.options.enable_should_stop_before
                    || total_file_size(&self.grandparents)
                        <= self.options.max_grandparent_overlap_bytes())
        }
    }

    /// Record the deletion of every input file in `edit`
    pub fn add_input_deletions(&mut self) {
        let base = self.base_input_sublevel.unwrap_or(self.level);
        let Self { inputs, edit, .. } = self;
        for (which, files) in inputs.iter().enumerate() {
            for f in files.iter() {
                edit.delete_file(base + which, f.number);
            }
        }
    }

    /// Record the result of a merge that stopped early at `key` (sublevel
    /// strategy only): input files wholly below the key are deleted, files
    /// straddling it become updated entries truncated at the key.
    pub fn add_input_deletions_or_updates(&mut self, key: &InternalKey) {
        debug_assert!(self.options.enable_sublevel);
        let icmp = self.input_version.comparator();
        self.edit.set_truncate_key(key.clone());
        let base = self.base_input_sublevel.unwrap_or(self.level);
        let level = self.level;
        let Self { inputs, edit, .. } = self;
        for (which, files) in inputs.iter().enumerate() {
            for (i, meta) in files.iter().enumerate() {
                if icmp.compare(meta.largest.data(), key.data()) == CmpOrdering::Less {
                    edit.delete_file(base + which, meta.number);
                } else {
                    if icmp.compare(meta.smallest.data(), key.data()) == CmpOrdering::Less {
                        edit.update_file(base + which, meta.number);
                    }
                    if level > 0 {
                        // Rows above level 0 are sorted and disjoint, so no
                        // later file of this row can start below the key
                        debug_assert!(
                            i == files.len() - 1
                                || icmp.compare(files[i + 1].smallest.data(), key.data())
                                    == CmpOrdering::Greater
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Returns false iff the information we have available guarantees that
    /// the compaction is producing data in `level + 1` for which no key
    /// exists in levels greater than `level + 1`.
    ///
    /// The per-level cursors only move forward, so callers must feed user
    /// keys in ascending order. Classic strategy only.
    pub fn is_base_level_for_key(&mut self, user_key: &[u8]) -> bool {
        debug_assert!(!self.options.enable_sublevel);
        let ucmp = &self.input_version.comparator().user_comparator;
        for level in self.level + 2..self.input_version.num_levels() {
            let files = self.input_version.level_files(level);
            while self.level_ptrs[level] < files.len() {
                let f = &files[self.level_ptrs[level]];
                if ucmp.compare(user_key, f.largest.user_key()) != CmpOrdering::Greater {
                    // We've advanced far enough
                    if ucmp.compare(user_key, f.smallest.user_key()) != CmpOrdering::Less {
                        // The key falls in this file's range, so it is
                        // definitely not the base level
                        return false;
                    }
                    break;
                }
                self.level_ptrs[level] += 1;
            }
        }
        true
    }

    /// Returns true iff we should stop building the current output before
    /// processing `internal_key`, because the output would overlap too
    /// many bytes in the grandparent level.
    pub fn should_stop_before(&mut self, internal_key: &[u8]) -> bool {
        if !self.options.enable_should_stop_before {
            return false;
        }
        if self.options.enable_sublevel {
            // TODO: implement this if we observe compactions of too many
            // files under the sublevel strategy
            return false;
        }
        let icmp = self.input_version.comparator();
        // Scan to find the earliest grandparent file that contains the key.
        // `seen_key` keeps the very first key from being charged: overlap
        // only counts once an output actually started.
        while self.grandparent_index < self.grandparents.len()
            && icmp.compare(
                internal_key,
                self.grandparents[self.grandparent_index].largest.data(),
            ) == CmpOrdering::Greater
        {
            if self.seen_key {
                self.overlapped_bytes += self.grandparents[self.grandparent_index].file_size;
            }
            self.grandparent_index += 1;
        }
        self.seen_key = true;
        if self.overlapped_bytes > self.options.max_grandparent_overlap_bytes() {
            // Too much overlap for the current output; start a new one
            self.overlapped_bytes = 0;
            return true;
        }
        false
    }
}

/// Returns the minimal internal-key range covering all entries in `files`
pub fn get_range<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    files: &[Arc<FileMetaData>],
) -> (InternalKey, InternalKey) {
    assert!(
        !files.is_empty(),
        "[compaction] trying to compute the range of zero files"
    );
    let mut smallest = files[0].smallest.clone();
    let mut largest = files[0].largest.clone();
    for f in files.iter().skip(1) {
        if icmp.compare(f.smallest.data(), smallest.data()) == CmpOrdering::Less {
            smallest = f.smallest.clone();
        }
        if icmp.compare(f.largest.data(), largest.data()) == CmpOrdering::Greater {
            largest = f.largest.clone();
        }
    }
    (smallest, largest)
}

/// Returns the minimal internal-key range covering all entries of both
/// input groups
pub fn get_range2<C: Comparator>(
    icmp: &InternalKeyComparator<C>,
    inputs1: &[Arc<FileMetaData>],
    inputs2: &[Arc<FileMetaData>],
) -> (InternalKey, InternalKey) {
    let (mut smallest, mut largest) = get_range(icmp, inputs1);
    if !inputs2.is_empty() {
        let (s2, l2) = get_range(icmp, inputs2);
        if icmp.compare(s2.data(), smallest.data()) == CmpOrdering::Less {
            smallest = s2;
        }
        if icmp.compare(l2.data(), largest.data()) == CmpOrdering::Greater {
            largest = l2;
        }
    }
    (smallest, largest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{InternalKeyComparator, ValueType};
    use crate::util::comparator::BytewiseComparator;

    fn new_file(number: u64, smallest: &[u8], largest: &[u8], size: u64) -> Arc<FileMetaData> {
        let mut f = FileMetaData::default();
        f.number = number;
        f.file_size = size;
        f.smallest = InternalKey::new(smallest, 100, ValueType::Value);
        f.largest = InternalKey::new(largest, 100, ValueType::Value);
        Arc::new(f)
    }

    fn default_options() -> Arc<Options<BytewiseComparator>> {
        Arc::new(Options::default())
    }

    fn classic_version(
        files: Vec<Vec<Arc<FileMetaData>>>,
    ) -> Arc<Version<BytewiseComparator>> {
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let mut v = Version::new(default_options(), icmp);
        for (level, fs) in files.into_iter().enumerate() {
            while v.files.len() <= level {
                v.files.push(vec![]);
            }
            v.files[level] = fs;
        }
        Arc::new(v)
    }

    #[test]
    fn test_get_range() {
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let files = vec![
            new_file(1, b"d", b"f", 10),
            new_file(2, b"a", b"c", 10),
            new_file(3, b"e", b"z", 10),
        ];
        let (smallest, largest) = get_range(&icmp, &files);
        assert_eq!(smallest.user_key(), b"a");
        assert_eq!(largest.user_key(), b"z");

        let (smallest, largest) = get_range2(&icmp, &files[..1], &files[1..]);
        assert_eq!(smallest.user_key(), b"a");
        assert_eq!(largest.user_key(), b"z");
    }

    #[test]
    fn test_is_trivial_move_classic() {
        let v = classic_version(vec![vec![], vec![], vec![new_file(1, b"a", b"c", 100)], vec![]]);
        let mut c = Compaction::new(default_options(), 2, &v);
        c.inputs[0].push(new_file(1, b"a", b"c", 100));
        assert!(c.is_trivial_move());

        // a parent input defeats the move
        c.inputs[1].push(new_file(2, b"b", b"d", 100));
        assert!(!c.is_trivial_move());

        // heavy grandparent overlap defeats the move as well
        c.inputs[1].clear();
        c.grandparents = vec![new_file(3, b"a", b"b", u64::max_value() / 2)];
        assert!(!c.is_trivial_move());
    }

    #[test]
    fn test_should_stop_before() {
        let v = classic_version(vec![vec![], vec![]]);
        let mut opts = Options::<BytewiseComparator>::default();
        opts.level_factor = 2;
        opts.table_file_size = 100;
        // overlap limit = 200 bytes
        let opts = Arc::new(opts);
        let mut c = Compaction::new(opts, 0, &v);
        c.grandparents = vec![
            new_file(1, b"a", b"b", 150),
            new_file(2, b"c", b"d", 150),
            new_file(3, b"e", b"f", 150),
        ];
        let key = |k: &[u8]| InternalKey::new(k, 100, ValueType::Value);
        // the first key never stops an output
        assert!(!c.should_stop_before(key(b"c1").data()));
        // passing "d" accumulates f1+f2 = 300 > 200: cut the output
        assert!(c.should_stop_before(key(b"g").data()));
        // the counter was reset by the cut
        assert!(!c.should_stop_before(key(b"g").data()));
    }

    #[test]
    fn test_should_stop_before_disabled() {
        let v = classic_version(vec![vec![], vec![]]);
        let mut opts = Options::<BytewiseComparator>::default();
        opts.enable_should_stop_before = false;
        let mut c = Compaction::new(Arc::new(opts), 0, &v);
        c.grandparents = vec![new_file(1, b"a", b"b", u64::max_value() / 2)];
        let key = InternalKey::new(b"z", 100, ValueType::Value);
        assert!(!c.should_stop_before(key.data()));
        assert!(!c.should_stop_before(key.data()));
    }

    #[test]
    fn test_is_base_level_for_key() {
        // compacting level 0 -> 1; levels 2 and 3 hold files
        let v = classic_version(vec![
            vec![],
            vec![],
            vec![new_file(1, b"c", b"f", 10)],
            vec![new_file(2, b"m", b"p", 10)],
        ]);
        let mut c = Compaction::new(default_options(), 0, &v);
        assert!(c.is_base_level_for_key(b"a"));
        assert!(!c.is_base_level_for_key(b"d"));
        assert!(c.is_base_level_for_key(b"g"));
        assert!(!c.is_base_level_for_key(b"p"));
        assert!(c.is_base_level_for_key(b"z"));
    }

    #[test]
    fn test_total_input_accounting_with_truncation() {
        let v = classic_version(vec![vec![], vec![]]);
        let mut c = Compaction::new(default_options(), 0, &v);
        c.inputs[0] = vec![new_file(1, b"a", b"c", 100), new_file(2, b"d", b"f", 100)];
        c.inputs[1] = vec![new_file(3, b"b", b"e", 100)];
        assert_eq!(c.total_num_input_files(None), 3);
        assert_eq!(c.total_num_input_bytes(None), 300);

        let key = InternalKey::new(b"b", 100, ValueType::Value);
        // only files starting below "b" count
        assert_eq!(c.total_num_input_files(Some(&key)), 1);
        assert_eq!(c.total_num_input_bytes(Some(&key)), 100);
    }

    #[test]
    fn test_add_input_deletions() {
        let v = classic_version(vec![vec![], vec![]]);
        let mut c = Compaction::new(default_options(), 1, &v);
        c.inputs[0] = vec![new_file(1, b"a", b"c", 100)];
        c.inputs[1] = vec![new_file(2, b"b", b"e", 100), new_file(3, b"f", b"g", 100)];
        c.add_input_deletions();
        let deleted = &c.edit.file_delta.deleted_files;
        assert_eq!(deleted.len(), 3);
        assert!(deleted.contains(&(1, 1)));
        assert!(deleted.contains(&(2, 2)));
        assert!(deleted.contains(&(2, 3)));
    }
}
