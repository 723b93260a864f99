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

use crate::format::{
    InternalKey, InternalKeyComparator, LookupKey, ParsedInternalKey, ValueType, MAX_KEY_SEQUENCE,
    VALUE_TYPE_FOR_SEEK,
};
use crate::iterator::Iterator;
use crate::options::{Options, ReadOptions, MAX_MEM_COMPACT_LEVEL};
use crate::table_cache::TableCache;
use crate::util::coding::put_fixed_64;
use crate::util::comparator::Comparator;
use crate::version::version_edit::FileMetaData;
use crate::{Error, Result};
use std::cmp::Ordering as CmpOrdering;
use std::fmt::Write as _;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

pub mod sublevel;
pub mod version_edit;
pub mod version_set;

/// A pool of consecutive sublevel rows within a level: `(base_row, count)`.
/// Each level of the sublevel strategy is described by one input pool entry
/// and one output pool entry; together they tile the level's rows.
pub type SublevelPool = Vec<(usize, usize)>;

/// `Version` is an immutable snapshot of the table files at various levels.
///
/// Flushed memtables land in level-0 tables, and compactions migrate data
/// from level n to level n+1. The tables map internal keys (a user key, a
/// delete or set bit, and a sequence number) to user values.
///
/// The tables at level 0 may overlap each other in key range. The tables at
/// any non-0 level (or, in the sublevel strategy, within any non-0 row) are
/// sorted by their key range and do not overlap.
///
/// In the sublevel strategy every row of `files` is one sublevel, and the
/// `input_pool`/`output_pool` pairs group the rows into levels. Level 0
/// always consists of the single row 0 shared by both pools.
pub struct Version<C: Comparator> {
    options: Arc<Options<C>>,
    icmp: InternalKeyComparator<C>,

    // Files per level (or per sublevel row), sorted by the smallest key
    pub(crate) files: Vec<Vec<Arc<FileMetaData>>>,

    // Sublevel strategy only: partitions of the rows of `files`
    pub(crate) input_pool: SublevelPool,
    pub(crate) output_pool: SublevelPool,

    // Next file to compact based on seek stats
    pub(crate) file_to_compact: RwLock<Option<Arc<FileMetaData>>>,
    pub(crate) file_to_compact_level: AtomicUsize,

    // Level that should be compacted next and its compaction score.
    // score < 1 means compaction is not strictly needed.
    // These fields are computed by `finalize`
    pub(crate) compaction_score: f64,
    pub(crate) compaction_level: usize,
}

/// Records which file was probed for a read so that wasted seeks can be
/// charged against it afterwards.
#[derive(Debug)]
pub struct SeekStats {
    /// The file that was probed
    pub seek_file: Option<Arc<FileMetaData>>,
    /// The level (or sublevel row) `seek_file` is at
    pub seek_file_level: Option<usize>,
}

impl SeekStats {
    #[inline]
    pub fn new() -> Self {
        Self {
            seek_file: None,
            seek_file_level: None,
        }
    }
}

impl Default for SeekStats {
    fn default() -> Self {
        Self::new()
    }
}

// States a table probe can leave a `Saver` in
#[derive(PartialEq)]
enum SaverState {
    NotFound,
    Found,
    Deleted,
    Corrupt,
}

impl<C: Comparator + 'static> Version<C> {
    pub fn new(options: Arc<Options<C>>, icmp: InternalKeyComparator<C>) -> Self {
        let (files, input_pool, output_pool) = if options.enable_sublevel {
            // Level 0 is the shared row 0; level 1 starts with one input
            // sublevel and an empty output pool.
            (
                vec![vec![], vec![]],
                vec![(0, 1), (1, 1)],
                vec![(0, 1), (2, 0)],
            )
        } else {
            let mut files = Vec::with_capacity(MAX_MEM_COMPACT_LEVEL + 1);
            for _ in 0..=MAX_MEM_COMPACT_LEVEL {
                files.push(vec![]);
            }
            (files, vec![], vec![])
        };
        Self {
            options,
            icmp,
            files,
            input_pool,
            output_pool,
            file_to_compact: RwLock::new(None),
            file_to_compact_level: AtomicUsize::new(0),
            compaction_score: -1.0,
            compaction_level: 0,
        }
    }

    /// Search the given key level by level. A `None` in the result
    /// means the key is either absent or deleted; callers cannot
    /// distinguish the two.
    pub fn get<T: TableCache>(
        &self,
        options: ReadOptions,
        key: &LookupKey,
        tables: &T,
    ) -> Result<(Option<Vec<u8>>, SeekStats)> {
        let ikey = key.internal_key();
        let ukey = key.user_key();
        let ucmp = &self.icmp.user_comparator;
        let mut seek_stats = SeekStats::new();
        let mut last_file_read: Option<(Arc<FileMetaData>, usize)> = None;
        for (level, files) in self.files.iter().enumerate() {
            if files.is_empty() {
                continue;
            }
            let mut files_to_seek = vec![];
            if level == 0 {
                // Level-0 files may overlap each other. Find all files that
                // overlap user_key and process them from newest to oldest
                // since the newest file holds the live entries.
                for f in files.iter() {
                    if ucmp.compare(ukey, f.smallest.user_key()) != CmpOrdering::Less
                        && ucmp.compare(ukey, f.largest.user_key()) != CmpOrdering::Greater
                    {
                        files_to_seek.push(f.clone());
                    }
                }
                files_to_seek.sort_by(|a, b| b.number.cmp(&a.number));
            } else {
                let index = Self::find_file(&self.icmp, files, ikey);
                if index < files.len() {
                    let target = files[index].clone();
                    // The file found by the binary search is the first one
                    // whose largest key is >= ikey; it only holds data for
                    // the user key if its range actually starts at or
                    // before it.
                    if ucmp.compare(ukey, target.smallest.user_key()) != CmpOrdering::Less {
                        files_to_seek.push(target);
                    }
                }
            }

            for file in files_to_seek {
                if last_file_read.is_some() && seek_stats.seek_file.is_none() {
                    // We have had more than one seek for this read.
                    // Charge the first probed file.
                    let (f, l) = last_file_read.clone().unwrap();
                    seek_stats.seek_file = Some(f);
                    seek_stats.seek_file_level = Some(l);
                }
                last_file_read = Some((file.clone(), level));

                let mut state = SaverState::NotFound;
                let mut value = vec![];
                tables.get(
                    options,
                    file.number,
                    file.file_size,
                    file.seq_off,
                    ikey,
                    &mut |found_key: &[u8], v: &[u8]| {
                        match ParsedInternalKey::decode_from(found_key) {
                            None => state = SaverState::Corrupt,
                            Some(parsed) => {
                                if ucmp.compare(parsed.user_key, ukey) == CmpOrdering::Equal {
                                    state = match parsed.value_type {
                                        ValueType::Value => {
                                            value.extend_from_slice(v);
                                            SaverState::Found
                                        }
                                        _ => SaverState::Deleted,
                                    };
                                }
                            }
                        }
                        // The first entry at or past the key decides the
                        // outcome either way
                        false
                    },
                )?;
                match state {
                    SaverState::NotFound => continue, // keep searching
                    SaverState::Found => return Ok((Some(value), seek_stats)),
                    SaverState::Deleted => return Ok((None, seek_stats)),
                    SaverState::Corrupt => {
                        return Err(Error::Corruption(format!(
                            "corrupted key for {:?}",
                            ukey
                        )))
                    }
                }
            }
        }
        Ok((None, seek_stats))
    }

    /// Update seek stats for the probed file. If it runs out of
    /// `allowed_seeks`, mark it as a pending compaction candidate and
    /// return true.
    pub fn update_stats(&self, stats: SeekStats) -> bool {
        if let Some(f) = stats.seek_file {
            let old = f.allowed_seeks.fetch_sub(1, Ordering::SeqCst);
            let mut file_to_compact = self.file_to_compact.write().unwrap();
            if file_to_compact.is_none() && old == 1 {
                *file_to_compact = Some(f);
                self.file_to_compact_level
                    .store(stats.seek_file_level.unwrap(), Ordering::Release);
                return true;
            }
        }
        false
    }

    /// Record a sample of bytes read at the specified internal key.
    /// Returns true if a new compaction may need to be triggered.
    pub fn record_read_sample(&self, internal_key: &[u8]) -> bool {
        if let Some(pkey) = ParsedInternalKey::decode_from(internal_key) {
            let mut stats = SeekStats::new();
            let mut matches = 0;
            self.for_each_overlapping(pkey.user_key, internal_key, |level, file| {
                matches += 1;
                if matches == 1 {
                    // Remember the first match
                    stats.seek_file = Some(file);
                    stats.seek_file_level = Some(level);
                }
                // We can stop iterating once we have a second match
                matches < 2
            });
            // Must have at least two matches since we want to merge across
            // files. But what if we have a single file that contains many
            // overwrites and deletions? Should we have another mechanism
            // for finding such files?
            if matches >= 2 {
                return self.update_stats(stats);
            }
        }
        false
    }

    /// Call `func(level, file)` for every file that may contain `user_key`,
    /// from newest to oldest. If an invocation of `func` returns false, no
    /// more calls are made.
    pub fn for_each_overlapping<F>(&self, user_key: &[u8], internal_key: &[u8], mut func: F)
    where
        F: FnMut(usize, Arc<FileMetaData>) -> bool,
    {
        let ucmp = &self.icmp.user_comparator;
        // Search level-0 in order from newest to oldest
        let mut tmp = vec![];
        for f in self.files[0].iter() {
            if ucmp.compare(user_key, f.smallest.user_key()) != CmpOrdering::Less
                && ucmp.compare(user_key, f.largest.user_key()) != CmpOrdering::Greater
            {
                tmp.push(f.clone());
            }
        }
        tmp.sort_by(|a, b| b.number.cmp(&a.number));
        for f in tmp {
            if !func(0, f) {
                return;
            }
        }

        // Search the other levels
        for (level, files) in self.files.iter().enumerate().skip(1) {
            if files.is_empty() {
                continue;
            }
            let index = Self::find_file(&self.icmp, files, internal_key);
            if index < files.len() {
                let f = files[index].clone();
                if ucmp.compare(user_key, f.smallest.user_key()) != CmpOrdering::Less
                    && !func(level, f)
                {
                    return;
                }
            }
        }
    }

    /// Whether the version needs to be compacted
    #[inline]
    pub fn needs_compaction(&self) -> bool {
        self.compaction_score >= 1.0 || self.file_to_compact.read().unwrap().is_some()
    }

    /// Binary search the given files to find the earliest index whose
    /// file's largest ikey is >= the given ikey. Returns the length of
    /// files when not found.
    pub fn find_file(
        icmp: &InternalKeyComparator<C>,
        files: &[Arc<FileMetaData>],
        ikey: &[u8],
    ) -> usize {
        let mut left = 0;
        let mut right = files.len();
        while left < right {
            let mid = (left + right) / 2;
            if icmp.compare(files[mid].largest.data(), ikey) == CmpOrdering::Less {
                // Key at "mid.largest" is < "target". Therefore all files
                // at or before "mid" are uninteresting.
                left = mid + 1;
            } else {
                // Key at "mid.largest" is >= "target". Therefore all files
                // after "mid" are uninteresting.
                right = mid;
            }
        }
        right
    }

    /// Returns true iff some file in the specified level overlaps some part
    /// of `[smallest_ukey, largest_ukey]`.
    /// A `None` `smallest_ukey` represents a key smaller than all keys.
    /// A `None` `largest_ukey` represents a key larger than all keys.
    pub fn overlap_in_level(
        &self,
        level: usize,
        smallest_ukey: Option<&[u8]>,
        largest_ukey: Option<&[u8]>,
    ) -> bool {
        if level == 0 {
            // Need to check against all files since level 0 files may
            // overlap each other
            for file in self.files[0].iter() {
                if self.key_is_after_file(file, smallest_ukey)
                    || self.key_is_before_file(file, largest_ukey)
                {
                    // No overlap
                    continue;
                }
                return true;
            }
            return false;
        }
        // Binary search over the disjoint sorted files
        let index = match smallest_ukey {
            Some(s_ukey) => {
                let smallest_ikey = InternalKey::new(s_ukey, MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK);
                Self::find_file(&self.icmp, &self.files[level], smallest_ikey.data())
            }
            None => 0,
        };
        if index >= self.files[level].len() {
            // The beginning of the range is after all files, so no overlap
            return false;
        }
        !self.key_is_before_file(&self.files[level][index], largest_ukey)
    }

    /// Return the level at which we should place new table output covering
    /// the range `[smallest_ukey, largest_ukey]`. Classic strategy only; in
    /// the sublevel strategy new tables always land in level 0.
    pub fn pick_level_for_memtable_output(
        &self,
        smallest_ukey: &[u8],
        largest_ukey: &[u8],
    ) -> usize {
        debug_assert!(!self.options.enable_sublevel);
        let mut level = 0;
        if !self.overlap_in_level(0, Some(smallest_ukey), Some(largest_ukey)) {
            // Push to the next level if there is no overlap in it and the
            // bytes overlapping in the level after that are limited
            let start = InternalKey::new(smallest_ukey, MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK);
            let limit = InternalKey::new(largest_ukey, 0, ValueType::Deletion);
            while level < MAX_MEM_COMPACT_LEVEL {
                if self.overlap_in_level(level + 1, Some(smallest_ukey), Some(largest_ukey)) {
                    break;
                }
                if level + 2 < self.files.len() {
                    // Check that the file does not overlap too many
                    // grandparent bytes
                    let overlaps = self.get_overlapping_inputs(level + 2, Some(&start), Some(&limit));
                    if total_file_size(&overlaps) > self.options.max_grandparent_overlap_bytes() {
                        break;
                    }
                }
                level += 1;
            }
        }
        level
    }

    /// Return all files in the given level (or sublevel row) whose user-key
    /// range intersects `[begin, end]`.
    ///
    /// A `None` begin is considered -infinite and a `None` end +infinite.
    /// Since level 0 files may overlap each other, a newly added file can
    /// extend the range; the scan is then restarted so the result covers
    /// every transitively overlapping file, and the total range can end up
    /// larger than `[begin, end]`.
    pub fn get_overlapping_inputs(
        &self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Vec<Arc<FileMetaData>> {
        let mut inputs = vec![];
        let ucmp = &self.icmp.user_comparator;
        let mut user_begin = begin.map(|ik| ik.user_key().to_vec());
        let mut user_end = end.map(|ik| ik.user_key().to_vec());
        let mut i = 0;
        while i < self.files[level].len() {
            let f = self.files[level][i].clone();
            i += 1;
            let file_start = f.smallest.user_key();
            let file_limit = f.largest.user_key();
            if let Some(begin_key) = &user_begin {
                if ucmp.compare(file_limit, begin_key) == CmpOrdering::Less {
                    // `f` is completely before the specified range
                    continue;
                }
            }
            if let Some(end_key) = &user_end {
                if ucmp.compare(file_start, end_key) == CmpOrdering::Greater {
                    // `f` is completely after the specified range
                    continue;
                }
            }
            inputs.push(f.clone());
            if level == 0 {
                // Level-0 files may overlap each other. If the newly added
                // file expands the range, restart the search.
                let mut expanded = false;
                if let Some(begin_key) = &user_begin {
                    if ucmp.compare(file_start, begin_key) == CmpOrdering::Less {
                        user_begin = Some(file_start.to_vec());
                        expanded = true;
                    }
                }
                if !expanded {
                    if let Some(end_key) = &user_end {
                        if ucmp.compare(file_limit, end_key) == CmpOrdering::Greater {
                            user_end = Some(file_limit.to_vec());
                            expanded = true;
                        }
                    }
                }
                if expanded {
                    inputs.clear();
                    i = 0;
                }
            }
        }
        inputs
    }

    /// Calculate the compaction score of the version. The level with the
    /// highest score is recorded as the level to compact next.
    pub fn finalize(&mut self) {
        let mut best_level = 0;
        let mut best_score = -1.0f64;
        if self.options.enable_sublevel {
            assert_eq!(self.input_pool.len(), self.output_pool.len());
            // The freshly appended highest level is intentionally not scored
            for level in 0..self.input_pool.len() - 1 {
                let score = if level == 0 {
                    debug_assert_eq!(self.input_pool[0], (0, 1));
                    debug_assert_eq!(self.output_pool[0], (0, 1));
                    self.files[0].len() as f64 / self.options.l0_compaction_trigger as f64
                } else {
                    self.num_level_bytes(level) as f64 / self.options.max_bytes_for_level(level)
                };
                if score > best_score {
                    best_level = level;
                    best_score = score;
                }
            }
        } else {
            // The highest level is the reserved growth slot and stays empty
            for level in 0..self.files.len() - 1 {
                let score = if level == 0 {
                    // We treat level-0 specially by bounding the number of
                    // files instead of the number of bytes for two reasons:
                    //
                    // (1) With larger write-buffer sizes, it is nice not to
                    // do too many level-0 compactions.
                    //
                    // (2) The files in level-0 are merged on every read and
                    // therefore we wish to avoid too many files when the
                    // individual file size is small (perhaps because of a
                    // small write-buffer setting, or very high compression
                    // ratios, or lots of overwrites/deletions).
                    self.files[0].len() as f64 / self.options.l0_compaction_trigger as f64
                } else {
                    total_file_size(&self.files[level]) as f64
                        / self.options.max_bytes_for_level(level)
                };
                if score > best_score {
                    best_level = level;
                    best_score = score;
                }
            }
        }
        self.compaction_level = best_level;
        self.compaction_score = best_score;
    }

    /// Returns the internal key comparator
    #[inline]
    pub fn comparator(&self) -> InternalKeyComparator<C> {
        self.icmp.clone()
    }

    /// Returns the slice of files in the given level (or sublevel row)
    ///
    /// # Panics
    ///
    /// Panics if `level` is out of bounds
    #[inline]
    pub fn level_files(&self, level: usize) -> &[Arc<FileMetaData>] {
        assert!(
            level < self.files.len(),
            "[version] invalid level {}, the max level is {}",
            level,
            self.files.len() - 1
        );
        self.files[level].as_slice()
    }

    /// The number of levels of this version. In the sublevel strategy this
    /// counts levels, not sublevel rows.
    #[inline]
    pub fn num_levels(&self) -> usize {
        if self.options.enable_sublevel {
            debug_assert_eq!(self.input_pool.len(), self.output_pool.len());
            self.input_pool.len()
        } else {
            self.files.len()
        }
    }

    /// The count of files in the given level, aggregating both pools in the
    /// sublevel strategy.
    pub fn num_level_files(&self, level: usize) -> usize {
        if self.options.enable_sublevel {
            if level == 0 {
                self.files[0].len()
            } else if level < self.input_pool.len() {
                self.pool_rows(&self.input_pool, level)
                    .chain(self.pool_rows(&self.output_pool, level))
                    .map(|row| self.files[row].len())
                    .sum()
            } else {
                0
            }
        } else {
            self.files.get(level).map_or(0, |files| files.len())
        }
    }

    /// The total bytes in the given level, aggregating both pools in the
    /// sublevel strategy.
    pub fn num_level_bytes(&self, level: usize) -> u64 {
        if self.options.enable_sublevel {
            if level == 0 {
                total_file_size(&self.files[0])
            } else if level < self.input_pool.len() {
                self.pool_rows(&self.input_pool, level)
                    .chain(self.pool_rows(&self.output_pool, level))
                    .map(|row| total_file_size(&self.files[row]))
                    .sum()
            } else {
                0
            }
        } else {
            total_file_size(&self.files[level])
        }
    }

    // The row indices the given pool covers at `level`
    fn pool_rows(&self, pool: &[(usize, usize)], level: usize) -> std::ops::Range<usize> {
        let (base, count) = pool[level];
        base..base + count
    }

    /// Return a String summarizing the number of files in every level. In
    /// the sublevel strategy the sublevel counts of both pools are shown
    /// next to the file count.
    pub fn level_summary(&self) -> String {
        let mut s = String::from("files[");
        if self.options.enable_sublevel {
            for level in 0..self.input_pool.len() {
                let _ = write!(
                    s,
                    " {}@{}&{}",
                    self.num_level_files(level),
                    self.input_pool[level].1,
                    self.output_pool[level].1
                );
            }
        } else {
            for files in self.files.iter() {
                let _ = write!(s, " {}", files.len());
            }
        }
        s.push_str(" ]");
        s
    }

    /// Return the approximate offset in the database of the data for the
    /// given `ikey` in this version
    pub fn approximate_offset_of<T: TableCache>(&self, ikey: &InternalKey, tables: &T) -> u64 {
        let mut result = 0;
        for (level, files) in self.files.iter().enumerate() {
            for f in files {
                if self.icmp.compare(f.largest.data(), ikey.data()) != CmpOrdering::Greater {
                    // The entire file is before `ikey`, so just add the
                    // file size
                    result += f.file_size;
                } else if self.icmp.compare(f.smallest.data(), ikey.data()) == CmpOrdering::Greater
                {
                    // The entire file is after `ikey`, so ignore it
                    if level > 0 {
                        // Files other than level-0 are sorted by `smallest`,
                        // so no further file in this level can contain data
                        // for `ikey`
                        break;
                    }
                } else {
                    // `ikey` falls in the range of this table
                    result += tables.approximate_offset_of(
                        f.number,
                        f.file_size,
                        f.seq_off,
                        ikey.data(),
                    );
                }
            }
        }
        result
    }

    // Used for the smallest user key of a range
    fn key_is_after_file(&self, file: &Arc<FileMetaData>, ukey: Option<&[u8]>) -> bool {
        ukey.map_or(false, |k| {
            self.icmp.user_comparator.compare(k, file.largest.user_key()) == CmpOrdering::Greater
        })
    }

    // Used for the largest user key of a range
    fn key_is_before_file(&self, file: &Arc<FileMetaData>, ukey: Option<&[u8]>) -> bool {
        ukey.map_or(false, |k| {
            self.icmp.user_comparator.compare(k, file.smallest.user_key()) == CmpOrdering::Less
        })
    }
}

/// Calculate the total size of the given files
#[inline]
pub fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().fold(0, |acc, file| acc + file.file_size)
}

/// The length of the value yielded by `LevelFileNumIterator`:
/// file number, file size and sequence offset, fixed-64 encoded each
pub const FILE_META_LENGTH: usize = 3 * mem::size_of::<u64>();

/// An internal iterator over the files of a single level. For a given
/// entry, `key()` is the largest key that occurs in the file, and `value()`
/// is a 24-byte buffer containing the file number, the file size and the
/// sequence offset, all encoded with fixed 64.
pub struct LevelFileNumIterator<C: Comparator> {
    files: Vec<Arc<FileMetaData>>,
    icmp: InternalKeyComparator<C>,
    index: usize,
    value_buf: Vec<u8>,
}

impl<C: Comparator + 'static> LevelFileNumIterator<C> {
    pub fn new(icmp: InternalKeyComparator<C>, files: Vec<Arc<FileMetaData>>) -> Self {
        let index = files.len(); // marks as invalid
        Self {
            files,
            icmp,
            index,
            value_buf: Vec::with_capacity(FILE_META_LENGTH),
        }
    }

    fn fill_value_buf(&mut self) {
        if self.valid() {
            let file = &self.files[self.index];
            self.value_buf.clear();
            put_fixed_64(&mut self.value_buf, file.number);
            put_fixed_64(&mut self.value_buf, file.file_size);
            put_fixed_64(&mut self.value_buf, file.seq_off);
        }
    }

    fn valid_or_panic(&self) {
        assert!(self.valid(), "[level file num iterator] out of bounds")
    }
}

impl<C: Comparator + 'static> Iterator for LevelFileNumIterator<C> {
    fn valid(&self) -> bool {
        self.index < self.files.len()
    }

    fn seek_to_first(&mut self) {
        self.index = 0;
        self.fill_value_buf();
    }

    fn seek_to_last(&mut self) {
        self.index = if self.files.is_empty() {
            0
        } else {
            self.files.len() - 1
        };
        self.fill_value_buf();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index = Version::find_file(&self.icmp, &self.files, target);
        self.fill_value_buf();
    }

    fn next(&mut self) {
        self.valid_or_panic();
        self.index += 1;
        self.fill_value_buf();
    }

    fn prev(&mut self) {
        self.valid_or_panic();
        if self.index == 0 {
            // marks as invalid
            self.index = self.files.len();
        } else {
            self.index -= 1;
            self.fill_value_buf();
        }
    }

    fn key(&self) -> &[u8] {
        self.valid_or_panic();
        self.files[self.index].largest.data()
    }

    fn value(&self) -> &[u8] {
        self.valid_or_panic();
        &self.value_buf
    }

    fn status(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{InternalKey, InternalKeyComparator, ValueType};
    use crate::util::coding::decode_fixed_64;
    use crate::util::comparator::BytewiseComparator;

    fn new_file(
        number: u64,
        smallest: &[u8],
        largest: &[u8],
    ) -> Arc<FileMetaData> {
        let mut f = FileMetaData::default();
        f.number = number;
        f.file_size = 10 * number;
        f.smallest = InternalKey::new(smallest, 100, ValueType::Value);
        f.largest = InternalKey::new(largest, 100, ValueType::Value);
        Arc::new(f)
    }

    struct FindFileTests {
        files: Vec<Arc<FileMetaData>>,
        cmp: InternalKeyComparator<BytewiseComparator>,
    }

    impl FindFileTests {
        fn new() -> Self {
            Self {
                files: Vec::new(),
                cmp: InternalKeyComparator::new(BytewiseComparator::default()),
            }
        }

        fn add(&mut self, smallest: &str, largest: &str) {
            let number = self.files.len() as u64 + 1;
            self.files
                .push(new_file(number, smallest.as_bytes(), largest.as_bytes()));
        }

        fn find(&self, key: &str) -> usize {
            let ikey = InternalKey::new(key.as_bytes(), 100, ValueType::Value);
            Version::find_file(&self.cmp, &self.files, ikey.data())
        }
    }

    #[test]
    fn test_find_file_with_single_file() {
        let mut t = FindFileTests::new();
        assert_eq!(0, t.find("foo"));
        t.add("p", "q");
        for (expected, input) in vec![(0, "a"), (0, "p"), (0, "q"), (1, "q1"), (1, "z")] {
            assert_eq!(expected, t.find(input), "input {}", input);
        }
    }

    #[test]
    fn test_find_files_with_various_files() {
        let mut t = FindFileTests::new();
        for (start, end) in vec![("150", "200"), ("200", "250"), ("300", "350"), ("400", "450")] {
            t.add(start, end);
        }
        let cases = vec![
            (0, "100"),
            (0, "150"),
            (1, "201"),
            (2, "251"),
            (2, "301"),
            (2, "350"),
            (3, "351"),
            (4, "451"),
        ];
        for (expected, input) in cases {
            assert_eq!(expected, t.find(input), "input {}", input);
        }
    }

    fn test_version(files: Vec<Vec<Arc<FileMetaData>>>) -> Version<BytewiseComparator> {
        let opts = Arc::new(Options::default());
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let mut v = Version::new(opts, icmp);
        for (level, fs) in files.into_iter().enumerate() {
            while v.files.len() <= level {
                v.files.push(vec![]);
            }
            v.files[level] = fs;
        }
        v
    }

    #[test]
    fn test_get_overlapping_inputs_disjoint_level() {
        let v = test_version(vec![
            vec![],
            vec![
                new_file(1, b"150", b"200"),
                new_file(2, b"250", b"300"),
                new_file(3, b"400", b"500"),
            ],
        ]);
        let key = |k: &[u8]| InternalKey::new(k, 100, ValueType::Value);
        let numbers = |files: Vec<Arc<FileMetaData>>| {
            files.iter().map(|f| f.number).collect::<Vec<_>>()
        };
        assert_eq!(
            numbers(v.get_overlapping_inputs(1, Some(&key(b"100")), Some(&key(b"149")))),
            Vec::<u64>::new()
        );
        assert_eq!(
            numbers(v.get_overlapping_inputs(1, Some(&key(b"100")), Some(&key(b"150")))),
            vec![1]
        );
        assert_eq!(
            numbers(v.get_overlapping_inputs(1, Some(&key(b"200")), Some(&key(b"250")))),
            vec![1, 2]
        );
        assert_eq!(
            numbers(v.get_overlapping_inputs(1, None, Some(&key(b"301")))),
            vec![1, 2]
        );
        assert_eq!(numbers(v.get_overlapping_inputs(1, None, None)), vec![1, 2, 3]);
        assert_eq!(
            numbers(v.get_overlapping_inputs(1, Some(&key(b"501")), None)),
            Vec::<u64>::new()
        );
    }

    #[test]
    fn test_get_overlapping_inputs_level0_restarts() {
        // F2 overlaps F1 and extends the range; F3 stays disjoint
        let v = test_version(vec![vec![
            new_file(1, b"b", b"d"),
            new_file(2, b"c", b"e"),
            new_file(3, b"g", b"h"),
        ]]);
        let key = |k: &[u8]| InternalKey::new(k, 100, ValueType::Value);
        let overlaps = v.get_overlapping_inputs(0, Some(&key(b"b")), Some(&key(b"d")));
        let numbers: Vec<u64> = overlaps.iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_get_overlapping_inputs_is_idempotent() {
        let v = test_version(vec![vec![
            new_file(1, b"b", b"d"),
            new_file(2, b"c", b"e"),
            new_file(3, b"g", b"h"),
        ]]);
        let first = v.get_overlapping_inputs(
            0,
            Some(&InternalKey::new(b"b", 100, ValueType::Value)),
            Some(&InternalKey::new(b"d", 100, ValueType::Value)),
        );
        let (smallest, largest) = (
            first
                .iter()
                .min_by(|a, b| a.smallest.user_key().cmp(b.smallest.user_key()))
                .unwrap()
                .smallest
                .clone(),
            first
                .iter()
                .max_by(|a, b| a.largest.user_key().cmp(b.largest.user_key()))
                .unwrap()
                .largest
                .clone(),
        );
        let second = v.get_overlapping_inputs(0, Some(&smallest), Some(&largest));
        let n1: Vec<u64> = first.iter().map(|f| f.number).collect();
        let n2: Vec<u64> = second.iter().map(|f| f.number).collect();
        assert_eq!(n1, n2);
    }

    #[test]
    fn test_overlap_in_level() {
        let v = test_version(vec![
            vec![new_file(1, b"a", b"c"), new_file(2, b"x", b"z")],
            vec![new_file(3, b"e", b"g")],
        ]);
        assert!(v.overlap_in_level(0, Some(b"b"), Some(b"b")));
        assert!(v.overlap_in_level(0, Some(b"d"), Some(b"y")));
        assert!(!v.overlap_in_level(0, Some(b"d"), Some(b"w")));
        assert!(v.overlap_in_level(1, Some(b"f"), Some(b"h")));
        assert!(!v.overlap_in_level(1, Some(b"h"), Some(b"j")));
        assert!(v.overlap_in_level(1, None, None));
    }

    #[test]
    fn test_finalize_prefers_fullest_level() {
        let mut v = test_version(vec![
            vec![new_file(1, b"a", b"b")],
            vec![],
            vec![],
        ]);
        v.finalize();
        // a single level-0 file with a trigger of 4 gives score 0.25
        assert_eq!(v.compaction_level, 0);
        assert!(v.compaction_score < 1.0);

        let mut l0 = vec![];
        for i in 0..4 {
            l0.push(new_file(i + 1, b"a", b"b"));
        }
        let mut v = test_version(vec![l0, vec![], vec![]]);
        v.finalize();
        assert_eq!(v.compaction_level, 0);
        assert!(v.compaction_score >= 1.0);
        assert!(v.needs_compaction());
    }

    #[test]
    fn test_record_read_sample() {
        // the key "b" is covered by the level-0 file and the level-1 file
        let v = test_version(vec![
            vec![new_file(1, b"a", b"c")],
            vec![new_file(2, b"b", b"d")],
        ]);
        v.files[0][0].allowed_seeks.store(1, Ordering::SeqCst);
        let sample_key = InternalKey::new(b"b", 100, ValueType::Value);

        // a key overlapping fewer than two files records nothing
        let single = InternalKey::new(b"z", 100, ValueType::Value);
        assert!(!v.record_read_sample(single.data()));

        // two overlapping files charge the newest one and trip its budget
        assert!(v.record_read_sample(sample_key.data()));
        let file_to_compact = v.file_to_compact.read().unwrap();
        assert_eq!(file_to_compact.as_ref().unwrap().number, 1);
        assert_eq!(v.file_to_compact_level.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_level_summary() {
        let v = test_version(vec![vec![new_file(1, b"a", b"b")], vec![], vec![]]);
        assert_eq!(v.level_summary(), "files[ 1 0 0 ]");
    }

    #[test]
    fn test_level_file_num_iterator() {
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let files = vec![new_file(1, b"a", b"c"), new_file(2, b"e", b"g")];
        let mut iter = LevelFileNumIterator::new(icmp, files);
        assert!(!iter.valid());
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(
            iter.key(),
            InternalKey::new(b"c", 100, ValueType::Value).data()
        );
        assert_eq!(decode_fixed_64(iter.value()), 1);
        assert_eq!(decode_fixed_64(&iter.value()[8..]), 10);
        iter.next();
        assert_eq!(decode_fixed_64(iter.value()), 2);
        iter.next();
        assert!(!iter.valid());

        iter.seek(InternalKey::new(b"d", 100, ValueType::Value).data());
        assert!(iter.valid());
        assert_eq!(decode_fixed_64(iter.value()), 2);
        iter.seek_to_last();
        assert_eq!(decode_fixed_64(iter.value()), 2);
        iter.prev();
        assert_eq!(decode_fixed_64(iter.value()), 1);
        iter.prev();
        assert!(!iter.valid());
    }
}
