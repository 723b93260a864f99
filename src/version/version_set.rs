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

use crate::compaction::{get_range, get_range2, Compaction};
use crate::filename::{
    generate_filename, other_descriptor_slot, update_current, FileType, DESCRIPTOR_SLOTS,
};
use crate::format::{InternalKey, InternalKeyComparator};
use crate::iterator::{ConcatenateIterator, DerivedIterFactory, Iterator};
use crate::options::{Options, ReadOptions};
use crate::record::reader::Reader;
use crate::record::writer::Writer;
use crate::storage::{read_file_to_string, Storage};
use crate::table_cache::TableCache;
use crate::util::coding::decode_fixed_64;
use crate::util::collection::HashSet;
use crate::util::comparator::Comparator;
use crate::util::reporter::LogReporter;
use crate::version::sublevel::reorganize_sublevels;
use crate::version::version_edit::{FileMetaData, VersionEdit};
use crate::version::{total_file_size, LevelFileNumIterator, Version, FILE_META_LENGTH};
use crate::{Error, Result};
use std::cmp::Ordering as CmpOrdering;
use std::mem;
use std::path::MAIN_SEPARATOR;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct LevelDiff {
    // numbers of the files deleted at this level
    deleted_files: HashSet<u64>,
    // all the new added files at this level
    added_files: Vec<FileMetaData>,
    // numbers of the files truncated at the shared truncate key
    updated_files: HashSet<u64>,
}

/// A helper that folds a sequence of `VersionEdit`s into a base `Version`
/// to produce a new `Version`, without materializing the intermediate
/// states. Everything the builder accumulated but did not publish through
/// `save_to` is released when it is dropped.
pub struct VersionBuilder<'a, C: Comparator> {
    icmp: InternalKeyComparator<C>,
    enable_sublevel: bool,
    // file changes for every level
    levels: Vec<LevelDiff>,
    // compaction pointer overrides, applied in order
    compact_pointers: Vec<(usize, InternalKey)>,
    // the shared lower bound for updated files
    truncate_key: InternalKey,
    base: &'a Version<C>,
}

impl<'a, C: Comparator + 'static> VersionBuilder<'a, C> {
    pub fn new(icmp: InternalKeyComparator<C>, enable_sublevel: bool, base: &'a Version<C>) -> Self {
        let mut levels = Vec::with_capacity(base.files.len());
        for _ in 0..base.files.len() {
            levels.push(LevelDiff::default());
        }
        Self {
            icmp,
            enable_sublevel,
            levels,
            compact_pointers: vec![],
            truncate_key: InternalKey::default(),
            base,
        }
    }

    /// Fold the file changes of `edit` into the builder state. In the
    /// classic strategy the level vector grows to `max_level + 2` so that
    /// the level above the highest touched one always exists as the empty
    /// growth slot.
    pub fn apply(&mut self, edit: &mut VersionEdit) {
        let needed = if self.enable_sublevel {
            edit.max_level + 1
        } else {
            edit.max_level + 2
        };
        if self.levels.len() < needed {
            self.levels.resize_with(needed, LevelDiff::default);
        }
        if !self.enable_sublevel {
            for (level, key) in edit.file_delta.compaction_pointers.drain(..) {
                self.compact_pointers.push((level, key));
            }
        }
        // Delete files
        for (level, number) in edit.file_delta.deleted_files.iter() {
            self.levels[*level].deleted_files.insert(*number);
        }
        // Add new files
        for (level, f) in edit.file_delta.new_files.drain(..) {
            f.init_allowed_seeks();
            self.levels[level].deleted_files.remove(&f.number);
            self.levels[level].added_files.push(f);
        }
        // Update (truncate) files, sublevel strategy only
        if let Some(key) = edit.file_delta.truncate_key.take() {
            self.truncate_key = key;
        }
        for (level, number) in edit.file_delta.updated_files.iter() {
            debug_assert!(self.enable_sublevel);
            self.levels[*level].updated_files.insert(*number);
        }
    }

    /// Install the recorded compaction pointer overrides, growing the
    /// pointer vector to match the built levels. Classic strategy only;
    /// the sublevel strategy tracks no pointers.
    pub fn apply_pointers_to(&self, compact_pointer: &mut Vec<InternalKey>) {
        if self.enable_sublevel {
            return;
        }
        if compact_pointer.len() < self.levels.len() {
            compact_pointer.resize(self.levels.len(), InternalKey::default());
        }
        for (level, key) in self.compact_pointers.iter() {
            compact_pointer[*level] = key.clone();
        }
    }

    /// Merge the accumulated state with the base version into `v`
    pub fn save_to(mut self, v: &mut Version<C>) {
        if v.files.len() < self.levels.len() {
            v.files.resize_with(self.levels.len(), Vec::new);
        }
        for level in 0..self.levels.len() {
            // Merge the added files with the pre-existing files of the base
            // version in key order, dropping deleted ones
            let added = mem::take(&mut self.levels[level].added_files);
            let base_files = self.base.files.get(level).map_or(&[][..], |f| f.as_slice());
            let mut merged = Vec::with_capacity(base_files.len() + added.len());
            merged.extend(base_files.iter().cloned());
            merged.extend(added.into_iter().map(Arc::new));
            let icmp = self.icmp.clone();
            merged.sort_by(
                |a, b| match icmp.compare(a.smallest.data(), b.smallest.data()) {
                    CmpOrdering::Equal => a.number.cmp(&b.number),
                    o => o,
                },
            );
            for f in merged {
                self.maybe_add_file(v, level, f);
            }
            // Make sure there is no overlap in levels > 0
            debug_assert!(
                level == 0 || !Self::has_overlapping(&self.icmp, &v.files[level]),
                "[version set] overlapping ranges in level {}",
                level
            );
        }
        // The reserved growth slot at the top must stay empty
        assert!(
            self.enable_sublevel || v.files.last().map_or(true, |f| f.is_empty()),
            "[version set] the highest level must be empty"
        );
    }

    fn maybe_add_file(&self, v: &mut Version<C>, level: usize, f: Arc<FileMetaData>) {
        if self.levels[level].deleted_files.contains(&f.number) {
            // File is deleted: do nothing
        } else if self.levels[level].updated_files.contains(&f.number) {
            // File is truncated: emit fresh metadata whose range starts at
            // the shared truncate key
            debug_assert!(self.enable_sublevel);
            debug_assert!(
                self.icmp.compare(f.smallest.data(), self.truncate_key.data())
                    == CmpOrdering::Less
            );
            debug_assert!(
                self.icmp.compare(f.largest.data(), self.truncate_key.data())
                    != CmpOrdering::Less
            );
            let updated = FileMetaData {
                allowed_seeks: AtomicI64::new(f.allowed_seeks.load(Ordering::Acquire)),
                file_size: f.file_size,
                number: f.number,
                seq_off: f.seq_off,
                smallest: self.truncate_key.clone(),
                largest: f.largest.clone(),
            };
            v.files[level].push(Arc::new(updated));
        } else {
            if level > 0 {
                if let Some(last) = v.files[level].last() {
                    // Must not overlap
                    assert!(
                        self.icmp.compare(last.largest.data(), f.smallest.data())
                            == CmpOrdering::Less,
                        "[version set] file #{} overlaps its predecessor in level {}",
                        f.number,
                        level
                    );
                }
            }
            v.files[level].push(f);
        }
    }

    // Returns true if any two files in the given sorted run overlap.
    // Only meaningful for levels > 0.
    fn has_overlapping(icmp: &InternalKeyComparator<C>, files: &[Arc<FileMetaData>]) -> bool {
        files
            .windows(2)
            .any(|fs| icmp.compare(fs[0].largest.data(), fs[1].smallest.data()) != CmpOrdering::Less)
    }
}

// The scalar counters read out of one descriptor candidate
struct CandidateNumbers {
    next_file: u64,
    last_seq: u64,
    log_number: u64,
    prev_log_number: u64,
}

/// The `VersionSet` owns the current `Version`, the live versions still
/// pinned by readers, the file/sequence counters, the per-level compaction
/// pointers and the open descriptor writer. All mutations are expected to
/// be serialized by the caller; readers work on pinned `Version`s and are
/// never blocked by a mutation, including the descriptor append + sync of
/// `log_and_apply`.
pub struct VersionSet<S: Storage + Clone, C: Comparator> {
    /// Set of table files protected from deletion because they are part of
    /// an ongoing compaction
    pub pending_outputs: HashSet<u64>,

    db_path: String,
    storage: S,
    options: Arc<Options<C>>,
    icmp: InternalKeyComparator<C>,

    // the next available file number
    next_file_number: u64,
    last_sequence: u64,
    // file number of the .log file in use
    log_number: u64,
    // zero, or the number of the .log file being compacted away
    prev_log_number: u64,

    manifest_file_number: u64,
    manifest_writer: Option<Writer<S::F>>,

    // All living versions, the current one last. Old versions are retained
    // as long as a reader still holds them.
    versions: Vec<Arc<Version<C>>>,

    // Per-level bookmark for the round-robin file selection of the classic
    // strategy
    compact_pointer: Vec<InternalKey>,
}

impl<S: Storage + Clone, C: Comparator + 'static> VersionSet<S, C> {
    pub fn new(db_path: String, options: Arc<Options<C>>, storage: S) -> Self {
        let icmp = InternalKeyComparator::new(options.comparator.clone());
        // Create an empty version as the first current
        let first = Arc::new(Version::new(options.clone(), icmp.clone()));
        let compact_pointer = if options.enable_sublevel {
            vec![]
        } else {
            vec![InternalKey::default(); first.files.len()]
        };
        Self {
            pending_outputs: HashSet::default(),
            db_path,
            storage,
            options,
            icmp,
            next_file_number: 2,
            last_sequence: 0,
            log_number: 0,
            prev_log_number: 0,
            manifest_file_number: 1,
            manifest_writer: None,
            versions: vec![first],
            compact_pointer,
        }
    }

    /// Get the current newest version
    #[inline]
    pub fn current(&self) -> Arc<Version<C>> {
        self.versions.last().unwrap().clone()
    }

    /// Returns the count of files at the given level of the current version
    #[inline]
    pub fn num_level_files(&self, level: usize) -> usize {
        self.current().num_level_files(level)
    }

    /// Returns the total bytes at the given level of the current version
    #[inline]
    pub fn num_level_bytes(&self, level: usize) -> u64 {
        self.current().num_level_bytes(level)
    }

    /// Returns `prev_log_number`
    #[inline]
    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    /// Returns the file number of the .log file in use
    #[inline]
    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    /// Returns the next free file number without consuming it
    #[inline]
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    /// Allocate and return a new file number
    #[inline]
    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// Arrange to reuse `file_number` unless a newer file number has
    /// already been allocated.
    /// REQUIRES: `file_number` was returned by a call to `new_file_number`
    pub fn reuse_file_number(&mut self, file_number: u64) {
        if self.next_file_number == file_number + 1 {
            self.next_file_number = file_number;
        }
    }

    /// Returns the current descriptor file number
    #[inline]
    pub fn manifest_number(&self) -> u64 {
        self.manifest_file_number
    }

    /// Returns the last used sequence number
    #[inline]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Set the last used sequence number
    #[inline]
    pub fn set_last_sequence(&mut self, seq: u64) {
        assert!(
            seq >= self.last_sequence,
            "[version set] the sequence number must not go backwards, current {}, got {}",
            self.last_sequence,
            seq
        );
        self.last_sequence = seq
    }

    /// Forward `next_file_number` past the given number
    pub fn mark_file_number_used(&mut self, number: u64) {
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
    }

    /// Returns a summary of the per-level file counts of the current
    /// version
    #[inline]
    pub fn level_summary(&self) -> String {
        self.current().level_summary()
    }

    /// Apply `edit` to the current version to form a new version that is
    /// both persisted to the descriptor and installed as the new current
    /// version.
    ///
    /// Fields the caller left unset are filled from the current counters.
    /// The descriptor append and sync happen while readers keep using
    /// their pinned versions; on any error the new version and a
    /// half-created descriptor are discarded and nothing is installed.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        if let Some(target_log) = edit.log_number {
            assert!(
                target_log >= self.log_number && target_log < self.next_file_number,
                "[version set] applying a VersionEdit with an invalid log number {}, expected in [{}, {})",
                target_log,
                self.log_number,
                self.next_file_number
            );
        } else {
            edit.set_log_number(self.log_number);
        }
        if edit.prev_log_number.is_none() {
            edit.set_prev_log_number(self.prev_log_number);
        }
        edit.set_next_file(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let mut record = vec![];
        edit.encode_to(&mut record);

        let current = self.current();
        let mut v = Version::new(self.options.clone(), self.icmp.clone());
        {
            let mut builder =
                VersionBuilder::new(self.icmp.clone(), self.options.enable_sublevel, &current);
            builder.apply(edit);
            builder.apply_pointers_to(&mut self.compact_pointer);
            builder.save_to(&mut v);
        }
        if self.options.enable_sublevel {
            reorganize_sublevels(&self.options, &current, &mut v, edit);
        }
        v.finalize();
        debug!(
            "level changing summary: before {}, now {}",
            current.level_summary(),
            v.level_summary()
        );

        // Initialize a new descriptor file if necessary, with a snapshot
        // of the current state as its first record
        let mut new_manifest_file = String::new();
        if self.manifest_writer.is_none() {
            new_manifest_file =
                generate_filename(&self.db_path, FileType::Manifest, self.manifest_file_number);
            debug!("Create new manifest file #{}", self.manifest_file_number);
            let f = self.storage.create(&new_manifest_file)?;
            let mut writer = Writer::new(f);
            match self.write_snapshot(&mut writer) {
                Ok(()) => self.manifest_writer = Some(writer),
                Err(e) => {
                    self.storage.remove(&new_manifest_file)?;
                    return Err(e);
                }
            }
        }

        // The append + sync below is the only slow part of an edit.
        // Readers are never blocked by it: they keep resolving against
        // their pinned versions until the new one is installed.
        let mut status = {
            let writer = self.manifest_writer.as_mut().unwrap();
            writer.add_record(&record).and_then(|_| writer.sync())
        };

        // If we just created a new descriptor file, install it by pointing
        // CURRENT at it, or, in rotating mode, by removing the alternative
        // slot and any CURRENT file to speed up the next recovery.
        if status.is_ok() && !new_manifest_file.is_empty() {
            if !self.options.rotating_manifest {
                status = update_current(&self.storage, &self.db_path, self.manifest_file_number);
            } else {
                let stale = [
                    generate_filename(
                        &self.db_path,
                        FileType::Manifest,
                        other_descriptor_slot(self.manifest_file_number),
                    ),
                    generate_filename(&self.db_path, FileType::Current, 0),
                ];
                for name in stale.iter() {
                    if self.storage.exists(name) {
                        info!("Delete {}", name);
                        let _ = self.storage.remove(name);
                    }
                }
            }
        }

        match status {
            Ok(()) => {
                self.log_number = edit.log_number.unwrap();
                self.prev_log_number = edit.prev_log_number.unwrap();
                self.append_new_version(v);
                Ok(())
            }
            Err(e) => {
                warn!("MANIFEST write: {:?}", e);
                if !new_manifest_file.is_empty() {
                    self.manifest_writer = None;
                    let _ = self.storage.remove(&new_manifest_file);
                }
                Err(e)
            }
        }
    }

    /// Apply an externally produced edit to the current version without
    /// writing the descriptor. The edit's counters must not move
    /// backwards; a comparator mismatch is rejected.
    pub fn foreign_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        if let Some(name) = &edit.comparator_name {
            if name != self.icmp.user_comparator.name() {
                return Err(Error::InvalidArgument(format!(
                    "{} does not match existing comparator {}",
                    name,
                    self.icmp.user_comparator.name()
                )));
            }
        }
        let mut next_file_number = self.next_file_number;
        let mut last_sequence = self.last_sequence;
        let mut log_number = self.log_number;
        let mut prev_log_number = self.prev_log_number;
        if let Some(n) = edit.log_number {
            debug_assert!(log_number <= n);
            log_number = n;
        }
        if let Some(n) = edit.prev_log_number {
            debug_assert!(prev_log_number <= n);
            prev_log_number = n;
        }
        if let Some(n) = edit.next_file_number {
            debug_assert!(next_file_number <= n);
            next_file_number = n;
        }
        if let Some(n) = edit.last_sequence {
            debug_assert!(last_sequence <= n);
            last_sequence = n;
        }
        assert!(log_number < next_file_number);

        let current = self.current();
        let mut v = Version::new(self.options.clone(), self.icmp.clone());
        {
            let mut builder =
                VersionBuilder::new(self.icmp.clone(), self.options.enable_sublevel, &current);
            builder.apply(edit);
            builder.apply_pointers_to(&mut self.compact_pointer);
            builder.save_to(&mut v);
        }
        if self.options.enable_sublevel {
            reorganize_sublevels(&self.options, &current, &mut v, edit);
        }
        // No need to finalize the new version since we are not going to
        // run any compaction from here.
        self.append_new_version(v);
        self.log_number = log_number;
        self.prev_log_number = prev_log_number;
        self.next_file_number = next_file_number;
        self.last_sequence = last_sequence;
        Ok(())
    }

    /// Recover the last persisted state from the descriptor files.
    ///
    /// Up to three candidates are considered: the two rotating slots and
    /// the descriptor named by CURRENT. Every candidate that replays
    /// cleanly and carries the mandatory counters competes; the one with
    /// the (lexicographically) largest
    /// (last_sequence, next_file_number, log_number, prev_log_number)
    /// wins and its version is installed. Errors hit along the way do not
    /// abort the scan as long as another candidate succeeds.
    pub fn recover(&mut self) -> Result<()> {
        let env = self.storage.clone();
        let mut candidates: [Option<String>; 3] = [None, None, None];
        for (i, slot) in DESCRIPTOR_SLOTS.iter().enumerate() {
            let name = generate_filename(&self.db_path, FileType::Manifest, *slot);
            if env.exists(&name) {
                candidates[i] = Some(name);
            }
        }
        let mut first_error: Option<Error> = None;

        // Read CURRENT, which contains a pointer to a descriptor file
        let current_name = generate_filename(&self.db_path, FileType::Current, 0);
        if env.exists(&current_name) {
            match read_file_to_string(&env, &current_name) {
                Ok(content) => {
                    if content.is_empty() || !content.ends_with('\n') {
                        first_error = Some(Error::Corruption(
                            "CURRENT file does not end with newline".to_owned(),
                        ));
                    } else {
                        let mut name = self.db_path.clone();
                        name.push(MAIN_SEPARATOR);
                        name.push_str(content.trim_end_matches('\n'));
                        // Skip when CURRENT names one of the slots already
                        // under consideration
                        if candidates[..2].iter().all(|c| c.as_ref() != Some(&name)) {
                            candidates[2] = Some(name);
                        }
                    }
                }
                Err(e) => {
                    warn!("CURRENT read: {:?}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let base = self.current();
        let mut selected: Option<(usize, VersionBuilder<'_, C>, CandidateNumbers)> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            let name = match candidate {
                Some(n) => n,
                None => continue,
            };
            match self.read_descriptor(&env, name, &base) {
                Ok((builder, numbers)) => {
                    let better = match &selected {
                        None => true,
                        Some((_, _, best)) => {
                            (
                                numbers.last_seq,
                                numbers.next_file,
                                numbers.log_number,
                                numbers.prev_log_number,
                            ) > (
                                best.last_seq,
                                best.next_file,
                                best.log_number,
                                best.prev_log_number,
                            )
                        }
                    };
                    if better {
                        selected = Some((i, builder, numbers));
                    }
                }
                Err(e) => {
                    warn!("MANIFEST read {}: {:?}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match selected {
            None => Err(first_error.unwrap_or_else(|| {
                Error::Corruption(format!("{}: no valid descriptor available", self.db_path))
            })),
            Some((index, builder, numbers)) => {
                let mut v = Version::new(self.options.clone(), self.icmp.clone());
                builder.apply_pointers_to(&mut self.compact_pointer);
                builder.save_to(&mut v);
                v.finalize();
                self.append_new_version(v);
                if !self.options.rotating_manifest {
                    // Consume the persisted next file number for the fresh
                    // descriptor this run will write
                    self.manifest_file_number = numbers.next_file;
                    self.next_file_number = numbers.next_file + 1;
                } else {
                    // Reuse the slot the winner did not come from
                    self.next_file_number = numbers.next_file;
                    self.manifest_file_number = if index == 0 { 2 } else { 1 };
                }
                self.log_number = numbers.log_number;
                self.prev_log_number = numbers.prev_log_number;
                self.last_sequence = numbers.last_seq;
                self.mark_file_number_used(numbers.log_number);
                self.mark_file_number_used(numbers.prev_log_number);
                info!(
                    "Recovered from manifest candidate {}: {}",
                    index,
                    self.level_summary()
                );
                Ok(())
            }
        }
    }

    // Replay one descriptor file into a builder over `base`, validating
    // the comparator name and collecting the scalar counters.
    fn read_descriptor<'a>(
        &self,
        env: &S,
        name: &str,
        base: &'a Version<C>,
    ) -> Result<(VersionBuilder<'a, C>, CandidateNumbers)> {
        let file = env.open(name)?;
        let reporter = LogReporter::new();
        let mut reader = Reader::new(file, Some(Box::new(reporter.clone())), true);
        let mut builder =
            VersionBuilder::new(self.icmp.clone(), self.options.enable_sublevel, base);
        let mut next_file = None;
        let mut last_seq = None;
        let mut log_number = None;
        let mut prev_log_number = None;
        let mut buf = vec![];
        while reader.read_record(&mut buf) {
            reporter.result()?;
            let mut edit = VersionEdit::new();
            edit.decoded_from(&buf)?;
            if let Some(cmp_name) = &edit.comparator_name {
                if cmp_name != self.icmp.user_comparator.name() {
                    return Err(Error::InvalidArgument(format!(
                        "{} does not match existing comparator {}",
                        cmp_name,
                        self.icmp.user_comparator.name()
                    )));
                }
            }
            builder.apply(&mut edit);
            if let Some(n) = edit.next_file_number {
                next_file = Some(n);
            }
            if let Some(n) = edit.log_number {
                log_number = Some(n);
            }
            if let Some(n) = edit.prev_log_number {
                prev_log_number = Some(n);
            }
            if let Some(n) = edit.last_sequence {
                last_seq = Some(n);
            }
        }
        reporter.result()?;

        let next_file = next_file
            .ok_or_else(|| Error::Corruption("no meta-nextfile entry in descriptor".to_owned()))?;
        let log_number = log_number
            .ok_or_else(|| Error::Corruption("no meta-lognumber entry in descriptor".to_owned()))?;
        let last_seq = last_seq.ok_or_else(|| {
            Error::Corruption("no last-sequence-number entry in descriptor".to_owned())
        })?;
        Ok((
            builder,
            CandidateNumbers {
                next_file,
                last_seq,
                log_number,
                prev_log_number: prev_log_number.unwrap_or(0),
            },
        ))
    }

    /// Pick the level and inputs for a new compaction.
    /// Returns `None` when no compaction needs to be run. Size-triggered
    /// compactions are preferred over seek-triggered ones.
    pub fn pick_compaction(&mut self, allow_seek_compaction: bool) -> Option<Compaction<C>> {
        let current = self.current();
        let size_compaction = current.compaction_score >= 1.0;
        let file_to_compact = current.file_to_compact.read().unwrap().clone();

        let mut c = if size_compaction {
            let level = current.compaction_level;
            if self.options.enable_sublevel {
                debug_assert!(current.output_pool[level].1 > 0);
                let mut c = Compaction::new(self.options.clone(), level, &current);
                self.setup_sublevel_inputs(level, &mut c, &current);
                return Some(c);
            }
            assert!(
                level + 1 < current.files.len(),
                "[compaction] invalid size compaction level {}",
                level
            );
            let mut c = Compaction::new(self.options.clone(), level, &current);
            // Pick the first file that comes after compact_pointer[level]
            for f in current.files[level].iter() {
                if self.compact_pointer[level].is_empty()
                    || self
                        .icmp
                        .compare(f.largest.data(), self.compact_pointer[level].data())
                        == CmpOrdering::Greater
                {
                    c.inputs[0].push(f.clone());
                    break;
                }
            }
            if c.inputs[0].is_empty() {
                // Wrap-around to the beginning of the key space
                if let Some(f) = current.files[level].first() {
                    c.inputs[0].push(f.clone());
                }
            }
            c
        } else if let (true, Some(f)) = (
            // Seek-triggered compactions are a classic-strategy mechanism;
            // sublevel levels are always compacted pool-by-pool.
            allow_seek_compaction && !self.options.enable_sublevel,
            file_to_compact,
        ) {
            let level = current.file_to_compact_level.load(Ordering::Acquire);
            let mut c = Compaction::new(self.options.clone(), level, &current);
            c.inputs[0].push(f);
            c
        } else {
            return None;
        };

        // Files in level 0 may overlap each other, so pick up all the
        // overlapping ones
        if c.level == 0 {
            let (smallest, largest) = get_range(&self.icmp, &c.inputs[0]);
            // Note that the next call will discard the file we placed in
            // inputs[0] earlier and replace it with an overlapping set
            // which will include the picked file.
            c.inputs[0] = current.get_overlapping_inputs(0, Some(&smallest), Some(&largest));
            assert!(!c.inputs[0].is_empty());
        }
        self.setup_other_inputs(&mut c, &current);
        Some(c)
    }

    /// Return a compaction for the range `[begin, end]` in the specified
    /// level, or `None` when nothing in that level overlaps the range.
    /// Manual compactions are only supported by the classic strategy.
    pub fn compact_range(
        &mut self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Option<Compaction<C>> {
        if self.options.enable_sublevel {
            return None;
        }
        let current = self.current();
        let mut inputs = current.get_overlapping_inputs(level, begin, end);
        if inputs.is_empty() {
            return None;
        }
        // Avoid compacting too much in one shot in case the range is
        // large. But we cannot do this for level-0 since level-0 files can
        // overlap and we must not pick one file and drop another older
        // file if the two files overlap.
        if level > 0 {
            let limit = self.options.max_file_size_for_level(level);
            let mut total = 0;
            for (i, f) in inputs.iter().enumerate() {
                total += f.file_size;
                if total >= limit {
                    inputs.truncate(i + 1);
                    break;
                }
            }
        }
        let mut c = Compaction::new(self.options.clone(), level, &current);
        c.inputs[0] = inputs;
        self.setup_other_inputs(&mut c, &current);
        Some(c)
    }

    // Pick up the files to compact in `c.level + 1` and possibly grow the
    // `c.level` inputs without changing the `c.level + 1` set, then
    // compute the grandparent overlap and advance the round-robin
    // compaction pointer. The pointer moves immediately instead of waiting
    // for the edit to be applied, so that a failed compaction tries a
    // different key range next time.
    fn setup_other_inputs(&mut self, c: &mut Compaction<C>, current: &Arc<Version<C>>) {
        let level = c.level;
        let (smallest, largest) = get_range(&self.icmp, &c.inputs[0]);
        c.inputs[1] = current.get_overlapping_inputs(level + 1, Some(&smallest), Some(&largest));

        // The entire range covered by the compaction so far
        let (mut all_start, mut all_limit) =
            get_range2(&self.icmp, &c.inputs[0], &c.inputs[1]);

        let mut largest = largest;
        if !c.inputs[1].is_empty() {
            let expanded0 =
                current.get_overlapping_inputs(level, Some(&all_start), Some(&all_limit));
            let inputs0_size = total_file_size(&c.inputs[0]);
            let inputs1_size = total_file_size(&c.inputs[1]);
            let expanded0_size = total_file_size(&expanded0);
            if expanded0.len() > c.inputs[0].len()
                && inputs1_size + expanded0_size
                    < self.options.expanded_compaction_byte_size_limit()
            {
                let (new_start, new_limit) = get_range(&self.icmp, &expanded0);
                let expanded1 = current.get_overlapping_inputs(
                    level + 1,
                    Some(&new_start),
                    Some(&new_limit),
                );
                // Accept the expansion only if the next-level inputs did
                // not grow with it
                if expanded1.len() == c.inputs[1].len() {
                    info!(
                        "Expanding@{} {}+{} ({}+{} bytes) to {}+{} ({}+{} bytes)",
                        level,
                        c.inputs[0].len(),
                        c.inputs[1].len(),
                        inputs0_size,
                        inputs1_size,
                        expanded0.len(),
                        expanded1.len(),
                        expanded0_size,
                        inputs1_size,
                    );
                    largest = new_limit;
                    c.inputs[0] = expanded0;
                    c.inputs[1] = expanded1;
                    let r = get_range2(&self.icmp, &c.inputs[0], &c.inputs[1]);
                    all_start = r.0;
                    all_limit = r.1;
                }
            }
        }

        // Compute the set of grandparent files that overlap this
        // compaction (parent == level+1; grandparent == level+2)
        if level + 2 < current.files.len() {
            c.grandparents =
                current.get_overlapping_inputs(level + 2, Some(&all_start), Some(&all_limit));
        }

        self.compact_pointer[level] = largest.clone();
        c.edit.set_compact_pointer(level, largest);
    }

    // Collect the inputs of a sublevel compaction: anchored at the file
    // with the smallest lower bound across the output-pool sublevels of
    // `level`, the range is extended until no sublevel holds a file
    // straddling its right edge, and every sublevel contributes its files
    // within the final bounds.
    fn setup_sublevel_inputs(
        &self,
        level: usize,
        c: &mut Compaction<C>,
        current: &Arc<Version<C>>,
    ) {
        debug_assert!(self.options.enable_sublevel);
        let (pool_base, pool_len) = current.output_pool[level];
        assert!(
            pool_len > 0,
            "[compaction] level {} has an empty output pool",
            level
        );
        debug_assert_eq!(c.inputs.len(), pool_len);
        debug_assert_eq!(c.base_input_sublevel, Some(pool_base));
        debug_assert_eq!(c.output_sublevel, Some(current.input_pool[level + 1].0));

        // Pick the file with the smallest lower bound as the anchor
        let mut anchor: Option<(Arc<FileMetaData>, usize)> = None;
        for i in 0..pool_len {
            let row = pool_base + i;
            if let Some(f) = current.files[row].first() {
                let smaller = anchor.as_ref().map_or(true, |(a, _)| {
                    self.icmp.compare(f.smallest.data(), a.smallest.data()) == CmpOrdering::Less
                });
                if smaller {
                    anchor = Some((f.clone(), i));
                }
            }
        }
        let (anchor_file, anchor_sublevel) =
            anchor.expect("[compaction] no file in a non-empty output pool");
        let left_bound = anchor_file.smallest.clone();
        let mut right_bound = anchor_file.largest.clone();

        if level > 0 {
            // Extend the right bound until no sublevel has a file starting
            // at or below it
            let ucmp = &self.icmp.user_comparator;
            let mut next_visit = vec![0usize; pool_len];
            next_visit[anchor_sublevel] = 1;
            let mut has_changed = true;
            while has_changed {
                has_changed = false;
                for (i, cursor) in next_visit.iter_mut().enumerate() {
                    let files = &current.files[pool_base + i];
                    // Skip files that end inside the current range
                    while *cursor < files.len()
                        && ucmp.compare(
                            files[*cursor].largest.user_key(),
                            right_bound.user_key(),
                        ) != CmpOrdering::Greater
                    {
                        *cursor += 1;
                    }
                    if *cursor >= files.len() {
                        continue;
                    }
                    let f = &files[*cursor];
                    if ucmp.compare(f.smallest.user_key(), right_bound.user_key())
                        != CmpOrdering::Greater
                    {
                        right_bound = f.largest.clone();
                        has_changed = true;
                        *cursor += 1;
                    }
                }
            }
        }

        for i in 0..pool_len {
            let row = pool_base + i;
            c.inputs[i] =
                current.get_overlapping_inputs(row, Some(&left_bound), Some(&right_bound));
        }
    }

    /// Add all the live files of all versions to `pending_outputs` to
    /// protect them from deletion
    pub fn lock_live_files(&mut self) {
        for version in self.versions.iter() {
            for files in version.files.iter() {
                for f in files.iter() {
                    self.pending_outputs.insert(f.number);
                }
            }
        }
    }

    /// Returns the numbers of all files alive in some version
    pub fn live_files(&self) -> HashSet<u64> {
        let mut set = HashSet::default();
        for version in self.versions.iter() {
            for files in version.files.iter() {
                for f in files.iter() {
                    set.insert(f.number);
                }
            }
        }
        set
    }

    /// Return the maximum overlapping data (in bytes) in the next level
    /// for any file at a level >= 1. Classic strategy only.
    pub fn max_next_level_overlapping_bytes(&self) -> u64 {
        debug_assert!(!self.options.enable_sublevel);
        let mut result = 0;
        let current = self.current();
        for level in 1..current.files.len().saturating_sub(1) {
            for f in current.files[level].iter() {
                let overlaps =
                    current.get_overlapping_inputs(level + 1, Some(&f.smallest), Some(&f.largest));
                let sum = total_file_size(&overlaps);
                if sum > result {
                    result = sum;
                }
            }
        }
        result
    }

    /// Returns iterators over every table holding data of the current
    /// version: one per level-0 file, plus a lazily-opening concatenating
    /// iterator per non-empty higher row. Merging them is the caller's
    /// business.
    pub fn current_iterators<T>(
        &self,
        read_opt: ReadOptions,
        table_cache: &T,
    ) -> Result<Vec<Box<dyn Iterator>>>
    where
        T: TableCache + Clone + 'static,
        T::Iter: 'static,
    {
        let version = self.current();
        let mut iters: Vec<Box<dyn Iterator>> = vec![];
        // Merge all level zero files together since they may overlap
        for file in version.level_files(0) {
            iters.push(Box::new(table_cache.new_iterator(
                read_opt,
                file.number,
                file.file_size,
                file.seq_off,
            )?));
        }
        // For levels > 0 a concatenating iterator walks through the
        // non-overlapping files of the row, opening them lazily
        for files in version.files.iter().skip(1) {
            if !files.is_empty() {
                let index = LevelFileNumIterator::new(self.icmp.clone(), files.clone());
                let factory = FileIterFactory::new(read_opt, table_cache.clone());
                iters.push(Box::new(ConcatenateIterator::new(index, factory)));
            }
        }
        Ok(iters)
    }

    /// Returns iterators reading over all the compaction input tables.
    /// Level-0 inputs get one iterator per file since their ranges may
    /// overlap; other rows are read through concatenating iterators.
    pub fn make_input_iterators<T>(
        &self,
        c: &Compaction<C>,
        table_cache: &T,
    ) -> Result<Vec<Box<dyn Iterator>>>
    where
        T: TableCache + Clone + 'static,
        T::Iter: 'static,
    {
        let read_opt = ReadOptions {
            verify_checksums: self.options.paranoid_checks,
            fill_cache: false,
        };
        let base_level = c.base_input_sublevel.unwrap_or(c.level);
        let mut iters: Vec<Box<dyn Iterator>> = vec![];
        for (which, files) in c.inputs.iter().enumerate() {
            if files.is_empty() {
                continue;
            }
            if base_level + which == 0 {
                for file in files.iter() {
                    iters.push(Box::new(table_cache.new_iterator(
                        read_opt,
                        file.number,
                        file.file_size,
                        file.seq_off,
                    )?));
                }
            } else {
                let index = LevelFileNumIterator::new(self.icmp.clone(), files.clone());
                let factory = FileIterFactory::new(read_opt, table_cache.clone());
                iters.push(Box::new(ConcatenateIterator::new(index, factory)));
            }
        }
        Ok(iters)
    }

    // Install `v` as the new current version, dropping versions no reader
    // holds anymore
    fn append_new_version(&mut self, v: Version<C>) {
        self.versions.push(Arc::new(v));
        self.gc();
    }

    // Remove all the versions only the version set itself still holds,
    // except the current one
    fn gc(&mut self) {
        let last = self.versions.len() - 1;
        let mut i = 0;
        self.versions.retain(|v| {
            let keep = i == last || Arc::strong_count(v) > 1;
            i += 1;
            keep
        })
    }

    // Write a snapshot of the current state as one record: the comparator
    // name, every non-empty compaction pointer and every live file.
    fn write_snapshot(&self, writer: &mut Writer<S::F>) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.icmp.user_comparator.name().to_owned());
        for (level, key) in self.compact_pointer.iter().enumerate() {
            if !key.is_empty() {
                edit.set_compact_pointer(level, key.clone());
            }
        }
        let current = self.current();
        for (level, files) in current.files.iter().enumerate() {
            for f in files.iter() {
                edit.add_file(
                    level,
                    f.number,
                    f.file_size,
                    f.seq_off,
                    f.smallest.clone(),
                    f.largest.clone(),
                );
            }
        }
        let mut record = vec![];
        edit.encode_to(&mut record);
        writer.add_record(&record)
    }
}

/// Derives a table iterator from the 24-byte values yielded by a
/// `LevelFileNumIterator`
pub struct FileIterFactory<T: TableCache> {
    options: ReadOptions,
    table_cache: T,
}

impl<T: TableCache> FileIterFactory<T> {
    pub fn new(options: ReadOptions, table_cache: T) -> Self {
        Self {
            options,
            table_cache,
        }
    }
}

impl<T: TableCache> DerivedIterFactory for FileIterFactory<T> {
    type Iter = T::Iter;

    fn derive(&self, value: &[u8]) -> Result<Self::Iter> {
        if value.len() != FILE_META_LENGTH {
            Err(Error::Corruption(
                "file reader invoked with unexpected value".to_owned(),
            ))
        } else {
            let file_number = decode_fixed_64(value);
            let file_size = decode_fixed_64(&value[8..]);
            let seq_off = decode_fixed_64(&value[16..]);
            self.table_cache
                .new_iterator(self.options, file_number, file_size, seq_off)
        }
    }
}
