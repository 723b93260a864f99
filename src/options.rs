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

use crate::logger::Logger;
use crate::storage::Storage;
use crate::util::comparator::Comparator;
use log::LevelFilter;

/// Maximum level to which a new flushed table is pushed if it does not
/// create overlap. We try to push to level 2 to avoid the relatively
/// expensive level 0 => 1 compactions and to avoid some expensive
/// descriptor file operations. We do not push all the way to the largest
/// level since that can generate a lot of wasted disk space if the same
/// key space is being repeatedly overwritten.
pub const MAX_MEM_COMPACT_LEVEL: usize = 2;

/// Options controlling the behavior of the version set and the compaction
/// planner.
#[derive(Clone)]
pub struct Options<C: Comparator> {
    /// Comparator used to define the order of user keys.
    ///
    /// REQUIRES: The client must ensure that the comparator supplied here
    /// has the same name and orders keys *exactly* the same as the
    /// comparator used by previous opens of the same database.
    pub comparator: C,

    /// If true, the implementation will do aggressive checking of the data
    /// it is processing. Propagated to the read options handed to the
    /// table layer.
    pub paranoid_checks: bool,

    /// Organize each level as a pair of sublevel pools instead of a single
    /// sorted run. Levels are compacted from their output pool into the
    /// next level's input pool, which bounds the amount of data a single
    /// compaction rewrites.
    pub enable_sublevel: bool,

    /// Cycle the descriptor between two well-known file names instead of
    /// tracking the active one through a CURRENT file. Recovery reads both
    /// slots and picks the one that is further ahead.
    pub rotating_manifest: bool,

    /// Cut compaction output files early when they overlap too many bytes
    /// in the grandparent level.
    pub enable_should_stop_before: bool,

    /// The fan-out between adjacent levels: level n+1 holds `level_factor`
    /// times the bytes of level n.
    pub level_factor: u64,

    /// The target size of a single table file in bytes.
    pub table_file_size: u64,

    /// The number of level-0 files necessary to trigger an L0 compaction.
    pub l0_compaction_trigger: usize,

    /// The number of table files L1 may hold before a compaction of L1 is
    /// triggered. Byte budgets of higher levels are derived from this and
    /// `level_factor`.
    pub l1_compaction_trigger: u64,

    /// The underlying logger. If `None`, a terminal logger is used in dev
    /// mode and a storage-backed `LOG` file in release mode.
    pub logger: Option<slog::Logger>,

    /// The maximum log level
    pub logger_level: LevelFilter,
}

impl<C: Comparator> Options<C> {
    /// Maximum bytes a level may hold before it is scheduled for
    /// compaction. The result for level zero is not really used since the
    /// level-0 trigger is based on the file count.
    pub(crate) fn max_bytes_for_level(&self, level: usize) -> f64 {
        let mut result = (self.l1_compaction_trigger * self.table_file_size) as f64;
        let mut level = level;
        while level > 1 {
            result *= self.level_factor as f64;
            level -= 1;
        }
        result
    }

    /// Maximum bytes of overlap in the grandparent level (i.e., level+2)
    /// before we stop building a single output file in a level ->
    /// level+1 compaction.
    pub(crate) fn max_grandparent_overlap_bytes(&self) -> u64 {
        self.level_factor * self.table_file_size
    }

    /// Maximum number of bytes in all compacted files. We avoid expanding
    /// the lower level file set of a compaction if it would make the total
    /// compaction cover more than this many bytes.
    pub(crate) fn expanded_compaction_byte_size_limit(&self) -> u64 {
        (2 * (self.level_factor + 2) + 1) * self.table_file_size
    }

    /// Maximum size for a file placed at the given level.
    // TODO(opt): vary the size per level to reduce the number of files?
    pub(crate) fn max_file_size_for_level(&self, _level: usize) -> u64 {
        self.table_file_size
    }

    /// Install a global logger backend built from `self.logger`, or from a
    /// default drain when none was supplied.
    pub fn initialize_logger<S: Storage>(&mut self, db_path: &str, storage: &S) {
        let user_logger = self.logger.take();
        let logger = Logger::new(user_logger, self.logger_level, storage, db_path);
        let static_logger: &'static dyn log::Log = Box::leak(Box::new(logger));
        // the global logger can be set only once
        let _ = log::set_logger(static_logger);
        log::set_max_level(self.logger_level);
        info!("Logger initialized: [level {:?}]", &self.logger_level);
    }
}

impl<C: Comparator> Default for Options<C> {
    fn default() -> Self {
        Options {
            comparator: C::default(),
            paranoid_checks: false,
            enable_sublevel: false,
            rotating_manifest: false,
            enable_should_stop_before: true,
            level_factor: 10,
            table_file_size: 2 * 1024 * 1024,
            l0_compaction_trigger: 4,
            l1_compaction_trigger: 5,
            logger: None,
            logger_level: LevelFilter::Warn,
        }
    }
}

/// Options that control read operations
#[derive(Clone, Copy)]
pub struct ReadOptions {
    /// If true, all data read from underlying storage will be verified
    /// against corresponding checksums.
    pub verify_checksums: bool,

    /// Should the data read for this operation be cached in memory?
    /// Callers may wish to set this field to false for bulk scans.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}
