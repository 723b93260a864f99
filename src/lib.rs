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

//! The version-management and compaction-planning core of an LSM-tree
//! storage engine.
//!
//! A [`version::Version`] is an immutable snapshot of the sorted table
//! files grouped into levels. The [`version::version_set::VersionSet`]
//! owns the current version, applies [`version::version_edit::VersionEdit`]
//! deltas atomically with crash-safe persistence through the MANIFEST
//! descriptor, recovers the last persisted state on startup, and plans
//! which files the next compaction should merge.
//!
//! Two level organizations are supported: the classic leveled layout with
//! one sorted run per level, and a sublevel-pool layout where each level
//! is split into an input pool and an output pool of sublevels so that a
//! single compaction rewrites a bounded amount of data.
//!
//! The on-disk table format, the memtable and the table cache are external
//! collaborators reached through the [`storage::Storage`] and
//! [`table_cache::TableCache`] traits.

#[macro_use]
extern crate log;

#[macro_use]
mod error;

pub mod compaction;
pub mod filename;
pub mod format;
pub mod iterator;
pub mod logger;
pub mod options;
pub mod record;
pub mod storage;
pub mod table_cache;
pub mod util;
pub mod version;

pub use error::{Error, Result};
pub use options::{Options, ReadOptions};
pub use util::comparator::{BytewiseComparator, Comparator};
pub use version::version_set::VersionSet;
