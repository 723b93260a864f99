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

use crate::options::Options;
use crate::util::comparator::Comparator;
use crate::version::version_edit::VersionEdit;
use crate::version::{total_file_size, Version};
use std::mem;

/// Restructure the sublevel pools of a freshly built version.
///
/// `v` holds the post-edit file rows, still laid out with the row structure
/// of `current`, the version the edit was applied to. The rules:
///
/// - Empty sublevels are removed, except the sole remaining sublevel of an
///   input pool always survives.
///
/// - If the output pool of level i emptied and the top sublevel of the
///   input pool of level i+1 is non-empty (or level i+1 does not exist
///   yet), one round of compaction of all sublevels of level i has
///   finished: a fresh empty sublevel is inserted at the top of level
///   i+1's input pool.
///
/// - If level i's input-pool bytes reach the level's byte budget while its
///   output pool is empty, the level is prepared for compaction: all input
///   sublevels except the top one move into the output pool. When only one
///   input sublevel exists it is duplicated first so that both pools stay
///   non-empty.
///
/// - If the highest level's output pool is non-empty, a new empty level is
///   appended after it to receive its compaction output.
pub(crate) fn reorganize_sublevels<C: Comparator + 'static>(
    options: &Options<C>,
    current: &Version<C>,
    v: &mut Version<C>,
    edit: &VersionEdit,
) {
    assert!(options.enable_sublevel);
    assert_eq!(current.input_pool.len(), current.output_pool.len());

    let files = mem::replace(&mut v.files, Vec::with_capacity(current.files.len() + 1));
    v.input_pool.clear();
    v.input_pool.reserve(current.input_pool.len() + 1);
    v.output_pool.clear();
    v.output_pool.reserve(current.output_pool.len() + 1);

    let mut new_input_sublevel = false;
    for level in 0..current.input_pool.len() {
        if level == 0 {
            v.files.push(files[0].clone());
            v.input_pool.push((0, 1));
            v.output_pool.push((0, 1));
            // A deletion at row 0 means the edit recorded a level-0
            // compaction, whose output lands in level 1's top input
            // sublevel.
            if edit.file_delta.deleted_files.iter().any(|(l, _)| *l == 0) {
                new_input_sublevel = true;
            }
            continue;
        }

        // Rebuild the input pool, dropping emptied sublevels. The top
        // sublevel survives even when empty so the pool never vanishes.
        let base_sublevel = v.files.len();
        let mut input_bytes = 0u64;
        let mut first = true;
        if new_input_sublevel {
            v.files.push(vec![]);
            first = false;
        }
        let (in_base, in_count) = current.input_pool[level];
        for row in in_base..in_base + in_count {
            if first || !files[row].is_empty() {
                input_bytes += total_file_size(&files[row]);
                v.files.push(files[row].clone());
            }
            first = false;
        }
        debug_assert!(!first);
        let input_len = v.files.len() - base_sublevel;
        debug_assert_eq!(v.input_pool.len(), level);
        v.input_pool.push((base_sublevel, input_len));

        new_input_sublevel = false;
        let base_sublevel = v.files.len();
        let (out_base, out_count) = current.output_pool[level];
        for row in out_base..out_base + out_count {
            if !files[row].is_empty() {
                v.files.push(files[row].clone());
            }
        }
        let output_len = v.files.len() - base_sublevel;
        if output_len == 0
            && level + 1 < current.input_pool.len()
            && current.input_pool[level + 1].1 > 0
        {
            new_input_sublevel = true;
        }
        debug_assert_eq!(v.output_pool.len(), level);
        if output_len == 0 && input_bytes as f64 >= options.max_bytes_for_level(level) - 1.0 {
            // The level is over budget with nothing being compacted out of
            // it yet: split the input pool so a compaction can start.
            if v.input_pool[level].1 == 1 {
                debug_assert_eq!(v.input_pool[level].0, v.files.len() - 1);
                let last = v.files.len() - 1;
                let dup = v.files[last].clone();
                v.files.push(dup);
                v.files[last].clear();
                v.input_pool[level].1 = 2;
            }
            let moved = v.input_pool[level].1 - 1;
            debug_assert!(moved > 0);
            v.input_pool[level].1 = 1;
            v.output_pool.push((v.input_pool[level].0 + 1, moved));
        } else {
            v.output_pool.push((base_sublevel, output_len));
        }

        #[cfg(debug_assertions)]
        {
            // A level whose score reaches 1 must always have something in
            // its output pool to compact.
            let (ib, ic) = v.input_pool[level];
            let (ob, oc) = v.output_pool[level];
            let mut total = 0u64;
            for row in ib..ib + ic {
                total += total_file_size(&v.files[row]);
            }
            for row in ob..ob + oc {
                total += total_file_size(&v.files[row]);
            }
            let score = total as f64 / options.max_bytes_for_level(level);
            debug_assert!(
                !(oc == 0 && score >= 1.0),
                "level {} exceeds its byte budget but has an empty output pool",
                level
            );
        }
    }

    assert_eq!(v.input_pool.len(), v.output_pool.len());
    // Make room for the compaction of the highest level
    if v.output_pool[v.output_pool.len() - 1].1 > 0 {
        v.files.push(vec![]);
        v.input_pool.push((v.files.len() - 1, 1));
        v.output_pool.push((v.files.len(), 0));
    }
    debug_assert_eq!(v.output_pool[v.output_pool.len() - 1].0, v.files.len());
    debug_assert_eq!(v.output_pool[v.output_pool.len() - 1].1, 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{InternalKey, InternalKeyComparator, ValueType};
    use crate::util::comparator::BytewiseComparator;
    use crate::version::version_edit::FileMetaData;
    use std::sync::Arc;

    fn sublevel_options() -> Arc<Options<BytewiseComparator>> {
        let mut opts = Options::default();
        opts.enable_sublevel = true;
        // level 1 byte budget = 4 * 1000
        opts.table_file_size = 1000;
        opts.l1_compaction_trigger = 4;
        opts.level_factor = 10;
        Arc::new(opts)
    }

    fn new_file(number: u64, smallest: &[u8], largest: &[u8], size: u64) -> Arc<FileMetaData> {
        let mut f = FileMetaData::default();
        f.number = number;
        f.file_size = size;
        f.smallest = InternalKey::new(smallest, 100, ValueType::Value);
        f.largest = InternalKey::new(largest, 100, ValueType::Value);
        Arc::new(f)
    }

    fn empty_version(opts: &Arc<Options<BytewiseComparator>>) -> Version<BytewiseComparator> {
        Version::new(
            opts.clone(),
            InternalKeyComparator::new(BytewiseComparator::default()),
        )
    }

    // A version shaped like `current` whose rows were rebuilt by a builder
    fn built_like(
        current: &Version<BytewiseComparator>,
        opts: &Arc<Options<BytewiseComparator>>,
    ) -> Version<BytewiseComparator> {
        let mut v = empty_version(opts);
        v.files = current.files.clone();
        v
    }

    #[test]
    fn test_initial_shape_is_preserved_without_changes() {
        let opts = sublevel_options();
        let current = empty_version(&opts);
        let mut v = built_like(&current, &opts);
        let edit = VersionEdit::new();
        reorganize_sublevels(&opts, &current, &mut v, &edit);
        assert_eq!(v.input_pool, vec![(0, 1), (1, 1)]);
        assert_eq!(v.output_pool, vec![(0, 1), (2, 0)]);
        assert_eq!(v.files.len(), 2);
    }

    #[test]
    fn test_level0_compaction_opens_new_input_sublevel() {
        let opts = sublevel_options();
        let mut current = empty_version(&opts);
        // level 1 currently holds one input sublevel with a file
        current.files = vec![vec![], vec![new_file(7, b"a", b"c", 100)]];

        // the edit deleted level-0 rows and added the merged output to row 1
        let mut edit = VersionEdit::new();
        edit.delete_file(0, 5);
        let mut v = built_like(&current, &opts);
        v.files[1].push(new_file(8, b"d", b"e", 100));

        reorganize_sublevels(&opts, &current, &mut v, &edit);
        // a fresh empty sublevel sits on top of level 1's input pool
        assert_eq!(v.input_pool, vec![(0, 1), (1, 2)]);
        assert_eq!(v.output_pool, vec![(0, 1), (3, 0)]);
        assert!(v.files[1].is_empty());
        assert_eq!(v.files[2].len(), 2);
    }

    #[test]
    fn test_empty_sublevels_are_dropped() {
        let opts = sublevel_options();
        let mut current = empty_version(&opts);
        // level 1: input pool rows 1..3 (top empty after compaction
        // progress), output pool row 3
        current.files = vec![
            vec![],
            vec![new_file(1, b"a", b"b", 100)],
            vec![],
            vec![new_file(2, b"c", b"d", 100)],
        ];
        current.input_pool = vec![(0, 1), (1, 2)];
        current.output_pool = vec![(0, 1), (3, 1)];

        let v_files = current.files.clone();
        let mut v = empty_version(&opts);
        v.files = v_files;
        let edit = VersionEdit::new();
        reorganize_sublevels(&opts, &current, &mut v, &edit);
        // row 2 was empty and dropped; the top row survives. Since the
        // highest level's output pool is non-empty, a fresh empty level is
        // appended after it.
        assert_eq!(v.input_pool, vec![(0, 1), (1, 1), (3, 1)]);
        assert_eq!(v.output_pool, vec![(0, 1), (2, 1), (4, 0)]);
        assert_eq!(v.files.len(), 4);
        assert_eq!(v.files[1][0].number, 1);
        assert_eq!(v.files[2][0].number, 2);
        assert!(v.files[3].is_empty());
    }

    #[test]
    fn test_over_budget_level_splits_into_output_pool() {
        let opts = sublevel_options();
        let mut current = empty_version(&opts);
        // level 1 has three input sublevels totalling 4000 bytes (== the
        // budget) and an empty output pool
        current.files = vec![
            vec![],
            vec![new_file(1, b"a", b"b", 1500)],
            vec![new_file(2, b"c", b"d", 1500)],
            vec![new_file(3, b"e", b"f", 1000)],
        ];
        current.input_pool = vec![(0, 1), (1, 3)];
        current.output_pool = vec![(0, 1), (4, 0)];

        let mut v = built_like(&current, &opts);
        let edit = VersionEdit::new();
        reorganize_sublevels(&opts, &current, &mut v, &edit);
        // all input sublevels but the top moved to the output pool
        assert_eq!(v.input_pool[1], (1, 1));
        assert_eq!(v.output_pool[1], (2, 2));
        assert_eq!(v.files[1][0].number, 1);
        assert_eq!(v.files[2][0].number, 2);
        assert_eq!(v.files[3][0].number, 3);
        // a non-empty output pool in the last level grows a fresh level
        assert_eq!(v.input_pool.len(), 3);
        assert_eq!(v.input_pool[2], (4, 1));
        assert_eq!(v.output_pool[2], (5, 0));
    }

    #[test]
    fn test_sole_input_sublevel_is_duplicated_on_split() {
        let opts = sublevel_options();
        let mut current = empty_version(&opts);
        current.files = vec![vec![], vec![new_file(1, b"a", b"z", 4000)]];

        let mut v = built_like(&current, &opts);
        let edit = VersionEdit::new();
        reorganize_sublevels(&opts, &current, &mut v, &edit);
        // the sole sublevel was duplicated: the top stays empty in the
        // input pool, the copy becomes the output pool
        assert_eq!(v.input_pool[1], (1, 1));
        assert_eq!(v.output_pool[1], (2, 1));
        assert!(v.files[1].is_empty());
        assert_eq!(v.files[2][0].number, 1);
        // and the next level was created to receive the compaction
        assert_eq!(v.input_pool.len(), 3);
        assert_eq!(v.input_pool[2], (3, 1));
        assert_eq!(v.output_pool[2], (4, 0));
    }

    #[test]
    fn test_emptied_output_pool_advances_next_level_round() {
        let opts = sublevel_options();
        let mut current = empty_version(&opts);
        // level 1's output pool row 2 was fully compacted into level 2's
        // top input sublevel (row 3)
        current.files = vec![
            vec![],
            vec![new_file(1, b"a", b"b", 100)],
            vec![new_file(2, b"c", b"d", 100)],
            vec![new_file(3, b"e", b"f", 100)],
        ];
        current.input_pool = vec![(0, 1), (1, 1), (3, 1)];
        current.output_pool = vec![(0, 1), (2, 1), (4, 0)];

        let mut v = built_like(&current, &opts);
        v.files[2] = vec![]; // the output sublevel emptied
        v.files[3].push(new_file(4, b"g", b"h", 100));
        let edit = VersionEdit::new();
        reorganize_sublevels(&opts, &current, &mut v, &edit);

        // level 1 keeps its input pool and an empty output pool; level 2
        // gained a fresh top input sublevel
        assert_eq!(v.input_pool, vec![(0, 1), (1, 1), (2, 2)]);
        assert_eq!(v.output_pool, vec![(0, 1), (2, 0), (4, 0)]);
        assert!(v.files[2].is_empty());
        assert_eq!(v.files[3].len(), 2);
    }
}
