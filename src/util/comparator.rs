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

use std::cmp::{min, Ordering};

/// A `Comparator` object provides a total order across byte slices that are
/// used as keys in a table or a database. A `Comparator` implementation
/// must be thread-safe since we may invoke its methods concurrently
/// from multiple threads.
pub trait Comparator: Send + Sync + Clone + Default {
    /// Three-way comparison. Returns value:
    ///   `Ordering::Less`    iff `a` < `b`
    ///   `Ordering::Equal`   iff `a` = `b`
    ///   `Ordering::Greater` iff `a` > `b`
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// The name of the comparator. Used to check for comparator
    /// mismatches (i.e., a descriptor created with one comparator is
    /// accessed using a different comparator).
    ///
    /// The client should switch to a new name whenever the comparator
    /// implementation changes in a way that will cause the relative
    /// ordering of any two keys to change.
    fn name(&self) -> &str;

    /// Given feasible keys a, b for which `compare(a, b) == Less`, returns a
    /// feasible key k such that:
    ///
    /// 1. compare(a, k) <= 0, and
    /// 2. compare(k, b) < 0.
    ///
    /// Used to construct shorter index entries. A trivial implementation is
    /// returning `a`, but appending fewer bytes leads to smaller indexes.
    fn separator(&self, a: &[u8], b: &[u8]) -> Vec<u8>;

    /// Given a feasible key `s`, returns a feasible key k such that
    /// `compare(k, s) >= 0`.
    fn successor(&self, key: &[u8]) -> Vec<u8>;
}

/// A byte-wise comparator using lexicographic order
#[derive(Default, Clone, Copy)]
pub struct BytewiseComparator {}

impl Comparator for BytewiseComparator {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[inline]
    fn name(&self) -> &str {
        "stratadb.BytewiseComparator"
    }

    #[inline]
    fn separator(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let min_size = min(a.len(), b.len());
        let mut diff_index = 0;
        while diff_index < min_size && a[diff_index] == b[diff_index] {
            diff_index += 1;
        }
        if diff_index < min_size {
            let diff_byte = a[diff_index];
            if diff_byte < 0xff && diff_byte + 1 < b[diff_index] {
                let mut res = a[..=diff_index].to_vec();
                res[diff_index] += 1;
                return res;
            }
        }
        // One is a prefix of the other, or the bytes differ by exactly one:
        // a itself is the shortest separator.
        a.to_vec()
    }

    #[inline]
    fn successor(&self, key: &[u8]) -> Vec<u8> {
        // Find the first byte that can be incremented
        for (i, &byte) in key.iter().enumerate() {
            if byte != 0xff {
                let mut res = key[..=i].to_vec();
                res[i] += 1;
                return res;
            }
        }
        // key is a run of 0xff, leave it alone
        key.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_compare() {
        let c = BytewiseComparator::default();
        assert_eq!(c.compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(c.compare(b"abd", b"abc"), Ordering::Greater);
        assert_eq!(c.compare(b"abc", b"abc"), Ordering::Equal);
        assert_eq!(c.compare(b"ab", b"abc"), Ordering::Less);
    }

    #[test]
    fn test_bytewise_separator() {
        let tests: Vec<(&[u8], &[u8], &[u8])> = vec![
            (b"", b"1111", b""),
            (b"1111", b"", b"1111"),
            (b"1111", b"111", b"1111"),
            (b"123", b"1234", b"123"),
            (b"1234", b"1234", b"1234"),
            (b"1111", b"12345", b"1111"),
            (b"1111", b"13345", b"12"),
        ];
        let c = BytewiseComparator::default();
        for (a, b, expect) in tests {
            assert_eq!(c.separator(a, b), expect.to_vec());
        }
        // 0xff cannot be incremented
        assert_eq!(
            c.separator(&[48, 255], &[48, 49, 50, 51]),
            vec![48u8, 255]
        );
    }

    #[test]
    fn test_bytewise_successor() {
        let tests: Vec<(&[u8], &[u8])> = vec![
            (b"", b""),
            (b"111", b"2"),
            (b"222", b"3"),
        ];
        let c = BytewiseComparator::default();
        for (input, expect) in tests {
            assert_eq!(c.successor(input), expect.to_vec());
        }
        // leading 0xff bytes are preserved
        assert_eq!(c.successor(&[0xff, 0xff, 1]), vec![0xffu8, 0xff, 2]);
    }
}
