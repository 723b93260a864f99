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

use crate::error::Error;
use crate::Result;

/// An internal iterator yielding ordered key/value entries.
///
/// Before using an iterator the caller must position it with one of the
/// seek methods. `key` and `value` may only be called while `valid()`.
pub trait Iterator {
    fn valid(&self) -> bool;

    /// Position at the first entry. The iterator is `valid()` after this
    /// call iff the source is not empty.
    fn seek_to_first(&mut self);

    /// Position at the last entry.
    fn seek_to_last(&mut self);

    /// Position at the first entry with a key >= `target`.
    fn seek(&mut self, target: &[u8]);

    /// Move to the next entry.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not `valid()`.
    fn next(&mut self);

    /// Move to the previous entry.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not `valid()`.
    fn prev(&mut self);

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    /// Take the first error hit by the iterator, if any.
    fn status(&mut self) -> Result<()>;
}

/// A factory that derives a data iterator from the value yielded by an
/// index iterator.
pub trait DerivedIterFactory {
    type Iter: Iterator;

    fn derive(&self, value: &[u8]) -> Result<Self::Iter>;
}

/// An iterator that concatenates the entries produced by deriving a data
/// iterator from every entry of an index iterator, in index order. The
/// data iterators are opened lazily.
pub struct ConcatenateIterator<I: Iterator, F: DerivedIterFactory> {
    index: I,
    factory: F,
    data: Option<F::Iter>,
    err: Option<Error>,
}

impl<I: Iterator, F: DerivedIterFactory> ConcatenateIterator<I, F> {
    pub fn new(index: I, factory: F) -> Self {
        Self {
            index,
            factory,
            data: None,
            err: None,
        }
    }

    // Rebuild the data iterator from the current index entry
    fn init_data_iter(&mut self) {
        if self.index.valid() {
            match self.factory.derive(self.index.value()) {
                Ok(iter) => self.data = Some(iter),
                Err(e) => {
                    self.err = Some(e);
                    self.data = None;
                }
            }
        } else {
            self.data = None;
        }
    }

    // Move forward through index entries until the data iterator yields an
    // entry or the index is exhausted.
    fn skip_empty_data_iters_forward(&mut self) {
        while self.data.as_ref().map_or(true, |d| !d.valid()) {
            if !self.index.valid() {
                self.data = None;
                return;
            }
            self.index.next();
            self.init_data_iter();
            if let Some(d) = self.data.as_mut() {
                d.seek_to_first();
            }
        }
    }

    // The backward counterpart of `skip_empty_data_iters_forward`
    fn skip_empty_data_iters_backward(&mut self) {
        while self.data.as_ref().map_or(true, |d| !d.valid()) {
            if !self.index.valid() {
                self.data = None;
                return;
            }
            self.index.prev();
            self.init_data_iter();
            if let Some(d) = self.data.as_mut() {
                d.seek_to_last();
            }
        }
    }

    fn valid_or_panic(&self) {
        assert!(
            self.valid(),
            "[concatenate iterator] invalid usage: the iterator is exhausted"
        )
    }
}

impl<I: Iterator, F: DerivedIterFactory> Iterator for ConcatenateIterator<I, F> {
    fn valid(&self) -> bool {
        self.err.is_none() && self.data.as_ref().map_or(false, |d| d.valid())
    }

    fn seek_to_first(&mut self) {
        self.index.seek_to_first();
        self.init_data_iter();
        if let Some(d) = self.data.as_mut() {
            d.seek_to_first();
        }
        self.skip_empty_data_iters_forward();
    }

    fn seek_to_last(&mut self) {
        self.index.seek_to_last();
        self.init_data_iter();
        if let Some(d) = self.data.as_mut() {
            d.seek_to_last();
        }
        self.skip_empty_data_iters_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index.seek(target);
        self.init_data_iter();
        if let Some(d) = self.data.as_mut() {
            d.seek(target);
        }
        self.skip_empty_data_iters_forward();
    }

    fn next(&mut self) {
        self.valid_or_panic();
        if let Some(d) = self.data.as_mut() {
            d.next();
        }
        self.skip_empty_data_iters_forward();
    }

    fn prev(&mut self) {
        self.valid_or_panic();
        if let Some(d) = self.data.as_mut() {
            d.prev();
        }
        self.skip_empty_data_iters_backward();
    }

    fn key(&self) -> &[u8] {
        self.valid_or_panic();
        self.data.as_ref().unwrap().key()
    }

    fn value(&self) -> &[u8] {
        self.valid_or_panic();
        self.data.as_ref().unwrap().value()
    }

    fn status(&mut self) -> Result<()> {
        if let Some(e) = self.err.take() {
            return Err(e);
        }
        self.index.status()?;
        if let Some(d) = self.data.as_mut() {
            d.status()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A simple sorted key/value iterator over owned entries, used as a
    /// building block in tests across the crate.
    pub(crate) struct EntryIterator {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        index: usize,
    }

    impl EntryIterator {
        pub(crate) fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            let index = entries.len();
            Self { entries, index }
        }
    }

    impl Iterator for EntryIterator {
        fn valid(&self) -> bool {
            self.index < self.entries.len()
        }

        fn seek_to_first(&mut self) {
            self.index = 0;
        }

        fn seek_to_last(&mut self) {
            self.index = if self.entries.is_empty() {
                0
            } else {
                self.entries.len() - 1
            };
        }

        fn seek(&mut self, target: &[u8]) {
            self.index = self
                .entries
                .iter()
                .position(|(k, _)| k.as_slice() >= target)
                .unwrap_or(self.entries.len());
        }

        fn next(&mut self) {
            assert!(self.valid());
            self.index += 1;
        }

        fn prev(&mut self) {
            assert!(self.valid());
            if self.index == 0 {
                self.index = self.entries.len();
            } else {
                self.index -= 1;
            }
        }

        fn key(&self) -> &[u8] {
            &self.entries[self.index].0
        }

        fn value(&self) -> &[u8] {
            &self.entries[self.index].1
        }

        fn status(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct SplitFactory {
        // every index value selects one group of entries by position
        groups: Vec<Vec<(Vec<u8>, Vec<u8>)>>,
    }

    impl DerivedIterFactory for SplitFactory {
        type Iter = EntryIterator;

        fn derive(&self, value: &[u8]) -> Result<Self::Iter> {
            let at = value[0] as usize;
            Ok(EntryIterator::new(self.groups[at].clone()))
        }
    }

    fn make_concat() -> ConcatenateIterator<EntryIterator, SplitFactory> {
        let groups = vec![
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
            ],
            vec![], // empty groups must be skipped transparently
            vec![
                (b"c".to_vec(), b"3".to_vec()),
                (b"d".to_vec(), b"4".to_vec()),
            ],
        ];
        let index = EntryIterator::new(vec![
            (b"b".to_vec(), vec![0]),
            (b"b1".to_vec(), vec![1]),
            (b"d".to_vec(), vec![2]),
        ]);
        ConcatenateIterator::new(index, SplitFactory { groups })
    }

    #[test]
    fn test_concatenate_forward() {
        let mut iter = make_concat();
        assert!(!iter.valid());
        iter.seek_to_first();
        let mut collected = vec![];
        while iter.valid() {
            collected.push((iter.key().to_vec(), iter.value().to_vec()));
            iter.next();
        }
        assert_eq!(
            collected,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
                (b"d".to_vec(), b"4".to_vec()),
            ]
        );
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_concatenate_seek() {
        let mut iter = make_concat();
        iter.seek(b"b1");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"c");
        iter.seek(b"a");
        assert_eq!(iter.key(), b"a");
        iter.seek(b"z");
        assert!(!iter.valid());
    }

    #[test]
    fn test_concatenate_backward() {
        let mut iter = make_concat();
        iter.seek_to_last();
        let mut collected = vec![];
        while iter.valid() {
            collected.push(iter.key().to_vec());
            iter.prev();
        }
        assert_eq!(
            collected,
            vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
    }
}
