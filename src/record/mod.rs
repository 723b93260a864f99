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

//! The record log format used by the MANIFEST: a sequence of 32KiB blocks,
//! each holding as many CRC-framed physical records as fit. Logical records
//! that do not fit a block are fragmented as First/Middle.../Last.

pub mod reader;
pub mod writer;

/// The max size of a log block
pub const BLOCK_SIZE: usize = 32768;

/// The format of a record header:
///
/// ```text
/// | ----- 4bytes ----- | -- 2bytes -- | - 1byte - |
///      CRC checksum         length     record type
/// ```
pub const HEADER_SIZE: usize = 7;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RecordType {
    /// Reserved for preallocated files
    Zero = 0,
    Full = 1,
    First = 2,
    Middle = 3,
    Last = 4,
}

impl From<usize> for RecordType {
    fn from(v: usize) -> Self {
        match v {
            0 => RecordType::Zero,
            1 => RecordType::Full,
            2 => RecordType::First,
            3 => RecordType::Middle,
            4 => RecordType::Last,
            _ => panic!("[record] invalid RecordType: {}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::record::reader::Reader;
    use crate::record::writer::Writer;
    use crate::record::BLOCK_SIZE;
    use crate::storage::mem::MemStorage;
    use crate::storage::Storage;
    use crate::util::reporter::LogReporter;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    // Construct a string of the specified length made out of the supplied
    // partial string.
    fn big_string(partial: &str, n: usize) -> String {
        let mut s = String::new();
        while s.len() < n {
            s.push_str(partial);
        }
        s.truncate(n);
        s
    }

    fn write_read_round_trip(records: &[Vec<u8>]) {
        let env = MemStorage::default();
        let file = env.create("rec").expect("create");
        let mut writer = Writer::new(file);
        for r in records {
            writer.add_record(r).expect("add_record");
        }
        writer.sync().expect("sync");

        let file = env.open("rec").expect("open");
        let reporter = LogReporter::new();
        let mut reader = Reader::new(file, Some(Box::new(reporter.clone())), true);
        let mut buf = vec![];
        for r in records {
            assert!(reader.read_record(&mut buf), "missing record");
            assert_eq!(&buf, r);
        }
        assert!(!reader.read_record(&mut buf));
        reporter.result().expect("no corruption");
    }

    #[test]
    fn test_empty_log() {
        let env = MemStorage::default();
        env.create("rec").expect("create");
        let file = env.open("rec").expect("open");
        let mut reader = Reader::new(file, None, true);
        let mut buf = vec![];
        assert!(!reader.read_record(&mut buf));
    }

    #[test]
    fn test_small_records() {
        write_read_round_trip(&[
            b"foo".to_vec(),
            b"bar".to_vec(),
            b"".to_vec(),
            b"xxxx".to_vec(),
        ]);
    }

    #[test]
    fn test_block_spanning_records() {
        write_read_round_trip(&[
            big_string("small", 10).into_bytes(),
            big_string("medium", 50000).into_bytes(),
            big_string("large", 100000).into_bytes(),
        ]);
    }

    #[test]
    fn test_record_exactly_at_block_boundary() {
        // n bytes such that the header plus data fills the block exactly
        let n = BLOCK_SIZE - super::HEADER_SIZE;
        write_read_round_trip(&[big_string("fill", n).into_bytes(), b"next".to_vec()]);
    }

    #[test]
    fn test_random_records() {
        let mut rng = StdRng::seed_from_u64(0xdeadbeef);
        let mut records = vec![];
        for i in 0..50 {
            let len = rng.gen_range(0, 1 << 15);
            records.push(big_string(&i.to_string(), len).into_bytes());
        }
        write_read_round_trip(&records);
    }

    #[test]
    fn test_corrupted_tail_is_reported() {
        let env = MemStorage::default();
        let file = env.create("rec").expect("create");
        let mut writer = Writer::new(file);
        writer.add_record(b"first").expect("add_record");
        writer.add_record(b"second").expect("add_record");
        writer.sync().expect("sync");

        // flip a byte inside the payload of the second record
        {
            use crate::storage::File;
            use std::io::SeekFrom;
            let mut f = env.open("rec").expect("open");
            let mut all = vec![];
            f.read_all(&mut all).expect("read_all");
            let last = all.len() - 1;
            all[last] ^= 0xff;
            let mut f = env.create("rec").expect("create");
            f.seek(SeekFrom::Start(0)).expect("seek");
            f.write(&all).expect("write");
        }

        let file = env.open("rec").expect("open");
        let reporter = LogReporter::new();
        let mut reader = Reader::new(file, Some(Box::new(reporter.clone())), true);
        let mut buf = vec![];
        assert!(reader.read_record(&mut buf));
        assert_eq!(&buf, b"first");
        assert!(!reader.read_record(&mut buf));
        assert!(reporter.result().is_err());
    }
}
