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

use crate::record::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::storage::File;
use crate::util::coding::decode_fixed_32;
use crate::util::crc32::{hash, unmask};

#[derive(Debug)]
enum ReaderError {
    // * An internal read error occurred
    // * We reached the end of the log
    Eof,
    // We found an invalid physical record:
    // * The record has an invalid CRC
    // * The record is a 0-length record
    // * The record length overflows the remaining block
    BadRecord,
}

/// Notified when the log reader encounters corruption.
pub trait Reporter {
    /// Some corruption was detected. `bytes` is the approximate number of
    /// bytes dropped due to the corruption.
    fn corruption(&mut self, bytes: u64, reason: &str);
}

/// A `Reader` scans records from a log file, verifying CRCs and
/// reassembling fragmented logical records.
pub struct Reader<F: File> {
    file: F,
    reporter: Option<Box<dyn Reporter>>,
    // Whether to verify the record checksum
    checksum: bool,
    // The last file read yielded fewer than BLOCK_SIZE bytes
    eof: bool,
    // Cache of the block being consumed
    buf: Vec<u8>,
    // Read position within `buf`
    pos: usize,
}

impl<F: File> Reader<F> {
    pub fn new(file: F, reporter: Option<Box<dyn Reporter>>, checksum: bool) -> Self {
        Reader {
            file,
            reporter,
            checksum,
            eof: false,
            buf: vec![],
            pos: 0,
        }
    }

    /// Surrenders ownership of the underlying file
    #[inline]
    pub fn into_file(self) -> F {
        self.file
    }

    /// Reads the next complete logical record into `buf`.
    /// Returns true on success, false when the end of the input is hit.
    pub fn read_record(&mut self, buf: &mut Vec<u8>) -> bool {
        // Whether we are in the middle of a fragmented logical record
        let mut in_fragmented_record = false;
        buf.clear();
        loop {
            match self.read_physical_record() {
                Ok((record_type, mut data)) => match record_type {
                    RecordType::Full => {
                        if in_fragmented_record {
                            self.report_drop(
                                buf.len() as u64,
                                "partial record without end(1)",
                            );
                            buf.clear();
                        }
                        buf.append(&mut data);
                        return true;
                    }
                    RecordType::First => {
                        if in_fragmented_record {
                            self.report_drop(
                                buf.len() as u64,
                                "partial record without end(2)",
                            );
                        }
                        buf.clear();
                        buf.append(&mut data);
                        in_fragmented_record = true;
                    }
                    RecordType::Middle => {
                        if !in_fragmented_record {
                            self.report_drop(
                                data.len() as u64,
                                "missing start of fragmented record(1)",
                            );
                        } else {
                            buf.append(&mut data);
                        }
                    }
                    RecordType::Last => {
                        if !in_fragmented_record {
                            self.report_drop(
                                data.len() as u64,
                                "missing start of fragmented record(2)",
                            );
                        } else {
                            buf.append(&mut data);
                            return true;
                        }
                    }
                    RecordType::Zero => {
                        // Zero type records come from preallocated space and
                        // are never returned to the caller.
                    }
                },
                Err(ReaderError::Eof) => {
                    if in_fragmented_record {
                        // This can be caused by the writer dying immediately
                        // after writing a physical record but before
                        // completing the next one; don't treat it as a
                        // corruption, just ignore the entire logical record.
                        buf.clear();
                    }
                    return false;
                }
                Err(ReaderError::BadRecord) => {
                    if in_fragmented_record {
                        self.report_drop(buf.len() as u64, "error in middle of record");
                        in_fragmented_record = false;
                        buf.clear();
                    }
                }
            }
        }
    }

    fn read_physical_record(&mut self) -> Result<(RecordType, Vec<u8>), ReaderError> {
        loop {
            // We've consumed the current block up to a point where no valid
            // header can remain.
            if self.buf.len() - self.pos < HEADER_SIZE {
                if self.eof {
                    // A truncated header at the end of the file can be caused
                    // by the writer crashing in the middle of writing the
                    // header. Instead of considering this an error, just
                    // report EOF.
                    return Err(ReaderError::Eof);
                }
                // Read the next block
                self.buf.resize(BLOCK_SIZE, 0);
                self.pos = 0;
                match self.file.read(&mut self.buf) {
                    Ok(read) => {
                        self.buf.truncate(read);
                        if read < BLOCK_SIZE {
                            self.eof = true;
                        }
                    }
                    Err(e) => {
                        self.buf.clear();
                        self.report_drop(BLOCK_SIZE as u64, &e.to_string());
                        self.eof = true;
                        return Err(ReaderError::Eof);
                    }
                }
                continue;
            }
            // Parse the header
            let header = &self.buf[self.pos..self.pos + HEADER_SIZE];
            let record_type = header[6];
            let data_length = (header[4] as usize) | ((header[5] as usize) << 8);
            let record_length = HEADER_SIZE + data_length;
            // A physical record never spans blocks
            if record_length > self.buf.len() - self.pos {
                let drop_size = self.buf.len() - self.pos;
                self.pos = self.buf.len();
                if !self.eof {
                    self.report_drop(drop_size as u64, "bad record length");
                    return Err(ReaderError::BadRecord);
                }
                // If the end of the file has been reached without reading
                // `data_length` bytes of payload, assume the writer died in
                // the middle of writing the record. Don't report a
                // corruption.
                return Err(ReaderError::Eof);
            }

            if record_type == 0 && data_length == 0 {
                // Skip zero-length records without reporting; such records
                // are produced by preallocated files.
                self.pos += record_length;
                return Err(ReaderError::BadRecord);
            }

            if self.checksum {
                let expected = unmask(decode_fixed_32(header));
                // The crc covers the record type byte and the payload
                let actual =
                    hash(&self.buf[self.pos + HEADER_SIZE - 1..self.pos + record_length]);
                if expected != actual {
                    let drop_size = self.buf.len() - self.pos;
                    self.pos = self.buf.len();
                    self.report_drop(drop_size as u64, "checksum mismatch");
                    return Err(ReaderError::BadRecord);
                }
            }

            let data = self.buf[self.pos + HEADER_SIZE..self.pos + record_length].to_vec();
            self.pos += record_length;
            return Ok((RecordType::from(record_type as usize), data));
        }
    }

    // Report record dropping to the `reporter`
    fn report_drop(&mut self, bytes: u64, reason: &str) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.corruption(bytes, reason);
        }
    }
}
