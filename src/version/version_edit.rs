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

use crate::format::InternalKey;
use crate::util::collection::HashSet;
use crate::util::varint::{VarintU32, VarintU64};
use crate::{Error, Result};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};

// Tags for the VersionEdit disk format.
// Tag 8 is no longer used.
enum Tag {
    Comparator = 1,
    LogNumber = 2,
    NextFileNumber = 3,
    LastSequence = 4,
    CompactPointer = 5,
    DeletedFile = 6,
    NewFile = 7,
    // 8 was used for large value refs
    PrevLogNumber = 9,
    // Sublevel strategy only
    UpdatedFile = 10,
    TruncateKey = 11,
    Unknown,
}

impl From<u32> for Tag {
    fn from(i: u32) -> Self {
        match i {
            1 => Tag::Comparator,
            2 => Tag::LogNumber,
            3 => Tag::NextFileNumber,
            4 => Tag::LastSequence,
            5 => Tag::CompactPointer,
            6 => Tag::DeletedFile,
            7 => Tag::NewFile,
            9 => Tag::PrevLogNumber,
            10 => Tag::UpdatedFile,
            11 => Tag::TruncateKey,
            _ => Tag::Unknown,
        }
    }
}

/// Metadata of a single immutable sorted table file.
#[derive(Debug)]
pub struct FileMetaData {
    // Seeks allowed until compaction.
    //
    // A seek into a level-n file can miss because the key range overlaps
    // files in level n+1, in which case we go on to seek level n+1 and the
    // IO spent on the first probe is wasted. A file collecting many wasted
    // seeks overlaps its next level heavily, which is exactly the signal
    // that compacting it is worth the IO.
    pub allowed_seeks: AtomicI64,
    /// File size in bytes
    pub file_size: u64,
    /// The file number, which is also the filename stem
    pub number: u64,
    /// The sequence offset assigned to the file when it was created
    pub seq_off: u64,
    /// Smallest internal key served by the table
    pub smallest: InternalKey,
    /// Largest internal key served by the table
    pub largest: InternalKey,
}

impl FileMetaData {
    /// Seed `allowed_seeks` from the file size. Let's assume:
    ///   (1) One seek costs 10ms
    ///   (2) Writing or reading 1MB costs 10ms (100MB/s)
    ///   (3) A compaction of 1MB does 25MB of IO:
    ///         1MB read from this level
    ///         10-12MB read from next level (boundaries may be misaligned)
    ///         10-12MB written to next level
    /// This implies that 25 seeks cost the same as the compaction of 1MB of
    /// data. I.e., one seek costs approximately the same as the compaction
    /// of 40KB of data. We are a little conservative and allow
    /// approximately one seek for every 16KB of data before triggering a
    /// compaction.
    #[inline]
    pub fn init_allowed_seeks(&self) {
        let mut allowed_seeks = (self.file_size / 16384) as i64;
        if allowed_seeks < 100 {
            allowed_seeks = 100; // the min seeks allowed
        }
        self.allowed_seeks.store(allowed_seeks, Ordering::Release);
    }
}

impl PartialEq for FileMetaData {
    fn eq(&self, other: &FileMetaData) -> bool {
        self.file_size == other.file_size
            && self.number == other.number
            && self.seq_off == other.seq_off
            && self.smallest == other.smallest
            && self.largest == other.largest
    }
}
impl Eq for FileMetaData {}

impl Default for FileMetaData {
    fn default() -> Self {
        FileMetaData {
            allowed_seeks: AtomicI64::new(0),
            file_size: 0,
            number: 0,
            seq_off: 0,
            smallest: InternalKey::default(),
            largest: InternalKey::default(),
        }
    }
}

/// The file changes between two versions
#[derive(Default, Debug, PartialEq)]
pub struct FileDelta {
    /// (level, InternalKey)
    pub compaction_pointers: Vec<(usize, InternalKey)>,
    /// (level, file_number)
    pub deleted_files: HashSet<(usize, u64)>,
    /// (level, FileMetaData)
    pub new_files: Vec<(usize, FileMetaData)>,
    /// (level, file_number), sublevel strategy only
    pub updated_files: HashSet<(usize, u64)>,
    /// The new lower key bound shared by all updated files,
    /// sublevel strategy only
    pub truncate_key: Option<InternalKey>,
}

/// A summary for version updating:
/// Version(old) + VersionEdit = Version(new)
#[derive(Default, PartialEq)]
pub struct VersionEdit {
    pub comparator_name: Option<String>,
    /// File number of the write-ahead log in use
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    /// The last used sequence number
    pub last_sequence: Option<u64>,

    /// The highest level any entry of this edit touches. Not encoded;
    /// maintained on both the build and the decode paths.
    pub max_level: usize,

    pub file_delta: FileDelta,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the edit to its initial state
    pub fn clear(&mut self) {
        self.comparator_name = None;
        self.log_number = None;
        self.prev_log_number = None;
        self.next_file_number = None;
        self.last_sequence = None;
        self.max_level = 0;
        self.file_delta.compaction_pointers.clear();
        self.file_delta.deleted_files.clear();
        self.file_delta.new_files.clear();
        self.file_delta.updated_files.clear();
        self.file_delta.truncate_key = None;
    }

    #[inline]
    fn touch_level(&mut self, level: usize) {
        if level > self.max_level {
            self.max_level = level;
        }
    }

    /// Add the specified file at the specified level
    pub fn add_file(
        &mut self,
        level: usize,
        file_number: u64,
        file_size: u64,
        seq_off: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.touch_level(level);
        self.file_delta.new_files.push((
            level,
            FileMetaData {
                allowed_seeks: AtomicI64::new(0),
                file_size,
                number: file_number,
                seq_off,
                smallest,
                largest,
            },
        ))
    }

    /// Delete the specified file from the specified level
    #[inline]
    pub fn delete_file(&mut self, level: usize, file_number: u64) {
        self.touch_level(level);
        self.file_delta.deleted_files.insert((level, file_number));
    }

    /// Mark the specified file as truncated at the shared truncate key
    #[inline]
    pub fn update_file(&mut self, level: usize, file_number: u64) {
        self.touch_level(level);
        self.file_delta.updated_files.insert((level, file_number));
    }

    #[inline]
    pub fn set_truncate_key(&mut self, key: InternalKey) {
        self.file_delta.truncate_key = Some(key);
    }

    #[inline]
    pub fn set_compact_pointer(&mut self, level: usize, key: InternalKey) {
        self.touch_level(level);
        self.file_delta.compaction_pointers.push((level, key));
    }

    #[inline]
    pub fn set_comparator_name(&mut self, name: String) {
        self.comparator_name = Some(name);
    }

    #[inline]
    pub fn set_log_number(&mut self, log_num: u64) {
        self.log_number = Some(log_num);
    }

    #[inline]
    pub fn set_prev_log_number(&mut self, num: u64) {
        self.prev_log_number = Some(num);
    }

    #[inline]
    pub fn set_next_file(&mut self, file_num: u64) {
        self.next_file_number = Some(file_num);
    }

    #[inline]
    pub fn set_last_sequence(&mut self, seq: u64) {
        self.last_sequence = Some(seq);
    }

    /// Convert into bytes and push into the given `dst`. Only fields that
    /// are explicitly set are encoded.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        if let Some(cmp_name) = &self.comparator_name {
            VarintU32::put_varint(dst, Tag::Comparator as u32);
            VarintU32::put_varint_prefixed_slice(dst, cmp_name.as_bytes());
        }
        if let Some(log_number) = self.log_number {
            VarintU32::put_varint(dst, Tag::LogNumber as u32);
            VarintU64::put_varint(dst, log_number);
        }
        if let Some(prev_log_number) = self.prev_log_number {
            VarintU32::put_varint(dst, Tag::PrevLogNumber as u32);
            VarintU64::put_varint(dst, prev_log_number);
        }
        if let Some(next_file_number) = self.next_file_number {
            VarintU32::put_varint(dst, Tag::NextFileNumber as u32);
            VarintU64::put_varint(dst, next_file_number);
        }
        if let Some(last_sequence) = self.last_sequence {
            VarintU32::put_varint(dst, Tag::LastSequence as u32);
            VarintU64::put_varint(dst, last_sequence);
        }
        for (level, key) in self.file_delta.compaction_pointers.iter() {
            VarintU32::put_varint(dst, Tag::CompactPointer as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU32::put_varint_prefixed_slice(dst, key.data());
        }
        for (level, file_number) in self.file_delta.deleted_files.iter() {
            VarintU32::put_varint(dst, Tag::DeletedFile as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU64::put_varint(dst, *file_number);
        }
        for (level, file_number) in self.file_delta.updated_files.iter() {
            VarintU32::put_varint(dst, Tag::UpdatedFile as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU64::put_varint(dst, *file_number);
        }
        if let Some(key) = &self.file_delta.truncate_key {
            VarintU32::put_varint(dst, Tag::TruncateKey as u32);
            VarintU32::put_varint_prefixed_slice(dst, key.data());
        }
        for (level, file_meta) in self.file_delta.new_files.iter() {
            VarintU32::put_varint(dst, Tag::NewFile as u32);
            VarintU32::put_varint(dst, *level as u32);
            VarintU64::put_varint(dst, file_meta.number);
            VarintU64::put_varint(dst, file_meta.file_size);
            VarintU64::put_varint(dst, file_meta.seq_off);
            VarintU32::put_varint_prefixed_slice(dst, file_meta.smallest.data());
            VarintU32::put_varint_prefixed_slice(dst, file_meta.largest.data());
        }
    }

    /// Re-initialize the edit by decoding the given bytes
    pub fn decoded_from(&mut self, src: &[u8]) -> Result<()> {
        self.clear();
        let mut msg = "";
        let mut s = src;
        while !s.is_empty() {
            if let Some(tag) = VarintU32::drain_read(&mut s) {
                match Tag::from(tag) {
                    Tag::Comparator => {
                        if let Some(cmp) = VarintU32::get_varint_prefixed_slice(&mut s) {
                            match String::from_utf8(cmp.to_owned()) {
                                Ok(name) => self.comparator_name = Some(name),
                                Err(e) => return Err(Error::UTF8Error(e)),
                            }
                        } else {
                            msg = "comparator name";
                            break;
                        }
                    }
                    Tag::LogNumber => {
                        if let Some(log_num) = VarintU64::drain_read(&mut s) {
                            self.log_number = Some(log_num);
                        } else {
                            msg = "log number";
                            break;
                        }
                    }
                    Tag::PrevLogNumber => {
                        if let Some(num) = VarintU64::drain_read(&mut s) {
                            self.prev_log_number = Some(num);
                        } else {
                            msg = "previous log number";
                            break;
                        }
                    }
                    Tag::NextFileNumber => {
                        if let Some(num) = VarintU64::drain_read(&mut s) {
                            self.next_file_number = Some(num);
                        } else {
                            msg = "next file number";
                            break;
                        }
                    }
                    Tag::LastSequence => {
                        if let Some(seq) = VarintU64::drain_read(&mut s) {
                            self.last_sequence = Some(seq);
                        } else {
                            msg = "last sequence number";
                            break;
                        }
                    }
                    Tag::CompactPointer => {
                        if let Some(level) = VarintU32::drain_read(&mut s) {
                            if let Some(key) = get_internal_key(&mut s) {
                                self.set_compact_pointer(level as usize, key);
                                continue;
                            }
                        }
                        msg = "compaction pointer";
                        break;
                    }
                    Tag::DeletedFile => {
                        if let Some(level) = VarintU32::drain_read(&mut s) {
                            if let Some(file_number) = VarintU64::drain_read(&mut s) {
                                self.delete_file(level as usize, file_number);
                                continue;
                            }
                        }
                        msg = "deleted file";
                        break;
                    }
                    Tag::UpdatedFile => {
                        if let Some(level) = VarintU32::drain_read(&mut s) {
                            if let Some(file_number) = VarintU64::drain_read(&mut s) {
                                self.update_file(level as usize, file_number);
                                continue;
                            }
                        }
                        msg = "updated file";
                        break;
                    }
                    Tag::TruncateKey => {
                        if let Some(key) = get_internal_key(&mut s) {
                            self.file_delta.truncate_key = Some(key);
                            continue;
                        }
                        msg = "truncate key";
                        break;
                    }
                    Tag::NewFile => {
                        if let Some(new_file) = decode_new_file(&mut s) {
                            let (level, f) = new_file;
                            self.touch_level(level);
                            self.file_delta.new_files.push((level, f));
                            continue;
                        }
                        msg = "new-file entry";
                        break;
                    }
                    Tag::Unknown => {
                        msg = "unknown tag";
                        break;
                    }
                }
            } else {
                msg = "invalid tag";
                break;
            }
        }
        if !msg.is_empty() {
            let mut m = "VersionEdit: ".to_owned();
            m.push_str(msg);
            return Err(Error::Corruption(m));
        }
        Ok(())
    }
}

impl Debug for VersionEdit {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "VersionEdit {{")?;
        if let Some(comparator) = &self.comparator_name {
            write!(f, "\n  Comparator: {}", comparator)?;
        }
        if let Some(log_number) = &self.log_number {
            write!(f, "\n  LogNumber: {}", log_number)?;
        }
        if let Some(prev_log_num) = &self.prev_log_number {
            write!(f, "\n  PrevLogNumber: {}", prev_log_num)?;
        }
        if let Some(next_file_num) = &self.next_file_number {
            write!(f, "\n  NextFile: {}", next_file_num)?;
        }
        if let Some(last_seq) = &self.last_sequence {
            write!(f, "\n  LastSeq: {}", last_seq)?;
        }
        for (level, key) in self.file_delta.compaction_pointers.iter() {
            write!(f, "\n  CompactPointer: @{} {:?}", level, key)?;
        }
        for (level, file_num) in self.file_delta.deleted_files.iter() {
            write!(f, "\n  DeleteFile: @{} #{}", level, file_num)?;
        }
        for (level, file_num) in self.file_delta.updated_files.iter() {
            write!(f, "\n  UpdateFile: @{} #{}", level, file_num)?;
        }
        if let Some(key) = &self.file_delta.truncate_key {
            write!(f, "\n  TruncateKey: {:?}", key)?;
        }
        for (level, meta) in self.file_delta.new_files.iter() {
            write!(
                f,
                "\n  AddFile: @{} #{} {}bytes +{}seq range: [{:?}, {:?}]",
                level, meta.number, meta.file_size, meta.seq_off, meta.smallest, meta.largest
            )?;
        }
        write!(f, "\n}}\n")?;
        Ok(())
    }
}

fn get_internal_key(src: &mut &[u8]) -> Option<InternalKey> {
    VarintU32::get_varint_prefixed_slice(src).map(InternalKey::decoded_from)
}

fn decode_new_file(src: &mut &[u8]) -> Option<(usize, FileMetaData)> {
    let level = VarintU32::drain_read(src)?;
    let number = VarintU64::drain_read(src)?;
    let file_size = VarintU64::drain_read(src)?;
    let seq_off = VarintU64::drain_read(src)?;
    let smallest = get_internal_key(src)?;
    let largest = get_internal_key(src)?;
    Some((
        level as usize,
        FileMetaData {
            allowed_seeks: AtomicI64::new(0),
            file_size,
            number,
            seq_off,
            smallest,
            largest,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ValueType;

    fn assert_encode_decode(edit: &VersionEdit) {
        let mut encoded = vec![];
        edit.encode_to(&mut encoded);
        let mut parsed = VersionEdit::new();
        parsed.decoded_from(&encoded).expect("decode should work");
        assert_eq!(edit, &parsed);
        let mut encoded2 = vec![];
        parsed.encode_to(&mut encoded2);
        assert_eq!(encoded, encoded2)
    }

    #[test]
    fn test_encode_decode() {
        let k_big = 1u64 << 50;
        let mut edit = VersionEdit::new();
        for i in 0..4 {
            assert_encode_decode(&edit);
            edit.add_file(
                3,
                k_big + 300 + i,
                k_big + 400 + i,
                k_big + 800 + i,
                InternalKey::new(b"foo", k_big + 500 + i, ValueType::Value),
                InternalKey::new(b"zoo", k_big + 700 + i, ValueType::Deletion),
            );
            edit.delete_file(4, k_big + 700 + i);
            edit.set_compact_pointer(
                i as usize,
                InternalKey::new(b"x", k_big + 900 + i, ValueType::Value),
            );
        }
        edit.set_comparator_name("foo".to_owned());
        edit.set_log_number(k_big + 100);
        edit.set_next_file(k_big + 200);
        edit.set_last_sequence(k_big + 1000);
        assert_encode_decode(&edit);
    }

    #[test]
    fn test_encode_decode_updated_files() {
        let mut edit = VersionEdit::new();
        edit.update_file(2, 7);
        edit.update_file(3, 9);
        edit.set_truncate_key(InternalKey::new(b"mid", 42, ValueType::Value));
        edit.delete_file(2, 5);
        assert_encode_decode(&edit);
        assert_eq!(edit.max_level, 3);
    }

    #[test]
    fn test_decode_unknown_tag() {
        let mut encoded = vec![];
        VarintU32::put_varint(&mut encoded, 12);
        let mut edit = VersionEdit::new();
        match edit.decoded_from(&encoded) {
            Err(Error::Corruption(msg)) => assert!(msg.contains("unknown tag")),
            other => panic!("expect a corruption error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated_new_file() {
        let mut encoded = vec![];
        VarintU32::put_varint(&mut encoded, Tag::NewFile as u32);
        VarintU32::put_varint(&mut encoded, 1); // level
        VarintU64::put_varint(&mut encoded, 9); // number only
        let mut edit = VersionEdit::new();
        assert!(edit.decoded_from(&encoded).is_err());
    }

    #[test]
    fn test_max_level_tracks_all_entry_kinds(){
        let mut edit = VersionEdit::new();
        assert_eq!(edit.max_level, 0);
        edit.delete_file(1, 1);
        assert_eq!(edit.max_level, 1);
        edit.set_compact_pointer(4, InternalKey::new(b"k", 1, ValueType::Value));
        assert_eq!(edit.max_level, 4);
        edit.add_file(
            2,
            10,
            100,
            0,
            InternalKey::new(b"a", 1, ValueType::Value),
            InternalKey::new(b"b", 1, ValueType::Value),
        );
        assert_eq!(edit.max_level, 4);
        edit.update_file(6, 10);
        assert_eq!(edit.max_level, 6);
        edit.clear();
        assert_eq!(edit.max_level, 0);
    }

    #[test]
    fn test_set_comparator_name() {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(String::from("Hello"));
        assert_eq!("Hello", edit.comparator_name.as_ref().unwrap());
    }

    #[test]
    fn test_set_scalar_fields() {
        let mut edit = VersionEdit::new();
        edit.set_log_number(1);
        edit.set_prev_log_number(2);
        edit.set_next_file(u64::max_value());
        edit.set_last_sequence(1 << 56);
        assert_eq!(edit.log_number.unwrap(), 1);
        assert_eq!(edit.prev_log_number.unwrap(), 2);
        assert_eq!(edit.next_file_number.unwrap(), u64::max_value());
        assert_eq!(edit.last_sequence.unwrap(), 1 << 56);
    }
}
