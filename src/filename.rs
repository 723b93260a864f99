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

use crate::storage::{do_write_string_to_file, Storage};
use crate::Result;
use std::ffi::OsStr;
use std::path::Path;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FileType {
    /// `*.log` files hold the recent write-ahead data.
    Log,
    /// `LOCK` file. Only one process may hold the database lock.
    Lock,
    /// `*.sst` table file.
    Table,
    /// `MANIFEST-*` descriptor file recording VersionEdits.
    Manifest,
    /// `CURRENT` file naming the active descriptor (non-rotating mode only).
    Current,
    /// `*.dbtmp` temporary file.
    Temp,
    /// `LOG` file recording runtime logs.
    InfoLog,
    /// `LOG.old` file recording the previous runtime logs.
    OldInfoLog,
}

/// In rotating-descriptor mode the MANIFEST file number cycles between
/// these two slots and no CURRENT file is kept.
pub const DESCRIPTOR_SLOTS: [u64; 2] = [1, 2];

/// Returns the descriptor slot that is not `slot`.
///
/// # Panics
///
/// Panics if `slot` is not 1 or 2.
pub fn other_descriptor_slot(slot: u64) -> u64 {
    assert!(
        slot == 1 || slot == 2,
        "[filename] rotating descriptor slot must be 1 or 2, but got {}",
        slot
    );
    3 - slot
}

/// Returns a filename for a certain `FileType` built from the given file
/// number and `dirname`.
pub fn generate_filename(dirname: &str, filetype: FileType, number: u64) -> String {
    let dir = Path::new(dirname);
    let path = match filetype {
        FileType::Log => dir.join(format!("{:06}.log", number)),
        FileType::Lock => dir.join("LOCK"),
        FileType::Table => dir.join(format!("{:06}.sst", number)),
        FileType::Manifest => dir.join(format!("MANIFEST-{:06}", number)),
        FileType::Current => dir.join("CURRENT"),
        FileType::Temp => dir.join(format!("{:06}.dbtmp", number)),
        FileType::InfoLog => dir.join("LOG"),
        FileType::OldInfoLog => dir.join("LOG.old"),
    };
    path.into_os_string()
        .into_string()
        .expect("[filename] the dirname must be valid unicode")
}

/// Returns a tuple containing the `FileType` and the file number parsed
/// from the given path, or `None` for an unrecognized name.
pub fn parse_filename<P: AsRef<Path>>(filename: P) -> Option<(FileType, u64)> {
    let invalid = "invalid";
    let path = filename.as_ref();
    let file_stem = path.file_stem().unwrap_or_else(|| OsStr::new(invalid));
    match file_stem.to_str() {
        Some("CURRENT") => Some((FileType::Current, 0)),
        Some("LOCK") => Some((FileType::Lock, 0)),
        Some("LOG") => match path.file_name().unwrap_or_else(|| OsStr::new("")).to_str() {
            Some("LOG") => Some((FileType::InfoLog, 0)),
            Some("LOG.old") => Some((FileType::OldInfoLog, 0)),
            _ => None,
        },
        Some(with_number) => {
            if with_number.starts_with("MANIFEST") {
                let parts: Vec<&str> = with_number.split('-').collect();
                if parts.len() != 2 {
                    return None;
                }
                if let Ok(number) = parts[1].parse::<u64>() {
                    return Some((FileType::Manifest, number));
                }
                return None;
            }
            if let Ok(number) = with_number.parse::<u64>() {
                match path
                    .extension()
                    .unwrap_or_else(|| OsStr::new(invalid))
                    .to_str()
                {
                    Some("log") => return Some((FileType::Log, number)),
                    Some("sst") => return Some((FileType::Table, number)),
                    Some("dbtmp") => return Some((FileType::Temp, number)),
                    _ => return None,
                }
            }
            None
        }
        _ => None,
    }
}

/// Make the CURRENT file point at the descriptor with the given number.
/// The content is written to a temporary file first and then renamed over
/// CURRENT so that readers never observe a partial write.
pub fn update_current<S: Storage>(env: &S, dirname: &str, manifest_file_number: u64) -> Result<()> {
    // Contents are the descriptor name relative to the db directory,
    // terminated by a newline.
    let mut contents = format!("MANIFEST-{:06}", manifest_file_number);
    contents.push('\n');
    let tmp = generate_filename(dirname, FileType::Temp, manifest_file_number);
    let result = do_write_string_to_file(env, &contents, &tmp, true);
    match &result {
        Ok(()) => env.rename(&tmp, &generate_filename(dirname, FileType::Current, 0))?,
        Err(_) => env.remove(&tmp)?,
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mem::MemStorage;
    use crate::storage::{read_file_to_string, Storage};

    #[test]
    fn test_generate_filename() {
        let dirname = "test";
        let tests = vec![
            (FileType::Log, 10, "test/000010.log"),
            (FileType::Lock, 1, "test/LOCK"),
            (FileType::Table, 123, "test/000123.sst"),
            (FileType::Manifest, 9, "test/MANIFEST-000009"),
            (FileType::Current, 1, "test/CURRENT"),
            (FileType::Temp, 100, "test/000100.dbtmp"),
            (FileType::InfoLog, 1, "test/LOG"),
            (FileType::OldInfoLog, 1, "test/LOG.old"),
        ];
        for (ft, number, expect) in tests {
            assert_eq!(generate_filename(dirname, ft, number), expect.to_owned());
        }
    }

    #[test]
    fn test_parse_filename() {
        let tests = vec![
            ("a/b/c/000123.log", Some((FileType::Log, 123))),
            ("a/b/c/LOCK", Some((FileType::Lock, 0))),
            ("a/b/c/010666.sst", Some((FileType::Table, 10666))),
            ("a/b/c/MANIFEST-000009", Some((FileType::Manifest, 9))),
            ("a/b/c/000123.dbtmp", Some((FileType::Temp, 123))),
            ("a/b/c/CURRENT", Some((FileType::Current, 0))),
            ("a/b/c/LOG", Some((FileType::InfoLog, 0))),
            ("a/b/c/LOG.old", Some((FileType::OldInfoLog, 0))),
            // invalid conditions
            ("a/b/c/test.123", None),
            ("a/b/c/LOG.", None),
            ("a/b/c/LOG.new", None),
            ("a/b/c/000def.log", None),
            ("a/b/c/MANIFEST-abcdef", None),
            ("a/b/c/MANIFEST", None),
            ("a/b/c/MANIFEST-123123-abcdef", None),
        ];
        for (filename, expect) in tests {
            assert_eq!(parse_filename(filename), expect);
        }
    }

    #[test]
    fn test_other_descriptor_slot() {
        assert_eq!(other_descriptor_slot(1), 2);
        assert_eq!(other_descriptor_slot(2), 1);
    }

    #[test]
    #[should_panic]
    fn test_other_descriptor_slot_out_of_range() {
        other_descriptor_slot(3);
    }

    #[test]
    fn test_update_current() {
        let env = MemStorage::default();
        update_current(&env, "db", 3).expect("update_current should work");
        let content = read_file_to_string(&env, "db/CURRENT").expect("CURRENT should exist");
        assert_eq!(content, "MANIFEST-000003\n");
        assert!(!env.exists("db/000003.dbtmp"));

        // repointing overwrites the old content
        update_current(&env, "db", 4).expect("update_current should work");
        let content = read_file_to_string(&env, "db/CURRENT").expect("CURRENT should exist");
        assert_eq!(content, "MANIFEST-000004\n");
    }
}
