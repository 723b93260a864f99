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

pub mod file;
pub mod mem;

use crate::error::{Error, Result};
use std::io::SeekFrom;
use std::path::PathBuf;

/// `Storage` is a namespace for files.
///
/// The names are filepath names: they may be `/` separated or `\` separated,
/// depending on the underlying operating system.
pub trait Storage: Send + Sync {
    type F: File + 'static;

    /// Create a file if it does not exist and truncates an exist one.
    fn create(&self, name: &str) -> Result<Self::F>;

    /// Open a file for writing and reading
    fn open(&self, name: &str) -> Result<Self::F>;

    /// Delete the named file
    fn remove(&self, name: &str) -> Result<()>;

    /// Removes a directory at this path. If `recursively`, removes all its
    /// contents along with it.
    fn remove_dir(&self, dir: &str, recursively: bool) -> Result<()>;

    /// Returns true iff the named file exists.
    fn exists(&self, name: &str) -> bool;

    /// Rename a file or directory to a new name, replacing the original
    /// file if it already exists.
    fn rename(&self, old: &str, new: &str) -> Result<()>;

    /// Recursively create a directory and all of its parent components if
    /// they are missing.
    fn mkdir_all(&self, dir: &str) -> Result<()>;

    /// Returns a list of the full-path of all files in given directory.
    fn list(&self, dir: &str) -> Result<Vec<PathBuf>>;
}

/// A file abstraction for IO operations
pub trait File: Send + Sync {
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flushes any buffered data and its metadata to the underlying device,
    /// providing durability for everything written so far.
    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads the whole file from the beginning into `buf` and returns the
    /// count of read bytes.
    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// Returns the length of the file in bytes.
    fn len(&self) -> Result<u64>;

    /// Locks the file for exclusive usage, blocking if the file is currently
    /// locked.
    fn lock(&self) -> Result<()>;

    fn unlock(&self) -> Result<()>;

    /// Reads bytes from an offset in this source into a buffer, returning
    /// how many bytes were read.
    ///
    /// This function may yield fewer bytes than the size of `buf`, if it
    /// was interrupted or hit the "EOF".
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Reads the exact number of bytes required to fill `buf` from an
    /// `offset`. Errors if "EOF" is encountered before filling the buffer.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => break,
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                    offset += n as u64;
                }
                Err(e) => return Err(e),
            }
        }
        if !buf.is_empty() {
            Err(Error::IO(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "failed to fill whole buffer",
            )))
        } else {
            Ok(())
        }
    }
}

/// Write the given string contents into the named file. The file is synced
/// before closing when `should_sync` is true.
pub fn do_write_string_to_file<S: Storage>(
    env: &S,
    contents: &str,
    file_name: &str,
    should_sync: bool,
) -> Result<()> {
    let mut f = env.create(file_name)?;
    f.write(contents.as_bytes())?;
    if should_sync {
        f.flush()?;
    }
    f.close()
}

/// Read the whole named file into a `String`.
pub fn read_file_to_string<S: Storage>(env: &S, file_name: &str) -> Result<String> {
    let mut f = env.open(file_name)?;
    let mut buf = vec![];
    f.read_all(&mut buf)?;
    String::from_utf8(buf).map_err(Error::UTF8Error)
}
