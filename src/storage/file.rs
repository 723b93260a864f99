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

use crate::storage::{File, Storage};
use crate::Result;
use fs2::FileExt;
use std::fs::{create_dir_all, read_dir, remove_dir, remove_dir_all, remove_file, rename, File as SysFile, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A `Storage` implementation backed by the local file system
#[derive(Clone, Default)]
pub struct FileStorage;

impl Storage for FileStorage {
    type F = SysFile;

    fn create(&self, name: &str) -> Result<Self::F> {
        map_io_res!(OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(name))
    }

    fn open(&self, name: &str) -> Result<Self::F> {
        map_io_res!(OpenOptions::new().write(true).read(true).open(name))
    }

    fn remove(&self, name: &str) -> Result<()> {
        map_io_res!(remove_file(name))
    }

    fn remove_dir(&self, dir: &str, recursively: bool) -> Result<()> {
        if recursively {
            map_io_res!(remove_dir_all(dir))
        } else {
            map_io_res!(remove_dir(dir))
        }
    }

    fn exists(&self, name: &str) -> bool {
        Path::new(name).exists()
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        map_io_res!(rename(old, new))
    }

    fn mkdir_all(&self, dir: &str) -> Result<()> {
        map_io_res!(create_dir_all(dir))
    }

    fn list(&self, dir: &str) -> Result<Vec<PathBuf>> {
        let path = Path::new(dir);
        if !path.is_dir() {
            return Ok(vec![]);
        }
        let mut v = vec![];
        for entry in map_io_res!(read_dir(path))? {
            let entry = map_io_res!(entry)?;
            v.push(entry.path());
        }
        Ok(v)
    }
}

impl File for SysFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        map_io_res!(Write::write(self, buf))
    }

    fn flush(&mut self) -> Result<()> {
        map_io_res!(Write::flush(self))?;
        // flush alone only drains userspace buffers
        map_io_res!(self.sync_all())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        map_io_res!(Seek::seek(self, pos))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        map_io_res!(Read::read(self, buf))
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        map_io_res!(Seek::seek(self, SeekFrom::Start(0)))?;
        map_io_res!(Read::read_to_end(self, buf))
    }

    fn len(&self) -> Result<u64> {
        let meta = map_io_res!(self.metadata())?;
        Ok(meta.len())
    }

    fn lock(&self) -> Result<()> {
        map_io_res!(SysFile::try_lock_exclusive(self))
    }

    fn unlock(&self) -> Result<()> {
        map_io_res!(FileExt::unlock(self))
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        map_io_res!(std::os::unix::prelude::FileExt::read_at(self, buf, offset))
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        map_io_res!(std::os::windows::prelude::FileExt::seek_read(
            self, buf, offset
        ))
    }
}
