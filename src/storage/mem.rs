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

use crate::error::{Error, Result};
use crate::storage::{File, Storage};
use crate::util::collection::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

fn not_found(name: &str) -> Error {
    Error::IO(std::io::Error::new(ErrorKind::NotFound, name.to_owned()))
}

/// An in-memory file system based on a simple `HashMap`, mainly used for
/// testing and for running an engine without durable state.
#[derive(Default, Clone)]
pub struct MemStorage {
    inner: Arc<RwLock<HashMap<String, FileNode>>>,
}

impl Storage for MemStorage {
    type F = FileNode;

    fn create(&self, name: &str) -> Result<Self::F> {
        let file_node = FileNode::new(name);
        self.inner
            .write()
            .unwrap()
            .insert(name.to_owned(), file_node.clone());
        Ok(file_node)
    }

    fn open(&self, name: &str) -> Result<Self::F> {
        match self.inner.read().unwrap().get(name) {
            Some(f) => {
                let mut file = f.clone();
                file.pos = 0;
                Ok(file)
            }
            None => Err(not_found(name)),
        }
    }

    // If not found, still returns Ok
    fn remove(&self, name: &str) -> Result<()> {
        self.inner.write().unwrap().remove(name);
        Ok(())
    }

    fn remove_dir(&self, dir: &str, _recursively: bool) -> Result<()> {
        let prefix = format!("{}/", dir);
        self.inner
            .write()
            .unwrap()
            .retain(|name, _| !name.starts_with(&prefix));
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.read().unwrap().contains_key(name)
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        let mut map = self.inner.write().unwrap();
        match map.remove(old) {
            Some(f) => {
                map.insert(new.to_owned(), f);
                Ok(())
            }
            None => Err(not_found(old)),
        }
    }

    // Directories are implicit
    fn mkdir_all(&self, _dir: &str) -> Result<()> {
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}/", dir);
        let mut result = vec![];
        for name in self.inner.read().unwrap().keys() {
            if name.starts_with(&prefix) {
                result.push(PathBuf::from(name.clone()))
            }
        }
        Ok(result)
    }
}

/// A shared in-memory file. Clones observe the same contents; each clone
/// keeps its own read/write position.
#[derive(Clone)]
pub struct FileNode {
    contents: Arc<RwLock<Vec<u8>>>,
    pos: u64,
}

impl FileNode {
    fn new(_name: &str) -> Self {
        FileNode {
            contents: Arc::new(RwLock::new(vec![])),
            pos: 0,
        }
    }
}

impl File for FileNode {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut contents = self.contents.write().unwrap();
        let pos = self.pos as usize;
        if pos + buf.len() > contents.len() {
            contents.resize(pos + buf.len(), 0);
        }
        contents[pos..pos + buf.len()].copy_from_slice(buf);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.contents.read().unwrap().len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if new_pos < 0 {
            return Err(Error::IO(std::io::Error::new(
                ErrorKind::InvalidInput,
                "seek to a negative position",
            )));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.read_at(buf, self.pos)?;
        self.pos += read as u64;
        Ok(read)
    }

    fn read_all(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let contents = self.contents.read().unwrap();
        buf.extend_from_slice(contents.as_slice());
        self.pos = contents.len() as u64;
        Ok(contents.len())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.contents.read().unwrap().len() as u64)
    }

    fn lock(&self) -> Result<()> {
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        Ok(())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let contents = self.contents.read().unwrap();
        let offset = offset as usize;
        if offset >= contents.len() {
            return Ok(0);
        }
        let to_read = std::cmp::min(buf.len(), contents.len() - offset);
        buf[..to_read].copy_from_slice(&contents[offset..offset + to_read]);
        Ok(to_read)
    }
}
