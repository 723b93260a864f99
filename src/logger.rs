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

use crate::filename::{generate_filename, FileType};
use crate::storage::{File, Storage};

use log::{LevelFilter, Log, Metadata, Record};
use slog::{o, Drain, Level};

use std::sync::Mutex;

/// A `slog` based logger which can be used with the `log` crate macros.
///
/// See `slog` at https://github.com/slog-rs/slog
/// See `log` at https://github.com/rust-lang/log
pub struct Logger {
    inner: slog::Logger,
    level: LevelFilter,
}

impl Logger {
    /// Create a logger backend.
    ///
    /// If `inner` is not `None`, use the given logger.
    /// Otherwise:
    ///     - in dev mode, log to the standard output
    ///     - in release mode, log to a storage file named `LOG`
    pub fn new<S: Storage>(
        inner: Option<slog::Logger>,
        level: LevelFilter,
        storage: &S,
        db_path: &str,
    ) -> Self {
        let inner = match inner {
            Some(l) => l,
            None => {
                if cfg!(debug_assertions) {
                    let decorator = slog_term::TermDecorator::new().build();
                    let drain = Mutex::new(slog_term::FullFormat::new(decorator).build()).fuse();
                    slog::Logger::root(drain, o!())
                } else {
                    // TODO: add file rotation
                    let file = storage
                        .create(generate_filename(db_path, FileType::InfoLog, 0).as_str())
                        .unwrap();
                    let drain = slog_async::Async::new(FileBasedDrain::new(file))
                        .build()
                        .fuse();
                    slog::Logger::root(drain, o!())
                }
            }
        };
        Self { inner, level }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, r: &Record) {
        if self.enabled(r.metadata()) {
            let level = log_to_slog_level(r.metadata().level());
            let args = r.args();
            let target = r.target();
            let module = r.module_path_static().unwrap_or("");
            let file = r.file_static().unwrap_or("");
            let line = r.line().unwrap_or(0);

            let s = slog::RecordStatic {
                location: &slog::RecordLocation {
                    file,
                    line,
                    column: 0,
                    function: "",
                    module,
                },
                level,
                tag: target,
            };
            if cfg!(debug_assertions) {
                let meta_info = format!("{}:{}", file, line);
                self.inner.log(&slog::Record::new(
                    &s,
                    args,
                    slog::b!("[location]" => meta_info),
                ))
            } else {
                self.inner.log(&slog::Record::new(&s, args, slog::b!()))
            }
        }
    }

    fn flush(&self) {}
}

fn log_to_slog_level(level: log::Level) -> Level {
    match level {
        log::Level::Trace => Level::Trace,
        log::Level::Debug => Level::Debug,
        log::Level::Info => Level::Info,
        log::Level::Warn => Level::Warning,
        log::Level::Error => Level::Error,
    }
}

struct FileBasedDrain<F: File> {
    inner: Mutex<F>,
}

impl<F: File> FileBasedDrain<F> {
    fn new(f: F) -> Self {
        FileBasedDrain {
            inner: Mutex::new(f),
        }
    }
}

impl<F: File> Drain for FileBasedDrain<F> {
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record,
        values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        // Errors are ignored here: there is nowhere left to report them
        let _ = self.inner.lock().unwrap().write(
            format!(
                "[{}] : {:?} \n {:?} \n",
                record.level(),
                record.msg(),
                values
            )
            .as_bytes(),
        );
        Ok(())
    }
}
