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

use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// If the hint is `None`, the key is shadowed by a deletion entry
        NotFound(hint: Option<String>) {
            display("key seeking failed: {:?}", hint)
        }
        Corruption(hint: String) {
            display("data corruption: {}", hint)
        }
        UTF8Error(err: std::string::FromUtf8Error) {
            display("UTF8 error: {:?}", err)
        }
        InvalidArgument(hint: String) {
            display("invalid argument: {}", hint)
        }
        IO(err: std::io::Error) {
            display("I/O operation error: {}", err)
            cause(err)
        }
        Customized(hint: String) {
            display("{}", hint)
        }
    }
}

macro_rules! map_io_res {
    ($result:expr) => {
        match $result {
            Ok(v) => Ok(v),
            Err(e) => Err($crate::error::Error::IO(e)),
        }
    };
}

pub type Result<T> = std::result::Result<T, Error>;
