// Copyright (c) 2026 asm-lens Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error taxonomy shared by the loader, registry and request handler.

use thiserror::Error;

/// Fatal for one load attempt. No executable is produced.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("truncated file: {what} ends at 0x{end:x} but the buffer is only 0x{len:x} bytes")]
    Truncated { what: String, end: u64, len: u64 },

    #[error("corrupt file: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Reserved for proxied front ends; never produced by local decoding.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Stable discriminant used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Load(LoadError::UnsupportedFormat(_)) => "unsupportedFormat",
            Error::Load(LoadError::Truncated { .. }) => "truncated",
            Error::Load(LoadError::Corrupt(_)) => "corrupt",
            Error::Load(LoadError::Io(_)) => "io",
            Error::NotFound(_) => "notFound",
            Error::InvalidFilter { .. } => "invalidFilter",
            Error::Transport(_) => "transport",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
