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

//! Caller supplied configuration. Everything that used to be a process-wide
//! toggle is a field here and is passed explicitly.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Per-decode options.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Lines of source padding shown around each referenced line.
    pub context_lines: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { context_lines: DEFAULT_CONTEXT_LINES }
    }
}

impl Options {
    pub fn with_context(context_lines: usize) -> Self {
        Self { context_lines }
    }
}

/// Options fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Accept WebAssembly modules. When false a wasm file is reported as an
    /// unsupported format.
    pub wasm: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { wasm: true }
    }
}
