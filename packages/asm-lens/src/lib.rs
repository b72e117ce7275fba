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

// Crate root: declare modules and control visibility
pub mod arcs;
pub mod code;
pub mod decoder;
pub mod error;
pub mod line_table;
pub mod loader;
pub mod options;
pub mod protocol;
pub mod references;
pub mod registry;
pub mod request_handler;
pub mod source_blocks;
pub mod symbols;
pub mod transport;
pub mod utils;
pub mod watch;

// Re-export commonly used API from the library for binaries/tests
pub use code::{DecodedFunction, Instruction, JumpRef};
pub use error::{Error, LoadError};
pub use loader::{Executable, Function, FunctionKey};
pub use options::{LoaderConfig, Options};
pub use registry::Registry;
