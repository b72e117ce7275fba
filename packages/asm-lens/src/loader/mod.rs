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

//! Executable loading. The container format is detected from magic bytes;
//! each format extracts code regions, symbols and a line table into the same
//! normalized [`Executable`].

pub mod native;
pub mod wasm;

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decoder::Isa;
use crate::error::{Error, LoadError, Result};
use crate::line_table::LineTable;
use crate::options::LoaderConfig;
use crate::symbols::{Symbol, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Elf,
    MachO,
    Pe,
    Wasm,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Elf => "ELF",
            Format::MachO => "Mach-O",
            Format::Pe => "PE",
            Format::Wasm => "WebAssembly",
        };
        f.write_str(name)
    }
}

pub fn detect_format(data: &[u8]) -> Result<Format, LoadError> {
    const MACHO: [[u8; 4]; 4] = [
        [0xfe, 0xed, 0xfa, 0xce],
        [0xfe, 0xed, 0xfa, 0xcf],
        [0xce, 0xfa, 0xed, 0xfe],
        [0xcf, 0xfa, 0xed, 0xfe],
    ];
    match data {
        [0x00, b'a', b's', b'm', ..] => Ok(Format::Wasm),
        [0x7f, b'E', b'L', b'F', ..] => Ok(Format::Elf),
        [a, b, c, d, ..] if MACHO.contains(&[*a, *b, *c, *d]) => Ok(Format::MachO),
        [0xca, 0xfe, 0xba, 0xbe, ..] | [0xbe, 0xba, 0xfe, 0xca, ..] => Err(
            LoadError::UnsupportedFormat("universal (fat) Mach-O; extract one slice first".into()),
        ),
        [b'M', b'Z', ..] => Ok(Format::Pe),
        [] => Err(LoadError::UnsupportedFormat("empty file".into())),
        _ => {
            let magic: Vec<String> = data.iter().take(4).map(|b| format!("{:02x}", b)).collect();
            Err(LoadError::UnsupportedFormat(format!("unrecognized magic {}", magic.join(" "))))
        }
    }
}

/// Code bytes mapped at `address`, stored at `offset` in the file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSegment {
    pub address: u64,
    pub offset: usize,
    pub len: usize,
}

impl CodeSegment {
    pub fn range(&self) -> Range<u64> {
        self.address..self.address + self.len as u64
    }
}

/// What a format-specific loader hands back.
pub(crate) struct Parts {
    pub segments: Vec<CodeSegment>,
    pub symbols: SymbolTable,
    pub lines: LineTable,
    pub isa: Isa,
}

/// Stable identity of a function across reloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionKey {
    pub name: String,
    pub file: String,
}

struct Inner {
    path: String,
    format: Format,
    data: Vec<u8>,
    segments: Vec<CodeSegment>,
    symbols: SymbolTable,
    lines: LineTable,
    isa: Isa,
    closed: AtomicBool,
}

/// A loaded binary. Cheap to clone; clones share the buffer and tables.
#[derive(Clone)]
pub struct Executable {
    inner: Arc<Inner>,
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executable")
            .field("path", &self.inner.path)
            .field("format", &self.inner.format)
            .field("functions", &self.inner.symbols.len())
            .finish()
    }
}

impl Executable {
    pub fn load(path: impl AsRef<Path>, config: LoaderConfig) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::from_bytes(path.to_string_lossy().into_owned(), data, config)
    }

    pub fn from_bytes(
        path: impl Into<String>,
        data: Vec<u8>,
        config: LoaderConfig,
    ) -> Result<Self, LoadError> {
        let path = path.into();
        let format = detect_format(&data)?;
        let parts = match format {
            Format::Wasm if !config.wasm => {
                return Err(LoadError::UnsupportedFormat("WebAssembly support is disabled".into()))
            }
            Format::Wasm => wasm::load(&data)?,
            _ => native::load(&data, format)?,
        };
        log::info!(
            "loaded {} ({}, {} functions, {} line rows)",
            path,
            format,
            parts.symbols.len(),
            parts.lines.len()
        );
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                format,
                data,
                segments: parts.segments,
                symbols: parts.symbols,
                lines: parts.lines,
                isa: parts.isa,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn format(&self) -> Format {
        self.inner.format
    }

    pub fn isa(&self) -> &Isa {
        &self.inner.isa
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.inner.symbols
    }

    pub fn line_table(&self) -> &LineTable {
        &self.inner.lines
    }

    pub fn segments(&self) -> &[CodeSegment] {
        &self.inner.segments
    }

    /// `[textStart, textEnd)` spanning every code segment.
    pub fn text_range(&self) -> Range<u64> {
        let start = self.inner.segments.iter().map(|s| s.address).min().unwrap_or(0);
        let end = self.inner.segments.iter().map(|s| s.range().end).max().unwrap_or(0);
        start..end
    }

    /// Functions in address order.
    pub fn functions(&self) -> Result<Vec<Function>> {
        self.ensure_open()?;
        Ok((0..self.inner.symbols.len())
            .map(|index| Function { exe: self.clone(), index })
            .collect())
    }

    /// Finds a function by display or raw name.
    pub fn function(&self, name: &str) -> Result<Function> {
        self.ensure_open()?;
        self.inner
            .symbols
            .index_of(name)
            .map(|index| Function { exe: self.clone(), index })
            .ok_or_else(|| Error::not_found(format!("function {} in {}", name, self.inner.path)))
    }

    pub fn find(&self, key: &FunctionKey) -> Result<Function> {
        if key.file != self.inner.path {
            return Err(Error::not_found(format!("{} is not in {}", key.name, self.inner.path)));
        }
        self.function(&key.name)
    }

    /// Marks the executable closed. Handles that are still around fail with
    /// `NotFound` from here on. Closing twice is harmless.
    pub fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            log::info!("closed {}", self.inner.path);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::not_found(format!("{} has been closed", self.inner.path)));
        }
        Ok(())
    }

    /// File bytes backing `[range.start, range.end)`, if one segment holds
    /// all of it.
    pub(crate) fn code_bytes(&self, range: Range<u64>) -> Option<&[u8]> {
        let seg = self
            .inner
            .segments
            .iter()
            .find(|s| s.range().contains(&range.start) && range.end <= s.range().end)?;
        let start = seg.offset + (range.start - seg.address) as usize;
        let end = start + (range.end - range.start) as usize;
        self.inner.data.get(start..end)
    }

    pub(crate) fn ptr_eq(&self, other: &Executable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Handle to one function of an [`Executable`]. The instruction pipeline
/// lives in `code.rs` (`Function::load`).
#[derive(Clone)]
pub struct Function {
    exe: Executable,
    index: usize,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = self.symbol();
        write!(f, "Function({} @ 0x{:x}+{})", sym.name, sym.address, sym.size)
    }
}

impl Function {
    pub fn executable(&self) -> &Executable {
        &self.exe
    }

    pub fn symbol(&self) -> &Symbol {
        // index always comes from this executable's table
        &self.exe.inner.symbols.as_slice()[self.index]
    }

    pub fn name(&self) -> &str {
        &self.symbol().name
    }

    pub fn address(&self) -> u64 {
        self.symbol().address
    }

    pub fn size(&self) -> u64 {
        self.symbol().size
    }

    pub fn range(&self) -> Range<u64> {
        self.symbol().range()
    }

    pub fn key(&self) -> FunctionKey {
        FunctionKey { name: self.name().to_string(), file: self.exe.path().to_string() }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.exe.ptr_eq(&other.exe) && self.index == other.index
    }
}
