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

use std::ops::Range;

use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SectionKind, SymbolKind};

use super::{CodeSegment, Format, Parts};
use crate::decoder::{Arch, Isa};
use crate::error::LoadError;
use crate::line_table::LineTable;
use crate::symbols::{Symbol, SymbolScope, SymbolTable};

/// Smallest header any supported native container can have.
const MIN_HEADER: usize = 52;

pub(crate) fn load(data: &[u8], format: Format) -> Result<Parts, LoadError> {
    if format == Format::Elf {
        check_elf_header(data)?;
    }
    let file = object::File::parse(data).map_err(|e| {
        if data.len() < MIN_HEADER {
            LoadError::Truncated {
                what: format!("{} header", format),
                end: MIN_HEADER as u64,
                len: data.len() as u64,
            }
        } else {
            LoadError::Corrupt(format!("{} parse failed: {}", format, e))
        }
    })?;
    check_section_bounds(&file, data.len())?;

    let arch = Arch::from_object(file.architecture()).ok_or_else(|| {
        LoadError::UnsupportedFormat(format!("{} for {:?}", format, file.architecture()))
    })?;
    if file.kind() == ObjectKind::Relocatable {
        log::warn!("relocatable object: section-relative addresses may alias across sections");
    }

    let segments = code_segments(&file);
    let regions: Vec<Range<u64>> = segments.iter().map(|s| s.range()).collect();
    let symbols = SymbolTable::from_raw(raw_symbols(&file, format, arch), &regions)?;
    let lines = line_table(&file);

    Ok(Parts { segments, symbols, lines, isa: Isa::Native(arch) })
}

/// The section header table usually sits at the very end of an ELF file, so
/// it is the first thing lost when a file is cut short.
fn check_elf_header(data: &[u8]) -> Result<(), LoadError> {
    let wide = data.get(4) == Some(&2);
    let big = data.get(5) == Some(&2);
    let header_len = if wide { 64 } else { 52 };
    let truncated = |what: &str, end: u64| LoadError::Truncated {
        what: what.to_string(),
        end,
        len: data.len() as u64,
    };
    if data.len() < header_len {
        return Err(truncated("ELF header", header_len as u64));
    }
    let read = |at: usize, n: usize| -> u64 {
        let bytes = &data[at..at + n];
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        if big {
            bytes.iter().fold(0, fold)
        } else {
            bytes.iter().rev().fold(0, fold)
        }
    };
    let (shoff, shentsize, shnum) = if wide {
        (read(0x28, 8), read(0x3a, 2), read(0x3c, 2))
    } else {
        (read(0x20, 4), read(0x2e, 2), read(0x30, 2))
    };
    let end = shoff.saturating_add(shentsize.saturating_mul(shnum));
    if shnum > 0 && end > data.len() as u64 {
        return Err(truncated("section header table", end));
    }
    Ok(())
}

/// Every section that claims file bytes must fit inside the buffer.
fn check_section_bounds(file: &object::File, len: usize) -> Result<(), LoadError> {
    for section in file.sections() {
        let Some((offset, size)) = section.file_range() else {
            continue;
        };
        let end = offset.saturating_add(size);
        if end > len as u64 {
            return Err(LoadError::Truncated {
                what: format!("section {}", section.name().unwrap_or("?")),
                end,
                len: len as u64,
            });
        }
    }
    Ok(())
}

fn code_segments(file: &object::File) -> Vec<CodeSegment> {
    let mut segments: Vec<CodeSegment> = file
        .sections()
        .filter(|s| s.kind() == SectionKind::Text)
        .filter_map(|s| {
            let (offset, size) = s.file_range()?;
            let len = size.min(s.size()) as usize;
            (len > 0).then(|| CodeSegment { address: s.address(), offset: offset as usize, len })
        })
        .collect();
    segments.sort_by_key(|s| s.address);
    segments
}

fn raw_symbols(file: &object::File, format: Format, arch: Arch) -> Vec<Symbol> {
    let mut raw: Vec<Symbol> = file.symbols().filter_map(|s| convert(&s, format, arch)).collect();
    if raw.is_empty() {
        // stripped binaries still carry their dynamic exports
        raw = file.dynamic_symbols().filter_map(|s| convert(&s, format, arch)).collect();
    }
    raw
}

fn convert<'data, S>(sym: &S, format: Format, arch: Arch) -> Option<Symbol>
where
    S: ObjectSymbol<'data>,
{
    if sym.kind() != SymbolKind::Text || !sym.is_definition() {
        return None;
    }
    let name = sym.name().ok().filter(|n| !n.is_empty())?;
    let name = match format {
        Format::MachO => name.strip_prefix('_').unwrap_or(name),
        _ => name,
    };
    let mut address = sym.address();
    let thumb = arch == Arch::Arm && address & 1 == 1;
    if thumb {
        address &= !1;
    }
    let scope = match sym.scope() {
        object::SymbolScope::Linkage | object::SymbolScope::Dynamic => SymbolScope::Global,
        object::SymbolScope::Compilation => SymbolScope::Static,
        _ => SymbolScope::Unknown,
    };
    let mut symbol = Symbol::new(name, address, sym.size()).with_scope(scope);
    symbol.thumb = thumb;
    Some(symbol)
}

/// Debug info problems never fail the load: the file is still worth
/// disassembling without source correlation.
fn line_table(file: &object::File) -> LineTable {
    let endian = if file.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };
    let section = |id: gimli::SectionId| {
        file.section_by_name(id.name()).and_then(|s| s.uncompressed_data().ok())
    };
    match LineTable::from_dwarf(section, endian, 0) {
        Ok(table) => table,
        Err(e) => {
            log::warn!("ignoring unreadable line table: {}", e);
            LineTable::empty()
        }
    }
}
