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

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;

use wasmparser::{
    BinaryReaderError, Encoding, ExternalKind, KnownCustom, Name, Parser, Payload, TypeRef,
};

use super::{CodeSegment, Parts};
use crate::decoder::{Isa, WasmFunctions};
use crate::error::LoadError;
use crate::line_table::LineTable;
use crate::symbols::{Symbol, SymbolTable};

/// Addresses in a wasm module are file offsets: a function's range starts
/// at its first operator (locals excluded) and ends with its body.
pub(crate) fn load(data: &[u8]) -> Result<Parts, LoadError> {
    let len = data.len();
    let mut imported = 0u32;
    let mut exports: HashMap<u32, String> = HashMap::new();
    let mut names: HashMap<u32, String> = HashMap::new();
    let mut bodies: Vec<Range<u64>> = Vec::new();
    let mut code: Option<Range<usize>> = None;
    let mut debug: HashMap<&str, &[u8]> = HashMap::new();

    for payload in Parser::new(0).parse_all(data) {
        match payload.map_err(|e| parse_error(e, len))? {
            Payload::Version { num, encoding, .. } => match encoding {
                Encoding::Module if num == 1 => {}
                Encoding::Module => {
                    return Err(LoadError::Corrupt(format!("unknown wasm module version {}", num)))
                }
                Encoding::Component => {
                    return Err(LoadError::UnsupportedFormat("WebAssembly component".into()))
                }
            },
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.map_err(|e| parse_error(e, len))?;
                    if matches!(import.ty, TypeRef::Func(_)) {
                        imported += 1;
                    }
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.map_err(|e| parse_error(e, len))?;
                    if export.kind == ExternalKind::Func {
                        exports.entry(export.index).or_insert_with(|| export.name.to_string());
                    }
                }
            }
            Payload::CodeSectionStart { range, .. } => code = Some(range),
            Payload::CodeSectionEntry(body) => {
                let ops = body.get_operators_reader().map_err(|e| parse_error(e, len))?;
                let start = ops.original_position() as u64;
                bodies.push(start..body.range().end as u64);
            }
            Payload::CustomSection(reader) => {
                if reader.name().starts_with(".debug_") {
                    debug.insert(reader.name(), reader.data());
                } else if let KnownCustom::Name(section) = reader.as_known() {
                    // A malformed name section only costs us names.
                    for name in section.into_iter().flatten() {
                        if let Name::Function(map) = name {
                            for naming in map.into_iter().flatten() {
                                names.insert(naming.index, naming.name.to_string());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let segments: Vec<CodeSegment> = code
        .iter()
        .map(|r| CodeSegment { address: r.start as u64, offset: r.start, len: r.len() })
        .collect();
    let regions: Vec<Range<u64>> = segments.iter().map(|s| s.range()).collect();

    let raw = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let index = imported + i as u32;
            let name = names
                .get(&index)
                .or_else(|| exports.get(&index))
                .cloned()
                .unwrap_or_else(|| format!("func[{}]", index));
            Symbol::new(name, body.start, body.end - body.start)
        })
        .collect();
    let symbols = SymbolTable::from_raw(raw, &regions)?;

    // DWARF addresses in wasm are relative to the code section payload.
    let bias = code.as_ref().map_or(0, |r| r.start as u64);
    let lines = if debug.is_empty() {
        LineTable::empty()
    } else {
        let section = |id: gimli::SectionId| debug.get(id.name()).map(|d| Cow::Borrowed(*d));
        LineTable::from_dwarf(section, gimli::RunTimeEndian::Little, bias).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable wasm line table: {}", e);
            LineTable::empty()
        })
    };

    let funcs = WasmFunctions { imported, bodies: bodies.iter().map(|b| b.start).collect() };
    Ok(Parts { segments, symbols, lines, isa: Isa::Wasm(funcs) })
}

fn parse_error(e: BinaryReaderError, len: usize) -> LoadError {
    if e.message().contains("unexpected end") || e.offset() >= len {
        LoadError::Truncated { what: "wasm module".into(), end: e.offset() as u64, len: len as u64 }
    } else {
        LoadError::Corrupt(format!("wasm: {} (at offset 0x{:x})", e.message(), e.offset()))
    }
}
