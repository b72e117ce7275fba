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

//! Address to source line mapping recovered from DWARF line programs.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use gimli::Reader;

use crate::error::LoadError;

/// Interned source paths.
#[derive(Debug, Default)]
pub struct FileTable {
    paths: Vec<String>,
    ids: HashMap<String, u32>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, path: &str) -> u32 {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = self.paths.len() as u32;
        self.paths.push(path.to_string());
        self.ids.insert(path.to_string(), id);
        id
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.paths.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineEntry {
    address: u64,
    /// `None` marks the start of a gap (end of a sequence).
    loc: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: &'a str,
    pub line: u32,
}

/// Address sorted table answering nearest-not-greater lookups.
/// Built once per executable and never mutated afterwards.
#[derive(Debug, Default)]
pub struct LineTable {
    files: FileTable,
    entries: Vec<LineEntry>,
}

impl LineTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn lookup(&self, address: u64) -> Option<SourceLocation<'_>> {
        let idx = self.entries.partition_point(|e| e.address <= address);
        let entry = self.entries.get(idx.checked_sub(1)?)?;
        let (file, line) = entry.loc?;
        Some(SourceLocation { file: self.files.get(file)?, line })
    }

    /// Reads every line program in the DWARF sections provided by `section`.
    /// `bias` is added to each row address (wasm DWARF is relative to the code
    /// section).
    pub fn from_dwarf<'data, F>(
        section: F,
        endian: gimli::RunTimeEndian,
        bias: u64,
    ) -> Result<Self, LoadError>
    where
        F: Fn(gimli::SectionId) -> Option<Cow<'data, [u8]>>,
    {
        type Slice = gimli::EndianRcSlice<gimli::RunTimeEndian>;
        let load_section = |id: gimli::SectionId| -> Result<Slice, gimli::Error> {
            let data_rc: Rc<[u8]> = match section(id) {
                Some(Cow::Borrowed(b)) => Rc::from(b),
                Some(Cow::Owned(o)) => Rc::from(o),
                None => Rc::from(&[][..]),
            };
            Ok(gimli::EndianRcSlice::new(data_rc, endian))
        };
        let dwarf = gimli::Dwarf::load(&load_section).map_err(dwarf_error)?;

        let mut builder = LineTableBuilder::new();
        let mut units = dwarf.units();
        while let Some(header) = units.next().map_err(dwarf_error)? {
            let unit = dwarf.unit(header).map_err(dwarf_error)?;
            let Some(program) = unit.line_program.clone() else {
                continue;
            };

            let comp_dir = unit
                .comp_dir
                .as_ref()
                .and_then(|d| d.to_string_lossy().ok().map(|s| s.into_owned()));
            let mut paths: HashMap<u64, Option<String>> = HashMap::new();

            let mut rows = program.rows();
            while let Some((header, row)) = rows.next_row().map_err(dwarf_error)? {
                let address = row.address().wrapping_add(bias);
                if row.end_sequence() {
                    builder.push_gap(address);
                    continue;
                }
                let Some(line) = row.line() else {
                    // Line 0: compiler generated code with no source.
                    builder.push_gap(address);
                    continue;
                };
                let path = paths
                    .entry(row.file_index())
                    .or_insert_with(|| {
                        row.file(header).and_then(|file| {
                            file_path(&dwarf, &unit, header, file, comp_dir.as_deref())
                        })
                    })
                    .clone();
                match path {
                    Some(path) => builder.push(address, &path, line.get() as u32),
                    None => builder.push_gap(address),
                }
            }
        }

        let table = builder.finish();
        log::debug!(
            "line table: {} rows across {} files",
            table.entries.len(),
            table.files.len()
        );
        Ok(table)
    }
}

fn dwarf_error(e: gimli::Error) -> LoadError {
    LoadError::Corrupt(format!("DWARF: {}", e))
}

fn file_path<R: gimli::Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    header: &gimli::LineProgramHeader<R>,
    file: &gimli::FileEntry<R>,
    comp_dir: Option<&str>,
) -> Option<String> {
    let attr_string = |attr: gimli::AttributeValue<R>| -> Option<String> {
        let s = dwarf.attr_string(unit, attr).ok()?;
        let s = s.to_string_lossy().ok()?;
        Some(s.into_owned())
    };

    let name = attr_string(file.path_name())?;
    let mut path = PathBuf::new();
    if !Path::new(&name).is_absolute() {
        if let Some(dir) = file.directory(header).and_then(attr_string) {
            if !Path::new(&dir).is_absolute() {
                if let Some(comp_dir) = comp_dir {
                    path.push(comp_dir);
                }
            }
            path.push(dir);
        } else if let Some(comp_dir) = comp_dir {
            path.push(comp_dir);
        }
    }
    path.push(&name);
    Some(path.to_string_lossy().replace('\\', "/"))
}

/// Accumulates rows in any order; `finish` sorts and resolves duplicates.
#[derive(Debug, Default)]
pub struct LineTableBuilder {
    files: FileTable,
    entries: Vec<LineEntry>,
}

impl LineTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, address: u64, file: &str, line: u32) {
        let file = self.files.intern(file);
        self.entries.push(LineEntry { address, loc: Some((file, line)) });
    }

    pub fn push_gap(&mut self, address: u64) {
        self.entries.push(LineEntry { address, loc: None });
    }

    /// At a shared address a real row beats a gap, and a later row beats an
    /// earlier one.
    pub fn finish(mut self) -> LineTable {
        self.entries.sort_by_key(|e| e.address);
        let mut entries: Vec<LineEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            match entries.last_mut() {
                Some(last) if last.address == entry.address => {
                    if entry.loc.is_some() || last.loc.is_none() {
                        *last = entry;
                    }
                }
                _ => entries.push(entry),
            }
        }
        LineTable { files: self.files, entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_not_greater_lookup() {
        let mut b = LineTableBuilder::new();
        b.push(0x1000, "/src/main.c", 10);
        b.push(0x1008, "/src/main.c", 11);
        b.push(0x1010, "/src/util.h", 3);
        let table = b.finish();

        assert_eq!(table.lookup(0x0fff), None);
        assert_eq!(table.lookup(0x1000).unwrap().line, 10);
        assert_eq!(table.lookup(0x1007).unwrap().line, 10);
        let loc = table.lookup(0x2000).unwrap();
        assert_eq!((loc.file, loc.line), ("/src/util.h", 3));
    }

    #[test]
    fn gaps_map_to_unknown() {
        let mut b = LineTableBuilder::new();
        b.push(0x10, "a.rs", 1);
        b.push_gap(0x20);
        b.push(0x40, "a.rs", 7);
        let table = b.finish();

        assert_eq!(table.lookup(0x1f).unwrap().line, 1);
        assert_eq!(table.lookup(0x20), None);
        assert_eq!(table.lookup(0x3f), None);
        assert_eq!(table.lookup(0x40).unwrap().line, 7);
    }

    #[test]
    fn rows_beat_gaps_at_the_same_address() {
        let mut b = LineTableBuilder::new();
        b.push(0x30, "b.rs", 5);
        b.push_gap(0x30);
        b.push(0x10, "a.rs", 2);
        b.push_gap(0x30);
        let table = b.finish();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(0x30).unwrap().file, "b.rs");
        assert_eq!(table.files().len(), 2);
    }

    #[test]
    fn empty_dwarf_gives_empty_table() {
        let table = LineTable::from_dwarf(|_| None, gimli::RunTimeEndian::Little, 0).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.lookup(0x1234), None);
    }
}
