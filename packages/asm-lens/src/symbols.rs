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

use std::collections::HashMap;
use std::ops::Range;

use crate::error::LoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SymbolScope {
    Global,
    Static,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Display name (demangled when possible).
    pub name: String,
    /// Name as stored in the binary.
    pub raw_name: String,
    pub address: u64,
    pub size: u64,
    pub scope: SymbolScope,
    /// ARM only: the symbol is Thumb code.
    pub thumb: bool,
}

impl Symbol {
    pub fn new(raw_name: impl Into<String>, address: u64, size: u64) -> Self {
        let raw_name = raw_name.into();
        Self {
            name: demangle(&raw_name),
            raw_name,
            address,
            size,
            scope: SymbolScope::Unknown,
            thumb: false,
        }
    }

    pub fn with_scope(mut self, scope: SymbolScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn end(&self) -> u64 {
        self.address + self.size
    }

    pub fn range(&self) -> Range<u64> {
        self.address..self.end()
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.address && addr < self.end()
    }
}

/// Demangles Rust (legacy and v0) and Itanium C++ names. Anything else is
/// returned unchanged.
pub fn demangle(raw: &str) -> String {
    if let Ok(d) = rustc_demangle::try_demangle(raw) {
        return format!("{:#}", d);
    }
    let itanium = raw.strip_prefix('_').filter(|s| s.starts_with("_Z")).unwrap_or(raw);
    if itanium.starts_with("_Z") {
        let symbol = cpp_demangle::Symbol::new(itanium.as_bytes());
        if let Ok(Ok(name)) = symbol.map(|sym| sym.demangle()) {
            return name;
        }
    }
    raw.to_string()
}

/// Address-sorted, non-overlapping function table.
///
/// Lookups are binary searches over the sorted vector; names map to indices.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes raw symbols taken from an object file:
    /// - sorted by address, aliases at the same address collapse onto the
    ///   preferred (global first) name,
    /// - zero sized symbols extend to the next symbol or the end of the code
    ///   region they start in,
    /// - symbols wholly inside a previous symbol are interior labels and are
    ///   dropped.
    ///
    /// Two sized symbols that partially overlap make the table inconsistent.
    pub fn from_raw(mut raw: Vec<Symbol>, regions: &[Range<u64>]) -> Result<Self, LoadError> {
        raw.retain(|s| regions.iter().any(|r| r.contains(&s.address)));
        raw.sort_by(|a, b| {
            a.address
                .cmp(&b.address)
                .then(a.scope.cmp(&b.scope))
                .then(b.size.cmp(&a.size))
                .then(a.name.cmp(&b.name))
        });
        raw.dedup_by_key(|s| s.address);

        let addresses: Vec<u64> = raw.iter().map(|s| s.address).collect();
        let mut kept: Vec<Symbol> = Vec::with_capacity(raw.len());
        for (i, mut sym) in raw.into_iter().enumerate() {
            if let Some(prev) = kept.last() {
                if sym.address < prev.end() {
                    if sym.size == 0 || sym.end() <= prev.end() {
                        log::debug!("dropping interior label {} inside {}", sym.name, prev.name);
                        continue;
                    }
                    return Err(LoadError::Corrupt(format!(
                        "symbols {} [0x{:x}, 0x{:x}) and {} [0x{:x}, 0x{:x}) overlap",
                        prev.name,
                        prev.address,
                        prev.end(),
                        sym.name,
                        sym.address,
                        sym.end()
                    )));
                }
            }

            let region_end = regions
                .iter()
                .find(|r| r.contains(&sym.address))
                .map(|r| r.end)
                .unwrap_or(sym.address);
            if sym.size == 0 {
                let limit = addresses
                    .get(i + 1)
                    .copied()
                    .filter(|&next| next < region_end)
                    .unwrap_or(region_end);
                sym.size = limit - sym.address;
            }
            // Never let a symbol run off the end of its section.
            if sym.end() > region_end {
                sym.size = region_end - sym.address;
            }
            if sym.size > 0 {
                kept.push(sym);
            }
        }
        Self::from_sorted(kept)
    }

    /// Builds a table from symbols that must already be strictly sorted and
    /// disjoint.
    pub fn from_sorted(symbols: Vec<Symbol>) -> Result<Self, LoadError> {
        for pair in symbols.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.address <= a.address {
                return Err(LoadError::Corrupt(format!(
                    "symbol table is not sorted at {} (0x{:x})",
                    b.name, b.address
                )));
            }
            if b.address < a.end() {
                return Err(LoadError::Corrupt(format!(
                    "symbols {} and {} overlap at 0x{:x}",
                    a.name, b.name, b.address
                )));
            }
        }

        let mut by_name = HashMap::with_capacity(symbols.len() * 2);
        for (index, sym) in symbols.iter().enumerate() {
            by_name.entry(sym.name.clone()).or_insert(index);
            by_name.entry(sym.raw_name.clone()).or_insert(index);
        }
        Ok(Self { symbols, by_name })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Symbol> {
        self.index_of(name).map(|i| &self.symbols[i])
    }

    /// Symbol starting exactly at `address`.
    pub fn exact(&self, address: u64) -> Option<&Symbol> {
        self.symbols
            .binary_search_by_key(&address, |s| s.address)
            .ok()
            .map(|i| &self.symbols[i])
    }

    /// Symbol whose range contains `address`.
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        let idx = self.symbols.partition_point(|s| s.address <= address);
        let sym = self.symbols.get(idx.checked_sub(1)?)?;
        sym.contains(address).then_some(sym)
    }

    /// Resolves a branch or call target: an exact function start wins, then
    /// the nearest preceding symbol that still covers the address.
    pub fn resolve(&self, address: u64) -> Option<&Symbol> {
        self.exact(address).or_else(|| self.lookup(address))
    }
}
