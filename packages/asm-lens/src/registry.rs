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

//! In-memory set of open executables keyed by normalized path.
//!
//! The map lock is held only to look up, insert or take an entry. Loading,
//! decoding and closing all happen outside it, so readers of one file never
//! wait on work for another.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;

use crate::code::DecodedFunction;
use crate::error::{Error, Result};
use crate::loader::{Executable, Function};
use crate::options::{LoaderConfig, Options};
use crate::utils::canonicalize_path;

#[derive(Debug, Default)]
pub struct Registry {
    config: LoaderConfig,
    entries: RwLock<HashMap<String, Executable>>,
}

impl Registry {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config, entries: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> LoaderConfig {
        self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Executable>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Executable>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens `path` unless it is already open, in which case the existing
    /// executable is returned without touching the file.
    pub fn add(&self, path: &str) -> Result<Executable> {
        let key = canonicalize_path(path);
        if let Some(exe) = self.read().get(&key) {
            return Ok(exe.clone());
        }
        let loaded = Executable::load(&key, self.config)?;
        let mut entries = self.write();
        // Another caller may have won the race while we were loading.
        Ok(entries.entry(key).or_insert(loaded).clone())
    }

    pub fn get(&self, path: &str) -> Result<Executable> {
        let key = canonicalize_path(path);
        self.read().get(&key).cloned().ok_or_else(|| Error::not_found(key))
    }

    /// Closes and forgets `path`.
    pub fn remove(&self, path: &str) -> Result<()> {
        let key = canonicalize_path(path);
        let removed = self.write().remove(&key);
        match removed {
            Some(exe) => exe.close(),
            None => Err(Error::not_found(key)),
        }
    }

    /// Open paths, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Re-reads an open file and swaps it in. On failure the previous
    /// executable stays registered.
    pub fn reload(&self, path: &str) -> Result<Executable> {
        let key = canonicalize_path(path);
        if !self.read().contains_key(&key) {
            return Err(Error::not_found(key));
        }
        let fresh = Executable::load(&key, self.config)?;
        self.replace(&key, fresh.clone());
        Ok(fresh)
    }

    /// Installs `exe` under `path`, returning the executable it displaced.
    /// Handles to the old one keep working for whoever holds them but are
    /// never handed out again.
    pub fn replace(&self, path: &str, exe: Executable) -> Option<Executable> {
        let key = canonicalize_path(path);
        let old = self.write().insert(key.clone(), exe);
        log::info!("{} {}", if old.is_some() { "reloaded" } else { "registered" }, key);
        old
    }

    /// Like [`Registry::replace`] but only for a path that is still open.
    /// A closed path stays closed and `exe` is dropped.
    pub fn refresh(&self, path: &str, exe: Executable) -> Result<Executable> {
        let key = canonicalize_path(path);
        let mut entries = self.write();
        match entries.get_mut(&key) {
            Some(slot) => {
                let old = std::mem::replace(slot, exe);
                log::info!("reloaded {}", key);
                Ok(old)
            }
            None => Err(Error::not_found(key)),
        }
    }

        /// Functions of `path` whose name matches `filter`, in address order.
    /// The pattern is checked before anything else is looked at.
    pub fn functions(&self, path: &str, filter: Option<&str>) -> Result<Vec<Function>> {
        let filter = filter
            .filter(|f| !f.is_empty())
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|source| Error::InvalidFilter { pattern: pattern.to_string(), source })
            })
            .transpose()?;
        let functions = self.get(path)?.functions()?;
        Ok(match filter {
            Some(re) => functions.into_iter().filter(|f| re.is_match(f.name())).collect(),
            None => functions,
        })
    }

    pub fn code(&self, path: &str, name: &str, options: &Options) -> Result<DecodedFunction> {
        let exe = self.get(path)?;
        exe.function(name)?.load(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_paths_are_not_found() {
        let registry = Registry::default();
        assert_eq!(registry.get("/no/such/file").unwrap_err().kind(), "notFound");
        assert_eq!(registry.remove("/no/such/file").unwrap_err().kind(), "notFound");
        assert_eq!(registry.reload("/no/such/file").unwrap_err().kind(), "notFound");
        assert!(registry.list().is_empty());
    }

    #[test]
    fn add_reports_load_errors_without_registering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text").unwrap();

        let err = Registry::default().add(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), "unsupportedFormat");
    }

    #[test]
    fn refresh_never_reopens_a_closed_path() {
        let path = "/nonexistent/asm-lens/refresh.wasm";
        let module = || {
            Executable::from_bytes(path, b"\0asm\x01\0\0\0".to_vec(), LoaderConfig::default())
                .unwrap()
        };
        let registry = Registry::default();
        assert_eq!(registry.refresh(path, module()).unwrap_err().kind(), "notFound");
        assert!(registry.list().is_empty());

        registry.replace(path, module());
        let fresh = module();
        let old = registry.refresh(path, fresh.clone()).unwrap();
        assert!(!old.ptr_eq(&fresh));
        assert!(registry.get(path).unwrap().ptr_eq(&fresh));

        registry.remove(path).unwrap();
        assert!(registry.refresh(path, module()).is_err());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn invalid_filter_is_reported_before_lookup() {
        let err = Registry::default().functions("/no/such/file", Some("(")).unwrap_err();
        assert_eq!(err.kind(), "invalidFilter");
    }
}
