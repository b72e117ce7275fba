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

//! File watching with "latest result wins" delivery.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};

use crate::error::LoadError;
use crate::loader::Executable;
use crate::options::LoaderConfig;
use crate::registry::Registry;
use crate::utils::canonicalize_path;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct SlotState<T> {
    value: Option<T>,
    generation: u64,
    closed: bool,
}

/// Single-slot channel. A `put` overwrites whatever the consumer has not
/// taken yet, so a consumer never sees an older value after a newer one.
pub struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState { value: None, generation: 0, closed: false }),
            ready: Condvar::new(),
        }
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`, dropping any pending one. Returns its generation.
    pub fn put(&self, value: T) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        if state.value.replace(value).is_some() {
            log::debug!("discarding undelivered result before generation {}", state.generation);
        }
        self.ready.notify_all();
        state.generation
    }

    /// A value has been put and not yet taken.
    pub fn has_pending(&self) -> bool {
        self.lock().value.is_some()
    }

    pub fn take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Blocks until a value is available or the slot is closed.
    pub fn wait(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Some(value);
            }
            if state.closed {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.value.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.value.take()
    }

    /// Generation of the most recent `put`.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Wakes waiters; `wait` returns `None` once the slot is drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

pub type LoadResult = Result<Executable, LoadError>;

/// Keeps polling `path` and publishes every fresh load (or failure) into
/// [`FileWatch::results`]. Dropping it stops the poller.
pub struct FileWatch {
    path: String,
    results: Arc<LatestSlot<LoadResult>>,
    _watcher: PollWatcher,
}

impl FileWatch {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn results(&self) -> &Arc<LatestSlot<LoadResult>> {
        &self.results
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.results.close();
    }
}

/// Starts watching `path`. The initial load is published right away; a
/// failed load is published too and polling carries on.
pub fn spawn(path: &str, config: LoaderConfig, interval: Duration) -> notify::Result<FileWatch> {
    let path = canonicalize_path(path);
    let target = PathBuf::from(&path);
    let results: Arc<LatestSlot<LoadResult>> = Arc::new(LatestSlot::new());

    // The directory is watched so the file may vanish and reappear.
    let dir = target.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let slot = Arc::clone(&results);
    let file = target.clone();
    let handler = move |event: notify::Result<Event>| match event {
        Ok(event) => {
            let ours = event.paths.iter().any(|p| *p == file);
            if matches!(event.kind, EventKind::Access(_)) || !ours {
                return;
            }
            log::info!("{} changed ({:?}), reloading", file.display(), event.kind);
            let generation = slot.put(Executable::load(&file, config));
            log::debug!("published generation {}", generation);
        }
        Err(e) => log::warn!("watch error on {}: {}", file.display(), e),
    };
    let mut watcher = PollWatcher::new(
        handler,
        Config::default().with_poll_interval(interval).with_compare_contents(true),
    )?;
    // Published before polling starts so a change seen by the poller always
    // lands after it.
    results.put(Executable::load(&target, config));
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    Ok(FileWatch { path, results, _watcher: watcher })
}

/// Installs each successful load from `results` into `registry` under
/// `path` until the slot closes. The first success registers the file.
/// Once the client has closed the path, later loads are dropped and the
/// slot is closed.
pub fn forward(results: &LatestSlot<LoadResult>, registry: &Registry, path: &str) {
    let mut registered = false;
    while let Some(result) = results.wait() {
        let exe = match result {
            Ok(exe) => exe,
            Err(e) => {
                log::warn!("reload of {} failed: {}", path, e);
                continue;
            }
        };
        if !registered {
            registry.replace(path, exe);
            registered = true;
        } else if registry.refresh(path, exe).is_err() {
            log::info!("{} was closed, no longer tracking it", path);
            results.close();
            return;
        }
    }
}
