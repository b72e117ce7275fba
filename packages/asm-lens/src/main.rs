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

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use asm_lens::options::{LoaderConfig, Options, DEFAULT_CONTEXT_LINES};
use asm_lens::registry::Registry;
use asm_lens::request_handler::{serve, Service};
use asm_lens::{transport, watch};
use clap::Parser;
use flexi_logger::Logger;

/// Serves disassembly correlated with source over stdio.
#[derive(Parser, Debug)]
#[command(name = "asm-lens", version, about)]
struct Config {
    /// Executable or WebAssembly module to open at startup
    path: Option<String>,

    /// Source lines shown around each referenced line
    #[arg(short = 'c', long = "context", default_value_t = DEFAULT_CONTEXT_LINES)]
    context: usize,

    /// Reload the startup file whenever it changes
    #[arg(short = 'w', long = "watch", default_value_t = false, requires = "path")]
    watch: bool,

    /// Poll interval for --watch, in milliseconds
    #[arg(long = "poll-ms", default_value_t = 500)]
    poll_ms: u64,

    /// Treat WebAssembly modules as unsupported
    #[arg(long = "no-wasm", default_value_t = false)]
    no_wasm: bool,

    /// Log filter, e.g. "info" or "asm_lens=debug"
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let config = Config::parse();
    // stdout carries protocol frames, so logs go to stderr
    let _logger = Logger::try_with_str(&config.log_level)?.log_to_stderr().start()?;

    let registry = Arc::new(Registry::new(LoaderConfig { wasm: !config.no_wasm }));
    let _watch = match &config.path {
        Some(path) if config.watch => {
            let watch = watch::spawn(path, registry.config(), Duration::from_millis(config.poll_ms))
                .with_context(|| format!("watching {}", path))?;
            let results = Arc::clone(watch.results());
            let key = watch.path().to_string();
            let registry = Arc::clone(&registry);
            thread::spawn(move || watch::forward(&results, &registry, &key));
            Some(watch)
        }
        Some(path) => {
            registry.add(path).with_context(|| format!("loading {}", path))?;
            None
        }
        None => None,
    };

    let service = Service::new(registry, Options::with_context(config.context));
    let mut transport = transport::stdio();
    serve(&service, &mut transport)?;
    Ok(())
}
