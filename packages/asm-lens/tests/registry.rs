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

//! Registry lifecycle and the request loop driven over framed messages.

mod common;

use std::io::Cursor;
use std::sync::Arc;

use asm_lens::request_handler::{serve, Service};
use asm_lens::transport::{FramedTransport, Transport};
use asm_lens::utils::canonicalize_path;
use asm_lens::{Options, Registry};
use serde_json::{json, Value};

fn workspace() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let comp_dir = dir.path().to_str().unwrap().to_string();
    common::write_main_c(dir.path());
    let path = common::write(dir.path(), "prog.o", &common::elf(Some(&comp_dir)));
    (dir, path)
}

fn names(registry: &Registry, path: &str, filter: Option<&str>) -> Vec<String> {
    registry.functions(path, filter).unwrap().iter().map(|f| f.name().to_string()).collect()
}

#[test]
fn adding_twice_returns_the_same_executable() {
    let (_dir, path) = workspace();
    let registry = Registry::default();
    let first = registry.add(&path).unwrap();
    let second = registry.add(&path).unwrap();
    assert_eq!(first.function("main").unwrap(), second.function("main").unwrap());
    assert_eq!(registry.list(), [canonicalize_path(&path)]);
}

#[test]
fn filters_are_regular_expressions() {
    let (_dir, path) = workspace();
    let registry = Registry::default();
    registry.add(&path).unwrap();
    assert_eq!(names(&registry, &path, Some("^(main|tail)$")), ["main", "tail"]);
    assert_eq!(names(&registry, &path, Some("")).len(), 5);
    assert!(names(&registry, &path, Some("zzz")).is_empty());
}

#[test]
fn bad_filter_leaves_the_registry_untouched() {
    let (_dir, path) = workspace();
    let registry = Registry::default();
    registry.add(&path).unwrap();
    let before = names(&registry, &path, None);

    let err = registry.functions(&path, Some("[")).unwrap_err();
    assert_eq!(err.kind(), "invalidFilter");
    assert_eq!(names(&registry, &path, None), before);
}

#[test]
fn concurrent_requests_see_stable_results_while_files_come_and_go() {
    let (dir, path) = workspace();
    let other = common::write(dir.path(), "other.o", &common::elf(None));
    let registry = Registry::default();
    let exe = registry.add(&path).unwrap();
    let options = Options::with_context(1);
    let baseline: Vec<_> = ["main", "cross", "skip"]
        .iter()
        .map(|name| (*name, registry.code(&path, name, &options).unwrap()))
        .collect();
    let main = exe.function("main").unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..25 {
                    for (name, expected) in &baseline {
                        assert_eq!(&registry.code(&path, name, &options).unwrap(), expected);
                    }
                    assert_eq!(main.load(&options).unwrap(), baseline[0].1);
                }
            });
        }
        s.spawn(|| {
            for _ in 0..25 {
                registry.add(&other).unwrap();
                assert_eq!(names(&registry, &other, Some("^main$")), ["main"]);
                registry.remove(&other).unwrap();
            }
        });
    });
    assert_eq!(registry.list(), [canonicalize_path(&path)]);
}

#[test]
fn removed_files_are_gone_for_old_handles_too() {
    let (_dir, path) = workspace();
    let registry = Registry::default();
    let exe = registry.add(&path).unwrap();
    let main = exe.function("main").unwrap();

    registry.remove(&path).unwrap();
    assert!(registry.list().is_empty());
    assert_eq!(registry.functions(&path, None).unwrap_err().kind(), "notFound");
    assert_eq!(registry.code(&path, "main", &Options::default()).unwrap_err().kind(), "notFound");
    assert_eq!(main.load(&Options::default()).unwrap_err().kind(), "notFound");
    assert_eq!(registry.remove(&path).unwrap_err().kind(), "notFound");
}

#[test]
fn reload_swaps_in_a_fresh_executable() {
    let (_dir, path) = workspace();
    let registry = Registry::default();
    let old = registry.add(&path).unwrap();
    let fresh = registry.reload(&path).unwrap();

    let current = registry.get(&path).unwrap();
    assert_eq!(current.function("main").unwrap(), fresh.function("main").unwrap());
    assert_ne!(current.function("main").unwrap(), old.function("main").unwrap());
    // The displaced executable still answers for whoever holds it.
    assert!(!old.is_closed());
    assert_eq!(old.functions().unwrap().len(), 5);
}

#[test]
fn failed_reload_keeps_the_previous_executable() {
    let (dir, path) = workspace();
    let registry = Registry::default();
    registry.add(&path).unwrap();
    std::fs::write(dir.path().join("prog.o"), b"garbage").unwrap();

    assert_eq!(registry.reload(&path).unwrap_err().kind(), "unsupportedFormat");
    assert_eq!(names(&registry, &path, Some("^main$")), ["main"]);
}

#[test]
fn code_uses_the_caller_context() {
    let (_dir, path) = workspace();
    let registry = Registry::default();
    registry.add(&path).unwrap();
    let code = registry.code(&path, "main", &Options::with_context(1)).unwrap();
    assert_eq!((code.sources[0].blocks[0].from, code.sources[0].blocks[0].to), (2, 10));
}

fn frame(messages: &[Value]) -> Vec<u8> {
    let mut out = FramedTransport::new(Cursor::new(Vec::new()), Vec::new());
    for m in messages {
        out.write_message(m).unwrap();
    }
    out.into_parts().1
}

fn replies(bytes: Vec<u8>) -> Vec<Value> {
    let mut input = FramedTransport::new(Cursor::new(bytes), Vec::new());
    let mut all = Vec::new();
    while let Some(v) = input.read_message().unwrap() {
        all.push(v);
    }
    all
}

#[test]
fn request_loop_answers_every_message_in_order() {
    let (_dir, path) = workspace();
    let key = canonicalize_path(&path);
    let input = frame(&[
        json!({"req": "load", "seq": 1, "file": path}),
        json!({"req": "files", "seq": 2}),
        json!({"req": "functions", "seq": 3, "file": path, "filter": "^s"}),
        json!({"req": "code", "seq": 4, "file": path, "name": "main", "context": 1}),
        json!({"req": "code", "seq": 5, "file": path, "name": "nope"}),
        json!({"req": "close", "seq": 6, "file": path}),
        json!({"req": "functions", "seq": 7, "file": path}),
    ]);

    let service = Service::new(Arc::new(Registry::default()), Options::default());
    let mut transport = FramedTransport::new(Cursor::new(input), Vec::new());
    serve(&service, &mut transport).unwrap();
    let out = replies(transport.into_parts().1);

    assert_eq!(out.len(), 7);
    let seqs: Vec<u64> = out.iter().map(|r| r["seq"].as_u64().unwrap()).collect();
    assert_eq!(seqs, [1, 2, 3, 4, 5, 6, 7]);

    assert_eq!(out[0], json!({"req": "load", "seq": 1, "file": key, "functions": 5}));
    assert_eq!(out[1]["files"], json!([key]));
    assert_eq!(
        out[2]["functions"],
        json!([{"name": "skip", "address": "0x30", "size": 4}])
    );

    let code = &out[3]["code"];
    assert_eq!(code["name"], "main");
    assert_eq!(code["maxJump"], 1);
    assert_eq!(code["instructions"][3]["pc"], "0x5");
    assert_eq!(code["instructions"][3]["refPc"], "0xc");
    assert_eq!(code["instructions"][3]["refOffset"], 2);
    assert_eq!(code["instructions"][4]["call"], "helper");
    assert_eq!(code["instructions"][0]["refPc"], "0x0");
    assert_eq!(code["sources"][0]["blocks"][0]["from"], 2);
    assert_eq!(code["sources"][0]["blocks"][0]["to"], 10);
    assert_eq!(code["sources"][0]["blocks"][0]["related"][2], json!([{"from": 1, "to": 3}]));

    assert_eq!(out[4]["error"]["kind"], "notFound");
    assert_eq!(out[5], json!({"req": "close", "seq": 6}));
    assert_eq!(out[6]["error"]["kind"], "notFound");
    assert!(service.registry().list().is_empty());
}
