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

//! Fixture builders shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

/// x86-64 functions laid out in one `.text`. Offsets are addresses.
pub struct Func {
    pub name: &'static str,
    pub offset: u64,
    pub code: &'static [u8],
}

pub const MAIN: Func = Func {
    name: "main",
    offset: 0x00,
    // push rbp; xor eax, eax; test edi, edi; je 0xc; call helper; pop rbp; ret
    code: &[0x55, 0x31, 0xc0, 0x85, 0xff, 0x74, 0x05, 0xe8, 0x04, 0x00, 0x00, 0x00, 0x5d, 0xc3],
};

pub const HELPER: Func = Func {
    name: "helper",
    offset: 0x10,
    // nop; (invalid in 64-bit mode); nop; ret
    code: &[0x90, 0x06, 0x90, 0xc3],
};

pub const CROSS: Func = Func {
    name: "cross",
    offset: 0x20,
    // je 0x25; jne 0x26; nop; nop; ret
    code: &[0x74, 0x03, 0x75, 0x02, 0x90, 0x90, 0xc3],
};

pub const SKIP: Func = Func {
    name: "skip",
    offset: 0x30,
    // je 0x33; nop; ret
    code: &[0x74, 0x01, 0x90, 0xc3],
};

pub const TAIL: Func = Func {
    name: "tail",
    offset: 0x40,
    // jmp helper
    code: &[0xe9, 0xcb, 0xff, 0xff, 0xff],
};

pub const ALL: [&Func; 5] = [&MAIN, &HELPER, &CROSS, &SKIP, &TAIL];

/// Line rows for `main`: (address, line). Ends at the end of `main`.
pub const MAIN_LINES: [(u64, u64); 5] = [(0x0, 3), (0x1, 4), (0x5, 5), (0x7, 6), (0xc, 8)];

/// Builds an ELF relocatable holding [`ALL`] and, when `comp_dir` is given,
/// a DWARF 4 line program placing `main` in `<comp_dir>/main.c`.
pub fn elf(comp_dir: Option<&str>) -> Vec<u8> {
    let mut text = vec![0xccu8; 0x48];
    for f in ALL {
        let at = f.offset as usize;
        text[at..at + f.code.len()].copy_from_slice(f.code);
    }

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let section = obj.section_id(StandardSection::Text);
    let base = obj.append_section_data(section, &text, 16);
    for f in ALL {
        obj.add_symbol(Symbol {
            name: f.name.as_bytes().to_vec(),
            value: base + f.offset,
            size: f.code.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(section),
            flags: SymbolFlags::None,
        });
    }

    if let Some(dir) = comp_dir {
        for (name, data) in [
            (".debug_abbrev", debug_abbrev()),
            (".debug_info", debug_info("main.c", dir, 8)),
            (".debug_line", debug_line("main.c", &MAIN_LINES, MAIN.code.len() as u64, 8)),
        ] {
            let id = obj.add_section(Vec::new(), name.as_bytes().to_vec(), SectionKind::Debug);
            obj.append_section_data(id, &data, 1);
        }
    }
    obj.write().expect("write ELF fixture")
}

fn uleb(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn debug_abbrev() -> Vec<u8> {
    vec![
        0x01, 0x11, 0x00, // 1: compile_unit, no children
        0x03, 0x08, // name: string
        0x1b, 0x08, // comp_dir: string
        0x10, 0x17, // stmt_list: sec_offset
        0x11, 0x01, // low_pc: addr
        0x00, 0x00, 0x00,
    ]
}

fn addr(out: &mut Vec<u8>, value: u64, size: u8) {
    out.extend_from_slice(&value.to_le_bytes()[..size as usize]);
}

fn debug_info(name: &str, comp_dir: &str, addr_size: u8) -> Vec<u8> {
    let mut die = vec![0x01];
    die.extend_from_slice(name.as_bytes());
    die.push(0);
    die.extend_from_slice(comp_dir.as_bytes());
    die.push(0);
    die.extend_from_slice(&0u32.to_le_bytes());
    addr(&mut die, 0, addr_size);

    let mut out = Vec::new();
    out.extend_from_slice(&((2 + 4 + 1 + die.len()) as u32).to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.push(addr_size);
    out.extend_from_slice(&die);
    out
}

/// One sequence covering `rows` (address, line) and ending at `end`.
fn debug_line(file: &str, rows: &[(u64, u64)], end: u64, addr_size: u8) -> Vec<u8> {
    let mut header = vec![1, 1, 1, (-5i8) as u8, 14, 13];
    header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    header.push(0); // no include directories
    header.extend_from_slice(file.as_bytes());
    header.extend_from_slice(&[0, 0, 0, 0]);
    header.push(0);

    let (mut at, mut line) = (rows[0].0, 1u64);
    let mut program = vec![0x00, 1 + addr_size, 0x02];
    addr(&mut program, at, addr_size);
    for &(row_addr, row_line) in rows {
        if row_addr > at {
            program.push(0x02); // advance_pc
            uleb(&mut program, row_addr - at);
        }
        program.push(0x03); // advance_line (small positive deltas only)
        program.push((row_line - line) as u8);
        program.push(0x01); // copy
        at = row_addr;
        line = row_line;
    }
    program.push(0x02);
    uleb(&mut program, end - at);
    program.extend_from_slice(&[0x00, 0x01, 0x01]); // end_sequence

    let mut out = Vec::new();
    out.extend_from_slice(&((2 + 4 + header.len() + program.len()) as u32).to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&program);
    out
}

/// Ten numbered lines, `line N` each.
pub fn write_main_c(dir: &Path) -> PathBuf {
    let path = dir.join("main.c");
    let text: String = (1..=10).map(|i| format!("line {}\n", i)).collect();
    std::fs::write(&path, text).expect("write main.c");
    path
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path.to_str().expect("utf-8 temp path").to_string()
}

/// Compilation directory recorded in the wasm module's DWARF.
pub const WASM_COMP_DIR: &str = "/wasm-src";

/// WebAssembly module: one imported function, `looper` (named through the
/// name section) and `run` (named through its export). `looper` carries a
/// DWARF line table in `looper.c`: lines 2, 3 and 5.
pub struct WasmModule {
    pub bytes: Vec<u8>,
    /// File offset of `looper`'s first operator.
    pub looper: u64,
    /// File offset of `run`'s first operator.
    pub run: u64,
}

fn section(out: &mut Vec<u8>, id: u8, payload: &[u8]) -> usize {
    out.push(id);
    uleb(out, payload.len() as u64);
    let start = out.len();
    out.extend_from_slice(payload);
    start
}

pub fn wasm() -> WasmModule {
    let mut m = b"\0asm\x01\0\0\0".to_vec();
    section(&mut m, 1, &[0x01, 0x60, 0x00, 0x00]);
    section(&mut m, 2, &[0x01, 0x03, b'e', b'n', b'v', 0x03, b'e', b'x', b't', 0x00, 0x00]);
    section(&mut m, 3, &[0x02, 0x00, 0x00]);
    section(&mut m, 7, &[0x01, 0x03, b'r', b'u', b'n', 0x00, 0x02]);

    // looper: block; loop; br_if 1; br 0; end; end; call 0; end
    let looper = [0x00, 0x02, 0x40, 0x03, 0x40, 0x0d, 0x01, 0x0c, 0x00, 0x0b, 0x0b, 0x10, 0x00, 0x0b];
    // run: call 1; end
    let run = [0x00, 0x10, 0x01, 0x0b];
    let mut code = vec![0x02, looper.len() as u8];
    code.extend_from_slice(&looper);
    code.push(run.len() as u8);
    code.extend_from_slice(&run);
    let start = section(&mut m, 10, &code) as u64;

    let mut names = vec![0x04, b'n', b'a', b'm', b'e'];
    let mut funcs = vec![0x01, 0x01, 0x06];
    funcs.extend_from_slice(b"looper");
    names.push(0x01);
    names.push(funcs.len() as u8);
    names.extend_from_slice(&funcs);
    section(&mut m, 0, &names);

    // DWARF addresses are offsets into the code section payload.
    let body = 3u64;
    let rows = [(body, 2), (body + 4, 3), (body + 10, 5)];
    for (name, data) in [
        (".debug_abbrev", debug_abbrev()),
        (".debug_info", debug_info("looper.c", WASM_COMP_DIR, 4)),
        (".debug_line", debug_line("looper.c", &rows, body + 13, 4)),
    ] {
        let mut payload = vec![name.len() as u8];
        payload.extend_from_slice(name.as_bytes());
        payload.extend_from_slice(&data);
        section(&mut m, 0, &payload);
    }

    // count, size, local decl count
    let looper_ops = start + 3;
    let run_ops = start + 2 + looper.len() as u64 + 2;
    WasmModule { bytes: m, looper: looper_ops, run: run_ops }
}
