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

//! Instruction decoding. Decoding is a pure function of the byte range: it
//! keeps no shared state and may run on any number of threads at once.

pub mod native;
pub mod wasm;

pub use native::Arch;
pub use wasm::WasmFunctions;

/// Text marker for bytes that could not be decoded.
pub const UNDECODABLE: &str = "(bad)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Sequential,
    Jump,
    ConditionalJump,
    Call,
    Return,
    /// Placeholder covering one undecodable byte.
    Invalid,
}

impl FlowKind {
    pub fn is_jump(self) -> bool {
        matches!(self, FlowKind::Jump | FlowKind::ConditionalJump)
    }
}

/// One decoded instruction before references are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInstruction {
    pub pc: u64,
    pub size: u64,
    pub text: String,
    pub kind: FlowKind,
    /// Direct branch or call target, when the encoding carries one.
    pub target: Option<u64>,
}

impl RawInstruction {
    pub fn undecodable(pc: u64, byte: u8) -> Self {
        Self {
            pc,
            size: 1,
            text: format!("{} 0x{:02x}", UNDECODABLE, byte),
            kind: FlowKind::Invalid,
            target: None,
        }
    }

    pub fn end(&self) -> u64 {
        self.pc + self.size
    }
}

/// Instruction set of a loaded executable.
#[derive(Debug, Clone)]
pub enum Isa {
    Native(Arch),
    Wasm(WasmFunctions),
}

/// Decodes `code`, which starts at address `start`, into instructions that
/// exactly cover `[start, start + code.len())`.
pub fn decode(isa: &Isa, code: &[u8], start: u64) -> Vec<RawInstruction> {
    match isa {
        Isa::Native(arch) => native::decode(*arch, code, start),
        Isa::Wasm(funcs) => wasm::decode(funcs, code, start),
    }
}

/// Shared loop: `step` decodes one instruction at the front of its slice or
/// returns `None`, in which case one byte is consumed as a placeholder.
pub(crate) fn decode_with<F>(code: &[u8], start: u64, mut step: F) -> Vec<RawInstruction>
where
    F: FnMut(&[u8], u64) -> Option<RawInstruction>,
{
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let pc = start + offset as u64;
        let rest = &code[offset..];
        let insn = step(rest, pc)
            .filter(|i| i.size > 0 && i.size as usize <= rest.len())
            .unwrap_or_else(|| RawInstruction::undecodable(pc, rest[0]));
        offset += insn.size as usize;
        out.push(insn);
    }
    out
}
