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

use std::fmt::Write as _;

use wasmparser::{BinaryReader, Operator};

use super::{FlowKind, RawInstruction};

/// Function index space of a module, used to turn `call N` into an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WasmFunctions {
    /// Number of imported functions; they occupy the first indices.
    pub imported: u32,
    /// Address of the first operator of each defined function.
    pub bodies: Vec<u64>,
}

impl WasmFunctions {
    pub fn address_of(&self, function_index: u32) -> Option<u64> {
        let defined = function_index.checked_sub(self.imported)?;
        self.bodies.get(defined as usize).copied()
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Open { is_loop: bool },
    End,
    Branch { depth: u32 },
    Other,
}

struct Decoded {
    insn: RawInstruction,
    control: Control,
}

struct Frame {
    start: usize,
    is_loop: bool,
    pending: Vec<usize>,
}

/// Decodes one function body (operators only, locals excluded). Branch
/// targets are resolved structurally: a branch to a `block` or `if` lands on
/// its `end`, a branch to a `loop` lands on the `loop` itself.
pub fn decode(funcs: &WasmFunctions, code: &[u8], start: u64) -> Vec<RawInstruction> {
    let mut decoded = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let pc = start + offset as u64;
        let item = decode_one(funcs, &code[offset..], pc).unwrap_or_else(|| Decoded {
            insn: RawInstruction::undecodable(pc, code[offset]),
            control: Control::Other,
        });
        offset += item.insn.size as usize;
        decoded.push(item);
    }
    resolve_branches(&mut decoded);
    decoded.into_iter().map(|d| d.insn).collect()
}

fn decode_one(funcs: &WasmFunctions, code: &[u8], pc: u64) -> Option<Decoded> {
    let mut reader = BinaryReader::new(code, pc as usize);
    let op = reader.read_operator().ok()?;
    let size = (reader.original_position() as u64).checked_sub(pc)?;
    if size == 0 || size as usize > code.len() {
        return None;
    }
    let (kind, target, control) = match &op {
        Operator::Block { .. }
        | Operator::If { .. }
        | Operator::Try { .. }
        | Operator::TryTable { .. } => {
            (FlowKind::Sequential, None, Control::Open { is_loop: false })
        }
        Operator::Loop { .. } => (FlowKind::Sequential, None, Control::Open { is_loop: true }),
        Operator::End | Operator::Delegate { .. } => (FlowKind::Sequential, None, Control::End),
        Operator::Br { relative_depth } => (
            FlowKind::Jump,
            None,
            Control::Branch { depth: *relative_depth },
        ),
        Operator::BrIf { relative_depth }
        | Operator::BrOnNull { relative_depth }
        | Operator::BrOnNonNull { relative_depth }
        | Operator::BrOnCast { relative_depth, .. }
        | Operator::BrOnCastFail { relative_depth, .. } => (
            FlowKind::ConditionalJump,
            None,
            Control::Branch { depth: *relative_depth },
        ),
        Operator::BrTable { targets } => (
            FlowKind::ConditionalJump,
            None,
            Control::Branch { depth: targets.default() },
        ),
        Operator::Return => (FlowKind::Return, None, Control::Other),
        Operator::Call { function_index } => {
            (FlowKind::Call, funcs.address_of(*function_index), Control::Other)
        }
        Operator::ReturnCall { function_index } => {
            (FlowKind::Jump, funcs.address_of(*function_index), Control::Other)
        }
        Operator::CallIndirect { .. } | Operator::CallRef { .. } => {
            (FlowKind::Call, None, Control::Other)
        }
        Operator::ReturnCallIndirect { .. } | Operator::ReturnCallRef { .. } => {
            (FlowKind::Jump, None, Control::Other)
        }
        _ => (FlowKind::Sequential, None, Control::Other),
    };
    Some(Decoded {
        insn: RawInstruction { pc, size, text: operator_text(&op), kind, target },
        control,
    })
}

fn resolve_branches(decoded: &mut [Decoded]) {
    // The function body itself is the outermost block.
    let mut stack = vec![Frame { start: 0, is_loop: false, pending: Vec::new() }];
    for i in 0..decoded.len() {
        match decoded[i].control {
            Control::Open { is_loop } => {
                stack.push(Frame { start: i, is_loop, pending: Vec::new() })
            }
            Control::End => {
                if let Some(frame) = stack.pop() {
                    let end_pc = decoded[i].insn.pc;
                    for branch in frame.pending {
                        decoded[branch].insn.target = Some(end_pc);
                    }
                }
            }
            Control::Branch { depth } => {
                let Some(level) = stack.len().checked_sub(1 + depth as usize) else {
                    continue;
                };
                let frame = &mut stack[level];
                if frame.is_loop {
                    decoded[i].insn.target = Some(decoded[frame.start].insn.pc);
                } else {
                    frame.pending.push(i);
                }
            }
            Control::Other => {}
        }
    }
}

/// Renders an operator in the WebAssembly text format's flat syntax.
fn operator_text(op: &Operator) -> String {
    match op {
        Operator::Block { .. } => "block".into(),
        Operator::Loop { .. } => "loop".into(),
        Operator::If { .. } => "if".into(),
        Operator::Br { relative_depth } => format!("br {}", relative_depth),
        Operator::BrIf { relative_depth } => format!("br_if {}", relative_depth),
        Operator::BrTable { targets } => {
            let mut text = String::from("br_table");
            for depth in targets.targets().flatten() {
                let _ = write!(text, " {}", depth);
            }
            let _ = write!(text, " {}", targets.default());
            text
        }
        Operator::Call { function_index } => format!("call {}", function_index),
        Operator::ReturnCall { function_index } => format!("return_call {}", function_index),
        Operator::CallIndirect { type_index, .. } => format!("call_indirect (type {})", type_index),
        Operator::LocalGet { local_index } => format!("local.get {}", local_index),
        Operator::LocalSet { local_index } => format!("local.set {}", local_index),
        Operator::LocalTee { local_index } => format!("local.tee {}", local_index),
        Operator::GlobalGet { global_index } => format!("global.get {}", global_index),
        Operator::GlobalSet { global_index } => format!("global.set {}", global_index),
        Operator::I32Const { value } => format!("i32.const {}", value),
        Operator::I64Const { value } => format!("i64.const {}", value),
        Operator::F32Const { value } => format!("f32.const {}", f32::from_bits(value.bits())),
        Operator::F64Const { value } => format!("f64.const {}", f64::from_bits(value.bits())),
        other => generic_text(other),
    }
}

/// Falls back to the operator's Debug form: `I32Load { memarg: .. }` becomes
/// `i32.load offset=N`, scalar fields become trailing immediates.
fn generic_text(op: &Operator) -> String {
    let debug = format!("{:?}", op);
    let (name, fields) = match debug.find(" {") {
        Some(i) => (&debug[..i], &debug[i + 2..]),
        None => (debug.as_str(), ""),
    };
    let mut text = wat_name(name);
    if fields.contains("memarg") {
        if let Some(offset) = field_value(fields, "offset").filter(|v| *v != "0") {
            let _ = write!(text, " offset={}", offset);
        }
    } else if !fields.contains('{') && !fields.contains('[') {
        let fields = fields.trim_end_matches('}').trim();
        for field in fields.split(", ").filter(|f| !f.is_empty()) {
            if let Some((_, value)) = field.split_once(": ") {
                text.push(' ');
                text.push_str(value);
            }
        }
    }
    text
}

fn field_value<'a>(fields: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("{}: ", key);
    let rest = &fields[fields.find(&pattern)? + pattern.len()..];
    let end = rest.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(rest.len());
    Some(&rest[..end])
}

const NAMESPACES: [&str; 14] = [
    "i32", "i64", "f32", "f64", "v128", "i8x16", "i16x8", "i32x4", "i64x2", "f32x4", "f64x2",
    "local", "global", "memory",
];

/// `I32TruncSatF64U` -> `i32.trunc_sat_f64_u`, `MemoryGrow` -> `memory.grow`.
fn wat_name(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut prev: Option<char> = None;
    for c in name.chars() {
        let boundary = c.is_ascii_uppercase()
            && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
        if boundary || words.is_empty() {
            words.push(String::new());
        }
        if let Some(word) = words.last_mut() {
            word.push(c.to_ascii_lowercase());
        }
        prev = Some(c);
    }
    match words.split_first() {
        Some((head, rest))
            if !rest.is_empty()
                && (NAMESPACES.contains(&head.as_str())
                    || matches!(head.as_str(), "table" | "ref" | "data" | "elem")) =>
        {
            format!("{}.{}", head, rest.join("_"))
        }
        _ => words.join("_"),
    }
}
