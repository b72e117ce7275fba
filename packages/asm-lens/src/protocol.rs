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

use serde::{Deserialize, Serialize};

use crate::code::{DecodedFunction, Instruction};
use crate::error::Error;
use crate::loader::Function;
use crate::source_blocks::{SourceBlock, SourceFile};

// Request and response types spoken with the editor front end. 64-bit
// addresses travel as "0x..." hex strings so JavaScript keeps full
// precision; everything else is a plain JSON number.

pub fn hex(addr: u64) -> String {
    format!("0x{:x}", addr)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct LoadRequest {
    pub req: String, // "load"
    pub seq: u64,
    pub file: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct LoadResponse {
    pub req: String,
    pub seq: u64,
    /// Normalized registry key for the file.
    pub file: String,
    pub functions: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct FilesRequest {
    pub req: String, // "files"
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct FilesResponse {
    pub req: String,
    pub seq: u64,
    pub files: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct CloseRequest {
    pub req: String, // "close"
    pub seq: u64,
    pub file: String,
}

/// Acknowledges requests that return no payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct AckResponse {
    pub req: String,
    pub seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct FunctionsRequest {
    pub req: String, // "functions"
    pub seq: u64,
    pub file: String,
    /// Regular expression matched against function names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct FunctionInfo {
    pub name: String,
    pub address: String,
    pub size: u32,
}

impl From<&Function> for FunctionInfo {
    fn from(f: &Function) -> Self {
        Self { name: f.name().to_string(), address: hex(f.address()), size: f.size() as u32 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct FunctionsResponse {
    pub req: String,
    pub seq: u64,
    pub functions: Vec<FunctionInfo>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct CodeRequest {
    pub req: String, // "code"
    pub seq: u64,
    pub file: String,
    pub name: String,
    /// Overrides the server's default context window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
#[serde(rename_all = "camelCase")]
pub struct WireInstruction {
    pub pc: String,
    pub text: String,
    /// Empty when unknown.
    pub file: String,
    /// 0 when unknown.
    pub line: u32,
    /// Intra-function jump target, "0x0" otherwise.
    pub ref_pc: String,
    pub ref_offset: i32,
    pub ref_stack: u32,
    /// Resolved callee, empty otherwise.
    pub call: String,
}

impl From<&Instruction> for WireInstruction {
    fn from(insn: &Instruction) -> Self {
        let (ref_pc, ref_offset, ref_stack) = match insn.jump {
            Some(j) => (j.pc, j.offset as i32, j.lane as u32),
            None => (0, 0, 0),
        };
        Self {
            pc: hex(insn.pc),
            text: insn.text.clone(),
            file: insn.file.clone(),
            line: insn.line,
            ref_pc: hex(ref_pc),
            ref_offset,
            ref_stack,
            call: insn.call.clone().unwrap_or_default(),
        }
    }
}

/// Half-open index range.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct LineRange {
    pub from: u32,
    pub to: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct WireBlock {
    pub from: u32,
    pub to: u32,
    pub lines: Vec<String>,
    pub related: Vec<Vec<LineRange>>,
}

impl From<&SourceBlock> for WireBlock {
    fn from(b: &SourceBlock) -> Self {
        Self {
            from: b.from,
            to: b.to,
            lines: b.lines.clone(),
            related: b
                .related
                .iter()
                .map(|runs| {
                    runs.iter()
                        .map(|r| LineRange { from: r.start as u32, to: r.end as u32 })
                        .collect()
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct WireSource {
    pub file: String,
    pub blocks: Vec<WireBlock>,
}

impl From<&SourceFile> for WireSource {
    fn from(s: &SourceFile) -> Self {
        Self { file: s.file.clone(), blocks: s.blocks.iter().map(WireBlock::from).collect() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
#[serde(rename_all = "camelCase")]
pub struct Code {
    pub name: String,
    pub file: String,
    pub instructions: Vec<WireInstruction>,
    pub sources: Vec<WireSource>,
    pub max_jump: u32,
    /// Referenced source files that could not be read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_sources: Vec<String>,
}

impl From<&DecodedFunction> for Code {
    fn from(code: &DecodedFunction) -> Self {
        Self {
            name: code.name.clone(),
            file: code.file.clone(),
            instructions: code.instructions.iter().map(WireInstruction::from).collect(),
            sources: code.sources.iter().map(WireSource::from).collect(),
            max_jump: code.max_jump as u32,
            missing_sources: code.missing_sources.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct CodeResponse {
    pub req: String,
    pub seq: u64,
    pub code: Code,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct WireError {
    /// Stable discriminant, e.g. "notFound" or "invalidFilter".
    pub kind: String,
    pub message: String,
}

impl From<&Error> for WireError {
    fn from(e: &Error) -> Self {
        Self { kind: e.kind().to_string(), message: e.to_string() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, ts_rs::TS)]
#[ts(export, export_to = "../../../shared/asm-lens/")]
pub struct ErrorResponse {
    pub req: String,
    pub seq: u64,
    pub error: WireError,
}
