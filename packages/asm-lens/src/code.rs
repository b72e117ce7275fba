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

//! The per-function pipeline: decode, resolve references, lay out jump
//! arcs and gather source context.

use crate::arcs::{assign_lanes, JumpArc};
use crate::decoder::{self, FlowKind, Isa};
use crate::error::{Error, Result};
use crate::loader::Function;
use crate::options::Options;
use crate::references;
use crate::source_blocks::{self, FsSources, SourceFile, SourceLoader};

/// Intra-function branch: absolute target, index delta and display lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpRef {
    pub pc: u64,
    pub offset: i64,
    pub lane: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pc: u64,
    pub size: u64,
    pub text: String,
    pub kind: FlowKind,
    /// Empty when unknown.
    pub file: String,
    /// 1-based; 0 when unknown.
    pub line: u32,
    pub call: Option<String>,
    pub jump: Option<JumpRef>,
}

/// A function ready for side-by-side rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFunction {
    pub name: String,
    /// File of the first instruction with a known location.
    pub file: String,
    pub instructions: Vec<Instruction>,
    pub sources: Vec<SourceFile>,
    pub max_jump: usize,
    /// Referenced source files that could not be read.
    pub missing_sources: Vec<String>,
}

impl Function {
    pub fn load(&self, options: &Options) -> Result<DecodedFunction> {
        self.load_with(options, &FsSources)
    }

    pub fn load_with(
        &self,
        options: &Options,
        sources: &dyn SourceLoader,
    ) -> Result<DecodedFunction> {
        let exe = self.executable();
        if exe.is_closed() {
            return Err(Error::not_found(format!("{} has been closed", exe.path())));
        }
        let range = self.range();
        let bytes = exe.code_bytes(range.clone()).ok_or_else(|| {
            Error::not_found(format!(
                "no code bytes for {} [0x{:x}, 0x{:x})",
                self.name(),
                range.start,
                range.end
            ))
        })?;

        let isa = match exe.isa() {
            Isa::Native(arch) => Isa::Native(arch.for_function(self.symbol().thumb)),
            other => other.clone(),
        };
        let raw = decoder::decode(&isa, bytes, range.start);
        let refs = references::resolve(&raw, range.clone(), exe.symbols());

        let arcs: Vec<(usize, JumpArc)> = raw
            .iter()
            .zip(&refs)
            .enumerate()
            .filter_map(|(i, (insn, r))| r.jump.map(|j| (i, JumpArc::new(insn.pc, j.target_pc))))
            .collect();
        let layout = assign_lanes(&arcs.iter().map(|(_, a)| *a).collect::<Vec<_>>());
        let mut lanes = vec![0; raw.len()];
        for ((index, _), lane) in arcs.iter().zip(&layout.lanes) {
            lanes[*index] = *lane;
        }

        let lines = exe.line_table();
        let instructions: Vec<Instruction> = raw
            .into_iter()
            .zip(refs)
            .zip(lanes)
            .map(|((insn, r), lane)| {
                let (file, line) = lines
                    .lookup(insn.pc)
                    .map(|loc| (loc.file.to_string(), loc.line))
                    .unwrap_or_default();
                Instruction {
                    pc: insn.pc,
                    size: insn.size,
                    text: insn.text,
                    kind: insn.kind,
                    file,
                    line,
                    call: r.call,
                    jump: r.jump.map(|j| JumpRef { pc: j.target_pc, offset: j.offset, lane }),
                }
            })
            .collect();

        let file = instructions
            .iter()
            .find(|i| !i.file.is_empty())
            .map(|i| i.file.clone())
            .unwrap_or_default();
        // First-reference order already puts the primary file first.
        let layout_sources = source_blocks::build(&instructions, options.context_lines, sources);

        log::debug!(
            "decoded {}: {} instructions, {} arcs in {} lanes, {} source files",
            self.name(),
            instructions.len(),
            arcs.len(),
            layout.max_lanes,
            layout_sources.files.len()
        );
        Ok(DecodedFunction {
            name: self.name().to_string(),
            file,
            instructions,
            sources: layout_sources.files,
            max_jump: layout.max_lanes,
            missing_sources: layout_sources.missing,
        })
    }
}
