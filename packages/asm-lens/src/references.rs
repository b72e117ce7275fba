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

//! Turns raw branch/call targets into symbol names and intra-function
//! instruction offsets.

use std::ops::Range;

use crate::decoder::{FlowKind, RawInstruction};
use crate::symbols::SymbolTable;

/// A branch that stays inside its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalJump {
    pub target_pc: u64,
    /// Index of the instruction the target falls in.
    pub target_index: usize,
    /// `target_index - source_index`.
    pub offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    /// Callee (or tail-call target) name.
    pub call: Option<String>,
    pub jump: Option<LocalJump>,
}

/// Resolves every instruction of one function. `function` is the address
/// range the instructions cover.
pub fn resolve(
    instructions: &[RawInstruction],
    function: Range<u64>,
    symbols: &SymbolTable,
) -> Vec<Reference> {
    instructions
        .iter()
        .enumerate()
        .map(|(index, insn)| {
            let Some(target) = insn.target else {
                return Reference::default();
            };
            match insn.kind {
                FlowKind::Call => Reference { call: callee(symbols, target), jump: None },
                FlowKind::Jump | FlowKind::ConditionalJump if function.contains(&target) => {
                    let target_index = instructions
                        .partition_point(|i| i.pc <= target)
                        .saturating_sub(1);
                    Reference {
                        call: None,
                        jump: Some(LocalJump {
                            target_pc: target,
                            target_index,
                            offset: target_index as i64 - index as i64,
                        }),
                    }
                }
                // Leaving the function through a jump is a tail call.
                FlowKind::Jump | FlowKind::ConditionalJump => {
                    Reference { call: callee(symbols, target), jump: None }
                }
                _ => Reference::default(),
            }
        })
        .collect()
}

fn callee(symbols: &SymbolTable, target: u64) -> Option<String> {
    symbols.resolve(target).map(|s| s.name.clone())
}
