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

use capstone::arch::{self, ArchOperand};
use capstone::prelude::*;
use capstone::{InsnDetail, InsnGroupId, InsnGroupType};

use super::{decode_with, FlowKind, RawInstruction};

/// Native instruction sets handled through capstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
    Arm,
    Thumb,
    RiscV32,
    RiscV64,
}

impl Arch {
    pub fn from_object(arch: object::Architecture) -> Option<Self> {
        use object::Architecture as A;
        Some(match arch {
            A::I386 => Arch::X86,
            A::X86_64 | A::X86_64_X32 => Arch::X86_64,
            A::Aarch64 => Arch::Aarch64,
            A::Arm => Arch::Arm,
            A::Riscv32 => Arch::RiscV32,
            A::Riscv64 => Arch::RiscV64,
            _ => return None,
        })
    }

    /// ARM functions whose symbol address has the low bit set are Thumb code.
    pub fn for_function(self, thumb: bool) -> Self {
        match self {
            Arch::Arm if thumb => Arch::Thumb,
            other => other,
        }
    }

    fn is_conditional(self, mnemonic: &str) -> bool {
        let m = mnemonic.to_ascii_lowercase();
        match self {
            Arch::X86 | Arch::X86_64 => {
                (m.starts_with('j') && m != "jmp") || m.starts_with("loop")
            }
            Arch::Aarch64 => {
                m.starts_with("b.") || matches!(m.as_str(), "cbz" | "cbnz" | "tbz" | "tbnz")
            }
            Arch::Arm | Arch::Thumb => {
                const CONDS: [&str; 14] = [
                    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge",
                    "lt",
                ];
                let base = m.split('.').next().unwrap_or("");
                matches!(base, "cbz" | "cbnz")
                    || (base.len() == 3 && base.starts_with('b') && CONDS.contains(&&base[1..]))
                    || matches!(base, "bgt" | "ble")
            }
            Arch::RiscV32 | Arch::RiscV64 => m.starts_with('b'),
        }
    }
}

pub struct Disassembler {
    cs: Capstone,
    arch: Arch,
}

impl Disassembler {
    pub fn new(arch: Arch) -> Result<Self, capstone::Error> {
        let cs = match arch {
            Arch::X86_64 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .detail(true)
                .build()?,
            Arch::X86 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode32)
                .detail(true)
                .build()?,
            Arch::Aarch64 => Capstone::new()
                .arm64()
                .mode(arch::arm64::ArchMode::Arm)
                .detail(true)
                .build()?,
            Arch::Arm => Capstone::new()
                .arm()
                .mode(arch::arm::ArchMode::Arm)
                .detail(true)
                .build()?,
            Arch::Thumb => Capstone::new()
                .arm()
                .mode(arch::arm::ArchMode::Thumb)
                .detail(true)
                .build()?,
            Arch::RiscV32 => Capstone::new()
                .riscv()
                .mode(arch::riscv::ArchMode::RiscV32)
                .extra_mode([arch::riscv::ArchExtraMode::RiscVC].iter().copied())
                .detail(true)
                .build()?,
            Arch::RiscV64 => Capstone::new()
                .riscv()
                .mode(arch::riscv::ArchMode::RiscV64)
                .extra_mode([arch::riscv::ArchExtraMode::RiscVC].iter().copied())
                .detail(true)
                .build()?,
        };
        Ok(Self { cs, arch })
    }

    /// Decodes the single instruction at the front of `code`.
    pub fn decode_one(&self, code: &[u8], pc: u64) -> Option<RawInstruction> {
        let insns = self.cs.disasm_count(code, pc, 1).ok()?;
        let insn = insns.iter().next()?;
        let mnemonic = insn.mnemonic().unwrap_or("");
        let text = match insn.op_str() {
            Some(ops) if !ops.is_empty() => format!("{} {}", mnemonic, ops),
            _ => mnemonic.to_string(),
        };
        let ops = insn.op_str().unwrap_or("");
        let (kind, target) = match self.cs.insn_detail(insn) {
            Ok(detail) => self.classify(mnemonic, ops, &detail, pc),
            Err(_) => (FlowKind::Sequential, None),
        };
        Some(RawInstruction { pc, size: insn.bytes().len() as u64, text, kind, target })
    }

    pub fn decode_range(&self, code: &[u8], start: u64) -> Vec<RawInstruction> {
        decode_with(code, start, |rest, pc| self.decode_one(rest, pc))
    }

    fn classify(
        &self,
        mnemonic: &str,
        ops: &str,
        detail: &InsnDetail,
        pc: u64,
    ) -> (FlowKind, Option<u64>) {
        if let Arch::RiscV32 | Arch::RiscV64 = self.arch {
            return classify_riscv(mnemonic, ops, detail, pc);
        }
        let kind = if self.is_arm_return(mnemonic, ops)
            || in_group(detail, InsnGroupType::CS_GRP_RET as u8)
            || in_group(detail, InsnGroupType::CS_GRP_IRET as u8)
        {
            FlowKind::Return
        } else if in_group(detail, InsnGroupType::CS_GRP_CALL as u8)
            || self.is_arm_call(mnemonic)
        {
            FlowKind::Call
        } else if in_group(detail, InsnGroupType::CS_GRP_JUMP as u8) {
            if self.arch.is_conditional(mnemonic) {
                FlowKind::ConditionalJump
            } else {
                FlowKind::Jump
            }
        } else {
            return (FlowKind::Sequential, None);
        };
        let target = match kind {
            FlowKind::Call | FlowKind::Jump | FlowKind::ConditionalJump => immediate_target(detail),
            _ => None,
        };
        (kind, target)
    }

    /// `bx lr`, `mov pc, lr`, `ldr pc, ...` and `pop`/`ldm` loading pc.
    fn is_arm_return(&self, mnemonic: &str, ops: &str) -> bool {
        if !matches!(self.arch, Arch::Arm | Arch::Thumb) {
            return false;
        }
        let m = base_mnemonic(mnemonic);
        let ops = ops.to_ascii_lowercase();
        match m.as_str() {
            "bx" => ops.trim() == "lr",
            "mov" => ops.replace(' ', "") == "pc,lr",
            "ldr" => ops.trim_start().starts_with("pc,"),
            "pop" => register_list_has_pc(&ops),
            m if m.starts_with("ldm") => register_list_has_pc(&ops),
            _ => false,
        }
    }

    fn is_arm_call(&self, mnemonic: &str) -> bool {
        matches!(self.arch, Arch::Arm | Arch::Thumb)
            && matches!(base_mnemonic(mnemonic).as_str(), "bl" | "blx")
    }
}

/// Lowercased mnemonic without a `.w`/`.n` width suffix.
fn base_mnemonic(mnemonic: &str) -> String {
    mnemonic.split('.').next().unwrap_or("").to_ascii_lowercase()
}

fn register_list_has_pc(ops: &str) -> bool {
    let Some(start) = ops.find('{') else {
        return false;
    };
    let end = ops[start..].find('}').map_or(ops.len(), |e| start + e);
    ops[start + 1..end].split(',').any(|reg| reg.trim() == "pc")
}

const RISCV_BRANCHES: [&str; 16] = [
    "beq", "bne", "blt", "bge", "bltu", "bgeu", "beqz", "bnez", "blez", "bgez", "bltz", "bgtz",
    "bgt", "ble", "bgtu", "bleu",
];

/// Capstone leaves most RISC-V control flow out of the generic groups, so
/// the kind comes from the mnemonic and the link register. Direct targets
/// are pc-relative immediates.
fn classify_riscv(
    mnemonic: &str,
    ops: &str,
    detail: &InsnDetail,
    pc: u64,
) -> (FlowKind, Option<u64>) {
    let m = mnemonic.to_ascii_lowercase();
    let regs: Vec<&str> = ops.split(',').map(str::trim).filter(|r| !r.is_empty()).collect();
    let direct = |kind: FlowKind| (kind, riscv_target(detail, ops, pc));
    match m.as_str() {
        "ret" => (FlowKind::Return, None),
        "jr" if regs.first() == Some(&"ra") => (FlowKind::Return, None),
        "jr" => (FlowKind::Jump, None),
        "jalr" => match regs.as_slice() {
            [_] => (FlowKind::Call, None),
            ["zero", rest @ ..] if rest.iter().any(|r| *r == "ra" || r.contains("(ra)")) => {
                (FlowKind::Return, None)
            }
            ["zero", ..] => (FlowKind::Jump, None),
            _ => (FlowKind::Call, None),
        },
        "jal" if regs.first() == Some(&"zero") => direct(FlowKind::Jump),
        "jal" | "call" => direct(FlowKind::Call),
        "j" | "tail" => direct(FlowKind::Jump),
        m if RISCV_BRANCHES.contains(&m) => direct(FlowKind::ConditionalJump),
        _ => (FlowKind::Sequential, None),
    }
}

fn riscv_target(detail: &InsnDetail, ops: &str, pc: u64) -> Option<u64> {
    let imm = detail
        .arch_detail()
        .operands()
        .iter()
        .rev()
        .find_map(|op| match op {
            ArchOperand::RiscVOperand(arch::riscv::RiscVOperand::Imm(imm)) => Some(*imm),
            _ => None,
        })
        .or_else(|| parse_immediate(ops.rsplit(',').next()?.trim()))?;
    Some(pc.wrapping_add(imm as u64))
}

/// Accepts `8`, `-12`, `0x10` and `-0x10`.
fn parse_immediate(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

fn in_group(detail: &InsnDetail, group: u8) -> bool {
    detail.groups().iter().any(|g| *g == InsnGroupId(group))
}

/// Direct targets are the last immediate operand (`tbz x0, #3, label`
/// carries the bit number first).
fn immediate_target(detail: &InsnDetail) -> Option<u64> {
    detail.arch_detail().operands().iter().rev().find_map(|op| match op {
        ArchOperand::X86Operand(op) => match op.op_type {
            arch::x86::X86OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        ArchOperand::ArmOperand(op) => match op.op_type {
            arch::arm::ArmOperandType::Imm(imm) => Some(imm as u32 as u64),
            _ => None,
        },
        ArchOperand::Arm64Operand(op) => match op.op_type {
            arch::arm64::Arm64OperandType::Imm(imm) => Some(imm as u64),
            _ => None,
        },
        _ => None,
    })
}

/// Decodes a native byte range. If capstone cannot be initialised every byte
/// becomes a placeholder so the output still covers the range.
pub fn decode(arch: Arch, code: &[u8], start: u64) -> Vec<RawInstruction> {
    match Disassembler::new(arch) {
        Ok(dis) => dis.decode_range(code, start),
        Err(e) => {
            log::error!("capstone init failed for {:?}: {}", arch, e);
            decode_with(code, start, |_, _| None)
        }
    }
}
