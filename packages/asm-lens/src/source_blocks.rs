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

//! Groups the source lines a function's instructions come from into padded
//! blocks, each line carrying the instruction index ranges it produced.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::code::Instruction;
use crate::utils::split_lines;

/// Two padded ranges merge when the gap between them is at most
/// `MERGE_GAP_FACTOR * context` lines.
pub const MERGE_GAP_FACTOR: usize = 2;

/// Source text by file path.
pub trait SourceLoader: Send + Sync {
    /// `None` when the file cannot be read.
    fn lines(&self, path: &str) -> Option<Vec<String>>;
}

/// Reads sources from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSources;

impl SourceLoader for FsSources {
    fn lines(&self, path: &str) -> Option<Vec<String>> {
        match std::fs::read(path) {
            Ok(bytes) => Some(split_lines(&String::from_utf8_lossy(&bytes))),
            Err(e) => {
                log::warn!("source {} unavailable: {}", path, e);
                None
            }
        }
    }
}

impl<F> SourceLoader for F
where
    F: Fn(&str) -> Option<Vec<String>> + Send + Sync,
{
    fn lines(&self, path: &str) -> Option<Vec<String>> {
        self(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    /// First line, 1-based.
    pub from: u32,
    /// One past the last line.
    pub to: u32,
    pub lines: Vec<String>,
    /// `related[i]`: instruction index runs produced by line `from + i`.
    pub related: Vec<Vec<Range<usize>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file: String,
    pub blocks: Vec<SourceBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLayout {
    /// Primary file first, then files in order of first reference.
    pub files: Vec<SourceFile>,
    /// Referenced files whose text could not be read.
    pub missing: Vec<String>,
}

pub fn build(
    instructions: &[Instruction],
    context: usize,
    loader: &dyn SourceLoader,
) -> SourceLayout {
    // file -> line -> instruction indices, files kept in first-seen order
    let mut order: Vec<&str> = Vec::new();
    let mut by_file: HashMap<&str, BTreeMap<u32, Vec<usize>>> = HashMap::new();
    for (index, insn) in instructions.iter().enumerate() {
        if insn.file.is_empty() || insn.line == 0 {
            continue;
        }
        let lines = by_file.entry(insn.file.as_str()).or_insert_with(|| {
            order.push(insn.file.as_str());
            BTreeMap::new()
        });
        lines.entry(insn.line).or_default().push(index);
    }

    let mut layout = SourceLayout::default();
    for file in order {
        let Some(text) = loader.lines(file) else {
            layout.missing.push(file.to_string());
            continue;
        };
        let lines = &by_file[file];
        let blocks = padded_ranges(lines.keys().copied(), context, text.len() as u32)
            .into_iter()
            .map(|range| block(range, &text, lines))
            .collect();
        layout.files.push(SourceFile { file: file.to_string(), blocks });
    }
    layout
}

/// Pads each line by `context`, clips to `[1, line_count]` and merges
/// ranges whose gap is small. Yields half-open 1-based ranges.
fn padded_ranges(
    lines: impl Iterator<Item = u32>,
    context: usize,
    line_count: u32,
) -> Vec<Range<u32>> {
    let context = context.min(u32::MAX as usize / 4) as u32;
    let max_gap = context * MERGE_GAP_FACTOR as u32;
    let mut merged: Vec<Range<u32>> = Vec::new();
    for line in lines {
        let lo = line.saturating_sub(context).max(1);
        let hi = line.saturating_add(context).min(line_count);
        if lo > hi {
            continue;
        }
        match merged.last_mut() {
            Some(last) if lo <= last.end + max_gap => last.end = last.end.max(hi + 1),
            _ => merged.push(lo..hi + 1),
        }
    }
    merged
}

fn block(range: Range<u32>, text: &[String], lines: &BTreeMap<u32, Vec<usize>>) -> SourceBlock {
    let related = range
        .clone()
        .map(|line| lines.get(&line).map(|indices| runs(indices)).unwrap_or_default())
        .collect();
    SourceBlock {
        from: range.start,
        to: range.end,
        lines: text[(range.start - 1) as usize..(range.end - 1) as usize].to_vec(),
        related,
    }
}

/// Coalesces ascending indices into maximal half-open runs.
fn runs(indices: &[usize]) -> Vec<Range<usize>> {
    let mut out: Vec<Range<usize>> = Vec::new();
    for &i in indices {
        match out.last_mut() {
            Some(run) if run.end == i => run.end = i + 1,
            _ => out.push(i..i + 1),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FlowKind;

    fn at(file: &str, line: u32) -> Instruction {
        Instruction {
            pc: 0,
            size: 1,
            text: String::new(),
            kind: FlowKind::Sequential,
            file: file.to_string(),
            line,
            call: None,
            jump: None,
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {}", i)).collect()
    }

    fn sources(path: &str) -> Option<Vec<String>> {
        match path {
            "a.c" => Some(numbered(40)),
            "b.h" => Some(numbered(5)),
            _ => None,
        }
    }

    #[test]
    fn pads_and_merges_nearby_lines() {
        // lines 10 and 16 with context 2: [8,12] and [14,18], gap 1 <= 4
        let insns = vec![at("a.c", 10), at("a.c", 16), at("a.c", 10)];
        let layout = build(&insns, 2, &sources);
        let blocks = &layout.files[0].blocks;
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].from, blocks[0].to), (8, 19));
        assert_eq!(blocks[0].lines.len(), 11);
        assert_eq!(blocks[0].lines[0], "line 8");
        assert_eq!(blocks[0].related[2], vec![0..1, 2..3]);
        assert_eq!(blocks[0].related[8], vec![1..2]);
        assert!(blocks[0].related[0].is_empty());
    }

    #[test]
    fn distant_lines_form_separate_blocks() {
        let insns = vec![at("a.c", 3), at("a.c", 30)];
        let blocks = &build(&insns, 1, &sources).files[0].blocks;
        let spans: Vec<_> = blocks.iter().map(|b| (b.from, b.to)).collect();
        // line 3 clips nothing; line 30 pads to 29..31
        assert_eq!(spans, vec![(2, 5), (29, 32)]);
    }

    #[test]
    fn clipped_to_file_bounds() {
        let insns = vec![at("b.h", 1), at("b.h", 5)];
        let blocks = &build(&insns, 3, &sources).files[0].blocks;
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].from, blocks[0].to), (1, 6));
    }

    #[test]
    fn lines_past_the_end_are_not_covered() {
        let insns = vec![at("b.h", 2), at("b.h", 50)];
        let blocks = &build(&insns, 0, &sources).files[0].blocks;
        let spans: Vec<_> = blocks.iter().map(|b| (b.from, b.to)).collect();
        assert_eq!(spans, vec![(2, 3)]);
        let covered: Vec<_> = blocks[0].related.iter().flatten().cloned().collect();
        assert_eq!(covered, vec![0..1]);
    }

    #[test]
    fn files_keep_first_reference_order_and_missing_are_listed() {
        let insns = vec![at("b.h", 1), at("", 0), at("gone.c", 4), at("a.c", 9)];
        let layout = build(&insns, 1, &sources);
        let files: Vec<_> = layout.files.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(files, vec!["b.h", "a.c"]);
        assert_eq!(layout.missing, vec!["gone.c".to_string()]);
    }

    #[test]
    fn related_runs_cover_exactly_the_in_block_instructions() {
        let insns: Vec<_> = [5, 5, 6, 20, 5, 21, 6].iter().map(|&l| at("a.c", l)).collect();
        let layout = build(&insns, 1, &sources);
        let mut covered: Vec<usize> = layout.files[0]
            .blocks
            .iter()
            .flat_map(|b| b.related.iter().flatten().flat_map(|r| r.clone()))
            .collect();
        covered.sort_unstable();
        assert_eq!(covered, (0..insns.len()).collect::<Vec<_>>());
    }
}
