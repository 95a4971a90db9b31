//! The diff engine (§4.5): synthesizes a valid operation stream from a
//! `(source, target)` pair by a two-phase block-hash scan. Heuristic by
//! design — encoding efficiency may vary across implementations as long as
//! the result applies cleanly (§4.5's own words).
//!
//! This implementation eagerly materializes the whole `Vec<Operation>`
//! rather than exposing a lazy `Iterator`, since the scan already has to
//! hold the full source and target in memory to hash blocks out of either
//! one.

use crate::crc::crc32;
use crate::ops::Operation;
use crate::varint;
use std::collections::HashMap;

/// Tuning knobs for [`diff_with`]. The zero value of `block_size` means
/// "use the adaptive default", matching `bps/diff.py::diff_bytearrays`'s
/// `blocksize=None` sentinel.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    pub block_size: Option<u64>,
}

/// Diffs `source` against `target` using the adaptive block-size default.
pub fn diff(source: &[u8], target: &[u8]) -> Vec<Operation> {
    diff_with(source, target, DiffOptions::default())
}

/// Diffs `source` against `target`, honoring an explicit block size if one
/// is given in `options` (strategy 3 of §4.5's block indexing).
pub fn diff_with(source: &[u8], target: &[u8], options: DiffOptions) -> Vec<Operation> {
    let block_size = match options.block_size {
        Some(b) if b > 0 => b as usize,
        _ => (source.len() + target.len()) / 1_000_000 + 1,
    };

    let mut ops = vec![Operation::header(source.len() as u64, target.len() as u64, "")];

    let sourcemap = BlockMap::build_tiled(source, block_size);
    let mut targetmap = BlockMap::new(block_size);
    let mut next_target_map_block_offset = 0usize;

    let mut write_offset = 0usize;
    let mut encoding_offset = 0usize;
    let mut last_source_copy_offset: u64 = 0;
    let mut last_target_copy_offset: u64 = 0;

    while encoding_offset < target.len() {
        let mut best: Option<(Vec<Operation>, f64)> = None;

        for k in 0..block_size {
            let probe_start = encoding_offset + k;
            if probe_start + block_size > target.len() {
                break;
            }
            let block = &target[probe_start..probe_start + block_size];

            for &src_off in sourcemap.lookup(block) {
                let (length, cand_start, tgt_start) =
                    measure_match(source, target, src_off, probe_start, write_offset, k);
                if length == 0 {
                    continue;
                }
                let candidate = source_candidate_ops(target, write_offset, cand_start, tgt_start, length);
                consider(&mut best, candidate, last_source_copy_offset, last_target_copy_offset);
            }

            for &tc_off in targetmap.lookup(block) {
                if tc_off >= write_offset {
                    continue;
                }
                let (length, cand_start, tgt_start) =
                    measure_match(target, target, tc_off, probe_start, write_offset, k);
                if length == 0 || cand_start >= tgt_start {
                    continue;
                }
                let candidate = target_candidate_ops(target, write_offset, cand_start, tgt_start, length);
                consider(&mut best, candidate, last_source_copy_offset, last_target_copy_offset);
            }
        }

        match best {
            Some((candidate_ops, efficiency)) => {
                log::trace!("encoding_offset={encoding_offset} chose {candidate_ops:?} efficiency={efficiency:.3}");
                for op in &candidate_ops {
                    match op {
                        Operation::SourceCopy { length, offset } => last_source_copy_offset = offset + length,
                        Operation::TargetCopy { length, offset } => last_target_copy_offset = offset + length,
                        _ => {}
                    }
                }
                let produced: u64 = candidate_ops.iter().map(Operation::bytespan).sum();
                write_offset += produced as usize;
                ops.extend(candidate_ops);
                encoding_offset = write_offset;
            }
            None => {
                encoding_offset += block_size;
            }
        }

        while write_offset >= next_target_map_block_offset + block_size {
            targetmap.insert(target, next_target_map_block_offset);
            next_target_map_block_offset += block_size;
        }
    }
    log::debug!(
        "diff produced {} hunks over {} bytes of target with block_size={block_size}",
        ops.len() - 1,
        target.len()
    );

    if write_offset < target.len() {
        ops.push(Operation::target_read(target[write_offset..].to_vec()).unwrap());
    }

    ops.push(Operation::source_crc32(crc32(source)));
    ops.push(Operation::target_crc32(crc32(target)));
    ops
}

/// Builds the gap-fill-plus-hunk op list for a SourceCopy/SourceRead
/// candidate, per §4.5's "if the aligned source offset equals the aligned
/// target offset, emit SourceRead instead" rule.
fn source_candidate_ops(
    target: &[u8],
    write_offset: usize,
    cand_start: usize,
    tgt_start: usize,
    length: usize,
) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(2);
    if tgt_start > write_offset {
        ops.push(Operation::target_read(target[write_offset..tgt_start].to_vec()).unwrap());
    }
    ops.push(if cand_start == tgt_start {
        Operation::source_read(length as u64).unwrap()
    } else {
        Operation::source_copy(length as u64, cand_start as u64).unwrap()
    });
    ops
}

fn target_candidate_ops(
    target: &[u8],
    write_offset: usize,
    cand_start: usize,
    tgt_start: usize,
    length: usize,
) -> Vec<Operation> {
    let mut ops = Vec::with_capacity(2);
    if tgt_start > write_offset {
        ops.push(Operation::target_read(target[write_offset..tgt_start].to_vec()).unwrap());
    }
    ops.push(Operation::target_copy(length as u64, cand_start as u64).unwrap());
    ops
}

fn consider(
    best: &mut Option<(Vec<Operation>, f64)>,
    candidate: Vec<Operation>,
    source_cursor: u64,
    target_cursor: u64,
) {
    let bytespan: u64 = candidate.iter().map(Operation::bytespan).sum();
    let wire = wire_size(&candidate, source_cursor, target_cursor).max(1);
    let efficiency = bytespan as f64 / wire as f64;
    let replace = match best {
        Some((_, best_efficiency)) => efficiency > *best_efficiency,
        None => true,
    };
    if replace {
        *best = Some((candidate, efficiency));
    }
}

/// Estimates the on-wire size of a candidate op list, for scoring only —
/// the codec recomputes real relative offsets independently when the
/// stream is actually encoded.
fn wire_size(ops: &[Operation], mut source_cursor: u64, mut target_cursor: u64) -> usize {
    let mut total = 0usize;
    for op in ops {
        match op {
            Operation::SourceRead { length } => {
                total += varint::encode_varint((length - 1) << 2).len();
            }
            Operation::TargetRead { payload } => {
                total += varint::encode_varint(((payload.len() as u64 - 1) << 2) | 0b01).len() + payload.len();
            }
            Operation::SourceCopy { length, offset } => {
                total += varint::encode_varint(((length - 1) << 2) | 0b10).len();
                let rel = varint::relative_offset(source_cursor, *offset).unwrap_or(*offset as i64);
                total += varint::encode_relative_offset(rel).len();
                source_cursor = offset + length;
            }
            Operation::TargetCopy { length, offset } => {
                total += varint::encode_varint(((length - 1) << 2) | 0b11).len();
                let rel = varint::relative_offset(target_cursor, *offset).unwrap_or(*offset as i64);
                total += varint::encode_relative_offset(rel).len();
                target_cursor = offset + length;
            }
            _ => {}
        }
    }
    total
}

/// Extends a hash hit into a full match: leftward while bytes agree (bounded
/// by `write_offset` and the `k` slack the caller observed this hit at),
/// then rightward to the end of either buffer. `haystack` is `source` for a
/// SourceCopy candidate or `target` itself for a self-referential
/// TargetCopy candidate.
fn measure_match(
    haystack: &[u8],
    target: &[u8],
    mut cand_start: usize,
    mut tgt_start: usize,
    write_offset: usize,
    mut backward_slack: usize,
) -> (usize, usize, usize) {
    while cand_start > 0
        && tgt_start > write_offset
        && backward_slack > 0
        && haystack[cand_start - 1] == target[tgt_start - 1]
    {
        cand_start -= 1;
        tgt_start -= 1;
        backward_slack -= 1;
    }

    let mut length = 0usize;
    while cand_start + length < haystack.len()
        && tgt_start + length < target.len()
        && haystack[cand_start + length] == target[tgt_start + length]
    {
        length += 1;
    }
    (length, cand_start, tgt_start)
}

/// Maps block-bytes to an insertion-ordered list of offsets where that
/// block occurs, tiled non-overlapping across the indexed buffer.
struct BlockMap {
    block_size: usize,
    index: HashMap<Vec<u8>, Vec<usize>>,
}

impl BlockMap {
    fn new(block_size: usize) -> Self {
        Self { block_size, index: HashMap::new() }
    }

    fn build_tiled(data: &[u8], block_size: usize) -> Self {
        let mut map = Self::new(block_size);
        let mut offset = 0;
        while offset + block_size <= data.len() {
            map.insert(data, offset);
            offset += block_size;
        }
        map
    }

    fn insert(&mut self, data: &[u8], offset: usize) {
        if offset + self.block_size <= data.len() {
            self.index.entry(data[offset..offset + self.block_size].to_vec()).or_default().push(offset);
        }
    }

    fn lookup(&self, block: &[u8]) -> &[usize] {
        self.index.get(block).map(Vec::as_slice).unwrap_or(&[])
    }
}
