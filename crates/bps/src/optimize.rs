//! The optimizer (§4.5a): a left-fold over a validated operation stream
//! that yields an equivalent but smaller one. Ported from `blip/optimize.py`.

use crate::error::CorruptPatch;
use crate::ops::Operation;
use crate::validate::check_stream;

/// Optimizes `ops`, returning an equivalent, re-validated stream.
///
/// Rules, applied greedily in order as each operation arrives:
/// - a `SourceCopy` whose offset equals the running write offset is
///   rewritten to `SourceRead` (same bytes, shorter wire form);
/// - adjacent same-kind hunks (`SourceRead`+`SourceRead`,
///   `TargetRead`+`TargetRead`, contiguous `SourceCopy`/`TargetCopy` pairs)
///   are merged via [`Operation::extend`].
///
/// The result is itself validated before being returned, so a bug in this
/// pass can never silently hand a broken stream to a caller.
pub fn optimize<I>(ops: I) -> Result<Vec<Operation>, CorruptPatch>
where
    I: IntoIterator<Item = Operation>,
{
    let validated = check_stream(ops);
    let mut out: Vec<Operation> = Vec::new();
    let mut write_offset: u64 = 0;

    for op in validated {
        let op = op?;
        let op = rewrite_zero_offset_copy(op, write_offset);
        write_offset += op.bytespan();

        match out.last_mut() {
            Some(tail) if tail.extend(op.clone()).is_ok() => {}
            _ => out.push(op),
        }
    }

    check_stream(out).collect()
}

/// A `SourceCopy` whose `offset` lands exactly where the next byte would be
/// written is semantically identical to a `SourceRead` of the same length,
/// and a `SourceRead` is one field shorter on the wire.
fn rewrite_zero_offset_copy(op: Operation, write_offset: u64) -> Operation {
    match op {
        Operation::SourceCopy { length, offset } if offset == write_offset => {
            Operation::SourceRead { length }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation as Op;

    #[test]
    fn merges_adjacent_source_reads() {
        let ops = vec![
            Op::header(10, 10, ""),
            Op::source_read(4).unwrap(),
            Op::source_read(6).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        let optimized = optimize(ops).unwrap();
        assert_eq!(
            optimized,
            vec![Op::header(10, 10, ""), Op::source_read(10).unwrap(), Op::source_crc32(0), Op::target_crc32(0)]
        );
    }

    #[test]
    fn merges_adjacent_target_reads() {
        let ops = vec![
            Op::header(0, 4, ""),
            Op::target_read(vec![1, 2]).unwrap(),
            Op::target_read(vec![3, 4]).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        let optimized = optimize(ops).unwrap();
        assert_eq!(
            optimized,
            vec![
                Op::header(0, 4, ""),
                Op::target_read(vec![1, 2, 3, 4]).unwrap(),
                Op::source_crc32(0),
                Op::target_crc32(0)
            ]
        );
    }

    #[test]
    fn merges_contiguous_source_copies() {
        let ops = vec![
            Op::header(10, 10, ""),
            Op::source_copy(4, 2).unwrap(),
            Op::source_copy(6, 6).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        let optimized = optimize(ops).unwrap();
        assert_eq!(
            optimized,
            vec![Op::header(10, 10, ""), Op::source_copy(10, 2).unwrap(), Op::source_crc32(0), Op::target_crc32(0)]
        );
    }

    #[test]
    fn rewrites_self_following_source_copy_to_source_read() {
        let ops = vec![
            Op::header(5, 5, ""),
            Op::source_copy(5, 0).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        let optimized = optimize(ops).unwrap();
        assert_eq!(
            optimized,
            vec![Op::header(5, 5, ""), Op::source_read(5).unwrap(), Op::source_crc32(0), Op::target_crc32(0)]
        );
    }

    #[test]
    fn does_not_merge_non_contiguous_copies() {
        let ops = vec![
            Op::header(20, 10, ""),
            Op::source_copy(4, 2).unwrap(),
            Op::source_copy(6, 12).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        let optimized = optimize(ops.clone()).unwrap();
        assert_eq!(optimized, ops);
    }

    #[test]
    fn rejects_an_already_invalid_stream() {
        let ops = vec![Op::source_read(1).unwrap()];
        assert!(optimize(ops).is_err());
    }
}
