//! The applier (§4.4): executes a validated operation stream against a
//! source buffer to materialize the target buffer.

use crate::crc::crc32;
use crate::error::CorruptPatch;
use crate::ops::Operation;
use CorruptPatch::*;

/// Applies `ops` to `source`, returning the materialized target buffer.
///
/// `ops` need not have been pre-validated by [`crate::validate`] — this
/// function enforces the same bounds as it goes (`TargetCopy`'s
/// byte-at-a-time discipline in particular requires applying one byte at a
/// time regardless, so the bounds check is free to fold in here) — but it
/// does rely on the Header arriving first and the CRC32 operations arriving
/// last, which any `Operation` source compliant with §3's invariants
/// guarantees.
pub fn apply<I>(ops: I, source: &[u8]) -> Result<Vec<u8>, CorruptPatch>
where
    I: IntoIterator<Item = Operation>,
{
    let mut ops = ops.into_iter();

    let (source_size, target_size) = match ops.next().ok_or(MissingHeader)? {
        Operation::Header { source_size, target_size, .. } => (source_size, target_size),
        _ => return Err(MissingHeader),
    };

    let source_size = usize::try_from(source_size).map_err(|_| BadSize("source size overflows usize"))?;
    let target_size = usize::try_from(target_size).map_err(|_| BadSize("target size overflows usize"))?;
    if source.len() != source_size {
        return Err(SourceSizeMismatch { expected: source_size as u64, actual: source.len() as u64 });
    }

    let mut target = vec![0u8; target_size];
    let mut write_offset = 0usize;
    let mut source_crc_checked = false;

    for op in ops {
        match op {
            Operation::Header { .. } => return Err(OutOfOrderOpcode("Header must be the first operation")),
            Operation::SourceRead { length } => {
                let length = usize::try_from(length).map_err(|_| BadSize("length overflows usize"))?;
                let end = write_offset.checked_add(length).ok_or(ParameterOutOfRange("write offset overflows usize"))?;
                if end > source.len() || end > target.len() {
                    return Err(ReadsPastEndOfSource);
                }
                target[write_offset..end].copy_from_slice(&source[write_offset..end]);
                write_offset = end;
            }
            Operation::TargetRead { payload } => {
                let end = write_offset
                    .checked_add(payload.len())
                    .ok_or(ParameterOutOfRange("write offset overflows usize"))?;
                if end > target.len() {
                    return Err(WritesPastEndOfTarget);
                }
                target[write_offset..end].copy_from_slice(&payload);
                write_offset = end;
            }
            Operation::SourceCopy { length, offset } => {
                let length = usize::try_from(length).map_err(|_| BadSize("length overflows usize"))?;
                let offset = usize::try_from(offset).map_err(|_| BadSize("offset overflows usize"))?;
                let src_end = offset.checked_add(length).ok_or(ParameterOutOfRange("offset + length overflows usize"))?;
                if src_end > source.len() {
                    return Err(ReadsPastEndOfSource);
                }
                let dst_end = write_offset.checked_add(length).ok_or(ParameterOutOfRange("write offset overflows usize"))?;
                if dst_end > target.len() {
                    return Err(WritesPastEndOfTarget);
                }
                target[write_offset..dst_end].copy_from_slice(&source[offset..src_end]);
                write_offset = dst_end;
            }
            Operation::TargetCopy { length, offset } => {
                let length = usize::try_from(length).map_err(|_| BadSize("length overflows usize"))?;
                let offset = usize::try_from(offset).map_err(|_| BadSize("offset overflows usize"))?;
                if offset >= write_offset {
                    return Err(ReadsPastWrittenRegion);
                }
                // Byte-at-a-time: a TargetCopy reading back into bytes it is
                // itself producing must see each byte as soon as it lands,
                // which is how the format encodes run-length fills.
                for i in 0..length {
                    if write_offset >= target.len() {
                        return Err(WritesPastEndOfTarget);
                    }
                    target[write_offset] = target[offset + i];
                    write_offset += 1;
                }
            }
            Operation::SourceCrc32 { value } => {
                if crc32(source) != value {
                    return Err(SourceCrcMismatch { expected: value, actual: crc32(source) });
                }
                source_crc_checked = true;
            }
            Operation::TargetCrc32 { value } => {
                if !source_crc_checked {
                    return Err(OutOfOrderOpcode("expected SourceCrc32 before TargetCrc32"));
                }
                if crc32(&target) != value {
                    return Err(TargetCrcMismatch { expected: value, actual: crc32(&target) });
                }
            }
        }
    }

    if write_offset != target.len() {
        return Err(Truncated);
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation as Op;

    #[test]
    fn applies_a_plain_source_copy() {
        let source = b"hello world".to_vec();
        let ops = vec![
            Op::header(source.len() as u64, 5, ""),
            Op::source_copy(5, 6).unwrap(),
            Op::source_crc32(crc32(&source)),
            Op::target_crc32(crc32(b"world")),
        ];
        let target = apply(ops, &source).unwrap();
        assert_eq!(target, b"world");
    }

    #[test]
    fn target_copy_produces_run_length_fill() {
        let source = Vec::new();
        let ops = vec![
            Op::header(0, 5, ""),
            Op::target_read(vec![b'A']).unwrap(),
            Op::target_copy(4, 0).unwrap(),
            Op::source_crc32(crc32(&source)),
            Op::target_crc32(crc32(b"AAAAA")),
        ];
        let target = apply(ops, &source).unwrap();
        assert_eq!(target, b"AAAAA");
    }

    #[test]
    fn source_size_mismatch_is_rejected() {
        let ops = vec![Op::header(4, 0, ""), Op::source_crc32(0), Op::target_crc32(0)];
        assert_eq!(apply(ops, b"abc"), Err(SourceSizeMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn target_crc_mismatch_is_rejected() {
        let source = b"abc".to_vec();
        let ops = vec![
            Op::header(3, 3, ""),
            Op::source_copy(3, 0).unwrap(),
            Op::source_crc32(crc32(&source)),
            Op::target_crc32(0xDEADBEEF),
        ];
        assert!(matches!(apply(ops, &source), Err(TargetCrcMismatch { .. })));
    }

    #[test]
    fn source_crc_mismatch_is_rejected() {
        let source = b"abc".to_vec();
        let ops = vec![
            Op::header(3, 3, ""),
            Op::source_copy(3, 0).unwrap(),
            Op::source_crc32(0xDEADBEEF),
            Op::target_crc32(crc32(&source)),
        ];
        assert!(matches!(apply(ops, &source), Err(SourceCrcMismatch { .. })));
    }

    #[test]
    fn target_copy_reading_unwritten_region_is_rejected() {
        let ops = vec![
            Op::header(0, 4, ""),
            Op::target_read(vec![1, 2]).unwrap(),
            Op::target_copy(2, 2).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(apply(ops, &[]), Err(ReadsPastWrittenRegion));
    }
}
