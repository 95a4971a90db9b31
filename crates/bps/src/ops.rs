//! The opcode algebra: the seven instructions exchanged between the
//! differ, validator, codec and applier. See `bps::ops::Operation` for the
//! tagged sum and its `bytespan`/`extend`/`shrink` contracts (§4.1).

use crate::error::CorruptPatch;
use CorruptPatch::*;

/// A single patch instruction.
///
/// Operations are plain values: the source buffer is never borrowed by an
/// operation, and `TargetRead` owns its payload outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Start-of-stream: declares sizes and UTF-8 metadata.
    Header { source_size: u64, target_size: u64, metadata: String },
    /// Copy `length` bytes from source at the current write offset.
    SourceRead { length: u64 },
    /// Emit literal bytes.
    TargetRead { payload: Vec<u8> },
    /// Copy `length` bytes from source at absolute `offset`.
    SourceCopy { length: u64, offset: u64 },
    /// Copy `length` bytes from already-written target at absolute `offset`.
    TargetCopy { length: u64, offset: u64 },
    /// Declared CRC-32 of the entire source.
    SourceCrc32 { value: u32 },
    /// Declared CRC-32 of the entire target.
    TargetCrc32 { value: u32 },
}

impl Operation {
    pub fn header(source_size: u64, target_size: u64, metadata: impl Into<String>) -> Self {
        Operation::Header { source_size, target_size, metadata: metadata.into() }
    }

    pub fn source_read(length: u64) -> Result<Self, CorruptPatch> {
        if length == 0 {
            return Err(ParameterOutOfRange("SourceRead length must be greater than zero"));
        }
        Ok(Operation::SourceRead { length })
    }

    pub fn target_read(payload: Vec<u8>) -> Result<Self, CorruptPatch> {
        if payload.is_empty() {
            return Err(ParameterOutOfRange("TargetRead payload must not be empty"));
        }
        Ok(Operation::TargetRead { payload })
    }

    pub fn source_copy(length: u64, offset: u64) -> Result<Self, CorruptPatch> {
        if length == 0 {
            return Err(ParameterOutOfRange("SourceCopy length must be greater than zero"));
        }
        Ok(Operation::SourceCopy { length, offset })
    }

    pub fn target_copy(length: u64, offset: u64) -> Result<Self, CorruptPatch> {
        if length == 0 {
            return Err(ParameterOutOfRange("TargetCopy length must be greater than zero"));
        }
        Ok(Operation::TargetCopy { length, offset })
    }

    pub fn source_crc32(value: u32) -> Self {
        Operation::SourceCrc32 { value }
    }

    pub fn target_crc32(value: u32) -> Self {
        Operation::TargetCrc32 { value }
    }

    /// The number of target bytes this operation produces; zero for
    /// `Header` and the CRC32 operations.
    pub fn bytespan(&self) -> u64 {
        match self {
            Operation::Header { .. } | Operation::SourceCrc32 { .. } | Operation::TargetCrc32 { .. } => 0,
            Operation::SourceRead { length } => *length,
            Operation::TargetRead { payload } => payload.len() as u64,
            Operation::SourceCopy { length, .. } => *length,
            Operation::TargetCopy { length, .. } => *length,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Operation::Header { .. } => "Header",
            Operation::SourceRead { .. } => "SourceRead",
            Operation::TargetRead { .. } => "TargetRead",
            Operation::SourceCopy { .. } => "SourceCopy",
            Operation::TargetCopy { .. } => "TargetCopy",
            Operation::SourceCrc32 { .. } => "SourceCrc32",
            Operation::TargetCrc32 { .. } => "TargetCrc32",
        }
    }

    /// Merge an adjacent same-kind operation into `self` in place.
    ///
    /// Allowed only for `SourceRead`+`SourceRead` (contiguity is assumed,
    /// not checked, since a `SourceRead`'s position is entirely determined
    /// by the running write offset), `TargetRead`+`TargetRead` (payload
    /// concatenation), and `SourceCopy`/`TargetCopy` pairs where the second
    /// operation's offset immediately follows the first's.
    pub fn extend(&mut self, other: Operation) -> Result<(), CorruptPatch> {
        match (self, other) {
            (Operation::SourceRead { length }, Operation::SourceRead { length: other_length }) => {
                *length += other_length;
                Ok(())
            }
            (Operation::TargetRead { payload }, Operation::TargetRead { payload: other_payload }) => {
                payload.extend_from_slice(&other_payload);
                Ok(())
            }
            (
                Operation::SourceCopy { length, offset },
                Operation::SourceCopy { length: other_length, offset: other_offset },
            ) => {
                if other_offset != *offset + *length {
                    return Err(NonContiguous);
                }
                *length += other_length;
                Ok(())
            }
            (
                Operation::TargetCopy { length, offset },
                Operation::TargetCopy { length: other_length, offset: other_offset },
            ) => {
                if other_offset != *offset + *length {
                    return Err(NonContiguous);
                }
                *length += other_length;
                Ok(())
            }
            (this @ Operation::Header { .. }, _)
            | (this @ Operation::SourceCrc32 { .. }, _)
            | (this @ Operation::TargetCrc32 { .. }, _) => Err(NotExtensible(this.kind_name())),
            (this, _) => Err(KindMismatch(this.kind_name())),
        }
    }

    /// Truncate `n.abs()` bytes from the front (`n > 0`) or back (`n < 0`)
    /// of this operation. For `SourceCopy`/`TargetCopy`, front-shrinking
    /// advances `offset`. Errors if `n == 0` or `n.unsigned_abs() >= bytespan()`.
    pub fn shrink(&mut self, n: i64) -> Result<(), CorruptPatch> {
        if n == 0 {
            return Err(ParameterOutOfRange("shrink amount must not be zero"));
        }
        let bytespan = self.bytespan();
        let amount = n.unsigned_abs();
        if amount >= bytespan {
            return Err(ParameterOutOfRange("shrink amount must be less than bytespan"));
        }
        match self {
            Operation::Header { .. } | Operation::SourceCrc32 { .. } | Operation::TargetCrc32 { .. } => {
                Err(NotExtensible(self.kind_name()))
            }
            Operation::SourceRead { length } => {
                *length -= amount;
                Ok(())
            }
            Operation::TargetRead { payload } => {
                if n > 0 {
                    payload.drain(..amount as usize);
                } else {
                    payload.truncate(payload.len() - amount as usize);
                }
                Ok(())
            }
            Operation::SourceCopy { length, offset } | Operation::TargetCopy { length, offset } => {
                if n > 0 {
                    *offset += amount;
                }
                *length -= amount;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytespan_matches_each_variant() {
        assert_eq!(Operation::header(1, 2, "").bytespan(), 0);
        assert_eq!(Operation::source_read(5).unwrap().bytespan(), 5);
        assert_eq!(Operation::target_read(vec![1, 2, 3]).unwrap().bytespan(), 3);
        assert_eq!(Operation::source_copy(4, 0).unwrap().bytespan(), 4);
        assert_eq!(Operation::target_copy(4, 0).unwrap().bytespan(), 4);
        assert_eq!(Operation::source_crc32(0).bytespan(), 0);
        assert_eq!(Operation::target_crc32(0).bytespan(), 0);
    }

    #[test]
    fn rejects_empty_hunks() {
        assert!(Operation::source_read(0).is_err());
        assert!(Operation::target_read(vec![]).is_err());
        assert!(Operation::source_copy(0, 0).is_err());
        assert!(Operation::target_copy(0, 0).is_err());
    }

    #[test]
    fn extend_merges_contiguous_copies() {
        let mut a = Operation::source_copy(4, 10).unwrap();
        let b = Operation::source_copy(3, 14).unwrap();
        a.extend(b).unwrap();
        assert_eq!(a, Operation::source_copy(7, 10).unwrap());
    }

    #[test]
    fn extend_rejects_non_contiguous_copies() {
        let mut a = Operation::target_copy(4, 10).unwrap();
        let b = Operation::target_copy(3, 20).unwrap();
        assert_eq!(a.extend(b), Err(NonContiguous));
    }

    #[test]
    fn extend_rejects_kind_mismatch() {
        let mut a = Operation::source_read(4).unwrap();
        let b = Operation::target_read(vec![1]).unwrap();
        assert!(matches!(a.extend(b), Err(KindMismatch(_))));
    }

    #[test]
    fn extend_rejects_header_and_crc() {
        let mut header = Operation::header(0, 0, "");
        assert!(matches!(
            header.extend(Operation::header(0, 0, "")),
            Err(NotExtensible(_))
        ));
    }

    #[test]
    fn shrink_front_advances_copy_offset() {
        let mut op = Operation::source_copy(10, 100).unwrap();
        op.shrink(3).unwrap();
        assert_eq!(op, Operation::source_copy(7, 103).unwrap());
    }

    #[test]
    fn shrink_back_truncates_length() {
        let mut op = Operation::target_copy(10, 100).unwrap();
        op.shrink(-3).unwrap();
        assert_eq!(op, Operation::target_copy(7, 100).unwrap());
    }

    #[test]
    fn shrink_back_truncates_target_read_payload() {
        let mut op = Operation::target_read(vec![1, 2, 3, 4]).unwrap();
        op.shrink(-1).unwrap();
        assert_eq!(op, Operation::target_read(vec![1, 2, 3]).unwrap());
    }

    #[test]
    fn shrink_rejects_zero_and_full_span() {
        let mut op = Operation::source_read(5).unwrap();
        assert!(op.shrink(0).is_err());
        assert!(op.shrink(5).is_err());
        assert!(op.shrink(-5).is_err());
    }
}
