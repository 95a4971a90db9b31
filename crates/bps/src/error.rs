//! The crate's error types.
//!
//! [`CorruptPatch`] is the single semantic error kind produced by the
//! opcode model, the validator, the codec and the applier — see §7 of the
//! design notes. [`Error`] additionally distinguishes genuine I/O failures
//! (a broken pipe, a short read from a real file) from patch corruption,
//! since those can only occur at the codec's boundary with a byte stream.

use std::io;
use thiserror::Error;

/// The one error kind surfaced by the opcode model, validator, codec and
/// applier: a patch (or an attempt to construct one) is not well-formed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CorruptPatch {
    #[error("patch has no header")]
    MissingHeader,
    #[error("bad magic: expected {expected:?}, got {actual:?}")]
    BadMagic { expected: &'static [u8; 4], actual: [u8; 4] },
    #[error("bad size: {0}")]
    BadSize(&'static str),
    #[error("bad metadata: {0}")]
    BadMetadata(String),
    #[error("unknown opcode tag {0:#04b}")]
    UnknownOpcode(u8),
    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(&'static str),
    #[error("hunk reads past the end of the source file")]
    ReadsPastEndOfSource,
    #[error("hunk writes past the end of the target")]
    WritesPastEndOfTarget,
    #[error("hunk reads past the end of the written part of the target")]
    ReadsPastWrittenRegion,
    #[error("hunk out of order: {0}")]
    OutOfOrderOpcode(&'static str),
    #[error("truncated patch: expected more opcodes after this")]
    Truncated,
    #[error("trailing garbage in stream")]
    TrailingGarbage,
    #[error("source file must be {expected} bytes, got {actual}")]
    SourceSizeMismatch { expected: u64, actual: u64 },
    #[error("declared source CRC32 is {expected:08X}, actual is {actual:08X}")]
    SourceCrcMismatch { expected: u32, actual: u32 },
    #[error("declared target CRC32 is {expected:08X}, actual is {actual:08X}")]
    TargetCrcMismatch { expected: u32, actual: u32 },
    #[error("declared patch CRC32 is {expected:08X}, actual is {actual:08X}")]
    PatchCrcMismatch { expected: u32, actual: u32 },
    #[error("cannot {0} a header or CRC32 operation")]
    NotExtensible(&'static str),
    #[error("cannot extend {0} with an incompatible operation kind")]
    KindMismatch(&'static str),
    #[error("cannot extend non-contiguous operations")]
    NonContiguous,
    #[error("malformed assembler text: {0}")]
    AsmFormat(String),
}

/// Errors produced while reading or writing a patch as a byte stream.
///
/// Distinguishes an underlying I/O failure from patch corruption detected
/// while parsing; an unexpected EOF while reading is folded into
/// [`CorruptPatch::Truncated`] rather than surfaced as [`Error::Io`], since
/// a short patch file is corruption, not an I/O fault.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Corrupt(#[from] CorruptPatch),
}

pub(crate) fn read_err(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corrupt(CorruptPatch::Truncated)
    } else {
        Error::Io(err)
    }
}
