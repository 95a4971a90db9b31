//! The stream validator (§4.2): a pure, single-pass transducer that proves
//! every operation locally valid before it is handed downstream, so no
//! later stage ever observes an invalid value.

use crate::error::{CorruptPatch, Error};
use crate::ops::Operation;
use CorruptPatch::*;

#[derive(Debug)]
enum State {
    Start,
    Hunks,
    ExpectSourceCrc,
    ExpectTargetCrc,
    Done,
}

/// The validator's state machine, factored out so it can drive both an
/// infallible `Operation` source (the differ, the optimizer) and a fallible
/// `Result<Operation, Error>` source (the decoded byte stream) without
/// duplicating the invariant checks.
#[derive(Debug)]
struct ValidatorState {
    state: State,
    source_size: u64,
    target_size: u64,
    write_offset: u64,
}

impl ValidatorState {
    fn new() -> Self {
        Self { state: State::Start, source_size: 0, target_size: 0, write_offset: 0 }
    }

    fn observe(&mut self, op: &Operation) -> Result<(), CorruptPatch> {
        match (&self.state, op) {
            (State::Start, Operation::Header { source_size, target_size, .. }) => {
                self.source_size = *source_size;
                self.target_size = *target_size;
                self.write_offset = 0;
                self.state = if self.target_size == 0 { State::ExpectSourceCrc } else { State::Hunks };
                Ok(())
            }
            (State::Start, _) => Err(MissingHeader),

            (State::Hunks, Operation::SourceRead { length }) => {
                self.advance(*length)?;
                if self.write_offset > self.source_size {
                    return Err(ReadsPastEndOfSource);
                }
                self.settle();
                Ok(())
            }
            (State::Hunks, Operation::TargetRead { payload }) => {
                self.advance(payload.len() as u64)?;
                self.settle();
                Ok(())
            }
            (State::Hunks, Operation::SourceCopy { length, offset }) => {
                let end = offset.checked_add(*length).ok_or(ParameterOutOfRange("offset + length overflows u64"))?;
                if end > self.source_size {
                    return Err(ReadsPastEndOfSource);
                }
                self.advance(*length)?;
                self.settle();
                Ok(())
            }
            (State::Hunks, Operation::TargetCopy { length, offset }) => {
                if *offset >= self.write_offset {
                    return Err(ReadsPastWrittenRegion);
                }
                self.advance(*length)?;
                self.settle();
                Ok(())
            }
            (State::Hunks, _) => Err(OutOfOrderOpcode("expected a hunk or the end of the target")),

            (State::ExpectSourceCrc, Operation::SourceCrc32 { .. }) => {
                self.state = State::ExpectTargetCrc;
                Ok(())
            }
            (State::ExpectSourceCrc, _) => Err(OutOfOrderOpcode("expected SourceCrc32")),

            (State::ExpectTargetCrc, Operation::TargetCrc32 { .. }) => {
                self.state = State::Done;
                Ok(())
            }
            (State::ExpectTargetCrc, _) => Err(OutOfOrderOpcode("expected TargetCrc32")),

            (State::Done, _) => Err(TrailingGarbage),
        }
    }

    fn advance(&mut self, bytespan: u64) -> Result<(), CorruptPatch> {
        self.write_offset = self
            .write_offset
            .checked_add(bytespan)
            .ok_or(ParameterOutOfRange("write offset overflows u64"))?;
        if self.write_offset > self.target_size {
            return Err(WritesPastEndOfTarget);
        }
        Ok(())
    }

    fn settle(&mut self) {
        if self.write_offset == self.target_size {
            self.state = State::ExpectSourceCrc;
        }
    }

    fn finish(&self) -> Result<(), CorruptPatch> {
        match self.state {
            State::Done => Ok(()),
            State::Start => Err(MissingHeader),
            _ => Err(Truncated),
        }
    }
}

/// Validates an infallible sequence of operations — e.g. the output of the
/// differ or optimizer, which can never itself produce a malformed stream
/// but whose *composition* might still be invalid.
pub fn check_stream<I>(ops: I) -> CheckStream<I::IntoIter>
where
    I: IntoIterator<Item = Operation>,
{
    CheckStream { inner: ops.into_iter(), state: ValidatorState::new(), done: false }
}

pub struct CheckStream<I> {
    inner: I,
    state: ValidatorState,
    done: bool,
}

impl<I: Iterator<Item = Operation>> Iterator for CheckStream<I> {
    type Item = Result<Operation, CorruptPatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(op) => match self.state.observe(&op) {
                Ok(()) => Some(Ok(op)),
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            },
            None => {
                self.done = true;
                match self.state.finish() {
                    Ok(()) => None,
                    Err(e) => Some(Err(e)),
                }
            }
        }
    }
}

/// Validates a fallible sequence of operations — the decoded byte stream,
/// which can fail with an I/O error or a codec-level [`CorruptPatch`]
/// before the validator ever sees the operation.
pub fn check_decoded_stream<I>(ops: I) -> CheckDecodedStream<I::IntoIter>
where
    I: IntoIterator<Item = Result<Operation, Error>>,
{
    CheckDecodedStream { inner: ops.into_iter(), state: ValidatorState::new(), done: false }
}

pub struct CheckDecodedStream<I> {
    inner: I,
    state: ValidatorState,
    done: bool,
}

impl<I: Iterator<Item = Result<Operation, Error>>> Iterator for CheckDecodedStream<I> {
    type Item = Result<Operation, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Ok(op)) => match self.state.observe(&op) {
                Ok(()) => Some(Ok(op)),
                Err(e) => {
                    self.done = true;
                    Some(Err(e.into()))
                }
            },
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                match self.state.finish() {
                    Ok(()) => None,
                    Err(e) => Some(Err(e.into())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation as Op;

    fn ok_stream(ops: Vec<Op>) -> Result<Vec<Op>, CorruptPatch> {
        check_stream(ops).collect()
    }

    #[test]
    fn empty_patch_is_valid() {
        let ops = vec![Op::header(0, 0, ""), Op::source_crc32(0), Op::target_crc32(0)];
        assert_eq!(ok_stream(ops.clone()).unwrap(), ops);
    }

    #[test]
    fn missing_header_is_rejected() {
        let ops = vec![Op::source_crc32(0), Op::target_crc32(0)];
        assert_eq!(ok_stream(ops), Err(MissingHeader));
    }

    #[test]
    fn source_read_past_source_end_is_rejected() {
        let ops = vec![
            Op::header(1, 2, ""),
            Op::source_read(2).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(ok_stream(ops), Err(ReadsPastEndOfSource));
    }

    #[test]
    fn source_copy_past_source_end_is_rejected() {
        let ops = vec![
            Op::header(4, 2, ""),
            Op::source_copy(2, 3).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(ok_stream(ops), Err(ReadsPastEndOfSource));
    }

    #[test]
    fn target_copy_at_or_past_write_offset_is_rejected() {
        let ops = vec![
            Op::header(0, 4, ""),
            Op::target_read(vec![1, 2]).unwrap(),
            Op::target_copy(2, 2).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(ok_stream(ops), Err(ReadsPastWrittenRegion));
    }

    #[test]
    fn target_copy_run_length_is_accepted() {
        let ops = vec![
            Op::header(0, 4, ""),
            Op::target_read(vec![b'A']).unwrap(),
            Op::target_copy(3, 0).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(ok_stream(ops.clone()).unwrap(), ops);
    }

    #[test]
    fn bytespan_sum_must_equal_target_size() {
        let ops = vec![
            Op::header(0, 4, ""),
            Op::target_read(vec![1, 2]).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(ok_stream(ops), Err(Truncated));
    }

    #[test]
    fn writes_past_target_end_is_rejected() {
        let ops = vec![
            Op::header(0, 2, ""),
            Op::target_read(vec![1, 2, 3]).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ];
        assert_eq!(ok_stream(ops), Err(WritesPastEndOfTarget));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let ops = vec![
            Op::header(0, 0, ""),
            Op::source_crc32(0),
            Op::target_crc32(0),
            Op::source_crc32(0),
        ];
        assert_eq!(ok_stream(ops), Err(TrailingGarbage));
    }

    #[test]
    fn validator_is_idempotent_on_a_valid_stream() {
        let ops = vec![
            Op::header(1, 1, ""),
            Op::source_read(1).unwrap(),
            Op::source_crc32(0xD3D99E8B),
            Op::target_crc32(0xD3D99E8B),
        ];
        let once = ok_stream(ops).unwrap();
        let twice = ok_stream(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
