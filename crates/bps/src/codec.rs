//! The binary codec (§4.3): exact encode/decode between [`Operation`]s and
//! the on-wire BPS format, with a whole-file CRC tracked as the stream is
//! produced or consumed.

use crate::crc::{crc32, CrcReader, CrcWriter};
use crate::error::{read_err, CorruptPatch, Error};
use crate::ops::Operation;
use crate::validate::{self, CheckDecodedStream};
use crate::varint;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

/// The magic tag at the start of a patch file. This implementation is
/// built for BPS; see SPEC_FULL.md for the rationale (§9 Open Questions).
pub const MAGIC: &[u8; 4] = b"BPS1";

const OPCODEMASK: u64 = 0b11;
const OPCODESHIFT: u64 = 2;
const OP_SOURCEREAD: u64 = 0b00;
const OP_TARGETREAD: u64 = 0b01;
const OP_SOURCECOPY: u64 = 0b10;
const OP_TARGETCOPY: u64 = 0b11;

/// Decodes a BPS patch from `reader`, yielding already-validated operations.
///
/// This is the whole right-hand side of the pipeline diagram in §2: bytes
/// are parsed into operations, the running per-kind relative-offset
/// cursors are resolved into absolute offsets, and the result is passed
/// through [`validate::check_decoded_stream`] before being handed to the
/// caller. The footer's patch CRC is checked only once the stream has been
/// fully consumed, since it covers every byte that precedes it.
pub fn decode<R: Read>(reader: R) -> CheckDecodedStream<Decoder<R>> {
    validate::check_decoded_stream(Decoder::new(reader))
}

pub struct Decoder<R> {
    reader: CrcReader<R>,
    header_read: bool,
    target_size: u64,
    write_offset: u64,
    source_relative_offset: u64,
    target_relative_offset: u64,
    footer_read: bool,
    pending: Option<Operation>,
    done: bool,
}

impl<R: Read> Decoder<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: CrcReader::new(reader),
            header_read: false,
            target_size: 0,
            write_offset: 0,
            source_relative_offset: 0,
            target_relative_offset: 0,
            footer_read: false,
            pending: None,
            done: false,
        }
    }

    fn read_header(&mut self) -> Result<Operation, Error> {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic).map_err(read_err)?;
        if &magic != MAGIC {
            return Err(CorruptPatch::BadMagic { expected: MAGIC, actual: magic }.into());
        }

        let source_size = varint::read_varint(&mut self.reader)?;
        let target_size = varint::read_varint(&mut self.reader)?;
        let metadata_len = varint::read_varint(&mut self.reader)?;

        let mut metadata_bytes = vec![0u8; usize::try_from(metadata_len).map_err(|_| CorruptPatch::BadSize("metadata length overflows usize"))?];
        self.reader.read_exact(&mut metadata_bytes).map_err(read_err)?;
        let metadata = String::from_utf8(metadata_bytes).map_err(|e| CorruptPatch::BadMetadata(e.to_string()))?;

        self.target_size = target_size;
        self.header_read = true;
        Ok(Operation::header(source_size, target_size, metadata))
    }

    fn read_hunk(&mut self) -> Result<Operation, Error> {
        let encoded = varint::read_varint(&mut self.reader)?;
        let length = (encoded >> OPCODESHIFT) + 1;
        let op = match encoded & OPCODEMASK {
            OP_SOURCEREAD => Operation::source_read(length)?,
            OP_TARGETREAD => {
                let mut payload = vec![0u8; usize::try_from(length).map_err(|_| CorruptPatch::BadSize("hunk length overflows usize"))?];
                self.reader.read_exact(&mut payload).map_err(read_err)?;
                Operation::target_read(payload)?
            }
            OP_SOURCECOPY => {
                let rel = varint::read_relative_offset(&mut self.reader)?;
                let offset = self
                    .source_relative_offset
                    .checked_add_signed(rel)
                    .ok_or(CorruptPatch::ParameterOutOfRange("source offset underflows/overflows u64"))?;
                self.source_relative_offset = offset.checked_add(length).ok_or(CorruptPatch::ParameterOutOfRange("source offset overflows u64"))?;
                Operation::source_copy(length, offset)?
            }
            OP_TARGETCOPY => {
                let rel = varint::read_relative_offset(&mut self.reader)?;
                let offset = self
                    .target_relative_offset
                    .checked_add_signed(rel)
                    .ok_or(CorruptPatch::ParameterOutOfRange("target offset underflows/overflows u64"))?;
                self.target_relative_offset = offset.checked_add(length).ok_or(CorruptPatch::ParameterOutOfRange("target offset overflows u64"))?;
                Operation::target_copy(length, offset)?
            }
            tag => return Err(CorruptPatch::UnknownOpcode(tag as u8).into()),
        };
        self.write_offset += op.bytespan();
        Ok(op)
    }

    fn read_footer(&mut self) -> Result<(Operation, Operation), Error> {
        let source_crc = self.reader.read_u32::<LE>().map_err(read_err)?;
        let target_crc = self.reader.read_u32::<LE>().map_err(read_err)?;
        let actual_patch_crc = self.reader.crc32();
        let declared_patch_crc = self.reader.read_u32::<LE>().map_err(read_err)?;
        if actual_patch_crc != declared_patch_crc {
            return Err(CorruptPatch::PatchCrcMismatch { expected: declared_patch_crc, actual: actual_patch_crc }.into());
        }
        Ok((Operation::source_crc32(source_crc), Operation::target_crc32(target_crc)))
    }
}

/// Encodes `ops` as a BPS patch to `writer`.
///
/// `ops` is validated (via [`validate::check_stream`]) before anything is
/// written, mirroring `write_blip`'s `iterable = check_stream(iterable)` —
/// an invalid stream is rejected before a single byte reaches `writer`.
pub fn encode<W: Write>(ops: impl IntoIterator<Item = Operation>, writer: W) -> Result<(), Error> {
    let mut ops = validate::check_stream(ops.into_iter());
    let mut writer = CrcWriter::new(writer);

    let header = ops.next().ok_or(CorruptPatch::MissingHeader)??;
    let (source_size, target_size, metadata) = match header {
        Operation::Header { source_size, target_size, metadata } => (source_size, target_size, metadata),
        _ => unreachable!("check_stream guarantees the first operation is a Header"),
    };
    writer.write_all(MAGIC)?;
    varint::write_varint(source_size, &mut writer)?;
    varint::write_varint(target_size, &mut writer)?;
    let metadata_bytes = metadata.into_bytes();
    varint::write_varint(metadata_bytes.len() as u64, &mut writer)?;
    writer.write_all(&metadata_bytes)?;

    let mut source_relative_offset: u64 = 0;
    let mut target_relative_offset: u64 = 0;

    for op in ops {
        match op? {
            Operation::Header { .. } => unreachable!("check_stream permits only one Header"),
            Operation::SourceRead { length } => {
                varint::write_varint(((length - 1) << OPCODESHIFT) | OP_SOURCEREAD, &mut writer)?;
            }
            Operation::TargetRead { payload } => {
                varint::write_varint(((payload.len() as u64 - 1) << OPCODESHIFT) | OP_TARGETREAD, &mut writer)?;
                writer.write_all(&payload)?;
            }
            Operation::SourceCopy { length, offset } => {
                varint::write_varint(((length - 1) << OPCODESHIFT) | OP_SOURCECOPY, &mut writer)?;
                let rel = varint::relative_offset(source_relative_offset, offset)?;
                writer.write_all(&varint::encode_relative_offset(rel))?;
                source_relative_offset = offset + length;
            }
            Operation::TargetCopy { length, offset } => {
                varint::write_varint(((length - 1) << OPCODESHIFT) | OP_TARGETCOPY, &mut writer)?;
                let rel = varint::relative_offset(target_relative_offset, offset)?;
                writer.write_all(&varint::encode_relative_offset(rel))?;
                target_relative_offset = offset + length;
            }
            Operation::SourceCrc32 { value } => writer.write_u32::<LE>(value)?,
            Operation::TargetCrc32 { value } => writer.write_u32::<LE>(value)?,
        }
    }

    let patch_crc = writer.crc32();
    writer.write_u32::<LE>(patch_crc)?;
    Ok(())
}

/// Computes the CRC-32 a [`decode`]d/[`encode`]d patch would declare for a
/// buffer, for callers constructing operations by hand.
pub fn declared_crc32(data: &[u8]) -> u32 {
    crc32(data)
}

impl<R: Read> Iterator for Decoder<R> {
    type Item = Result<Operation, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(op) = self.pending.take() {
            self.done = true;
            return Some(Ok(op));
        }
        if !self.header_read {
            let result = self.read_header();
            if result.is_err() {
                self.done = true;
            }
            return Some(result);
        }
        if self.write_offset < self.target_size {
            let result = self.read_hunk();
            if result.is_err() {
                self.done = true;
            }
            return Some(result);
        }
        if !self.footer_read {
            self.footer_read = true;
            return match self.read_footer() {
                Ok((source_crc, target_crc)) => {
                    self.pending = Some(target_crc);
                    Some(Ok(source_crc))
                }
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            };
        }
        None
    }
}
