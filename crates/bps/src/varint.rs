//! The base-128 variable-length integer encoding used throughout the wire
//! format (§4.3), plus the signed relative-offset transform used only for
//! `SourceCopy`/`TargetCopy` offsets on the wire.

use crate::error::{read_err, CorruptPatch, Error};
use byteorder::ReadBytesExt;
use checked::Checked;
use checked_signed_diff::prelude::*;
use std::io::{self, Read, Write};

/// Reads a varint: `result = 0; shift = 1; loop { b = read(); result +=
/// (b & 0x7F) * shift; if b & 0x80 != 0 { break }; shift <<= 7; result +=
/// shift }`. Overflow (a pathologically long run of continuation bytes) is
/// reported as [`CorruptPatch::ParameterOutOfRange`]; a genuine I/O fault
/// reading `reader` (anything other than an unexpected EOF, which is
/// patch truncation rather than an I/O failure) stays an [`Error::Io`]
/// rather than being folded into patch corruption, same as [`read_err`]
/// does at the codec's other read sites.
pub fn read_varint<R: Read>(reader: &mut R) -> Result<u64, Error> {
    let overflow = || CorruptPatch::ParameterOutOfRange("varint overflows u64");
    let mut result = Checked::<u64>::new(0);
    let mut shift = Checked::<u64>::new(1);

    loop {
        let byte = reader.read_u8().map_err(read_err)?;
        result = Checked::new(u64::from(byte & 0x7F)) * shift + result;
        if byte & 0x80 != 0 {
            return Ok(result.ok_or_else(overflow)?);
        }
        shift = shift * 128;
        result = result + shift;
    }
}

/// Encodes `number` as a varint: the symmetric inverse of [`read_varint`].
pub fn encode_varint(mut number: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut shift: u64 = 1;

    loop {
        let mut byte = (number & 0x7F) as u8;
        number -= u64::from(byte);

        if number == 0 {
            byte |= 0x80;
            buf.push(byte);
            break;
        }

        buf.push(byte);
        number -= shift;
        number >>= 7;
        shift += 7;
    }

    buf
}

pub fn write_varint<W: Write>(number: u64, writer: &mut W) -> io::Result<()> {
    writer.write_all(&encode_varint(number))
}

/// Reads a signed relative offset: `raw = varint; rel = raw >> 1; if raw &
/// 1 { rel = -rel }`.
pub fn read_relative_offset<R: Read>(reader: &mut R) -> Result<i64, Error> {
    let raw = read_varint(reader)?;
    let magnitude = i64::try_from(raw >> 1)
        .map_err(|_| CorruptPatch::ParameterOutOfRange("relative offset overflows i64"))?;
    Ok(if raw & 1 != 0 { -magnitude } else { magnitude })
}

/// Encodes a signed relative offset: `raw = (|rel| << 1) | (rel < 0)`.
pub fn encode_relative_offset(rel: i64) -> Vec<u8> {
    let magnitude = rel.unsigned_abs();
    let raw = (magnitude << 1) | u64::from(rel < 0);
    encode_varint(raw)
}

/// Computes the signed relative offset between an absolute `offset` and a
/// running `cursor`, for use by the encoder. Both values fit in practice
/// well within `i64`'s range for any patch this crate can otherwise encode,
/// but the subtraction is still done with checked arithmetic to avoid
/// panicking on pathological input rather than reporting a clean error.
pub fn relative_offset(cursor: u64, offset: u64) -> Result<i64, CorruptPatch> {
    offset
        .checked_signed_difference(cursor)
        .ok_or(CorruptPatch::ParameterOutOfRange("offset delta overflows i64"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(n: u64) {
        let encoded = encode_varint(n);
        let decoded = read_varint(&mut Cursor::new(encoded)).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn reference_values_from_the_spec() {
        assert_eq!(encode_varint(0), vec![0x80]);
        assert_eq!(encode_varint(1), vec![0x81]);
        assert_eq!(encode_varint(127), vec![0xFF]);
        assert_eq!(encode_varint(128), vec![0x00, 0x80]);
        assert_eq!(encode_varint(129), vec![0x01, 0x80]);
        assert_eq!(encode_varint(255), vec![0x7F, 0x80]);
        assert_eq!(encode_varint(256), vec![0x00, 0x81]);
    }

    #[test]
    fn roundtrips_at_byte_boundaries() {
        for n in [0, 1, 126, 127, 128, 129, 254, 255, 256, 257, u32::MAX as u64, u64::MAX / 2] {
            roundtrip(n);
        }
    }

    #[test]
    fn truncated_stream_is_an_error() {
        assert!(matches!(
            read_varint(&mut Cursor::new(Vec::<u8>::new())),
            Err(Error::Corrupt(CorruptPatch::Truncated))
        ));
        // 0x00 never sets the continuation bit, so this run never terminates
        // and eventually overflows rather than looping forever.
        assert!(read_varint(&mut Cursor::new(vec![0u8; 16])).is_err());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn a_genuine_io_fault_stays_distinct_from_patch_corruption() {
        // Anything other than an unexpected EOF is a real I/O failure, not
        // patch truncation, and must surface as `Error::Io` rather than
        // being folded into `CorruptPatch::Truncated`.
        assert!(matches!(read_varint(&mut FailingReader), Err(Error::Io(_))));
    }

    #[test]
    fn relative_offset_roundtrips_signed_values() {
        for rel in [0i64, 1, -1, 127, -127, 128, -128, i32::MAX as i64] {
            let encoded = encode_relative_offset(rel);
            let decoded = read_relative_offset(&mut Cursor::new(encoded)).unwrap();
            assert_eq!(decoded, rel);
        }
    }

    #[test]
    fn relative_offset_computation_matches_manual_subtraction() {
        assert_eq!(relative_offset(100, 103).unwrap(), 3);
        assert_eq!(relative_offset(103, 100).unwrap(), -3);
        assert_eq!(relative_offset(0, 0).unwrap(), 0);
    }
}
