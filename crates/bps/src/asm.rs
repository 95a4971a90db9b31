//! The assembler text format (§6.2): a line-oriented mirror of the binary
//! patch, optional but cheap to support. Grounded in
//! `blip/asm.py`/`blip/io.py::read_blip_asm`/`write_blip_asm`; reuses the
//! same [`Operation`]/[`CorruptPatch`] types as the binary codec.

use crate::error::{read_err, CorruptPatch, Error};
use crate::ops::Operation;
use std::io::{BufRead, Write};

const MAGIC_LINE: &str = "bpsasm";
const HEX_BYTES_PER_LINE: usize = 20;

/// Writes `ops` as assembler text to `writer`.
pub fn write_asm<W: Write>(ops: impl IntoIterator<Item = Operation>, mut writer: W) -> Result<(), Error> {
    writeln!(writer, "{MAGIC_LINE}")?;

    let mut ops = ops.into_iter();
    let (source_size, target_size, metadata) = match ops.next().ok_or(CorruptPatch::MissingHeader)? {
        Operation::Header { source_size, target_size, metadata } => (source_size, target_size, metadata),
        _ => return Err(CorruptPatch::MissingHeader.into()),
    };

    writeln!(writer, "sourcesize: {source_size}")?;
    writeln!(writer, "targetsize: {target_size}")?;
    writeln!(writer, "metadata:")?;
    for line in metadata.split('\n') {
        if line.starts_with('.') {
            writeln!(writer, ".{line}")?;
        } else {
            writeln!(writer, "{line}")?;
        }
    }
    writeln!(writer, ".")?;

    for op in ops {
        match op {
            Operation::Header { .. } => return Err(CorruptPatch::OutOfOrderOpcode("Header must be first").into()),
            Operation::SourceRead { length } => writeln!(writer, "sourceread: {length}")?,
            Operation::TargetRead { payload } => {
                writeln!(writer, "targetread:")?;
                for chunk in payload.chunks(HEX_BYTES_PER_LINE) {
                    let mut hex_line = String::with_capacity(chunk.len() * 2);
                    for byte in chunk {
                        hex_line.push_str(&format!("{byte:02x}"));
                    }
                    writeln!(writer, "{hex_line}")?;
                }
                writeln!(writer, ".")?;
            }
            // Written with an explicit leading sign (always `+`, since
            // `Operation`'s offsets are absolute and never negative) to
            // match §6.2's `<signed-decimal>` field, per
            // `blip/io.py::write_blip_asm`'s `"{1} {2:+d}"` formatting.
            Operation::SourceCopy { length, offset } => writeln!(writer, "sourcecopy: {length} +{offset}")?,
            Operation::TargetCopy { length, offset } => writeln!(writer, "targetcopy: {length} +{offset}")?,
            Operation::SourceCrc32 { value } => writeln!(writer, "sourcecrc32: {value:08x}")?,
            Operation::TargetCrc32 { value } => writeln!(writer, "targetcrc32: {value:08x}")?,
        }
    }
    Ok(())
}

/// Reads assembler text from `reader`, yielding the operations it describes.
pub fn read_asm<R: BufRead>(mut reader: R) -> Result<Vec<Operation>, Error> {
    let magic = next_line(&mut reader)?;
    if magic != MAGIC_LINE {
        return Err(CorruptPatch::AsmFormat(format!("expected {MAGIC_LINE:?}, got {magic:?}")).into());
    }

    let source_size = parse_field(&next_line(&mut reader)?, "sourcesize")?;
    let target_size = parse_field(&next_line(&mut reader)?, "targetsize")?;

    let metadata_tag = next_line(&mut reader)?;
    if metadata_tag != "metadata:" {
        return Err(CorruptPatch::AsmFormat(format!("expected 'metadata:', got {metadata_tag:?}")).into());
    }
    let mut metadata_lines = Vec::new();
    loop {
        let line = next_line(&mut reader)?;
        if line == "." {
            break;
        }
        metadata_lines.push(line.strip_prefix('.').map(str::to_string).unwrap_or(line));
    }

    let mut ops = vec![Operation::header(source_size, target_size, metadata_lines.join("\n"))];

    while let Some(line) = next_line_opt(&mut reader)? {
        if let Some(rest) = line.strip_prefix("sourceread: ") {
            let length = parse_u64(rest, "sourceread")?;
            ops.push(Operation::source_read(length)?);
        } else if line == "targetread:" {
            let mut hex = String::new();
            loop {
                let hex_line = next_line(&mut reader)?;
                if hex_line == "." {
                    break;
                }
                hex.push_str(&hex_line);
            }
            ops.push(Operation::target_read(decode_hex(&hex)?)?);
        } else if let Some(rest) = line.strip_prefix("sourcecopy: ") {
            let (length, offset) = parse_length_offset(rest)?;
            ops.push(Operation::source_copy(length, offset)?);
        } else if let Some(rest) = line.strip_prefix("targetcopy: ") {
            let (length, offset) = parse_length_offset(rest)?;
            ops.push(Operation::target_copy(length, offset)?);
        } else if let Some(rest) = line.strip_prefix("sourcecrc32: ") {
            ops.push(Operation::source_crc32(parse_hex_u32(rest, "sourcecrc32")?));
        } else if let Some(rest) = line.strip_prefix("targetcrc32: ") {
            ops.push(Operation::target_crc32(parse_hex_u32(rest, "targetcrc32")?));
            break;
        } else {
            return Err(CorruptPatch::AsmFormat(format!("unrecognized line: {line:?}")).into());
        }
    }

    Ok(ops)
}

fn next_line_opt<R: BufRead>(reader: &mut R) -> Result<Option<String>, Error> {
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).map_err(read_err)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
    Ok(Some(buf))
}

fn next_line<R: BufRead>(reader: &mut R) -> Result<String, Error> {
    next_line_opt(reader)?.ok_or_else(|| CorruptPatch::AsmFormat("unexpected end of file".into()).into())
}

fn parse_field(line: &str, name: &str) -> Result<u64, Error> {
    let prefix = format!("{name}: ");
    let rest = line
        .strip_prefix(prefix.as_str())
        .ok_or_else(|| CorruptPatch::AsmFormat(format!("expected '{prefix}...', got {line:?}")))?;
    parse_u64(rest, name)
}

fn parse_u64(text: &str, field: &str) -> Result<u64, Error> {
    text.parse()
        .map_err(|_| CorruptPatch::AsmFormat(format!("bad {field} value: {text:?}")).into())
}

fn parse_length_offset(rest: &str) -> Result<(u64, u64), Error> {
    let mut parts = rest.split_whitespace();
    let bad = || CorruptPatch::AsmFormat(format!("bad length/offset line: {rest:?}"));
    let length = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    let offset = parts.next().and_then(|s| s.parse().ok()).ok_or_else(bad)?;
    Ok((length, offset))
}

fn parse_hex_u32(text: &str, field: &str) -> Result<u32, Error> {
    u32::from_str_radix(text, 16).map_err(|_| CorruptPatch::AsmFormat(format!("bad {field} value: {text:?}")).into())
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, Error> {
    if hex.len() % 2 != 0 {
        return Err(CorruptPatch::AsmFormat("odd-length hex payload".into()).into());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CorruptPatch::AsmFormat(format!("bad hex byte at offset {i}")).into())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation as Op;

    fn roundtrip(ops: Vec<Operation>) {
        let mut text = Vec::new();
        write_asm(ops.clone(), &mut text).unwrap();
        let parsed = read_asm(&text[..]).unwrap();
        assert_eq!(parsed, ops);
    }

    #[test]
    fn roundtrips_a_simple_patch() {
        roundtrip(vec![
            Op::header(4, 6, "hi"),
            Op::source_read(2).unwrap(),
            Op::target_read(vec![b'X', b'Y']).unwrap(),
            Op::source_copy(2, 0).unwrap(),
            Op::source_crc32(0xDEADBEEF),
            Op::target_crc32(0x12345678),
        ]);
    }

    #[test]
    fn roundtrips_multiline_dot_escaped_metadata() {
        roundtrip(vec![
            Op::header(0, 0, "line one\n.looks like a terminator\nline three"),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ]);
    }

    #[test]
    fn roundtrips_a_long_target_read_payload_across_hex_lines() {
        let payload: Vec<u8> = (0..50u8).collect();
        roundtrip(vec![
            Op::header(0, payload.len() as u64, ""),
            Op::target_read(payload).unwrap(),
            Op::source_crc32(0),
            Op::target_crc32(0),
        ]);
    }

    #[test]
    fn rejects_wrong_magic_line() {
        let text = b"blipasm\nsourcesize: 0\ntargetsize: 0\nmetadata:\n.\n";
        assert!(read_asm(&text[..]).is_err());
    }
}
