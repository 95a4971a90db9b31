//! A thin CRC-tracking filter over a byte sink or source, used to compute
//! the whole-file patch CRC as a patch is read or written (§4.3, §9). Does
//! not implement `Seek` — the running digest would otherwise be meaningless.

use std::io::{self, Read, Write};

/// Wraps a [`Read`], accumulating a running CRC-32 of every byte read.
pub struct CrcReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, hasher: crc32fast::Hasher::new() }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Wraps a [`Write`], accumulating a running CRC-32 of every byte written.
pub struct CrcWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, hasher: crc32fast::Hasher::new() }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Resets the running digest to zero, as if nothing had been written.
    /// Corresponds to `CRCIOWrapper.truncate(0)` in the original
    /// implementation — the only truncation this wrapper allows.
    pub fn reset(&mut self) {
        self.hasher = crc32fast::Hasher::new();
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Computes the CRC-32 (IEEE polynomial) of an in-memory buffer.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
