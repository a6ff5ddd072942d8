//! CRC-64/ECMA-182 checksum sink for the snapshot codec.
//!
//! Uses the non-reflected ECMA-182 catalog parameters, matching Python's
//! `crcmod.predefined.mkPredefinedCrcFun("crc-64")`. This is deliberately
//! not the Jones/reflected polynomial that real Redis uses.

use std::io::{self, Write};

use crc::{Crc, Digest, CRC_64_ECMA_182};

static ECMA_182: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// A `Write` wrapper that feeds every byte written through it into a running
/// CRC-64/ECMA-182 digest, then forwards the bytes on to an inner writer.
pub struct Crc64Writer<'a, W: Write> {
    inner: W,
    digest: Digest<'a, u64>,
}

impl<'a, W: Write> Crc64Writer<'a, W> {
    /// Wraps `inner`, starting a fresh digest.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: ECMA_182.digest(),
        }
    }

    /// Finalizes the digest computed so far and returns the checksum value.
    /// Consumes `self`, discarding access to the inner writer.
    #[must_use]
    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl<W: Write> Write for Crc64Writer<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Computes the CRC-64/ECMA-182 checksum of a byte slice directly, for
/// verifying an already-read snapshot prefix against its trailing checksum.
#[must_use]
pub fn checksum(data: &[u8]) -> u64 {
    ECMA_182.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_checksum_is_zero() {
        assert_eq!(checksum(b""), 0);
    }

    #[test]
    fn writer_and_direct_checksum_agree() {
        let data = b"REDIS0011some snapshot bytes";
        let mut out = Vec::new();
        let mut writer = Crc64Writer::new(&mut out);
        writer.write_all(data).unwrap();
        let via_writer = writer.finalize();
        assert_eq!(via_writer, checksum(data));
        assert_eq!(out, data);
    }

    #[test]
    fn writer_accumulates_across_multiple_writes() {
        let mut out = Vec::new();
        let mut writer = Crc64Writer::new(&mut out);
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.finalize(), checksum(b"hello world"));
    }

    #[test]
    fn different_inputs_produce_different_checksums() {
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
    }
}
