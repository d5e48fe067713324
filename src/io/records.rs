// src/io/records.rs
//! Fixed-width little-endian record streams.
//!
//! Two formats share the same word layout: the deduplicated k-mer stream
//! (`words_for(k)` u64 words per record) and the complex node file
//! (`words_for(k-1)` words followed by incoming and outgoing slot values as
//! u32).

use crate::error::{Error, Result};
use crate::kmer::kmer::{words_for, Kmer};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Writes one packed k-mer record.
pub fn write_kmer_record<W: Write>(writer: &mut W, kmer: &Kmer) -> Result<()> {
    for word in kmer.words() {
        writer.write_all(&word.to_le_bytes())?;
    }
    Ok(())
}

/// Fills `buf` completely, or reports a clean end of stream when nothing was
/// read. A partial fill is a truncated record.
fn read_record(reader: &mut impl Read, buf: &mut [u8], source: &Path, record: u64) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(false),
        n if n == buf.len() => Ok(true),
        n => Err(Error::malformed(
            source,
            format!("record {} truncated after {} of {} bytes", record, n, buf.len()),
        )),
    }
}

pub(crate) fn words_from_le(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

/// Streams packed k-mers of a fixed length until end of input.
pub struct KmerRecordReader<R> {
    reader: R,
    kmer_len: usize,
    buf: Vec<u8>,
    source: PathBuf,
    records: u64,
}

impl<R: Read> KmerRecordReader<R> {
    /// # Arguments
    /// * `source` - Name used in error messages
    pub fn new(reader: R, kmer_len: usize, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            kmer_len,
            buf: vec![0; words_for(kmer_len) * 8],
            source: source.into(),
            records: 0,
        }
    }
}

impl<R: Read> Iterator for KmerRecordReader<R> {
    type Item = Result<Kmer>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_record(&mut self.reader, &mut self.buf, &self.source, self.records) {
            Ok(true) => {
                self.records += 1;
                Some(Ok(Kmer::from_words(words_from_le(&self.buf), self.kmer_len)))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// A branching node as emitted by the discovery scan, in canonical orientation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComplexNodeRecord {
    pub seq: Kmer,
    pub incoming: [u32; 4],
    pub outgoing: [u32; 4],
}

impl ComplexNodeRecord {
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_kmer_record(writer, &self.seq)?;
        for slot in self.incoming.iter().chain(&self.outgoing) {
            writer.write_all(&slot.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Streams complex node records for nodes of length `node_len` (k-1).
pub struct ComplexNodeReader<R> {
    reader: R,
    node_len: usize,
    buf: Vec<u8>,
    source: PathBuf,
    records: u64,
}

impl<R: Read> ComplexNodeReader<R> {
    pub fn new(reader: R, node_len: usize, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            node_len,
            buf: vec![0; words_for(node_len) * 8 + 8 * 4],
            source: source.into(),
            records: 0,
        }
    }
}

impl<R: Read> Iterator for ComplexNodeReader<R> {
    type Item = Result<ComplexNodeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_record(&mut self.reader, &mut self.buf, &self.source, self.records) {
            Ok(true) => {
                self.records += 1;
                let seq_bytes = words_for(self.node_len) * 8;
                let seq = Kmer::from_words(words_from_le(&self.buf[..seq_bytes]), self.node_len);
                let mut slots = [0u32; 8];
                for (slot, c) in slots.iter_mut().zip(self.buf[seq_bytes..].chunks_exact(4)) {
                    *slot = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                }
                let mut incoming = [0u32; 4];
                let mut outgoing = [0u32; 4];
                incoming.copy_from_slice(&slots[..4]);
                outgoing.copy_from_slice(&slots[4..]);
                Some(Ok(ComplexNodeRecord {
                    seq,
                    incoming,
                    outgoing,
                }))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
