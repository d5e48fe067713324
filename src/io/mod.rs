//! File formats: read input, binary record streams, edge files and snapshots.

pub mod edges;
pub mod fasta;
pub mod fastq;
pub mod records;
pub mod snapshot;

use crate::error::{Error, Result};
use fasta::FastaStreamParser;
use fastq::{open_reads, FastqStreamParser};
use std::io::BufRead;
use std::path::Path;

type ReadSource = Box<dyn BufRead + Send>;

/// Read sequences from either FASTA or FASTQ input.
pub enum SequenceStream {
    Fasta(FastaStreamParser<ReadSource>),
    Fastq(FastqStreamParser<ReadSource>),
}

impl Iterator for SequenceStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SequenceStream::Fasta(p) => p.next().map(|r| r.map(|rec| rec.sequence)),
            SequenceStream::Fastq(p) => p.next().map(|r| r.map(|rec| rec.sequence)),
        }
    }
}

/// Opens a read file and picks the parser from its first byte.
pub fn read_sequences(path: &Path) -> Result<SequenceStream> {
    let mut reader = open_reads(path)?;
    let first = reader
        .fill_buf()?
        .iter()
        .copied()
        .find(|b| !b.is_ascii_whitespace());
    match first {
        Some(b'@') => Ok(SequenceStream::Fastq(FastqStreamParser::new(reader, path))),
        Some(b'>') | None => Ok(SequenceStream::Fasta(FastaStreamParser::new(reader, path))),
        Some(other) => Err(Error::malformed(
            path,
            format!("unrecognised read format (first byte {:?})", other as char),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_detects_format_and_gzip() {
        let dir = tempdir().unwrap();
        let fq = dir.path().join("reads.fq.gz");
        let mut enc = GzEncoder::new(std::fs::File::create(&fq).unwrap(), Compression::default());
        enc.write_all(b"@r\nACGT\n+\nIIII\n").unwrap();
        enc.finish().unwrap();
        let seqs: Vec<String> = read_sequences(&fq).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(seqs, vec!["ACGT"]);

        let fa = dir.path().join("reads.fa");
        std::fs::write(&fa, ">r\nAC\nGT\n").unwrap();
        let seqs: Vec<String> = read_sequences(&fa).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(seqs, vec!["ACGT"]);

        let bad = dir.path().join("reads.txt");
        std::fs::write(&bad, "hello\n").unwrap();
        assert!(read_sequences(&bad).is_err());
    }
}
