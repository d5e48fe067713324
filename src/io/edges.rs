// src/io/edges.rs
//! FASTQ-style edge records.
//!
//! ```text
//! @<edgeID>\t<startNodeID>\t<endNodeID>
//! <bases>
//! +
//! <confidence + 33>
//! ```

use crate::error::{Error, Result};
use crate::graph::edge::DbgEdge;
use crate::graph::node::{EdgeId, FIRST_ID};
use crate::kmer::kmer::{decode_base, encode_bases};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const QUAL_OFFSET: u8 = 33;
const QUAL_MAX_CHAR: u8 = b'~';

/// Writes one edge record.
pub fn write_edge<W: Write>(writer: &mut W, edge: &DbgEdge) -> Result<()> {
    if edge.qual.len() != edge.seq.len() {
        return Err(Error::Inconsistent(format!(
            "edge {} has {} bases but {} confidence values",
            edge.id,
            edge.seq.len(),
            edge.qual.len()
        )));
    }
    writeln!(writer, "@{}\t{}\t{}", edge.id, edge.start_nid, edge.end_nid)?;
    let bases: Vec<u8> = edge.seq.iter().map(|&b| decode_base(b)).collect();
    writer.write_all(&bases)?;
    writer.write_all(b"\n+\n")?;
    let qual: Vec<u8> = edge
        .qual
        .iter()
        .map(|&q| q.saturating_add(QUAL_OFFSET).min(QUAL_MAX_CHAR))
        .collect();
    writer.write_all(&qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes every live edge of an arena and returns how many were written.
pub fn write_edges(path: &Path, edges: &[DbgEdge]) -> Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for edge in edges.iter().filter(|e| e.id >= FIRST_ID && !e.is_deleted()) {
        write_edge(&mut writer, edge)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Streams edge records back from a reader.
pub struct EdgeReader<R> {
    lines: std::io::Lines<R>,
    source: PathBuf,
    line_no: usize,
}

impl<R: BufRead> EdgeReader<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            source: source.into(),
            line_no: 0,
        }
    }

    fn malformed(&self, detail: impl Into<String>) -> Error {
        Error::malformed(
            self.source.clone(),
            format!("line {}: {}", self.line_no, detail.into()),
        )
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_no += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn required_line(&mut self) -> Result<String> {
        self.next_line()?
            .ok_or_else(|| self.malformed("unexpected end of file inside a record"))
    }

    fn parse_header(&self, header: &str) -> Result<(u32, u32, u32)> {
        let fields: Vec<&str> = header
            .strip_prefix('@')
            .ok_or_else(|| self.malformed("header does not start with '@'"))?
            .split('\t')
            .collect();
        if fields.len() != 3 {
            return Err(self.malformed(format!("expected 3 header fields, found {}", fields.len())));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| self.malformed(format!("invalid ID {:?}", s)))
        };
        Ok((parse(fields[0])?, parse(fields[1])?, parse(fields[2])?))
    }

    fn read_record(&mut self) -> Result<Option<DbgEdge>> {
        let header = loop {
            match self.next_line()? {
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
                None => return Ok(None),
            }
        };
        let (id, start, end) = self.parse_header(&header)?;
        let bases = self.required_line()?;
        let plus = self.required_line()?;
        if !plus.starts_with('+') {
            return Err(self.malformed("missing '+' separator"));
        }
        let qual_line = self.required_line()?;
        if qual_line.len() != bases.len() {
            return Err(self.malformed(format!(
                "edge {}: {} bases but {} quality symbols",
                id,
                bases.len(),
                qual_line.len()
            )));
        }
        let seq = encode_bases(bases.as_bytes()).map_err(|e| self.malformed(e.to_string()))?;
        let qual = qual_line.bytes().map(|q| q.saturating_sub(QUAL_OFFSET)).collect();
        Ok(Some(DbgEdge::new(id, start, end, seq, qual)))
    }
}

impl<R: BufRead> Iterator for EdgeReader<R> {
    type Item = Result<DbgEdge>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

/// Reads an edge file into an arena indexed by edge ID.
///
/// Index 0 and 1, and any ID without a record, hold deleted placeholders.
pub fn read_edges(path: &Path, kmer_len: usize, expected: Option<usize>) -> Result<Vec<DbgEdge>> {
    let reader = EdgeReader::new(BufReader::new(File::open(path)?), path);
    let mut edges: Vec<DbgEdge> = vec![DbgEdge::placeholder(), DbgEdge::placeholder()];
    if let Some(n) = expected {
        edges.reserve(n);
    }
    for edge in reader {
        let mut edge = edge?;
        let id = edge.id as usize;
        if edge.id < FIRST_ID {
            return Err(Error::malformed(path, format!("edge ID {} is reserved", edge.id)));
        }
        if edge.len() < kmer_len {
            return Err(Error::malformed(
                path,
                format!("edge {} has {} bases, fewer than k={}", edge.id, edge.len(), kmer_len),
            ));
        }
        if id < edges.len() && !edges[id].is_deleted() {
            return Err(Error::malformed(path, format!("edge ID {} appears twice", edge.id)));
        }
        if id >= edges.len() {
            edges.resize_with(id + 1, DbgEdge::placeholder);
        }
        edge.compute_cov_depth(kmer_len);
        edges[id] = edge;
    }
    Ok(edges)
}

/// Highest edge ID in an arena.
pub fn max_edge_id(edges: &[DbgEdge]) -> EdgeId {
    edges.len().saturating_sub(1) as EdgeId
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    fn sample_edge(id: u32) -> DbgEdge {
        DbgEdge::new(
            id,
            3,
            0,
            encode_bases(b"ACGTTGCA").unwrap(),
            vec![0, 0, 0, 0, 7, 7, 8, 9],
        )
    }

    #[test]
    fn test_record_format() {
        let mut buf = Vec::new();
        write_edge(&mut buf, &sample_edge(2)).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "@2\t3\t0\nACGTTGCA\n+\n!!!!(()*\n");
    }

    #[test]
    fn test_quality_clamped_to_printable() {
        let mut edge = sample_edge(2);
        edge.qual[0] = 250;
        let mut buf = Vec::new();
        write_edge(&mut buf, &edge).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("~!!!"));
    }

    #[test]
    fn test_reader_rejects_length_mismatch() {
        let text = "@2\t3\t0\nACGT\n+\n!!!\n";
        let result: Vec<_> = EdgeReader::new(Cursor::new(text), "mem").collect();
        assert!(matches!(result[0], Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_reader_rejects_truncated_record() {
        let text = "@2\t3\t0\nACGT\n";
        let result: Vec<_> = EdgeReader::new(Cursor::new(text), "mem").collect();
        assert!(matches!(result[0], Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_arena_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let mut edges = vec![DbgEdge::placeholder(), DbgEdge::placeholder(), sample_edge(2), sample_edge(3)];
        edges[3].set_deleted();
        edges.push(sample_edge(4));
        assert_eq!(write_edges(file.path(), &edges).unwrap(), 2);

        let read = read_edges(file.path(), 5, None).unwrap();
        assert_eq!(read.len(), 5);
        assert!(read[3].is_deleted());
        assert_eq!(read[4].seq, edges[4].seq);
        assert_eq!(read[4].qual, edges[4].qual);
        assert_eq!(read[4].cov_depth, 7);
        assert_eq!(max_edge_id(&read), 4);
    }

    #[test]
    fn test_read_rejects_edge_shorter_than_k() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "@2\t3\t0\nACG\n+\n!!!\n").unwrap();
        assert!(matches!(
            read_edges(file.path(), 5, None),
            Err(Error::Malformed { .. })
        ));
    }
}
