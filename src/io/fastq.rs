// src/io/fastq.rs
use crate::error::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FastqRecord {
    pub header: String,
    pub sequence: String,
    pub quality: String,
}

/// Opens a read file, decompressing it when the name ends in `.gz`.
pub fn open_reads(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Streams FASTQ records one at a time.
///
/// Each record must be exactly four lines with a `@` header and a `+`
/// separator; sequence and quality lengths must agree.
pub struct FastqStreamParser<R> {
    lines: std::io::Lines<R>,
    source: PathBuf,
    records: u64,
}

impl<R: BufRead> FastqStreamParser<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            source: source.into(),
            records: 0,
        }
    }

    fn malformed(&self, detail: &str) -> Error {
        Error::malformed(self.source.clone(), format!("record {}: {}", self.records, detail))
    }

    fn required_line(&mut self) -> Result<String> {
        match self.lines.next() {
            Some(line) => Ok(line?),
            None => Err(self.malformed("unexpected end of file")),
        }
    }

    fn read_record(&mut self) -> Result<Option<FastqRecord>> {
        let header = loop {
            match self.lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };
        if !header.starts_with('@') {
            return Err(self.malformed("header does not start with '@'"));
        }
        let sequence = self.required_line()?;
        if !self.required_line()?.starts_with('+') {
            return Err(self.malformed("missing '+' separator"));
        }
        let quality = self.required_line()?;
        if quality.len() != sequence.len() {
            return Err(self.malformed("sequence and quality lengths differ"));
        }
        self.records += 1;
        Ok(Some(FastqRecord {
            header,
            sequence,
            quality,
        }))
    }
}

impl<R: BufRead> Iterator for FastqStreamParser<R> {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stream_records() {
        let data = "@r1\nACGTN\n+\nIIIII\n\n@r2\nTTGA\n+r2\nIIII\n";
        let records: Vec<_> = FastqStreamParser::new(Cursor::new(data), "mem")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, "ACGTN");
        assert_eq!(records[1].header, "@r2");
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let data = "@r1\nACGT\n+\n";
        let result: Vec<_> = FastqStreamParser::new(Cursor::new(data), "mem").collect();
        assert!(matches!(result[0], Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_quality_length_checked() {
        let data = "@r1\nACGT\n+\nII\n";
        let result: Vec<_> = FastqStreamParser::new(Cursor::new(data), "mem").collect();
        assert!(result[0].is_err());
    }
}
