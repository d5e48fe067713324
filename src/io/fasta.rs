// src/io/fasta.rs
use crate::error::{Error, Result};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub header: String,
    pub sequence: String,
}

/// Streams FASTA records, joining wrapped sequence lines.
pub struct FastaStreamParser<R> {
    lines: std::io::Lines<R>,
    pending_header: Option<String>,
    source: PathBuf,
}

impl<R: BufRead> FastaStreamParser<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            lines: reader.lines(),
            pending_header: None,
            source: source.into(),
        }
    }

    fn read_record(&mut self) -> Result<Option<FastaRecord>> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                match self.lines.next() {
                    Some(line) => {
                        let line = line?;
                        if line.starts_with('>') {
                            break line;
                        }
                        if !line.trim().is_empty() {
                            return Err(Error::malformed(
                                self.source.clone(),
                                "sequence data before the first '>' header",
                            ));
                        }
                    }
                    None => return Ok(None),
                }
            },
        };

        let mut sequence = String::new();
        for line in self.lines.by_ref() {
            let line = line?;
            if line.starts_with('>') {
                self.pending_header = Some(line);
                break;
            }
            sequence.push_str(line.trim_end());
        }
        Ok(Some(FastaRecord { header, sequence }))
    }
}

impl<R: BufRead> Iterator for FastaStreamParser<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_multiline_records() {
        let data = ">a desc\nACGT\nTTGA\n>b\n\nGGCC\n";
        let records: Vec<_> = FastaStreamParser::new(Cursor::new(data), "mem")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, "ACGTTTGA");
        assert_eq!(records[1].header, ">b");
        assert_eq!(records[1].sequence, "GGCC");
    }

    #[test]
    fn test_data_before_header_rejected() {
        let result: Vec<_> = FastaStreamParser::new(Cursor::new("ACGT\n>a\nAC\n"), "mem").collect();
        assert!(result[0].is_err());
    }
}
