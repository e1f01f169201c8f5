//! CSV dataset reader.

use crate::domain::{parse_record, SupervisorResult};
use crate::ports::TxSource;
use shared_types::Transaction;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Streams plain transfers out of a dataset file, stopping after `limit`
/// accepted rows.
pub struct CsvDataset {
    lines: std::io::Lines<BufReader<File>>,
    line_no: usize,
    accepted: usize,
    limit: usize,
}

impl CsvDataset {
    pub fn open(path: &Path, limit: usize) -> SupervisorResult<Self> {
        let file = File::open(path)?;
        info!(path = %path.display(), limit, "[se-04] Dataset opened");
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            accepted: 0,
            limit,
        })
    }

    /// Rows accepted so far. Doubles as the nonce of the next transfer.
    pub fn accepted(&self) -> usize {
        self.accepted
    }
}

impl TxSource for CsvDataset {
    fn next_batch(&mut self, max: usize) -> SupervisorResult<Vec<Transaction>> {
        let mut batch = Vec::new();
        while batch.len() < max && self.accepted < self.limit {
            let Some(line) = self.lines.next() else {
                break;
            };
            let line = line?;
            self.line_no += 1;
            if let Some(tx) = parse_record(&line, self.line_no, self.accepted as u64)? {
                batch.push(tx);
                self.accepted += 1;
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "blockNumber,timestamp,hash,from,to,gas,isCreation,isCall,value";

    fn dataset(rows: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for i in 0..rows {
            writeln!(
                file,
                "1,0,0xh,0x{:040x},0x{:040x},21000,0,0,{}",
                i + 1,
                i + 1000,
                i * 10
            )
            .unwrap();
            writeln!(file, "1,0,0xh,0x{:040x},0x{:040x},21000,1,0,5", i, i + 1).unwrap();
        }
        file
    }

    #[test]
    fn test_batches_skip_contract_rows() {
        let file = dataset(5);
        let mut source = CsvDataset::open(file.path(), 100).unwrap();
        let first = source.next_batch(3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].nonce, 2);
        let rest = source.next_batch(3).unwrap();
        assert_eq!(rest.len(), 2);
        assert!(source.next_batch(3).unwrap().is_empty());
    }

    #[test]
    fn test_limit_caps_accepted_rows() {
        let file = dataset(5);
        let mut source = CsvDataset::open(file.path(), 4).unwrap();
        assert_eq!(source.next_batch(10).unwrap().len(), 4);
        assert!(source.next_batch(10).unwrap().is_empty());
        assert_eq!(source.accepted(), 4);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CsvDataset::open(Path::new("/nonexistent/emulator.csv"), 1);
        assert!(matches!(err, Err(crate::domain::SupervisorError::Io(_))));
    }
}
