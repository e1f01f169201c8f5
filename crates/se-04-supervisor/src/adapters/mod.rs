//! Transaction sources.

mod csv;
mod memory;

pub use self::csv::CsvDataset;
pub use memory::MemorySource;
