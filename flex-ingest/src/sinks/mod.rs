pub mod csv_table;

pub use csv_table::{write_table, CsvTableSink, SinkReport};
