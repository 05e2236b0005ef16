//! CSV input and output

pub mod reader;
pub mod writer;

pub use reader::{ReadError, RecordBatch, RejectedRow, read_records, read_records_from_path};
pub use writer::{AllocationWriter, WriteError, default_output_path, summary_path_for};
