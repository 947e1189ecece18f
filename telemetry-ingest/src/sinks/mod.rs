pub mod dead_letter;
pub mod ndjson;

pub use dead_letter::DeadLetterWriter;
pub use ndjson::NdjsonSink;
