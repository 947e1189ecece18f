pub mod http_json;
pub mod raw_ndjson_file;

pub use http_json::HttpJsonSource;
pub use raw_ndjson_file::RawPayloadFileSource;
