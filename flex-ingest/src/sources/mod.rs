pub mod date_chunked;
pub mod http_paged;

/// One upstream record as a field-name → JSON value mapping.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

pub use date_chunked::{DateChunkedSource, DateRange};
pub use http_paged::{FetchError, PageStyle, PagedSource};
