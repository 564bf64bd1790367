mod cleared_bucket;
mod dispatch_record;
mod tender_zone;
pub mod timestamp;

pub use cleared_bucket::{ClearedBucketPtu, ClearingEvent, PtuVolume, PTU_HOURS};
pub use dispatch_record::DispatchRecord;
pub use tender_zone::TenderZone;
