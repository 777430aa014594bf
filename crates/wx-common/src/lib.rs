//! Common types and utilities shared across the weather observation pipeline.

pub mod error;
pub mod records;
pub mod source;
pub mod time;

pub use error::{WxError, WxResult};
pub use records::{
    FieldError, FinalDraft, FinalRecord, IngestionRecord, InfoClimatFields, Measurements, RecordErrors,
    StagingFields, StagingRecord, WundergroundFields,
};
pub use source::SourceFormat;
pub use time::parse_utc_timestamp;
