//! Weather observation ingestion library.
//!
//! Provides the front half of the pipeline: deciding which raw files need
//! (re)processing and loading them into staging.
//!
//! # Architecture
//!
//! - [`detector`]: source format detection from the storage key and raw-row
//!   field mapping
//! - [`reader`]: lazy JSONL record stream over object storage
//! - [`tracker`]: per-file ingestion state and the NEW / MODIFIED / RETRY /
//!   SKIP decision
//! - [`ingester`]: per-file and batch ingestion into the staging store

pub mod detector;
pub mod error;
pub mod ingester;
pub mod reader;
pub mod stations;
pub mod tracker;

// Re-exports
pub use detector::{clean_value, detect_source, MappedRow};
pub use error::{IngestionError, Result};
pub use ingester::{IngestOptions, Ingester, IngestionReport};
pub use reader::RecordReader;
pub use stations::StationDirectory;
pub use tracker::{IngestDecision, IngestionTracker};
