//! Storage abstractions for the weather pipeline.
//!
//! Provides unified interfaces for:
//! - Object storage (MinIO/S3 or a local directory) for raw observation files
//! - Record stores for tracker, staging and final rows, backed by
//!   PostgreSQL or an in-memory implementation

pub mod memory;
pub mod object_store;
pub mod postgres;
pub mod store;

pub use self::object_store::{hash_bytes, ObjectStorage, ObjectStorageConfig};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    DuplicateGroup, FinalStore, InsertOutcome, StagingStore, TrackerStore, TrackerUpdate,
};
