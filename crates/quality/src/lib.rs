//! Data quality validation for staged weather observations.
//!
//! Each source format has a [`Schema`] of per-column and per-row rules plus a
//! batch uniqueness key. The [`QualityValidator`] applies it to every staging
//! row of a pending file and writes the row flags and the file verdict; the
//! [`ConsistencyChecker`] cross-checks verdicts against the final store.

pub mod consistency;
pub mod schema;
pub mod schemas;
pub mod validator;

pub use consistency::{ConsistencyChecker, ConsistencyReport};
pub use schema::{ColumnRule, FailureCase, Schema, UniqueKey};
pub use schemas::{schema_for, INFOCLIMAT_SCHEMA, WUNDERGROUND_SCHEMA};
pub use validator::{FileVerdict, QualityValidator, ValidationReport};
