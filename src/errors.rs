//! Structural errors that make the input untrustworthy.
//!
//! These abort the run before reconciliation. Per-sample classification
//! failures are not errors in this sense; they travel as
//! [`crate::types::SampleCall::Unresolved`].

use thiserror::Error;

/// Result type alias for structural checks
pub type Result<T> = std::result::Result<T, AseError>;

#[derive(Error, Debug)]
pub enum AseError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A (CHROM, POS) key appears twice in one table
    #[error("Duplicate site {chrom}:{pos} in table '{table}' (rows {first_row} and {second_row})")]
    DuplicateSite {
        table: String,
        chrom: String,
        pos: u64,
        first_row: usize,
        second_row: usize,
    },

    /// A column required by the roster is absent from a table header
    #[error("Table '{table}' is missing expected column '{column}'")]
    MissingColumn { table: String, column: String },

    /// A sample named in pairing, grouping or anchor settings is not in the roster
    #[error("Sample '{sample}' referenced by {context} is not in the sample roster")]
    UnknownSample { context: String, sample: String },

    /// A cell could not be parsed into the expected type
    #[error("Table '{table}' row {row}, column '{column}': cannot parse '{value}'")]
    InvalidValue {
        table: String,
        row: usize,
        column: String,
        value: String,
    },
}
