//! Error types for dataset operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Error types for dataset operations.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Opened read-only on a path that does not exist
    #[error("no such file: {}", path.display())]
    NotFound { path: PathBuf },

    /// Append attempted on a variable whose dimensions are all fixed
    #[error("cannot append to variable `{name}` without an unlimited dimension")]
    NoUnlimitedDimension { name: String },

    /// Neither an explicit dtype nor data to infer one from
    #[error("cannot determine dtype for variable `{name}`: no dtype and no data to infer from")]
    DtypeUnknown { name: String },

    /// Payload cannot be reconciled with the variable's declared extents
    #[error("data does not fit variable `{name}`: {reason}")]
    ShapeMismatch { name: String, reason: String },

    /// Variable creation referenced a dimension that was never registered
    #[error("variable `{variable}` references undefined dimension `{dimension}`")]
    UndefinedDimension { variable: String, dimension: String },

    /// Mutating operation on a handle opened read-only
    #[error("dataset is read-only: {}", path.display())]
    ReadOnly { path: PathBuf },

    /// Operation on a handle that has already been closed
    #[error("dataset handle is closed")]
    Closed,

    /// Mode string not in the accepted alias sets
    #[error("unknown file mode: {0:?}")]
    InvalidMode(String),

    /// Error from the underlying NetCDF library
    #[error("netcdf error: {0}")]
    Netcdf(#[from] netcdf::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
