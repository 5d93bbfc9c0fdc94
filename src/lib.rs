//! Convenience layer over netCDF array files.
//!
//! This crate wraps the low-level [`netcdf`] bindings in a single
//! [`Dataset`] handle that carries the policy a typical array-file
//! workflow wants and the raw bindings do not: mode aliases and
//! append-degrades-to-create, default deflate encoding with dtype
//! inference from the payload, fill values and attributes in one map,
//! whole-array writes and record appends along the unlimited dimension,
//! mask-and-scale decoding on read, and flush-before-release semantics
//! with an idempotent close.
//!
//! # Example
//!
//! ```no_run
//! use netcdf_dataset::{Dataset, DatasetOptions, DType, Mode, Values, VarOptions};
//!
//! # fn main() -> netcdf_dataset::Result<()> {
//! let mut ds = Dataset::open(
//!     "/tmp/example.nc",
//!     DatasetOptions {
//!         mode: Mode::Write,
//!         ..Default::default()
//!     },
//! )?;
//!
//! ds.create_dim("time", 0)?;
//! ds.write_var(
//!     "temperature",
//!     None,
//!     &VarOptions {
//!         dims: vec!["time".to_string()],
//!         dtype: Some(DType::F64),
//!         ..Default::default()
//!     },
//! )?;
//! ds.append_var(
//!     "temperature",
//!     &Values::F64(vec![21.5, 21.7]),
//!     &VarOptions::default(),
//! )?;
//! ds.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Reading the file back (any mode but write-new) returns the data
//! materialized as `f64`, with `_FillValue` masking and
//! `scale_factor`/`add_offset` decoding applied by default.

pub mod attribute;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod values;

pub use attribute::{AttrMap, AttrValue};
pub use dataset::{silence_hdf5_errors, Dataset, DatasetOptions, Mode};
pub use encoding::{Encoding, VarOptions};
pub use error::{DatasetError, Result};
pub use values::{DType, Values};
