//! Per-call write options and encoding resolution.
//!
//! Encoding settings cascade: per-call values win, the handle's defaults
//! fill the gaps, and the element type has the final say on compression
//! (non-numeric data is never compressed, whatever was requested).

use serde::{Deserialize, Serialize};

use crate::attribute::AttrMap;
use crate::error::{DatasetError, Result};
use crate::values::{DType, Values};

/// Per-call options for `write_var` and `append_var`.
///
/// Everything is optional; `Default` means "use the handle's defaults".
/// `dims`, `dtype`, `chunk_sizes` and the compression settings only matter
/// when the call ends up creating the variable; attributes are applied on
/// every write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarOptions {
    /// Dimension names the variable is bound to at creation, in order.
    pub dims: Vec<String>,
    /// Variable attributes. A `_FillValue` entry is extracted as the fill
    /// value instead of being written as a plain attribute.
    pub attrs: AttrMap,
    /// Element type; inferred from the payload when absent.
    pub dtype: Option<DType>,
    /// Compression on/off, overriding the handle default.
    pub compression: Option<bool>,
    /// Deflate level, overriding the handle default.
    pub compression_level: Option<u8>,
    /// Chunk-size hints recorded at creation, one per dimension.
    pub chunk_sizes: Option<Vec<usize>>,
}

/// The effective encoding for a variable about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub dtype: DType,
    /// Resolved deflate level; `None` means uncompressed.
    pub compression: Option<u8>,
    pub chunk_sizes: Option<Vec<usize>>,
}

/// Resolve the effective encoding for a variable write.
///
/// The explicit dtype wins over inference from the payload's element type;
/// with neither, resolution fails. The compression flag falls back to the
/// handle default and is forced off for non-numeric element types. Levels
/// outside 1-9 are clamped, not rejected.
pub fn resolve(
    name: &str,
    data: Option<&Values>,
    opts: &VarOptions,
    default_compression: bool,
    default_level: u8,
) -> Result<Encoding> {
    let dtype = match opts.dtype.or_else(|| data.map(Values::dtype)) {
        Some(dtype) => dtype,
        None => {
            return Err(DatasetError::DtypeUnknown {
                name: name.to_string(),
            })
        }
    };

    let enabled = opts.compression.unwrap_or(default_compression) && dtype.is_numeric();
    let level = opts.compression_level.unwrap_or(default_level).clamp(1, 9);

    Ok(Encoding {
        dtype,
        compression: if enabled { Some(level) } else { None },
        chunk_sizes: opts.chunk_sizes.clone(),
    })
}
