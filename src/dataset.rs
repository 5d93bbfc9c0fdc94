//! The dataset handle.
//!
//! One [`Dataset`] owns one open netCDF file and mediates every dimension,
//! variable and attribute operation against it. The handle adds the policy
//! layer (mode resolution, encoding defaults, fill-value extraction,
//! append extents, flush-before-release) while the file format itself is
//! delegated to libnetcdf through the `netcdf` crate.
//!
//! # Lifecycle
//!
//! A handle is created by [`Dataset::open`], mutated through the write and
//! attribute calls, and released by [`Dataset::close`] (or by going out of
//! scope; `Drop` closes too). Global attributes buffer in memory and reach
//! the file at flush time, never at assignment time. Close is idempotent
//! and releases the underlying resource exactly once.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Once;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::attribute::{AttrMap, AttrValue};
use crate::encoding::{self, VarOptions};
use crate::error::{DatasetError, Result};
use crate::values::{DType, Values};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose diagnostics to stderr even when the
/// failure is handled gracefully on the Rust side; probing a variable for
/// an optional attribute such as `scale_factor` is enough to trigger a
/// multi-line dump. `H5Eset_auto2` with null handlers disables that
/// output. Runs once per process; [`Dataset::open`] calls it, but programs
/// that touch HDF5 earlier can call it themselves at startup.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe; null handlers are the
        // documented way to disable automatic error reporting.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// File access mode, after alias normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Existing file, read only.
    Read,
    /// New file, truncating any file already at the path.
    Write,
    /// Existing file opened read-write; degrades to [`Mode::Write`] when
    /// the path does not exist yet.
    Append,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Read => "r",
            Mode::Write => "w",
            Mode::Append => "a",
        }
    }
}

impl FromStr for Mode {
    type Err = DatasetError;

    /// Parse the mode spellings of the netCDF world: `r`/`read`,
    /// `w`/`write`, and the append aliases `a`, `a+`, `r+`, `append`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(Mode::Read),
            "w" | "write" => Ok(Mode::Write),
            "a" | "a+" | "r+" | "append" => Ok(Mode::Append),
            other => Err(DatasetError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options for opening a dataset.
///
/// `Default` gives a read-only handle with the conventional encoding
/// defaults: deflate on at level 4, scale/offset decoding and fill masking
/// enabled on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetOptions {
    /// Label stored as the `dataset_name` global attribute on new files.
    pub name: Option<String>,
    pub mode: Mode,
    /// Default compression flag for newly created variables.
    pub compression: bool,
    /// Default deflate level (1-9) for newly created variables.
    pub compression_level: u8,
    /// Apply `scale_factor`/`add_offset` when reading.
    pub autoscale: bool,
    /// Replace `_FillValue` matches with NaN when reading.
    pub automask: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            name: None,
            mode: Mode::Read,
            compression: true,
            compression_level: 4,
            autoscale: true,
            automask: true,
        }
    }
}

/// The open resource. Write-capable modes hold the mutable handle.
#[derive(Debug)]
enum Backing {
    Read(netcdf::File),
    Write(netcdf::FileMut),
}

impl Backing {
    fn as_file(&self) -> &netcdf::File {
        match self {
            Backing::Read(file) => file,
            Backing::Write(file) => file,
        }
    }
}

/// Handle over one open netCDF file.
///
/// See the [module docs](self) for the lifecycle; the crate root carries a
/// usage example.
#[derive(Debug)]
pub struct Dataset {
    path: PathBuf,
    mode: Mode,
    compression: bool,
    compression_level: u8,
    autoscale: bool,
    automask: bool,
    global_attrs: AttrMap,
    backing: Option<Backing>,
}

impl Dataset {
    /// Open `path` in the mode given by `options`.
    ///
    /// Append mode on a path that does not exist degrades to write-new
    /// (create-if-absent-else-append); the handle's recorded mode becomes
    /// write-new. Write-new creates missing parent directories first and
    /// seeds the pending global attributes with `id` (the file name),
    /// `date_created`, and `dataset_name` when a name label was given.
    /// Read-only on a missing path fails with [`DatasetError::NotFound`].
    pub fn open<P: AsRef<Path>>(path: P, options: DatasetOptions) -> Result<Self> {
        silence_hdf5_errors();

        let path = path.as_ref().to_path_buf();
        let mut mode = options.mode;

        // Create-if-absent-else-append: a missing target turns append into
        // a plain write-new open.
        if mode == Mode::Append && !path.exists() {
            debug!(path = %path.display(), "Append target missing, creating a new file");
            mode = Mode::Write;
        }

        let backing = match mode {
            Mode::Read => {
                if !path.exists() {
                    return Err(DatasetError::NotFound { path });
                }
                Backing::Read(netcdf::open(&path)?)
            }
            Mode::Append => Backing::Write(netcdf::append(&path)?),
            Mode::Write => {
                create_parent_dirs(&path)?;
                Backing::Write(netcdf::create(&path)?)
            }
        };

        let mut global_attrs = AttrMap::new();
        if mode == Mode::Write {
            // Fresh files carry identifying metadata; persisted at flush.
            let id = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => String::new(),
            };
            global_attrs.insert("id".to_string(), AttrValue::Str(id));
            global_attrs.insert(
                "date_created".to_string(),
                AttrValue::Str(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            );
            if let Some(name) = &options.name {
                global_attrs.insert("dataset_name".to_string(), AttrValue::Str(name.clone()));
            }
        }

        debug!(path = %path.display(), mode = %mode, "Opened dataset");

        Ok(Self {
            path,
            mode,
            compression: options.compression,
            compression_level: options.compression_level,
            autoscale: options.autoscale,
            automask: options.automask,
            global_attrs,
            backing: Some(backing),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The handle's effective mode. Append opens that created a new file
    /// report write-new.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.backing.is_none()
    }

    /// Pending global attributes, not yet flushed to the file.
    pub fn global_attrs(&self) -> &AttrMap {
        &self.global_attrs
    }

    /// Register a dimension. A `len` of 0 declares an unlimited (growable)
    /// dimension, matching the underlying library's convention.
    ///
    /// Redefining an existing name is a no-op whatever the size; the
    /// first definition wins. A size conflict is only logged.
    pub fn create_dim(&mut self, name: &str, len: usize) -> Result<()> {
        let file = self.file_mut()?;

        if let Some(existing) = file.dimension(name) {
            let same = if existing.is_unlimited() {
                len == 0
            } else {
                existing.len() == len
            };
            if !same {
                warn!(
                    dimension = name,
                    existing = existing.len(),
                    requested = len,
                    "Dimension already defined with a different size, keeping the existing one"
                );
            }
            return Ok(());
        }

        if len == 0 {
            file.add_unlimited_dimension(name)?;
        } else {
            file.add_dimension(name, len)?;
        }
        Ok(())
    }

    /// Write (or create-and-write) a variable.
    ///
    /// When no variable of this name exists, it is created bound to
    /// `opts.dims` (which must all be registered dimensions) with the
    /// encoding resolved from `opts` and the handle defaults; a
    /// `_FillValue` entry in `opts.attrs` becomes the variable's fill
    /// value rather than a plain attribute. When the variable exists, its
    /// dims/dtype/encoding stay as created and only attributes and data
    /// apply. With `data` given, the payload overwrites the variable's
    /// full extent; without it, the call just declares the variable.
    ///
    /// Writes are buffered by the underlying library and durable only
    /// after [`Dataset::flush`] or [`Dataset::close`].
    pub fn write_var(
        &mut self,
        name: &str,
        data: Option<&Values>,
        opts: &VarOptions,
    ) -> Result<()> {
        let default_compression = self.compression;
        let default_level = self.compression_level;
        let file = self.file_mut()?;

        // Existing variable: only attributes and data are applied.
        if let Some(mut var) = file.variable_mut(name) {
            apply_attrs(&mut var, &opts.attrs)?;
            if let Some(values) = data {
                let (starts, counts) = full_extents(&var, name, values.len())?;
                put_slab(&mut var, values, &starts, &counts)?;
            }
            return Ok(());
        }

        let enc = encoding::resolve(name, data, opts, default_compression, default_level)?;
        for dim in &opts.dims {
            if file.dimension(dim).is_none() {
                return Err(DatasetError::UndefinedDimension {
                    variable: name.to_string(),
                    dimension: dim.clone(),
                });
            }
        }

        let dim_names: Vec<&str> = opts.dims.iter().map(String::as_str).collect();
        let mut var = add_variable_of(file, name, &dim_names, enc.dtype)?;
        if let Some(chunks) = &enc.chunk_sizes {
            var.set_chunking(chunks)?;
        }
        if let Some(level) = enc.compression {
            // Deflate needs chunked storage, which a scalar cannot have.
            if !dim_names.is_empty() {
                var.set_compression(i32::from(level), true)?;
            }
        }
        if let Some(fill) = opts.attrs.get("_FillValue") {
            set_fill_of(&mut var, enc.dtype, fill)?;
        }
        apply_attrs(&mut var, &opts.attrs)?;
        if let Some(values) = data {
            let (starts, counts) = full_extents(&var, name, values.len())?;
            put_slab(&mut var, values, &starts, &counts)?;
        }

        debug!(variable = name, dtype = enc.dtype.as_str(), "Created variable");
        Ok(())
    }

    /// Append `data` along the variable's growable dimension.
    ///
    /// Fixed dimensions are spanned in full; the first unlimited dimension
    /// is the growth axis and extends by however many records the payload
    /// holds. A variable whose dimensions are all fixed rejects the append
    /// ([`DatasetError::NoUnlimitedDimension`]) without touching its data.
    /// An absent variable turns the call into [`Dataset::write_var`] with
    /// the same options, so append on absence behaves as create.
    pub fn append_var(&mut self, name: &str, data: &Values, opts: &VarOptions) -> Result<()> {
        {
            let file = self.file_mut()?;
            if let Some(mut var) = file.variable_mut(name) {
                let (starts, counts) = append_extents(&var, name, data.len())?;
                put_slab(&mut var, data, &starts, &counts)?;
                debug!(variable = name, values = data.len(), "Appended to variable");
                return Ok(());
            }
        }
        self.write_var(name, Some(data), opts)
    }

    /// Read the full contents of a variable, materialized as `f64`.
    ///
    /// Returns `Ok(None)` when no variable of that name exists; absence
    /// is not an error. A handle in write-new mode also reads as absent:
    /// the file has never been flushed, so its contents are not defined
    /// yet.
    ///
    /// With `automask` set, elements equal to the variable's `_FillValue`
    /// come back as NaN; with `autoscale` set, `scale_factor` and
    /// `add_offset` are applied to the rest (mask first, then scale). The
    /// underlying library converts from the stored element type.
    pub fn read_var(&self, name: &str) -> Result<Option<Vec<f64>>> {
        let backing = match &self.backing {
            Some(backing) => backing,
            None => return Err(DatasetError::Closed),
        };
        if self.mode == Mode::Write {
            return Ok(None);
        }
        let file = backing.as_file();
        let var = match file.variable(name) {
            Some(var) => var,
            None => return Ok(None),
        };

        let mut data: Vec<f64> = var.get_values(..)?;

        let fill = if self.automask {
            attr_f64(&var, "_FillValue")
        } else {
            None
        };
        let scale = if self.autoscale {
            attr_f64(&var, "scale_factor")
        } else {
            None
        };
        let offset = if self.autoscale {
            attr_f64(&var, "add_offset")
        } else {
            None
        };

        if fill.is_some() || scale.is_some() || offset.is_some() {
            for value in &mut data {
                if fill == Some(*value) {
                    *value = f64::NAN;
                    continue;
                }
                if let Some(scale) = scale {
                    *value *= scale;
                }
                if let Some(offset) = offset {
                    *value += offset;
                }
            }
        }

        Ok(Some(data))
    }

    /// Insert or overwrite a pending global attribute.
    ///
    /// Reaches the file at the next flush (or close), not immediately.
    pub fn add_global_attr<V: Into<AttrValue>>(&mut self, name: &str, value: V) -> Result<()> {
        if self.backing.is_none() {
            return Err(DatasetError::Closed);
        }
        self.global_attrs.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Look up a global attribute on the open file.
    ///
    /// This is the live view: pending entries from
    /// [`Dataset::add_global_attr`] appear here only after a flush.
    /// Array-valued attributes read back as `None`.
    pub fn global_attr(&self, name: &str) -> Result<Option<AttrValue>> {
        let file = self.file()?;
        match file.attribute(name) {
            Some(attr) => Ok(AttrValue::from_nc(&attr.value()?)),
            None => Ok(None),
        }
    }

    /// Persist pending global attributes, then push buffered writes to
    /// disk. A no-op on read-only and closed handles.
    pub fn flush(&mut self) -> Result<()> {
        match self.backing.as_mut() {
            Some(Backing::Write(file)) => {
                for (name, value) in &self.global_attrs {
                    file.add_attribute(name, netcdf::AttributeValue::from(value.clone()))?;
                }
                file.sync()?;
                debug!(path = %self.path.display(), "Flushed dataset");
                Ok(())
            }
            // Read-only handles have nothing to persist; closed handles
            // must tolerate a trailing flush.
            _ => Ok(()),
        }
    }

    /// Flush, then release the underlying file. Idempotent.
    ///
    /// The resource is released even when the flush fails; the flush error
    /// still propagates.
    pub fn close(&mut self) -> Result<()> {
        if self.backing.is_none() {
            return Ok(());
        }
        let flushed = self.flush();
        self.backing = None;
        if flushed.is_ok() {
            debug!(path = %self.path.display(), "Closed dataset");
        }
        flushed
    }

    fn file(&self) -> Result<&netcdf::File> {
        match &self.backing {
            Some(backing) => Ok(backing.as_file()),
            None => Err(DatasetError::Closed),
        }
    }

    fn file_mut(&mut self) -> Result<&mut netcdf::FileMut> {
        match self.backing.as_mut() {
            Some(Backing::Write(file)) => Ok(file),
            Some(Backing::Read(_)) => Err(DatasetError::ReadOnly {
                path: self.path.clone(),
            }),
            None => Err(DatasetError::Closed),
        }
    }
}

impl Drop for Dataset {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(path = %self.path.display(), error = %error, "Failed to close dataset cleanly");
        }
    }
}

/// Create the missing parents of `path`.
///
/// Independent processes frequently race to create the same output tree.
/// On failure the directory is re-checked: if it exists now, the race was
/// lost benignly and creation counts as success. Otherwise the attempt is
/// retried after a short pause, a bounded number of times.
fn create_parent_dirs(path: &Path) -> Result<()> {
    const ATTEMPTS: u32 = 5;
    const BACKOFF: Duration = Duration::from_millis(100);

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };
    if parent.exists() {
        return Ok(());
    }

    let mut attempt = 0;
    loop {
        match fs::create_dir_all(parent) {
            Ok(()) => return Ok(()),
            Err(err) => {
                if parent.exists() {
                    return Ok(());
                }
                attempt += 1;
                if attempt >= ATTEMPTS {
                    return Err(err.into());
                }
                debug!(
                    dir = %parent.display(),
                    attempt,
                    error = %err,
                    "Directory creation failed, retrying"
                );
                thread::sleep(BACKOFF);
            }
        }
    }
}

/// Create a variable of the given element type.
fn add_variable_of<'f>(
    file: &'f mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    dtype: DType,
) -> Result<netcdf::VariableMut<'f>> {
    let var = match dtype {
        DType::I8 => file.add_variable::<i8>(name, dims)?,
        DType::U8 => file.add_variable::<u8>(name, dims)?,
        DType::I16 => file.add_variable::<i16>(name, dims)?,
        DType::U16 => file.add_variable::<u16>(name, dims)?,
        DType::I32 => file.add_variable::<i32>(name, dims)?,
        DType::U32 => file.add_variable::<u32>(name, dims)?,
        DType::I64 => file.add_variable::<i64>(name, dims)?,
        DType::U64 => file.add_variable::<u64>(name, dims)?,
        DType::F32 => file.add_variable::<f32>(name, dims)?,
        DType::F64 => file.add_variable::<f64>(name, dims)?,
        DType::Str => file.add_string_variable(name, dims)?,
    };
    Ok(var)
}

/// Apply a fill value from the attribute map, converted to the variable's
/// element type. A fill without a numeric view on a numeric variable is
/// skipped with a log line; string variables take no numeric fill.
fn set_fill_of(var: &mut netcdf::VariableMut, dtype: DType, fill: &AttrValue) -> Result<()> {
    let value = match fill.as_f64() {
        Some(value) => value,
        None => {
            warn!(dtype = dtype.as_str(), "Fill value is not numeric, skipping");
            return Ok(());
        }
    };
    match dtype {
        DType::I8 => var.set_fill_value(value as i8)?,
        DType::U8 => var.set_fill_value(value as u8)?,
        DType::I16 => var.set_fill_value(value as i16)?,
        DType::U16 => var.set_fill_value(value as u16)?,
        DType::I32 => var.set_fill_value(value as i32)?,
        DType::U32 => var.set_fill_value(value as u32)?,
        DType::I64 => var.set_fill_value(value as i64)?,
        DType::U64 => var.set_fill_value(value as u64)?,
        DType::F32 => var.set_fill_value(value as f32)?,
        DType::F64 => var.set_fill_value(value)?,
        DType::Str => {}
    }
    Ok(())
}

/// Write every attribute entry except the fill value, which is encoding
/// state handled at creation.
fn apply_attrs(var: &mut netcdf::VariableMut, attrs: &AttrMap) -> Result<()> {
    for (name, value) in attrs {
        if name == "_FillValue" {
            continue;
        }
        var.put_attribute(name, netcdf::AttributeValue::from(value.clone()))?;
    }
    Ok(())
}

/// Extents covering the variable's whole declared shape.
///
/// With exactly one unlimited dimension, that axis takes up whatever the
/// fixed axes leave over, so a whole-array write can grow a fresh
/// appendable variable. Anything that does not divide out evenly is a
/// shape error before a single value is written.
fn full_extents(
    var: &netcdf::Variable,
    name: &str,
    data_len: usize,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let dims = var.dimensions();
    let starts = vec![0usize; dims.len()];
    let mut counts: Vec<usize> = dims.iter().map(|dim| dim.len()).collect();

    let unlimited: Vec<usize> = dims
        .iter()
        .enumerate()
        .filter(|(_, dim)| dim.is_unlimited())
        .map(|(i, _)| i)
        .collect();

    if counts.iter().product::<usize>() != data_len && unlimited.len() == 1 {
        let axis = unlimited[0];
        let rest: usize = counts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .map(|(_, count)| *count)
            .product();
        if rest > 0 && data_len % rest == 0 {
            counts[axis] = data_len / rest;
        }
    }

    let expected: usize = counts.iter().product();
    if expected != data_len {
        return Err(DatasetError::ShapeMismatch {
            name: name.to_string(),
            reason: format!(
                "declared shape holds {} values across {} dimensions, payload has {}",
                expected,
                dims.len(),
                data_len
            ),
        });
    }
    Ok((starts, counts))
}

/// Extents for an append: fixed axes spanned in full, the first unlimited
/// axis starting at its current extent and growing to fit the payload.
///
/// Only the first unlimited axis grows. A flat payload cannot express
/// corner growth along several axes at once, so any further unlimited
/// axes are spanned at their current extent like fixed ones.
fn append_extents(
    var: &netcdf::Variable,
    name: &str,
    data_len: usize,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let dims = var.dimensions();
    let mut starts = vec![0usize; dims.len()];
    let mut counts: Vec<usize> = dims.iter().map(|dim| dim.len()).collect();

    let growth_axis = match dims.iter().position(|dim| dim.is_unlimited()) {
        Some(axis) => axis,
        None => {
            return Err(DatasetError::NoUnlimitedDimension {
                name: name.to_string(),
            })
        }
    };

    let record: usize = counts
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != growth_axis)
        .map(|(_, count)| *count)
        .product();
    if record == 0 || data_len % record != 0 {
        return Err(DatasetError::ShapeMismatch {
            name: name.to_string(),
            reason: format!(
                "payload of {} values does not divide into records of {} values",
                data_len, record
            ),
        });
    }

    starts[growth_axis] = counts[growth_axis];
    counts[growth_axis] = data_len / record;
    Ok((starts, counts))
}

/// Write a payload into the hyperslab described by `starts`/`counts`.
fn put_slab(
    var: &mut netcdf::VariableMut,
    values: &Values,
    starts: &[usize],
    counts: &[usize],
) -> Result<()> {
    let extents = (starts, counts);
    match values {
        Values::I8(v) => var.put_values(v, extents)?,
        Values::U8(v) => var.put_values(v, extents)?,
        Values::I16(v) => var.put_values(v, extents)?,
        Values::U16(v) => var.put_values(v, extents)?,
        Values::I32(v) => var.put_values(v, extents)?,
        Values::U32(v) => var.put_values(v, extents)?,
        Values::I64(v) => var.put_values(v, extents)?,
        Values::U64(v) => var.put_values(v, extents)?,
        Values::F32(v) => var.put_values(v, extents)?,
        Values::F64(v) => var.put_values(v, extents)?,
    }
    Ok(())
}

/// True when `name` is an attribute of `var`. Probing through the iterator
/// keeps HDF5 from logging a lookup failure for every optional attribute
/// that is not there.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}
