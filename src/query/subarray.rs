//! Per-dimension coordinate constraints.
//!
//! A [`Subarray`] holds one range set per dimension. Ranges are stored as
//! raw native-endian bounds and interpreted through the dimension's
//! datatype; a range set can be tagged as *label space* while it still
//! awaits resolution to native index coordinates.

use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    dtype::{dispatch_index_scalar, DataType, NativeScalar},
    schema::DimensionDescriptor,
};

#[derive(Debug, Error)]
pub enum SubarrayError {
    #[error("dimension index {dim} out of bounds (ndims={ndims})")]
    DimensionOutOfBounds { dim: usize, ndims: usize },

    #[error("dimension datatype {dtype:?} is variable-sized")]
    VariableSizedDimension { dtype: DataType },

    #[error("coordinate buffer of {actual} bytes does not hold {count} values of {width} bytes")]
    BufferLengthMismatch {
        count: u64,
        width: usize,
        actual: usize,
    },

    #[error("interval ranges need start/end pairs, got {count} bounds")]
    UnpairedRangeBounds { count: u64 },
}

/// One inclusive coordinate range, stored as raw native-endian bounds.
///
/// A point range has equal bounds. The datatype is carried by the owning
/// dimension, not the range.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Range {
    start: SmallVec<[u8; 8]>,
    end: SmallVec<[u8; 8]>,
}

impl Range {
    pub fn point<T: NativeScalar>(value: T) -> Self {
        let bytes = value.to_ne_vec();
        Self {
            start: bytes.clone(),
            end: bytes,
        }
    }

    pub fn interval<T: NativeScalar>(start: T, end: T) -> Self {
        Self {
            start: start.to_ne_vec(),
            end: end.to_ne_vec(),
        }
    }

    pub(crate) fn from_bounds(start: &[u8], end: &[u8]) -> Self {
        Self {
            start: SmallVec::from_slice(start),
            end: SmallVec::from_slice(end),
        }
    }

    pub fn start_bytes(&self) -> &[u8] {
        &self.start
    }

    pub fn end_bytes(&self) -> &[u8] {
        &self.end
    }

    /// Decode the start bound.
    ///
    /// # Panics
    /// Panics if the stored bound is not exactly `T::WIDTH` bytes.
    pub fn start_as<T: NativeScalar>(&self) -> T {
        T::from_ne_slice(&self.start)
    }

    /// Decode the end bound.
    ///
    /// # Panics
    /// Panics if the stored bound is not exactly `T::WIDTH` bytes.
    pub fn end_as<T: NativeScalar>(&self) -> T {
        T::from_ne_slice(&self.end)
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// Number of coordinates covered, `None` when the datatype does not
    /// enumerate (floats) or the count exceeds `u64`.
    pub fn count(&self, dtype: DataType) -> Option<u64> {
        dispatch_index_scalar!(dtype, T => {
            let start = self.start_as::<T>() as i128;
            let end = self.end_as::<T>() as i128;
            if end < start {
                Some(0)
            } else {
                u64::try_from(end - start + 1).ok()
            }
        }, _ => None)
    }
}

fn points_adjacent(dtype: DataType, prev_end: &[u8], next: &[u8]) -> bool {
    dispatch_index_scalar!(dtype, T => {
        let prev = T::from_ne_slice(prev_end);
        match prev.checked_add(1) {
            Some(successor) => T::from_ne_slice(next) == successor,
            None => false,
        }
    }, _ => false)
}

#[derive(Debug, Clone)]
struct DimensionRanges {
    dtype: DataType,
    ranges: Vec<Range>,
    label_space: bool,
}

/// Range sets for each dimension of one array.
#[derive(Debug, Clone)]
pub struct Subarray {
    dims: SmallVec<[DimensionRanges; 1]>,
    coalesce_ranges: bool,
}

impl Subarray {
    pub fn new(dimensions: &[DimensionDescriptor]) -> Self {
        Self {
            dims: dimensions
                .iter()
                .map(|d| DimensionRanges {
                    dtype: d.dtype,
                    ranges: Vec::new(),
                    label_space: false,
                })
                .collect(),
            coalesce_ranges: false,
        }
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn check_dim(&self, dim: usize) -> Result<(), SubarrayError> {
        if dim >= self.dims.len() {
            return Err(SubarrayError::DimensionOutOfBounds {
                dim,
                ndims: self.dims.len(),
            });
        }
        Ok(())
    }

    /// Datatype of dimension `dim`.
    ///
    /// # Panics
    /// Panics if `dim` is out of bounds.
    pub fn dimension_dtype(&self, dim: usize) -> DataType {
        self.dims[dim].dtype
    }

    /// Whether no constraint is set for `dim` (the whole domain).
    ///
    /// # Panics
    /// Panics if `dim` is out of bounds.
    pub fn is_default(&self, dim: usize) -> bool {
        self.dims[dim].ranges.is_empty()
    }

    /// Whether the range set for `dim` still awaits label resolution.
    ///
    /// # Panics
    /// Panics if `dim` is out of bounds.
    pub fn has_label_ranges(&self, dim: usize) -> bool {
        self.dims[dim].label_space
    }

    /// Ranges currently set for `dim`.
    ///
    /// # Panics
    /// Panics if `dim` is out of bounds.
    pub fn ranges_for_dim(&self, dim: usize) -> &[Range] {
        &self.dims[dim].ranges
    }

    /// Replace the range set for `dim` with index-space ranges.
    pub fn set_ranges_for_dim(
        &mut self,
        dim: usize,
        ranges: Vec<Range>,
    ) -> Result<(), SubarrayError> {
        self.check_dim(dim)?;
        self.dims[dim].ranges = ranges;
        self.dims[dim].label_space = false;
        Ok(())
    }

    /// Replace the range set for `dim` with still-unresolved label ranges.
    pub fn set_label_ranges_for_dim(
        &mut self,
        dim: usize,
        ranges: Vec<Range>,
    ) -> Result<(), SubarrayError> {
        self.check_dim(dim)?;
        self.dims[dim].ranges = ranges;
        self.dims[dim].label_space = true;
        Ok(())
    }

    /// Enable or disable merging of adjacent point ranges into intervals.
    pub fn set_coalesce_ranges(&mut self, coalesce: bool) {
        self.coalesce_ranges = coalesce;
    }

    /// Append `count` point ranges decoded from `data`.
    ///
    /// With coalescing enabled, consecutive points that are adjacent in the
    /// dimension's integer order extend the previous range instead of
    /// starting a new one. Float points never merge. Any label-space tag on
    /// the dimension is dropped, point coordinates being index-space.
    pub fn add_point_ranges(
        &mut self,
        dim: usize,
        data: &[u8],
        count: u64,
    ) -> Result<(), SubarrayError> {
        self.check_dim(dim)?;
        let coalesce = self.coalesce_ranges;
        let entry = &mut self.dims[dim];
        let Some(width) = entry.dtype.size() else {
            return Err(SubarrayError::VariableSizedDimension { dtype: entry.dtype });
        };
        let expected = usize::try_from(count).ok().and_then(|c| c.checked_mul(width));
        if expected != Some(data.len()) {
            return Err(SubarrayError::BufferLengthMismatch {
                count,
                width,
                actual: data.len(),
            });
        }

        if entry.label_space {
            entry.ranges.clear();
            entry.label_space = false;
        }

        let coalesce = coalesce && entry.dtype.is_index_compatible();
        for chunk in data.chunks_exact(width) {
            if coalesce {
                if let Some(last) = entry.ranges.last_mut() {
                    if points_adjacent(entry.dtype, &last.end, chunk) {
                        last.end = SmallVec::from_slice(chunk);
                        continue;
                    }
                }
            }
            entry.ranges.push(Range::from_bounds(chunk, chunk));
        }
        Ok(())
    }

    /// Replace any label-space placeholder on `dim` with resolved
    /// index-space ranges.
    ///
    /// `data` holds `count` coordinate values: one per point range when
    /// `is_point_ranges`, otherwise start/end pairs (so `count` must be
    /// even).
    pub fn add_index_ranges_from_label(
        &mut self,
        dim: usize,
        is_point_ranges: bool,
        data: &[u8],
        count: u64,
    ) -> Result<(), SubarrayError> {
        self.check_dim(dim)?;
        if self.dims[dim].label_space {
            self.dims[dim].ranges.clear();
            self.dims[dim].label_space = false;
        }

        if is_point_ranges {
            return self.add_point_ranges(dim, data, count);
        }

        if count % 2 != 0 {
            return Err(SubarrayError::UnpairedRangeBounds { count });
        }
        let entry = &mut self.dims[dim];
        let Some(width) = entry.dtype.size() else {
            return Err(SubarrayError::VariableSizedDimension { dtype: entry.dtype });
        };
        let expected = usize::try_from(count).ok().and_then(|c| c.checked_mul(width));
        if expected != Some(data.len()) {
            return Err(SubarrayError::BufferLengthMismatch {
                count,
                width,
                actual: data.len(),
            });
        }
        for pair in data.chunks_exact(2 * width) {
            entry
                .ranges
                .push(Range::from_bounds(&pair[..width], &pair[width..]));
        }
        Ok(())
    }
}
