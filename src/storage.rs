//! In-memory array state backing the delegated query engine.
//!
//! An [`ArrayHandle`] couples an [`ArraySchema`] with the physical cells of
//! one 1-D array:
//! - dense arrays keep a contiguous cell buffer over the dimension domain,
//!   addressed by position;
//! - sparse arrays keep cells in a `BTreeMap` keyed by an order-preserving
//!   encoding of the coordinate, so iteration yields coordinate order and
//!   duplicate coordinates upsert.
//!
//! Completed writes append a [`FragmentMeta`] record; a write that never
//! completes leaves no fragment behind, which is what consistency tooling
//! inspects after a failed two-phase label write.

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use chrono::Utc;
use compact_str::{format_compact, CompactString};
use parking_lot::RwLock;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    consts,
    dtype::{dispatch_index_scalar, DataType, NativeScalar},
    query::subarray::Range,
    schema::{ArraySchema, ArrayType},
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("array dimension domain is missing")]
    MissingDomain,

    #[error("dimension datatype {dtype:?} cannot address cells")]
    NonIntegralDimension { dtype: DataType },

    #[error("dimension datatype {dtype:?} has no defined order")]
    UnsupportedDimensionDatatype { dtype: DataType },

    #[error("attribute datatype {dtype:?} is variable-sized")]
    VariableSizedAttribute { dtype: DataType },

    #[error("dense domain of {cells} cells is too large to allocate")]
    DomainTooLarge { cells: u64 },

    #[error("coordinate {coord} outside domain [{lo}, {hi}]")]
    CoordinateOutOfDomain { coord: i128, lo: i128, hi: i128 },

    #[error("cell offset {offset} out of bounds (cells={cells})")]
    OffsetOutOfBounds { offset: u64, cells: u64 },

    #[error("wrong value byte length: expected {expected}, got {actual}")]
    WrongValueLength { expected: usize, actual: usize },

    #[error("coordinate/value count mismatch: {coords} coordinates, {values} values")]
    CellCountMismatch { coords: usize, values: usize },
}

/// Record of one completed write.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FragmentMeta {
    pub name: CompactString,
    pub timestamp_micros: i64,
    pub cell_count: u64,
}

impl FragmentMeta {
    /// Build a fragment record, generating a timestamped name when the
    /// caller does not override it.
    pub fn new(name: Option<CompactString>, cell_count: u64) -> Self {
        let timestamp_micros = Utc::now().timestamp_micros();
        let name = name.unwrap_or_else(|| {
            format_compact!("{}{timestamp_micros}", consts::FRAGMENT_NAME_PREFIX)
        });
        Self {
            name,
            timestamp_micros,
            cell_count,
        }
    }
}

struct DenseState {
    cells: Vec<u8>,
    fragments: Vec<FragmentMeta>,
}

struct SparseCell {
    coord: SmallVec<[u8; 8]>,
    value: SmallVec<[u8; 8]>,
}

struct SparseState {
    cells: BTreeMap<SmallVec<[u8; 8]>, SparseCell>,
    fragments: Vec<FragmentMeta>,
}

enum ArrayState {
    Dense(DenseState),
    Sparse(SparseState),
}

/// One physical 1-D array: schema plus cell state.
pub struct ArrayHandle {
    schema: ArraySchema,
    state: RwLock<ArrayState>,
}

impl ArrayHandle {
    /// Allocate an array for `schema`.
    ///
    /// Dense schemas need an index-compatible dimension with a domain; the
    /// whole domain is allocated zero-filled up front. Sparse schemas need a
    /// dimension datatype with a defined order. Both need a fixed-width
    /// attribute.
    pub fn new(schema: ArraySchema) -> Result<Arc<Self>, StorageError> {
        if schema.attribute.dtype.size().is_none() {
            return Err(StorageError::VariableSizedAttribute {
                dtype: schema.attribute.dtype,
            });
        }

        let state = match schema.array_type {
            ArrayType::Dense => {
                let dtype = schema.dimension.dtype;
                let domain = schema
                    .dimension
                    .domain
                    .as_ref()
                    .ok_or(StorageError::MissingDomain)?;
                let cell_count = domain
                    .count(dtype)
                    .ok_or(StorageError::NonIntegralDimension { dtype })?;
                let width = schema.attribute.dtype.size().unwrap_or(0);
                let bytes = usize::try_from(cell_count)
                    .ok()
                    .and_then(|n| n.checked_mul(width))
                    .ok_or(StorageError::DomainTooLarge { cells: cell_count })?;
                ArrayState::Dense(DenseState {
                    cells: vec![0; bytes],
                    fragments: Vec::new(),
                })
            }
            ArrayType::Sparse => {
                let dtype = schema.dimension.dtype;
                if !dtype.is_sortable() {
                    return Err(StorageError::UnsupportedDimensionDatatype { dtype });
                }
                ArrayState::Sparse(SparseState {
                    cells: BTreeMap::new(),
                    fragments: Vec::new(),
                })
            }
        };

        Ok(Arc::new(Self {
            schema,
            state: RwLock::new(state),
        }))
    }

    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    pub fn array_type(&self) -> ArrayType {
        self.schema.array_type
    }

    pub fn fragments(&self) -> Vec<FragmentMeta> {
        match &*self.state.read() {
            ArrayState::Dense(state) => state.fragments.clone(),
            ArrayState::Sparse(state) => state.fragments.clone(),
        }
    }

    fn attribute_width(&self) -> usize {
        let Some(width) = self.schema.attribute.dtype.size() else {
            unreachable!("variable-sized attributes are rejected at allocation");
        };
        width
    }

    /// Position of one coordinate within the dense domain.
    pub(crate) fn dense_position(&self, coord: &[u8]) -> Result<u64, StorageError> {
        let dtype = self.schema.dimension.dtype;
        let domain = self
            .schema
            .dimension
            .domain
            .as_ref()
            .ok_or(StorageError::MissingDomain)?;
        dispatch_index_scalar!(dtype, T => {
            let c = T::from_ne_slice(coord) as i128;
            let lo = domain.start_as::<T>() as i128;
            let hi = domain.end_as::<T>() as i128;
            if c < lo || c > hi {
                return Err(StorageError::CoordinateOutOfDomain { coord: c, lo, hi });
            }
            Ok((c - lo) as u64)
        }, _ => Err(StorageError::NonIntegralDimension { dtype }))
    }

    /// Store one attribute value per position, then record the fragment.
    pub(crate) fn dense_write(
        &self,
        positions: &[u64],
        values: &[u8],
        fragment: FragmentMeta,
    ) -> Result<(), StorageError> {
        let width = self.attribute_width();
        let expected = positions.len() * width;
        if values.len() != expected {
            return Err(StorageError::WrongValueLength {
                expected,
                actual: values.len(),
            });
        }

        let mut guard = self.state.write();
        let ArrayState::Dense(state) = &mut *guard else {
            unreachable!("dense state always backs a dense schema");
        };
        let cells = (state.cells.len() / width) as u64;
        for (position, value) in positions.iter().zip(values.chunks_exact(width)) {
            if *position >= cells {
                return Err(StorageError::OffsetOutOfBounds {
                    offset: *position,
                    cells,
                });
            }
            let start = *position as usize * width;
            state.cells[start..start + width].copy_from_slice(value);
        }
        state.fragments.push(fragment);
        Ok(())
    }

    /// Gather one attribute value per position, in position order.
    pub(crate) fn dense_read(&self, positions: &[u64]) -> Result<Vec<u8>, StorageError> {
        let width = self.attribute_width();
        let guard = self.state.read();
        let ArrayState::Dense(state) = &*guard else {
            unreachable!("dense state always backs a dense schema");
        };
        let cells = (state.cells.len() / width) as u64;
        let mut out = Vec::with_capacity(positions.len() * width);
        for position in positions {
            if *position >= cells {
                return Err(StorageError::OffsetOutOfBounds {
                    offset: *position,
                    cells,
                });
            }
            let start = *position as usize * width;
            out.extend_from_slice(&state.cells[start..start + width]);
        }
        Ok(out)
    }

    /// Upsert one cell per coordinate, then record the fragment.
    pub(crate) fn sparse_write(
        &self,
        coords: &[u8],
        values: &[u8],
        fragment: FragmentMeta,
    ) -> Result<(), StorageError> {
        let dim_dtype = self.schema.dimension.dtype;
        let Some(coord_width) = dim_dtype.size() else {
            unreachable!("variable-sized dimensions are rejected at allocation");
        };
        let value_width = self.attribute_width();

        if coords.len() % coord_width != 0 {
            return Err(StorageError::WrongValueLength {
                expected: coords.len().next_multiple_of(coord_width),
                actual: coords.len(),
            });
        }
        if values.len() % value_width != 0 {
            return Err(StorageError::WrongValueLength {
                expected: values.len().next_multiple_of(value_width),
                actual: values.len(),
            });
        }
        let coord_count = coords.len() / coord_width;
        let value_count = values.len() / value_width;
        if coord_count != value_count {
            return Err(StorageError::CellCountMismatch {
                coords: coord_count,
                values: value_count,
            });
        }

        let mut guard = self.state.write();
        let ArrayState::Sparse(state) = &mut *guard else {
            unreachable!("sparse state always backs a sparse schema");
        };
        for (coord, value) in coords
            .chunks_exact(coord_width)
            .zip(values.chunks_exact(value_width))
        {
            let key = dim_dtype.order_key(coord);
            state.cells.insert(
                key,
                SparseCell {
                    coord: SmallVec::from_slice(coord),
                    value: SmallVec::from_slice(value),
                },
            );
        }
        state.fragments.push(fragment);
        Ok(())
    }

    /// Gather attribute values for coordinates covered by `ranges`, in
    /// coordinate order. Empty `ranges` means the whole array.
    pub(crate) fn sparse_read(&self, ranges: &[Range]) -> Result<Vec<u8>, StorageError> {
        let dim_dtype = self.schema.dimension.dtype;
        let guard = self.state.read();
        let ArrayState::Sparse(state) = &*guard else {
            unreachable!("sparse state always backs a sparse schema");
        };

        let mut out = Vec::new();
        if ranges.is_empty() {
            for cell in state.cells.values() {
                out.extend_from_slice(&cell.value);
            }
            return Ok(out);
        }
        for range in ranges {
            let lo = dim_dtype.order_key(range.start_bytes());
            let hi = dim_dtype.order_key(range.end_bytes());
            for cell in state
                .cells
                .range((Bound::Included(lo), Bound::Included(hi)))
                .map(|(_, cell)| cell)
            {
                out.extend_from_slice(&cell.value);
            }
        }
        Ok(out)
    }

    /// Decode the full dense cell buffer as `T` values.
    ///
    /// # Panics
    /// Panics if `T` does not match the attribute width.
    pub fn dense_values<T: NativeScalar>(&self) -> Vec<T> {
        let guard = self.state.read();
        let ArrayState::Dense(state) = &*guard else {
            unreachable!("dense state always backs a dense schema");
        };
        assert_eq!(Some(T::WIDTH), self.schema.attribute.dtype.size());
        state
            .cells
            .chunks_exact(T::WIDTH)
            .map(T::from_ne_slice)
            .collect()
    }

    /// Decode all sparse cells as `(coordinate, value)` pairs in coordinate
    /// order.
    ///
    /// # Panics
    /// Panics if `K`/`V` do not match the dimension/attribute widths.
    pub fn sparse_cells<K: NativeScalar, V: NativeScalar>(&self) -> Vec<(K, V)> {
        let guard = self.state.read();
        let ArrayState::Sparse(state) = &*guard else {
            unreachable!("sparse state always backs a sparse schema");
        };
        assert_eq!(Some(K::WIDTH), self.schema.dimension.dtype.size());
        assert_eq!(Some(V::WIDTH), self.schema.attribute.dtype.size());
        state
            .cells
            .values()
            .map(|cell| {
                (
                    K::from_ne_slice(&cell.coord),
                    V::from_ne_slice(&cell.value),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDescriptor, DimensionDescriptor};

    fn dense_schema() -> ArraySchema {
        ArraySchema::new(
            ArrayType::Dense,
            DimensionDescriptor::with_domain("index", DataType::U64, Range::interval(0u64, 9u64)),
            AttributeDescriptor::new("label", DataType::F64),
        )
    }

    fn sparse_schema() -> ArraySchema {
        ArraySchema::new(
            ArrayType::Sparse,
            DimensionDescriptor::new("label", DataType::F64),
            AttributeDescriptor::new("index", DataType::U64),
        )
    }

    #[test]
    fn dense_write_then_read_roundtrip() {
        let array = ArrayHandle::new(dense_schema()).unwrap();
        let values: Vec<u8> = [1.5f64, 2.5, 3.5]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        array
            .dense_write(&[2, 3, 4], &values, FragmentMeta::new(None, 3))
            .unwrap();

        let got = array.dense_read(&[3]).unwrap();
        assert_eq!(f64::from_ne_slice(&got), 2.5);

        let all = array.dense_values::<f64>();
        assert_eq!(all.len(), 10);
        assert_eq!(all[2], 1.5);
        assert_eq!(all[0], 0.0);
    }

    #[test]
    fn dense_rejects_out_of_domain_coordinate() {
        let array = ArrayHandle::new(dense_schema()).unwrap();
        let coord = 11u64.to_ne_vec();
        let err = match array.dense_position(&coord) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, StorageError::CoordinateOutOfDomain { .. }));
    }

    #[test]
    fn dense_requires_domain() {
        let schema = ArraySchema::new(
            ArrayType::Dense,
            DimensionDescriptor::new("index", DataType::U64),
            AttributeDescriptor::new("label", DataType::F64),
        );
        let err = match ArrayHandle::new(schema) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, StorageError::MissingDomain));
    }

    #[test]
    fn sparse_upserts_in_coordinate_order() {
        let array = ArrayHandle::new(sparse_schema()).unwrap();
        let coords: Vec<u8> = [2.0f64, -1.0, 0.5]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let values: Vec<u8> = [2u64, 0, 1].iter().flat_map(|v| v.to_ne_bytes()).collect();
        array
            .sparse_write(&coords, &values, FragmentMeta::new(None, 3))
            .unwrap();

        // Overwrite the cell at coordinate 0.5.
        let coords2: Vec<u8> = 0.5f64.to_ne_bytes().to_vec();
        let values2: Vec<u8> = 9u64.to_ne_bytes().to_vec();
        array
            .sparse_write(&coords2, &values2, FragmentMeta::new(None, 1))
            .unwrap();

        let cells = array.sparse_cells::<f64, u64>();
        assert_eq!(cells, vec![(-1.0, 0), (0.5, 9), (2.0, 2)]);
        assert_eq!(array.fragments().len(), 2);
    }

    #[test]
    fn sparse_read_filters_by_range() {
        let array = ArrayHandle::new(sparse_schema()).unwrap();
        let coords: Vec<u8> = [1.0f64, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let values: Vec<u8> = [10u64, 20, 30, 40]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        array
            .sparse_write(&coords, &values, FragmentMeta::new(None, 4))
            .unwrap();

        let got = array.sparse_read(&[Range::interval(2.0f64, 3.0f64)]).unwrap();
        let decoded: Vec<u64> = got.chunks_exact(8).map(u64::from_ne_slice).collect();
        assert_eq!(decoded, vec![20, 30]);
    }

    #[test]
    fn sparse_write_rejects_count_mismatch() {
        let array = ArrayHandle::new(sparse_schema()).unwrap();
        let coords: Vec<u8> = 1.0f64.to_ne_bytes().to_vec();
        let values: Vec<u8> = [1u64, 2].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let err = match array.sparse_write(&coords, &values, FragmentMeta::new(None, 0)) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            StorageError::CellCountMismatch { coords, values } => {
                assert_eq!(coords, 1);
                assert_eq!(values, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn generated_fragment_names_carry_the_prefix() {
        let fragment = FragmentMeta::new(None, 5);
        assert!(fragment.name.starts_with(consts::FRAGMENT_NAME_PREFIX));
        let named = FragmentMeta::new(Some("import_batch".into()), 5);
        assert_eq!(named.name, "import_batch");
    }
}
