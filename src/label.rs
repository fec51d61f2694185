//! Dimension-label metadata.
//!
//! A dimension label couples two physical arrays describing the same mapping
//! in opposite directions:
//! - the *indexed array* is keyed by native position and stores label values
//!   (dense for ordered labels, sparse for unordered ones);
//! - the *labelled array* is sparse, keyed by label value, and stores native
//!   positions.
//!
//! [`DimensionLabel::new`] performs the schema validation the query layer
//! relies on: datatype coupling between the two arrays, a sortable label
//! datatype, and an index datatype that can address positions. Queries built
//! on a validated label never have to re-check these.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    dtype::DataType,
    schema::{ArrayType, AttributeDescriptor, DimensionDescriptor},
    storage::ArrayHandle,
};

/// Ordering contract of the label data along the indexed dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LabelOrder {
    Increasing,
    Decreasing,
    Unordered,
}

#[derive(Debug, Error)]
pub enum DimensionLabelError {
    #[error("labelled array must be sparse, got {actual:?}")]
    LabelledArrayNotSparse { actual: ArrayType },

    #[error("indexed array for {order:?} labels must be {expected:?}, got {actual:?}")]
    WrongIndexedArrayType {
        order: LabelOrder,
        expected: ArrayType,
        actual: ArrayType,
    },

    #[error("label datatype mismatch between arrays: indexed side {indexed:?}, labelled side {labelled:?}")]
    LabelDatatypeMismatch {
        indexed: DataType,
        labelled: DataType,
    },

    #[error("index datatype mismatch between arrays: indexed side {indexed:?}, labelled side {labelled:?}")]
    IndexDatatypeMismatch {
        indexed: DataType,
        labelled: DataType,
    },

    #[error("label datatype {dtype:?} has no defined order")]
    UnsupportedLabelDatatype { dtype: DataType },

    #[error("index datatype {dtype:?} cannot address positions")]
    UnsupportedIndexDatatype { dtype: DataType },
}

/// Validated handle on the coupled array pair behind one dimension label.
pub struct DimensionLabel {
    label_order: LabelOrder,
    indexed_array: Arc<ArrayHandle>,
    labelled_array: Arc<ArrayHandle>,
}

impl DimensionLabel {
    pub fn new(
        label_order: LabelOrder,
        indexed_array: Arc<ArrayHandle>,
        labelled_array: Arc<ArrayHandle>,
    ) -> Result<Self, DimensionLabelError> {
        if labelled_array.array_type() != ArrayType::Sparse {
            return Err(DimensionLabelError::LabelledArrayNotSparse {
                actual: labelled_array.array_type(),
            });
        }

        let expected_indexed = match label_order {
            LabelOrder::Increasing | LabelOrder::Decreasing => ArrayType::Dense,
            LabelOrder::Unordered => ArrayType::Sparse,
        };
        if indexed_array.array_type() != expected_indexed {
            return Err(DimensionLabelError::WrongIndexedArrayType {
                order: label_order,
                expected: expected_indexed,
                actual: indexed_array.array_type(),
            });
        }

        let label_dtype = indexed_array.schema().attribute.dtype;
        if label_dtype != labelled_array.schema().dimension.dtype {
            return Err(DimensionLabelError::LabelDatatypeMismatch {
                indexed: label_dtype,
                labelled: labelled_array.schema().dimension.dtype,
            });
        }
        if !label_dtype.is_sortable() {
            return Err(DimensionLabelError::UnsupportedLabelDatatype { dtype: label_dtype });
        }

        let index_dtype = indexed_array.schema().dimension.dtype;
        if index_dtype != labelled_array.schema().attribute.dtype {
            return Err(DimensionLabelError::IndexDatatypeMismatch {
                indexed: index_dtype,
                labelled: labelled_array.schema().attribute.dtype,
            });
        }
        if !index_dtype.is_index_compatible() {
            return Err(DimensionLabelError::UnsupportedIndexDatatype { dtype: index_dtype });
        }

        Ok(Self {
            label_order,
            indexed_array,
            labelled_array,
        })
    }

    pub fn label_order(&self) -> LabelOrder {
        self.label_order
    }

    pub fn indexed_array(&self) -> &Arc<ArrayHandle> {
        &self.indexed_array
    }

    pub fn labelled_array(&self) -> &Arc<ArrayHandle> {
        &self.labelled_array
    }

    /// The native position dimension (indexed array side).
    pub fn index_dimension(&self) -> &DimensionDescriptor {
        &self.indexed_array.schema().dimension
    }

    /// The label value dimension (labelled array side).
    pub fn label_dimension(&self) -> &DimensionDescriptor {
        &self.labelled_array.schema().dimension
    }

    /// The label value attribute (indexed array side).
    pub fn label_attribute(&self) -> &AttributeDescriptor {
        &self.indexed_array.schema().attribute
    }

    /// The native position attribute (labelled array side).
    pub fn index_attribute(&self) -> &AttributeDescriptor {
        &self.labelled_array.schema().attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        query::subarray::Range,
        schema::ArraySchema,
    };

    fn dense_indexed(label_dtype: DataType) -> Arc<ArrayHandle> {
        ArrayHandle::new(ArraySchema::new(
            ArrayType::Dense,
            DimensionDescriptor::with_domain("index", DataType::U64, Range::interval(0u64, 15u64)),
            AttributeDescriptor::new("label", label_dtype),
        ))
        .unwrap()
    }

    fn sparse_labelled(label_dtype: DataType, index_dtype: DataType) -> Arc<ArrayHandle> {
        ArrayHandle::new(ArraySchema::new(
            ArrayType::Sparse,
            DimensionDescriptor::new("label", label_dtype),
            AttributeDescriptor::new("index", index_dtype),
        ))
        .unwrap()
    }

    #[test]
    fn ordered_label_accepts_dense_indexed_array() {
        let label = DimensionLabel::new(
            LabelOrder::Increasing,
            dense_indexed(DataType::F64),
            sparse_labelled(DataType::F64, DataType::U64),
        )
        .unwrap();
        assert_eq!(label.label_dimension().dtype, DataType::F64);
        assert_eq!(label.index_attribute().dtype, DataType::U64);
    }

    #[test]
    fn unordered_label_requires_sparse_indexed_array() {
        let err = match DimensionLabel::new(
            LabelOrder::Unordered,
            dense_indexed(DataType::F64),
            sparse_labelled(DataType::F64, DataType::U64),
        ) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            DimensionLabelError::WrongIndexedArrayType { expected, actual, .. } => {
                assert_eq!(expected, ArrayType::Sparse);
                assert_eq!(actual, ArrayType::Dense);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn label_datatypes_must_agree_across_arrays() {
        let err = match DimensionLabel::new(
            LabelOrder::Increasing,
            dense_indexed(DataType::F64),
            sparse_labelled(DataType::F32, DataType::U64),
        ) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, DimensionLabelError::LabelDatatypeMismatch { .. }));
    }

    #[test]
    fn index_datatypes_must_agree_across_arrays() {
        let err = match DimensionLabel::new(
            LabelOrder::Increasing,
            dense_indexed(DataType::F64),
            sparse_labelled(DataType::F64, DataType::I64),
        ) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, DimensionLabelError::IndexDatatypeMismatch { .. }));
    }
}
