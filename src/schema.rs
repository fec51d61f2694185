//! Array schema descriptors.
//!
//! Every array this crate touches is one-dimensional: a single dimension
//! (the coordinate space) and a single attribute (the cell value). The
//! descriptors here carry the names and datatypes the query layer binds
//! buffers against.

use compact_str::CompactString;

use crate::{dtype::DataType, query::subarray::Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ArrayType {
    /// Cells laid out by position over the dimension domain.
    Dense,
    /// Cells keyed by coordinate value.
    Sparse,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DimensionDescriptor {
    pub name: CompactString,
    pub dtype: DataType,
    /// Inclusive coordinate bounds. Required for dense arrays.
    pub domain: Option<Range>,
}

impl DimensionDescriptor {
    pub fn new(name: impl Into<CompactString>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            domain: None,
        }
    }

    pub fn with_domain(name: impl Into<CompactString>, dtype: DataType, domain: Range) -> Self {
        Self {
            name: name.into(),
            dtype,
            domain: Some(domain),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AttributeDescriptor {
    pub name: CompactString,
    pub dtype: DataType,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<CompactString>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArraySchema {
    pub array_type: ArrayType,
    pub dimension: DimensionDescriptor,
    pub attribute: AttributeDescriptor,
}

impl ArraySchema {
    pub fn new(
        array_type: ArrayType,
        dimension: DimensionDescriptor,
        attribute: AttributeDescriptor,
    ) -> Self {
        Self {
            array_type,
            dimension,
            attribute,
        }
    }
}
