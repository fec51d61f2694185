//! Dimension-label data queries for a coupled pair of 1-D storage arrays.
//!
//! A *dimension label* gives one array dimension a secondary,
//! application-meaningful coordinate system. It is backed by two physical
//! arrays describing the same mapping in opposite directions: an *indexed
//! array* keyed by native position holding label values, and a sparse
//! *labelled array* keyed by label value holding positions. This crate
//! translates label-space read/write requests into correctly ordered and
//! validated delegated queries against that pair:
//!
//! - reads go to the indexed array, with index ranges resolved from label
//!   values applied before execution;
//! - writes to ordered labels verify the label data is strictly monotonic
//!   before anything touches storage;
//! - writes to unordered labels populate both arrays from one logical
//!   request, synthesizing the index side when the caller supplies none.
//!
//! Start from [`label::DimensionLabel`] and [`query::LabelDataQuery`].

pub mod consts;
pub mod dtype;
pub mod label;
pub mod query;
pub mod schema;
pub mod storage;

pub use dtype::DataType;
pub use label::{DimensionLabel, DimensionLabelError, LabelOrder};
pub use query::{DataQueryError, LabelDataQuery, QueryBuffer, Range, Subarray};
pub use schema::{ArraySchema, ArrayType, AttributeDescriptor, DimensionDescriptor};
pub use storage::{ArrayHandle, FragmentMeta};
