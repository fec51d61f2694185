//! Dimension-label data queries.
//!
//! This module translates label-space read/write requests into delegated
//! queries against the two physical arrays behind a
//! [`DimensionLabel`](crate::label::DimensionLabel):
//!
//! - [`ReadDataQuery`] issues one delegated read against the indexed array,
//!   optionally refined with index ranges resolved from label values.
//! - [`OrderedWriteDataQuery`] verifies the label data is monotonic, then
//!   issues one delegated write against the indexed array.
//! - [`UnorderedWriteDataQuery`] issues two delegated writes (indexed array
//!   first, then labelled array), synthesizing the index side when the
//!   caller supplies none.
//!
//! Callers hold the closed [`LabelDataQuery`] variant and drive it through
//! the shared surface: `process`, `completed`,
//! `add_index_ranges_from_label`. Range refinement is a read-only
//! capability; calling it on either write variant is an explicit error, a
//! write's position being fixed at construction.
//!
//! Each query value is built fresh for one logical operation and discarded
//! after `process` returns or fails; none of the variants retries or
//! recovers partial results.

pub mod buffer;
pub mod engine;
pub mod index_data;
pub mod ordered_write;
pub mod read;
pub mod sort;
pub mod subarray;
pub mod unordered_write;

use compact_str::CompactString;
use thiserror::Error;

pub use buffer::QueryBuffer;
pub use engine::{ArrayQuery, Layout, QueryError, QueryStatus, QueryType};
pub use index_data::{IndexData, IndexDataError};
pub use ordered_write::OrderedWriteDataQuery;
pub use read::ReadDataQuery;
pub use sort::is_sorted_buffer;
pub use subarray::{Range, Subarray, SubarrayError};
pub use unordered_write::UnorderedWriteDataQuery;

use crate::label::{DimensionLabel, LabelOrder};

#[derive(Debug, Error)]
pub enum DataQueryError {
    #[error("label data is not in the expected order")]
    UnsortedLabelData,

    #[error("dimension label writes can only be set for a single range (found {count})")]
    MultiRangeWrite { count: usize },

    #[error("updating index ranges is not supported on writes")]
    UnsupportedIndexRangeUpdate,

    #[error("index ranges cannot be updated after the query has been processed")]
    RangesAfterProcess,

    #[error("the subarray still carries unresolved label ranges")]
    UnresolvedLabelRanges,

    #[error("label order {0:?} is not supported by this query variant")]
    UnexpectedLabelOrder(LabelOrder),

    #[error(transparent)]
    Engine(#[from] QueryError),

    #[error(transparent)]
    Subarray(#[from] SubarrayError),

    #[error(transparent)]
    IndexData(#[from] IndexDataError),
}

/// One dimension-label data query, built fresh per logical operation.
pub enum LabelDataQuery {
    Read(ReadDataQuery),
    OrderedWrite(OrderedWriteDataQuery),
    UnorderedWrite(UnorderedWriteDataQuery),
}

impl LabelDataQuery {
    /// Build a read query for label values over the index dimension.
    pub fn read(
        label: &DimensionLabel,
        parent_subarray: &Subarray,
        label_buffer: &QueryBuffer,
        dim_idx: usize,
    ) -> Result<Self, DataQueryError> {
        Ok(Self::Read(ReadDataQuery::new(
            label,
            parent_subarray,
            label_buffer,
            dim_idx,
        )?))
    }

    /// Build the write query matching the label's order.
    pub fn write(
        label: &DimensionLabel,
        parent_subarray: &Subarray,
        label_buffer: &QueryBuffer,
        index_buffer: Option<&QueryBuffer>,
        dim_idx: usize,
        fragment_name: Option<CompactString>,
    ) -> Result<Self, DataQueryError> {
        match label.label_order() {
            LabelOrder::Increasing | LabelOrder::Decreasing => {
                Ok(Self::OrderedWrite(OrderedWriteDataQuery::new(
                    label,
                    parent_subarray,
                    label_buffer,
                    index_buffer,
                    dim_idx,
                    fragment_name,
                )?))
            }
            LabelOrder::Unordered => Ok(Self::UnorderedWrite(UnorderedWriteDataQuery::new(
                label,
                parent_subarray,
                label_buffer,
                index_buffer,
                dim_idx,
                fragment_name,
            )?)),
        }
    }

    /// Run the delegated queries to completion.
    pub fn process(&mut self) -> Result<(), DataQueryError> {
        match self {
            Self::Read(query) => query.process(),
            Self::OrderedWrite(query) => query.process(),
            Self::UnorderedWrite(query) => query.process(),
        }
    }

    /// Whether every delegated query reached the completed status.
    pub fn completed(&self) -> bool {
        match self {
            Self::Read(query) => query.completed(),
            Self::OrderedWrite(query) => query.completed(),
            Self::UnorderedWrite(query) => query.completed(),
        }
    }

    /// Apply index ranges resolved from label values. Supported on reads
    /// only; both write variants reject the call.
    pub fn add_index_ranges_from_label(
        &mut self,
        is_point_ranges: bool,
        data: &[u8],
        count: u64,
    ) -> Result<(), DataQueryError> {
        match self {
            Self::Read(query) => query.add_index_ranges_from_label(is_point_ranges, data, count),
            Self::OrderedWrite(query) => {
                query.add_index_ranges_from_label(is_point_ranges, data, count)
            }
            Self::UnorderedWrite(query) => {
                query.add_index_ranges_from_label(is_point_ranges, data, count)
            }
        }
    }
}
