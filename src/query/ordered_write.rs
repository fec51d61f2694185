//! Writes to ordered dimension labels.

use compact_str::CompactString;

use crate::{
    label::{DimensionLabel, LabelOrder},
    query::{
        buffer::QueryBuffer,
        engine::{ArrayQuery, Layout, QueryStatus, QueryType},
        sort::is_sorted_buffer,
        subarray::Subarray,
        DataQueryError,
    },
};

/// Writes label values along the index dimension of an ordered label.
///
/// The label data must already be sorted in the label's direction; that is
/// verified before anything is configured, so a violation never reaches the
/// array. Positions come either from the caller's subarray or, when an
/// index buffer is supplied, from its coordinates added as (coalesced)
/// point ranges.
pub struct OrderedWriteDataQuery {
    query: ArrayQuery,
}

impl OrderedWriteDataQuery {
    pub fn new(
        label: &DimensionLabel,
        parent_subarray: &Subarray,
        label_buffer: &QueryBuffer,
        index_buffer: Option<&QueryBuffer>,
        dim_idx: usize,
        fragment_name: Option<CompactString>,
    ) -> Result<Self, DataQueryError> {
        let increasing = match label.label_order() {
            LabelOrder::Increasing => true,
            LabelOrder::Decreasing => false,
            order @ LabelOrder::Unordered => {
                return Err(DataQueryError::UnexpectedLabelOrder(order))
            }
        };

        if !is_sorted_buffer(label_buffer, label.label_dimension().dtype, increasing) {
            return Err(DataQueryError::UnsortedLabelData);
        }

        let mut query = ArrayQuery::new(
            label.indexed_array().clone(),
            QueryType::Write,
            fragment_name,
        );
        query.set_layout(Layout::RowMajor)?;
        query.set_dimension_label_buffer(&label.label_attribute().name, label_buffer)?;

        match index_buffer {
            None => {
                parent_subarray.check_dim(dim_idx)?;
                if !parent_subarray.is_default(dim_idx) {
                    if parent_subarray.has_label_ranges(dim_idx) {
                        return Err(DataQueryError::UnresolvedLabelRanges);
                    }
                    let mut subarray = query.subarray().clone();
                    subarray
                        .set_ranges_for_dim(0, parent_subarray.ranges_for_dim(dim_idx).to_vec())?;
                    query.set_subarray(subarray)?;
                }
            }
            Some(index_buffer) => {
                let Some(width) = label.index_dimension().dtype.size() else {
                    unreachable!("index dimensions always have a fixed width");
                };
                let count = index_buffer.element_count(width) as u64;
                let mut subarray = query.subarray().clone();
                subarray.set_coalesce_ranges(true);
                index_buffer
                    .with_bytes(|bytes| subarray.add_point_ranges(0, bytes, count))?;
                query.set_subarray(subarray)?;
            }
        }

        Ok(Self { query })
    }

    pub fn add_index_ranges_from_label(
        &mut self,
        _is_point_ranges: bool,
        _data: &[u8],
        _count: u64,
    ) -> Result<(), DataQueryError> {
        Err(DataQueryError::UnsupportedIndexRangeUpdate)
    }

    pub fn process(&mut self) -> Result<(), DataQueryError> {
        self.query.init()?;
        self.query.process()?;
        Ok(())
    }

    pub fn completed(&self) -> bool {
        self.query.status() == QueryStatus::Completed
    }
}
