//! Label-space reads against the indexed array.

use crate::{
    label::DimensionLabel,
    query::{
        buffer::QueryBuffer,
        engine::{ArrayQuery, Layout, QueryStatus, QueryType},
        subarray::Subarray,
        DataQueryError,
    },
};

/// Reads label values for a region of the index dimension.
///
/// The delegated query starts from the caller's index-space constraint (if
/// one was resolved at construction time); ranges resolved from label
/// values later are applied through [`Self::add_index_ranges_from_label`],
/// which must happen before [`Self::process`].
pub struct ReadDataQuery {
    query: ArrayQuery,
    processed: bool,
}

impl ReadDataQuery {
    pub fn new(
        label: &DimensionLabel,
        parent_subarray: &Subarray,
        label_buffer: &QueryBuffer,
        dim_idx: usize,
    ) -> Result<Self, DataQueryError> {
        parent_subarray.check_dim(dim_idx)?;

        let mut query = ArrayQuery::new(label.indexed_array().clone(), QueryType::Read, None);
        query.set_layout(Layout::RowMajor)?;

        // Carry over the caller's constraint only once it is index-space;
        // label ranges wait for the resolver.
        if !parent_subarray.is_default(dim_idx) && !parent_subarray.has_label_ranges(dim_idx) {
            let mut subarray = query.subarray().clone();
            subarray.set_ranges_for_dim(0, parent_subarray.ranges_for_dim(dim_idx).to_vec())?;
            query.set_subarray(subarray)?;
        }

        query.set_dimension_label_buffer(&label.label_attribute().name, label_buffer)?;

        Ok(Self {
            query,
            processed: false,
        })
    }

    /// Apply index ranges resolved from label values to the delegated
    /// subarray.
    pub fn add_index_ranges_from_label(
        &mut self,
        is_point_ranges: bool,
        data: &[u8],
        count: u64,
    ) -> Result<(), DataQueryError> {
        if self.processed {
            return Err(DataQueryError::RangesAfterProcess);
        }
        let mut subarray = self.query.subarray().clone();
        subarray.add_index_ranges_from_label(0, is_point_ranges, data, count)?;
        self.query.set_subarray(subarray)?;
        Ok(())
    }

    pub fn process(&mut self) -> Result<(), DataQueryError> {
        self.processed = true;
        self.query.init()?;
        self.query.process()?;
        Ok(())
    }

    pub fn completed(&self) -> bool {
        self.query.status() == QueryStatus::Completed
    }
}
