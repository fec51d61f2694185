//! Writes to unordered dimension labels.

use compact_str::CompactString;

use crate::{
    label::{DimensionLabel, LabelOrder},
    query::{
        buffer::QueryBuffer,
        engine::{ArrayQuery, Layout, QueryStatus, QueryType},
        index_data::IndexData,
        subarray::Subarray,
        DataQueryError,
    },
};

/// Writes one logical set of (index, label) pairs to both physical arrays.
///
/// The same pair of columns is written once per array with the
/// dimension/attribute roles swapped: the indexed array keys cells by
/// position and stores labels, the labelled array keys cells by label and
/// stores positions. When the caller supplies no index buffer, the single
/// range on the parent subarray is expanded into a synthesized index
/// sequence owned by this query.
///
/// `process` runs the indexed-array write first, then the labelled-array
/// write, with no rollback: a failure in the second phase leaves the first
/// committed, and only the fragment records tell the two apart.
pub struct UnorderedWriteDataQuery {
    indexed_query: ArrayQuery,
    labelled_query: ArrayQuery,
    index_data: Option<IndexData>,
}

impl UnorderedWriteDataQuery {
    pub fn new(
        label: &DimensionLabel,
        parent_subarray: &Subarray,
        label_buffer: &QueryBuffer,
        index_buffer: Option<&QueryBuffer>,
        dim_idx: usize,
        fragment_name: Option<CompactString>,
    ) -> Result<Self, DataQueryError> {
        if label.label_order() != LabelOrder::Unordered {
            return Err(DataQueryError::UnexpectedLabelOrder(label.label_order()));
        }

        let mut indexed_query = ArrayQuery::new(
            label.indexed_array().clone(),
            QueryType::Write,
            fragment_name.clone(),
        );
        let mut labelled_query = ArrayQuery::new(
            label.labelled_array().clone(),
            QueryType::Write,
            fragment_name,
        );

        // Synthesize index data when the caller supplies none. A generated
        // run can only describe one contiguous region, so the parent
        // subarray must carry exactly one range.
        let index_data = match index_buffer {
            Some(_) => None,
            None => {
                parent_subarray.check_dim(dim_idx)?;
                let ranges = parent_subarray.ranges_for_dim(dim_idx);
                if ranges.len() != 1 {
                    return Err(DataQueryError::MultiRangeWrite {
                        count: ranges.len(),
                    });
                }
                if parent_subarray.has_label_ranges(dim_idx) {
                    return Err(DataQueryError::UnresolvedLabelRanges);
                }
                Some(IndexData::generate(
                    label.index_dimension().dtype,
                    &ranges[0],
                )?)
            }
        };

        // Labelled array: label values key the cells, positions are data.
        labelled_query.set_layout(Layout::Unordered)?;
        labelled_query.set_dimension_label_buffer(&label.label_dimension().name, label_buffer)?;
        if let Some(data) = &index_data {
            labelled_query.set_data_buffer(&label.index_attribute().name, data.buffer())?;
        } else if let Some(index_buffer) = index_buffer {
            labelled_query
                .set_dimension_label_buffer(&label.index_attribute().name, index_buffer)?;
        }

        // Indexed array: positions key the cells, label values are data.
        indexed_query.set_layout(Layout::Unordered)?;
        indexed_query.set_dimension_label_buffer(&label.label_attribute().name, label_buffer)?;
        if let Some(data) = &index_data {
            indexed_query.set_data_buffer(&label.index_dimension().name, data.buffer())?;
        } else if let Some(index_buffer) = index_buffer {
            indexed_query
                .set_dimension_label_buffer(&label.index_dimension().name, index_buffer)?;
        }

        Ok(Self {
            indexed_query,
            labelled_query,
            index_data,
        })
    }

    pub fn index_data(&self) -> Option<&IndexData> {
        self.index_data.as_ref()
    }

    pub fn add_index_ranges_from_label(
        &mut self,
        _is_point_ranges: bool,
        _data: &[u8],
        _count: u64,
    ) -> Result<(), DataQueryError> {
        Err(DataQueryError::UnsupportedIndexRangeUpdate)
    }

    /// Write the indexed array, then the labelled array.
    pub fn process(&mut self) -> Result<(), DataQueryError> {
        self.indexed_query.init()?;
        self.indexed_query.process()?;

        self.labelled_query.init()?;
        self.labelled_query.process()?;
        Ok(())
    }

    pub fn completed(&self) -> bool {
        self.indexed_query.status() == QueryStatus::Completed
            && self.labelled_query.status() == QueryStatus::Completed
    }
}
