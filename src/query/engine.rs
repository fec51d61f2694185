//! The delegated array query.
//!
//! An [`ArrayQuery`] executes one read or write against a single
//! [`ArrayHandle`]: configure (layout, subarray, named buffers), `init`,
//! `process`, then poll `status`. Configuration is frozen once `init` has
//! run.
//!
//! Dense arrays execute in row-major order over the subarray (default
//! subarray means the whole domain). Sparse arrays accept unordered writes
//! keyed by the coordinate buffer and row-major reads that gather values in
//! coordinate order. A read that does not fit its output buffer fills as
//! many whole cells as fit and reports [`QueryStatus::Incomplete`].

use std::sync::Arc;

use compact_str::CompactString;
use thiserror::Error;

use crate::{
    query::{buffer::QueryBuffer, subarray::Subarray},
    schema::ArrayType,
    storage::{ArrayHandle, FragmentMeta, StorageError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    RowMajor,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Uninitialized,
    Initialized,
    InProgress,
    Incomplete,
    Completed,
    Failed,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query layout was never set")]
    MissingLayout,

    #[error("layout {layout:?} is not valid for a {array_type:?} {query_type:?} query")]
    InvalidLayout {
        layout: Layout,
        array_type: ArrayType,
        query_type: QueryType,
    },

    #[error("no field named {name:?} in the array schema")]
    UnknownField { name: CompactString },

    #[error("no buffer bound for field {name:?}")]
    MissingBuffer { name: CompactString },

    #[error("subarray has {actual} dimensions, array has {expected}")]
    DimensionCountMismatch { expected: usize, actual: usize },

    #[error("subarray still carries unresolved label ranges")]
    LabelRangesPending,

    #[error("range start is greater than range end")]
    InvertedRange,

    #[error("buffer holds {actual} bytes, subarray selects {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("query was already initialized")]
    AlreadyInitialized,

    #[error("query cannot process in status {status:?}")]
    NotReady { status: QueryStatus },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct ArrayQuery {
    array: Arc<ArrayHandle>,
    query_type: QueryType,
    fragment_name: Option<CompactString>,
    layout: Option<Layout>,
    subarray: Subarray,
    dimension_buffer: Option<QueryBuffer>,
    attribute_buffer: Option<QueryBuffer>,
    status: QueryStatus,
}

impl ArrayQuery {
    pub fn new(
        array: Arc<ArrayHandle>,
        query_type: QueryType,
        fragment_name: Option<CompactString>,
    ) -> Self {
        let subarray = Subarray::new(std::slice::from_ref(&array.schema().dimension));
        Self {
            array,
            query_type,
            fragment_name,
            layout: None,
            subarray,
            dimension_buffer: None,
            attribute_buffer: None,
            status: QueryStatus::Uninitialized,
        }
    }

    pub fn array(&self) -> &Arc<ArrayHandle> {
        &self.array
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn subarray(&self) -> &Subarray {
        &self.subarray
    }

    pub fn set_layout(&mut self, layout: Layout) -> Result<(), QueryError> {
        self.check_mutable()?;
        self.layout = Some(layout);
        Ok(())
    }

    pub fn set_subarray(&mut self, subarray: Subarray) -> Result<(), QueryError> {
        self.check_mutable()?;
        if subarray.ndim() != 1 {
            return Err(QueryError::DimensionCountMismatch {
                expected: 1,
                actual: subarray.ndim(),
            });
        }
        self.subarray = subarray;
        Ok(())
    }

    /// Bind a buffer to a dimension or attribute by name.
    pub fn set_dimension_label_buffer(
        &mut self,
        name: &str,
        buffer: &QueryBuffer,
    ) -> Result<(), QueryError> {
        self.bind_buffer(name, buffer)
    }

    /// Bind a plain data buffer to a dimension or attribute by name.
    pub fn set_data_buffer(&mut self, name: &str, buffer: &QueryBuffer) -> Result<(), QueryError> {
        self.bind_buffer(name, buffer)
    }

    fn bind_buffer(&mut self, name: &str, buffer: &QueryBuffer) -> Result<(), QueryError> {
        self.check_mutable()?;
        let schema = self.array.schema();
        if name == schema.dimension.name {
            self.dimension_buffer = Some(buffer.clone());
        } else if name == schema.attribute.name {
            self.attribute_buffer = Some(buffer.clone());
        } else {
            return Err(QueryError::UnknownField { name: name.into() });
        }
        Ok(())
    }

    fn check_mutable(&self) -> Result<(), QueryError> {
        if self.status != QueryStatus::Uninitialized {
            return Err(QueryError::AlreadyInitialized);
        }
        Ok(())
    }

    /// Validate the configuration and freeze it.
    pub fn init(&mut self) -> Result<(), QueryError> {
        if self.status != QueryStatus::Uninitialized {
            return Err(QueryError::AlreadyInitialized);
        }

        let layout = self.layout.ok_or(QueryError::MissingLayout)?;
        let array_type = self.array.array_type();
        let layout_ok = match (array_type, self.query_type) {
            (ArrayType::Dense, _) => layout == Layout::RowMajor,
            (ArrayType::Sparse, QueryType::Write) => layout == Layout::Unordered,
            (ArrayType::Sparse, QueryType::Read) => true,
        };
        if !layout_ok {
            return Err(QueryError::InvalidLayout {
                layout,
                array_type,
                query_type: self.query_type,
            });
        }

        if self.subarray.has_label_ranges(0) {
            return Err(QueryError::LabelRangesPending);
        }

        let schema = self.array.schema();
        if self.attribute_buffer.is_none() {
            return Err(QueryError::MissingBuffer {
                name: schema.attribute.name.clone(),
            });
        }
        if array_type == ArrayType::Sparse
            && self.query_type == QueryType::Write
            && self.dimension_buffer.is_none()
        {
            return Err(QueryError::MissingBuffer {
                name: schema.dimension.name.clone(),
            });
        }

        self.status = QueryStatus::Initialized;
        Ok(())
    }

    /// Execute the query to completion.
    pub fn process(&mut self) -> Result<(), QueryError> {
        match self.status {
            QueryStatus::Initialized | QueryStatus::Incomplete => {}
            status => return Err(QueryError::NotReady { status }),
        }
        self.status = QueryStatus::InProgress;
        match self.run() {
            Ok(status) => {
                self.status = status;
                Ok(())
            }
            Err(e) => {
                self.status = QueryStatus::Failed;
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<QueryStatus, QueryError> {
        match (self.array.array_type(), self.query_type) {
            (ArrayType::Dense, QueryType::Write) => self.run_dense_write(),
            (ArrayType::Dense, QueryType::Read) => self.run_dense_read(),
            (ArrayType::Sparse, QueryType::Write) => self.run_sparse_write(),
            (ArrayType::Sparse, QueryType::Read) => self.run_sparse_read(),
        }
    }

    /// Expand the subarray into cell positions, in range order. A default
    /// subarray expands to the whole domain.
    fn dense_positions(&self) -> Result<Vec<u64>, QueryError> {
        let schema = self.array.schema();
        let domain = schema
            .dimension
            .domain
            .clone()
            .ok_or(StorageError::MissingDomain)?;

        let ranges = self.subarray.ranges_for_dim(0);
        let full_domain = [domain];
        let ranges = if ranges.is_empty() {
            &full_domain[..]
        } else {
            ranges
        };

        let mut positions = Vec::new();
        for range in ranges {
            let start = self.array.dense_position(range.start_bytes())?;
            let end = self.array.dense_position(range.end_bytes())?;
            if end < start {
                return Err(QueryError::InvertedRange);
            }
            positions.extend(start..=end);
        }
        Ok(positions)
    }

    fn attribute_width(&self) -> usize {
        let Some(width) = self.array.schema().attribute.dtype.size() else {
            unreachable!("variable-sized attributes are rejected at array allocation");
        };
        width
    }

    fn bound_attribute_buffer(&self) -> &QueryBuffer {
        let Some(buffer) = self.attribute_buffer.as_ref() else {
            unreachable!("init checked the attribute buffer binding");
        };
        buffer
    }

    fn fragment_meta(&self, cell_count: u64) -> FragmentMeta {
        FragmentMeta::new(self.fragment_name.clone(), cell_count)
    }

    fn run_dense_write(&mut self) -> Result<QueryStatus, QueryError> {
        let positions = self.dense_positions()?;
        let width = self.attribute_width();
        let buffer = self.bound_attribute_buffer();

        let expected = positions.len() * width;
        if buffer.bytes_used() != expected {
            return Err(QueryError::BufferSizeMismatch {
                expected,
                actual: buffer.bytes_used(),
            });
        }

        let fragment = self.fragment_meta(positions.len() as u64);
        tracing::debug!(
            fragment = %fragment.name,
            cells = positions.len(),
            "dense write"
        );
        buffer.with_bytes(|bytes| self.array.dense_write(&positions, bytes, fragment))?;
        Ok(QueryStatus::Completed)
    }

    fn run_dense_read(&mut self) -> Result<QueryStatus, QueryError> {
        let positions = self.dense_positions()?;
        let width = self.attribute_width();
        let cells = self.array.dense_read(&positions)?;
        let (written, complete) = self.bound_attribute_buffer().fill_cells(&cells, width);
        tracing::debug!(bytes = written, complete, "dense read");
        Ok(if complete {
            QueryStatus::Completed
        } else {
            QueryStatus::Incomplete
        })
    }

    fn run_sparse_write(&mut self) -> Result<QueryStatus, QueryError> {
        let Some(dimension_buffer) = self.dimension_buffer.as_ref() else {
            unreachable!("init checked the dimension buffer binding");
        };
        let attribute_buffer = self.bound_attribute_buffer();

        let Some(coord_width) = self.array.schema().dimension.dtype.size() else {
            unreachable!("variable-sized dimensions are rejected at array allocation");
        };
        let cell_count = dimension_buffer.element_count(coord_width) as u64;

        let fragment = self.fragment_meta(cell_count);
        tracing::debug!(
            fragment = %fragment.name,
            cells = cell_count,
            "sparse write"
        );
        dimension_buffer.with_bytes(|coords| {
            attribute_buffer.with_bytes(|values| self.array.sparse_write(coords, values, fragment))
        })?;
        Ok(QueryStatus::Completed)
    }

    fn run_sparse_read(&mut self) -> Result<QueryStatus, QueryError> {
        let width = self.attribute_width();
        let cells = self.array.sparse_read(self.subarray.ranges_for_dim(0))?;
        let (written, complete) = self.bound_attribute_buffer().fill_cells(&cells, width);
        tracing::debug!(bytes = written, complete, "sparse read");
        Ok(if complete {
            QueryStatus::Completed
        } else {
            QueryStatus::Incomplete
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dtype::DataType,
        query::subarray::Range,
        schema::{ArraySchema, AttributeDescriptor, DimensionDescriptor},
    };

    fn dense_array() -> Arc<ArrayHandle> {
        ArrayHandle::new(ArraySchema::new(
            ArrayType::Dense,
            DimensionDescriptor::with_domain("index", DataType::U64, Range::interval(0u64, 7u64)),
            AttributeDescriptor::new("label", DataType::F64),
        ))
        .unwrap()
    }

    fn sparse_array() -> Arc<ArrayHandle> {
        ArrayHandle::new(ArraySchema::new(
            ArrayType::Sparse,
            DimensionDescriptor::new("label", DataType::F64),
            AttributeDescriptor::new("index", DataType::U64),
        ))
        .unwrap()
    }

    #[test]
    fn dense_write_then_read_over_a_range() {
        let array = dense_array();

        let mut write = ArrayQuery::new(array.clone(), QueryType::Write, None);
        write.set_layout(Layout::RowMajor).unwrap();
        let mut subarray = write.subarray().clone();
        subarray
            .set_ranges_for_dim(0, vec![Range::interval(2u64, 4u64)])
            .unwrap();
        write.set_subarray(subarray).unwrap();
        let values = QueryBuffer::from_vec(vec![1.0f64, 2.0, 3.0]);
        write.set_data_buffer("label", &values).unwrap();
        write.init().unwrap();
        write.process().unwrap();
        assert_eq!(write.status(), QueryStatus::Completed);

        let mut read = ArrayQuery::new(array, QueryType::Read, None);
        read.set_layout(Layout::RowMajor).unwrap();
        let mut subarray = read.subarray().clone();
        subarray
            .set_ranges_for_dim(0, vec![Range::interval(2u64, 4u64)])
            .unwrap();
        read.set_subarray(subarray).unwrap();
        let out = QueryBuffer::with_capacity(3 * 8);
        read.set_data_buffer("label", &out).unwrap();
        read.init().unwrap();
        read.process().unwrap();
        assert_eq!(read.status(), QueryStatus::Completed);
        assert_eq!(out.typed_values::<f64>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn dense_write_requires_matching_buffer_size() {
        let array = dense_array();
        let mut write = ArrayQuery::new(array, QueryType::Write, None);
        write.set_layout(Layout::RowMajor).unwrap();
        let values = QueryBuffer::from_vec(vec![1.0f64, 2.0]);
        write.set_data_buffer("label", &values).unwrap();
        write.init().unwrap();
        let err = match write.process() {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            QueryError::BufferSizeMismatch { expected, actual } => {
                assert_eq!(expected, 8 * 8);
                assert_eq!(actual, 2 * 8);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(write.status(), QueryStatus::Failed);
    }

    #[test]
    fn undersized_read_buffer_reports_incomplete() {
        let array = dense_array();
        let mut write = ArrayQuery::new(array.clone(), QueryType::Write, None);
        write.set_layout(Layout::RowMajor).unwrap();
        let values = QueryBuffer::from_vec((0..8).map(|v| v as f64).collect::<Vec<_>>());
        write.set_data_buffer("label", &values).unwrap();
        write.init().unwrap();
        write.process().unwrap();

        let mut read = ArrayQuery::new(array, QueryType::Read, None);
        read.set_layout(Layout::RowMajor).unwrap();
        let out = QueryBuffer::with_capacity(3 * 8 + 4);
        read.set_data_buffer("label", &out).unwrap();
        read.init().unwrap();
        read.process().unwrap();
        assert_eq!(read.status(), QueryStatus::Incomplete);
        assert_eq!(out.typed_values::<f64>(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn sparse_write_requires_unordered_layout() {
        let array = sparse_array();
        let mut write = ArrayQuery::new(array, QueryType::Write, None);
        write.set_layout(Layout::RowMajor).unwrap();
        let coords = QueryBuffer::from_vec(vec![1.0f64]);
        let values = QueryBuffer::from_vec(vec![0u64]);
        write.set_dimension_label_buffer("label", &coords).unwrap();
        write.set_data_buffer("index", &values).unwrap();
        let err = match write.init() {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, QueryError::InvalidLayout { .. }));
    }

    #[test]
    fn unknown_field_names_are_rejected() {
        let array = dense_array();
        let mut write = ArrayQuery::new(array, QueryType::Write, None);
        let buffer = QueryBuffer::from_vec(vec![0.0f64]);
        let err = match write.set_data_buffer("no_such_field", &buffer) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        match err {
            QueryError::UnknownField { name } => assert_eq!(name, "no_such_field"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn configuration_freezes_after_init() {
        let array = dense_array();
        let mut write = ArrayQuery::new(array, QueryType::Write, None);
        write.set_layout(Layout::RowMajor).unwrap();
        let values = QueryBuffer::from_vec((0..8).map(|v| v as f64).collect::<Vec<_>>());
        write.set_data_buffer("label", &values).unwrap();
        write.init().unwrap();
        assert!(matches!(
            write.set_layout(Layout::RowMajor),
            Err(QueryError::AlreadyInitialized)
        ));
    }

    #[test]
    fn fragment_name_override_is_recorded() {
        let array = dense_array();
        let mut write = ArrayQuery::new(
            array.clone(),
            QueryType::Write,
            Some("batch_7".into()),
        );
        write.set_layout(Layout::RowMajor).unwrap();
        let values = QueryBuffer::from_vec((0..8).map(|v| v as f64).collect::<Vec<_>>());
        write.set_data_buffer("label", &values).unwrap();
        write.init().unwrap();
        write.process().unwrap();
        let fragments = array.fragments();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].name, "batch_7");
        assert_eq!(fragments[0].cell_count, 8);
    }
}
