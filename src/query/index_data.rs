//! Synthesized index sequences for writes without explicit index data.

use bytes::BytesMut;
use thiserror::Error;

use crate::{
    dtype::{dispatch_index_scalar, DataType, NativeScalar},
    query::{buffer::QueryBuffer, subarray::Range},
};

#[derive(Debug, Error)]
pub enum IndexDataError {
    #[error("index range start is greater than its end")]
    InvertedRange,

    #[error("index range of {count} values is too large to synthesize")]
    SequenceTooLarge { count: u64 },
}

/// A freshly allocated dense sequence of native index values covering one
/// coordinate range.
///
/// The sequence is owned by the query that synthesized it and is handed to
/// delegated queries through the shared buffer handle; it is never mutated
/// after generation.
pub struct IndexData {
    dtype: DataType,
    buffer: QueryBuffer,
    count: u64,
}

impl IndexData {
    /// Generate the sequence `start..=end` for `range`.
    ///
    /// The dispatch traps on datatypes that cannot address positions;
    /// schema validation keeps those out of every index dimension.
    pub fn generate(dtype: DataType, range: &Range) -> Result<Self, IndexDataError> {
        dispatch_index_scalar!(dtype, T => {
            let start = range.start_as::<T>();
            let end = range.end_as::<T>();
            if end < start {
                return Err(IndexDataError::InvertedRange);
            }
            let count = u64::try_from(end as i128 - start as i128 + 1)
                .map_err(|_| IndexDataError::SequenceTooLarge { count: u64::MAX })?;
            let total_bytes = usize::try_from(count)
                .ok()
                .and_then(|n| n.checked_mul(T::WIDTH))
                .ok_or(IndexDataError::SequenceTooLarge { count })?;

            let mut data = BytesMut::with_capacity(total_bytes);
            let mut value = start;
            loop {
                data.extend_from_slice(&value.to_ne_vec());
                if value == end {
                    break;
                }
                match value.checked_add(1) {
                    Some(next) => value = next,
                    None => break,
                }
            }

            Ok(Self {
                dtype,
                buffer: QueryBuffer::from_bytes(&data),
                count,
            })
        }, _ => unreachable!("index dimensions never carry {dtype:?} coordinates"))
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn buffer(&self) -> &QueryBuffer {
        &self.buffer
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_the_inclusive_sequence() {
        let data = IndexData::generate(DataType::U64, &Range::interval(3u64, 6u64)).unwrap();
        assert_eq!(data.count(), 4);
        assert_eq!(data.buffer().typed_values::<u64>(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn point_ranges_generate_one_value() {
        let data = IndexData::generate(DataType::I32, &Range::point(-5i32)).unwrap();
        assert_eq!(data.count(), 1);
        assert_eq!(data.buffer().typed_values::<i32>(), vec![-5]);
    }

    #[test]
    fn signed_ranges_cross_zero() {
        let data = IndexData::generate(DataType::I16, &Range::interval(-2i16, 1i16)).unwrap();
        assert_eq!(data.buffer().typed_values::<i16>(), vec![-2, -1, 0, 1]);
    }

    #[test]
    fn datetime_ranges_generate_tick_sequences() {
        let data =
            IndexData::generate(DataType::DateTimeDay, &Range::interval(10i64, 12i64)).unwrap();
        assert_eq!(data.buffer().typed_values::<i64>(), vec![10, 11, 12]);
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let err = match IndexData::generate(DataType::U64, &Range::interval(6u64, 3u64)) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, IndexDataError::InvertedRange));
    }
}
