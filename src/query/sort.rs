//! Monotonicity checks for ordered label data.

use crate::{
    dtype::{DataType, NativeScalar},
    query::buffer::QueryBuffer,
};

/// Strict monotonic scan over a typed buffer.
///
/// TODO: consider parallelizing this scan for large label buffers once the
/// write path is profiled.
fn is_sorted_scan<T: NativeScalar>(bytes: &[u8], increasing: bool) -> bool {
    let mut prev: Option<T> = None;
    for chunk in bytes.chunks_exact(T::WIDTH) {
        let value = T::from_ne_slice(chunk);
        if let Some(prev) = prev {
            if increasing {
                if value <= prev {
                    return false;
                }
            } else if value >= prev {
                return false;
            }
        }
        prev = Some(value);
    }
    true
}

/// Check whether `buffer` is strictly monotonic in the given direction.
///
/// Buffers holding zero or one value are vacuously sorted. The dispatch is
/// exhaustive over [`DataType`]; `Bool` and `Utf8` trap because schema
/// validation never lets them reach an ordered dimension label.
pub fn is_sorted_buffer(buffer: &QueryBuffer, dtype: DataType, increasing: bool) -> bool {
    let _span = tracing::trace_span!("check_data_sort").entered();
    buffer.with_bytes(|bytes| match dtype {
        DataType::I8 => is_sorted_scan::<i8>(bytes, increasing),
        DataType::I16 => is_sorted_scan::<i16>(bytes, increasing),
        DataType::I32 => is_sorted_scan::<i32>(bytes, increasing),
        DataType::U8 => is_sorted_scan::<u8>(bytes, increasing),
        DataType::U16 => is_sorted_scan::<u16>(bytes, increasing),
        DataType::U32 => is_sorted_scan::<u32>(bytes, increasing),
        DataType::U64 => is_sorted_scan::<u64>(bytes, increasing),
        DataType::F32 => is_sorted_scan::<f32>(bytes, increasing),
        DataType::F64 => is_sorted_scan::<f64>(bytes, increasing),
        DataType::I64
        | DataType::DateTimeYear
        | DataType::DateTimeMonth
        | DataType::DateTimeWeek
        | DataType::DateTimeDay
        | DataType::DateTimeHour
        | DataType::DateTimeMinute
        | DataType::DateTimeSecond
        | DataType::DateTimeMillisecond
        | DataType::DateTimeMicrosecond
        | DataType::DateTimeNanosecond
        | DataType::DateTimePicosecond
        | DataType::DateTimeFemtosecond
        | DataType::DateTimeAttosecond
        | DataType::TimeHour
        | DataType::TimeMinute
        | DataType::TimeSecond
        | DataType::TimeMillisecond
        | DataType::TimeMicrosecond
        | DataType::TimeNanosecond
        | DataType::TimePicosecond
        | DataType::TimeFemtosecond
        | DataType::TimeAttosecond => is_sorted_scan::<i64>(bytes, increasing),
        DataType::Bool | DataType::Utf8 => {
            unreachable!("ordered dimension labels never carry {dtype:?} data")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_single_buffers_are_sorted() {
        let empty = QueryBuffer::from_vec(Vec::<i32>::new());
        assert!(is_sorted_buffer(&empty, DataType::I32, true));
        assert!(is_sorted_buffer(&empty, DataType::I32, false));

        let single = QueryBuffer::from_vec(vec![5i32]);
        assert!(is_sorted_buffer(&single, DataType::I32, true));
        assert!(is_sorted_buffer(&single, DataType::I32, false));
    }

    #[test]
    fn strictly_increasing_data_passes() {
        let buffer = QueryBuffer::from_vec(vec![1i64, 3, 9]);
        assert!(is_sorted_buffer(&buffer, DataType::I64, true));
        assert!(!is_sorted_buffer(&buffer, DataType::I64, false));
    }

    #[test]
    fn unsorted_data_fails_both_directions() {
        let buffer = QueryBuffer::from_vec(vec![5i64, 3, 9]);
        assert!(!is_sorted_buffer(&buffer, DataType::I64, true));
        assert!(!is_sorted_buffer(&buffer, DataType::I64, false));
    }

    #[test]
    fn equal_neighbors_fail_the_strict_check() {
        let buffer = QueryBuffer::from_vec(vec![2u16, 2, 3]);
        assert!(!is_sorted_buffer(&buffer, DataType::U16, true));

        let buffer = QueryBuffer::from_vec(vec![3u16, 2, 2]);
        assert!(!is_sorted_buffer(&buffer, DataType::U16, false));
    }

    #[test]
    fn decreasing_floats_pass_the_decreasing_check() {
        let buffer = QueryBuffer::from_vec(vec![9.5f64, 2.25, -1.0]);
        assert!(is_sorted_buffer(&buffer, DataType::F64, false));
        assert!(!is_sorted_buffer(&buffer, DataType::F64, true));
    }

    #[test]
    fn datetime_data_scans_as_ticks() {
        let buffer = QueryBuffer::from_vec(vec![100i64, 200, 300]);
        assert!(is_sorted_buffer(&buffer, DataType::DateTimeSecond, true));
        let buffer = QueryBuffer::from_vec(vec![100i64, 50]);
        assert!(!is_sorted_buffer(&buffer, DataType::TimeNanosecond, true));
    }
}
