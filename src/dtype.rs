//! Logical datatypes for dimension and attribute values.
//!
//! Every datatype a dimension label can carry is fixed-width; [`NativeScalar`]
//! ties each of them to the native Rust scalar used for decoding, comparison,
//! and order-preserving key encoding. The date/time datatypes all share `i64`
//! tick storage and differ only in unit.

use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Utf8,
    DateTimeYear,
    DateTimeMonth,
    DateTimeWeek,
    DateTimeDay,
    DateTimeHour,
    DateTimeMinute,
    DateTimeSecond,
    DateTimeMillisecond,
    DateTimeMicrosecond,
    DateTimeNanosecond,
    DateTimePicosecond,
    DateTimeFemtosecond,
    DateTimeAttosecond,
    TimeHour,
    TimeMinute,
    TimeSecond,
    TimeMillisecond,
    TimeMicrosecond,
    TimeNanosecond,
    TimePicosecond,
    TimeFemtosecond,
    TimeAttosecond,
}

impl DataType {
    pub const fn is_variable_sized(&self) -> bool {
        matches!(self, DataType::Utf8)
    }

    /// Width of one value in bytes, `None` for variable-sized types.
    pub const fn size(&self) -> Option<usize> {
        match self {
            DataType::I8 | DataType::U8 | DataType::Bool => Some(1),
            DataType::I16 | DataType::U16 => Some(2),
            DataType::I32 | DataType::U32 | DataType::F32 => Some(4),
            DataType::Utf8 => None,
            // I64, U64, F64 and every date/time unit.
            _ => Some(8),
        }
    }

    pub const fn is_datetime(&self) -> bool {
        matches!(
            self,
            DataType::DateTimeYear
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
        )
    }

    pub const fn is_time(&self) -> bool {
        matches!(
            self,
            DataType::TimeHour
                | DataType::TimeMinute
                | DataType::TimeSecond
                | DataType::TimeMillisecond
                | DataType::TimeMicrosecond
                | DataType::TimeNanosecond
                | DataType::TimePicosecond
                | DataType::TimeFemtosecond
                | DataType::TimeAttosecond
        )
    }

    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::I8
                | DataType::I16
                | DataType::I32
                | DataType::I64
                | DataType::U8
                | DataType::U16
                | DataType::U32
                | DataType::U64
        )
    }

    /// Whether values of this datatype have a total order usable for
    /// dimension coordinates and ordered label data.
    pub const fn is_sortable(&self) -> bool {
        self.is_integral()
            || self.is_datetime()
            || self.is_time()
            || matches!(self, DataType::F32 | DataType::F64)
    }

    /// Whether this datatype can serve as an index dimension (a native
    /// position coordinate).
    pub const fn is_index_compatible(&self) -> bool {
        self.is_integral() || self.is_datetime() || self.is_time()
    }

    /// Encode one value as a key whose byte order matches the value order.
    ///
    /// Unsigned values map to their big-endian bytes; signed values have the
    /// sign bit flipped first; floats go through the IEEE total-order
    /// mapping. Keys of the same datatype compare like the values they
    /// encode, which is what the sparse array relies on for cell order.
    ///
    /// # Panics
    /// Panics if `bytes` is not exactly one value wide, and traps on
    /// non-sortable datatypes, which schema validation keeps out of every
    /// dimension.
    pub(crate) fn order_key(&self, bytes: &[u8]) -> SmallVec<[u8; 8]> {
        match self {
            DataType::I8 => i8::from_ne_slice(bytes).order_key(),
            DataType::I16 => i16::from_ne_slice(bytes).order_key(),
            DataType::I32 => i32::from_ne_slice(bytes).order_key(),
            DataType::I64 => i64::from_ne_slice(bytes).order_key(),
            DataType::U8 => u8::from_ne_slice(bytes).order_key(),
            DataType::U16 => u16::from_ne_slice(bytes).order_key(),
            DataType::U32 => u32::from_ne_slice(bytes).order_key(),
            DataType::U64 => u64::from_ne_slice(bytes).order_key(),
            DataType::F32 => f32::from_ne_slice(bytes).order_key(),
            DataType::F64 => f64::from_ne_slice(bytes).order_key(),
            dt if dt.is_datetime() || dt.is_time() => i64::from_ne_slice(bytes).order_key(),
            _ => unreachable!("order keys are only defined for sortable datatypes"),
        }
    }
}

/// Native scalar backing a fixed-width datatype.
pub trait NativeScalar: Copy + PartialOrd {
    const WIDTH: usize;

    /// Decode one value from native-endian bytes.
    ///
    /// # Panics
    /// Panics if `bytes.len() != Self::WIDTH`.
    fn from_ne_slice(bytes: &[u8]) -> Self;

    /// Encode as native-endian bytes.
    fn to_ne_vec(self) -> SmallVec<[u8; 8]>;

    /// Encode as an order-preserving big-endian key.
    fn order_key(self) -> SmallVec<[u8; 8]>;
}

macro_rules! impl_native_scalar_unsigned {
    ($ty:ty) => {
        impl NativeScalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn from_ne_slice(bytes: &[u8]) -> Self {
                <$ty>::from_ne_bytes(bytes.try_into().unwrap())
            }

            fn to_ne_vec(self) -> SmallVec<[u8; 8]> {
                SmallVec::from_slice(&self.to_ne_bytes())
            }

            fn order_key(self) -> SmallVec<[u8; 8]> {
                SmallVec::from_slice(&self.to_be_bytes())
            }
        }
    };
}

macro_rules! impl_native_scalar_signed {
    ($ty:ty, $uty:ty) => {
        impl NativeScalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn from_ne_slice(bytes: &[u8]) -> Self {
                <$ty>::from_ne_bytes(bytes.try_into().unwrap())
            }

            fn to_ne_vec(self) -> SmallVec<[u8; 8]> {
                SmallVec::from_slice(&self.to_ne_bytes())
            }

            fn order_key(self) -> SmallVec<[u8; 8]> {
                let flipped = (self as $uty) ^ ((1 as $uty) << (<$uty>::BITS - 1));
                SmallVec::from_slice(&flipped.to_be_bytes())
            }
        }
    };
}

macro_rules! impl_native_scalar_float {
    ($ty:ty, $uty:ty) => {
        impl NativeScalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn from_ne_slice(bytes: &[u8]) -> Self {
                <$ty>::from_ne_bytes(bytes.try_into().unwrap())
            }

            fn to_ne_vec(self) -> SmallVec<[u8; 8]> {
                SmallVec::from_slice(&self.to_ne_bytes())
            }

            fn order_key(self) -> SmallVec<[u8; 8]> {
                // IEEE total-order mapping: negatives reverse, positives
                // shift above them.
                let bits = self.to_bits();
                let key = if bits >> (<$uty>::BITS - 1) == 1 {
                    !bits
                } else {
                    bits | ((1 as $uty) << (<$uty>::BITS - 1))
                };
                SmallVec::from_slice(&key.to_be_bytes())
            }
        }
    };
}

impl_native_scalar_signed!(i8, u8);
impl_native_scalar_signed!(i16, u16);
impl_native_scalar_signed!(i32, u32);
impl_native_scalar_signed!(i64, u64);
impl_native_scalar_unsigned!(u8);
impl_native_scalar_unsigned!(u16);
impl_native_scalar_unsigned!(u32);
impl_native_scalar_unsigned!(u64);
impl_native_scalar_float!(f32, u32);
impl_native_scalar_float!(f64, u64);

/// Dispatch `$body` with `$T` bound to the native integer scalar of an
/// index-compatible datatype; `$fallback` runs for every other datatype.
/// Date/time datatypes dispatch as `i64`.
macro_rules! dispatch_index_scalar {
    ($dtype:expr, $T:ident => $body:expr, _ => $fallback:expr) => {{
        use $crate::dtype::DataType;
        match $dtype {
            DataType::I8 => {
                type $T = i8;
                $body
            }
            DataType::I16 => {
                type $T = i16;
                $body
            }
            DataType::I32 => {
                type $T = i32;
                $body
            }
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
            | DataType::TimeAttosecond => {
                type $T = i64;
                $body
            }
            DataType::U8 => {
                type $T = u8;
                $body
            }
            DataType::U16 => {
                type $T = u16;
                $body
            }
            DataType::U32 => {
                type $T = u32;
                $body
            }
            DataType::U64 => {
                type $T = u64;
                $body
            }
            _ => $fallback,
        }
    }};
}

pub(crate) use dispatch_index_scalar;

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of<T: NativeScalar>(v: T) -> SmallVec<[u8; 8]> {
        v.order_key()
    }

    #[test]
    fn signed_order_keys_sort_like_values() {
        let values = [i32::MIN, -7, -1, 0, 1, 42, i32::MAX];
        for pair in values.windows(2) {
            assert!(key_of(pair[0]) < key_of(pair[1]), "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn unsigned_order_keys_sort_like_values() {
        let values = [0u64, 1, 255, 256, u64::MAX];
        for pair in values.windows(2) {
            assert!(key_of(pair[0]) < key_of(pair[1]));
        }
    }

    #[test]
    fn float_order_keys_sort_like_values() {
        let values = [f64::NEG_INFINITY, -10.5, -0.0, 0.0, 0.25, 3.5, f64::INFINITY];
        for pair in values.windows(2) {
            assert!(key_of(pair[0]) <= key_of(pair[1]), "{} !<= {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn roundtrip_through_ne_bytes() {
        let v = -123456789i64;
        let bytes = v.to_ne_vec();
        assert_eq!(i64::from_ne_slice(&bytes), v);
    }

    #[test]
    fn datetime_datatypes_are_index_compatible() {
        assert!(DataType::DateTimeNanosecond.is_index_compatible());
        assert!(DataType::TimeSecond.is_index_compatible());
        assert!(!DataType::F64.is_index_compatible());
        assert!(!DataType::Utf8.is_index_compatible());
    }

    #[test]
    fn sizes_match_native_widths() {
        assert_eq!(DataType::I8.size(), Some(1));
        assert_eq!(DataType::F32.size(), Some(4));
        assert_eq!(DataType::DateTimeDay.size(), Some(8));
        assert_eq!(DataType::Utf8.size(), None);
    }

    #[test]
    fn dispatch_resolves_datetime_as_i64() {
        let width = dispatch_index_scalar!(DataType::DateTimeSecond, T => T::WIDTH, _ => 0);
        assert_eq!(width, 8);
    }
}
