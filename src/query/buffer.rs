//! Shared data buffers bound to delegated queries.
//!
//! A [`QueryBuffer`] is a cheaply-clonable handle on one caller-provided
//! buffer. The same handle can be bound to several delegated queries at once
//! (an unordered label write binds its label buffer to two of them), so the
//! payload lives behind a lock and the engine reports bytes-in-use through
//! the handle rather than through a return value.
//!
//! Write-side buffers are created full ([`QueryBuffer::from_vec`] /
//! [`QueryBuffer::from_bytes`]); read-side buffers are created empty with a
//! fixed capacity ([`QueryBuffer::with_capacity`]) and filled by the engine.

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::RwLock;

use crate::dtype::NativeScalar;

struct BufferInner {
    data: BytesMut,
    /// Maximum bytes the engine may place in `data`. The engine never grows
    /// a buffer past this, even though `BytesMut` could.
    capacity: usize,
}

#[derive(Clone)]
pub struct QueryBuffer {
    inner: Arc<RwLock<BufferInner>>,
}

impl QueryBuffer {
    /// Wrap typed values as a full buffer.
    pub fn from_vec<T: NativeScalar>(values: Vec<T>) -> Self {
        let mut data = BytesMut::with_capacity(values.len() * T::WIDTH);
        for value in values {
            data.extend_from_slice(&value.to_ne_vec());
        }
        Self::from_bytes_mut(data)
    }

    /// Wrap raw bytes as a full buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(bytes.len());
        data.extend_from_slice(bytes);
        Self::from_bytes_mut(data)
    }

    fn from_bytes_mut(data: BytesMut) -> Self {
        let capacity = data.len();
        Self {
            inner: Arc::new(RwLock::new(BufferInner { data, capacity })),
        }
    }

    /// Create an empty output buffer the engine may fill with up to
    /// `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BufferInner {
                data: BytesMut::with_capacity(capacity),
                capacity,
            })),
        }
    }

    /// Bytes currently in use, as last reported by the engine (or as
    /// provided at construction for write-side buffers).
    pub fn bytes_used(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().capacity
    }

    /// Number of whole `width`-byte values currently in the buffer.
    pub fn element_count(&self, width: usize) -> usize {
        if width == 0 {
            return 0;
        }
        self.bytes_used() / width
    }

    /// Decode the in-use bytes as typed values, ignoring any trailing
    /// partial value.
    pub fn typed_values<T: NativeScalar>(&self) -> Vec<T> {
        let inner = self.inner.read();
        inner
            .data
            .chunks_exact(T::WIDTH)
            .map(T::from_ne_slice)
            .collect()
    }

    /// Run `f` over the in-use bytes.
    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.inner.read();
        f(&inner.data)
    }

    /// Replace the buffer contents with as many whole `cell_width`-byte
    /// values from `src` as fit in the capacity. Returns the bytes written
    /// and whether all of `src` fit.
    pub(crate) fn fill_cells(&self, src: &[u8], cell_width: usize) -> (usize, bool) {
        let mut inner = self.inner.write();
        let writable = if cell_width == 0 {
            0
        } else {
            (inner.capacity / cell_width) * cell_width
        };
        let n = src.len().min(writable);
        inner.data.clear();
        inner.data.extend_from_slice(&src[..n]);
        (n, n == src.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_vec_roundtrips_typed_values() {
        let buffer = QueryBuffer::from_vec(vec![3i32, -1, 7]);
        assert_eq!(buffer.bytes_used(), 12);
        assert_eq!(buffer.element_count(4), 3);
        assert_eq!(buffer.typed_values::<i32>(), vec![3, -1, 7]);
    }

    #[test]
    fn clones_share_the_payload() {
        let buffer = QueryBuffer::with_capacity(16);
        let alias = buffer.clone();
        let (written, complete) = buffer.fill_cells(&42u64.to_ne_bytes(), 8);
        assert_eq!(written, 8);
        assert!(complete);
        assert_eq!(alias.typed_values::<u64>(), vec![42]);
    }

    #[test]
    fn fill_cells_truncates_to_whole_cells() {
        let buffer = QueryBuffer::with_capacity(20);
        let src: Vec<u8> = (0u64..4).flat_map(|v| v.to_ne_bytes()).collect();
        let (written, complete) = buffer.fill_cells(&src, 8);
        assert_eq!(written, 16);
        assert!(!complete);
        assert_eq!(buffer.typed_values::<u64>(), vec![0, 1]);
    }

    #[test]
    fn capacity_is_fixed_at_construction() {
        let buffer = QueryBuffer::from_vec(vec![1u8, 2, 3]);
        assert_eq!(buffer.capacity(), 3);
        let (written, complete) = buffer.fill_cells(&[9, 9, 9, 9], 1);
        assert_eq!(written, 3);
        assert!(!complete);
    }
}
