//! Small helpers shared across `core::*`: raw struct (de)serialization and
//! logger setup, carried forward from `rfs_lib::utils`.

use std::mem::size_of;
use std::slice::from_raw_parts;

/// Reinterprets `src` as its raw bytes. Used to write packed on-disk
/// structs (`Node`, WAL record headers, inode records) straight into a
/// mapped region without a serialization crate in the loop.
///
/// # Safety
/// `T` must have no padding the caller cares about round-tripping and must
/// not own heap data (pointers would serialize as addresses, not values).
pub unsafe fn serialize_row<T: Sized>(src: &T) -> &[u8] {
    from_raw_parts((src as *const T) as *const u8, size_of::<T>())
}

/// Inverse of [`serialize_row`]: reads a `T` out of a byte slice at least
/// `size_of::<T>()` long.
///
/// # Safety
/// `src` must contain a valid bit pattern for `T` and be at least
/// `size_of::<T>()` bytes.
pub unsafe fn deserialize_row<T>(src: &[u8]) -> T {
    std::ptr::read(src.as_ptr() as *const _)
}

/// Initializes `env_logger` once, honoring `RUST_LOG`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_logs() {
    let _ = env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Packed {
        a: u32,
        b: u16,
        c: u16,
    }

    #[test]
    fn round_trips_through_raw_bytes() {
        let original = Packed { a: 7, b: 2, c: 9 };
        let bytes = unsafe { serialize_row(&original) }.to_vec();
        let restored: Packed = unsafe { deserialize_row(&bytes) };
        assert_eq!(original, restored);
    }
}
