//! Slice headers and string/C-string conversion.
//!
//! The header layout is guaranteed across FFI. Element addressing is
//! `ptr + i * element_size`; `len <= cap` always holds. Bounds
//! violations are fatal through the runtime abort hook; the `try_`
//! variants exist for callers (and tests) that want the error instead.

use std::ffi::{c_char, CStr, CString};

use crate::models::error::RuntimeError;
use crate::models::ownership::OwnershipTag;

/// FFI-stable slice descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SliceHeader {
    pub ptr: *mut u8,
    pub len: usize,
    pub cap: usize,
    pub element_size: usize,
    pub ownership: OwnershipTag,
    pub is_mutable: bool,
    pub type_id: u32,
}

impl SliceHeader {
    /// Wrap raw parts. The capacity of a freshly wrapped buffer equals
    /// its length.
    pub fn from_raw(
        ptr: *mut u8,
        len: usize,
        element_size: usize,
        is_mutable: bool,
        ownership: OwnershipTag,
    ) -> Self {
        Self {
            ptr,
            len,
            cap: len,
            element_size,
            ownership,
            is_mutable,
            type_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of element `index`, or the bounds error.
    pub fn try_element(&self, index: usize) -> Result<*mut u8, RuntimeError> {
        if index >= self.len {
            return Err(RuntimeError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        Ok(unsafe { self.ptr.add(index * self.element_size) })
    }

    /// Address of element `index`; out-of-bounds access is fatal.
    pub fn element(&self, index: usize) -> *mut u8 {
        match self.try_element(index) {
            Ok(ptr) => ptr,
            Err(err) => super::fatal(&err.to_string()),
        }
    }

    /// `[start, end)` view sharing the same buffer.
    pub fn try_subslice(&self, start: usize, end: usize) -> Result<SliceHeader, RuntimeError> {
        if start > end || end > self.len {
            return Err(RuntimeError::IndexOutOfBounds {
                index: end,
                len: self.len,
            });
        }
        Ok(SliceHeader {
            ptr: unsafe { self.ptr.add(start * self.element_size) },
            len: end - start,
            cap: self.cap - start,
            element_size: self.element_size,
            ownership: self.ownership,
            is_mutable: self.is_mutable,
            type_id: self.type_id,
        })
    }

    pub fn subslice(&self, start: usize, end: usize) -> SliceHeader {
        match self.try_subslice(start, end) {
            Ok(header) => header,
            Err(err) => super::fatal(&err.to_string()),
        }
    }

    /// Invariant check used by debug assertions and tests.
    pub fn is_well_formed(&self) -> bool {
        self.len <= self.cap && self.element_size > 0
    }
}

/// Copy a NUL-terminated C string into an owned string. Invalid UTF-8 is
/// replaced, not rejected; the runtime treats C strings as bytes.
///
/// # Safety
/// `ptr` must point at a valid NUL-terminated buffer.
pub unsafe fn string_from_cstr(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Allocate a NUL-terminated buffer for `s`. Ownership of the buffer
/// transfers to the caller, who must release it with `free_cstr`.
/// Interior NUL bytes truncate the result at the first NUL.
pub fn string_to_cstr(s: &str) -> *mut c_char {
    let truncated = match s.find('\0') {
        Some(index) => &s[..index],
        None => s,
    };
    match CString::new(truncated) {
        Ok(cstring) => cstring.into_raw(),
        Err(_) => CString::default().into_raw(),
    }
}

/// Reclaim a buffer produced by `string_to_cstr`.
///
/// # Safety
/// `ptr` must come from `string_to_cstr` and not have been freed.
pub unsafe fn free_cstr(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_over(buf: &mut [u32]) -> SliceHeader {
        SliceHeader::from_raw(
            buf.as_mut_ptr() as *mut u8,
            buf.len(),
            std::mem::size_of::<u32>(),
            true,
            OwnershipTag::Pinned,
        )
    }

    #[test]
    fn element_addressing_strides_by_element_size() {
        let mut buf = [10u32, 20, 30, 40];
        let header = header_over(&mut buf);

        assert!(header.is_well_formed());
        let second = header.try_element(1).unwrap();
        assert_eq!(unsafe { *(second as *const u32) }, 20);

        let base = header.ptr as usize;
        assert_eq!(header.try_element(3).unwrap() as usize, base + 12);
    }

    #[test]
    fn out_of_bounds_element_is_an_error() {
        let mut buf = [1u32, 2];
        let header = header_over(&mut buf);
        assert_eq!(
            header.try_element(2),
            Err(RuntimeError::IndexOutOfBounds { index: 2, len: 2 })
        );
    }

    #[test]
    fn subslice_shares_the_buffer_and_keeps_invariant() {
        let mut buf = [1u32, 2, 3, 4, 5];
        let header = header_over(&mut buf);

        let sub = header.try_subslice(1, 4).unwrap();
        assert_eq!(sub.len, 3);
        assert_eq!(sub.cap, 4);
        assert!(sub.is_well_formed());
        assert_eq!(unsafe { *(sub.try_element(0).unwrap() as *const u32) }, 2);

        assert!(header.try_subslice(3, 2).is_err());
        assert!(header.try_subslice(0, 6).is_err());
    }

    #[test]
    fn cstr_round_trip_transfers_ownership() {
        let ptr = string_to_cstr("across the boundary");
        let back = unsafe { string_from_cstr(ptr) };
        assert_eq!(back, "across the boundary");
        unsafe { free_cstr(ptr) };
    }

    #[test]
    fn interior_nul_truncates() {
        let ptr = string_to_cstr("ab\0cd");
        let back = unsafe { string_from_cstr(ptr) };
        assert_eq!(back, "ab");
        unsafe { free_cstr(ptr) };
    }
}
