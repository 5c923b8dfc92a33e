//! `#[repr(C)]` mirrors of the Subversion and APR structs exchanged with libsvn.
//!
//! Layouts follow `svn_version.h`, `svn_string.h` and `svn_types.h`.
//! Offsets are asserted at compile time.
#![allow(unsafe_code)]
#![allow(non_camel_case_types)]

use std::ffi::CStr;
use std::mem::{offset_of, size_of};
use std::os::raw::{c_char, c_int, c_long, c_void};

use crate::error::{ErrorItem, SvnError};
use crate::types::Lock;
use crate::version::Version;

/// Opaque APR pool.
#[repr(C)]
pub struct apr_pool_t {
    _private: [u8; 0],
}

/// Opaque APR hash table.
#[repr(C)]
pub struct apr_hash_t {
    _private: [u8; 0],
}

/// Opaque APR array header.
#[repr(C)]
pub struct apr_array_header_t {
    _private: [u8; 0],
}

pub type apr_status_t = c_int;
pub type apr_time_t = i64;
pub type svn_boolean_t = c_int;
pub type svn_revnum_t = c_long;

#[repr(C)]
#[derive(Debug)]
pub struct svn_version_t {
    pub major: c_int,
    pub minor: c_int,
    pub patch: c_int,
    pub tag: *const c_char,
}

#[repr(C)]
#[derive(Debug)]
pub struct svn_string_t {
    pub data: *const c_char,
    pub len: usize,
}

#[repr(C)]
#[derive(Debug)]
pub struct svn_error_t {
    pub apr_err: apr_status_t,
    pub message: *const c_char,
    pub child: *mut svn_error_t,
    pub pool: *mut apr_pool_t,
    pub file: *const c_char,
    pub line: c_long,
}

#[repr(C)]
#[derive(Debug)]
pub struct svn_lock_t {
    pub path: *const c_char,
    pub token: *const c_char,
    pub owner: *const c_char,
    pub comment: *const c_char,
    pub is_dav_comment: svn_boolean_t,
    pub creation_date: apr_time_t,
    pub expiration_date: apr_time_t,
}

/// Polled by long-running native operations; a non-null return aborts them.
pub type svn_cancel_func_t = Option<unsafe extern "C" fn(cancel_baton: *mut c_void) -> *mut svn_error_t>;

const PTR: usize = size_of::<*const c_void>();

const _: () = assert!(size_of::<svn_version_t>() == if PTR == 8 { 24 } else { 16 });
const _: () = assert!(offset_of!(svn_version_t, minor) == 4);
const _: () = assert!(offset_of!(svn_version_t, patch) == 8);
const _: () = assert!(offset_of!(svn_version_t, tag) == if PTR == 8 { 16 } else { 12 });

const _: () = assert!(offset_of!(svn_string_t, len) == PTR);
const _: () = assert!(size_of::<svn_string_t>() == 2 * PTR);

const _: () = assert!(offset_of!(svn_error_t, message) == PTR);
const _: () = assert!(offset_of!(svn_error_t, child) == 2 * PTR);
const _: () = assert!(offset_of!(svn_error_t, pool) == 3 * PTR);
const _: () = assert!(offset_of!(svn_error_t, file) == 4 * PTR);
const _: () = assert!(offset_of!(svn_error_t, line) == 5 * PTR);
const _: () = assert!(size_of::<svn_error_t>() == 6 * PTR);

const _: () = assert!(offset_of!(svn_lock_t, comment) == 3 * PTR);
const _: () = assert!(offset_of!(svn_lock_t, is_dav_comment) == 4 * PTR);
#[cfg(target_pointer_width = "64")]
const _: () = assert!(offset_of!(svn_lock_t, creation_date) == 40);
#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<svn_lock_t>() == 56);

/// Copies a NUL-terminated C string, or `None` for a null pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for reads.
pub unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Copies a native version descriptor.
///
/// # Safety
///
/// `raw` must point to a valid `svn_version_t`.
pub unsafe fn version_from_raw(raw: *const svn_version_t) -> Option<Version> {
    let raw = unsafe { raw.as_ref() }?;
    Some(Version {
        major: u32::try_from(raw.major).ok()?,
        minor: u32::try_from(raw.minor).ok()?,
        patch: u32::try_from(raw.patch).ok()?,
        tag: unsafe { cstr_to_string(raw.tag) }.unwrap_or_default(),
    })
}

/// Copies the bytes of a native counted string.
///
/// # Safety
///
/// `raw` must be null or point to a valid `svn_string_t` whose `data` is valid
/// for `len` bytes.
pub unsafe fn string_from_raw(raw: *const svn_string_t) -> Option<Vec<u8>> {
    let raw = unsafe { raw.as_ref() }?;
    if raw.data.is_null() {
        return Some(Vec::new());
    }
    let bytes = unsafe { std::slice::from_raw_parts(raw.data.cast::<u8>(), raw.len) };
    Some(bytes.to_vec())
}

/// Copies a native error chain, walking `child` links. Does not free it.
///
/// # Safety
///
/// `raw` must be null or the head of a valid `svn_error_t` chain.
pub unsafe fn error_from_raw(raw: *const svn_error_t) -> Option<SvnError> {
    let mut chain = Vec::new();
    let mut cur = raw;
    while let Some(err) = unsafe { cur.as_ref() } {
        chain.push(ErrorItem {
            code: err.apr_err,
            message: unsafe { cstr_to_string(err.message) },
            file: unsafe { cstr_to_string(err.file) },
            line: u64::try_from(err.line).ok().filter(|l| *l > 0),
        });
        cur = err.child;
    }
    SvnError::from_chain(chain)
}

/// Copies a native lock descriptor.
///
/// # Safety
///
/// `raw` must be null or point to a valid `svn_lock_t`.
pub unsafe fn lock_from_raw(raw: *const svn_lock_t) -> Option<Lock> {
    let raw = unsafe { raw.as_ref() }?;
    Some(Lock {
        path: unsafe { cstr_to_string(raw.path) }.unwrap_or_default(),
        token: unsafe { cstr_to_string(raw.token) }.unwrap_or_default(),
        owner: unsafe { cstr_to_string(raw.owner) }.unwrap_or_default(),
        comment: unsafe { cstr_to_string(raw.comment) },
        is_dav_comment: raw.is_dav_comment != 0,
        creation_date: raw.creation_date,
        expiration_date: raw.expiration_date,
    })
}
