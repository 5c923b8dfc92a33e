//! Runtime binding to the native `libsvn_subr` library.
//!
//! Nothing links against libsvn at build time; the library is opened on
//! first use and the handful of entry points the glue needs are resolved
//! from it.
#![allow(unsafe_code)]

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;
use std::sync::OnceLock;

use libloading::Library;
use tracing::debug;

use crate::cancel::CancelFunc;
use crate::error::Error;
use crate::ffi::{apr_status_t, error_from_raw, svn_error_t, svn_version_t, version_from_raw};
use crate::version::Version;
use crate::{SvnError, codes};

type SvnSubrVersion = unsafe extern "C" fn() -> *const svn_version_t;
type SvnErrorClear = unsafe extern "C" fn(err: *mut svn_error_t);
type SvnErrorCreate = unsafe extern "C" fn(
    apr_err: apr_status_t,
    child: *mut svn_error_t,
    message: *const c_char,
) -> *mut svn_error_t;

#[cfg(windows)]
const SUBR_LIB_NAMES: &[&str] = &["libsvn_subr-1.dll"];

#[cfg(target_os = "macos")]
const SUBR_LIB_NAMES: &[&str] = &["libsvn_subr-1.0.dylib", "libsvn_subr-1.dylib"];

#[cfg(all(unix, not(target_os = "macos")))]
const SUBR_LIB_NAMES: &[&str] = &["libsvn_subr-1.so.0", "libsvn_subr-1.so"];

#[cfg(not(any(windows, unix)))]
const SUBR_LIB_NAMES: &[&str] = &[];

static NATIVE: OnceLock<Result<NativeSvn, String>> = OnceLock::new();

/// Entry points resolved from `libsvn_subr-1`.
pub struct NativeSvn {
    _lib: Library,
    subr_version: SvnSubrVersion,
    error_clear: SvnErrorClear,
    error_create: SvnErrorCreate,
}

impl std::fmt::Debug for NativeSvn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSvn")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

fn open_library() -> Result<Library, String> {
    let mut last_err = None::<String>;
    for &name in SUBR_LIB_NAMES {
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                debug!(library = name, "loaded native subversion library");
                return Ok(lib);
            }
            Err(err) => last_err = Some(format!("{name}: {err}")),
        }
    }
    Err(last_err.unwrap_or_else(|| "unable to load libsvn_subr-1".to_string()))
}

unsafe fn load_sym<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T, String> {
    let symbol = unsafe { lib.get::<T>(name) }.map_err(|err| {
        let name = String::from_utf8_lossy(name);
        format!("missing libsvn symbol {name}: {err}")
    })?;
    Ok(*symbol)
}

impl NativeSvn {
    fn open() -> Result<Self, String> {
        let lib = open_library()?;
        let subr_version = unsafe { load_sym::<SvnSubrVersion>(&lib, b"svn_subr_version\0")? };
        let error_clear = unsafe { load_sym::<SvnErrorClear>(&lib, b"svn_error_clear\0")? };
        let error_create = unsafe { load_sym::<SvnErrorCreate>(&lib, b"svn_error_create\0")? };
        Ok(Self {
            _lib: lib,
            subr_version,
            error_clear,
            error_create,
        })
    }

    /// The process-wide binding, opening the library on first call.
    ///
    /// A failed load is remembered; later calls fail the same way.
    pub fn load() -> Result<&'static NativeSvn, Error> {
        match NATIVE.get_or_init(Self::open) {
            Ok(native) => Ok(native),
            Err(reason) => Err(Error::NotImplemented(format!(
                "native Subversion library unavailable ({reason})"
            ))),
        }
    }

    /// Version reported by `svn_subr_version()`.
    pub fn version(&self) -> Option<Version> {
        unsafe { version_from_raw((self.subr_version)()) }
    }

    /// Copies a native error chain and frees it. `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be null or an error chain owned by the caller; it must not
    /// be used afterwards.
    pub unsafe fn take_error(&self, raw: *mut svn_error_t) -> Option<SvnError> {
        if raw.is_null() {
            return None;
        }
        let err = unsafe { error_from_raw(raw) };
        unsafe { (self.error_clear)(raw) };
        err
    }

    /// Result of a native call returning `svn_error_t *`.
    ///
    /// # Safety
    ///
    /// Same contract as [`NativeSvn::take_error`].
    pub unsafe fn check(&self, raw: *mut svn_error_t) -> Result<(), SvnError> {
        match unsafe { self.take_error(raw) } {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Builds a native error from `err` (outermost item only).
    fn create_error(&self, err: &SvnError) -> *mut svn_error_t {
        let message = CString::new(err.best_message().replace('\0', " ")).unwrap_or_default();
        unsafe { (self.error_create)(err.apr_err(), ptr::null_mut(), message.as_ptr()) }
    }

    /// Pairs `func` with this binding so it can be handed to native code
    /// together with [`cancel_trampoline`].
    pub fn cancel_baton<'a>(&'static self, func: &'a mut CancelFunc) -> CancelBaton<'a> {
        CancelBaton { native: self, func }
    }
}

/// The baton passed next to [`cancel_trampoline`]; must outlive the native
/// call it is given to.
pub struct CancelBaton<'a> {
    native: &'static NativeSvn,
    func: &'a mut CancelFunc,
}

impl CancelBaton<'_> {
    pub fn as_ptr(&mut self) -> *mut c_void {
        (self as *mut Self).cast()
    }
}

/// `svn_cancel_func_t` that polls the [`CancelFunc`] of a [`CancelBaton`].
///
/// A cancellation comes back as a native `SVN_ERR_CANCELLED` error; a panic
/// in the callback is reported the same way.
///
/// # Safety
///
/// `baton` must come from [`CancelBaton::as_ptr`] on a live baton.
pub unsafe extern "C" fn cancel_trampoline(baton: *mut c_void) -> *mut svn_error_t {
    let Some(baton) = (unsafe { baton.cast::<CancelBaton<'_>>().as_mut() }) else {
        return ptr::null_mut();
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| (baton.func)()));
    let err = match outcome {
        Ok(Ok(())) => return ptr::null_mut(),
        Ok(Err(err)) => err,
        Err(_) => SvnError::new(codes::CANCELLED, "Cancellation callback panicked"),
    };
    debug!(code = err.apr_err(), "native operation cancelled");
    let err = if err.apr_err() == codes::CANCELLED {
        err
    } else {
        err.wrap(codes::CANCELLED, "Operation cancelled")
    };
    baton.native.create_error(&err)
}
