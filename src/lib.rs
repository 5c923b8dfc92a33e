//! Host-runtime glue for Subversion.
//!
//! This crate sits between an embedding runtime (a scripting host) and the
//! Subversion libraries. It provides scoped memory pools, translation of
//! native error chains into host exceptions, marshalling of host values
//! (lists, dicts, callables, streams) into native shapes, cancellation
//! callbacks and the conversion of host configuration objects.
//!
//! The native side is an async client for Subversion's `svn://` (`ra_svn`)
//! protocol. [`RemoteAccess`] exposes it to the host: every call runs in a
//! scratch [`Pool`], reports failures as [`SvnError`] chains and hands them
//! to [`check_error`].
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use subvert::{LogParams, RemoteAccess, Value};
//!
//! fn main() -> subvert::Result<()> {
//!     let ra = RemoteAccess::open("svn://example.com/repo", None, None)?;
//!     let latest = ra.get_latest_revnum()?;
//!
//!     let mut receiver = |args: Vec<Value>| {
//!         println!("{args:?}");
//!         Ok::<_, subvert::HostError>(Value::None)
//!     };
//!     ra.get_log(&mut receiver, &LogParams::new(Value::None, latest, 0).with_limit(10))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `serde`: enables `Serialize`/`Deserialize` for public data types.
//! - `libsvn`: loads `libsvn_subr-1` at runtime ([`native`]) to exchange
//!   native error chains, versions and cancellation callbacks.
//! - `python`: pyo3 bridge between [`Value`] and Python objects
//!   ([`python`]).
//!
//! ## Protocol notes
//!
//! - Only `svn://` is supported (no `svn+ssh://`, no DAV).
//! - Built-in authentication mechanisms: `ANONYMOUS`, `PLAIN`, and `CRAM-MD5`.
//!
//! For raw wire protocol items, see [`raw::SvnItem`].

#![deny(unsafe_code)]

pub mod auth;
pub mod cancel;
pub mod config;
pub mod convert;
mod editor;
mod error;
pub mod ffi;
pub mod log;
pub mod mapping;
#[cfg(feature = "libsvn")]
pub mod native;
mod options;
mod path;
mod pool;
#[cfg(feature = "python")]
pub mod python;
mod ra;
mod rasvn;
mod session;
pub mod stream;
mod svndiff;
mod types;
mod url;
mod value;
mod version;

pub use auth::{Auth, AuthProvider, CredentialKind, Credentials};
pub use cancel::{CancelFunc, CancelToken, host_cancel_func};
pub use config::{Config, config_hash_from_object, get_config};
pub use editor::{CommitCallback, CommitEditor, DirectoryEditor, FileEditor};
pub use error::{
    Error, ErrorItem, SubversionException, SvnError, check_error, codes, has_pending,
    host_error, set_pending, set_subversion_exception, take_pending,
};
/// Convenience alias for results returned to host code.
pub type Result<T> = std::result::Result<T, Error>;
pub use options::{ClientOptions, CommitLockToken, CommitOptions, LogOptions, LogRevProps};
pub use pool::{Pool, SvnString, run_with_pool};
pub use ra::{LogParams, RemoteAccess};
/// Low-level wire-protocol types.
pub mod raw {
    pub use crate::rasvn::SvnItem;
}
pub use session::Session;
pub use stream::{HostStream, MemoryStream, Stream, new_stream};
pub use types::{
    Capability, ChangedPath, CommitInfo, Depth, DirEntry, DirListing, DirentField, FileRev,
    LocationEntry, Lock, LogEntry, NodeKind, PropDelta, PropHash, RepositoryInfo, Revnum,
    ServerInfo,
};
pub use url::SvnUrl;
pub use value::{HostCallable, HostError, HostPayload, Key, Value};
pub use version::{Version, api_version, version};
