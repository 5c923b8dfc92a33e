use std::cell::RefCell;
use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::value::{HostError, Value};

/// Subversion and APR error codes emitted or recognised by this crate.
///
/// Values follow `svn_error_codes.h`: every category starts at
/// `APR_OS_START_USERERR + n * SVN_ERR_CATEGORY_SIZE`.
pub mod codes {
    /// First user-defined APR status code.
    pub const APR_OS_START_USERERR: i32 = 120_000;
    /// Number of codes reserved per Subversion error category.
    pub const SVN_ERR_CATEGORY_SIZE: i32 = 5_000;

    const fn category(n: i32) -> i32 {
        APR_OS_START_USERERR + n * SVN_ERR_CATEGORY_SIZE
    }

    pub const BAD_CATEGORY_START: i32 = category(1);
    pub const BAD_URL: i32 = BAD_CATEGORY_START + 2;
    pub const BAD_PROPERTY_VALUE: i32 = BAD_CATEGORY_START + 5;
    pub const BAD_RELATIVE_PATH: i32 = BAD_CATEGORY_START + 7;

    pub const FS_CATEGORY_START: i32 = category(8);
    pub const FS_NO_SUCH_REVISION: i32 = FS_CATEGORY_START + 6;
    pub const FS_NOT_FOUND: i32 = FS_CATEGORY_START + 13;

    pub const REPOS_CATEGORY_START: i32 = category(9);
    pub const REPOS_POST_COMMIT_HOOK_FAILED: i32 = REPOS_CATEGORY_START + 7;

    pub const RA_CATEGORY_START: i32 = category(10);
    pub const RA_ILLEGAL_URL: i32 = RA_CATEGORY_START;
    pub const RA_NOT_AUTHORIZED: i32 = RA_CATEGORY_START + 1;
    pub const RA_NOT_IMPLEMENTED: i32 = RA_CATEGORY_START + 3;

    pub const MISC_CATEGORY_START: i32 = category(16);
    pub const MALFORMED_FILE: i32 = MISC_CATEGORY_START + 2;
    pub const INCORRECT_PARAMS: i32 = MISC_CATEGORY_START + 4;
    pub const UNSUPPORTED_FEATURE: i32 = MISC_CATEGORY_START + 7;
    pub const CHECKSUM_MISMATCH: i32 = MISC_CATEGORY_START + 14;
    pub const CANCELLED: i32 = MISC_CATEGORY_START + 15;
    pub const VERSION_MISMATCH: i32 = MISC_CATEGORY_START + 19;
    pub const UNKNOWN_CAPABILITY: i32 = MISC_CATEGORY_START + 26;

    pub const RA_SVN_CATEGORY_START: i32 = category(18);
    pub const RA_SVN_CMD_ERR: i32 = RA_SVN_CATEGORY_START;
    pub const RA_SVN_UNKNOWN_CMD: i32 = RA_SVN_CATEGORY_START + 1;
    pub const RA_SVN_CONNECTION_CLOSED: i32 = RA_SVN_CATEGORY_START + 2;
    pub const RA_SVN_IO_ERROR: i32 = RA_SVN_CATEGORY_START + 3;
    pub const RA_SVN_MALFORMED_DATA: i32 = RA_SVN_CATEGORY_START + 4;
    pub const RA_SVN_BAD_VERSION: i32 = RA_SVN_CATEGORY_START + 6;
    pub const RA_SVN_NO_MECHANISMS: i32 = RA_SVN_CATEGORY_START + 7;
    pub const RA_SVN_EDIT_ABORTED: i32 = RA_SVN_CATEGORY_START + 8;

    pub const AUTHN_CATEGORY_START: i32 = category(19);
    pub const AUTHN_CREDS_UNAVAILABLE: i32 = AUTHN_CATEGORY_START;
    pub const AUTHN_NO_PROVIDER: i32 = AUTHN_CATEGORY_START + 1;
    pub const AUTHN_PROVIDERS_EXHAUSTED: i32 = AUTHN_CATEGORY_START + 2;
    pub const AUTHN_FAILED: i32 = AUTHN_CATEGORY_START + 4;

    /// Marker code meaning "the real failure is an exception pending in the host".
    pub const HOST_ERROR: i32 = category(50);

    /// Generic description for a code, used when an error carries no message.
    pub fn describe(code: i32) -> &'static str {
        match code {
            BAD_URL => "Bad URL passed to RA layer",
            BAD_PROPERTY_VALUE => "Wrong or unexpected property value",
            BAD_RELATIVE_PATH => "Relative path is not canonical",
            FS_NO_SUCH_REVISION => "Invalid filesystem revision number",
            FS_NOT_FOUND => "Filesystem has no item",
            REPOS_POST_COMMIT_HOOK_FAILED => "Post-commit hook failed",
            RA_ILLEGAL_URL => "Bad URL passed to RA layer",
            RA_NOT_AUTHORIZED => "Authorization failed",
            RA_NOT_IMPLEMENTED => "Repository access method not implemented",
            MALFORMED_FILE => "Bad or corrupt file",
            INCORRECT_PARAMS => "Incorrect parameters given",
            UNSUPPORTED_FEATURE => "Unsupported feature",
            CHECKSUM_MISMATCH => "Checksum mismatch",
            CANCELLED => "The operation was interrupted",
            VERSION_MISMATCH => "Version mismatch in library",
            UNKNOWN_CAPABILITY => "Inquiry about unknown capability",
            RA_SVN_CMD_ERR => "Special code for wrapping server errors to report to client",
            RA_SVN_UNKNOWN_CMD => "Unknown svn protocol command",
            RA_SVN_CONNECTION_CLOSED => "Network connection closed unexpectedly",
            RA_SVN_IO_ERROR => "Network read/write error",
            RA_SVN_MALFORMED_DATA => "Malformed network data",
            RA_SVN_BAD_VERSION => "Client/server version mismatch",
            RA_SVN_NO_MECHANISMS => "Cannot negotiate authentication mechanism",
            RA_SVN_EDIT_ABORTED => "Editor drive was aborted",
            AUTHN_CREDS_UNAVAILABLE => "Credential data unavailable",
            AUTHN_NO_PROVIDER => "No authentication provider available",
            AUTHN_PROVIDERS_EXHAUSTED => "All authentication providers exhausted",
            AUTHN_FAILED => "Authentication failed",
            HOST_ERROR => "Error occured in python bindings",
            _ => "Unknown error",
        }
    }

    /// Returns `true` if `code` lies in the `ra_svn` category.
    pub fn is_ra_svn(code: i32) -> bool {
        (RA_SVN_CATEGORY_START..RA_SVN_CATEGORY_START + SVN_ERR_CATEGORY_SIZE).contains(&code)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// One link of a native error chain (`svn_error_t`).
pub struct ErrorItem {
    /// APR/Subversion status code.
    pub code: i32,
    /// Message, if any.
    pub message: Option<String>,
    /// Source file that raised the error, if known.
    pub file: Option<String>,
    /// Source line that raised the error, if known.
    pub line: Option<u64>,
}

impl ErrorItem {
    /// Creates an item with a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            file: None,
            line: None,
        }
    }

    fn best_message(&self) -> &str {
        match self.message.as_deref() {
            Some(message) if !message.is_empty() => message,
            _ => codes::describe(self.code),
        }
    }
}

/// A native Subversion error descriptor.
///
/// This is the only failure kind the remote-access layer reports. The chain is
/// stored outermost first and is never empty.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SvnError {
    chain: Vec<ErrorItem>,
}

impl SvnError {
    /// Creates a single-link error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            chain: vec![ErrorItem::new(code, message)],
        }
    }

    /// Builds an error from a chain (outermost first). Returns `None` for an empty chain.
    pub fn from_chain(chain: Vec<ErrorItem>) -> Option<Self> {
        if chain.is_empty() {
            None
        } else {
            Some(Self { chain })
        }
    }

    /// Wraps this error in a new outer link (`svn_error_create(code, child, msg)`).
    #[must_use]
    pub fn wrap(mut self, code: i32, message: impl Into<String>) -> Self {
        self.chain.insert(0, ErrorItem::new(code, message));
        self
    }

    /// Records the source location of the outermost link.
    #[must_use]
    pub fn with_location(mut self, file: impl Into<String>, line: u64) -> Self {
        if let Some(outer) = self.chain.first_mut() {
            outer.file = Some(file.into());
            outer.line = Some(line);
        }
        self
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::new(codes::RA_SVN_MALFORMED_DATA, message)
    }

    /// Code of the outermost link.
    pub fn apr_err(&self) -> i32 {
        self.chain.first().map_or(codes::HOST_ERROR, |item| item.code)
    }

    /// Message of the outermost link.
    pub fn message(&self) -> Option<&str> {
        self.chain.first().and_then(|item| item.message.as_deref())
    }

    /// The wrapped error, if any.
    pub fn child(&self) -> Option<SvnError> {
        Self::from_chain(self.chain.get(1..)?.to_vec())
    }

    /// All links, outermost first.
    pub fn chain(&self) -> &[ErrorItem] {
        &self.chain
    }

    /// First non-empty message in the chain, or the generic text for the outer code
    /// (`svn_err_best_message`).
    pub fn best_message(&self) -> String {
        self.chain
            .iter()
            .find_map(|item| item.message.as_deref().filter(|m| !m.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| codes::describe(self.apr_err()).to_string())
    }

    /// Returns `true` if any link carries `code`.
    pub fn has_code(&self, code: i32) -> bool {
        self.chain.iter().any(|item| item.code == code)
    }

    /// Returns `true` for the host marker, or for a cancellation that wraps one.
    pub fn is_host_marker(&self) -> bool {
        match self.apr_err() {
            codes::HOST_ERROR => true,
            codes::CANCELLED => self
                .chain
                .get(1)
                .is_some_and(|child| child.code == codes::HOST_ERROR),
            _ => false,
        }
    }

    pub(crate) fn is_connection_closed(&self) -> bool {
        self.apr_err() == codes::RA_SVN_CONNECTION_CLOSED
    }

    pub(crate) fn is_local_transport_failure(&self) -> bool {
        codes::is_ra_svn(self.apr_err()) && self.apr_err() != codes::RA_SVN_CMD_ERR
    }
}

impl Display for SvnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for item in &self.chain {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            f.write_str(item.best_message())?;
        }
        Ok(())
    }
}

impl std::error::Error for SvnError {}

/// `io::Error` payload marking a failure that already left a host exception pending.
#[derive(Debug)]
pub(crate) struct HostFailure;

impl Display for HostFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(codes::describe(codes::HOST_ERROR))
    }
}

impl std::error::Error for HostFailure {}

impl From<std::io::Error> for SvnError {
    fn from(err: std::io::Error) -> Self {
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<HostFailure>())
        {
            return host_error();
        }
        let code = match err.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => codes::RA_SVN_CONNECTION_CLOSED,
            _ => codes::RA_SVN_IO_ERROR,
        };
        SvnError::new(code, err.to_string())
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// The host-visible exception raised for a native failure.
///
/// `message` is the best message of the chain and `code` the outermost code,
/// matching the `(msg, num)` arguments hosts expect.
pub struct SubversionException {
    /// Best message of the chain.
    pub message: String,
    /// Outermost error code.
    pub code: i32,
    /// Full native chain.
    pub chain: Vec<ErrorItem>,
}

impl SubversionException {
    /// Builds the exception for a native error (`PyErr_NewSubversionException`).
    pub fn new(err: &SvnError) -> Self {
        Self {
            message: err.best_message(),
            code: err.apr_err(),
            chain: err.chain().to_vec(),
        }
    }

    /// Exception arguments as a host value: `(message, code)`.
    pub fn args(&self) -> Value {
        Value::Tuple(vec![
            Value::Str(self.message.clone()),
            Value::Int(i64::from(self.code)),
        ])
    }

    /// The chain as host values: a list of `(message, code, file, line)` tuples.
    pub fn chain_value(&self) -> Value {
        Value::List(
            self.chain
                .iter()
                .map(|item| {
                    Value::Tuple(vec![
                        item.message.clone().map_or(Value::None, Value::Str),
                        Value::Int(i64::from(item.code)),
                        item.file.clone().map_or(Value::None, Value::Str),
                        item.line.map_or(Value::None, |l| {
                            Value::Int(i64::try_from(l).unwrap_or(i64::MAX))
                        }),
                    ])
                })
                .collect(),
        )
    }
}

impl Display for SubversionException {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
/// Errors returned to host code by this crate.
pub enum Error {
    /// A native Subversion failure.
    #[error("subversion error: {0}")]
    Subversion(SubversionException),
    /// An exception raised by host code (callback, stream) propagated unchanged.
    #[error("{0}")]
    Host(HostError),
    /// An argument had the wrong host type.
    #[error("type error: {0}")]
    Type(String),
    /// An argument had the right type but an invalid value.
    #[error("value error: {0}")]
    Value(String),
    /// An object was used in an invalid state.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// The operation is not available.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// The remote-access object is busy with another operation.
    #[error("busy: {0}")]
    Busy(String),
}

impl Error {
    /// Returns the Subversion error code, if this is a Subversion failure.
    pub fn svn_code(&self) -> Option<i32> {
        match self {
            Error::Subversion(exc) => Some(exc.code),
            _ => None,
        }
    }
}

impl From<SubversionException> for Error {
    fn from(exc: SubversionException) -> Self {
        Error::Subversion(exc)
    }
}

impl From<HostError> for Error {
    fn from(err: HostError) -> Self {
        Error::Host(err)
    }
}

impl From<SvnError> for Error {
    fn from(err: SvnError) -> Self {
        if err.is_host_marker() {
            return take_pending().unwrap_or_else(|| {
                Error::Runtime(format!("{} (no exception pending)", err.best_message()))
            });
        }
        Error::Subversion(SubversionException::new(&err))
    }
}

thread_local! {
    static PENDING: RefCell<Option<Error>> = const { RefCell::new(None) };
}

/// Makes `err` the host exception pending on this thread, replacing any previous one.
pub fn set_pending(err: Error) {
    PENDING.with(|slot| *slot.borrow_mut() = Some(err));
}

/// Removes and returns the pending host exception.
pub fn take_pending() -> Option<Error> {
    PENDING.with(|slot| slot.borrow_mut().take())
}

/// Returns `true` if a host exception is pending on this thread.
pub fn has_pending() -> bool {
    PENDING.with(|slot| slot.borrow().is_some())
}

/// Raises a `SubversionException` for `err` in the host (`PyErr_SetSubversionException`).
pub fn set_subversion_exception(err: &SvnError) {
    set_pending(Error::Subversion(SubversionException::new(err)));
}

/// The native marker error (`py_svn_error`): the real failure is the pending host exception.
pub fn host_error() -> SvnError {
    SvnError::new(codes::HOST_ERROR, codes::describe(codes::HOST_ERROR))
}

/// Translates the outcome of a native call into a host result (`check_error`).
///
/// A host marker (or a cancellation wrapping one) yields the pending host
/// exception unchanged; every other native error becomes
/// [`Error::Subversion`].
pub fn check_error<T>(result: Result<T, SvnError>) -> Result<T, Error> {
    result.map_err(Error::from)
}
