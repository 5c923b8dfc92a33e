//! Builder-style option types for remote-access operations.

use std::time::Duration;

use crate::config::{CATEGORY_SERVERS, Config};
use crate::types::{PropHash, Revnum};
use crate::Error;

const DEFAULT_RA_CLIENT: &str = "subvert";

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Connection settings for [`crate::Session::open`].
pub struct ClientOptions {
    /// Fixed username offered to the server before asking auth providers.
    pub username: Option<String>,
    /// Fixed password paired with `username`.
    pub password: Option<String>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for a single read from the server.
    pub read_timeout: Duration,
    /// Timeout for a single write to the server.
    pub write_timeout: Duration,
    /// `ra_client` string sent during handshake.
    pub ra_client: String,
    /// Whether credentials may be cached by auth providers.
    pub store_passwords: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(60),
            ra_client: DEFAULT_RA_CLIENT.to_string(),
            store_passwords: true,
        }
    }
}

impl ClientOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives options from the `[global]` section of the `servers` file.
    ///
    /// `http-timeout` (seconds) becomes the read and write timeout;
    /// `store-passwords` controls credential caching.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut options = Self::default();
        if let Some(timeout) = config.get(CATEGORY_SERVERS, "global", "http-timeout") {
            let secs: u64 = timeout.trim().parse().map_err(|_| {
                Error::Value(format!("Config error: invalid value '{timeout}' for option 'http-timeout'"))
            })?;
            options.read_timeout = Duration::from_secs(secs);
            options.write_timeout = Duration::from_secs(secs);
        }
        options.store_passwords =
            config.get_bool(CATEGORY_SERVERS, "global", "store-passwords", true)?;
        Ok(options)
    }

    /// Sets a fixed username and password.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Sets the `ra_client` string sent to the server during handshake.
    #[must_use]
    pub fn with_ra_client(mut self, ra_client: impl Into<String>) -> Self {
        self.ra_client = ra_client.into();
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Which revision properties to request for `log` operations.
pub enum LogRevProps {
    /// Every revision property the server has.
    All,
    /// Only the named properties.
    Custom(Vec<String>),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::Session::log`].
pub struct LogOptions {
    /// Paths relative to the session URL; empty means the session URL itself.
    pub target_paths: Vec<String>,
    /// First revision reported.
    pub start_rev: Revnum,
    /// Last revision reported.
    pub end_rev: Revnum,
    /// Whether to include changed paths in each entry.
    pub changed_paths: bool,
    /// Whether to stop at copy sources instead of following history.
    pub strict_node: bool,
    /// Maximum number of entries (`0` means unlimited).
    pub limit: u64,
    pub include_merged_revisions: bool,
    pub revprops: LogRevProps,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            target_paths: vec![String::new()],
            start_rev: 0,
            end_rev: crate::types::INVALID_REVNUM,
            changed_paths: false,
            strict_node: false,
            limit: 0,
            include_merged_revisions: false,
            revprops: LogRevProps::All,
        }
    }
}

impl LogOptions {
    /// Options for a revision range.
    pub fn between(start_rev: Revnum, end_rev: Revnum) -> Self {
        Self {
            start_rev,
            end_rev,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.target_paths = paths;
        self
    }

    #[must_use]
    pub fn with_changed_paths(mut self, changed_paths: bool) -> Self {
        self.changed_paths = changed_paths;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_revprops(mut self, revprops: LogRevProps) -> Self {
        self.revprops = revprops;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A path/token pair presented during a commit.
pub struct CommitLockToken {
    pub path: String,
    pub token: String,
}

impl CommitLockToken {
    pub fn new(path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token: token.into(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Options for a commit driven through a [`crate::CommitEditor`].
///
/// `svn:log` in `rev_props` is the log message; the remaining entries are
/// sent as additional revision properties.
pub struct CommitOptions {
    /// Revision properties to set on the new revision.
    pub rev_props: PropHash,
    /// Lock tokens to present during commit.
    pub lock_tokens: Vec<CommitLockToken>,
    /// Whether to keep locks after a successful commit.
    pub keep_locks: bool,
}

impl CommitOptions {
    /// Options whose only revision property is `svn:log`.
    pub fn new(log_message: impl Into<String>) -> Self {
        let mut rev_props = PropHash::new();
        rev_props.insert("svn:log".to_string(), log_message.into().into_bytes());
        Self {
            rev_props,
            ..Self::default()
        }
    }

    /// The `svn:log` value, lossily decoded.
    pub fn log_message(&self) -> String {
        self.rev_props
            .get("svn:log")
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn with_lock_tokens(mut self, lock_tokens: Vec<CommitLockToken>) -> Self {
        self.lock_tokens = lock_tokens;
        self
    }

    #[must_use]
    pub fn keep_locks(mut self, keep_locks: bool) -> Self {
        self.keep_locks = keep_locks;
        self
    }

    /// Adds revision properties; `svn:log` from `rev_props` replaces the message.
    #[must_use]
    pub fn with_rev_props(mut self, rev_props: PropHash) -> Self {
        self.rev_props.extend(rev_props);
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn client_options_read_servers_global_section() {
        let mut config = Config::new();
        config.set(CATEGORY_SERVERS, "global", "http-timeout", "5");
        config.set(CATEGORY_SERVERS, "global", "store-passwords", "no");
        let options = ClientOptions::from_config(&config).unwrap();
        assert_eq!(options.read_timeout, Duration::from_secs(5));
        assert_eq!(options.write_timeout, Duration::from_secs(5));
        assert!(!options.store_passwords);
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn bad_timeouts_are_value_errors() {
        let mut config = Config::new();
        config.set(CATEGORY_SERVERS, "global", "http-timeout", "soon");
        assert!(matches!(ClientOptions::from_config(&config), Err(Error::Value(_))));
    }

    #[test]
    fn commit_options_keep_the_log_message_in_rev_props() {
        let mut extra = PropHash::new();
        extra.insert("svn:author-note".into(), b"x".to_vec());
        let options = CommitOptions::new("msg").with_rev_props(extra).keep_locks(true);
        assert_eq!(options.log_message(), "msg");
        assert_eq!(options.rev_props.len(), 2);
        assert!(options.keep_locks);
    }

    #[test]
    fn log_defaults_cover_the_session_root() {
        let options = LogOptions::between(0, 5);
        assert_eq!(options.target_paths, vec![String::new()]);
        assert_eq!(options.end_rev, 5);
        assert_eq!(options.revprops, LogRevProps::All);
    }
}
