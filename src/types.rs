//! Native data types produced by the remote-access layer.
//!
//! These mirror the structures libsvn hands to its callers (`svn_dirent_t`,
//! `svn_lock_t`, `svn_log_entry_t`, ...) and are what the conversion helpers
//! turn into host values.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A revision number (`svn_revnum_t`). Negative values are invalid.
pub type Revnum = i64;

/// `SVN_INVALID_REVNUM`.
pub const INVALID_REVNUM: Revnum = -1;

/// A property hash (`name -> raw value`).
///
/// Property values can be binary; treat them as opaque bytes unless the name
/// says otherwise (`svn:log`, `svn:author`, ...).
pub type PropHash = BTreeMap<String, Vec<u8>>;

/// Repository metadata returned by the server.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Repository UUID.
    pub uuid: String,
    /// Repository root URL; empty when an old server did not report one.
    pub root_url: String,
    /// Server-reported repository capabilities.
    pub capabilities: Vec<String>,
}

/// Information negotiated during the initial handshake.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Capabilities from the greeting plus those announced in `repos-info`.
    pub server_caps: Vec<String>,
    pub repository: RepositoryInfo,
}

/// Result of a successful commit (`svn_commit_info_t`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    pub revision: Revnum,
    /// Commit date as reported by the server.
    pub date: Option<String>,
    pub author: Option<String>,
    /// Error reported by a post-commit hook, if any.
    pub post_commit_err: Option<String>,
}

/// A `(revision, path)` pair as returned by `get-locations`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationEntry {
    pub revision: Revnum,
    /// Absolute repository path (leading `/`).
    pub path: String,
}

/// A property change (`svn_prop_t`); `value == None` deletes the property.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropDelta {
    pub name: String,
    pub value: Option<Vec<u8>>,
}

/// One revision of a file as reported by `get-file-revs`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRev {
    /// Absolute repository path (leading `/`).
    pub path: String,
    pub revision: Revnum,
    pub rev_props: PropHash,
    pub prop_deltas: Vec<PropDelta>,
    /// Whether this revision was reached through a merge.
    pub merged_revision: bool,
    /// Raw svndiff chunks as received from the server.
    pub delta_chunks: Vec<Vec<u8>>,
}

/// A repository lock (`svn_lock_t`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    /// Absolute repository path of the locked file.
    pub path: String,
    /// Opaque lock token.
    pub token: String,
    pub owner: String,
    pub comment: Option<String>,
    /// Whether the comment was created by a generic DAV client.
    pub is_dav_comment: bool,
    /// Creation time in microseconds since the epoch (`apr_time_t`).
    pub creation_date: i64,
    /// Expiration time in microseconds since the epoch, `0` if none.
    pub expiration_date: i64,
}

/// A path changed in a revision (`svn_log_changed_path2_t`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedPath {
    /// Absolute repository path (leading `/`).
    pub path: String,
    /// `A`, `D`, `M` or `R`.
    pub action: char,
    pub copy_from_path: Option<String>,
    pub copy_from_rev: Option<Revnum>,
    pub node_kind: NodeKind,
    pub text_mods: Option<bool>,
    pub prop_mods: Option<bool>,
}

/// A log entry (`svn_log_entry_t`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub revision: Revnum,
    /// Changed paths, or `None` when they were not requested.
    pub changed_paths: Option<Vec<ChangedPath>>,
    /// Requested revision properties.
    pub rev_props: PropHash,
    /// Whether merged revisions follow this entry.
    pub has_children: bool,
    /// Whether this entry reverses a merge.
    pub subtractive_merge: bool,
}

/// The kind of a node in the repository (`svn_node_kind_t`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum NodeKind {
    /// No node exists at the requested path/revision.
    #[default]
    None,
    File,
    Dir,
    /// Forward-compatibility fallback.
    Unknown,
}

impl NodeKind {
    pub(crate) fn from_word(word: &str) -> Self {
        match word {
            "none" => Self::None,
            "file" => Self::File,
            "dir" => Self::Dir,
            _ => Self::Unknown,
        }
    }

    /// Word used by the `ra_svn` protocol.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Dir => "dir",
            Self::Unknown => "unknown",
        }
    }

    /// Numeric value of `svn_node_kind_t`.
    pub fn as_int(self) -> i64 {
        match self {
            Self::None => 0,
            Self::File => 1,
            Self::Dir => 2,
            Self::Unknown => 3,
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directory entry (`svn_dirent_t`). Fields not requested are `None`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (basename). Empty for `stat` results.
    pub name: String,
    pub kind: NodeKind,
    pub size: Option<u64>,
    pub has_props: Option<bool>,
    pub created_rev: Option<Revnum>,
    /// Last change time in microseconds since the epoch.
    pub time: Option<i64>,
    pub last_author: Option<String>,
}

/// Result of `get-dir`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirListing {
    /// The revision the listing was taken from.
    pub revision: Revnum,
    pub entries: Vec<DirEntry>,
    /// Directory properties, if requested.
    pub props: PropHash,
}

/// Subversion depth value.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Depth {
    Empty,
    Files,
    Immediates,
    Infinity,
}

impl Depth {
    pub(crate) fn as_word(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Files => "files",
            Self::Immediates => "immediates",
            Self::Infinity => "infinity",
        }
    }

    /// Maps `svn_depth_t` values (`0` empty ... `3` infinity).
    pub fn from_int(n: i64) -> Option<Self> {
        match n {
            0 => Some(Self::Empty),
            1 => Some(Self::Files),
            2 => Some(Self::Immediates),
            3 => Some(Self::Infinity),
            _ => None,
        }
    }
}

/// `svn_dirent_t` field selectors (`SVN_DIRENT_*` bits).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirentField {
    Kind,
    Size,
    HasProps,
    CreatedRev,
    Time,
    LastAuthor,
}

impl DirentField {
    pub const ALL: [DirentField; 6] = [
        Self::Kind,
        Self::Size,
        Self::HasProps,
        Self::CreatedRev,
        Self::Time,
        Self::LastAuthor,
    ];

    pub(crate) fn as_word(self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Size => "size",
            Self::HasProps => "has-props",
            Self::CreatedRev => "created-rev",
            Self::Time => "time",
            Self::LastAuthor => "last-author",
        }
    }

    /// The `SVN_DIRENT_*` bit for this field.
    pub fn bit(self) -> u32 {
        match self {
            Self::Kind => 0x1,
            Self::Size => 0x2,
            Self::HasProps => 0x4,
            Self::CreatedRev => 0x8,
            Self::Time => 0x10,
            Self::LastAuthor => 0x20,
        }
    }

    /// Expands a `SVN_DIRENT_*` bit mask.
    pub fn from_mask(mask: u32) -> Vec<DirentField> {
        Self::ALL
            .into_iter()
            .filter(|field| mask & field.bit() != 0)
            .collect()
    }
}

/// A protocol capability that may be announced during handshake.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The mandatory edit pipelining capability.
    EditPipeline,
    Svndiff1,
    AbsentEntries,
    /// Setting revision properties during commit.
    CommitRevProps,
    MergeInfo,
    Depth,
    /// `change-rev-prop2`.
    AtomicRevProps,
    InheritedProps,
    /// Requesting revision properties from `log`.
    LogRevProps,
    PartialReplay,
    EphemeralTxnProps,
    GetFileRevsReverse,
    List,
}

impl Capability {
    const ALL: [Capability; 13] = [
        Self::EditPipeline,
        Self::Svndiff1,
        Self::AbsentEntries,
        Self::CommitRevProps,
        Self::MergeInfo,
        Self::Depth,
        Self::AtomicRevProps,
        Self::InheritedProps,
        Self::LogRevProps,
        Self::PartialReplay,
        Self::EphemeralTxnProps,
        Self::GetFileRevsReverse,
        Self::List,
    ];

    /// Returns the wire capability word used by the `ra_svn` protocol.
    pub fn as_wire_word(self) -> &'static str {
        match self {
            Self::EditPipeline => "edit-pipeline",
            Self::Svndiff1 => "svndiff1",
            Self::AbsentEntries => "absent-entries",
            Self::CommitRevProps => "commit-revprops",
            Self::MergeInfo => "mergeinfo",
            Self::Depth => "depth",
            Self::AtomicRevProps => "atomic-revprops",
            Self::InheritedProps => "inherited-props",
            Self::LogRevProps => "log-revprops",
            Self::PartialReplay => "partial-replay",
            Self::EphemeralTxnProps => "ephemeral-txnprops",
            Self::GetFileRevsReverse => "get-file-revs-reverse",
            Self::List => "list",
        }
    }

    /// Looks up a capability by its `SVN_RA_CAPABILITY_*` name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.as_wire_word() == name)
    }
}

/// Parses a Subversion timestamp (`2024-01-02T03:04:05.123456Z`) into
/// microseconds since the epoch.
pub fn parse_svn_date(input: &str) -> Option<i64> {
    let input = input.trim().strip_suffix('Z').unwrap_or(input.trim());
    let (date, time) = input.split_once('T')?;
    let mut date_parts = date.splitn(3, '-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: i64 = date_parts.next()?.parse().ok()?;
    let day: i64 = date_parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let (hms, frac) = time.split_once('.').unwrap_or((time, ""));
    let mut time_parts = hms.splitn(3, ':');
    let hour: i64 = time_parts.next()?.parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = time_parts.next()?.parse().ok()?;
    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }
    if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut micros: i64 = if frac.is_empty() { 0 } else { frac.parse().ok()? };
    for _ in frac.len()..6 {
        micros *= 10;
    }

    let days = days_from_civil(year, month, day);
    let seconds = days * 86_400 + hour * 3_600 + minute * 60 + second;
    Some(seconds * 1_000_000 + micros)
}

/// Formats microseconds since the epoch as a Subversion timestamp.
pub fn format_svn_date(micros: i64) -> String {
    let seconds = micros.div_euclid(1_000_000);
    let frac = micros.rem_euclid(1_000_000);
    let days = seconds.div_euclid(86_400);
    let secs_of_day = seconds.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{frac:06}Z",
        secs_of_day / 3_600,
        (secs_of_day % 3_600) / 60,
        secs_of_day % 60
    )
}

fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
