//! Mapping between Subversion history and revision/file identifiers.
//!
//! Revision ids take the form `svn-v3-<scheme>:<uuid>:<branch>:<revnum>`;
//! older `svn-v1:`/`svn-v2:` ids can be parsed and upgraded.

mod fileids;
mod revids;
mod scheme;
mod upgrade;

use thiserror::Error;

pub use fileids::{
    ChangeMap, FileIdCache, FileIdMap, FileMap, FileMapEntry, HistoryEntry, LocalChange,
    LogWalker, MemoryFileIdCache, NULL_REVISION, generate_file_id, generate_svn_file_id,
    get_local_changes,
};
pub use revids::{
    MAPPING_VERSION, SvnRevisionId, escape_svn_path, generate_svn_revision_id,
    parse_svn_revision_id, unescape_svn_path,
};
pub use scheme::{
    BranchingScheme, NoBranchingScheme, TrunkBranchingScheme, guess_scheme_from_branch_path,
    parse_scheme,
};
pub use upgrade::{
    LegacyRevisionId, RevisionMetadata, check_revision_changed, create_upgraded_revid,
    generate_upgrade_map, parse_legacy_revision_id,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
/// Errors raised while mapping revisions and file ids.
pub enum MappingError {
    #[error("invalid revision id {0:?}")]
    InvalidRevisionId(String),
    #[error("unknown branching scheme {0:?}")]
    UnknownBranchingScheme(String),
    #[error("{0:?} is not a branch")]
    NotBranch(String),
    /// Upgrading would change the contents of `revid`.
    #[error("Upgrade will change contents in revision {revid}. Use --allow-changes to override.")]
    UpgradeChangesContent { revid: String },
    /// The file id map and the history disagree.
    #[error("inconsistent file id map: {0}")]
    InconsistentMap(String),
}
