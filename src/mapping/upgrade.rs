//! Upgrading revision ids from older mapping versions.

use std::collections::BTreeMap;

use tracing::debug;

use super::revids::{MAPPING_VERSION, generate_svn_revision_id, parse_svn_revision_id, unescape_svn_path};
use super::scheme::guess_scheme_from_branch_path;
use super::MappingError;
use crate::types::Revnum;

/// A revision id of any supported mapping version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyRevisionId {
    pub uuid: String,
    pub branch: String,
    pub revnum: Revnum,
    /// `None` when the id does not record a scheme.
    pub scheme: Option<String>,
    pub version: u32,
}

/// Parses `svn-v1:`, `svn-v2:` and `svn-v3-` revision ids.
///
/// v1 and v2 ids look like `<revnum>@<uuid>-<escaped-branch>`.
pub fn parse_legacy_revision_id(revid: &str) -> Result<LegacyRevisionId, MappingError> {
    let invalid = || MappingError::InvalidRevisionId(revid.to_string());
    for (prefix, version) in [("svn-v1:", 1), ("svn-v2:", 2)] {
        let Some(rest) = revid.strip_prefix(prefix) else {
            continue;
        };
        let at = rest.find('@').ok_or_else(invalid)?;
        let dash = rest.rfind('-').ok_or_else(invalid)?;
        if dash < at {
            return Err(invalid());
        }
        let revnum: Revnum = rest[..at].parse().map_err(|_| invalid())?;
        if revnum < 0 {
            return Err(invalid());
        }
        return Ok(LegacyRevisionId {
            uuid: rest[at + 1..dash].to_string(),
            branch: unescape_svn_path(&rest[dash + 1..]),
            revnum,
            scheme: None,
            version,
        });
    }
    if revid.starts_with("svn-v3-") {
        let parsed = parse_svn_revision_id(revid)?;
        return Ok(LegacyRevisionId {
            uuid: parsed.uuid,
            branch: parsed.branch,
            revnum: parsed.revnum,
            scheme: (parsed.scheme != "undefined").then_some(parsed.scheme),
            version: 3,
        });
    }
    Err(invalid())
}

/// Id for a rewritten copy of `revid`; repeated upgrades replace the
/// previous suffix instead of stacking.
pub fn create_upgraded_revid(revid: &str) -> String {
    let suffix = format!("-svn{MAPPING_VERSION}-upgrade");
    if revid.ends_with("-upgrade")
        && let Some(pos) = revid.rfind("-svn")
    {
        return format!("{}{suffix}", &revid[..pos]);
    }
    format!("{revid}{suffix}")
}

/// Maps every parseable id in `revids` to its current-version id. Ids that
/// are not Subversion revision ids are skipped.
pub fn generate_upgrade_map<'a, I>(revids: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = BTreeMap::new();
    for revid in revids {
        let Ok(legacy) = parse_legacy_revision_id(revid) else {
            continue;
        };
        let scheme = match legacy.scheme {
            Some(scheme) => scheme,
            None => guess_scheme_from_branch_path(&legacy.branch).to_string(),
        };
        let new_revid =
            generate_svn_revision_id(&legacy.uuid, legacy.revnum, &legacy.branch, &scheme);
        debug!(old = revid, new = %new_revid, "upgrade mapping");
        map.insert(revid.to_string(), new_revid);
    }
    map
}

/// The parts of a revision that must survive an upgrade unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RevisionMetadata {
    pub revision_id: String,
    pub inventory_sha1: Option<String>,
    pub timestamp: f64,
    pub timezone: Option<i32>,
    pub message: String,
    pub committer: String,
    pub properties: BTreeMap<String, String>,
}

/// Fails with [`MappingError::UpgradeChangesContent`] when `new` differs
/// from `old` in anything but the revision id.
pub fn check_revision_changed(
    old: &RevisionMetadata,
    new: &RevisionMetadata,
) -> Result<(), MappingError> {
    if old.inventory_sha1 != new.inventory_sha1
        || old.timestamp != new.timestamp
        || old.message != new.message
        || old.timezone != new.timezone
        || old.committer != new.committer
        || old.properties != new.properties
    {
        return Err(MappingError::UpgradeChangesContent {
            revid: old.revision_id.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn v1_and_v2_ids_parse_without_scheme() {
        let v1 = parse_legacy_revision_id("svn-v1:5@uuid-1-trunk").unwrap();
        assert_eq!(
            v1,
            LegacyRevisionId {
                uuid: "uuid-1".into(),
                branch: "trunk".into(),
                revnum: 5,
                scheme: None,
                version: 1,
            }
        );
        let v2 = parse_legacy_revision_id("svn-v2:12@a-b-branches%2Ffoo").unwrap();
        assert_eq!(v2.uuid, "a-b");
        assert_eq!(v2.branch, "branches/foo");
        assert_eq!(v2.version, 2);
    }

    #[test]
    fn v3_ids_keep_their_scheme_unless_undefined() {
        let v3 = parse_legacy_revision_id("svn-v3-trunk0:u:trunk:3").unwrap();
        assert_eq!(v3.scheme.as_deref(), Some("trunk0"));
        assert_eq!(v3.version, 3);
        let undefined = parse_legacy_revision_id("svn-v3-undefined:u:trunk:3").unwrap();
        assert_eq!(undefined.scheme, None);
    }

    #[test]
    fn foreign_ids_are_invalid() {
        for bad in [
            "bzr-1234",
            "svn-v1:x@u-trunk",
            "svn-v1:-5@u-trunk",
            "svn-v2:5uuid-trunk",
            "svn-v4:1@u-t",
        ] {
            assert!(matches!(
                parse_legacy_revision_id(bad),
                Err(MappingError::InvalidRevisionId(_))
            ));
        }
    }

    #[test]
    fn upgrade_map_skips_negative_revnums() {
        let map = generate_upgrade_map(["svn-v1:-5@u-trunk"]);
        assert!(map.is_empty());
    }

    #[test]
    fn upgraded_ids_do_not_stack_suffixes() {
        assert_eq!(create_upgraded_revid("foo"), "foo-svn3-upgrade");
        assert_eq!(create_upgraded_revid("foo-svn3-upgrade"), "foo-svn3-upgrade");
        assert_eq!(create_upgraded_revid("foo-svn1-upgrade"), "foo-svn3-upgrade");
        assert_eq!(create_upgraded_revid("x-upgrade"), "x-upgrade-svn3-upgrade");
    }

    #[test]
    fn upgrade_map_guesses_missing_schemes() {
        let map = generate_upgrade_map([
            "svn-v1:5@uuid-1-trunk",
            "svn-v2:7@uuid-1-proj%2Fbranches%2Ffoo",
            "svn-v3-undefined:uuid-1:docs:2",
            "some-other-revid",
        ]);
        assert_eq!(map.len(), 3);
        assert_eq!(map["svn-v1:5@uuid-1-trunk"], "svn-v3-trunk0:uuid-1:trunk:5");
        assert_eq!(
            map["svn-v2:7@uuid-1-proj%2Fbranches%2Ffoo"],
            "svn-v3-trunk1:uuid-1:proj%2Fbranches%2Ffoo:7"
        );
        assert_eq!(map["svn-v3-undefined:uuid-1:docs:2"], "svn-v3-none:uuid-1:docs:2");
    }

    #[test]
    fn changed_metadata_blocks_the_upgrade() {
        let old = RevisionMetadata {
            revision_id: "svn-v1:5@uuid-1-trunk".into(),
            message: "msg".into(),
            committer: "jelmer".into(),
            timestamp: 1.5,
            ..Default::default()
        };
        let mut new = old.clone();
        new.revision_id = "svn-v3-trunk0:uuid-1:trunk:5".into();
        assert_eq!(check_revision_changed(&old, &new), Ok(()));

        new.message = "other".into();
        let err = check_revision_changed(&old, &new).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Upgrade will change contents in revision svn-v1:5@uuid-1-trunk. Use --allow-changes to override."
        );
    }
}
