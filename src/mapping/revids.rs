//! Revision ids for Subversion revisions.

use std::fmt;

use super::MappingError;
use crate::types::Revnum;

/// Version of the revision id format produced by
/// [`generate_svn_revision_id`].
pub const MAPPING_VERSION: u32 = 3;

const REVISION_ID_PREFIX: &str = "svn-v3-";

/// Percent-quotes `path`; only ASCII alphanumerics and `_.-` are kept.
pub fn escape_svn_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Reverses [`escape_svn_path`]. Malformed escapes are kept as written.
pub fn unescape_svn_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = bytes.get(i + 1..i + 3)
            && let Ok(hex) = std::str::from_utf8(hex)
            && let Ok(b) = u8::from_str_radix(hex, 16)
        {
            out.push(b);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Builds `svn-v3-<scheme>:<uuid>:<branch>:<revnum>`.
///
/// Leading and trailing slashes of `branch` are ignored.
pub fn generate_svn_revision_id(
    uuid: &str,
    revnum: Revnum,
    branch: &str,
    scheme: &str,
) -> String {
    format!(
        "{REVISION_ID_PREFIX}{scheme}:{uuid}:{}:{revnum}",
        escape_svn_path(branch.trim_matches('/'))
    )
}

/// Fields of a parsed mapping-v3 revision id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SvnRevisionId {
    pub uuid: String,
    pub branch: String,
    pub revnum: Revnum,
    pub scheme: String,
}

impl fmt::Display for SvnRevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&generate_svn_revision_id(
            &self.uuid,
            self.revnum,
            &self.branch,
            &self.scheme,
        ))
    }
}

pub fn parse_svn_revision_id(revid: &str) -> Result<SvnRevisionId, MappingError> {
    let invalid = || MappingError::InvalidRevisionId(revid.to_string());
    let rest = revid.strip_prefix(REVISION_ID_PREFIX).ok_or_else(invalid)?;
    let mut parts = rest.split(':');
    let (Some(scheme), Some(uuid), Some(branch), Some(revnum), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(invalid());
    };
    let revnum: Revnum = revnum.parse().map_err(|_| invalid())?;
    if revnum < 0 || uuid.is_empty() {
        return Err(invalid());
    }
    Ok(SvnRevisionId {
        uuid: uuid.to_string(),
        branch: unescape_svn_path(branch),
        revnum,
        scheme: scheme.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn escape_quotes_everything_but_unreserved() {
        assert_eq!(escape_svn_path("trunk/a b"), "trunk%2Fa%20b");
        assert_eq!(escape_svn_path("foo_1.2-x"), "foo_1.2-x");
        assert_eq!(unescape_svn_path("trunk%2Fa%20b"), "trunk/a b");
        assert_eq!(unescape_svn_path("100%"), "100%");
    }

    #[test]
    fn generated_ids_use_the_v3_layout() {
        assert_eq!(
            generate_svn_revision_id("uuid-1", 5, "/branches/foo/", "trunk0"),
            "svn-v3-trunk0:uuid-1:branches%2Ffoo:5"
        );
        assert_eq!(generate_svn_revision_id("u", 0, "", "none"), "svn-v3-none:u::0");
    }

    #[test]
    fn parse_reads_back_every_field() {
        let parsed = parse_svn_revision_id("svn-v3-trunk1:uuid-1:proj%2Ftrunk:42").unwrap();
        assert_eq!(
            parsed,
            SvnRevisionId {
                uuid: "uuid-1".into(),
                branch: "proj/trunk".into(),
                revnum: 42,
                scheme: "trunk1".into(),
            }
        );
        assert_eq!(parsed.to_string(), "svn-v3-trunk1:uuid-1:proj%2Ftrunk:42");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        for bad in [
            "svn-v2:4@uuid-trunk",
            "svn-v3-none:uuid:trunk",
            "svn-v3-none:uuid:trunk:x",
            "svn-v3-none:uuid:trunk:-1",
            "svn-v3-none:uuid:a:b:1",
        ] {
            assert_eq!(
                parse_svn_revision_id(bad),
                Err(MappingError::InvalidRevisionId(bad.to_string()))
            );
        }
    }

    proptest! {
        #[test]
        fn escaped_paths_unescape_to_the_original(path in "\\PC{0,24}") {
            let escaped = escape_svn_path(&path);
            prop_assert!(!escaped.contains(':') && !escaped.contains('/'));
            prop_assert_eq!(unescape_svn_path(&escaped), path);
        }
    }
}
