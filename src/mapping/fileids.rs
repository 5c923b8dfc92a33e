//! File ids for paths inside Subversion branches.
//!
//! A [`FileIdMap`] replays branch history (newest cached map forward) to
//! know, for every path of a branch revision, the file id it carries and
//! the revision that last changed it.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::MappingError;
use super::revids::{escape_svn_path, generate_svn_revision_id, parse_svn_revision_id};
use super::scheme::BranchingScheme;
use crate::types::{ChangedPath, Revnum};

/// Revision id of the empty revision before any history.
pub const NULL_REVISION: &str = "null:";

/// `svn-v3:<revnum>@<uuid>-<escaped-branch>-<escaped-path>`
pub fn generate_svn_file_id(uuid: &str, revnum: Revnum, branch: &str, path: &str) -> String {
    format!(
        "svn-v3:{revnum}@{uuid}-{}-{}",
        escape_svn_path(branch),
        escape_svn_path(path)
    )
}

/// File id for `path` introduced in the revision named by `revid`.
pub fn generate_file_id(revid: &str, path: &str) -> Result<String, MappingError> {
    let parsed = parse_svn_revision_id(revid)?;
    Ok(generate_svn_file_id(
        &parsed.uuid,
        parsed.revnum,
        &parsed.branch,
        path,
    ))
}

/// A change to one path, relative to its branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalChange {
    /// `A`, `D`, `R` or `M`.
    pub action: char,
    /// Copy source as `(path inside its branch, revision id)`.
    pub copy_from: Option<(String, String)>,
}

pub type ChangeMap = BTreeMap<String, LocalChange>;

/// Converts repository-wide changed paths to branch-relative ones.
///
/// Copying a whole branch onto a branch root counts as a modification.
pub fn get_local_changes(
    paths: &[ChangedPath],
    scheme: &dyn BranchingScheme,
    uuid: &str,
) -> Result<ChangeMap, MappingError> {
    let scheme_name = scheme.to_string();
    let mut sorted: Vec<&ChangedPath> = paths.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut changes = ChangeMap::new();
    for changed in sorted {
        let (_, new_path) = scheme.unprefix(&changed.path)?;
        let change = match (&changed.copy_from_path, changed.copy_from_rev) {
            (Some(copy_path), Some(copy_rev)) => {
                let (copy_branch, copy_inner) = scheme.unprefix(copy_path)?;
                if copy_inner.is_empty() && new_path.is_empty() {
                    LocalChange {
                        action: 'M',
                        copy_from: None,
                    }
                } else {
                    let revid =
                        generate_svn_revision_id(uuid, copy_rev, &copy_branch, &scheme_name);
                    LocalChange {
                        action: changed.action,
                        copy_from: Some((copy_inner, revid)),
                    }
                }
            }
            (Some(copy_path), None) => {
                return Err(MappingError::InconsistentMap(format!(
                    "copy source {copy_path} of {} has no revision",
                    changed.path
                )));
            }
            (None, _) => LocalChange {
                action: changed.action,
                copy_from: None,
            },
        };
        changes.insert(new_path, change);
    }
    Ok(changes)
}

/// Where a path's file id came from.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileMapEntry {
    pub file_id: String,
    /// Last revision that changed the path or anything below it.
    pub revid: String,
}

impl FileMapEntry {
    fn new(file_id: String, revid: &str) -> Self {
        Self {
            file_id,
            revid: revid.to_string(),
        }
    }
}

/// Branch-relative path to file id.
pub type FileMap = BTreeMap<String, FileMapEntry>;

/// One revision of a branch's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub branch: String,
    pub changes: Vec<ChangedPath>,
    pub revnum: Revnum,
}

/// History source for building file id maps.
pub trait LogWalker {
    fn scheme(&self) -> &dyn BranchingScheme;

    /// Revisions that touched `branch` up to `revnum`, newest first,
    /// following the branch across copies.
    fn follow_history(&self, branch: &str, revnum: Revnum) -> Result<Vec<HistoryEntry>, MappingError>;

    /// Repository paths below `path` as they existed in `revnum`.
    fn find_children(&self, path: &str, revnum: Revnum) -> Result<Vec<String>, MappingError>;
}

/// Persistent store of computed maps, keyed by revision id.
pub trait FileIdCache {
    /// `None` when nothing (or an empty map) is stored for `revid`.
    fn load(&self, revid: &str) -> Option<FileMap>;

    fn save(&mut self, revid: &str, parent_revids: &[String], map: &FileMap);
}

/// [`FileIdCache`] kept in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFileIdCache {
    maps: HashMap<String, FileMap>,
}

impl MemoryFileIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl FileIdCache for MemoryFileIdCache {
    fn load(&self, revid: &str) -> Option<FileMap> {
        self.maps.get(revid).filter(|map| !map.is_empty()).cloned()
    }

    fn save(&mut self, revid: &str, _parent_revids: &[String], map: &FileMap) {
        self.maps.insert(revid.to_string(), map.clone());
    }
}

/// File id maps computed from a [`LogWalker`] and cached in a
/// [`FileIdCache`].
#[derive(Debug)]
pub struct FileIdMap<L, C> {
    log: L,
    cache: C,
}

impl<L: LogWalker, C: FileIdCache> FileIdMap<L, C> {
    pub fn new(log: L, cache: C) -> Self {
        Self { log, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn save(&mut self, revid: &str, parent_revids: &[String], map: &FileMap) {
        debug!(revid, entries = map.len(), "saving file id map");
        self.cache.save(revid, parent_revids, map);
    }

    /// The cached map for `revid`, empty if none is stored.
    pub fn load(&self, revid: &str) -> FileMap {
        self.cache.load(revid).unwrap_or_default()
    }

    /// Folds the changes of `branch`@`revnum` into `map`.
    ///
    /// `renames` overrides the file id of newly added paths.
    pub fn apply_changes(
        &self,
        uuid: &str,
        revnum: Revnum,
        branch: &str,
        global_changes: &[ChangedPath],
        map: FileMap,
        renames: &BTreeMap<String, String>,
    ) -> Result<FileMap, MappingError> {
        let scheme = self.log.scheme();
        let changes = get_local_changes(global_changes, scheme, uuid)?;
        let revid = generate_svn_revision_id(uuid, revnum, branch, &scheme.to_string());
        self.apply_local_changes(map, &revid, &changes, renames)
    }

    /// The map of `branch`@`revnum`, computed from the nearest cached
    /// ancestor and stored back under the newest revision id.
    pub fn get_map(
        &mut self,
        uuid: &str,
        revnum: Revnum,
        branch: &str,
        renames: Option<&dyn Fn(&str) -> BTreeMap<String, String>>,
    ) -> Result<FileMap, MappingError> {
        if revnum == 0 {
            return Ok(FileMap::new());
        }
        let scheme_name = self.log.scheme().to_string();

        let mut todo = Vec::new();
        let mut base = None;
        for entry in self.log.follow_history(branch, revnum)? {
            let revid = generate_svn_revision_id(uuid, entry.revnum, &entry.branch, &scheme_name);
            if let Some(cached) = self.cache.load(&revid) {
                base = Some((revid, cached));
                break;
            }
            todo.push((revid, entry.changes));
        }

        let (mut parent_revids, mut map) = match base {
            Some((revid, cached)) => (vec![revid], cached),
            None if self.log.scheme().is_branch("") => {
                let mut map = FileMap::new();
                map.insert(
                    String::new(),
                    FileMapEntry::new(generate_svn_file_id(uuid, 0, "", ""), NULL_REVISION),
                );
                (Vec::new(), map)
            }
            None => (Vec::new(), FileMap::new()),
        };
        if todo.is_empty() {
            return Ok(map);
        }

        let mut last = None;
        for (revid, global_changes) in todo.into_iter().rev() {
            debug!(revid = %revid, "generating file id map");
            let changes = get_local_changes(&global_changes, self.log.scheme(), uuid)?;
            let renames = renames.map(|cb| cb(&revid)).unwrap_or_default();
            map = self.apply_local_changes(map, &revid, &changes, &renames)?;
            if let Some(previous) = last.replace(revid) {
                parent_revids = vec![previous];
            }
        }
        if let Some(revid) = last {
            self.save(&revid, &parent_revids, &map);
        }
        Ok(map)
    }

    fn find_children(&self, path: &str, revid: &str) -> Result<Vec<String>, MappingError> {
        let parsed = parse_svn_revision_id(revid)?;
        let full = format!("{}/{}", parsed.branch, path);
        let scheme = self.log.scheme();
        self.log
            .find_children(full.trim_start_matches('/'), parsed.revnum)?
            .iter()
            .map(|child| scheme.unprefix(child).map(|(_, inner)| inner))
            .collect()
    }

    fn apply_local_changes(
        &self,
        mut map: FileMap,
        revid: &str,
        changes: &ChangeMap,
        renames: &BTreeMap<String, String>,
    ) -> Result<FileMap, MappingError> {
        let new_file_id = |path: &str| match renames.get(path) {
            Some(id) => Ok(id.clone()),
            None => generate_file_id(revid, path),
        };

        for (path, change) in changes {
            if matches!(change.action, 'D' | 'R') {
                if map.remove(path).is_none() {
                    return Err(MappingError::InconsistentMap(format!(
                        "no map entry {path} to delete or replace"
                    )));
                }
                let prefix = format!("{path}/");
                map.retain(|p, _| !p.starts_with(&prefix));
            }

            match change.action {
                'A' | 'R' => {
                    map.insert(path.clone(), FileMapEntry::new(new_file_id(path)?, revid));
                    if let Some((copy_path, copy_revid)) = &change.copy_from {
                        debug!(path = %path, copy_path = %copy_path, copy_revid = %copy_revid, "copied");
                        for child in self.find_children(copy_path, copy_revid)? {
                            let id = new_file_id(&child)?;
                            map.insert(
                                child.replacen(copy_path.as_str(), path, 1),
                                FileMapEntry::new(id, revid),
                            );
                        }
                    }
                }
                'M' => match map.get_mut(path) {
                    Some(entry) => entry.revid = revid.to_string(),
                    None => {
                        return Err(MappingError::InconsistentMap(format!(
                            "no map entry {path} to modify"
                        )));
                    }
                },
                _ => {}
            }

            let parts: Vec<&str> = path.split('/').collect();
            for end in (1..parts.len()).rev() {
                if !mark_changed(&mut map, &parts[..end].join("/"), path, revid)? {
                    break;
                }
            }
        }
        Ok(map)
    }
}

/// Records `revid` on `parent`; `false` once it was already recorded.
fn mark_changed(
    map: &mut FileMap,
    parent: &str,
    child: &str,
    revid: &str,
) -> Result<bool, MappingError> {
    let Some(entry) = map.get_mut(parent) else {
        return Err(MappingError::InconsistentMap(format!(
            "parent item {parent} of {child} doesn't exist in map"
        )));
    };
    if entry.revid == revid {
        return Ok(false);
    }
    entry.revid = revid.to_string();
    Ok(true)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mapping::{NoBranchingScheme, TrunkBranchingScheme};
    use crate::types::NodeKind;

    fn change(action: char, path: &str) -> ChangedPath {
        ChangedPath {
            path: path.to_string(),
            action,
            copy_from_path: None,
            copy_from_rev: None,
            node_kind: NodeKind::Unknown,
            text_mods: None,
            prop_mods: None,
        }
    }

    fn copy(path: &str, from: &str, rev: Revnum) -> ChangedPath {
        ChangedPath {
            copy_from_path: Some(from.to_string()),
            copy_from_rev: Some(rev),
            ..change('A', path)
        }
    }

    struct FakeLog {
        scheme: Box<dyn BranchingScheme>,
        revs: Vec<HistoryEntry>,
        children: HashMap<(String, Revnum), Vec<String>>,
    }

    impl LogWalker for FakeLog {
        fn scheme(&self) -> &dyn BranchingScheme {
            self.scheme.as_ref()
        }

        fn follow_history(&self, _branch: &str, revnum: Revnum) -> Result<Vec<HistoryEntry>, MappingError> {
            Ok(self
                .revs
                .iter()
                .filter(|entry| entry.revnum <= revnum)
                .rev()
                .cloned()
                .collect())
        }

        fn find_children(&self, path: &str, revnum: Revnum) -> Result<Vec<String>, MappingError> {
            Ok(self
                .children
                .get(&(path.to_string(), revnum))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn trunk_history() -> FakeLog {
        let rev = |revnum, changes| HistoryEntry {
            branch: "trunk".into(),
            changes,
            revnum,
        };
        FakeLog {
            scheme: Box::new(TrunkBranchingScheme::new(0)),
            revs: vec![
                rev(1, vec![change('A', "/trunk")]),
                rev(2, vec![change('A', "/trunk/a/f"), change('A', "/trunk/a")]),
                rev(3, vec![change('M', "/trunk/a/f")]),
                rev(4, vec![copy("/trunk/b", "/trunk/a", 2)]),
                rev(5, vec![change('D', "/trunk/b")]),
            ],
            children: HashMap::from([(("trunk/a".to_string(), 2), vec!["/trunk/a/f".to_string()])]),
        }
    }

    fn revid(revnum: Revnum) -> String {
        format!("svn-v3-trunk0:u:trunk:{revnum}")
    }

    fn entry(file_id: &str, revnum: Revnum) -> FileMapEntry {
        FileMapEntry {
            file_id: file_id.to_string(),
            revid: revid(revnum),
        }
    }

    fn expected_at_4() -> FileMap {
        FileMap::from([
            (String::new(), entry("svn-v3:1@u-trunk-", 1)),
            ("a".into(), entry("svn-v3:2@u-trunk-a", 3)),
            ("a/f".into(), entry("svn-v3:2@u-trunk-a%2Ff", 3)),
            ("b".into(), entry("svn-v3:4@u-trunk-b", 4)),
            ("b/f".into(), entry("svn-v3:4@u-trunk-a%2Ff", 4)),
        ])
    }

    #[test]
    fn file_ids_embed_revision_branch_and_path() {
        assert_eq!(
            generate_svn_file_id("uuid", 3, "branches/x", "src/a b.c"),
            "svn-v3:3@uuid-branches%2Fx-src%2Fa%20b.c"
        );
        assert_eq!(
            generate_file_id("svn-v3-trunk0:uuid:trunk:7", "README").unwrap(),
            "svn-v3:7@uuid-trunk-README"
        );
        assert!(generate_file_id("bogus", "x").is_err());
    }

    #[test]
    fn local_changes_strip_the_branch_and_detect_branch_copies() {
        let scheme = TrunkBranchingScheme::new(0);
        let changes = get_local_changes(
            &[
                copy("/branches/foo", "/trunk", 3),
                copy("/branches/foo/x", "/trunk/y", 2),
                change('D', "/branches/foo/z"),
            ],
            &scheme,
            "u",
        )
        .unwrap();
        assert_eq!(
            changes[""],
            LocalChange {
                action: 'M',
                copy_from: None
            }
        );
        assert_eq!(
            changes["x"],
            LocalChange {
                action: 'A',
                copy_from: Some(("y".into(), "svn-v3-trunk0:u:trunk:2".into())),
            }
        );
        assert_eq!(changes["z"].action, 'D');
        assert!(get_local_changes(&[change('A', "/docs")], &scheme, "u").is_err());
    }

    #[test]
    fn get_map_replays_history_including_copies() {
        let mut map = FileIdMap::new(trunk_history(), MemoryFileIdCache::new());
        assert_eq!(map.get_map("u", 4, "trunk", None).unwrap(), expected_at_4());
        assert_eq!(map.cache().len(), 1);
        assert_eq!(map.load(&revid(4)), expected_at_4());
        assert!(map.load(&revid(3)).is_empty());
    }

    #[test]
    fn get_map_resumes_from_the_nearest_cached_map() {
        let mut map = FileIdMap::new(trunk_history(), MemoryFileIdCache::new());
        let at_3 = map.get_map("u", 3, "trunk", None).unwrap();
        assert_eq!(at_3["a/f"], entry("svn-v3:2@u-trunk-a%2Ff", 3));
        assert_eq!(map.get_map("u", 4, "trunk", None).unwrap(), expected_at_4());
        assert_eq!(map.cache().len(), 2);
        // a cached revision is returned as is
        assert_eq!(map.get_map("u", 4, "trunk", None).unwrap(), expected_at_4());
        assert_eq!(map.cache().len(), 2);
    }

    #[test]
    fn deletes_drop_children_and_renames_override_ids() {
        let mut map = FileIdMap::new(trunk_history(), MemoryFileIdCache::new());
        let renames = |revid: &str| {
            if revid.ends_with(":4") {
                BTreeMap::from([("b".to_string(), "kept-id".to_string())])
            } else {
                BTreeMap::new()
            }
        };
        let at_4 = map.get_map("u", 4, "trunk", Some(&renames)).unwrap();
        assert_eq!(at_4["b"].file_id, "kept-id");

        let at_5 = map.get_map("u", 5, "trunk", None).unwrap();
        assert!(!at_5.contains_key("b"));
        assert!(!at_5.contains_key("b/f"));
        assert_eq!(at_5.len(), 3);
    }

    #[test]
    fn revision_zero_and_unbranched_roots() {
        let mut map = FileIdMap::new(trunk_history(), MemoryFileIdCache::new());
        assert!(map.get_map("u", 0, "trunk", None).unwrap().is_empty());

        let log = FakeLog {
            scheme: Box::new(NoBranchingScheme),
            revs: vec![HistoryEntry {
                branch: String::new(),
                changes: vec![change('A', "/a")],
                revnum: 1,
            }],
            children: HashMap::new(),
        };
        let mut map = FileIdMap::new(log, MemoryFileIdCache::new());
        let at_1 = map.get_map("u", 1, "", None).unwrap();
        assert_eq!(at_1[""].file_id, "svn-v3:0@u--");
        assert_eq!(at_1[""].revid, NULL_REVISION);
        assert_eq!(at_1["a"].file_id, "svn-v3:1@u--a");
        assert_eq!(at_1["a"].revid, "svn-v3-none:u::1");
    }

    #[test]
    fn modifying_an_unknown_path_is_inconsistent() {
        let map = FileIdMap::new(trunk_history(), MemoryFileIdCache::new());
        let err = map
            .apply_changes("u", 9, "trunk", &[change('M', "/trunk/nope")], FileMap::new(), &BTreeMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::InconsistentMap("no map entry nope to modify".into())
        );
    }
}
