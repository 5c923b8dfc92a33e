use crate::error::ErrorItem;
use crate::options::LogRevProps;
use crate::types::{
    ChangedPath, CommitInfo, DirEntry, DirListing, DirentField, FileRev, LocationEntry, Lock,
    LogEntry, NodeKind, PropDelta, PropHash, RepositoryInfo, Revnum, INVALID_REVNUM,
    parse_svn_date,
};
use crate::{SvnError, codes};

use super::SvnItem;

fn malformed(what: &str) -> SvnError {
    SvnError::protocol(format!("Malformed {what}"))
}

pub(crate) fn parse_proplist(item: &SvnItem) -> Result<PropHash, SvnError> {
    let entries = item
        .as_list()
        .ok_or_else(|| malformed("property list"))?;
    let mut props = PropHash::new();
    for entry in entries {
        let Some([name, value, ..]) = entry.as_list() else {
            return Err(malformed("property list entry"));
        };
        let (Some(name), Some(value)) = (name.as_string(), value.as_bytes()) else {
            return Err(malformed("property list entry"));
        };
        props.insert(name, value.to_vec());
    }
    Ok(props)
}

pub(crate) fn parse_propdelta(item: &SvnItem) -> Result<Vec<PropDelta>, SvnError> {
    let entries = item
        .as_list()
        .ok_or_else(|| malformed("property delta"))?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(items) = entry.as_list() else {
            return Err(malformed("property delta entry"));
        };
        let name = items
            .first()
            .and_then(SvnItem::as_string)
            .ok_or_else(|| malformed("property delta entry"))?;
        let value = items.get(1).and_then(opt_tuple_bytes);
        out.push(PropDelta { name, value });
    }
    Ok(out)
}

/// `( path token owner ( ?comment ) created ( ?expires ) )`
pub(crate) fn parse_lockdesc(item: &SvnItem) -> Result<Lock, SvnError> {
    let items = item.as_list().ok_or_else(|| malformed("lock description"))?;
    let [path, token, owner, comment, created, rest @ ..] = items else {
        return Err(malformed("lock description"));
    };
    let string = |item: &SvnItem| item.as_string().ok_or_else(|| malformed("lock description"));
    let date = |text: String| {
        parse_svn_date(&text).ok_or_else(|| malformed(&format!("lock date '{text}'")))
    };
    let expiration_date = match rest.first().and_then(opt_tuple_string) {
        Some(expires) => date(expires)?,
        None => 0,
    };
    Ok(Lock {
        path: string(path)?,
        token: string(token)?,
        owner: string(owner)?,
        comment: opt_tuple_string(comment),
        is_dav_comment: false,
        creation_date: date(string(created)?)?,
        expiration_date,
    })
}

pub(crate) fn parse_location_entry(item: &SvnItem) -> Result<LocationEntry, SvnError> {
    let Some([rev, path, ..]) = item.as_list() else {
        return Err(malformed("location entry"));
    };
    Ok(LocationEntry {
        revision: rev.as_revnum().ok_or_else(|| malformed("location entry"))?,
        path: path.as_string().ok_or_else(|| malformed("location entry"))?,
    })
}

/// `( path rev rev-props prop-deltas ? merged-revision )`
pub(crate) fn parse_file_rev_entry(item: &SvnItem) -> Result<FileRev, SvnError> {
    let Some([path, rev, rev_props, prop_deltas, rest @ ..]) = item.as_list() else {
        return Err(malformed("file revision entry"));
    };
    Ok(FileRev {
        path: path
            .as_string()
            .ok_or_else(|| malformed("file revision path"))?,
        revision: rev
            .as_revnum()
            .ok_or_else(|| malformed("file revision number"))?,
        rev_props: parse_proplist(rev_props)?,
        prop_deltas: parse_propdelta(prop_deltas)?,
        merged_revision: rest.first().and_then(opt_tuple_bool).unwrap_or(false),
        delta_chunks: Vec::new(),
    })
}

/// `( uuid ?root-url ?( cap... ) )`
pub(crate) fn parse_repos_info(params: &[SvnItem]) -> Result<RepositoryInfo, SvnError> {
    let uuid = params
        .first()
        .and_then(SvnItem::as_string)
        .ok_or_else(|| malformed("repository info"))?;
    let root_url = match params.get(1) {
        Some(item) => item
            .as_string()
            .ok_or_else(|| malformed("repository root URL"))?,
        None => String::new(),
    };
    let capabilities = match params.get(2) {
        Some(item) => item
            .as_list()
            .ok_or_else(|| malformed("repository capabilities"))?
            .iter()
            .filter_map(|c| c.as_word().map(str::to_string))
            .collect(),
        None => Vec::new(),
    };
    Ok(RepositoryInfo {
        uuid,
        root_url,
        capabilities,
    })
}

/// Rebuilds the error chain of a `failure` response.
///
/// Each item is `( apr-err message file line )`, outermost first. An empty or
/// unreadable list becomes a malformed-data error.
pub(crate) fn parse_server_error(items: &[SvnItem]) -> SvnError {
    let chain = items
        .iter()
        .filter_map(|item| {
            let [code, message, file, line, ..] = item.as_list()? else {
                return None;
            };
            Some(ErrorItem {
                code: code.as_u64().and_then(|c| i32::try_from(c).ok())?,
                message: message.as_string().filter(|m| !m.is_empty()),
                file: file.as_string().filter(|f| !f.is_empty()),
                line: line.as_u64(),
            })
        })
        .collect();
    SvnError::from_chain(chain)
        .unwrap_or_else(|| SvnError::new(codes::RA_SVN_MALFORMED_DATA, "Malformed error list"))
}

/// `( new-rev ( ?date ) ( ?author ) ( ?post-commit-err ) )`
pub(crate) fn parse_commit_info(item: &SvnItem) -> Result<CommitInfo, SvnError> {
    let items = item.as_list().ok_or_else(|| malformed("commit info"))?;
    let revision = items
        .first()
        .and_then(SvnItem::as_revnum)
        .ok_or_else(|| malformed("commit info"))?;
    Ok(CommitInfo {
        revision,
        date: items.get(1).and_then(opt_tuple_string),
        author: items.get(2).and_then(opt_tuple_string),
        post_commit_err: items.get(3).and_then(opt_tuple_string),
    })
}

pub(crate) struct GetFileResponse {
    pub(crate) checksum: Option<String>,
    pub(crate) revision: Revnum,
    pub(crate) props: PropHash,
}

/// `( ( ?checksum ) rev props ... )`
pub(crate) fn parse_get_file_response(params: &[SvnItem]) -> Result<GetFileResponse, SvnError> {
    let [checksum, rev, props, ..] = params else {
        return Err(malformed("get-file response"));
    };
    Ok(GetFileResponse {
        checksum: opt_tuple_string(checksum),
        revision: rev
            .as_revnum()
            .ok_or_else(|| malformed("get-file revision"))?,
        props: parse_proplist(props)?,
    })
}

/// `( rev props ( dirent... ) )`; only `fields` are filled in each entry.
pub(crate) fn parse_get_dir_listing(
    params: &[SvnItem],
    fields: &[DirentField],
) -> Result<DirListing, SvnError> {
    let [rev, props, entries, ..] = params else {
        return Err(malformed("get-dir response"));
    };
    let revision = rev.as_revnum().ok_or_else(|| malformed("get-dir revision"))?;
    let entries = entries
        .as_list()
        .ok_or_else(|| malformed("get-dir entry list"))?
        .iter()
        .map(|entry| {
            let items = entry.as_list().ok_or_else(|| malformed("dirent"))?;
            let name = items
                .first()
                .and_then(SvnItem::as_string)
                .ok_or_else(|| malformed("dirent name"))?;
            parse_dirent(name, &items[1..], fields)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DirListing {
        revision,
        entries,
        props: parse_proplist(props)?,
    })
}

/// `( ?( kind size has-props created-rev ( ?date ) ( ?author ) ) )`
pub(crate) fn parse_stat_response(params: &[SvnItem]) -> Result<Option<DirEntry>, SvnError> {
    let outer = params
        .first()
        .and_then(SvnItem::as_list)
        .ok_or_else(|| malformed("stat response"))?;
    let Some(dirent) = outer.first() else {
        return Ok(None);
    };
    let items = dirent.as_list().ok_or_else(|| malformed("stat dirent"))?;
    parse_dirent(String::new(), items, &DirentField::ALL).map(Some)
}

fn parse_dirent(name: String, items: &[SvnItem], fields: &[DirentField]) -> Result<DirEntry, SvnError> {
    let [kind, size, has_props, created_rev, rest @ ..] = items else {
        return Err(malformed("dirent"));
    };
    let want = |field: DirentField| fields.contains(&field);
    let kind = opt_tuple_wordish(kind).ok_or_else(|| malformed("dirent kind"))?;
    let time = match rest.first().and_then(opt_tuple_string) {
        Some(date) if want(DirentField::Time) => {
            Some(parse_svn_date(&date).ok_or_else(|| malformed(&format!("dirent date '{date}'")))?)
        }
        _ => None,
    };
    Ok(DirEntry {
        name,
        kind: NodeKind::from_word(&kind),
        size: size.as_u64().filter(|_| want(DirentField::Size)),
        has_props: has_props.as_bool().filter(|_| want(DirentField::HasProps)),
        created_rev: created_rev
            .as_revnum()
            .filter(|_| want(DirentField::CreatedRev)),
        time,
        last_author: rest
            .get(1)
            .and_then(opt_tuple_string)
            .filter(|_| want(DirentField::LastAuthor)),
    })
}

/// The revision properties a `log` request asked for.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LogRevPropWants {
    pub(crate) author: bool,
    pub(crate) date: bool,
    pub(crate) message: bool,
    pub(crate) custom: bool,
}

impl LogRevPropWants {
    pub(crate) fn new(revprops: &LogRevProps) -> Self {
        match revprops {
            LogRevProps::All => Self {
                author: true,
                date: true,
                message: true,
                custom: true,
            },
            LogRevProps::Custom(names) => {
                let mut wants = Self::default();
                for name in names {
                    match name.as_str() {
                        "svn:author" => wants.author = true,
                        "svn:date" => wants.date = true,
                        "svn:log" => wants.message = true,
                        _ => wants.custom = true,
                    }
                }
                wants
            }
        }
    }
}

/// Parses one `log` entry:
/// `( ( change... ) rev ( ?author ) ( ?date ) ( ?message )
///    ? has-children invalid-revnum revprop-count rev-props ? subtractive-merge )`.
///
/// Author, date and message land in `rev_props` when `wants` asks for them.
pub(crate) fn parse_log_entry(items: &[SvnItem], wants: LogRevPropWants) -> Result<LogEntry, SvnError> {
    let [changes, rev, rest @ ..] = items else {
        return Err(malformed("log entry"));
    };
    let changes = changes
        .as_list()
        .ok_or_else(|| malformed("log entry changed paths"))?;
    let mut revision = rev
        .as_revnum()
        .ok_or_else(|| malformed("log entry revision"))?;

    let mut rev_props = PropHash::new();
    for (idx, (name, wanted)) in [
        ("svn:author", wants.author),
        ("svn:date", wants.date),
        ("svn:log", wants.message),
    ]
    .into_iter()
    .enumerate()
    {
        if wanted && let Some(value) = rest.get(idx).and_then(opt_tuple_bytes) {
            rev_props.insert(name.to_string(), value);
        }
    }

    let mut has_children = false;
    let mut subtractive_merge = false;
    let mut saw_revprops = false;
    if let (Some(children), Some(invalid)) = (
        rest.get(3).and_then(SvnItem::as_bool),
        rest.get(4).and_then(SvnItem::as_bool),
    ) {
        has_children = children;
        if invalid {
            revision = INVALID_REVNUM;
        }
        if rest.get(5).and_then(SvnItem::as_u64).is_some()
            && let Some(props) = rest.get(6)
        {
            rev_props.extend(parse_proplist(props)?);
            saw_revprops = true;
        }
        subtractive_merge = rest.get(7).and_then(SvnItem::as_bool).unwrap_or(false);
    }
    if wants.custom && !saw_revprops {
        return Err(SvnError::new(
            codes::RA_NOT_IMPLEMENTED,
            "Server does not support custom revprops via log",
        ));
    }

    let changed_paths = changes
        .iter()
        .map(parse_changed_path)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LogEntry {
        revision,
        changed_paths: (!changed_paths.is_empty()).then_some(changed_paths),
        rev_props,
        has_children,
        subtractive_merge,
    })
}

/// `( path action ( ?copy-path copy-rev ) ( ?kind ?text-mods ?prop-mods ) )`
fn parse_changed_path(item: &SvnItem) -> Result<ChangedPath, SvnError> {
    let Some([path, action, rest @ ..]) = item.as_list() else {
        return Err(malformed("changed path entry"));
    };
    let path = path.as_string().ok_or_else(|| malformed("changed path"))?;
    let action = action
        .as_word()
        .and_then(|w| w.chars().next())
        .ok_or_else(|| malformed("changed path action"))?;

    let (copy_from_path, copy_from_rev) = match rest.first().and_then(SvnItem::as_list) {
        Some([from_path, from_rev, ..]) => (from_path.as_string(), from_rev.as_revnum()),
        _ => (None, None),
    };
    let (node_kind, text_mods, prop_mods) = match rest.get(1).and_then(SvnItem::as_list) {
        Some(items) => (
            items
                .first()
                .and_then(opt_tuple_wordish)
                .map_or(NodeKind::Unknown, |w| NodeKind::from_word(&w)),
            items.get(1).and_then(SvnItem::as_bool),
            items.get(2).and_then(SvnItem::as_bool),
        ),
        None => (NodeKind::Unknown, None, None),
    };
    Ok(ChangedPath {
        path,
        action,
        copy_from_path,
        copy_from_rev,
        node_kind,
        text_mods,
        prop_mods,
    })
}

/// `( ?lockdesc )`
pub(crate) fn parse_get_lock_response(params: &[SvnItem]) -> Result<Option<Lock>, SvnError> {
    let outer = params
        .first()
        .and_then(SvnItem::as_list)
        .ok_or_else(|| malformed("get-lock response"))?;
    outer.first().map(parse_lockdesc).transpose()
}

/// `( ( lockdesc... ) )`
pub(crate) fn parse_get_locks_response(params: &[SvnItem]) -> Result<Vec<Lock>, SvnError> {
    params
        .first()
        .and_then(SvnItem::as_list)
        .ok_or_else(|| malformed("get-locks response"))?
        .iter()
        .map(parse_lockdesc)
        .collect()
}

pub(crate) fn opt_tuple_string(item: &SvnItem) -> Option<String> {
    match item {
        SvnItem::List(items) => items.first().and_then(SvnItem::as_string),
        _ => item.as_string(),
    }
}

fn opt_tuple_bytes(item: &SvnItem) -> Option<Vec<u8>> {
    match item {
        SvnItem::List(items) => items.first().and_then(SvnItem::as_bytes).map(<[u8]>::to_vec),
        _ => item.as_bytes().map(<[u8]>::to_vec),
    }
}

pub(crate) fn opt_tuple_wordish(item: &SvnItem) -> Option<String> {
    match item {
        SvnItem::List(items) => items.first().and_then(opt_tuple_wordish),
        SvnItem::Word(word) => Some(word.clone()),
        SvnItem::String(_) => item.as_string(),
        _ => None,
    }
}

fn opt_tuple_bool(item: &SvnItem) -> Option<bool> {
    match item {
        SvnItem::List(items) => items.first().and_then(SvnItem::as_bool),
        _ => item.as_bool(),
    }
}
