//! Marshalling between native values and host values.

use std::collections::BTreeMap;

use crate::pool::{Pool, SvnString};
use crate::types::{ChangedPath, DirEntry, Lock, NodeKind, PropDelta, PropHash, Revnum};
use crate::value::{Key, Value};
use crate::Error;

/// Copies a host list of strings into the pool (`string_list_to_apr_array`).
///
/// `None` maps to `None`. Anything other than a list or tuple of `str`/`bytes`
/// is a type error.
pub fn string_list_to_array<'p>(
    pool: &'p Pool<'_>,
    value: &Value,
) -> Result<Option<Vec<SvnString<'p>>>, Error> {
    if value.is_none() {
        return Ok(None);
    }
    let items = value
        .as_seq()
        .ok_or_else(|| Error::Type(format!("Expected list of strings, got {}", value.type_name())))?;
    items
        .iter()
        .map(|item| {
            item.as_bytes()
                .map(|bytes| pool.alloc_bytes(bytes))
                .ok_or_else(|| {
                    Error::Type(format!("Expected list of strings, found {}", item.type_name()))
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Converts a host list of revision numbers (`revnum_list_to_apr_array`).
pub fn revnum_list_to_array(value: &Value) -> Result<Option<Vec<Revnum>>, Error> {
    if value.is_none() {
        return Ok(None);
    }
    let items = value.as_seq().ok_or_else(|| {
        Error::Type(format!("Expected list of revision numbers, got {}", value.type_name()))
    })?;
    items
        .iter()
        .map(|item| match item {
            Value::Int(n) => Ok(*n),
            other => Err(Error::Type(format!(
                "Expected revision number, found {}",
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Converts a property hash into a host dict (`prop_hash_to_dict`).
///
/// An absent hash becomes an empty dict. Values stay raw bytes.
pub fn prop_hash_to_dict(props: Option<&PropHash>) -> Value {
    let Some(props) = props else {
        return Value::Dict(BTreeMap::new());
    };
    Value::Dict(
        props
            .iter()
            .map(|(name, value)| (Key::Str(name.clone()), Value::Bytes(value.clone())))
            .collect(),
    )
}

/// Converts a host dict into property changes; `None` values delete.
pub fn dict_to_prop_changes(value: &Value) -> Result<Vec<PropDelta>, Error> {
    let map = value
        .as_dict()
        .ok_or_else(|| Error::Type(format!("Expected dictionary, got {}", value.type_name())))?;
    map.iter()
        .map(|(key, value)| {
            let Key::Str(name) = key else {
                return Err(Error::Type("property names must be strings".into()));
            };
            let value = match value {
                Value::None => None,
                other => Some(
                    other
                        .as_bytes()
                        .ok_or_else(|| {
                            Error::Type(format!(
                                "property {name:?}: expected str or bytes, got {}",
                                other.type_name()
                            ))
                        })?
                        .to_vec(),
                ),
            };
            Ok(PropDelta {
                name: name.clone(),
                value,
            })
        })
        .collect()
}

/// Converts a host dict into a property hash, the inverse of [`prop_hash_to_dict`].
///
/// Entries whose value is `None` are left out.
pub fn dict_to_prop_hash(value: &Value) -> Result<PropHash, Error> {
    Ok(dict_to_prop_changes(value)?
        .into_iter()
        .filter_map(|delta| delta.value.map(|value| (delta.name, value)))
        .collect())
}

/// Converts a lock into the host's 7-tuple (`wrap_lock`):
/// `(path, token, owner, comment, is_dav_comment, creation_date, expiration_date)`.
pub fn wrap_lock(lock: &Lock) -> Value {
    Value::Tuple(vec![
        Value::Str(lock.path.clone()),
        Value::Str(lock.token.clone()),
        Value::Str(lock.owner.clone()),
        lock.comment.clone().into(),
        Value::Bool(lock.is_dav_comment),
        Value::Int(lock.creation_date),
        Value::Int(lock.expiration_date),
    ])
}

pub fn node_kind_to_value(kind: NodeKind) -> Value {
    Value::Int(kind.as_int())
}

/// Converts changed paths into `{path: (action, copyfrom_path, copyfrom_rev[, kind])}`.
///
/// A missing copy source is `(None, -1)`.
pub fn changed_paths_to_dict(paths: &[ChangedPath], with_kind: bool) -> Value {
    Value::Dict(
        paths
            .iter()
            .map(|changed| {
                let mut tuple = vec![
                    Value::Str(changed.action.to_string()),
                    changed.copy_from_path.clone().into(),
                    Value::Int(changed.copy_from_rev.unwrap_or(-1)),
                ];
                if with_kind {
                    tuple.push(node_kind_to_value(changed.node_kind));
                }
                (Key::Str(changed.path.clone()), Value::Tuple(tuple))
            })
            .collect(),
    )
}

/// Converts a dirent into a dict holding the fields the server reported.
pub fn dirent_to_dict(entry: &DirEntry) -> Value {
    let mut map = BTreeMap::new();
    map.insert(Key::from("kind"), node_kind_to_value(entry.kind));
    if let Some(size) = entry.size {
        map.insert(Key::from("size"), Value::Int(i64::try_from(size).unwrap_or(i64::MAX)));
    }
    if let Some(has_props) = entry.has_props {
        map.insert(Key::from("has_props"), Value::Bool(has_props));
    }
    if let Some(created_rev) = entry.created_rev {
        map.insert(Key::from("created_rev"), Value::Int(created_rev));
    }
    if let Some(time) = entry.time {
        map.insert(Key::from("time"), Value::Int(time));
    }
    if let Some(author) = &entry.last_author {
        map.insert(Key::from("last_author"), Value::Str(author.clone()));
    }
    Value::Dict(map)
}
